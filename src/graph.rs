use std::sync::Arc;

use bevy::prelude::Resource;
use log::{error, info};

use crate::{
    buffer::{ChunkBuffer, SceneSink, UpdateReport},
    cell::SpatialIndex,
    config::{FunctionOptions, GraphSettings},
    controller::{FlyController, Pose},
    error::{FlyGraphError, Result},
    mesh::ChunkGeometry,
    style::SurfaceMesher,
    types::{Point, SurfaceFunction, Value},
};

/// Identifies a function registered with a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

/// A registered function together with the chunks streamed for it.
pub struct RegisteredFunction {
    id: FunctionId,
    buffer: ChunkBuffer<SurfaceMesher>,
    /// Build the full neighborhood on the next tick regardless of camera movement.
    needs_init: bool,
}

impl RegisteredFunction {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn options(&self) -> &FunctionOptions {
        self.buffer.builder().options()
    }

    pub fn buffer(&self) -> &ChunkBuffer<SurfaceMesher> {
        &self.buffer
    }
}

/// What a [`Graph::tick`] did, per function.
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub pose: Option<Pose>,
    pub updates: Vec<(FunctionId, UpdateReport)>,
}

impl TickReport {
    pub fn built(&self) -> usize {
        self.updates.iter().map(|(_, r)| r.built).sum()
    }

    pub fn removed(&self) -> usize {
        self.updates.iter().map(|(_, r)| r.removed).sum()
    }
}

/// Owns the camera controller and one [`ChunkBuffer`] per registered function.
///
/// The scene itself is not owned here: every operation that adds or removes
/// chunks takes the [`SceneSink`] to notify.
///
/// ```text
/// draw()            → running, next tick rebuilds everything
/// tick(dt, sink)    → controller.update(dt) → buffer.update(position) per function
/// set_position(p)   → teleport, next tick rebuilds everything
/// stop()            → ticks do nothing
/// clear(sink)       → every function and chunk removed
/// ```
#[derive(Resource)]
pub struct Graph {
    settings: GraphSettings,
    index: SpatialIndex,
    controller: FlyController,
    functions: Vec<RegisteredFunction>,
    next_id: u32,
    running: bool,
    force_rebuild: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::with_index(GraphSettings::default(), SpatialIndex::default())
    }
}

impl Graph {
    pub fn new(settings: GraphSettings) -> Result<Self> {
        settings.validate()?;
        let index = SpatialIndex::new(settings.camera_far, settings.snap)?;
        Ok(Self::with_index(settings, index))
    }

    fn with_index(settings: GraphSettings, index: SpatialIndex) -> Self {
        Self {
            settings,
            index,
            controller: FlyController::default(),
            functions: Vec::new(),
            next_id: 0,
            running: false,
            force_rebuild: false,
        }
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn controller(&self) -> &FlyController {
        &self.controller
    }

    /// Feed input events here between ticks.
    pub fn controller_mut(&mut self) -> &mut FlyController {
        &mut self.controller
    }

    pub fn pose(&self) -> Pose {
        self.controller.pose()
    }

    pub fn functions(&self) -> &[RegisteredFunction] {
        &self.functions
    }

    pub fn function(&self, id: FunctionId) -> Option<&RegisteredFunction> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Registers `function` with options given as a partial TOML value.
    ///
    /// Invalid options are logged and the function is not registered; functions
    /// registered earlier keep streaming.
    pub fn add_function<F>(&mut self, function: F, options: &toml::Value) -> Option<FunctionId>
    where
        F: Fn(Value, Value) -> Value + Send + Sync + 'static,
    {
        let added = FunctionOptions::merged(options)
            .and_then(|options| self.add_function_with(Arc::new(function), options));
        match added {
            Ok(id) => Some(id),
            Err(err) => {
                error!("add_function: registration skipped: {err}");
                None
            }
        }
    }

    /// Registers `function` with fully specified options.
    pub fn add_function_with(
        &mut self,
        function: Arc<SurfaceFunction>,
        options: FunctionOptions,
    ) -> Result<FunctionId> {
        let mesher = SurfaceMesher::new(
            function,
            options,
            self.settings.camera_far,
            self.settings.scale,
        )?;
        let id = FunctionId(self.next_id);
        self.next_id += 1;
        self.functions.push(RegisteredFunction {
            id,
            buffer: ChunkBuffer::new(id, self.index, mesher),
            needs_init: true,
        });
        info!("registered {id:?} ({} functions)", self.functions.len());
        Ok(id)
    }

    /// Unregisters a function and removes its chunks from `sink`.
    pub fn remove_function(
        &mut self,
        id: FunctionId,
        sink: &mut impl SceneSink<ChunkGeometry>,
    ) -> Result<()> {
        let pos = self
            .functions
            .iter()
            .position(|f| f.id == id)
            .ok_or(FlyGraphError::UnknownFunction(id))?;
        let mut removed = self.functions.remove(pos);
        removed.buffer.clear(sink);
        Ok(())
    }

    /// Unregisters every function and removes all their chunks from `sink`.
    pub fn clear(&mut self, sink: &mut impl SceneSink<ChunkGeometry>) {
        for mut function in self.functions.drain(..) {
            function.buffer.clear(sink);
        }
    }

    /// Starts ticking. The first tick builds every function's neighborhood.
    pub fn draw(&mut self) {
        self.running = true;
        self.force_rebuild = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Teleports the camera. The next tick rebuilds around the new position.
    pub fn set_position(&mut self, position: Point) {
        self.controller.set_position(position);
        self.force_rebuild = true;
    }

    /// Advances the camera by `delta` seconds and streams chunks around it.
    ///
    /// Does nothing while stopped.
    pub fn tick(&mut self, delta: Value, sink: &mut impl SceneSink<ChunkGeometry>) -> TickReport {
        if !self.running {
            return TickReport::default();
        }

        let pose = self.controller.update(delta);
        let force = std::mem::take(&mut self.force_rebuild);
        let updates = self
            .functions
            .iter_mut()
            .map(|function| {
                let init = std::mem::take(&mut function.needs_init) || force;
                (
                    function.id,
                    function.buffer.update(pose.position, init, sink),
                )
            })
            .collect();

        TickReport {
            pose: Some(pose),
            updates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ChunkKey;
    use crate::chunk::Chunk;

    #[derive(Default)]
    struct Counter {
        added: usize,
        removed: usize,
    }

    impl SceneSink<ChunkGeometry> for Counter {
        fn added(&mut self, _key: ChunkKey, _chunk: &Chunk<ChunkGeometry>) {
            self.added += 1;
        }

        fn removed(&mut self, _key: ChunkKey, _chunk: Chunk<ChunkGeometry>) {
            self.removed += 1;
        }
    }

    fn small_graph() -> Graph {
        Graph::new(GraphSettings {
            camera_far: 100.,
            ..Default::default()
        })
        .unwrap()
    }

    fn options(source: &str) -> toml::Value {
        toml::Value::Table(toml::from_str(source).unwrap())
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(
            Graph::new(GraphSettings {
                camera_far: 0.,
                ..Default::default()
            })
            .is_err()
        );
    }

    #[test]
    fn invalid_registration_is_skipped() {
        let mut graph = small_graph();
        let good = graph.add_function(|x, z| x * z, &options("grid_step = 50.0"));
        let bad = graph.add_function(|x, _| x, &options("grid_step = -1.0"));
        assert!(good.is_some());
        assert!(bad.is_none());
        assert_eq!(graph.functions().len(), 1);
    }

    #[test]
    fn ticks_do_nothing_until_drawn() {
        let mut graph = small_graph();
        graph.add_function(|_, _| 0., &options("grid_step = 50.0"));
        let mut sink = Counter::default();
        assert!(graph.tick(0.1, &mut sink).updates.is_empty());
        assert_eq!(sink.added, 0);

        graph.draw();
        let report = graph.tick(0.1, &mut sink);
        assert_eq!(report.built(), 27);
        assert_eq!(sink.added, 27);

        graph.stop();
        graph.set_position(Point::new(1000., 0., 0.));
        assert!(graph.tick(0.1, &mut sink).updates.is_empty());
    }

    #[test]
    fn each_function_streams_its_own_chunks() {
        let mut graph = small_graph();
        graph.add_function(|_, _| 0., &options("style = 'xLines'"));
        graph.add_function(|_, _| 1., &options("style = 'plates'"));
        graph.draw();
        let mut sink = Counter::default();
        graph.tick(0., &mut sink);
        assert_eq!(sink.added, 54);
        assert!(graph.functions().iter().all(|f| f.buffer().len() == 27));
    }

    #[test]
    fn set_position_teleports_and_rebuilds() {
        let mut graph = small_graph();
        graph.add_function(|_, _| 0., &options("grid_step = 50.0"));
        graph.draw();
        let mut sink = Counter::default();
        graph.tick(0., &mut sink);

        graph.set_position(Point::new(10_000., 0., 0.));
        let report = graph.tick(0., &mut sink);
        assert_eq!(report.built(), 27);
        assert_eq!(report.removed(), 27);
        assert_eq!(graph.pose().position, Point::new(10_000., 0., 0.));

        let idle = graph.tick(0., &mut sink);
        assert!(idle.updates.iter().all(|(_, r)| r.skipped));
    }

    #[test]
    fn late_registration_builds_on_next_tick() {
        let mut graph = small_graph();
        graph.draw();
        let mut sink = Counter::default();
        graph.tick(0., &mut sink);

        let id = graph.add_function(|_, _| 0., &options("")).unwrap();
        let report = graph.tick(0., &mut sink);
        assert_eq!(report.updates, vec![(id, report.updates[0].1)]);
        assert_eq!(report.built(), 27);
    }

    #[test]
    fn clear_and_remove_release_chunks() {
        let mut graph = small_graph();
        let first = graph.add_function(|_, _| 0., &options("")).unwrap();
        graph.add_function(|_, _| 0., &options("")).unwrap();
        graph.draw();
        let mut sink = Counter::default();
        graph.tick(0., &mut sink);

        graph.remove_function(first, &mut sink).unwrap();
        assert_eq!(sink.removed, 27);
        assert_eq!(
            graph.remove_function(first, &mut sink),
            Err(FlyGraphError::UnknownFunction(first))
        );

        graph.clear(&mut sink);
        assert_eq!(sink.removed, 54);
        assert!(graph.functions().is_empty());
    }
}
