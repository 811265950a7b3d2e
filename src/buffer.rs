use std::collections::HashMap;

use tracing::{debug, debug_span};

use crate::{
    cell::{CellCoord, SpatialIndex},
    chunk::{Chunk, Direction, NEIGHBORHOOD, NEIGHBORHOOD_SIZE},
    error::Result,
    graph::FunctionId,
    types::Point,
};

/// Produces the content of a chunk from its world-space origin.
///
/// Implementations must be deterministic for a given origin: the buffer builds
/// each cell once and keeps the result for as long as the cell stays in range.
pub trait MeshBuilder {
    type Content;

    fn build(&self, origin: Point) -> Result<Self::Content>;
}

/// Identifies a live chunk across every buffer that shares a [`SceneSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub function: FunctionId,
    pub cell: CellCoord,
}

/// Receives chunk additions and removals, e.g. a scene graph.
///
/// Within one [`ChunkBuffer::update`] every addition is reported before any removal.
pub trait SceneSink<C> {
    fn added(&mut self, key: ChunkKey, chunk: &Chunk<C>);

    /// Ownership of the evicted chunk passes to the sink.
    fn removed(&mut self, key: ChunkKey, chunk: Chunk<C>);
}

/// A sink that ignores every notification.
impl<C> SceneSink<C> for () {
    fn added(&mut self, _key: ChunkKey, _chunk: &Chunk<C>) {}

    fn removed(&mut self, _key: ChunkKey, _chunk: Chunk<C>) {}
}

/// What a single [`ChunkBuffer::update`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// The camera stayed in the same cell and every chunk was present.
    pub skipped: bool,
    pub built: usize,
    pub relabeled: usize,
    pub removed: usize,
    /// Cells whose build returned an error; they are retried on the next update.
    pub failed: usize,
}

impl UpdateReport {
    fn idle() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Total scene notifications issued.
    pub fn notifications(&self) -> usize {
        self.built + self.removed
    }
}

/// Keeps the 3×3×3 neighborhood of chunks around the camera alive.
///
/// ```text
///   camera cell changes
///     → generation += 1                    (every live chunk is now stale)
///     → for each of the 27 wanted cells:
///         live?   relabel direction, stamp generation
///         absent? builder.build(origin) → insert → sink.added
///     → evict chunks with an old generation → sink.removed
/// ```
pub struct ChunkBuffer<B: MeshBuilder> {
    owner: FunctionId,
    index: SpatialIndex,
    builder: B,
    chunks: HashMap<CellCoord, Chunk<B::Content>>,
    /// Camera cell of the last pass that ran.
    center: Option<CellCoord>,
    generation: u64,
}

impl<B: MeshBuilder> ChunkBuffer<B> {
    pub fn new(owner: FunctionId, index: SpatialIndex, builder: B) -> Self {
        Self {
            owner,
            index,
            builder,
            chunks: HashMap::with_capacity(NEIGHBORHOOD_SIZE),
            center: None,
            generation: 0,
        }
    }

    pub fn owner(&self) -> FunctionId {
        self.owner
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// `true` when every cell of the neighborhood has a chunk.
    pub fn is_complete(&self) -> bool {
        self.chunks.len() == NEIGHBORHOOD_SIZE
    }

    pub fn get(&self, cell: CellCoord) -> Option<&Chunk<B::Content>> {
        self.chunks.get(&cell)
    }

    /// Cell of the chunk labeled with [`Direction::CENTER`], if it is live.
    pub fn center(&self) -> Option<CellCoord> {
        self.chunks
            .values()
            .find(|chunk| chunk.direction.is_center())
            .map(Chunk::cell)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk<B::Content>> {
        self.chunks.values()
    }

    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Brings the live set in line with the neighborhood of `camera`.
    ///
    /// Does nothing while the camera stays inside the cell of the previous pass,
    /// unless `force_init` is set or a cell is still missing after a failed build.
    pub fn update(
        &mut self,
        camera: Point,
        force_init: bool,
        sink: &mut impl SceneSink<B::Content>,
    ) -> UpdateReport {
        let current = self.index.cell_of(camera);
        if !force_init && self.center == Some(current) && self.is_complete() {
            return UpdateReport::idle();
        }

        let _span = debug_span!("chunk_update", function = ?self.owner, ?current).entered();

        self.generation += 1;
        let generation = self.generation;
        let mut report = UpdateReport::default();

        for direction in NEIGHBORHOOD {
            let cell = current + direction;
            if let Some(chunk) = self.chunks.get_mut(&cell) {
                chunk.direction = direction;
                chunk.generation = generation;
                report.relabeled += 1;
                continue;
            }

            if self.build_chunk(cell, direction, sink) {
                report.built += 1;
            } else {
                report.failed += 1;
            }
        }

        let stale: Vec<CellCoord> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.generation != generation)
            .map(|(cell, _)| *cell)
            .collect();
        for cell in stale {
            if let Some(chunk) = self.chunks.remove(&cell) {
                sink.removed(self.key(cell), chunk);
                report.removed += 1;
            }
        }

        self.center = Some(current);
        debug!(
            built = report.built,
            relabeled = report.relabeled,
            removed = report.removed,
            failed = report.failed,
            "chunk buffer updated"
        );
        report
    }

    /// Evicts every chunk, notifying `sink` for each one.
    pub fn clear(&mut self, sink: &mut impl SceneSink<B::Content>) -> usize {
        let removed = self.chunks.len();
        for (cell, chunk) in self.chunks.drain() {
            sink.removed(
                ChunkKey {
                    function: self.owner,
                    cell,
                },
                chunk,
            );
        }
        self.center = None;
        removed
    }

    /// Builds and inserts the chunk for `cell`. Returns `false` if the builder failed.
    fn build_chunk(
        &mut self,
        cell: CellCoord,
        direction: Direction,
        sink: &mut impl SceneSink<B::Content>,
    ) -> bool {
        let origin = self.index.origin(cell);
        match self.builder.build(origin) {
            Ok(content) => {
                let chunk = Chunk::new(cell, direction, content, self.generation);
                sink.added(self.key(cell), &chunk);
                self.chunks.insert(cell, chunk);
                true
            }
            Err(err) => {
                log::warn!(
                    "chunk build failed for {:?} at {:?}: {err}",
                    self.owner,
                    cell
                );
                false
            }
        }
    }

    fn key(&self, cell: CellCoord) -> ChunkKey {
        ChunkKey {
            function: self.owner,
            cell,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{cell::SnapMode, error::FlyGraphError};

    /// Builds the origin itself and counts calls.
    struct OriginBuilder {
        calls: Cell<usize>,
    }

    impl MeshBuilder for OriginBuilder {
        type Content = Point;

        fn build(&self, origin: Point) -> Result<Point> {
            self.calls.set(self.calls.get() + 1);
            Ok(origin)
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Event {
        Added(CellCoord),
        Removed(CellCoord),
    }

    #[derive(Default)]
    struct Recorder {
        added: Vec<CellCoord>,
        removed: Vec<CellCoord>,
        events: Vec<Event>,
    }

    impl SceneSink<Point> for Recorder {
        fn added(&mut self, key: ChunkKey, _chunk: &Chunk<Point>) {
            self.added.push(key.cell);
            self.events.push(Event::Added(key.cell));
        }

        fn removed(&mut self, key: ChunkKey, _chunk: Chunk<Point>) {
            self.removed.push(key.cell);
            self.events.push(Event::Removed(key.cell));
        }
    }

    fn buffer(size: f32) -> ChunkBuffer<OriginBuilder> {
        ChunkBuffer::new(
            FunctionId(0),
            SpatialIndex::new(size, SnapMode::Truncate).unwrap(),
            OriginBuilder {
                calls: Cell::new(0),
            },
        )
    }

    #[test]
    fn forced_update_fills_the_neighborhood() {
        let mut buffer = buffer(5000.);
        let mut sink = Recorder::default();
        let report = buffer.update(Point::origin(), true, &mut sink);

        assert_eq!(report.built, 27);
        assert_eq!(buffer.len(), 27);
        assert_eq!(sink.added.len(), 27);
        assert_eq!(buffer.center(), Some(CellCoord::ORIGIN));
        for direction in NEIGHBORHOOD {
            let chunk = buffer.get(CellCoord::ORIGIN + direction).unwrap();
            assert_eq!(chunk.direction(), direction);
            assert_eq!(
                *chunk.content(),
                Point::new(
                    direction.x as f32 * 5000.,
                    direction.y as f32 * 5000.,
                    direction.z as f32 * 5000.
                )
            );
        }
    }

    #[test]
    fn same_cell_is_idle() {
        let mut buffer = buffer(100.);
        let mut sink = Recorder::default();
        buffer.update(Point::new(10., 10., 10.), true, &mut sink);
        let report = buffer.update(Point::new(99., 0., 50.), false, &mut sink);

        assert!(report.skipped);
        assert_eq!(report.notifications(), 0);
        assert_eq!(buffer.builder().calls.get(), 27);
    }

    #[test]
    fn first_unforced_update_still_builds() {
        let mut buffer = buffer(100.);
        let report = buffer.update(Point::origin(), false, &mut ());
        assert_eq!(report.built, 27);
    }

    #[test]
    fn forced_update_in_same_cell_only_relabels() {
        let mut buffer = buffer(100.);
        buffer.update(Point::origin(), true, &mut ());
        let report = buffer.update(Point::origin(), true, &mut ());
        assert_eq!(report.relabeled, 27);
        assert_eq!(report.built, 0);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn crossing_one_face_swaps_nine_chunks() {
        let mut buffer = buffer(5000.);
        let mut sink = Recorder::default();
        buffer.update(Point::origin(), true, &mut sink);
        sink.added.clear();
        sink.events.clear();

        let report = buffer.update(Point::new(5001., 0., 0.), false, &mut sink);
        let first_removal = sink
            .events
            .iter()
            .position(|e| matches!(e, Event::Removed(_)))
            .unwrap();
        assert_eq!(first_removal, 9);
        assert!(
            sink.events[first_removal..]
                .iter()
                .all(|e| matches!(e, Event::Removed(_)))
        );
        assert_eq!(report.built, 9);
        assert_eq!(report.removed, 9);
        assert_eq!(report.relabeled, 18);
        assert!(sink.removed.iter().all(|c| c.x == -1));
        assert!(sink.added.iter().all(|c| c.x == 2));
        assert_eq!(buffer.center(), Some(CellCoord::new(1, 0, 0)));
        assert_eq!(
            buffer.get(CellCoord::new(1, 0, 0)).unwrap().direction(),
            Direction::CENTER
        );
        assert_eq!(
            buffer.get(CellCoord::new(0, 1, -1)).unwrap().direction(),
            Direction::new(-1, 1, -1)
        );
    }

    #[test]
    fn clear_removes_everything() {
        let mut buffer = buffer(10.);
        let mut sink = Recorder::default();
        buffer.update(Point::origin(), true, &mut sink);
        assert_eq!(buffer.clear(&mut sink), 27);
        assert!(buffer.is_empty());
        assert_eq!(sink.removed.len(), 27);

        let report = buffer.update(Point::origin(), false, &mut sink);
        assert_eq!(report.built, 27);
    }

    #[test]
    fn far_positions_stream_without_overflow() {
        let mut buffer = buffer(1.);
        let mut sink = Recorder::default();
        let report = buffer.update(Point::new(1e30, 0., 0.), true, &mut sink);
        assert_eq!(report.built, 27);
        assert_eq!(buffer.len(), 27);

        let report = buffer.update(Point::new(f32::MAX, -f32::MAX, 0.), false, &mut sink);
        assert_eq!(buffer.len(), 27);
        assert_eq!(report.relabeled + report.built, 27);
        assert_eq!(
            buffer.center(),
            Some(CellCoord::new(CellCoord::MAX_INDEX, -CellCoord::MAX_INDEX, 0))
        );
    }

    struct FlakyBuilder {
        broken: Cell<bool>,
    }

    impl MeshBuilder for FlakyBuilder {
        type Content = ();

        fn build(&self, origin: Point) -> Result<()> {
            if self.broken.get() && origin.x > 0. {
                return Err(FlyGraphError::InvalidGridStep(0.));
            }
            Ok(())
        }
    }

    #[test]
    fn failed_builds_are_retried_while_wanted() {
        let mut buffer = ChunkBuffer::new(
            FunctionId(3),
            SpatialIndex::new(1., SnapMode::Truncate).unwrap(),
            FlakyBuilder {
                broken: Cell::new(true),
            },
        );

        let report = buffer.update(Point::origin(), true, &mut ());
        assert_eq!(report.failed, 9);
        assert_eq!(buffer.len(), 18);
        assert!(!buffer.is_complete());

        // Still missing, so the same cell is not idle.
        let report = buffer.update(Point::origin(), false, &mut ());
        assert!(!report.skipped);
        assert_eq!(report.failed, 9);

        buffer.builder().broken.set(false);
        let report = buffer.update(Point::origin(), false, &mut ());
        assert_eq!(report.built, 9);
        assert!(buffer.is_complete());
        assert!(buffer.update(Point::origin(), false, &mut ()).skipped);
    }
}
