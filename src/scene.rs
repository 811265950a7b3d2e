use std::collections::HashMap;

use bevy::{
    asset::RenderAssetUsages,
    ecs::system::SystemParam,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
};

use crate::{
    buffer::{ChunkKey, SceneSink},
    chunk::Chunk,
    config::{FunctionOptions, parse_hex_color},
    graph::{FunctionId, Graph},
    mesh::{ChunkGeometry, GeneratedMesh, Layer},
};

/// Root entity of one streamed chunk. Its children carry one [`Mesh3d`] per [`Layer`].
#[derive(Component, Clone, Copy, Debug)]
#[require(Transform, Visibility)]
pub struct ChunkRoot {
    pub key: ChunkKey,
}

/// Marks a child of a [`ChunkRoot`] with the layer it draws.
#[derive(Component, Clone, Copy, Debug)]
pub struct ChunkLayer(pub Layer);

/// Live chunk entities, keyed by function and cell.
#[derive(Resource, Default)]
pub struct ChunkEntities(pub HashMap<ChunkKey, Entity>);

impl ChunkEntities {
    pub fn get(&self, key: &ChunkKey) -> Option<Entity> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Materials of one function, created from its [`FunctionOptions`] colors.
///
/// Line and dot widths have no equivalent in the standard pipeline and are not applied.
#[derive(Clone, Debug)]
pub struct Palette {
    pub lines: Handle<StandardMaterial>,
    pub dots: Handle<StandardMaterial>,
    pub plates: Handle<StandardMaterial>,
}

impl Palette {
    fn new(options: &FunctionOptions, materials: &mut Assets<StandardMaterial>) -> Self {
        let color = |hex: &str| match parse_hex_color(hex) {
            Ok([r, g, b]) => Color::srgb(r, g, b),
            Err(err) => {
                warn!("palette: {err}, falling back to white");
                Color::WHITE
            }
        };
        let flat = |hex: &str| StandardMaterial {
            base_color: color(hex),
            unlit: true,
            ..default()
        };
        Self {
            lines: materials.add(flat(&options.lines.color)),
            dots: materials.add(flat(&options.dots.color)),
            plates: materials.add(StandardMaterial {
                base_color: color(&options.plates.color),
                double_sided: true,
                cull_mode: None,
                ..default()
            }),
        }
    }

    fn material(&self, layer: Layer) -> Handle<StandardMaterial> {
        match layer {
            Layer::Lines => self.lines.clone(),
            Layer::Dots => self.dots.clone(),
            Layer::Plates => self.plates.clone(),
        }
    }
}

/// One [`Palette`] per registered function.
#[derive(Resource, Default)]
pub struct StylePalettes(pub HashMap<FunctionId, Palette>);

/// The ECS side of a [`Graph`]: spawns and despawns chunk entities.
///
/// Pass it to any [`Graph`] operation that takes a [`SceneSink`]:
///
/// ```rust,ignore
/// fn reset(mut graph: ResMut<Graph>, mut scene: GraphScene) {
///     graph.clear(&mut scene);
/// }
/// ```
#[derive(SystemParam)]
pub struct GraphScene<'w, 's> {
    commands: Commands<'w, 's>,
    meshes: ResMut<'w, Assets<Mesh>>,
    materials: ResMut<'w, Assets<StandardMaterial>>,
    entities: ResMut<'w, ChunkEntities>,
    palettes: ResMut<'w, StylePalettes>,
}

impl GraphScene<'_, '_> {
    /// Creates palettes for newly registered functions and drops those of removed ones.
    pub fn sync_palettes(&mut self, graph: &Graph) {
        let palettes = &mut self.palettes.0;
        palettes.retain(|id, _| graph.function(*id).is_some());
        for function in graph.functions() {
            palettes
                .entry(function.id())
                .or_insert_with(|| Palette::new(function.options(), &mut self.materials));
        }
    }

    fn palette(&mut self, id: FunctionId) -> Palette {
        let materials = &mut self.materials;
        self.palettes
            .0
            .entry(id)
            .or_insert_with(|| Palette::new(&FunctionOptions::default(), materials))
            .clone()
    }
}

impl SceneSink<ChunkGeometry> for GraphScene<'_, '_> {
    fn added(&mut self, key: ChunkKey, chunk: &Chunk<ChunkGeometry>) {
        let palette = self.palette(key.function);
        let layers: Vec<(Handle<Mesh>, Handle<StandardMaterial>, Layer)> = chunk
            .content()
            .layers
            .iter()
            .map(|layer| {
                (
                    self.meshes.add(to_bevy_mesh(layer)),
                    palette.material(layer.layer),
                    layer.layer,
                )
            })
            .collect();

        let entity = self
            .commands
            .spawn(ChunkRoot { key })
            .with_children(|parent| {
                for (mesh, material, layer) in layers {
                    parent.spawn((Mesh3d(mesh), MeshMaterial3d(material), ChunkLayer(layer)));
                }
            })
            .id();

        if let Some(previous) = self.entities.0.insert(key, entity) {
            // Only possible if a sink is shared by two graphs with colliding ids.
            warn!("chunk {key:?} was already spawned, replacing {previous}");
            self.commands.entity(previous).despawn();
        }
    }

    fn removed(&mut self, key: ChunkKey, _chunk: Chunk<ChunkGeometry>) {
        match self.entities.0.remove(&key) {
            Some(entity) => self.commands.entity(entity).despawn(),
            None => debug!("chunk {key:?} had no entity"),
        }
    }
}

fn topology(layer: Layer) -> PrimitiveTopology {
    match layer {
        Layer::Lines => PrimitiveTopology::LineList,
        Layer::Dots => PrimitiveTopology::PointList,
        Layer::Plates => PrimitiveTopology::TriangleList,
    }
}

/// Copies a [`GeneratedMesh`] into a Bevy [`Mesh`].
pub fn to_bevy_mesh(generated: &GeneratedMesh) -> Mesh {
    let mut mesh = Mesh::new(
        topology(generated.layer),
        RenderAssetUsages::RENDER_WORLD,
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, generated.vertices.clone());
    if !generated.normals.is_empty() {
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, generated.normals.clone());
    }
    mesh.insert_indices(Indices::U32(generated.indices.clone()));
    mesh
}
