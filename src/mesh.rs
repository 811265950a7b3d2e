use std::sync::Arc;

use crate::types::{Point, Vector};

/// Which part of a styled chunk a mesh draws. Determines its primitive topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Line segments, two vertices per segment.
    Lines,
    /// One point per vertex.
    Dots,
    /// Flat shaded triangles, three vertices per triangle.
    Plates,
}

/// CPU geometry for one [`Layer`] of a chunk, ready to be uploaded as a Bevy mesh.
///
/// Vertices are in world space. `normals` is empty for [`Layer::Lines`] and
/// [`Layer::Dots`], otherwise it holds one normal per vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedMesh {
    pub layer: Layer,
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl GeneratedMesh {
    /// A segment list. `vertices` must hold an even number of points.
    pub fn lines(vertices: Vec<[f32; 3]>) -> Self {
        debug_assert_eq!(vertices.len() % 2, 0);
        Self::sequential(Layer::Lines, vertices, Vec::new())
    }

    pub fn dots(vertices: Vec<[f32; 3]>) -> Self {
        Self::sequential(Layer::Dots, vertices, Vec::new())
    }

    /// A triangle list where every three consecutive vertices form one triangle.
    ///
    /// Normals are computed per face and repeated for each of its three vertices.
    pub fn plates(vertices: Vec<[f32; 3]>) -> Self {
        debug_assert_eq!(vertices.len() % 3, 0);
        let normals = vertices
            .chunks_exact(3)
            .flat_map(|tri| {
                let n = face_normal(tri[0], tri[1], tri[2]);
                [[n.x, n.y, n.z]; 3]
            })
            .collect();
        Self::sequential(Layer::Plates, vertices, normals)
    }

    fn sequential(layer: Layer, vertices: Vec<[f32; 3]>, normals: Vec<[f32; 3]>) -> Self {
        let indices = (0..vertices.len() as u32).collect();
        Self {
            layer,
            vertices,
            normals,
            indices,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Number of primitives (segments, points or triangles).
    pub fn primitive_count(&self) -> usize {
        match self.layer {
            Layer::Lines => self.indices.len() / 2,
            Layer::Dots => self.indices.len(),
            Layer::Plates => self.indices.len() / 3,
        }
    }
}

/// Unit normal of triangle `(a, b, c)` as `(c - b) × (a - b)`.
///
/// Returns the zero vector if the triangle is degenerate.
pub fn face_normal(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Vector {
    let a = Point::from(a);
    let b = Point::from(b);
    let c = Point::from(c);

    let cb = c - b;
    let ab = a - b;
    let cross = cb.cross(&ab);

    let nrm = cross.norm();
    if nrm == 0.0 {
        Vector::zeros()
    } else {
        cross / nrm
    }
}

/// Everything built for one chunk: one mesh per visible layer.
///
/// Layers are shared behind [`Arc`] so a scene can keep the geometry without copying it.
#[derive(Clone, Debug, Default)]
pub struct ChunkGeometry {
    pub layers: Vec<Arc<GeneratedMesh>>,
}

impl ChunkGeometry {
    pub fn push(&mut self, mesh: GeneratedMesh) {
        if !mesh.is_empty() {
            self.layers.push(Arc::new(mesh));
        }
    }

    pub fn layer(&self, layer: Layer) -> Option<&GeneratedMesh> {
        self.layers
            .iter()
            .find(|mesh| mesh.layer == layer)
            .map(Arc::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
