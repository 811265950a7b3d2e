use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use ndarray::{Array2, Zip};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    buffer::MeshBuilder,
    config::{FunctionOptions, Style},
    error::{FlyGraphError, Result},
    mesh::{ChunkGeometry, GeneratedMesh},
    types::{Point, SurfaceFunction, Value},
};

/// Upper bound on samples along one axis of a chunk.
///
/// Geometry grows with the square of this, so a tiny grid step against a large
/// chunk is rejected instead of stalling the frame.
pub const MAX_SAMPLES_PER_AXIS: usize = 4096;

/// Layers a style draws, resolved once from [`FunctionOptions`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StylePlan {
    /// Lines of constant `x`, running along `z`.
    pub x_lines: bool,
    /// Lines of constant `z`, running along `x`.
    pub z_lines: bool,
    pub dots: bool,
    pub plates: bool,
}

impl StylePlan {
    pub fn resolve(options: &FunctionOptions) -> Self {
        let lines = options.lines.visible;
        let (x_lines, z_lines, plates) = match options.style {
            Style::Grid => (true, true, false),
            Style::XLines => (true, false, false),
            Style::ZLines => (false, true, false),
            Style::Plates => (lines, lines, true),
        };
        Self {
            x_lines,
            z_lines,
            dots: options.dots.visible,
            plates,
        }
    }
}

/// Builds the styled surface of one function for a chunk.
///
/// Heights are sampled on a square lattice starting at the chunk origin:
///
/// ```text
///  z ^   offsets[j]
///    |   *----*----*-*      the last offset is clamped to the chunk edge,
///    |   |    |    | |      so neighbors share their boundary samples
///    |   *----*----*-*
///    |   |    |    | |
///    |   *----*----*-*
///    +-------------------> x   offsets[i]
/// ```
///
/// Each sample is `f(x / scale, z / scale) * scale`.
pub struct SurfaceMesher {
    function: Arc<SurfaceFunction>,
    options: FunctionOptions,
    plan: StylePlan,
    scale: Value,
    /// Sample offsets from the chunk origin, shared by both axes.
    offsets: Vec<Value>,
    cell_size: Value,
}

impl SurfaceMesher {
    pub fn new(
        function: Arc<SurfaceFunction>,
        options: FunctionOptions,
        cell_size: Value,
        scale: Value,
    ) -> Result<Self> {
        options.validate()?;
        if !scale.is_finite() || scale == 0. {
            return Err(FlyGraphError::InvalidScale(scale));
        }
        let offsets = sample_offsets(cell_size, options.grid_step)?;
        Ok(Self {
            function,
            plan: StylePlan::resolve(&options),
            options,
            scale,
            offsets,
            cell_size,
        })
    }

    pub fn options(&self) -> &FunctionOptions {
        &self.options
    }

    pub fn plan(&self) -> StylePlan {
        self.plan
    }

    /// Samples per axis.
    pub fn resolution(&self) -> usize {
        self.offsets.len()
    }

    /// Height of the scaled surface at world position `(x, z)`.
    #[inline]
    pub fn height(&self, x: Value, z: Value) -> Value {
        (self.function)(x / self.scale, z / self.scale) * self.scale
    }

    /// Samples the surface over the chunk at `origin`, indexed `[x][z]`.
    ///
    /// A panic inside the user function fails this chunk only.
    fn sample(&self, origin: Point) -> Result<Array2<Value>> {
        let n = self.offsets.len();
        let mut heights = Array2::zeros((n, n));
        catch_unwind(AssertUnwindSafe(|| {
            Zip::indexed(&mut heights).par_for_each(|(i, j), h| {
                *h = self.height(origin.x + self.offsets[i], origin.z + self.offsets[j]);
            });
        }))
        .map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            FlyGraphError::FunctionPanicked(message)
        })?;
        Ok(heights)
    }

    /// Number of offsets strictly inside the chunk, i.e. excluding the far edge.
    fn interior(&self) -> usize {
        let last = self.offsets.len() - 1;
        if self.offsets[last] >= self.cell_size {
            last
        } else {
            self.offsets.len()
        }
    }

    fn vertex(&self, origin: Point, heights: &Array2<Value>, i: usize, j: usize) -> [f32; 3] {
        [
            origin.x + self.offsets[i],
            heights[[i, j]],
            origin.z + self.offsets[j],
        ]
    }

    fn x_lines(&self, origin: Point, heights: &Array2<Value>, out: &mut Vec<[f32; 3]>) {
        let n = self.offsets.len();
        for i in 0..self.interior() {
            for j in 0..n - 1 {
                out.push(self.vertex(origin, heights, i, j));
                out.push(self.vertex(origin, heights, i, j + 1));
            }
        }
    }

    fn z_lines(&self, origin: Point, heights: &Array2<Value>, out: &mut Vec<[f32; 3]>) {
        let n = self.offsets.len();
        for j in 0..self.interior() {
            for i in 0..n - 1 {
                out.push(self.vertex(origin, heights, i, j));
                out.push(self.vertex(origin, heights, i + 1, j));
            }
        }
    }

    fn dots(&self, origin: Point, heights: &Array2<Value>) -> Vec<[f32; 3]> {
        let inner = self.interior();
        (0..inner)
            .flat_map(|i| (0..inner).map(move |j| (i, j)))
            .map(|(i, j)| self.vertex(origin, heights, i, j))
            .collect()
    }

    /// Two triangles per lattice cell, parallelised over X columns:
    ///
    /// ```text
    ///  (i, j+1) C----* (i+1, j+1)     first:  A(i, j)   B(i+1, j) C(i, j+1)
    ///           | \  |                second: B(i+1, j) (i+1, j+1) C(i, j+1)
    ///           |  \ |
    ///    (i, j) A----B (i+1, j)
    /// ```
    fn plates(&self, origin: Point, heights: &Array2<Value>) -> Vec<[f32; 3]> {
        let n = self.offsets.len();
        let per_x: Vec<Vec<[f32; 3]>> = (0..n - 1)
            .into_par_iter()
            .map(|i| {
                let mut local = Vec::with_capacity((n - 1) * 6);
                for j in 0..n - 1 {
                    let a = self.vertex(origin, heights, i, j);
                    let b = self.vertex(origin, heights, i + 1, j);
                    let c = self.vertex(origin, heights, i, j + 1);
                    let d = self.vertex(origin, heights, i + 1, j + 1);
                    local.extend([a, b, c, b, d, c]);
                }
                local
            })
            .collect();

        let total: usize = per_x.iter().map(Vec::len).sum();
        let mut vertices = Vec::with_capacity(total);
        for mut v in per_x {
            vertices.append(&mut v);
        }
        vertices
    }
}

impl MeshBuilder for SurfaceMesher {
    type Content = ChunkGeometry;

    fn build(&self, origin: Point) -> Result<ChunkGeometry> {
        let heights = self.sample(origin)?;
        let mut geometry = ChunkGeometry::default();

        if self.plan.x_lines || self.plan.z_lines {
            let mut segments = Vec::new();
            if self.plan.x_lines {
                self.x_lines(origin, &heights, &mut segments);
            }
            if self.plan.z_lines {
                self.z_lines(origin, &heights, &mut segments);
            }
            geometry.push(GeneratedMesh::lines(segments));
        }
        if self.plan.dots {
            geometry.push(GeneratedMesh::dots(self.dots(origin, &heights)));
        }
        if self.plan.plates {
            geometry.push(GeneratedMesh::plates(self.plates(origin, &heights)));
        }

        Ok(geometry)
    }
}

/// Offsets `0, step, 2·step, …` up to and including `cell_size`, the last one clamped to it.
pub fn sample_offsets(cell_size: Value, step: Value) -> Result<Vec<Value>> {
    if !cell_size.is_finite() || cell_size <= 0. {
        return Err(FlyGraphError::InvalidCellSize(cell_size));
    }
    if !step.is_finite() || step <= 0. {
        return Err(FlyGraphError::InvalidGridStep(step));
    }
    let cells = (cell_size / step).ceil();
    if cells >= MAX_SAMPLES_PER_AXIS as Value {
        return Err(FlyGraphError::TooManySamples(cells as usize + 1));
    }
    let cells = cells as usize;
    Ok((0..=cells)
        .map(|i| (i as Value * step).min(cell_size))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::ChunkBuffer,
        cell::{SnapMode, SpatialIndex},
        graph::FunctionId,
        mesh::Layer,
    };

    fn mesher(style: Style, f: impl Fn(f32, f32) -> f32 + Send + Sync + 'static) -> SurfaceMesher {
        let options = FunctionOptions {
            style,
            grid_step: 50.,
            ..Default::default()
        };
        SurfaceMesher::new(Arc::new(f), options, 100., 1.).unwrap()
    }

    #[test]
    fn offsets_are_clamped_to_the_chunk_edge() {
        assert_eq!(sample_offsets(100., 50.).unwrap(), vec![0., 50., 100.]);
        assert_eq!(sample_offsets(100., 40.).unwrap(), vec![0., 40., 80., 100.]);
        assert_eq!(sample_offsets(10., 20.).unwrap(), vec![0., 10.]);
    }

    #[test]
    fn offsets_reject_runaway_resolution() {
        assert!(matches!(
            sample_offsets(5000., 0.01),
            Err(FlyGraphError::TooManySamples(_))
        ));
        assert_eq!(sample_offsets(1., 0.), Err(FlyGraphError::InvalidGridStep(0.)));
    }

    #[test]
    fn grid_draws_both_line_families() {
        let geometry = mesher(Style::Grid, |_, _| 0.)
            .build(Point::origin())
            .unwrap();
        let lines = geometry.layer(Layer::Lines).unwrap();
        // 2 interior lines per family, 2 segments each.
        assert_eq!(lines.primitive_count(), 8);
        assert!(geometry.layer(Layer::Plates).is_none());
        assert!(geometry.layer(Layer::Dots).is_none());
    }

    #[test]
    fn x_lines_keep_x_constant_per_segment() {
        let geometry = mesher(Style::XLines, |x, z| x + z)
            .build(Point::new(100., 0., -100.))
            .unwrap();
        let lines = geometry.layer(Layer::Lines).unwrap();
        assert_eq!(lines.primitive_count(), 4);
        for seg in lines.vertices.chunks_exact(2) {
            assert_eq!(seg[0][0], seg[1][0]);
            assert!(seg[1][2] > seg[0][2]);
            assert_eq!(seg[0][1], seg[0][0] + seg[0][2]);
        }
    }

    #[test]
    fn z_lines_keep_z_constant_per_segment() {
        let geometry = mesher(Style::ZLines, |_, _| 1.)
            .build(Point::origin())
            .unwrap();
        let lines = geometry.layer(Layer::Lines).unwrap();
        for seg in lines.vertices.chunks_exact(2) {
            assert_eq!(seg[0][2], seg[1][2]);
            assert!(seg[1][0] > seg[0][0]);
        }
    }

    #[test]
    fn plates_cover_every_cell_with_two_triangles() {
        let geometry = mesher(Style::Plates, |_, _| 0.)
            .build(Point::origin())
            .unwrap();
        let plates = geometry.layer(Layer::Plates).unwrap();
        assert_eq!(plates.primitive_count(), 2 * 2 * 2);
        assert_eq!(plates.normals.len(), plates.vertices.len());
        // Lines stay visible under plates by default.
        assert!(geometry.layer(Layer::Lines).is_some());
    }

    #[test]
    fn plates_without_lines() {
        let options = FunctionOptions::from_toml_str(
            "style = 'plates'\ngrid_step = 50.0\nlines = { visible = false }",
        )
        .unwrap();
        let plan = StylePlan::resolve(&options);
        assert!(plan.plates && !plan.x_lines && !plan.z_lines);
    }

    #[test]
    fn dots_skip_the_far_edge() {
        let options = FunctionOptions {
            grid_step: 50.,
            dots: crate::config::DotsOptions {
                visible: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mesher = SurfaceMesher::new(Arc::new(|_: f32, _: f32| 0.), options, 100., 1.).unwrap();
        let geometry = mesher.build(Point::new(0., 500., 0.)).unwrap();
        let dots = geometry.layer(Layer::Dots).unwrap();
        assert_eq!(dots.primitive_count(), 4);
        assert!(dots.vertices.iter().all(|v| v[0] < 100. && v[2] < 100.));
    }

    #[test]
    fn scale_applies_to_input_and_output() {
        let options = FunctionOptions::default();
        let mesher = SurfaceMesher::new(Arc::new(|x: f32, z: f32| x * z), options, 100., 2.).unwrap();
        assert_eq!(mesher.height(4., 6.), 2. * 3. * 2.);
    }

    #[test]
    fn height_ignores_chunk_altitude() {
        let mesher = mesher(Style::Grid, |x, _| x);
        let low = mesher.build(Point::new(0., -100., 0.)).unwrap();
        let high = mesher.build(Point::new(0., 100., 0.)).unwrap();
        assert_eq!(low.layers, high.layers);
    }

    #[test]
    fn panicking_function_fails_only_its_chunks() {
        let positive_x_panics = |x: f32, _: f32| {
            if x > 0. {
                panic!("undefined for positive x");
            }
            -x
        };
        let err = mesher(Style::Grid, positive_x_panics)
            .build(Point::origin())
            .unwrap_err();
        assert_eq!(
            err,
            FlyGraphError::FunctionPanicked("undefined for positive x".into())
        );

        let mut buffer = ChunkBuffer::new(
            FunctionId(0),
            SpatialIndex::new(100., SnapMode::Truncate).unwrap(),
            mesher(Style::Grid, positive_x_panics),
        );
        let report = buffer.update(Point::origin(), true, &mut ());
        assert_eq!(report.built, 9);
        assert_eq!(report.failed, 18);
        assert!(buffer.cells().all(|cell| cell.x == -1));
    }
}
