use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::{
    chunk::Direction,
    error::{FlyGraphError, Result},
    types::{Point, Value},
};

/// Integer index of a cell in the chunk lattice.
///
/// The cell's world-space origin is `index * cell_size` on every axis, see
/// [`SpatialIndex::origin`]. Two coordinates are the same cell only when all
/// three components match exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl CellCoord {
    pub const ORIGIN: CellCoord = CellCoord::new(0, 0, 0);

    /// Largest index [`SpatialIndex::cell_of`] returns on any axis, so that every
    /// neighbor of a snapped cell is still representable.
    pub const MAX_INDEX: i64 = i64::MAX - 1;

    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

impl Add<Direction> for CellCoord {
    type Output = CellCoord;

    fn add(self, dir: Direction) -> CellCoord {
        CellCoord::new(
            self.x.saturating_add(dir.x as i64),
            self.y.saturating_add(dir.y as i64),
            self.z.saturating_add(dir.z as i64),
        )
    }
}

/// How a continuous coordinate is snapped onto the cell lattice.
///
/// ```text
///  position:   -7500   -2500    0    2500   7500      (cell size 5000)
///  Truncate:   -5000     0      0     0     5000
///  Floor:     -10000   -5000    0     0     5000
/// ```
///
/// `Truncate` snaps toward zero, so the cell straddling the origin is twice as
/// wide on each axis. It is the default because it reproduces the `p - p % size`
/// snapping that the rest of the tooling expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapMode {
    #[default]
    Truncate,
    Floor,
}

/// Maps positions to the cell containing them, for a fixed cell size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialIndex {
    cell_size: Value,
    snap: SnapMode,
}

impl Default for SpatialIndex {
    /// Matches [`GraphSettings::default`](crate::config::GraphSettings).
    fn default() -> Self {
        Self {
            cell_size: 5000.,
            snap: SnapMode::Truncate,
        }
    }
}

impl SpatialIndex {
    /// Returns [`FlyGraphError::InvalidCellSize`] unless `cell_size` is finite and `> 0`.
    pub fn new(cell_size: Value, snap: SnapMode) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0. {
            return Err(FlyGraphError::InvalidCellSize(cell_size));
        }
        Ok(Self { cell_size, snap })
    }

    pub fn cell_size(&self) -> Value {
        self.cell_size
    }

    pub fn snap(&self) -> SnapMode {
        self.snap
    }

    /// Returns the cell containing `position`.
    pub fn cell_of(&self, position: Point) -> CellCoord {
        CellCoord::new(
            self.snap_axis(position.x),
            self.snap_axis(position.y),
            self.snap_axis(position.z),
        )
    }

    /// World-space origin (minimum corner) of `cell`.
    pub fn origin(&self, cell: CellCoord) -> Point {
        Point::new(
            cell.x as Value * self.cell_size,
            cell.y as Value * self.cell_size,
            cell.z as Value * self.cell_size,
        )
    }

    /// Snapped position: the origin of the cell containing `position`.
    #[inline]
    pub fn snap_position(&self, position: Point) -> Point {
        self.origin(self.cell_of(position))
    }

    #[inline]
    fn snap_axis(&self, v: Value) -> i64 {
        // Non-finite input lands in the origin cell rather than saturating far away.
        if !v.is_finite() {
            return 0;
        }
        let q = v / self.cell_size;
        let index = match self.snap {
            SnapMode::Truncate => q.trunc() as i64,
            SnapMode::Floor => q.floor() as i64,
        };
        index.clamp(-CellCoord::MAX_INDEX, CellCoord::MAX_INDEX)
    }
}
