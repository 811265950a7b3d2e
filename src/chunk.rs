use crate::cell::CellCoord;

/// Offset of a chunk from the camera's cell, in cell units.
///
/// Each component is one of `-1`, `0`, `1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Direction {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl Direction {
    /// The camera's own cell.
    pub const CENTER: Direction = Direction::new(0, 0, 0);

    pub const fn new(x: i8, y: i8, z: i8) -> Self {
        Self { x, y, z }
    }

    pub fn is_center(&self) -> bool {
        *self == Self::CENTER
    }
}

/// Number of cells in the 3×3×3 neighborhood around the camera.
pub const NEIGHBORHOOD_SIZE: usize = 27;

/// Every direction of the neighborhood, x outermost then y then z:
///
/// ```text
/// (-1,-1,-1) (-1,-1,0) (-1,-1,1) (-1,0,-1) ... (1,1,1)
/// ```
pub const NEIGHBORHOOD: [Direction; NEIGHBORHOOD_SIZE] = neighborhood();

const fn neighborhood() -> [Direction; NEIGHBORHOOD_SIZE] {
    let mut out = [Direction::CENTER; NEIGHBORHOOD_SIZE];
    let mut i = 0;
    while i < NEIGHBORHOOD_SIZE {
        out[i] = Direction::new(
            (i / 9) as i8 - 1,
            ((i / 3) % 3) as i8 - 1,
            (i % 3) as i8 - 1,
        );
        i += 1;
    }
    out
}

/// A streamed piece of the surface.
///
/// `cell` never changes once the chunk is built; `direction` is relabeled every
/// time the camera moves to another cell. `content` is whatever the
/// [`MeshBuilder`](crate::buffer::MeshBuilder) produced and stays owned by the
/// [`ChunkBuffer`](crate::buffer::ChunkBuffer) until the chunk is evicted.
#[derive(Debug)]
pub struct Chunk<C> {
    cell: CellCoord,
    pub(crate) direction: Direction,
    pub(crate) content: C,
    /// Pass that last confirmed this chunk; older than the buffer's current pass means stale.
    pub(crate) generation: u64,
}

impl<C> Chunk<C> {
    pub(crate) fn new(cell: CellCoord, direction: Direction, content: C, generation: u64) -> Self {
        Self {
            cell,
            direction,
            content,
            generation,
        }
    }

    pub fn cell(&self) -> CellCoord {
        self.cell
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    /// Consumes the chunk and returns its content.
    pub fn into_content(self) -> C {
        self.content
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn neighborhood_is_every_unit_offset_once() {
        let unique: HashSet<Direction> = NEIGHBORHOOD.iter().copied().collect();
        assert_eq!(unique.len(), NEIGHBORHOOD_SIZE);
        assert!(
            NEIGHBORHOOD
                .iter()
                .all(|d| [d.x, d.y, d.z].iter().all(|c| (-1..=1).contains(c)))
        );
    }

    #[test]
    fn neighborhood_order_is_x_major() {
        assert_eq!(NEIGHBORHOOD[0], Direction::new(-1, -1, -1));
        assert_eq!(NEIGHBORHOOD[1], Direction::new(-1, -1, 0));
        assert_eq!(NEIGHBORHOOD[3], Direction::new(-1, 0, -1));
        assert_eq!(NEIGHBORHOOD[13], Direction::CENTER);
        assert_eq!(NEIGHBORHOOD[26], Direction::new(1, 1, 1));
    }
}
