//! The classic arena grid.

use shared::{FieldState, Tile, Vec2, FIELD_HEIGHT, FIELD_WIDTH};

/// Fixed-size tile grid. Cells outside the grid read as walls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl Field {
    /// Standard layout: solid border plus a wall on every even/even cell.
    ///
    /// Boxes are not placed; every other cell starts as air.
    pub fn new() -> Self {
        let mut field = Self {
            width: FIELD_WIDTH,
            height: FIELD_HEIGHT,
            tiles: vec![Tile::Air; (FIELD_WIDTH * FIELD_HEIGHT) as usize],
        };

        for y in 0..field.height {
            for x in 0..field.width {
                let border = x == 0 || y == 0 || x == field.width - 1 || y == field.height - 1;
                if border || (x % 2 == 0 && y % 2 == 0) {
                    field.set(Vec2::new(x, y), Tile::Wall);
                }
            }
        }

        field
    }

    fn index(&self, pos: Vec2) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        Some((pos.y * self.width + pos.x) as usize)
    }

    pub fn get(&self, pos: Vec2) -> Tile {
        self.index(pos).map_or(Tile::Wall, |i| self.tiles[i])
    }

    /// Writes a tile; out-of-range positions are ignored.
    pub fn set(&mut self, pos: Vec2, tile: Tile) {
        if let Some(i) = self.index(pos) {
            self.tiles[i] = tile;
        }
    }

    /// Whether a player may not step onto the cell.
    pub fn is_blocked(&self, pos: Vec2) -> bool {
        matches!(self.get(pos), Tile::Wall | Tile::Box)
    }

    pub fn to_state(&self) -> FieldState {
        FieldState {
            width: self.width,
            height: self.height,
            field: self.tiles.clone(),
        }
    }
}

impl Default for Field {
    fn default() -> Self {
        Self::new()
    }
}
