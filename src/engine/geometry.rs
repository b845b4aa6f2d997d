// Grid coordinates and ship footprints.

use serde::{Deserialize, Serialize};

/// A cell on a player's field. Signed so that out-of-range answers from
/// controllers can be represented and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn in_bounds(&self, width: u32, height: u32) -> bool {
        self.x >= 0 && self.y >= 0 && (self.x as i64) < width as i64 && (self.y as i64) < height as i64
    }

    /// The four orthogonal neighbours, without bounds checking.
    pub fn neighbours(&self) -> [Coordinates; 4] {
        [
            Coordinates::new(self.x + 1, self.y),
            Coordinates::new(self.x - 1, self.y),
            Coordinates::new(self.x, self.y + 1),
            Coordinates::new(self.x, self.y - 1),
        ]
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A ship as a controller places it: anchored at `location`, extending
/// `length` cells right (horizontal) or down (vertical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ship {
    pub length: u32,
    pub location: Coordinates,
    pub orientation: Orientation,
}

impl Ship {
    pub fn new(length: u32, location: Coordinates, orientation: Orientation) -> Self {
        Self {
            length,
            location,
            orientation,
        }
    }

    /// Cells occupied by the ship, in order from the anchor. Cells past
    /// `i32::MAX` cannot be represented and are left out.
    pub fn cells(&self) -> Vec<Coordinates> {
        (0..self.length)
            .map_while(|i| {
                let i = i32::try_from(i).ok()?;
                match self.orientation {
                    Orientation::Horizontal => {
                        Some(Coordinates::new(self.location.x.checked_add(i)?, self.location.y))
                    }
                    Orientation::Vertical => {
                        Some(Coordinates::new(self.location.x, self.location.y.checked_add(i)?))
                    }
                }
            })
            .collect()
    }

    /// Index of the section covering `at`, counted from the anchor.
    pub fn section(&self, at: Coordinates) -> Option<usize> {
        let offset = match self.orientation {
            Orientation::Horizontal if at.y == self.location.y => at.x as i64 - self.location.x as i64,
            Orientation::Vertical if at.x == self.location.x => at.y as i64 - self.location.y as i64,
            _ => return None,
        };
        (offset >= 0 && offset < self.length as i64).then_some(offset as usize)
    }

    pub fn occupies(&self, at: Coordinates) -> bool {
        self.section(at).is_some()
    }

    /// Whether every cell lies on a `width` x `height` field. Computed from
    /// the end points so no cell is built.
    pub fn in_bounds(&self, width: u32, height: u32) -> bool {
        if self.length == 0 {
            return false;
        }
        let (x, y) = (self.location.x as i64, self.location.y as i64);
        let last = self.length as i64 - 1;
        let (end_x, end_y) = match self.orientation {
            Orientation::Horizontal => (x + last, y),
            Orientation::Vertical => (x, y + last),
        };
        x >= 0 && y >= 0 && end_x < width as i64 && end_y < height as i64
    }
}
