// Per-player board: placed ships, shots fired and shots received.

use serde::{Deserialize, Serialize};

use super::config::MatchConfig;
use super::error::PlacementError;
use super::geometry::{Coordinates, Ship};
use super::player::PlayerId;

/// A shot as issued by a shooter at a receiver's field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shot {
    pub shooter: PlayerId,
    pub receiver: PlayerId,
    pub coords: Coordinates,
}

/// What a controller answers from `make_shot`: who to fire at and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub receiver: PlayerId,
    pub coords: Coordinates,
}

impl Target {
    pub fn new(receiver: PlayerId, coords: Coordinates) -> Self {
        Self { receiver, coords }
    }
}

/// Result of resolving a shot against a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    Miss,
    Hit { ship_index: usize, sunk: bool },
}

/// A ship on the field together with which of its cells have been hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedShip {
    pub ship: Ship,
    pub hits: Vec<bool>,
}

impl PlacedShip {
    pub fn new(ship: Ship) -> Self {
        Self {
            hits: vec![false; ship.length as usize],
            ship,
        }
    }

    pub fn is_sunk(&self) -> bool {
        self.hits.iter().all(|&h| h)
    }

    fn section(&self, at: Coordinates) -> Option<usize> {
        self.ship.section(at).filter(|&i| i < self.hits.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub ships: Vec<PlacedShip>,
    pub shots_fired: Vec<Shot>,
    pub shots_received: Vec<Shot>,
}

impl Field {
    pub fn clear(&mut self) {
        self.ships.clear();
        self.shots_fired.clear();
        self.shots_received.clear();
    }

    pub fn place(&mut self, ships: &[Ship]) {
        self.ships = ships.iter().copied().map(PlacedShip::new).collect();
    }

    /// A field with no ships left afloat. An empty fleet also counts.
    pub fn fleet_destroyed(&self) -> bool {
        self.ships.iter().all(PlacedShip::is_sunk)
    }

    pub fn ships_afloat(&self) -> usize {
        self.ships.iter().filter(|s| !s.is_sunk()).count()
    }

    pub fn has_fired_at(&self, receiver: PlayerId, at: Coordinates) -> bool {
        self.shots_fired
            .iter()
            .any(|s| s.receiver == receiver && s.coords == at)
    }

    /// Work out what a shot at `at` would do, without changing the field.
    pub fn resolve(&self, at: Coordinates) -> ShotOutcome {
        for (index, placed) in self.ships.iter().enumerate() {
            if let Some(section) = placed.section(at) {
                let sunk = !placed.is_sunk()
                    && placed
                        .hits
                        .iter()
                        .enumerate()
                        .all(|(i, &hit)| hit || i == section);
                return ShotOutcome::Hit {
                    ship_index: index,
                    sunk,
                };
            }
        }
        ShotOutcome::Miss
    }

    /// Mark the section at `at` of ship `ship_index` as hit. Returns false if
    /// the ship does not cover that cell.
    pub fn mark_hit(&mut self, ship_index: usize, at: Coordinates) -> bool {
        let Some(placed) = self.ships.get_mut(ship_index) else {
            return false;
        };
        match placed.section(at) {
            Some(section) => {
                placed.hits[section] = true;
                true
            }
            None => false,
        }
    }
}

/// Check a layout against the configured fleet and field bounds.
///
/// Lengths are compared as a multiset so controllers may return ships in any
/// order.
pub fn validate_placement(config: &MatchConfig, ships: &[Ship]) -> Result<(), PlacementError> {
    let mut expected = config.starting_ships.clone();
    let mut found: Vec<u32> = ships.iter().map(|s| s.length).collect();
    expected.sort_unstable();
    found.sort_unstable();
    if expected != found {
        return Err(PlacementError::WrongFleet { expected, found });
    }

    for (index, ship) in ships.iter().enumerate() {
        if !ship.in_bounds(config.field_width, config.field_height) {
            return Err(PlacementError::OutOfBounds { index });
        }
    }

    for (first, a) in ships.iter().enumerate() {
        for (offset, b) in ships[first + 1..].iter().enumerate() {
            if let Some(&at) = a.cells().iter().find(|&&c| b.occupies(c)) {
                return Err(PlacementError::Overlap {
                    first,
                    second: first + 1 + offset,
                    at,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geometry::Orientation;

    fn small_config() -> MatchConfig {
        MatchConfig {
            field_width: 5,
            field_height: 5,
            starting_ships: vec![2, 3],
            ..MatchConfig::default()
        }
    }

    #[test]
    fn test_valid_placement() {
        let ships = vec![
            Ship::new(3, Coordinates::new(0, 0), Orientation::Horizontal),
            Ship::new(2, Coordinates::new(4, 3), Orientation::Vertical),
        ];
        assert_eq!(validate_placement(&small_config(), &ships), Ok(()));
    }

    #[test]
    fn test_wrong_fleet() {
        let ships = vec![Ship::new(3, Coordinates::new(0, 0), Orientation::Horizontal)];
        assert!(matches!(
            validate_placement(&small_config(), &ships),
            Err(PlacementError::WrongFleet { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let ships = vec![
            Ship::new(2, Coordinates::new(0, 0), Orientation::Horizontal),
            Ship::new(3, Coordinates::new(0, 3), Orientation::Vertical),
        ];
        assert_eq!(
            validate_placement(&small_config(), &ships),
            Err(PlacementError::OutOfBounds { index: 1 })
        );
    }

    #[test]
    fn test_anchor_at_i32_max_is_out_of_bounds() {
        let ships = vec![
            Ship::new(2, Coordinates::new(i32::MAX, 0), Orientation::Horizontal),
            Ship::new(3, Coordinates::new(0, i32::MAX), Orientation::Vertical),
        ];
        assert_eq!(
            validate_placement(&small_config(), &ships),
            Err(PlacementError::OutOfBounds { index: 0 })
        );
        let ships = vec![
            Ship::new(2, Coordinates::new(0, 0), Orientation::Horizontal),
            Ship::new(3, Coordinates::new(i32::MAX - 1, 1), Orientation::Horizontal),
        ];
        assert_eq!(
            validate_placement(&small_config(), &ships),
            Err(PlacementError::OutOfBounds { index: 1 })
        );
    }

    #[test]
    fn test_overlap() {
        let ships = vec![
            Ship::new(2, Coordinates::new(1, 0), Orientation::Vertical),
            Ship::new(3, Coordinates::new(0, 1), Orientation::Horizontal),
        ];
        assert_eq!(
            validate_placement(&small_config(), &ships),
            Err(PlacementError::Overlap {
                first: 0,
                second: 1,
                at: Coordinates::new(1, 1)
            })
        );
    }

    #[test]
    fn test_resolve_and_sink() {
        let mut field = Field::default();
        field.place(&[Ship::new(2, Coordinates::new(0, 0), Orientation::Horizontal)]);

        assert_eq!(field.resolve(Coordinates::new(3, 3)), ShotOutcome::Miss);
        assert_eq!(
            field.resolve(Coordinates::new(0, 0)),
            ShotOutcome::Hit {
                ship_index: 0,
                sunk: false
            }
        );
        assert!(field.mark_hit(0, Coordinates::new(0, 0)));
        assert_eq!(
            field.resolve(Coordinates::new(1, 0)),
            ShotOutcome::Hit {
                ship_index: 0,
                sunk: true
            }
        );
        assert!(field.mark_hit(0, Coordinates::new(1, 0)));
        assert!(field.fleet_destroyed());

        // Hitting wreckage again never re-sinks.
        assert_eq!(
            field.resolve(Coordinates::new(1, 0)),
            ShotOutcome::Hit {
                ship_index: 0,
                sunk: false
            }
        );
    }

    #[test]
    fn test_mark_hit_wrong_cell() {
        let mut field = Field::default();
        field.place(&[Ship::new(2, Coordinates::new(0, 0), Orientation::Horizontal)]);
        assert!(!field.mark_hit(0, Coordinates::new(0, 1)));
        assert!(!field.mark_hit(3, Coordinates::new(0, 0)));
    }
}
