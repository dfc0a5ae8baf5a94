use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address of one tile image: grid row, grid column, zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub row: i32,
    pub column: i32,
    pub zoom: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed tile key {input:?}: expected \"row,column,zoom\"")]
pub struct TileKeyParseError {
    pub input: String,
}

impl TileKey {
    pub const fn new(row: i32, column: i32, zoom: i32) -> Self {
        Self { row, column, zoom }
    }

    /// Canonical string form, also usable as a DOM id.
    pub fn to_key(self) -> String {
        format!("{},{},{}", self.row, self.column, self.zoom)
    }

    /// Load priority: more specific (higher zoom) tiles win.
    pub fn priority(self) -> i32 {
        self.zoom
    }

    /// The tile one zoom level up that covers this one.
    pub fn parent(self) -> Self {
        Self {
            row: self.row.div_euclid(2),
            column: self.column.div_euclid(2),
            zoom: self.zoom - 1,
        }
    }

    /// Fractional coordinate of this tile's top-left corner.
    pub fn coordinate(self) -> Coordinate {
        Coordinate {
            row: self.row as f64,
            column: self.column as f64,
            zoom: self.zoom as f64,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.row, self.column, self.zoom)
    }
}

impl FromStr for TileKey {
    type Err = TileKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TileKeyParseError {
            input: s.to_string(),
        };
        let mut parts = s.split(',').map(|part| part.trim().parse::<i32>());
        let (Some(Ok(row)), Some(Ok(column)), Some(Ok(zoom)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        Ok(Self { row, column, zoom })
    }
}

/// A fractional position in tile space. One unit of row/column is one tile
/// at `zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub row: f64,
    pub column: f64,
    pub zoom: f64,
}

impl Coordinate {
    pub const fn new(row: f64, column: f64, zoom: f64) -> Self {
        Self { row, column, zoom }
    }

    /// Same location expressed at another zoom level.
    pub fn zoom_to(self, zoom: f64) -> Self {
        let scale = 2f64.powf(zoom - self.zoom);
        Self {
            row: self.row * scale,
            column: self.column * scale,
            zoom,
        }
    }

    pub fn zoom_by(self, delta: f64) -> Self {
        self.zoom_to(self.zoom + delta)
    }

    /// The tile containing this coordinate at its (floored) zoom.
    pub fn container(self) -> TileKey {
        let at = self.zoom_to(self.zoom.floor());
        TileKey {
            row: at.row.floor() as i32,
            column: at.column.floor() as i32,
            zoom: at.zoom as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Coordinate, TileKey};

    #[test]
    fn canonical_key_round_trips_through_parse() {
        let key = TileKey::new(5, -3, 4);
        assert_eq!(key.to_key(), "5,-3,4");
        assert_eq!("5,-3,4".parse::<TileKey>(), Ok(key));
        assert_eq!(key.to_string(), key.to_key());
    }

    #[test]
    fn parse_rejects_wrong_arity_and_garbage() {
        assert!("1,2".parse::<TileKey>().is_err());
        assert!("1,2,3,4".parse::<TileKey>().is_err());
        assert!("a,b,c".parse::<TileKey>().is_err());
        let err = "".parse::<TileKey>().unwrap_err();
        assert_eq!(err.input, "");
    }

    #[test]
    fn priority_is_zoom() {
        assert_eq!(TileKey::new(0, 0, 7).priority(), 7);
    }

    #[test]
    fn parent_uses_floor_division() {
        assert_eq!(TileKey::new(5, 4, 3).parent(), TileKey::new(2, 2, 2));
        assert_eq!(TileKey::new(-1, -3, 3).parent(), TileKey::new(-1, -2, 2));
    }

    #[test]
    fn zoom_to_scales_by_powers_of_two() {
        let coord = Coordinate::new(3.0, 5.0, 2.0);
        let up = coord.zoom_to(4.0);
        assert_eq!((up.row, up.column, up.zoom), (12.0, 20.0, 4.0));
        let down = coord.zoom_by(-1.0);
        assert_eq!((down.row, down.column, down.zoom), (1.5, 2.5, 1.0));
    }

    #[test]
    fn container_floors_zoom_and_position() {
        let coord = Coordinate::new(2.5, 7.9, 3.0);
        assert_eq!(coord.container(), TileKey::new(2, 7, 3));

        let fractional_zoom = Coordinate::new(4.0, 4.0, 2.5);
        let key = fractional_zoom.container();
        assert_eq!(key.zoom, 2);
        assert_eq!(key.row, (4.0 * 2f64.powf(-0.5)).floor() as i32);
    }
}
