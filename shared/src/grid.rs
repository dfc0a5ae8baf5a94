use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::tile::{Coordinate, TileKey};

/// Edge length of one tile image in pixels.
pub const TILE_SIZE: f64 = 256.0;
/// How many coarser zoom levels are kept underneath the current one.
pub const DEFAULT_PYRAMID: u32 = 3;

/// The window of tile space currently shown: a pixel-sized rectangle centered
/// on a fractional coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: f64,
    pub height: f64,
    pub center: Coordinate,
    pub pyramid: u32,
    pub tile_size: f64,
}

/// Pixel placement of a tile relative to the viewport's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRect {
    pub left: f64,
    pub top: f64,
    pub size: f64,
}

impl Grid {
    pub fn new(width: f64, height: f64, center: Coordinate, pyramid: u32) -> Self {
        Self {
            width,
            height,
            center,
            pyramid,
            tile_size: TILE_SIZE,
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    pub fn set_center(&mut self, center: Coordinate) {
        self.center = center;
    }

    /// Move the map content by a screen-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.center.column -= dx / self.tile_size;
        self.center.row -= dy / self.tile_size;
    }

    pub fn zoom_by(&mut self, delta: f64) {
        self.center = self.center.zoom_by(delta);
    }

    /// Zoom level whose tiles are drawn at close to native size.
    pub fn base_zoom(&self) -> i32 {
        self.center.zoom.round().max(0.0) as i32
    }

    /// Tile-space coordinate under a viewport pixel.
    pub fn point_coordinate(&self, x: f64, y: f64) -> Coordinate {
        Coordinate {
            row: self.center.row + (y - self.height / 2.0) / self.tile_size,
            column: self.center.column + (x - self.width / 2.0) / self.tile_size,
            zoom: self.center.zoom,
        }
    }

    /// Viewport pixel of a tile-space coordinate.
    pub fn coordinate_point(&self, coord: Coordinate) -> (f64, f64) {
        let coord = coord.zoom_to(self.center.zoom);
        (
            self.width / 2.0 + (coord.column - self.center.column) * self.tile_size,
            self.height / 2.0 + (coord.row - self.center.row) * self.tile_size,
        )
    }

    pub fn tile_rect(&self, key: TileKey) -> TileRect {
        let (left, top) = self.coordinate_point(key.coordinate());
        TileRect {
            left,
            top,
            size: self.tile_size * 2f64.powf(self.center.zoom - key.zoom as f64),
        }
    }

    /// Tiles covering the viewport at the base zoom, followed by their
    /// covering tiles at up to `pyramid` coarser levels.
    pub fn visible_tiles(&self) -> Vec<TileKey> {
        let zoom = self.base_zoom();
        let at_zoom = self.center.zoom_to(zoom as f64);
        let tile_px = self.tile_size * 2f64.powf(self.center.zoom - zoom as f64);
        if tile_px <= 0.0 || self.width <= 0.0 || self.height <= 0.0 {
            return Vec::new();
        }

        let half_rows = self.height / 2.0 / tile_px;
        let half_cols = self.width / 2.0 / tile_px;
        let min_row = (at_zoom.row - half_rows).floor() as i32;
        let min_col = (at_zoom.column - half_cols).floor() as i32;
        let max_row = ((at_zoom.row + half_rows).ceil() as i32 - 1).max(min_row);
        let max_col = ((at_zoom.column + half_cols).ceil() as i32 - 1).max(min_col);

        let mut tiles = Vec::new();
        for row in min_row..=max_row {
            for column in min_col..=max_col {
                tiles.push(TileKey { row, column, zoom });
            }
        }

        let mut seen: HashSet<TileKey> = tiles.iter().copied().collect();
        let mut level = tiles.clone();
        for _ in 0..self.pyramid {
            if level.first().is_none_or(|key| key.zoom <= 0) {
                break;
            }
            level = level
                .iter()
                .map(|key| key.parent())
                .filter(|parent| seen.insert(*parent))
                .collect();
            tiles.extend_from_slice(&level);
        }

        tiles
    }
}

/// Tiles that entered and left the view between two redraws.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileDiff {
    pub entered: Vec<TileKey>,
    pub exited: Vec<TileKey>,
}

impl TileDiff {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// The set of tiles shown by the last redraw.
#[derive(Debug, Clone, Default)]
pub struct VisibleSet {
    keys: HashSet<TileKey>,
}

impl VisibleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Replace the visible set with `next` and report the difference.
    /// Entered keys keep `next`'s order; exited keys are sorted.
    pub fn replace(&mut self, next: &[TileKey]) -> TileDiff {
        let next_keys: HashSet<TileKey> = next.iter().copied().collect();
        let mut exited: Vec<TileKey> = self
            .keys
            .iter()
            .filter(|key| !next_keys.contains(key))
            .copied()
            .collect();
        exited.sort();

        let mut entered = Vec::new();
        let mut pushed = HashSet::new();
        for key in next {
            if !self.keys.contains(key) && pushed.insert(*key) {
                entered.push(*key);
            }
        }

        self.keys = next_keys;
        TileDiff { entered, exited }
    }
}
