use squares_shared::{TILE_SIZE, TileRect};
use web_sys::HtmlElement;

const FALLBACK_SIZE: (f64, f64) = (1200.0, 800.0);

/// CSS transform placing a `TILE_SIZE` image at `rect`. Uses matrix3d so
/// the browser composites tiles on the GPU.
pub fn tile_transform(rect: TileRect) -> String {
    let scale = rect.size / TILE_SIZE;
    format!(
        "matrix3d({scale},0,0,0,0,{scale},0,0,0,0,1,0,{},{},0,1)",
        round_px(rect.left),
        round_px(rect.top)
    )
}

/// Snap to 1/100 px so adjacent tiles do not shimmer while panning.
fn round_px(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn place_tile(el: &HtmlElement, rect: TileRect) {
    let style = el.style();
    let _ = style.set_property("transform", &tile_transform(rect));
}

/// Pixel size of the map container, falling back to a desktop-sized guess
/// before layout has happened.
pub fn container_size(el: &HtmlElement) -> (f64, f64) {
    let w = el.client_width() as f64;
    let h = el.client_height() as f64;
    if w <= 0.0 || h <= 0.0 {
        return FALLBACK_SIZE;
    }
    (w, h)
}

#[cfg(test)]
mod tests {
    use squares_shared::{TILE_SIZE, TileRect};

    use super::tile_transform;

    #[test]
    fn native_size_tile_has_unit_scale() {
        let rect = TileRect {
            left: 10.0,
            top: -20.5,
            size: TILE_SIZE,
        };
        assert_eq!(
            tile_transform(rect),
            "matrix3d(1,0,0,0,0,1,0,0,0,0,1,0,10,-20.5,0,1)"
        );
    }

    #[test]
    fn coarser_tile_is_scaled_up() {
        let rect = TileRect {
            left: 0.0,
            top: 0.0,
            size: TILE_SIZE * 2.0,
        };
        assert!(tile_transform(rect).starts_with("matrix3d(2,0,0,0,0,2,"));
    }

    #[test]
    fn offsets_are_snapped_to_hundredths() {
        let rect = TileRect {
            left: 1.23456,
            top: 7.891011,
            size: TILE_SIZE,
        };
        assert!(tile_transform(rect).ends_with(",1.23,7.89,0,1)"));
    }
}
