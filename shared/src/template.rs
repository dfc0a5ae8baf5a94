use crate::tile::TileKey;

/// Fill a tile URL template such as `https://tile.example/{Z}/{X}/{Y}.png`.
///
/// `{z}`/`{Z}` take the zoom, `{x}`/`{X}` the column and `{y}`/`{Y}` the row.
/// Only the first occurrence of each placeholder is substituted.
pub fn expand(template: &str, key: TileKey) -> String {
    let zoom = key.zoom.to_string();
    let column = key.column.to_string();
    let row = key.row.to_string();

    let src = substitute(template, "{z}", "{Z}", &zoom);
    let src = substitute(&src, "{x}", "{X}", &column);
    substitute(&src, "{y}", "{Y}", &row)
}

fn substitute(src: &str, lower: &str, upper: &str, value: &str) -> String {
    src.replacen(lower, upper, 1).replacen(upper, value, 1)
}
