use std::path::PathBuf;
use std::time::Duration;

use squares_shared::{Coordinate, DEFAULT_MAX_CONCURRENT, DEFAULT_PYRAMID, SchedulerConfig};

pub const DEFAULT_OUT_DIR: &str = "tiles";
pub const DEFAULT_VIEWPORT_WIDTH: f64 = 1024.0;
pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 768.0;
pub const DEFAULT_STEP_MS: u64 = 250;
pub const DEFAULT_CENTER: Coordinate = Coordinate::new(2.0, 2.0, 2.0);
pub const DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const COMMAND_BUFFER: usize = 256;
pub const USER_AGENT: &str = "squares-fetcher/0.1";
pub const MANIFEST_FILE: &str = "session.json";

/// URL template with `{Z}`/`{X}`/`{Y}` placeholders. Required.
pub fn tile_template() -> Option<String> {
    std::env::var("SQUARES_TILE_TEMPLATE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn out_dir() -> PathBuf {
    std::env::var("SQUARES_OUT_DIR")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR))
}

pub fn scheduler_config() -> SchedulerConfig {
    let max_concurrent = std::env::var("SQUARES_MAX_CONCURRENT")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CONCURRENT);
    SchedulerConfig::with_max_concurrent(max_concurrent)
}

pub fn viewport_size() -> (f64, f64) {
    std::env::var("SQUARES_VIEWPORT")
        .ok()
        .and_then(|value| parse_viewport(&value))
        .unwrap_or((DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT))
}

pub fn pyramid() -> u32 {
    std::env::var("SQUARES_PYRAMID")
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_PYRAMID)
}

/// Viewport centers to visit in order. Falls back to a single overview
/// position when unset or when no step parses.
pub fn walk_path() -> Vec<Coordinate> {
    std::env::var("SQUARES_PATH")
        .ok()
        .map(|value| parse_path(&value))
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_CENTER])
}

pub fn step_interval() -> Duration {
    std::env::var("SQUARES_STEP_MS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(DEFAULT_STEP_MS))
}

pub fn upstream_http_timeout() -> Duration {
    std::env::var("UPSTREAM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS))
}

pub fn upstream_connect_timeout() -> Duration {
    std::env::var("UPSTREAM_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS))
}

/// `"1024x768"` -> `(1024.0, 768.0)`. Both sides must be positive.
pub fn parse_viewport(raw: &str) -> Option<(f64, f64)> {
    let (w, h) = raw.trim().split_once(['x', 'X'])?;
    let w = w.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)?;
    let h = h.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)?;
    Some((w, h))
}

/// `"row,column,zoom;row,column,zoom"`. Malformed steps are skipped.
pub fn parse_path(raw: &str) -> Vec<Coordinate> {
    raw.split(';')
        .filter_map(|step| {
            let mut parts = step.split(',').map(|part| part.trim().parse::<f64>());
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(Ok(row)), Some(Ok(column)), Some(Ok(zoom)), None)
                    if row.is_finite() && column.is_finite() && zoom.is_finite() =>
                {
                    Some(Coordinate::new(row, column, zoom))
                }
                _ => None,
            }
        })
        .collect()
}
