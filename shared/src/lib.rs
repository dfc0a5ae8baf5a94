pub mod grid;
pub mod request;
pub mod scheduler;
pub mod session;
pub mod template;
pub mod tile;

pub use grid::{DEFAULT_PYRAMID, Grid, TILE_SIZE, TileDiff, TileRect, VisibleSet};
pub use request::{LoadRequest, LoadTarget, RequestState};
pub use scheduler::{
    DEFAULT_MAX_CONCURRENT, Enqueued, LoadScheduler, Outcome, SchedulerConfig, SchedulerError,
    Settled,
};
pub use session::SessionCache;
pub use template::expand;
pub use tile::{Coordinate, TileKey, TileKeyParseError};
