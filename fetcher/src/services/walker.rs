use std::time::Duration;

use squares_shared::Coordinate;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::services::loader::Command;

/// Feed the loader one viewport center per step, pausing between steps so
/// the view can move on before earlier tiles finish.
pub async fn drive(inbox: mpsc::Sender<Command>, path: Vec<Coordinate>, step: Duration) {
    let steps = path.len();
    for (index, center) in path.into_iter().enumerate() {
        if inbox.send(Command::Move(center)).await.is_err() {
            warn!("loader stopped before the walk finished");
            return;
        }
        info!(
            step = index + 1,
            steps,
            row = center.row,
            column = center.column,
            zoom = center.zoom,
            "moved viewport"
        );
        if index + 1 < steps {
            tokio::time::sleep(step).await;
        }
    }

    if inbox.send(Command::Finish).await.is_err() {
        warn!("loader stopped before the walk finished");
    }
}
