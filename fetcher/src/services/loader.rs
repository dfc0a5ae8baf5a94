use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use squares_shared::{
    Coordinate, Enqueued, Grid, LoadScheduler, LoadTarget, Outcome, SchedulerConfig, TileKey,
    VisibleSet, expand,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::services::source::{FetchFn, FetchResult};
use crate::services::store::TileStore;
use crate::state::{FetchCounters, FetchCountersSnapshot};

/// Identity of one visible-tile instance. A tile that leaves and re-enters
/// the view gets a new slot.
pub type SlotId = u64;

#[derive(Debug)]
pub enum Command {
    /// Recenter the viewport.
    Move(Coordinate),
    /// A transfer finished, successfully or not.
    Settled { slot: SlotId, result: FetchResult },
    /// No more moves will arrive; stop once every admitted tile has settled.
    Finish,
}

/// Held by the visible set for as long as the tile is on screen.
#[derive(Debug)]
struct TileSlot {
    id: SlotId,
}

/// Render target for the native host: the transfer runs on its own task and
/// reports back through the loader's inbox.
pub struct HttpTarget {
    slot: SlotId,
    tile: Weak<TileSlot>,
    fetch: FetchFn,
    inbox: mpsc::Sender<Command>,
}

impl LoadTarget for HttpTarget {
    fn is_attached(&self) -> bool {
        self.tile.strong_count() > 0
    }

    fn begin(&mut self, url: &str) {
        let slot = self.slot;
        let transfer = (self.fetch)(url.to_string());
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = transfer.await;
            // Loader already gone means the run ended; nothing to report to.
            let _ = inbox.send(Command::Settled { slot, result }).await;
        });
    }
}

pub struct LoaderOptions {
    pub grid: Grid,
    pub template: String,
    pub scheduler: SchedulerConfig,
    pub store: TileStore,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchSummary {
    pub counters: FetchCountersSnapshot,
    pub session_urls: usize,
}

pub struct Loader {
    grid: Grid,
    template: String,
    visible: VisibleSet,
    slots: HashMap<TileKey, Arc<TileSlot>>,
    slot_keys: HashMap<SlotId, TileKey>,
    dispatched: HashSet<SlotId>,
    scheduler: LoadScheduler<SlotId, HttpTarget>,
    next_slot: SlotId,
    store: TileStore,
    fetch: FetchFn,
    inbox: mpsc::Sender<Command>,
    counters: Arc<FetchCounters>,
}

impl Loader {
    pub fn new(
        options: LoaderOptions,
        fetch: FetchFn,
        inbox: mpsc::Sender<Command>,
        counters: Arc<FetchCounters>,
    ) -> Self {
        Self {
            grid: options.grid,
            template: options.template,
            visible: VisibleSet::new(),
            slots: HashMap::new(),
            slot_keys: HashMap::new(),
            dispatched: HashSet::new(),
            scheduler: LoadScheduler::new(options.scheduler),
            next_slot: 0,
            store: options.store,
            fetch,
            inbox,
            counters,
        }
    }

    pub fn slot_for(&self, key: TileKey) -> Option<SlotId> {
        self.slots.get(&key).map(|slot| slot.id)
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Recenter, cancel what scrolled out, enqueue what scrolled in, admit.
    pub fn move_to(&mut self, center: Coordinate) {
        self.grid.set_center(center);
        let tiles = self.grid.visible_tiles();
        let diff = self.visible.replace(&tiles);

        for key in &diff.exited {
            let Some(slot) = self.slots.remove(key) else {
                continue;
            };
            self.slot_keys.remove(&slot.id);
            self.dispatched.remove(&slot.id);
            if self.scheduler.cancel(&slot.id) {
                self.counters.record_cancelled();
            }
        }

        for &key in &diff.entered {
            self.enqueue_tile(key);
        }

        let admitted = self.scheduler.process();
        debug!(
            entered = diff.entered.len(),
            exited = diff.exited.len(),
            admitted,
            active = self.scheduler.active_len(),
            pending = self.scheduler.pending_len(),
            "viewport moved"
        );
    }

    fn enqueue_tile(&mut self, key: TileKey) {
        let id = self.next_slot;
        self.next_slot += 1;

        let slot = Arc::new(TileSlot { id });
        let target = HttpTarget {
            slot: id,
            tile: Arc::downgrade(&slot),
            fetch: self.fetch.clone(),
            inbox: self.inbox.clone(),
        };
        let url = expand(&self.template, key);

        match self.scheduler.enqueue(id, key.priority(), url, target) {
            Ok(Enqueued::Queued) => {}
            Ok(Enqueued::Dispatched) => {
                self.dispatched.insert(id);
                self.counters.record_cache_dispatched();
            }
            Err(e) => {
                warn!(error = %e, tile = %key, "refusing to schedule tile twice");
                return;
            }
        }
        self.slots.insert(key, slot);
        self.slot_keys.insert(id, key);
    }

    /// Apply a transfer outcome, persist successful tiles, backfill.
    pub async fn settle(&mut self, slot: SlotId, result: FetchResult) {
        let outcome = if result.is_ok() {
            Outcome::Loaded
        } else {
            Outcome::Failed
        };

        match self.scheduler.complete(&slot, outcome) {
            Some(settled) => match result {
                Ok(body) => {
                    self.counters.record_loaded();
                    if let Some(&key) = self.slot_keys.get(&slot) {
                        match self.store.write(key, &settled.url, &body).await {
                            Ok(path) => trace!(tile = %key, path = %path.display(), "tile stored"),
                            Err(e) => {
                                warn!(error = %e, tile = %key, "failed to store tile")
                            }
                        }
                    }
                }
                Err(e) => {
                    self.counters.record_failed();
                    warn!(error = %e, url = %settled.url, "tile fetch failed");
                }
            },
            None if self.dispatched.remove(&slot) => {
                trace!(slot, "cache-dispatched tile settled");
            }
            None => {
                self.counters.record_stale_completion();
                debug!(slot, "discarded completion for tile no longer in view");
            }
        }

        self.scheduler.process();
    }

    pub fn summary(&self) -> FetchSummary {
        FetchSummary {
            counters: self.counters.snapshot(),
            session_urls: self.scheduler.session().len(),
        }
    }

    async fn write_manifest(&self) {
        match self
            .store
            .write_manifest(self.counters.snapshot(), self.scheduler.session())
            .await
        {
            Ok(path) => info!(path = %path.display(), "wrote session manifest"),
            Err(e) => warn!(error = %e, "failed to write session manifest"),
        }
    }
}

/// Serve commands until the walk has finished and no transfer is admitted or
/// waiting.
pub async fn run(mut loader: Loader, mut inbox: mpsc::Receiver<Command>) -> FetchSummary {
    let mut walk_finished = false;

    while let Some(command) = inbox.recv().await {
        match command {
            Command::Move(center) => loader.move_to(center),
            Command::Settled { slot, result } => loader.settle(slot, result).await,
            Command::Finish => walk_finished = true,
        }

        if walk_finished && loader.is_idle() {
            break;
        }
    }

    loader.write_manifest().await;
    loader.summary()
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use squares_shared::{Coordinate, Grid, SchedulerConfig, TileKey};
    use tokio::sync::mpsc;

    use super::{Command, Loader, LoaderOptions, run};
    use crate::services::source::{FetchFn, FetchFuture};
    use crate::services::store::TileStore;
    use crate::state::FetchCounters;

    const TEMPLATE: &str = "https://tiles.example/{Z}/{X}/{Y}.png";

    type Requested = Arc<Mutex<Vec<String>>>;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("squares-loader-{name}-{}", std::process::id()))
    }

    /// Transfers that never finish on their own; tests settle them by hand.
    fn stalled_fetch(requested: Requested) -> FetchFn {
        Arc::new(move |url: String| -> FetchFuture {
            requested.lock().expect("requested lock").push(url);
            Box::pin(pending())
        })
    }

    fn instant_fetch() -> FetchFn {
        Arc::new(|url: String| -> FetchFuture {
            Box::pin(async move { Ok(Bytes::from(url.into_bytes())) })
        })
    }

    fn loader(
        name: &str,
        grid: Grid,
        max_concurrent: usize,
        fetch: FetchFn,
    ) -> (Loader, mpsc::Receiver<Command>, PathBuf) {
        let root = scratch_dir(name);
        let (tx, rx) = mpsc::channel(64);
        let loader = Loader::new(
            LoaderOptions {
                grid,
                template: TEMPLATE.to_string(),
                scheduler: SchedulerConfig::with_max_concurrent(max_concurrent),
                store: TileStore::new(&root),
            },
            fetch,
            tx,
            Arc::new(FetchCounters::default()),
        );
        (loader, rx, root)
    }

    fn grid(pyramid: u32) -> Grid {
        Grid::new(512.0, 512.0, Coordinate::new(4.0, 4.0, 3.0), pyramid)
    }

    fn url(key: TileKey) -> String {
        squares_shared::expand(TEMPLATE, key)
    }

    #[tokio::test]
    async fn move_admits_most_specific_tiles_first() {
        let requested: Requested = Arc::default();
        let (mut loader, _rx, _root) =
            loader("admit", grid(1), 4, stalled_fetch(requested.clone()));

        loader.move_to(Coordinate::new(4.0, 4.0, 3.0));
        tokio::task::yield_now().await;

        let requested = requested.lock().expect("requested lock").clone();
        assert_eq!(requested, vec![
            url(TileKey::new(3, 3, 3)),
            url(TileKey::new(3, 4, 3)),
            url(TileKey::new(4, 3, 3)),
            url(TileKey::new(4, 4, 3)),
        ]);
        assert_eq!(loader.scheduler.active_len(), 4);
        assert_eq!(loader.scheduler.pending_len(), 4);
    }

    #[tokio::test]
    async fn pan_cancels_in_flight_tile_and_swallows_its_completion() {
        let requested: Requested = Arc::default();
        let (mut loader, _rx, root) =
            loader("pan", grid(0), 4, stalled_fetch(requested.clone()));

        loader.move_to(Coordinate::new(4.0, 4.0, 3.0));
        let gone = TileKey::new(3, 3, 3);
        let gone_slot = loader.slot_for(gone).expect("tile is visible");

        loader.move_to(Coordinate::new(5.0, 5.0, 3.0));
        assert_eq!(loader.slot_for(gone), None);
        assert_eq!(loader.counters.snapshot().cancelled_total, 3);

        loader
            .settle(gone_slot, Ok(Bytes::from_static(b"late")))
            .await;

        let snapshot = loader.counters.snapshot();
        assert_eq!(snapshot.stale_completions_total, 1);
        assert_eq!(snapshot.loaded_total, 0);
        assert!(!loader.scheduler.session().seen(&url(gone)));
        assert!(!TileStore::new(&root).tile_path(gone, &url(gone)).exists());
        assert_eq!(loader.scheduler.active_len(), 4);
    }

    #[tokio::test]
    async fn settle_stores_tile_and_backfills_slot() {
        let requested: Requested = Arc::default();
        let (mut loader, _rx, root) =
            loader("settle", grid(0), 1, stalled_fetch(requested.clone()));

        loader.move_to(Coordinate::new(4.0, 4.0, 3.0));
        let first = TileKey::new(3, 3, 3);
        let slot = loader.slot_for(first).expect("tile is visible");
        assert!(loader.scheduler.is_active(&slot));

        loader.settle(slot, Ok(Bytes::from_static(b"png"))).await;

        let stored = TileStore::new(&root).tile_path(first, &url(first));
        assert_eq!(tokio::fs::read(&stored).await.expect("tile stored"), b"png");
        assert!(loader.scheduler.session().seen(&url(first)));
        assert_eq!(loader.scheduler.active_len(), 1);
        assert_eq!(loader.scheduler.pending_len(), 2);
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn failed_transfer_frees_slot_without_retry() {
        let requested: Requested = Arc::default();
        let (mut loader, _rx, _root) =
            loader("fail", grid(0), 1, stalled_fetch(requested.clone()));

        loader.move_to(Coordinate::new(4.0, 4.0, 3.0));
        let slot = loader
            .slot_for(TileKey::new(3, 3, 3))
            .expect("tile is visible");
        loader.settle(slot, Err("HTTP status 404".to_string())).await;

        assert_eq!(loader.counters.snapshot().failed_total, 1);
        assert!(!loader.scheduler.is_active(&slot));
        assert!(!loader.scheduler.is_pending(&slot));
        assert_eq!(loader.scheduler.active_len(), 1);
        tokio::task::yield_now().await;
        let requested = requested.lock().expect("requested lock");
        assert_eq!(requested.len(), 2);
        assert_eq!(requested.iter().filter(|u| **u == url(TileKey::new(3, 3, 3))).count(), 1);
    }

    #[tokio::test]
    async fn revisited_tile_is_dispatched_from_session_cache() {
        let requested: Requested = Arc::default();
        let (mut loader, _rx, root) = loader(
            "revisit",
            Grid::new(256.0, 256.0, Coordinate::new(0.5, 0.5, 1.0), 0),
            4,
            stalled_fetch(requested.clone()),
        );

        let home = Coordinate::new(0.5, 0.5, 1.0);
        loader.move_to(home);
        let slot = loader.slot_for(TileKey::new(0, 0, 1)).expect("visible");
        loader.settle(slot, Ok(Bytes::from_static(b"x"))).await;

        loader.move_to(Coordinate::new(5.5, 5.5, 1.0));
        loader.move_to(home);

        let again = loader.slot_for(TileKey::new(0, 0, 1)).expect("visible again");
        assert_ne!(again, slot);
        assert!(!loader.scheduler.is_pending(&again));
        assert!(!loader.scheduler.is_active(&again));
        assert_eq!(loader.counters.snapshot().cache_dispatched_total, 1);

        loader.settle(again, Ok(Bytes::from_static(b"x"))).await;
        assert_eq!(loader.counters.snapshot().stale_completions_total, 0);
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn run_loads_final_view_and_stops_when_idle() {
        let grid = Grid::new(256.0, 256.0, Coordinate::new(0.5, 0.5, 1.0), 1);
        let (loader, rx, root) = loader("run", grid, 2, instant_fetch());
        let tx = loader.inbox.clone();

        tx.send(Command::Move(Coordinate::new(0.5, 0.5, 1.0)))
            .await
            .expect("send move");
        tx.send(Command::Move(Coordinate::new(1.5, 1.5, 1.0)))
            .await
            .expect("send move");
        tx.send(Command::Finish).await.expect("send finish");

        let summary = run(loader, rx).await;

        let store = TileStore::new(&root);
        for key in [TileKey::new(1, 1, 1), TileKey::new(0, 0, 0)] {
            assert!(store.tile_path(key, &url(key)).exists(), "{key} not stored");
        }
        assert!(root.join(crate::config::MANIFEST_FILE).exists());
        assert!(summary.counters.loaded_total >= 2);
        assert_eq!(summary.counters.failed_total, 0);
        assert!(summary.session_urls >= 2);
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
