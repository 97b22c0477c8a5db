//! Loader workers: decoded features in, pooled geometry layers out
//!
//! Jobs are served nearest-to-center first. Workers never hold the index
//! or pool locks across a conversion; a tile canceled mid-conversion
//! simply drops its half-built layers back into the pool.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::core::geo::TileCoord;
use crate::pool::BufferPool;
use crate::style::cache::StyleCache;
use crate::tiles::layers::LayerSet;
use crate::tiles::source::{Tessellator, TileSource};
use crate::tiles::tile::Tile;
use crate::{Error, Result};

/// Convert one tile: decode its features, resolve styles, tessellate into
/// pooled layers and attach them. All-or-nothing: on any error the tile
/// keeps its prior state and every acquired chunk returns to the pool.
///
/// The tile must have been claimed for loading first.
pub fn convert_tile(
    tile: &Tile,
    source: &dyn TileSource,
    styles: &StyleCache,
    tessellator: &dyn Tessellator,
    pool: &BufferPool,
) -> Result<()> {
    let features = source.decode(tile.coord)?;
    let zoom = tile.coord.z;

    let mut layers = LayerSet::new();
    for feature in features {
        if tile.is_canceled() {
            return Err(Error::Canceled);
        }
        let resolved = styles.resolve(feature.kind, &feature.tags, zoom)?;
        for style in resolved.iter() {
            let layer = layers.layer(pool, style);
            tessellator.tessellate(&feature, style, &mut layer.buffer);
        }
    }

    if tile.complete(layers) {
        Ok(())
    } else {
        Err(Error::Canceled)
    }
}

struct Job {
    distance: f32,
    seq: u64,
    tile: Arc<Tile>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // nearest first, then earlier submission
        match other.distance.total_cmp(&self.distance) {
            CmpOrdering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

struct Shared {
    source: Arc<dyn TileSource>,
    styles: Arc<StyleCache>,
    tessellator: Arc<dyn Tessellator>,
    pool: BufferPool,
    queue: Mutex<BinaryHeap<Job>>,
    shutdown: AtomicBool,
}

impl Shared {
    fn pop(&self) -> Option<Job> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }
}

/// Worker pool converting tiles in the background. Completed jobs (built,
/// failed or skipped) report their coordinate on the done channel.
pub struct TileLoader {
    shared: Arc<Shared>,
    wake_tx: Sender<()>,
    done_rx: Receiver<TileCoord>,
    workers: Vec<thread::JoinHandle<()>>,
    seq: u64,
}

impl TileLoader {
    pub fn new(
        workers: usize,
        source: Arc<dyn TileSource>,
        styles: Arc<StyleCache>,
        tessellator: Arc<dyn Tessellator>,
        pool: BufferPool,
    ) -> Self {
        let (wake_tx, wake_rx) = unbounded::<()>();
        let (done_tx, done_rx) = unbounded();
        let shared = Arc::new(Shared {
            source,
            styles,
            tessellator,
            pool,
            queue: Mutex::new(BinaryHeap::new()),
            shutdown: AtomicBool::new(false),
        });

        let handles = (0..workers.max(1))
            .map(|id| {
                let shared = shared.clone();
                let wake_rx = wake_rx.clone();
                let done_tx = done_tx.clone();
                thread::Builder::new()
                    .name(format!("tile-loader-{id}"))
                    .spawn(move || worker_loop(shared, wake_rx, done_tx))
                    .expect("failed to spawn loader worker")
            })
            .collect();

        Self {
            shared,
            wake_tx,
            done_rx,
            workers: handles,
            seq: 0,
        }
    }

    /// Replace the job queue with a fresh batch. Leftover jobs from the
    /// previous batch fall back to idle so a later update can requeue
    /// them; tiles already claimed by a worker are unaffected.
    pub fn set_jobs(&mut self, tiles: Vec<Arc<Tile>>) {
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for job in queue.drain() {
            job.tile.fail();
        }

        let mut queued = 0;
        for tile in tiles {
            if tile.try_begin_loading() {
                queue.push(Job {
                    distance: tile.distance(),
                    seq: self.seq,
                    tile,
                });
                self.seq += 1;
                queued += 1;
            }
        }
        drop(queue);

        log::debug!("queued {queued} tile jobs");
        for _ in 0..queued {
            let _ = self.wake_tx.send(());
        }
    }

    /// Jobs not yet claimed by a worker
    pub fn pending_jobs(&self) -> usize {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Channel reporting finished jobs
    pub fn done_receiver(&self) -> &Receiver<TileCoord> {
        &self.done_rx
    }

    /// Stop the workers and wait for them to exit
    pub fn shutdown(self) {
        self.shared.shutdown.store(true, Ordering::Release);
        drop(self.wake_tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, wake_rx: Receiver<()>, done_tx: Sender<TileCoord>) {
    while wake_rx.recv().is_ok() {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let Some(job) = shared.pop() else {
            continue;
        };
        let tile = job.tile;
        if tile.is_canceled() {
            continue;
        }

        match convert_tile(
            &tile,
            &*shared.source,
            &shared.styles,
            &*shared.tessellator,
            &shared.pool,
        ) {
            Ok(()) => {
                log::debug!(
                    "built tile {} with {} vertices",
                    tile.coord,
                    tile.with_layers(|l| l.vertex_count())
                );
            }
            Err(Error::Canceled) => {
                log::debug!("discarded canceled tile {}", tile.coord);
                continue;
            }
            Err(e) => {
                log::warn!("tile {} failed: {e}", tile.coord);
                tile.fail();
            }
        }
        let _ = done_tx.send(tile.coord);
    }
}
