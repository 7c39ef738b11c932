// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The sector builder: packs pieces into a current sector, seals full sectors on a
//! background worker, and keeps the persisted metadata in lockstep with in-memory
//! state (`SPEC_FULL.md` §4.1).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, instrument, warn};

use crate::config::SectorBuilderConfig;
use crate::db::KeyValueStore;
use crate::error::{CoreError, Result};
use crate::sector::piece::PieceInfo;
use crate::sector::seal::{SealParams, Sealer};
use crate::sector::sealed::{new_sealed_sector_path, SealedSector, SealedSectorMetadata};
use crate::sector::sector::{new_sector_label, Sector, SectorMetadata};
use crate::sector::store::SectorMetadataStore;

/// Sectors and sealed sectors live in an arena keyed by label/merkle-root rather
/// than behind direct pointers, so `Sector` and `SealedSector` never need to hold a
/// cyclic owned reference to one another (`SPEC_FULL.md` §9).
struct Arena {
    cur_label: String,
    sectors: HashMap<String, Sector>,
    sealed: HashMap<String, SealedSector>,
    /// Callers awaiting a seal to finish for a given sector label.
    waiters: HashMap<String, Vec<oneshot::Sender<Result<String>>>>,
}

struct SealJob {
    label: String,
}

pub struct SectorBuilder {
    config: SectorBuilderConfig,
    miner_address: String,
    seal_params: SealParams,
    store: SectorMetadataStore,
    sealer: Arc<dyn Sealer>,
    arena: Arc<Mutex<Arena>>,
    seal_tx: mpsc::UnboundedSender<SealJob>,
}

impl SectorBuilder {
    /// Creates a builder with an already-allocated current sector, and spawns the
    /// background sealing worker.
    pub fn new(
        config: SectorBuilderConfig,
        miner_address: impl Into<String>,
        seal_params: SealParams,
        db: Arc<dyn KeyValueStore>,
        sealer: Arc<dyn Sealer>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.staging_dir).map_err(CoreError::IoFailure)?;
        std::fs::create_dir_all(&config.sealed_dir).map_err(CoreError::IoFailure)?;

        let store = SectorMetadataStore::new(db);
        let first = Sector::create(
            config.staging_dir.join(new_sector_label()),
            config.sector_size_max,
        )?;
        store.put_sector(&first.metadata())?;
        let cur_label = first.label.clone();

        let mut sectors = HashMap::new();
        sectors.insert(cur_label.clone(), first);

        let arena = Arc::new(Mutex::new(Arena {
            cur_label,
            sectors,
            sealed: HashMap::new(),
            waiters: HashMap::new(),
        }));

        let (seal_tx, seal_rx) = mpsc::unbounded_channel();

        let builder = Self {
            config,
            miner_address: miner_address.into(),
            seal_params,
            store,
            sealer,
            arena,
            seal_tx,
        };
        builder.spawn_seal_worker(seal_rx);
        Ok(builder)
    }

    /// Allocates a fresh label and backing file under the staging directory.
    /// Exposed standalone so `SPEC_FULL.md` S4 (path uniqueness) can be tested
    /// without mutating the builder's arena.
    pub fn new_sector_path(&self) -> std::path::PathBuf {
        self.config.staging_dir.join(new_sector_label())
    }

    pub fn new_sealed_sector_path(&self) -> std::path::PathBuf {
        new_sealed_sector_path(&self.config.sealed_dir)
    }

    /// Label of the sector currently accepting writes.
    pub fn cur_label(&self) -> String {
        self.arena.lock().cur_label.clone()
    }

    pub fn cur_metadata(&self) -> SectorMetadata {
        let arena = self.arena.lock();
        arena.sectors[&arena.cur_label].metadata()
    }

    /// Appends `bytes` to the current sector. If the piece would overflow it, the
    /// current sector is frozen and scheduled for sealing, a new current sector is
    /// allocated, and the piece is written there instead.
    #[instrument(skip(self, bytes), fields(size = piece.size))]
    pub fn add_piece(&self, piece: PieceInfo, bytes: &[u8]) -> Result<()> {
        if piece.size > self.config.sector_size_max {
            return Err(CoreError::PieceTooLarge {
                size: piece.size,
                max: self.config.sector_size_max,
            });
        }

        let mut arena = self.arena.lock();
        let overflow = arena.sectors[&arena.cur_label].would_overflow(piece.size);
        if overflow {
            let frozen_label = arena.cur_label.clone();
            let new_sector = Sector::create(self.new_sector_path(), self.config.sector_size_max)?;
            let new_label = new_sector.label.clone();
            arena.sectors.insert(new_label.clone(), new_sector);
            arena.cur_label = new_label;
            drop(arena);

            self.store.put_sector(&self.cur_metadata())?;
            info!(sector = %frozen_label, "sector full, scheduling seal");
            let _ = self.seal_tx.send(SealJob {
                label: frozen_label,
            });

            arena = self.arena.lock();
        }

        let cur_label = arena.cur_label.clone();
        let sector = arena.sectors.get_mut(&cur_label).expect("cur sector exists");
        sector.write_piece(piece, bytes)?;
        let meta = sector.metadata();
        drop(arena);

        self.store.put_sector(&meta)
    }

    /// Reads back the metadata persisted for `label`. Fails with `NotFound`.
    pub fn get_meta(&self, label: &str) -> Result<SectorMetadata> {
        self.store.get_sector(label)
    }

    pub fn get_sealed_meta(&self, merkle_root_hex: &str) -> Result<SealedSectorMetadata> {
        self.store.get_sealed(merkle_root_hex)
    }

    /// Reads the raw bytes of the sector named by `label`, whether or not it has
    /// been sealed (returns the *staged* bytes either way).
    pub fn read_sector(&self, label: &str) -> Result<Vec<u8>> {
        let arena = self.arena.lock();
        arena
            .sectors
            .get(label)
            .ok_or_else(|| CoreError::NotFound(format!("sector {label}")))?
            .read_file()
    }

    pub fn read_sealed(&self, merkle_root_hex: &str) -> Result<Vec<u8>> {
        let arena = self.arena.lock();
        arena
            .sealed
            .values()
            .find(|s| s.merkle_root_hex() == merkle_root_hex)
            .ok_or_else(|| CoreError::NotFound(format!("sealed sector {merkle_root_hex}")))?
            .read_file()
    }

    /// Invokes the opaque sealing primitive on `label` synchronously. Not
    /// re-entrant on the same sector: a second call while a seal is outstanding
    /// returns an error rather than racing the first.
    #[instrument(skip(self))]
    pub fn seal_now(&self, label: &str) -> Result<SealedSectorMetadata> {
        {
            let arena = self.arena.lock();
            let sector = arena
                .sectors
                .get(label)
                .ok_or_else(|| CoreError::NotFound(format!("sector {label}")))?;
            if sector.sealed.is_some() {
                return Err(CoreError::ProtocolViolation(format!(
                    "sector {label} already sealed"
                )));
            }
        }

        let root_hex = seal_blocking(
            &self.arena,
            &self.store,
            &*self.sealer,
            &self.miner_address,
            &self.seal_params,
            &self.config.sealed_dir,
            label,
        )?;
        self.store.get_sealed(&root_hex)
    }

    /// Returns a future that resolves once sealing for `label` completes (with the
    /// resulting merkle root) or fails. Exists so callers don't have to poll or
    /// sleep waiting for the background worker (`SPEC_FULL.md` §9 open question).
    pub fn wait_for_seal(&self, label: &str) -> oneshot::Receiver<Result<String>> {
        let (tx, rx) = oneshot::channel();
        let mut arena = self.arena.lock();
        if let Some(sector) = arena.sectors.get(label) {
            if let Some(root) = &sector.sealed {
                let _ = tx.send(Ok(root.clone()));
                return rx;
            }
        }
        arena.waiters.entry(label.to_string()).or_default().push(tx);
        rx
    }

    /// Spawns the dispatcher task that drains `seal_rx` and fans each frozen sector
    /// out to its own sealing task, gated by a semaphore sized from
    /// `config.seal_concurrency` (`SPEC_FULL.md` §9: "sealing concurrency can be 1,
    /// the default, or bounded; do not expose parallelism guarantees in the public
    /// contract" — callers only ever observe completion via [`Self::wait_for_seal`]).
    fn spawn_seal_worker(&self, mut seal_rx: mpsc::UnboundedReceiver<SealJob>) {
        let arena = Arc::clone(&self.arena);
        let store = self.store.clone();
        let sealer = Arc::clone(&self.sealer);
        let miner_address = self.miner_address.clone();
        let seal_params = self.seal_params.clone();
        let sealed_dir = self.config.sealed_dir.clone();
        let permits = Arc::new(tokio::sync::Semaphore::new(self.config.seal_concurrency.max(1)));

        tokio::spawn(async move {
            while let Some(job) = seal_rx.recv().await {
                let label = job.label;
                let arena_for_seal = Arc::clone(&arena);
                let arena_for_waiters = Arc::clone(&arena);
                let store2 = store.clone();
                let sealer2 = Arc::clone(&sealer);
                let miner2 = miner_address.clone();
                let params2 = seal_params.clone();
                let sealed_dir2 = sealed_dir.clone();
                let label2 = label.clone();
                let permit = Arc::clone(&permits)
                    .acquire_owned()
                    .await
                    .expect("seal semaphore is never closed");

                tokio::spawn(async move {
                    let _permit = permit;
                    let result: std::result::Result<String, String> =
                        tokio::task::spawn_blocking(move || {
                            seal_blocking(
                                &arena_for_seal,
                                &store2,
                                &*sealer2,
                                &miner2,
                                &params2,
                                &sealed_dir2,
                                &label2,
                            )
                            .map_err(|e| e.to_string())
                        })
                        .await
                        .unwrap_or_else(|join_err| Err(join_err.to_string()));

                    match &result {
                        Ok(_) => info!(sector = %label, "sealing finished"),
                        Err(err) => error!(sector = %label, error = %err, "sealing failed"),
                    }

                    let mut guard = arena_for_waiters.lock();
                    if let Some(waiters) = guard.waiters.remove(&label) {
                        for waiter in waiters {
                            let reply = result.clone().map_err(|msg| {
                                CoreError::NotFound(format!("seal of {label} failed: {msg}"))
                            });
                            let _ = waiter.send(reply);
                        }
                    }
                    drop(guard);
                });
            }
            warn!("seal worker channel closed, shutting down");
        });
    }
}

/// Free function so it can run inside `spawn_blocking` without borrowing `self`.
#[allow(clippy::too_many_arguments)]
fn seal_blocking(
    arena: &Mutex<Arena>,
    store: &SectorMetadataStore,
    sealer: &dyn Sealer,
    miner_address: &str,
    seal_params: &SealParams,
    sealed_dir: &std::path::Path,
    label: &str,
) -> Result<String> {
    let bytes = {
        let guard = arena.lock();
        let sector = guard
            .sectors
            .get(label)
            .ok_or_else(|| CoreError::NotFound(format!("sector {label}")))?;
        sector.read_file()?
    };

    let (replica, merkle_root) = sealer
        .seal(&bytes, miner_address, seal_params)
        .map_err(CoreError::TransportFailure)?;

    let sealed = SealedSector::write(
        new_sealed_sector_path(sealed_dir),
        label.to_string(),
        merkle_root,
        replica,
    )?;
    let root_hex = sealed.merkle_root_hex();

    let mut guard = arena.lock();
    let sector = guard
        .sectors
        .get_mut(label)
        .ok_or_else(|| CoreError::NotFound(format!("sector {label}")))?;
    let sealed_meta = sealed.metadata(sector.pieces.clone());
    sector.sealed = Some(root_hex.clone());
    let sector_meta = sector.metadata();
    guard.sealed.insert(root_hex.clone(), sealed);
    drop(guard);

    store.put_sealed(&sealed_meta)?;
    store.put_sector(&sector_meta)?;

    Ok(root_hex)
}
