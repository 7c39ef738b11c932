// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::sector::piece::PieceInfo;

/// Length of a generated sector label. Normative: see `SPEC_FULL.md` §3.
pub const LABEL_LEN: usize = 32;

/// A fresh, random, filesystem- and datastore-key-safe label.
pub fn new_sector_label() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LABEL_LEN)
        .map(char::from)
        .collect()
}

/// Snapshot of a sector's state, persisted verbatim under its metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorMetadata {
    pub label: String,
    /// Maximum capacity of the sector (`SizeMax`).
    pub size: u64,
    pub free: u64,
    pub pieces: Vec<PieceInfo>,
    /// Hex-encoded merkle root of the `SealedSector` derived from this sector, once
    /// sealing has completed. `None` until then.
    pub sealed: Option<String>,
}

/// A bounded write-only buffer with a fixed maximum capacity, backed by a file on
/// the staging directory. Mutated only through [`Sector::write_piece`] until full.
pub struct Sector {
    pub label: String,
    pub path: PathBuf,
    pub size_max: u64,
    pub free: u64,
    pub pieces: Vec<PieceInfo>,
    pub sealed: Option<String>,
    file: File,
}

impl Sector {
    /// Allocates a fresh label, creates an empty backing file at `path`, and returns
    /// a sector with `free == size_max`.
    pub fn create(path: impl AsRef<Path>, size_max: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let label = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(new_sector_label);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(CoreError::IoFailure)?;
        Ok(Self {
            label,
            path,
            size_max,
            free: size_max,
            pieces: Vec::new(),
            sealed: None,
            file,
        })
    }

    /// Whether accepting `piece` would overflow the sector's remaining capacity.
    pub fn would_overflow(&self, piece_size: u64) -> bool {
        piece_size > self.free
    }

    /// Appends `bytes` to the backing file and records `piece` in the in-memory
    /// list. On any I/O error the file and the piece list are left exactly as they
    /// were before the call — no torn appends.
    pub fn write_piece(&mut self, piece: PieceInfo, bytes: &[u8]) -> Result<()> {
        let actual = bytes.len() as u64;
        if actual != piece.size {
            return Err(CoreError::PieceSizeMismatch {
                declared: piece.size,
                actual,
            });
        }

        if piece.size > self.free {
            // Callers are expected to have already frozen/rolled over via
            // `SectorBuilder::add_piece`, which checks `piece.size` against
            // `SizeMax` before ever reaching here; this is the distinct case of
            // a piece that fits under `SizeMax` but not this sector's current
            // free space.
            return Err(CoreError::SectorCapacityExceeded {
                size: piece.size,
                free: self.free,
            });
        }

        let prior_len = self
            .file
            .metadata()
            .map_err(CoreError::IoFailure)?
            .len();

        let write_result = (|| -> std::io::Result<()> {
            self.file.seek(SeekFrom::End(0))?;
            self.file.write_all(bytes)?;
            self.file.flush()
        })();

        if let Err(err) = write_result {
            // Truncate back to the pre-call length so a partial write can't leave
            // the file in a state inconsistent with the (unmodified) piece list.
            let _ = self.file.set_len(prior_len);
            return Err(CoreError::IoFailure(err));
        }

        self.free -= piece.size;
        self.pieces.push(piece);
        Ok(())
    }

    /// Reads the entirety of the backing file from the start.
    pub fn read_file(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path).map_err(CoreError::IoFailure)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(CoreError::IoFailure)?;
        Ok(buf)
    }

    pub fn metadata(&self) -> SectorMetadata {
        SectorMetadata {
            label: self.label.clone(),
            size: self.size_max,
            free: self.free,
            pieces: self.pieces.clone(),
            sealed: self.sealed.clone(),
        }
    }
}
