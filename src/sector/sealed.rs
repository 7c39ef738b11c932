// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::sector::piece::PieceInfo;

/// Snapshot of a sealed sector's state, persisted verbatim under its metadata key
/// (`"/sealedSectors/metadata/<hex-merkleRoot>"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSectorMetadata {
    /// Label of the raw sector this was derived from. Referenced by label rather
    /// than by owned/shared pointer, so `Sector` and `SealedSector` never form an
    /// ownership cycle.
    pub base_label: String,
    pub merkle_root_hex: String,
    pub pieces: Vec<PieceInfo>,
}

/// Derived artifact of sealing: the padded, permuted replica bytes plus the merkle
/// commitment over them. `base_label` is immutable once sealing has started.
pub struct SealedSector {
    pub base_label: String,
    pub path: PathBuf,
    pub merkle_root: Vec<u8>,
    pub replica_data: Vec<u8>,
}

impl SealedSector {
    /// Writes `replica_data` to `path` and returns the handle. The caller is
    /// expected to have already computed `merkle_root` via the [`crate::sector::seal::Sealer`]
    /// trait.
    pub fn write(
        path: impl AsRef<Path>,
        base_label: String,
        merkle_root: Vec<u8>,
        replica_data: Vec<u8>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path).map_err(CoreError::IoFailure)?;
        file.write_all(&replica_data).map_err(CoreError::IoFailure)?;
        file.flush().map_err(CoreError::IoFailure)?;
        Ok(Self {
            base_label,
            path,
            merkle_root,
            replica_data,
        })
    }

    pub fn merkle_root_hex(&self) -> String {
        hex::encode(&self.merkle_root)
    }

    pub fn read_file(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path).map_err(CoreError::IoFailure)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(CoreError::IoFailure)?;
        Ok(buf)
    }

    pub fn metadata(&self, pieces: Vec<PieceInfo>) -> SealedSectorMetadata {
        SealedSectorMetadata {
            base_label: self.base_label.clone(),
            merkle_root_hex: self.merkle_root_hex(),
            pieces,
        }
    }
}

/// Unique path for a sealed sector file under `sealed_dir`.
pub fn new_sealed_sector_path(sealed_dir: impl AsRef<Path>) -> PathBuf {
    sealed_dir.as_ref().join(crate::sector::sector::new_sector_label())
}

/// Ensures the sealed-sector directory exists; mirrors `new_sector_path`'s staging
/// directory precondition.
pub fn ensure_sealed_dir(sealed_dir: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(sealed_dir).map_err(CoreError::IoFailure)
}
