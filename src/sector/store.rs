// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Metadata persistence for the sector builder, over the generic
//! [`crate::db::KeyValueStore`]. Key layout is normative — see `SPEC_FULL.md` §4.1/§6.

use std::sync::Arc;

use crate::db::{KeyValueStore, KeyValueStoreExt};
use crate::error::{CoreError, Result};
use crate::sector::sealed::SealedSectorMetadata;
use crate::sector::sector::SectorMetadata;

pub fn metadata_key(label: &str) -> String {
    format!("/sectors/metadata/{label}")
}

pub fn sealed_metadata_key(merkle_root_hex: &str) -> String {
    format!("/sealedSectors/metadata/{merkle_root_hex}")
}

/// Thin, clonable handle over a [`KeyValueStore`] that knows the sector builder's
/// key layout. Kept separate from `SectorBuilder` so it can be unit tested in
/// isolation from the in-memory arena and sealing worker.
#[derive(Clone)]
pub struct SectorMetadataStore {
    db: Arc<dyn KeyValueStore>,
}

impl SectorMetadataStore {
    pub fn new(db: Arc<dyn KeyValueStore>) -> Self {
        Self { db }
    }

    pub fn put_sector(&self, meta: &SectorMetadata) -> Result<()> {
        self.db
            .write_obj(&metadata_key(&meta.label), meta)
            .map_err(|e| CoreError::IoFailure(to_io_error(e)))
    }

    pub fn get_sector(&self, label: &str) -> Result<SectorMetadata> {
        self.db
            .read_obj(&metadata_key(label))
            .map_err(|e| CoreError::IoFailure(to_io_error(e)))?
            .ok_or_else(|| CoreError::NotFound(format!("sector metadata for label {label}")))
    }

    pub fn put_sealed(&self, meta: &SealedSectorMetadata) -> Result<()> {
        self.db
            .write_obj(&sealed_metadata_key(&meta.merkle_root_hex), meta)
            .map_err(|e| CoreError::IoFailure(to_io_error(e)))
    }

    pub fn get_sealed(&self, merkle_root_hex: &str) -> Result<SealedSectorMetadata> {
        self.db
            .read_obj(&sealed_metadata_key(merkle_root_hex))
            .map_err(|e| CoreError::IoFailure(to_io_error(e)))?
            .ok_or_else(|| {
                CoreError::NotFound(format!("sealed sector metadata for root {merkle_root_hex}"))
            })
    }
}

fn to_io_error(e: anyhow::Error) -> std::io::Error {
    std::io::Error::other(e)
}
