// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content-addressed persistence of [`Deal`] records (`SPEC_FULL.md` §4.3).

use std::sync::Arc;

use cid::Cid;

use crate::db::KeyValueStore;
use crate::deal::cid::{canonical_encode, proposal_cid};
use crate::deal::model::Deal;
use crate::error::{CoreError, Result};

#[derive(Clone)]
pub struct DealStore {
    db: Arc<dyn KeyValueStore>,
    client_prefix: String,
}

impl DealStore {
    pub fn new(db: Arc<dyn KeyValueStore>, client_prefix: impl Into<String>) -> Self {
        Self {
            db,
            client_prefix: client_prefix.into(),
        }
    }

    fn key(&self, proposal_cid: &Cid) -> String {
        format!("/{}/{proposal_cid}", self.client_prefix)
    }

    /// Persists `deal` under its proposal's content identifier. Overwrites a prior
    /// value at the same key without complaint; callers (the storage client) are
    /// responsible for the duplicate-check-then-insert contract (`SPEC_FULL.md` §9).
    pub fn put(&self, deal: &Deal) -> Result<()> {
        let cid = proposal_cid(&deal.proposal.proposal)?;
        let bytes = canonical_encode(deal).map_err(to_corrupt(&self.key(&cid)))?;
        self.db
            .write_bin(&self.key(&cid), &bytes)
            .map_err(io_err)
    }

    pub fn by_cid(&self, proposal_cid: &Cid) -> Result<Option<Deal>> {
        let key = self.key(proposal_cid);
        match self.db.read_bin(&key).map_err(io_err)? {
            None => Ok(None),
            Some(bytes) => serde_ipld_dagcbor::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CoreError::CorruptStore {
                    key,
                    source: e.into(),
                }),
        }
    }

    /// Full scan by prefix. A decode failure on *any* entry aborts the whole scan
    /// with `CorruptStore` — partial results are never returned (`SPEC_FULL.md` §9,
    /// resolving the open question against the upstream "skip on error" variant).
    pub fn ls(&self) -> Result<Vec<Deal>> {
        let prefix = format!("/{}/", self.client_prefix);
        let entries = self.db.scan_prefix(&prefix).map_err(io_err)?;
        entries
            .into_iter()
            .map(|(key, bytes)| {
                serde_ipld_dagcbor::from_slice(&bytes).map_err(|e| CoreError::CorruptStore {
                    key,
                    source: e.into(),
                })
            })
            .collect()
    }
}

fn to_corrupt(key: &str) -> impl Fn(anyhow::Error) -> CoreError + '_ {
    move |e| CoreError::CorruptStore {
        key: key.to_string(),
        source: e,
    }
}

fn io_err(e: anyhow::Error) -> CoreError {
    CoreError::IoFailure(std::io::Error::other(e))
}
