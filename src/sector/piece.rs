// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use serde::{Deserialize, Serialize};

/// One caller-submitted byte run placed into a sector.
///
/// `size` must equal the number of bytes actually appended to the sector's backing
/// file for this piece; the sector builder enforces this at write time rather than
/// trusting the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceInfo {
    /// Content identifier of the source data, if the piece was fetched from the
    /// block service rather than supplied as raw bytes.
    #[serde(rename = "Ref", skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<Cid>,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "DealID")]
    pub deal_id: u64,
}

impl PieceInfo {
    pub fn new(size: u64, deal_id: u64) -> Self {
        Self {
            r#ref: None,
            size,
            deal_id,
        }
    }

    pub fn with_ref(mut self, r#ref: Cid) -> Self {
        self.r#ref = Some(r#ref);
        self
    }
}
