// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The error taxonomy shared by the sector builder and the storage client.
//!
//! Every public entry point in this crate returns `Result<T, CoreError>`. Internal
//! collaborator fakes (see [`crate::chain`] and [`crate::wire::fake`]) are free to use
//! `anyhow` since their callers only ever see the mapped `CoreError::Kind`.

use thiserror::Error;

/// The closed set of failure kinds this crate can surface. Every variant here has a
/// single, well-defined recovery path described in the module that raises it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// `piece.size` exceeds the sector's total `SizeMax`, raised by
    /// `SectorBuilder::add_piece` before a sector is ever chosen to hold the
    /// piece. Distinct from [`CoreError::SectorCapacityExceeded`], which is
    /// about a specific sector's remaining free space rather than `SizeMax`.
    #[error("piece of {size} bytes exceeds sector capacity of {max} bytes")]
    PieceTooLarge { size: u64, max: u64 },

    /// `piece.size` fits under `SizeMax` but not in the particular sector
    /// `Sector::write_piece` was asked to write it into.
    #[error("piece of {size} bytes exceeds sector's remaining free space of {free} bytes")]
    SectorCapacityExceeded { size: u64, free: u64 },

    /// `PieceInfo::size` did not match the number of bytes handed to
    /// `Sector::write_piece`.
    #[error("piece declares size {declared} bytes but {actual} bytes were written")]
    PieceSizeMismatch { declared: u64, actual: u64 },

    #[error("sector I/O failure: {0}")]
    IoFailure(#[source] std::io::Error),

    #[error("could not determine size of referenced data: {0}")]
    SizeUnknown(#[source] anyhow::Error),

    #[error("proposal is a duplicate of an existing deal for this miner and piece")]
    DuplicateDeal,

    #[error("proposal deadline exceeded")]
    Timeout,

    #[error("remote peer does not support protocol {protocol}")]
    PeerUnsupported { protocol: String },

    #[error("transport failure: {0}")]
    TransportFailure(#[source] anyhow::Error),

    #[error("deal proposal rejected by miner: {message}")]
    ProposalRejected { message: String },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("datastore corrupt: failed to decode entry at {key}: {source}")]
    CorruptStore {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// `true` for errors the caller can reasonably retry without changing any
    /// arguments (transient I/O, a transport hiccup, a slow collaborator).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::IoFailure(_) | CoreError::SizeUnknown(_) | CoreError::TransportFailure(_)
        )
    }
}
