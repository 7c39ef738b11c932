// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Plain configuration structs for the pieces of the system this crate actually owns.
//!
//! Loading these from a TOML file, merging with CLI flags, or wiring them into a
//! Prometheus exporter is the job of the surrounding node binary and is out of scope
//! here (see `SPEC_FULL.md` §1). These types exist purely so the builder and client
//! constructors aren't forced to take a dozen positional arguments.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sizing and directory layout for a [`crate::sector::builder::SectorBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorBuilderConfig {
    /// Maximum number of bytes a single sector may hold before it is sealed.
    pub sector_size_max: u64,
    /// Directory staged (unsealed) sector files are written into.
    pub staging_dir: PathBuf,
    /// Directory sealed sector files are written into.
    pub sealed_dir: PathBuf,
    /// How many sectors may be sealed concurrently. The spec leaves this unbounded
    /// in the public contract; the default of 1 matches the simplest, safest choice.
    pub seal_concurrency: usize,
}

impl SectorBuilderConfig {
    pub fn new(sector_size_max: u64, staging_dir: PathBuf, sealed_dir: PathBuf) -> Self {
        Self {
            sector_size_max,
            staging_dir,
            sealed_dir,
            seal_concurrency: 1,
        }
    }
}

/// Timing constants and namespacing for the [`crate::deal::client::StorageClient`].
///
/// The four payment-related constants are normative (§4.2) and are not meant to be
/// tuned per deployment; they are still plain fields (rather than free constants) so
/// tests can exercise alternate values without touching the client's source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageClientConfig {
    /// Datastore key prefix deals are namespaced under, e.g. `"storageDeals"`.
    pub client_prefix: String,
    /// Duration of one chain block; the proposal deadline is `4 * block_time`.
    pub block_time: Duration,
    pub voucher_interval: u64,
    pub channel_expiry_interval: u64,
    pub create_channel_gas_price: u64,
    pub create_channel_gas_limit: u64,
}

impl Default for StorageClientConfig {
    fn default() -> Self {
        Self {
            client_prefix: "storageDeals".to_string(),
            block_time: Duration::from_secs(30),
            voucher_interval: crate::deal::client::VOUCHER_INTERVAL,
            channel_expiry_interval: crate::deal::client::CHANNEL_EXPIRY_INTERVAL,
            create_channel_gas_price: crate::deal::client::CREATE_CHANNEL_GAS_PRICE,
            create_channel_gas_limit: crate::deal::client::CREATE_CHANNEL_GAS_LIMIT,
        }
    }
}

impl StorageClientConfig {
    pub fn proposal_deadline(&self) -> Duration {
        self.block_time * 4
    }
}
