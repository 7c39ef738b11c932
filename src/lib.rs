// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Sector builder and storage-deal client core for a Filecoin-like storage
//! network.
//!
//! Two subsystems live here, loosely coupled through [`sector`] and [`deal`]:
//! the sector builder packs caller-submitted pieces into fixed-capacity
//! sectors and drives their sealing; the storage client negotiates deals with
//! remote miners over a request/response wire protocol and persists the
//! resulting agreements. Everything outside these two — the chain node, the
//! proving backend, the libp2p swarm itself — is represented as a trait and
//! consumed, never implemented, by this crate (see [`deal::chain_api`],
//! [`sector::seal`], [`wire::transport`]).

pub mod config;
pub mod db;
pub mod deal;
pub mod error;
pub mod sector;
pub mod wire;

pub use error::{CoreError, Result};
