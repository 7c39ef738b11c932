// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-disk sector layout, capacity accounting, and the asynchronous sealing
//! handoff. See `SPEC_FULL.md` §4.1.

pub mod builder;
pub mod piece;
pub mod seal;
pub mod sealed;
pub mod sector;
pub mod store;

pub use builder::SectorBuilder;
pub use piece::PieceInfo;
pub use seal::{FakeSealer, SealParams, Sealer};
pub use sealed::{SealedSector, SealedSectorMetadata};
pub use sector::{Sector, SectorMetadata};
