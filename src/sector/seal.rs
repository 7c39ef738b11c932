// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The proof-of-replication primitive is an external collaborator (`SPEC_FULL.md`
//! §1, §4.5): this crate only defines the seam it plugs into.

/// Opaque sealing parameters; the real implementation would carry a porep config,
/// replica id, and proving parameters. Treated as an opaque blob here.
#[derive(Debug, Clone, Default)]
pub struct SealParams(pub Vec<u8>);

/// `Seal(bytes, minerAddr, params) -> (replicaBytes, merkleRoot)`.
pub trait Sealer: Send + Sync {
    fn seal(
        &self,
        sector_bytes: &[u8],
        miner_address: &str,
        params: &SealParams,
    ) -> anyhow::Result<(Vec<u8>, Vec<u8>)>;
}

/// A deterministic stand-in for the real proof-of-replication backend, used by the
/// test suite and suitable for demonstrating the seam: it pads `sector_bytes` up to
/// a fixed alignment (mimicking PoRep's padding behavior) and derives the "merkle
/// root" as a BLAKE2b-256 hash of the padded bytes plus the miner address.
pub struct FakeSealer {
    pub padding_alignment: usize,
}

impl Default for FakeSealer {
    fn default() -> Self {
        Self {
            padding_alignment: 32,
        }
    }
}

impl Sealer for FakeSealer {
    fn seal(
        &self,
        sector_bytes: &[u8],
        miner_address: &str,
        params: &SealParams,
    ) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
        let mut replica = sector_bytes.to_vec();
        let remainder = replica.len() % self.padding_alignment;
        if remainder != 0 {
            replica.resize(replica.len() + (self.padding_alignment - remainder), 0);
        }

        let mut hasher = blake2b_simd::Params::new().hash_length(32).to_state();
        hasher.update(&replica);
        hasher.update(miner_address.as_bytes());
        hasher.update(&params.0);
        let merkle_root = hasher.finalize().as_bytes().to_vec();

        Ok((replica, merkle_root))
    }
}
