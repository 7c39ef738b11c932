// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Signing collaborator interface. The signing capability is injected, not
//! instantiated: the client signs exactly one buffer (the canonical proposal
//! encoding) per `ProposeDeal` call (`SPEC_FULL.md` §9).

use async_trait::async_trait;

use crate::deal::model::{Address, Signature};

#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign_bytes(&self, addr: &Address, bytes: &[u8]) -> anyhow::Result<Signature>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::*;

    /// Signs by hashing `addr || bytes` — not cryptographically meaningful, but
    /// deterministic and sufficient to exercise the signing seam in tests.
    pub struct FakeSigner;

    #[async_trait]
    impl Signer for FakeSigner {
        async fn sign_bytes(&self, addr: &Address, bytes: &[u8]) -> anyhow::Result<Signature> {
            let mut hasher = blake2b_simd::Params::new().hash_length(32).to_state();
            hasher.update(addr.0.as_bytes());
            hasher.update(bytes);
            Ok(Signature(hasher.finalize().as_bytes().to_vec()))
        }
    }
}
