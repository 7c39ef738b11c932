// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Canonical encoding and content addressing for proposals (`SPEC_FULL.md` §6).

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::Serialize;

use crate::deal::model::Proposal;
use crate::error::{CoreError, Result};

/// DAG-CBOR multicodec, per the multicodec table.
pub const DAG_CBOR_CODEC: u64 = 0x71;

/// Deterministic binary encoding used both on the wire and for content hashing.
pub fn canonical_encode<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    Ok(serde_ipld_dagcbor::to_vec(value)?)
}

/// BLAKE2b-256 content hash of `bytes`, wrapped as a CIDv1 with the DAG-CBOR codec.
pub fn content_hash(bytes: &[u8]) -> Cid {
    let digest = Code::Blake2b256.digest(bytes);
    Cid::new_v1(DAG_CBOR_CODEC, digest)
}

/// `contentHash(canonicalEncode(proposal))`, i.e. the `ProposalCid` that becomes a
/// deal's primary key.
pub fn proposal_cid(proposal: &Proposal) -> Result<Cid> {
    let bytes = canonical_encode(proposal).map_err(|e| CoreError::ProtocolViolation(e.to_string()))?;
    Ok(content_hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::model::{Address, Payment, Proposal};
    use num_bigint::BigInt;

    fn sample_proposal() -> Proposal {
        Proposal {
            piece_ref: content_hash(b"piece"),
            size: 100,
            total_price: BigInt::from(1000),
            duration: 10,
            miner_address: Address::new("f01000"),
            payment: Payment {
                channel: "chan1".into(),
                pay_ch_actor: Address::new("f0paymentbroker"),
                payer: Address::new("f01001"),
                channel_msg_cid: content_hash(b"msg"),
                vouchers: vec![],
            },
        }
    }

    #[test]
    fn same_proposal_hashes_to_same_cid() {
        let p = sample_proposal();
        assert_eq!(proposal_cid(&p).unwrap(), proposal_cid(&p).unwrap());
    }

    #[test]
    fn different_proposals_hash_differently() {
        let mut p = sample_proposal();
        let cid1 = proposal_cid(&p).unwrap();
        p.size = 200;
        let cid2 = proposal_cid(&p).unwrap();
        assert_ne!(cid1, cid2);
    }
}
