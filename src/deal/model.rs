// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The deal/proposal/voucher data model. See `SPEC_FULL.md` §3.

use cid::Cid;
use derive_builder::Builder;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque address of a chain actor (miner, payer, payment broker...). Real address
/// validation/network-prefix awareness belongs to the chain node, which is an
/// external collaborator here (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

/// Opaque payer signature over a canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

/// A time-locked payment authorization drawn on a payment channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub channel_id: String,
    /// Block height at which the voucher becomes redeemable.
    pub time_lock_min: u64,
    pub amount: BigInt,
    pub signature: Signature,
}

/// Payment substructure of a [`Proposal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct Payment {
    pub channel: String,
    pub pay_ch_actor: Address,
    pub payer: Address,
    pub channel_msg_cid: Cid,
    pub vouchers: Vec<Voucher>,
}

/// The body of a storage deal offer, signed by the payer before transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub piece_ref: Cid,
    pub size: u64,
    pub total_price: BigInt,
    pub duration: u64,
    pub miner_address: Address,
    pub payment: Payment,
}

/// A [`Proposal`] together with the payer's signature over its canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    pub proposal: Proposal,
    pub signature: Signature,
}

/// Closed set of terminal/in-progress states a miner may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseState {
    Accepted,
    Rejected,
    Failed,
    /// Deal accepted, data staged but not yet sealed. Opaque to this core beyond
    /// "not a terminal failure."
    Staged,
    /// Deal sealed and proven. Opaque to this core beyond "not a terminal failure."
    Posted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub proposal_cid: Cid,
    pub state: ResponseState,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub proposal_cid: Cid,
}

/// A persisted agreement record, uniquely keyed by `proposal`'s content identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub miner: Address,
    pub proposal: SignedProposal,
    pub response: Response,
}
