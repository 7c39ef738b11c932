// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The storage-deal client: price discovery, payment-channel funding, proposal
//! signing, the wire round trip, and deal persistence (`SPEC_FULL.md` §4.2-§4.5).

pub mod chain_api;
pub mod cid;
pub mod client;
pub mod model;
pub mod payment;
pub mod signer;
pub mod store;

pub use chain_api::{Ask, ChainApi};
pub use client::StorageClient;
pub use model::{
    Address, Deal, Payment, Proposal, QueryRequest, Response, ResponseState, Signature,
    SignedProposal, Voucher,
};
pub use payment::{CreatePaymentsParams, CreatePaymentsReturn, PaymentPlanner};
pub use signer::Signer;
pub use store::DealStore;
