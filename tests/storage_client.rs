// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! End-to-end storage-client scenarios against fake collaborators: a clean
//! proposal round trip, duplicate-deal rejection, and response validation.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigInt;
use storage_deal_core::db::MemoryStore;
use storage_deal_core::deal::chain_api::{fake::FakeChainApi, Ask};
use storage_deal_core::deal::cid::{canonical_encode, content_hash, proposal_cid};
use storage_deal_core::deal::model::{
    Address, Payment, Proposal, Response, ResponseState, Voucher,
};
use storage_deal_core::deal::payment::fake::FakePaymentPlanner;
use storage_deal_core::deal::signer::fake::FakeSigner;
use storage_deal_core::deal::{DealStore, StorageClient};
use storage_deal_core::error::CoreError;
use storage_deal_core::wire::fake::FakeTransport;
use storage_deal_core::wire::{PeerId, MAKE_DEAL_PROTOCOL};

const BROKER: &str = "f0payee-broker";

fn miner() -> Address {
    Address::new("f0miner")
}

fn piece() -> cid::Cid {
    content_hash(b"some piece of client data")
}

fn seeded_chain() -> FakeChainApi {
    let mut file_sizes = HashMap::new();
    file_sizes.insert(piece(), 100u64);

    let mut asks = HashMap::new();
    asks.insert(
        miner(),
        Ask {
            id: 7,
            price: BigInt::from(3),
        },
    );

    let mut owners = HashMap::new();
    owners.insert(miner(), Address::new("f0owner"));

    let mut peer_ids = HashMap::new();
    peer_ids.insert(miner(), PeerId("peer-miner".into()));

    FakeChainApi {
        file_sizes,
        asks,
        owners,
        peer_ids,
        ..FakeChainApi::default()
    }
}

fn expected_proposal(payer: &str, payee: &str) -> Proposal {
    let channel = format!("chan-{payer}-{payee}");
    Proposal {
        piece_ref: piece(),
        size: 100,
        total_price: BigInt::from(3 * 100 * 10),
        duration: 10,
        miner_address: miner(),
        payment: Payment {
            channel: channel.clone(),
            pay_ch_actor: Address::new(BROKER),
            payer: Address::new(payer),
            channel_msg_cid: content_hash(format!("msg-{channel}").as_bytes()),
            vouchers: vec![Voucher {
                channel_id: channel,
                time_lock_min: 0,
                amount: BigInt::from(3000),
                signature: storage_deal_core::deal::model::Signature(vec![]),
            }],
        },
    }
}

fn client_with(transport: Arc<FakeTransport>) -> StorageClient {
    StorageClient::new(
        Arc::new(seeded_chain()),
        Arc::new(FakePaymentPlanner),
        Arc::new(FakeSigner),
        transport,
        DealStore::new(Arc::new(MemoryStore::default()), "storageDeals"),
    )
}

#[tokio::test]
async fn propose_deal_round_trips_to_an_accepted_deal() {
    let transport = Arc::new(FakeTransport::new());
    let proposal = expected_proposal("f01001", "f0owner");
    let cid = proposal_cid(&proposal).unwrap();
    let response = Response {
        proposal_cid: cid,
        state: ResponseState::Accepted,
        message: String::new(),
    };
    transport.script_response(
        &PeerId("peer-miner".into()),
        &MAKE_DEAL_PROTOCOL,
        canonical_encode(&response).unwrap(),
    );

    let client = client_with(transport.clone());
    let got = client
        .propose_deal(miner(), piece(), 7, 10, false)
        .await
        .unwrap();
    assert!(matches!(got.state, ResponseState::Accepted));
    assert_eq!(got.proposal_cid, cid);

    let vouchers = client.load_vouchers_for_deal(&cid).unwrap();
    assert_eq!(vouchers.len(), 1);

    let sent = transport.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, PeerId("peer-miner".into()));
}

#[tokio::test]
async fn duplicate_proposal_without_allow_duplicates_is_rejected() {
    let transport = Arc::new(FakeTransport::new());
    let proposal = expected_proposal("f01001", "f0owner");
    let cid = proposal_cid(&proposal).unwrap();
    let response = Response {
        proposal_cid: cid,
        state: ResponseState::Accepted,
        message: String::new(),
    };
    transport.script_response(
        &PeerId("peer-miner".into()),
        &MAKE_DEAL_PROTOCOL,
        canonical_encode(&response).unwrap(),
    );

    let client = client_with(transport.clone());
    client
        .propose_deal(miner(), piece(), 7, 10, false)
        .await
        .unwrap();

    let err = client
        .propose_deal(miner(), piece(), 7, 10, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateDeal));

    // A third call with allow_duplicates=true for the same (miner, piece) skips
    // the step-9 duplicate check; a different duration keeps its proposal cid
    // distinct from the first deal's, so it is free to persist as its own
    // record rather than tripping the step-17 same-cid race guard.
    let second_proposal = {
        let mut p = expected_proposal("f01001", "f0owner");
        p.duration = 20;
        p.total_price = BigInt::from(3 * 100 * 20);
        p.payment.vouchers[0].amount = BigInt::from(3 * 100 * 20);
        p
    };
    let second_cid = proposal_cid(&second_proposal).unwrap();
    transport.script_response(
        &PeerId("peer-miner".into()),
        &MAKE_DEAL_PROTOCOL,
        canonical_encode(&Response {
            proposal_cid: second_cid,
            state: ResponseState::Accepted,
            message: String::new(),
        })
        .unwrap(),
    );

    let again = client
        .propose_deal(miner(), piece(), 7, 20, true)
        .await
        .unwrap();
    assert!(matches!(again.state, ResponseState::Accepted));
    assert_eq!(client.load_vouchers_for_deal(&second_cid).unwrap().len(), 1);
}

#[tokio::test]
async fn mismatched_response_cid_is_a_protocol_violation_and_nothing_persists() {
    let transport = Arc::new(FakeTransport::new());
    let wrong = Response {
        proposal_cid: content_hash(b"not the real proposal"),
        state: ResponseState::Accepted,
        message: String::new(),
    };
    transport.script_response(
        &PeerId("peer-miner".into()),
        &MAKE_DEAL_PROTOCOL,
        canonical_encode(&wrong).unwrap(),
    );

    let client = client_with(transport);
    let err = client
        .propose_deal(miner(), piece(), 7, 10, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProtocolViolation(_)));
}

#[tokio::test]
async fn peer_that_does_not_support_the_protocol_surfaces_peer_unsupported() {
    // No scripted response for this peer/protocol pair: the fake transport
    // defaults to reporting the protocol as unsupported.
    let transport = Arc::new(FakeTransport::new());
    let client = client_with(transport);

    let err = client
        .propose_deal(miner(), piece(), 7, 10, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PeerUnsupported { .. }));
}
