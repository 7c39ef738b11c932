// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! End-to-end sector builder scenarios: size bounds, overflow-triggered
//! sealing and rollover, oversized pieces, and path uniqueness.

use std::sync::Arc;

use storage_deal_core::config::SectorBuilderConfig;
use storage_deal_core::db::MemoryStore;
use storage_deal_core::error::CoreError;
use storage_deal_core::sector::{FakeSealer, PieceInfo, SealParams, SectorBuilder};

fn builder(size_max: u64) -> (SectorBuilder, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = SectorBuilderConfig::new(
        size_max,
        dir.path().join("staging"),
        dir.path().join("sealed"),
    );
    let builder = SectorBuilder::new(
        config,
        "f01000",
        SealParams::default(),
        Arc::new(MemoryStore::default()),
        Arc::new(FakeSealer::default()),
    )
    .unwrap();
    (builder, dir)
}

#[tokio::test]
async fn size_bounds_track_free_capacity() {
    let (b, _dir) = builder(60);

    b.add_piece(
        PieceInfo::new(26, 1),
        b"What's our vector, sector?",
    )
    .unwrap();
    b.add_piece(
        PieceInfo::new(28, 2),
        b"We have clearance, Clarence.",
    )
    .unwrap();

    let meta = b.cur_metadata();
    assert_eq!(meta.pieces.len(), 2);
    assert_eq!(meta.free, 6);
    assert!(meta.sealed.is_none());
    assert_eq!(
        b.read_sector(&meta.label).unwrap(),
        b"What's our vector, sector?We have clearance, Clarence."
    );
}

#[tokio::test]
async fn overflow_seals_and_rolls_over() {
    let (b, _dir) = builder(60);

    b.add_piece(PieceInfo::new(26, 1), b"What's our vector, sector?")
        .unwrap();
    b.add_piece(PieceInfo::new(28, 2), b"We have clearance, Clarence.")
        .unwrap();
    let first_label = b.cur_label();

    b.add_piece(
        PieceInfo::new(29, 3),
        b"I'm too sexy for this sector.",
    )
    .unwrap();

    // The first sector froze and should (eventually) seal; wait instead of
    // sleeping, per the design's WaitForSeal handle.
    let root = b
        .wait_for_seal(&first_label)
        .await
        .unwrap()
        .expect("seal should succeed");

    let first_meta = b.get_meta(&first_label).unwrap();
    assert_eq!(first_meta.sealed.as_deref(), Some(root.as_str()));
    assert_eq!(first_meta.pieces.len(), 2);
    assert_eq!(b.read_sector(&first_label).unwrap().len(), 54);
    assert_eq!(b.read_sealed(&root).unwrap(), b.read_sector(&first_label).unwrap());

    let new_label = b.cur_label();
    assert_ne!(new_label, first_label);
    let new_meta = b.cur_metadata();
    assert_eq!(new_meta.pieces.len(), 1);
    assert_eq!(new_meta.size, 60);
    assert_eq!(new_meta.free, 31);
}

#[tokio::test]
async fn oversized_piece_is_rejected_without_state_change() {
    let (b, _dir) = builder(60);
    let before = b.cur_metadata();

    let oversized = "x".repeat(87);
    let err = b
        .add_piece(PieceInfo::new(87, 1), oversized.as_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::PieceTooLarge { size: 87, max: 60 }
    ));

    let after = b.cur_metadata();
    assert_eq!(before, after);
}

#[tokio::test]
async fn sector_and_sealed_paths_are_unique() {
    let (b, dir) = builder(60);

    let p1 = b.new_sector_path();
    let p2 = b.new_sector_path();
    assert_ne!(p1, p2);
    assert!(p1.starts_with(dir.path().join("staging")));
    assert!(p2.starts_with(dir.path().join("staging")));

    let s1 = b.new_sealed_sector_path();
    let s2 = b.new_sealed_sector_path();
    assert_ne!(s1, s2);
    assert!(s1.starts_with(dir.path().join("sealed")));
    assert!(s2.starts_with(dir.path().join("sealed")));
}

#[tokio::test]
async fn waiting_for_seal_of_an_already_sealed_sector_resolves_immediately() {
    let (b, _dir) = builder(10);
    b.add_piece(PieceInfo::new(8, 1), b"12345678").unwrap();
    let first_label = b.cur_label();

    // Force overflow to trigger sealing of `first_label`.
    b.add_piece(PieceInfo::new(8, 2), b"abcdefgh").unwrap();
    let root = b.wait_for_seal(&first_label).await.unwrap().unwrap();

    // A second wait, issued after the seal already completed, must still resolve.
    let root_again = b.wait_for_seal(&first_label).await.unwrap().unwrap();
    assert_eq!(root, root_again);
}
