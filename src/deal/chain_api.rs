// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Chain-node collaborator interface consumed by the storage client
//! (`SPEC_FULL.md` §4.5). Everything here is an external system in production;
//! this crate only defines the seam and ships a fake good enough to drive tests.

use async_trait::async_trait;
use cid::Cid;
use num_bigint::BigInt;

use crate::deal::model::Address;
use crate::wire::PeerId;

/// A miner's advertised unit price and terms, as returned by `MinerGetAsk`.
#[derive(Debug, Clone)]
pub struct Ask {
    pub id: u64,
    /// Price per byte per block.
    pub price: BigInt,
}

/// Everything the storage client needs from the chain node: block height, miner
/// lookups, file size resolution, and the default sender address. One trait
/// stands in for what upstream splits across `clientNode`/`clientPorcelainAPI`.
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn chain_block_height(&self) -> anyhow::Result<u64>;
    async fn miner_get_ask(&self, miner: &Address, ask_id: u64) -> anyhow::Result<Ask>;
    async fn miner_get_owner_address(&self, miner: &Address) -> anyhow::Result<Address>;
    async fn miner_get_peer_id(&self, miner: &Address) -> anyhow::Result<PeerId>;
    async fn get_file_size(&self, piece_ref: &Cid) -> anyhow::Result<u64>;
    async fn default_sender_address(&self) -> anyhow::Result<Address>;
    /// Nominal block time, used to derive the `4 * blockTime` proposal deadline.
    fn block_time(&self) -> std::time::Duration;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// An in-memory chain double. Every lookup is pre-seeded by the test that
    /// constructs it; nothing here touches the network or a real ledger.
    pub struct FakeChainApi {
        pub height: Mutex<u64>,
        pub asks: HashMap<Address, Ask>,
        pub owners: HashMap<Address, Address>,
        pub peer_ids: HashMap<Address, PeerId>,
        pub file_sizes: HashMap<Cid, u64>,
        pub sender: Address,
        pub block_time: Duration,
    }

    impl Default for FakeChainApi {
        fn default() -> Self {
            Self {
                height: Mutex::new(1000),
                asks: HashMap::new(),
                owners: HashMap::new(),
                peer_ids: HashMap::new(),
                file_sizes: HashMap::new(),
                sender: Address::new("f01001"),
                block_time: Duration::from_millis(5),
            }
        }
    }

    #[async_trait]
    impl ChainApi for FakeChainApi {
        async fn chain_block_height(&self) -> anyhow::Result<u64> {
            Ok(*self.height.lock().unwrap())
        }

        async fn miner_get_ask(&self, miner: &Address, ask_id: u64) -> anyhow::Result<Ask> {
            self.asks
                .get(miner)
                .map(|ask| Ask {
                    id: ask_id,
                    price: ask.price.clone(),
                })
                .ok_or_else(|| anyhow::anyhow!("no ask for miner {miner}"))
        }

        async fn miner_get_owner_address(&self, miner: &Address) -> anyhow::Result<Address> {
            self.owners
                .get(miner)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no owner for miner {miner}"))
        }

        async fn miner_get_peer_id(&self, miner: &Address) -> anyhow::Result<PeerId> {
            self.peer_ids
                .get(miner)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no peer id for miner {miner}"))
        }

        async fn get_file_size(&self, piece_ref: &Cid) -> anyhow::Result<u64> {
            self.file_sizes
                .get(piece_ref)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unknown size for {piece_ref}"))
        }

        async fn default_sender_address(&self) -> anyhow::Result<Address> {
            Ok(self.sender.clone())
        }

        fn block_time(&self) -> Duration {
            self.block_time
        }
    }
}
