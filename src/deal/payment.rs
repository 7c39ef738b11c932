// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Payment planner collaborator interface (`SPEC_FULL.md` §4.5, §2 "Payment
//! Planner"). Given price, duration, and channel-expiry policy, produces a funded
//! channel plus a vector of signed vouchers at regular intervals.

use async_trait::async_trait;
use cid::Cid;
use num_bigint::BigInt;

use crate::deal::model::{Address, Voucher};

#[derive(Debug, Clone)]
pub struct CreatePaymentsParams {
    pub from: Address,
    pub to: Address,
    pub value: BigInt,
    pub duration: u64,
    pub payment_interval: u64,
    pub channel_expiry: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentsReturn {
    pub channel: String,
    pub channel_msg_cid: Cid,
    pub vouchers: Vec<Voucher>,
}

#[async_trait]
pub trait PaymentPlanner: Send + Sync {
    async fn create_payments(
        &self,
        params: CreatePaymentsParams,
    ) -> anyhow::Result<CreatePaymentsReturn>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::*;
    use crate::deal::cid::content_hash;
    use crate::deal::model::Signature;

    /// Produces one voucher per `payment_interval` blocks for the deal's
    /// `duration`, each carrying a pro-rata share of `value`, mirroring the
    /// allocation `CreatePayments` performs upstream.
    pub struct FakePaymentPlanner;

    #[async_trait]
    impl PaymentPlanner for FakePaymentPlanner {
        async fn create_payments(
            &self,
            params: CreatePaymentsParams,
        ) -> anyhow::Result<CreatePaymentsReturn> {
            let num_vouchers = (params.duration / params.payment_interval).max(1);
            let per_voucher = &params.value / BigInt::from(num_vouchers);

            let channel = format!("chan-{}-{}", params.from, params.to);
            let vouchers = (0..num_vouchers)
                .map(|i| Voucher {
                    channel_id: channel.clone(),
                    time_lock_min: i * params.payment_interval,
                    amount: per_voucher.clone() * BigInt::from(i + 1),
                    signature: Signature(vec![]),
                })
                .collect();

            let channel_msg_cid = content_hash(format!("msg-{channel}").as_bytes());
            Ok(CreatePaymentsReturn {
                channel,
                channel_msg_cid,
                vouchers,
            })
        }
    }
}
