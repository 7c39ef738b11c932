// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Strict request/response wire transport: open a peer stream for a named
//! protocol, write one request frame, read one response frame, close
//! (`SPEC_FULL.md` §4.2 "Wire protocol framing").

pub mod protocol;
pub mod transport;

use std::fmt;

pub use protocol::{DealCodec, MAKE_DEAL_PROTOCOL, QUERY_DEAL_PROTOCOL};
pub use transport::{Libp2pTransport, Transport};
#[cfg(any(test, feature = "test-utils"))]
pub use transport::fake;

/// Opaque peer identifier. Wraps a libp2p `PeerId` (base58 multihash string) to
/// keep `ChainApi`/`Transport` free of a hard compile-time dependency on exactly
/// which libp2p identity feature set is enabled in a given build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PeerId {
    /// Parses the production libp2p identity out of the wrapper.
    pub fn to_libp2p(&self) -> anyhow::Result<libp2p::PeerId> {
        self.0
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid peer id {}: {e}", self.0))
    }

    pub fn from_libp2p(id: libp2p::PeerId) -> Self {
        Self(id.to_string())
    }
}
