// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Raw request/response transport over a named protocol. `StorageClient` and
//! the deal-serving side both talk to a peer purely in terms of
//! [`Transport::request`]; everything libp2p-specific — swarm driving,
//! connection dialing, protocol negotiation — lives behind this seam
//! (`SPEC_FULL.md` §4.5, grounded on forest's `libp2p/chain_exchange/request_manager.rs`
//! channel-plus-background-task pattern).

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::request_response::{self, OutboundRequestId};
use libp2p::swarm::SwarmEvent;
use libp2p::{PeerId as Libp2pPeerId, StreamProtocol, Swarm};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::wire::protocol::{DealCodec, Frame};
use crate::wire::PeerId;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `payload` to `peer` over `protocol` and returns the single
    /// response frame. One request, one response, per call.
    async fn request(&self, peer: &PeerId, protocol: StreamProtocol, payload: Frame) -> Result<Frame>;
}

type PendingMap = std::collections::HashMap<OutboundRequestId, oneshot::Sender<Result<Frame>>>;

/// Drives a `libp2p::Swarm` on a background task; `request` sends work to it
/// over a channel and awaits a one-shot reply. Never exercised directly by the
/// test suite (see [`fake::FakeTransport`]) but kept fully specified as the
/// ambient production implementation.
pub struct Libp2pTransport {
    cmd_tx: tokio::sync::mpsc::UnboundedSender<Command>,
}

enum Command {
    Request {
        peer: Libp2pPeerId,
        payload: Frame,
        reply: oneshot::Sender<Result<Frame>>,
    },
}

impl Libp2pTransport {
    /// Takes ownership of an already-configured swarm (transport, protocols,
    /// local keypair) and spawns the task that drives it.
    pub fn spawn(mut swarm: Swarm<request_response::Behaviour<DealCodec>>) -> Self {
        let (cmd_tx, mut cmd_rx) = tokio::sync::mpsc::unbounded_channel::<Command>();

        tokio::spawn(async move {
            let mut pending: PendingMap = std::collections::HashMap::new();
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(Command::Request { peer, payload, reply }) => {
                                let request_id = swarm.behaviour_mut().send_request(&peer, payload);
                                pending.insert(request_id, reply);
                            }
                            None => break,
                        }
                    }
                    event = swarm.select_next_some() => {
                        match event {
                            SwarmEvent::Behaviour(request_response::Event::Message { message, .. }) => {
                                match message {
                                    request_response::Message::Response { request_id, response } => {
                                        if let Some(tx) = pending.remove(&request_id) {
                                            let _ = tx.send(Ok(response));
                                        }
                                    }
                                    request_response::Message::Request { .. } => {
                                        debug!("ignoring inbound request on outbound-only transport handle");
                                    }
                                }
                            }
                            SwarmEvent::Behaviour(request_response::Event::OutboundFailure {
                                request_id,
                                error,
                                ..
                            }) => {
                                if let Some(tx) = pending.remove(&request_id) {
                                    let err = match error {
                                        request_response::OutboundFailure::UnsupportedProtocols => {
                                            CoreError::PeerUnsupported {
                                                protocol: "unknown".to_string(),
                                            }
                                        }
                                        other => CoreError::TransportFailure(anyhow::anyhow!(other.to_string())),
                                    };
                                    let _ = tx.send(Err(err));
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        Self { cmd_tx }
    }
}

#[async_trait]
impl Transport for Libp2pTransport {
    async fn request(&self, peer: &PeerId, _protocol: StreamProtocol, payload: Frame) -> Result<Frame> {
        let peer_id = peer
            .to_libp2p()
            .map_err(CoreError::TransportFailure)?;
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request {
                peer: peer_id,
                payload,
                reply,
            })
            .map_err(|_| CoreError::TransportFailure(anyhow::anyhow!("transport task has shut down")))?;
        rx.await
            .map_err(|_| CoreError::TransportFailure(anyhow::anyhow!("transport task dropped the reply channel")))?
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// What the fake should do for a given `(peer, protocol)` pair.
    pub enum Scripted {
        Respond(Frame),
        Unsupported,
        Fail(String),
    }

    /// Scripted responses keyed by `(peer, protocol)`, and an observation log of
    /// every request actually sent, so tests can assert both outcome and intent.
    #[derive(Default)]
    pub struct FakeTransport {
        responses: Mutex<HashMap<(String, String), Scripted>>,
        sent: Mutex<Vec<(PeerId, String, Frame)>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script_response(&self, peer: &PeerId, protocol: &StreamProtocol, frame: Frame) {
            self.responses
                .lock()
                .insert((peer.0.clone(), protocol.to_string()), Scripted::Respond(frame));
        }

        pub fn script_unsupported(&self, peer: &PeerId, protocol: &StreamProtocol) {
            self.responses
                .lock()
                .insert((peer.0.clone(), protocol.to_string()), Scripted::Unsupported);
        }

        pub fn script_failure(&self, peer: &PeerId, protocol: &StreamProtocol, message: impl Into<String>) {
            self.responses
                .lock()
                .insert((peer.0.clone(), protocol.to_string()), Scripted::Fail(message.into()));
        }

        pub fn sent_requests(&self) -> Vec<(PeerId, String, Frame)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn request(&self, peer: &PeerId, protocol: StreamProtocol, payload: Frame) -> Result<Frame> {
            self.sent
                .lock()
                .push((peer.clone(), protocol.to_string(), payload));

            let key = (peer.0.clone(), protocol.to_string());
            match self.responses.lock().get(&key) {
                Some(Scripted::Respond(frame)) => Ok(frame.clone()),
                Some(Scripted::Fail(msg)) => Err(CoreError::TransportFailure(anyhow::anyhow!(msg.clone()))),
                Some(Scripted::Unsupported) | None => Err(CoreError::PeerUnsupported {
                    protocol: protocol.to_string(),
                }),
            }
        }
    }
}
