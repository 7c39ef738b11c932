// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The two named peer protocols and the length-prefixed frame codec shared by
//! both. Exact protocol-id strings are configuration, not constants burned into
//! the codec (`SPEC_FULL.md` §6), but sensible defaults are provided here.

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::StreamProtocol;

/// New-deal proposal protocol (`makeDealProtocol`).
pub const MAKE_DEAL_PROTOCOL: StreamProtocol = StreamProtocol::new("/fil/storage/mk/1.0.0");
/// Deal-query protocol (`queryDealProtocol`).
pub const QUERY_DEAL_PROTOCOL: StreamProtocol = StreamProtocol::new("/fil/storage/qry/1.0.0");

/// Refuse to read a frame whose declared length exceeds this, so a misbehaving
/// peer can't force an unbounded allocation.
const MAX_FRAME_LEN: u32 = 4 * 1024 * 1024;

/// A request or response frame: opaque, already-encoded (DAG-CBOR) bytes. Typed
/// encoding/decoding of `SignedProposal`/`Response`/`QueryRequest` happens one
/// layer up, in [`crate::deal::client`]; the codec only ever moves bytes.
pub type Frame = Vec<u8>;

async fn read_frame<T: AsyncRead + Unpin + Send>(io: &mut T) -> std::io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = BigEndian::read_u32(&len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_LEN} byte limit"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_frame<T: AsyncWrite + Unpin + Send>(io: &mut T, frame: &Frame) -> std::io::Result<()> {
    let len = u32::try_from(frame.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large to send")
    })?;
    let mut len_buf = [0u8; 4];
    BigEndian::write_u32(&mut len_buf, len);
    io.write_all(&len_buf).await?;
    io.write_all(frame).await?;
    io.flush().await
}

/// One binary frame out, one binary frame in, per call — no streaming, no
/// multiplexing (`SPEC_FULL.md` §4.2).
#[derive(Debug, Clone, Default)]
pub struct DealCodec;

#[async_trait]
impl libp2p::request_response::Codec for DealCodec {
    type Protocol = StreamProtocol;
    type Request = Frame;
    type Response = Frame;

    async fn read_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> std::io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn read_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> std::io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        req: Self::Request,
    ) -> std::io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &req).await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        res: Self::Response,
    ) -> std::io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &res).await
    }
}
