//! OrcaNet stream protocols and the transfer frame envelope.
//!
//! Two ad-hoc protocols are spoken over `libp2p-stream`:
//!
//! - `/orcanet/p2p`: one newline-terminated JSON [`KnownPeers`] per stream.
//! - `/senddata/p2p`: a sequence of [`Frame`]s, ended by closing the stream.
//!
//! A frame is `tag: u8 | request_id: u64 BE | len: u32 BE | payload[len]`.
//!
//! [`KnownPeers`]: orcanet_core::KnownPeers

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::StreamProtocol;

use crate::error::NetworkError;

/// Peer-exchange protocol.
pub const EXCHANGE_PROTOCOL: StreamProtocol = StreamProtocol::new("/orcanet/p2p");

/// Direct transfer protocol.
pub const TRANSFER_PROTOCOL: StreamProtocol = StreamProtocol::new("/senddata/p2p");

/// Identify protocol version advertised by OrcaNet nodes.
pub const IDENTIFY_PROTOCOL_VERSION: &str = "/orcanet/0.1.0";

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 1 + 8 + 4;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Upper bound on a peer-exchange line.
pub const MAX_EXCHANGE_LINE: u64 = 1024 * 1024;

/// Frame tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Does the receiver host the file with this hash? Reply `"true"`/`"false"`.
    Exist = 1,
    /// What is the stored filename for this hash? Reply the name, empty if unknown.
    Name = 2,
    /// Send the file with this hash. Reply the raw bytes, or `Error`.
    Request = 3,
    /// Answer to one of the above, matched by request id.
    Reply = 4,
    /// Unsolicited payload.
    Data = 5,
    /// The request could not be served. Payload is a UTF-8 reason.
    Error = 6,
}

impl TryFrom<u8> for FrameKind {
    type Error = NetworkError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(FrameKind::Exist),
            2 => Ok(FrameKind::Name),
            3 => Ok(FrameKind::Request),
            4 => Ok(FrameKind::Reply),
            5 => Ok(FrameKind::Data),
            6 => Ok(FrameKind::Error),
            other => Err(NetworkError::Codec(format!("unknown frame tag {}", other))),
        }
    }
}

/// One transfer-protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub request_id: u64,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, request_id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            request_id,
            payload: payload.into(),
        }
    }

    /// Serialize header and payload into one buffer.
    pub fn encode(&self) -> Result<Bytes, NetworkError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(NetworkError::Codec(format!(
                "payload of {} bytes exceeds {}",
                self.payload.len(),
                MAX_PAYLOAD
            )));
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.kind as u8);
        buf.put_u64(self.request_id);
        buf.put_u32(self.payload.len() as u32);
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Take one complete frame off the front of `buf`, or `None` if more bytes
    /// are needed.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, NetworkError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let kind = FrameKind::try_from(buf[0])?;
        let len = u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]) as usize;
        check_len(len)?;
        if buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        buf.advance(1);
        let request_id = buf.get_u64();
        buf.advance(4);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Frame {
            kind,
            request_id,
            payload,
        }))
    }
}

fn check_len(len: usize) -> Result<(), NetworkError> {
    if len > MAX_PAYLOAD {
        return Err(NetworkError::Codec(format!(
            "frame length {} exceeds {}",
            len, MAX_PAYLOAD
        )));
    }
    Ok(())
}

/// Read the next frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    if reader.read(&mut tag).await? == 0 {
        return Ok(None);
    }
    let kind = FrameKind::try_from(tag[0])?;

    let mut rest = [0u8; HEADER_LEN - 1];
    reader.read_exact(&mut rest).await?;
    let mut header = &rest[..];
    let request_id = header.get_u64();
    let len = header.get_u32() as usize;
    check_len(len)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Frame {
        kind,
        request_id,
        payload: payload.into(),
    }))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()?).await?;
    writer.flush().await?;
    Ok(())
}
