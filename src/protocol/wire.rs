//! Wire codec
//!
//! Every message on a coordinator/worker connection is framed as a 4-byte
//! length prefix in network byte order followed by that many payload bytes.
//! The payload is a deterministic binary encoding: numeric fields are
//! little-endian in their native width, booleans are a single 0/1 byte,
//! enums are a one-byte tag, and strings and vectors carry a `u32` length
//! before their contents. Field order is fixed by the message schema in
//! [`crate::protocol::messages`].
//!
//! The length prefix is the one big-endian value on the wire; everything
//! inside the payload is little-endian. Both sides must agree on this
//! asymmetry for the formats to interoperate.
//!
//! Any framing or decoding failure is fatal to the connection that produced
//! it: short reads, an oversize declared length, unknown enum tags, invalid
//! UTF-8, or trailing bytes after a complete message.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload a peer may declare: 100 MB.
///
/// A frame claiming more than this is rejected before any buffer for it is
/// allocated.
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Errors raised by the framing and codec layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame declares an empty payload")]
    EmptyFrame,

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    OversizeFrame(usize),

    #[error("unexpected end of payload while reading {0}")]
    UnexpectedEnd(&'static str),

    #[error("invalid boolean byte {value} in {field}")]
    InvalidBool { field: &'static str, value: u8 },

    #[error("invalid enum tag {value} in {field}")]
    InvalidTag { field: &'static str, value: u8 },

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("length of {0} does not fit in a u32")]
    LengthOverflow(&'static str),

    #[error("{0} trailing bytes after a complete message")]
    TrailingBytes(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A type that can be written into the deterministic payload encoding.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError>;
}

/// A type that can be read back from the deterministic payload encoding.
pub trait Decode: Sized {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, WireError>;
}

/// Cursor over a received payload providing structured reads.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::UnexpectedEnd(field));
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.bytes[start..start + len])
    }

    fn take_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], WireError> {
        let slice = self.take(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

// ── Primitive encoding ───────────────────────────────────────────────────────

pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    write_u8(out, value as u8);
}

pub fn write_string(out: &mut Vec<u8>, value: &str, field: &'static str) -> Result<(), WireError> {
    let len = ensure_u32(value.len(), field)?;
    write_u32(out, len);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Writes a vector as a `u32` element count followed by the elements.
pub fn write_vec<T: Encode>(
    out: &mut Vec<u8>,
    items: &[T],
    field: &'static str,
) -> Result<(), WireError> {
    let len = ensure_u32(items.len(), field)?;
    write_u32(out, len);
    for item in items {
        item.encode(out)?;
    }
    Ok(())
}

fn ensure_u32(value: usize, field: &'static str) -> Result<u32, WireError> {
    u32::try_from(value).map_err(|_| WireError::LengthOverflow(field))
}

// ── Primitive decoding ───────────────────────────────────────────────────────

pub fn read_u8(reader: &mut ByteReader<'_>, field: &'static str) -> Result<u8, WireError> {
    Ok(reader.take_array::<1>(field)?[0])
}

pub fn read_u32(reader: &mut ByteReader<'_>, field: &'static str) -> Result<u32, WireError> {
    Ok(u32::from_le_bytes(reader.take_array::<4>(field)?))
}

pub fn read_u64(reader: &mut ByteReader<'_>, field: &'static str) -> Result<u64, WireError> {
    Ok(u64::from_le_bytes(reader.take_array::<8>(field)?))
}

pub fn read_f64(reader: &mut ByteReader<'_>, field: &'static str) -> Result<f64, WireError> {
    Ok(f64::from_le_bytes(reader.take_array::<8>(field)?))
}

pub fn read_bool(reader: &mut ByteReader<'_>, field: &'static str) -> Result<bool, WireError> {
    match read_u8(reader, field)? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(WireError::InvalidBool { field, value }),
    }
}

pub fn read_string(reader: &mut ByteReader<'_>, field: &'static str) -> Result<String, WireError> {
    let len = read_u32(reader, field)? as usize;
    let bytes = reader.take(len, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(field))
}

/// Reads a vector written by [`write_vec`].
///
/// The declared element count is checked against the bytes actually present
/// (every element occupies at least one byte) so a corrupt count cannot
/// trigger a huge allocation.
pub fn read_vec<T: Decode>(
    reader: &mut ByteReader<'_>,
    field: &'static str,
) -> Result<Vec<T>, WireError> {
    let len = read_u32(reader, field)? as usize;
    if len > reader.remaining() {
        return Err(WireError::UnexpectedEnd(field));
    }
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(T::decode(reader)?);
    }
    Ok(items)
}

// ── Framing ──────────────────────────────────────────────────────────────────

/// Serializes a message and prepends the big-endian length prefix.
pub fn encode_frame<M: Encode>(msg: &M) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    msg.encode(&mut payload)?;

    if payload.is_empty() {
        return Err(WireError::EmptyFrame);
    }
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::OversizeFrame(payload.len()));
    }

    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Decodes a message from a complete payload, requiring that every byte is
/// consumed.
pub fn decode_payload<M: Decode>(payload: &[u8]) -> Result<M, WireError> {
    let mut reader = ByteReader::new(payload);
    let msg = M::decode(&mut reader)?;
    if reader.remaining() > 0 {
        return Err(WireError::TrailingBytes(reader.remaining()));
    }
    Ok(msg)
}

/// Reads one complete frame from the stream and decodes it.
///
/// Loops until the full frame is delivered; a connection closing mid-frame
/// surfaces as an I/O error.
pub async fn read_frame<M, S>(stream: &mut S) -> Result<M, WireError>
where
    M: Decode,
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(WireError::EmptyFrame);
    }
    if len > MAX_FRAME_LEN {
        return Err(WireError::OversizeFrame(len));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;

    decode_payload(&payload)
}

/// Serializes a message with its length prefix and writes it to the stream.
pub async fn write_frame<M, S>(stream: &mut S, msg: &M) -> Result<(), WireError>
where
    M: Encode,
    S: AsyncWrite + Unpin,
{
    let framed = encode_frame(msg)?;
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}
