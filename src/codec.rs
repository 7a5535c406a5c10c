//! SBDP wire codec.
//!
//! Maps a [`Message`] to and from its exact byte encoding:
//!
//! ```text
//! TotalLength : u32 BE            byte count of everything after this field
//! repeated {
//!   KeyLength : u16 BE
//!   Key       : KeyLength bytes, UTF-8
//!   TypeTag   : u8                0x01..=0x05
//!   Value     : fixed 8 bytes, or u32 BE length + that many bytes
//! }
//! ```
//!
//! [`encode_message`] and [`decode_message`] work on complete buffers and
//! validate the total length exactly; [`SbdpCodec`] adapts the same logic to
//! streaming I/O through `tokio_util::codec`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::types::{Message, SbdpError, Value};

/// Byte length of the `TotalLength` frame prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on the payload a streaming decoder will accept.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes `msg` into one self-framed byte buffer (length prefix included).
///
/// Entries are written in ascending key order, so encoding the same message
/// twice yields byte-identical output. Fails with
/// [`SbdpError::EncodingError`] only when a key exceeds the u16 length range
/// or a string/binary payload (or the total payload) exceeds the u32 range.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, SbdpError> {
    let mut payload = BytesMut::new();

    for (key, value) in msg.iter() {
        let key_len = u16::try_from(key.len()).map_err(|_| {
            SbdpError::EncodingError(format!("key length {} exceeds u16 range", key.len()))
        })?;
        payload.put_u16(key_len);
        payload.put_slice(key.as_bytes());
        payload.put_u8(value.tag());

        match value {
            Value::Int64(v) => payload.put_i64(*v),
            Value::UInt64(v) => payload.put_u64(*v),
            Value::Float64(v) => payload.put_f64(*v),
            Value::String(s) => {
                put_var_len(&mut payload, s.len(), "string")?;
                payload.put_slice(s.as_bytes());
            }
            Value::Binary(b) => {
                put_var_len(&mut payload, b.len(), "binary")?;
                payload.put_slice(b);
            }
        }
    }

    let total = u32::try_from(payload.len()).map_err(|_| {
        SbdpError::EncodingError(format!(
            "total payload length {} exceeds u32 range",
            payload.len()
        ))
    })?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    out.extend_from_slice(&total.to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn put_var_len(payload: &mut BytesMut, len: usize, kind: &str) -> Result<(), SbdpError> {
    let len = u32::try_from(len).map_err(|_| {
        SbdpError::EncodingError(format!("{kind} value length {len} exceeds u32 range"))
    })?;
    payload.put_u32(len);
    Ok(())
}

/// Decodes exactly one message from `bytes`.
///
/// The buffer must contain the length prefix plus exactly `TotalLength`
/// payload bytes. Both a truncated buffer and trailing extra bytes fail with
/// [`SbdpError::MalformedMessage`]; leftover bytes are never silently
/// ignored. Duplicate keys resolve last-write-wins.
pub fn decode_message(bytes: &[u8]) -> Result<Message, SbdpError> {
    if bytes.len() < LENGTH_PREFIX_LEN {
        return Err(SbdpError::MalformedMessage(format!(
            "buffer of {} bytes is shorter than the length prefix",
            bytes.len()
        )));
    }

    let total = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload = &bytes[LENGTH_PREFIX_LEN..];
    if payload.len() != total {
        return Err(SbdpError::MalformedMessage(format!(
            "frame declares {} payload bytes but buffer holds {}",
            total,
            payload.len()
        )));
    }

    decode_entries(payload)
}

/// Walks the entry list of a frame payload (length prefix already consumed).
fn decode_entries(mut buf: &[u8]) -> Result<Message, SbdpError> {
    let mut msg = Message::new();

    while buf.has_remaining() {
        let key_len = take_u16(&mut buf, "key length")? as usize;
        let key = take_bytes(&mut buf, key_len, "key")?;
        let key = String::from_utf8(key)
            .map_err(|_| SbdpError::MalformedMessage("key is not valid UTF-8".into()))?;

        let tag = take_u8(&mut buf, "type tag")?;
        let value = match tag {
            0x01 => Value::Int64(i64::from_be_bytes(take_fixed8(&mut buf, "int64")?)),
            0x02 => Value::UInt64(u64::from_be_bytes(take_fixed8(&mut buf, "uint64")?)),
            0x03 => Value::Float64(f64::from_be_bytes(take_fixed8(&mut buf, "float64")?)),
            0x04 => {
                let len = take_u32(&mut buf, "string length")? as usize;
                let raw = take_bytes(&mut buf, len, "string value")?;
                Value::String(String::from_utf8(raw).map_err(|_| {
                    SbdpError::MalformedMessage("string value is not valid UTF-8".into())
                })?)
            }
            0x05 => {
                let len = take_u32(&mut buf, "binary length")? as usize;
                Value::Binary(take_bytes(&mut buf, len, "binary value")?)
            }
            other => {
                return Err(SbdpError::MalformedMessage(format!(
                    "unknown type tag 0x{other:02X}"
                )))
            }
        };

        // Last write wins on duplicate keys.
        msg.insert(key, value);
    }

    Ok(msg)
}

fn truncated(field: &str, need: usize, have: usize) -> SbdpError {
    SbdpError::MalformedMessage(format!(
        "truncated entry: {field} needs {need} bytes, {have} remain"
    ))
}

fn take_u8(buf: &mut &[u8], field: &str) -> Result<u8, SbdpError> {
    if buf.remaining() < 1 {
        return Err(truncated(field, 1, buf.remaining()));
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8], field: &str) -> Result<u16, SbdpError> {
    if buf.remaining() < 2 {
        return Err(truncated(field, 2, buf.remaining()));
    }
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut &[u8], field: &str) -> Result<u32, SbdpError> {
    if buf.remaining() < 4 {
        return Err(truncated(field, 4, buf.remaining()));
    }
    Ok(buf.get_u32())
}

fn take_fixed8(buf: &mut &[u8], field: &str) -> Result<[u8; 8], SbdpError> {
    if buf.remaining() < 8 {
        return Err(truncated(field, 8, buf.remaining()));
    }
    let mut out = [0u8; 8];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn take_bytes(buf: &mut &[u8], len: usize, field: &str) -> Result<Vec<u8>, SbdpError> {
    if buf.remaining() < len {
        return Err(truncated(field, len, buf.remaining()));
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Streaming codec for use with `tokio_util::codec::Framed`.
///
/// Decodes one [`Message`] per length-prefixed frame, buffering partial reads
/// until a frame completes. Frames whose declared payload exceeds the
/// configured limit are rejected before any allocation.
#[derive(Debug, Clone)]
pub struct SbdpCodec {
    max_frame_len: usize,
}

impl SbdpCodec {
    pub fn new() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for SbdpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SbdpCodec {
    type Item = Message;
    type Error = SbdpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, SbdpError> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let total = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if total > self.max_frame_len {
            return Err(SbdpError::MalformedMessage(format!(
                "frame payload of {} bytes exceeds the {} byte limit",
                total, self.max_frame_len
            )));
        }

        if src.len() < LENGTH_PREFIX_LEN + total {
            src.reserve(LENGTH_PREFIX_LEN + total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let payload = src.split_to(total);
        decode_entries(&payload).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, SbdpError> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            // EOF with a partial frame buffered means the peer quit mid-frame.
            None if src.is_empty() => Ok(None),
            None => Err(SbdpError::ConnectionClosed),
        }
    }
}

impl<'a> Encoder<&'a Message> for SbdpCodec {
    type Error = SbdpError;

    fn encode(&mut self, msg: &'a Message, dst: &mut BytesMut) -> Result<(), SbdpError> {
        let frame = encode_message(msg)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
