//! # SBDP - Simple Binary Dictionary Protocol
//!
//! A compact, self-describing binary protocol for exchanging small typed
//! key/value messages between two peers over TCP:
//!
//! * **Self-describing** frames: every entry carries its key and type tag
//! * **Deterministic** encoding: equal messages encode to identical bytes
//! * **Strict** decoding: truncated or over-long frames are rejected
//! * **Bounded-time** receive with a deadline spanning partial reads
//!
//! ## Quick Start
//!
//! ```rust
//! use sbdp::{decode_message, encode_message, Message};
//!
//! let mut msg = Message::new();
//! msg.insert("type", "hello");
//! msg.insert("value", 123i64);
//!
//! let encoded = encode_message(&msg)?;
//! let decoded = decode_message(&encoded)?;
//! assert_eq!(msg, decoded);
//! # Ok::<(), sbdp::SbdpError>(())
//! ```
//!
//! ## Wire Format
//!
//! All multi-byte integers are big-endian:
//!
//! - TOTAL_LEN (4B): byte count of everything after this field
//! - per entry:
//!   - KEY_LEN (2B): key byte length
//!   - KEY: UTF-8 key bytes
//!   - TAG (1B): value type tag
//!   - VALUE: per-kind encoding
//!
//! | Tag  | Kind    | Value encoding                     |
//! |------|---------|------------------------------------|
//! | 0x01 | Int64   | 8 bytes, two's complement          |
//! | 0x02 | UInt64  | 8 bytes, unsigned                  |
//! | 0x03 | Float64 | 8 bytes, IEEE-754 binary64 pattern |
//! | 0x04 | String  | 4-byte length + UTF-8 bytes        |
//! | 0x05 | Binary  | 4-byte length + raw bytes          |
//!
//! ## Transport
//!
//! [`Socket`] drives one TCP endpoint through create/bind/listen/accept or
//! create/connect, then exchanges whole messages with
//! [`send_message`](Socket::send_message) and a deadline-bounded
//! [`recv_message`](Socket::recv_message). Setup steps return `bool` so
//! callers can probe ports and peers; mid-session I/O raises [`SbdpError`].

pub mod codec;
pub mod socket;
pub mod types;

pub use codec::{decode_message, encode_message, SbdpCodec};
pub use socket::Socket;
pub use types::{Message, SbdpError, Value};
