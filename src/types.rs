//! Core SBDP types: [`Value`], [`Message`], and [`SbdpError`].

use std::collections::BTreeMap;
use thiserror::Error;

/// One typed SBDP value.
///
/// A closed tagged union over the five kinds the wire format supports.
/// Equality requires both the kind and the contained data to match, so
/// `Value::Int64(5) != Value::UInt64(5)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed 64-bit integer, tag `0x01`.
    Int64(i64),
    /// Unsigned 64-bit integer, tag `0x02`.
    UInt64(u64),
    /// IEEE-754 binary64, tag `0x03`.
    Float64(f64),
    /// UTF-8 text, tag `0x04`, length-prefixed on the wire.
    String(String),
    /// Opaque byte blob, tag `0x05`, length-prefixed on the wire.
    Binary(Vec<u8>),
}

impl Value {
    /// Wire type tag for this kind.
    pub const fn tag(&self) -> u8 {
        match self {
            Value::Int64(_) => 0x01,
            Value::UInt64(_) => 0x02,
            Value::Float64(_) => 0x03,
            Value::String(_) => 0x04,
            Value::Binary(_) => 0x05,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(v.to_vec())
    }
}

/// An SBDP message: string keys mapped to typed [`Value`]s.
///
/// Keys are unique; inserting an existing key overwrites its value. Two
/// messages are equal iff they hold the same set of `(key, value)` pairs,
/// regardless of insertion order. Iteration is in ascending key order, which
/// is what makes repeated encodes of an unchanged message byte-identical.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    entries: BTreeMap<String, Value>,
}

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `key`, overwriting and returning any previous
    /// value stored under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Message {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut msg = Message::new();
        for (k, v) in iter {
            msg.insert(k, v);
        }
        msg
    }
}

/// Errors raised by the SBDP codec and transport.
///
/// Socket setup (create/bind/listen/connect) reports failure through `bool`
/// return values instead, so callers can probe availability without error
/// handling; only mid-session I/O and codec failures surface here.
#[derive(Debug, Error)]
pub enum SbdpError {
    /// The byte buffer does not hold exactly one well-formed message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A key or value exceeds its length-prefix capacity.
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// The peer closed the connection before a full frame arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The receive deadline elapsed without a complete frame.
    #[error("receive timed out")]
    TimedOut,

    /// The socket has no established connection.
    #[error("socket is not connected")]
    NotConnected,

    /// The socket is not in the listening state.
    #[error("socket is not listening")]
    NotListening,

    /// Underlying transport I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_of_different_kinds_never_compare_equal() {
        assert_ne!(Value::Int64(5), Value::UInt64(5));
        assert_ne!(Value::Int64(0), Value::Float64(0.0));
        assert_ne!(
            Value::String("ab".into()),
            Value::Binary(vec![0x61, 0x62])
        );
    }

    #[test]
    fn value_equality_requires_matching_data() {
        assert_eq!(Value::Int64(-7), Value::Int64(-7));
        assert_ne!(Value::Int64(-7), Value::Int64(7));
        assert_eq!(Value::Float64(1.5), Value::Float64(1.5));
    }

    #[test]
    fn message_equality_ignores_insertion_order() {
        let mut a = Message::new();
        a.insert("x", 1i64);
        a.insert("y", "two");

        let mut b = Message::new();
        b.insert("y", "two");
        b.insert("x", 1i64);

        assert_eq!(a, b);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let mut msg = Message::new();
        assert!(msg.insert("k", 1i64).is_none());
        assert_eq!(msg.insert("k", 2i64), Some(Value::Int64(1)));
        assert_eq!(msg.len(), 1);
        assert_eq!(msg.get("k"), Some(&Value::Int64(2)));
    }

    #[test]
    fn iteration_is_ascending_by_key() {
        let msg: Message = [("b", 2i64), ("a", 1i64), ("c", 3i64)]
            .into_iter()
            .collect();
        let keys: Vec<&str> = msg.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }
}
