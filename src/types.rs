//! Types module: defines field types and the values dissected into a field tree.
//!
//! This module provides the FieldType and FieldValue enums together with the
//! per-type operations the VM applies to them (comparisons, bitwise-and,
//! containment, pattern matching, slicing).

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use serde::{Serialize, Deserialize};

use crate::pattern::Pattern;
use crate::range::RangeSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FieldType {
    Bytes,
    Str,
    Int,
    Bool,
    Ip,
}

impl FieldType {
    /// Whether values of this type can be byte-sliced.
    pub fn is_sliceable(&self) -> bool {
        matches!(self, FieldType::Bytes | FieldType::Str | FieldType::Ip)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Bytes => "Bytes",
            FieldType::Str => "Str",
            FieldType::Int => "Int",
            FieldType::Bool => "Bool",
            FieldType::Ip => "Ip",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FieldValue {
    Bytes(Vec<u8>),
    Str(String),
    Int(i64),
    Bool(bool),
    Ip(IpAddr),
}

impl FieldValue {
    pub fn get_type(&self) -> FieldType {
        match self {
            FieldValue::Bytes(_) => FieldType::Bytes,
            FieldValue::Str(_) => FieldType::Str,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Ip(_) => FieldType::Ip,
        }
    }

    /// Raw bytes of byte-like values; IPs yield their network-order octets.
    pub fn as_bytes(&self) -> Option<std::borrow::Cow<'_, [u8]>> {
        use std::borrow::Cow;
        match self {
            FieldValue::Bytes(b) => Some(Cow::Borrowed(b.as_slice())),
            FieldValue::Str(s) => Some(Cow::Borrowed(s.as_bytes())),
            FieldValue::Ip(IpAddr::V4(ip)) => Some(Cow::Owned(ip.octets().to_vec())),
            FieldValue::Ip(IpAddr::V6(ip)) => Some(Cow::Owned(ip.octets().to_vec())),
            FieldValue::Int(_) | FieldValue::Bool(_) => None,
        }
    }

    fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => Some(a.cmp(b)),
            (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Ip(IpAddr::V4(a)), FieldValue::Ip(IpAddr::V4(b))) => Some(a.cmp(b)),
            (FieldValue::Ip(IpAddr::V6(a)), FieldValue::Ip(IpAddr::V6(b))) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn is_eq(&self, other: &FieldValue) -> bool {
        self == other
    }

    pub fn is_ne(&self, other: &FieldValue) -> bool {
        self != other
    }

    pub fn is_lt(&self, other: &FieldValue) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    pub fn is_le(&self, other: &FieldValue) -> bool {
        matches!(self.compare(other), Some(Ordering::Less | Ordering::Equal))
    }

    pub fn is_gt(&self, other: &FieldValue) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }

    pub fn is_ge(&self, other: &FieldValue) -> bool {
        matches!(self.compare(other), Some(Ordering::Greater | Ordering::Equal))
    }

    /// True if the two values share at least one set bit.
    pub fn bitwise_and(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a & b != 0,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => {
                a.iter().zip(b.iter()).any(|(x, y)| x & y != 0)
            }
            _ => false,
        }
    }

    /// Substring (or sub-slice) containment for byte-like values.
    pub fn contains(&self, needle: &FieldValue) -> bool {
        match (self, needle) {
            (FieldValue::Bytes(_) | FieldValue::Str(_), FieldValue::Bytes(_) | FieldValue::Str(_)) => {
                match (self.as_bytes(), needle.as_bytes()) {
                    (Some(h), Some(n)) => contains_slice(&h, &n),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    pub fn matches(&self, pattern: &Pattern) -> bool {
        match self {
            FieldValue::Bytes(b) => pattern.is_match(b),
            FieldValue::Str(s) => pattern.is_match(s.as_bytes()),
            other => pattern.is_match(other.to_string().as_bytes()),
        }
    }

    /// Byte-slices this value, or `None` if the type cannot be sliced.
    ///
    /// A range reaching past the end of the value yields the bytes it does
    /// cover.
    pub fn slice(&self, range: &RangeSpec) -> Option<FieldValue> {
        let bytes = self.as_bytes()?;
        Some(FieldValue::Bytes(range.apply(&bytes)))
    }
}

fn contains_slice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bytes(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            FieldValue::Str(s) => write!(f, "{:?}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Ip(ip) => write!(f, "{}", ip),
        }
    }
}
