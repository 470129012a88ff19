//! Typed values
//!
//! `Datum` is the one value type used for partition values, primary-key
//! tuples, column statistics and row payloads.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// A row or key tuple, in schema field order
pub type Row = Vec<Datum>;

impl Datum {
    /// Rank used to order values of different types (Null sorts first)
    fn type_rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Boolean(_) => 1,
            Datum::Int(_) => 2,
            Datum::Long(_) => 3,
            Datum::Double(_) => 4,
            Datum::String(_) => 5,
            Datum::Bytes(_) => 6,
        }
    }

    /// Total order over all values, used for key ranges and min/max stats
    pub fn total_cmp(&self, other: &Datum) -> Ordering {
        match (self, other) {
            (Datum::Boolean(a), Datum::Boolean(b)) => a.cmp(b),
            (Datum::Int(a), Datum::Int(b)) => a.cmp(b),
            (Datum::Long(a), Datum::Long(b)) => a.cmp(b),
            (Datum::Double(a), Datum::Double(b)) => a.total_cmp(b),
            (Datum::String(a), Datum::String(b)) => a.cmp(b),
            (Datum::Bytes(a), Datum::Bytes(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Text form used in partition directory names; `None` for null
    pub fn to_partition_string(&self) -> Option<String> {
        match self {
            Datum::Null => None,
            Datum::Bytes(b) => Some(b.iter().map(|x| format!("{:02x}", x)).collect()),
            other => Some(other.to_string()),
        }
    }

    /// Append a type-tagged, length-prefixed encoding of this value.
    ///
    /// The layout is frozen: bucket assignment hashes these bytes, so any
    /// change here requires a new bucket function version.
    pub fn write_canonical(&self, buf: &mut Vec<u8>) {
        buf.push(self.type_rank());
        match self {
            Datum::Null => {}
            Datum::Boolean(v) => buf.push(*v as u8),
            Datum::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Datum::Long(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Datum::Double(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            Datum::String(s) => {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Datum::Bytes(b) => {
                buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buf.extend_from_slice(b);
            }
        }
    }
}

/// Lexicographic comparison of two tuples using [`Datum::total_cmp`]
pub fn compare_rows(a: &[Datum], b: &[Datum]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(v) => write!(f, "{}", v),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Long(v) => write!(f, "{}", v),
            Datum::Double(v) => write!(f, "{}", v),
            Datum::String(v) => write!(f, "{}", v),
            Datum::Bytes(v) => write!(f, "0x{}", v.iter().map(|x| format!("{:02x}", x)).collect::<String>()),
        }
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Boolean(v)
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Int(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Long(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Double(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::String(v)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Datum::Null)
    }
}
