//! Value codec: conversion between [`WireValue`] and strong types.
//!
//! Encoding ([`ToWire`]) is total except for enum values the client does not
//! recognize. Decoding ([`FromWire`]) only fails when the outer wire shape is
//! wrong or a scalar carried as a string cannot be parsed. Handle liveness is
//! never checked here.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::wire::{parse_datetime, WireValue};

/// Structural encode/decode failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// The wire value has a different shape than the target type.
    #[error("Expected {expected} on the wire, found {found}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A scalar transported as a string could not be parsed.
    #[error("Invalid {kind} value: {value:?}")]
    InvalidScalar { kind: &'static str, value: String },

    /// An unrecognized enum value cannot be sent back to the server.
    #[error("Cannot encode unrecognized {vocabulary} value {raw:?}")]
    UnrecognizedEnum { vocabulary: &'static str, raw: String },

    /// Failure while decoding one field of a record.
    #[error("Field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    pub(crate) fn shape(expected: &'static str, found: &WireValue) -> Self {
        CodecError::ShapeMismatch {
            expected,
            found: found.kind(),
        }
    }

    pub(crate) fn in_field(self, field: &str) -> Self {
        CodecError::Field {
            field: field.to_string(),
            source: Box::new(self),
        }
    }
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Conversion of a typed value into its wire form.
///
/// `to_wire_raw` is the snapshot form used for record maps and display: it
/// never fails and writes unrecognized enum values back as their raw token.
/// `to_wire` is the strict form used for call arguments.
pub trait ToWire {
    fn to_wire_raw(&self) -> WireValue;

    fn to_wire(&self) -> CodecResult<WireValue> {
        Ok(self.to_wire_raw())
    }
}

/// Conversion of a wire value into a typed value.
pub trait FromWire: Sized {
    fn from_wire(value: &WireValue) -> CodecResult<Self>;
}

/// Types usable as map keys. Keys always travel as strings.
pub trait WireKey: Sized + Ord {
    fn to_key_raw(&self) -> String;

    fn to_key(&self) -> CodecResult<String> {
        Ok(self.to_key_raw())
    }

    fn from_key(key: &str) -> CodecResult<Self>;
}

/// Decode a wire value into any [`FromWire`] type.
pub fn decode<T: FromWire>(value: &WireValue) -> CodecResult<T> {
    T::from_wire(value)
}

/// Encode any [`ToWire`] value.
pub fn encode<T: ToWire + ?Sized>(value: &T) -> CodecResult<WireValue> {
    value.to_wire()
}

// =============================================================================
// Scalars
// =============================================================================

impl ToWire for str {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::String(self.to_string())
    }
}

impl ToWire for String {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::String(self.clone())
    }
}

impl FromWire for String {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::String(s) => Ok(s.clone()),
            other => Err(CodecError::shape("string", other)),
        }
    }
}

impl ToWire for i64 {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::Int(*self)
    }
}

impl FromWire for i64 {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Int(i) => Ok(*i),
            // XML-RPC has no 64-bit int, so the server sends them as strings
            WireValue::String(s) => s.trim().parse().map_err(|_| CodecError::InvalidScalar {
                kind: "int",
                value: s.clone(),
            }),
            other => Err(CodecError::shape("int", other)),
        }
    }
}

impl ToWire for f64 {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::Double(*self)
    }
}

impl FromWire for f64 {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Double(d) => Ok(*d),
            WireValue::Int(i) => Ok(*i as f64),
            WireValue::String(s) => s.trim().parse().map_err(|_| CodecError::InvalidScalar {
                kind: "double",
                value: s.clone(),
            }),
            other => Err(CodecError::shape("double", other)),
        }
    }
}

impl ToWire for bool {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::Bool(*self)
    }
}

impl FromWire for bool {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Bool(b) => Ok(*b),
            other => Err(CodecError::shape("bool", other)),
        }
    }
}

impl ToWire for DateTime<Utc> {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::DateTime(*self)
    }
}

impl FromWire for DateTime<Utc> {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::DateTime(dt) => Ok(*dt),
            WireValue::String(s) => parse_datetime(s).ok_or_else(|| CodecError::InvalidScalar {
                kind: "datetime",
                value: s.clone(),
            }),
            other => Err(CodecError::shape("datetime", other)),
        }
    }
}

impl ToWire for WireValue {
    fn to_wire_raw(&self) -> WireValue {
        self.clone()
    }
}

impl FromWire for WireValue {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        Ok(value.clone())
    }
}

/// Void results. The server answers with an empty string (or nothing).
impl FromWire for () {
    fn from_wire(_value: &WireValue) -> CodecResult<Self> {
        Ok(())
    }
}

impl<T: ToWire> ToWire for Option<T> {
    fn to_wire_raw(&self) -> WireValue {
        match self {
            Some(value) => value.to_wire_raw(),
            None => WireValue::Nil,
        }
    }

    fn to_wire(&self) -> CodecResult<WireValue> {
        match self {
            Some(value) => value.to_wire(),
            None => Ok(WireValue::Nil),
        }
    }
}

impl<T: FromWire> FromWire for Option<T> {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Nil => Ok(None),
            other => T::from_wire(other).map(Some),
        }
    }
}

// =============================================================================
// Collections
// =============================================================================

impl<T: ToWire> ToWire for [T] {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::Array(self.iter().map(ToWire::to_wire_raw).collect())
    }

    fn to_wire(&self) -> CodecResult<WireValue> {
        self.iter()
            .map(ToWire::to_wire)
            .collect::<CodecResult<Vec<_>>>()
            .map(WireValue::Array)
    }
}

impl<T: ToWire> ToWire for Vec<T> {
    fn to_wire_raw(&self) -> WireValue {
        self.as_slice().to_wire_raw()
    }

    fn to_wire(&self) -> CodecResult<WireValue> {
        self.as_slice().to_wire()
    }
}

impl<T: FromWire> FromWire for Vec<T> {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Array(items) => items.iter().map(T::from_wire).collect(),
            other => Err(CodecError::shape("array", other)),
        }
    }
}

/// Sets travel as arrays; duplicates collapse on decode.
impl<T: ToWire> ToWire for BTreeSet<T> {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::Array(self.iter().map(ToWire::to_wire_raw).collect())
    }

    fn to_wire(&self) -> CodecResult<WireValue> {
        self.iter()
            .map(ToWire::to_wire)
            .collect::<CodecResult<Vec<_>>>()
            .map(WireValue::Array)
    }
}

impl<T: FromWire + Ord> FromWire for BTreeSet<T> {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Array(items) => items.iter().map(T::from_wire).collect(),
            other => Err(CodecError::shape("array", other)),
        }
    }
}

impl<K: WireKey, V: ToWire> ToWire for BTreeMap<K, V> {
    fn to_wire_raw(&self) -> WireValue {
        WireValue::Struct(
            self.iter()
                .map(|(key, value)| (key.to_key_raw(), value.to_wire_raw()))
                .collect(),
        )
    }

    fn to_wire(&self) -> CodecResult<WireValue> {
        let mut out = BTreeMap::new();
        for (key, value) in self {
            out.insert(key.to_key()?, value.to_wire()?);
        }
        Ok(WireValue::Struct(out))
    }
}

impl<K: WireKey, V: FromWire> FromWire for BTreeMap<K, V> {
    fn from_wire(value: &WireValue) -> CodecResult<Self> {
        match value {
            WireValue::Struct(fields) => fields
                .iter()
                .map(|(key, value)| {
                    let value = V::from_wire(value).map_err(|e| e.in_field(key))?;
                    Ok((K::from_key(key)?, value))
                })
                .collect(),
            other => Err(CodecError::shape("struct", other)),
        }
    }
}

// =============================================================================
// Map keys
// =============================================================================

impl WireKey for String {
    fn to_key_raw(&self) -> String {
        self.clone()
    }

    fn from_key(key: &str) -> CodecResult<Self> {
        Ok(key.to_string())
    }
}

impl WireKey for i64 {
    fn to_key_raw(&self) -> String {
        self.to_string()
    }

    fn from_key(key: &str) -> CodecResult<Self> {
        key.parse().map_err(|_| CodecError::InvalidScalar {
            kind: "int",
            value: key.to_string(),
        })
    }
}
