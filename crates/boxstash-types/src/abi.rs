//! Minimal ABI codec for the static shapes the box store exchanges.
//!
//! Integers are big-endian and exactly `bits / 8` bytes wide. Tuples are the
//! concatenation of their members. Only static types are supported, so every
//! encoded value has a fixed width known from its descriptor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// An ABI type descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbiType {
    /// `uintN` for N in 8..=64, a multiple of 8.
    Uint(u16),
    /// `(T1,T2,...)`
    Tuple(Vec<AbiType>),
}

/// A decoded ABI value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbiValue {
    Uint(u64),
    Tuple(Vec<AbiValue>),
}

impl AbiType {
    /// Parse a descriptor such as `(uint64,uint64,uint8,uint64,uint64)`.
    pub fn parse(descriptor: &str) -> Result<Self, TypeError> {
        let trimmed = descriptor.trim();
        let (ty, rest) = parse_type(trimmed, descriptor)?;
        if !rest.is_empty() {
            return Err(invalid(descriptor, format!("trailing input `{rest}`")));
        }
        Ok(ty)
    }

    /// Encoded width in bytes.
    pub fn static_size(&self) -> usize {
        match self {
            Self::Uint(bits) => *bits as usize / 8,
            Self::Tuple(members) => members.iter().map(AbiType::static_size).sum(),
        }
    }

    /// Encode a value of this type.
    pub fn encode(&self, value: &AbiValue) -> Result<Vec<u8>, TypeError> {
        let mut out = Vec::with_capacity(self.static_size());
        self.encode_into(value, &mut out)?;
        Ok(out)
    }

    fn encode_into(&self, value: &AbiValue, out: &mut Vec<u8>) -> Result<(), TypeError> {
        match (self, value) {
            (Self::Uint(bits), AbiValue::Uint(v)) => {
                let width = *bits as usize / 8;
                if width < 8 && *v >> u32::from(*bits) != 0 {
                    return Err(TypeError::AbiOverflow { value: *v, bits: *bits });
                }
                out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
            }
            (Self::Tuple(members), AbiValue::Tuple(values)) if members.len() == values.len() => {
                for (member, v) in members.iter().zip(values) {
                    member.encode_into(v, out)?;
                }
            }
            _ => return Err(TypeError::AbiMismatch { expected: self.to_string() }),
        }
        Ok(())
    }

    /// Decode a value of this type. The input must be consumed exactly.
    pub fn decode(&self, data: &[u8]) -> Result<AbiValue, TypeError> {
        let expected = self.static_size();
        if data.len() != expected {
            return Err(TypeError::InvalidLength { expected, actual: data.len() });
        }
        Ok(self.decode_static(data).0)
    }

    fn decode_static<'a>(&self, data: &'a [u8]) -> (AbiValue, &'a [u8]) {
        match self {
            Self::Uint(bits) => {
                let width = *bits as usize / 8;
                let mut buf = [0u8; 8];
                buf[8 - width..].copy_from_slice(&data[..width]);
                (AbiValue::Uint(u64::from_be_bytes(buf)), &data[width..])
            }
            Self::Tuple(members) => {
                let mut rest = data;
                let mut values = Vec::with_capacity(members.len());
                for member in members {
                    let (v, r) = member.decode_static(rest);
                    values.push(v);
                    rest = r;
                }
                (AbiValue::Tuple(values), rest)
            }
        }
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Tuple(members) => {
                write!(f, "(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{m}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl AbiValue {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[AbiValue]> {
        match self {
            Self::Tuple(values) => Some(values),
            _ => None,
        }
    }
}

fn invalid(descriptor: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidAbiType {
        descriptor: descriptor.to_string(),
        reason: reason.into(),
    }
}

fn parse_type<'a>(input: &'a str, descriptor: &str) -> Result<(AbiType, &'a str), TypeError> {
    if let Some(mut rest) = input.strip_prefix('(') {
        let mut members = Vec::new();
        if let Some(after) = rest.strip_prefix(')') {
            return Ok((AbiType::Tuple(members), after));
        }
        loop {
            let (member, after) = parse_type(rest, descriptor)?;
            members.push(member);
            if let Some(after) = after.strip_prefix(',') {
                rest = after;
            } else if let Some(after) = after.strip_prefix(')') {
                return Ok((AbiType::Tuple(members), after));
            } else {
                return Err(invalid(descriptor, "unterminated tuple"));
            }
        }
    }

    let end = input
        .find(|c: char| c == ',' || c == ')')
        .unwrap_or(input.len());
    let (token, rest) = input.split_at(end);
    let bits: u16 = token
        .strip_prefix("uint")
        .and_then(|b| b.parse().ok())
        .ok_or_else(|| invalid(descriptor, format!("unsupported type `{token}`")))?;
    if bits == 0 || bits > 64 || bits % 8 != 0 {
        return Err(invalid(descriptor, format!("unsupported width uint{bits}")));
    }
    Ok((AbiType::Uint(bits), rest))
}
