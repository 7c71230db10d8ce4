//! Field-level encoding and composable prefix decoding.
//!
//! Fixed-width integers are big-endian. Timestamps are six bytes of
//! milliseconds. Variable-size fields carry a `u32` length prefix and may not
//! exceed [`MAX_FIELD_SIZE`].

use crate::{DecodeError, EncodeError};
use fedchain_types::{Hash, MinuteNumber, PublicKey, Signature, Timestamp, LAST_MINUTE};

/// Upper bound on any single variable-size field.
pub const MAX_FIELD_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Something with a binary wire form.
pub trait Encode {
    /// Append the encoding of `self` to `out`.
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError>;

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }
}

/// Something that can be read back from the front of a byte slice.
pub trait Decode: Sized {
    /// Decode `Self` from the front of `data`, returning the unread remainder.
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError>;
}

/// Decode a value that must occupy `data` exactly.
pub fn decode_exact<T: Decode>(data: &[u8]) -> Result<T, DecodeError> {
    let (value, rest) = T::decode_prefix(data)?;
    if !rest.is_empty() {
        return Err(DecodeError::malformed(
            "frame",
            format!("{} trailing bytes", rest.len()),
        ));
    }
    Ok(value)
}

/// Bounds-checked cursor over a byte slice.
///
/// Every read checks the remaining length first and fails with
/// [`DecodeError::Truncated`] rather than indexing past the end.
pub struct WireReader<'a> {
    data: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// The unread remainder.
    pub fn rest(&self) -> &'a [u8] {
        self.data
    }

    /// Consume the leading type byte and check it against `expected`.
    pub fn expect_tag(&mut self, expected: u8) -> Result<(), DecodeError> {
        let found = self.read_u8("type")?;
        if found != expected {
            return Err(DecodeError::TypeMismatch { expected, found });
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.data.len() < n {
            return Err(DecodeError::Truncated {
                field,
                needed: n,
                remaining: self.data.len(),
            });
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(field, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>(field)?[0])
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.read_array(field)?))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array(field)?))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.read_array(field)?))
    }

    /// Read a minute number, rejecting anything outside 0–9.
    pub fn read_minute(&mut self, field: &'static str) -> Result<MinuteNumber, DecodeError> {
        let minute = self.read_u8(field)?;
        if minute > LAST_MINUTE {
            return Err(DecodeError::malformed(field, format!("minute {minute} out of range")));
        }
        Ok(minute)
    }

    pub fn read_hash(&mut self, field: &'static str) -> Result<Hash, DecodeError> {
        Ok(Hash::new(self.read_array(field)?))
    }

    pub fn read_public_key(&mut self, field: &'static str) -> Result<PublicKey, DecodeError> {
        Ok(PublicKey(self.read_array(field)?))
    }

    pub fn read_signature(&mut self, field: &'static str) -> Result<Signature, DecodeError> {
        Ok(Signature(self.read_array(field)?))
    }

    pub fn read_timestamp(&mut self, field: &'static str) -> Result<Timestamp, DecodeError> {
        let six: [u8; 6] = self.read_array(field)?;
        let mut eight = [0u8; 8];
        eight[2..].copy_from_slice(&six);
        Ok(Timestamp::from_millis(u64::from_be_bytes(eight)))
    }

    /// Read a `u32`-length-prefixed field. The declared length is checked
    /// against both [`MAX_FIELD_SIZE`] and the bytes actually present.
    pub fn read_var_bytes(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u32(field)? as usize;
        if len > MAX_FIELD_SIZE {
            return Err(DecodeError::malformed(
                field,
                format!("declared length {len} exceeds maximum {MAX_FIELD_SIZE}"),
            ));
        }
        if len > self.data.len() {
            return Err(DecodeError::malformed(
                field,
                format!(
                    "declared length {len} exceeds {} remaining bytes",
                    self.data.len()
                ),
            ));
        }
        self.read_bytes(field, len)
    }

    /// Decode a nested entity from the front of the remaining bytes.
    pub fn read<T: Decode>(&mut self) -> Result<T, DecodeError> {
        let (value, rest) = T::decode_prefix(self.data)?;
        self.data = rest;
        Ok(value)
    }

    /// Decode a nested entity that lives inside a length-prefixed field.
    /// The nested decoder may not consume bytes beyond the declared length.
    pub fn read_nested<T: Decode>(&mut self, field: &'static str) -> Result<T, DecodeError> {
        let bytes = self.read_var_bytes(field)?;
        decode_exact(bytes)
    }
}

// ── Writers ─────────────────────────────────────────────────────────────

pub fn put_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_hash(out: &mut Vec<u8>, h: &Hash) {
    out.extend_from_slice(h.as_bytes());
}

pub fn put_public_key(out: &mut Vec<u8>, k: &PublicKey) {
    out.extend_from_slice(k.as_bytes());
}

pub fn put_signature(out: &mut Vec<u8>, s: &Signature) {
    out.extend_from_slice(s.as_bytes());
}

pub fn put_timestamp(
    out: &mut Vec<u8>,
    field: &'static str,
    t: Timestamp,
) -> Result<(), EncodeError> {
    let millis = t.as_millis();
    if millis > Timestamp::MAX_WIRE {
        return Err(EncodeError::OutOfRange {
            field,
            value: millis,
        });
    }
    out.extend_from_slice(&millis.to_be_bytes()[2..]);
    Ok(())
}

pub fn put_var_bytes(out: &mut Vec<u8>, field: &'static str, bytes: &[u8]) -> Result<(), EncodeError> {
    if bytes.len() > MAX_FIELD_SIZE {
        return Err(EncodeError::FieldTooLarge {
            field,
            len: bytes.len(),
            max: MAX_FIELD_SIZE,
        });
    }
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
    Ok(())
}

/// Encode `value` as a length-prefixed nested field.
pub fn put_nested<T: Encode>(out: &mut Vec<u8>, field: &'static str, value: &T) -> Result<(), EncodeError> {
    let inner = value.encode()?;
    put_var_bytes(out, field, &inner)
}
