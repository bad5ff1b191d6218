//! Field Codec: read/write/initialize/validate a single typed field against a
//! bit-addressed stream.
//!
//! `Bits(n)` with `n <= 64` round-trips through `u64` (`FieldValue::UInt`). Wider
//! `Bits(n)` fields -- the 96-bit `EPC` field of `EPC_96` is the one that shows up on
//! the wire -- don't fit a machine integer and are read/written as raw bytes
//! (`FieldValue::Bytes`) via `BitReader::read_wide_bits`/`BitWriter::write_wide_bits`.

use crate::bitstream::{BitReader, BitWriter};
use crate::enums::EnumRegistry;
use crate::error::{LlrpError, Result};
use crate::types::{FieldDef, FieldType, FieldValue};

/// Initializes a field to its schema default (or the type's zero value).
pub fn init_value(field: &FieldDef) -> Option<FieldValue> {
  match &field.field_type {
    FieldType::UIntBE(_) => Some(FieldValue::UInt(field.default.unwrap_or(0) as u64)),
    FieldType::Bits(bits) if *bits > 64 => {
      Some(FieldValue::Bytes(vec![0u8; (*bits as usize + 7) / 8]))
    }
    FieldType::Bits(_) => Some(FieldValue::UInt(field.default.unwrap_or(0) as u64)),
    FieldType::IntBE(_) => Some(FieldValue::Int(field.default.unwrap_or(0))),
    FieldType::Bool => Some(FieldValue::Bool(false)),
    FieldType::String => Some(FieldValue::String(String::new())),
    FieldType::Array(_) => Some(FieldValue::Array(Vec::new())),
    FieldType::BitArray => Some(FieldValue::Bytes(Vec::new())),
    FieldType::BytesToEnd => Some(FieldValue::Bytes(Vec::new())),
    FieldType::Skip(_) => None,
  }
}

/// Reads one field from the stream. `bytes_remaining` is required (and only used) for
/// `BytesToEnd`, which consumes exactly that many bytes of the enclosing parameter.
pub fn read_field(
  field: &FieldDef,
  reader: &mut BitReader,
  bytes_remaining: Option<usize>,
) -> Result<Option<FieldValue>> {
  match &field.field_type {
    FieldType::UIntBE(bits) => Ok(Some(FieldValue::UInt(reader.read_bits(*bits)?))),
    FieldType::IntBE(bits) => Ok(Some(FieldValue::Int(reader.read_signed_bits(*bits)?))),
    FieldType::Bits(bits) if *bits > 64 => {
      Ok(Some(FieldValue::Bytes(reader.read_wide_bits(*bits as u32)?)))
    }
    FieldType::Bits(bits) => Ok(Some(FieldValue::UInt(reader.read_bits(*bits)?))),
    FieldType::Bool => Ok(Some(FieldValue::Bool(reader.read_bool()?))),
    FieldType::String => {
      let length = reader.read_bits(16)? as usize;
      let raw = reader.read_bytes(length)?;
      let s = std::str::from_utf8(raw)
        .map_err(|e| LlrpError::Decode(format!("field {}: invalid utf-8: {e}", field.name)))?;
      Ok(Some(FieldValue::String(s.trim_end_matches('\0').to_string())))
    }
    FieldType::Array(elem_bits) => {
      let count = reader.read_bits(16)?;
      let mut values = Vec::with_capacity(count as usize);
      for _ in 0..count {
        values.push(reader.read_bits(*elem_bits)?);
      }
      Ok(Some(FieldValue::Array(values)))
    }
    FieldType::BitArray => {
      let bit_length = reader.read_bits(16)? as usize;
      let byte_length = (bit_length + 7) / 8;
      let raw = reader.read_bytes(byte_length)?;
      Ok(Some(FieldValue::Bytes(raw.to_vec())))
    }
    FieldType::Skip(bits) => {
      reader.read_bits(*bits)?;
      Ok(None)
    }
    FieldType::BytesToEnd => {
      let remaining = bytes_remaining.ok_or_else(|| {
        LlrpError::Decode("bytesToEnd field read without a bytesRemaining hint".into())
      })?;
      let raw = reader.read_bytes(remaining)?;
      Ok(Some(FieldValue::Bytes(raw.to_vec())))
    }
  }
}

/// Writes one field's value to the stream (the inverse of `read_field`).
pub fn write_field(field: &FieldDef, writer: &mut BitWriter, value: Option<&FieldValue>) -> Result<()> {
  match &field.field_type {
    FieldType::Bits(bits) if *bits > 64 => {
      let empty = vec![0u8; (*bits as usize + 7) / 8];
      let bytes = value.and_then(FieldValue::as_bytes).unwrap_or(&empty);
      writer.write_wide_bits(bytes, *bits as u32)
    }
    FieldType::UIntBE(bits) | FieldType::Bits(bits) => {
      let v = value.and_then(FieldValue::as_u64).unwrap_or(0);
      writer.write_bits(v, *bits)
    }
    FieldType::IntBE(bits) => {
      let v = value.and_then(FieldValue::as_i64).unwrap_or(0);
      writer.write_bits(v as u64 & mask(*bits), *bits)
    }
    FieldType::Bool => {
      let v = value.and_then(FieldValue::as_bool).unwrap_or(false);
      writer.write_bool(v)
    }
    FieldType::String => {
      let s = value.and_then(FieldValue::as_str).unwrap_or("");
      let bytes = s.as_bytes();
      writer.write_bits(bytes.len() as u64, 16)?;
      writer.write_bytes(bytes)
    }
    FieldType::Array(elem_bits) => {
      let arr = value.and_then(FieldValue::as_array).unwrap_or(&[]);
      writer.write_bits(arr.len() as u64, 16)?;
      for &e in arr {
        writer.write_bits(e, *elem_bits)?;
      }
      Ok(())
    }
    FieldType::BitArray => {
      let bytes = value.and_then(FieldValue::as_bytes).unwrap_or(&[]);
      writer.write_bits((bytes.len() * 8) as u64, 16)?;
      writer.write_bytes(bytes)
    }
    FieldType::Skip(bits) => writer.write_bits(0, *bits),
    FieldType::BytesToEnd => {
      let bytes = value.and_then(FieldValue::as_bytes).unwrap_or(&[]);
      writer.write_bytes(bytes)
    }
  }
}

fn mask(bits: u8) -> u64 {
  if bits >= 64 {
    u64::MAX
  } else {
    (1u64 << bits) - 1
  }
}

/// Validates one field's value against its declared type, range, and (if present)
/// enum membership. `path` identifies the enclosing instance for error messages.
pub fn validate_field(
  field: &FieldDef,
  value: &FieldValue,
  enums: &EnumRegistry,
  path: &str,
) -> Result<()> {
  let field_path = format!("{path}.{}", field.name);

  match &field.field_type {
    FieldType::Bits(bits) if *bits > 64 => {
      let bytes = value
        .as_bytes()
        .ok_or_else(|| LlrpError::validation(&field_path, "expected a byte buffer value"))?;
      let expected_len = (*bits as usize + 7) / 8;
      if bytes.len() != expected_len {
        return Err(LlrpError::validation(
          &field_path,
          format!("expected {expected_len} bytes for a {bits}-bit field, got {}", bytes.len()),
        ));
      }
    }
    FieldType::UIntBE(bits) | FieldType::Bits(bits) => {
      let v = value.as_u64().ok_or_else(|| {
        LlrpError::validation(&field_path, "expected an unsigned integer value")
      })?;
      let min: u64 = if field.name == "ChannelIndex" { 1 } else { 0 };
      let max: u64 = if *bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
      if v < min || v > max {
        return Err(LlrpError::validation(
          &field_path,
          format!("value {v} out of range [{min},{max}]"),
        ));
      }
    }
    FieldType::IntBE(bits) => {
      let v = value
        .as_i64()
        .ok_or_else(|| LlrpError::validation(&field_path, "expected a signed integer value"))?;
      let min: i64 = -(1i64 << (bits - 1));
      let max: i64 = -min - 1;
      if v < min || v > max {
        return Err(LlrpError::validation(
          &field_path,
          format!("value {v} out of range [{min},{max}]"),
        ));
      }
    }
    FieldType::Bool => {
      value.as_bool().ok_or_else(|| LlrpError::validation(&field_path, "expected a bool value"))?;
    }
    FieldType::Array(elem_bits) => {
      let arr =
        value.as_array().ok_or_else(|| LlrpError::validation(&field_path, "expected an array value"))?;
      let max: u64 = if *elem_bits >= 64 { u64::MAX } else { (1u64 << elem_bits) - 1 };
      for (i, &e) in arr.iter().enumerate() {
        if e > max {
          return Err(LlrpError::validation(
            &field_path,
            format!("element {i} value {e} exceeds {elem_bits}-bit range"),
          ));
        }
      }
    }
    FieldType::String => {
      value.as_str().ok_or_else(|| LlrpError::validation(&field_path, "expected a string value"))?;
    }
    FieldType::BitArray | FieldType::BytesToEnd => {
      value
        .as_bytes()
        .ok_or_else(|| LlrpError::validation(&field_path, "expected a byte buffer value"))?;
    }
    FieldType::Skip(_) => return Ok(()),
  }

  if let Some(enum_name) = &field.enum_name {
    let enum_def = enums
      .get(enum_name)
      .ok_or_else(|| LlrpError::validation(&field_path, format!("unknown enum {enum_name}")))?;
    let is_member = match value {
      FieldValue::Bool(b) => enum_def.is_member_bool(*b),
      _ => value.as_i64().map(|v| enum_def.is_member(v)).unwrap_or(false),
    };
    if !is_member {
      return Err(LlrpError::validation(
        &field_path,
        format!("value not a member of enumeration {enum_name}"),
      ));
    }
  }

  Ok(())
}
