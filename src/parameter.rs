//! Parameter Codec: pack/unpack a single TLV or TV parameter, including vendor-extension
//! (`Custom`) dispatch and recursive child unpacking.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{LlrpError, Result};
use crate::field::{read_field, write_field};
use crate::instance::{Desc, Instance};
use crate::schema::Schema;
use crate::types::{Encoding, FieldType, FieldValue, CUSTOM_TYPE_CODE};

/// Unpacks one parameter (and, for TLV parameters, its children) starting at the
/// reader's current byte-aligned position.
pub fn unpack_parameter(schema: &Schema, reader: &mut BitReader) -> Result<Instance> {
  if !reader.is_byte_aligned() {
    return Err(LlrpError::Decode("unpack_parameter called off byte boundary".into()));
  }

  if reader.peek_u8()? & 0x80 != 0 {
    return unpack_tv_parameter(schema, reader);
  }
  unpack_tlv_parameter(schema, reader)
}

fn unpack_tv_parameter(schema: &Schema, reader: &mut BitReader) -> Result<Instance> {
  let header_byte = reader.read_bits(8)? as u8;
  let type_code = (header_byte & 0x7F) as u16;
  let desc = schema
    .registries
    .lookup_parameter(type_code)
    .ok_or_else(|| LlrpError::Decode(format!("unknown TV parameter type {type_code}")))?;

  let mut instance = Instance::new(Desc::Parameter(desc.clone()));
  for field in &desc.fields {
    if let Some(value) = read_field(field, reader, None)? {
      instance.fields.insert(field.name.clone(), value);
    }
  }
  instance.wire_length = desc.tv_length.map(u32::from);
  Ok(instance)
}

fn unpack_tlv_parameter(schema: &Schema, reader: &mut BitReader) -> Result<Instance> {
  let header_start = reader.byte_pos();
  let type_code = (reader.read_bits(16)? as u16) & 0x3FF;
  let length = reader.read_bits(16)? as u32;
  let body_end = header_start + length as usize;

  if type_code == CUSTOM_TYPE_CODE {
    return unpack_custom_parameter(schema, reader, length, body_end);
  }

  let desc = schema
    .registries
    .lookup_parameter(type_code)
    .ok_or_else(|| LlrpError::Decode(format!("unknown parameter type {type_code}")))?;

  let mut instance = Instance::new(Desc::Parameter(desc.clone()));
  read_fields_into(&desc.fields, reader, &mut instance, body_end)?;
  unpack_children(schema, reader, &mut instance, body_end)?;
  check_body_consumed(reader, body_end, &desc.name)?;
  instance.wire_length = Some(length);
  Ok(instance)
}

/// Confirms the fields (and, for TLV parameters with children, the child parameters)
/// consumed exactly the declared length -- a descriptor whose field list doesn't match
/// the wire shape would otherwise desync the reader for whatever comes next.
fn check_body_consumed(reader: &BitReader, body_end: usize, name: &str) -> Result<()> {
  if reader.byte_pos() != body_end {
    return Err(LlrpError::Decode(format!(
      "parameter {name}: declared length does not match the bytes its fields and children consumed"
    )));
  }
  Ok(())
}

fn unpack_custom_parameter(
  schema: &Schema,
  reader: &mut BitReader,
  length: u32,
  body_end: usize,
) -> Result<Instance> {
  let vendor_id = reader.read_bits(32)? as u32;
  let subtype = reader.read_bits(32)? as u32;

  match schema.registries.lookup_custom_parameter(vendor_id, subtype) {
    Some(desc) => {
      let mut instance = Instance::new(Desc::Parameter(desc.clone()));
      instance.set("VendorIdentifier", FieldValue::UInt(vendor_id as u64));
      instance.set("ParameterSubtype", FieldValue::UInt(subtype as u64));
      read_fields_into(&desc.fields[2..], reader, &mut instance, body_end)?;
      unpack_children(schema, reader, &mut instance, body_end)?;
      check_body_consumed(reader, body_end, &desc.name)?;
      instance.wire_length = Some(length);
      Ok(instance)
    }
    None => {
      let remaining = body_end.saturating_sub(reader.byte_pos());
      log::warn!(
        "unknown custom parameter vendor={vendor_id} subtype={subtype}, skipping {remaining} bytes"
      );
      let generic = schema.registries.lookup_parameter(CUSTOM_TYPE_CODE).ok_or_else(|| {
        LlrpError::Decode("no generic Custom parameter descriptor loaded".into())
      })?;
      let mut instance = Instance::new(Desc::Parameter(generic));
      instance.set("VendorIdentifier", FieldValue::UInt(vendor_id as u64));
      instance.set("ParameterSubtype", FieldValue::UInt(subtype as u64));
      let raw = reader.read_bytes(remaining)?;
      instance.set("Data", FieldValue::Bytes(raw.to_vec()));
      instance.wire_length = Some(length);
      Ok(instance)
    }
  }
}

fn read_fields_into(
  fields: &[crate::types::FieldDef],
  reader: &mut BitReader,
  instance: &mut Instance,
  body_end: usize,
) -> Result<()> {
  for field in fields {
    let bytes_remaining = matches!(field.field_type, FieldType::BytesToEnd)
      .then(|| body_end.saturating_sub(reader.byte_pos()));
    if let Some(value) = read_field(field, reader, bytes_remaining)? {
      instance.fields.insert(field.name.clone(), value);
    }
  }
  Ok(())
}

fn unpack_children(
  schema: &Schema,
  reader: &mut BitReader,
  instance: &mut Instance,
  body_end: usize,
) -> Result<()> {
  if instance.desc.children_spec().is_none() {
    return Ok(());
  }
  while reader.byte_pos() < body_end {
    instance.children.push(unpack_parameter(schema, reader)?);
  }
  Ok(())
}

/// Writes one parameter, including children for TLV parameters, patching the length
/// field once the body is known.
pub fn pack_parameter(instance: &Instance, writer: &mut BitWriter) -> Result<()> {
  let desc = match &instance.desc {
    Desc::Parameter(d) => d.clone(),
    Desc::Message(_) => {
      return Err(LlrpError::Encode("expected a parameter instance, found a message".into()))
    }
  };

  match desc.encoding {
    Encoding::Tv => {
      if !instance.children.is_empty() {
        return Err(LlrpError::Encode(format!("TV parameter {} cannot carry children", desc.name)));
      }
      let tag_byte = 0x80 | (desc.type_code as u8);
      writer.write_bits(tag_byte as u64, 8)?;
      for field in &desc.fields {
        write_field(field, writer, instance.fields.get(&field.name))?;
      }
      Ok(())
    }
    Encoding::Tlv => {
      writer.write_bits(desc.type_code as u64, 16)?;
      let length_offset = writer.reserve_u16()?;
      let header_start = length_offset - 2;

      for field in &desc.fields {
        write_field(field, writer, instance.fields.get(&field.name))?;
      }
      for child in &instance.children {
        pack_parameter(child, writer)?;
      }

      let total_len = writer.len() - header_start;
      let total_len: u16 = total_len
        .try_into()
        .map_err(|_| LlrpError::Encode(format!("parameter {} exceeds 65535 bytes", desc.name)))?;
      writer.patch_u16(length_offset, total_len);
      Ok(())
    }
  }
}
