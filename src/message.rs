//! Message Codec: pack/unpack a full LLRP message, including vendor-extension
//! (`CUSTOM_MESSAGE`) dispatch and the process-wide message-id counter.

use std::sync::atomic::{AtomicU32, Ordering};

use once_cell::sync::Lazy;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{LlrpError, Result};
use crate::field::{read_field, write_field};
use crate::instance::{Desc, Instance};
use crate::parameter::{pack_parameter, unpack_parameter};
use crate::schema::Schema;
use crate::types::{FieldDef, FieldType, FieldValue, CUSTOM_TYPE_CODE};
use crate::validator::validate_instance;

/// LLRP message header: 6-bit protocol version (always 1 on write), 10-bit message type.
const LLRP_VERSION: u64 = 1;
const HEADER_LEN: usize = 10;

static NEXT_MESSAGE_ID: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(1));

/// Allocates the next process-wide message id, matching pyllrp's `itertools.count(1)`.
pub fn next_message_id() -> u32 {
  NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Packs a full message (header + body + children), assigning a message id from the
/// process-wide counter if the instance doesn't already carry one.
///
/// Validates the whole instance tree first, per §4.7: an invalid field, child
/// cardinality, or child ordering raises before any bytes are produced.
pub fn pack_message(schema: &Schema, instance: &mut Instance) -> Result<Vec<u8>> {
  let desc = match &instance.desc {
    Desc::Message(d) => d.clone(),
    Desc::Parameter(_) => {
      return Err(LlrpError::Encode("expected a message instance, found a parameter".into()))
    }
  };

  validate_instance(schema, instance)?;

  if instance.message_id.is_none() {
    instance.message_id = Some(next_message_id());
  }
  let message_id = instance.message_id.expect("message id was just assigned");

  let mut writer = BitWriter::new();
  let word = (LLRP_VERSION << 10) | (desc.type_code as u64 & 0x3FF);
  writer.write_bits(word, 16)?;
  let length_offset = writer.reserve_u32()?;
  let header_start = length_offset - 2;
  writer.write_bits(message_id as u64, 32)?;

  for field in &desc.fields {
    write_field(field, &mut writer, instance.fields.get(&field.name))?;
  }
  for child in &instance.children {
    pack_parameter(child, &mut writer)?;
  }

  let total_len = writer.len() - header_start;
  let total_len: u32 = total_len
    .try_into()
    .map_err(|_| LlrpError::Encode(format!("message {} exceeds u32 length", desc.name)))?;
  writer.patch_u32(length_offset, total_len);

  Ok(writer.into_vec())
}

/// Unpacks a full message from an in-memory buffer holding exactly one message (the
/// shape `unpack_message_from_socket` hands off after reading the declared length).
pub fn unpack_message(schema: &Schema, data: &[u8]) -> Result<Instance> {
  if data.len() < HEADER_LEN {
    return Err(LlrpError::Decode("message shorter than the 10-byte header".into()));
  }
  let mut reader = BitReader::new(data);
  let word = reader.read_bits(16)?;
  let type_code = (word & 0x3FF) as u16;
  let length = reader.read_bits(32)? as u32;
  let message_id = reader.read_bits(32)? as u32;

  if length as usize != data.len() {
    return Err(LlrpError::Decode(format!(
      "declared message length {length} does not match buffer size {}",
      data.len()
    )));
  }

  let body_end = data.len();

  let instance = if type_code == CUSTOM_TYPE_CODE {
    unpack_custom_message(schema, &mut reader, body_end)?
  } else {
    let desc = schema
      .registries
      .lookup_message(type_code)
      .ok_or_else(|| LlrpError::Decode(format!("unknown message type {type_code}")))?;
    let mut instance = Instance::new(Desc::Message(desc.clone()));
    read_fields_into(&desc.fields, &mut reader, &mut instance, body_end)?;
    unpack_children(schema, &mut reader, &mut instance, body_end)?;
    check_body_consumed(&reader, body_end, &desc.name)?;
    instance
  };

  let mut instance = instance;
  instance.message_id = Some(message_id);
  instance.wire_length = Some(length);
  Ok(instance)
}

fn unpack_custom_message(schema: &Schema, reader: &mut BitReader, body_end: usize) -> Result<Instance> {
  let vendor_id = reader.read_bits(32)? as u32;
  let subtype = reader.read_bits(32)? as u32;

  match schema.registries.lookup_custom_message(vendor_id, subtype) {
    Some(desc) => {
      let mut instance = Instance::new(Desc::Message(desc.clone()));
      instance.set("VendorIdentifier", FieldValue::UInt(vendor_id as u64));
      instance.set("MessageSubtype", FieldValue::UInt(subtype as u64));
      read_fields_into(&desc.fields[2..], reader, &mut instance, body_end)?;
      unpack_children(schema, reader, &mut instance, body_end)?;
      check_body_consumed(reader, body_end, &desc.name)?;
      Ok(instance)
    }
    None => {
      let remaining = body_end.saturating_sub(reader.byte_pos());
      log::warn!(
        "unknown custom message vendor={vendor_id} subtype={subtype}, skipping {remaining} bytes"
      );
      let generic = schema.registries.lookup_message(CUSTOM_TYPE_CODE).ok_or_else(|| {
        LlrpError::Decode("no generic CUSTOM_MESSAGE descriptor loaded".into())
      })?;
      let mut instance = Instance::new(Desc::Message(generic));
      instance.set("VendorIdentifier", FieldValue::UInt(vendor_id as u64));
      instance.set("MessageSubtype", FieldValue::UInt(subtype as u64));
      let raw = reader.read_bytes(remaining)?;
      instance.set("Data", FieldValue::Bytes(raw.to_vec()));
      Ok(instance)
    }
  }
}

fn read_fields_into(
  fields: &[FieldDef],
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

/// Confirms a message's fields and children consumed exactly its declared length --
/// mirrors `parameter::check_body_consumed` for the message-frame level.
fn check_body_consumed(reader: &BitReader, body_end: usize, name: &str) -> Result<()> {
  if reader.byte_pos() != body_end {
    return Err(LlrpError::Decode(format!(
      "message {name}: declared length does not match the bytes its fields and children consumed"
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::MessageDesc;
  use std::sync::Arc;

  fn set_config_desc() -> Arc<MessageDesc> {
    Arc::new(MessageDesc {
      type_code: 3,
      name: "SET_READER_CONFIG".into(),
      fields: vec![FieldDef::new("ResetToFactoryDefault", FieldType::Bool), FieldDef::new("Reserved", FieldType::Skip(7))],
      children: None,
      vendor: None,
    })
  }

  fn schema_with_message(desc: Arc<MessageDesc>) -> Schema {
    let mut schema = Schema::default();
    schema.registries_mut().insert_message_for_test(desc);
    schema
  }

  #[test]
  fn message_roundtrip_assigns_message_id() {
    let schema = schema_with_message(set_config_desc());
    let mut instance = Instance::new(Desc::Message(set_config_desc()));
    instance.set("ResetToFactoryDefault", FieldValue::Bool(true));

    let bytes = pack_message(&schema, &mut instance).unwrap();
    assert!(instance.message_id.unwrap() > 0);
    assert_eq!(bytes.len(), HEADER_LEN + 1);

    let decoded = unpack_message(&schema, &bytes).unwrap();
    assert_eq!(decoded.message_id, instance.message_id);
    assert_eq!(decoded.get("ResetToFactoryDefault"), Some(&FieldValue::Bool(true)));
  }

  #[test]
  fn successive_messages_get_increasing_ids() {
    let schema = schema_with_message(set_config_desc());
    let mut a = Instance::new(Desc::Message(set_config_desc()));
    let mut b = Instance::new(Desc::Message(set_config_desc()));
    pack_message(&schema, &mut a).unwrap();
    pack_message(&schema, &mut b).unwrap();
    assert!(b.message_id.unwrap() > a.message_id.unwrap());
  }

  #[test]
  fn pack_message_runs_validation_before_emitting_bytes() {
    let desc = Arc::new(MessageDesc {
      type_code: 224,
      name: "SET_READER_CONFIG_WITH_CHILD".into(),
      fields: vec![],
      children: Some(vec![crate::types::ChildSpec::new("RFTransmitter", 1, 1)]),
      vendor: None,
    });
    let mut schema = Schema::default();
    schema.registries_mut().insert_message_for_test(desc.clone());
    let rf_desc = Arc::new(crate::types::ParameterDesc {
      type_code: 224,
      name: "RFTransmitter".into(),
      encoding: crate::types::Encoding::Tlv,
      fields: vec![FieldDef::new("ChannelIndex", FieldType::UIntBE(16))],
      children: None,
      tv_length: None,
      vendor: None,
    });
    schema.registries_mut().insert_parameter_for_test(rf_desc.clone());

    let mut instance = Instance::new(Desc::Message(desc));
    let mut rf = Instance::new(crate::instance::Desc::Parameter(rf_desc));
    rf.set("ChannelIndex", FieldValue::UInt(0)); // invalid: must be >= 1
    instance.add(rf);

    assert!(pack_message(&schema, &mut instance).is_err());
  }

  #[test]
  fn custom_message_unknown_vendor_is_skipped_not_fatal() {
    let generic_custom = Arc::new(MessageDesc {
      type_code: CUSTOM_TYPE_CODE,
      name: "CUSTOM_MESSAGE".into(),
      fields: vec![
        FieldDef::new("VendorIdentifier", FieldType::UIntBE(32)),
        FieldDef::new("MessageSubtype", FieldType::UIntBE(32)),
      ],
      children: None,
      vendor: None,
    });
    let schema = schema_with_message(generic_custom);

    let mut writer = BitWriter::new();
    let word = (LLRP_VERSION << 10) | (CUSTOM_TYPE_CODE as u64 & 0x3FF);
    writer.write_bits(word, 16).unwrap();
    let length_offset = writer.reserve_u32().unwrap();
    let header_start = length_offset - 2;
    writer.write_bits(42, 32).unwrap(); // message id
    writer.write_bits(1000, 32).unwrap(); // VendorIdentifier
    writer.write_bits(5, 32).unwrap(); // MessageSubtype
    writer.write_bytes(&[0x01, 0x02, 0x03]).unwrap();
    let total_len = (writer.len() - header_start) as u32;
    writer.patch_u32(length_offset, total_len);
    let bytes = writer.into_vec();

    let decoded = unpack_message(&schema, &bytes).unwrap();
    assert_eq!(decoded.get("VendorIdentifier"), Some(&FieldValue::UInt(1000)));
    assert_eq!(decoded.get("Data"), Some(&FieldValue::Bytes(vec![0x01, 0x02, 0x03])));
    assert_eq!(decoded.message_id, Some(42));
  }

  #[test]
  fn unknown_message_type_is_decode_error() {
    let schema = Schema::default();
    let mut writer = BitWriter::new();
    let word = (LLRP_VERSION << 10) | 77;
    writer.write_bits(word, 16).unwrap();
    let length_offset = writer.reserve_u32().unwrap();
    let header_start = length_offset - 2;
    writer.write_bits(1, 32).unwrap();
    let total_len = (writer.len() - header_start) as u32;
    writer.patch_u32(length_offset, total_len);
    let bytes = writer.into_vec();

    assert!(unpack_message(&schema, &bytes).is_err());
  }
}
