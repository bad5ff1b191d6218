//! Facade: the small set of public entry points a caller actually reaches for --
//! pack/unpack a message, unpack a standalone parameter, read one message off a socket,
//! resolve a response class name, wait for a message id, and assemble the canonical
//! ADD_ROSPEC message pyllrp ships as a convenience (`GetBasicAddRospecMessage`).

use tokio::io::AsyncReadExt;

use crate::bitstream::BitReader;
use crate::error::{LlrpError, Result};
use crate::instance::{Desc, Instance};
use crate::parameter::unpack_parameter as unpack_parameter_inner;
use crate::schema::Schema;
use crate::types::FieldValue;

/// Validates and serializes a message, assigning a message id from the process-wide
/// counter if it doesn't already have one.
pub fn pack_message(schema: &Schema, instance: &mut Instance) -> Result<Vec<u8>> {
  crate::message::pack_message(schema, instance)
}

/// Unpacks a full message from an in-memory buffer holding exactly one frame.
pub fn unpack_message(schema: &Schema, data: &[u8]) -> Result<Instance> {
  crate::message::unpack_message(schema, data)
}

/// Unpacks a single parameter (and its children, if any) from the front of `data`.
/// Returns the decoded instance; any bytes after the parameter's declared length are
/// left unconsumed from the caller's point of view (pass the whole remaining buffer of
/// an enclosing parameter/message when walking a child list by hand).
pub fn unpack_parameter(schema: &Schema, data: &[u8]) -> Result<Instance> {
  let mut reader = BitReader::new(data);
  unpack_parameter_inner(schema, &mut reader)
}

/// Reads one complete message off an async socket, blocking the calling task until the
/// frame arrives in full. See `socket::unpack_message_from_socket` for the framing
/// discipline (tolerant of partial reads, raises on two consecutive empty reads).
pub async fn unpack_message_from_socket<R>(schema: &Schema, stream: &mut R) -> Result<Instance>
where
  R: AsyncReadExt + Unpin,
{
  crate::socket::unpack_message_from_socket(schema, stream).await
}

/// Replaces a trailing `_Message` suffix with `_RESPONSE_Message`, except
/// `CUSTOM_MESSAGE_Message`, which is its own response (the vendor payload inside it
/// carries whatever response shape the vendor extension defines).
pub fn get_response_class_name(message_name: &str) -> String {
  if message_name == "CUSTOM_MESSAGE_Message" {
    return message_name.to_string();
  }
  match message_name.strip_suffix("_Message") {
    Some(stem) => format!("{stem}_RESPONSE_Message"),
    None => message_name.to_string(),
  }
}

/// Repeatedly reads messages off `stream` until one with `message_id` arrives; any
/// other message is forwarded to `on_other` if given, then discarded.
pub async fn wait_for_message<R>(
  schema: &Schema,
  message_id: u32,
  stream: &mut R,
  mut on_other: Option<&mut dyn FnMut(Instance)>,
) -> Result<Instance>
where
  R: AsyncReadExt + Unpin,
{
  loop {
    let response = unpack_message_from_socket(schema, stream).await?;
    if response.message_id == Some(message_id) {
      return Ok(response);
    }
    if let Some(handler) = on_other.as_deref_mut() {
      handler(response);
    }
  }
}

fn new_parameter(schema: &Schema, name: &str) -> Result<Instance> {
  let desc = schema
    .registries
    .parameter_by_name(name)
    .ok_or_else(|| LlrpError::Schema(format!("no such parameter descriptor: {name}")))?;
  Ok(Instance::new(Desc::Parameter(desc)))
}

fn new_message(schema: &Schema, name: &str) -> Result<Instance> {
  let desc = schema
    .registries
    .message_by_name(name)
    .ok_or_else(|| LlrpError::Schema(format!("no such message descriptor: {name}")))?;
  Ok(Instance::new(Desc::Message(desc)))
}

/// Assembles the canonical ADD_ROSPEC message pyllrp's `GetBasicAddRospecMessage`
/// builds: immediate start trigger, null stop trigger, a tag-observation AISpec stop
/// trigger (`NumberOfTags=500`, `Timeout=500`ms), and a report spec that fires on
/// `N=0` tags (i.e. only at end-of-ROSpec) with antenna ID and first-seen-timestamp
/// content selectors enabled. `antennas` defaults to `[0]` (all antennas) when empty.
pub fn get_default_add_rospec_message(
  schema: &Schema,
  message_id: Option<u32>,
  rospec_id: u32,
  inventory_parameter_spec_id: u32,
  antennas: &[u64],
) -> Result<Instance> {
  let antennas: Vec<u64> = if antennas.is_empty() { vec![0] } else { antennas.to_vec() };

  let mut start_trigger = new_parameter(schema, "ROSpecStartTrigger")?;
  if let Some(v) = schema.enums.get("ROSpecStartTriggerType").and_then(|e| e.value_of("Immediate")) {
    start_trigger.set("ROSpecStartTriggerType", FieldValue::UInt(v as u64));
  }

  let mut stop_trigger = new_parameter(schema, "ROSpecStopTrigger")?;
  if let Some(v) = schema.enums.get("ROSpecStopTriggerType").and_then(|e| e.value_of("Null")) {
    stop_trigger.set("ROSpecStopTriggerType", FieldValue::UInt(v as u64));
  }

  let mut boundary_spec = new_parameter(schema, "ROBoundarySpec")?;
  boundary_spec.add(start_trigger).add(stop_trigger);

  let mut tag_observation = new_parameter(schema, "TagObservationTrigger")?;
  if let Some(v) =
    schema.enums.get("TagObservationTriggerType").and_then(|e| e.value_of("Upon_Seeing_N_Tags_Or_Timeout"))
  {
    tag_observation.set("TriggerType", FieldValue::UInt(v as u64));
  }
  tag_observation.set("NumberOfTags", FieldValue::UInt(500));
  tag_observation.set("NumberOfAttempts", FieldValue::UInt(1));
  tag_observation.set("Timeout", FieldValue::UInt(500));
  tag_observation.set("T", FieldValue::UInt(0));

  let mut ai_stop_trigger = new_parameter(schema, "AISpecStopTrigger")?;
  if let Some(v) = schema.enums.get("AISpecStopTriggerType").and_then(|e| e.value_of("Tag_Observation")) {
    ai_stop_trigger.set("AISpecStopTriggerType", FieldValue::UInt(v as u64));
  }
  ai_stop_trigger.add(tag_observation);

  let mut inventory_spec = new_parameter(schema, "InventoryParameterSpec")?;
  inventory_spec.set("InventoryParameterSpecID", FieldValue::UInt(inventory_parameter_spec_id as u64));
  if let Some(v) = schema.enums.get("AirProtocols").and_then(|e| e.value_of("EPCGlobalClass1Gen2")) {
    inventory_spec.set("ProtocolID", FieldValue::UInt(v as u64));
  }

  let mut ai_spec = new_parameter(schema, "AISpec")?;
  ai_spec.set("AntennaIDs", FieldValue::Array(antennas));
  ai_spec.add(ai_stop_trigger).add(inventory_spec);

  let mut content_selector = new_parameter(schema, "TagReportContentSelector")?;
  content_selector.set("EnableAntennaID", FieldValue::Bool(true));
  content_selector.set("EnableFirstSeenTimestamp", FieldValue::Bool(true));

  let mut report_spec = new_parameter(schema, "ROReportSpec")?;
  if let Some(v) =
    schema.enums.get("ROReportTriggerType").and_then(|e| e.value_of("Upon_N_Tags_Or_End_Of_ROSpec"))
  {
    report_spec.set("ROReportTrigger", FieldValue::UInt(v as u64));
  }
  report_spec.set("N", FieldValue::UInt(0));
  report_spec.add(content_selector);

  let mut rospec = new_parameter(schema, "ROSpec")?;
  rospec.set("ROSpecID", FieldValue::UInt(rospec_id as u64));
  if let Some(v) = schema.enums.get("ROSpecState").and_then(|e| e.value_of("Disabled")) {
    rospec.set("CurrentState", FieldValue::UInt(v as u64));
  }
  rospec.add(boundary_spec).add(ai_spec).add(report_spec);

  let mut message = new_message(schema, "ADD_ROSPEC")?;
  message.message_id = message_id;
  message.add(rospec);
  Ok(message)
}

/// Thin wrapper over `ENABLE_ROSPEC_Message(MessageID=.., ROSpecID=..)`, per pyllrp's
/// `GetEnableRospecMesssage`.
pub fn get_enable_rospec_message(schema: &Schema, message_id: u32, rospec_id: u32) -> Result<Instance> {
  let mut message = new_message(schema, "ENABLE_ROSPEC")?;
  message.message_id = Some(message_id);
  message.set("ROSpecID", FieldValue::UInt(rospec_id as u64));
  Ok(message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn response_class_name_replaces_suffix() {
    assert_eq!(get_response_class_name("ADD_ROSPEC_Message"), "ADD_ROSPEC_RESPONSE_Message");
  }

  #[test]
  fn custom_message_is_its_own_response() {
    assert_eq!(get_response_class_name("CUSTOM_MESSAGE_Message"), "CUSTOM_MESSAGE_Message");
  }
}
