//! Schema Loader: turns a normalized schema record into the immutable registries the
//! rest of the codec reads from.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::enums::{EnumDef, EnumRegistry};
use crate::error::{LlrpError, Result};
use crate::types::{
  ChildSpec, ChoiceTable, Encoding, FieldDef, FieldType, MessageDesc, ParameterDesc, VendorKey,
  CUSTOM_TYPE_CODE,
};

// ---------------------------------------------------------------------------------
// Wire shape of the normalized schema input (see spec §6.1).
// ---------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RawEnum {
  pub name: String,
  pub choices: Vec<(i64, String)>,
}

#[derive(Debug, Deserialize)]
pub struct RawFieldDef {
  pub name: String,
  #[serde(rename = "type")]
  pub type_spelling: String,
  #[serde(default)]
  pub enumeration: Option<String>,
  #[serde(default)]
  pub format: Option<String>,
  #[serde(default)]
  pub default: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawChildRef {
  pub parameter: String,
  pub repeat: (u32, u32),
}

#[derive(Debug, Deserialize)]
pub struct RawParamOrMessage {
  #[serde(rename = "typeNum")]
  pub type_num: u16,
  pub name: String,
  #[serde(default)]
  pub fields: Vec<RawFieldDef>,
  #[serde(default)]
  pub parameters: Option<Vec<RawChildRef>>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaRecord {
  pub enums: Vec<RawEnum>,
  pub parameters: Vec<RawParamOrMessage>,
  pub messages: Vec<RawParamOrMessage>,
  #[serde(rename = "choiceDefinitions")]
  pub choice_definitions: HashMap<String, String>,
  pub vendors: HashMap<String, u32>,
}

// ---------------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Registries {
  parameters_by_code: HashMap<u16, Arc<ParameterDesc>>,
  parameters_custom: HashMap<VendorKey, Arc<ParameterDesc>>,
  parameters_by_name: HashMap<String, Arc<ParameterDesc>>,
  messages_by_code: HashMap<u16, Arc<MessageDesc>>,
  messages_custom: HashMap<VendorKey, Arc<MessageDesc>>,
  messages_by_name: HashMap<String, Arc<MessageDesc>>,
}

impl Registries {
  pub fn lookup_parameter(&self, type_code: u16) -> Option<Arc<ParameterDesc>> {
    self.parameters_by_code.get(&type_code).cloned()
  }

  pub fn lookup_custom_parameter(&self, vendor_id: u32, subtype: u32) -> Option<Arc<ParameterDesc>> {
    self.parameters_custom.get(&(vendor_id, subtype)).cloned()
  }

  pub fn parameter_by_name(&self, name: &str) -> Option<Arc<ParameterDesc>> {
    self.parameters_by_name.get(name).cloned()
  }

  pub fn lookup_message(&self, type_code: u16) -> Option<Arc<MessageDesc>> {
    self.messages_by_code.get(&type_code).cloned()
  }

  pub fn lookup_custom_message(&self, vendor_id: u32, subtype: u32) -> Option<Arc<MessageDesc>> {
    self.messages_custom.get(&(vendor_id, subtype)).cloned()
  }

  pub fn message_by_name(&self, name: &str) -> Option<Arc<MessageDesc>> {
    self.messages_by_name.get(name).cloned()
  }

  pub fn parameter_name_known(&self, name: &str) -> bool {
    self.parameters_by_name.contains_key(name)
  }

  pub fn message_name_known(&self, name: &str) -> bool {
    self.messages_by_name.contains_key(name)
  }

  /// Test-only insertion path, bypassing the duplicate/reference checks `Schema::load`
  /// performs -- lets codec tests build a minimal schema from hand-written descriptors.
  #[cfg(test)]
  pub(crate) fn insert_parameter_for_test(&mut self, desc: Arc<ParameterDesc>) {
    self.parameters_by_name.insert(desc.name.clone(), desc.clone());
    if desc.type_code == CUSTOM_TYPE_CODE {
      match desc.vendor {
        Some(key) => {
          self.parameters_custom.insert(key, desc);
        }
        None => {
          self.parameters_by_code.insert(CUSTOM_TYPE_CODE, desc);
        }
      }
    } else {
      self.parameters_by_code.insert(desc.type_code, desc);
    }
  }

  #[cfg(test)]
  pub(crate) fn insert_message_for_test(&mut self, desc: Arc<MessageDesc>) {
    self.messages_by_name.insert(desc.name.clone(), desc.clone());
    if desc.type_code == CUSTOM_TYPE_CODE {
      match desc.vendor {
        Some(key) => {
          self.messages_custom.insert(key, desc);
        }
        None => {
          self.messages_by_code.insert(CUSTOM_TYPE_CODE, desc);
        }
      }
    } else {
      self.messages_by_code.insert(desc.type_code, desc);
    }
  }
}

/// The fully loaded schema: registries, enum table, choice membership, and vendor
/// name<->code table. Everything downstream (field codec, parameter/message codec,
/// validator, facade) is handed a `&Schema`.
#[derive(Debug, Default)]
pub struct Schema {
  pub enums: EnumRegistry,
  pub registries: Registries,
  pub choices: ChoiceTable,
  pub vendors: HashMap<String, u32>,
}

impl Schema {
  pub fn get_vendor_name(&self, vendor_code: u32) -> String {
    self
      .vendors
      .iter()
      .find(|(_, &code)| code == vendor_code)
      .map(|(name, _)| name.clone())
      .unwrap_or_else(|| vendor_code.to_string())
  }

  /// Resolves the choice-group name that `parameter_name` satisfies, if any.
  pub fn choice_group_of(&self, parameter_name: &str) -> Option<&str> {
    self.choices.get(parameter_name).map(|s| s.as_str())
  }

  #[cfg(test)]
  pub(crate) fn registries_mut(&mut self) -> &mut Registries {
    &mut self.registries
  }

  pub fn load(record: SchemaRecord) -> Result<Schema> {
    let mut enums = EnumRegistry::new();
    for raw in record.enums {
      let mut seen_values = std::collections::HashSet::new();
      let mut seen_names = std::collections::HashSet::new();
      for (value, name) in &raw.choices {
        if !seen_values.insert(*value) {
          return Err(LlrpError::Schema(format!(
            "enum {} has duplicate value {}",
            raw.name, value
          )));
        }
        if !seen_names.insert(name.clone()) {
          return Err(LlrpError::Schema(format!(
            "enum {} has duplicate member name {}",
            raw.name, name
          )));
        }
      }
      enums.insert(EnumDef::new(raw.name, raw.choices));
    }

    let mut registries = Registries::default();

    for raw in &record.parameters {
      let desc = build_parameter_desc(raw)?;
      let is_custom = desc.type_code == CUSTOM_TYPE_CODE;

      registries.parameters_by_name.insert(desc.name.clone(), Arc::new(desc.clone()));

      if is_custom {
        match desc.vendor {
          Some(key) => {
            if registries.parameters_custom.insert(key, Arc::new(desc)).is_some() {
              return Err(LlrpError::Schema(format!(
                "duplicate custom parameter vendor key {key:?}"
              )));
            }
          }
          None => {
            if registries.parameters_by_code.insert(CUSTOM_TYPE_CODE, Arc::new(desc)).is_some() {
              return Err(LlrpError::Schema(
                "more than one generic Custom parameter descriptor".into(),
              ));
            }
          }
        }
      } else if registries.parameters_by_code.insert(desc.type_code, Arc::new(desc)).is_some() {
        return Err(LlrpError::Schema(format!(
          "duplicate parameter type code {}",
          raw.type_num
        )));
      }
    }

    for raw in &record.messages {
      let desc = build_message_desc(raw)?;
      let is_custom = desc.type_code == CUSTOM_TYPE_CODE;

      registries.messages_by_name.insert(desc.name.clone(), Arc::new(desc.clone()));

      if is_custom {
        match desc.vendor {
          Some(key) => {
            if registries.messages_custom.insert(key, Arc::new(desc)).is_some() {
              return Err(LlrpError::Schema(format!(
                "duplicate custom message vendor key {key:?}"
              )));
            }
          }
          None => {
            if registries.messages_by_code.insert(CUSTOM_TYPE_CODE, Arc::new(desc)).is_some() {
              return Err(LlrpError::Schema(
                "more than one generic CUSTOM_MESSAGE descriptor".into(),
              ));
            }
          }
        }
      } else if registries.messages_by_code.insert(desc.type_code, Arc::new(desc)).is_some() {
        return Err(LlrpError::Schema(format!("duplicate message type code {}", raw.type_num)));
      }
    }

    // Validate that every ChildSpec refers to something real: a known parameter name or
    // a known choice-group name.
    let known_groups: std::collections::HashSet<&str> =
      record.choice_definitions.values().map(|s| s.as_str()).collect();
    for desc in registries.parameters_by_name.values() {
      validate_children_refs(desc.children.as_deref(), &registries, &known_groups)?;
    }
    for desc in registries.messages_by_name.values() {
      validate_children_refs(desc.children.as_deref(), &registries, &known_groups)?;
    }

    // §4.1 post-load adjustment: the generic Custom parameter and CUSTOM_MESSAGE
    // message both end with a BytesToEnd "Data" field that's subsumed by the
    // vendor-specific descriptors; strip it so the trailing raw bytes of an *unknown*
    // custom body are consumed by the skip-to-declared-length path instead.
    strip_trailing_bytes_to_end(&mut registries);

    Ok(Schema { enums, registries, choices: record.choice_definitions, vendors: record.vendors })
  }
}

fn validate_children_refs(
  children: Option<&[ChildSpec]>,
  registries: &Registries,
  known_groups: &std::collections::HashSet<&str>,
) -> Result<()> {
  let Some(children) = children else { return Ok(()) };
  for child in children {
    let known = registries.parameter_name_known(&child.ref_name)
      || registries.message_name_known(&child.ref_name)
      || known_groups.contains(child.ref_name.as_str());
    if !known {
      return Err(LlrpError::Schema(format!("unknown child reference: {}", child.ref_name)));
    }
  }
  Ok(())
}

fn strip_trailing_bytes_to_end(registries: &mut Registries) {
  if let Some(desc) = registries.parameters_by_code.get(&CUSTOM_TYPE_CODE) {
    if desc.name == "Custom" {
      let mut d = (**desc).clone();
      if matches!(d.fields.last().map(|f| &f.field_type), Some(FieldType::BytesToEnd)) {
        d.fields.pop();
      }
      registries.parameters_by_code.insert(CUSTOM_TYPE_CODE, Arc::new(d.clone()));
      registries.parameters_by_name.insert(d.name.clone(), Arc::new(d));
    }
  }
  if let Some(desc) = registries.messages_by_code.get(&CUSTOM_TYPE_CODE) {
    if desc.name == "CUSTOM_MESSAGE" {
      let mut d = (**desc).clone();
      if matches!(d.fields.last().map(|f| &f.field_type), Some(FieldType::BytesToEnd)) {
        d.fields.pop();
      }
      registries.messages_by_code.insert(CUSTOM_TYPE_CODE, Arc::new(d.clone()));
      registries.messages_by_name.insert(d.name.clone(), Arc::new(d));
    }
  }
}

fn parse_fields(raw_fields: &[RawFieldDef]) -> Result<Vec<FieldDef>> {
  raw_fields
    .iter()
    .map(|f| {
      let field_type = FieldType::parse(&f.type_spelling)
        .ok_or_else(|| LlrpError::Schema(format!("unknown field type spelling: {}", f.type_spelling)))?;
      let mut def = FieldDef::new(f.name.clone(), field_type);
      if let Some(e) = &f.enumeration {
        def = def.with_enum(e.clone());
      }
      if let Some(d) = f.default {
        def = def.with_default(d);
      }
      Ok(def)
    })
    .collect()
}

fn bit_width(ft: &FieldType) -> Option<u32> {
  match ft {
    FieldType::UIntBE(n) | FieldType::IntBE(n) | FieldType::Bits(n) | FieldType::Skip(n) => {
      Some(*n as u32)
    }
    FieldType::Bool => Some(1),
    _ => None,
  }
}

fn parse_children(raw: &Option<Vec<RawChildRef>>) -> Option<Vec<ChildSpec>> {
  raw.as_ref().map(|v| v.iter().map(|c| ChildSpec::new(c.parameter.clone(), c.repeat.0, c.repeat.1)).collect())
}

fn detect_vendor(fields: &[FieldDef], first: &str, second: &str) -> Option<VendorKey> {
  let f0 = fields.first()?;
  let f1 = fields.get(1)?;
  if f0.name == first && f1.name == second {
    Some((f0.default? as u32, f1.default? as u32))
  } else {
    None
  }
}

fn build_parameter_desc(raw: &RawParamOrMessage) -> Result<ParameterDesc> {
  let fields = parse_fields(&raw.fields)?;
  let children = parse_children(&raw.parameters);
  let vendor = detect_vendor(&fields, "VendorIdentifier", "ParameterSubtype");

  let encoding = if raw.type_num <= 127 { Encoding::Tv } else { Encoding::Tlv };

  let tv_length = if encoding == Encoding::Tv {
    let mut total_bits: u32 = 8; // the 1-byte tag
    for f in &fields {
      let bits = bit_width(&f.field_type).ok_or_else(|| {
        LlrpError::Schema(format!(
          "TV parameter {} has a variable-length field {}",
          raw.name, f.name
        ))
      })?;
      total_bits += bits;
    }
    if total_bits % 8 != 0 {
      return Err(LlrpError::Schema(format!(
        "TV parameter {} is not a whole number of bytes ({} bits)",
        raw.name, total_bits
      )));
    }
    Some((total_bits / 8) as u16)
  } else {
    None
  };

  Ok(ParameterDesc {
    type_code: raw.type_num,
    name: raw.name.clone(),
    encoding,
    fields,
    children,
    tv_length,
    vendor,
  })
}

fn build_message_desc(raw: &RawParamOrMessage) -> Result<MessageDesc> {
  let fields = parse_fields(&raw.fields)?;
  let children = parse_children(&raw.parameters);
  let vendor = detect_vendor(&fields, "VendorIdentifier", "MessageSubtype");

  Ok(MessageDesc { type_code: raw.type_num, name: raw.name.clone(), fields, children, vendor })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn minimal_record() -> SchemaRecord {
    SchemaRecord {
      enums: vec![],
      parameters: vec![RawParamOrMessage {
        type_num: 1023,
        name: "Custom".into(),
        fields: vec![
          RawFieldDef { name: "VendorIdentifier".into(), type_spelling: "uintbe:32".into(), enumeration: None, format: None, default: None },
          RawFieldDef { name: "ParameterSubtype".into(), type_spelling: "uintbe:32".into(), enumeration: None, format: None, default: None },
          RawFieldDef { name: "Data".into(), type_spelling: "bytesToEnd".into(), enumeration: None, format: None, default: None },
        ],
        parameters: None,
      }],
      messages: vec![],
      choice_definitions: HashMap::new(),
      vendors: HashMap::new(),
    }
  }

  #[test]
  fn strips_trailing_bytes_to_end_from_generic_custom() {
    let schema = Schema::load(minimal_record()).unwrap();
    let desc = schema.registries.lookup_parameter(CUSTOM_TYPE_CODE).unwrap();
    assert_eq!(desc.fields.len(), 2);
    assert!(desc.vendor.is_none());
  }

  #[test]
  fn tv_parameter_length_must_be_whole_bytes() {
    let record = SchemaRecord {
      enums: vec![],
      parameters: vec![RawParamOrMessage {
        type_num: 13,
        name: "EPC_96".into(),
        fields: vec![RawFieldDef {
          name: "EPC".into(),
          type_spelling: "bits:95".into(),
          enumeration: None,
          format: None,
          default: None,
        }],
        parameters: None,
      }],
      messages: vec![],
      choice_definitions: HashMap::new(),
      vendors: HashMap::new(),
    };
    assert!(Schema::load(record).is_err());
  }

  #[test]
  fn unknown_child_reference_is_schema_error() {
    let record = SchemaRecord {
      enums: vec![],
      parameters: vec![RawParamOrMessage {
        type_num: 200,
        name: "Outer".into(),
        fields: vec![],
        parameters: Some(vec![RawChildRef { parameter: "Nonexistent".into(), repeat: (0, 1) }]),
      }],
      messages: vec![],
      choice_definitions: HashMap::new(),
      vendors: HashMap::new(),
    };
    assert!(Schema::load(record).is_err());
  }
}
