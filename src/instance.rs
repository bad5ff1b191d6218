//! The runtime value shape: a typed tree of field values and children, shaped by a
//! descriptor pulled from the loaded schema.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::field::init_value;
use crate::types::{ChildSpec, FieldDef, FieldValue, MessageDesc, ParameterDesc, VendorKey};

#[derive(Debug, Clone)]
pub enum Desc {
  Parameter(Arc<ParameterDesc>),
  Message(Arc<MessageDesc>),
}

impl Desc {
  pub fn name(&self) -> &str {
    match self {
      Desc::Parameter(d) => &d.name,
      Desc::Message(d) => &d.name,
    }
  }

  pub fn type_code(&self) -> u16 {
    match self {
      Desc::Parameter(d) => d.type_code,
      Desc::Message(d) => d.type_code,
    }
  }

  pub fn fields(&self) -> &[FieldDef] {
    match self {
      Desc::Parameter(d) => &d.fields,
      Desc::Message(d) => &d.fields,
    }
  }

  pub fn children_spec(&self) -> Option<&[ChildSpec]> {
    match self {
      Desc::Parameter(d) => d.children.as_deref(),
      Desc::Message(d) => d.children.as_deref(),
    }
  }

  pub fn vendor(&self) -> Option<VendorKey> {
    match self {
      Desc::Parameter(d) => d.vendor,
      Desc::Message(d) => d.vendor,
    }
  }

  pub fn is_message(&self) -> bool {
    matches!(self, Desc::Message(_))
  }

  pub fn non_skip_fields(&self) -> impl Iterator<Item = &FieldDef> {
    self.fields().iter().filter(|f| !f.field_type.is_skip())
  }

  pub fn field_count(&self) -> usize {
    self.non_skip_fields().count()
  }
}

/// A constructed Message or Parameter tree. Built in-memory with defaults applied,
/// mutated freely, validated at pack time, then serialized -- or populated wholesale by
/// unpacking wire bytes.
#[derive(Debug, Clone)]
pub struct Instance {
  pub desc: Desc,
  pub fields: HashMap<String, FieldValue>,
  pub children: Vec<Instance>,
  pub message_id: Option<u32>,
  pub wire_length: Option<u32>,
}

impl Instance {
  pub fn new(desc: Desc) -> Self {
    let mut fields = HashMap::new();
    for f in desc.fields() {
      if let Some(v) = init_value(f) {
        fields.insert(f.name.clone(), v);
      }
    }
    Instance { desc, fields, children: Vec::new(), message_id: None, wire_length: None }
  }

  /// Construction convenience for descriptors with exactly one non-skip field
  /// (`ROSpecID_Parameter(123)` in pyllrp's positional-argument form).
  pub fn new_with_value(desc: Desc, value: FieldValue) -> Self {
    let mut instance = Instance::new(desc);
    if let Some(first) = instance.desc.non_skip_fields().next().map(|f| f.name.clone()) {
      instance.fields.insert(first, value);
    }
    instance
  }

  pub fn name(&self) -> &str {
    self.desc.name()
  }

  pub fn type_code(&self) -> u16 {
    self.desc.type_code()
  }

  pub fn set(&mut self, name: impl Into<String>, value: FieldValue) -> &mut Self {
    self.fields.insert(name.into(), value);
    self
  }

  pub fn get(&self, name: &str) -> Option<&FieldValue> {
    self.fields.get(name)
  }

  pub fn add(&mut self, child: Instance) -> &mut Self {
    self.children.push(child);
    self
  }

  pub fn with_child(mut self, child: Instance) -> Self {
    self.children.push(child);
    self
  }

  /// Depth-first search for the first descendant (including self's direct children,
  /// recursively) whose descriptor name matches.
  pub fn get_first_parameter_by_class(&self, name: &str) -> Option<&Instance> {
    for child in &self.children {
      if child.name() == name {
        return Some(child);
      }
      if let Some(found) = child.get_first_parameter_by_class(name) {
        return Some(found);
      }
    }
    None
  }

  pub fn get_all_parameters_by_class<'a>(&'a self, name: &'a str) -> Vec<&'a Instance> {
    let mut out = Vec::new();
    self.collect_parameters_by_class(name, &mut out);
    out
  }

  fn collect_parameters_by_class<'a>(&'a self, name: &str, out: &mut Vec<&'a Instance>) {
    for child in &self.children {
      if child.name() == name {
        out.push(child);
      } else {
        child.collect_parameters_by_class(name, out);
      }
    }
  }

  /// Convenience for `RO_ACCESS_REPORT` messages: extracts the commonly-wanted fields
  /// out of every `TagReportData` child, in report order. Mirrors pyllrp's `actions`
  /// dispatch table and `RO_ACCESS_REPORT_Message.getTagData` -- only the direct
  /// children of each `TagReportData` are inspected, not the full subtree.
  pub fn tag_data(&self) -> Vec<TagData> {
    self
      .get_all_parameters_by_class("TagReportData")
      .into_iter()
      .map(|tag_report| {
        let mut data = TagData::default();
        for child in &tag_report.children {
          match child.name() {
            "EPC_96" | "EPCData" => {
              data.epc = child.get("EPC").and_then(FieldValue::as_bytes).map(|b| b.to_vec());
            }
            "FirstSeenTimestampUTC" => {
              data.timestamp = child.get("Microseconds").and_then(FieldValue::as_u64);
            }
            "AntennaID" => {
              data.antenna_id = child.get("AntennaID").and_then(FieldValue::as_u64);
            }
            "TagSeenCount" => {
              data.tag_seen_count = child.get("TagCount").and_then(FieldValue::as_u64);
            }
            "PeakRSSI" => {
              data.peak_rssi = child.get("PeakRSSI").and_then(FieldValue::as_i64);
            }
            _ => {}
          }
        }
        data
      })
      .collect()
  }
}

/// One `TagReportData` parameter's commonly-read fields, as extracted by
/// [`Instance::tag_data`]. Any field absent from the report (the content selector
/// didn't request it) is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagData {
  pub epc: Option<Vec<u8>>,
  pub timestamp: Option<u64>,
  pub antenna_id: Option<u64>,
  pub tag_seen_count: Option<u64>,
  pub peak_rssi: Option<i64>,
}

impl fmt::Display for Instance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_instance(self, f, 0)
  }
}

fn write_instance(instance: &Instance, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
  let pad = "  ".repeat(indent);
  let data_fields: Vec<&FieldDef> = instance.desc.non_skip_fields().collect();
  let value_count = data_fields.len() + if instance.message_id.is_some() { 1 } else { 0 };

  if value_count > 1 || !instance.children.is_empty() {
    writeln!(f, "{pad}{}(", instance.name())?;
    if let Some(id) = instance.message_id {
      writeln!(f, "{pad}  MessageID={id},")?;
    }
    for field_def in &data_fields {
      let value = instance.fields.get(&field_def.name);
      writeln!(f, "{pad}  {}={},", field_def.name, format_value(value))?;
    }
    if !instance.children.is_empty() {
      writeln!(f, "{pad}  Parameters=[")?;
      for child in &instance.children {
        write_instance(child, f, indent + 2)?;
      }
      writeln!(f, "{pad}  ]")?;
    }
    writeln!(f, "{pad})")
  } else {
    write!(f, "{pad}{}( ", instance.name())?;
    if let Some(id) = instance.message_id {
      write!(f, "MessageID={id} ")?;
    }
    for field_def in &data_fields {
      let value = instance.fields.get(&field_def.name);
      write!(f, "{}={} ", field_def.name, format_value(value))?;
    }
    writeln!(f, ")")
  }
}

fn format_value(value: Option<&FieldValue>) -> String {
  match value {
    Some(FieldValue::UInt(v)) => v.to_string(),
    Some(FieldValue::Int(v)) => v.to_string(),
    Some(FieldValue::Bool(v)) => v.to_string(),
    Some(FieldValue::String(v)) => format!("{v:?}"),
    Some(FieldValue::Array(v)) => format!("{v:?}"),
    Some(FieldValue::Bytes(v)) => v.iter().map(|b| format!("{b:02x}")).collect(),
    None => "unknown".to_string(),
  }
}
