//! The schema's static data model: field types, field/parameter/message descriptors,
//! and the runtime value shape fields are read into.

use std::collections::HashMap;

pub const CUSTOM_TYPE_CODE: u16 = 1023;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
  UIntBE(u8),
  IntBE(u8),
  Bool,
  Bits(u8),
  String,
  Array(u8),
  BitArray,
  Skip(u8),
  BytesToEnd,
}

impl FieldType {
  pub fn is_skip(&self) -> bool {
    matches!(self, FieldType::Skip(_))
  }

  /// Parses the schema's uniform type spelling, e.g. `uintbe:16`, `bits:2`, `skip:6`.
  pub fn parse(spelling: &str) -> Option<FieldType> {
    let (tag, arg) = match spelling.split_once(':') {
      Some((t, a)) => (t, Some(a)),
      None => (spelling, None),
    };
    match tag {
      "uintbe" => arg?.parse().ok().map(FieldType::UIntBE),
      "intbe" => arg?.parse().ok().map(FieldType::IntBE),
      "bool" => Some(FieldType::Bool),
      "bits" => arg?.parse().ok().map(FieldType::Bits),
      "string" => Some(FieldType::String),
      "array" => arg?.parse().ok().map(FieldType::Array),
      "bitarray" => Some(FieldType::BitArray),
      "skip" => arg?.parse().ok().map(FieldType::Skip),
      "bytesToEnd" => Some(FieldType::BytesToEnd),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
  pub name: String,
  pub field_type: FieldType,
  pub enum_name: Option<String>,
  pub default: Option<i64>,
}

impl FieldDef {
  pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
    FieldDef { name: name.into(), field_type, enum_name: None, default: None }
  }

  pub fn with_enum(mut self, enum_name: impl Into<String>) -> Self {
    self.enum_name = Some(enum_name.into());
    self
  }

  pub fn with_default(mut self, default: i64) -> Self {
    self.default = Some(default);
    self
  }
}

/// The runtime value of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
  UInt(u64),
  Int(i64),
  Bool(bool),
  String(String),
  Array(Vec<u64>),
  Bytes(Vec<u8>),
}

impl FieldValue {
  pub fn as_u64(&self) -> Option<u64> {
    match self {
      FieldValue::UInt(v) => Some(*v),
      FieldValue::Int(v) if *v >= 0 => Some(*v as u64),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      FieldValue::Int(v) => Some(*v),
      FieldValue::UInt(v) => Some(*v as i64),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      FieldValue::Bool(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      FieldValue::String(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_bytes(&self) -> Option<&[u8]> {
    match self {
      FieldValue::Bytes(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&[u64]> {
    match self {
      FieldValue::Array(v) => Some(v),
      _ => None,
    }
  }
}

/// A declared child slot: either a concrete parameter name or a choice-group name,
/// repeated `min..=max` times at this position.
#[derive(Debug, Clone)]
pub struct ChildSpec {
  pub ref_name: String,
  pub min: u32,
  pub max: u32,
}

impl ChildSpec {
  pub fn new(ref_name: impl Into<String>, min: u32, max: u32) -> Self {
    ChildSpec { ref_name: ref_name.into(), min, max }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
  Tlv,
  Tv,
}

/// Vendor dispatch key: (vendorId, subtype). The outer type code is always
/// `CUSTOM_TYPE_CODE` for anything carrying one of these.
pub type VendorKey = (u32, u32);

#[derive(Debug, Clone)]
pub struct ParameterDesc {
  pub type_code: u16,
  pub name: String,
  pub encoding: Encoding,
  pub fields: Vec<FieldDef>,
  pub children: Option<Vec<ChildSpec>>,
  /// Total wire length in bytes for TV parameters, including the 1-byte tag.
  pub tv_length: Option<u16>,
  pub vendor: Option<VendorKey>,
}

impl ParameterDesc {
  pub fn non_skip_fields(&self) -> impl Iterator<Item = &FieldDef> {
    self.fields.iter().filter(|f| !f.field_type.is_skip())
  }

  pub fn field_count(&self) -> usize {
    self.non_skip_fields().count()
  }
}

#[derive(Debug, Clone)]
pub struct MessageDesc {
  pub type_code: u16,
  pub name: String,
  pub fields: Vec<FieldDef>,
  pub children: Option<Vec<ChildSpec>>,
  pub vendor: Option<VendorKey>,
}

impl MessageDesc {
  pub fn non_skip_fields(&self) -> impl Iterator<Item = &FieldDef> {
    self.fields.iter().filter(|f| !f.field_type.is_skip())
  }

  pub fn field_count(&self) -> usize {
    self.non_skip_fields().count()
  }
}

/// Choice-group membership: maps a concrete parameter name to the choice-group name it
/// satisfies, mirroring `pyllrp`'s `choiceDefinitions` (keyed by member, not by group).
pub type ChoiceTable = HashMap<String, String>;
