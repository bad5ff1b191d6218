//! Enumeration registry: bidirectional name<->value lookup per enum, with a sentinel
//! for unknown values so lookups never fail.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EnumDef {
  pub name: String,
  pub choices: Vec<(i64, String)>,
  value_to_name: HashMap<i64, String>,
  name_to_value: HashMap<String, i64>,
}

impl EnumDef {
  pub fn new(name: impl Into<String>, choices: Vec<(i64, String)>) -> Self {
    let value_to_name = choices.iter().cloned().map(|(v, n)| (v, n)).collect();
    let name_to_value = choices.iter().cloned().map(|(v, n)| (n, v)).collect();
    EnumDef { name: name.into(), choices, value_to_name, name_to_value }
  }

  /// Returns the member name for `value`, or the synthetic `UnknownEnum=<n>` sentinel.
  pub fn name_of(&self, value: i64) -> String {
    self.value_to_name.get(&value).cloned().unwrap_or_else(|| format!("UnknownEnum={value}"))
  }

  pub fn value_of(&self, name: &str) -> Option<i64> {
    self.name_to_value.get(name).copied()
  }

  pub fn is_member(&self, value: i64) -> bool {
    self.value_to_name.contains_key(&value)
  }

  /// Booleans passed to a two-value enum are coerced to 0/1 before the membership test.
  pub fn is_member_bool(&self, value: bool) -> bool {
    self.is_member(value as i64)
  }
}

#[derive(Debug, Clone, Default)]
pub struct EnumRegistry {
  enums: HashMap<String, EnumDef>,
}

impl EnumRegistry {
  pub fn new() -> Self {
    EnumRegistry { enums: HashMap::new() }
  }

  pub fn insert(&mut self, def: EnumDef) {
    self.enums.insert(def.name.clone(), def);
  }

  pub fn get(&self, name: &str) -> Option<&EnumDef> {
    self.enums.get(name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> EnumDef {
    EnumDef::new(
      "ConnectionAttemptStatusType",
      vec![(0, "Success".into()), (1, "Failed_A_Reader_Initiated_Connection_Already_Exists".into())],
    )
  }

  #[test]
  fn name_of_known_value() {
    assert_eq!(sample().name_of(0), "Success");
  }

  #[test]
  fn name_of_unknown_value_is_sentinel() {
    assert_eq!(sample().name_of(99), "UnknownEnum=99");
  }

  #[test]
  fn value_of_roundtrips() {
    let e = sample();
    assert_eq!(e.value_of("Success"), Some(0));
    assert_eq!(e.value_of("Nonexistent"), None);
  }

  #[test]
  fn bool_coercion_membership() {
    let e = EnumDef::new("TwoValue", vec![(0, "No".into()), (1, "Yes".into())]);
    assert!(e.is_member_bool(true));
    assert!(e.is_member_bool(false));
  }
}
