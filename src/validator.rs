//! Validator: recursive field validation plus the two-cursor structural check of a
//! parameter tree's children against its descriptor's ordered `ChildSpec` list.

use crate::error::{LlrpError, Result};
use crate::field::validate_field;
use crate::instance::Instance;
use crate::schema::Schema;
use crate::types::ChildSpec;

/// Validates an entire instance tree: every field's type/range/enum membership, and
/// every level's child cardinality, choice-group membership, and declaration order.
pub fn validate_instance(schema: &Schema, instance: &Instance) -> Result<()> {
  let mut path = Vec::new();
  validate_recursive(schema, instance, &mut path)
}

fn validate_recursive(schema: &Schema, instance: &Instance, path: &mut Vec<String>) -> Result<()> {
  path.push(instance.name().to_string());
  let path_str = path.join(".");

  for field in instance.desc.non_skip_fields() {
    let value = instance
      .fields
      .get(&field.name)
      .ok_or_else(|| LlrpError::validation(&path_str, format!("missing attribute: {}", field.name)))?;
    validate_field(field, value, &schema.enums, &path_str)?;
  }

  match instance.desc.children_spec() {
    None if !instance.children.is_empty() => {
      return Err(LlrpError::validation(&path_str, "no parameters are allowed"));
    }
    Some(specs) => check_cardinality(schema, &path_str, specs, &instance.children)?,
    None => {}
  }

  let empty: Vec<ChildSpec> = Vec::new();
  let specs = instance.desc.children_spec().unwrap_or(&empty);
  check_sequence(schema, &path_str, specs, &instance.children)?;

  for child in &instance.children {
    validate_recursive(schema, child, path)?;
  }

  path.pop();
  Ok(())
}

/// Greedily matches consecutive children against each declared slot in order, checking
/// `(min, max)` repetition for each before moving to the next slot. A child matches a
/// slot if its name equals the slot's reference, or the slot's reference is the
/// choice-group the child's concrete parameter belongs to.
fn check_cardinality(
  schema: &Schema,
  path_str: &str,
  specs: &[ChildSpec],
  children: &[Instance],
) -> Result<()> {
  let mut i = 0usize;
  let n = children.len();

  for spec in specs {
    let start = i;
    while i < n {
      let name_cur = children[i].name();
      let matches =
        name_cur == spec.ref_name || schema.choice_group_of(name_cur) == Some(spec.ref_name.as_str());
      if !matches {
        break;
      }
      i += 1;
    }
    let count = i - start;
    if count < spec.min as usize {
      return Err(LlrpError::validation(
        path_str,
        format!("missing parameter ({}-{}) of type: {}", spec.min, spec.max, spec.ref_name),
      ));
    }
    if count > spec.max as usize {
      return Err(LlrpError::validation(
        path_str,
        format!("too many parameters ({}-{}) of type: {}", spec.min, spec.max, spec.ref_name),
      ));
    }
  }
  Ok(())
}

/// Checks that children appear in non-decreasing declaration order. A child whose name
/// (or choice-group) isn't declared at this level at all is treated as unconstrained,
/// matching `pyllrp`'s fallback sequence number.
fn check_sequence(
  schema: &Schema,
  path_str: &str,
  specs: &[ChildSpec],
  children: &[Instance],
) -> Result<()> {
  let mut sequence_last = 0usize;
  for child in children {
    let name_cur = child.name();
    let sequence_cur = specs
      .iter()
      .position(|s| s.ref_name == name_cur)
      .or_else(|| {
        schema.choice_group_of(name_cur).and_then(|group| specs.iter().position(|s| s.ref_name == group))
      })
      .unwrap_or(usize::MAX);

    if sequence_cur < sequence_last {
      return Err(LlrpError::validation(path_str, format!("Incorrect Parameter Sequence: {name_cur}")));
    }
    sequence_last = sequence_cur;
  }
  Ok(())
}
