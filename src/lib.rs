//! Schema-driven codec core for the Low Level Reader Protocol (LLRP), with Impinj
//! vendor extensions.
//!
//! A [`Schema`] loaded from a normalized schema record (`schema::SchemaRecord`) drives
//! everything downstream: constructing [`Instance`] trees in memory, validating them
//! against field ranges/enum membership/child cardinality and ordering, and
//! serializing/deserializing the LLRP binary wire framing (TLV and TV). The public
//! entry points live in [`facade`]; most callers only need `facade::pack_message`,
//! `facade::unpack_message`, and `facade::unpack_message_from_socket`.

pub mod bitstream;
pub mod enums;
pub mod error;
pub mod facade;
pub mod field;
pub mod instance;
pub mod message;
pub mod parameter;
pub mod schema;
pub mod socket;
pub mod types;
pub mod validator;

pub use error::{LlrpError, Result};
pub use facade::{
  get_default_add_rospec_message, get_enable_rospec_message, get_response_class_name, pack_message,
  unpack_message, unpack_message_from_socket, unpack_parameter, wait_for_message,
};
pub use instance::{Desc, Instance};
pub use schema::{Schema, SchemaRecord};
pub use types::{FieldValue, CUSTOM_TYPE_CODE};
