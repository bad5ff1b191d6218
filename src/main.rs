//! Small demo binary: loads a schema record from a JSON file, builds the canonical
//! ADD_ROSPEC message, packs it, unpacks the bytes back, and prints both forms.
//!
//! Usage: `llrp_demo <schema.json>`

use std::fs;

use llrp::schema::SchemaRecord;
use llrp::{get_default_add_rospec_message, pack_message, unpack_message, Schema};

fn main() {
  env_logger::init();

  let path = match std::env::args().nth(1) {
    Some(p) => p,
    None => {
      eprintln!("usage: llrp_demo <schema.json>");
      std::process::exit(1);
    }
  };

  if let Err(e) = run(&path) {
    eprintln!("llrp_demo failed: {e}");
    std::process::exit(1);
  }
}

fn run(path: &str) -> llrp::Result<()> {
  let raw = fs::read_to_string(path).map_err(llrp::LlrpError::Io)?;
  let record: SchemaRecord =
    serde_json::from_str(&raw).map_err(|e| llrp::LlrpError::Schema(e.to_string()))?;
  let schema = Schema::load(record)?;
  log::info!("loaded schema: {} vendors known", schema.vendors.len());

  let mut message = get_default_add_rospec_message(&schema, None, 123, 1234, &[])?;
  let bytes = pack_message(&schema, &mut message)?;
  println!("packed {} bytes", bytes.len());
  println!("{message}");

  let decoded = unpack_message(&schema, &bytes)?;
  println!("decoded message id: {:?}", decoded.message_id);
  println!("{decoded}");

  Ok(())
}
