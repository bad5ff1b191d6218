//! Socket Framing: pull one complete LLRP message off an async byte stream using only
//! the 6-byte header (type code word + length), then hand the full frame to the Message
//! Codec.
//!
//! Grounded on pyllrp's `UnpackMessageFromSocket` (`pyllrp.py:745`, `:766`): read the
//! header, then read exactly the remaining declared length -- never more -- so bytes
//! belonging to the next frame are left on the socket instead of captured into this
//! read's buffer and dropped. Two consecutive zero-length reads in either phase mean the
//! peer is gone.

use bytes::Buf;
use tokio::io::AsyncReadExt;

use crate::error::{LlrpError, Result};
use crate::instance::Instance;
use crate::message::unpack_message;
use crate::schema::Schema;

/// 16-bit version/type word + 32-bit length.
const HEADER_BYTES: usize = 6;

const ZERO_LEN_CHUNK_MAX: u32 = 2;

/// Reads one complete LLRP message from `stream`, blocking the calling task until the
/// full frame has arrived. Tolerant of partial reads; raises `ConnectionBroken` if the
/// peer returns zero bytes twice in a row before the needed read completes.
pub async fn unpack_message_from_socket<R>(schema: &Schema, stream: &mut R) -> Result<Instance>
where
  R: AsyncReadExt + Unpin,
{
  let mut frame = read_exact_tolerant(stream, HEADER_BYTES).await?;

  let declared_length = {
    let mut peek = &frame[..];
    peek.get_u16(); // version + type code, not needed yet
    peek.get_u32() as usize
  };
  if declared_length < HEADER_BYTES {
    return Err(LlrpError::Decode(format!(
      "declared message length {declared_length} is shorter than the {HEADER_BYTES}-byte header"
    )));
  }

  frame.extend(read_exact_tolerant(stream, declared_length - HEADER_BYTES).await?);

  unpack_message(schema, &frame)
}

/// Reads exactly `target` bytes from `stream`, never requesting more than what's still
/// needed so bytes belonging to a subsequent frame are left unread on the socket.
/// Tolerates partial reads; two consecutive zero-length reads raise `ConnectionBroken`.
async fn read_exact_tolerant<R>(stream: &mut R, target: usize) -> Result<Vec<u8>>
where
  R: AsyncReadExt + Unpin,
{
  let mut buf = vec![0u8; target];
  let mut filled = 0usize;
  let mut zero_len_chunks = 0u32;
  while filled < target {
    let n = stream.read(&mut buf[filled..]).await?;
    if n == 0 {
      zero_len_chunks += 1;
      if zero_len_chunks >= ZERO_LEN_CHUNK_MAX {
        return Err(LlrpError::ConnectionBroken);
      }
      continue;
    }
    zero_len_chunks = 0;
    filled += n;
  }
  Ok(buf)
}
