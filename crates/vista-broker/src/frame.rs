//! XWB frame encoding and reply decoding.
//!
//! Every request to the Broker listener is one text frame:
//!
//! ```text
//! +-----------+-------+----------------+--------------------+------+
//! | [XWB]1130 | mode  | len(name),name |    parameters      | 0x04 |
//! | 9 bytes   | 1 / 3 | 1 + N bytes    |  see below         | EOT  |
//! +-----------+-------+----------------+--------------------+------+
//! ```
//!
//! - mode: `"4"` for low-level commands (TCPConnect), `"2\x01\x31"` for
//!   ordinary RPC calls
//! - name: single length byte followed by the literal RPC name
//! - parameters: `"54f"` when the list is empty; otherwise `"5"` then,
//!   per parameter, a kind digit, a 3-digit zero-padded byte length, the
//!   payload bytes, and an `"f"` marker
//!
//! Replies are plain text terminated by the same `0x04` byte. Some
//! listeners prefix the first reply chunk with one or two NUL bytes;
//! those are stripped, and only those.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::{BrokerError, Result};
use crate::params::RpcParam;

/// Protocol prefix carried by every frame.
pub const PROTOCOL_PREFIX: &str = "[XWB]1130";

/// End-of-transmission byte terminating every frame and every reply.
pub const FRAME_TERMINATOR: u8 = 0x04;

/// Mode token for low-level commands.
const MODE_COMMAND: &str = "4";

/// Mode token for ordinary RPC calls.
const MODE_RPC: &str = "2\u{1}1";

/// Marker used in place of the parameter list when it is empty.
const EMPTY_PARAMS: &str = "54f";

/// Read buffer size for reply chunks.
const READ_CHUNK: usize = 4096;

/// Encodes an RPC invocation into a wire frame.
///
/// # Arguments
///
/// * `name` - The RPC or command name (at most 255 bytes).
/// * `params` - Positional parameters.
/// * `is_command` - True for low-level commands such as `TCPConnect`.
///
/// # Errors
///
/// Fails if the name cannot be length-prefixed with a single byte or a
/// parameter payload exceeds the 3-digit length field.
pub fn encode_frame(name: &str, params: &[RpcParam], is_command: bool) -> Result<Vec<u8>> {
    if name.len() > 255 {
        return Err(BrokerError::RpcNameTooLong { len: name.len() });
    }

    let mut frame = Vec::with_capacity(32 + name.len());
    frame.extend_from_slice(PROTOCOL_PREFIX.as_bytes());
    frame.extend_from_slice(if is_command { MODE_COMMAND } else { MODE_RPC }.as_bytes());
    frame.push(name.len() as u8);
    frame.extend_from_slice(name.as_bytes());

    if params.is_empty() {
        frame.extend_from_slice(EMPTY_PARAMS.as_bytes());
    } else {
        frame.push(b'5');
        for param in params {
            let payload = param.payload()?;
            frame.push(param.kind_byte() as u8);
            frame.extend_from_slice(format!("{:03}", payload.len()).as_bytes());
            frame.extend_from_slice(payload.as_bytes());
            frame.push(b'f');
        }
    }

    frame.push(FRAME_TERMINATOR);
    Ok(frame)
}

/// Reads one terminated reply from the transport.
///
/// Chunks are accumulated until one ends with the terminator byte. The
/// first chunk may carry a one- or two-byte NUL preamble; exactly that
/// preamble is stripped, never a real leading character.
///
/// # Errors
///
/// Returns `BrokerError::ConnectionClosed` if the stream ends before a
/// terminator is seen.
pub async fn read_reply<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut assembled: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut first_chunk = true;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(BrokerError::ConnectionClosed);
        }
        let mut chunk = &buf[..n];
        if first_chunk {
            // At most two NUL bytes of preamble; the first real byte stays.
            let preamble = chunk.iter().take(2).take_while(|&&b| b == 0).count();
            chunk = &chunk[preamble..];
            first_chunk = false;
        }
        let terminated = chunk.last() == Some(&FRAME_TERMINATOR);
        if terminated {
            assembled.extend_from_slice(&chunk[..chunk.len() - 1]);
            trace!(bytes = assembled.len(), "reply assembled");
            return Ok(String::from_utf8_lossy(&assembled).into_owned());
        }
        assembled.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::string_params;
    use std::collections::BTreeMap;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_encode_command_frame() {
        let params = string_params(["10.0.0.1", "0", "FMQL"]);
        let frame = encode_frame("TCPConnect", &params, true).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(b"[XWB]11304");
        expected.push(10); // len("TCPConnect")
        expected.extend_from_slice(b"TCPConnect");
        expected.extend_from_slice(b"5");
        expected.extend_from_slice(b"000810.0.0.1f");
        expected.extend_from_slice(b"00010f");
        expected.extend_from_slice(b"0004FMQLf");
        expected.push(0x04);
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_encode_rpc_frame_no_params() {
        let frame = encode_frame("XUS SIGNON SETUP", &[], false).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(b"[XWB]11302\x011");
        expected.push(16);
        expected.extend_from_slice(b"XUS SIGNON SETUP");
        expected.extend_from_slice(b"54f");
        expected.push(0x04);
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_encode_named_array_param() {
        let mut map = BTreeMap::new();
        map.insert("patientId".to_string(), "8".to_string());
        let frame =
            encode_frame("VPR GET PATIENT DATA", &[RpcParam::NamedArray(map)], false).unwrap();
        let text = String::from_utf8_lossy(&frame);
        // Kind '2', then the 3-digit byte length of the JSON payload.
        assert!(text.contains(r#"2017{"patientId":"8"}f"#));
    }

    #[test]
    fn test_encode_rejects_long_name() {
        let name = "X".repeat(256);
        let result = encode_frame(&name, &[], false);
        assert!(matches!(result, Err(BrokerError::RpcNameTooLong { len: 256 })));
    }

    #[tokio::test]
    async fn test_read_reply_single_chunk() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(b"hello\x04").await.unwrap();
        let reply = read_reply(&mut rx).await.unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_read_reply_many_chunks() {
        let (mut tx, mut rx) = tokio::io::duplex(4);
        let handle = tokio::spawn(async move {
            tx.write_all(b"abcdefghijklmnop\x04").await.unwrap();
        });
        let reply = read_reply(&mut rx).await.unwrap();
        assert_eq!(reply, "abcdefghijklmnop");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_reply_strips_one_nul() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(b"\x00Jones\x04").await.unwrap();
        assert_eq!(read_reply(&mut rx).await.unwrap(), "Jones");
    }

    #[tokio::test]
    async fn test_read_reply_strips_two_nuls_only() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(b"\x00\x00Jones\x04").await.unwrap();
        assert_eq!(read_reply(&mut rx).await.unwrap(), "Jones");
    }

    #[tokio::test]
    async fn test_read_reply_preserves_later_nuls() {
        let (mut tx, mut rx) = tokio::io::duplex(4);
        // The preamble rule applies to the first chunk only.
        let handle = tokio::spawn(async move {
            tx.write_all(b"\x00abc\x00def\x04").await.unwrap();
        });
        assert_eq!(read_reply(&mut rx).await.unwrap(), "abc\x00def");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_reply_eof_before_terminator() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(b"partial").await.unwrap();
        drop(tx);
        let result = read_reply(&mut rx).await;
        assert!(matches!(result, Err(BrokerError::ConnectionClosed)));
    }
}
