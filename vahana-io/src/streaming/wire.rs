//! Video channel framing
//!
//! Every frame is sent as a length prefix followed by the JPEG payload:
//!
//! ```text
//! ┌────────────────────┬──────────────────────────┐
//! │ Length (4 bytes)   │ JPEG payload (variable)  │
//! │ Little-endian u32  │ exactly `Length` bytes   │
//! └────────────────────┴──────────────────────────┘
//! ```
//!
//! The prefix and the payload are written back-to-back as two writes. A
//! short or failed write of either part is fatal for that connection.
//!
//! The command channel has no framing: one socket read is one command, and
//! each response is written as plain text.

use std::io::{self, Read, Write};

/// Size of the frame length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest frame a [`read_frame`] caller accepts by default (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encode the little-endian length prefix for a payload
pub fn encode_length(len: usize) -> io::Result<[u8; LENGTH_PREFIX_LEN]> {
    let len = u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Frame too large: {} bytes", len),
        )
    })?;
    Ok(len.to_le_bytes())
}

/// Write one length-prefixed frame
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let prefix = encode_length(payload.len())?;
    writer.write_all(&prefix)?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read one length-prefixed frame
///
/// Frames longer than `max_len` are rejected with `InvalidData` before any
/// payload byte is read.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame too large: {} bytes (max {})", len, max_len),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prefix_is_little_endian() {
        let mut out = Vec::new();
        write_frame(&mut out, &[0xAA; 258]).unwrap();
        assert_eq!(&out[..4], &[0x02, 0x01, 0x00, 0x00]);
        assert_eq!(out.len(), 4 + 258);
    }

    #[test]
    fn test_conformance_lengths() {
        for len in [0usize, 1, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut out = Vec::new();
            write_frame(&mut out, &payload).unwrap();

            let mut expected = (len as u32).to_le_bytes().to_vec();
            expected.extend_from_slice(&payload);
            assert_eq!(out, expected, "wire bytes for len {}", len);

            let decoded = read_frame(&mut Cursor::new(out), DEFAULT_MAX_FRAME_LEN).unwrap();
            assert_eq!(decoded, payload, "payload for len {}", len);
        }
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let mut out = Vec::new();
        write_frame(&mut out, &[1, 2, 3, 4]).unwrap();
        out.truncate(6);

        let err = read_frame(&mut Cursor::new(out), DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let out = 1024u32.to_le_bytes().to_vec();
        let err = read_frame(&mut Cursor::new(out), 512).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    /// Writer that accepts a fixed number of bytes, then fails
    struct ShortWriter(usize);

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            let n = buf.len().min(self.0);
            self.0 -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_payload_write_is_error() {
        let err = write_frame(&mut ShortWriter(6), &[0u8; 32]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
