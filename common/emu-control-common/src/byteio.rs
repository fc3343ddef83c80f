//! Byte-level I/O primitives shared by the codec, the archive, and the
//! slot store: little-endian `u32` read/write, length-prefixed UTF-8
//! strings, and DEFLATE compress/inflate helpers.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

pub fn write_u32(out: &mut impl Write, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

pub fn read_u32(input: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Writes a `len:u32` followed by `len` raw UTF-8 bytes.
pub fn write_string(out: &mut impl Write, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    write_u32(out, bytes.len() as u32)?;
    out.write_all(bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum ReadStringError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
}

/// Reads a `len:u32` followed by `len` raw bytes and decodes them as
/// UTF-8.
pub fn read_string(input: &mut impl Read) -> Result<String, ReadStringError> {
    let len = read_u32(input)?;
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| ReadStringError::InvalidUtf8)
}

/// DEFLATEs `data` at the default compression level.
pub fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflates a DEFLATE stream, expecting exactly `expected_len` output
/// bytes.
pub fn inflate(data: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len);
    decoder.read_to_end(&mut out)?;
    if out.len() != expected_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "inflated {} bytes, expected exactly {expected_len}",
                out.len()
            ),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_round_trip() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0xdead_beef).unwrap();
        assert_eq!(read_u32(&mut buf.as_slice()).unwrap(), 0xdead_beef);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "jgenstate").unwrap();
        assert_eq!(read_string(&mut buf.as_slice()).unwrap(), "jgenstate");
    }

    #[test]
    fn empty_string_round_trip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "").unwrap();
        assert_eq!(read_string(&mut buf.as_slice()).unwrap(), "");
    }

    #[test]
    fn deflate_inflate_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = deflate(&data).unwrap();
        assert!(compressed.len() < data.len());
        let restored = inflate(&compressed, data.len()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn inflate_rejects_wrong_expected_len() {
        let data = b"hello world".to_vec();
        let compressed = deflate(&data).unwrap();
        assert!(inflate(&compressed, data.len() + 1).is_err());
    }
}
