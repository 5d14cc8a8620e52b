//! Little-endian primitives shared by both container formats

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Maximum length accepted for a length-prefixed name
pub const MAX_NAME_LENGTH: usize = 260;

/// Total length of a seekable stream, leaving the cursor where it was
pub fn stream_len<S: Seek>(stream: &mut S) -> Result<u64> {
    let position = stream.stream_position()?;
    let length = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(position))?;
    Ok(length)
}

/// Report a read that ran off the end of the stream as corruption
pub fn truncation_as_corruption<S: Seek>(error: Error, stream: &mut S, length: u64) -> Error {
    match error {
        Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof => {
            let position = stream.stream_position().unwrap_or(length);
            log::debug!("Stream of {length} bytes ended inside a field at offset {position}");
            Error::Corruption { position, length }
        }
        other => other,
    }
}

/// Read a signed 32-bit length and check it fits in what is left of the stream
pub fn read_len<R: Read + Seek>(reader: &mut R, length: u64, what: &str) -> Result<usize> {
    let value = reader.read_i32::<LittleEndian>()?;
    if value < 0 {
        return Err(Error::invalid_format(format!(
            "Negative {what} length: {value}"
        )));
    }
    let remaining = length.saturating_sub(reader.stream_position()?);
    if value as u64 > remaining {
        return Err(Error::Corruption {
            position: reader.stream_position()? + value as u64,
            length,
        });
    }
    Ok(value as usize)
}

/// Read exactly `len` bytes
pub fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Read an i32-length-prefixed UTF-8 string
pub fn read_str<R: Read + Seek>(reader: &mut R, length: u64, what: &str) -> Result<String> {
    let len = read_len(reader, length, what)?;
    let bytes = read_bytes(reader, len)?;
    String::from_utf8(bytes)
        .map_err(|_| Error::invalid_format(format!("{what} is not valid UTF-8")))
}

/// Write an i32 length prefix
pub fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<()> {
    let value = i32::try_from(len)
        .map_err(|_| Error::invalid_format(format!("Length {len} does not fit in 32 bits")))?;
    writer.write_i32::<LittleEndian>(value)?;
    Ok(())
}

/// Write an i32-length-prefixed UTF-8 string
pub fn write_str<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    write_len(writer, value.len())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

/// Check that a name is a plain relative file name
///
/// Names end up as file names when a container is decompiled, so separators,
/// parent references and NUL bytes are refused.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_format("Empty asset name not allowed"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::invalid_format(format!(
            "Asset name too long ({} bytes): {}",
            name.len(),
            name.chars().take(32).collect::<String>()
        )));
    }
    if name.contains('\0') {
        return Err(Error::invalid_format("Asset name contains null bytes"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::invalid_format(format!(
            "Asset name must be a plain file name: {name}"
        )));
    }
    Ok(())
}

/// Replace a file's contents through a temporary file in the same directory
pub fn write_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.flush()?;
    temp_file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
