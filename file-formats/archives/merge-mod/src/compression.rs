//! LZMA compression and decompression
//!
//! Both container formats compress with the classic `.lzma` (LZMA-alone)
//! stream format. The decompressed length is always stored next to the
//! compressed payload, so the reader can reject size mismatches instead of
//! trusting the stream.

use crate::{Error, Result};
use lzma_rs::decompress::{Options, UnpackedSize};
use std::io::{self, BufReader, Cursor, Write};

/// Upper bound on the buffer reserved up front from a declared size
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

/// Output sink that refuses to grow past the declared size
struct BoundedWriter {
    output: Vec<u8>,
    limit: usize,
}

impl Write for BoundedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.output.len() + buf.len() > self.limit {
            return Err(io::Error::other(format!(
                "output exceeds declared size of {} bytes",
                self.limit
            )));
        }
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Decompress an LZMA stream and check it against the declared size
///
/// Neither the dictionary buffer nor the output may grow past
/// `expected_size`, so a stream that expands further fails early.
pub fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut input = BufReader::new(Cursor::new(data));
    let mut output = BoundedWriter {
        output: Vec::with_capacity(expected_size.min(MAX_PREALLOC)),
        limit: expected_size,
    };
    let options = Options {
        unpacked_size: UnpackedSize::ReadFromHeader,
        memlimit: Some(expected_size),
        ..Options::default()
    };

    lzma_rs::lzma_decompress_with_options(&mut input, &mut output, &options).map_err(|e| {
        log::debug!(
            "First 16 bytes of LZMA data: {:02X?}",
            &data[..16.min(data.len())]
        );
        Error::compression(format!("LZMA decompression failed: {e:?}"))
    })?;

    let output = output.output;
    if output.len() != expected_size {
        return Err(Error::compression(format!(
            "LZMA decompressed size mismatch: expected {}, got {}",
            expected_size,
            output.len()
        )));
    }

    Ok(output)
}

/// Compress using LZMA
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut input = BufReader::new(Cursor::new(data));
    let mut output = Vec::new();

    lzma_rs::lzma_compress(&mut input, &mut output)
        .map_err(|e| Error::compression(format!("LZMA compression failed: {e:?}")))?;

    Ok(output)
}
