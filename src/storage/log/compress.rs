// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Block-oriented compressed streams over plain files.
//!
//! Data files are a sequence of self-delimited frames:
//!
//! ```plain
//! | crc32(payload) | payload len | raw len |   payload   |
//! |      4B LE     |    4B LE    |  4B LE  |  lz4 block  |
//! ```
//!
//! A reader positioned at a frame start can decode that frame and keep
//! going; mark offsets recorded by the writer always land on frame starts.

use std::io::{Read, Write};

use bytes::{Buf, BufMut};

use crate::types::read_exact_or_eof;

const FRAME_HEADER_SIZE: usize = 12;

/// Compresses written bytes into frames of at most `max_block_size`
/// uncompressed bytes each, counting the compressed bytes emitted so callers
/// can record frame-aligned offsets.
pub struct CompressedWriter<W: Write> {
    out: W,
    block: Vec<u8>,
    max_block_size: usize,
    compressed_bytes: u64,
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(out: W, max_block_size: usize) -> Self {
        assert!(max_block_size > 0);
        Self {
            out,
            block: Vec::new(),
            max_block_size,
            compressed_bytes: 0,
        }
    }

    /// Number of compressed bytes emitted to the underlying writer so far.
    ///
    /// The next call to [`flush_block`](Self::flush_block) starts a frame at
    /// exactly this offset relative to the start of the stream.
    pub fn compressed_bytes(&self) -> u64 {
        self.compressed_bytes
    }

    /// Emit the pending bytes as one frame. A no-op when nothing is pending.
    pub fn flush_block(&mut self) -> std::io::Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let payload = lz4_flex::compress(&self.block);
        let mut header = Vec::with_capacity(FRAME_HEADER_SIZE);
        header.put_u32_le(crc32fast::hash(&payload));
        header.put_u32_le(payload.len() as u32);
        header.put_u32_le(self.block.len() as u32);
        self.out.write_all(&header)?;
        self.out.write_all(&payload)?;
        self.compressed_bytes += (FRAME_HEADER_SIZE + payload.len()) as u64;
        self.block.clear();
        Ok(())
    }

    /// Flush the tail frame and return the underlying writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.flush_block()?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let room = self.max_block_size - self.block.len();
            let take = room.min(rest.len());
            self.block.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.block.len() == self.max_block_size {
                self.flush_block()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_block()?;
        self.out.flush()
    }
}

/// Decompresses a sequence of frames, exposing the raw bytes as a
/// [`Read`] with a clean end of stream at the last frame boundary.
pub struct CompressedReader<R: Read> {
    input: R,
    block: Vec<u8>,
    pos: usize,
}

impl<R: Read> CompressedReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            block: Vec::new(),
            pos: 0,
        }
    }

    fn fill_block(&mut self) -> std::io::Result<bool> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let filled = read_exact_or_eof(&mut self.input, &mut header)?;
        if filled == 0 {
            return Ok(false);
        }
        if filled < FRAME_HEADER_SIZE {
            return Err(invalid_data("truncated frame header"));
        }
        let mut slice = &header[..];
        let checksum = slice.get_u32_le();
        let payload_len = slice.get_u32_le() as usize;
        let raw_len = slice.get_u32_le() as usize;

        let mut payload = vec![0u8; payload_len];
        self.input.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != checksum {
            return Err(invalid_data("frame checksum mismatch"));
        }
        self.block = lz4_flex::decompress(&payload, raw_len)
            .map_err(|err| invalid_data(format!("frame decompression failed: {err}")))?;
        self.pos = 0;
        Ok(true)
    }
}

impl<R: Read> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.block.len() {
            if !self.fill_block()? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.block.len() - self.pos);
        buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn invalid_data(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.into())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use super::*;

    #[test]
    fn test_round_trip() {
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let mut writer = CompressedWriter::new(Vec::new(), 1024);
        writer.write_all(&data).unwrap();
        let encoded = writer.finish().unwrap();

        let mut reader = CompressedReader::new(Cursor::new(encoded));
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_seek_to_frame_boundary() {
        let mut writer = CompressedWriter::new(Vec::new(), 1024);
        writer.write_all(b"first frame").unwrap();
        writer.flush_block().unwrap();
        let second_frame_offset = writer.compressed_bytes();
        writer.write_all(b"second frame").unwrap();
        let encoded = writer.finish().unwrap();

        let mut cursor = Cursor::new(encoded);
        cursor.seek(SeekFrom::Start(second_frame_offset)).unwrap();
        let mut reader = CompressedReader::new(cursor);
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"second frame");
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut writer = CompressedWriter::new(Vec::new(), 1024);
        writer.write_all(b"some data that will be corrupted").unwrap();
        let mut encoded = writer.finish().unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        let mut reader = CompressedReader::new(Cursor::new(encoded));
        let mut decoded = Vec::new();
        let err = reader.read_to_end(&mut decoded).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_large_write_splits_frames() {
        let data = vec![7u8; 300];
        let mut writer = CompressedWriter::new(Vec::new(), 64);
        writer.write_all(&data).unwrap();
        writer.flush_block().unwrap();
        let frames = writer.compressed_bytes();
        assert!(frames > 0);
        let encoded = writer.finish().unwrap();

        let mut reader = CompressedReader::new(Cursor::new(encoded));
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }
}
