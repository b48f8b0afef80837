// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

/// Options for a [`LogTable`](super::LogTable).
#[derive(Clone, Debug)]
pub struct LogTableOptions {
    /// Upper bound on the uncompressed size of one compressed frame.
    pub max_compress_block_size: usize,
    /// Upper bound on the file read buffer of one substream stream.
    pub max_read_buffer_size: usize,
}

impl Default for LogTableOptions {
    fn default() -> Self {
        Self {
            max_compress_block_size: 1 << 20,
            max_read_buffer_size: 1 << 20,
        }
    }
}

impl LogTableOptions {
    /// Tiny buffers so tests exercise frame splits and buffer refills.
    pub fn default_for_test() -> Self {
        Self {
            max_compress_block_size: 64,
            max_read_buffer_size: 16,
        }
    }
}
