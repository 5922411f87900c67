//! crates/checksums/src/manber/mod.rs
//!
//! The Manber rolling-hash block splitter.
//!
//! An 8-byte window rolls a polynomial hash over the stream; a block ends
//! wherever the hash has all [`BOUNDARY_MASK`] bits clear, which yields
//! content-defined blocks of about 128 KiB on average. Each finished block
//! carries its MD5, the rolling state just before the boundary byte, and
//! its offsets; the per-file sidecar stores one line per block so a later
//! run can stop re-reading a file at the first block that changed.
//!
//! Runs of zero bytes are special-cased: while a block has seen nothing
//! but `\0`, no hashing happens at all and the block is ended at the first
//! non-zero byte with an all-zero MD5. Sparse files therefore cost almost
//! nothing.

use crate::strong::Md5;
use base::Result;
use std::sync::OnceLock;

/// Backtrack window length in bytes. A power of two.
pub const WINDOW: usize = 8;
/// Prime multiplier of the rolling polynomial.
pub const PRIME: u32 = 0x0100_0193;
/// Modulus of the rolling polynomial.
pub const MODULUS: u32 = 0x7FFF_FFFF;
/// A block boundary is wherever `state & BOUNDARY_MASK == 0`; seventeen
/// mask bits give ~128 KiB average blocks.
pub const BOUNDARY_MASK: u32 = 0x0001_FFFF;
/// Files shorter than this are not worth a sidecar; the writer discards
/// one at close when fewer bytes went through.
pub const MIN_SIDECAR_SIZE: u64 = 256 * 1024;

/// `values[b] = b * PRIME^WINDOW mod MODULUS`, the contribution an
/// outgoing byte must give up when it leaves the window.
fn outgoing() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut power: u64 = 1;
        for _ in 0..WINDOW {
            power = power * u64::from(PRIME) % u64::from(MODULUS);
        }
        let mut table = [0u32; 256];
        for (byte, slot) in table.iter_mut().enumerate() {
            *slot = (byte as u64 * power % u64::from(MODULUS)) as u32;
        }
        table
    })
}

/// One finished block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    /// MD5 of the block's bytes; all-zero for a zero-run block.
    pub md5: [u8; 16],
    /// Rolling state just before the boundary byte.
    pub hash: u32,
    /// Offset of the block's first byte in the file.
    pub start: u64,
    /// Block length in bytes.
    pub len: u64,
}

impl Block {
    /// Offset one past the block's last byte.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Streaming splitter state for one file.
///
/// Feed any byte slices through [`update`](Self::update); block records
/// come back through the callback, and [`finish`](Self::finish) yields the
/// full-file MD5. Boundaries depend only on content, never on how the
/// input was sliced.
#[derive(Debug)]
pub struct Manber {
    state: u32,
    last_state: u32,
    backtrack: [u8; WINDOW],
    bk_pos: usize,
    bk_len: usize,
    data_seen: bool,
    pending_zeros: usize,
    block_md5: Md5,
    full_md5: Md5,
    block_start: u64,
    pos: u64,
}

impl Default for Manber {
    fn default() -> Self {
        Self::new()
    }
}

impl Manber {
    /// Fresh state at file offset zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: 0,
            last_state: 0,
            backtrack: [0; WINDOW],
            bk_pos: 0,
            bk_len: 0,
            data_seen: false,
            pending_zeros: 0,
            block_md5: Md5::new(),
            full_md5: Md5::new(),
            block_start: 0,
            pos: 0,
        }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.pos
    }

    /// Feeds `data`, invoking `on_block` for every boundary found.
    pub fn update<F>(&mut self, mut data: &[u8], mut on_block: F) -> Result<()>
    where
        F: FnMut(&Block) -> Result<()>,
    {
        while !data.is_empty() {
            let (consumed, boundary) = self.scan(data);
            self.full_md5.update(&data[..consumed]);
            self.pos += consumed as u64;

            if boundary {
                let block = Block {
                    md5: if self.data_seen {
                        std::mem::replace(&mut self.block_md5, Md5::new()).finalize()
                    } else {
                        [0u8; 16]
                    },
                    hash: self.last_state,
                    start: self.block_start,
                    len: self.pos - self.block_start,
                };
                on_block(&block)?;
                self.reset_block();
            }

            data = &data[consumed..];
        }
        Ok(())
    }

    /// Finalises the stream, returning the full-file MD5 and total length.
    /// The final, boundary-less block is not reported.
    #[must_use]
    pub fn finish(self) -> ([u8; 16], u64) {
        (self.full_md5.finalize(), self.pos)
    }

    /// Consumes bytes up to and including the next boundary, or all of
    /// `data`. Returns `(consumed, boundary_found)`. Block-MD5 state is
    /// kept current for data blocks; zero blocks never touch it.
    fn scan(&mut self, data: &[u8]) -> (usize, bool) {
        let table = outgoing();
        let modulus = u64::from(MODULUS);
        let mut i = 0;

        // Window fill: no boundary checks for the first WINDOW bytes of a
        // block. Zeros are only counted until the first data byte, at
        // which point they are replayed into the block MD5.
        let mut md5_from = if self.data_seen { Some(0) } else { None };
        while i < data.len() && self.bk_len < WINDOW {
            let byte = data[i];
            if !self.data_seen {
                if byte == 0 {
                    self.pending_zeros += 1;
                } else {
                    self.data_seen = true;
                    self.block_md5.update(&[0u8; WINDOW][..self.pending_zeros]);
                    self.pending_zeros = 0;
                    md5_from = Some(i);
                }
            }
            self.state =
                ((u64::from(self.state) * u64::from(PRIME) + u64::from(byte)) % modulus) as u32;
            self.backtrack[self.bk_pos] = byte;
            self.bk_pos = (self.bk_pos + 1) & (WINDOW - 1);
            self.bk_len += 1;
            i += 1;
        }

        if !self.data_seen {
            // Zero block: boundary at the first non-zero byte, which then
            // starts the next block.
            return data[i..].iter().position(|&b| b != 0).map_or_else(
                || (data.len(), false),
                |off| (i + off, true),
            );
        }

        let mut boundary = false;
        while i < data.len() {
            let byte = data[i];
            self.last_state = self.state;
            let out = u64::from(table[usize::from(self.backtrack[self.bk_pos])]);
            self.state = ((u64::from(self.state) * u64::from(PRIME)
                + u64::from(byte)
                + (modulus - out))
                % modulus) as u32;
            self.backtrack[self.bk_pos] = byte;
            self.bk_pos = (self.bk_pos + 1) & (WINDOW - 1);
            i += 1;
            if self.state & BOUNDARY_MASK == 0 {
                boundary = true;
                break;
            }
        }

        if let Some(from) = md5_from {
            self.block_md5.update(&data[from..i]);
        }
        (i, boundary)
    }

    fn reset_block(&mut self) {
        self.state = 0;
        self.last_state = 0;
        self.backtrack = [0; WINDOW];
        self.bk_pos = 0;
        self.bk_len = 0;
        self.data_seen = false;
        self.pending_zeros = 0;
        self.block_md5 = Md5::new();
        self.block_start = self.pos;
    }
}

/// Splits a whole in-memory buffer, returning the blocks, the full MD5 and
/// the total length.
pub fn split_buffer(data: &[u8]) -> Result<(Vec<Block>, [u8; 16], u64)> {
    let mut manber = Manber::new();
    let mut blocks = Vec::new();
    manber.update(data, |b| {
        blocks.push(*b);
        Ok(())
    })?;
    let (md5, len) = manber.finish();
    Ok((blocks, md5, len))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Deterministic pseudo-random bytes (xorshift64*); reproducible test
    /// data with enough entropy to actually hit block boundaries.
    pub(crate) fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut x = seed;
        let mut out = Vec::with_capacity(len + 8);
        while out.len() < len {
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;
            out.extend_from_slice(&x.wrapping_mul(0x2545_F491_4F6C_DD1D).to_le_bytes());
        }
        out.truncate(len);
        out
    }

    fn split_chunked(data: &[u8], chunk: usize) -> (Vec<Block>, [u8; 16]) {
        let mut manber = Manber::new();
        let mut blocks = Vec::new();
        for piece in data.chunks(chunk.max(1)) {
            manber
                .update(piece, |b| {
                    blocks.push(*b);
                    Ok(())
                })
                .expect("update");
        }
        let (md5, len) = manber.finish();
        assert_eq!(len, data.len() as u64);
        (blocks, md5)
    }

    #[test]
    fn constant_file_has_no_boundary() {
        // 256 KiB of 0x41: the rolling state settles on a constant that
        // never satisfies the boundary mask, so the whole file is one
        // implicit block.
        let data = vec![0x41u8; 256 * 1024];
        let (blocks, md5, len) = split_buffer(&data).expect("split");
        assert!(blocks.is_empty());
        assert_eq!(len, data.len() as u64);
        assert_eq!(md5, Md5::digest(&data));
    }

    #[test]
    fn chunking_is_independent_of_buffering() {
        let data = random_bytes(600_000, 12345);
        let (whole, md5_whole) = split_chunked(&data, data.len());
        assert_eq!(whole.len(), 4, "fixture must produce boundaries");
        for chunk in [1usize, 7, 4096, 100_000] {
            let (blocks, md5) = split_chunked(&data, chunk);
            assert_eq!(blocks, whole, "chunk size {chunk}");
            assert_eq!(md5, md5_whole);
        }
    }

    #[test]
    fn blocks_tile_the_prefix() {
        let data = random_bytes(900_000, 0x9E37_79B9_7F4A_7C15);
        let (blocks, _, len) = split_buffer(&data).expect("split");
        assert!(!blocks.is_empty());
        let mut expected_start = 0;
        for block in &blocks {
            assert_eq!(block.start, expected_start);
            assert!(block.len > 0);
            expected_start = block.end();
        }
        assert!(expected_start <= len);
    }

    #[test]
    fn block_md5_matches_block_bytes() {
        let data = random_bytes(900_000, 0x9E37_79B9_7F4A_7C15);
        let (blocks, _, _) = split_buffer(&data).expect("split");
        assert_eq!(blocks.len(), 4);
        for block in &blocks {
            let bytes = &data[block.start as usize..block.end() as usize];
            assert_eq!(block.md5, Md5::digest(bytes));
        }
    }

    #[test]
    fn zero_run_collapses_into_one_block() {
        let mut data = vec![0u8; 300_000];
        data.extend_from_slice(&[7u8; 64]);

        let (blocks, md5, _) = split_buffer(&data).expect("split");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].md5, [0u8; 16]);
        assert_eq!(blocks[0].hash, 0);
        assert_eq!(blocks[0].start, 0);
        assert_eq!(blocks[0].len, 300_000);
        assert_eq!(md5, Md5::digest(&data));
    }

    #[test]
    fn sparse_layout_one_block_per_region() {
        // zeros, data, zeros: the leading zeros become one zero block,
        // the data region drains into a state-zero boundary as soon as
        // the trailing zero run fills the window, and the tail zeros
        // stay one open block.
        let mut data = vec![0u8; 100_000];
        data.extend(random_bytes(150_000, 77).into_iter().map(|b| b | 1));
        data.extend(std::iter::repeat_n(0u8, 100_000));

        let (blocks, _, _) = split_buffer(&data).expect("split");
        assert_eq!(blocks[0].md5, [0u8; 16], "leading zero block");
        assert_eq!(blocks[0].len, 100_000);
        let last = blocks.last().expect("at least the zero block");
        assert_eq!(last.end(), 250_000 + WINDOW as u64);
        for b in &blocks[1..] {
            assert_ne!(b.md5, [0u8; 16], "data blocks carry a real MD5");
        }
    }

    #[test]
    fn prepending_a_byte_shifts_every_boundary_by_one() {
        let data = random_bytes(700_000, 0x9E37_79B9_7F4A_7C15);
        let (orig, _, _) = split_buffer(&data).expect("split");
        assert_eq!(orig.len(), 3, "fixture must produce several blocks");

        let mut shifted = vec![0x42u8];
        shifted.extend_from_slice(&data);
        let (moved, _, _) = split_buffer(&shifted).expect("split");

        // The rolling hash depends only on the last WINDOW bytes, so
        // every boundary reappears exactly one byte later.
        assert_eq!(moved.len(), orig.len());
        for (o, m) in orig.iter().zip(&moved) {
            assert_eq!(m.end(), o.end() + 1);
        }
        // Blocks past the first have identical content and hashes.
        for (o, m) in orig.iter().zip(&moved).skip(1) {
            assert_eq!(o.md5, m.md5);
            assert_eq!(o.hash, m.hash);
        }
    }

    proptest! {
        #[test]
        fn arbitrary_buffering_matches_one_shot(
            data in proptest::collection::vec(any::<u8>(), 0..32_768),
            chunk in 1usize..4096,
        ) {
            let (whole, md5_whole) = split_chunked(&data, data.len().max(1));
            let (blocks, md5) = split_chunked(&data, chunk);
            prop_assert_eq!(blocks, whole);
            prop_assert_eq!(md5, md5_whole);
        }
    }
}
