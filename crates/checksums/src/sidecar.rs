//! crates/checksums/src/sidecar.rs
//!
//! The `md5s` sidecar: one line per finished block,
//! `<md5 hex> <state hex> <start> <length>`.

use crate::manber::Block;
use crate::strong::{md5_to_hex, parse_md5_hex};
use base::error::ResultExt;
use base::{Error, ErrorKind, Result};
use std::io::Write;

/// Writes one block record.
pub fn write_block<W: Write + ?Sized>(out: &mut W, block: &Block) -> Result<()> {
    writeln!(
        out,
        "{} {:08x} {:>10} {:>10}",
        md5_to_hex(&block.md5),
        block.hash,
        block.start,
        block.len
    )
    .context("writing block-hash record")
}

/// Parsed sidecar contents in three parallel arrays, index-aligned; the
/// split keeps the hot `hashes` array dense for the compare loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockHashes {
    /// Rolling state just before each block's boundary byte.
    pub hashes: Vec<u32>,
    /// Per-block MD5s.
    pub md5s: Vec<[u8; 16]>,
    /// End offset (start + length) of each block.
    pub ends: Vec<u64>,
}

impl BlockHashes {
    /// Number of stored blocks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.hashes.len()
    }

    /// True when no blocks are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Does the stored record at `index` match `block`?
    #[must_use]
    pub fn matches(&self, index: usize, block: &Block) -> bool {
        index < self.count()
            && self.hashes[index] == block.hash
            && self.ends[index] == block.end()
            && self.md5s[index] == block.md5
    }
}

fn bad_line(lineno: usize) -> Error {
    Error::new(
        ErrorKind::Io,
        format!("malformed block-hash record in line {lineno}"),
    )
}

/// Parses a whole sidecar.
pub fn parse(data: &[u8]) -> Result<BlockHashes> {
    let text = std::str::from_utf8(data).map_err(|_| bad_line(0))?;
    let mut out = BlockHashes::default();
    for (idx, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_ascii_whitespace();
        let md5 = fields
            .next()
            .and_then(parse_md5_hex)
            .ok_or_else(|| bad_line(idx + 1))?;
        let hash = fields
            .next()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .ok_or_else(|| bad_line(idx + 1))?;
        let start: u64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad_line(idx + 1))?;
        let len: u64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad_line(idx + 1))?;
        if fields.next().is_some() {
            return Err(bad_line(idx + 1));
        }
        out.hashes.push(hash);
        out.md5s.push(md5);
        out.ends.push(start + len);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blocks() -> Vec<Block> {
        vec![
            Block {
                md5: [0xab; 16],
                hash: 0x00c0_ffee,
                start: 0,
                len: 131_072,
            },
            Block {
                md5: [0x01; 16],
                hash: 0,
                start: 131_072,
                len: 42,
            },
        ]
    }

    #[test]
    fn write_then_parse_round_trips() {
        let mut buf = Vec::new();
        let blocks = sample_blocks();
        for b in &blocks {
            write_block(&mut buf, b).expect("write");
        }

        let parsed = parse(&buf).expect("parse");
        assert_eq!(parsed.count(), 2);
        for (i, b) in blocks.iter().enumerate() {
            assert!(parsed.matches(i, b), "block {i}");
        }
        assert!(!parsed.matches(2, &blocks[0]));
    }

    #[test]
    fn record_format_is_stable() {
        let mut buf = Vec::new();
        write_block(&mut buf, &sample_blocks()[0]).expect("write");
        let line = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            line,
            format!("{} 00c0ffee          0     131072\n", "ab".repeat(16))
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse(b"nonsense\n").is_err());
        assert!(parse(b"0011223344556677 8899aabbccddeeff 1 2\n").is_err());
        let short_md5 = b"00112233 00000000 0 1\n";
        assert!(parse(short_md5).is_err());
    }

    #[test]
    fn mismatch_detected_per_field() {
        let mut buf = Vec::new();
        let blocks = sample_blocks();
        write_block(&mut buf, &blocks[0]).expect("write");
        let parsed = parse(&buf).expect("parse");

        let mut wrong = blocks[0];
        wrong.hash ^= 1;
        assert!(!parsed.matches(0, &wrong));

        let mut wrong = blocks[0];
        wrong.len += 1;
        assert!(!parsed.matches(0, &wrong));

        let mut wrong = blocks[0];
        wrong.md5[0] ^= 1;
        assert!(!parsed.matches(0, &wrong));
    }
}
