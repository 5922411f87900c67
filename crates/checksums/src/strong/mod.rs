//! Strong digests and their textual form.

mod md5;

pub use md5::Md5;

/// Renders a 16-byte digest as 32 lower-case hex characters.
#[must_use]
pub fn md5_to_hex(digest: &[u8; 16]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(32);
    for byte in digest {
        write!(&mut out, "{byte:02x}").expect("write! to String cannot fail");
    }
    out
}

/// Parses exactly 32 hex characters into a digest. Returns `None` on any
/// other length or on a non-hex character.
#[must_use]
pub fn parse_md5_hex(hex: &str) -> Option<[u8; 16]> {
    let bytes = hex.as_bytes();
    if bytes.len() != 32 {
        return None;
    }
    let mut digest = [0u8; 16];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        digest[i] = ((hi << 4) | lo) as u8;
    }
    Some(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let digest = Md5::digest(b"abc");
        let hex = md5_to_hex(&digest);
        assert_eq!(hex.len(), 32);
        assert_eq!(parse_md5_hex(&hex), Some(digest));
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert_eq!(parse_md5_hex("short"), None);
        assert_eq!(parse_md5_hex(&"zz".repeat(16)), None);
        assert_eq!(parse_md5_hex(&"0".repeat(33)), None);
    }
}
