//! Text encoding for device output
//!
//! Receipt printers expect single-byte or legacy multi-byte encodings
//! (cp437, GBK, ...). The encoding is part of the printer configuration,
//! so lookup happens by WHATWG label at runtime.

use encoding_rs::Encoding;

/// Resolve an encoding label ("utf-8", "gbk", "ibm866", ...).
///
/// Unknown labels fall back to UTF-8 so a typo in the config degrades to
/// mojibake on the paper rather than a dead queue.
pub fn resolve_encoding(label: &str) -> &'static Encoding {
    Encoding::for_label(label.trim().as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

/// Encode text for the device, lossy on unmappable characters.
///
/// ESC/POS command bytes must not pass through here; only human-readable
/// text is encoded.
pub fn encode_text(s: &str, encoding: &'static Encoding) -> Vec<u8> {
    let (cow, _, _) = encoding.encode(s);
    cow.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_labels() {
        assert_eq!(resolve_encoding("utf-8"), encoding_rs::UTF_8);
        assert_eq!(resolve_encoding("GBK"), encoding_rs::GBK);
        assert_eq!(resolve_encoding(" gbk "), encoding_rs::GBK);
    }

    #[test]
    fn test_resolve_unknown_label_falls_back() {
        assert_eq!(resolve_encoding("no-such-encoding"), encoding_rs::UTF_8);
    }

    #[test]
    fn test_encode_ascii_passthrough() {
        let bytes = encode_text("Dada Ayam", resolve_encoding("utf-8"));
        assert_eq!(bytes, b"Dada Ayam");
    }

    #[test]
    fn test_encode_lossy() {
        // cp437 has no rupiah sign, must not fail
        let bytes = encode_text("Rp 50.000 \u{20B9}", resolve_encoding("ibm866"));
        assert!(!bytes.is_empty());
    }
}
