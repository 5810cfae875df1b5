//! Trailing-garbage trim for image containers.
//!
//! Relays and CDN re-transports sometimes append padding after an image's
//! logical terminator. The decoder tolerates it, but the perceptual hash
//! reads the whole container, so the same picture arrives with different
//! bytes and a different hash. Trimming at the terminator restores
//! byte-stable input before hashing.

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8];
const GIF_MAGIC: &[u8] = b"GIF";

/// Trim anything after the container's logical terminator.
///
/// Returns a prefix of the input slice; when no trimming applies the input
/// comes back unchanged. Families handled by magic bytes:
///
/// - PNG: keep through the last `IEND` plus its 4-byte CRC (`idx + 8`).
/// - JPEG: keep through the last `FF D9` (`idx + 2`).
/// - GIF: keep through the last `0x3B` trailer byte (`idx + 1`).
///
/// Unknown magic, a missing terminator, or a terminator whose tail runs
/// past the end of the buffer all leave the input untouched.
pub fn sanitize(bytes: &[u8]) -> &[u8] {
    if bytes.starts_with(PNG_MAGIC) {
        trim_after(bytes, b"IEND", 8)
    } else if bytes.starts_with(JPEG_MAGIC) {
        trim_after(bytes, &[0xFF, 0xD9], 2)
    } else if bytes.starts_with(GIF_MAGIC) {
        trim_after(bytes, &[0x3B], 1)
    } else {
        bytes
    }
}

/// Keep `bytes[..last_occurrence(marker) + keep]`, if that range is valid.
fn trim_after<'a>(bytes: &'a [u8], marker: &[u8], keep: usize) -> &'a [u8] {
    match rfind(bytes, marker) {
        Some(idx) if idx + keep <= bytes.len() => &bytes[..idx + keep],
        _ => bytes,
    }
}

/// Index of the last occurrence of `needle` in `haystack`.
fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_with_tail(tail: &[u8]) -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(&[0x00; 16]); // stand-in chunk data
        bytes.extend_from_slice(b"IEND");
        bytes.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]); // CRC
        let clean_len = bytes.len();
        bytes.extend_from_slice(tail);
        assert_eq!(sanitize(&bytes).len(), clean_len);
        bytes
    }

    #[test]
    fn test_png_trailing_padding_removed() {
        png_with_tail(&[0u8; 1024]);
        png_with_tail(b"some appended transport junk");
    }

    #[test]
    fn test_png_without_tail_unchanged() {
        let bytes = png_with_tail(&[]);
        let out = sanitize(&bytes);
        assert_eq!(out, &bytes[..]);
        // Prefix slice of the same buffer, no copy.
        assert_eq!(out.as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn test_png_keeps_last_iend() {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(b"IEND\x01\x02\x03\x04");
        bytes.extend_from_slice(b"IEND\x05\x06\x07\x08");
        bytes.extend_from_slice(b"tail");
        let out = sanitize(&bytes);
        assert_eq!(out.len(), bytes.len() - 4);
        assert!(out.ends_with(&[0x05, 0x06, 0x07, 0x08]));
    }

    #[test]
    fn test_jpeg_trimmed_at_eoi() {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x10, 0x20, 0xFF, 0xD9];
        let clean_len = bytes.len();
        bytes.extend_from_slice(&[0x00; 512]);
        assert_eq!(sanitize(&bytes).len(), clean_len);
    }

    #[test]
    fn test_gif_trimmed_at_trailer() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&[0x2C, 0x00, 0x3B]);
        let clean_len = bytes.len();
        bytes.extend_from_slice(b"padding");
        // The padding contains no 0x3B, so the original trailer wins.
        assert_eq!(sanitize(&bytes).len(), clean_len);
    }

    #[test]
    fn test_unknown_magic_untouched() {
        let bytes = b"RIFF....WEBPVP8 \x3B trailing".to_vec();
        assert_eq!(sanitize(&bytes), &bytes[..]);
    }

    #[test]
    fn test_missing_terminator_untouched() {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(&[0x11; 32]);
        assert_eq!(sanitize(&bytes), &bytes[..]);
    }

    #[test]
    fn test_truncated_terminator_tail_untouched() {
        // IEND present but the CRC is cut short; nothing safe to trim.
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(b"IEND\x01\x02");
        assert_eq!(sanitize(&bytes), &bytes[..]);
    }
}
