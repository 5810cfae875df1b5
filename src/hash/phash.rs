//! Perceptual image hash: 64 bits from the low-frequency DCT spectrum.
//!
//! The pipeline is the classic pHash construction: decode, shrink to
//! 32×32 with bilinear filtering, take luminance, run a 2D DCT-II, keep
//! the top-left 8×8 coefficient block, and emit one bit per coefficient
//! against the mean of the 63 AC coefficients. Two images within a few
//! bits of each other look alike; re-encodes and resizes land nearby.
//!
//! Two details are load-bearing for cross-version stability and must not
//! be "simplified":
//!
//! - the mean excludes the DC coefficient (index 0), but the DC bit is
//!   still emitted;
//! - the comparison is strictly greater-than. Using `>=` or folding DC
//!   into the mean flips bits on a few percent of real images.

use image::imageops::FilterType;

use super::hex64;

const SIDE: usize = 32;

/// Compute the 64-bit perceptual hash of an encoded image.
///
/// Fails only when the bytes cannot be decoded; callers treat that as
/// corrupt media, not as a pipeline error.
pub fn phash(bytes: &[u8]) -> Result<String, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let gray = img
        .resize_exact(SIDE as u32, SIDE as u32, FilterType::Triangle)
        .to_luma8();

    let mut luma = [[0f64; SIDE]; SIDE];
    for (x, y, px) in gray.enumerate_pixels() {
        luma[y as usize][x as usize] = f64::from(px.0[0]);
    }
    Ok(hex64(bits_from_luma(&luma)))
}

/// DCT + thresholding over an already-normalized 32×32 luma matrix.
///
/// Split out so the bit derivation is testable without an image decoder.
pub(crate) fn bits_from_luma(luma: &[[f64; SIDE]; SIDE]) -> u64 {
    let spectrum = dct_2d(luma);

    // Top-left 8×8 block in row-major index order.
    let mut coeffs = [0f64; 64];
    for u in 0..8 {
        for v in 0..8 {
            coeffs[u * 8 + v] = spectrum[u][v];
        }
    }

    // Mean of the AC coefficients only; DC would swamp it.
    let mean = coeffs[1..].iter().sum::<f64>() / 63.0;

    let mut out = 0u64;
    for (i, &c) in coeffs.iter().enumerate() {
        if c > mean {
            out |= 1 << (63 - i);
        }
    }
    out
}

/// Separable 2D DCT-II: 1D transform on rows, transpose, rows, transpose.
fn dct_2d(m: &[[f64; SIDE]; SIDE]) -> [[f64; SIDE]; SIDE] {
    let mut rows = [[0f64; SIDE]; SIDE];
    for (r, row) in m.iter().enumerate() {
        rows[r] = dct_1d(row);
    }
    let mut t = transpose(&rows);
    for r in 0..SIDE {
        let row = t[r];
        t[r] = dct_1d(&row);
    }
    transpose(&t)
}

/// DCT-II with orthonormal scaling:
/// `Y[k] = sqrt(2/N) * c(k) * sum(x[n] * cos(pi*(2n+1)k / 2N))`,
/// `c(0) = 1/sqrt(2)`, `c(k>0) = 1`.
fn dct_1d(x: &[f64; SIDE]) -> [f64; SIDE] {
    let n = SIDE;
    let mut out = [0f64; SIDE];
    for k in 0..n {
        let mut sum = 0.0;
        for (i, &v) in x.iter().enumerate() {
            sum += v * (std::f64::consts::PI * (((2 * i + 1) * k) as f64) / ((2 * n) as f64)).cos();
        }
        let c = if k == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        out[k] = (2.0 / n as f64).sqrt() * c * sum;
    }
    out
}

fn transpose(m: &[[f64; SIDE]; SIDE]) -> [[f64; SIDE]; SIDE] {
    let mut t = [[0f64; SIDE]; SIDE];
    for r in 0..SIDE {
        for c in 0..SIDE {
            t[c][r] = m[r][c];
        }
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sanitize;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    /// Deterministic pseudo-random luma matrix (LCG, MMIX constants).
    fn lcg_luma() -> [[f64; SIDE]; SIDE] {
        let mut state: u64 = 0x243F_6A88_85A3_08D3;
        let mut m = [[0f64; SIDE]; SIDE];
        for row in m.iter_mut() {
            for cell in row.iter_mut() {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                *cell = f64::from((state >> 56) as u8);
            }
        }
        m
    }

    #[test]
    fn test_reference_bit_pattern() {
        // Reference value computed with an independent implementation of
        // the same DCT and thresholding rules over the LCG matrix.
        let m = lcg_luma();
        assert_eq!(m[0][0], 166.0);
        assert_eq!(m[0][1], 90.0);
        assert_eq!(m[31][31], 135.0);
        assert_eq!(hex64(bits_from_luma(&m)), "cc9ba3335648f40e");
    }

    #[test]
    fn test_flat_image_hash_is_stable() {
        // Same bytes in, same hash out; and a flat image survives decode.
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([200, 30, 30])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        let bytes = buf.into_inner();

        let a = phash(&bytes).unwrap();
        let b = phash(&bytes).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_padded_png_hashes_identically_after_sanitize() {
        let mut img = RgbImage::new(48, 48);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 5) as u8, (y * 5) as u8, ((x + y) * 2) as u8]);
        }
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        let clean = buf.into_inner();

        let mut padded = clean.clone();
        padded.extend_from_slice(&[0u8; 1024]);

        let a = phash(sanitize(&clean)).unwrap();
        let b = phash(sanitize(&padded)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_undecodable_bytes_error() {
        assert!(phash(b"definitely not an image").is_err());
    }
}
