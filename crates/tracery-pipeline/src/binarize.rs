//! Binarization: luminance threshold over an RGBA bitmap.
//!
//! Each pixel's Rec. 601 luminance (`0.299*R + 0.587*G + 0.114*B`) is
//! composited onto a white background using its alpha channel, then
//! compared against the threshold. Transparent pixels therefore read
//! as white and land in the background unless `invert` is set.
//!
//! This is the first processing step: bitmap in, [`BinaryMask`] out.

use crate::bitgrid::BitGrid;
use crate::types::{Bitmap, Dimensions};

/// One bit per pixel: `true` is foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: BitGrid,
}

impl BinaryMask {
    /// An all-background mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            bits: BitGrid::new(len),
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Whether pixel `(x, y)` is foreground. Coordinates outside the
    /// image are background.
    #[must_use]
    pub fn is_foreground(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = y as usize * self.width as usize + x as usize;
        self.bits.get(index)
    }

    /// Mark pixel `(x, y)` as foreground. Out-of-range writes are ignored.
    pub fn set_foreground(&mut self, x: u32, y: u32) {
        if x < self.width && y < self.height {
            self.bits
                .set(y as usize * self.width as usize + x as usize);
        }
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn foreground_count(&self) -> u64 {
        self.bits.count_ones()
    }
}

/// Perceptual luminance of an RGBA pixel composited over white.
#[must_use]
pub fn composite_luminance([r, g, b, a]: [u8; 4]) -> f64 {
    let lum = 0.114f64.mul_add(
        f64::from(b),
        0.299f64.mul_add(f64::from(r), 0.587 * f64::from(g)),
    );
    let alpha = f64::from(a) / 255.0;
    lum.mul_add(alpha, 255.0 * (1.0 - alpha))
}

/// Classify every pixel of `bitmap` into foreground/background.
///
/// A pixel is foreground when its composited luminance is below
/// `threshold`; `invert` flips the test.
#[must_use = "returns the binary mask"]
pub fn binarize(bitmap: &Bitmap, threshold: u8, invert: bool) -> BinaryMask {
    let mut mask = BinaryMask::new(bitmap.width(), bitmap.height());
    let limit = f64::from(threshold);
    for (x, y, pixel) in bitmap.as_image().enumerate_pixels() {
        let dark = composite_luminance(pixel.0) < limit;
        if dark != invert {
            mask.set_foreground(x, y);
        }
    }
    mask
}
