//! Contains various types needed across the crate.

use crate::MAX_PIXELS;
use std::{fmt::Display, ops::Deref};

use palette::Srgb;
use thiserror::Error;

#[cfg(feature = "image")]
use {
    image::RgbImage,
    palette::cast::{ComponentsAs, IntoComponents},
};

/// The index of a cluster, in the range `0..k`.
pub type ClusterId = u32;

/// The error returned when the inputs to a clustering run are unusable.
///
/// All variants are detected before any clustering work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidArgument {
    /// The requested number of clusters was `0`.
    #[error("the number of clusters must be at least 1")]
    ZeroClusters,
    /// The pixel buffer contained no pixels.
    #[error("the pixel buffer is empty")]
    EmptyBuffer,
    /// More clusters were requested than there are pixels to seed them from.
    #[error("cannot seed {k} clusters from {pixels} pixels")]
    TooManyClusters {
        /// The requested number of clusters.
        k: u32,
        /// The number of pixels in the buffer.
        pixels: u32,
    },
    /// The pixel buffer is longer than the maximum supported length (the inner value).
    #[error("above the maximum length of {0}")]
    TooManyPixels(u32),
}

/// A 24-bit color packed into a `u32` as `0xRRGGBB`.
///
/// Any bits above the lower 24 are ignored when reading the channels.
///
/// # Examples
/// ```
/// # use lloydquant::Pixel;
/// let pixel = Pixel::new(0xFF8000);
/// assert_eq!(pixel.components(), [0xFF, 0x80, 0x00]);
/// assert_eq!(Pixel::from_rgb(0xFF, 0x80, 0x00), pixel);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Pixel(u32);

impl Pixel {
    /// Masks off the bits above the 24 color bits.
    const MASK: u32 = 0x00FF_FFFF;

    /// Creates a [`Pixel`] from a packed value, dropping any bits above the lower 24.
    #[must_use]
    pub const fn new(packed: u32) -> Self {
        Self(packed & Self::MASK)
    }

    /// Creates a [`Pixel`] from its red, green, and blue channels.
    #[must_use]
    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self(((red as u32) << 16) | ((green as u32) << 8) | blue as u32)
    }

    /// Returns the packed `0xRRGGBB` value.
    #[must_use]
    pub const fn packed(self) -> u32 {
        self.0
    }

    /// The red channel.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// The green channel.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// The blue channel.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Returns the `[red, green, blue]` channels.
    #[must_use]
    pub const fn components(self) -> [u8; 3] {
        [self.red(), self.green(), self.blue()]
    }

    /// Returns the squared Euclidean distance between two colors in RGB space.
    ///
    /// The result is at most `3 * 255^2 = 195075`.
    #[must_use]
    pub fn squared_distance(self, other: Self) -> u32 {
        self.components()
            .into_iter()
            .zip(other.components())
            .map(|(a, b)| {
                let d = u32::from(a.abs_diff(b));
                d * d
            })
            .sum()
    }
}

impl From<u32> for Pixel {
    fn from(packed: u32) -> Self {
        Self::new(packed)
    }
}

impl From<Pixel> for u32 {
    fn from(pixel: Pixel) -> Self {
        pixel.packed()
    }
}

impl From<Srgb<u8>> for Pixel {
    fn from(color: Srgb<u8>) -> Self {
        Self::from_rgb(color.red, color.green, color.blue)
    }
}

impl From<Pixel> for Srgb<u8> {
    fn from(pixel: Pixel) -> Self {
        let [r, g, b] = pixel.components();
        Srgb::new(r, g, b)
    }
}

impl Display for Pixel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

/// A non-empty slice of packed `0xRRGGBB` pixels in row-major order.
///
/// This is a simple new type wrapper around `&'a [u32]` with the invariant that the slice
/// is not empty and its length is not greater than [`MAX_PIXELS`].
///
/// # Examples
/// ```
/// # use lloydquant::{PixelBuffer, InvalidArgument};
/// # fn main() -> Result<(), InvalidArgument> {
/// let pixels: Vec<u32> = vec![0xFF0000, 0x00FF00];
/// let buffer = PixelBuffer::try_from(pixels.as_slice())?;
/// assert_eq!(buffer.num_pixels(), 2);
///
/// let empty: &[u32] = &[];
/// assert_eq!(PixelBuffer::try_from(empty), Err(InvalidArgument::EmptyBuffer));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct PixelBuffer<'a>(&'a [u32]);

impl<'a> Clone for PixelBuffer<'a> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a> Copy for PixelBuffer<'a> {}

impl<'a> PixelBuffer<'a> {
    /// Returns the length of the buffer as a `u32`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn num_pixels(&self) -> u32 {
        self.0.len() as u32
    }

    /// Returns the pixel at `index` with the unused high bits dropped.
    #[inline]
    pub(crate) fn pixel(&self, index: usize) -> Pixel {
        Pixel::new(self.0[index])
    }
}

impl<'a> AsRef<[u32]> for PixelBuffer<'a> {
    fn as_ref(&self) -> &[u32] {
        self
    }
}

impl<'a> Deref for PixelBuffer<'a> {
    type Target = [u32];

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl<'a> From<PixelBuffer<'a>> for &'a [u32] {
    fn from(val: PixelBuffer<'a>) -> Self {
        val.0
    }
}

impl<'a> TryFrom<&'a [u32]> for PixelBuffer<'a> {
    type Error = InvalidArgument;

    fn try_from(slice: &'a [u32]) -> Result<Self, Self::Error> {
        if slice.is_empty() {
            Err(InvalidArgument::EmptyBuffer)
        } else if slice.len() > MAX_PIXELS as usize {
            Err(InvalidArgument::TooManyPixels(MAX_PIXELS))
        } else {
            Ok(Self(slice))
        }
    }
}

/// Packs the pixels of an [`RgbImage`] into `0xRRGGBB` values in row-major order.
///
/// The result can be turned into a [`PixelBuffer`] with `try_from`.
#[cfg(feature = "image")]
#[must_use]
pub fn packed_pixels(image: &RgbImage) -> Vec<u32> {
    let pixels = image.pixels().len();
    let buf = &image.as_raw()[..(pixels * 3)];
    let colors: &[Srgb<u8>] = buf.components_as();
    colors.iter().map(|&color| Pixel::from(color).packed()).collect()
}

/// The output of a clustering run.
///
/// `pixels` is the segmented image: every input pixel replaced by the centroid of its cluster.
/// The remaining fields describe the final clustering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    /// The segmented pixel buffer, with the same length as the input.
    pub pixels: Vec<u32>,
    /// The final centroid of each cluster.
    ///
    /// The centroids are not guaranteed to be unique.
    pub centroids: Vec<Pixel>,
    /// The cluster of each input pixel.
    pub assignments: Vec<ClusterId>,
    /// The number of pixels assigned to each cluster.
    ///
    /// Each count is not guaranteed to be non-zero.
    pub counts: Vec<u32>,
    /// The number of assign/update iterations that were run.
    pub iterations: u32,
    /// Whether the final assignment pass made no changes.
    ///
    /// This is only `false` if the iteration cap stopped the run early.
    pub converged: bool,
}

#[cfg(feature = "image")]
impl Segmentation {
    /// Rebuilds the segmented pixels into an [`RgbImage`].
    ///
    /// Returns `None` if `width * height` does not match the number of pixels.
    #[must_use]
    pub fn to_rgbimage(&self, width: u32, height: u32) -> Option<RgbImage> {
        if u64::from(width) * u64::from(height) != self.pixels.len() as u64 {
            return None;
        }

        let buf = self
            .pixels
            .iter()
            .map(|&p| Srgb::from(Pixel::new(p)))
            .collect::<Vec<_>>()
            .into_components();

        RgbImage::from_vec(width, height, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_ignore_high_bits() {
        let pixel = Pixel::new(0xAB12_3456);
        assert_eq!(pixel.packed(), 0x12_3456);
        assert_eq!(pixel.components(), [0x12, 0x34, 0x56]);
        assert_eq!(Pixel::from_rgb(0x12, 0x34, 0x56), pixel);
    }

    #[test]
    fn srgb_conversion() {
        let color = Srgb::new(1u8, 2, 3);
        let pixel = Pixel::from(color);
        assert_eq!(pixel.packed(), 0x01_0203);
        assert_eq!(Srgb::from(pixel), color);
    }

    #[test]
    fn squared_distance_extremes() {
        let black = Pixel::new(0x000000);
        let white = Pixel::new(0xFFFFFF);
        assert_eq!(black.squared_distance(white), 195_075);
        assert_eq!(white.squared_distance(black), 195_075);
        assert_eq!(white.squared_distance(white), 0);
        assert_eq!(
            Pixel::from_rgb(10, 20, 30).squared_distance(Pixel::from_rgb(13, 16, 30)),
            25
        );
    }

    #[test]
    fn display_as_hex() {
        assert_eq!(Pixel::new(0x00A0FF).to_string(), "#00A0FF");
    }

    #[test]
    fn buffer_rejects_empty() {
        let empty: &[u32] = &[];
        assert_eq!(PixelBuffer::try_from(empty), Err(InvalidArgument::EmptyBuffer));
        let pixels: [u32; 1] = [0xFF0000];
        assert_eq!(
            PixelBuffer::try_from(&pixels[..]).map(|b| b.num_pixels()),
            Ok(1)
        );
    }

    #[cfg(feature = "image")]
    #[test]
    fn rgbimage_round_trip() {
        let image = RgbImage::from_vec(2, 1, vec![0xFF, 0x00, 0x00, 0x00, 0x80, 0xFF]).unwrap();
        let pixels = packed_pixels(&image);
        assert_eq!(pixels, vec![0xFF0000, 0x0080FF]);

        let output = Segmentation {
            pixels,
            centroids: Vec::new(),
            assignments: Vec::new(),
            counts: Vec::new(),
            iterations: 0,
            converged: true,
        };
        assert_eq!(output.to_rgbimage(2, 1), Some(image));
        assert_eq!(output.to_rgbimage(3, 1), None);
        assert_eq!(output.to_rgbimage(1, 1), None);
        let column = RgbImage::from_vec(1, 2, vec![0xFF, 0x00, 0x00, 0x00, 0x80, 0xFF]).unwrap();
        assert_eq!(output.to_rgbimage(1, 2), Some(column));
    }
}
