//! A library for color quantization and image segmentation using Lloyd's k-means algorithm.
//!
//! `lloydquant` clusters the pixels of an image by color and replaces each pixel with the
//! mean color of its cluster. Pixels are 24-bit colors packed into `u32`s as `0xRRGGBB`.
//!
//! # Features
//! To reduce dependencies and compile times, `lloydquant` has several `cargo` features
//! that can be turned off or on:
//! - `threads`: exposes parallel versions of the clustering passes via [`rayon`].
//! - `image`: enables integration with the [`image`] crate.
//!
//! # Example
//! ```
//! # use lloydquant::{lloyd, LloydOptions};
//! # fn main() -> Result<(), lloydquant::InvalidArgument> {
//! let pixels: Vec<u32> = vec![0xFF0000, 0xF80000, 0x0000FF, 0x0000F8];
//!
//! let options = LloydOptions::new()
//!     .seed(42) // the same seed always gives the same output
//!     .max_iterations(Some(100)); // stop early on slowly converging inputs
//!
//! let output = lloyd::run(&pixels, 2, &options)?;
//!
//! assert_eq!(output.pixels.len(), pixels.len());
//! assert!(output.centroids.len() == 2);
//! # Ok(())
//! # }
//! ```
//!
//! See the [`lloyd`] module for more details.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod options;
mod types;

pub mod lloyd;

pub use options::LloydOptions;
pub use types::*;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;

    /// 1024 random pixels.
    pub fn test_data_1024() -> Vec<u32> {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
        (0..1024).map(|_| rng.gen::<u32>() & 0xFF_FFFF).collect()
    }

    /// 1024 pixels spread around four well separated colors.
    ///
    /// Pixel `i` belongs to blob `i % 4`.
    pub fn test_blobs() -> Vec<u32> {
        const CENTERS: [[u8; 3]; 4] = [
            [0x20, 0x20, 0x20],
            [0xE0, 0x20, 0x20],
            [0x20, 0xE0, 0x20],
            [0x20, 0x20, 0xE0],
        ];

        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(1);
        (0..1024)
            .map(|i| {
                let [r, g, b] = CENTERS[i % 4].map(|c| c - 0x10 + rng.gen_range(0..0x20));
                (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
            })
            .collect()
    }
}
