//! Segments an image into `k` colors and writes the result.
//!
//! ```text
//! cargo run --release --example segment -- -k 8 input.png output.png
//! ```

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice
)]

use std::{error::Error, path::PathBuf};

use clap::Parser;
use lloydquant::{lloyd, packed_pixels, LloydOptions};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(about = "Segment an image by color using Lloyd's k-means algorithm")]
struct Options {
    /// The number of clusters (colors) in the output image.
    #[arg(short, default_value_t = 3)]
    k: u32,

    /// The seed used to pick the initial centroids.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Stop after this many iterations even if the clustering has not converged.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// The number of threads to use, or `0` to use all cores.
    #[arg(short, long, default_value_t = 0)]
    threads: u8,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    input: PathBuf,

    output: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let Options {
        k,
        seed,
        max_iterations,
        threads,
        verbose,
        input,
        output,
    } = Options::parse();

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    macro_rules! timed {
        ($name: literal, $val: expr) => {{
            let time = std::time::Instant::now();
            let value = $val;
            info!(elapsed_ms = time.elapsed().as_millis(), "{} finished", $name);
            value
        }};
    }

    let image = timed!("read image", image::open(input)?.into_rgb8());
    let (width, height) = image.dimensions();
    let pixels = packed_pixels(&image);

    let options = LloydOptions::new().seed(seed).max_iterations(max_iterations);

    let segmentation = timed!(
        "segmentation",
        match threads {
            0 => lloyd::run_par(&pixels, k, &options)?,
            1 => lloyd::run(&pixels, k, &options)?,
            t => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(t.into())
                    .build()?;

                pool.install(|| lloyd::run_par(&pixels, k, &options))?
            }
        }
    );

    info!(
        iterations = segmentation.iterations,
        converged = segmentation.converged,
        "segmented {width}x{height} image into {k} clusters"
    );

    let segmented = segmentation
        .to_rgbimage(width, height)
        .ok_or("segmented pixels do not match the image dimensions")?;

    timed!("write image", segmented.save(output)?);

    Ok(())
}
