//! Color quantization using Lloyd's k-means algorithm.
//!
//! A run starts by picking `k` random pixels as the initial cluster centroids.
//! It then alternates two passes until the first pass makes no change:
//! 1. the assignment pass moves every pixel to the cluster with the nearest centroid,
//! 2. the update pass sets every centroid to the mean color of its pixels.
//!
//! The segmented image is the input with each pixel replaced by its cluster's centroid.
//!
//! Distances are squared Euclidean distances in RGB space.
//! A pixel equally close to several centroids goes to the cluster with the lowest index.
//! Centroids are per-channel means truncated towards zero.
//! A cluster that loses all of its pixels keeps its previous centroid.
//!
//! [`run`] performs a whole run, while [`RunState`] exposes each step individually.
//! With the `threads` feature, both passes have parallel versions (e.g., [`run_par`]).
//! They produce results identical to the single-threaded versions.
//!
//! # Examples
//! ```
//! # use lloydquant::{lloyd, LloydOptions};
//! # fn main() -> Result<(), lloydquant::InvalidArgument> {
//! let pixels: Vec<u32> = vec![0xFF0000, 0xFF0000, 0x0000FF, 0x0000FF];
//! let output = lloyd::run(&pixels, 1, &LloydOptions::new())?;
//!
//! assert_eq!(output.iterations, 1);
//! assert_eq!(output.pixels, vec![0x7F007F; 4]);
//! # Ok(())
//! # }
//! ```

use crate::{ClusterId, InvalidArgument, LloydOptions, Pixel, PixelBuffer, Segmentation};

use std::array;

use rand::{prelude::Distribution, Rng, SeedableRng};
use rand_distr::Uniform;
use rand_xoshiro::Xoroshiro128PlusPlus;
use tracing::{debug, info, trace, warn};
use wide::{f32x8, u32x8, CmpLt};

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// The lifecycle phase of a [`RunState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The initial centroids are set and every pixel is in cluster `0`.
    Initialized,
    /// The last assignment pass moved at least one pixel.
    Assigned,
    /// The centroids were recomputed after an assignment pass that moved at least one pixel.
    Updated,
    /// The last assignment pass moved no pixels.
    Converged,
}

/// The centroids laid out in chunks of 8 for SIMD distance computations.
///
/// A table is built from the centroids once per assignment pass,
/// so every pixel in a pass is compared against the same snapshot.
struct CentroidTable {
    /// The red, green, and blue components of 8 centroids per chunk.
    chunks: Vec<[f32x8; 3]>,
}

impl CentroidTable {
    /// Packs the centroids into chunks, padding the last chunk with infinitely far centroids.
    fn new(centroids: &[Pixel]) -> Self {
        let chunks = centroids
            .chunks(8)
            .map(|chunk| {
                // unused lanes are never the nearest
                let mut arr = [[f32::INFINITY; 8]; 3];
                for (lane, centroid) in chunk.iter().enumerate() {
                    for (arr, c) in arr.iter_mut().zip(centroid.components()) {
                        arr[lane] = f32::from(c);
                    }
                }
                arr.map(f32x8::new)
            })
            .collect();

        Self { chunks }
    }

    /// Returns the cluster whose centroid is nearest to `pixel`, preferring the lowest index on ties.
    ///
    /// Channel differences are integers and the largest distance is `195075 < 2^24`,
    /// so every distance is exact in `f32`.
    #[inline]
    fn nearest(&self, pixel: Pixel) -> ClusterId {
        let query = pixel.components().map(|c| f32x8::splat(f32::from(c)));

        let mut cur_chunk = u32x8::ZERO;
        let mut min_chunk = cur_chunk;
        let mut min_distance = f32x8::splat(f32::INFINITY);

        for chunk in &self.chunks {
            let [r, g, b] = array::from_fn(|i| {
                let diff = query[i] - chunk[i];
                diff * diff
            });
            let distance = r + g + b;

            // strict comparison keeps the earliest chunk for each lane
            let mask = distance.cmp_lt(min_distance);
            let chunk_mask: u32x8 = bytemuck::cast(mask);
            min_chunk = chunk_mask.blend(cur_chunk, min_chunk);
            min_distance = mask.blend(distance, min_distance);
            cur_chunk += u32x8::ONE;
        }

        let mut min = (f32::INFINITY, ClusterId::MAX);
        for (lane, (&distance, &chunk)) in min_distance
            .as_array_ref()
            .iter()
            .zip(min_chunk.as_array_ref())
            .enumerate()
        {
            // `k <= u32::MAX` gives at most 2^29 chunks, so this cannot overflow
            #[allow(clippy::cast_possible_truncation)]
            let index = chunk * 8 + lane as ClusterId;
            #[allow(clippy::float_cmp)]
            if distance < min.0 || (distance == min.0 && index < min.1) {
                min = (distance, index);
            }
        }

        min.1
    }
}

/// Per-cluster channel sums and pixel counts gathered during an update pass.
struct ClusterSums {
    /// The sum of each channel over the pixels in each cluster.
    sums: Vec<[u64; 3]>,
    /// The number of pixels in each cluster.
    counts: Vec<u32>,
}

impl ClusterSums {
    /// Creates zeroed sums for `k` clusters.
    fn new(k: usize) -> Self {
        Self { sums: vec![[0; 3]; k], counts: vec![0; k] }
    }

    /// Adds `pixel` to the sums of `cluster`.
    #[inline]
    fn add(&mut self, cluster: ClusterId, pixel: Pixel) {
        let i = cluster as usize;
        for (sum, c) in self.sums[i].iter_mut().zip(pixel.components()) {
            *sum += u64::from(c);
        }
        self.counts[i] += 1;
    }

    /// Combines the sums gathered by two threads.
    #[cfg(feature = "threads")]
    fn merge(mut self, other: Self) -> Self {
        for (sum, other) in self.sums.iter_mut().zip(other.sums) {
            for (s, o) in sum.iter_mut().zip(other) {
                *s += o;
            }
        }
        for (count, other) in self.counts.iter_mut().zip(other.counts) {
            *count += other;
        }
        self
    }
}

/// The state of a single clustering run.
///
/// A [`RunState`] borrows the input pixels and owns everything that changes during the run:
/// the centroids, the cluster of each pixel, the size of each cluster, and the iteration count.
///
/// Use [`RunState::step`] (or [`RunState::assign_step`] and [`RunState::update_centroids`])
/// to drive the run by hand, or [`run`] to run it to convergence.
///
/// # Examples
/// ```
/// # use lloydquant::{lloyd::RunState, PixelBuffer, InvalidArgument};
/// # fn main() -> Result<(), InvalidArgument> {
/// let pixels: Vec<u32> = vec![0x102030, 0x102030, 0xF0E0D0];
/// let buffer = PixelBuffer::try_from(pixels.as_slice())?;
/// let mut state = RunState::from_seed(buffer, 2, 7)?;
///
/// while state.step() {}
///
/// assert!(state.is_converged());
/// assert_eq!(state.reconstruct().len(), pixels.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RunState<'a> {
    /// The input pixels.
    pixels: PixelBuffer<'a>,
    /// The current centroid of each cluster.
    centroids: Vec<Pixel>,
    /// The current cluster of each pixel.
    assignments: Vec<ClusterId>,
    /// The size of each cluster as of the last update pass.
    counts: Vec<u32>,
    /// The number of completed iterations.
    iterations: u32,
    /// Whether the last assignment pass moved any pixel.
    changed: bool,
    /// The current lifecycle phase.
    phase: Phase,
}

impl<'a> RunState<'a> {
    /// Starts a run by picking `k` pixels, uniformly at random and with replacement,
    /// as the initial centroids.
    ///
    /// The same pixel may be picked more than once, resulting in duplicate centroids.
    ///
    /// # Errors
    /// Returns [`InvalidArgument::ZeroClusters`] if `k` is `0` and
    /// [`InvalidArgument::TooManyClusters`] if `k` is larger than the number of pixels.
    pub fn initialize<R: Rng + ?Sized>(
        pixels: PixelBuffer<'a>,
        k: u32,
        rng: &mut R,
    ) -> Result<Self, InvalidArgument> {
        if k == 0 {
            return Err(InvalidArgument::ZeroClusters);
        }
        if k > pixels.num_pixels() {
            return Err(InvalidArgument::TooManyClusters { k, pixels: pixels.num_pixels() });
        }

        let distribution = Uniform::new(0, pixels.len());
        let centroids = (0..k)
            .map(|_| pixels.pixel(distribution.sample(rng)))
            .collect::<Vec<_>>();

        debug!(k, pixels = pixels.num_pixels(), "picked initial centroids");
        for (cluster, centroid) in centroids.iter().enumerate() {
            trace!(cluster, centroid = %centroid, "initial centroid");
        }

        Ok(Self::new(pixels, centroids))
    }

    /// Starts a run using a [`Xoroshiro128PlusPlus`] generator seeded with `seed`
    /// to pick the initial centroids.
    ///
    /// See [`RunState::initialize`] for more details.
    ///
    /// # Errors
    /// See [`RunState::initialize`].
    pub fn from_seed(pixels: PixelBuffer<'a>, k: u32, seed: u64) -> Result<Self, InvalidArgument> {
        Self::initialize(pixels, k, &mut Xoroshiro128PlusPlus::seed_from_u64(seed))
    }

    /// Starts a run with the given initial centroids instead of random ones.
    ///
    /// # Errors
    /// Returns [`InvalidArgument::ZeroClusters`] if `centroids` is empty.
    pub fn with_centroids(
        pixels: PixelBuffer<'a>,
        centroids: Vec<Pixel>,
    ) -> Result<Self, InvalidArgument> {
        match u32::try_from(centroids.len()) {
            Ok(0) => Err(InvalidArgument::ZeroClusters),
            Ok(_) => Ok(Self::new(pixels, centroids)),
            Err(_) => Err(InvalidArgument::TooManyClusters {
                k: u32::MAX,
                pixels: pixels.num_pixels(),
            }),
        }
    }

    /// Creates the state with every pixel assigned to cluster `0`.
    fn new(pixels: PixelBuffer<'a>, centroids: Vec<Pixel>) -> Self {
        Self {
            assignments: vec![0; pixels.len()],
            counts: vec![0; centroids.len()],
            pixels,
            centroids,
            iterations: 0,
            changed: false,
            phase: Phase::Initialized,
        }
    }

    /// Moves every pixel to the cluster with the nearest centroid.
    ///
    /// Returns whether any pixel changed clusters.
    pub fn assign_step(&mut self) -> bool {
        let table = CentroidTable::new(&self.centroids);
        let pixels: &[u32] = self.pixels.into();

        let mut changed = false;
        for (assignment, &pixel) in self.assignments.iter_mut().zip(pixels) {
            let nearest = table.nearest(Pixel::new(pixel));
            changed |= *assignment != nearest;
            *assignment = nearest;
        }

        self.finish_assign(changed)
    }

    /// Sets every centroid to the mean color of the pixels currently assigned to it.
    ///
    /// Each channel of the mean is truncated towards zero.
    /// A cluster with no pixels keeps its current centroid.
    pub fn update_centroids(&mut self) {
        let mut sums = ClusterSums::new(self.centroids.len());
        let pixels: &[u32] = self.pixels.into();

        for (&cluster, &pixel) in self.assignments.iter().zip(pixels) {
            sums.add(cluster, Pixel::new(pixel));
        }

        self.apply_sums(sums);
    }

    /// Runs one full iteration: an assignment pass followed by an update pass.
    ///
    /// Returns whether the assignment pass changed the cluster of any pixel.
    /// A return value of `false` means the run has converged.
    pub fn step(&mut self) -> bool {
        let changed = self.assign_step();
        self.update_centroids();
        self.finish_iteration(changed)
    }

    /// Records the outcome of an assignment pass.
    fn finish_assign(&mut self, changed: bool) -> bool {
        self.changed = changed;
        self.phase = if changed { Phase::Assigned } else { Phase::Converged };
        changed
    }

    /// Moves each non-empty cluster's centroid to its mean.
    fn apply_sums(&mut self, sums: ClusterSums) {
        let ClusterSums { sums, counts } = sums;

        for (cluster, ((centroid, sum), &count)) in
            self.centroids.iter_mut().zip(&sums).zip(&counts).enumerate()
        {
            if count == 0 {
                trace!(cluster, centroid = %centroid, "cluster is empty, keeping its centroid");
            } else {
                let count = u64::from(count);
                #[allow(clippy::cast_possible_truncation)]
                let [r, g, b] = sum.map(|s| (s / count) as u8); // mean of u8s fits in a u8
                *centroid = Pixel::from_rgb(r, g, b);
                trace!(cluster, count, centroid = %centroid, "updated centroid");
            }
        }

        self.counts = counts;

        if self.phase != Phase::Converged {
            self.phase = Phase::Updated;
        }
    }

    /// Counts a completed assign/update iteration.
    fn finish_iteration(&mut self, changed: bool) -> bool {
        self.iterations = self.iterations.saturating_add(1);
        debug!(iteration = self.iterations, changed, "finished iteration");
        changed
    }

    /// The current centroid of each cluster.
    #[must_use]
    pub fn centroids(&self) -> &[Pixel] {
        &self.centroids
    }

    /// The current cluster of each pixel.
    #[must_use]
    pub fn assignments(&self) -> &[ClusterId] {
        &self.assignments
    }

    /// The number of pixels in each cluster as of the last update pass.
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// The number of completed iterations.
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Whether the last assignment pass moved any pixel.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the last assignment pass moved no pixels.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.phase == Phase::Converged
    }

    /// Returns the sum of the squared distances between each pixel and its cluster's centroid.
    #[must_use]
    pub fn distortion(&self) -> u64 {
        let pixels: &[u32] = self.pixels.into();
        self.assignments
            .iter()
            .zip(pixels)
            .map(|(&cluster, &pixel)| {
                u64::from(Pixel::new(pixel).squared_distance(self.centroids[cluster as usize]))
            })
            .sum()
    }

    /// Returns the segmented pixels, where each pixel is replaced by the centroid of its cluster.
    #[must_use]
    pub fn reconstruct(&self) -> Vec<u32> {
        self.assignments
            .iter()
            .map(|&cluster| self.centroids[cluster as usize].packed())
            .collect()
    }

    /// Ends the run, returning the segmented pixels and the final clustering.
    #[must_use]
    pub fn into_segmentation(self) -> Segmentation {
        let pixels = self.reconstruct();
        self.into_segmentation_with(pixels)
    }

    /// Ends the run using already reconstructed `pixels`.
    fn into_segmentation_with(self, pixels: Vec<u32>) -> Segmentation {
        let converged = self.is_converged();
        let Self { centroids, assignments, counts, iterations, .. } = self;
        Segmentation {
            pixels,
            centroids,
            assignments,
            counts,
            iterations,
            converged,
        }
    }
}

#[cfg(feature = "threads")]
impl<'a> RunState<'a> {
    /// The parallel version of [`RunState::assign_step`].
    pub fn assign_step_par(&mut self) -> bool {
        let table = CentroidTable::new(&self.centroids);
        let pixels: &[u32] = self.pixels.into();

        let changed = self
            .assignments
            .par_iter_mut()
            .zip(pixels)
            .map(|(assignment, &pixel)| {
                let nearest = table.nearest(Pixel::new(pixel));
                let changed = *assignment != nearest;
                *assignment = nearest;
                changed
            })
            .reduce(|| false, |a, b| a || b);

        self.finish_assign(changed)
    }

    /// The parallel version of [`RunState::update_centroids`].
    ///
    /// Each thread accumulates into its own sums, which are then merged.
    pub fn update_centroids_par(&mut self) {
        let k = self.centroids.len();
        let pixels: &[u32] = self.pixels.into();

        let sums = self
            .assignments
            .par_iter()
            .zip(pixels)
            .fold(
                || ClusterSums::new(k),
                |mut sums, (&cluster, &pixel)| {
                    sums.add(cluster, Pixel::new(pixel));
                    sums
                },
            )
            .reduce(|| ClusterSums::new(k), ClusterSums::merge);

        self.apply_sums(sums);
    }

    /// The parallel version of [`RunState::step`].
    pub fn step_par(&mut self) -> bool {
        let changed = self.assign_step_par();
        self.update_centroids_par();
        self.finish_iteration(changed)
    }

    /// The parallel version of [`RunState::reconstruct`].
    #[must_use]
    pub fn reconstruct_par(&self) -> Vec<u32> {
        self.assignments
            .par_iter()
            .map(|&cluster| self.centroids[cluster as usize].packed())
            .collect()
    }

    /// The parallel version of [`RunState::into_segmentation`].
    #[must_use]
    pub fn into_segmentation_par(self) -> Segmentation {
        let pixels = self.reconstruct_par();
        self.into_segmentation_with(pixels)
    }
}

/// Steps `state` until it converges or reaches the iteration cap.
fn run_to_convergence<'a>(
    state: &mut RunState<'a>,
    options: &LloydOptions,
    mut step: impl FnMut(&mut RunState<'a>) -> bool,
) {
    loop {
        if options.cap_reached(state.iterations) {
            warn!(
                iterations = state.iterations,
                "k-means stopped at the iteration cap before converging"
            );
            break;
        }
        if !step(state) {
            info!(iterations = state.iterations, "k-means converged");
            break;
        }
    }
}

/// Clusters `pixels` into `k` colors and returns the segmented image.
///
/// The initial centroids are picked using the seed in `options`,
/// so the same input, `k`, and options always give the same output.
///
/// # Errors
/// Returns an [`InvalidArgument`] if `pixels` is empty, `k` is `0`,
/// or `k` is larger than the number of pixels.
pub fn run(pixels: &[u32], k: u32, options: &LloydOptions) -> Result<Segmentation, InvalidArgument> {
    let pixels = PixelBuffer::try_from(pixels)?;
    let mut state = RunState::from_seed(pixels, k, options.seed)?;
    run_to_convergence(&mut state, options, RunState::step);
    Ok(state.into_segmentation())
}

/// The parallel version of [`run`].
///
/// The output is identical to the output of [`run`] given the same inputs.
///
/// # Errors
/// See [`run`].
#[cfg(feature = "threads")]
pub fn run_par(
    pixels: &[u32],
    k: u32,
    options: &LloydOptions,
) -> Result<Segmentation, InvalidArgument> {
    let pixels = PixelBuffer::try_from(pixels)?;
    let mut state = RunState::from_seed(pixels, k, options.seed)?;
    run_to_convergence(&mut state, options, RunState::step_par);
    Ok(state.into_segmentation_par())
}
