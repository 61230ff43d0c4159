//! Contains the builder struct for the parameters of a clustering run.

/// A builder struct to specify the parameters for Lloyd's k-means.
///
/// # Examples
/// ```
/// # use lloydquant::LloydOptions;
/// let options = LloydOptions::new()
///     .seed(42)
///     .max_iterations(Some(100));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LloydOptions {
    /// The seed value for the random number generator used to pick the initial centroids.
    pub(crate) seed: u64,
    /// The maximum number of iterations to run before giving up on convergence.
    pub(crate) max_iterations: Option<u32>,
}

impl Default for LloydOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl LloydOptions {
    /// Creates a new [`LloydOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self { seed: 0, max_iterations: None }
    }

    /// Sets the seed value for the random number generator.
    ///
    /// A run is fully determined by its input pixels, `k`, and this seed.
    ///
    /// The default seed is `0`.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the maximum number of assign/update iterations.
    ///
    /// Lloyd's algorithm can take many passes to reach a fixed point on large images.
    /// A run stopped by the cap is reported through
    /// [`Segmentation::converged`](crate::Segmentation::converged).
    /// `Some(0)` runs no iterations and returns the initial clustering.
    ///
    /// The default is `None`, that is, run until convergence.
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Returns the seed value.
    #[must_use]
    pub const fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Returns the iteration cap, if any.
    #[must_use]
    pub const fn get_max_iterations(&self) -> Option<u32> {
        self.max_iterations
    }

    /// Returns whether `iterations` has reached the cap.
    pub(crate) fn cap_reached(&self, iterations: u32) -> bool {
        self.max_iterations.is_some_and(|max| iterations >= max)
    }
}
