//! Gaussian scale-space filter for SIFT.
//!
//! [`ScaleSpaceFilter`] owns the Gaussian and difference-of-Gaussians
//! pyramid of one image and is driven octave by octave:
//! `process_first_octave`, then `process_next_octave` until [`Exhausted`].
//! On each octave it detects DoG extrema (or reconstructs caller-supplied
//! keypoints via `keypoint_init`), and computes orientations and 128-d
//! descriptors from a per-octave gradient cache.

pub mod convolution;
pub mod descriptor;
pub mod detector;
pub mod error;
pub mod filter;
pub mod orientation;

pub use error::{Exhausted, FilterError, FilterResult};
pub use filter::{
    ScaleSpaceFilter, DEFAULT_EDGE_THRESH, DEFAULT_MAGNIF, DEFAULT_NORM_THRESH,
    DEFAULT_PEAK_THRESH, DEFAULT_WINDOW_SIZE,
};
pub use orientation::MAX_ORIENTATIONS;
