//! Extraction orchestration for SIFT features.
//!
//! [`FeatureExtractor`] drives a `sift_filter::ScaleSpaceFilter` octave
//! by octave and assembles keypoint records and quantized descriptors
//! into a [`FeatureSet`]. Keypoints come either from the filter's own
//! detector or from caller-supplied [`InputFrame`]s, which are sorted by
//! scale and matched to octaves through a persistent cursor.

pub mod config;
pub mod error;
pub mod extractor;
pub mod frames;
pub mod transpose;

pub use config::{ExtractConfig, ExtractorBuilder};
pub use error::{ExtractError, ExtractResult};
pub use extractor::{
    convert_angle, quantize_descriptor, ExtractOptions, Feature, FeatureExtractor, FeatureSet,
};
pub use frames::{sort_frames_by_scale, take_octave_frames, InputFrame};
pub use transpose::transpose_descriptor;
