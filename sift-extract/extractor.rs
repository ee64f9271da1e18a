use rayon::prelude::*;
use sift_core::{Descriptor, Keypoint, QuantizedDescriptor, SiftConfig};
use sift_filter::ScaleSpaceFilter;
use log::{debug, info};
use std::f64::consts::FRAC_PI_2;

use crate::error::{ExtractError, ExtractResult};
use crate::frames::{sort_frames_by_scale, take_octave_frames, validate_frames, InputFrame};
use crate::transpose::transpose_descriptor;

/// What the extraction run should produce.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractOptions {
    /// Compute a descriptor per oriented keypoint. When off, descriptor
    /// work is skipped entirely and no descriptor buffer is allocated.
    pub descriptors: bool,
    /// In caller-supplied mode, recompute orientations instead of using
    /// the supplied angles.
    pub force_orientations: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            descriptors: true,
            force_orientations: false,
        }
    }
}

/// One output keypoint record, in original-image convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    /// External angle convention: `pi/2 - internal`.
    pub angle: f64,
}

/// Growable extraction output: keypoint records in insertion order
/// (octave, then keypoint, then orientation) and, when requested, one
/// quantized descriptor per record at the same index.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub frames: Vec<Feature>,
    pub descriptors: Option<Vec<QuantizedDescriptor>>,
}

impl FeatureSet {
    fn new(with_descriptors: bool) -> Self {
        Self {
            frames: Vec::new(),
            descriptors: with_descriptors.then(Vec::new),
        }
    }

    /// Pre-grow the buffers for one octave's keypoints. Growth is keyed
    /// to the octave keypoint count; `Vec` supplies the amortized
    /// doubling beyond it.
    fn reserve_for_octave(&mut self, nkeys: usize) {
        self.frames.reserve(2 * nkeys);
        if let Some(d) = &mut self.descriptors {
            d.reserve(2 * nkeys);
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Quantize a normalized descriptor to bytes: `clamp(round(512 v), 0, 255)`.
pub fn quantize_descriptor(descr: &Descriptor) -> QuantizedDescriptor {
    let mut out = [0u8; 128];
    for (o, &v) in out.iter_mut().zip(descr.iter()) {
        *o = (512.0 * v as f64).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Convert between the external angle convention and the internal one.
/// The mapping `a -> pi/2 - a` is its own inverse.
pub fn convert_angle(a: f64) -> f64 {
    FRAC_PI_2 - a
}

/// Drives a [`ScaleSpaceFilter`] octave by octave and assembles features.
///
/// Two operating modes: detection mode runs the filter's DoG detector on
/// every octave; caller-supplied mode (an `InputFrame` slice given to
/// [`extract`](Self::extract)) reconstructs keypoints from the supplied
/// locations instead, consuming the scale-sorted frames in lock-step with
/// the ascending octave progression.
pub struct FeatureExtractor {
    config: SiftConfig,
    options: ExtractOptions,
}

impl FeatureExtractor {
    /// Validate the configuration and build an extractor. Nothing is
    /// computed until [`extract`](Self::extract).
    pub fn new(config: SiftConfig, options: ExtractOptions) -> ExtractResult<Self> {
        if config.octaves < -1 {
            return Err(ExtractError::InvalidOctaves(config.octaves));
        }
        if config.levels < 1 {
            return Err(ExtractError::InvalidLevels(config.levels));
        }
        if config.peak_thresh.is_nan() {
            return Err(ExtractError::InvalidPeakThresh(config.peak_thresh));
        }
        if config.edge_thresh.is_nan() || (config.edge_thresh >= 0.0 && config.edge_thresh < 1.0) {
            return Err(ExtractError::InvalidEdgeThresh(config.edge_thresh));
        }
        if config.norm_thresh.is_nan() {
            return Err(ExtractError::InvalidNormThresh(config.norm_thresh));
        }
        Ok(Self { config, options })
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extract features from a `width x height` image (transposed
    /// layout, see `sift_core::Image`).
    ///
    /// With `input_frames`, runs in caller-supplied mode: a private copy
    /// of the frames is sorted by ascending scale and each frame is
    /// consumed in exactly the octave pass its reconstructed octave
    /// matches. Frames whose octave is never processed are silently
    /// skipped. Without frames, the filter's detector supplies the
    /// keypoints of each octave.
    ///
    /// All validation happens before any filter work; a malformed
    /// configuration produces no partial output.
    pub fn extract(
        &self,
        image: &[f32],
        width: usize,
        height: usize,
        input_frames: Option<&[InputFrame]>,
    ) -> ExtractResult<FeatureSet> {
        if width == 0 || height == 0 {
            return Err(ExtractError::InvalidImageSize { width, height });
        }
        let expected_len = width * height;
        if image.len() != expected_len {
            return Err(ExtractError::InvalidImageData {
                expected_len,
                actual_len: image.len(),
            });
        }
        // A negative first octave doubles the base dimensions; reject
        // shifts that overflow or leave no usable resolution.
        let o_min = self.config.first_octave;
        if o_min < 0 {
            let shift = (-o_min) as u32;
            if width.checked_shl(shift).is_none() || height.checked_shl(shift).is_none() {
                return Err(ExtractError::InvalidFirstOctave(o_min));
            }
        } else if (width >> o_min.min(63)).min(height >> o_min.min(63)) < 4 {
            return Err(ExtractError::InvalidFirstOctave(o_min));
        }
        if let Some(frames) = input_frames {
            validate_frames(frames)?;
        }

        let mut filter = ScaleSpaceFilter::new(width, height, &self.config)?;
        if self.config.peak_thresh >= 0.0 {
            filter.set_peak_thresh(self.config.peak_thresh);
        }
        if self.config.edge_thresh >= 0.0 {
            filter.set_edge_thresh(self.config.edge_thresh);
        }
        if self.config.norm_thresh >= 0.0 {
            filter.set_norm_thresh(self.config.norm_thresh);
        }
        debug!(
            "filter: octaves={} levels={} first_octave={} peak={} edge={} norm={}",
            filter.num_octaves(),
            filter.levels(),
            filter.first_octave(),
            filter.peak_thresh(),
            filter.edge_thresh(),
            filter.norm_thresh()
        );

        // Caller frames are consumed through a cursor that persists
        // across octaves; the scale sort aligns it with the octave order.
        let sorted_frames = input_frames.map(sort_frames_by_scale);
        let mut cursor = 0usize;

        let mut result = FeatureSet::new(self.options.descriptors);
        let mut first = true;
        loop {
            let advanced = if first {
                first = false;
                filter.process_first_octave(image)
            } else {
                filter.process_next_octave()
            };
            if advanced.is_err() {
                // Octave exhaustion: the loop's one exit, not an error.
                break;
            }
            let octave = filter.octave_index();
            debug!("processing octave {}", octave);
            filter.update_gradients();

            // Build the (keypoint, internal angle) work list, in
            // keypoint order then orientation order.
            let mut oriented: Vec<(Keypoint, f64)> = Vec::new();
            match &sorted_frames {
                None => {
                    filter.detect();
                    let keys = filter.keypoints().to_vec();
                    debug!("octave {}: {} unoriented keypoints", octave, keys.len());
                    result.reserve_for_octave(keys.len());
                    for k in keys {
                        for angle in filter.keypoint_orientations(&k) {
                            oriented.push((k, angle));
                        }
                    }
                }
                Some(frames) => {
                    // Input frames are in image convention; the filter
                    // sees the transposed picture, so swap on the way in.
                    let (consumed, next) =
                        take_octave_frames(frames, cursor, octave, |f| {
                            filter.keypoint_init(f.y, f.x, f.sigma)
                        });
                    cursor = next;
                    result.reserve_for_octave(consumed.len());
                    for (k, f) in consumed {
                        if self.options.force_orientations {
                            for angle in filter.keypoint_orientations(&k) {
                                oriented.push((k, angle));
                            }
                        } else {
                            oriented.push((k, convert_angle(f.angle)));
                        }
                    }
                }
            }

            if self.options.descriptors {
                // Independent per-keypoint work; ordered collect keeps
                // the insertion order of the sequential loop.
                let descriptors: Vec<QuantizedDescriptor> = oriented
                    .par_iter()
                    .map(|(k, angle)| {
                        let raw = filter.keypoint_descriptor(k, *angle);
                        quantize_descriptor(&transpose_descriptor(&raw))
                    })
                    .collect();
                if let Some(buf) = result.descriptors.as_mut() {
                    buf.extend(descriptors);
                }
            }
            for (k, angle) in &oriented {
                // Swap back to image convention on the way out.
                result.frames.push(Feature {
                    x: k.y as f64,
                    y: k.x as f64,
                    sigma: k.sigma as f64,
                    angle: convert_angle(*angle),
                });
            }
        }

        if let Some(frames) = &sorted_frames {
            if cursor < frames.len() {
                debug!(
                    "{} input frames fell outside the processed octave range",
                    frames.len() - cursor
                );
            }
        }
        info!("found {} keypoints", result.len());
        Ok(result)
    }
}
