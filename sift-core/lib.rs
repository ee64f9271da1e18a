/// Row-major single-precision grayscale image.
///
/// The scale-space filter consumes the buffer in transposed layout: the
/// buffer is the row-major storage of the transposed picture, so filter
/// `(x, y)` is image `(row, column)`. The extraction boundary swaps the
/// coordinates back when emitting output frames.
pub type Image = Vec<f32>;

/// Number of elements in a SIFT descriptor: 4x4 spatial bins x 8
/// orientation bins, row-major over (spatial row, spatial col, bin).
pub const DESCRIPTOR_SIZE: usize = 128;

/// Spatial bins per descriptor axis.
pub const SPATIAL_BINS: usize = 4;

/// Orientation bins per spatial bin.
pub const ORIENTATION_BINS: usize = 8;

/// 128-dimensional SIFT descriptor, non-negative reals.
pub type Descriptor = [f32; DESCRIPTOR_SIZE];

/// Quantized descriptor as emitted to callers: `clamp(round(512 v), 0, 255)`.
pub type QuantizedDescriptor = [u8; DESCRIPTOR_SIZE];

/// Scale-space keypoint.
///
/// Carries both the continuous position (`x`, `y`, `sigma` at input
/// resolution) and the integer pyramid cell it falls in (`octave`, `ix`,
/// `iy`, `is` at octave resolution). Keypoints are produced by detection
/// or reconstructed from caller-supplied coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub octave: i32,
    /// Integer position within the octave.
    pub ix: i32,
    pub iy: i32,
    /// Integer scale level within the octave.
    pub is: i32,
    /// Continuous position at input resolution.
    pub x: f32,
    pub y: f32,
    /// Continuous scale level within the octave.
    pub s: f32,
    /// Scale in input-resolution units.
    pub sigma: f32,
}

/// Filter configuration. Negative threshold values mean "use the filter
/// default"; negative `octaves` means "choose from the image size".
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SiftConfig {
    /// Number of octaves, or negative for automatic.
    pub octaves: i32,
    /// Levels per octave (S).
    pub levels: usize,
    /// Index of the first octave; negative upsamples the input.
    pub first_octave: i32,
    /// DoG peak threshold override; negative keeps the filter default.
    pub peak_thresh: f64,
    /// Edge rejection threshold override; negative keeps the default.
    pub edge_thresh: f64,
    /// Descriptor norm threshold override; negative keeps the default.
    pub norm_thresh: f64,
    pub n_threads: usize,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            octaves: -1,
            levels: 3,
            first_octave: 0,
            peak_thresh: -1.0,
            edge_thresh: -1.0,
            norm_thresh: -1.0,
            n_threads: num_cpus::get().max(1),
        }
    }
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
