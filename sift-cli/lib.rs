use image::GrayImage;
use sift_core::{Image, init_thread_pool};
use sift_extract::{ExtractConfig, ExtractError, FeatureExtractor, FeatureSet, InputFrame};

pub use sift_core::{self, Keypoint as SiftKeypoint, SiftConfig};
pub use sift_extract::{self, ExtractOptions, Feature, InputFrame as SiftFrame};

#[derive(Debug)]
pub enum SiftError {
    Extract(ExtractError),
    Image(image::ImageError),
}

impl std::fmt::Display for SiftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiftError::Extract(e) => write!(f, "Extraction error: {}", e),
            SiftError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl std::error::Error for SiftError {}

impl From<ExtractError> for SiftError {
    fn from(err: ExtractError) -> Self {
        SiftError::Extract(err)
    }
}

impl From<image::ImageError> for SiftError {
    fn from(err: image::ImageError) -> Self {
        SiftError::Image(err)
    }
}

pub type SiftResult<T> = Result<T, SiftError>;

/// Convert a grayscale image into the transposed single-precision buffer
/// the filter consumes, returning `(buffer, width, height)` in filter
/// convention (filter width is the image height). Samples are scaled to
/// `[0, 1]`.
pub fn to_filter_buffer(img: &GrayImage) -> (Image, usize, usize) {
    let (iw, ih) = img.dimensions();
    let (w, h) = (ih as usize, iw as usize);
    let mut data = vec![0.0f32; w * h];
    for (x, y, p) in img.enumerate_pixels() {
        // Filter (x, y) is image (row, column).
        data[x as usize * w + y as usize] = p.0[0] as f32 / 255.0;
    }
    (data, w, h)
}

/// High-level SIFT extractor over decoded grayscale images.
pub struct Sift {
    extractor: FeatureExtractor,
}

impl Sift {
    /// Validate the configuration and build the pipeline. The rayon
    /// thread pool is initialized once per process; later calls keep the
    /// existing pool.
    pub fn new(config: ExtractConfig) -> SiftResult<Self> {
        init_thread_pool(config.filter.n_threads).ok();
        let extractor = config.build()?;
        Ok(Self { extractor })
    }

    /// Detect keypoints and compute descriptors per the configuration.
    pub fn extract(&self, img: &GrayImage) -> SiftResult<FeatureSet> {
        let (data, w, h) = to_filter_buffer(img);
        Ok(self.extractor.extract(&data, w, h, None)?)
    }

    /// Extract at caller-supplied keypoint locations instead of running
    /// detection.
    pub fn extract_at(&self, img: &GrayImage, frames: &[InputFrame]) -> SiftResult<FeatureSet> {
        let (data, w, h) = to_filter_buffer(img);
        Ok(self.extractor.extract(&data, w, h, Some(frames))?)
    }

    pub fn config(&self) -> &SiftConfig {
        self.extractor.config()
    }

    pub fn options(&self) -> &ExtractOptions {
        self.extractor.options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_extract::ExtractorBuilder;

    fn blob_gray(size: u32) -> GrayImage {
        let c = size as f32 / 2.0;
        GrayImage::from_fn(size, size, |x, y| {
            let r2 = (x as f32 - c).powi(2) + (y as f32 - c).powi(2);
            image::Luma([(255.0 * (-r2 / 18.0).exp()) as u8])
        })
    }

    #[test]
    fn buffer_conversion_transposes() {
        let mut img = GrayImage::new(4, 3);
        img.put_pixel(2, 1, image::Luma([255]));
        let (data, w, h) = to_filter_buffer(&img);
        assert_eq!((w, h), (3, 4));
        // Image (x=2, y=1) lands at filter (x=1, y=2).
        assert_eq!(data[2 * w + 1], 1.0);
        assert_eq!(data.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn facade_detects_on_blob() {
        let sift = Sift::new(ExtractorBuilder::new().to_config()).unwrap();
        let result = sift.extract(&blob_gray(64)).unwrap();
        assert!(!result.is_empty());
        assert_eq!(
            result.descriptors.as_ref().map(Vec::len),
            Some(result.frames.len())
        );
    }

    #[test]
    fn facade_honors_supplied_frames() {
        let sift = Sift::new(
            ExtractorBuilder::new().descriptors(false).to_config(),
        )
        .unwrap();
        let frames = vec![InputFrame::new(32.0, 32.0, 2.0, 0.0)];
        let result = sift.extract_at(&blob_gray(64), &frames).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.descriptors.is_none());
    }

    #[test]
    fn facade_surfaces_config_errors() {
        let result = Sift::new(ExtractorBuilder::new().levels(0).to_config());
        assert!(matches!(result, Err(SiftError::Extract(_))));
    }
}
