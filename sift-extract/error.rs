use sift_filter::FilterError;

#[derive(Debug, Clone)]
pub enum ExtractError {
    InvalidImageSize { width: usize, height: usize },
    InvalidImageData { expected_len: usize, actual_len: usize },
    InvalidOctaves(i32),
    InvalidLevels(usize),
    InvalidFirstOctave(i32),
    InvalidPeakThresh(f64),
    InvalidEdgeThresh(f64),
    InvalidNormThresh(f64),
    InvalidFrame { index: usize, reason: &'static str },
    Filter(FilterError),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::InvalidImageSize { width, height } => {
                write!(f, "Invalid image dimensions: {}x{} (must be > 0)", width, height)
            }
            ExtractError::InvalidImageData { expected_len, actual_len } => {
                write!(f, "Image data length mismatch: expected {}, got {}", expected_len, actual_len)
            }
            ExtractError::InvalidOctaves(o) => {
                write!(f, "'octaves' must be non-negative or -1 for automatic, got {}", o)
            }
            ExtractError::InvalidLevels(s) => {
                write!(f, "'levels' must be a positive integer, got {}", s)
            }
            ExtractError::InvalidFirstOctave(o) => {
                write!(f, "'first octave' {} leaves no usable image resolution", o)
            }
            ExtractError::InvalidPeakThresh(t) => {
                write!(f, "'peak thresh' must be non-negative, got {}", t)
            }
            ExtractError::InvalidEdgeThresh(t) => {
                write!(f, "'edge thresh' must be not smaller than 1, got {}", t)
            }
            ExtractError::InvalidNormThresh(t) => {
                write!(f, "'norm thresh' must be non-negative, got {}", t)
            }
            ExtractError::InvalidFrame { index, reason } => {
                write!(f, "Invalid input frame at index {}: {}", index, reason)
            }
            ExtractError::Filter(e) => write!(f, "Filter error: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Filter(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FilterError> for ExtractError {
    fn from(err: FilterError) -> Self {
        ExtractError::Filter(err)
    }
}

pub type ExtractResult<T> = Result<T, ExtractError>;
