#[derive(Debug, Clone)]
pub enum FilterError {
    InvalidImageSize { width: usize, height: usize },
    InvalidImageData { expected_len: usize, actual_len: usize },
    InvalidLevels(usize),
    InvalidOctaves(i32),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::InvalidImageSize { width, height } => {
                write!(f, "Invalid image dimensions: {}x{} (must be > 0)", width, height)
            }
            FilterError::InvalidImageData { expected_len, actual_len } => {
                write!(f, "Image data length mismatch: expected {}, got {}", expected_len, actual_len)
            }
            FilterError::InvalidLevels(s) => {
                write!(f, "Invalid level count: {} (must be >= 1)", s)
            }
            FilterError::InvalidOctaves(o) => {
                write!(f, "Invalid octave count: {}", o)
            }
        }
    }
}

impl std::error::Error for FilterError {}

pub type FilterResult<T> = Result<T, FilterError>;

/// Signal returned by octave advancement when no further octave exists.
/// This is the normal loop-termination condition, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted;

impl std::fmt::Display for Exhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "all octaves processed")
    }
}
