use sift_core::Keypoint;
use crate::error::{ExtractError, ExtractResult};

/// Caller-supplied keypoint location in original-image convention:
/// position, scale, and orientation angle. Supplying frames switches the
/// extractor from detection mode to caller-supplied mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputFrame {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    pub angle: f64,
}

impl InputFrame {
    pub fn new(x: f64, y: f64, sigma: f64, angle: f64) -> Self {
        Self { x, y, sigma, angle }
    }
}

/// Reject frames the scale sort cannot order. Run before sorting so a
/// malformed frame set fails the whole call with nothing computed.
pub fn validate_frames(frames: &[InputFrame]) -> ExtractResult<()> {
    for (index, f) in frames.iter().enumerate() {
        if f.sigma.is_nan() {
            return Err(ExtractError::InvalidFrame { index, reason: "scale is NaN" });
        }
        if !f.x.is_finite() || !f.y.is_finite() || !f.angle.is_finite() {
            return Err(ExtractError::InvalidFrame { index, reason: "non-finite coordinate" });
        }
    }
    Ok(())
}

/// Return a private copy of the frames sorted by ascending scale, so the
/// frames can be consumed in lock-step with the filter's ascending octave
/// progression. The caller's sequence is never mutated.
pub fn sort_frames_by_scale(frames: &[InputFrame]) -> Vec<InputFrame> {
    let mut sorted = frames.to_vec();
    sorted.sort_by(|a, b| a.sigma.partial_cmp(&b.sigma).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// One merge step of the frame/octave alignment loop.
///
/// Walks the scale-sorted `frames` from `start`, reconstructing each one
/// into a keypoint via `init`. Frames whose reconstructed octave equals
/// `octave` are consumed; the walk stops at the first mismatch, whose
/// frames belong to a later octave and are left for a subsequent pass.
/// Returns the consumed `(keypoint, frame)` pairs and the cursor for the
/// next octave. Given scale-sorted input this visits every frame at most
/// once across the whole extraction.
pub fn take_octave_frames<F>(
    frames: &[InputFrame],
    start: usize,
    octave: i32,
    mut init: F,
) -> (Vec<(Keypoint, InputFrame)>, usize)
where
    F: FnMut(&InputFrame) -> Keypoint,
{
    let mut consumed = Vec::new();
    let mut cursor = start;
    while cursor < frames.len() {
        let frame = frames[cursor];
        let keypoint = init(&frame);
        if keypoint.octave != octave {
            break;
        }
        consumed.push((keypoint, frame));
        cursor += 1;
    }
    (consumed, cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sigma: f64) -> InputFrame {
        InputFrame::new(10.0, 20.0, sigma, 0.0)
    }

    /// Keypoint whose octave is floor(log2 sigma); stands in for the
    /// filter's reconstruction.
    fn fake_init(f: &InputFrame) -> Keypoint {
        Keypoint {
            octave: f.sigma.log2().floor() as i32,
            ix: f.x as i32,
            iy: f.y as i32,
            is: 0,
            x: f.x as f32,
            y: f.y as f32,
            s: 0.0,
            sigma: f.sigma as f32,
        }
    }

    #[test]
    fn sort_orders_by_scale_without_mutating_input() {
        let input = vec![frame(4.0), frame(1.0), frame(2.5)];
        let sorted = sort_frames_by_scale(&input);
        assert_eq!(sorted[0].sigma, 1.0);
        assert_eq!(sorted[1].sigma, 2.5);
        assert_eq!(sorted[2].sigma, 4.0);
        // Caller's data untouched.
        assert_eq!(input[0].sigma, 4.0);
    }

    #[test]
    fn sort_preserves_frame_set() {
        let input = vec![frame(3.0), frame(1.0), frame(3.0), frame(0.5)];
        let mut sorted = sort_frames_by_scale(&input);
        let mut original = input.clone();
        sorted.sort_by(|a, b| a.sigma.partial_cmp(&b.sigma).unwrap());
        original.sort_by(|a, b| a.sigma.partial_cmp(&b.sigma).unwrap());
        assert_eq!(sorted, original);
    }

    #[test]
    fn validate_rejects_nan_scale() {
        let frames = vec![frame(1.0), frame(f64::NAN)];
        assert!(matches!(
            validate_frames(&frames),
            Err(ExtractError::InvalidFrame { index: 1, .. })
        ));
        assert!(validate_frames(&[frame(1.0)]).is_ok());
    }

    #[test]
    fn merge_step_consumes_only_matching_octave() {
        // Octaves: 1.0 -> 0, 1.5 -> 0, 2.0 -> 1, 4.5 -> 2
        let frames = sort_frames_by_scale(&[frame(2.0), frame(1.0), frame(4.5), frame(1.5)]);

        let (octave0, next) = take_octave_frames(&frames, 0, 0, fake_init);
        assert_eq!(octave0.len(), 2);
        assert_eq!(next, 2);

        let (octave1, next) = take_octave_frames(&frames, next, 1, fake_init);
        assert_eq!(octave1.len(), 1);
        assert_eq!(octave1[0].1.sigma, 2.0);
        assert_eq!(next, 3);

        let (octave2, next) = take_octave_frames(&frames, next, 2, fake_init);
        assert_eq!(octave2.len(), 1);
        assert_eq!(next, 4);
    }

    #[test]
    fn merge_steps_partition_the_full_set() {
        let frames = sort_frames_by_scale(&[
            frame(1.0),
            frame(1.2),
            frame(2.1),
            frame(2.9),
            frame(4.0),
            frame(8.1),
        ]);
        let mut cursor = 0;
        let mut seen = Vec::new();
        for octave in 0..4 {
            let (consumed, next) = take_octave_frames(&frames, cursor, octave, fake_init);
            for (_, f) in consumed {
                seen.push(f);
            }
            cursor = next;
        }
        // Every frame consumed exactly once, in scale order.
        assert_eq!(seen, frames);
        assert_eq!(cursor, frames.len());
    }

    #[test]
    fn frames_for_unvisited_octaves_stay_unconsumed() {
        // Octave 5 is never processed; its frame is silently left behind.
        let frames = sort_frames_by_scale(&[frame(1.0), frame(40.0)]);
        let (consumed, next) = take_octave_frames(&frames, 0, 0, fake_init);
        assert_eq!(consumed.len(), 1);
        assert_eq!(next, 1);
        // A subsequent octave that does not match leaves the cursor put.
        let (consumed, next) = take_octave_frames(&frames, next, 1, fake_init);
        assert!(consumed.is_empty());
        assert_eq!(next, 1);
    }
}
