use sift_core::Keypoint;
use crate::filter::ScaleSpaceFilter;

const NUM_BINS: usize = 36;
/// Orientation window width in units of the keypoint scale.
const WINDOW_FACTOR: f64 = 1.5;
/// Ratio to the dominant peak above which a secondary peak yields an
/// additional orientation.
const PEAK_RATIO: f32 = 0.8;
/// At most this many orientations per keypoint.
pub const MAX_ORIENTATIONS: usize = 4;

const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

pub(crate) fn mod_2pi(mut x: f64) -> f64 {
    while x < 0.0 {
        x += TWO_PI;
    }
    while x >= TWO_PI {
        x -= TWO_PI;
    }
    x
}

impl ScaleSpaceFilter {
    /// Refresh the gradient cache for the current octave. Gradients
    /// (magnitude, angle) are computed by central differences for every
    /// level orientations and descriptors can be sampled from. No-op if
    /// the cache already matches the current octave.
    pub fn update_gradients(&mut self) {
        if self.grad_octave == self.o_cur {
            return;
        }
        let w = self.octave_width();
        let h = self.octave_height();
        let n = w * h;

        for s in (self.s_min + 1)..=(self.s_max - 2) {
            let src_off = (s - self.s_min) as usize * n;
            let dst_off = (s - self.s_min - 1) as usize * 2 * n;
            for y in 0..h {
                for x in 0..w {
                    let xa = x.saturating_sub(1);
                    let xb = (x + 1).min(w - 1);
                    let ya = y.saturating_sub(1);
                    let yb = (y + 1).min(h - 1);
                    let gx = 0.5 * (self.octave[src_off + y * w + xb] - self.octave[src_off + y * w + xa]);
                    let gy = 0.5 * (self.octave[src_off + yb * w + x] - self.octave[src_off + ya * w + x]);
                    let idx = dst_off + 2 * (y * w + x);
                    self.grad[idx] = (gx * gx + gy * gy).sqrt();
                    self.grad[idx + 1] = mod_2pi(f64::atan2(gy as f64, gx as f64)) as f32;
                }
            }
        }
        self.grad_octave = self.o_cur;
    }

    /// Compute up to four dominant orientations for a keypoint of the
    /// current octave.
    ///
    /// Accumulates a 36-bin histogram of gradient orientations in a
    /// Gaussian window of radius `3 * 1.5 * sigma` around the keypoint,
    /// smooths it with six circular box passes, and returns the angles of
    /// histogram peaks within 80% of the dominant one, refined by
    /// parabolic interpolation. Returns no angles when the keypoint falls
    /// outside the current octave or its usable level range.
    ///
    /// `update_gradients` must have been called for the current octave.
    pub fn keypoint_orientations(&self, k: &Keypoint) -> Vec<f64> {
        debug_assert_eq!(self.grad_octave, self.o_cur);

        let w = self.octave_width() as i32;
        let h = self.octave_height() as i32;
        let xper = 2.0f64.powi(self.o_cur);

        let x = k.x as f64 / xper;
        let y = k.y as f64 / xper;
        let sigma = k.sigma as f64 / xper;
        let xi = (x + 0.5).floor() as i32;
        let yi = (y + 0.5).floor() as i32;
        let si = k.is;

        if k.octave != self.o_cur {
            return Vec::new();
        }
        if xi < 0 || xi > w - 1 || yi < 0 || yi > h - 1 || si < self.s_min + 1 || si > self.s_max - 2 {
            return Vec::new();
        }

        let sigmaw = WINDOW_FACTOR * sigma;
        let radius = ((3.0 * sigmaw).floor() as i32).max(1);
        let plane = self.grad_plane(si);

        let mut hist = [0.0f32; NUM_BINS];
        let ys_lo = (-radius).max(1 - yi);
        let ys_hi = radius.min(h - 2 - yi);
        let xs_lo = (-radius).max(1 - xi);
        let xs_hi = radius.min(w - 2 - xi);
        for ys in ys_lo..=ys_hi {
            for xs in xs_lo..=xs_hi {
                let dx = (xi + xs) as f64 - x;
                let dy = (yi + ys) as f64 - y;
                let r2 = dx * dx + dy * dy;
                if r2 >= (radius as f64) * (radius as f64) + 0.6 {
                    continue;
                }
                let wgt = (-r2 / (2.0 * sigmaw * sigmaw)).exp();
                let idx = 2 * ((yi + ys) as usize * w as usize + (xi + xs) as usize);
                let magnitude = plane[idx];
                let angle = plane[idx + 1];
                let fbin = NUM_BINS as f64 * angle as f64 / TWO_PI;
                let bin = (fbin.floor() as i32).rem_euclid(NUM_BINS as i32) as usize;
                hist[bin] += magnitude * wgt as f32;
            }
        }

        // Six passes of circular box smoothing.
        for _ in 0..6 {
            let prev = hist;
            for i in 0..NUM_BINS {
                let a = prev[(i + NUM_BINS - 1) % NUM_BINS];
                let b = prev[i];
                let c = prev[(i + 1) % NUM_BINS];
                hist[i] = (a + b + c) / 3.0;
            }
        }

        let max = hist.iter().cloned().fold(0.0f32, f32::max);
        let mut angles = Vec::with_capacity(MAX_ORIENTATIONS);
        for i in 0..NUM_BINS {
            let h0 = hist[i];
            let hm = hist[(i + NUM_BINS - 1) % NUM_BINS];
            let hp = hist[(i + 1) % NUM_BINS];
            if h0 > PEAK_RATIO * max && h0 > hm && h0 > hp {
                let di = -0.5 * (hp - hm) as f64 / (hp + hm - 2.0 * h0) as f64;
                let th = TWO_PI * (i as f64 + di + 0.5) / NUM_BINS as f64;
                angles.push(th);
                if angles.len() == MAX_ORIENTATIONS {
                    break;
                }
            }
        }
        angles
    }
}
