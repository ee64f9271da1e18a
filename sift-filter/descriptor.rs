use sift_core::{Descriptor, Keypoint, DESCRIPTOR_SIZE, ORIENTATION_BINS, SPATIAL_BINS};
use crate::filter::ScaleSpaceFilter;
use crate::orientation::mod_2pi;

const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// Clamp applied to normalized bins before renormalization.
const BIN_CLAMP: f32 = 0.2;

fn l2_normalize(descr: &mut Descriptor) -> f64 {
    let norm = descr
        .iter()
        .map(|&v| v as f64 * v as f64)
        .sum::<f64>()
        .sqrt()
        + f64::EPSILON;
    for v in descr.iter_mut() {
        *v = (*v as f64 / norm) as f32;
    }
    norm
}

impl ScaleSpaceFilter {
    /// Compute the 128-dimensional descriptor of a keypoint at the given
    /// orientation, on the current octave.
    ///
    /// Gradients in a rotated Gaussian window of `4x4` spatial bins of
    /// side `magnif * sigma` are accumulated into 8 orientation bins per
    /// spatial bin with trilinear interpolation. The histogram is L2
    /// normalized, zeroed when its norm falls below the norm threshold,
    /// then clamped at 0.2 per bin and renormalized. Layout is row-major
    /// over (spatial row, spatial col, orientation bin).
    ///
    /// `update_gradients` must have been called for the current octave.
    /// A keypoint outside the octave or image bounds yields an all-zero
    /// descriptor.
    pub fn keypoint_descriptor(&self, k: &Keypoint, angle: f64) -> Descriptor {
        debug_assert_eq!(self.grad_octave, self.o_cur);

        let mut descr: Descriptor = [0.0; DESCRIPTOR_SIZE];
        let nbp = SPATIAL_BINS as i32;
        let nbo = ORIENTATION_BINS as i32;

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
            return descr;
        }
        if xi < 0 || xi > w - 1 || yi < 0 || yi > h - 1 || si < self.s_min + 1 || si > self.s_max - 2 {
            return descr;
        }

        let (st0, ct0) = angle.sin_cos();
        let sbp = self.magnif * sigma + f64::EPSILON;
        let radius = (sbp * std::f64::consts::SQRT_2 * (nbp as f64 + 1.0) / 2.0 + 0.5).floor() as i32;
        let wsigma = self.window_size;
        let plane = self.grad_plane(si);

        let ys_lo = (-radius).max(1 - yi);
        let ys_hi = radius.min(h - 2 - yi);
        let xs_lo = (-radius).max(1 - xi);
        let xs_hi = radius.min(w - 2 - xi);
        for dyi in ys_lo..=ys_hi {
            for dxi in xs_lo..=xs_hi {
                let idx = 2 * ((yi + dyi) as usize * w as usize + (xi + dxi) as usize);
                let magnitude = plane[idx] as f64;
                let grad_angle = plane[idx + 1] as f64;
                let theta = mod_2pi(grad_angle - angle);

                // Sample position in the rotated, scale-normalized frame.
                let dx = (xi + dxi) as f64 - x;
                let dy = (yi + dyi) as f64 - y;
                let nx = (ct0 * dx + st0 * dy) / sbp;
                let ny = (-st0 * dx + ct0 * dy) / sbp;
                let nt = nbo as f64 * theta / TWO_PI;

                let win = (-(nx * nx + ny * ny) / (2.0 * wsigma * wsigma)).exp();

                // Trilinear spread over the two nearest bins per axis.
                let binx = (nx - 0.5).floor() as i32;
                let biny = (ny - 0.5).floor() as i32;
                let bint = nt.floor() as i32;
                let rbinx = nx - (binx as f64 + 0.5);
                let rbiny = ny - (biny as f64 + 0.5);
                let rbint = nt - bint as f64;

                for dbinx in 0..2 {
                    let bx = binx + dbinx;
                    if bx < -nbp / 2 || bx >= nbp / 2 {
                        continue;
                    }
                    for dbiny in 0..2 {
                        let by = biny + dbiny;
                        if by < -nbp / 2 || by >= nbp / 2 {
                            continue;
                        }
                        for dbint in 0..2 {
                            let bt = (bint + dbint).rem_euclid(nbo);
                            let weight = win
                                * magnitude
                                * (1.0 - (dbinx as f64 - rbinx).abs())
                                * (1.0 - (dbiny as f64 - rbiny).abs())
                                * (1.0 - (dbint as f64 - rbint).abs());
                            let slot = (nbo * (bx + nbp / 2)
                                + nbo * nbp * (by + nbp / 2)
                                + bt) as usize;
                            descr[slot] += weight as f32;
                        }
                    }
                }
            }
        }

        let norm = l2_normalize(&mut descr);
        if self.norm_thresh > 0.0 && norm < self.norm_thresh {
            descr = [0.0; DESCRIPTOR_SIZE];
            return descr;
        }
        for v in descr.iter_mut() {
            if *v > BIN_CLAMP {
                *v = BIN_CLAMP;
            }
        }
        l2_normalize(&mut descr);
        descr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::SiftConfig;

    fn test_config() -> SiftConfig {
        SiftConfig {
            octaves: 1,
            levels: 3,
            first_octave: 0,
            ..SiftConfig::default()
        }
    }

    fn ramp_image(size: usize) -> Vec<f32> {
        (0..size * size)
            .map(|i| (i % size) as f32 / size as f32)
            .collect()
    }

    fn textured_image(size: usize) -> Vec<f32> {
        (0..size * size)
            .map(|i| {
                let x = (i % size) as f32;
                let y = (i / size) as f32;
                (0.35 * x).sin() * (0.27 * y).cos() * 0.5 + 0.5
            })
            .collect()
    }

    fn prepared_filter(img: &[f32], size: usize) -> ScaleSpaceFilter {
        let mut filt = ScaleSpaceFilter::new(size, size, &test_config()).unwrap();
        filt.process_first_octave(img).unwrap();
        filt.update_gradients();
        filt
    }

    #[test]
    fn descriptor_is_nonnegative_and_bounded() {
        let filt = prepared_filter(&textured_image(64), 64);
        let k = filt.keypoint_init(32.0, 32.0, 2.0);
        let d = filt.keypoint_descriptor(&k, 0.4);
        assert!(d.iter().all(|&v| v >= 0.0));
        // After clamping at 0.2 and renormalizing, no bin can exceed
        // 0.2 / 0.2 = 1; in practice bins stay well below 1.
        assert!(d.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn descriptor_is_normalized_on_textured_input() {
        let filt = prepared_filter(&textured_image(64), 64);
        let k = filt.keypoint_init(32.0, 32.0, 2.0);
        let d = filt.keypoint_descriptor(&k, 1.1);
        let norm: f64 = d.iter().map(|&v| v as f64 * v as f64).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "norm {}", norm);
    }

    #[test]
    fn uniform_image_descriptor_is_zero() {
        let filt = prepared_filter(&vec![0.5f32; 64 * 64], 64);
        let k = filt.keypoint_init(32.0, 32.0, 2.0);
        let d = filt.keypoint_descriptor(&k, 0.0);
        assert!(d.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn norm_threshold_zeroes_weak_descriptors() {
        let img = ramp_image(64);
        let mut filt = ScaleSpaceFilter::new(64, 64, &test_config()).unwrap();
        filt.set_norm_thresh(1e9);
        filt.process_first_octave(&img).unwrap();
        filt.update_gradients();
        let k = filt.keypoint_init(32.0, 32.0, 2.0);
        let d = filt.keypoint_descriptor(&k, 0.0);
        assert!(d.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn wrong_octave_keypoint_gets_zero_descriptor() {
        let filt = prepared_filter(&textured_image(64), 64);
        let mut k = filt.keypoint_init(32.0, 32.0, 2.0);
        k.octave += 3;
        let d = filt.keypoint_descriptor(&k, 0.0);
        assert!(d.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rotation_shifts_orientation_mass() {
        // For a pure horizontal ramp, computing the descriptor at the
        // gradient angle concentrates mass in orientation bin 0 of each
        // spatial bin; a quarter-turn reference moves it two bins over.
        let filt = prepared_filter(&ramp_image(64), 64);
        let k = filt.keypoint_init(32.0, 32.0, 2.0);

        let aligned = filt.keypoint_descriptor(&k, 0.0);
        let rotated = filt.keypoint_descriptor(&k, -std::f64::consts::FRAC_PI_2);

        let mass = |d: &Descriptor, t: usize| -> f32 {
            (0..16).map(|cell| d[cell * 8 + t]).sum()
        };
        assert!(mass(&aligned, 0) > mass(&aligned, 2));
        assert!(mass(&rotated, 2) > mass(&rotated, 0));
    }
}
