use sift_core::Keypoint;
use crate::filter::ScaleSpaceFilter;
use log::debug;

/// Solve a symmetric 3x3 system `a x = b` by Gaussian elimination with
/// partial pivoting. Returns `None` when the system is singular.
fn solve_3x3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let mut pivot = col;
        for row in (col + 1)..3 {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..3 {
            let f = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let mut acc = b[row];
        for k in (row + 1)..3 {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Some(x)
}

impl ScaleSpaceFilter {
    /// Detect keypoints on the current octave.
    ///
    /// Candidates are strict extrema over their 26 neighbors in the DoG
    /// volume whose magnitude already clears 80% of the peak threshold.
    /// Each candidate is then localized by iterative quadratic
    /// interpolation and screened against the peak and edge thresholds.
    /// Results are available through `keypoints()` until the filter
    /// advances to the next octave.
    pub fn detect(&mut self) {
        self.keypoints.clear();

        let w = self.octave_width();
        let h = self.octave_height();
        let n = w * h;
        let pre_thresh = 0.8 * self.peak_thresh;

        let mut candidates: Vec<(usize, usize, i32)> = Vec::new();
        for s in (self.s_min + 1)..=(self.s_max - 2) {
            let below = self.dog_plane(s - 1);
            let plane = self.dog_plane(s);
            let above = self.dog_plane(s + 1);
            for y in 1..h.saturating_sub(1) {
                for x in 1..w.saturating_sub(1) {
                    let v = plane[y * w + x];
                    if (v.abs() as f64) <= pre_thresh {
                        continue;
                    }
                    let mut is_max = true;
                    let mut is_min = true;
                    'nbhd: for dy in -1i32..=1 {
                        for dx in -1i32..=1 {
                            let idx = (y as i32 + dy) as usize * w + (x as i32 + dx) as usize;
                            debug_assert!(idx < n);
                            for (pi, p) in [below, plane, above].iter().enumerate() {
                                if pi == 1 && dx == 0 && dy == 0 {
                                    continue;
                                }
                                let q = p[idx];
                                if q >= v {
                                    is_max = false;
                                }
                                if q <= v {
                                    is_min = false;
                                }
                                if !is_max && !is_min {
                                    break 'nbhd;
                                }
                            }
                        }
                    }
                    if is_max || is_min {
                        candidates.push((x, y, s));
                    }
                }
            }
        }

        let found = candidates.len();
        for (x, y, s) in candidates {
            if let Some(kp) = self.refine_extremum(x, y, s) {
                self.keypoints.push(kp);
            }
        }
        debug!(
            "octave {}: {} extrema, {} keypoints after refinement",
            self.o_cur,
            found,
            self.keypoints.len()
        );
    }

    /// Localize an extremum to subpixel/subscale accuracy and screen it
    /// against the peak and edge thresholds.
    fn refine_extremum(&self, mut x: usize, mut y: usize, s: i32) -> Option<Keypoint> {
        let w = self.octave_width();
        let h = self.octave_height();

        let mut b = [0.0f64; 3];
        let mut val = 0.0f64;
        let mut dxx = 0.0f64;
        let mut dyy = 0.0f64;
        let mut dxy = 0.0f64;

        for _ in 0..5 {
            let below = self.dog_plane(s - 1);
            let plane = self.dog_plane(s);
            let above = self.dog_plane(s + 1);
            let at = |p: &[f32], xx: usize, yy: usize| p[yy * w + xx] as f64;

            let v = at(plane, x, y);
            let gx = 0.5 * (at(plane, x + 1, y) - at(plane, x - 1, y));
            let gy = 0.5 * (at(plane, x, y + 1) - at(plane, x, y - 1));
            let gs = 0.5 * (at(above, x, y) - at(below, x, y));

            dxx = at(plane, x + 1, y) + at(plane, x - 1, y) - 2.0 * v;
            dyy = at(plane, x, y + 1) + at(plane, x, y - 1) - 2.0 * v;
            let dss = at(above, x, y) + at(below, x, y) - 2.0 * v;
            dxy = 0.25
                * (at(plane, x + 1, y + 1) + at(plane, x - 1, y - 1)
                    - at(plane, x + 1, y - 1)
                    - at(plane, x - 1, y + 1));
            let dxs = 0.25
                * (at(above, x + 1, y) + at(below, x - 1, y)
                    - at(above, x - 1, y)
                    - at(below, x + 1, y));
            let dys = 0.25
                * (at(above, x, y + 1) + at(below, x, y - 1)
                    - at(above, x, y - 1)
                    - at(below, x, y + 1));

            let hessian = [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]];
            b = solve_3x3(hessian, [-gx, -gy, -gs])?;
            val = v + 0.5 * (gx * b[0] + gy * b[1] + gs * b[2]);

            // Re-center and retry when the offset escapes the cell.
            let dx: i32 = if b[0] > 0.6 && x + 2 < w {
                1
            } else if b[0] < -0.6 && x > 1 {
                -1
            } else {
                0
            };
            let dy: i32 = if b[1] > 0.6 && y + 2 < h {
                1
            } else if b[1] < -0.6 && y > 1 {
                -1
            } else {
                0
            };
            if dx == 0 && dy == 0 {
                break;
            }
            x = (x as i32 + dx) as usize;
            y = (y as i32 + dy) as usize;
        }

        if val.abs() <= self.peak_thresh {
            return None;
        }
        // Edge screening on the 2x2 spatial Hessian.
        let det = dxx * dyy - dxy * dxy;
        let score = (dxx + dyy) * (dxx + dyy) / det;
        let e = self.edge_thresh;
        if det <= 0.0 || score >= (e + 1.0) * (e + 1.0) / e {
            return None;
        }
        if b[0].abs() >= 1.5 || b[1].abs() >= 1.5 || b[2].abs() >= 1.5 {
            return None;
        }

        let xper = 2.0f64.powi(self.o_cur);
        let sc = s as f64 + b[2];
        Some(Keypoint {
            octave: self.o_cur,
            ix: x as i32,
            iy: y as i32,
            is: s,
            x: ((x as f64 + b[0]) * xper) as f32,
            y: ((y as f64 + b[1]) * xper) as f32,
            s: sc as f32,
            sigma: (self.sigma0 * 2.0f64.powf(self.o_cur as f64 + sc / self.levels as f64)) as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::SiftConfig;

    fn test_config() -> SiftConfig {
        SiftConfig {
            octaves: 2,
            levels: 3,
            first_octave: 0,
            ..SiftConfig::default()
        }
    }

    /// Dark background with a bright Gaussian blob at the center.
    fn blob_image(size: usize, radius: f32) -> Vec<f32> {
        let c = size as f32 / 2.0;
        (0..size * size)
            .map(|i| {
                let x = (i % size) as f32;
                let y = (i / size) as f32;
                let r2 = (x - c) * (x - c) + (y - c) * (y - c);
                (-r2 / (2.0 * radius * radius)).exp()
            })
            .collect()
    }

    #[test]
    fn solve_3x3_identity() {
        let x = solve_3x3(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            [3.0, -2.0, 0.5],
        )
        .unwrap();
        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!((x[1] + 2.0).abs() < 1e-12);
        assert!((x[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn solve_3x3_singular_is_none() {
        assert!(solve_3x3(
            [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]],
            [1.0, 2.0, 3.0]
        )
        .is_none());
    }

    #[test]
    fn uniform_image_has_no_keypoints() {
        let mut filt = ScaleSpaceFilter::new(32, 32, &test_config()).unwrap();
        let img = vec![0.5f32; 32 * 32];
        filt.process_first_octave(&img).unwrap();
        filt.detect();
        assert!(filt.keypoints().is_empty());
        filt.process_next_octave().unwrap();
        filt.detect();
        assert!(filt.keypoints().is_empty());
    }

    #[test]
    fn bright_blob_is_detected_near_center() {
        let mut filt = ScaleSpaceFilter::new(64, 64, &test_config()).unwrap();
        let img = blob_image(64, 3.0);
        filt.process_first_octave(&img).unwrap();
        filt.detect();
        let keys = filt.keypoints();
        assert!(!keys.is_empty(), "blob should produce at least one keypoint");
        let near_center = keys
            .iter()
            .any(|k| (k.x - 32.0).abs() < 4.0 && (k.y - 32.0).abs() < 4.0);
        assert!(near_center, "no keypoint near the blob center: {:?}", keys);
    }

    #[test]
    fn detected_keypoints_carry_current_octave() {
        let mut filt = ScaleSpaceFilter::new(64, 64, &test_config()).unwrap();
        let img = blob_image(64, 4.0);
        filt.process_first_octave(&img).unwrap();
        filt.detect();
        for k in filt.keypoints() {
            assert_eq!(k.octave, filt.octave_index());
            assert!(k.sigma > 0.0);
        }
    }

    #[test]
    fn peak_threshold_filters_weak_extrema() {
        let img = blob_image(64, 3.0);

        let mut permissive = ScaleSpaceFilter::new(64, 64, &test_config()).unwrap();
        permissive.process_first_octave(&img).unwrap();
        permissive.detect();
        let lax = permissive.keypoints().len();

        let mut strict = ScaleSpaceFilter::new(64, 64, &test_config()).unwrap();
        strict.set_peak_thresh(10.0);
        strict.process_first_octave(&img).unwrap();
        strict.detect();
        assert!(strict.keypoints().len() <= lax);
        assert!(strict.keypoints().is_empty());
    }
}
