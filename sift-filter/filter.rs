use sift_core::{Keypoint, SiftConfig};
use crate::convolution;
use crate::error::{Exhausted, FilterError, FilterResult};
use log::debug;

/// Default DoG peak threshold.
pub const DEFAULT_PEAK_THRESH: f64 = 0.0;
/// Default edge rejection threshold.
pub const DEFAULT_EDGE_THRESH: f64 = 10.0;
/// Default descriptor norm threshold (0 disables the check).
pub const DEFAULT_NORM_THRESH: f64 = 0.0;
/// Descriptor spatial bin size in units of the keypoint scale.
pub const DEFAULT_MAGNIF: f64 = 3.0;
/// Gaussian window size of the descriptor, in spatial bins.
pub const DEFAULT_WINDOW_SIZE: f64 = 2.0;

/// Smoothing assumed present in the input image, at octave 0 resolution.
const NOMINAL_SIGMA: f64 = 0.5;
/// Base smoothing multiplier: sigma0 = 1.6 * 2^(1/S).
const BASE_SIGMA: f64 = 1.6;

/// Gaussian scale-space filter.
///
/// Owns the Gaussian and difference-of-Gaussians pyramid of one image and
/// advances through it octave by octave: `process_first_octave`, then
/// `process_next_octave` until it signals `Exhausted`. Between advances
/// the current octave can be queried for detected keypoints, keypoint
/// orientations, and descriptors.
///
/// Octave `o` holds Gaussian levels `s_min..=s_max` with scale
/// `sigma0 * 2^(o + s/S)` and DoG planes `s_min..=s_max-1`.
pub struct ScaleSpaceFilter {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) num_octaves: i32,
    pub(crate) levels: i32,
    pub(crate) o_min: i32,
    pub(crate) s_min: i32,
    pub(crate) s_max: i32,
    pub(crate) o_cur: i32,

    pub(crate) sigma0: f64,
    pub(crate) sigma_k: f64,
    pub(crate) dsigma0: f64,

    pub(crate) peak_thresh: f64,
    pub(crate) edge_thresh: f64,
    pub(crate) norm_thresh: f64,
    pub(crate) magnif: f64,
    pub(crate) window_size: f64,

    /// Gaussian levels of the current octave, `s_max - s_min + 1` planes.
    pub(crate) octave: Vec<f32>,
    /// DoG planes of the current octave, `s_max - s_min` planes.
    pub(crate) dog: Vec<f32>,
    /// Gradient (magnitude, angle) pairs for levels `s_min+1..=s_max-2`.
    pub(crate) grad: Vec<f32>,
    /// Octave the gradient cache was computed for; `i32::MIN` when stale.
    pub(crate) grad_octave: i32,
    pub(crate) temp: Vec<f32>,

    pub(crate) keypoints: Vec<Keypoint>,
}

/// Octave dimension of a base dimension: halved per positive octave,
/// doubled per negative one.
pub(crate) fn octave_dim(dim: usize, o: i32) -> usize {
    if o >= 0 {
        (dim >> o).max(1)
    } else {
        dim << (-o)
    }
}

impl ScaleSpaceFilter {
    /// Create a filter for a `width x height` image with the given
    /// configuration. A negative `config.octaves` resolves to
    /// `max(floor(log2(min(w, h))) - first_octave - 3, 1)`.
    pub fn new(width: usize, height: usize, config: &SiftConfig) -> FilterResult<Self> {
        if width == 0 || height == 0 {
            return Err(FilterError::InvalidImageSize { width, height });
        }
        if config.levels < 1 {
            return Err(FilterError::InvalidLevels(config.levels));
        }

        let o_min = config.first_octave;
        let num_octaves = if config.octaves < 0 {
            let min_dim = width.min(height) as f64;
            ((min_dim.log2().floor() as i32) - o_min - 3).max(1)
        } else {
            config.octaves
        };
        // Octave dimensions of the first octave are the largest ones.
        let base_w = octave_dim(width, o_min);
        let base_h = octave_dim(height, o_min);
        if base_w < 4 || base_h < 4 {
            return Err(FilterError::InvalidImageSize { width, height });
        }

        let s = config.levels as i32;
        let s_min = -1;
        let s_max = s + 1;
        let sigma_k = 2.0f64.powf(1.0 / s as f64);
        let sigma0 = BASE_SIGMA * sigma_k;
        let dsigma0 = sigma0 * (1.0 - 1.0 / (sigma_k * sigma_k)).sqrt();

        let plane = base_w * base_h;
        let gss_planes = (s_max - s_min + 1) as usize;
        let dog_planes = (s_max - s_min) as usize;
        let grad_planes = (s_max - 2 - s_min) as usize; // s_min+1..=s_max-2

        Ok(Self {
            width,
            height,
            num_octaves,
            levels: s,
            o_min,
            s_min,
            s_max,
            o_cur: o_min,
            sigma0,
            sigma_k,
            dsigma0,
            peak_thresh: DEFAULT_PEAK_THRESH,
            edge_thresh: DEFAULT_EDGE_THRESH,
            norm_thresh: DEFAULT_NORM_THRESH,
            magnif: DEFAULT_MAGNIF,
            window_size: DEFAULT_WINDOW_SIZE,
            octave: vec![0.0; gss_planes * plane],
            dog: vec![0.0; dog_planes * plane],
            grad: vec![0.0; 2 * grad_planes * plane],
            grad_octave: i32::MIN,
            temp: vec![0.0; plane],
            keypoints: Vec::new(),
        })
    }

    /// Current octave index.
    pub fn octave_index(&self) -> i32 {
        self.o_cur
    }

    /// Width of the current octave.
    pub fn octave_width(&self) -> usize {
        octave_dim(self.width, self.o_cur)
    }

    /// Height of the current octave.
    pub fn octave_height(&self) -> usize {
        octave_dim(self.height, self.o_cur)
    }

    pub fn num_octaves(&self) -> i32 {
        self.num_octaves
    }

    pub fn levels(&self) -> i32 {
        self.levels
    }

    pub fn first_octave(&self) -> i32 {
        self.o_min
    }

    pub fn peak_thresh(&self) -> f64 {
        self.peak_thresh
    }

    pub fn edge_thresh(&self) -> f64 {
        self.edge_thresh
    }

    pub fn norm_thresh(&self) -> f64 {
        self.norm_thresh
    }

    pub fn set_peak_thresh(&mut self, t: f64) {
        self.peak_thresh = t;
    }

    pub fn set_edge_thresh(&mut self, t: f64) {
        self.edge_thresh = t;
    }

    pub fn set_norm_thresh(&mut self, t: f64) {
        self.norm_thresh = t;
    }

    /// Keypoints found by the last `detect` call on the current octave.
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub(crate) fn plane_len(&self) -> usize {
        self.octave_width() * self.octave_height()
    }

    /// Gaussian plane for level `s` of the current octave.
    pub(crate) fn gss_plane(&self, s: i32) -> &[f32] {
        let n = self.plane_len();
        let off = (s - self.s_min) as usize * n;
        &self.octave[off..off + n]
    }

    /// DoG plane for level `s` of the current octave.
    pub(crate) fn dog_plane(&self, s: i32) -> &[f32] {
        let n = self.plane_len();
        let off = (s - self.s_min) as usize * n;
        &self.dog[off..off + n]
    }

    /// Gradient plane (interleaved magnitude, angle) for level `s`.
    pub(crate) fn grad_plane(&self, s: i32) -> &[f32] {
        let n = 2 * self.plane_len();
        let off = (s - self.s_min - 1) as usize * n;
        &self.grad[off..off + n]
    }

    /// Compute the Gaussian scale space of the first octave from the
    /// input image. Fails with `Exhausted` when the filter is configured
    /// for zero octaves.
    pub fn process_first_octave(&mut self, data: &[f32]) -> Result<(), Exhausted> {
        if self.num_octaves == 0 {
            return Err(Exhausted);
        }
        debug_assert_eq!(data.len(), self.width * self.height);

        self.o_cur = self.o_min;
        self.keypoints.clear();
        self.grad_octave = i32::MIN;

        let w = self.octave_width();
        let h = self.octave_height();
        let n = w * h;

        // Bring the input to first-octave resolution.
        if self.o_min < 0 {
            // Repeated doubling.
            let mut cur: Vec<f32> = data.to_vec();
            let mut cw = self.width;
            let mut ch = self.height;
            for _ in 0..(-self.o_min) {
                let mut next = vec![0.0f32; 4 * cw * ch];
                convolution::upsample(&mut next, &cur, cw, ch);
                cur = next;
                cw *= 2;
                ch *= 2;
            }
            self.octave[..n].copy_from_slice(&cur);
        } else if self.o_min > 0 {
            convolution::downsample(&mut self.octave[..n], data, self.width, self.height, self.o_min as u32);
        } else {
            self.octave[..n].copy_from_slice(data);
        }

        // Pre-smooth from the nominal input smoothing up to sigma(o_min, s_min).
        let sa = self.sigma0 * self.sigma_k.powi(self.s_min);
        let sb = NOMINAL_SIGMA * 2.0f64.powi(-self.o_min);
        if sa > sb {
            let sd = (sa * sa - sb * sb).sqrt();
            let (base, _) = self.octave.split_at_mut(n);
            let src = base.to_vec();
            convolution::smooth(base, &mut self.temp, &src, w, h, sd);
        }

        self.build_octave_levels();
        self.compute_dog();
        debug!(
            "octave {}: {}x{} scale space computed",
            self.o_cur, w, h
        );
        Ok(())
    }

    /// Advance to the next octave by downsampling the appropriate level
    /// of the current one. Fails with `Exhausted` when no further octave
    /// exists; this is the extraction loop's termination signal.
    pub fn process_next_octave(&mut self) -> Result<(), Exhausted> {
        if self.o_cur >= self.o_min + self.num_octaves - 1 {
            return Err(Exhausted);
        }

        let w = self.octave_width();
        let h = self.octave_height();
        let n = w * h;
        if w < 4 || h < 4 {
            return Err(Exhausted);
        }

        // The level of the current octave whose scale matches s_min of
        // the next one, once downsampled.
        let s_best = (self.s_min + self.levels).min(self.s_max);
        let src_off = (s_best - self.s_min) as usize * n;
        let src = self.octave[src_off..src_off + n].to_vec();

        self.o_cur += 1;
        self.keypoints.clear();
        self.grad_octave = i32::MIN;

        let nw = self.octave_width();
        let nh = self.octave_height();
        let nn = nw * nh;
        convolution::downsample(&mut self.octave[..nn], &src, w, h, 1);

        let sa = self.sigma0 * self.sigma_k.powi(self.s_min);
        let sb = self.sigma0 * self.sigma_k.powi(s_best - self.levels);
        if sa > sb {
            let sd = (sa * sa - sb * sb).sqrt();
            let (base, _) = self.octave.split_at_mut(nn);
            let src = base.to_vec();
            convolution::smooth(base, &mut self.temp, &src, nw, nh, sd);
        }

        self.build_octave_levels();
        self.compute_dog();
        debug!(
            "octave {}: {}x{} scale space computed",
            self.o_cur, nw, nh
        );
        Ok(())
    }

    /// Incrementally smooth level `s_min` up through `s_max`.
    fn build_octave_levels(&mut self) {
        let w = self.octave_width();
        let h = self.octave_height();
        let n = w * h;
        for s in (self.s_min + 1)..=self.s_max {
            let sd = self.dsigma0 * self.sigma_k.powi(s);
            let off = (s - self.s_min) as usize * n;
            let (prev, rest) = self.octave.split_at_mut(off);
            let src = &prev[off - n..];
            convolution::smooth(&mut rest[..n], &mut self.temp, src, w, h, sd);
        }
    }

    /// DoG plane `s` is level `s+1` minus level `s`.
    fn compute_dog(&mut self) {
        let n = self.plane_len();
        for s in self.s_min..self.s_max {
            let lo = (s - self.s_min) as usize * n;
            let hi = lo + n;
            for i in 0..n {
                self.dog[lo + i] = self.octave[hi + i] - self.octave[lo + i];
            }
        }
    }

    /// Reconstruct the pyramid cell of a keypoint from continuous
    /// coordinates and scale; used in caller-supplied-frames mode. The
    /// resulting `octave` tells which octave pass must consume it.
    pub fn keypoint_init(&self, x: f64, y: f64, sigma: f64) -> Keypoint {
        let phi = ((sigma + f64::EPSILON) / self.sigma0).log2();
        let o = (phi - (self.s_min as f64 + 0.5) / self.levels as f64)
            .floor() as i32;
        let o = o.clamp(self.o_min, self.o_min + self.num_octaves.max(1) - 1);
        let s = self.levels as f64 * (phi - o as f64);
        let xper = 2.0f64.powi(o);
        let is = (s.round() as i32).clamp(self.s_min + 1, self.s_max - 2);

        Keypoint {
            octave: o,
            ix: (x / xper + 0.5).floor() as i32,
            iy: (y / xper + 0.5).floor() as i32,
            is,
            x: x as f32,
            y: y as f32,
            s: s as f32,
            sigma: sigma as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::SiftConfig;

    fn config_with(levels: usize, octaves: i32, first_octave: i32) -> SiftConfig {
        SiftConfig {
            octaves,
            levels,
            first_octave,
            ..SiftConfig::default()
        }
    }

    #[test]
    fn auto_octave_count_from_image_size() {
        let filt = ScaleSpaceFilter::new(32, 32, &config_with(3, -1, 0)).unwrap();
        // floor(log2 32) - 0 - 3 = 2
        assert_eq!(filt.num_octaves(), 2);

        let filt = ScaleSpaceFilter::new(256, 512, &config_with(3, -1, 0)).unwrap();
        // floor(log2 256) - 3 = 5
        assert_eq!(filt.num_octaves(), 5);
    }

    #[test]
    fn rejects_bad_dimensions_and_levels() {
        assert!(matches!(
            ScaleSpaceFilter::new(0, 32, &config_with(3, -1, 0)),
            Err(FilterError::InvalidImageSize { .. })
        ));
        assert!(matches!(
            ScaleSpaceFilter::new(32, 32, &config_with(0, -1, 0)),
            Err(FilterError::InvalidLevels(0))
        ));
    }

    #[test]
    fn octave_dimensions_follow_octave_index() {
        let mut filt = ScaleSpaceFilter::new(64, 48, &config_with(3, 3, 0)).unwrap();
        let img = vec![0.5f32; 64 * 48];
        filt.process_first_octave(&img).unwrap();
        assert_eq!((filt.octave_width(), filt.octave_height()), (64, 48));
        filt.process_next_octave().unwrap();
        assert_eq!((filt.octave_width(), filt.octave_height()), (32, 24));
        filt.process_next_octave().unwrap();
        assert_eq!((filt.octave_width(), filt.octave_height()), (16, 12));
        assert_eq!(filt.process_next_octave(), Err(Exhausted));
    }

    #[test]
    fn zero_octaves_is_immediately_exhausted() {
        let mut filt = ScaleSpaceFilter::new(32, 32, &config_with(3, 0, 0)).unwrap();
        let img = vec![0.5f32; 32 * 32];
        assert_eq!(filt.process_first_octave(&img), Err(Exhausted));
    }

    #[test]
    fn negative_first_octave_upsamples() {
        let mut filt = ScaleSpaceFilter::new(16, 16, &config_with(3, 1, -1)).unwrap();
        let img = vec![0.5f32; 16 * 16];
        filt.process_first_octave(&img).unwrap();
        assert_eq!((filt.octave_width(), filt.octave_height()), (32, 32));
    }

    #[test]
    fn constant_image_gives_flat_levels() {
        let mut filt = ScaleSpaceFilter::new(32, 32, &config_with(3, 1, 0)).unwrap();
        let img = vec![0.7f32; 32 * 32];
        filt.process_first_octave(&img).unwrap();
        for s in filt.s_min..=filt.s_max {
            for &v in filt.gss_plane(s) {
                assert!((v - 0.7).abs() < 1e-4);
            }
        }
        for s in filt.s_min..filt.s_max {
            for &v in filt.dog_plane(s) {
                assert!(v.abs() < 1e-4);
            }
        }
    }

    #[test]
    fn keypoint_init_assigns_expected_octave() {
        let filt = ScaleSpaceFilter::new(64, 64, &config_with(3, 3, 0)).unwrap();
        // sigma close to sigma0 belongs to octave 0.
        let k = filt.keypoint_init(16.0, 16.0, 2.0);
        assert_eq!(k.octave, 0);
        assert_eq!(k.ix, 16);
        assert_eq!(k.iy, 16);
        // Twice the scale belongs to the next octave.
        let k = filt.keypoint_init(16.0, 16.0, 4.0);
        assert_eq!(k.octave, 1);
        assert_eq!(k.ix, 8);
        // Scales past the last octave clamp to it.
        let k = filt.keypoint_init(16.0, 16.0, 64.0);
        assert_eq!(k.octave, 2);
    }

    #[test]
    fn threshold_overrides_stick() {
        let mut filt = ScaleSpaceFilter::new(32, 32, &config_with(3, -1, 0)).unwrap();
        assert_eq!(filt.edge_thresh(), DEFAULT_EDGE_THRESH);
        filt.set_peak_thresh(0.01);
        filt.set_edge_thresh(7.5);
        filt.set_norm_thresh(0.1);
        assert_eq!(filt.peak_thresh(), 0.01);
        assert_eq!(filt.edge_thresh(), 7.5);
        assert_eq!(filt.norm_thresh(), 0.1);
    }
}
