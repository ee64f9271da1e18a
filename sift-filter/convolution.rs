//! Separable Gaussian smoothing and resampling for scale-space
//! construction. All buffers are row-major `width x height`.

/// Build a normalized Gaussian kernel for the given sigma. The radius is
/// `ceil(4 sigma)`, wide enough that the truncated tail is negligible.
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (4.0 * sigma).ceil().max(0.0) as usize;
    let mut kernel = vec![0.0f32; 2 * radius + 1];
    let mut acc = 0.0f64;
    for (i, k) in kernel.iter_mut().enumerate() {
        let d = i as f64 - radius as f64;
        let v = (-d * d / (2.0 * sigma * sigma)).exp();
        *k = v as f32;
        acc += v;
    }
    for k in kernel.iter_mut() {
        *k = (*k as f64 / acc) as f32;
    }
    kernel
}

/// Smooth `src` into `dst` with an isotropic Gaussian of the given sigma,
/// using `temp` as scratch for the intermediate horizontal pass. Borders
/// are extended by continuity.
pub fn smooth(dst: &mut [f32], temp: &mut [f32], src: &[f32], width: usize, height: usize, sigma: f64) {
    debug_assert_eq!(src.len(), width * height);
    debug_assert_eq!(dst.len(), width * height);
    debug_assert!(temp.len() >= width * height);

    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    if radius == 0 {
        dst.copy_from_slice(src);
        return;
    }

    // Horizontal pass: src -> temp
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0.0f32;
            for (i, &k) in kernel.iter().enumerate() {
                let xx = (x as isize + i as isize - radius as isize).clamp(0, width as isize - 1);
                acc += k * row[xx as usize];
            }
            temp[y * width + x] = acc;
        }
    }

    // Vertical pass: temp -> dst
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0f32;
            for (i, &k) in kernel.iter().enumerate() {
                let yy = (y as isize + i as isize - radius as isize).clamp(0, height as isize - 1);
                acc += k * temp[yy as usize * width + x];
            }
            dst[y * width + x] = acc;
        }
    }
}

/// Double both dimensions with bilinear interpolation. `dst` must hold
/// `2 width x 2 height` samples.
pub fn upsample(dst: &mut [f32], src: &[f32], width: usize, height: usize) {
    debug_assert_eq!(src.len(), width * height);
    debug_assert_eq!(dst.len(), 4 * width * height);

    let dw = 2 * width;
    for y in 0..2 * height {
        let y0 = (y / 2).min(height - 1);
        let y1 = (y / 2 + 1).min(height - 1);
        let fy = if y % 2 == 0 { 0.0 } else { 0.5 };
        for x in 0..dw {
            let x0 = (x / 2).min(width - 1);
            let x1 = (x / 2 + 1).min(width - 1);
            let fx = if x % 2 == 0 { 0.0f32 } else { 0.5 };
            let top = src[y0 * width + x0] * (1.0 - fx) + src[y0 * width + x1] * fx;
            let bottom = src[y1 * width + x0] * (1.0 - fx) + src[y1 * width + x1] * fx;
            dst[y * dw + x] = top * (1.0 - fy) + bottom * fy;
        }
    }
}

/// Subsample by `2^d`, keeping the top-left pixel of each cell. Returns
/// the output dimensions.
pub fn downsample(dst: &mut [f32], src: &[f32], width: usize, height: usize, d: u32) -> (usize, usize) {
    debug_assert_eq!(src.len(), width * height);
    let step = 1usize << d;
    let dw = (width >> d).max(1);
    let dh = (height >> d).max(1);
    debug_assert!(dst.len() >= dw * dh);

    for y in 0..dh {
        for x in 0..dw {
            dst[y * dw + x] = src[(y * step).min(height - 1) * width + (x * step).min(width - 1)];
        }
    }
    (dw, dh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalized() {
        for &sigma in &[0.5, 1.0, 1.6, 3.2] {
            let kernel = gaussian_kernel(sigma);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "sigma {} sum {}", sigma, sum);
        }
    }

    #[test]
    fn smooth_preserves_constant_image() {
        let src = vec![0.25f32; 16 * 16];
        let mut dst = vec![0.0f32; 16 * 16];
        let mut temp = vec![0.0f32; 16 * 16];
        smooth(&mut dst, &mut temp, &src, 16, 16, 1.6);
        for &v in &dst {
            assert!((v - 0.25).abs() < 1e-5);
        }
    }

    #[test]
    fn smooth_reduces_peak() {
        let mut src = vec![0.0f32; 9 * 9];
        src[4 * 9 + 4] = 1.0;
        let mut dst = vec![0.0f32; 9 * 9];
        let mut temp = vec![0.0f32; 9 * 9];
        smooth(&mut dst, &mut temp, &src, 9, 9, 1.0);
        assert!(dst[4 * 9 + 4] < 1.0);
        assert!(dst[4 * 9 + 4] > dst[4 * 9 + 5]);
        assert!(dst[3 * 9 + 4] > 0.0);
    }

    #[test]
    fn upsample_doubles_dimensions() {
        let src: Vec<f32> = (0..6).map(|v| v as f32).collect();
        let mut dst = vec![0.0f32; 24];
        upsample(&mut dst, &src, 3, 2);
        // Even output samples coincide with the source grid.
        assert_eq!(dst[0], src[0]);
        assert_eq!(dst[2], src[1]);
        assert_eq!(dst[2 * 6], src[3]);
        // Odd samples interpolate between neighbors.
        assert!((dst[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downsample_subsamples_grid() {
        let src: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let mut dst = vec![0.0f32; 4];
        let (dw, dh) = downsample(&mut dst, &src, 4, 4, 1);
        assert_eq!((dw, dh), (2, 2));
        assert_eq!(dst, vec![0.0, 2.0, 8.0, 10.0]);
    }
}
