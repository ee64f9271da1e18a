use sift_core::{Descriptor, ORIENTATION_BINS, SPATIAL_BINS};

/// Transpose a SIFT descriptor.
///
/// Produces the descriptor one would obtain by computing the normal
/// descriptor on the transposed image: spatial rows are mirrored
/// (`j -> 3-j`) and within each spatial bin the orientation channels are
/// reversed with channel 0 fixed (`t -> (8-t) mod 8`), which is how
/// gradient orientations mirror under a coordinate transpose. A fixed
/// permutation, pure and total.
pub fn transpose_descriptor(src: &Descriptor) -> Descriptor {
    const BO: usize = ORIENTATION_BINS;
    const BP: usize = SPATIAL_BINS;

    let mut dst = [0.0f32; BP * BP * BO];
    for j in 0..BP {
        let jp = BP - 1 - j;
        for i in 0..BP {
            let o = BO * i + BP * BO * j;
            let op = BO * i + BP * BO * jp;
            dst[op] = src[o];
            for t in 1..BO {
                dst[op + BO - t] = src[o + t];
            }
        }
    }
    dst
}
