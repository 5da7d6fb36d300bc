//! Inputs of the dense refinement stage.

use rgbd_core::{
    frame_to_cloud, Frame, FrameProcessor, FxFyCxCySkew, OrientedCloud, PointCloudSampler,
    PreconditionError, Pt2, Pt3, Real, Vec3,
};

/// Smooth a copy of `frame`, estimate its normals and turn it into a cloud in
/// its color-camera frame. The frame itself is left untouched.
pub(crate) fn filtered_cloud(
    processor: &dyn FrameProcessor,
    frame: &Frame,
    stride: u32,
) -> Result<OrientedCloud, PreconditionError> {
    let mut filtered = frame.clone();
    processor.process(&mut filtered)?;
    frame_to_cloud(&filtered, stride)
}

/// [`filtered_cloud`] reduced to at most `samples` points.
pub(crate) fn sampled_cloud(
    processor: &dyn FrameProcessor,
    sampler: &dyn PointCloudSampler,
    frame: &Frame,
    stride: u32,
    samples: usize,
) -> Result<OrientedCloud, PreconditionError> {
    let dense = filtered_cloud(processor, frame, stride)?;
    Ok(sampler.subsample(&dense, samples))
}

/// Lift `(u, v, depth)` observations into the camera frame of `k`.
pub(crate) fn lift(k: &FxFyCxCySkew<Real>, observations: &[Vec3]) -> Vec<Pt3> {
    observations
        .iter()
        .map(|o| k.backproject(&Pt2::new(o.x, o.y), o.z))
        .collect()
}

/// Keep the entries of `items` flagged in `mask`.
pub(crate) fn select<T: Copy>(items: &[T], mask: &[bool]) -> Vec<T> {
    items
        .iter()
        .zip(mask)
        .filter_map(|(item, &keep)| keep.then_some(*item))
        .collect()
}
