//! Backward pass of the bilinear resampler.
//!
//! Recomputes the per-point bilinear weights to scatter the upstream
//! gradient into the input feature map, then chains the per-point
//! coordinate gradient through the static grid into the six affine
//! parameters of each sample. Both accumulation targets are per-sample
//! exclusive, so the sample loop partitions cleanly across threads.

use rayon::prelude::*;

use rstn_core::{Result, SourceCoordinates, THETA_PARAMS_PER_SAMPLE};

use crate::resampler::FeatureMapDims;

/// Gradients produced by the backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    /// Gradient w.r.t. the input feature map; same shape as the input.
    pub input: Vec<f32>,
    /// Gradient w.r.t. the affine parameters; six per sample.
    pub theta: Vec<f32>,
}

/// Distribute the upstream gradient into the input feature map and the
/// affine parameters.
///
/// `grad_output` is the upstream gradient on the forward output,
/// `input` the feature map the forward call read from, and `coords` the
/// source coordinates saved by that forward call. Every output point
/// contributes to the parameter gradient of its sample; contributions are
/// accumulated, never overwritten. Neighbors outside the input are
/// zero-padding in both directions: nothing is read from them and no
/// gradient flows into them.
pub fn bilinear_backward(
    grad_output: &[f32],
    input: &[f32],
    coords: &SourceCoordinates,
    dims: &FeatureMapDims,
) -> Result<Gradients> {
    dims.validate("grad_output", grad_output, coords)?;
    dims.validate("input", input, coords)?;

    let stride = dims.sample_stride();
    let mut grad_input = vec![0.0f32; dims.len()];
    let mut grad_theta = vec![0.0f32; dims.batch * THETA_PARAMS_PER_SAMPLE];

    grad_input
        .par_chunks_mut(stride)
        .zip(grad_theta.par_chunks_mut(THETA_PARAMS_PER_SAMPLE))
        .enumerate()
        .for_each(|(n, (du_sample, dtheta_sample))| {
            backward_sample(
                &grad_output[n * stride..(n + 1) * stride],
                &input[n * stride..(n + 1) * stride],
                coords.sample(n),
                dims,
                du_sample,
                dtheta_sample,
            );
        });

    Ok(Gradients {
        input: grad_input,
        theta: grad_theta,
    })
}

fn backward_sample(
    grad_output: &[f32],
    input: &[f32],
    coords: &[f32],
    dims: &FeatureMapDims,
    grad_input: &mut [f32],
    grad_theta: &mut [f32],
) {
    let height = dims.height;
    let width = dims.width;
    let plane = dims.point_count();
    // Normalized-to-pixel scale factors of the forward mapping.
    let half_height = height as f32 / 2.0;
    let half_width = width as f32 / 2.0;

    for row in 0..height {
        let norm_h = row as f32 / height as f32 * 2.0 - 1.0;
        for col in 0..width {
            let norm_w = col as f32 / width as f32 * 2.0 - 1.0;
            let idx = row * width + col;

            let x = coords[2 * idx];
            let y = coords[2 * idx + 1];
            let xx = (x + 1.0) / 2.0 * height as f32;
            let yy = (y + 1.0) / 2.0 * width as f32;

            // Gradient of the loss w.r.t. this point's normalized source
            // coordinates, accumulated over channels and neighbors.
            let mut xs_diff = 0.0f32;
            let mut ys_diff = 0.0f32;

            for c in 0..dims.channels {
                let plane_base = c * plane;
                let upstream = grad_output[plane_base + idx];

                for i in xx.floor() as i64..=xx.ceil() as i64 {
                    for j in yy.floor() as i64..=yy.ceil() as i64 {
                        if i < 0 || j < 0 || i >= height as i64 || j >= width as i64 {
                            continue;
                        }
                        let dx = xx - i as f32;
                        let dy = yy - j as f32;
                        let wx = (1.0 - dx.abs()).max(0.0);
                        let wy = (1.0 - dy.abs()).max(0.0);
                        let pixel = plane_base + i as usize * width + j as usize;

                        grad_input[pixel] += wx * wy * upstream;

                        // d/dxx of max(0, 1-|xx-i|): +1 below the neighbor,
                        // -1 above it, 0 outside its support.
                        let source = input[pixel];
                        if dx.abs() < 1.0 {
                            let direction_x = if dx <= 0.0 { 1.0 } else { -1.0 };
                            xs_diff += direction_x * wy * source * upstream * half_height;
                        }
                        if dy.abs() < 1.0 {
                            let direction_y = if dy <= 0.0 { 1.0 } else { -1.0 };
                            ys_diff += direction_y * wx * source * upstream * half_width;
                        }
                    }
                }
            }

            // Chain through the static grid: x_in = t00*gx + t01*gy + t02,
            // y_in = t10*gx + t11*gy + t12, with (gx, gy) the normalized
            // coordinates of this output pixel.
            grad_theta[0] += xs_diff * norm_h;
            grad_theta[1] += xs_diff * norm_w;
            grad_theta[2] += xs_diff;
            grad_theta[3] += ys_diff * norm_h;
            grad_theta[4] += ys_diff * norm_w;
            grad_theta[5] += ys_diff;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstn_core::{transform_grid, AffineParams, SamplingGrid, TransformError};

    fn coords_for(theta: &AffineParams, height: usize, width: usize) -> SourceCoordinates {
        transform_grid(&SamplingGrid::generate(height, width), theta)
    }

    #[test]
    fn test_identity_passes_gradient_through() {
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let upstream: Vec<f32> = (0..16).map(|v| (v as f32) * 0.5).collect();
        let coords = coords_for(&AffineParams::identity(1), 4, 4);

        let grads = bilinear_backward(&upstream, &input, &coords, &dims).unwrap();

        // With exactly integer source coordinates, each output pixel reads
        // exactly one input pixel with weight one.
        assert_eq!(grads.input, upstream);
    }

    #[test]
    fn test_gradient_accumulates_over_overlapping_reads() {
        // Both output points sample the same input region: contributions
        // to the shared pixels must add up, not overwrite.
        let dims = FeatureMapDims::new(1, 1, 1, 2);
        let input = vec![1.0, 5.0];
        let upstream = vec![1.0, 1.0];
        // Collapse every output point onto y = 0 (pixel column 1).
        let theta = AffineParams::from_vec(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let coords = coords_for(&theta, 1, 2);

        let grads = bilinear_backward(&upstream, &input, &coords, &dims).unwrap();

        // Each of the two output points lands on column 1 with weight 1.
        assert_eq!(grads.input[1], 2.0);
        assert_eq!(grads.input[0], 0.0);
    }

    #[test]
    fn test_theta_gradient_accumulates_over_points() {
        // A row-ramp image sampled strictly in the interior: dL/dx is the
        // same at every output point, so the x-translation entry of dtheta
        // is (number of points) times one point's contribution.
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let input: Vec<f32> = (0..16).map(|v| (v / 4) as f32).collect();
        let upstream = vec![1.0; 16];

        // Contraction keeps every source point away from the image border.
        let theta = AffineParams::from_vec(vec![0.5, 0.0, 0.1, 0.0, 0.5, 0.1]).unwrap();
        let coords = coords_for(&theta, 4, 4);

        let grads = bilinear_backward(&upstream, &input, &coords, &dims).unwrap();

        // dV/dxx = 1 per point (the ramp slope), times dxx/dx = H/2 = 2,
        // summed over all 16 output points. A last-point-wins overwrite
        // would leave only 2.
        assert!(
            (grads.theta[2] - 32.0).abs() < 1e-3,
            "x-translation gradient {} did not accumulate",
            grads.theta[2]
        );
        // The ramp is constant across columns, so no y-translation gradient.
        assert!(grads.theta[5].abs() < 1e-3);
    }

    #[test]
    fn test_out_of_range_points_produce_no_gradient() {
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let input = vec![1.0; 16];
        let upstream = vec![1.0; 16];
        let theta = AffineParams::from_vec(vec![1.0, 0.0, 3.0, 0.0, 1.0, 0.0]).unwrap();
        let coords = coords_for(&theta, 4, 4);

        let grads = bilinear_backward(&upstream, &input, &coords, &dims).unwrap();

        assert!(grads.input.iter().all(|&v| v == 0.0));
        assert!(grads.theta.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_gradient_shapes() {
        let dims = FeatureMapDims::new(3, 2, 4, 5);
        let input = vec![0.5; dims.len()];
        let upstream = vec![1.0; dims.len()];
        let coords = coords_for(&AffineParams::identity(3), 4, 5);

        let grads = bilinear_backward(&upstream, &input, &coords, &dims).unwrap();

        assert_eq!(grads.input.len(), dims.len());
        assert_eq!(grads.theta.len(), 3 * THETA_PARAMS_PER_SAMPLE);
    }

    #[test]
    fn test_mismatched_upstream_rejected() {
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let input = vec![0.0; 16];
        let coords = coords_for(&AffineParams::identity(1), 4, 4);

        let result = bilinear_backward(&[0.0; 12], &input, &coords, &dims);
        assert!(matches!(result, Err(TransformError::DimensionMismatch(_))));
    }
}
