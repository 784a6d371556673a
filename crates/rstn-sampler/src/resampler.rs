//! Bilinear resampling forward pass.
//!
//! Reads the input feature map at the (possibly fractional) source
//! coordinates and writes the output feature map. Neighbors falling outside
//! the input are zero-padding: they contribute nothing and are never read.

use rayon::prelude::*;

use rstn_core::{Result, SourceCoordinates, TransformError};

/// Shape of a batched NCHW feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMapDims {
    /// Number of samples.
    pub batch: usize,
    /// Number of channels per sample.
    pub channels: usize,
    /// Rows per channel plane.
    pub height: usize,
    /// Columns per channel plane.
    pub width: usize,
}

impl FeatureMapDims {
    /// Create a new shape descriptor.
    pub fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Whether the map holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per sample.
    pub fn sample_stride(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Pixels per channel plane.
    pub fn point_count(&self) -> usize {
        self.height * self.width
    }

    pub(crate) fn validate(
        &self,
        label: &str,
        buffer: &[f32],
        coords: &SourceCoordinates,
    ) -> Result<()> {
        if self.is_empty() {
            return Err(TransformError::invalid_configuration(format!(
                "feature map dimensions must be nonzero, got {:?}",
                self
            )));
        }
        if buffer.len() != self.len() {
            return Err(TransformError::dimension_mismatch(format!(
                "{label} buffer holds {} elements, {:?} requires {}",
                buffer.len(),
                self,
                self.len()
            )));
        }
        if coords.batch() != self.batch || coords.point_count() != self.point_count() {
            return Err(TransformError::ShapeMismatch {
                expected: vec![self.batch, self.point_count()],
                actual: vec![coords.batch(), coords.point_count()],
            });
        }
        Ok(())
    }
}

/// Resample `input` at `coords`, producing the output feature map.
///
/// Cost is O(N*C*H*W*4). Deterministic: the sample loop runs in parallel,
/// but each sample writes only its own output chunk in a fixed order, so
/// repeated calls with identical inputs are bit-identical.
pub fn bilinear_forward(
    input: &[f32],
    coords: &SourceCoordinates,
    dims: &FeatureMapDims,
) -> Result<Vec<f32>> {
    dims.validate("input", input, coords)?;

    let stride = dims.sample_stride();
    let mut output = vec![0.0f32; dims.len()];

    output
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(n, out_sample)| {
            let in_sample = &input[n * stride..(n + 1) * stride];
            resample_sample(in_sample, coords.sample(n), dims, out_sample);
        });

    Ok(output)
}

fn resample_sample(
    input: &[f32],
    coords: &[f32],
    dims: &FeatureMapDims,
    output: &mut [f32],
) {
    let height = dims.height;
    let width = dims.width;
    let plane = dims.point_count();

    for c in 0..dims.channels {
        let in_plane = &input[c * plane..(c + 1) * plane];
        let out_plane = &mut output[c * plane..(c + 1) * plane];

        for idx in 0..plane {
            let x = coords[2 * idx];
            let y = coords[2 * idx + 1];
            // Map normalized [-1, 1] coordinates to pixel space.
            let xx = (x + 1.0) / 2.0 * height as f32;
            let yy = (y + 1.0) / 2.0 * width as f32;

            let mut acc = 0.0f32;
            for i in xx.floor() as i64..=xx.ceil() as i64 {
                for j in yy.floor() as i64..=yy.ceil() as i64 {
                    if i < 0 || j < 0 || i >= height as i64 || j >= width as i64 {
                        continue;
                    }
                    let wx = (1.0 - (xx - i as f32).abs()).max(0.0);
                    let wy = (1.0 - (yy - j as f32).abs()).max(0.0);
                    acc += wx * wy * in_plane[i as usize * width + j as usize];
                }
            }
            out_plane[idx] = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstn_core::{transform_grid, AffineParams, SamplingGrid};

    fn identity_coords(height: usize, width: usize, batch: usize) -> SourceCoordinates {
        let grid = SamplingGrid::generate(height, width);
        transform_grid(&grid, &AffineParams::identity(batch))
    }

    #[test]
    fn test_identity_reproduces_input() {
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let coords = identity_coords(4, 4, 1);

        let output = bilinear_forward(&input, &coords, &dims).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_identity_reproduces_all_channels() {
        let dims = FeatureMapDims::new(2, 3, 4, 4);
        let input: Vec<f32> = (0..dims.len()).map(|v| (v as f32).sin()).collect();
        let coords = identity_coords(4, 4, 2);

        let output = bilinear_forward(&input, &coords, &dims).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_out_of_range_contributes_zero() {
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let input = vec![1.0f32; 16];
        // Shift x by +3 in normalized space: every source point lands
        // beyond the bottom edge of the input.
        let grid = SamplingGrid::generate(4, 4);
        let theta = AffineParams::from_vec(vec![1.0, 0.0, 3.0, 0.0, 1.0, 0.0]).unwrap();
        let coords = transform_grid(&grid, &theta);

        let output = bilinear_forward(&input, &coords, &dims).unwrap();
        assert!(output.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_half_pixel_shift_averages_neighbors() {
        // One column of a 1x4 map; shift y by half a pixel.
        let dims = FeatureMapDims::new(1, 1, 1, 4);
        let input = vec![0.0, 2.0, 4.0, 6.0];
        // y shift of 1/W in normalized space is half a pixel: yy = c + 0.5.
        let grid = SamplingGrid::generate(1, 4);
        let theta = AffineParams::from_vec(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.25]).unwrap();
        let coords = transform_grid(&grid, &theta);

        let output = bilinear_forward(&input, &coords, &dims).unwrap();
        // Interior points average adjacent pixels; the last point has only
        // its left neighbor in range.
        assert_eq!(output[0], 1.0);
        assert_eq!(output[1], 3.0);
        assert_eq!(output[2], 5.0);
        assert_eq!(output[3], 3.0);
    }

    #[test]
    fn test_buffer_length_is_validated() {
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let coords = identity_coords(4, 4, 1);
        let result = bilinear_forward(&[0.0; 15], &coords, &dims);
        assert!(matches!(result, Err(TransformError::DimensionMismatch(_))));
    }

    #[test]
    fn test_coordinate_shape_is_validated() {
        let dims = FeatureMapDims::new(1, 1, 4, 4);
        let coords = identity_coords(3, 3, 1);
        let result = bilinear_forward(&[0.0; 16], &coords, &dims);
        assert!(matches!(result, Err(TransformError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_zero_dims_rejected() {
        let dims = FeatureMapDims::new(1, 0, 4, 4);
        let coords = identity_coords(4, 4, 1);
        let result = bilinear_forward(&[], &coords, &dims);
        assert!(matches!(
            result,
            Err(TransformError::InvalidConfiguration(_))
        ));
    }
}
