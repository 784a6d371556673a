//! Static sampling grid of normalized output coordinates.
//!
//! The grid is a pure function of the output spatial dimensions. It is
//! built once when those dimensions are known and shared read-only by
//! every forward and backward call until the configuration changes.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Static grid of homogeneous output coordinates.
///
/// Stores an `(x, y, 1)` triple for every output pixel in row-major order.
/// Both axes are normalized to [-1, 1): output row `r` maps to
/// `r / H * 2 - 1` and output column `c` to `c / W * 2 - 1`, so a transform
/// expressed over the grid is independent of absolute pixel dimensions.
///
/// # Examples
/// ```rust
/// use rstn_core::SamplingGrid;
///
/// let grid = SamplingGrid::generate(4, 4);
/// assert_eq!(grid.point_count(), 16);
/// assert_eq!(grid.point(0), [-1.0, -1.0, 1.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingGrid {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl SamplingGrid {
    /// Build the grid for the given output dimensions.
    ///
    /// Deterministic pure function of `(height, width)`; independent of the
    /// batch and of any transform parameters.
    pub fn generate(height: usize, width: usize) -> Self {
        let point_count = height * width;
        let mut data = Vec::with_capacity(point_count * 3);
        for r in 0..height {
            let x = r as f32 / height as f32 * 2.0 - 1.0;
            for c in 0..width {
                let y = c as f32 / width as f32 * 2.0 - 1.0;
                data.push(x);
                data.push(y);
                data.push(1.0);
            }
        }
        Self {
            height,
            width,
            data,
        }
    }

    /// Output height covered by the grid.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Output width covered by the grid.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of output pixels covered by the grid.
    pub fn point_count(&self) -> usize {
        self.height * self.width
    }

    /// Read-only view of the packed `(x, y, 1)` triples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The homogeneous coordinates of the output point at linear `index`.
    pub fn point(&self, index: usize) -> [f32; 3] {
        let base = index * 3;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }

    /// Upload the grid as a `[point_count, 3]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let point_count = self.point_count();
        Tensor::<B, 1>::from_data(
            TensorData::new(self.data.clone(), Shape::new([point_count * 3])),
            device,
        )
        .reshape([point_count, 3])
    }
}
