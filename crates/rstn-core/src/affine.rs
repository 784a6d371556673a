//! Affine parameters and the grid-to-source-coordinate mapping.
//!
//! Each sample carries a 2x3 affine matrix mapping homogeneous output
//! coordinates to input coordinates. Applying the matrices to the static
//! sampling grid yields the per-sample source coordinates the resampler
//! reads from.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::error::{Result, TransformError};
use crate::grid::SamplingGrid;

/// Number of affine parameters per sample (a 2x3 matrix).
pub const THETA_PARAMS_PER_SAMPLE: usize = 6;

/// Per-sample 2x3 affine parameters, packed as `[N * 6]`.
///
/// Row-major per sample, `[t00, t01, t02, t10, t11, t12]`, mapping
/// homogeneous output coordinates to input coordinates:
/// `x_in = t00*x + t01*y + t02`, `y_in = t10*x + t11*y + t12`.
///
/// The 6-per-sample contract is validated at construction, before any
/// kernel buffer is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineParams {
    batch: usize,
    data: Vec<f32>,
}

impl AffineParams {
    /// Wrap a packed parameter vector, validating the 6-per-sample contract.
    pub fn from_vec(data: Vec<f32>) -> Result<Self> {
        if data.is_empty() || data.len() % THETA_PARAMS_PER_SAMPLE != 0 {
            return Err(TransformError::affine_params(format!(
                "theta must hold {} parameters per sample, got {} values",
                THETA_PARAMS_PER_SAMPLE,
                data.len()
            )));
        }
        let batch = data.len() / THETA_PARAMS_PER_SAMPLE;
        Ok(Self { batch, data })
    }

    /// Extract parameters from an `[N, 6]` tensor.
    pub fn from_tensor<B: Backend>(theta: &Tensor<B, 2>) -> Result<Self> {
        let [batch, params] = theta.dims();
        if params != THETA_PARAMS_PER_SAMPLE {
            return Err(TransformError::affine_params(format!(
                "theta must be [N, {THETA_PARAMS_PER_SAMPLE}], got [{batch}, {params}]"
            )));
        }
        let data = theta
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .expect("theta data converted to f32");
        Ok(Self { batch, data })
    }

    /// Identity parameters for a batch of `batch` samples.
    pub fn identity(batch: usize) -> Self {
        let mut data = Vec::with_capacity(batch * THETA_PARAMS_PER_SAMPLE);
        for _ in 0..batch {
            data.extend_from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        }
        Self { batch, data }
    }

    /// Number of samples.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Read-only view of the packed parameters.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The six parameters of sample `n`.
    pub fn sample(&self, n: usize) -> &[f32] {
        let base = n * THETA_PARAMS_PER_SAMPLE;
        &self.data[base..base + THETA_PARAMS_PER_SAMPLE]
    }
}

/// Per-sample source coordinates in the input's normalized space.
///
/// Packed `[N * point_count * 2]`, `(x, y)` pairs in output-pixel order.
/// Values are unconstrained reals: points mapped outside the input are a
/// defined numeric case for the resampler, not an error. Recomputed every
/// forward call and persisted for the paired backward call.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCoordinates {
    batch: usize,
    point_count: usize,
    data: Vec<f32>,
}

impl SourceCoordinates {
    /// Number of samples.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of output points per sample.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Read-only view of the packed `(x, y)` pairs.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Coordinates of sample `n`, packed `(x, y)` per output point.
    pub fn sample(&self, n: usize) -> &[f32] {
        let stride = self.point_count * 2;
        &self.data[n * stride..(n + 1) * stride]
    }

    /// Upload the coordinates as an `[N, point_count, 2]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        Tensor::<B, 1>::from_data(
            TensorData::new(self.data.clone(), Shape::new([self.data.len()])),
            device,
        )
        .reshape([self.batch, self.point_count, 2])
    }
}

/// Apply each sample's affine parameters to the static grid.
///
/// For sample `n` and output point `i` with grid entry `(gx, gy, 1)`,
/// the source coordinates are the `(H*W x 3) x (3 x 2)` matrix product
/// `grid * theta_n^T`.
pub fn transform_grid(grid: &SamplingGrid, theta: &AffineParams) -> SourceCoordinates {
    let point_count = grid.point_count();
    let mut data = vec![0.0f32; theta.batch() * point_count * 2];

    for (n, coords) in data.chunks_mut(point_count * 2).enumerate() {
        let t = theta.sample(n);
        for i in 0..point_count {
            let p = grid.point(i);
            coords[2 * i] = t[0] * p[0] + t[1] * p[1] + t[2] * p[2];
            coords[2 * i + 1] = t[3] * p[0] + t[4] * p[1] + t[5] * p[2];
        }
    }

    SourceCoordinates {
        batch: theta.batch(),
        point_count,
        data,
    }
}
