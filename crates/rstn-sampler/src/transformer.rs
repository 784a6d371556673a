//! The spatial transformer component.
//!
//! Owns the static sampling grid for the configured output dimensions and
//! the source coordinates saved by the last forward call, and drives the
//! resampling kernels over burn tensors. Hosts that bind the kernels
//! directly can use [`bilinear_forward`](crate::bilinear_forward) and
//! [`bilinear_backward`](crate::bilinear_backward) instead.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use rstn_core::{
    transform_grid, AffineParams, Result, SamplingGrid, SourceCoordinates, TransformError,
    THETA_PARAMS_PER_SAMPLE,
};

use crate::gradient::bilinear_backward;
use crate::resampler::{bilinear_forward, FeatureMapDims};

/// Configuration for [`SpatialTransformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialTransformerConfig {
    /// Output height; currently equal to the input height.
    pub output_height: usize,
    /// Output width; currently equal to the input width.
    pub output_width: usize,
}

impl SpatialTransformerConfig {
    /// Create a new configuration.
    pub fn new(output_height: usize, output_width: usize) -> Self {
        Self {
            output_height,
            output_width,
        }
    }

    /// Initialize the transformer, building the sampling grid once.
    pub fn init<B: Backend>(&self) -> Result<SpatialTransformer<B>> {
        if self.output_height == 0 || self.output_width == 0 {
            return Err(TransformError::invalid_configuration(format!(
                "output dimensions must be nonzero, got {}x{}",
                self.output_height, self.output_width
            )));
        }
        let grid = SamplingGrid::generate(self.output_height, self.output_width);
        tracing::debug!(
            "Initialized spatial transformer: output {}x{}, {} grid points",
            self.output_height,
            self.output_width,
            grid.point_count()
        );
        Ok(SpatialTransformer {
            grid,
            coords: None,
            phantom: PhantomData,
        })
    }
}

/// Differentiable affine resampler over batched NCHW feature maps.
///
/// `forward` warps the input feature map by each sample's 2x3 affine
/// transform using bilinear interpolation; `backward` distributes an
/// upstream gradient into the input feature map and the affine parameters.
/// The source coordinates computed by `forward` are kept until the next
/// forward call, since `backward` needs the exact per-point coordinates
/// that produced its output.
pub struct SpatialTransformer<B: Backend> {
    grid: SamplingGrid,
    coords: Option<SourceCoordinates>,
    phantom: PhantomData<B>,
}

impl<B: Backend> SpatialTransformer<B> {
    /// Configured output height.
    pub fn output_height(&self) -> usize {
        self.grid.height()
    }

    /// Configured output width.
    pub fn output_width(&self) -> usize {
        self.grid.width()
    }

    /// Read-only view of the static sampling grid.
    pub fn grid(&self) -> &SamplingGrid {
        &self.grid
    }

    /// Source coordinates saved by the last forward call, if any.
    pub fn source_coordinates(&self) -> Option<&SourceCoordinates> {
        self.coords.as_ref()
    }

    /// Resample `input` under the per-sample transforms `theta`.
    ///
    /// # Arguments
    /// * `input` - Feature map of shape `[N, C, H, W]`
    /// * `theta` - Affine parameters of shape `[N, 6]`
    ///
    /// # Returns
    /// The resampled feature map, same shape as `input`, on its device.
    pub fn forward(&mut self, input: Tensor<B, 4>, theta: Tensor<B, 2>) -> Result<Tensor<B, 4>> {
        let device = input.device();
        let dims = self.feature_dims(&input)?;

        let params = AffineParams::from_tensor(&theta)?;
        if params.batch() != dims.batch {
            return Err(TransformError::ShapeMismatch {
                expected: vec![dims.batch, THETA_PARAMS_PER_SAMPLE],
                actual: vec![params.batch(), THETA_PARAMS_PER_SAMPLE],
            });
        }

        let input_data = tensor_to_vec(input);
        let coords = transform_grid(&self.grid, &params);
        let output = bilinear_forward(&input_data, &coords, &dims)?;
        self.coords = Some(coords);

        tracing::debug!(
            "Resampled {}x{} feature map ({} samples, {} channels)",
            dims.height,
            dims.width,
            dims.batch,
            dims.channels
        );

        Ok(Tensor::<B, 1>::from_data(
            TensorData::new(output, Shape::new([dims.len()])),
            &device,
        )
        .reshape([dims.batch, dims.channels, dims.height, dims.width]))
    }

    /// Distribute `grad_output` into the input feature map and the affine
    /// parameters, using the coordinates saved by the immediately
    /// preceding [`forward`](Self::forward) call on the same input.
    ///
    /// # Arguments
    /// * `input` - The feature map the forward call read from
    /// * `grad_output` - Upstream gradient, same shape as the forward output
    ///
    /// # Returns
    /// `(grad_input, grad_theta)` of shapes `[N, C, H, W]` and `[N, 6]`.
    pub fn backward(
        &self,
        input: Tensor<B, 4>,
        grad_output: Tensor<B, 4>,
    ) -> Result<(Tensor<B, 4>, Tensor<B, 2>)> {
        let device = grad_output.device();
        let dims = self.feature_dims(&input)?;

        let upstream_dims = grad_output.dims();
        if upstream_dims != input.dims() {
            return Err(TransformError::ShapeMismatch {
                expected: input.dims().to_vec(),
                actual: upstream_dims.to_vec(),
            });
        }

        let coords = self.coords.as_ref().ok_or_else(|| {
            TransformError::missing_forward_state(
                "backward requires the source coordinates of a preceding forward call",
            )
        })?;

        let grads = bilinear_backward(
            &tensor_to_vec(grad_output),
            &tensor_to_vec(input),
            coords,
            &dims,
        )?;

        let grad_input = Tensor::<B, 1>::from_data(
            TensorData::new(grads.input, Shape::new([dims.len()])),
            &device,
        )
        .reshape([dims.batch, dims.channels, dims.height, dims.width]);
        let grad_theta = Tensor::<B, 1>::from_data(
            TensorData::new(
                grads.theta,
                Shape::new([dims.batch * THETA_PARAMS_PER_SAMPLE]),
            ),
            &device,
        )
        .reshape([dims.batch, THETA_PARAMS_PER_SAMPLE]);

        Ok((grad_input, grad_theta))
    }

    fn feature_dims(&self, input: &Tensor<B, 4>) -> Result<FeatureMapDims> {
        let [batch, channels, height, width] = input.dims();
        if height != self.grid.height() || width != self.grid.width() {
            return Err(TransformError::ShapeMismatch {
                expected: vec![batch, channels, self.grid.height(), self.grid.width()],
                actual: vec![batch, channels, height, width],
            });
        }
        Ok(FeatureMapDims::new(batch, channels, height, width))
    }
}

fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .expect("tensor data converted to f32")
}
