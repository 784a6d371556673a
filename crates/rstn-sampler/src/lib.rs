pub mod gradient;
pub mod resampler;
pub mod transformer;

pub use gradient::{bilinear_backward, Gradients};
pub use resampler::{bilinear_forward, FeatureMapDims};
pub use transformer::{SpatialTransformer, SpatialTransformerConfig};
