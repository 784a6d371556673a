pub mod affine;
pub mod error;
pub mod grid;

pub use affine::{transform_grid, AffineParams, SourceCoordinates, THETA_PARAMS_PER_SAMPLE};
pub use error::{Result, TransformError};
pub use grid::SamplingGrid;
