//! Forward/backward demo on synthetic data.
//!
//! Warps a Gaussian blob by a rotation-and-scale affine transform, then
//! runs the backward pass with a uniform upstream gradient and reports the
//! parameter gradients.
//!
//! Usage:
//!   cargo run --example warp_demo

use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use rstn_sampler::SpatialTransformerConfig;

type Backend = NdArray<f32>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let device = Default::default();
    let size = 16;

    // Gaussian blob centered in the image.
    let center = size as f32 / 2.0;
    let sigma = 3.0f32;
    let mut data = Vec::with_capacity(size * size);
    for r in 0..size {
        for c in 0..size {
            let dr = r as f32 - center;
            let dc = c as f32 - center;
            data.push((-(dr * dr + dc * dc) / (2.0 * sigma * sigma)).exp());
        }
    }

    let input = Tensor::<Backend, 1>::from_floats(data.as_slice(), &device).reshape([
        1,
        1,
        size,
        size,
    ]);

    // Rotation by ~20 degrees composed with a mild zoom-out.
    let theta = Tensor::<Backend, 2>::from_floats(
        [[1.05, 0.38, 0.0, -0.38, 1.05, 0.0]],
        &device,
    );

    let mut transformer = SpatialTransformerConfig::new(size, size).init::<Backend>()?;

    let output = transformer.forward(input.clone(), theta)?;
    let input_sum = input.clone().sum().into_scalar();
    let output_sum = output.clone().sum().into_scalar();
    println!("input mass:  {input_sum:.4}");
    println!("output mass: {output_sum:.4}");

    let grad_output = output.ones_like();
    let (grad_input, grad_theta) = transformer.backward(input, grad_output)?;

    let grad_input_norm = grad_input.powf_scalar(2.0).sum().sqrt().into_scalar();
    println!("|grad_input|: {grad_input_norm:.4}");

    let theta_grads = grad_theta.into_data();
    println!(
        "grad_theta:   {:?}",
        theta_grads.as_slice::<f32>().unwrap()
    );

    Ok(())
}
