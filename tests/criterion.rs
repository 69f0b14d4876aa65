mod common;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use common::{device, image_tensor, small_model, TestBackend, TrainBackend};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vqvae::{Criterion, LossTerms, VqVae};

fn losses_for<B: Backend>(model: &VqVae<B>, images: Tensor<B, 4>, beta: f32) -> LossTerms<B> {
    let output = model.forward(images.clone()).expect("forward");
    Criterion::new(beta)
        .compute(
            images,
            output.latent,
            output.quantized,
            output.reconstruction,
        )
        .expect("criterion")
}

fn grad_magnitude<const D: usize>(
    param: Tensor<TrainBackend, D>,
    grads: &<TrainBackend as burn::tensor::backend::AutodiffBackend>::Gradients,
) -> f32 {
    param
        .grad(grads)
        .map(|grad| grad.abs().sum().into_scalar())
        .unwrap_or(0.0)
}

#[test]
fn total_is_weighted_sum_of_terms() {
    let device = device();
    let mut rng = StdRng::seed_from_u64(8);
    let model = VqVae::<TestBackend>::new(&small_model(3), &mut rng, &device);
    let images = image_tensor::<TestBackend>(2, 3, 1, &device);

    for beta in [0.0f32, 1.0, 5.0] {
        let values = losses_for(&model, images.clone(), beta).values();
        let expected = (values.reconstruction as f32 + values.vq as f32)
            + beta * values.commitment as f32;
        let diff = (values.total as f32 - expected).abs();
        assert!(
            diff <= 1e-6 * expected.abs().max(1.0),
            "beta {beta}: total {} vs {expected}",
            values.total
        );
        assert!(values.reconstruction > 0.0);
        assert_eq!(values.vq, values.commitment);
    }
}

#[test]
fn commitment_gradient_stops_at_the_encoder() {
    let device = device();
    let mut rng = StdRng::seed_from_u64(4);
    let model = VqVae::<TrainBackend>::new(&small_model(1), &mut rng, &device);
    let images = image_tensor::<TrainBackend>(2, 1, 2, &device);

    let terms = losses_for(&model, images, 1.0);
    let grads = terms.commitment.backward();

    let codebook = model.vector_quantizer.codebook.embeddings.val();
    assert_eq!(grad_magnitude(codebook, &grads), 0.0);
    let encoder = model.encoder.pre_quantization.weight.val();
    assert!(grad_magnitude(encoder, &grads) > 0.0);
    let decoder = model.decoder.conv_1.weight.val();
    assert_eq!(grad_magnitude(decoder, &grads), 0.0);
}

#[test]
fn codebook_gradient_stops_at_the_codebook() {
    let device = device();
    let mut rng = StdRng::seed_from_u64(4);
    let model = VqVae::<TrainBackend>::new(&small_model(1), &mut rng, &device);
    let images = image_tensor::<TrainBackend>(2, 1, 2, &device);

    let terms = losses_for(&model, images, 1.0);
    let grads = terms.vq.backward();

    let codebook = model.vector_quantizer.codebook.embeddings.val();
    assert!(grad_magnitude(codebook, &grads) > 0.0);
    let encoder = model.encoder.pre_quantization.weight.val();
    assert_eq!(grad_magnitude(encoder, &grads), 0.0);
    let first_conv = model.encoder.conv_1.weight.val();
    assert_eq!(grad_magnitude(first_conv, &grads), 0.0);
}

#[test]
fn reconstruction_gradient_reaches_encoder_through_quantizer() {
    let device = device();
    let mut rng = StdRng::seed_from_u64(6);
    let model = VqVae::<TrainBackend>::new(&small_model(1), &mut rng, &device);
    let images = image_tensor::<TrainBackend>(2, 1, 3, &device);

    let terms = losses_for(&model, images, 1.0);
    let grads = terms.reconstruction.backward();

    let encoder = model.encoder.pre_quantization.weight.val();
    assert!(grad_magnitude(encoder, &grads) > 0.0);
    let codebook = model.vector_quantizer.codebook.embeddings.val();
    assert_eq!(grad_magnitude(codebook, &grads), 0.0);
}
