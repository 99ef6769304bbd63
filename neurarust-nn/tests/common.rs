use neurarust_nn::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;

// Each test crate uses a different subset of these helpers.
#[allow(dead_code)]
pub(crate) fn create_test_tensor(data: Vec<f64>, shape: Vec<usize>) -> Tensor<f64> {
    Tensor::new(data, shape).expect("Test tensor creation failed")
}

#[allow(dead_code)]
pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A `[rows, cols]` tensor of standard-normal draws.
#[allow(dead_code)]
pub(crate) fn random_tensor(shape: &[usize], seed: u64) -> Tensor<f64> {
    let mut t = Tensor::zeros(shape);
    neurarust_nn::init::normal_(&mut t, &mut rng(seed));
    t
}
