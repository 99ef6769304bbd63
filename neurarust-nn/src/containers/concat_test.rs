use super::Concat;
use crate::layers::{Linear, Logistic, TanH};
use crate::module::{Container, Module};
use neurarust_tensor::{NeuraRustError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn pair(seed: u64) -> Result<(Linear<f64>, Linear<f64>), NeuraRustError> {
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((Linear::with_rng(3, 2, &mut rng)?, Linear::with_rng(3, 4, &mut rng)?))
}

#[test]
fn test_forward_concatenates_columns() -> Result<(), NeuraRustError> {
    let (a, b) = pair(1)?;
    let (mut ra, mut rb) = (a.clone(), b.clone());
    let mut concat = Concat::new().with(a)?.with(b)?;
    let x = Tensor::new(vec![1.0, -1.0, 0.5, 2.0, 0.0, 1.0], vec![2, 3])?;
    let y = concat.forward(&x)?.clone();
    assert_eq!(y.shape(), &[2, 6]);
    assert_eq!(y.narrow_cols(0, 2)?, *ra.forward(&x)?);
    assert_eq!(y.narrow_cols(2, 4)?, *rb.forward(&x)?);
    assert_eq!(concat.output_shape(), vec![6]);
    Ok(())
}

#[test]
fn test_backward_sums_component_gradients() -> Result<(), NeuraRustError> {
    let (a, b) = pair(2)?;
    let (mut ra, mut rb) = (a.clone(), b.clone());
    let mut concat = Concat::new().with(a)?.with(b)?;
    let x = Tensor::new(vec![1.0, -1.0, 0.5, 2.0, 0.0, 1.0], vec![2, 3])?;
    let g = Tensor::new((0..12).map(|v| v as f64 / 10.0).collect(), vec![2, 6])?;
    concat.forward(&x)?;
    let d = concat.backward(&x, &g)?.clone();

    ra.forward(&x)?;
    rb.forward(&x)?;
    let da = ra.backward(&x, &g.narrow_cols(0, 2)?)?.clone();
    let db = rb.backward(&x, &g.narrow_cols(2, 4)?)?.clone();
    assert!(d.all_close(&da.add(&db)?, 1e-12));
    Ok(())
}

#[test]
fn test_add_inherits_or_validates_input_shape() -> Result<(), NeuraRustError> {
    let mut concat = Concat::<f32>::new();
    concat.add(Box::new(Linear::new(5, 2)?))?;
    // Unset input shape: inherits [5]
    concat.add(Box::new(TanH::new()))?;
    assert_eq!(concat.components()[1].input_shape(), vec![5]);
    // Mismatching input shape
    assert!(matches!(
        concat.add(Box::new(Linear::new(4, 2)?)),
        Err(NeuraRustError::ShapeMismatch { .. })
    ));
    assert_eq!(concat.len(), 2);
    assert_eq!(concat.output_shape(), vec![7]);
    Ok(())
}

#[test]
fn test_set_outputs_is_a_usage_error() -> Result<(), NeuraRustError> {
    let mut concat = Concat::<f32>::new().with(Logistic::new())?;
    assert!(matches!(concat.set_outputs(&[3]), Err(NeuraRustError::UsageError(_))));
    Ok(())
}

#[test]
fn test_wrong_input_is_rejected_before_running() -> Result<(), NeuraRustError> {
    let mut concat = Concat::<f32>::new().with(Linear::new(3, 1)?)?;
    assert!(concat.forward(&Tensor::zeros(&[2, 4])).is_err());
    Ok(())
}
