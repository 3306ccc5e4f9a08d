use briny_mlp::data::Targets;
use briny_mlp::layers::{
    softmax, Activation, ActivationLayer, Dense, Dropout, Propagate, Regularization,
};
use briny_mlp::loss::{CategoricalCrossEntropy, LossFunction, SoftmaxCategoricalCrossEntropy};
use briny_mlp::rng::Generator;
use briny_mlp::tensors::{Matrix, TensorOps, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn close(a: &[f32], b: &[f32], tol: f32) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tol)
}

#[test]
fn test_dense_forward_formula() {
    let w = Matrix::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let b = Vector::from_vec(vec![0.5, -0.5, 1.0]);
    let mut layer = Dense::from_parameters(w, b, Regularization::default()).unwrap();
    let x = Matrix::from_vec(2, 2, vec![1.0, 1.0, 2.0, -1.0]).unwrap();

    layer.forward(x.view(), true).unwrap();
    assert_eq!(layer.output().shape(), &[2, 3]);
    assert_eq!(layer.output().data(), &[3.5, 6.5, 12.0, 0.5, 1.5, 5.0]);
}

#[test]
fn test_dense_backward_shapes_and_values() {
    let w = Matrix::from_vec(2, 3, vec![1.0, 0.0, -1.0, 2.0, 1.0, 0.0]).unwrap();
    let mut layer = Dense::from_parameters(w, Vector::zeros(2), Regularization::default()).unwrap();
    let x = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 0.0, 1.0, 0.0]).unwrap();
    let dv = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();

    layer.forward(x.view(), true).unwrap();
    layer.backward(x.view(), dv.view()).unwrap();

    // dW = dvᵗ · x, db = column sums of dv, dx = dv · W
    assert_eq!(layer.dweights().data(), &[1.0, 2.0, 3.0, 0.0, 1.0, 0.0]);
    assert_eq!(layer.dbiases().data(), &[1.0, 1.0]);
    assert_eq!(layer.dinputs().data(), &[1.0, 0.0, -1.0, 2.0, 1.0, 0.0]);
}

#[test]
fn test_softmax_is_stable_for_large_logits() {
    let z = Matrix::from_vec(2, 3, vec![1000.0, 1001.0, 1002.0, -1000.0, 0.0, 1000.0]).unwrap();
    let mut p = Matrix::default();
    softmax(z.view(), &mut p);
    for r in 0..2 {
        let row = p.row(r);
        assert!(row.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }
    assert!(p[(0, 2)] > p[(0, 1)] && p[(0, 1)] > p[(0, 0)]);
    assert!((p[(1, 2)] - 1.0).abs() < 1e-6);
}

#[test]
fn test_fused_gradient_matches_composed_chain() {
    let z = Matrix::from_vec(3, 4, vec![
        0.2, -1.0, 0.5, 1.5, //
        -0.3, 0.8, 0.1, -2.0, //
        1.0, 1.0, 1.0, 1.0,
    ])
    .unwrap();
    let classes = [3usize, 1, 0];
    let targets = Targets::Sparse(&classes);

    let mut fused = SoftmaxCategoricalCrossEntropy::default();
    fused.forward(z.view(), &targets).unwrap();
    fused.backward(z.view(), &targets).unwrap();

    let mut act = ActivationLayer::new(Activation::Softmax);
    act.forward(z.view(), false).unwrap();
    let mut ce = CategoricalCrossEntropy::default();
    ce.forward(act.output().view(), &targets).unwrap();
    ce.backward(act.output().view(), &targets).unwrap();
    act.backward(z.view(), ce.dinputs().view()).unwrap();

    assert!(close(fused.dinputs().data(), act.dinputs().data(), 1e-5));
    assert!((fused.mean() - ce.mean()).abs() < 1e-5);
}

#[test]
fn test_fused_gradient_matches_composed_chain_on_random_batches() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..10 {
        let rows = rng.random_range(1..6);
        let cols = rng.random_range(2..7);
        let z = Matrix::generate(rows, cols, || rng.random_range(-4.0..4.0));
        let classes: Vec<usize> = (0..rows).map(|_| rng.random_range(0..cols)).collect();
        let targets = Targets::Sparse(&classes);

        let mut fused = SoftmaxCategoricalCrossEntropy::default();
        fused.forward(z.view(), &targets).unwrap();
        fused.backward(z.view(), &targets).unwrap();

        let mut act = ActivationLayer::new(Activation::Softmax);
        act.forward(z.view(), true).unwrap();
        let mut ce = CategoricalCrossEntropy::default();
        ce.backward(act.output().view(), &targets).unwrap();
        act.backward(z.view(), ce.dinputs().view()).unwrap();

        assert!(close(fused.dinputs().data(), act.dinputs().data(), 1e-5));
    }
}

#[test]
fn test_categorical_backward_is_finite_on_saturated_predictions() {
    let p = Matrix::from_vec(2, 3, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
    let classes = [0usize, 0];
    let mut ce = CategoricalCrossEntropy::default();
    ce.forward(p.view(), &Targets::Sparse(&classes)).unwrap();
    ce.backward(p.view(), &Targets::Sparse(&classes)).unwrap();
    assert!(ce.sample_losses().data().iter().all(|l| l.is_finite()));
    assert!(ce.dinputs().data().iter().all(|g| g.is_finite()));
    assert!(ce.sample_losses()[0] > ce.sample_losses()[1]);
}

#[test]
fn test_dropout_rate_and_expected_value() {
    let rate = 0.3;
    let mut layer = Dropout::new(rate, Generator::seeded(21)).unwrap();
    let x = Matrix::generate(200, 50, || 1.0);

    layer.forward(x.view(), true).unwrap();
    let out = layer.output().data();
    let zeros = out.iter().filter(|v| **v == 0.0).count() as f32 / out.len() as f32;
    let mean = out.iter().sum::<f32>() / out.len() as f32;
    assert!((zeros - rate).abs() < 0.03, "zero fraction {zeros}");
    assert!((mean - 1.0).abs() < 0.05, "mean {mean}");

    layer.forward(x.view(), false).unwrap();
    assert_eq!(layer.output().data(), x.data());
}

#[test]
fn test_relu_and_sigmoid_gradients() {
    let x = Matrix::from_vec(1, 3, vec![-1.0, 0.0, 2.0]).unwrap();
    let ones = Matrix::from_vec(1, 3, vec![1.0, 1.0, 1.0]).unwrap();

    let mut relu = ActivationLayer::new(Activation::Relu);
    relu.forward(x.view(), true).unwrap();
    relu.backward(x.view(), ones.view()).unwrap();
    assert_eq!(relu.output().data(), &[0.0, 0.0, 2.0]);
    assert_eq!(relu.dinputs().data(), &[0.0, 0.0, 1.0]);

    let mut sigmoid = ActivationLayer::new(Activation::Sigmoid);
    sigmoid.forward(x.view(), true).unwrap();
    sigmoid.backward(x.view(), ones.view()).unwrap();
    assert!((sigmoid.output()[(0, 1)] - 0.5).abs() < 1e-6);
    assert!((sigmoid.dinputs()[(0, 1)] - 0.25).abs() < 1e-6);
}

#[test]
fn test_dense_save_load_round_trip() {
    let mut g = Generator::seeded(5);
    let original = Dense::new(4, 3, Default::default(), Regularization::default(), &mut g).unwrap();
    let mut restored = Dense::new(4, 3, Default::default(), Regularization::default(), &mut g).unwrap();

    let mut bytes = Vec::new();
    original.save(&mut bytes).unwrap();
    assert_eq!(bytes.len(), (4 * 3 + 3) * 4);
    restored.load(&mut bytes.as_slice()).unwrap();

    let x = Matrix::from_vec(2, 4, vec![0.1, 0.2, 0.3, 0.4, -1.0, 0.0, 1.0, 2.0]).unwrap();
    let mut a = original.clone();
    a.forward(x.view(), false).unwrap();
    restored.forward(x.view(), false).unwrap();
    assert_eq!(a.output(), restored.output());
}
