use ndarray::{array, Array1, Array3};
use crate::activations::Activation;
use crate::layers::*;

#[test]
fn test_dense_layer_creation() {
    let layer = DenseLayer::new(4, 3, Activation::Relu).unwrap();
    assert_eq!(layer.weights.shape(), &[3, 4]);
    assert_eq!(layer.biases.len(), 3);
    assert_eq!(layer.input_shape(), LayerShape::Flat(4));
    assert_eq!(layer.output_size(), 3);
    assert_eq!(layer.parameter_count(), 15);
}

#[test]
fn test_dense_layer_limits() {
    assert!(DenseLayer::new(0, 3, Activation::Relu).unwrap_err().is_invalid_argument());
    assert!(DenseLayer::new(3, 0, Activation::Relu).is_err());
    assert!(DenseLayer::new(3, dense::MAX_NEURONS + 1, Activation::Relu).is_err());
    assert!(DenseLayer::new(1, dense::MAX_NEURONS, Activation::Linear).is_ok());
}

#[test]
fn test_dense_forward_backward() {
    let mut layer = DenseLayer::new(2, 1, Activation::Linear)
        .unwrap()
        .with_weights(array![[1.0, 2.0]])
        .unwrap()
        .with_biases(array![0.5])
        .unwrap();

    let output = layer.forward(array![1.0, 1.0].view()).unwrap();
    assert_eq!(output, array![3.5]);

    let input_grad = layer.backward(array![1.0].view()).unwrap();
    assert_eq!(input_grad, array![1.0, 2.0]);
    assert_eq!(layer.weight_gradients(), &array![[1.0, 1.0]]);
    assert_eq!(layer.bias_gradients(), &array![1.0]);

    layer.update_weights(0.5);
    assert_eq!(layer.weights, array![[0.5, 1.5]]);
    assert_eq!(layer.biases, array![0.0]);
    assert_eq!(layer.weight_gradients(), &array![[0.0, 0.0]]);
}

#[test]
fn test_dense_rejects_wrong_input() {
    let mut layer = DenseLayer::new(3, 2, Activation::Sigmoid).unwrap();
    let err = layer.forward(array![1.0, 2.0].view()).unwrap_err();
    assert!(matches!(err, crate::LearningError::DimensionMismatch { .. }));
    assert!(layer.forward(Array1::<f32>::zeros(0).view()).unwrap_err().is_invalid_argument());
}

#[test]
fn test_backward_before_forward_is_illegal_state() {
    let mut dense = DenseLayer::new(2, 2, Activation::Tanh).unwrap();
    assert!(dense.backward(array![1.0, 1.0].view()).unwrap_err().is_illegal_state());

    let mut lstm = LstmLayer::new(2, 3).unwrap();
    assert!(lstm.backward(array![1.0, 1.0, 1.0].view()).unwrap_err().is_illegal_state());

    let mut dropout = DropoutLayer::new(2, 0.5).unwrap();
    assert!(dropout.backward(array![1.0, 1.0].view()).unwrap_err().is_illegal_state());
}

#[test]
fn test_conv_output_sizes() {
    let same = Conv2DLayer::new((32, 32, 3), 8, 3, 1, 1).unwrap();
    assert_eq!(same.output_dims(), (32, 32, 8));

    let valid = Conv2DLayer::new((32, 32, 3), 8, 3, 1, 0).unwrap();
    assert_eq!(valid.output_dims(), (30, 30, 8));

    let strided = Conv2DLayer::new((32, 32, 3), 4, 3, 2, 1).unwrap();
    assert_eq!(strided.output_dims(), (16, 16, 4));

    assert_eq!(conv_output_size(5, 7, 1, 0), None);
    assert_eq!(conv_output_size(5, 3, 0, 0), None);
}

#[test]
fn test_conv_parameter_limits() {
    assert!(Conv2DLayer::new((8, 8, 1), 0, 3, 1, 0).is_err());
    assert!(Conv2DLayer::new((8, 8, 1), 513, 3, 1, 0).is_err());
    assert!(Conv2DLayer::new((8, 8, 1), 4, 8, 1, 0).is_err());
    assert!(Conv2DLayer::new((8, 8, 1), 4, 3, 6, 0).is_err());
    assert!(Conv2DLayer::new((2, 2, 1), 4, 3, 1, 0).is_err());
    assert!(Conv2DLayer::new((0, 8, 1), 4, 3, 1, 0).is_err());
}

#[test]
fn test_conv_forward_sums_window() {
    let mut conv = Conv2DLayer::new((3, 3, 1), 1, 3, 1, 0).unwrap();
    conv.kernels.fill(1.0);
    let input = Array3::from_shape_fn((3, 3, 1), |(y, x, _)| (y * 3 + x) as f32);
    let output = conv.forward_spatial(input.view()).unwrap();
    assert_eq!(output.dim(), (1, 1, 1));
    assert_eq!(output[[0, 0, 0]], 36.0);

    let grad = conv.backward_spatial(Array3::ones((1, 1, 1)).view()).unwrap();
    assert_eq!(grad, Array3::<f32>::ones((3, 3, 1)));
    assert_eq!(conv.kernel_gradients()[[0, 2, 2, 0]], 8.0);
}

#[test]
fn test_conv_flat_interface_matches_spatial() {
    let mut conv = Conv2DLayer::new((4, 4, 2), 3, 2, 2, 0).unwrap();
    let input = Array3::from_shape_fn((4, 4, 2), |(y, x, c)| (y + x + c) as f32 * 0.1);
    let spatial = conv.forward_spatial(input.view()).unwrap();
    let flat = conv.forward(flatten_spatial(&input).view()).unwrap();
    assert_eq!(flat, flatten_spatial(&spatial));
    assert_eq!(conv.output_shape(), LayerShape::spatial(2, 2, 3));
}

#[test]
fn test_maxpool_shapes() {
    let pool = MaxPool2DLayer::new((32, 32, 8), 2, 2).unwrap();
    assert_eq!(pool.output_dims(), (16, 16, 8));
    assert!(MaxPool2DLayer::new((4, 4, 1), 1, 1).is_err());
    assert!(MaxPool2DLayer::new((4, 4, 1), 2, 5).is_err());
    assert!(MaxPool2DLayer::new((1, 4, 1), 2, 1).is_err());
}

#[test]
fn test_flatten_layer_sizes() {
    let mut flatten = FlattenLayer::new((2, 3, 4));
    assert_eq!(flatten.input_size(), 24);
    assert_eq!(flatten.output_shape(), LayerShape::Flat(24));
    let out = flatten.forward(Array1::<f32>::ones(24).view()).unwrap();
    assert_eq!(out.len(), 24);
    assert!(flatten.forward(Array1::<f32>::ones(23).view()).is_err());
}

#[test]
fn test_lstm_state_carries_between_steps() {
    let mut lstm = LstmLayer::new(3, 4).unwrap();
    let x = array![0.5, -0.2, 0.9];

    let first = lstm.forward(x.view()).unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(lstm.hidden_state(), first);
    assert!(lstm.hidden_state().iter().all(|h| h.abs() < 1.0));

    let second = lstm.forward(x.view()).unwrap();
    assert_ne!(first, second);
    assert_eq!(lstm.cached_steps(), 2);

    lstm.reset_state();
    assert!(lstm.hidden_state().iter().all(|&h| h == 0.0));
    assert!(lstm.cell_state().iter().all(|&c| c == 0.0));
    assert_eq!(lstm.cached_steps(), 0);

    let again = lstm.forward(x.view()).unwrap();
    assert_eq!(again, first);
}

#[test]
fn test_lstm_initial_state() {
    let mut lstm = LstmLayer::new(2, 2).unwrap();
    lstm.set_initial_state(Some(array![0.3, -0.3].view()), None);
    assert_eq!(lstm.hidden_state(), array![0.3, -0.3]);
    // wrong length is ignored
    lstm.set_initial_state(None, Some(array![1.0].view()));
    assert_eq!(lstm.cell_state(), array![0.0, 0.0]);
}

#[test]
fn test_lstm_backward_through_time() {
    let mut lstm = LstmLayer::new(2, 3).unwrap();
    for _ in 0..3 {
        lstm.forward(array![0.1, 0.4].view()).unwrap();
    }
    for _ in 0..3 {
        let grad = lstm.backward(array![1.0, 0.0, -1.0].view()).unwrap();
        assert_eq!(grad.len(), 2);
        assert!(grad.iter().all(|g| g.is_finite()));
    }
    assert_eq!(lstm.cached_steps(), 0);
    assert!(lstm.backward(array![1.0, 0.0, -1.0].view()).is_err());
}

#[test]
fn test_gru_state_carries_and_resets() {
    let mut gru = GruLayer::new(2, 5).unwrap();
    let x = array![1.0, -1.0];
    let first = gru.forward(x.view()).unwrap();
    let second = gru.forward(x.view()).unwrap();
    assert_ne!(first, second);
    assert_eq!(gru.hidden_state(), second);

    gru.reset_state();
    assert!(gru.hidden_state().iter().all(|&h| h == 0.0));
    assert_eq!(gru.forward(x.view()).unwrap(), first);
    assert!(gru.is_recurrent());
}

#[test]
fn test_recurrent_cache_holds_exactly_max_steps() {
    let mut layers: Vec<Box<dyn NetworkLayer>> =
        vec![Box::new(LstmLayer::new(2, 3).unwrap()), Box::new(GruLayer::new(2, 3).unwrap())];
    for layer in layers.iter_mut() {
        for _ in 0..MAX_CACHED_STEPS {
            layer.forward(array![0.2, -0.1].view()).unwrap();
        }
        assert_eq!(layer.backprop_horizon(), Some(MAX_CACHED_STEPS));
        for _ in 0..MAX_CACHED_STEPS {
            let grad = layer.backward(array![0.1, 0.1, 0.1].view()).unwrap();
            assert!(grad.iter().all(|g| g.is_finite()));
        }
        assert_eq!(layer.backprop_horizon(), Some(0));
        assert!(layer.backward(array![0.1, 0.1, 0.1].view()).unwrap_err().is_illegal_state());
    }
}

#[test]
fn test_recurrent_cache_drops_oldest_steps() {
    let mut lstm = LstmLayer::new(1, 2).unwrap();
    let mut gru = GruLayer::new(1, 2).unwrap();
    for t in 0..MAX_CACHED_STEPS + 44 {
        lstm.forward(array![t as f32 * 0.01].view()).unwrap();
        gru.forward(array![t as f32 * 0.01].view()).unwrap();
    }
    assert_eq!(lstm.cached_steps(), MAX_CACHED_STEPS);
    assert_eq!(gru.cached_steps(), MAX_CACHED_STEPS);
    assert!(!DenseLayer::new(1, 1, Activation::Linear).unwrap().is_recurrent());
    assert_eq!(DenseLayer::new(1, 1, Activation::Linear).unwrap().backprop_horizon(), None);
}

#[test]
fn test_recurrent_limits() {
    assert!(LstmLayer::new(2, 0).is_err());
    assert!(LstmLayer::new(2, 1025).is_err());
    assert!(GruLayer::new(0, 4).is_err());
    assert!(GruLayer::new(3, 1024).is_ok());
}

#[test]
fn test_dropout_training_and_inference() {
    let mut dropout = DropoutLayer::new(1000, 0.5).unwrap();
    let input = Array1::<f32>::ones(1000);

    let trained = dropout.forward(input.view()).unwrap();
    assert!(trained.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
    let dropped = trained.iter().filter(|&&v| v == 0.0).count();
    assert!(dropped > 300 && dropped < 700);

    dropout.set_training(false);
    assert_eq!(dropout.forward(input.view()).unwrap(), input);
}

#[test]
fn test_dropout_rate_bounds() {
    assert!(DropoutLayer::new(4, 0.0).is_err());
    assert!(DropoutLayer::new(4, 1.0).is_err());
    assert!(DropoutLayer::new(4, f32::NAN).is_err());
    assert!(DropoutLayer::new(0, 0.5).is_err());
}

#[test]
fn test_batch_norm_normalizes_in_training() {
    let mut bn = BatchNormLayer::new(4).unwrap();
    let out = bn.forward(array![1.0, 2.0, 3.0, 4.0].view()).unwrap();
    assert!(out.sum().abs() < 1e-5);
    let var = out.mapv(|v| v * v).sum() / 4.0;
    assert!((var - 1.0).abs() < 1e-3);
    assert!(bn.running_mean.iter().all(|&m| (m - 0.25).abs() < 1e-6));
}

#[test]
fn test_batch_norm_inference_uses_running_stats() {
    let mut bn = BatchNormLayer::new(3).unwrap();
    bn.set_training(false);
    let input = array![0.5, -1.0, 2.0];
    let out = bn.forward(input.view()).unwrap();
    for (o, i) in out.iter().zip(input.iter()) {
        assert!((o - i).abs() < 1e-4);
    }
    let grad = bn.backward(array![1.0, 1.0, 1.0].view()).unwrap();
    assert_eq!(grad.len(), 3);
}

#[test]
fn test_boxed_layers_clone() {
    let layers: Vec<Box<dyn NetworkLayer>> = vec![
        Box::new(DenseLayer::new(3, 2, Activation::Relu).unwrap()),
        Box::new(GruLayer::new(2, 2).unwrap()),
    ];
    let copies = layers.clone();
    assert_eq!(copies[0].kind(), LayerKind::Dense);
    assert_eq!(copies[1].kind().name(), "GRU");
    assert_eq!(copies[0].parameter_count(), layers[0].parameter_count());
}
