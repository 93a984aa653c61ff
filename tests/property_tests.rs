#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use adaptive_engine::activations::{softmax, Activation};
    use adaptive_engine::ensemble::{EnsembleModel, VotingEnsemble, VotingType};
    use adaptive_engine::layers::{conv_output_size, Conv2DLayer, DenseLayer, NetworkLayer, WeightInit};
    use adaptive_engine::network::{DeepNeuralNetwork, Model};
    use ndarray::{Array1, Array2};

    // Strategy for generating finite input vectors
    fn input_array_strategy(size: usize) -> impl Strategy<Value = Array1<f32>> {
        prop::collection::vec(-1000.0f32..1000.0, size).prop_map(Array1::from_vec)
    }

    fn weight_matrix_strategy(rows: usize, cols: usize) -> impl Strategy<Value = Array2<f32>> {
        prop::collection::vec(-10.0f32..10.0, rows * cols)
            .prop_map(move |flat| Array2::from_shape_vec((rows, cols), flat).unwrap())
    }

    fn classifier(inputs: usize, classes: usize) -> Box<dyn Model> {
        let mut network = DeepNeuralNetwork::new(inputs).unwrap();
        network.add_dense_layer(classes, Activation::Softmax);
        Box::new(network)
    }

    proptest! {
        #[test]
        fn test_deep_output_shape(
            sizes in prop::collection::vec(1usize..=32, 1..=4),
            input_size in 1usize..=16
        ) {
            let mut network = DeepNeuralNetwork::new(input_size).unwrap();
            for &size in &sizes {
                prop_assert!(network.add_dense_layer(size, Activation::Relu));
            }
            prop_assert!(network.activate());
            let output = network.forward(Array1::zeros(input_size).view()).unwrap();
            prop_assert_eq!(output.len(), *sizes.last().unwrap());
        }

        #[test]
        fn test_forward_outputs_are_finite(input in input_array_strategy(10)) {
            let mut network = DeepNeuralNetwork::new(10).unwrap();
            network.add_dense_layer(5, Activation::Relu);
            network.add_dense_layer(3, Activation::Sigmoid);
            network.activate();
            let output = network.forward(input.view()).unwrap();
            for &val in output.iter() {
                prop_assert!(val.is_finite(), "Output contains non-finite values");
            }
        }

        #[test]
        fn test_activation_bounded_outputs(input in prop::collection::vec(-100.0f32..100.0, 1..64)) {
            for &x in &input {
                let s = Activation::Sigmoid.activate(x);
                prop_assert!((0.0..=1.0).contains(&s), "Sigmoid out of bounds: {}", s);
                let t = Activation::Tanh.activate(x);
                prop_assert!((-1.0..=1.0).contains(&t), "Tanh out of bounds: {}", t);
                prop_assert!(Activation::Relu.activate(x) >= 0.0);
                let elu = Activation::Elu { alpha: 1.0 };
                prop_assert!(elu.activate(x) >= -1.0, "ELU below -alpha: {}", elu.activate(x));
            }
        }

        #[test]
        fn test_sigmoid_derivative_identity(x in -50.0f32..50.0) {
            let a = Activation::Sigmoid.activate(x);
            prop_assert!((Activation::Sigmoid.derivative(x) - a * (1.0 - a)).abs() < 1e-6);
        }

        #[test]
        fn test_softmax_is_distribution(input in prop::collection::vec(-500.0f32..500.0, 1..50)) {
            let out = softmax(Array1::from_vec(input).view());
            prop_assert!((out.sum() - 1.0).abs() < 1e-4);
            prop_assert!(out.iter().all(|&p| p > 0.0 && p <= 1.0));
        }

        #[test]
        fn test_weight_initialization_ranges(rows in 1usize..=50, cols in 1usize..=50) {
            let xavier = DenseLayer::with_init(cols, rows, Activation::Tanh, WeightInit::XavierUniform).unwrap();
            let xavier_bound = (6.0 / (rows + cols) as f32).sqrt();
            for &weight in xavier.weights.iter() {
                prop_assert!(weight.abs() <= xavier_bound * 1.0001);
            }

            let he = DenseLayer::with_init(cols, rows, Activation::Relu, WeightInit::HeUniform).unwrap();
            let he_bound = (6.0 / cols as f32).sqrt();
            for &weight in he.weights.iter() {
                prop_assert!(weight.abs() <= he_bound * 1.0001);
            }
        }

        #[test]
        fn test_gradient_step_does_not_increase_loss(
            initial_weights in weight_matrix_strategy(2, 3),
            learning_rate in 0.001f32..0.05
        ) {
            let mut layer = DenseLayer::new(3, 2, Activation::Linear)
                .unwrap()
                .with_weights(initial_weights)
                .unwrap();
            let input = Array1::from_vec(vec![1.0, 0.5, -0.5]);
            let target = Array1::from_vec(vec![1.0, 0.0]);

            let output1 = layer.forward(input.view()).unwrap();
            let loss1 = (&target - &output1).mapv(|x| x * x).sum();
            layer.backward(((&output1 - &target) * 2.0).view()).unwrap();
            layer.update_weights(learning_rate);

            let output2 = layer.forward(input.view()).unwrap();
            let loss2 = (&target - &output2).mapv(|x| x * x).sum();
            prop_assert!(loss2 <= loss1 + 1e-3, "loss rose from {} to {}", loss1, loss2);
        }

        #[test]
        fn test_conv_output_size_formula(
            input in 1usize..=64,
            kernel in 1usize..=7,
            stride in 1usize..=5,
            padding in 0usize..=3
        ) {
            match conv_output_size(input, kernel, stride, padding) {
                Some(out) => {
                    prop_assert!(input + 2 * padding >= kernel);
                    prop_assert_eq!(out, (input + 2 * padding - kernel) / stride + 1);
                    let layer = Conv2DLayer::new((input, input, 1), 1, kernel, stride, padding).unwrap();
                    prop_assert_eq!(layer.output_dims(), (out, out, 1));
                }
                None => prop_assert!(input + 2 * padding < kernel),
            }
        }

        #[test]
        fn test_ensemble_weights_normalize(weights in prop::collection::vec(0.01f32..100.0, 2..6)) {
            let mut ensemble = VotingEnsemble::new(VotingType::Soft);
            for _ in 0..weights.len() {
                ensemble.add_model(classifier(2, 2));
            }
            prop_assert!(ensemble.set_model_weights(&weights));
            let normalized = ensemble.model_weights();
            let total: f32 = weights.iter().sum();
            prop_assert!((normalized.iter().sum::<f32>() - 1.0).abs() < 1e-4);
            for (n, w) in normalized.iter().zip(&weights) {
                prop_assert!((n - w / total).abs() < 1e-5);
            }
        }

        #[test]
        fn test_voting_output_is_distribution(
            input in input_array_strategy(2),
            hard in any::<bool>()
        ) {
            let voting_type = if hard { VotingType::Hard } else { VotingType::Soft };
            let mut ensemble = VotingEnsemble::with_output_classes(voting_type, 3);
            ensemble.add_model(classifier(2, 3));
            ensemble.add_model(classifier(2, 3));
            prop_assert!(ensemble.activate());
            let prediction = ensemble.predict(input.view()).unwrap();
            prop_assert!((prediction.sum() - 1.0).abs() < 1e-4);
            prop_assert!(prediction.iter().all(|&p| p >= 0.0));
        }
    }
}
