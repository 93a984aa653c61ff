use adaptive_engine::{
    activations::Activation,
    builders::NetworkBuilder,
    config::LearningConfig,
    data::TrainingData,
    ensemble::{BaggingEnsemble, EnsembleModel, StackingEnsemble, VotingEnsemble, VotingType},
    network::{ConvolutionalNeuralNetwork, Model, ModelKind, ModelRegistry, NeuralNetwork, RecurrentNeuralNetwork},
    optimizer::OptimizerKind,
    LearningError,
};
use ndarray::{array, Array1, Array3};

fn two_blob_data() -> (Vec<Array1<f32>>, Vec<Array1<f32>>) {
    let mut inputs = Vec::new();
    let mut targets = Vec::new();
    for i in 0..8 {
        let jitter = i as f32 * 0.02;
        inputs.push(array![0.1 + jitter, 0.2 - jitter]);
        targets.push(array![1.0, 0.0]);
        inputs.push(array![0.9 - jitter, 0.8 + jitter]);
        targets.push(array![0.0, 1.0]);
    }
    (inputs, targets)
}

#[test]
fn test_end_to_end_deep_training() {
    let (inputs, targets) = two_blob_data();
    let data = TrainingData::new(inputs, targets);

    let mut network = NetworkBuilder::new(2)
        .add_dense(16, Activation::Relu)
        .add_batch_norm()
        .add_dropout(0.1)
        .add_dense(2, Activation::Softmax)
        .with_optimizer_rate(OptimizerKind::Adam, 0.01)
        .activated()
        .build()
        .unwrap();

    assert!(network.train_for(&data, 1));
    let initial = network.current_error();
    assert!(network.train_for(&data, 100));
    assert!(network.current_error() < initial);
    assert_eq!(network.training_epochs(), 101);

    let low = network.forward(array![0.1, 0.2].view()).unwrap();
    let high = network.forward(array![0.9, 0.8].view()).unwrap();
    assert!(low[0] > high[0]);
}

#[test]
fn test_every_optimizer_trains() {
    let data = TrainingData::from_rows(
        &[vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
        &[vec![0.0], vec![1.0], vec![1.0], vec![1.0]],
    );
    for kind in OptimizerKind::ALL {
        let mut network = NetworkBuilder::new(2)
            .add_dense(4, Activation::Tanh)
            .add_dense(1, Activation::Sigmoid)
            .with_optimizer_rate(kind, 0.05)
            .activated()
            .build()
            .unwrap();
        assert!(network.train_for(&data, 50), "{} failed to train", kind);
        assert!(network.current_error().is_finite());
        assert_eq!(network.optimizer().kind(), kind);
    }
}

#[test]
fn test_shallow_adaptation() {
    let data = TrainingData::from_rows(&[vec![0.2, 0.8], vec![0.8, 0.2]], &[vec![1.0], vec![0.0]]);
    let mut network = NeuralNetwork::new(2, 4, 1)
        .unwrap()
        .with_config(LearningConfig { max_epochs: 30, ..LearningConfig::shallow() });
    network.activate();
    assert!(network.train(&data));
    let trained_epochs = network.training_epochs();
    let rate = network.learning_rate();
    assert!(network.adapt(&data));
    assert!(network.training_epochs() > trained_epochs);
    assert_eq!(network.learning_rate(), rate);
}

#[test]
fn test_config_file_drives_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");
    std::fs::write(&path, r#"{ "learning_rate": 0.02, "optimizer": "RmsProp", "max_epochs": 5 }"#).unwrap();

    let config = LearningConfig::from_json_file(&path).unwrap();
    assert_eq!(config.optimizer, OptimizerKind::RmsProp);

    let mut network = NetworkBuilder::new(3)
        .add_dense(2, Activation::Sigmoid)
        .with_config(config)
        .activated()
        .build()
        .unwrap();
    assert_eq!(network.optimizer().kind(), OptimizerKind::RmsProp);
    assert!((network.learning_rate() - 0.02).abs() < 1e-7);

    let data = TrainingData::from_rows(&[vec![0.1, 0.2, 0.3]], &[vec![0.5, 0.5]]);
    assert!(network.train(&data));
    assert!(network.training_epochs() <= 5);

    let missing = LearningConfig::from_json_file(dir.path().join("missing.json"));
    assert!(matches!(missing, Err(LearningError::Config(_))));
}

#[test]
fn test_cnn_pipeline() {
    let mut cnn = ConvolutionalNeuralNetwork::with_input_shape(8, 8, 3).unwrap();
    assert!(cnn.add_conv2d_layer(4, 3, 1, 1));
    assert!(cnn.add_max_pooling_layer(2, 2));
    assert!(cnn.add_conv2d_layer(8, 3, 1, 0));
    assert!(cnn.add_flatten_layer());
    assert!(cnn.add_dense_layer(3, Activation::Softmax));
    assert!(cnn.activate());
    assert_eq!(
        cnn.architecture(),
        "ConvolutionalNeuralNetwork[8x8x3 -> Conv2D -> MaxPooling -> Conv2D -> Flatten -> Dense]"
    );

    let images: Vec<Array3<f32>> = (0..3)
        .map(|k| Array3::from_shape_fn((8, 8, 3), |(y, x, c)| ((y + x + c + k) % 3) as f32 / 2.0))
        .collect();
    let labels = vec![array![1.0, 0.0, 0.0], array![0.0, 1.0, 0.0], array![0.0, 0.0, 1.0]];
    assert!(cnn.train(&images, &labels, 3));
    let prediction = cnn.forward(images[0].view()).unwrap();
    assert!((prediction.sum() - 1.0).abs() < 1e-5);
}

#[test]
fn test_sequence_learning() {
    let mut rnn = RecurrentNeuralNetwork::new();
    rnn.add_lstm_layer(8);
    rnn.add_dense_layer(1, Activation::Linear);
    rnn.set_learning_rate(0.01);
    assert!(rnn.activate());

    // predict the previous step of a short signal
    let signal: Vec<Array1<f32>> = (0..6).map(|t| array![(t as f32 * 0.5).sin()]).collect();
    let shifted: Vec<Array1<f32>> = std::iter::once(array![0.0])
        .chain(signal.iter().take(5).cloned())
        .collect();
    let inputs = vec![signal.clone()];
    let targets = vec![shifted];

    assert!(rnn.train(&inputs, &targets, 1));
    let start = rnn.current_error();
    assert!(rnn.train(&inputs, &targets, 60));
    assert!(rnn.current_error() < start);

    rnn.reset_states();
    let outputs = rnn.forward(&signal).unwrap();
    assert_eq!(outputs.len(), 6);
}

#[test]
fn test_ensembles_over_registry_models() {
    let (inputs, targets) = two_blob_data();
    let registry = ModelRegistry::with_defaults(2, 2);

    let mut voting = VotingEnsemble::new(VotingType::Soft);
    let mut bagging = BaggingEnsemble::new(0.8).with_seed(42);
    let meta = NetworkBuilder::new(4)
        .add_dense(2, Activation::Softmax)
        .build()
        .unwrap();
    let mut stacking = StackingEnsemble::new(Box::new(meta));

    for kind in [ModelKind::Deep, ModelKind::Shallow, ModelKind::Convolutional] {
        assert!(voting.add_model(registry.create(kind).unwrap()));
        assert!(bagging.add_model(registry.create(kind).unwrap()));
    }
    stacking.add_model(registry.create(ModelKind::Deep).unwrap());
    stacking.add_model(registry.create(ModelKind::Recurrent).unwrap());

    let ensembles: Vec<&mut dyn EnsembleModel> = vec![&mut voting, &mut bagging, &mut stacking];
    for ensemble in ensembles {
        assert!(ensemble.activate(), "{} failed to activate", ensemble.kind());
        assert!(ensemble.train(&inputs, &targets, 5), "{} failed to train", ensemble.kind());
        let prediction = ensemble.predict(array![0.1, 0.2].view()).unwrap();
        assert_eq!(prediction.len(), 2);
        assert!(prediction.iter().all(|p| p.is_finite()));
    }
}

#[test]
fn test_custom_registry_constructor() {
    let mut registry = ModelRegistry::new();
    registry.register(ModelKind::Deep, || {
        let network = NetworkBuilder::new(2)
            .add_dense(3, Activation::Relu)
            .add_dense(2, Activation::Softmax)
            .activated()
            .build()?;
        Ok(Box::new(network) as Box<dyn Model>)
    });
    assert!(registry.contains(ModelKind::Deep));
    assert!(!registry.contains(ModelKind::Recurrent));

    let mut model = registry.try_create(ModelKind::Deep).unwrap();
    assert!(model.is_active());
    assert!(model.predict(array![0.5, 0.5].view()).is_some());
    assert!(registry.try_create(ModelKind::Recurrent).unwrap_err().is_invalid_argument());
}
