use ndarray::{array, Array1};
use crate::activations::Activation;
use crate::ensemble::*;
use crate::network::{DeepNeuralNetwork, Model, ModelKind, ModelRegistry, NeuralNetwork};

fn classifier(inputs: usize, classes: usize) -> Box<dyn Model> {
    let mut network = DeepNeuralNetwork::new(inputs).unwrap();
    network.add_dense_layer(4, Activation::Tanh);
    network.add_dense_layer(classes, Activation::Softmax);
    Box::new(network)
}

fn toy_data() -> (Vec<Array1<f32>>, Vec<Array1<f32>>) {
    let inputs = vec![array![0.0, 0.1], array![0.9, 1.0], array![0.1, 0.0], array![1.0, 0.8]];
    let targets = vec![array![1.0, 0.0], array![0.0, 1.0], array![1.0, 0.0], array![0.0, 1.0]];
    (inputs, targets)
}

#[test]
fn test_voting_activation_needs_two_models() {
    let mut ensemble = VotingEnsemble::new(VotingType::Soft);
    assert!(!ensemble.activate());
    ensemble.add_model(classifier(2, 2));
    assert!(!ensemble.activate());
    ensemble.add_model(classifier(2, 2));
    assert!(ensemble.activate());
    assert!(ensemble.is_active());
    assert!(ensemble.core().models().iter().all(|m| m.is_active()));
}

#[test]
fn test_members_locked_while_active() {
    let mut ensemble = VotingEnsemble::new(VotingType::Hard);
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    ensemble.activate();
    assert!(!ensemble.add_model(classifier(2, 2)));
    assert!(!ensemble.remove_model(0));
    ensemble.deactivate();
    assert!(ensemble.remove_model(0));
    assert!(!ensemble.remove_model(5));
    assert_eq!(ensemble.model_count(), 1);
    assert_eq!(ensemble.model_weights(), vec![1.0]);
}

#[test]
fn test_model_limit() {
    let mut ensemble = VotingEnsemble::new(VotingType::Soft);
    for _ in 0..MAX_MODELS {
        assert!(ensemble.add_model(classifier(2, 2)));
    }
    assert!(!ensemble.add_model(classifier(2, 2)));
    assert_eq!(ensemble.model_count(), MAX_MODELS);
}

#[test]
fn test_weights_are_normalized() {
    let mut ensemble = VotingEnsemble::new(VotingType::Soft);
    for _ in 0..3 {
        ensemble.add_model(classifier(2, 2));
    }
    let uniform = ensemble.model_weights();
    assert!(uniform.iter().all(|w| (w - 1.0 / 3.0).abs() < 1e-6));

    assert!(ensemble.set_model_weights(&[1.0, 2.0, 3.0]));
    let weights = ensemble.model_weights();
    for (w, expected) in weights.iter().zip([1.0 / 6.0, 2.0 / 6.0, 3.0 / 6.0]) {
        assert!((w - expected).abs() < 1e-6);
    }
    assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-6);
}

#[test]
fn test_invalid_weights_rejected() {
    let mut ensemble = VotingEnsemble::new(VotingType::Soft);
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    assert!(!ensemble.set_model_weights(&[1.0]));
    assert!(!ensemble.set_model_weights(&[1.0, -1.0]));
    assert!(!ensemble.set_model_weights(&[0.0, 0.0]));
    assert!(!ensemble.set_model_weights(&[f32::NAN, 1.0]));
    assert_eq!(ensemble.model_weights(), vec![0.5, 0.5]);
}

#[test]
fn test_soft_voting_prediction_is_distribution() {
    let mut ensemble = VotingEnsemble::with_output_classes(VotingType::Soft, 3);
    ensemble.add_model(classifier(2, 3));
    ensemble.add_model(classifier(2, 3));
    assert!(ensemble.predict(array![0.5, 0.5].view()).is_none());
    ensemble.activate();

    let prediction = ensemble.predict(array![0.5, 0.5].view()).unwrap();
    assert_eq!(prediction.len(), 3);
    assert!((prediction.sum() - 1.0).abs() < 1e-5);
    assert!(ensemble.predict(Array1::<f32>::zeros(0).view()).is_none());
}

#[test]
fn test_hard_voting_counts_winners() {
    let mut ensemble = VotingEnsemble::new(VotingType::Hard);
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    ensemble.activate();
    let prediction = ensemble.predict(array![0.3, 0.6].view()).unwrap();
    for p in prediction.iter() {
        let votes = p * 3.0;
        assert!((votes - votes.round()).abs() < 1e-4);
    }
    assert!((prediction.sum() - 1.0).abs() < 1e-5);
}

#[test]
fn test_members_with_wrong_width_are_skipped() {
    let mut ensemble = VotingEnsemble::with_output_classes(VotingType::Soft, 3);
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    ensemble.activate();
    assert!(ensemble.predict(array![0.5, 0.5].view()).is_none());
    assert!(ensemble.try_predict(array![0.5, 0.5].view()).unwrap_err().is_illegal_state());
}

#[test]
fn test_voting_training() {
    let (inputs, targets) = toy_data();
    let mut ensemble = VotingEnsemble::new(VotingType::Soft);
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    assert!(!ensemble.train(&inputs, &targets, 2));
    ensemble.activate();
    assert!(ensemble.train(&inputs, &targets, 2));
    assert!(!ensemble.train(&inputs, &targets[..3], 2));
    assert!(!ensemble.train(&[], &[], 2));
}

#[test]
fn test_stacking_requires_trained_meta_learner() {
    let (inputs, targets) = toy_data();
    let mut ensemble = StackingEnsemble::new(classifier(4, 2));
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    assert_eq!(ensemble.meta_input_size(), 4);
    assert!(ensemble.activate());
    assert!(ensemble.meta_learner().is_active());

    assert!(ensemble.predict(array![0.2, 0.8].view()).is_none());
    assert!(ensemble.train(&inputs, &targets, 3));
    assert!(ensemble.is_meta_learner_trained());
    let prediction = ensemble.predict(array![0.2, 0.8].view()).unwrap();
    assert_eq!(prediction.len(), 2);
    assert!(ensemble.statistics().contains("Meta-Learner Trained: true"));

    ensemble.clear_models();
    assert!(!ensemble.is_meta_learner_trained());
    assert_eq!(ensemble.model_count(), 0);
}

#[test]
fn test_bagging_prediction_and_training() {
    let (inputs, targets) = toy_data();
    let mut ensemble = BaggingEnsemble::new(0.5).with_seed(7);
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    ensemble.activate();
    assert!(ensemble.train(&inputs, &targets, 2));

    let prediction = ensemble.predict(array![0.5, 0.5].view()).unwrap();
    assert!((prediction.sum() - 1.0).abs() < 1e-5);
    assert!(ensemble.statistics().contains("Sample Ratio: 0.50"));
}

#[test]
fn test_mixed_member_kinds() {
    let registry = ModelRegistry::with_defaults(2, 2);
    let mut ensemble = VotingEnsemble::new(VotingType::Soft);
    for kind in [ModelKind::Shallow, ModelKind::Deep, ModelKind::Recurrent] {
        ensemble.add_model(registry.create(kind).unwrap());
    }
    ensemble.add_model(Box::new(NeuralNetwork::new(2, 3, 2).unwrap()));
    assert!(ensemble.activate());
    let prediction = ensemble.predict(array![0.4, 0.6].view()).unwrap();
    assert_eq!(prediction.len(), 2);
}

#[test]
fn test_ensemble_statistics() {
    let mut ensemble = VotingEnsemble::new(VotingType::Hard);
    ensemble.add_model(classifier(2, 2));
    ensemble.add_model(classifier(2, 2));
    let stats = ensemble.statistics();
    assert!(stats.contains("=== EnsembleModel Statistics ==="));
    assert!(stats.contains("Type: Voting"));
    assert!(stats.contains("Weights: 0.500, 0.500"));
    assert!(stats.contains("Voting Type: Hard Voting"));
}

#[test]
fn test_output_classes_bounds() {
    let mut ensemble = VotingEnsemble::with_output_classes(VotingType::Soft, 1);
    assert_eq!(ensemble.output_classes(), MIN_OUTPUT_CLASSES);
    ensemble.set_output_classes(5000);
    assert_eq!(ensemble.output_classes(), MIN_OUTPUT_CLASSES);
    ensemble.set_output_classes(10);
    assert_eq!(ensemble.output_classes(), 10);
}
