//! # adaptive-engine - Neural Network Learning Core
//!
//! A self-contained learning engine: layers with hand-written forward and
//! backward passes, a stateful multi-rule optimizer, four network
//! composites and ensembles that combine them.
//!
//! ## Key Features
//!
//! - **Layers**: Dense, Conv2D, MaxPooling, Flatten, LSTM, GRU, Dropout, BatchNorm
//! - **Optimizers**: SGD, Momentum, AdaGrad, RMSprop, Adam, Adamax, Nadam
//! - **Networks**: shallow, deep, convolutional and recurrent
//! - **Ensembles**: hard/soft voting, stacking, bagging
//!
//! ## Quick Start
//!
//! ```rust
//! use adaptive_engine::activations::Activation;
//! use adaptive_engine::data::TrainingData;
//! use adaptive_engine::network::DeepNeuralNetwork;
//!
//! let mut network = DeepNeuralNetwork::new(2).unwrap();
//! network.add_dense_layer(8, Activation::Tanh);
//! network.add_dense_layer(1, Activation::Sigmoid);
//! assert!(network.activate());
//!
//! let data = TrainingData::from_rows(
//!     &[vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
//!     &[vec![0.0], vec![1.0], vec![1.0], vec![0.0]],
//! );
//! assert!(network.train_for(&data, 10));
//! assert_eq!(network.training_epochs(), 10);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Scalar activation functions and softmax
//! - [`builders`] - Fluent construction of deep networks
//! - [`config`] - Training configuration, loadable from JSON
//! - [`data`] - Input/target pairs
//! - [`ensemble`] - Voting, stacking and bagging ensembles
//! - [`error`] - Error types and result handling
//! - [`layers`] - Network layers
//! - [`network`] - Network composites, the `Model` trait and the model registry
//! - [`optimizer`] - The multi-rule optimizer
//!
//! Logging goes through `tracing`; install a subscriber in the host
//! application to see it.

pub mod activations;
pub mod builders;
pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod layers;
pub mod network;
pub mod optimizer;

pub use error::{LearningError, Result};

#[cfg(test)]
mod tests;
