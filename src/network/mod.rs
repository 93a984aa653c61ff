//! # Network Module
//!
//! Four network composites built from [`crate::layers`]:
//!
//! - [`NeuralNetwork`]: fixed single-hidden-layer sigmoid network
//! - [`DeepNeuralNetwork`]: configurable stack of flat layers
//! - [`ConvolutionalNeuralNetwork`]: convolution, pooling, flatten and dense layers over 3D inputs
//! - [`RecurrentNeuralNetwork`]: LSTM/GRU stacks over sequences
//!
//! Every network starts inactive. Structure is edited while inactive;
//! `forward` and `train` require an active network and report failures as
//! `None`/`false` (the `try_` variants return the reason).
//!
//! ```
//! use adaptive_engine::activations::Activation;
//! use adaptive_engine::network::DeepNeuralNetwork;
//! use ndarray::array;
//!
//! let mut network = DeepNeuralNetwork::new(2).unwrap();
//! assert!(network.add_dense_layer(4, Activation::Relu));
//! assert!(network.add_dense_layer(1, Activation::Sigmoid));
//! assert!(network.activate());
//!
//! let output = network.forward(array![0.5, 0.5].view()).unwrap();
//! assert_eq!(output.len(), 1);
//! ```

pub mod convolutional;
pub mod deep;
pub mod model;
pub mod recurrent;
pub mod registry;
pub mod shallow;
pub mod state;

pub use convolutional::ConvolutionalNeuralNetwork;
pub use deep::DeepNeuralNetwork;
pub use model::{Model, ModelKind};
pub use recurrent::RecurrentNeuralNetwork;
pub use registry::{ModelConstructor, ModelRegistry};
pub use shallow::NeuralNetwork;
pub use state::{mean_squared_error, NetworkState};
