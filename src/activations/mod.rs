//! # Activation Functions Module
//!
//! Scalar nonlinearities applied to a layer's weighted sum, each with an
//! analytic derivative used during backpropagation.
//!
//! ## Available Activations
//!
//! - **Sigmoid**: `1 / (1 + e^(-x))`, outputs between 0 and 1
//! - **Tanh**: hyperbolic tangent, outputs between -1 and 1
//! - **ReLU**: `max(0, x)`
//! - **LeakyReLU**: ReLU with a small negative slope (default 0.01)
//! - **ELU**: smooth alternative to ReLU (default alpha 1.0)
//! - **Softmax**: vector normalization into a probability distribution
//! - **Swish**: `x * sigmoid(x)`
//! - **GELU**: tanh approximation of the Gaussian error linear unit
//! - **Linear**: identity
//!
//! Exponential functions saturate for large `|x|` instead of overflowing.
//!
//! ```rust
//! use adaptive_engine::activations::{softmax, Activation};
//! use ndarray::array;
//!
//! assert_eq!(Activation::Sigmoid.activate(0.0), 0.5);
//! let p = softmax(array![1.0, 2.0, 3.0].view());
//! assert!((p.sum() - 1.0).abs() < 1e-6);
//! ```

pub mod functions;
pub mod gelu;

pub use functions::{softmax, Activation};
