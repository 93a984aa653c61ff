//! # Layers Module
//!
//! Every layer implements [`NetworkLayer`]: `forward` caches what the
//! backward pass needs, `backward` accumulates parameter gradients and
//! returns the gradient with respect to the input, and `update_weights`
//! applies and clears the accumulated gradients.
//!
//! Data travels between layers as flat vectors. Spatial layers (`Conv2D`,
//! `MaxPooling`, `Flatten`) declare a `(height, width, channels)` shape and
//! also expose `forward_spatial`/`backward_spatial` for 3D tensors.

pub mod batch_norm;
pub mod conv;
pub mod dense;
pub mod dropout;
pub mod flatten;
pub mod gru;
pub mod initialization;
pub mod lstm;
pub mod pooling;
pub mod recurrent;
pub mod traits;

pub use batch_norm::BatchNormLayer;
pub use conv::{conv_output_size, Conv2DLayer};
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use flatten::{flatten_spatial, unflatten, FlattenLayer};
pub use gru::GruLayer;
pub use initialization::WeightInit;
pub use lstm::LstmLayer;
pub use pooling::MaxPool2DLayer;
pub use traits::{LayerKind, LayerShape, NetworkLayer, Parameter, MAX_CACHED_STEPS};
