use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayViewD, ArrayViewMutD};
use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};

/// Maximum number of time steps a recurrent layer keeps for backpropagation.
pub const MAX_CACHED_STEPS: usize = 256;

/// Layer variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    Dense,
    Dropout,
    BatchNormalization,
    Conv2D,
    MaxPooling,
    Flatten,
    Lstm,
    Gru,
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Dense => "Dense",
            LayerKind::Dropout => "Dropout",
            LayerKind::BatchNormalization => "BatchNormalization",
            LayerKind::Conv2D => "Conv2D",
            LayerKind::MaxPooling => "MaxPooling",
            LayerKind::Flatten => "Flatten",
            LayerKind::Lstm => "LSTM",
            LayerKind::Gru => "GRU",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared shape of a layer's input or output.
///
/// Spatial data is stored height-major, then width, then channels when it is
/// flattened into a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerShape {
    Flat(usize),
    Spatial {
        height: usize,
        width: usize,
        channels: usize,
    },
}

impl LayerShape {
    pub fn spatial(height: usize, width: usize, channels: usize) -> Self {
        LayerShape::Spatial { height, width, channels }
    }

    /// Number of scalars in the shape
    pub fn size(&self) -> usize {
        match *self {
            LayerShape::Flat(n) => n,
            LayerShape::Spatial { height, width, channels } => height * width * channels,
        }
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, LayerShape::Spatial { .. })
    }

    /// `(height, width, channels)` for spatial shapes
    pub fn dims(&self) -> Option<(usize, usize, usize)> {
        match *self {
            LayerShape::Spatial { height, width, channels } => Some((height, width, channels)),
            LayerShape::Flat(_) => None,
        }
    }
}

impl fmt::Display for LayerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerShape::Flat(n) => write!(f, "{}", n),
            LayerShape::Spatial { height, width, channels } => {
                write!(f, "{}x{}x{}", height, width, channels)
            }
        }
    }
}

/// A trainable tensor together with its accumulated gradient.
pub struct Parameter<'a> {
    pub name: &'static str,
    pub value: ArrayViewMutD<'a, f32>,
    pub gradient: ArrayViewD<'a, f32>,
}

impl<'a> Parameter<'a> {
    pub fn new(name: &'static str, value: ArrayViewMutD<'a, f32>, gradient: ArrayViewD<'a, f32>) -> Self {
        Parameter { name, value, gradient }
    }
}

/// Trait defining the interface for network layers
pub trait NetworkLayer: Send + Sync + fmt::Debug {
    fn kind(&self) -> LayerKind;

    fn input_shape(&self) -> LayerShape;

    fn output_shape(&self) -> LayerShape;

    fn input_size(&self) -> usize {
        self.input_shape().size()
    }

    fn output_size(&self) -> usize {
        self.output_shape().size()
    }

    /// Transform one input vector, caching what backward needs.
    fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>>;

    /// Propagate an output gradient back to the input, accumulating
    /// parameter gradients. Fails with an illegal-state error when no
    /// matching forward call is cached.
    fn backward(&mut self, output_gradient: ArrayView1<f32>) -> Result<Array1<f32>>;

    /// Trainable tensors paired with their accumulated gradients.
    fn parameters(&mut self) -> Vec<Parameter<'_>>;

    fn clear_gradients(&mut self);

    fn parameter_count(&self) -> usize;

    /// Apply accumulated gradients with plain gradient descent and clear them.
    fn update_weights(&mut self, learning_rate: f32) {
        for mut param in self.parameters() {
            param.value.scaled_add(-learning_rate, &param.gradient);
        }
        self.clear_gradients();
    }

    /// Switch between training and inference behavior.
    fn set_training(&mut self, _training: bool) {}

    /// Clear any state carried between forward calls.
    fn reset_state(&mut self) {}

    fn is_recurrent(&self) -> bool {
        false
    }

    /// Steps a recurrent layer can still backpropagate through; `None` for
    /// layers without a step cache.
    fn backprop_horizon(&self) -> Option<usize> {
        None
    }

    fn clone_box(&self) -> Box<dyn NetworkLayer>;
}

impl Clone for Box<dyn NetworkLayer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Validate a vector handed to a layer: empty input is an invalid argument,
/// a wrong length is a dimension mismatch.
pub(crate) fn check_vector(what: &str, expected: usize, actual: usize) -> Result<()> {
    if actual == 0 {
        return Err(LearningError::invalid_argument(format!("{} must not be empty", what)));
    }
    crate::error::check_len(what, expected, actual)
}

pub(crate) fn backward_before_forward(kind: LayerKind) -> LearningError {
    LearningError::illegal_state(format!("{} backward called before forward", kind))
}
