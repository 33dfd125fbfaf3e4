//! Layer activation functions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Activation applied after a layer's affine transform
///
/// Integer codes exist only at the host boundary (`TryFrom<i32>`); inside
/// the crate dispatch is a `match` on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// f(x) = x
    #[default]
    Identity,
    /// f(x) = 1 / (1 + exp(-x))
    Sigmoid,
    /// f(x) = tanh(x)
    Tanh,
    /// f(x) = atan(x)
    Arctan,
    /// f(x) = max(0, x)
    Relu,
    /// Per-example normalisation over the layer's units (one column)
    Softmax,
}

impl Activation {
    pub const ALL: [Activation; 6] = [
        Activation::Identity,
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Arctan,
        Activation::Relu,
        Activation::Softmax,
    ];

    /// Host driver code: 0 identity, 1 sigmoid, 2 tanh, 3 arctan, 4 ReLU, 5 softmax
    pub const fn code(self) -> i32 {
        match self {
            Activation::Identity => 0,
            Activation::Sigmoid => 1,
            Activation::Tanh => 2,
            Activation::Arctan => 3,
            Activation::Relu => 4,
            Activation::Softmax => 5,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Arctan => "arctan",
            Activation::Relu => "relu",
            Activation::Softmax => "softmax",
        }
    }
}

impl TryFrom<i32> for Activation {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Activation::ALL
            .into_iter()
            .find(|activation| activation.code() == code)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown activation code {code}")))
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
