use serde::{Deserialize, Serialize};

/// An elementwise activation function and its derivative.
///
/// The composite variants wrap another activation, which makes the catalog closed under
/// scaling of either the input (`Scaled`) or the output (`Stretched`). Every variant has a
/// canonical textual name, see the `Display` and `FromStr` implementations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActFn {
    Linear(f64),
    Sigmoid,
    Tanh,
    Relu,
    SignedLog,
    Scaled(Box<ActFn>, f64),
    Stretched(Box<ActFn>, f64),
}
use ActFn::*;

fn sigmoid(z: f64) -> f64 {
    1. / (1. + (-z).exp())
}

impl ActFn {
    pub fn linear(slope: f64) -> Self {
        Linear(slope)
    }

    pub fn sigmoid() -> Self {
        Sigmoid
    }

    pub fn tanh() -> Self {
        Tanh
    }

    pub fn relu() -> Self {
        Relu
    }

    pub fn signed_log() -> Self {
        SignedLog
    }

    /// Evaluates `inner` at `factor * z`.
    pub fn scaled(inner: ActFn, factor: f64) -> Self {
        Scaled(Box::new(inner), factor)
    }

    /// Multiplies the output of `inner` by `factor`.
    pub fn stretched(inner: ActFn, factor: f64) -> Self {
        Stretched(Box::new(inner), factor)
    }

    /// Applies the function to a pre-activation value.
    pub fn f(&self, z: f64) -> f64 {
        match self {
            Linear(slope) => slope * z,
            Sigmoid => sigmoid(z),
            Tanh => z.tanh(),
            Relu => z.max(0.),
            SignedLog => z.signum() * z.abs().ln_1p(),
            Scaled(inner, factor) => inner.f(factor * z),
            Stretched(inner, factor) => factor * inner.f(z),
        }
    }

    /// The derivative, evaluated at the pre-activation value `z` (not at `f(z)`).
    pub fn df(&self, z: f64) -> f64 {
        match self {
            Linear(slope) => *slope,
            Sigmoid => {
                let s = sigmoid(z);
                s * (1. - s)
            }
            Tanh => {
                let t = z.tanh();
                1. - t * t
            }
            Relu => {
                if z > 0. {
                    1.
                } else {
                    0.
                }
            }
            SignedLog => 1. / (1. + z.abs()),
            Scaled(inner, factor) => factor * inner.df(factor * z),
            Stretched(inner, factor) => factor * inner.df(z),
        }
    }
}
