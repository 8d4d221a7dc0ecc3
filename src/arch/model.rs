use std::{
    fmt::{self, Display},
    sync::Arc,
};

use ndarray::{Array1, Array2, ArrayView1, s};
use rand::Rng;
use rand_distr::StandardNormal;

use super::activations::ActFn;
use crate::{MlErr, Result};

/// A fully connected feed-forward network.
///
/// Each weight matrix has shape `(outputs, inputs + 1)`, the extra column holding the bias
/// weights. Cloning deep-copies the matrices while the activation functions are shared.
#[derive(Clone, Debug)]
pub struct Model {
    weights: Vec<Array2<f64>>,
    internal: Arc<ActFn>,
    output: Arc<ActFn>,
}

impl Model {
    /// Creates a new `Model` with standard normal weights.
    ///
    /// # Arguments
    /// * `rng` - The random source for the initial weights.
    /// * `internal` - The activation of the hidden layers.
    /// * `output` - The activation of the output layer.
    /// * `layers` - The width of every layer, input and output included.
    ///
    /// # Returns
    /// A new `Model` or `MlErr::TooFewLayers` if less than 2 sizes were given.
    pub fn new<R: Rng>(
        rng: &mut R,
        internal: ActFn,
        output: ActFn,
        layers: &[usize],
    ) -> Result<Self> {
        if layers.len() < 2 {
            return Err(MlErr::TooFewLayers { got: layers.len() });
        }

        let weights = layers
            .windows(2)
            .map(|dim| {
                let shape = (dim[1], dim[0] + 1);
                Array2::from_shape_simple_fn(shape, || rng.sample::<f64, _>(StandardNormal))
            })
            .collect();

        Ok(Self {
            weights,
            internal: Arc::new(internal),
            output: Arc::new(output),
        })
    }

    /// Creates a new `Model` from explicit weight matrices.
    ///
    /// # Arguments
    /// * `weights` - The weight matrices, bias column included.
    /// * `internal` - The activation of the hidden layers.
    /// * `output` - The activation of the output layer.
    ///
    /// # Returns
    /// A new `Model` or an error if the matrices don't chain.
    pub fn from_weights(weights: Vec<Array2<f64>>, internal: ActFn, output: ActFn) -> Result<Self> {
        if weights.is_empty() {
            return Err(MlErr::EmptyModel);
        }

        for (i, pair) in weights.windows(2).enumerate() {
            let expected = pair[0].nrows() + 1;
            let got = pair[1].ncols();

            if got != expected {
                return Err(MlErr::BrokenChain {
                    layer: i + 1,
                    got,
                    expected,
                });
            }
        }

        Ok(Self {
            weights,
            internal: Arc::new(internal),
            output: Arc::new(output),
        })
    }

    pub fn weights(&self) -> &[Array2<f64>] {
        &self.weights
    }

    /// Gives mutable access to the weight matrices, their amount can't change.
    pub fn weights_mut(&mut self) -> &mut [Array2<f64>] {
        &mut self.weights
    }

    pub fn internal(&self) -> &ActFn {
        &self.internal
    }

    pub fn output(&self) -> &ActFn {
        &self.output
    }

    /// Returns the width of the input layer.
    pub fn input_size(&self) -> usize {
        self.weights[0].ncols() - 1
    }

    /// Returns the width of the output layer.
    pub fn output_size(&self) -> usize {
        self.weights[self.weights.len() - 1].nrows()
    }

    /// Splits the model into its weights and its shared activation functions.
    pub(crate) fn into_parts(self) -> (Vec<Array2<f64>>, Arc<ActFn>, Arc<ActFn>) {
        (self.weights, self.internal, self.output)
    }

    /// Inverse of `into_parts`, the weights must already be chained.
    pub(crate) fn from_parts(
        weights: Vec<Array2<f64>>,
        internal: Arc<ActFn>,
        output: Arc<ActFn>,
    ) -> Self {
        Self {
            weights,
            internal,
            output,
        }
    }

    /// Evaluates the network without touching any training state.
    ///
    /// # Arguments
    /// * `input` - The input vector, without the bias term.
    ///
    /// # Returns
    /// A freshly allocated output vector or a `SizeMismatch` if the input has the wrong width.
    pub fn predict(&self, input: ArrayView1<f64>) -> Result<Array1<f64>> {
        let expected = self.input_size();
        if input.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "model input",
                got: input.len(),
                expected,
            });
        }

        let (last, hidden) = self
            .weights
            .split_last()
            .ok_or(MlErr::EmptyModel)?;

        let mut x = with_bias(input, |v| v);
        for w in hidden {
            let z = w.dot(&x);
            x = with_bias(z.view(), |z| self.internal.f(z));
        }

        Ok(last.dot(&x).mapv_into(|z| self.output.f(z)))
    }

    /// Scans every weight looking for a NaN, this is a diagnostic for unstable training.
    pub fn has_nan(&self) -> bool {
        self.weights.iter().flatten().any(|w| w.is_nan())
    }
}

/// Maps `v` through `f` and appends the constant bias input.
fn with_bias<F>(v: ArrayView1<f64>, f: F) -> Array1<f64>
where
    F: Fn(f64) -> f64,
{
    let mut x = Array1::ones(v.len() + 1);
    x.slice_mut(s![..v.len()])
        .zip_mut_with(&v, |x, &v| *x = f(v));
    x
}

/// Formats `v` with 3 significant digits, in scientific notation when its exponent is below
/// -4 or above 2. Trailing zeros are dropped.
fn significant(v: f64) -> String {
    if v == 0. || !v.is_finite() {
        return v.to_string();
    }

    // exponent after rounding, so 999.7 moves up to 1e3
    let sci = format!("{v:.2e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if (-4..3).contains(&exp) {
        let decimals = (2 - exp) as usize;
        let fixed = format!("{v:.decimals$}");
        trim_zeros(&fixed).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_zeros(mantissa), exp.abs())
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input")?;

        for (i, w) in self.weights.iter().enumerate() {
            if i > 0 {
                writeln!(f, "Hidden Layer {i}")?;
            }

            for row in w.rows() {
                for v in row {
                    write!(f, "{}\t", significant(*v))?;
                }
                writeln!(f)?;
            }
        }

        write!(f, "output")
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn linear_model() -> Model {
        let weights = vec![arr2(&[[1., 2., 0.], [3., 4., 0.]]), arr2(&[[1., 2., 0.]])];
        Model::from_weights(weights, ActFn::linear(1.), ActFn::linear(1.)).unwrap()
    }

    #[test]
    fn new_builds_chained_matrices() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = Model::new(&mut rng, ActFn::relu(), ActFn::sigmoid(), &[3, 5, 4, 2]).unwrap();

        let shapes: Vec<_> = model.weights().iter().map(|w| w.dim()).collect();
        assert_eq!(shapes, [(5, 4), (4, 6), (2, 5)]);
        assert_eq!(model.input_size(), 3);
        assert_eq!(model.output_size(), 2);
        assert!(!model.has_nan());
    }

    #[test]
    fn new_needs_input_and_output() {
        let mut rng = StdRng::seed_from_u64(7);

        for layers in [&[][..], &[4][..]] {
            let res = Model::new(&mut rng, ActFn::relu(), ActFn::relu(), layers);
            assert!(matches!(res, Err(MlErr::TooFewLayers { got }) if got == layers.len()));
        }
    }

    #[test]
    fn from_weights_checks_the_chain() {
        let weights = vec![Array2::zeros((2, 3)), Array2::zeros((1, 4))];
        let res = Model::from_weights(weights, ActFn::relu(), ActFn::relu());

        assert!(matches!(
            res,
            Err(MlErr::BrokenChain {
                layer: 1,
                got: 4,
                expected: 3
            })
        ));
        assert!(matches!(
            Model::from_weights(vec![], ActFn::relu(), ActFn::relu()),
            Err(MlErr::EmptyModel)
        ));
    }

    #[test]
    fn predict_linear() {
        let model = linear_model();

        assert_eq!(model.predict(arr1(&[1., 0.]).view()).unwrap(), arr1(&[7.]));
        assert_eq!(model.predict(arr1(&[1., 2.]).view()).unwrap(), arr1(&[27.]));
    }

    #[test]
    fn predict_uses_the_bias_column() {
        let weights = vec![arr2(&[[1., 1.]]), arr2(&[[2., -3.]])];
        let model = Model::from_weights(weights, ActFn::relu(), ActFn::linear(1.)).unwrap();

        // relu(-4 + 1) = 0, then 2 * 0 - 3
        assert_eq!(model.predict(arr1(&[-4.]).view()).unwrap(), arr1(&[-3.]));
    }

    #[test]
    fn predict_rejects_wrong_input_width() {
        let model = linear_model();

        for input in [arr1(&[1.]), arr1(&[1., 2., 3.])] {
            let res = model.predict(input.view());
            assert!(matches!(
                res,
                Err(MlErr::SizeMismatch { expected: 2, .. })
            ));
        }
    }

    #[test]
    fn predict_is_pure() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = Model::new(&mut rng, ActFn::tanh(), ActFn::sigmoid(), &[4, 6, 3]).unwrap();
        let input = arr1(&[0.3, -1.2, 2.0, 0.0]);

        let first = model.predict(input.view()).unwrap();
        let second = model.predict(input.view()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn clones_are_independent() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = Model::new(&mut rng, ActFn::relu(), ActFn::relu(), &[2, 3, 1]).unwrap();
        let clone = model.clone();

        assert_eq!(clone.weights(), model.weights());
        assert!(Arc::ptr_eq(&clone.internal, &model.internal));
        assert!(!clone.has_nan());

        let before = clone.weights()[1][[0, 2]];
        model.weights_mut()[1][[0, 2]] += 1.;
        assert_eq!(clone.weights()[1][[0, 2]], before);
        assert_ne!(clone.weights(), model.weights());
    }

    #[test]
    fn has_nan_finds_a_single_entry() {
        let mut model = linear_model();
        assert!(!model.has_nan());

        model.weights_mut()[1][[0, 1]] = f64::NAN;
        assert!(model.has_nan());
    }

    #[test]
    fn display_dumps_every_layer() {
        let dump = linear_model().to_string();
        let expected = "input\n\
                        1\t2\t0\t\n\
                        3\t4\t0\t\n\
                        Hidden Layer 1\n\
                        1\t2\t0\t\n\
                        output";

        assert_eq!(dump, expected);
    }

    #[test]
    fn dump_keeps_three_significant_digits() {
        let cases = [
            (0.5, "0.5"),
            (-0.25, "-0.25"),
            (12.345, "12.3"),
            (0.001234, "0.00123"),
            (9.996, "10"),
            (999.7, "1e+03"),
            (1234.5, "1.23e+03"),
            (0.000071234, "7.12e-05"),
            (0., "0"),
        ];
        for (v, expected) in cases {
            assert_eq!(significant(v), expected, "{v}");
        }

        let model = Model::from_weights(
            vec![arr2(&[[0.123456, -1500.]])],
            ActFn::linear(1.),
            ActFn::linear(1.),
        )
        .unwrap();
        assert_eq!(model.to_string(), "input\n0.123\t-1.5e+03\t\noutput");
    }
}
