use log::debug;
use ndarray::{Zip, linalg, prelude::*};

use crate::{MlErr, Model, Result};

/// The reusable buffers of a forward and backward pass.
///
/// Index `l` of every buffer belongs to layer `l`, where layer 0 is the input and layer
/// `weights.len()` is the output. The last slot of every non output `generated` vector is the
/// bias input and stays fixed at 1.
#[derive(Clone, Debug, Default)]
pub struct Scratch {
    // Forward metadata
    generated: Vec<Array1<f64>>,
    pre_activations: Vec<Array1<f64>>,

    // Backward metadata
    deltas: Vec<Array1<f64>>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the buffers are already shaped for `model`.
    fn fits(&self, model: &Model) -> bool {
        let weights = model.weights();

        self.generated.len() == weights.len() + 1
            && weights
                .iter()
                .zip(&self.generated)
                .all(|(w, nodes)| w.ncols() == nodes.len())
            && self.generated[weights.len()].len() == model.output_size()
    }

    fn allocate(&mut self, model: &Model) {
        let weights = model.weights();
        debug!(layers = weights.len() + 1; "allocating scratch buffers");

        self.generated.clear();
        self.pre_activations.clear();

        for w in weights {
            let mut nodes = Array1::zeros(w.ncols());
            nodes[w.ncols() - 1] = 1.;

            self.generated.push(nodes);
            self.pre_activations.push(Array1::zeros(w.ncols() - 1));
        }

        let outputs = model.output_size();
        self.generated.push(Array1::zeros(outputs));
        self.pre_activations.push(Array1::zeros(outputs));

        self.deltas = self
            .pre_activations
            .iter()
            .map(|z| Array1::zeros(z.len()))
            .collect();
    }

    /// Runs the forward pass, keeping every layer's pre-activation and activation.
    ///
    /// The input layer itself goes through the internal activation before the first product,
    /// while its raw values are kept as the layer's pre-activation.
    ///
    /// # Arguments
    /// * `model` - The model to evaluate.
    /// * `input` - The input vector, without the bias term.
    ///
    /// # Returns
    /// A `SizeMismatch` if the input doesn't fit the model.
    pub fn feed_forward(&mut self, model: &Model, input: ArrayView1<f64>) -> Result<()> {
        if !self.fits(model) {
            self.allocate(model);
        }

        let expected = model.input_size();
        if input.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "model input",
                got: input.len(),
                expected,
            });
        }

        let internal = model.internal();
        self.pre_activations[0].assign(&input);
        self.generated[0]
            .slice_mut(s![..expected])
            .zip_mut_with(&input, |a, &x| *a = internal.f(x));

        let weights = model.weights();
        let last = weights.len();

        for (l, w) in weights.iter().enumerate().map(|(i, w)| (i + 1, w)) {
            let (done, rest) = self.generated.split_at_mut(l);
            let (x, a) = (&done[l - 1], &mut rest[0]);
            let z = &mut self.pre_activations[l];

            linalg::general_mat_vec_mul(1., w, x, 0., z);

            let act_fn = if l == last { model.output() } else { internal };
            a.slice_mut(s![..z.len()])
                .zip_mut_with(z, |a, &z| *a = act_fn.f(z));
        }

        Ok(())
    }

    /// The output of the last forward pass.
    pub fn output(&self) -> ArrayView1<'_, f64> {
        self.generated
            .last()
            .map_or_else(|| ArrayView1::from(&[][..]), |a| a.view())
    }

    /// Computes the loss of the last forward pass and every layer's delta.
    ///
    /// The deltas are computed from the weights the forward pass used, before any update.
    ///
    /// # Arguments
    /// * `model` - The model given to the last `feed_forward` call.
    /// * `target` - The expected output.
    ///
    /// # Returns
    /// The halved mean squared error of the output.
    pub fn back_propagate(&mut self, model: &Model, target: ArrayView1<f64>) -> Result<f64> {
        let weights = model.weights();
        let last = weights.len();

        if self.generated.len() != last + 1 {
            return Err(MlErr::SizeMismatch {
                what: "scratch layers",
                got: self.generated.len(),
                expected: last + 1,
            });
        }

        let output = &self.generated[last];
        if target.len() != output.len() {
            return Err(MlErr::SizeMismatch {
                what: "target",
                got: target.len(),
                expected: output.len(),
            });
        }

        let loss = half_mse(output.view(), target);

        let act_fn = model.output();
        Zip::from(&mut self.deltas[last])
            .and(output)
            .and(&target)
            .and(&self.pre_activations[last])
            .for_each(|d, &y, &t, &z| *d = (y - t) * act_fn.df(z));

        let internal = model.internal();
        for l in (1..last).rev() {
            let w = &weights[l];
            let (head, tail) = self.deltas.split_at_mut(l + 1);
            let (delta, next) = (&mut head[l], &tail[0]);

            Zip::indexed(delta)
                .and(&self.pre_activations[l])
                .for_each(|n, d, &z| {
                    let sum: f64 = w.column(n).iter().zip(next).map(|(w, dn)| w * dn).sum();
                    *d = sum * internal.df(z);
                });
        }

        Ok(loss)
    }

    /// Subtracts the outer-product update of the last backward pass from `dest`.
    ///
    /// `dest` is either the model's own weights or a zeroed accumulator shaped like them.
    ///
    /// # Arguments
    /// * `learning_rate` - The step size.
    /// * `dest` - The matrices to update, one per layer.
    pub fn apply(&self, learning_rate: f64, dest: &mut [Array2<f64>]) {
        for (l, w) in dest.iter_mut().enumerate() {
            let a = &self.generated[l];
            let d = &self.deltas[l + 1];

            Zip::indexed(w).for_each(|(r, c), w| *w -= learning_rate * a[c] * d[r]);
        }
    }
}

/// `Σ (t - y)² / 2` averaged over the output width.
pub(crate) fn half_mse(output: ArrayView1<f64>, target: ArrayView1<f64>) -> f64 {
    let sum: f64 = output
        .iter()
        .zip(&target)
        .map(|(y, t)| {
            let diff = t - y;
            diff * diff / 2.
        })
        .sum();

    sum / target.len() as f64
}
