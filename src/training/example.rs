use ndarray::{Array1, ArrayView1};

use crate::{MlErr, Model, Result};

/// A single input and the output the model should produce for it.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingExample {
    input: Array1<f64>,
    target: Array1<f64>,
}

impl TrainingExample {
    pub fn new(input: Vec<f64>, target: Vec<f64>) -> Self {
        Self {
            input: Array1::from(input),
            target: Array1::from(target),
        }
    }

    pub fn input(&self) -> ArrayView1<'_, f64> {
        self.input.view()
    }

    pub fn target(&self) -> ArrayView1<'_, f64> {
        self.target.view()
    }

    /// Makes sure this example fits the model's input and output widths.
    ///
    /// # Arguments
    /// * `model` - The model about to be trained with this example.
    ///
    /// # Returns
    /// A `SizeMismatch` error naming the side that doesn't fit.
    pub fn check(&self, model: &Model) -> Result<()> {
        let expected = model.input_size();
        if self.input.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "example input",
                got: self.input.len(),
                expected,
            });
        }

        let expected = model.output_size();
        if self.target.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "example target",
                got: self.target.len(),
                expected,
            });
        }

        Ok(())
    }
}

/// Checks a whole training set against the model.
pub(super) fn check_all(model: &Model, examples: &[TrainingExample]) -> Result<()> {
    examples.iter().try_for_each(|example| example.check(model))
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::arch::activations::ActFn;

    #[test]
    fn check_reports_the_offending_side() {
        let weights = vec![Array2::zeros((3, 3)), Array2::zeros((1, 4))];
        let model = Model::from_weights(weights, ActFn::relu(), ActFn::sigmoid()).unwrap();

        assert!(TrainingExample::new(vec![1., 0.], vec![1.]).check(&model).is_ok());
        assert!(matches!(
            TrainingExample::new(vec![1.], vec![1.]).check(&model),
            Err(MlErr::SizeMismatch {
                what: "example input",
                got: 1,
                expected: 2
            })
        ));
        assert!(matches!(
            TrainingExample::new(vec![1., 0.], vec![]).check(&model),
            Err(MlErr::SizeMismatch {
                what: "example target",
                ..
            })
        ));
    }
}
