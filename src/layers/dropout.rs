use super::Propagate;
use crate::error::{Error, Result};
use crate::rng::Generator;
use crate::tensors::transform::{apply, transform2};
use crate::tensors::{Matrix, MatrixView, TensorFloat, TensorOpsMut};

/// Inverted dropout.
///
/// In training each forward pass draws a fresh mask whose entries are
/// `1 / (1 - rate)` with probability `1 - rate` and `0` otherwise, so the
/// expected output equals the input. In inference the layer is the identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: TensorFloat,
    rng: Generator,
    mask: Matrix,
    masked: bool,
    output: Matrix,
    dinputs: Matrix,
}

impl Dropout {
    /// Creates a dropout layer owning its own generator.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] unless `0 <= rate < 1`.
    pub fn new(rate: TensorFloat, rng: Generator) -> Result<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(Error::config(format!("dropout rate must be in [0, 1), got {rate}")));
        }
        Ok(Self {
            rate,
            rng,
            mask: Matrix::default(),
            masked: false,
            output: Matrix::default(),
            dinputs: Matrix::default(),
        })
    }

    /// Probability of zeroing an element.
    #[must_use]
    pub fn rate(&self) -> TensorFloat {
        self.rate
    }

    /// The scaled mask from the last training forward pass.
    #[must_use]
    pub fn mask(&self) -> &Matrix {
        &self.mask
    }

    fn draw_mask(&mut self, rows: usize, cols: usize) {
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        self.mask.resize(rows, cols);
        // The generator is sequential state; only the thresholding is split.
        for m in self.mask.data_mut() {
            *m = self.rng.uniform();
        }
        apply(&mut self.mask, |u| if u < keep { scale } else { 0.0 });
    }
}

impl Propagate for Dropout {
    fn forward(&mut self, input: MatrixView<'_>, training: bool) -> Result<()> {
        self.masked = training;
        if !training {
            self.output.copy_from(input);
            return Ok(());
        }
        self.draw_mask(input.rows(), input.cols());
        transform2(&input, &self.mask, &mut self.output, |x, m| x * m)
    }

    fn backward(&mut self, _input: MatrixView<'_>, dvalues: MatrixView<'_>) -> Result<()> {
        if self.masked {
            transform2(&dvalues, &self.mask, &mut self.dinputs, |g, m| g * m)
        } else {
            self.dinputs.copy_from(dvalues);
            Ok(())
        }
    }

    fn output(&self) -> &Matrix {
        &self.output
    }

    fn dinputs(&self) -> &Matrix {
        &self.dinputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensors::TensorOps;

    #[test]
    fn rate_must_be_a_probability_below_one() {
        assert!(Dropout::new(1.0, Generator::seeded(0)).is_err());
        assert!(Dropout::new(-0.1, Generator::seeded(0)).is_err());
        assert!(Dropout::new(0.0, Generator::seeded(0)).is_ok());
    }

    #[test]
    fn inference_is_identity() {
        let mut d = Dropout::new(0.5, Generator::seeded(1)).unwrap();
        let x = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        d.forward(x.view(), false).unwrap();
        assert_eq!(d.output(), &x);
    }

    #[test]
    fn backward_reuses_the_forward_mask() {
        let mut d = Dropout::new(0.3, Generator::seeded(2)).unwrap();
        let x = Matrix::from_vec(4, 8, vec![1.0; 32]).unwrap();
        d.forward(x.view(), true).unwrap();
        let dv = Matrix::from_vec(4, 8, vec![2.0; 32]).unwrap();
        d.backward(x.view(), dv.view()).unwrap();
        for (g, m) in d.dinputs().data().iter().zip(d.mask().data()) {
            assert_eq!(*g, 2.0 * m);
        }
        assert_eq!(d.output().data(), d.mask().data());
    }

    #[test]
    fn fresh_mask_every_forward() {
        let mut d = Dropout::new(0.5, Generator::seeded(3)).unwrap();
        let x = Matrix::from_vec(1, 64, vec![1.0; 64]).unwrap();
        d.forward(x.view(), true).unwrap();
        let first = d.mask().clone();
        d.forward(x.view(), true).unwrap();
        assert_ne!(&first, d.mask());
    }
}
