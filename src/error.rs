//! Error taxonomy shared by every module of the crate.
//!
//! Errors are raised at the call site that detects them and propagate with `?`
//! unchanged; nothing in the crate retries or substitutes defaults. Numeric
//! guards (epsilon clamping before `ln`, max-subtraction before `exp`) are not
//! errors and never surface here.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Every failure the engine can report.
#[derive(Debug, Error)]
pub enum Error {
    /// A descriptor is empty, inconsistent or was never supplied.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Two operands of a tensor operation disagree on shape.
    #[error("dimension mismatch in `{op}`: expected {expected:?}, got {got:?}")]
    Dimension {
        /// The operation that rejected its operands.
        op: &'static str,
        /// The shape the operation required.
        expected: Vec<usize>,
        /// The shape it received.
        got: Vec<usize>,
    },

    /// A reshape would change the number of elements.
    #[error("cannot reshape {from:?} into {to:?}: element count differs")]
    Reshape {
        /// Shape before the reshape.
        from: Vec<usize>,
        /// Requested shape.
        to: Vec<usize>,
    },

    /// A view range is empty or runs past the end of its owner.
    #[error("invalid view range {start}..{end} over {len} elements")]
    Range {
        /// First index of the requested range.
        start: usize,
        /// One past the last index of the requested range.
        end: usize,
        /// Length of the viewed dimension.
        len: usize,
    },

    /// The underlying stream failed or ended early.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted parameter stream does not describe this model.
    #[error("invalid parameter file: {0}")]
    Format(String),
}

impl Error {
    pub(crate) fn dimension(op: &'static str, expected: &[usize], got: &[usize]) -> Self {
        Self::Dimension {
            op,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
