//! Saving and loading of trained parameters.
//!
//! # Parameter Stream
//!
//! [`save_parameters`] writes every [`Dense`](crate::layers::Dense) layer of a
//! model in network order, each as its weights followed by its biases,
//! row-major little-endian `f32`. The stream carries no shapes; it can only
//! be read back into a model configured with the same layer stack.
//!
//! # `.bmlp` File Format
//!
//! [`save_model`] prefixes the stream with a header so that a mismatched
//! model is rejected before any parameter is overwritten:
//!
//! ```text
//! ┌──────────────┬───────────┬─────────────────────────┬──────────────────┐
//! │ "BMLPv1\0\0" │ u64: N    │ N x (u64 in, u64 out)   │ parameter stream │
//! └──────────────┴───────────┴─────────────────────────┴──────────────────┘
//! ```
//!
//! All integers are little-endian. The header is checked through
//! [`briny`]'s [`Validate`]/[`TrustedData`] before its shapes are compared
//! with the model.
//!
//! # Example
//!
//! ```rust
//! use briny_mlp::layers::{Activation, WeightInit};
//! use briny_mlp::model::{FeedForward, ModelDescriptor};
//! use briny_mlp::modelio::{load_parameters, save_parameters};
//! use briny_mlp::rng::Generator;
//!
//! let desc = ModelDescriptor::new(3)
//!     .dense(4, WeightInit::He)
//!     .layer(Activation::Relu)
//!     .dense(2, WeightInit::Random);
//! let trained = FeedForward::from_descriptor(&desc, Generator::seeded(1)).unwrap();
//! let mut fresh = FeedForward::from_descriptor(&desc, Generator::seeded(2)).unwrap();
//!
//! let mut bytes = Vec::new();
//! save_parameters(&trained, &mut bytes).unwrap();
//! load_parameters(&mut fresh, &mut bytes.as_slice()).unwrap();
//! assert_eq!(
//!     trained.dense_layers().next().unwrap().weights(),
//!     fresh.dense_layers().next().unwrap().weights(),
//! );
//! ```

use crate::error::{Error, Result};
use crate::model::FeedForward;
use briny::prelude::*;
use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const BMLP_MAGIC: &[u8; 8] = b"BMLPv1\0\0";

/// Upper bound on the declared layer count, checked before allocating.
const MAX_LAYERS: u64 = 1 << 16;

/// Decoded file header.
struct Header {
    magic: [u8; 8],
    shapes: Vec<(u64, u64)>,
}

impl Validate for Header {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if &self.magic != BMLP_MAGIC {
            return Err(ValidationError);
        }
        if self.shapes.iter().any(|&(i, o)| i == 0 || o == 0) {
            return Err(ValidationError);
        }
        Ok(())
    }
}

fn model_shapes(model: &FeedForward) -> Vec<(u64, u64)> {
    model
        .dense_layers()
        .map(|d| (d.inputs() as u64, d.neurons() as u64))
        .collect()
}

fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// A file that ends inside the fixed-size prefix is not a `.bmlp` file.
fn short_header(err: std::io::Error, path: &Path) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::Format(format!("{} is too short for a .bmlp header", path.display()))
    } else {
        Error::Io(err)
    }
}

/// Writes the parameters of every dense layer, in network order.
///
/// # Errors
///
/// [`Error::Io`] if the writer fails.
pub fn save_parameters<W: Write + ?Sized>(model: &FeedForward, writer: &mut W) -> Result<()> {
    for layer in model.dense_layers() {
        layer.save(writer)?;
    }
    Ok(())
}

/// Reads parameters written by [`save_parameters`] into `model`.
///
/// # Errors
///
/// [`Error::Io`] if the stream fails or ends early. Layers read before the
/// failure keep their new values.
pub fn load_parameters<R: Read + ?Sized>(model: &mut FeedForward, reader: &mut R) -> Result<()> {
    for layer in model.dense_layers_mut() {
        layer.load(reader)?;
    }
    Ok(())
}

/// Saves `model`'s parameters to a `.bmlp` file at `path`.
///
/// # Errors
///
/// [`Error::Io`] if the file cannot be created or written.
pub fn save_model<P: AsRef<Path>>(path: P, model: &FeedForward) -> Result<()> {
    let path = path.as_ref();
    let mut file = BufWriter::new(File::create(path)?);
    let shapes = model_shapes(model);

    file.write_all(BMLP_MAGIC)?;
    file.write_all(&(shapes.len() as u64).to_le_bytes())?;
    for &(inputs, neurons) in &shapes {
        file.write_all(&inputs.to_le_bytes())?;
        file.write_all(&neurons.to_le_bytes())?;
    }
    save_parameters(model, &mut file)?;
    file.flush()?;

    debug!("saved {} dense layers to {}", shapes.len(), path.display());
    Ok(())
}

/// Loads a `.bmlp` file written by [`save_model`] into `model`.
///
/// `model` must already be configured with the same dense layer shapes.
///
/// # Errors
///
/// [`Error::Format`] for a missing or bad header or a layer stack that
/// differs from the file, [`Error::Io`] if the file cannot be read or the
/// parameter stream ends early.
#[allow(clippy::cast_possible_truncation)]
pub fn load_model<P: AsRef<Path>>(path: P, model: &mut FeedForward) -> Result<()> {
    let path = path.as_ref();
    let mut file = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic).map_err(|e| short_header(e, path))?;
    let count = read_u64(&mut file).map_err(|e| match e {
        Error::Io(e) => short_header(e, path),
        e => e,
    })?;
    if count > MAX_LAYERS {
        return Err(Error::Format(format!("implausible layer count {count}")));
    }
    let mut shapes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        shapes.push((read_u64(&mut file)?, read_u64(&mut file)?));
    }

    let header = TrustedData::new(Header { magic, shapes })
        .map_err(|_| Error::Format(format!("{} is not a valid .bmlp file", path.display())))?
        .into_inner();
    let expected = model_shapes(model);
    if header.shapes != expected {
        return Err(Error::Format(format!(
            "file holds dense layers {:?}, model has {:?}",
            header.shapes, expected
        )));
    }

    load_parameters(model, &mut file)?;
    debug!("loaded {} dense layers from {}", expected.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Activation, WeightInit};
    use crate::model::ModelDescriptor;
    use crate::rng::Generator;
    use crate::tensors::Matrix;

    fn descriptor(hidden: usize) -> ModelDescriptor {
        ModelDescriptor::new(3)
            .dense(hidden, WeightInit::He)
            .layer(Activation::Sigmoid)
            .dense(2, WeightInit::Xavier)
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("briny_mlp_{}_{name}.bmlp", std::process::id()))
    }

    #[test]
    fn file_round_trip_reproduces_predictions() {
        let mut a = FeedForward::from_descriptor(&descriptor(5), Generator::seeded(4)).unwrap();
        let mut b = FeedForward::from_descriptor(&descriptor(5), Generator::seeded(5)).unwrap();
        let x = Matrix::from_vec(2, 3, vec![0.1, -0.4, 2.0, 1.5, 0.0, -1.0]).unwrap();

        let path = temp_path("round_trip");
        save_model(&path, &a).unwrap();
        load_model(&path, &mut b).unwrap();
        std::fs::remove_file(&path).unwrap();

        let pa = a.predict(x.view()).unwrap().as_slice().to_vec();
        let pb = b.predict(x.view()).unwrap().as_slice().to_vec();
        assert_eq!(pa, pb);
    }

    #[test]
    fn mismatched_stack_is_rejected_untouched() {
        let a = FeedForward::from_descriptor(&descriptor(5), Generator::seeded(4)).unwrap();
        let mut b = FeedForward::from_descriptor(&descriptor(6), Generator::seeded(5)).unwrap();
        let before = b.dense_layers().next().unwrap().weights().clone();

        let path = temp_path("mismatch");
        save_model(&path, &a).unwrap();
        let err = load_model(&path, &mut b);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, Err(Error::Format(_))));
        assert_eq!(b.dense_layers().next().unwrap().weights(), &before);
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        let mut m = FeedForward::from_descriptor(&descriptor(5), Generator::seeded(4)).unwrap();
        let path = temp_path("magic");
        let mut bytes = b"NOTBMLP!".to_vec();
        bytes.extend_from_slice(&0u64.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        let err = load_model(&path, &mut m);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, Err(Error::Format(_))));
    }

    #[test]
    fn file_shorter_than_the_header_is_a_format_error() {
        let mut m = FeedForward::from_descriptor(&descriptor(5), Generator::seeded(4)).unwrap();
        for (name, bytes) in [("tiny", &b"BML"[..]), ("no_count", &b"BMLPv1\0\0\x01"[..])] {
            let path = temp_path(name);
            std::fs::write(&path, bytes).unwrap();
            let err = load_model(&path, &mut m);
            std::fs::remove_file(&path).unwrap();
            assert!(matches!(err, Err(Error::Format(_))), "{name}: {err:?}");
        }
    }

    #[test]
    fn truncated_stream_is_an_io_error() {
        let a = FeedForward::from_descriptor(&descriptor(5), Generator::seeded(4)).unwrap();
        let mut b = FeedForward::from_descriptor(&descriptor(5), Generator::seeded(5)).unwrap();
        let mut bytes = Vec::new();
        save_parameters(&a, &mut bytes).unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            load_parameters(&mut b, &mut bytes.as_slice()),
            Err(Error::Io(_))
        ));
    }
}
