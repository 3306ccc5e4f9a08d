use super::FeedForward;
use crate::data::{Dataset, TargetBuffer, Targets};
use crate::error::{Error, Result};
use crate::tensors::{Matrix, MatrixView, TensorFloat};
use log::{debug, info, log_enabled, trace, Level};
use std::time::{Duration, Instant};

/// Loss and accuracy of a model on a dataset in inference mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean data loss.
    pub loss: TensorFloat,
    /// Mean accuracy, `None` for regression losses.
    pub accuracy: Option<TensorFloat>,
}

/// Outcome of one optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStats {
    /// Mean data loss of the batch, before the step.
    pub data_loss: TensorFloat,
    /// Regularization penalty of the parameters the step started from.
    pub regularization_loss: TensorFloat,
    /// Batch accuracy, `None` for regression losses.
    pub accuracy: Option<TensorFloat>,
    /// Learning rate the step was taken with.
    pub learning_rate: TensorFloat,
}

impl BatchStats {
    /// Data loss plus regularization penalty.
    #[must_use]
    pub fn loss(&self) -> TensorFloat {
        self.data_loss + self.regularization_loss
    }
}

/// Summary of one pass over the training data.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Number of optimizer steps taken, counting a shorter final batch.
    pub batches: usize,
    /// Row-weighted mean of the batch data losses.
    pub data_loss: TensorFloat,
    /// Row-weighted mean of the batch regularization penalties.
    pub regularization_loss: TensorFloat,
    /// Row-weighted mean batch accuracy, `None` for regression losses.
    pub accuracy: Option<TensorFloat>,
    /// Held-out evaluation after the epoch, if a split was configured.
    pub validation: Option<Evaluation>,
    /// Learning rate of the last step in the epoch.
    pub learning_rate: TensorFloat,
    /// Wall time of the epoch, validation included.
    pub elapsed: Duration,
}

impl EpochStats {
    /// Data loss plus regularization penalty.
    #[must_use]
    pub fn loss(&self) -> TensorFloat {
        self.data_loss + self.regularization_loss
    }
}

/// Per-epoch history of a [`FeedForward::train`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    epochs: Vec<EpochStats>,
}

impl TrainReport {
    /// Statistics of every epoch, in order.
    #[must_use]
    pub fn epochs(&self) -> &[EpochStats] {
        &self.epochs
    }

    /// Statistics of the final epoch.
    #[must_use]
    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }
}

/// Row-weighted running means over the batches of an epoch.
#[derive(Debug, Default)]
struct Tally {
    batches: usize,
    rows: usize,
    data_loss: TensorFloat,
    regularization_loss: TensorFloat,
    accuracy: Option<TensorFloat>,
    learning_rate: TensorFloat,
}

impl Tally {
    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, rows: usize, stats: &BatchStats) {
        let w = rows as TensorFloat;
        self.batches += 1;
        self.rows += rows;
        self.data_loss += stats.data_loss * w;
        self.regularization_loss += stats.regularization_loss * w;
        if let Some(acc) = stats.accuracy {
            *self.accuracy.get_or_insert(0.0) += acc * w;
        }
        self.learning_rate = stats.learning_rate;
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self, epoch: usize, validation: Option<Evaluation>, elapsed: Duration) -> EpochStats {
        let n = self.rows.max(1) as TensorFloat;
        EpochStats {
            epoch,
            batches: self.batches,
            data_loss: self.data_loss / n,
            regularization_loss: self.regularization_loss / n,
            accuracy: self.accuracy.map(|a| a / n),
            validation,
            learning_rate: self.learning_rate,
            elapsed,
        }
    }
}

fn describe(accuracy: Option<TensorFloat>) -> String {
    accuracy.map_or_else(|| "n/a".to_owned(), |a| format!("{a:.3}"))
}

impl FeedForward {
    /// Trains for the configured number of epochs.
    ///
    /// The trailing `validation_split` fraction of the rows is held out and
    /// evaluated after every epoch. With `shuffle` the remaining rows are
    /// visited in a fresh random order each epoch; otherwise batches are
    /// contiguous windows of the input.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the model or its training is not
    /// configured or the data is empty, [`Error::Dimension`] for mismatched
    /// inputs or targets and [`Error::Range`] for a class index outside the
    /// output width. The whole dataset is checked before the first step, so
    /// these leave the parameters untouched.
    pub fn train(&mut self, inputs: MatrixView<'_>, targets: Targets<'_>) -> Result<TrainReport> {
        let descriptor = *self
            .training_descriptor()
            .ok_or_else(|| Error::config("training has not been configured"))?;
        self.check_inputs(inputs)?;
        self.check_targets(inputs, &targets)?;
        let data = Dataset::new(inputs, targets)?;
        let (train, held_out) = data.split_validation(descriptor.validation_split)?;
        let level = if descriptor.verbose { Level::Info } else { Level::Trace };
        if log_enabled!(level) {
            log::log!(
                level,
                "training on {} samples ({} held out), {} epochs of batch {}",
                train.len(),
                held_out.map_or(0, |v| v.len()),
                descriptor.epochs,
                descriptor.batch_size
            );
        }

        let n = train.len();
        let batch_size = descriptor.batch_size.min(n);
        let mut order: Vec<usize> = (0..n).collect();
        let mut batch_inputs = Matrix::default();
        let mut batch_targets = TargetBuffer::like(&train.targets());
        let mut report = TrainReport::default();

        for epoch in 1..=descriptor.epochs {
            let started = Instant::now();
            if descriptor.shuffle {
                self.generator.shuffle(&mut order);
            }

            let mut tally = Tally::default();
            let mut start = 0;
            while start < n {
                let end = (start + batch_size).min(n);
                let stats = if descriptor.shuffle {
                    let picked = &order[start..end];
                    batch_inputs.gather_rows(train.inputs(), picked)?;
                    batch_targets.gather(&train.targets(), picked)?;
                    self.train_batch(batch_inputs.view(), &batch_targets.as_targets())?
                } else {
                    let batch = train.rows_range(start, end)?;
                    self.train_batch(batch.inputs(), &batch.targets())?
                };
                if descriptor.verbose {
                    debug!(
                        "epoch {epoch} batch {}: loss {:.5}, acc {}, lr {:.6}",
                        start / batch_size + 1,
                        stats.loss(),
                        describe(stats.accuracy),
                        stats.learning_rate
                    );
                } else {
                    trace!("epoch {epoch} batch {}: loss {:.5}", start / batch_size + 1, stats.loss());
                }
                tally.add(end - start, &stats);
                start = end;
            }

            let validation = match held_out {
                Some(v) => Some(self.evaluate(v.inputs(), v.targets())?),
                None => None,
            };
            let stats = tally.finish(epoch, validation, started.elapsed());
            let summary = format!(
                "epoch {}/{}: loss {:.5} (data {:.5}, reg {:.5}), acc {}, lr {:.6}{}",
                epoch,
                descriptor.epochs,
                stats.loss(),
                stats.data_loss,
                stats.regularization_loss,
                describe(stats.accuracy),
                stats.learning_rate,
                stats.validation.map_or_else(String::new, |v| format!(
                    ", validation loss {:.5} acc {}",
                    v.loss,
                    describe(v.accuracy)
                )),
            );
            if descriptor.verbose {
                info!("{summary}");
            } else {
                trace!("{summary}");
            }
            report.epochs.push(stats);
        }
        Ok(report)
    }
}
