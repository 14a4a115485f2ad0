use super::signal::Signal;
use crate::error::{EvoDagError, Result};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One raw variable as seen by `Variable` nodes: its training values and,
/// optionally, the same variable over a held-out test split.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub hy: Signal,
    pub hy_test: Option<Signal>,
}

impl Input {
    pub fn new(hy: Signal, hy_test: Option<Signal>) -> Self {
        Self { hy, hy_test }
    }
}

/// Split a row-major matrix into one `Input` per column.
pub fn convert_features(train: &[Vec<f64>], test: Option<&[Vec<f64>]>) -> Result<Vec<Input>> {
    let train_cols = columns(train, "training")?;
    let test_cols = match test {
        Some(rows) => {
            let cols = columns(rows, "test")?;
            if cols.len() != train_cols.len() {
                return Err(EvoDagError::Data(format!(
                    "test matrix has {} columns, training matrix has {}",
                    cols.len(),
                    train_cols.len()
                )));
            }
            Some(cols)
        }
        None => None,
    };

    let inputs = match test_cols {
        Some(test_cols) => train_cols
            .into_iter()
            .zip(test_cols)
            .map(|(tr, ts)| Input::new(tr, Some(ts)))
            .collect(),
        None => train_cols.into_iter().map(|tr| Input::new(tr, None)).collect(),
    };
    Ok(inputs)
}

fn columns(rows: &[Vec<f64>], split: &str) -> Result<Vec<Signal>> {
    let width = match rows.first() {
        Some(row) => row.len(),
        None => {
            return Err(EvoDagError::Data(format!("{} matrix has no rows", split)));
        }
    };

    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(EvoDagError::Data(format!(
            "{} row {} has {} values, expected {}",
            split,
            i,
            row.len(),
            width
        )));
    }

    let cols: Vec<Signal> = (0..width)
        .map(|j| rows.iter().map(|row| row[j]).collect())
        .collect();
    warn_non_finite(&cols, split);
    Ok(cols)
}

/// Same as [`convert_features`] for polars frames. Every column is cast to
/// `Float64`; nulls become NaN.
pub fn convert_dataframe(train: &DataFrame, test: Option<&DataFrame>) -> Result<Vec<Input>> {
    let train_cols = frame_columns(train)?;
    warn_non_finite(&train_cols, "training");

    let test_cols = match test {
        Some(df) => {
            if df.get_column_names() != train.get_column_names() {
                return Err(EvoDagError::Data(
                    "test frame columns differ from training frame columns".to_string(),
                ));
            }
            let cols = frame_columns(df)?;
            warn_non_finite(&cols, "test");
            Some(cols)
        }
        None => None,
    };

    let inputs = match test_cols {
        Some(test_cols) => train_cols
            .into_iter()
            .zip(test_cols)
            .map(|(tr, ts)| Input::new(tr, Some(ts)))
            .collect(),
        None => train_cols.into_iter().map(|tr| Input::new(tr, None)).collect(),
    };
    Ok(inputs)
}

fn frame_columns(df: &DataFrame) -> Result<Vec<Signal>> {
    if df.height() == 0 {
        return Err(EvoDagError::Data("frame has no rows".to_string()));
    }
    df.get_columns()
        .iter()
        .map(|column| -> Result<Signal> {
            let cast = column.cast(&DataType::Float64)?;
            let values = cast.f64()?;
            Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        })
        .collect()
}

fn warn_non_finite(cols: &[Signal], split: &str) {
    for (i, col) in cols.iter().enumerate() {
        if !col.isfinite() {
            log::warn!("{} feature {} contains non-finite values", split, i);
        }
    }
}

/// Everything a node needs from the data side: the converted inputs, the
/// training target and the mask of rows that take part in weight fitting.
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Vec<Input>,
    target: Signal,
    mask: Signal,
}

impl Dataset {
    pub fn new(inputs: Vec<Input>, target: Signal) -> Result<Self> {
        let rows = target.len();
        if rows == 0 {
            return Err(EvoDagError::Data("target is empty".to_string()));
        }
        if let Some((i, input)) = inputs.iter().enumerate().find(|(_, x)| x.hy.len() != rows) {
            return Err(EvoDagError::Data(format!(
                "feature {} has {} training rows, target has {}",
                i,
                input.hy.len(),
                rows
            )));
        }
        let test_rows = inputs
            .iter()
            .filter_map(|x| x.hy_test.as_ref().map(Signal::len))
            .collect::<Vec<_>>();
        if test_rows.windows(2).any(|w| w[0] != w[1]) {
            return Err(EvoDagError::Data(
                "features disagree on the number of test rows".to_string(),
            ));
        }

        Ok(Self {
            inputs,
            target,
            mask: Signal::constant(1.0, rows),
        })
    }

    /// Build a dataset straight from a row-major matrix.
    pub fn from_rows(train: &[Vec<f64>], test: Option<&[Vec<f64>]>, target: Vec<f64>) -> Result<Self> {
        Self::new(convert_features(train, test)?, Signal::new(target))
    }

    /// Replace the fitting mask. Entries must be 0 or 1.
    pub fn with_mask(mut self, mask: Signal) -> Result<Self> {
        if mask.len() != self.target.len() {
            return Err(EvoDagError::Data(format!(
                "mask has {} rows, target has {}",
                mask.len(),
                self.target.len()
            )));
        }
        if mask.iter().any(|&m| m != 0.0 && m != 1.0) {
            return Err(EvoDagError::Data("mask entries must be 0 or 1".to_string()));
        }
        self.mask = mask;
        Ok(self)
    }

    /// Hold out a random `fraction` of the training rows from weight fitting.
    pub fn with_validation_split(self, fraction: f64, seed: Option<u64>) -> Result<Self> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(EvoDagError::Data(format!(
                "validation fraction must be in [0, 1), got {}",
                fraction
            )));
        }
        let rows = self.target.len();
        let held_out = (rows as f64 * fraction).floor() as usize;

        let mut order: Vec<usize> = (0..rows).collect();
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        order.shuffle(&mut rng);

        let mut mask = vec![1.0; rows];
        for &i in &order[..held_out] {
            mask[i] = 0.0;
        }
        log::debug!("masked {} of {} rows for validation", held_out, rows);
        self.with_mask(Signal::new(mask))
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn target(&self) -> &Signal {
        &self.target
    }

    pub fn mask(&self) -> &Signal {
        &self.mask
    }

    pub fn rows(&self) -> usize {
        self.target.len()
    }

    pub fn has_test(&self) -> bool {
        self.inputs.iter().any(|x| x.hy_test.is_some())
    }

    /// Rows excluded from fitting, used by the search loop for `fitness_vs`.
    pub fn validation_rows(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, m)| **m == 0.0)
            .map(|(i, _)| i)
            .collect()
    }
}
