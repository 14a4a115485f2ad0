use std::ops::{Add, Div, Mul};

/// Dense vector of values over one data split.
///
/// Arithmetic never fails: NaN and infinities flow through every operation
/// and are only detected by an explicit [`Signal::isfinite`] check.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signal {
    values: Vec<f64>,
}

impl Signal {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn constant(value: f64, len: usize) -> Self {
        Self {
            values: vec![value; len],
        }
    }

    pub fn zeros(len: usize) -> Self {
        Self::constant(0.0, len)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.values.iter()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    fn zip_with(&self, other: &Signal, f: impl Fn(f64, f64) -> f64) -> Signal {
        debug_assert_eq!(self.len(), other.len(), "signal length mismatch");
        Signal::new(
            self.values
                .iter()
                .zip(&other.values)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        )
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Signal {
        Signal::new(self.values.iter().map(|&v| f(v)).collect())
    }

    pub fn add(&self, other: &Signal) -> Signal {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn multiply(&self, other: &Signal) -> Signal {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn divide(&self, other: &Signal) -> Signal {
        self.zip_with(other, |a, b| a / b)
    }

    pub fn scale(&self, w: f64) -> Signal {
        self.map(|v| v * w)
    }

    pub fn fabs(&self) -> Signal {
        self.map(f64::abs)
    }

    pub fn exp(&self) -> Signal {
        self.map(f64::exp)
    }

    pub fn sqrt(&self) -> Signal {
        self.map(f64::sqrt)
    }

    pub fn sin(&self) -> Signal {
        self.map(f64::sin)
    }

    pub fn cos(&self) -> Signal {
        self.map(f64::cos)
    }

    pub fn ln(&self) -> Signal {
        self.map(f64::ln)
    }

    pub fn square(&self) -> Signal {
        self.map(|v| v * v)
    }

    pub fn sigmoid(&self) -> Signal {
        self.map(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Elementwise `if self > 0 { then } else { otherwise }`.
    /// A NaN condition selects neither branch and yields NaN.
    pub fn select(&self, then: &Signal, otherwise: &Signal) -> Signal {
        debug_assert_eq!(self.len(), then.len(), "signal length mismatch");
        debug_assert_eq!(self.len(), otherwise.len(), "signal length mismatch");
        Signal::new(
            self.values
                .iter()
                .zip(then.values.iter().zip(&otherwise.values))
                .map(|(&c, (&t, &o))| {
                    if c.is_nan() {
                        f64::NAN
                    } else if c > 0.0 {
                        t
                    } else {
                        o
                    }
                })
                .collect(),
        )
    }

    pub fn dot(&self, other: &Signal) -> f64 {
        debug_assert_eq!(self.len(), other.len(), "signal length mismatch");
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn isfinite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

impl From<Vec<f64>> for Signal {
    fn from(values: Vec<f64>) -> Self {
        Signal::new(values)
    }
}

impl From<&[f64]> for Signal {
    fn from(values: &[f64]) -> Self {
        Signal::new(values.to_vec())
    }
}

impl FromIterator<f64> for Signal {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Signal::new(iter.into_iter().collect())
    }
}

impl<'a> Add<&'a Signal> for &'a Signal {
    type Output = Signal;

    fn add(self, rhs: &'a Signal) -> Signal {
        Signal::add(self, rhs)
    }
}

impl<'a> Mul<&'a Signal> for &'a Signal {
    type Output = Signal;

    fn mul(self, rhs: &'a Signal) -> Signal {
        self.multiply(rhs)
    }
}

impl Mul<f64> for &Signal {
    type Output = Signal;

    fn mul(self, rhs: f64) -> Signal {
        self.scale(rhs)
    }
}

impl<'a> Div<&'a Signal> for &'a Signal {
    type Output = Signal;

    fn div(self, rhs: &'a Signal) -> Signal {
        self.divide(rhs)
    }
}
