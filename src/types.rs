use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest number of children an `Add` node may sum.
pub const MAX_ADD_ARITY: usize = 5;

/// Operator carried by a function node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    Add,
    Mul,
    Div,
    Fabs,
    Exp,
    Sqrt,
    Sin,
    Cos,
    Ln,
    Sq,
    Sigmoid,
    If,
}

/// How a node's fitted weight is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightShape {
    /// One coefficient scaling the raw transform
    Scalar,
    /// One coefficient per child
    PerChild(usize),
}

impl WeightShape {
    pub fn len(&self) -> usize {
        match self {
            WeightShape::Scalar => 1,
            WeightShape::PerChild(n) => *n,
        }
    }
}

impl Function {
    pub const ALL: [Function; 12] = [
        Function::Add,
        Function::Mul,
        Function::Div,
        Function::Fabs,
        Function::Exp,
        Function::Sqrt,
        Function::Sin,
        Function::Cos,
        Function::Ln,
        Function::Sq,
        Function::Sigmoid,
        Function::If,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::Add => "add",
            Function::Mul => "mul",
            Function::Div => "div",
            Function::Fabs => "fabs",
            Function::Exp => "exp",
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Ln => "ln",
            Function::Sq => "sq",
            Function::Sigmoid => "sigmoid",
            Function::If => "if",
        }
    }

    /// Inclusive bounds on the number of children
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Function::Add => (2, MAX_ADD_ARITY),
            Function::Mul | Function::Div => (2, 2),
            Function::If => (3, 3),
            _ => (1, 1),
        }
    }

    pub fn accepts_arity(&self, nargs: usize) -> bool {
        let (min, max) = self.arity();
        (min..=max).contains(&nargs)
    }

    /// `Add` weighs every child independently, everything else scales its raw transform.
    pub fn weight_shape(&self, nargs: usize) -> WeightShape {
        match self {
            Function::Add => WeightShape::PerChild(nargs),
            _ => WeightShape::Scalar,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coefficient(s) obtained by OLS against the training target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Weight {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Weight {
    pub fn len(&self) -> usize {
        match self {
            Weight::Scalar(_) => 1,
            Weight::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        match self {
            Weight::Scalar(w) => std::slice::from_ref(w),
            Weight::Vector(v) => v,
        }
    }

    /// The coefficient used by scalar-weight nodes. A one-element vector counts.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Weight::Scalar(w) => Some(*w),
            Weight::Vector(v) if v.len() == 1 => Some(v[0]),
            Weight::Vector(_) => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.as_slice().iter().all(|w| w.is_finite())
    }

    /// Whether this weight can be used by a node expecting `shape`.
    pub fn fits(&self, shape: WeightShape) -> bool {
        match shape {
            WeightShape::Scalar => self.scalar().is_some(),
            WeightShape::PerChild(n) => self.len() == n,
        }
    }

    /// Shapes solver output into the layout a node expects.
    pub fn from_solution(coef: Vec<f64>, shape: WeightShape) -> Self {
        match shape {
            WeightShape::Scalar => Weight::Scalar(coef.first().copied().unwrap_or(f64::NAN)),
            WeightShape::PerChild(_) => Weight::Vector(coef),
        }
    }
}

impl From<f64> for Weight {
    fn from(w: f64) -> Self {
        Weight::Scalar(w)
    }
}

impl From<Vec<f64>> for Weight {
    fn from(w: Vec<f64>) -> Self {
        Weight::Vector(w)
    }
}
