use super::solver::WeightSolver;
use crate::data::{Dataset, Input, Signal};
use crate::error::{EvalError, EvoDagError, Result};
use crate::types::{Function, Weight, WeightShape};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a node reads from: a raw feature column or earlier arena slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Variable { feature: usize },
    Function { function: Function, children: Vec<usize> },
}

/// Lifecycle of a node within one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No weight yet, the next evaluation fits one.
    Unweighted,
    /// Weight is known (preset or fitted) but no output is cached.
    Weighted,
    /// Weight and output are both set.
    Evaluated,
    /// Fitting or the output check failed. Terminal.
    Failed,
}

/// Everything a node needs to evaluate: the converted inputs, the nodes
/// before it in the arena, and the fitting target.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub inputs: &'a [Input],
    pub evaluated: &'a [Node],
    pub target: &'a Signal,
    pub mask: &'a Signal,
    pub solver: &'a WeightSolver,
    pub check_output_finite: bool,
}

impl<'a> EvalContext<'a> {
    pub fn new(dataset: &'a Dataset, evaluated: &'a [Node], solver: &'a WeightSolver) -> Self {
        Self {
            inputs: dataset.inputs(),
            evaluated,
            target: dataset.target(),
            mask: dataset.mask(),
            solver,
            check_output_finite: false,
        }
    }

    pub fn with_output_check(mut self, enabled: bool) -> Self {
        self.check_output_finite = enabled;
        self
    }
}

/// Outputs of one referenced node or feature.
struct Operand<'a> {
    hy: &'a Signal,
    hy_test: Option<&'a Signal>,
}

/// One vertex of the program graph.
///
/// The weight is assigned at most once: either at construction (restored
/// programs) or by the first successful fit. Cached outputs are never
/// serialised, so a stored node is independent of any dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    kind: NodeKind,
    weight: Option<Weight>,
    position: usize,
    fitness: Option<f64>,
    fitness_vs: Option<f64>,
    #[serde(skip)]
    failed: bool,
    #[serde(skip)]
    hy: Option<Signal>,
    #[serde(skip)]
    hy_test: Option<Signal>,
}

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            weight: None,
            position: 0,
            fitness: None,
            fitness_vs: None,
            failed: false,
            hy: None,
            hy_test: None,
        }
    }

    /// Leaf that passes feature column `feature` through its weight.
    pub fn variable(feature: usize) -> Self {
        Self::with_kind(NodeKind::Variable { feature })
    }

    pub fn function(function: Function, children: Vec<usize>) -> Result<Self> {
        if !function.accepts_arity(children.len()) {
            let (min, max) = function.arity();
            return Err(EvoDagError::InvalidArena(format!(
                "{} takes {}..={} children, got {}",
                function,
                min,
                max,
                children.len()
            )));
        }
        Ok(Self::with_kind(NodeKind::Function { function, children }))
    }

    /// Preset the weight at construction time.
    pub fn with_weight(mut self, weight: impl Into<Weight>) -> Self {
        self.weight = Some(weight.into());
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn function_kind(&self) -> Option<Function> {
        match &self.kind {
            NodeKind::Function { function, .. } => Some(*function),
            NodeKind::Variable { .. } => None,
        }
    }

    pub fn feature(&self) -> Option<usize> {
        match &self.kind {
            NodeKind::Variable { feature } => Some(*feature),
            NodeKind::Function { .. } => None,
        }
    }

    /// Arena indices this node reads from. Empty for variables.
    pub fn children(&self) -> &[usize] {
        match &self.kind {
            NodeKind::Function { children, .. } => children,
            NodeKind::Variable { .. } => &[],
        }
    }

    pub(crate) fn set_children(&mut self, new_children: Vec<usize>) {
        if let NodeKind::Function { children, .. } = &mut self.kind {
            *children = new_children;
        }
    }

    pub fn nargs(&self) -> usize {
        match &self.kind {
            NodeKind::Function { children, .. } => children.len(),
            NodeKind::Variable { .. } => 1,
        }
    }

    pub fn weight_shape(&self) -> WeightShape {
        match &self.kind {
            NodeKind::Function { function, children } => function.weight_shape(children.len()),
            NodeKind::Variable { .. } => WeightShape::Scalar,
        }
    }

    pub fn weight(&self) -> Option<&Weight> {
        self.weight.as_ref()
    }

    /// Assign the weight of a node that has none yet.
    pub fn set_weight(&mut self, weight: impl Into<Weight>) -> Result<()> {
        let weight = weight.into();
        if self.failed {
            return Err(EvoDagError::InvalidWeight(format!(
                "node {} has failed and cannot take a weight",
                self.position
            )));
        }
        if self.weight.is_some() {
            return Err(EvoDagError::InvalidWeight(format!(
                "node {} already has a weight",
                self.position
            )));
        }
        self.check_weight(&weight)?;
        self.weight = Some(weight);
        Ok(())
    }

    pub(crate) fn check_weight(&self, weight: &Weight) -> Result<()> {
        let shape = self.weight_shape();
        if !weight.fits(shape) {
            return Err(EvoDagError::InvalidWeight(format!(
                "node {} expects {} coefficient(s), got {}",
                self.position,
                shape.len(),
                weight.len()
            )));
        }
        if !weight.is_finite() {
            return Err(EvoDagError::InvalidWeight(format!(
                "node {} weight is not finite",
                self.position
            )));
        }
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
    }

    pub fn fitness_vs(&self) -> Option<f64> {
        self.fitness_vs
    }

    pub fn set_fitness_vs(&mut self, fitness: f64) {
        self.fitness_vs = Some(fitness);
    }

    /// Predicted values on the training split
    pub fn hy(&self) -> Option<&Signal> {
        self.hy.as_ref()
    }

    /// Predicted values on the test split
    pub fn hy_test(&self) -> Option<&Signal> {
        self.hy_test.as_ref()
    }

    pub fn state(&self) -> NodeState {
        if self.failed {
            NodeState::Failed
        } else if self.hy.is_some() {
            NodeState::Evaluated
        } else if self.weight.is_some() {
            NodeState::Weighted
        } else {
            NodeState::Unweighted
        }
    }

    /// True when every cached output value is finite.
    pub fn isfinite(&self) -> bool {
        self.hy.as_ref().map_or(false, Signal::isfinite)
            && self.hy_test.as_ref().map_or(true, Signal::isfinite)
    }

    pub(crate) fn clear_outputs(&mut self) {
        self.hy = None;
        self.hy_test = None;
    }

    /// Detached copy for persistence: structure, weight and bookkeeping only.
    pub fn tostore(&self) -> Node {
        Node {
            kind: self.kind.clone(),
            weight: self.weight.clone(),
            position: self.position,
            fitness: self.fitness,
            fitness_vs: self.fitness_vs,
            failed: false,
            hy: None,
            hy_test: None,
        }
    }

    fn operands<'c>(&self, ctx: &EvalContext<'c>) -> std::result::Result<Vec<Operand<'c>>, EvalError> {
        let position = self.position;
        match &self.kind {
            NodeKind::Variable { feature } => {
                let input = ctx.inputs.get(*feature).ok_or(EvalError::MissingInput {
                    position,
                    reference: *feature,
                })?;
                Ok(vec![Operand {
                    hy: &input.hy,
                    hy_test: input.hy_test.as_ref(),
                }])
            }
            NodeKind::Function { children, .. } => children
                .iter()
                .map(|&child| {
                    let node = ctx.evaluated.get(child).ok_or(EvalError::MissingInput {
                        position,
                        reference: child,
                    })?;
                    let hy = node
                        .hy
                        .as_ref()
                        .ok_or(EvalError::ChildFailed { position, child })?;
                    Ok(Operand {
                        hy,
                        hy_test: node.hy_test.as_ref(),
                    })
                })
                .collect(),
        }
    }

    /// Combination of the inputs before weighting.
    fn raw(&self, inputs: &[&Signal]) -> Signal {
        let function = match &self.kind {
            NodeKind::Variable { .. } => return inputs[0].clone(),
            NodeKind::Function { function, .. } => *function,
        };
        let x = inputs[0];
        match function {
            Function::Add => inputs[1..].iter().fold(x.clone(), |acc, s| acc.add(s)),
            Function::Mul => inputs[1..].iter().fold(x.clone(), |acc, s| acc.multiply(s)),
            Function::Div => x.divide(inputs[1]),
            Function::Fabs => x.fabs(),
            Function::Exp => x.exp(),
            Function::Sqrt => x.sqrt(),
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Ln => x.ln(),
            Function::Sq => x.square(),
            Function::Sigmoid => x.sigmoid(),
            Function::If => x.select(inputs[1], inputs[2]),
        }
    }

    fn combine(&self, inputs: &[&Signal], weight: &Weight) -> Signal {
        match self.weight_shape() {
            WeightShape::PerChild(_) => weighted_sum(inputs, weight.as_slice()),
            WeightShape::Scalar => self.raw(inputs).scale(weight.as_slice()[0]),
        }
    }

    /// Evaluate against outputs already computed for earlier slots.
    ///
    /// On success `weight` and `hy` (and `hy_test` when every operand has a
    /// test split) are set together. On failure nothing is written and a node
    /// that could not be fitted stays failed.
    pub fn eval(&mut self, ctx: &EvalContext<'_>) -> std::result::Result<(), EvalError> {
        let position = self.position;
        if self.failed {
            return Err(EvalError::PreviouslyFailed { position });
        }
        if let NodeKind::Function { function, children } = &self.kind {
            if !function.accepts_arity(children.len()) {
                return Err(EvalError::Arity {
                    position,
                    function: *function,
                    nargs: children.len(),
                });
            }
        }

        let shape = self.weight_shape();
        if let Some(weight) = &self.weight {
            if !weight.fits(shape) {
                return Err(EvalError::WeightShape {
                    position,
                    expected: shape.len(),
                    actual: weight.len(),
                });
            }
        }

        let operands = self.operands(ctx)?;
        let train: Vec<&Signal> = operands.iter().map(|o| o.hy).collect();

        let raw = match shape {
            WeightShape::Scalar => Some(self.raw(&train)),
            WeightShape::PerChild(_) => None,
        };

        let weight = match &self.weight {
            Some(weight) => weight.clone(),
            None => {
                let regressors: Vec<&Signal> = match &raw {
                    Some(r) => vec![r],
                    None => train.clone(),
                };
                match ctx.solver.compute_weight(&regressors, ctx.target, ctx.mask) {
                    Ok(coef) => Weight::from_solution(coef, shape),
                    Err(source) => {
                        log::debug!("node {} ({}): {}", position, self, source);
                        self.failed = true;
                        return Err(EvalError::WeightSolve { position, source });
                    }
                }
            }
        };

        let hy = match raw {
            Some(r) => r.scale(weight.as_slice()[0]),
            None => weighted_sum(&train, weight.as_slice()),
        };

        let hy_test = if operands.iter().all(|o| o.hy_test.is_some()) {
            let test: Vec<&Signal> = operands.iter().filter_map(|o| o.hy_test).collect();
            Some(self.combine(&test, &weight))
        } else {
            None
        };

        if ctx.check_output_finite
            && (!hy.isfinite() || !hy_test.as_ref().map_or(true, Signal::isfinite))
        {
            log::debug!("node {} ({}): non-finite output", position, self);
            self.failed = true;
            return Err(EvalError::NonFiniteOutput { position });
        }

        log::trace!("node {} ({}) evaluated with weight {:?}", position, self, weight);
        if self.weight.is_none() {
            self.weight = Some(weight);
        }
        self.hy = Some(hy);
        self.hy_test = hy_test;
        Ok(())
    }
}

fn weighted_sum(inputs: &[&Signal], weights: &[f64]) -> Signal {
    let mut terms = inputs.iter().zip(weights).map(|(s, &w)| s.scale(w));
    match terms.next() {
        Some(first) => terms.fold(first, |acc, t| acc.add(&t)),
        None => Signal::default(),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Variable { feature } => write!(f, "x{}", feature),
            NodeKind::Function { function, children } => {
                write!(f, "{}(", function)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "#{}", child)?;
                }
                f.write_str(")")
            }
        }
    }
}
