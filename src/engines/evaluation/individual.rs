use super::node::{EvalContext, Node, NodeKind};
use super::solver::WeightSolver;
use crate::config::{AppConfig, EvaluationConfig};
use crate::data::{Dataset, Input, Signal};
use crate::error::{EvoDagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Solver plus the evaluation switches taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    solver: WeightSolver,
    config: EvaluationConfig,
}

impl Evaluator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            solver: WeightSolver::new(&config.solver),
            config: config.evaluation.clone(),
        }
    }

    pub fn solver(&self) -> &WeightSolver {
        &self.solver
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Build a dataset, holding out `validation_fraction` of the rows from fitting.
    pub fn dataset(&self, inputs: Vec<Input>, target: Signal) -> Result<Dataset> {
        let dataset = Dataset::new(inputs, target)?;
        if self.config.validation_fraction > 0.0 {
            dataset.with_validation_split(self.config.validation_fraction, self.config.seed)
        } else {
            Ok(dataset)
        }
    }
}

/// Root outputs of a successful evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Prediction<'a> {
    pub hy: &'a Signal,
    pub hy_test: Option<&'a Signal>,
}

/// A candidate program: an arena of nodes where every child sits at a
/// smaller index than its parent and the root is the last slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    nodes: Vec<Node>,
}

impl Individual {
    /// Take ownership of an arena already in dependency order.
    pub fn new(mut nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(EvoDagError::InvalidArena("arena is empty".to_string()));
        }

        for (i, node) in nodes.iter_mut().enumerate() {
            node.set_position(i);
            if let NodeKind::Function { function, children } = node.kind() {
                if !function.accepts_arity(children.len()) {
                    return Err(EvoDagError::InvalidArena(format!(
                        "node {}: {} cannot take {} children",
                        i,
                        function,
                        children.len()
                    )));
                }
                if let Some(&child) = children.iter().find(|&&c| c >= i) {
                    return Err(EvoDagError::InvalidArena(format!(
                        "node {} references node {}, children must come first",
                        i, child
                    )));
                }
            }
            if let Some(weight) = node.weight() {
                node.check_weight(weight)?;
            }
        }

        Ok(Self { nodes })
    }

    /// Build from a prefix listing: root first, each function followed by the
    /// subtrees of its children. Child indices in the input are ignored, only
    /// their count matters; they are rewritten to point into the new arena.
    pub fn from_prefix(nodes: Vec<Node>) -> Result<Self> {
        let mut prefix = nodes.into_iter();
        let mut arena = Vec::with_capacity(prefix.len());
        place(&mut prefix, &mut arena)?;
        let leftover = prefix.len();
        if leftover != 0 {
            return Err(EvoDagError::InvalidArena(format!(
                "{} node(s) left over after the root subtree",
                leftover
            )));
        }
        Self::new(arena)
    }

    pub fn from_snapshot(snapshot: IndividualSnapshot) -> Result<Self> {
        Self::new(snapshot.nodes)
    }

    /// Detached copy holding structure and weights only.
    pub fn tostore(&self) -> IndividualSnapshot {
        IndividualSnapshot {
            nodes: self.nodes.iter().map(Node::tostore).collect(),
            stored_at: Utc::now(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> &Node {
        &self.nodes[self.nodes.len() - 1]
    }

    fn root_mut(&mut self) -> &mut Node {
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    pub fn fitness(&self) -> Option<f64> {
        self.root().fitness()
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.root_mut().set_fitness(fitness);
    }

    pub fn fitness_vs(&self) -> Option<f64> {
        self.root().fitness_vs()
    }

    pub fn set_fitness_vs(&mut self, fitness: f64) {
        self.root_mut().set_fitness_vs(fitness);
    }

    /// Evaluate every node in arena order and return the root outputs.
    ///
    /// Unweighted nodes are fitted against the dataset target; weighted ones
    /// are reused as is. The first failing node aborts the walk, and all
    /// cached outputs are dropped so no stale prediction survives.
    pub fn decision_function(&mut self, dataset: &Dataset, evaluator: &Evaluator) -> Result<Prediction<'_>> {
        for node in &mut self.nodes {
            node.clear_outputs();
        }

        for i in 0..self.nodes.len() {
            let (done, rest) = self.nodes.split_at_mut(i);
            let ctx = EvalContext::new(dataset, done, &evaluator.solver)
                .with_output_check(evaluator.config.check_output_finite);
            if let Err(err) = rest[0].eval(&ctx) {
                log::debug!("{} is invalid: {}", self, err);
                for node in &mut self.nodes {
                    node.clear_outputs();
                }
                return Err(err.into());
            }
        }

        let root = self.root();
        let hy = root.hy().ok_or_else(|| {
            EvoDagError::InvalidArena("root produced no output".to_string())
        })?;
        Ok(Prediction {
            hy,
            hy_test: root.hy_test(),
        })
    }

    /// Render the program rooted at the last slot, e.g. `sin(add(x0, x1))`.
    ///
    /// A function node reached more than once is written as `#i:expr` the
    /// first time and `#i` afterwards, so shared subgraphs are printed once.
    pub fn expression(&self) -> String {
        let mut uses = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for &child in node.children() {
                uses[child] += 1;
            }
        }
        let mut written = vec![false; self.nodes.len()];
        let mut out = String::new();
        self.write_expression(self.nodes.len() - 1, &uses, &mut written, &mut out);
        out
    }

    fn write_expression(&self, index: usize, uses: &[usize], written: &mut [bool], out: &mut String) {
        match self.nodes[index].kind() {
            NodeKind::Variable { feature } => out.push_str(&format!("x{}", feature)),
            NodeKind::Function { function, children } => {
                let shared = uses[index] > 1;
                if shared {
                    if written[index] {
                        out.push_str(&format!("#{}", index));
                        return;
                    }
                    written[index] = true;
                    out.push_str(&format!("#{}:", index));
                }
                out.push_str(function.name());
                out.push('(');
                for (i, &child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expression(child, uses, written, out);
                }
                out.push(')');
            }
        }
    }
}

fn place(prefix: &mut std::vec::IntoIter<Node>, arena: &mut Vec<Node>) -> Result<usize> {
    let mut node = prefix.next().ok_or_else(|| {
        EvoDagError::InvalidArena("prefix ended before every function got its children".to_string())
    })?;

    if node.function_kind().is_some() {
        let nargs = node.children().len();
        let mut children = Vec::with_capacity(nargs);
        for _ in 0..nargs {
            children.push(place(prefix, arena)?);
        }
        node.set_children(children);
    }

    arena.push(node);
    Ok(arena.len() - 1)
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// Persisted form of an individual. Nodes carry no cached outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualSnapshot {
    pub nodes: Vec<Node>,
    pub stored_at: DateTime<Utc>,
}

impl IndividualSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Function;

    #[test]
    fn test_from_prefix_places_children_first() {
        let ind = Individual::from_prefix(vec![
            Node::function(Function::Sin, vec![0]).unwrap(),
            Node::function(Function::Add, vec![0, 1]).unwrap(),
            Node::variable(0),
            Node::variable(2),
        ])
        .unwrap();

        assert_eq!(ind.len(), 4);
        assert_eq!(ind.nodes()[0].feature(), Some(0));
        assert_eq!(ind.nodes()[1].feature(), Some(2));
        assert_eq!(ind.nodes()[2].children(), &[0, 1]);
        assert_eq!(ind.nodes()[3].children(), &[2]);
        assert_eq!(ind.root().position(), 3);
        assert_eq!(ind.expression(), "sin(add(x0, x2))");
    }

    #[test]
    fn test_from_prefix_rejects_bad_lengths() {
        let short = Individual::from_prefix(vec![
            Node::function(Function::Mul, vec![0, 1]).unwrap(),
            Node::variable(0),
        ]);
        assert!(matches!(short, Err(EvoDagError::InvalidArena(_))));

        let long = Individual::from_prefix(vec![Node::variable(0), Node::variable(1)]);
        assert!(matches!(long, Err(EvoDagError::InvalidArena(_))));
    }

    #[test]
    fn test_new_rejects_forward_references() {
        let result = Individual::new(vec![
            Node::function(Function::Sin, vec![1]).unwrap(),
            Node::variable(0),
        ]);
        assert!(matches!(result, Err(EvoDagError::InvalidArena(_))));

        let result = Individual::new(vec![
            Node::variable(0),
            Node::function(Function::Sin, vec![1]).unwrap(),
        ]);
        assert!(matches!(result, Err(EvoDagError::InvalidArena(_))));

        assert!(matches!(Individual::new(vec![]), Err(EvoDagError::InvalidArena(_))));
    }

    #[test]
    fn test_new_rejects_misshaped_weight() {
        let result = Individual::new(vec![
            Node::variable(0),
            Node::variable(1),
            Node::function(Function::Add, vec![0, 1])
                .unwrap()
                .with_weight(vec![1.0, 1.0, 1.0]),
        ]);
        assert!(matches!(result, Err(EvoDagError::InvalidWeight(_))));
    }

    #[test]
    fn test_shared_nodes_render_once() {
        let ind = Individual::new(vec![
            Node::variable(0),
            Node::variable(1),
            Node::function(Function::Add, vec![0, 1]).unwrap(),
            Node::function(Function::Mul, vec![2, 2]).unwrap(),
        ])
        .unwrap();
        assert_eq!(ind.expression(), "mul(#2:add(x0, x1), #2)");

        // Each slot squares the previous one; a tree rendering would double
        // in length per level.
        let mut nodes = vec![Node::variable(0)];
        for i in 1..40 {
            nodes.push(Node::function(Function::Mul, vec![i - 1, i - 1]).unwrap());
        }
        let ind = Individual::new(nodes).unwrap();
        let text = ind.expression();
        assert!(text.len() < 40 * 16);
        assert!(text.starts_with("mul(#38:mul(#37:"));
        assert!(text.contains("#1:mul(x0, x0), #1), #2), #3)"));
        assert!(text.ends_with("#37), #38)"));
        assert_eq!(ind.to_string(), text);
    }

    #[test]
    fn test_fitness_lives_on_root() {
        let mut ind = Individual::new(vec![Node::variable(0)]).unwrap();
        ind.set_fitness(-1.0);
        ind.set_fitness_vs(-2.0);

        let stored = ind.tostore();
        let restored = Individual::from_snapshot(stored).unwrap();
        assert_eq!(restored.fitness(), Some(-1.0));
        assert_eq!(restored.fitness_vs(), Some(-2.0));
    }
}
