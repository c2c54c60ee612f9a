//! Constraints: statement patterns whose positions are nodes or variables.

use std::fmt;

use crate::types::node::{COLUMNS, NONE, NodeId, Quad};

/// A named variable in a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(String);

impl Variable {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// One position of a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstraintElement {
    /// A concrete node.
    Node(NodeId),
    /// An unbound position, named so repeated use can be detected.
    Variable(Variable),
}

impl ConstraintElement {
    /// Shorthand for a variable element.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Variable(Variable::new(name))
    }

    #[must_use]
    pub const fn node(&self) -> Option<NodeId> {
        match self {
            Self::Node(node) => Some(*node),
            Self::Variable(_) => None,
        }
    }

    #[must_use]
    pub const fn variable(&self) -> Option<&Variable> {
        match self {
            Self::Node(_) => None,
            Self::Variable(variable) => Some(variable),
        }
    }

    #[must_use]
    pub const fn is_bound(&self) -> bool {
        matches!(self, Self::Node(_))
    }
}

impl From<NodeId> for ConstraintElement {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

impl From<Variable> for ConstraintElement {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl fmt::Display for ConstraintElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::Variable(variable) => write!(f, "{variable}"),
        }
    }
}

/// A statement pattern over subject, predicate, object and graph.
///
/// Position `3` is the graph. A bound graph scopes the constraint to a single
/// graph; a variable graph ranges over all of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    elements: [ConstraintElement; COLUMNS],
}

impl Constraint {
    #[must_use]
    pub const fn new(
        subject: ConstraintElement,
        predicate: ConstraintElement,
        object: ConstraintElement,
        graph: ConstraintElement,
    ) -> Self {
        Self {
            elements: [subject, predicate, object, graph],
        }
    }

    #[must_use]
    pub const fn elements(&self) -> &[ConstraintElement; COLUMNS] {
        &self.elements
    }

    /// The element at a position.
    ///
    /// # Panics
    ///
    /// Panics if `position >= COLUMNS`.
    #[must_use]
    pub const fn element(&self, position: usize) -> &ConstraintElement {
        &self.elements[position]
    }

    /// The bound nodes as a pattern, with [`NONE`] for every variable.
    #[must_use]
    pub fn pattern(&self) -> Quad {
        let mut columns = [NONE; COLUMNS];
        for (column, element) in columns.iter_mut().zip(&self.elements) {
            *column = element.node().unwrap_or(NONE);
        }
        Quad::from_array(columns)
    }

    /// Which positions are bound.
    #[must_use]
    pub fn bound(&self) -> [bool; COLUMNS] {
        let mut bound = [false; COLUMNS];
        for (flag, element) in bound.iter_mut().zip(&self.elements) {
            *flag = element.is_bound();
        }
        bound
    }

    /// The distinct variables, in position order.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable> {
        let mut variables: Vec<Variable> = Vec::with_capacity(COLUMNS);
        for variable in self.elements.iter().filter_map(ConstraintElement::variable) {
            if !variables.contains(variable) {
                variables.push(variable.clone());
            }
        }
        variables
    }

    /// Positions holding `variable`.
    #[must_use]
    pub fn positions_of(&self, variable: &Variable) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, element)| element.variable() == Some(variable))
            .map(|(position, _)| position)
            .collect()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [s, p, o, g] = &self.elements;
        write!(f, "[{s} {p} {o} {g}]")
    }
}
