//! # Core Type Definitions
//!
//! This module contains the small vocabulary types shared across the planner:
//! - Operator identifiers (`OperatorId`) and search moves (`Step`)
//! - Variable classification (`VariableType`)
//! - Operators appearing in the input (`AssignmentOp`, `BinaryOp`)
//! - Phase tags of transitions and conditions (`TransitionPhase`, `ConditionPhase`)
//! - Preferred-operator channels (`OpenListMode`)
//! - Error types (`TempusError`)
//!
//! Every enum that appears in the textual task format implements `FromStr`
//! for the exact token used there.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Index of an operator in the task's operator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub usize);

impl OperatorId {
    /// Create a new operator id.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A move of the search: either apply an operator or let time pass until
/// the next happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    /// Start the given operator now.
    Apply(OperatorId),
    /// Advance the clock to the next scheduled happening.
    LetTimePass,
}

impl Step {
    /// The applied operator, if this step applies one.
    #[must_use]
    pub const fn operator(self) -> Option<OperatorId> {
        match self {
            Self::Apply(op) => Some(op),
            Self::LetTimePass => None,
        }
    }
}

// =============================================================================
// VARIABLE CLASSIFICATION
// =============================================================================

/// Kind of a state variable.
///
/// Variables start out as `Logical` (finite domain) or `PrimitiveFunctional`
/// (domain `-1`); numeric axioms later retype their affected variable as
/// `Comparison` or `SubtermFunctional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VariableType {
    Logical,
    PrimitiveFunctional,
    SubtermFunctional,
    Comparison,
}

impl VariableType {
    /// True for numeric variables (primitive or derived subterms).
    #[must_use]
    pub const fn is_functional(self) -> bool {
        matches!(self, Self::PrimitiveFunctional | Self::SubtermFunctional)
    }

    /// True for variables whose value takes part in the logical state key.
    #[must_use]
    pub const fn is_state_relevant(self) -> bool {
        matches!(self, Self::Logical | Self::PrimitiveFunctional)
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Logical => "logical",
            Self::PrimitiveFunctional => "primitive_functional",
            Self::SubtermFunctional => "subterm_functional",
            Self::Comparison => "comparison",
        };
        f.write_str(name)
    }
}

// =============================================================================
// INPUT OPERATORS
// =============================================================================

/// Update rule of a numeric effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssignmentOp {
    Assign,
    ScaleUp,
    ScaleDown,
    Increase,
    Decrease,
}

impl AssignmentOp {
    /// Apply the update to `current` with the given operand.
    ///
    /// Division by zero follows IEEE semantics; callers that need a guarded
    /// division handle it before calling.
    #[must_use]
    pub fn apply(self, current: f64, operand: f64) -> f64 {
        match self {
            Self::Assign => operand,
            Self::ScaleUp => current * operand,
            Self::ScaleDown => current / operand,
            Self::Increase => current + operand,
            Self::Decrease => current - operand,
        }
    }
}

impl FromStr for AssignmentOp {
    type Err = TempusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Self::Assign),
            "+" => Ok(Self::Increase),
            "-" => Ok(Self::Decrease),
            "*" => Ok(Self::ScaleUp),
            "/" => Ok(Self::ScaleDown),
            other => Err(TempusError::Parse(format!(
                "expected assignment operator, read '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AssignmentOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Assign => ":=",
            Self::ScaleUp => "*=",
            Self::ScaleDown => "/=",
            Self::Increase => "+=",
            Self::Decrease => "-=",
        };
        f.write_str(token)
    }
}

/// Arithmetic or relational operator of a numeric axiom or duration constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Mult,
    Divis,
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ue,
}

impl BinaryOp {
    /// True for the relational operators.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Le | Self::Eq | Self::Ge | Self::Gt | Self::Ue
        )
    }
}

impl FromStr for BinaryOp {
    type Err = TempusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Add),
            "-" => Ok(Self::Subtract),
            "*" => Ok(Self::Mult),
            "/" => Ok(Self::Divis),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "=" => Ok(Self::Eq),
            ">=" => Ok(Self::Ge),
            ">" => Ok(Self::Gt),
            "!=" => Ok(Self::Ue),
            other => Err(TempusError::Parse(format!(
                "expected binary operator, read '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Mult => "*",
            Self::Divis => "/",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Ue => "!=",
        };
        f.write_str(token)
    }
}

// =============================================================================
// PHASE TAGS
// =============================================================================

/// When a DTG transition happens relative to its inducing operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransitionPhase {
    Start,
    End,
    Compressed,
    Axiom,
}

impl TransitionPhase {
    /// Operator-induced transitions carry a duration constraint in the input.
    #[must_use]
    pub const fn has_duration(self) -> bool {
        !matches!(self, Self::Axiom)
    }
}

impl FromStr for TransitionPhase {
    type Err = TempusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(Self::Start),
            "e" => Ok(Self::End),
            "c" => Ok(Self::Compressed),
            "a" => Ok(Self::Axiom),
            other => Err(TempusError::Parse(format!(
                "expected transition type, read '{}'",
                other
            ))),
        }
    }
}

/// When a transition condition must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionPhase {
    Start,
    Overall,
    End,
    Axiom,
}

impl FromStr for ConditionPhase {
    type Err = TempusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(Self::Start),
            "o" => Ok(Self::Overall),
            "e" => Ok(Self::End),
            "a" => Ok(Self::Axiom),
            other => Err(TempusError::Parse(format!(
                "expected condition type, read '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// PREFERRED-OPERATOR CHANNELS
// =============================================================================

/// Which subset of successors an open list receives.
///
/// Every mode except `All` is also a preferred-operator channel a heuristic
/// can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpenListMode {
    Regular,
    Ordered,
    Cheapest,
    MostExpensive,
    Rand,
    Concurrent,
    All,
}

impl OpenListMode {
    /// Number of preferred-operator channels.
    pub const CHANNELS: usize = 6;

    /// Slot of this mode among the preferred-operator channels.
    #[must_use]
    pub const fn channel(self) -> Option<usize> {
        match self {
            Self::Regular => Some(0),
            Self::Ordered => Some(1),
            Self::Cheapest => Some(2),
            Self::MostExpensive => Some(3),
            Self::Rand => Some(4),
            Self::Concurrent => Some(5),
            Self::All => None,
        }
    }
}

impl fmt::Display for OpenListMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Regular => "regular",
            Self::Ordered => "ordered",
            Self::Cheapest => "cheapest",
            Self::MostExpensive => "most-expensive",
            Self::Rand => "rand",
            Self::Concurrent => "concurrent",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Error types for the planner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TempusError {
    /// Malformed task input (magic word mismatch, bad or missing token).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Readable input that describes an unsupported task.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Inconsistent planner parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_op_tokens() {
        assert_eq!("<=".parse::<BinaryOp>(), Ok(BinaryOp::Le));
        assert_eq!("!=".parse::<BinaryOp>(), Ok(BinaryOp::Ue));
        assert!(BinaryOp::Gt.is_comparison());
        assert!(!BinaryOp::Divis.is_comparison());
        assert!("<>".parse::<BinaryOp>().is_err());
    }

    #[test]
    fn assignment_op_apply() {
        let op: AssignmentOp = "+".parse().expect("valid token");
        assert_eq!(op.apply(2.0, 3.0), 5.0);
        assert_eq!(AssignmentOp::ScaleUp.apply(2.0, 3.0), 6.0);
        assert_eq!(AssignmentOp::Assign.apply(2.0, 3.0), 3.0);
    }

    #[test]
    fn phases_parse() {
        assert_eq!("c".parse::<TransitionPhase>(), Ok(TransitionPhase::Compressed));
        assert!(!TransitionPhase::Axiom.has_duration());
        assert_eq!("o".parse::<ConditionPhase>(), Ok(ConditionPhase::Overall));
        assert!("x".parse::<ConditionPhase>().is_err());
    }

    #[test]
    fn channels_are_dense() {
        let modes = [
            OpenListMode::Regular,
            OpenListMode::Ordered,
            OpenListMode::Cheapest,
            OpenListMode::MostExpensive,
            OpenListMode::Rand,
            OpenListMode::Concurrent,
        ];
        for (i, mode) in modes.iter().enumerate() {
            assert_eq!(mode.channel(), Some(i));
        }
        assert_eq!(OpenListMode::All.channel(), None);
    }

    #[test]
    fn error_display() {
        let err = TempusError::Parse("bad token".to_string());
        assert_eq!(err.to_string(), "Parse error: bad token");
    }
}
