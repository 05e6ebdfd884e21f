//! Abstract syntax tree for compiled expressions

use std::fmt;

/// Set comparison at the root of every expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<=`
    Subset,
    /// `>=`
    Superset,
    /// `<`
    ProperSubset,
    /// `>`
    ProperSuperset,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Subset => "<=",
            Self::Superset => ">=",
            Self::ProperSubset => "<",
            Self::ProperSuperset => ">",
        }
    }
}

/// Binary set operator; all share one precedence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    /// `&`
    Intersection,
    /// `|`
    Union,
    /// `-`
    Difference,
    /// `^`
    SymmetricDifference,
}

impl SetOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Intersection => "&",
            Self::Union => "|",
            Self::Difference => "-",
            Self::SymmetricDifference => "^",
        }
    }
}

/// `lhs op rhs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub lhs: Calc,
    pub op: CompareOp,
    pub rhs: Calc,
}

/// A left-associative chain: `head op1 f1 op2 f2 ...`
///
/// Kept flat so long chains do not deepen the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calc {
    pub head: Factor,
    pub tail: Vec<(SetOp, Factor)>,
}

/// Operand of a set calculation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Factor {
    /// The `empty` literal
    Empty,
    /// A named variable
    Variable(String),
    /// A parenthesized sub-calculation
    Group(Box<Calc>),
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}

impl fmt::Display for Calc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        for (op, factor) in &self.tail {
            write!(f, " {} {}", op.symbol(), factor)?;
        }
        Ok(())
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str(crate::EMPTY_KEYWORD),
            Self::Variable(name) => f.write_str(name),
            Self::Group(calc) => write!(f, "({calc})"),
        }
    }
}
