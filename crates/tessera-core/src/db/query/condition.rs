use crate::{error::InternalError, value::Value};
use derive_more::Display;

///
/// Operator
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[remain::sorted]
pub enum Operator {
    /// Record or any of its descendants through the model's parent field.
    ChildOf,
    Contains,
    Equals,
    Greater,
    GreaterOrEqual,
    IContains,
    ILike,
    In,
    Less,
    LessOrEqual,
    Like,
    NotContains,
    NotEquals,
    NotIContains,
    NotIn,
}

impl Operator {
    /// SQL symbol of a binary comparison operator.
    #[must_use]
    pub const fn sql_symbol(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Like | Self::Contains => "LIKE",
            Self::NotContains => "NOT LIKE",
            Self::ILike | Self::IContains => "ILIKE",
            Self::NotIContains => "NOT ILIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::ChildOf => "CHILD OF",
        }
    }

    #[must_use]
    pub const fn is_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

///
/// Predicate
///
/// One term of a condition. `is_or` joins it to the preceding terms with OR
/// instead of AND; `is_not` negates it.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub kind: PredicateKind,
    pub is_or: bool,
    pub is_not: bool,
}

///
/// PredicateKind
///

#[derive(Clone, Debug, PartialEq)]
pub enum PredicateKind {
    Leaf {
        path: String,
        op: Operator,
        arg: Value,
    },
    Nested(Condition),
}

///
/// Condition
///
/// Boolean expression of field-path predicates, evaluated as a left fold.
/// The first predicate's `is_or` flag is ignored.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Condition {
    predicates: Vec<Predicate>,
}

impl Condition {
    /// Condition holding a single predicate.
    #[must_use]
    pub fn new(path: &str, op: Operator, arg: impl Into<Value>) -> Self {
        Self::default().and(path, op, arg)
    }

    #[must_use]
    pub fn eq(path: &str, arg: impl Into<Value>) -> Self {
        Self::new(path, Operator::Equals, arg)
    }

    #[must_use]
    pub fn is_in(path: &str, arg: impl Into<Value>) -> Self {
        Self::new(path, Operator::In, arg)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    // ------------------------------------------------------------------
    // Leaf predicates
    // ------------------------------------------------------------------

    #[must_use]
    pub fn and(self, path: &str, op: Operator, arg: impl Into<Value>) -> Self {
        self.push_leaf(path, op, arg.into(), false, false)
    }

    #[must_use]
    pub fn and_not(self, path: &str, op: Operator, arg: impl Into<Value>) -> Self {
        self.push_leaf(path, op, arg.into(), false, true)
    }

    #[must_use]
    pub fn or(self, path: &str, op: Operator, arg: impl Into<Value>) -> Self {
        self.push_leaf(path, op, arg.into(), true, false)
    }

    #[must_use]
    pub fn or_not(self, path: &str, op: Operator, arg: impl Into<Value>) -> Self {
        self.push_leaf(path, op, arg.into(), true, true)
    }

    fn push_leaf(mut self, path: &str, op: Operator, arg: Value, is_or: bool, is_not: bool) -> Self {
        self.predicates.push(Predicate {
            kind: PredicateKind::Leaf {
                path: path.to_string(),
                op,
                arg,
            },
            is_or,
            is_not,
        });
        self
    }

    // ------------------------------------------------------------------
    // Nested conditions
    // ------------------------------------------------------------------

    #[must_use]
    pub fn and_cond(self, cond: Self) -> Self {
        self.push_nested(cond, false, false)
    }

    #[must_use]
    pub fn and_not_cond(self, cond: Self) -> Self {
        self.push_nested(cond, false, true)
    }

    #[must_use]
    pub fn or_cond(self, cond: Self) -> Self {
        self.push_nested(cond, true, false)
    }

    #[must_use]
    pub fn or_not_cond(self, cond: Self) -> Self {
        self.push_nested(cond, true, true)
    }

    fn push_nested(mut self, cond: Self, is_or: bool, is_not: bool) -> Self {
        if !cond.is_empty() {
            self.predicates.push(Predicate {
                kind: PredicateKind::Nested(cond),
                is_or,
                is_not,
            });
        }
        self
    }

    // ------------------------------------------------------------------
    // Inspection / rewriting
    // ------------------------------------------------------------------

    /// Every leaf path, depth first, in predicate order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        for predicate in &self.predicates {
            match &predicate.kind {
                PredicateKind::Leaf { path, .. } => out.push(path),
                PredicateKind::Nested(cond) => cond.collect_paths(out),
            }
        }
    }

    /// Whether any leaf uses `op`.
    #[must_use]
    pub fn uses_operator(&self, op: Operator) -> bool {
        self.predicates.iter().any(|p| match &p.kind {
            PredicateKind::Leaf { op: leaf, .. } => *leaf == op,
            PredicateKind::Nested(cond) => cond.uses_operator(op),
        })
    }

    /// Replace every child-of leaf by an `In` leaf over the ids `expand`
    /// returns for its path and argument.
    pub fn substitute_child_of<F>(&mut self, expand: &mut F) -> Result<(), InternalError>
    where
        F: FnMut(&str, &Value) -> Result<Vec<i64>, InternalError>,
    {
        for predicate in &mut self.predicates {
            match &mut predicate.kind {
                PredicateKind::Leaf { path, op, arg } if *op == Operator::ChildOf => {
                    let ids = expand(path, arg)?;
                    *op = Operator::In;
                    *arg = Value::Ids(ids);
                }
                PredicateKind::Nested(cond) => cond.substitute_child_of(expand)?,
                PredicateKind::Leaf { .. } => {}
            }
        }

        Ok(())
    }
}
