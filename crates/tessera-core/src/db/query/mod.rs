//! Query construction: condition trees, join resolution and SQL rendering.

mod builder;
mod child_of;
mod condition;
mod join;


pub use builder::{COUNT_ALIAS, Query, QueryBuilder, SqlStatement};
pub use child_of::expand_child_of;
pub use condition::{Condition, Operator, Predicate, PredicateKind};
pub use join::{JoinKind, JoinResolver, ResolvedColumn, TableJoin};
