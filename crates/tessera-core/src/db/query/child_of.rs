use crate::{
    db::query::Condition,
    error::InternalError,
    model::{ID_FIELD, Model, Registry},
    value::Value,
};
use std::collections::BTreeSet;

/// Ids of the records named by `arg` plus all their descendants through the
/// hierarchy model's parent field.
///
/// The hierarchy model is the model a relation `path` points at, or the owner
/// of the path when it ends on `id`. `search` runs one query against that
/// model and returns the matching ids; it is called once per tree level.
pub fn expand_child_of<F>(
    registry: &Registry,
    model: &Model,
    path: &str,
    arg: &Value,
    mut search: F,
) -> Result<Vec<i64>, InternalError>
where
    F: FnMut(&Model, &Condition) -> Result<Vec<i64>, InternalError>,
{
    let (owner, field) = registry.resolve_path(model, path)?;
    let tree = if field.kind().is_relation() {
        registry.related(field)?
    } else if field.name() == ID_FIELD {
        owner
    } else {
        return Err(InternalError::query(format!(
            "child-of on '{path}' needs a relation or id field"
        )));
    };
    let parent = tree.try_field(tree.parent_field())?;
    if !parent.kind().is_fk() {
        return Err(InternalError::query(format!(
            "parent field '{}.{}' is not a many-to-one",
            tree.name(),
            parent.name()
        )));
    }

    let mut found: BTreeSet<i64> = arg.ids().into_iter().collect();
    let mut frontier: Vec<i64> = found.iter().copied().collect();

    while !frontier.is_empty() {
        let cond = Condition::is_in(parent.name(), frontier);
        frontier = search(tree, &cond)?
            .into_iter()
            .filter(|id| found.insert(*id))
            .collect();
    }

    Ok(found.into_iter().collect())
}
