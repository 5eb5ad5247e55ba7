//! Inversion of computed-field dependency paths into trigger edges.
//!
//! A field `Total` on `Invoice` depending on `Lines.Amount` yields:
//! - `InvoiceLine.Amount`  → recompute `Invoice` records found by `Lines`
//! - `InvoiceLine.Invoice` → same (a line moved between invoices)
//! - `Invoice.Lines`       → recompute the written invoice itself

use crate::model::{
    entity::{Model, ModelId},
    field::Field,
    kind::FieldKind,
    registry::{Registry, RegistryError},
};
use std::collections::BTreeMap;

///
/// ComputeTrigger
///
/// Dependency edge attached to a source field. When the source field of
/// records `X` changes, the target records are `model.search(path IN X)`, or
/// `X` itself when `path` is empty.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ComputeTrigger {
    pub path: String,
    pub model: ModelId,
    pub field: String,
    pub stored: bool,
    pub compute: String,
}

/// Trigger edges keyed by (source model, source field name).
pub(crate) type TriggerMap = BTreeMap<(ModelId, String), Vec<ComputeTrigger>>;

/// Invert every computed field's dependency paths.
pub(crate) fn build_triggers(registry: &Registry) -> Result<TriggerMap, RegistryError> {
    let mut triggers = TriggerMap::new();

    for model in registry.models() {
        for field in model.fields().filter(|f| f.is_computed()) {
            for path in field.depends_paths() {
                invert_path(registry, model, field, path, &mut triggers)?;
            }
        }
    }

    Ok(triggers)
}

fn invert_path(
    registry: &Registry,
    model: &Model,
    field: &Field,
    path: &str,
    triggers: &mut TriggerMap,
) -> Result<(), RegistryError> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut prefix: Vec<&str> = Vec::new();
    let mut current = model;

    let edge = |prefix: &[&str]| ComputeTrigger {
        path: prefix.join("."),
        model: model.id(),
        field: field.name().to_string(),
        stored: field.stored,
        compute: field.compute_method().unwrap_or_default().to_string(),
    };

    for (i, segment) in segments.iter().enumerate() {
        let source = current
            .get_field(segment)
            .ok_or_else(|| RegistryError::BadDependency {
                model: model.name().to_string(),
                field: field.name().to_string(),
                path: path.to_string(),
            })?;
        push(triggers, current.id(), source.name(), edge(&prefix));

        if i + 1 == segments.len() {
            break;
        }

        if !source.kind().is_relation() {
            return Err(RegistryError::NotARelation {
                model: current.name().to_string(),
                field: source.name().to_string(),
            });
        }
        let target = registry.try_related(source)?;
        prefix.push(source.name());

        // Membership of the relation can also change from the other side.
        match source.kind() {
            FieldKind::One2Many | FieldKind::Rev2One => {
                if let Some(reverse) = source.reverse_fk().and_then(|fk| target.get_field(fk)) {
                    push(triggers, target.id(), reverse.name(), edge(&prefix));
                }
            }
            FieldKind::Many2Many => {
                let table = source.link().map(|link| link.table.as_str());
                for mirror in target.fields().filter(|f| {
                    table.is_some()
                        && f.kind() == FieldKind::Many2Many
                        && f.link().map(|link| link.table.as_str()) == table
                        && !(target.id() == current.id() && f.name() == source.name())
                }) {
                    push(triggers, target.id(), mirror.name(), edge(&prefix));
                }
            }
            _ => {}
        }

        current = target;
    }

    Ok(())
}

fn push(triggers: &mut TriggerMap, model: ModelId, field: &str, trigger: ComputeTrigger) {
    let list = triggers.entry((model, field.to_string())).or_default();
    if !list.contains(&trigger) {
        list.push(trigger);
    }
}
