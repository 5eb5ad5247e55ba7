//! Compute-on-read, trigger propagation and on-change evaluation.

use crate::{
    db::{
        cache::{CacheMiss, CacheRef},
        query::{Condition, Query},
        record::{Context, RecordCollection, select_ids},
        security::Permission,
    },
    error::InternalError,
    model::{Field, FieldKind, ID_FIELD, Method, ModelId, WRITE_DATE_FIELD},
    obs::sink::{self, MetricsEvent},
    value::{FieldMap, Value},
};
use std::collections::{BTreeMap, BTreeSet};

/// Cache id of the record edited by `on_change` on an empty collection.
const NEW_RECORD_ID: i64 = -1;

///
/// TriggerGroup
///
/// Stored triggers sharing a compute method run it once; non-stored triggers
/// are invalidated per field.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(super) struct TriggerGroup {
    pub(super) model: ModelId,
    pub(super) path: String,
    pub(super) stored: bool,
    pub(super) target: String,
}

/// Records to recompute or invalidate, with the fields concerned.
pub(super) type Affected = BTreeMap<TriggerGroup, (BTreeSet<String>, BTreeSet<i64>)>;

impl<'env> RecordCollection<'env> {
    // ======================================================================
    // Compute-on-read
    // ======================================================================

    /// Value of `field` for record `id`. Values the user may not read come
    /// back as the zero value.
    pub(super) fn field_value(&self, id: i64, field: &Field) -> Result<Value, InternalError> {
        if !self
            .env
            .can_access_field(self.model.name(), field.name(), Permission::Read)
        {
            return Ok(field.kind().zero_value());
        }

        self.fetch_value(id, field)
    }

    /// Cached value, or fetched from storage, or computed.
    pub(super) fn fetch_value(&self, id: i64, field: &Field) -> Result<Value, InternalError> {
        if let Ok(value) = self.cached(id, field) {
            return Ok(value);
        }

        if field.is_computed() && !field.is_stored() {
            self.compute_into_cache(id, field)?;
        } else {
            self.load(&[field.name()])?;
        }

        let value = self.env.cache().get(self.model.id(), id, field.name());
        match value {
            Ok(value) => Ok(value),
            Err(_) if field.is_computed() => Ok(field.kind().zero_value()),
            Err(_) => Err(InternalError::record_not_found(self.model.name(), id)),
        }
    }

    fn cached(&self, id: i64, field: &Field) -> Result<Value, CacheMiss> {
        let result = self.env.cache().get(self.model.id(), id, field.name());
        sink::record(MetricsEvent::CacheLookup {
            model: self.model.name(),
            hit: result.is_ok(),
        });
        if result.is_err() {
            tracing::trace!(model = self.model.name(), id, field = field.name(), "cache miss");
        }

        result
    }

    fn compute_into_cache(&self, id: i64, field: &Field) -> Result<(), InternalError> {
        let method = field.compute_method().unwrap_or_default();
        let values = self.call_compute(id, method)?;
        self.merge_into_cache(id, values, &mut FieldMap::new())
    }

    /// Run compute method `name` on record `id`.
    pub(super) fn call_compute(&self, id: i64, name: &str) -> Result<FieldMap, InternalError> {
        let Some(Method::Compute(compute)) = self.model.get_method(name) else {
            return Err(InternalError::schema(format!(
                "model '{}' has no compute method '{name}'",
                self.model.name()
            )));
        };
        tracing::trace!(model = self.model.name(), id, method = name, "compute");

        compute(&self.derive(vec![id]))
    }

    /// Write every returned value to the cache one field at a time, keeping
    /// a copy in `merged`.
    fn merge_into_cache(
        &self,
        id: i64,
        values: FieldMap,
        merged: &mut FieldMap,
    ) -> Result<(), InternalError> {
        let cref = CacheRef::new(self.model.id(), id);

        for (name, value) in values {
            let field = self.model.try_field(&name)?;
            self.env
                .cache_mut()
                .update_entry_by_ref(cref, field, value.clone());
            merged.insert(field.name().to_string(), value);
        }

        Ok(())
    }

    // ======================================================================
    // Triggers
    // ======================================================================

    /// Records depending on `fields` of this collection, grouped by what has
    /// to happen to them.
    pub(super) fn resolve_triggers(&self, fields: &[&str]) -> Result<Affected, InternalError> {
        let registry = self.env.registry();
        let mut groups: BTreeMap<TriggerGroup, BTreeSet<String>> = BTreeMap::new();

        for name in fields {
            for trigger in registry.triggers_for(self.model.id(), name) {
                let group = TriggerGroup {
                    model: trigger.model,
                    path: trigger.path.clone(),
                    stored: trigger.stored,
                    target: if trigger.stored {
                        trigger.compute.clone()
                    } else {
                        trigger.field.clone()
                    },
                };
                groups.entry(group).or_default().insert(trigger.field.clone());
            }
        }

        let mut affected = Affected::new();
        for (group, names) in groups {
            let ids: BTreeSet<i64> = if group.path.is_empty() {
                self.ids.iter().copied().collect()
            } else {
                let target = registry.model_by_id(group.model);
                let cond = Condition::is_in(&group.path, self.ids.clone());
                select_ids(self.env, target, &Query::new(cond))?
                    .into_iter()
                    .collect()
            };
            affected.insert(group, (names, ids));
        }

        Ok(affected)
    }

    /// Invalidate non-stored dependents, then recompute stored ones.
    pub(super) fn apply_triggers(&self, affected: &Affected) -> Result<(), InternalError> {
        let registry = self.env.registry();

        for (group, (fields, ids)) in affected.iter().filter(|(g, _)| !g.stored) {
            if ids.is_empty() {
                continue;
            }
            let target = registry.model_by_id(group.model);
            {
                let mut cache = self.env.cache_mut();
                for &id in ids {
                    for field in fields {
                        cache.remove_entry(group.model, id, field);
                    }
                }
            }
            sink::record(MetricsEvent::Invalidate {
                model: target.name(),
                records: ids.len() as u64,
            });
            tracing::debug!(model = target.name(), field = %group.target, records = ids.len(), "invalidated");
        }

        if !self.ctx.recompute_stored_fields || !self.env.config().recompute_stored_fields {
            return Ok(());
        }

        let depth = self.ctx.trigger_depth + 1;
        let pending = affected.iter().filter(|(g, (_, ids))| g.stored && !ids.is_empty());
        for (group, (_, ids)) in pending {
            if depth > self.env.config().max_trigger_depth {
                return Err(InternalError::trigger_invariant(format!(
                    "trigger depth {depth} exceeded while recomputing '{}' on '{}'",
                    group.target,
                    registry.model_by_id(group.model).name()
                )));
            }

            let target = registry.model_by_id(group.model);
            let records = Self {
                ids: ids.iter().copied().collect(),
                ctx: Context {
                    trigger_depth: depth,
                    ..self.ctx
                },
                ..self.pool_of(target)
            };
            records.update_stored_fields(&group.target)?;
        }

        Ok(())
    }

    /// Merge `other` into `affected`.
    pub(super) fn merge_affected(affected: &mut Affected, other: Affected) {
        for (group, (fields, ids)) in other {
            let entry = affected.entry(group).or_default();
            entry.0.extend(fields);
            entry.1.extend(ids);
        }
    }

    /// Run compute method `method` on every record and write back the fields
    /// whose value changed. `write_date` never counts as a change.
    pub(super) fn update_stored_fields(&self, method: &str) -> Result<(), InternalError> {
        let mut written = 0_u64;

        for record in self.records() {
            let id = record.ensure_one()?;
            let values = record.call_compute(id, method)?;

            let mut changed = FieldMap::new();
            for (name, value) in values {
                let field = self.model.try_field(&name)?;
                if field.name() == WRITE_DATE_FIELD {
                    continue;
                }
                if !record.fetch_value(id, field)?.same_as(&value) {
                    changed.insert(field.name().to_string(), value);
                }
            }

            if !changed.is_empty() {
                record
                    .with_context(Context {
                        force_compute_write: true,
                        ..record.ctx
                    })
                    .write(changed)?;
                written += 1;
            }
        }

        sink::record(MetricsEvent::Recompute {
            model: self.model.name(),
            records: self.ids.len() as u64,
        });
        tracing::debug!(
            model = self.model.name(),
            method,
            records = self.ids.len(),
            written,
            depth = self.ctx.trigger_depth,
            "stored fields recomputed"
        );

        Ok(())
    }

    // ======================================================================
    // On-change
    // ======================================================================

    /// Apply `values` to the cache of this record (or of a new record when
    /// the collection is empty), run the on-change methods of the given
    /// fields and return every value they produced. The temporary cache
    /// state is replaced by the stored record afterwards.
    pub fn on_change(&self, values: &FieldMap) -> Result<FieldMap, InternalError> {
        let id = match self.ids.as_slice() {
            [] => NEW_RECORD_ID,
            _ => self.ensure_one()?,
        };
        let record = self.derive(vec![id]);

        let result = record.run_on_change(id, values);
        self.env
            .cache_mut()
            .invalidate_record(self.model.id(), id);
        if id != NEW_RECORD_ID {
            // reverse views of other records scan this entry
            record.load(&[])?;
        }

        result
    }

    fn run_on_change(&self, id: i64, values: &FieldMap) -> Result<FieldMap, InternalError> {
        let cref = CacheRef::new(self.model.id(), id);

        if id == NEW_RECORD_ID {
            let mut cache = self.env.cache_mut();
            for field in self.model.column_fields().filter(|f| f.name() != ID_FIELD) {
                let value = field
                    .default_for_create()
                    .unwrap_or_else(|| field.kind().zero_value());
                cache.update_entry_by_ref(cref, field, value);
            }
        }

        for (name, value) in values {
            let field = self.model.try_field(name)?;
            if field.kind().is_reverse() || field.kind() == FieldKind::Many2Many {
                continue;
            }
            self.env
                .cache_mut()
                .update_entry_by_ref(cref, field, value.clone());
        }

        let mut changes = FieldMap::new();
        for name in values.keys() {
            let field = self.model.try_field(name)?;
            let Some(method) = field.on_change_method() else {
                continue;
            };
            let Some(Method::OnChange(on_change)) = self.model.get_method(method) else {
                return Err(InternalError::schema(format!(
                    "model '{}' has no on-change method '{method}'",
                    self.model.name()
                )));
            };

            tracing::trace!(model = self.model.name(), field = field.name(), method, "on change");
            let produced = on_change(self)?;
            self.merge_into_cache(id, produced, &mut changes)?;
        }

        Ok(changes)
    }
}
