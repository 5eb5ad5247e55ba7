use crate::{
    db::{
        cache::CacheRef,
        query::{Condition, Operator, Query},
        record::{RecordCollection, computed::Affected, select_ids},
        security::Permission,
    },
    error::InternalError,
    model::{CREATE_DATE_FIELD, Field, FieldKind, ID_FIELD, Method, ModelKind, WRITE_DATE_FIELD},
    obs::sink::StatementKind,
    value::{FieldMap, Value},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

///
/// SplitValues
///
/// Values of one create or write, sorted by where they end up.
///

#[derive(Debug, Default)]
struct SplitValues {
    /// Written to the model's own table.
    columns: FieldMap,
    /// Reverse keys and link rows on other tables.
    relations: FieldMap,
    /// Handed to inverse methods.
    computed: FieldMap,
    /// Forced non-stored computed values, kept in the cache only.
    cache_only: FieldMap,
}

impl SplitValues {
    fn names(&self) -> Vec<String> {
        [&self.columns, &self.relations, &self.computed, &self.cache_only]
            .into_iter()
            .flat_map(FieldMap::key_list)
            .collect()
    }
}

impl<'env> RecordCollection<'env> {
    // ======================================================================
    // Create
    // ======================================================================

    /// Insert one record and return it as a singleton.
    ///
    /// Missing fields take their declared default; computed values go
    /// through their inverse method; stored computed fields of the new record
    /// are computed before dependents elsewhere are triggered.
    pub fn create(&self, values: FieldMap) -> Result<Self, InternalError> {
        self.check_model_access(Permission::Write)?;

        let mut values = self.normalize(values)?;
        for field in self.model.fields() {
            if !values.contains_key(field.name())
                && let Some(default) = field.default_for_create()
            {
                values.insert(field.name().to_string(), default);
            }
        }
        if self.model.has_bookkeeping() {
            let now = now_stamp()?;
            values.insert(CREATE_DATE_FIELD.to_string(), now.clone());
            values.insert(WRITE_DATE_FIELD.to_string(), now);
        }

        let split = self.split(values)?;
        let names = split.names();

        let stmt = self.env.builder(self.model).insert(&split.columns)?;
        let rows = self
            .env
            .fetch(self.model.name(), StatementKind::Insert, &stmt)?;
        let id = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                InternalError::storage(format!("insert into '{}' returned no id", self.model.name()))
            })?;

        {
            let cref = CacheRef::new(self.model.id(), id);
            let mut cache = self.env.cache_mut();
            for field in self.model.column_fields().filter(|f| f.name() != ID_FIELD) {
                let value = split
                    .columns
                    .get(field.name())
                    .cloned()
                    .unwrap_or_else(|| field.kind().zero_value());
                cache.update_entry_by_ref(cref, field, value);
            }
        }

        let record = self.derive(vec![id]);
        for (name, value) in &split.relations {
            record.write_relation(self.model.try_field(name)?, value)?;
        }
        record.cache_forced(&split.cache_only)?;
        record.call_inverses(split.computed)?;

        if self.ctx.recompute_stored_fields && self.env.config().recompute_stored_fields {
            let mut methods: Vec<&str> = self
                .model
                .stored_computed_fields()
                .filter_map(Field::compute_method)
                .collect();
            methods.sort_unstable();
            methods.dedup();
            for method in methods {
                record.update_stored_fields(method)?;
            }
        }

        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let affected = record.resolve_triggers(&names)?;
        record.apply_triggers(&affected)?;
        record.check_constraints(&names)?;

        tracing::debug!(model = self.model.name(), id, "record created");

        Ok(record)
    }

    // ======================================================================
    // Write
    // ======================================================================

    /// Update every record of the collection with `values`.
    ///
    /// Dependents are resolved both before and after the write so records
    /// that stop depending on these (a line moved to another invoice) are
    /// recomputed as well.
    pub fn write(&self, values: FieldMap) -> Result<(), InternalError> {
        if values.is_empty() || self.ids.is_empty() {
            return Ok(());
        }

        let values = self.normalize(values)?;
        if !self.ctx.force_compute_write {
            for name in values.keys() {
                if !self
                    .env
                    .can_access_field(self.model.name(), name, Permission::Write)
                {
                    return Err(InternalError::permission_denied(format!(
                        "user {} may not write '{}.{name}'",
                        self.env.uid(),
                        self.model.name()
                    )));
                }
            }
        }

        let mut split = self.split(values)?;
        if self.model.has_bookkeeping()
            && (!split.columns.is_empty() || !split.relations.is_empty())
        {
            split
                .columns
                .insert(WRITE_DATE_FIELD.to_string(), now_stamp()?);
        }
        let names = split.names();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();

        self.call_inverses(split.computed)?;
        self.cache_forced(&split.cache_only)?;

        let moves_records = !split.relations.is_empty()
            || split
                .columns
                .keys()
                .filter_map(|name| self.model.get_field(name))
                .any(|f| f.kind().is_fk());
        let mut affected = if moves_records {
            self.resolve_triggers(&names)?
        } else {
            Affected::new()
        };

        if !split.columns.is_empty() {
            let query = Query::new(Condition::is_in(ID_FIELD, self.ids.clone()));
            let stmt = self.env.builder(self.model).update(&query, &split.columns)?;
            self.env
                .execute(self.model.name(), StatementKind::Update, &stmt)?;

            let mut cache = self.env.cache_mut();
            for &id in &self.ids {
                let cref = CacheRef::new(self.model.id(), id);
                for (name, value) in &split.columns {
                    cache.update_entry_by_ref(cref, self.model.try_field(name)?, value.clone());
                }
            }
        }

        for (name, value) in &split.relations {
            let field = self.model.try_field(name)?;
            for record in self.records() {
                record.write_relation(field, value)?;
            }
        }

        Self::merge_affected(&mut affected, self.resolve_triggers(&names)?);
        self.apply_triggers(&affected)?;
        self.check_constraints(&names)
    }

    /// Run the constraint methods of the written fields on every record.
    /// A method shared by several fields runs once.
    fn check_constraints(&self, names: &[&str]) -> Result<(), InternalError> {
        let mut methods: Vec<&str> = names
            .iter()
            .filter_map(|name| self.model.get_field(name))
            .filter_map(Field::constraint_method)
            .collect();
        methods.sort_unstable();
        methods.dedup();

        for method in methods {
            let Some(Method::Constraint(constraint)) = self.model.get_method(method) else {
                return Err(InternalError::schema(format!(
                    "model '{}' has no constraint method '{method}'",
                    self.model.name()
                )));
            };
            for record in self.records() {
                constraint(&record)?;
            }
        }

        Ok(())
    }

    /// Map json names to field names and reject writes to the id.
    fn normalize(&self, values: FieldMap) -> Result<FieldMap, InternalError> {
        values
            .into_iter()
            .map(|(key, value)| {
                let field = self.model.try_field(&key)?;
                if field.name() == ID_FIELD {
                    return Err(InternalError::record(format!(
                        "the id of '{}' cannot be written",
                        self.model.name()
                    )));
                }
                Ok((field.name().to_string(), value))
            })
            .collect()
    }

    fn split(&self, values: FieldMap) -> Result<SplitValues, InternalError> {
        let mut split = SplitValues::default();

        for (name, value) in values {
            let field = self.model.try_field(&name)?;
            let bucket = if field.is_computed() {
                match (self.ctx.force_compute_write, field.has_column()) {
                    (true, true) => &mut split.columns,
                    (true, false) => &mut split.cache_only,
                    (false, _) => &mut split.computed,
                }
            } else if field.has_column() {
                &mut split.columns
            } else {
                &mut split.relations
            };
            bucket.insert(name, value);
        }

        Ok(split)
    }

    fn cache_forced(&self, values: &FieldMap) -> Result<(), InternalError> {
        let mut cache = self.env.cache_mut();
        for &id in &self.ids {
            for (name, value) in values {
                let field = self.model.try_field(name)?;
                cache.update_entry_by_ref(CacheRef::new(self.model.id(), id), field, value.clone());
            }
        }

        Ok(())
    }

    /// Hand computed values to their inverse method, once per record.
    fn call_inverses(&self, computed: FieldMap) -> Result<(), InternalError> {
        for (name, value) in computed {
            let field = self.model.try_field(&name)?;

            let Some(method) = field.inverse_method() else {
                if self.ctx.allow_without_inverse
                    || self.env.config().permit_missing_inverse
                    || value.is_zero()
                {
                    tracing::debug!(model = self.model.name(), field = %name, "computed value without inverse dropped");
                    continue;
                }
                return Err(InternalError::schema(format!(
                    "computed field '{}.{name}' has no inverse method",
                    self.model.name()
                )));
            };
            let Some(Method::Inverse(inverse)) = self.model.get_method(method) else {
                return Err(InternalError::schema(format!(
                    "model '{}' has no inverse method '{method}'",
                    self.model.name()
                )));
            };

            for record in self.records() {
                inverse(&record, &value)?;
            }
        }

        Ok(())
    }

    /// Persist a relation without a column for a singleton.
    fn write_relation(&self, field: &Field, value: &Value) -> Result<(), InternalError> {
        let id = self.ensure_one()?;
        let ids = value.ids();
        let registry = self.env.registry();

        match field.kind() {
            FieldKind::One2Many | FieldKind::Rev2One => {
                let target = registry.related(field)?;
                let reverse = target.try_field(field.reverse_fk().unwrap_or_default())?;
                let pool = self.pool_of(target);

                let detach = Condition::eq(reverse.name(), id).and(
                    ID_FIELD,
                    Operator::NotIn,
                    ids.clone(),
                );
                let stale = select_ids(self.env, target, &Query::new(detach))?;
                if !stale.is_empty() {
                    let stale = pool.browse(&stale);
                    if reverse.is_required() {
                        stale.unlink()?;
                    } else {
                        stale.write(FieldMap::new().with(reverse.name(), 0))?;
                    }
                }
                if !ids.is_empty() {
                    pool.browse(&ids)
                        .write(FieldMap::new().with(reverse.name(), id))?;
                }
            }
            FieldKind::Many2Many => {
                let Some(link) = field.link() else {
                    return Err(InternalError::schema(format!(
                        "many-to-many field '{}.{}' has no link",
                        self.model.name(),
                        field.name()
                    )));
                };
                let link_model = registry.model(&link.model)?;
                let our = link_model.try_field(&link.our)?.name();
                let their = link_model.try_field(&link.their)?.name();
                let builder = self.env.builder(link_model);

                let stmt = builder.delete(&Query::new(Condition::eq(our, id)))?;
                self.env
                    .execute(link_model.name(), StatementKind::Delete, &stmt)?;
                for &other in &ids {
                    let stmt = builder.insert(&FieldMap::new().with(our, id).with(their, other))?;
                    self.env
                        .fetch(link_model.name(), StatementKind::Insert, &stmt)?;
                }
            }
            _ => return Ok(()),
        }

        self.env.cache_mut().update_entry_by_ref(
            CacheRef::new(self.model.id(), id),
            field,
            Value::Ids(ids),
        );

        Ok(())
    }

    // ======================================================================
    // Unlink
    // ======================================================================

    /// Delete every record of the collection, returning the number of rows
    /// removed. Children holding a required reverse key are deleted with
    /// their parent, other children are detached.
    pub fn unlink(&self) -> Result<u64, InternalError> {
        if self.ids.is_empty() {
            return Ok(0);
        }
        self.check_model_access(Permission::Unlink)?;

        let names: Vec<&str> = self.model.fields().map(Field::name).collect();
        let mut affected = self.resolve_triggers(&names)?;
        for (group, (_, ids)) in &mut affected {
            if group.model == self.model.id() {
                ids.retain(|id| !self.ids.contains(id));
            }
        }

        let registry = self.env.registry();
        for field in self.model.fields().filter(|f| f.kind().is_reverse()) {
            let target = registry.related(field)?;
            let reverse = target.try_field(field.reverse_fk().unwrap_or_default())?;
            let children = select_ids(
                self.env,
                target,
                &Query::new(Condition::is_in(reverse.name(), self.ids.clone())),
            )?;
            if children.is_empty() {
                continue;
            }

            let children = self.pool_of(target).browse(&children);
            if reverse.is_required() {
                children.unlink()?;
            } else {
                children.write(FieldMap::new().with(reverse.name(), 0))?;
            }
        }

        for link_model in registry.models().filter(|m| m.kind() == ModelKind::Link) {
            for fk in link_model
                .fields()
                .filter(|f| f.kind().is_fk() && f.related_model() == Some(self.model.name()))
            {
                let query = Query::new(Condition::is_in(fk.name(), self.ids.clone()));
                let stmt = self.env.builder(link_model).delete(&query)?;
                self.env
                    .execute(link_model.name(), StatementKind::Delete, &stmt)?;
            }
        }

        let query = Query::new(Condition::is_in(ID_FIELD, self.ids.clone()));
        let stmt = self.env.builder(self.model).delete(&query)?;
        let deleted = self
            .env
            .execute(self.model.name(), StatementKind::Delete, &stmt)?;
        {
            let mut cache = self.env.cache_mut();
            for &id in &self.ids {
                cache.invalidate_record(self.model.id(), id);
            }
        }

        self.apply_triggers(&affected)?;
        tracing::debug!(model = self.model.name(), records = deleted, "records unlinked");

        Ok(deleted)
    }

    fn check_model_access(&self, permission: Permission) -> Result<(), InternalError> {
        if self.env.can_access_model(self.model.name(), permission) {
            return Ok(());
        }

        Err(InternalError::permission_denied(format!(
            "user {} lacks {permission} permission on '{}'",
            self.env.uid(),
            self.model.name()
        )))
    }
}

/// Current UTC time as stored in bookkeeping fields.
fn now_stamp() -> Result<Value, InternalError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map(Value::Text)
        .map_err(|err| InternalError::record(format!("cannot format timestamp: {err}")))
}
