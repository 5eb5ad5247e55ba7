use crate::{
    db::{
        cache::CacheRef,
        query::{COUNT_ALIAS, Condition, Query},
        record::RecordCollection,
    },
    error::InternalError,
    model::{Field, FieldKind, ID_FIELD, Model},
    obs::sink::StatementKind,
    value::{FieldMap, Value},
};
use std::collections::BTreeMap;

impl RecordCollection<'_> {
    // ======================================================================
    // Loading
    // ======================================================================

    /// Fetch `fields` of every record from storage into the cache. An empty
    /// list loads every stored field.
    pub fn load(&self, fields: &[&str]) -> Result<(), InternalError> {
        if self.ids.is_empty() {
            return Ok(());
        }

        let fields: Vec<&Field> = if fields.is_empty() {
            self.model.fields().filter(|f| f.is_stored()).collect()
        } else {
            fields
                .iter()
                .map(|name| self.model.try_field(name))
                .collect::<Result<_, _>>()?
        };

        let columns: Vec<&Field> = fields
            .iter()
            .copied()
            .filter(|f| f.has_column() && f.name() != ID_FIELD)
            .collect();
        self.load_columns(&columns)?;

        for field in fields
            .iter()
            .filter(|f| f.is_stored() && !f.kind().has_column())
        {
            self.load_relation(field)?;
        }

        Ok(())
    }

    fn load_columns(&self, columns: &[&Field]) -> Result<(), InternalError> {
        let mut names = vec![ID_FIELD];
        names.extend(columns.iter().map(|f| f.name()));

        let query = Query::new(Condition::is_in(ID_FIELD, self.ids.clone()));
        let stmt = self.env.builder(self.model).select(&query, &names)?;
        let rows = self
            .env
            .fetch(self.model.name(), StatementKind::Select, &stmt)?;

        let mut cache = self.env.cache_mut();
        for row in rows {
            let mut values = row.into_iter();
            let Some(id) = values.next().as_ref().and_then(Value::as_i64) else {
                continue;
            };
            let cref = CacheRef::new(self.model.id(), id);
            for (field, raw) in columns.iter().zip(values) {
                cache.update_entry_by_ref(cref, field, field.kind().decode(raw));
            }
        }

        Ok(())
    }

    /// Load a relation without a column: reverse keys by querying the related
    /// model, many-to-many pairs by querying the link model.
    fn load_relation(&self, field: &Field) -> Result<(), InternalError> {
        let registry = self.env.registry();

        let (source, our, their): (&Model, &str, &str) = match field.kind() {
            FieldKind::One2Many | FieldKind::Rev2One => {
                let reverse = field.reverse_fk().unwrap_or_default();
                (registry.related(field)?, reverse, ID_FIELD)
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
                (
                    link_model,
                    link_model.try_field(&link.our)?.name(),
                    link_model.try_field(&link.their)?.name(),
                )
            }
            _ => return Ok(()),
        };

        let query = Query {
            orders: vec![their.to_string()],
            ..Query::new(Condition::is_in(our, self.ids.clone()))
        };
        let stmt = self.env.builder(source).select(&query, &[our, their])?;
        let rows = self.env.fetch(source.name(), StatementKind::Select, &stmt)?;

        let mut grouped: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for row in &rows {
            if let [owner, other, ..] = row.as_slice()
                && let (Some(owner), Some(other)) = (owner.as_i64(), other.as_i64())
            {
                grouped.entry(owner).or_default().push(other);
            }
        }

        let mut cache = self.env.cache_mut();
        for &id in &self.ids {
            let others = grouped.remove(&id).unwrap_or_default();
            cache.update_entry_by_ref(CacheRef::new(self.model.id(), id), field, Value::Ids(others));
        }

        Ok(())
    }

    // ======================================================================
    // Grouped reads
    // ======================================================================

    /// Aggregated rows of the records matching `cond`, grouped by `groups`.
    ///
    /// `fields` pairs a path with an optional aggregate; paths that are not
    /// grouped fall back to their field's group operator. Every row carries
    /// the group values, the aggregates and a `__count` entry.
    pub fn read_group(
        &self,
        cond: Condition,
        groups: &[&str],
        fields: &[(&str, Option<&str>)],
    ) -> Result<Vec<FieldMap>, InternalError> {
        let mut query = Query {
            groups: groups.iter().map(ToString::to_string).collect(),
            orders: groups.iter().map(ToString::to_string).collect(),
            ..Query::new(cond)
        };
        self.expand_child_of(&mut query.cond)?;

        let mut select: Vec<(&str, Option<&str>)> = groups.iter().map(|g| (*g, None)).collect();
        select.extend(fields.iter().filter(|(path, _)| !groups.contains(path)));

        let stmt = self.env.builder(self.model).select_group(&query, &select)?;
        let rows = self
            .env
            .fetch(self.model.name(), StatementKind::Select, &stmt)?;

        let registry = self.env.registry();
        let kinds: Vec<Option<FieldKind>> = stmt
            .columns
            .iter()
            .map(|path| {
                (path != COUNT_ALIAS)
                    .then(|| registry.resolve_path(self.model, path))
                    .transpose()
                    .map(|resolved| resolved.map(|(_, field)| field.kind()))
            })
            .collect::<Result<_, _>>()?;

        Ok(rows
            .into_iter()
            .map(|row| {
                stmt.columns
                    .iter()
                    .zip(&kinds)
                    .zip(row)
                    .map(|((path, kind), raw)| {
                        let value = match kind {
                            Some(kind) => kind.decode(raw),
                            None => raw,
                        };
                        (path.clone(), value)
                    })
                    .collect()
            })
            .collect())
    }
}
