//! Record collections: ordered, duplicate-free ids of one model bound to one
//! environment. Reads go through the environment cache; writes go to storage
//! and the cache together, then fire dependency triggers.

mod computed;
mod load;
mod write;


use crate::{
    db::{
        env::Environment,
        query::{self, Condition, Operator, Query},
        security::Permission,
    },
    error::InternalError,
    model::{Field, Model, RegistryError},
    obs::sink::StatementKind,
    value::{FieldMap, Value},
};
use std::fmt;

///
/// Context
///
/// Per-collection flags carried into every collection derived from it.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Context {
    /// Write computed fields to their column instead of calling inverses.
    /// Set on writes issued by stored-field recomputation.
    pub force_compute_write: bool,

    /// Drop writes to computed fields that declare no inverse method.
    pub allow_without_inverse: bool,

    /// Recompute stored fields after writes.
    pub recompute_stored_fields: bool,

    pub(crate) trigger_depth: u32,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            force_compute_write: false,
            allow_without_inverse: false,
            recompute_stored_fields: true,
            trigger_depth: 0,
        }
    }
}

///
/// RecordCollection
///

#[derive(Clone)]
pub struct RecordCollection<'env> {
    env: &'env Environment,
    model: &'env Model,
    ids: Vec<i64>,
    ctx: Context,
}

impl fmt::Debug for RecordCollection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.model.name(), self.ids)
    }
}

impl<'env> RecordCollection<'env> {
    pub(crate) fn new(env: &'env Environment, model: &'env Model) -> Self {
        Self {
            env,
            model,
            ids: Vec::new(),
            ctx: Context::default(),
        }
    }

    /// Collection of the same model and context holding `ids`.
    fn derive(&self, ids: Vec<i64>) -> Self {
        Self {
            env: self.env,
            model: self.model,
            ids,
            ctx: self.ctx,
        }
    }

    /// Empty collection of another model, same context.
    fn pool_of(&self, model: &'env Model) -> Self {
        Self {
            env: self.env,
            model,
            ids: Vec::new(),
            ctx: self.ctx,
        }
    }

    // ======================================================================
    // Accessors
    // ======================================================================

    #[must_use]
    pub const fn env(&self) -> &'env Environment {
        self.env
    }

    #[must_use]
    pub const fn model(&self) -> &'env Model {
        self.model
    }

    #[must_use]
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub const fn context(&self) -> Context {
        self.ctx
    }

    #[must_use]
    pub fn with_context(&self, ctx: Context) -> Self {
        let mut rc = self.clone();
        rc.ctx = ctx;
        rc
    }

    #[must_use]
    pub fn allow_without_inverse(&self) -> Self {
        self.with_context(Context {
            allow_without_inverse: true,
            ..self.ctx
        })
    }

    /// Collection of this model holding `ids`, duplicates removed.
    #[must_use]
    pub fn browse(&self, ids: &[i64]) -> Self {
        let mut unique = Vec::with_capacity(ids.len());
        for &id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        self.derive(unique)
    }

    /// One singleton collection per record.
    pub fn records(&self) -> impl Iterator<Item = Self> + '_ {
        self.ids.iter().map(|&id| self.derive(vec![id]))
    }

    /// Id of a singleton collection.
    pub fn ensure_one(&self) -> Result<i64, InternalError> {
        match self.ids.as_slice() {
            [id] => Ok(*id),
            ids => Err(InternalError::record(format!(
                "expected a singleton {}, got {} records",
                self.model.name(),
                ids.len()
            ))),
        }
    }

    // ======================================================================
    // Search
    // ======================================================================

    /// Records of this model matching `cond`.
    pub fn search(&self, cond: Condition) -> Result<Self, InternalError> {
        self.search_query(Query::new(cond))
    }

    pub fn search_all(&self) -> Result<Self, InternalError> {
        self.search_query(Query {
            fetch_all: true,
            ..Query::default()
        })
    }

    /// Search with ordering, limit and offset.
    pub fn search_query(&self, mut query: Query) -> Result<Self, InternalError> {
        self.expand_child_of(&mut query.cond)?;
        let ids = select_ids(self.env, self.model, &query)?;

        Ok(self.derive(ids))
    }

    pub fn search_count(&self, cond: Condition) -> Result<u64, InternalError> {
        let mut query = Query::new(cond);
        self.expand_child_of(&mut query.cond)?;

        let stmt = self.env.builder(self.model).count(&query)?;
        let rows = self
            .env
            .fetch(self.model.name(), StatementKind::Count, &stmt)?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or_default();

        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn expand_child_of(&self, cond: &mut Condition) -> Result<(), InternalError> {
        if !cond.uses_operator(Operator::ChildOf) {
            return Ok(());
        }

        let env = self.env;
        let model = self.model;
        cond.substitute_child_of(&mut |path, arg| {
            query::expand_child_of(env.registry(), model, path, arg, |tree, level| {
                select_ids(env, tree, &Query::new(level.clone()))
            })
        })
    }

    // ======================================================================
    // Reads
    // ======================================================================

    /// Value at `path` of a singleton. An empty collection yields the zero
    /// value of the last field.
    pub fn get(&self, path: &str) -> Result<Value, InternalError> {
        if self.ids.is_empty() {
            let (_, field) = self.env.registry().resolve_path(self.model, path)?;
            return Ok(field.kind().zero_value());
        }
        let id = self.ensure_one()?;

        match path.split_once('.') {
            None => self.field_value(id, self.model.try_field(path)?),
            Some((head, rest)) => self.related(head)?.get(rest),
        }
    }

    /// Records reached through relation `path` from every record, in first
    /// seen order.
    pub fn related(&self, path: &str) -> Result<Self, InternalError> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let field = self.model.try_field(head)?;
        if !field.kind().is_relation() {
            return Err(RegistryError::NotARelation {
                model: self.model.name().to_string(),
                field: field.name().to_string(),
            }
            .into());
        }
        let target = self.env.registry().related(field)?;

        self.prefetch(field)?;
        let mut ids = Vec::new();
        for &id in &self.ids {
            for other in self.field_value(id, field)?.ids() {
                if !ids.contains(&other) {
                    ids.push(other);
                }
            }
        }
        let related = Self {
            ids,
            ..self.pool_of(target)
        };

        match rest {
            Some(rest) => related.related(rest),
            None => Ok(related),
        }
    }

    /// Value at `path` for every record, in collection order.
    pub fn values(&self, path: &str) -> Result<Vec<Value>, InternalError> {
        let head = path.split('.').next().unwrap_or(path);
        self.prefetch(self.model.try_field(head)?)?;

        self.records().map(|record| record.get(path)).collect()
    }

    /// Field maps of every record keyed by field name. An empty field list
    /// reads every field; fields the user may not read are left out.
    pub fn read(&self, fields: &[&str]) -> Result<Vec<FieldMap>, InternalError> {
        let fields: Vec<&Field> = if fields.is_empty() {
            self.model.fields().collect()
        } else {
            fields
                .iter()
                .map(|name| self.model.try_field(name))
                .collect::<Result<_, _>>()?
        };
        let readable: Vec<&Field> = fields
            .into_iter()
            .filter(|f| {
                self.env
                    .can_access_field(self.model.name(), f.name(), Permission::Read)
            })
            .collect();

        let stored: Vec<&str> = readable
            .iter()
            .filter(|f| f.is_stored())
            .map(|f| f.name())
            .collect();
        if !stored.is_empty()
            && !self
                .env
                .cache()
                .check_if_in_cache(self.model.id(), &self.ids, &stored)
        {
            self.load(&stored)?;
        }

        let mut out = Vec::with_capacity(self.ids.len());
        for &id in &self.ids {
            let mut map = FieldMap::new();
            for field in &readable {
                map.insert(field.name().to_string(), self.field_value(id, field)?);
            }
            out.push(map);
        }

        Ok(out)
    }

    /// Load a stored field for the whole collection when any record misses it.
    fn prefetch(&self, field: &Field) -> Result<(), InternalError> {
        let cached = self
            .env
            .cache()
            .check_if_in_cache(self.model.id(), &self.ids, &[field.name()]);
        if self.ids.len() > 1 && field.is_stored() && !cached {
            self.load(&[field.name()])?;
        }

        Ok(())
    }
}

/// Ids of `model` matching `query`, in result order.
fn select_ids(env: &Environment, model: &Model, query: &Query) -> Result<Vec<i64>, InternalError> {
    let stmt = env.builder(model).select(query, &["ID"])?;
    let rows = env.fetch(model.name(), StatementKind::Select, &stmt)?;

    Ok(rows
        .iter()
        .filter_map(|row| row.first().and_then(Value::as_i64))
        .collect())
}
