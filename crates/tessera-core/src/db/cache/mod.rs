//! Environment-scoped record cache.
//!
//! Entries are keyed by `CacheRef` and hold json-name → value maps.
//! One-to-many and reverse-one-to-one values are derived by scanning entries
//! of the related model for a matching back-reference; the forward entry only
//! stores a presence flag. Many-to-many membership is kept once per link table
//! as a set of id pairs ordered by column name. Non-stored computed
//! relations have no link and keep their value in the entry itself.
//!
//! The cache is owned by exactly one environment and is not synchronized.


use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::{Field, FieldKind, LinkSpec, ModelId, Registry},
    value::{FieldMap, Value},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// CacheMiss
///
/// Requested value is not available. Always handled by fetching or
/// computing; never surfaced past the record layer.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("'{path}' of {model}({id}) is not in cache")]
pub struct CacheMiss {
    pub model: String,
    pub id: i64,
    pub path: String,
}

impl From<CacheMiss> for InternalError {
    fn from(err: CacheMiss) -> Self {
        Self::new(ErrorClass::NotFound, ErrorOrigin::Cache, err.to_string())
    }
}

///
/// CacheRef
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CacheRef {
    pub model: ModelId,
    pub id: i64,
}

impl CacheRef {
    #[must_use]
    pub const fn new(model: ModelId, id: i64) -> Self {
        Self { model, id }
    }
}

///
/// Cache
///

#[derive(Debug)]
pub struct Cache {
    registry: Arc<Registry>,
    data: BTreeMap<CacheRef, FieldMap>,
    links: BTreeMap<String, BTreeSet<[i64; 2]>>,
}

impl Cache {
    #[must_use]
    pub const fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            data: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop every entry and link.
    pub fn clear(&mut self) {
        self.data.clear();
        self.links.clear();
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create or update the entry at `path`, walking relation hops first.
    pub fn update_entry(
        &mut self,
        model: ModelId,
        id: i64,
        path: &str,
        value: Value,
    ) -> Result<(), InternalError> {
        let (cref, field) = self.related_ref(model, id, path)?;
        self.update_entry_by_ref(cref, &field, value);

        Ok(())
    }

    /// Create or update one field of one record.
    pub fn update_entry_by_ref(&mut self, cref: CacheRef, field: &Field, value: Value) {
        self.entry(cref);

        match field.kind() {
            _ if !field.is_stored() => self.set(cref, field.json_name(), value),
            FieldKind::One2Many | FieldKind::Rev2One => {
                self.set_reverse(cref, field, &value.ids());
                self.set(cref, field.json_name(), Value::Bool(true));
            }
            FieldKind::Many2Many => {
                if let Some(link) = field.link() {
                    self.remove_links(link, cref.id);
                    self.add_links(link, cref.id, &value.ids());
                }
                self.set(cref, field.json_name(), Value::Bool(true));
            }
            _ => self.set(cref, field.json_name(), value),
        }
    }

    /// Add every entry of `values`; keys may be paths and are applied
    /// shortest first so relation hops exist before their targets.
    pub fn add_record(
        &mut self,
        model: ModelId,
        id: i64,
        values: &FieldMap,
    ) -> Result<(), InternalError> {
        let mut paths: Vec<(&String, &Value)> = values.iter().collect();
        paths.sort_by_key(|(path, _)| path.split('.').count());

        for (path, value) in paths {
            self.update_entry(model, id, path, value.clone())?;
        }

        Ok(())
    }

    /// Remove one field of one record. Many-to-many links of that record are
    /// purged with it.
    pub fn remove_entry(&mut self, model: ModelId, id: i64, name: &str) {
        let registry = Arc::clone(&self.registry);
        let Some(field) = registry.model_by_id(model).get_field(name) else {
            return;
        };
        let cref = CacheRef::new(model, id);

        if let Some(entry) = self.data.get_mut(&cref) {
            entry.remove(field.json_name());
        }
        if let Some(link) = field.link() {
            self.remove_links(link, id);
        }
    }

    /// Drop a whole record and its many-to-many links.
    ///
    /// Reverse views held by other records are not fixed up; reload the
    /// record before relying on them again.
    pub fn invalidate_record(&mut self, model: ModelId, id: i64) {
        self.data.remove(&CacheRef::new(model, id));

        let links: Vec<LinkSpec> = self
            .registry
            .model_by_id(model)
            .fields()
            .filter_map(|f| f.link().cloned())
            .collect();
        for link in &links {
            self.remove_links(link, id);
        }
    }

    fn entry(&mut self, cref: CacheRef) -> &mut FieldMap {
        self.data
            .entry(cref)
            .or_insert_with(|| FieldMap::new().with("id", cref.id))
    }

    fn set(&mut self, cref: CacheRef, json: &str, value: Value) {
        self.entry(cref).insert(json.to_string(), value);
    }

    /// Point the reverse key of `ids` at `cref`; cached records of the
    /// related model that pointed at `cref` but are not in `ids` lose it.
    fn set_reverse(&mut self, cref: CacheRef, field: &Field, ids: &[i64]) {
        let registry = Arc::clone(&self.registry);
        let Ok(target) = registry.related(field) else {
            return;
        };
        let Some(reverse) = field.reverse_fk().and_then(|fk| target.get_field(fk)) else {
            return;
        };
        let json = reverse.json_name();

        for (other, values) in &mut self.data {
            if other.model == target.id()
                && !ids.contains(&other.id)
                && values.get(json).and_then(Value::fk_id) == Some(cref.id)
            {
                values.insert(json.to_string(), Value::Int(0));
            }
        }
        for &id in ids {
            self.set(CacheRef::new(target.id(), id), json, Value::Int(cref.id));
        }
    }

    // ------------------------------------------------------------------
    // Many-to-many links
    // ------------------------------------------------------------------

    /// Link `id` (on this field's side) to every id of `others`.
    pub fn add_links(&mut self, link: &LinkSpec, id: i64, others: &[i64]) {
        let (ours, theirs) = (link.our_index(), link.their_index());
        let set = self.links.entry(link.table.clone()).or_default();

        for &other in others {
            let mut pair = [0; 2];
            pair[ours] = id;
            pair[theirs] = other;
            set.insert(pair);
        }
    }

    /// Remove every link of `id` on this field's side.
    pub fn remove_links(&mut self, link: &LinkSpec, id: i64) {
        let ours = link.our_index();
        if let Some(set) = self.links.get_mut(&link.table) {
            set.retain(|pair| pair[ours] != id);
        }
    }

    /// Ids linked to `id` through `link`, ascending.
    #[must_use]
    pub fn get_links(&self, link: &LinkSpec, id: i64) -> Vec<i64> {
        let (ours, theirs) = (link.our_index(), link.their_index());
        let mut ids: Vec<i64> = self
            .links
            .get(&link.table)
            .into_iter()
            .flatten()
            .filter(|pair| pair[ours] == id)
            .map(|pair| pair[theirs])
            .collect();
        ids.sort_unstable();

        ids
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Cached value at `path`, relation views derived on the fly.
    pub fn get(&self, model: ModelId, id: i64, path: &str) -> Result<Value, CacheMiss> {
        let miss = || self.miss(model, id, path);
        let (cref, field) = self.related_ref(model, id, path).map_err(|_| miss())?;
        let entry = self.data.get(&cref).ok_or_else(miss)?;
        let stored = entry.get(field.json_name()).ok_or_else(miss)?;

        let value = match field.kind() {
            _ if !field.is_stored() => stored.clone(),
            FieldKind::One2Many => Value::Ids(self.reverse_ids(cref, &field)),
            FieldKind::Rev2One => Value::Int(
                self.reverse_ids(cref, &field)
                    .first()
                    .copied()
                    .unwrap_or_default(),
            ),
            FieldKind::Many2Many => Value::Ids(
                field
                    .link()
                    .map(|link| self.get_links(link, cref.id))
                    .unwrap_or_default(),
            ),
            _ => stored.clone(),
        };

        Ok(value)
    }

    /// Whole record as currently cached, relation views included.
    #[must_use]
    pub fn get_record(&self, model: ModelId, id: i64) -> FieldMap {
        let Some(entry) = self.data.get(&CacheRef::new(model, id)) else {
            return FieldMap::new();
        };

        entry
            .keys()
            .filter_map(|json| {
                self.get(model, id, json)
                    .ok()
                    .map(|value| (json.clone(), value))
            })
            .collect()
    }

    /// Whether every path is cached for every id. An empty id list is never
    /// considered cached.
    #[must_use]
    pub fn check_if_in_cache(&self, model: ModelId, ids: &[i64], paths: &[&str]) -> bool {
        !ids.is_empty()
            && ids.iter().all(|&id| {
                paths.iter().all(|path| {
                    self.related_ref(model, id, path)
                        .ok()
                        .and_then(|(cref, field)| {
                            self.data
                                .get(&cref)
                                .map(|entry| entry.contains_key(field.json_name()))
                        })
                        .unwrap_or(false)
                })
            })
    }

    fn reverse_ids(&self, cref: CacheRef, field: &Field) -> Vec<i64> {
        let Ok(target) = self.registry.related(field) else {
            return Vec::new();
        };
        let Some(reverse) = field.reverse_fk().and_then(|fk| target.get_field(fk)) else {
            return Vec::new();
        };

        self.data
            .iter()
            .filter(|(other, values)| {
                other.model == target.id()
                    && values.get(reverse.json_name()).and_then(Value::fk_id) == Some(cref.id)
            })
            .map(|(other, _)| other.id)
            .collect()
    }

    /// Resolve `path` to the record owning its last segment, following the
    /// cached single-record relation of every intermediate hop.
    fn related_ref(
        &self,
        model: ModelId,
        id: i64,
        path: &str,
    ) -> Result<(CacheRef, Field), InternalError> {
        let owner = self.registry.model_by_id(model);

        match path.split_once('.') {
            None => Ok((CacheRef::new(model, id), owner.try_field(path)?.clone())),
            Some((head, rest)) => {
                let field = owner.try_field(head)?;
                if !matches!(
                    field.kind(),
                    FieldKind::Many2One | FieldKind::One2One | FieldKind::Rev2One
                ) {
                    return Err(self.miss(model, id, path).into());
                }
                let target = self.registry.related(field)?;
                let next = self
                    .get(model, id, head)?
                    .fk_id()
                    .ok_or_else(|| self.miss(model, id, path))?;

                self.related_ref(target.id(), next, rest)
            }
        }
    }

    fn miss(&self, model: ModelId, id: i64, path: &str) -> CacheMiss {
        CacheMiss {
            model: self.registry.model_by_id(model).name().to_string(),
            id,
            path: path.to_string(),
        }
    }
}
