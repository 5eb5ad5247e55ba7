use crate::{
    error::InternalError,
    model::{field::Field, methods::Method},
};
use convert_case::{Case, Casing};
use derive_more::Display;
use std::collections::BTreeMap;

/// Name of the primary key field every model carries.
pub const ID_FIELD: &str = "ID";

/// Bookkeeping field stamped on insert.
pub const CREATE_DATE_FIELD: &str = "CreateDate";

/// Bookkeeping field stamped on every write; never part of recompute comparisons.
pub const WRITE_DATE_FIELD: &str = "WriteDate";

///
/// ModelId
///
/// Dense index of a model inside its registry.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModelId(pub(crate) u32);

impl ModelId {
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

///
/// ModelKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[remain::sorted]
pub enum ModelKind {
    /// Synthesized many-to-many link model.
    Link,
    /// Declared model whose table is managed outside this engine.
    Manual,
    Regular,
}

///
/// Model
///
/// Ordered, name-unique field collection bound to one table, plus the map of
/// typed methods that compute / inverse / on-change declarations refer to.
///

#[derive(Debug)]
pub struct Model {
    pub(crate) id: ModelId,
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) kind: ModelKind,
    pub(crate) fields: Vec<Field>,
    pub(crate) by_name: BTreeMap<String, usize>,
    pub(crate) by_json: BTreeMap<String, usize>,
    pub(crate) methods: BTreeMap<String, Method>,
    pub(crate) parent_field: String,
    pub(crate) duplicates: Vec<String>,
}

impl Model {
    /// Declare a regular model with its bookkeeping fields.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::bare(name, ModelKind::Regular)
            .field(Field::datetime(CREATE_DATE_FIELD))
            .field(Field::datetime(WRITE_DATE_FIELD))
    }

    /// Declare a model whose table this engine never creates.
    #[must_use]
    pub fn manual(name: &str) -> Self {
        let mut model = Self::new(name);
        model.kind = ModelKind::Manual;
        model
    }

    /// Link model for a many-to-many relation: `id` plus one foreign key per
    /// endpoint, declared in column order.
    pub(crate) fn link(name: &str, table: &str, endpoints: [(&str, &str); 2]) -> Self {
        let mut endpoints = endpoints;
        endpoints.sort_unstable();

        let mut model = Self::bare(name, ModelKind::Link).with_table(table);
        for (column, target) in endpoints {
            let field_name = column.trim_end_matches("_id").to_case(Case::Pascal);
            model = model.field(Field::many2one(&field_name, target).json(column).required());
        }

        model
    }

    fn bare(name: &str, kind: ModelKind) -> Self {
        let model = Self {
            id: ModelId(0),
            name: name.to_string(),
            table: name.to_case(Case::Snake),
            kind,
            fields: Vec::new(),
            by_name: BTreeMap::new(),
            by_json: BTreeMap::new(),
            methods: BTreeMap::new(),
            parent_field: "Parent".to_string(),
            duplicates: Vec::new(),
        };

        model.field(Field::integer(ID_FIELD).required().unique())
    }

    // ------------------------------------------------------------------
    // Declaration
    // ------------------------------------------------------------------

    /// Add a field. Name clashes are reported when the model is registered.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.push_field(field);
        self
    }

    /// Register a typed method under a logical name.
    #[must_use]
    pub fn method(mut self, name: &str, method: Method) -> Self {
        self.methods.insert(name.to_string(), method);
        self
    }

    /// Override the storage table name.
    #[must_use]
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Field used by child-of predicates to walk the hierarchy.
    #[must_use]
    pub fn parent(mut self, field: &str) -> Self {
        self.parent_field = field.to_string();
        self
    }

    pub(crate) fn push_field(&mut self, mut field: Field) {
        if self.by_name.contains_key(&field.name) || self.by_json.contains_key(&field.json) {
            self.duplicates.push(field.name);
            return;
        }

        field.model.clone_from(&self.name);
        let idx = self.fields.len();
        self.by_name.insert(field.name.clone(), idx);
        self.by_json.insert(field.json.clone(), idx);
        self.fields.push(field);
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn id(&self) -> ModelId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub fn parent_field(&self) -> &str {
        &self.parent_field
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Look up a field by name or json name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.by_name
            .get(name)
            .or_else(|| self.by_json.get(name))
            .map(|&idx| &self.fields[idx])
    }

    pub(crate) fn get_field_mut(&mut self, name: &str) -> Option<&mut Field> {
        let idx = self.by_name.get(name).or_else(|| self.by_json.get(name))?;
        self.fields.get_mut(*idx)
    }

    /// Look up a field, failing with a schema error when it does not exist.
    pub fn try_field(&self, name: &str) -> Result<&Field, InternalError> {
        self.get_field(name)
            .ok_or_else(|| InternalError::unknown_field(&self.name, name))
    }

    #[must_use]
    pub fn get_method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Fields owning a column in this model's table.
    pub fn column_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.has_column())
    }

    /// Stored computed fields, recomputed on create.
    pub fn stored_computed_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_computed() && f.stored)
    }

    /// Whether the engine manages this model's table.
    #[must_use]
    pub fn has_table(&self) -> bool {
        self.kind != ModelKind::Manual
    }

    /// Whether writes stamp `write_date`.
    #[must_use]
    pub fn has_bookkeeping(&self) -> bool {
        self.kind != ModelKind::Link
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_carries_bookkeeping_fields() {
        let model = Model::new("SaleOrder").field(Field::char("Name"));
        let names: Vec<_> = model.fields().map(Field::name).collect();

        assert_eq!(names, vec!["ID", "CreateDate", "WriteDate", "Name"]);
        assert_eq!(model.table(), "sale_order");
        assert_eq!(model.try_field("write_date").map(Field::name), Ok("WriteDate"));
    }

    #[test]
    fn duplicate_fields_are_held_back() {
        let model = Model::new("User")
            .field(Field::char("Name"))
            .field(Field::text("Name"));

        assert_eq!(model.duplicates, vec!["Name".to_string()]);
        assert_eq!(model.fields().count(), 4);
    }

    #[test]
    fn link_model_orders_endpoint_columns() {
        let ab = Model::link(
            "PostTagRel",
            "post_tag_rel",
            [("tag_id", "Tag"), ("post_id", "Post")],
        );
        let json: Vec<_> = ab.fields().map(Field::json_name).collect();

        assert_eq!(json, vec!["id", "post_id", "tag_id"]);
        assert_eq!(ab.kind(), ModelKind::Link);
        assert!(!ab.has_bookkeeping());
    }
}
