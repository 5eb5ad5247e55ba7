use crate::{model::kind::FieldKind, value::Value};
use convert_case::{Case, Casing};
use std::{fmt, sync::Arc};

/// Producer of a field's default value at create time.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

///
/// LinkSpec
///
/// Link structure behind a many-to-many field: the link model (and table) plus
/// the column pointing at this side ("our") and at the related side ("their").
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkSpec {
    pub model: String,
    pub table: String,
    pub our: String,
    pub their: String,
}

impl LinkSpec {
    /// Slot of this side in the link pairs stored by the cache.
    ///
    /// Pairs are ordered by column name so both endpoints of one relation
    /// agree on which slot holds which id.
    #[must_use]
    pub fn our_index(&self) -> usize {
        usize::from(self.our > self.their)
    }

    #[must_use]
    pub fn their_index(&self) -> usize {
        1 - self.our_index()
    }
}

///
/// Field
///
/// Declarative field descriptor. Relations point at other models by name and
/// are resolved through the registry at use time.
///

#[derive(Clone)]
pub struct Field {
    pub(crate) model: String,
    pub(crate) name: String,
    pub(crate) json: String,
    pub(crate) kind: FieldKind,
    pub(crate) required: bool,
    pub(crate) unique: bool,
    pub(crate) stored: bool,
    pub(crate) compute: Option<String>,
    pub(crate) inverse: Option<String>,
    pub(crate) on_change: Option<String>,
    pub(crate) constraint: Option<String>,
    pub(crate) depends: Vec<String>,
    pub(crate) related_model: Option<String>,
    pub(crate) reverse_fk: Option<String>,
    pub(crate) link: Option<LinkSpec>,
    pub(crate) related_path: Option<String>,
    pub(crate) group_operator: Option<String>,
    pub(crate) default: Option<DefaultFn>,
}

impl Field {
    #[must_use]
    pub fn new(name: &str, kind: FieldKind) -> Self {
        let json = if name == "ID" {
            "id".to_string()
        } else {
            format!("{}{}", name.to_case(Case::Snake), kind.json_suffix())
        };

        Self {
            model: String::new(),
            name: name.to_string(),
            json,
            kind,
            required: false,
            unique: false,
            stored: false,
            compute: None,
            inverse: None,
            on_change: None,
            constraint: None,
            depends: Vec::new(),
            related_model: None,
            reverse_fk: None,
            link: None,
            related_path: None,
            group_operator: kind.default_group_operator().map(str::to_string),
            default: None,
        }
    }

    // ------------------------------------------------------------------
    // Scalar constructors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn binary(name: &str) -> Self {
        Self::new(name, FieldKind::Binary)
    }

    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    #[must_use]
    pub fn char(name: &str) -> Self {
        Self::new(name, FieldKind::Char)
    }

    #[must_use]
    pub fn date(name: &str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    #[must_use]
    pub fn datetime(name: &str) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    #[must_use]
    pub fn float(name: &str) -> Self {
        Self::new(name, FieldKind::Float)
    }

    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    #[must_use]
    pub fn selection(name: &str) -> Self {
        Self::new(name, FieldKind::Selection)
    }

    #[must_use]
    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    // ------------------------------------------------------------------
    // Relation constructors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn many2one(name: &str, target: &str) -> Self {
        Self::new(name, FieldKind::Many2One).related_to(target)
    }

    #[must_use]
    pub fn one2one(name: &str, target: &str) -> Self {
        Self::new(name, FieldKind::One2One).related_to(target)
    }

    /// One-to-many over `target`, whose `reverse_fk` field points back here.
    #[must_use]
    pub fn one2many(name: &str, target: &str, reverse_fk: &str) -> Self {
        let mut field = Self::new(name, FieldKind::One2Many).related_to(target);
        field.reverse_fk = Some(reverse_fk.to_string());
        field
    }

    /// Reverse side of a one-to-one declared on `target` as `reverse_fk`.
    #[must_use]
    pub fn rev2one(name: &str, target: &str, reverse_fk: &str) -> Self {
        let mut field = Self::new(name, FieldKind::Rev2One).related_to(target);
        field.reverse_fk = Some(reverse_fk.to_string());
        field
    }

    #[must_use]
    pub fn many2many(name: &str, target: &str) -> Self {
        Self::new(name, FieldKind::Many2Many).related_to(target)
    }

    fn related_to(mut self, target: &str) -> Self {
        self.related_model = Some(target.to_string());
        self
    }

    // ------------------------------------------------------------------
    // Declaration modifiers
    // ------------------------------------------------------------------

    /// Override the storage (json) name.
    #[must_use]
    pub fn json(mut self, json: &str) -> Self {
        self.json = json.to_string();
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Persist a computed field's value in its own column.
    #[must_use]
    pub const fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    #[must_use]
    pub fn compute(mut self, method: &str) -> Self {
        self.compute = Some(method.to_string());
        self
    }

    #[must_use]
    pub fn inverse(mut self, method: &str) -> Self {
        self.inverse = Some(method.to_string());
        self
    }

    #[must_use]
    pub fn on_change(mut self, method: &str) -> Self {
        self.on_change = Some(method.to_string());
        self
    }

    /// Check run on every record after this field is created or written.
    #[must_use]
    pub fn constraint(mut self, method: &str) -> Self {
        self.constraint = Some(method.to_string());
        self
    }

    #[must_use]
    pub fn depends<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Declare this field as a read-through of `path` (e.g. `Profile.Age`).
    #[must_use]
    pub fn related(mut self, path: &str) -> Self {
        self.related_path = Some(path.to_string());
        self
    }

    #[must_use]
    pub fn group_operator(mut self, op: &str) -> Self {
        self.group_operator = Some(op.to_string());
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = Some(Arc::new(move || value.clone()));
        self
    }

    #[must_use]
    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(f));
        self
    }

    /// Use an explicit link table for a many-to-many field.
    #[must_use]
    pub fn link_table(mut self, table: &str, our: &str, their: &str) -> Self {
        self.link = Some(LinkSpec {
            model: String::new(),
            table: table.to_string(),
            our: our.to_string(),
            their: their.to_string(),
        });
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn json_name(&self) -> &str {
        &self.json
    }

    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub const fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    /// Stored computed fields, and every non-computed field.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        !self.is_computed() || self.stored
    }

    /// Whether this field owns a column of its model's table.
    #[must_use]
    pub const fn has_column(&self) -> bool {
        self.kind.has_column() && self.is_stored()
    }

    #[must_use]
    pub fn compute_method(&self) -> Option<&str> {
        self.compute.as_deref()
    }

    #[must_use]
    pub fn inverse_method(&self) -> Option<&str> {
        self.inverse.as_deref()
    }

    #[must_use]
    pub fn on_change_method(&self) -> Option<&str> {
        self.on_change.as_deref()
    }

    #[must_use]
    pub fn constraint_method(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    #[must_use]
    pub fn depends_paths(&self) -> &[String] {
        &self.depends
    }

    #[must_use]
    pub fn related_model(&self) -> Option<&str> {
        self.related_model.as_deref()
    }

    #[must_use]
    pub fn reverse_fk(&self) -> Option<&str> {
        self.reverse_fk.as_deref()
    }

    #[must_use]
    pub const fn link(&self) -> Option<&LinkSpec> {
        self.link.as_ref()
    }

    #[must_use]
    pub fn related_path(&self) -> Option<&str> {
        self.related_path.as_deref()
    }

    #[must_use]
    pub fn group_operator_name(&self) -> Option<&str> {
        self.group_operator.as_deref()
    }

    /// Default value for create, if declared.
    #[must_use]
    pub fn default_for_create(&self) -> Option<Value> {
        self.default.as_ref().map(|f| f())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("model", &self.model)
            .field("name", &self.name)
            .field("json", &self.json)
            .field("kind", &self.kind)
            .field("stored", &self.is_stored())
            .field("compute", &self.compute)
            .field("related_model", &self.related_model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_names_follow_kind_suffix() {
        assert_eq!(Field::char("FirstName").json_name(), "first_name");
        assert_eq!(Field::many2one("Owner", "User").json_name(), "owner_id");
        assert_eq!(
            Field::one2many("Lines", "InvoiceLine", "Invoice").json_name(),
            "lines_ids"
        );
        assert_eq!(Field::many2many("Tags", "Tag").json_name(), "tags_ids");
        assert_eq!(Field::integer("ID").json_name(), "id");
        assert_eq!(Field::char("Code").json("ref").json_name(), "ref");
    }

    #[test]
    fn computed_non_stored_field_has_no_column() {
        let transient = Field::float("Total").compute("ComputeTotal");
        let stored = Field::float("Total").compute("ComputeTotal").stored();

        assert!(!transient.has_column());
        assert!(stored.has_column());
        assert!(Field::float("Amount").has_column());
    }

    #[test]
    fn link_slots_are_complementary() {
        let ours = LinkSpec {
            model: "PostTagRel".into(),
            table: "post_tag_rel".into(),
            our: "post_id".into(),
            their: "tag_id".into(),
        };
        let theirs = LinkSpec {
            our: "tag_id".into(),
            their: "post_id".into(),
            ..ours.clone()
        };

        assert_eq!(ours.our_index(), 0);
        assert_eq!(theirs.our_index(), 1);
        assert_eq!(ours.our_index(), theirs.their_index());
    }
}
