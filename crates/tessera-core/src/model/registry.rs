use crate::{
    error::InternalError,
    model::{
        depends::{self, ComputeTrigger, TriggerMap},
        entity::{Model, ModelId},
        field::{Field, LinkSpec},
        kind::FieldKind,
        methods::Method,
    },
    value::FieldMap,
};
use convert_case::{Case, Casing};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum RegistryError {
    #[error("registry is already bootstrapped")]
    AlreadyBootstrapped,

    #[error("invalid dependency '{path}' on field '{model}.{field}'")]
    BadDependency {
        model: String,
        field: String,
        path: String,
    },

    #[error("invalid reverse key '{reverse}' on field '{model}.{field}'")]
    BadReverseKey {
        model: String,
        field: String,
        reverse: String,
    },

    #[error("duplicate field '{field}' on model '{model}'")]
    DuplicateField { model: String, field: String },

    #[error("model '{0}' already registered")]
    DuplicateModel(String),

    #[error(
        "link column '{table}.{column}' of field '{model}.{field}' is already used by '{owner}'; declare a distinct link table"
    )]
    LinkClaimed {
        model: String,
        field: String,
        table: String,
        column: String,
        owner: String,
    },

    #[error("method '{method}' of field '{model}.{field}' must be a {expected} method")]
    MethodKind {
        model: String,
        field: String,
        method: String,
        expected: &'static str,
    },

    #[error("field '{model}.{field}' is not a relation")]
    NotARelation { model: String, field: String },

    #[error("unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

impl From<RegistryError> for InternalError {
    fn from(err: RegistryError) -> Self {
        Self::schema(err.to_string())
    }
}

///
/// Registry
///
/// Process-wide schema registry with a two-phase lifecycle: declarations are
/// accepted until `bootstrap`, after which the registry is read-only and is
/// shared across environments as `Arc<Registry>`.
///

#[derive(Debug, Default)]
pub struct Registry {
    models: Vec<Model>,
    by_name: BTreeMap<String, ModelId>,
    triggers: TriggerMap,
    bootstrapped: bool,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    // ------------------------------------------------------------------
    // Declaration phase
    // ------------------------------------------------------------------

    /// Register a model; fails on duplicate model or field names.
    pub fn add_model(&mut self, mut model: Model) -> Result<ModelId, InternalError> {
        self.ensure_open()?;

        if self.by_name.contains_key(&model.name) {
            return Err(RegistryError::DuplicateModel(model.name).into());
        }
        if let Some(field) = model.duplicates.first() {
            return Err(RegistryError::DuplicateField {
                model: model.name.clone(),
                field: field.clone(),
            }
            .into());
        }

        let id = ModelId(u32::try_from(self.models.len()).map_err(|_| {
            InternalError::schema("model registry is full")
        })?);
        model.id = id;
        self.by_name.insert(model.name.clone(), id);
        self.models.push(model);

        Ok(id)
    }

    /// Add a field to an already registered model.
    pub fn add_field(&mut self, model: &str, field: Field) -> Result<(), InternalError> {
        self.ensure_open()?;

        let name = field.name.clone();
        let target = self.model_mut(model)?;
        target.push_field(field);
        if target.duplicates.pop().is_some() {
            return Err(RegistryError::DuplicateField {
                model: model.to_string(),
                field: name,
            }
            .into());
        }

        Ok(())
    }

    /// Register (or replace) a method on an already registered model.
    pub fn add_method(
        &mut self,
        model: &str,
        name: &str,
        method: Method,
    ) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.model_mut(model)?
            .methods
            .insert(name.to_string(), method);

        Ok(())
    }

    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.bootstrapped {
            Err(RegistryError::AlreadyBootstrapped)
        } else {
            Ok(())
        }
    }

    fn model_mut(&mut self, name: &str) -> Result<&mut Model, RegistryError> {
        let id = self
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))?;

        Ok(&mut self.models[id.index()])
    }

    // ------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------

    /// Freeze the schema.
    ///
    /// Validates relations and methods, synthesizes many-to-many link models,
    /// turns related fields into computed ones and inverts dependency paths
    /// into trigger edges.
    pub fn bootstrap(&mut self) -> Result<(), InternalError> {
        self.ensure_open()?;

        self.check_relations()?;
        self.build_links()?;
        self.setup_related_fields();
        self.check_methods()?;
        self.triggers = depends::build_triggers(self)?;
        self.bootstrapped = true;

        tracing::info!(
            models = self.models.len(),
            triggers = self.triggers.values().map(Vec::len).sum::<usize>(),
            "schema registry bootstrapped"
        );

        Ok(())
    }

    fn check_relations(&self) -> Result<(), RegistryError> {
        for model in &self.models {
            for field in model.fields().filter(|f| f.kind().is_relation()) {
                let target = self.try_related(field)?;

                if field.kind().is_reverse() {
                    let reverse = field.reverse_fk().unwrap_or_default();
                    let valid = target.get_field(reverse).is_some_and(|fk| {
                        fk.kind().is_fk() && fk.related_model() == Some(model.name())
                    });
                    if !valid {
                        return Err(RegistryError::BadReverseKey {
                            model: model.name.clone(),
                            field: field.name.clone(),
                            reverse: reverse.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Resolve every stored many-to-many field to a link model, shared by
    /// both sides of a relation through its table name.
    ///
    /// Each (table, our column) pair belongs to exactly one field; a second
    /// relation between the same models needs its own link table.
    fn build_links(&mut self) -> Result<(), InternalError> {
        let mut planned = Vec::new();
        let mut claimed: BTreeMap<(String, String), String> = BTreeMap::new();

        for model in &self.models {
            for field in model
                .fields()
                .filter(|f| f.kind() == FieldKind::Many2Many && f.is_stored())
            {
                let target = field.related_model().unwrap_or_default();
                let link = field
                    .link()
                    .cloned()
                    .unwrap_or_else(|| default_link(model.name(), target));

                let key = (link.table.clone(), link.our.clone());
                if let Some(owner) = claimed.get(&key) {
                    return Err(RegistryError::LinkClaimed {
                        model: model.name.clone(),
                        field: field.name.clone(),
                        table: link.table,
                        column: link.our,
                        owner: owner.clone(),
                    }
                    .into());
                }
                claimed.insert(key, format!("{}.{}", model.name, field.name));

                planned.push((model.id, field.name.clone(), target.to_string(), link));
            }
        }

        for (owner, field, target, mut link) in planned {
            let owner_name = self.models[owner.index()].name.clone();
            link.model = link.table.to_case(Case::Pascal);

            match self.by_name.get(&link.model).copied() {
                Some(existing) => {
                    let shared = &self.models[existing.index()];
                    if shared.get_field(&link.our).is_none()
                        || shared.get_field(&link.their).is_none()
                    {
                        return Err(InternalError::schema(format!(
                            "link table '{}' of field '{owner_name}.{field}' does not match its other side",
                            link.table
                        )));
                    }
                }
                None => {
                    let link_model = Model::link(
                        &link.model,
                        &link.table,
                        [(&link.our, &owner_name), (&link.their, &target)],
                    );
                    self.add_model(link_model)?;
                }
            }

            if let Some(f) = self.models[owner.index()].get_field_mut(&field) {
                f.link = Some(link);
            }
        }

        Ok(())
    }

    /// Related fields become non-stored computed fields reading their path.
    fn setup_related_fields(&mut self) {
        for model in &mut self.models {
            let related: Vec<(String, String)> = model
                .fields()
                .filter_map(|f| f.related_path().map(|p| (f.name.clone(), p.to_string())))
                .collect();

            for (name, path) in related {
                let method = format!("__related_{name}");
                let key = name.clone();
                let reader = path.clone();
                model.methods.insert(
                    method.clone(),
                    Method::compute(move |rs| {
                        let value = rs.get(&reader)?;
                        Ok(FieldMap::new().with(key.clone(), value))
                    }),
                );

                if let Some(field) = model.get_field_mut(&name) {
                    field.compute = Some(method);
                    field.depends = vec![path];
                }
            }
        }
    }

    fn check_methods(&self) -> Result<(), RegistryError> {
        for model in &self.models {
            for field in model.fields() {
                let expected = [
                    (field.compute_method(), "compute"),
                    (field.inverse_method(), "inverse"),
                    (field.on_change_method(), "on_change"),
                    (field.constraint_method(), "constraint"),
                ];

                for (method, kind) in expected {
                    let Some(method) = method else { continue };
                    let matches = model
                        .get_method(method)
                        .is_some_and(|m| m.kind_label() == kind);
                    if !matches {
                        return Err(RegistryError::MethodKind {
                            model: model.name.clone(),
                            field: field.name.clone(),
                            method: method.to_string(),
                            expected: kind,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    /// Model by name.
    pub fn model(&self, name: &str) -> Result<&Model, InternalError> {
        self.by_name
            .get(name)
            .map(|id| &self.models[id.index()])
            .ok_or_else(|| InternalError::unknown_model(name))
    }

    /// Model by id. Ids are only minted by this registry.
    #[must_use]
    pub fn model_by_id(&self, id: ModelId) -> &Model {
        &self.models[id.index()]
    }

    /// Model a relation field points at.
    pub(crate) fn try_related(&self, field: &Field) -> Result<&Model, RegistryError> {
        let name = field.related_model().ok_or_else(|| RegistryError::NotARelation {
            model: field.model.clone(),
            field: field.name.clone(),
        })?;

        self.by_name
            .get(name)
            .map(|id| &self.models[id.index()])
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))
    }

    /// Model a relation field points at, as a runtime error.
    pub fn related(&self, field: &Field) -> Result<&Model, InternalError> {
        Ok(self.try_related(field)?)
    }

    /// Walk a dotted path from `model`, returning the model owning the last
    /// segment and the last field. Every segment but the last must be a
    /// relation.
    pub fn resolve_path<'a>(
        &'a self,
        model: &'a Model,
        path: &str,
    ) -> Result<(&'a Model, &'a Field), InternalError> {
        let mut current = model;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let field = current.try_field(segment)?;
            if segments.peek().is_none() {
                return Ok((current, field));
            }
            if !field.kind().is_relation() {
                return Err(RegistryError::NotARelation {
                    model: current.name.clone(),
                    field: field.name.clone(),
                }
                .into());
            }
            current = self.related(field)?;
        }

        Err(InternalError::query(format!("empty field path on model '{}'", model.name)))
    }

    /// Trigger edges fired when `field` of `model` changes.
    #[must_use]
    pub fn triggers_for(&self, model: ModelId, field: &str) -> &[ComputeTrigger] {
        self.triggers
            .get(&(model, field.to_string()))
            .map_or(&[], Vec::as_slice)
    }
}

/// Default link table of a many-to-many relation between `ours` and `theirs`.
///
/// The table name orders both model names lexically so both declaring sides
/// agree on it; a self relation numbers its two columns.
fn default_link(ours: &str, theirs: &str) -> LinkSpec {
    let (a, b) = (ours.to_case(Case::Snake), theirs.to_case(Case::Snake));
    let (first, second) = if a <= b { (&a, &b) } else { (&b, &a) };
    let table = format!("{first}_{second}_rel");

    let (our, their) = if a == b {
        (format!("{a}1_id"), format!("{a}2_id"))
    } else {
        (format!("{a}_id"), format!("{b}_id"))
    };

    LinkSpec {
        model: String::new(),
        table,
        our,
        their,
    }
}
