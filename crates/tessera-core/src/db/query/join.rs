use crate::{
    db::adapter::Dialect,
    error::InternalError,
    model::{Field, FieldKind, Model, Registry, RegistryError},
};
use std::collections::BTreeMap;

///
/// JoinKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum JoinKind {
    Inner,
    Left,
    Root,
}

///
/// TableJoin
///
/// One FROM / JOIN clause. `column` of this table equals `other_column` of
/// the join at index `other`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableJoin {
    pub table: String,
    pub alias: String,
    pub kind: JoinKind,
    pub column: String,
    pub other: usize,
    pub other_column: String,
}

///
/// ResolvedColumn
///

#[derive(Clone, Debug)]
pub struct ResolvedColumn<'a> {
    pub alias: String,
    pub column: String,
    pub field: &'a Field,
}

impl ResolvedColumn<'_> {
    /// `alias.column` expression.
    #[must_use]
    pub fn expr(&self) -> String {
        format!("{}.{}", self.alias, self.column)
    }
}

///
/// JoinResolver
///
/// Per-query join chain. Joins are keyed by the relation chain they follow
/// from the root, so every path crossing the same relations reuses the same
/// aliases (`T1`, `T2`, …); the root table is aliased by its own name.
///

pub struct JoinResolver<'a> {
    registry: &'a Registry,
    dialect: &'a dyn Dialect,
    root: &'a Model,
    joins: Vec<TableJoin>,
    by_chain: BTreeMap<String, usize>,
}

impl<'a> JoinResolver<'a> {
    #[must_use]
    pub fn new(registry: &'a Registry, dialect: &'a dyn Dialect, root: &'a Model) -> Self {
        let table = dialect.quote(root.table());
        let joins = vec![TableJoin {
            table: table.clone(),
            alias: table,
            kind: JoinKind::Root,
            column: String::new(),
            other: 0,
            other_column: String::new(),
        }];

        Self {
            registry,
            dialect,
            root,
            joins,
            by_chain: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn joins(&self) -> &[TableJoin] {
        &self.joins
    }

    #[must_use]
    pub fn root_alias(&self) -> &str {
        &self.joins[0].alias
    }

    /// Whether any path resolved so far needed a join.
    #[must_use]
    pub fn has_joins(&self) -> bool {
        self.joins.len() > 1
    }

    /// Resolve a dotted path of field names (or json names) to the column
    /// holding its value, adding the joins it needs.
    ///
    /// A trailing many-to-one / one-to-one resolves to the foreign key column
    /// itself; a trailing to-many relation resolves to the joined table's id.
    pub fn resolve(&mut self, path: &str) -> Result<ResolvedColumn<'a>, InternalError> {
        let root = self.root;
        let empty = || InternalError::query(format!("empty field path on model '{}'", root.name()));
        if path.is_empty() {
            return Err(empty());
        }

        let segments: Vec<&str> = path.split('.').collect();
        let mut model = root;
        let mut current = 0;
        let mut chain = String::new();

        for (i, segment) in segments.iter().enumerate() {
            let field = model.try_field(segment)?;
            let last = i + 1 == segments.len();

            if !field.kind().is_relation() || (last && field.kind().is_fk()) {
                if !last {
                    return Err(RegistryError::NotARelation {
                        model: model.name().to_string(),
                        field: field.name().to_string(),
                    }
                    .into());
                }
                if !field.has_column() {
                    return Err(InternalError::query(format!(
                        "field '{}.{}' has no column",
                        model.name(),
                        field.name()
                    )));
                }
                return Ok(self.column(current, field.json_name(), field));
            }

            chain.push('.');
            chain.push_str(field.name());
            let target = self.registry.related(field)?;
            current = self.join_relation(&chain, current, model, field, target)?;
            model = target;

            if last {
                let id = model.try_field("id")?;
                return Ok(self.column(current, id.json_name(), id));
            }
        }

        Err(empty())
    }

    fn column(&self, join: usize, json: &str, field: &'a Field) -> ResolvedColumn<'a> {
        ResolvedColumn {
            alias: self.joins[join].alias.clone(),
            column: self.dialect.quote(json),
            field,
        }
    }

    /// Join `target` through relation `field` of `model` (joined at
    /// `current`). Returns the index of the target's join.
    fn join_relation(
        &mut self,
        chain: &str,
        current: usize,
        model: &Model,
        field: &Field,
        target: &Model,
    ) -> Result<usize, InternalError> {
        if let Some(&idx) = self.by_chain.get(chain) {
            return Ok(idx);
        }

        let idx = match field.kind() {
            FieldKind::Many2One | FieldKind::One2One => {
                let kind = if field.is_required() {
                    JoinKind::Inner
                } else {
                    JoinKind::Left
                };
                self.push(target.table(), kind, "id", current, field.json_name())
            }
            FieldKind::One2Many | FieldKind::Rev2One => {
                let reverse = target.try_field(field.reverse_fk().unwrap_or_default())?;
                let kind = if reverse.is_required() {
                    JoinKind::Inner
                } else {
                    JoinKind::Left
                };
                self.push(target.table(), kind, reverse.json_name(), current, "id")
            }
            FieldKind::Many2Many => {
                let link = field.link().ok_or_else(|| {
                    InternalError::schema(format!(
                        "many-to-many field '{}.{}' has no link table",
                        model.name(),
                        field.name()
                    ))
                })?;
                let link_chain = format!("{chain}#link");
                let through = match self.by_chain.get(&link_chain) {
                    Some(&idx) => idx,
                    None => {
                        let idx = self.push(&link.table, JoinKind::Left, &link.our, current, "id");
                        self.by_chain.insert(link_chain, idx);
                        idx
                    }
                };
                self.push(target.table(), JoinKind::Left, "id", through, &link.their)
            }
            _ => {
                return Err(RegistryError::NotARelation {
                    model: model.name().to_string(),
                    field: field.name().to_string(),
                }
                .into());
            }
        };
        self.by_chain.insert(chain.to_string(), idx);

        Ok(idx)
    }

    fn push(
        &mut self,
        table: &str,
        kind: JoinKind,
        column: &str,
        other: usize,
        other_column: &str,
    ) -> usize {
        let idx = self.joins.len();
        self.joins.push(TableJoin {
            table: self.dialect.quote(table),
            alias: self.dialect.quote(&format!("T{idx}")),
            kind,
            column: self.dialect.quote(column),
            other,
            other_column: self.dialect.quote(other_column),
        });

        idx
    }

    /// FROM clause with every join in creation order.
    #[must_use]
    pub fn from_sql(&self) -> String {
        self.joins
            .iter()
            .map(|join| match join.kind {
                JoinKind::Root => join.table.clone(),
                JoinKind::Inner | JoinKind::Left => {
                    let keyword = if join.kind == JoinKind::Inner {
                        "INNER JOIN"
                    } else {
                        "LEFT JOIN"
                    };
                    format!(
                        "{keyword} {} {} ON {}.{} = {}.{}",
                        join.table,
                        join.alias,
                        self.joins[join.other].alias,
                        join.other_column,
                        join.alias,
                        join.column
                    )
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
