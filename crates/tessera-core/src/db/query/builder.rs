use crate::{
    db::{
        adapter::Dialect,
        query::{
            condition::{Condition, Operator, PredicateKind},
            join::JoinResolver,
        },
    },
    error::InternalError,
    model::{Model, Registry},
    value::{FieldMap, Value},
};

/// Column alias of the row count appended to grouped selects.
pub const COUNT_ALIAS: &str = "__count";

/// Separator replacing `.` in select aliases.
const SQL_SEP: &str = "__";

///
/// Query
///
/// Root condition plus side data. An empty query (no condition, no side
/// data) addresses every record of the model.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub cond: Condition,
    pub fetch_all: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub orders: Vec<String>,
    pub groups: Vec<String>,
    pub no_distinct: bool,
}

impl Query {
    #[must_use]
    pub fn new(cond: Condition) -> Self {
        Self {
            cond,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cond.is_empty() && self.side_data_is_empty()
    }

    /// Whether everything but the condition is unset.
    #[must_use]
    pub fn side_data_is_empty(&self) -> bool {
        !self.fetch_all
            && self.limit.is_none()
            && self.offset.is_none()
            && self.groups.is_empty()
            && self.orders.is_empty()
    }
}

///
/// SqlStatement
///
/// Driver-ready SQL with positional parameters. `columns` lists the
/// requested paths in select order.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub columns: Vec<String>,
}

///
/// QueryBuilder
///

pub struct QueryBuilder<'a> {
    registry: &'a Registry,
    dialect: &'a dyn Dialect,
    model: &'a Model,
}

impl<'a> QueryBuilder<'a> {
    #[must_use]
    pub fn new(registry: &'a Registry, dialect: &'a dyn Dialect, model: &'a Model) -> Self {
        Self {
            registry,
            dialect,
            model,
        }
    }

    fn resolver(&self) -> JoinResolver<'a> {
        JoinResolver::new(self.registry, self.dialect, self.model)
    }

    fn finish(&self, sql: String, params: Vec<Value>, columns: Vec<String>) -> SqlStatement {
        SqlStatement {
            sql: self.dialect.rebind(&sql),
            params,
            columns,
        }
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    /// Select `fields` (dotted paths) of the records matched by `query`.
    pub fn select(&self, query: &Query, fields: &[&str]) -> Result<SqlStatement, InternalError> {
        let (sql, params, columns) = self.select_sql(query, fields)?;

        Ok(self.finish(sql, params, columns))
    }

    /// `SELECT COUNT(*)` over the distinct ids matched by `query`.
    pub fn count(&self, query: &Query) -> Result<SqlStatement, InternalError> {
        let mut inner = query.clone();
        inner.orders.clear();
        let (sql, params, _) = self.select_sql(&inner, &["id"])?;

        Ok(self.finish(
            format!("SELECT COUNT(*) FROM ({sql}) foo"),
            params,
            vec!["count".to_string()],
        ))
    }

    fn select_sql(
        &self,
        query: &Query,
        fields: &[&str],
    ) -> Result<(String, Vec<Value>, Vec<String>), InternalError> {
        if !query.groups.is_empty() {
            return Err(InternalError::query("select called on a grouped query"));
        }

        let mut resolver = self.resolver();
        let mut columns: Vec<String> = fields.iter().map(|f| (*f).to_string()).collect();
        let orders = parse_orders(&query.orders)?;
        for (path, _) in &orders {
            if !columns.iter().any(|c| c == path) {
                columns.push(path.clone());
            }
        }

        let mut select = Vec::with_capacity(columns.len());
        for path in &columns {
            let col = resolver.resolve(path)?;
            select.push(format!("{} AS {}", col.expr(), self.alias(path)));
        }

        let mut params = Vec::new();
        let where_sql = self.where_clause(&mut resolver, &query.cond, &mut params)?;
        let order_sql = self.order_clause(&mut resolver, &orders)?;
        let distinct = if query.no_distinct { "" } else { "DISTINCT " };

        let sql = join_clauses(&[
            format!("SELECT {distinct}{}", select.join(", ")),
            format!("FROM {}", resolver.from_sql()),
            where_sql,
            order_sql,
            self.dialect.limit_clause(query.limit, query.offset),
        ]);

        Ok((sql, params, columns))
    }

    /// Grouped select. Each field is a path and an optional aggregate
    /// function; grouped paths are selected as-is, other paths need an
    /// aggregate (explicit, or the field's group operator). A `__count`
    /// column is always appended.
    pub fn select_group(
        &self,
        query: &Query,
        fields: &[(&str, Option<&str>)],
    ) -> Result<SqlStatement, InternalError> {
        if query.groups.is_empty() {
            return Err(InternalError::query("grouped select without group by"));
        }

        let mut resolver = self.resolver();
        let mut select = Vec::with_capacity(fields.len() + 1);
        let mut columns = Vec::with_capacity(fields.len() + 1);

        for (path, aggregate) in fields {
            let col = resolver.resolve(path)?;
            let grouped = query.groups.iter().any(|g| g == path);
            let expr = if grouped && aggregate.is_none() {
                col.expr()
            } else if let Some(agg) = aggregate.or_else(|| col.field.group_operator_name()) {
                format!("{agg}({})", col.expr())
            } else {
                return Err(InternalError::query(format!(
                    "field '{path}' is neither grouped nor aggregated"
                )));
            };
            select.push(format!("{expr} AS {}", self.alias(path)));
            columns.push((*path).to_string());
        }
        select.push(format!("count(1) AS {}", self.dialect.quote(COUNT_ALIAS)));
        columns.push(COUNT_ALIAS.to_string());

        let mut groups = Vec::with_capacity(query.groups.len());
        for path in &query.groups {
            groups.push(resolver.resolve(path)?.expr());
        }

        let mut params = Vec::new();
        let where_sql = self.where_clause(&mut resolver, &query.cond, &mut params)?;
        let order_sql = self.order_clause(&mut resolver, &parse_orders(&query.orders)?)?;

        let sql = join_clauses(&[
            format!("SELECT {}", select.join(", ")),
            format!("FROM {}", resolver.from_sql()),
            where_sql,
            format!("GROUP BY {}", groups.join(", ")),
            order_sql,
            self.dialect.limit_clause(query.limit, query.offset),
        ]);

        Ok(self.finish(sql, params, columns))
    }

    // ------------------------------------------------------------------
    // INSERT / UPDATE / DELETE
    // ------------------------------------------------------------------

    /// Insert one row, returning its id. A non-required foreign key holding
    /// the null sentinel is left out.
    pub fn insert(&self, values: &FieldMap) -> Result<SqlStatement, InternalError> {
        if values.is_empty() {
            return Err(InternalError::query(format!(
                "no data given for insert into '{}'",
                self.model.name()
            )));
        }

        let mut cols = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        for (name, value) in values {
            let field = self.model.try_field(name)?;
            if !field.has_column() {
                return Err(InternalError::query(format!(
                    "field '{}.{}' has no column",
                    self.model.name(),
                    field.name()
                )));
            }
            if field.kind().is_fk() && !field.is_required() && value.is_null_fk() {
                continue;
            }
            cols.push(self.dialect.quote(field.json_name()));
            params.push(field.kind().encode(value.clone()));
        }

        let table = self.dialect.quote(self.model.table());
        let id = self.dialect.quote("id");
        let sql = if cols.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING {id}")
        } else {
            let marks = vec!["?"; cols.len()].join(", ");
            format!(
                "INSERT INTO {table} ({}) VALUES ({marks}) RETURNING {id}",
                cols.join(", ")
            )
        };

        Ok(self.finish(sql, params, vec!["id".to_string()]))
    }

    /// Update the rows matched by `query`. The condition must not need joins.
    pub fn update(&self, query: &Query, values: &FieldMap) -> Result<SqlStatement, InternalError> {
        if values.is_empty() {
            return Err(InternalError::query(format!(
                "no data given for update of '{}'",
                self.model.name()
            )));
        }

        let mut sets = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        for (name, value) in values {
            let field = self.model.try_field(name)?;
            if !field.has_column() {
                return Err(InternalError::query(format!(
                    "field '{}.{}' has no column",
                    self.model.name(),
                    field.name()
                )));
            }
            sets.push(format!("{} = ?", self.dialect.quote(field.json_name())));
            params.push(field.kind().encode(value.clone()));
        }

        let where_sql = self.flat_where(query, &mut params)?;
        let sql = join_clauses(&[
            format!(
                "UPDATE {} SET {}",
                self.dialect.quote(self.model.table()),
                sets.join(", ")
            ),
            where_sql,
        ]);

        Ok(self.finish(sql, params, Vec::new()))
    }

    /// Delete the rows matched by `query`. The condition must not need joins.
    pub fn delete(&self, query: &Query) -> Result<SqlStatement, InternalError> {
        let mut params = Vec::new();
        let where_sql = self.flat_where(query, &mut params)?;
        let sql = join_clauses(&[
            format!("DELETE FROM {}", self.dialect.quote(self.model.table())),
            where_sql,
        ]);

        Ok(self.finish(sql, params, Vec::new()))
    }

    fn flat_where(&self, query: &Query, params: &mut Vec<Value>) -> Result<String, InternalError> {
        let mut resolver = self.resolver();
        let where_sql = self.where_clause(&mut resolver, &query.cond, params)?;
        if resolver.has_joins() {
            return Err(InternalError::query(format!(
                "update/delete condition on '{}' cannot cross relations",
                self.model.name()
            )));
        }

        Ok(where_sql)
    }

    // ------------------------------------------------------------------
    // Clauses
    // ------------------------------------------------------------------

    fn alias(&self, path: &str) -> String {
        self.dialect.quote(&path.replace('.', SQL_SEP))
    }

    fn where_clause(
        &self,
        resolver: &mut JoinResolver<'a>,
        cond: &Condition,
        params: &mut Vec<Value>,
    ) -> Result<String, InternalError> {
        if cond.is_empty() {
            return Ok(String::new());
        }

        Ok(format!("WHERE {}", self.condition_sql(resolver, cond, params)?))
    }

    /// Render a condition. Plain predicates follow SQL precedence; appending
    /// a nested condition wraps both the accumulated left side and the nested
    /// condition in parentheses.
    fn condition_sql(
        &self,
        resolver: &mut JoinResolver<'a>,
        cond: &Condition,
        params: &mut Vec<Value>,
    ) -> Result<String, InternalError> {
        let mut sql = String::new();

        for (i, predicate) in cond.predicates().iter().enumerate() {
            let term = match &predicate.kind {
                PredicateKind::Leaf { path, op, arg } => {
                    self.predicate_sql(resolver, path, *op, arg.clone(), params)?
                }
                PredicateKind::Nested(inner) => self.condition_sql(resolver, inner, params)?,
            };
            let term = match (&predicate.kind, predicate.is_not) {
                (_, true) => format!("NOT ({term})"),
                (PredicateKind::Nested(_), false) => format!("({term})"),
                (PredicateKind::Leaf { .. }, false) => term,
            };

            if i == 0 {
                sql = term;
                continue;
            }
            if matches!(predicate.kind, PredicateKind::Nested(_)) {
                sql = format!("({sql})");
            }
            let op = if predicate.is_or { "OR" } else { "AND" };
            sql = format!("{sql} {op} {term}");
        }

        Ok(sql)
    }

    fn predicate_sql(
        &self,
        resolver: &mut JoinResolver<'a>,
        path: &str,
        op: Operator,
        arg: Value,
        params: &mut Vec<Value>,
    ) -> Result<String, InternalError> {
        if op == Operator::ChildOf {
            return Err(InternalError::query(format!(
                "child-of predicate on '{path}' was not expanded"
            )));
        }

        let col = resolver.resolve(path)?;
        let expr = col.expr();

        if arg.is_null() || (col.field.kind().is_fk() && arg.is_null_fk()) {
            return match op {
                Operator::Equals => Ok(format!("{expr} IS NULL")),
                Operator::NotEquals => Ok(format!("{expr} IS NOT NULL")),
                other => Err(InternalError::query(format!(
                    "null argument on '{path}' only supports = and !=, got {other}"
                ))),
            };
        }

        if op.is_list() {
            let elements = arg.clone().into_elements();
            if elements.is_empty() {
                let always = if op == Operator::In { "1 = 0" } else { "1 = 1" };
                return Ok(always.to_string());
            }
        } else if matches!(arg, Value::Ids(_) | Value::List(_)) {
            return Err(InternalError::query(format!(
                "operator {op} on '{path}' does not take a list"
            )));
        }

        let (sql, args) = self.dialect.operator_sql(op, arg);
        params.extend(args);

        Ok(format!("{expr} {sql}"))
    }

    fn order_clause(
        &self,
        resolver: &mut JoinResolver<'a>,
        orders: &[(String, &'static str)],
    ) -> Result<String, InternalError> {
        if orders.is_empty() {
            return Ok(String::new());
        }

        let mut parts = Vec::with_capacity(orders.len());
        for (path, direction) in orders {
            parts.push(format!("{} {direction}", resolver.resolve(path)?.expr()));
        }

        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}

/// Split `"Path [ASC|DESC]"` order expressions.
fn parse_orders(orders: &[String]) -> Result<Vec<(String, &'static str)>, InternalError> {
    orders
        .iter()
        .map(|order| {
            let mut parts = order.split_whitespace();
            let path = parts
                .next()
                .ok_or_else(|| InternalError::query("empty order expression"))?;
            let direction = match parts.next().map(str::to_ascii_uppercase).as_deref() {
                None | Some("ASC") => "ASC",
                Some("DESC") => "DESC",
                Some(other) => {
                    return Err(InternalError::query(format!(
                        "invalid order direction '{other}' in '{order}'"
                    )));
                }
            };
            if parts.next().is_some() {
                return Err(InternalError::query(format!(
                    "invalid order expression '{order}'"
                )));
            }

            Ok((path.to_string(), direction))
        })
        .collect()
}

fn join_clauses(clauses: &[String]) -> String {
    clauses
        .iter()
        .filter(|c| !c.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
