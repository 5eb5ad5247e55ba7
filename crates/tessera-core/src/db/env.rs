use crate::{
    config::EngineConfig,
    db::{
        adapter::{Dialect, dialect_for},
        cache::Cache,
        connection::{Connection, Database, Rows},
        query::{QueryBuilder, SqlStatement},
        record::RecordCollection,
        schema,
        security::{AccessOracle, AllowAll, Permission, SUPERUSER_ID},
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::{Model, Registry},
    obs::sink::{self, MetricsEvent, StatementKind},
};
use std::{
    cell::{Cell, Ref, RefCell, RefMut},
    sync::Arc,
};

///
/// Engine
///
/// Bootstrapped registry plus the database and access oracle every
/// environment is opened against. Cheap to clone and shareable across threads.
///

#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    database: Arc<dyn Database>,
    oracle: Arc<dyn AccessOracle>,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(
        registry: Arc<Registry>,
        database: Arc<dyn Database>,
        config: EngineConfig,
    ) -> Result<Self, InternalError> {
        if !registry.is_bootstrapped() {
            return Err(InternalError::schema(
                "registry must be bootstrapped before opening an engine",
            ));
        }
        config.validate()?;

        let expected = dialect_for(config.driver).driver_name();
        let actual = database.dialect().driver_name();
        if expected != actual {
            return Err(InternalError::new(
                ErrorClass::Config,
                ErrorOrigin::Config,
                format!("configured driver '{expected}' does not match database driver '{actual}'"),
            ));
        }

        Ok(Self {
            registry,
            database,
            oracle: Arc::new(AllowAll),
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn AccessOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open an environment for `uid` with its own transaction and cache.
    pub fn new_environment(&self, uid: i64) -> Result<Environment, InternalError> {
        let conn = self.database.connect()?;
        conn.begin()?;

        Ok(Environment {
            engine: self.clone(),
            cache: RefCell::new(Cache::new(Arc::clone(&self.registry))),
            conn,
            uid,
            finished: Cell::new(false),
        })
    }

    /// Run `f` in a fresh environment: commit when it succeeds, roll back
    /// when it fails.
    pub fn execute_in_new_environment<T>(
        &self,
        uid: i64,
        f: impl FnOnce(&Environment) -> Result<T, InternalError>,
    ) -> Result<T, InternalError> {
        let env = self.new_environment(uid)?;

        match f(&env) {
            Ok(value) => {
                env.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = env.rollback() {
                    tracing::warn!(error = %rollback, "rollback after failed environment");
                }
                Err(err)
            }
        }
    }

    /// Create every missing table. Existing tables are left untouched.
    pub fn sync_database(&self) -> Result<(), InternalError> {
        let statements = schema::create_table_statements(&self.registry, self.database.dialect());

        self.execute_in_new_environment(SUPERUSER_ID, |env| {
            for sql in &statements {
                env.log_sql("ddl", "", sql, &[]);
                env.conn.execute(sql, &[])?;
            }
            Ok(())
        })?;
        tracing::info!(tables = statements.len(), "database schema synchronized");

        Ok(())
    }
}

///
/// Environment
///
/// One transaction, one cache and one user. Not shareable between threads;
/// dropping an environment that was neither committed nor rolled back rolls
/// it back.
///

pub struct Environment {
    engine: Engine,
    conn: Box<dyn Connection>,
    cache: RefCell<Cache>,
    uid: i64,
    finished: Cell<bool>,
}

impl Environment {
    #[must_use]
    pub const fn uid(&self) -> i64 {
        self.uid
    }

    #[must_use]
    pub const fn is_superuser(&self) -> bool {
        self.uid == SUPERUSER_ID
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.engine.registry
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    #[must_use]
    pub fn dialect(&self) -> &'static dyn Dialect {
        self.conn.dialect()
    }

    /// Empty collection of `model`.
    pub fn pool(&self, model: &str) -> Result<RecordCollection<'_>, InternalError> {
        let model = self.registry().model(model)?;

        Ok(RecordCollection::new(self, model))
    }

    /// Commit the transaction. When the commit fails the environment still
    /// rolls back on drop.
    pub fn commit(self) -> Result<(), InternalError> {
        self.conn.commit()?;
        self.finished.set(true);

        Ok(())
    }

    pub fn rollback(self) -> Result<(), InternalError> {
        self.finished.set(true);
        self.conn.rollback()
    }

    /// Forget every cached value; later reads go back to storage.
    pub fn invalidate_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    pub(crate) fn cache(&self) -> Ref<'_, Cache> {
        self.cache.borrow()
    }

    pub(crate) fn cache_mut(&self) -> RefMut<'_, Cache> {
        self.cache.borrow_mut()
    }

    pub(crate) fn builder<'a>(&'a self, model: &'a Model) -> QueryBuilder<'a> {
        QueryBuilder::new(self.registry(), self.dialect(), model)
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    pub(crate) fn can_access_field(&self, model: &str, field: &str, permission: Permission) -> bool {
        self.is_superuser()
            || self
                .engine
                .oracle
                .check_field_permission(model, field, self.uid, permission)
    }

    pub(crate) fn can_access_model(&self, model: &str, permission: Permission) -> bool {
        self.is_superuser()
            || self
                .engine
                .oracle
                .check_model_permission(model, self.uid, permission)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Run a row-returning statement (select, count, insert … returning).
    pub(crate) fn fetch(
        &self,
        model: &str,
        kind: StatementKind,
        stmt: &SqlStatement,
    ) -> Result<Rows, InternalError> {
        self.log_sql(kind_label(kind), model, &stmt.sql, &stmt.params);
        let rows = self.conn.query(&stmt.sql, &stmt.params)?;

        sink::record(MetricsEvent::Statement {
            kind,
            model,
            rows: u64::try_from(rows.len()).unwrap_or(u64::MAX),
        });

        Ok(rows)
    }

    /// Run an update or delete, returning the number of affected rows.
    pub(crate) fn execute(
        &self,
        model: &str,
        kind: StatementKind,
        stmt: &SqlStatement,
    ) -> Result<u64, InternalError> {
        self.log_sql(kind_label(kind), model, &stmt.sql, &stmt.params);
        let rows = self.conn.execute(&stmt.sql, &stmt.params)?;

        sink::record(MetricsEvent::Statement { kind, model, rows });

        Ok(rows)
    }

    fn log_sql(&self, kind: &str, model: &str, sql: &str, params: &[crate::value::Value]) {
        if self.engine.config.log_sql {
            tracing::debug!(target: "tessera::sql", kind, model, sql, ?params, "statement");
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if !self.finished.get()
            && let Err(err) = self.conn.rollback()
        {
            tracing::warn!(error = %err, "rollback of dropped environment failed");
        }
    }
}

const fn kind_label(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Count => "count",
        StatementKind::Delete => "delete",
        StatementKind::Insert => "insert",
        StatementKind::Select => "select",
        StatementKind::Update => "update",
    }
}
