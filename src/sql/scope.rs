//! SQL rendering of a scope with SeaQuery.

use super::executor::Executor;
use super::value_conversion::to_sea_value;
use crate::condition::{Criterion, Direction, Join, JoinKind, OrderBy, Predicate};
use crate::error::{EngineError, ModelError};
use crate::record::{split_column, Record, Value};
use crate::scope::{Aggregate, Scope, TransactionOptions};
use sea_query::{
    Alias, Asterisk, Condition, DeleteStatement, Expr, ExprTrait, Func, InsertStatement, JoinType,
    Order, PostgresQueryBuilder, SelectStatement, UpdateStatement, Values,
};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Column expression for a possibly `table.`-qualified name
pub(crate) fn column(name: &str) -> Expr {
    match split_column(name) {
        (Some(table), column) => Expr::col((Alias::new(table), Alias::new(column))),
        (None, column) => Expr::col(Alias::new(column)),
    }
}

fn criterion_expr(name: &str, criterion: &Criterion) -> Expr {
    match criterion {
        Criterion::Eq(Value::Null) => column(name).is_null(),
        Criterion::Eq(value) => column(name).eq(to_sea_value(value)),
        Criterion::In(values) => column(name).is_in(values.iter().map(to_sea_value)),
        Criterion::Between(low, high) => column(name).between(to_sea_value(low), to_sea_value(high)),
    }
}

/// AND of every column test, or the expression as is
fn compile(predicate: Predicate<Expr>) -> Condition {
    match predicate {
        Predicate::Columns(filter) => filter
            .iter()
            .fold(Condition::all(), |condition, (name, criterion)| {
                condition.add(criterion_expr(name, criterion))
            }),
        Predicate::Expr(expr) => Condition::all().add(expr),
    }
}

#[derive(Debug, Clone)]
enum Projection {
    Columns(Vec<String>),
    BaseTable,
}

#[derive(Debug, Clone, Default)]
struct Plan {
    condition: Option<Condition>,
    projection: Option<Projection>,
    joins: Vec<Join>,
    ordering: Vec<OrderBy>,
    group: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

/// [`Scope`] that renders PostgreSQL through SeaQuery and runs it on an
/// [`Executor`].
///
/// Opaque predicates are SeaQuery expressions:
///
/// ```
/// use sea_query::{Expr, ExprTrait};
/// use tidepool::sql::SqlScope;
/// use tidepool::Scope;
/// # use std::sync::Arc;
/// # struct Nothing;
/// # impl tidepool::sql::Executor for Nothing {
/// #     fn execute(&self, _: &str, _: &sea_query::Values) -> Result<u64, tidepool::EngineError> { Ok(0) }
/// #     fn query_all(&self, _: &str, _: &sea_query::Values) -> Result<Vec<tidepool::Record>, tidepool::EngineError> { Ok(vec![]) }
/// # }
///
/// let scope = SqlScope::new(Arc::new(Nothing), "users")
///     .filter(tidepool::Predicate::Expr(Expr::col("age").gt(18)));
/// assert_eq!(scope.to_sql(), r#"SELECT * FROM "users" WHERE "age" > 18"#);
/// ```
#[derive(Clone)]
pub struct SqlScope {
    executor: Arc<dyn Executor>,
    table: String,
    plan: Plan,
}

impl fmt::Debug for SqlScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlScope")
            .field("table", &self.table)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl SqlScope {
    pub fn new(executor: Arc<dyn Executor>, table: impl Into<String>) -> Self {
        super::postgres::register_error_kinds();
        Self {
            executor,
            table: table.into(),
            plan: Plan::default(),
        }
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    fn combine(mut self, condition: Condition, or: bool) -> Self {
        self.plan.condition = Some(match self.plan.condition.take() {
            None => condition,
            Some(current) if or => Condition::any().add(current).add(condition),
            Some(current) => Condition::all().add(current).add(condition),
        });
        self
    }

    fn table(&self) -> Alias {
        Alias::new(self.table.as_str())
    }

    /// SELECT for this scope; `shaped` adds ORDER BY, LIMIT and OFFSET
    fn select_statement(&self, shaped: bool) -> SelectStatement {
        let mut stmt = SelectStatement::default();
        stmt.from(self.table());

        match &self.plan.projection {
            None => {
                stmt.column(Asterisk);
            }
            Some(Projection::BaseTable) => {
                stmt.column((self.table(), Asterisk));
            }
            Some(Projection::Columns(columns)) => {
                for name in columns {
                    stmt.expr_as(column(name), Alias::new(name.as_str()));
                }
            }
        }

        for join in &self.plan.joins {
            let kind = match join.kind {
                JoinKind::Inner => JoinType::InnerJoin,
                JoinKind::Left => JoinType::LeftJoin,
            };
            let key = if join.key.contains('.') {
                join.key.clone()
            } else {
                format!("{}.{}", join.table, join.key)
            };
            stmt.join(
                kind,
                Alias::new(join.table.as_str()),
                column(&key).eq(column(&join.foreign_key)),
            );
        }

        if let Some(condition) = &self.plan.condition {
            stmt.cond_where(condition.clone());
        }

        if !self.plan.group.is_empty() {
            stmt.add_group_by(self.plan.group.iter().map(|name| column(name)));
        }

        if shaped {
            for order in &self.plan.ordering {
                let direction = match order.direction {
                    Direction::Asc => Order::Asc,
                    Direction::Desc => Order::Desc,
                };
                stmt.order_by_expr(column(&order.column), direction);
            }
            if let Some(limit) = self.plan.limit {
                stmt.limit(limit);
            }
            if let Some(offset) = self.plan.offset {
                stmt.offset(offset);
            }
        }

        stmt
    }

    /// Rendered SELECT with values inlined, for logging and tests
    pub fn to_sql(&self) -> String {
        self.select_statement(true).to_string(PostgresQueryBuilder)
    }

    fn query_all(&self, sql: &str, values: &Values) -> Result<Vec<Record>, EngineError> {
        log::debug!("{sql}");
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();
        self.executor.query_all(sql, values)
    }

    fn execute(&self, sql: &str, values: &Values) -> Result<u64, EngineError> {
        log::debug!("{sql}");
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();
        self.executor.execute(sql, values)
    }

    fn configure_transaction(&self, options: &TransactionOptions, none: &Values) -> Result<(), EngineError> {
        if let Some(level) = options.isolation {
            self.execute(&format!("SET TRANSACTION ISOLATION LEVEL {}", level.to_sql()), none)?;
        }
        if options.read_only {
            self.execute("SET TRANSACTION READ ONLY", none)?;
        }
        Ok(())
    }

    fn scalar(&self, stmt: SelectStatement, alias: &str) -> Result<Option<Value>, EngineError> {
        let (sql, values) = stmt.build(PostgresQueryBuilder);
        let rows = self.query_all(&sql, &values)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(alias))
            .filter(|value| !value.is_null()))
    }
}

impl Scope for SqlScope {
    type Expr = Expr;

    fn table_name(&self) -> &str {
        &self.table
    }

    fn filter(self, predicate: Predicate<Expr>) -> Self {
        self.combine(compile(predicate), false)
    }

    fn exclude(self, predicate: Predicate<Expr>) -> Self {
        self.combine(compile(predicate).not(), false)
    }

    fn or(self, predicate: Predicate<Expr>) -> Self {
        self.combine(compile(predicate), true)
    }

    fn select(mut self, columns: &[String]) -> Self {
        self.plan.projection = Some(Projection::Columns(columns.to_vec()));
        self
    }

    fn select_all(mut self) -> Self {
        self.plan.projection = Some(Projection::BaseTable);
        self
    }

    fn limit(mut self, limit: u64) -> Self {
        self.plan.limit = Some(limit);
        self
    }

    fn offset(mut self, offset: u64) -> Self {
        self.plan.offset = Some(offset);
        self
    }

    fn order(mut self, ordering: &[OrderBy]) -> Self {
        self.plan.ordering = ordering.to_vec();
        self
    }

    fn order_more(mut self, ordering: &[OrderBy]) -> Self {
        self.plan.ordering.extend_from_slice(ordering);
        self
    }

    fn group(mut self, columns: &[String]) -> Self {
        self.plan.group = columns.to_vec();
        self
    }

    fn join_table(mut self, join: &Join) -> Self {
        self.plan.joins.push(join.clone());
        self
    }

    fn rows(&self) -> Result<Vec<Record>, EngineError> {
        let (sql, values) = self.select_statement(true).build(PostgresQueryBuilder);
        self.query_all(&sql, &values)
    }

    fn insert(&self, record: Record, identity: &str) -> Result<Value, EngineError> {
        let mut stmt = InsertStatement::default();
        stmt.into_table(self.table());

        if record.is_empty() {
            stmt.or_default_values();
        } else {
            stmt.columns(record.keys().map(|name| Alias::new(name.as_str())));
            stmt.values(record.values().map(|value| Expr::val(to_sea_value(value))))
                .map_err(|e| EngineError::other(format!("invalid insert for \"{}\": {e}", self.table)))?;
        }
        stmt.returning_col(Alias::new(identity));

        let (sql, values) = stmt.build(PostgresQueryBuilder);
        let mut rows = self.query_all(&sql, &values)?;
        rows.first_mut()
            .and_then(|row| row.remove(identity))
            .ok_or_else(|| {
                EngineError::other(format!("insert into \"{}\" returned no {identity}", self.table))
            })
    }

    fn update(&self, changes: Record) -> Result<u64, EngineError> {
        if changes.is_empty() {
            return Ok(0);
        }

        let mut stmt = UpdateStatement::default();
        stmt.table(self.table());
        for (name, value) in &changes {
            stmt.value(Alias::new(name.as_str()), Expr::val(to_sea_value(value)));
        }
        if let Some(condition) = &self.plan.condition {
            stmt.cond_where(condition.clone());
        }

        let (sql, values) = stmt.build(PostgresQueryBuilder);
        self.execute(&sql, &values)
    }

    fn delete(&self) -> Result<u64, EngineError> {
        let mut stmt = DeleteStatement::default();
        stmt.from_table(self.table());
        if let Some(condition) = &self.plan.condition {
            stmt.cond_where(condition.clone());
        }

        let (sql, values) = stmt.build(PostgresQueryBuilder);
        self.execute(&sql, &values)
    }

    fn aggregate(&self, aggregate: Aggregate, name: &str) -> Result<Option<Value>, EngineError> {
        let mut inner = self.select_statement(false);
        inner.clear_selects();
        inner.expr_as(column(name), Alias::new("value"));

        let value = || Expr::col(Alias::new("value"));
        let expr: Expr = match aggregate {
            Aggregate::Sum => Func::sum(value()).into(),
            Aggregate::Avg => Func::avg(value()).into(),
            Aggregate::Max => Func::max(value()).into(),
            Aggregate::Min => Func::min(value()).into(),
            Aggregate::Interval => Expr::from(Func::max(value())).sub(Func::min(value())),
        };

        let mut outer = SelectStatement::default();
        outer
            .expr_as(expr, Alias::new(aggregate.as_str()))
            .from_subquery(inner, Alias::new("aggregate_subquery"));

        self.scalar(outer, aggregate.as_str())
    }

    fn count(&self) -> Result<u64, EngineError> {
        let mut outer = SelectStatement::default();
        outer
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
            .from_subquery(self.select_statement(true), Alias::new("count_subquery"));

        let count = self.scalar(outer, "count")?;
        count
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::other(format!("unexpected count result: {count:?}")))
    }

    fn transaction<T, F>(&self, options: &TransactionOptions, f: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Result<T, ModelError>,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        let none = Values(Vec::new());
        self.execute("BEGIN", &none)?;

        // Once BEGIN succeeded every exit path ends with COMMIT or ROLLBACK
        let result = self
            .configure_transaction(options, &none)
            .map_err(ModelError::from)
            .and_then(|()| f());

        match result {
            Ok(value) => {
                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::commit_transaction_span().entered();
                self.execute("COMMIT", &none)?;
                Ok(value)
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::rollback_transaction_span().entered();
                if let Err(rollback) = self.execute("ROLLBACK", &none) {
                    log::warn!("rollback after '{err}' failed: {rollback}");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Filter;
    use crate::record::record;
    use crate::sql::executor::mock::MockExecutor;
    use crate::scope::IsolationLevel;
    use serde_json::json;

    fn scope() -> (Arc<MockExecutor>, SqlScope) {
        let executor = Arc::new(MockExecutor::new());
        let scope = SqlScope::new(executor.clone(), "posts");
        (executor, scope)
    }

    fn columns(filter: Filter) -> Predicate<Expr> {
        Predicate::Columns(filter)
    }

    #[test]
    fn test_select_all_rows() {
        let (_, scope) = scope();
        assert_eq!(scope.to_sql(), r#"SELECT * FROM "posts""#);
    }

    #[test]
    fn test_filter_renders_in_and_between() {
        let (_, scope) = scope();
        let scope = scope
            .filter(columns(Filter::new().eq("author", json!(["L", "MG"]))))
            .filter(columns(Filter::new().between("stars", 1, 5)));
        let sql = scope.to_sql();
        assert!(sql.contains(r#""author" IN ('L', 'MG')"#), "{sql}");
        assert!(sql.contains(r#""stars" BETWEEN 1 AND 5"#), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let (_, scope) = scope();
        let sql = scope.filter(columns(Filter::new().eq("deleted_at", Value::Null))).to_sql();
        assert!(sql.contains(r#""deleted_at" IS NULL"#), "{sql}");
    }

    #[test]
    fn test_or_and_exclude() {
        let (_, scope) = scope();
        let sql = scope
            .filter(columns(Filter::new().eq("author", "L")))
            .or(columns(Filter::new().eq("author", "S")))
            .exclude(columns(Filter::new().eq("draft", true)))
            .to_sql();
        assert!(sql.contains(" OR "), "{sql}");
        assert!(sql.contains("NOT"), "{sql}");
    }

    #[test]
    fn test_order_replaces_and_order_more_appends() {
        let (_, scope) = scope();
        let sql = scope
            .clone()
            .order(&[OrderBy::asc("title")])
            .order(&[OrderBy::desc("id")])
            .to_sql();
        assert!(sql.ends_with(r#"ORDER BY "id" DESC"#), "{sql}");

        let sql = scope
            .order(&[OrderBy::asc("title")])
            .order_more(&[OrderBy::desc("id")])
            .to_sql();
        assert!(sql.ends_with(r#"ORDER BY "title" ASC, "id" DESC"#), "{sql}");
    }

    #[test]
    fn test_limit_offset_and_select() {
        let (_, scope) = scope();
        let sql = scope
            .select(&["title".to_string()])
            .limit(10)
            .offset(20)
            .to_sql();
        assert!(sql.starts_with(r#"SELECT "title" AS "title" FROM "posts""#), "{sql}");
        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(sql.contains("OFFSET 20"), "{sql}");
    }

    #[test]
    fn test_join_projects_base_table() {
        let (_, scope) = scope();
        let join = Join {
            kind: JoinKind::Left,
            table: "comments".into(),
            key: "id".into(),
            foreign_key: "posts.comment_id".into(),
        };
        let sql = scope.select_all().join_table(&join).to_sql();
        assert!(sql.starts_with(r#"SELECT "posts".* FROM "posts""#), "{sql}");
        assert!(
            sql.contains(r#"LEFT JOIN "comments" ON "comments"."id" = "posts"."comment_id""#),
            "{sql}"
        );
    }

    #[test]
    fn test_rows_are_fetched_through_executor() {
        let (executor, scope) = scope();
        executor.respond(vec![record([("id", json!(1)), ("title", json!("hello"))])]);

        let rows = scope.filter(columns(Filter::new().eq("id", 1))).rows().unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(executor.last_sql(), r#"SELECT * FROM "posts" WHERE "id" = $1"#);
        assert_eq!(executor.captured_values()[0].0.len(), 1);
    }

    #[test]
    fn test_insert_returns_identity() {
        let (executor, scope) = scope();
        executor.respond(vec![record([("id", json!(42))])]);

        let id = scope
            .insert(record([("title", json!("hello"))]), "id")
            .unwrap();

        assert_eq!(id, json!(42));
        assert_eq!(
            executor.last_sql(),
            r#"INSERT INTO "posts" ("title") VALUES ($1) RETURNING "id""#
        );
    }

    #[test]
    fn test_update_and_delete_use_scope_filter() {
        let (executor, scope) = scope();
        executor.set_affected(1);
        let scoped = scope.filter(columns(Filter::new().eq("id", 7)));

        assert_eq!(scoped.update(record([("title", json!("new"))])).unwrap(), 1);
        assert_eq!(
            executor.last_sql(),
            r#"UPDATE "posts" SET "title" = $1 WHERE "id" = $2"#
        );

        assert_eq!(scoped.delete().unwrap(), 1);
        assert_eq!(executor.last_sql(), r#"DELETE FROM "posts" WHERE "id" = $1"#);
    }

    #[test]
    fn test_aggregate_wraps_unordered_subquery() {
        let (executor, scope) = scope();
        executor.respond(vec![record([("sum", json!(12))])]);

        let sum = scope
            .order(&[OrderBy::asc("id")])
            .limit(3)
            .aggregate(Aggregate::Sum, "stars")
            .unwrap();

        assert_eq!(sum, Some(json!(12)));
        let sql = executor.last_sql();
        assert!(sql.starts_with(r#"SELECT SUM("value") AS "sum" FROM (SELECT "stars" AS "value" FROM "posts")"#), "{sql}");
        assert!(!sql.contains("ORDER BY"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn test_aggregate_of_empty_collection_is_none() {
        let (executor, scope) = scope();
        executor.respond(vec![record([("max", Value::Null)])]);
        assert_eq!(scope.aggregate(Aggregate::Max, "stars").unwrap(), None);
    }

    #[test]
    fn test_count() {
        let (executor, scope) = scope();
        executor.respond(vec![record([("count", json!(3))])]);
        assert_eq!(scope.count().unwrap(), 3);
        assert!(executor.last_sql().starts_with(r#"SELECT COUNT(*) AS "count" FROM (SELECT * FROM "posts")"#));
    }

    #[test]
    fn test_transaction_commits_and_rolls_back() {
        let (executor, scope) = scope();
        let options = TransactionOptions::default().isolation(IsolationLevel::Serializable);

        let value = scope.transaction(&options, || Ok(5)).unwrap();
        assert_eq!(value, 5);

        let err = scope
            .transaction(&TransactionOptions::default(), || -> Result<(), ModelError> {
                Err(ModelError::Argument("stop".into()))
            })
            .unwrap_err();
        assert_eq!(err, ModelError::Argument("stop".into()));

        assert_eq!(
            executor.captured_sql(),
            vec![
                "BEGIN",
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
                "COMMIT",
                "BEGIN",
                "ROLLBACK"
            ]
        );
    }

    #[test]
    fn test_failed_transaction_setup_rolls_back() {
        let (executor, scope) = scope();
        executor.fail_on(
            "SET TRANSACTION",
            EngineError::new("25001", "SET TRANSACTION ISOLATION LEVEL must be called before any query"),
        );
        let options = TransactionOptions::default().isolation(IsolationLevel::Serializable);
        let mut ran = false;

        let err = scope
            .transaction(&options, || {
                ran = true;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, ModelError::Engine(ref e) if e.code == "25001"), "{err:?}");
        assert!(!ran);
        assert_eq!(
            executor.captured_sql(),
            vec!["BEGIN", "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE", "ROLLBACK"]
        );
    }
}
