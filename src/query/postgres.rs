//! Postgres backend. Every descriptor compiles to a single statement whose
//! rows come back as `jsonb`, so nested relations need no client-side joins.

use std::sync::LazyLock;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _, types::Json};

use crate::query::{
    adapter::{Backend, BackendError, Row, Rows},
    descriptor::{Link, QueryDescriptor, Relation, Window},
    filter::{Filter, FilterOp, FilterValue, Scalar},
};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*$").expect("identifier pattern is valid")
});

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                BackendError::UniqueViolation(db.message().to_string())
            }
            _ => BackendError::Other(err.into()),
        }
    }
}

#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Table and column names are spliced into SQL, so only plain identifiers pass.
fn ident(name: &str) -> Result<&str, BackendError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(anyhow!("invalid identifier `{}`", name).into())
    }
}

fn push_scalar(b: &mut QueryBuilder<'static, Postgres>, value: &Scalar) {
    match value {
        Scalar::Null => {
            b.push("NULL");
        }
        Scalar::Bool(v) => {
            b.push_bind(*v);
        }
        Scalar::Int(v) => {
            b.push_bind(*v);
        }
        Scalar::Float(v) => {
            b.push_bind(*v);
        }
        Scalar::Timestamp(v) => {
            b.push_bind::<DateTime<Utc>>(*v);
        }
        Scalar::Text(v) => {
            b.push_bind(v.clone());
        }
    }
}

fn push_filter(
    b: &mut QueryBuilder<'static, Postgres>,
    alias: &str,
    filter: &Filter,
) -> Result<(), BackendError> {
    let column = format!("{}.{}", alias, ident(&filter.column)?);
    match (&filter.op, &filter.value) {
        (FilterOp::In, FilterValue::Many(values)) if values.is_empty() => {
            b.push("FALSE");
        }
        (FilterOp::In, FilterValue::Many(values)) => {
            b.push(&column).push(" IN (");
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                push_scalar(b, v);
            }
            b.push(")");
        }
        (FilterOp::Is, FilterValue::One(Scalar::Null)) => {
            b.push(&column).push(" IS NULL");
        }
        (FilterOp::Is, FilterValue::One(Scalar::Bool(v))) => {
            b.push(&column).push(if *v { " IS TRUE" } else { " IS FALSE" });
        }
        (op, FilterValue::One(v)) => {
            let sql_op = match op {
                FilterOp::Eq => " = ",
                FilterOp::Neq => " <> ",
                FilterOp::Gt => " > ",
                FilterOp::Gte => " >= ",
                FilterOp::Lt => " < ",
                FilterOp::Lte => " <= ",
                FilterOp::Like => " LIKE ",
                FilterOp::Ilike => " ILIKE ",
                FilterOp::In | FilterOp::Is => {
                    return Err(anyhow!("malformed filter on `{}`", filter.column).into());
                }
            };
            b.push(&column).push(sql_op);
            push_scalar(b, v);
            if matches!(op, FilterOp::Like | FilterOp::Ilike) {
                b.push(r" ESCAPE '\'");
            }
        }
        (_, FilterValue::Many(_)) => {
            return Err(anyhow!("list value on non-`in` filter `{}`", filter.column).into());
        }
    }
    Ok(())
}

/// Folds a filter list into ` AND ...` clauses.
fn apply_filters(
    b: &mut QueryBuilder<'static, Postgres>,
    alias: &str,
    filters: &[Filter],
) -> Result<(), BackendError> {
    filters.iter().try_for_each(|f| {
        b.push(" AND ");
        push_filter(b, alias, f)
    })
}

fn push_link(
    b: &mut QueryBuilder<'static, Postgres>,
    relation: &Relation,
    parent: &str,
    alias: &str,
) -> Result<(), BackendError> {
    match &relation.link {
        Link::BelongsTo { local_key } => {
            b.push(format!("{}.id = {}.{}", alias, parent, ident(local_key)?));
        }
        Link::HasMany { foreign_key } => {
            b.push(format!("{}.{} = {}.id", alias, ident(foreign_key)?, parent));
        }
    }
    Ok(())
}

/// `<link> AND <filters> AND <nested inner relations>` for a relation row.
fn push_relation_conditions(
    b: &mut QueryBuilder<'static, Postgres>,
    relation: &Relation,
    parent: &str,
    depth: usize,
) -> Result<(), BackendError> {
    let alias = format!("t{}", depth);
    push_link(b, relation, parent, &alias)?;
    apply_filters(b, &alias, &relation.filters)?;
    push_inner_relations(b, &relation.relations, &alias, depth + 1)
}

fn push_inner_relations(
    b: &mut QueryBuilder<'static, Postgres>,
    relations: &[Relation],
    parent: &str,
    depth: usize,
) -> Result<(), BackendError> {
    for relation in relations.iter().filter(|r| r.inner) {
        b.push(format!(
            " AND EXISTS (SELECT 1 FROM {} t{} WHERE ",
            ident(&relation.table)?,
            depth
        ));
        push_relation_conditions(b, relation, parent, depth)?;
        b.push(")");
    }
    Ok(())
}

fn push_projection(
    b: &mut QueryBuilder<'static, Postgres>,
    alias: &str,
    columns: &[String],
    relations: &[Relation],
    depth: usize,
) -> Result<(), BackendError> {
    if columns.is_empty() {
        b.push(format!("to_jsonb({})", alias));
    } else {
        let pairs = columns
            .iter()
            .map(|c| ident(c).map(|c| format!("'{}', {}.{}", c, alias, c)))
            .collect::<Result<Vec<_>, _>>()?;
        b.push(format!("jsonb_build_object({})", pairs.join(", ")));
    }

    for relation in relations.iter().filter(|r| r.embed) {
        let child = format!("t{}", depth);
        b.push(format!(" || jsonb_build_object('{}', ", ident(&relation.alias)?));
        match relation.link {
            Link::BelongsTo { .. } => {
                b.push("(SELECT ");
                push_projection(b, &child, &relation.columns, &relation.relations, depth + 1)?;
                b.push(format!(" FROM {} {} WHERE ", ident(&relation.table)?, child));
                push_relation_conditions(b, relation, alias, depth)?;
                b.push(" LIMIT 1)");
            }
            Link::HasMany { .. } => {
                b.push("COALESCE((SELECT jsonb_agg(");
                push_projection(b, &child, &relation.columns, &relation.relations, depth + 1)?;
                b.push(format!(") FROM {} {} WHERE ", ident(&relation.table)?, child));
                push_relation_conditions(b, relation, alias, depth)?;
                b.push("), '[]'::jsonb)");
            }
        }
        b.push(")");
    }
    Ok(())
}

fn push_where(
    b: &mut QueryBuilder<'static, Postgres>,
    query: &QueryDescriptor,
) -> Result<(), BackendError> {
    b.push(" WHERE TRUE");
    apply_filters(b, "t0", &query.filters)?;
    // A NULL comparison is not a match, so the row stays.
    for f in &query.exclude_filters {
        b.push(" AND (");
        push_filter(b, "t0", f)?;
        b.push(") IS NOT TRUE");
    }
    if !query.or_filters.is_empty() {
        b.push(" AND (");
        for (i, f) in query.or_filters.iter().enumerate() {
            if i > 0 {
                b.push(" OR ");
            }
            push_filter(b, "t0", f)?;
        }
        b.push(")");
    }
    push_inner_relations(b, &query.relations, "t0", 1)
}

fn compile_count(query: &QueryDescriptor) -> Result<QueryBuilder<'static, Postgres>, BackendError> {
    let mut b = QueryBuilder::new(format!(
        "SELECT COUNT(*) AS total FROM {} t0",
        ident(&query.table)?
    ));
    push_where(&mut b, query)?;
    Ok(b)
}

fn compile_select(query: &QueryDescriptor) -> Result<QueryBuilder<'static, Postgres>, BackendError> {
    let mut b = QueryBuilder::new("SELECT ");
    push_projection(&mut b, "t0", &query.columns, &query.relations, 1)?;
    b.push(" AS row");
    if query.want_count {
        b.push(", COUNT(*) OVER () AS total");
    }
    b.push(format!(" FROM {} t0", ident(&query.table)?));
    push_where(&mut b, query)?;

    if !query.order_by.is_empty() {
        b.push(" ORDER BY ");
        for (i, o) in query.order_by.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push(format!(
                "t0.{}{}",
                ident(&o.column)?,
                if o.descending { " DESC" } else { " ASC" }
            ));
        }
    }

    match query.window {
        Window::All => {}
        Window::Limit(n) => {
            b.push(" LIMIT ").push_bind(n as i64);
        }
        Window::Range { .. } => {
            let size = query.window.size().unwrap_or(0);
            b.push(" LIMIT ").push_bind(size as i64);
            b.push(" OFFSET ").push_bind(query.window.offset() as i64);
        }
    }
    Ok(b)
}

fn column_list(row: &Row) -> Result<String, BackendError> {
    let columns = row
        .keys()
        .map(|k| ident(k))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns.join(", "))
}

fn decode_returning(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Row>, BackendError> {
    rows.into_iter()
        .map(|r| {
            r.try_get::<Json<Row>, _>("row")
                .map(|Json(row)| row)
                .map_err(BackendError::from)
        })
        .collect()
}

#[async_trait]
impl Backend for PgBackend {
    async fn select(&self, query: &QueryDescriptor) -> Result<Rows, BackendError> {
        if query.head_only {
            let total: i64 = compile_count(query)?
                .build()
                .fetch_one(&self.pool)
                .await?
                .try_get("total")?;
            return Ok(Rows {
                rows: Vec::new(),
                count: Some(total),
            });
        }

        let fetched = compile_select(query)?.build().fetch_all(&self.pool).await?;
        let mut count = None;
        let mut rows = Vec::with_capacity(fetched.len());
        for r in fetched {
            if query.want_count {
                count = Some(r.try_get::<i64, _>("total")?);
            }
            let Json(row) = r.try_get::<Json<Row>, _>("row")?;
            rows.push(row);
        }

        // The window swallowed every row, so the window function saw nothing.
        if query.want_count && count.is_none() {
            let total: i64 = compile_count(query)?
                .build()
                .fetch_one(&self.pool)
                .await?
                .try_get("total")?;
            count = Some(total);
        }

        Ok(Rows { rows, count })
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, BackendError> {
        let table = ident(table)?;
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let mut b: QueryBuilder<'static, Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ", table));
            if row.is_empty() {
                b.push("DEFAULT VALUES");
            } else {
                let columns = column_list(&row)?;
                b.push(format!(
                    "({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{table}, ",
                    cols = columns,
                    table = table
                ));
                b.push_bind(Json(Value::Object(row)));
                b.push(")");
            }
            b.push(format!(" RETURNING to_jsonb({}.*) AS row", table));
            let fetched = b.build().fetch_all(&mut *tx).await?;
            inserted.extend(decode_returning(fetched)?);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, BackendError> {
        let table = ident(table)?;
        if patch.is_empty() {
            return Err(anyhow!("empty update on {}", table).into());
        }
        let columns = column_list(&patch)?;
        let mut b: QueryBuilder<'static, Postgres> = QueryBuilder::new(format!(
            "UPDATE {table} t0 SET ({cols}) = (SELECT {cols} FROM jsonb_populate_record(NULL::{table}, ",
            table = table,
            cols = columns
        ));
        b.push_bind(Json(Value::Object(patch)));
        b.push(")) WHERE TRUE");
        apply_filters(&mut b, "t0", filters)?;
        b.push(" RETURNING to_jsonb(t0.*) AS row");
        let fetched = b.build().fetch_all(&self.pool).await?;
        decode_returning(fetched)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, BackendError> {
        let mut b: QueryBuilder<'static, Postgres> =
            QueryBuilder::new(format!("DELETE FROM {} t0 WHERE TRUE", ident(table)?));
        apply_filters(&mut b, "t0", filters)?;
        b.push(" RETURNING to_jsonb(t0.*) AS row");
        let fetched = b.build().fetch_all(&self.pool).await?;
        decode_returning(fetched)
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError> {
        let mut b: QueryBuilder<'static, Postgres> =
            QueryBuilder::new(format!("SELECT {}(", ident(function)?));
        b.push_bind(Json(args));
        b.push(") AS result");
        let Json(result) = b
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get::<Json<Value>, _>("result")?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::Filter;

    #[test]
    fn compiles_filters_relations_and_window() {
        let q = QueryDescriptor::live("posts")
            .with(Relation::belongs_to("author", "users", "author_id").columns(&["id", "username"]))
            .with(
                Relation::has_many("tagged", "post_tags", "post_id")
                    .with(Relation::belongs_to("tag", "tags", "tag_id").filter(Filter::eq("name", "rust")).inner())
                    .exists(),
            )
            .any_of(vec![Filter::ilike("content", "%x%"), Filter::ilike("code", "%x%")])
            .order_by("created_at", true)
            .order_by("id", true)
            .range(10, 20);
        let b = compile_select(&q).unwrap();
        let sql = b.sql();

        assert!(sql.starts_with(
            "SELECT to_jsonb(t0) || jsonb_build_object('author', (SELECT jsonb_build_object('id', t1.id, 'username', t1.username) FROM users t1 WHERE t1.id = t0.author_id LIMIT 1)) AS row"
        ));
        assert!(!sql.contains("'tagged'"));
        assert!(sql.contains("FROM posts t0 WHERE TRUE AND t0.deleted_at IS NULL"));
        assert!(sql.contains("AND (t0.content ILIKE $1 ESCAPE '\\' OR t0.code ILIKE $2 ESCAPE '\\')"));
        assert!(sql.contains(
            "AND EXISTS (SELECT 1 FROM post_tags t1 WHERE t1.post_id = t0.id AND EXISTS (SELECT 1 FROM tags t2 WHERE t2.id = t1.tag_id AND t2.name = $3))"
        ));
        assert!(sql.ends_with("ORDER BY t0.created_at DESC, t0.id DESC LIMIT $4 OFFSET $5"));
    }

    #[test]
    fn exclusions_keep_null_columns() {
        let q = QueryDescriptor::from("posts").exclude(Filter::eq("language", "rust"));
        let b = compile_select(&q).unwrap();
        assert!(b.sql().contains("WHERE TRUE AND (t0.language = $1) IS NOT TRUE"));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let q = QueryDescriptor::from("post_likes").filter(Filter::is_in("post_id", Vec::<i64>::new()));
        let b = compile_select(&q).unwrap();
        assert!(b.sql().contains("WHERE TRUE AND FALSE"));
    }

    #[test]
    fn rejects_non_identifiers() {
        let q = QueryDescriptor::from("posts; drop table users");
        assert!(compile_select(&q).is_err());
        let q = QueryDescriptor::from("posts").filter(Filter::eq("id = 1 OR 1", 1i64));
        assert!(compile_select(&q).is_err());
    }
}
