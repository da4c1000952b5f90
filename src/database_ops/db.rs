use anyhow::Result;
use serde_json::{Map, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::schema::{
    ColumnDefault, EntityType, FieldDef, FieldKind, OnDelete, RelationDef, SchemaRegistry,
    SqlValue,
};

/// Row keys for read output: physical columns (`name_id`) for listings,
/// attribute names (`name`) for detail views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKeys {
    Column,
    Field,
}

#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Private in-memory database on a single pinned connection (tests, dry runs).
    pub async fn connect_in_memory() -> Result<Self, sqlx::Error> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;
        Ok(Self { pool })
    }

    /// Create every entity table and plain join table that does not exist yet.
    ///
    /// Idempotent; existing tables are never altered.
    pub async fn ensure_schema(&self, registry: &SchemaRegistry) -> Result<(), sqlx::Error> {
        let mut statements: Vec<String> = registry.types().map(create_table_sql).collect();
        statements.extend(registry.join_relations().into_iter().map(create_join_table_sql));
        for stmt in &statements {
            debug!(sql = %stmt, "ensure_schema");
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        info!(tables = statements.len(), "schema ensured");
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// All rows of a type, ordered by id, keyed by column name.
    pub async fn list_all(&self, entity: &EntityType) -> Result<Vec<Map<String, Value>>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} ORDER BY id", entity.table);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row_to_map(row, entity, RowKeys::Column))
            .collect()
    }

    /// One row keyed by field name, plus the id list of every declared relation.
    pub async fn get_by_id(
        &self,
        entity: &EntityType,
        id: i64,
    ) -> Result<Option<Map<String, Value>>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", entity.table);
        let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        let mut out = row_to_map(&row, entity, RowKeys::Field)?;
        for relation in &entity.relations {
            let ids = self.association_ids(relation, id).await?;
            out.insert(
                relation.name.to_string(),
                Value::Array(ids.into_iter().map(Value::from).collect()),
            );
        }
        Ok(Some(out))
    }

    pub async fn association_ids(
        &self,
        relation: &RelationDef,
        owner_id: i64,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let sql = format!(
            "SELECT {target} FROM {table} WHERE {owner} = ? ORDER BY {target}",
            target = relation.target_column,
            table = relation.table,
            owner = relation.owner_column,
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
    }
}

/// Insert or update one row by id inside the caller's transaction.
///
/// Only the given fields are written; on insert the remaining columns take their
/// declared defaults. Returns `true` when the row was created.
///
/// Leads with the UPDATE so the transaction holds SQLite's write lock from its
/// first statement; no read-then-upgrade.
pub async fn upsert_row(
    conn: &mut SqliteConnection,
    entity: &EntityType,
    id: i64,
    fields: &[(&FieldDef, SqlValue)],
) -> Result<bool, sqlx::Error> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("UPDATE {} SET ", entity.table));
    if fields.is_empty() {
        qb.push("id = id");
    }
    for (i, (field, value)) in fields.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(field.column).push(" = ");
        push_value(&mut qb, value);
    }
    qb.push(" WHERE id = ").push_bind(id);
    let updated = qb.build().execute(&mut *conn).await?.rows_affected();
    if updated > 0 {
        return Ok(false);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("INSERT INTO {} (id", entity.table));
    for (field, _) in fields {
        qb.push(", ").push(field.column);
    }
    qb.push(") VALUES (").push_bind(id);
    for (_, value) in fields {
        qb.push(", ");
        push_value(&mut qb, value);
    }
    qb.push(")");
    qb.build().execute(&mut *conn).await?;
    Ok(true)
}

/// Replace the association set of `owner_id` with exactly `ids`.
pub async fn set_association(
    conn: &mut SqliteConnection,
    relation: &RelationDef,
    owner_id: i64,
    ids: &[i64],
) -> Result<(), sqlx::Error> {
    let delete = format!(
        "DELETE FROM {} WHERE {} = ?",
        relation.table, relation.owner_column
    );
    sqlx::query(&delete).bind(owner_id).execute(&mut *conn).await?;

    let mut unique: Vec<i64> = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    if unique.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}, {}) ",
        relation.table, relation.owner_column, relation.target_column
    ));
    qb.push_values(unique, |mut b, target_id| {
        b.push_bind(owner_id).push_bind(target_id);
    });
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &SqlValue) {
    match value {
        SqlValue::Null => qb.push_bind(None::<i64>),
        SqlValue::Integer(v) => qb.push_bind(*v),
        SqlValue::Text(v) => qb.push_bind(v.clone()),
    };
}

fn row_to_map(
    row: &SqliteRow,
    entity: &EntityType,
    keys: RowKeys,
) -> Result<Map<String, Value>, sqlx::Error> {
    let mut out = Map::with_capacity(entity.fields.len());
    for field in &entity.fields {
        let value = match field.kind {
            FieldKind::Id | FieldKind::ForeignKey { .. } => row
                .try_get::<Option<i64>, _>(field.column)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            FieldKind::Bool => row
                .try_get::<Option<i64>, _>(field.column)?
                .map(|v| Value::Bool(v != 0))
                .unwrap_or(Value::Null),
            _ => row
                .try_get::<Option<String>, _>(field.column)?
                .map(Value::String)
                .unwrap_or(Value::Null),
        };
        let key = match keys {
            RowKeys::Column => field.column,
            RowKeys::Field => field.name,
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

fn column_sql(field: &FieldDef) -> String {
    if field.kind == FieldKind::Id {
        return format!("{} INTEGER PRIMARY KEY", field.column);
    }
    // Decimals and timestamps stay TEXT so SQLite affinity never turns "9.90" into 9.9.
    let ty = match field.kind {
        FieldKind::ForeignKey { .. } | FieldKind::Bool => "INTEGER",
        _ => "TEXT",
    };
    let mut sql = format!("{} {}", field.column, ty);
    if !field.nullable {
        sql.push_str(" NOT NULL");
    }
    match field.default {
        ColumnDefault::None => {}
        ColumnDefault::EmptyString => sql.push_str(" DEFAULT ''"),
        ColumnDefault::Bool(b) => sql.push_str(&format!(" DEFAULT {}", i64::from(b))),
    }
    if let FieldKind::ForeignKey { table, on_delete } = field.kind {
        let action = match on_delete {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        };
        sql.push_str(&format!(" REFERENCES {table}(id) ON DELETE {action}"));
    }
    sql
}

pub fn create_table_sql(entity: &EntityType) -> String {
    let columns: Vec<String> = entity.fields.iter().map(column_sql).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        entity.table,
        columns.join(", ")
    )
}

pub fn create_join_table_sql(relation: &RelationDef) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         {owner} INTEGER NOT NULL REFERENCES {owner_table}(id) ON DELETE CASCADE, \
         {target} INTEGER NOT NULL REFERENCES {target_table}(id) ON DELETE CASCADE, \
         PRIMARY KEY ({owner}, {target}))",
        table = relation.table,
        owner = relation.owner_column,
        owner_table = relation.owner_table,
        target = relation.target_column,
        target_table = relation.target_table,
    )
}

/// Fresh in-memory store with the catalog schema applied.
#[cfg(test)]
pub(crate) async fn test_db() -> (Db, SchemaRegistry) {
    let registry = SchemaRegistry::catalog();
    let db = Db::connect_in_memory().await.expect("in-memory sqlite");
    db.ensure_schema(&registry).await.expect("schema");
    (db, registry)
}
