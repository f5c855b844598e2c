use chrono::{DateTime, Utc};
use config::shared::ChangeLogConfig;
use pg_escape::quote_identifier;
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::info;

/// A row of the change log table as written by the capture triggers.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ChangeLogRow {
    pub id: i64,
    pub change_table: String,
    pub change_key: String,
    pub change_new_key: Option<String>,
    /// One of `I`, `U` or `D`.
    pub change_type: String,
    pub change_time: DateTime<Utc>,
}

/// Quoted, schema qualified name of a change log table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogTable {
    table: String,
    qualified_name: String,
}

impl ChangeLogTable {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            table: table.to_owned(),
            qualified_name: format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Quoted name of the index backing ordered scans of this table.
    fn scan_index_name(&self) -> String {
        quote_identifier(&format!("{}_scan_idx", self.table)).into_owned()
    }
}

impl From<&ChangeLogConfig> for ChangeLogTable {
    fn from(config: &ChangeLogConfig) -> Self {
        Self::new(&config.schema, &config.table)
    }
}

/// Creates the change log table and its scan index if they do not exist yet.
pub async fn create_change_log_table(pool: &PgPool, table: &ChangeLogTable) -> sqlx::Result<()> {
    let name = table.qualified_name();
    let index_name = table.scan_index_name();
    // Multiple statements are only accepted through the simple query protocol, which is what
    // `raw_sql` uses.
    let statement = format!(
        r#"
        create table if not exists {name} (
            id bigserial primary key,
            change_table text not null,
            change_key text not null,
            change_new_key text,
            change_type varchar(1) not null check (change_type in ('I', 'U', 'D')),
            change_time timestamptz not null
        );
        create index if not exists {index_name}
            on {name} (change_table, change_key, change_time, id);
        "#
    );

    sqlx::raw_sql(&statement).execute(pool).await?;

    info!(table = name, "change log table is ready");

    Ok(())
}

/// Appends a raw change and returns its id.
pub async fn insert_change<'c, E>(
    executor: E,
    table: &ChangeLogTable,
    change_table: &str,
    change_key: &str,
    change_new_key: Option<&str>,
    change_type: &str,
    change_time: DateTime<Utc>,
) -> sqlx::Result<i64>
where
    E: PgExecutor<'c>,
{
    let statement = format!(
        r#"
        insert into {} (change_table, change_key, change_new_key, change_type, change_time)
        values ($1, $2, $3, $4, $5)
        returning id
        "#,
        table.qualified_name()
    );

    sqlx::query_scalar(&statement)
        .bind(change_table)
        .bind(change_key)
        .bind(change_new_key)
        .bind(change_type)
        .bind(change_time)
        .fetch_one(executor)
        .await
}

/// Returns the earliest change recorded for `change_key` of `change_table`, ignoring the ids in
/// `skip`.
pub async fn next_change<'c, E>(
    executor: E,
    table: &ChangeLogTable,
    change_table: &str,
    change_key: &str,
    skip: &[i64],
) -> sqlx::Result<Option<ChangeLogRow>>
where
    E: PgExecutor<'c>,
{
    let statement = format!(
        r#"
        select id, change_table, change_key, change_new_key, change_type, change_time
        from {}
        where change_table = $1 and change_key = $2 and id <> all($3)
        order by change_time, id
        limit 1
        "#,
        table.qualified_name()
    );

    sqlx::query_as::<_, ChangeLogRow>(&statement)
        .bind(change_table)
        .bind(change_key)
        .bind(skip)
        .fetch_optional(executor)
        .await
}

/// Returns the earliest change of any table whose `(change_table, change_key)` is not listed in
/// `excluding`.
pub async fn oldest_change<'c, E>(
    executor: E,
    table: &ChangeLogTable,
    excluding: &[(String, String)],
) -> sqlx::Result<Option<ChangeLogRow>>
where
    E: PgExecutor<'c>,
{
    let (excluded_tables, excluded_keys): (Vec<String>, Vec<String>) =
        excluding.iter().cloned().unzip();

    let statement = format!(
        r#"
        select id, change_table, change_key, change_new_key, change_type, change_time
        from {}
        where (change_table, change_key) not in (
            select * from unnest($1::text[], $2::text[])
        )
        order by change_time, id
        limit 1
        "#,
        table.qualified_name()
    );

    sqlx::query_as::<_, ChangeLogRow>(&statement)
        .bind(excluded_tables)
        .bind(excluded_keys)
        .fetch_optional(executor)
        .await
}

/// Returns the time of the earliest change in the log, if any.
pub async fn oldest_change_time<'c, E>(
    executor: E,
    table: &ChangeLogTable,
) -> sqlx::Result<Option<DateTime<Utc>>>
where
    E: PgExecutor<'c>,
{
    let statement = format!("select min(change_time) from {}", table.qualified_name());

    sqlx::query_scalar(&statement).fetch_one(executor).await
}

/// Deletes the changes with the given ids and returns how many rows were removed.
pub async fn delete_changes<'c, E>(
    executor: E,
    table: &ChangeLogTable,
    ids: &[i64],
) -> sqlx::Result<u64>
where
    E: PgExecutor<'c>,
{
    if ids.is_empty() {
        return Ok(0);
    }

    let statement = format!("delete from {} where id = any($1)", table.qualified_name());
    let result = sqlx::query(&statement).bind(ids).execute(executor).await?;

    Ok(result.rows_affected())
}

/// Counts the changes recorded for `change_table`.
pub async fn count_changes<'c, E>(
    executor: E,
    table: &ChangeLogTable,
    change_table: &str,
) -> sqlx::Result<i64>
where
    E: PgExecutor<'c>,
{
    let statement = format!(
        "select count(*) from {} where change_table = $1",
        table.qualified_name()
    );

    sqlx::query_scalar(&statement)
        .bind(change_table)
        .fetch_one(executor)
        .await
}
