//! Database operations for the todos table.

use crate::db::Pool;
use crate::TodoRepository;
use diffsync_engine::{Collection, Error, PersistenceCallback, Record, RecordId};
use serde_json::{Map, Value};
use sqlx::{PgConnection, Row};
use tokio::runtime::Handle;

/// A stored todo row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct TodoRow {
    pub id: i64,
    pub description: Option<String>,
    pub complete: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TodoRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(TodoRow {
            id: row.try_get("id")?,
            description: row.try_get("description")?,
            complete: row.try_get("complete")?,
        })
    }
}

impl TodoRow {
    /// Convert a database row to an engine record.
    pub fn into_record(self) -> Record {
        let mut values = Map::new();
        values.insert(
            "description".to_string(),
            self.description.map(Value::String).unwrap_or(Value::Null),
        );
        values.insert("complete".to_string(), Value::Bool(self.complete));
        Record::with_id(self.id, values)
    }
}

/// Column values for a record about to be written.
fn columns(record: &Record) -> (Option<String>, bool) {
    let description = record.get("description").as_str().map(str::to_string);
    let complete = record.get("complete").as_bool().unwrap_or(false);
    (description, complete)
}

/// Get all todos ordered by id.
pub async fn get_todos(pool: &Pool) -> Result<Vec<TodoRow>, sqlx::Error> {
    sqlx::query_as::<_, TodoRow>(
        r#"
        SELECT id, description, complete
        FROM todos
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Insert or update one todo. Assigns `record.id` on insert.
pub async fn save_todo(conn: &mut PgConnection, record: &mut Record) -> Result<(), sqlx::Error> {
    let (description, complete) = columns(record);

    match record.id {
        Some(id) => {
            let result = sqlx::query(
                r#"
                UPDATE todos SET description = $1, complete = $2
                WHERE id = $3
                "#,
            )
            .bind(description)
            .bind(complete)
            .bind(id)
            .execute(&mut *conn)
            .await?;

            expect_row(result.rows_affected())?;
        }
        None => {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO todos (description, complete)
                VALUES ($1, $2)
                RETURNING id
                "#,
            )
            .bind(description)
            .bind(complete)
            .fetch_one(&mut *conn)
            .await?;
            record.id = Some(id);
        }
    }

    Ok(())
}

/// Delete a todo by id. Fails if no such row exists.
pub async fn delete_todo(conn: &mut PgConnection, id: RecordId) -> Result<(), sqlx::Error> {
    let result = sqlx::query("DELETE FROM todos WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    expect_row(result.rows_affected())
}

/// Updates and deletes address exactly one existing row.
fn expect_row(rows_affected: u64) -> Result<(), sqlx::Error> {
    if rows_affected == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Todo storage in PostgreSQL.
///
/// The engine's persistence callback is synchronous, so every call blocks
/// on `runtime`. Call it from a blocking thread (`spawn_blocking`), never
/// from inside an async task.
#[derive(Clone)]
pub struct PgTodoRepository {
    pool: Pool,
    runtime: Handle,
}

impl PgTodoRepository {
    pub fn new(pool: Pool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    async fn commit(&self, to_save: &mut [Record], to_delete: &[Record]) -> Result<(), Error> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        for record in to_save.iter_mut() {
            save_todo(&mut tx, record).await.map_err(persistence)?;
        }
        for record in to_delete {
            let id = record
                .id
                .ok_or_else(|| Error::Persistence("cannot delete a todo without an id".into()))?;
            delete_todo(&mut tx, id).await.map_err(persistence)?;
        }

        tx.commit().await.map_err(persistence)?;
        tracing::debug!(
            saved = to_save.len(),
            deleted = to_delete.len(),
            "Committed todo changes"
        );
        Ok(())
    }
}

fn persistence(e: sqlx::Error) -> Error {
    tracing::error!("Database error: {:?}", e);
    Error::Persistence(e.to_string())
}

impl PersistenceCallback for PgTodoRepository {
    fn persist_change(&self, record: &mut Record) -> diffsync_engine::Result<()> {
        self.runtime
            .block_on(self.commit(std::slice::from_mut(record), &[]))
    }

    fn persist_changes(
        &self,
        to_save: &mut [Record],
        to_delete: &[Record],
    ) -> diffsync_engine::Result<()> {
        self.runtime.block_on(self.commit(to_save, to_delete))
    }
}

impl TodoRepository for PgTodoRepository {
    fn find_all(&self) -> diffsync_engine::Result<Collection> {
        let rows = self
            .runtime
            .block_on(get_todos(&self.pool))
            .map_err(persistence)?;
        Ok(rows.into_iter().map(TodoRow::into_record).collect())
    }
}
