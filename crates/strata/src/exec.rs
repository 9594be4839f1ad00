// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `strata exec` command implementation.

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use strata_config::model::DatabaseConfig;
use strata_core::StrataError;
use strata_storage::{map_sqlite_err, DatabaseBuilder, SqliteHandle};
use tracing::debug;

/// Rows returned by one statement, each value rendered as text.
pub type Rows = Vec<Vec<String>>;

/// Run each statement in order as a shared operation, printing result rows
/// tab-separated, then close the connection.
///
/// Stops at the first failing statement. The connection is closed either way.
pub async fn run_exec(config: &DatabaseConfig, statements: Vec<String>) -> Result<(), StrataError> {
    let db = DatabaseBuilder::from_config(config).connect().await?;

    let mut outcome = Ok(());
    for sql in statements {
        debug!(%sql, "executing statement");
        match db
            .call(move |handle: &SqliteHandle| query_rows(&handle.lock(), &sql))
            .await
        {
            Ok(rows) => {
                for row in rows {
                    println!("{}", row.join("\t"));
                }
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    let closed = db.close().await;
    outcome.and(closed)
}

/// Execute `sql` and collect every row.
///
/// Input holding several statements is run as a batch and yields no rows.
pub fn query_rows(conn: &Connection, sql: &str) -> Result<Rows, StrataError> {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(rusqlite::Error::MultipleStatement) => {
            conn.execute_batch(sql).map_err(map_sqlite_err)?;
            return Ok(Vec::new());
        }
        Err(e) => return Err(map_sqlite_err(e)),
    };

    let columns = stmt.column_count();
    let mut rows = stmt.query([]).map_err(map_sqlite_err)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_sqlite_err)? {
        let values = (0..columns)
            .map(|i| row.get_ref(i).map(render_value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        out.push(values);
    }
    Ok(out)
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
