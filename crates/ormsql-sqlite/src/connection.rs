//! A single SQLite connection and value conversion.

use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection as RawConnection, OpenFlags};
use tracing::debug;

use ormsql_core::dialect::Parameters;
use ormsql_core::value::DATETIME_FORMAT;
use ormsql_core::{Connection, Error, RowSet, Value};

use crate::config::SqliteConfig;
use crate::error::SqliteError;

/// One open SQLite connection.
pub struct SqliteConnection {
    conn: RawConnection,
}

impl SqliteConnection {
    /// Open a connection to an existing database, or create it when `create`
    /// is set.
    pub(crate) fn open(config: &SqliteConfig, create: bool) -> Result<Self, SqliteError> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = RawConnection::open_with_flags(&config.path, flags)?;
        apply_pragmas(&conn, config)?;
        debug!(path = %config.path.display(), "Opened SQLite connection");
        Ok(Self { conn })
    }

    /// Path of the main database, if it is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.conn.path().map(Path::new)
    }

    fn prepare<'c>(
        conn: &'c RawConnection,
        sql: &str,
        params: &Parameters,
    ) -> Result<rusqlite::CachedStatement<'c>, SqliteError> {
        let mut statement = conn.prepare_cached(sql)?;
        for param in params.iter() {
            let index = statement
                .parameter_index(&param.name)?
                .ok_or_else(|| SqliteError::UnboundParameter(param.name.clone()))?;
            statement.raw_bind_parameter(index, to_sql(&param.value))?;
        }
        Ok(statement)
    }

    fn run_query(&mut self, sql: &str, params: &Parameters) -> Result<RowSet, SqliteError> {
        let mut statement = Self::prepare(&self.conn, sql, params)?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = statement.raw_query();
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                record.push(from_sql(row.get_ref(index)?, index)?);
            }
            values.push(record);
        }
        Ok(RowSet::new(columns, values))
    }

    fn run_execute(&mut self, sql: &str, params: &Parameters) -> Result<u64, SqliteError> {
        let mut statement = Self::prepare(&self.conn, sql, params)?;
        let changed = statement.raw_execute()?;
        Ok(changed as u64)
    }
}

fn apply_pragmas(conn: &RawConnection, config: &SqliteConfig) -> Result<(), SqliteError> {
    conn.busy_timeout(config.busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
    conn.pragma_update_and_check(
        None,
        "journal_mode",
        config.journal_mode.pragma_value(),
        |row| row.get::<_, String>(0),
    )?;
    Ok(())
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &Parameters) -> Result<u64, Error> {
        Ok(self.run_execute(sql, params)?)
    }

    fn query(&mut self, sql: &str, params: &Parameters) -> Result<RowSet, Error> {
        Ok(self.run_query(sql, params)?)
    }

    fn is_valid(&mut self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

/// Storage form of a value. Date-times are text, GUIDs 16-byte blobs and
/// booleans integers.
fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int32(i) => SqlValue::Integer(i64::from(*i)),
        Value::Int64(i) => SqlValue::Integer(*i),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::Guid(g) => SqlValue::Blob(g.as_bytes().to_vec()),
    }
}

/// Raw column value; typed coercion happens when fields are read.
fn from_sql(value: ValueRef<'_>, index: usize) -> Result<Value, SqliteError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(bytes) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|_| SqliteError::InvalidText(index))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn memory() -> SqliteConnection {
        let config = SqliteConfig::new("file:conversions?mode=memory")
            .with_journal_mode(crate::JournalMode::Delete);
        SqliteConnection::open(&config, true).unwrap()
    }

    #[test]
    fn test_storage_forms() {
        let at = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_milli_opt(13, 45, 10, 250)
            .unwrap();
        let id = Uuid::new_v4();

        assert_eq!(to_sql(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(
            to_sql(&Value::DateTime(at)),
            SqlValue::Text("2024-02-29 13:45:10.250".to_string())
        );
        assert_eq!(to_sql(&Value::Guid(id)), SqlValue::Blob(id.as_bytes().to_vec()));
    }

    #[test]
    fn test_named_parameters() {
        let mut conn = memory();
        conn.execute("CREATE TABLE [T] ([a] INTEGER, [b] TEXT);", &Parameters::new())
            .unwrap();

        let mut params = Parameters::new();
        params.push(ormsql_core::Parameter::new("@p0", Value::Int32(7)));
        params.push(ormsql_core::Parameter::new("@p1", Value::from("seven")));
        let changed = conn
            .execute("INSERT INTO [T] ([a], [b]) VALUES (@p0, @p1);", &params)
            .unwrap();
        assert_eq!(changed, 1);

        let rows = conn
            .query("SELECT [a], [b] FROM [T];", &Parameters::new())
            .unwrap();
        assert_eq!(rows.columns, vec!["a", "b"]);
        assert_eq!(rows.rows, vec![vec![Value::Int64(7), Value::from("seven")]]);
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let mut conn = memory();
        let mut params = Parameters::new();
        params.push(ormsql_core::Parameter::new("@p3", Value::Int64(1)));

        let err = conn.query("SELECT @p0;", &params).unwrap_err();
        assert!(err.to_string().contains("@p3"), "{}", err);
    }
}
