//! SQLite SQL dialect and schema inspection.

use ormsql_core::catalog::{FieldDescriptor, ScalarType};
use ormsql_core::dialect::{IsolationLevel, LiveColumn, Parameters, SchemaChecker};
use ormsql_core::{Connection, Dialect, Error, Value};

/// SQLite syntax: type affinities, `AUTOINCREMENT` keys and `LIMIT` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_type(&self, field: &FieldDescriptor) -> String {
        let affinity = match field.scalar {
            ScalarType::Bool | ScalarType::Int32 | ScalarType::Int64 => "INTEGER",
            ScalarType::Float64 => "REAL",
            ScalarType::String | ScalarType::DateTime => "TEXT",
            ScalarType::Bytes | ScalarType::Guid => "BLOB",
        };
        affinity.to_string()
    }

    fn identity_clause(&self) -> &'static str {
        "PRIMARY KEY AUTOINCREMENT"
    }

    fn inline_identity_primary_key(&self) -> bool {
        true
    }

    fn last_identity_sql(&self) -> &'static str {
        "SELECT last_insert_rowid();"
    }

    fn limit_suffix(&self, limit: usize) -> Option<String> {
        Some(format!("LIMIT {}", limit))
    }

    fn qualify_update_targets(&self) -> bool {
        false
    }

    fn add_column_keyword(&self) -> &'static str {
        "ADD COLUMN"
    }

    fn supports_alter_constraints(&self) -> bool {
        false
    }

    // SQLite transactions are always serializable; the level only decides
    // when the write lock is taken.
    fn begin_transaction_sql(&self, isolation: IsolationLevel) -> Vec<String> {
        let mode = match isolation {
            IsolationLevel::ReadUncommitted | IsolationLevel::ReadCommitted => "DEFERRED",
            IsolationLevel::RepeatableRead => "IMMEDIATE",
            IsolationLevel::Serializable => "EXCLUSIVE",
        };
        vec![format!("BEGIN {};", mode)]
    }

    fn schema_checker(&self) -> Box<dyn SchemaChecker> {
        Box::new(SqliteSchema)
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Value::Int32(i) => i.to_string(),
            Value::Int64(i) => i.to_string(),
            Value::Float64(f) => format!("{:?}", f),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Bytes(b) => format!("X'{}'", hex::encode_upper(b)),
            Value::DateTime(_) => format!("'{}'", value),
            Value::Guid(g) => format!("X'{}'", hex::encode_upper(g.as_bytes())),
        }
    }
}

/// Schema inspection through `sqlite_master` and the pragma table functions.
struct SqliteSchema;

impl SqliteSchema {
    fn table_param(table: &str) -> Parameters {
        let mut params = Parameters::new();
        SqliteDialect.add_param(Value::from(table), &mut params);
        params
    }

    fn names(conn: &mut dyn Connection, sql: &str, table: &str) -> Result<Vec<String>, Error> {
        let rows = conn.query(sql, &Self::table_param(table))?;
        Ok(rows
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect())
    }
}

impl SchemaChecker for SqliteSchema {
    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool, Error> {
        let count = conn.query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = @p0 COLLATE NOCASE;",
            &Self::table_param(table),
        )?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<LiveColumn>, Error> {
        let rows = conn.query(
            "SELECT name, type, \"notnull\" FROM pragma_table_info(@p0) ORDER BY cid;",
            &Self::table_param(table),
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get(0)?.as_str()?.to_string();
                let declared_type = row.get(1).and_then(Value::as_str).unwrap_or_default();
                let not_null = row.get(2).and_then(Value::as_i64).unwrap_or(0) != 0;
                Some(LiveColumn {
                    name,
                    declared_type: declared_type.to_string(),
                    nullable: !not_null,
                })
            })
            .collect())
    }

    fn primary_key(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error> {
        Self::names(
            conn,
            "SELECT name FROM pragma_table_info(@p0) WHERE pk > 0 ORDER BY pk;",
            table,
        )
    }

    fn foreign_keys(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error> {
        Self::names(
            conn,
            "SELECT \"from\" FROM pragma_foreign_key_list(@p0) ORDER BY id, seq;",
            table,
        )
    }

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error> {
        Self::names(
            conn,
            "SELECT name FROM pragma_index_list(@p0) WHERE name NOT LIKE 'sqlite_autoindex_%';",
            table,
        )
    }
}
