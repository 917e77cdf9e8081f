//! SQL Server flavoured ANSI dialect.
//!
//! Used as the default rendering target of the core and by the recording
//! adapter in tests. Schema inspection goes through `INFORMATION_SCHEMA`.

use super::{Dialect, IsolationLevel, LiveColumn, Parameters, SchemaChecker};
use crate::catalog::{FieldDescriptor, ScalarType};
use crate::error::Error;
use crate::storage::Connection;
use crate::value::Value;

/// Bracket-quoted dialect with `@` parameters and `TOP n` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiDialect;

fn sized(base: &str, length: Option<u32>) -> String {
    match length {
        Some(n) => format!("{}({})", base, n),
        None => format!("{}(MAX)", base),
    }
}

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn column_type(&self, field: &FieldDescriptor) -> String {
        match field.scalar {
            ScalarType::Bool => "BIT".to_string(),
            ScalarType::Int32 => "INT".to_string(),
            ScalarType::Int64 => "BIGINT".to_string(),
            ScalarType::Float64 => "FLOAT".to_string(),
            ScalarType::String => sized("NVARCHAR", field.max_length),
            ScalarType::Bytes => sized("VARBINARY", field.max_length),
            ScalarType::DateTime => "DATETIME2".to_string(),
            ScalarType::Guid => "UNIQUEIDENTIFIER".to_string(),
        }
    }

    fn identity_clause(&self) -> &'static str {
        "IDENTITY(1,1)"
    }

    fn last_identity_sql(&self) -> &'static str {
        "SELECT @@IDENTITY;"
    }

    fn top_prefix(&self, limit: usize) -> Option<String> {
        Some(format!("TOP {}", limit))
    }

    fn begin_transaction_sql(&self, isolation: IsolationLevel) -> Vec<String> {
        vec![
            format!("SET TRANSACTION ISOLATION LEVEL {};", isolation.as_sql()),
            "BEGIN TRANSACTION;".to_string(),
        ]
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT TRANSACTION;"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK TRANSACTION;"
    }

    fn schema_checker(&self) -> Box<dyn SchemaChecker> {
        Box::new(InformationSchema)
    }
}

struct InformationSchema;

impl InformationSchema {
    fn table_param(table: &str) -> Parameters {
        let mut params = Parameters::new();
        AnsiDialect.add_param(Value::from(table), &mut params);
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

impl SchemaChecker for InformationSchema {
    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool, Error> {
        let count = conn.query_scalar(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @p0;",
            &Self::table_param(table),
        )?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<LiveColumn>, Error> {
        let rows = conn.query(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = @p0 ORDER BY ORDINAL_POSITION;",
            &Self::table_param(table),
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get(0)?.as_str()?.to_string();
                let declared_type = row.get(1).and_then(Value::as_str).unwrap_or_default();
                let nullable = row
                    .get(2)
                    .and_then(Value::as_str)
                    .map(|flag| flag.eq_ignore_ascii_case("YES"))
                    .unwrap_or(true);
                Some(LiveColumn {
                    name,
                    declared_type: declared_type.to_string(),
                    nullable,
                })
            })
            .collect())
    }

    fn primary_key(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error> {
        Self::names(
            conn,
            "SELECT k.COLUMN_NAME FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS c \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k ON c.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
             WHERE c.TABLE_NAME = @p0 AND c.CONSTRAINT_TYPE = 'PRIMARY KEY';",
            table,
        )
    }

    fn foreign_keys(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error> {
        Self::names(
            conn,
            "SELECT k.COLUMN_NAME FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS c \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k ON c.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
             WHERE c.TABLE_NAME = @p0 AND c.CONSTRAINT_TYPE = 'FOREIGN KEY';",
            table,
        )
    }

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error> {
        Self::names(
            conn,
            "SELECT i.name FROM sys.indexes i WHERE i.object_id = OBJECT_ID(@p0) \
             AND i.is_primary_key = 0 AND i.name IS NOT NULL;",
            table,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, FieldDescriptor};
    use crate::storage::RowSet;
    use crate::testing::MockAdapter;
    use crate::StorageAdapter;

    fn descriptor(def: FieldDef) -> FieldDescriptor {
        FieldDescriptor::compile("T", &def)
    }

    #[test]
    fn test_column_types() {
        let dialect = AnsiDialect;
        assert_eq!(dialect.column_type(&descriptor(FieldDef::new("a", ScalarType::Int64))), "BIGINT");
        assert_eq!(
            dialect.column_type(&descriptor(FieldDef::new("a", ScalarType::String))),
            "NVARCHAR(MAX)"
        );
        assert_eq!(
            dialect.column_type(&descriptor(FieldDef::new("a", ScalarType::String).max_length(40))),
            "NVARCHAR(40)"
        );
        assert_eq!(
            dialect.column_type(&descriptor(FieldDef::new("a", ScalarType::Guid))),
            "UNIQUEIDENTIFIER"
        );
    }

    #[test]
    fn test_transaction_sql() {
        let statements = AnsiDialect.begin_transaction_sql(IsolationLevel::Serializable);
        assert_eq!(
            statements,
            vec![
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE;".to_string(),
                "BEGIN TRANSACTION;".to_string()
            ]
        );
        assert_eq!(AnsiDialect.top_prefix(5).as_deref(), Some("TOP 5"));
        assert_eq!(AnsiDialect.limit_suffix(5), None);
    }

    #[test]
    fn test_schema_checker_queries() {
        let adapter = MockAdapter::new();
        adapter.push_rows(RowSet::new(vec![], vec![vec![Value::Int32(1)]]));
        adapter.push_rows(RowSet::new(
            vec![],
            vec![
                vec![Value::from("Id"), Value::from("bigint"), Value::from("NO")],
                vec![Value::from("Age"), Value::from("int"), Value::from("YES")],
            ],
        ));

        let checker = AnsiDialect.schema_checker();
        let mut conn = adapter.new_connection().unwrap();
        assert!(checker.table_exists(conn.as_mut(), "Author").unwrap());

        let columns = checker.columns(conn.as_mut(), "Author").unwrap();
        assert_eq!(columns.len(), 2);
        assert!(!columns[0].nullable);
        assert!(columns[1].nullable);

        let log = adapter.statements();
        assert_eq!(log[0].1.get("@p0"), Some(&Value::from("Author")));
    }
}
