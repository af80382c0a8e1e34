use crate::schema::{ColumnType, TableSchema};

/// UTC now with millisecond precision, e.g. `2024-05-01T12:00:00.123Z`
pub const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Generate CREATE TABLE SQL for a table schema
pub fn generate_create_table(schema: &TableSchema) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", schema.name);
    let mut columns = Vec::new();

    for col in schema.columns {
        let sql_type = match col.col_type {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text | ColumnType::Timestamp => "TEXT",
        };

        let pk = if col.name == "id" && !schema.is_junction() {
            " PRIMARY KEY"
        } else {
            ""
        };
        let null_constraint = if !col.nullable { " NOT NULL" } else { "" };
        let unique = if col.unique { " UNIQUE" } else { "" };
        let collate = if col.nocase { " COLLATE NOCASE" } else { "" };
        let default = match col.col_type {
            ColumnType::Timestamp => format!(" DEFAULT ({})", NOW_SQL),
            _ => String::new(),
        };

        columns.push(format!(
            "    {} {}{}{}{}{}{}",
            col.name, sql_type, pk, null_constraint, unique, collate, default
        ));
    }

    if schema.is_junction() {
        columns.push(format!("    PRIMARY KEY ({})", schema.primary_key.join(", ")));
    }

    for fk in schema.foreign_keys {
        let on_delete = if fk.cascade_delete { " ON DELETE CASCADE" } else { "" };
        columns.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {}({}){}",
            fk.column, fk.references_table, fk.references_column, on_delete
        ));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for foreign key columns.
///
/// The leading column of a composite primary key is already indexed.
pub fn generate_indexes(schema: &TableSchema) -> Vec<String> {
    schema
        .foreign_keys
        .iter()
        .filter(|fk| schema.primary_key.first() != Some(&fk.column))
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                schema.name, fk.column, schema.name, fk.column
            )
        })
        .collect()
}
