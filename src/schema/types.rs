/// Column data type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Integer,
    Text,
    /// ISO-8601 UTC text, defaulted to the insertion time
    Timestamp,
}

/// Column definition
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub col_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    /// Compare values case-insensitively (`COLLATE NOCASE`)
    pub nocase: bool,
}

impl Column {
    /// Create an optional (nullable) column
    pub const fn new(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: true,
            unique: false,
            nocase: false,
        }
    }

    /// Create a required (non-nullable) column
    pub const fn required(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: false,
            unique: false,
            nocase: false,
        }
    }

    /// Natural key: required, unique text. Holds the case-folded name, so
    /// uniqueness is case-insensitive beyond ASCII.
    pub const fn natural_key(name: &'static str) -> Self {
        Self {
            name,
            col_type: ColumnType::Text,
            nullable: false,
            unique: true,
            nocase: false,
        }
    }

    /// Sort and compare with `COLLATE NOCASE`
    pub const fn nocase(self) -> Self {
        Self {
            nocase: true,
            ..self
        }
    }
}

/// Foreign key reference
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
    pub cascade_delete: bool,
}

impl ForeignKey {
    pub const fn new(column: &'static str, references_table: &'static str) -> Self {
        Self {
            column,
            references_table,
            references_column: "id",
            cascade_delete: false,
        }
    }

    pub const fn cascade(self) -> Self {
        Self {
            cascade_delete: true,
            ..self
        }
    }
}

/// Table schema definition
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub foreign_keys: &'static [ForeignKey],
    /// Composite primary key; empty means the `id` column is the key
    pub primary_key: &'static [&'static str],
}

impl TableSchema {
    pub fn is_junction(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}
