//! Table schema definitions for the planet store

use super::types::*;

// =============================================================================
// Entity Tables
// =============================================================================

pub static PLANETS: TableSchema = TableSchema {
    name: "planets",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text).nocase(),
        Column::natural_key("name_key"),
        // Free text upstream: "unknown", "1000000000", "7.8 billion"
        Column::new("population", ColumnType::Text),
        Column::required("created_at", ColumnType::Timestamp),
        Column::required("updated_at", ColumnType::Timestamp),
    ],
    foreign_keys: &[],
    primary_key: &[],
};

pub static CLIMATES: TableSchema = TableSchema {
    name: "climates",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text).nocase(),
        Column::natural_key("name_key"),
        Column::required("created_at", ColumnType::Timestamp),
        Column::required("updated_at", ColumnType::Timestamp),
    ],
    foreign_keys: &[],
    primary_key: &[],
};

pub static TERRAINS: TableSchema = TableSchema {
    name: "terrains",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text).nocase(),
        Column::natural_key("name_key"),
        Column::required("created_at", ColumnType::Timestamp),
        Column::required("updated_at", ColumnType::Timestamp),
    ],
    foreign_keys: &[],
    primary_key: &[],
};

// =============================================================================
// Junction Tables
// =============================================================================

pub static PLANET_CLIMATES: TableSchema = TableSchema {
    name: "planet_climates",
    columns: &[
        Column::required("planet_id", ColumnType::Integer),
        Column::required("climate_id", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("planet_id", "planets").cascade(),
        ForeignKey::new("climate_id", "climates").cascade(),
    ],
    primary_key: &["planet_id", "climate_id"],
};

pub static PLANET_TERRAINS: TableSchema = TableSchema {
    name: "planet_terrains",
    columns: &[
        Column::required("planet_id", ColumnType::Integer),
        Column::required("terrain_id", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("planet_id", "planets").cascade(),
        ForeignKey::new("terrain_id", "terrains").cascade(),
    ],
    primary_key: &["planet_id", "terrain_id"],
};

/// All tables, parents before children
pub static ALL_TABLES: &[&TableSchema] = &[
    &PLANETS,
    &CLIMATES,
    &TERRAINS,
    &PLANET_CLIMATES,
    &PLANET_TERRAINS,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_precede_children() {
        for (idx, table) in ALL_TABLES.iter().enumerate() {
            for fk in table.foreign_keys {
                let parent = ALL_TABLES
                    .iter()
                    .position(|t| t.name == fk.references_table)
                    .expect("referenced table exists");
                assert!(parent < idx, "{} must come after {}", table.name, fk.references_table);
            }
        }
    }

    #[test]
    fn test_entity_names_are_natural_keys() {
        for table in [&PLANETS, &CLIMATES, &TERRAINS] {
            let key = table.column("name_key").unwrap();
            assert!(key.unique && !key.nullable, "{}", table.name);

            let name = table.column("name").unwrap();
            assert!(!name.unique && name.nocase && !name.nullable, "{}", table.name);
        }
    }
}
