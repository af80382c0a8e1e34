use rusqlite::Row;
use serde::Serialize;

/// A stored planet row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Planet {
    pub id: i64,
    pub name: String,
    pub population: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Planet {
    pub(crate) const COLUMNS: &'static str = "id, name, population, created_at, updated_at";

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            population: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

/// A planet together with its related lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanetDetail {
    #[serde(flatten)]
    pub planet: Planet,
    pub climates: Vec<Climate>,
    pub terrains: Vec<Terrain>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Climate {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Terrain {
    pub id: i64,
    pub name: String,
}

/// Name-keyed lookup entity related many-to-many to planets
pub trait LookupEntity: Sized {
    /// Singular name used in logs and errors
    const ENTITY: &'static str;
    const TABLE: &'static str;
    /// Junction table linking planets to this entity
    const LINK_TABLE: &'static str;
    /// Foreign key column in the junction table
    const LINK_COLUMN: &'static str;

    fn from_parts(id: i64, name: String) -> Self;
    fn id(&self) -> i64;
    fn name(&self) -> &str;
}

impl LookupEntity for Climate {
    const ENTITY: &'static str = "climate";
    const TABLE: &'static str = "climates";
    const LINK_TABLE: &'static str = "planet_climates";
    const LINK_COLUMN: &'static str = "climate_id";

    fn from_parts(id: i64, name: String) -> Self {
        Self { id, name }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl LookupEntity for Terrain {
    const ENTITY: &'static str = "terrain";
    const TABLE: &'static str = "terrains";
    const LINK_TABLE: &'static str = "planet_terrains";
    const LINK_COLUMN: &'static str = "terrain_id";

    fn from_parts(id: i64, name: String) -> Self {
        Self { id, name }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A lookup name with the number of planets referencing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupUsage {
    pub name: String,
    pub planets: u64,
}

/// Row counts across the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub planets: u64,
    pub climates: u64,
    pub terrains: u64,
    pub planet_climates: u64,
    pub planet_terrains: u64,
}
