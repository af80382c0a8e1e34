use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::entity::{
    Climate, LookupEntity, LookupUsage, Planet, PlanetDetail, StoreCounts, Terrain,
};
use super::schema_gen::{generate_create_table, generate_indexes, NOW_SQL};
use crate::error::{IngestError, Result};
use crate::filter::PlanetFilter;
use crate::parser::{name_key, CleanRecord};
use crate::schema::ALL_TABLES;

/// Storage session. One per run; the connection closes on drop.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open (or create) the database at `db_path` and bring the schema up to date
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let store = Self { conn };
        store.migrate()?;
        debug!(path = %db_path.display(), "opened store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        for schema in ALL_TABLES {
            self.conn.execute(&generate_create_table(schema), [])?;
            for index_sql in generate_indexes(schema) {
                self.conn.execute(&index_sql, [])?;
            }
        }
        Ok(())
    }

    /// Create a planet the way a create-request does: lookups are resolved
    /// lazily, an existing planet with the same name is a conflict.
    pub fn create_planet(&mut self, record: &CleanRecord) -> Result<Planet> {
        let tx = self.conn.transaction()?;

        let climates = resolve_all::<Climate>(&tx, &record.climates)?;
        let terrains = resolve_all::<Terrain>(&tx, &record.terrains)?;
        let planet = insert_planet(&tx, &record.name, record.population.as_deref())?;
        link_all(&tx, planet.id, &climates)?;
        link_all(&tx, planet.id, &terrains)?;

        tx.commit()?;
        Ok(planet)
    }

    /// Create a climate or terrain on its own. An existing one with the same
    /// name is returned instead; the flag is true when a row was inserted.
    pub fn add_lookup<L: LookupEntity>(&self, name: &str) -> Result<(L, bool)> {
        find_or_create::<L>(&self.conn, name)
    }

    /// Remove a planet and its relationship rows. Lookups are kept.
    pub fn delete_planet(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM planets WHERE name_key = ?1", [name_key(name)])?;
        Ok(deleted > 0)
    }

    pub fn find_planet(&self, name: &str) -> Result<Option<Planet>> {
        find_planet(&self.conn, name)
    }

    pub fn planet_detail(&self, name: &str) -> Result<Option<PlanetDetail>> {
        let Some(planet) = find_planet(&self.conn, name)? else {
            return Ok(None);
        };
        let climates = linked::<Climate>(&self.conn, planet.id)?;
        let terrains = linked::<Terrain>(&self.conn, planet.id)?;
        Ok(Some(PlanetDetail {
            planet,
            climates,
            terrains,
        }))
    }

    /// Planets matching `filter`, ordered by name
    pub fn list_planets(&self, filter: &PlanetFilter) -> Result<Vec<Planet>> {
        let (where_sql, values) = filter.to_sql();
        let sql = format!(
            "SELECT {} FROM planets p {} ORDER BY p.name",
            prefixed_planet_columns(),
            where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(values.iter()),
            Planet::from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every lookup of kind `L` with the number of planets using it
    pub fn list_lookups<L: LookupEntity>(&self) -> Result<Vec<LookupUsage>> {
        let sql = format!(
            "SELECT l.name, COUNT(j.planet_id) FROM {table} l
             LEFT JOIN {link} j ON j.{col} = l.id
             GROUP BY l.id ORDER BY l.name",
            table = L::TABLE,
            link = L::LINK_TABLE,
            col = L::LINK_COLUMN,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(LookupUsage {
                name: row.get(0)?,
                planets: row.get::<_, i64>(1)? as u64,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(n as u64)
        };
        Ok(StoreCounts {
            planets: count("planets")?,
            climates: count("climates")?,
            terrains: count("terrains")?,
            planet_climates: count("planet_climates")?,
            planet_terrains: count("planet_terrains")?,
        })
    }
}

fn prefixed_planet_columns() -> String {
    Planet::COLUMNS
        .split(", ")
        .map(|c| format!("p.{}", c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Case-insensitive lookup by name, through the folded `name_key`
pub fn find_planet(conn: &Connection, name: &str) -> Result<Option<Planet>> {
    let sql = format!("SELECT {} FROM planets WHERE name_key = ?1", Planet::COLUMNS);
    Ok(conn.query_row(&sql, [name_key(name)], Planet::from_row).optional()?)
}

pub(crate) fn planet_by_id(conn: &Connection, planet_id: i64) -> Result<Planet> {
    let sql = format!("SELECT {} FROM planets WHERE id = ?1", Planet::COLUMNS);
    Ok(conn.query_row(&sql, [planet_id], Planet::from_row)?)
}

pub(crate) fn insert_planet(
    conn: &Connection,
    name: &str,
    population: Option<&str>,
) -> Result<Planet> {
    conn.execute(
        "INSERT INTO planets (name, name_key, population) VALUES (?1, ?2, ?3)",
        params![name, name_key(name), population],
    )
    .map_err(|e| IngestError::from_storage("planet", name, e))?;

    planet_by_id(conn, conn.last_insert_rowid())
}

/// Give a planet a new name. Taking another planet's name is a conflict.
pub(crate) fn rename_planet(conn: &Connection, planet_id: i64, name: &str) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE planets SET name = ?1, name_key = ?2, updated_at = {} WHERE id = ?3",
            NOW_SQL
        ),
        params![name, name_key(name), planet_id],
    )
    .map_err(|e| IngestError::from_storage("planet", name, e))?;
    Ok(())
}

pub(crate) fn update_population(
    conn: &Connection,
    planet_id: i64,
    population: Option<&str>,
) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE planets SET population = ?1, updated_at = {} WHERE id = ?2",
            NOW_SQL
        ),
        params![population, planet_id],
    )?;
    Ok(())
}

pub(crate) fn touch_planet(conn: &Connection, planet_id: i64) -> Result<()> {
    conn.execute(
        &format!("UPDATE planets SET updated_at = {} WHERE id = ?1", NOW_SQL),
        [planet_id],
    )?;
    Ok(())
}

pub fn find_lookup<L: LookupEntity>(conn: &Connection, name: &str) -> Result<Option<L>> {
    let sql = format!("SELECT id, name FROM {} WHERE name_key = ?1", L::TABLE);
    Ok(conn
        .query_row(&sql, [name_key(name)], |row| {
            Ok(L::from_parts(row.get(0)?, row.get(1)?))
        })
        .optional()?)
}

/// Find a lookup by name (case-insensitive) or create it. The flag is true
/// when a row was inserted.
pub fn find_or_create<L: LookupEntity>(conn: &Connection, name: &str) -> Result<(L, bool)> {
    if let Some(existing) = find_lookup::<L>(conn, name)? {
        return Ok((existing, false));
    }

    conn.execute(
        &format!("INSERT INTO {} (name, name_key) VALUES (?1, ?2)", L::TABLE),
        params![name, name_key(name)],
    )
    .map_err(|e| IngestError::from_storage(L::ENTITY, name, e))?;
    debug!(entity = L::ENTITY, name, "created lookup");
    Ok((L::from_parts(conn.last_insert_rowid(), name.to_string()), true))
}

pub(crate) fn resolve_all<L: LookupEntity>(
    conn: &Connection,
    names: &[String],
) -> Result<Vec<L>> {
    Ok(resolve_counting::<L>(conn, names)?.0)
}

/// Resolve every name, returning the entities and how many were created
pub(crate) fn resolve_counting<L: LookupEntity>(
    conn: &Connection,
    names: &[String],
) -> Result<(Vec<L>, usize)> {
    let mut entities = Vec::with_capacity(names.len());
    let mut created = 0;
    for name in names {
        let (entity, was_created) = find_or_create::<L>(conn, name)?;
        if was_created {
            created += 1;
        }
        entities.push(entity);
    }
    Ok((entities, created))
}

/// Lookups of kind `L` related to a planet, ordered by name
pub fn linked<L: LookupEntity>(conn: &Connection, planet_id: i64) -> Result<Vec<L>> {
    let sql = format!(
        "SELECT l.id, l.name FROM {table} l
         JOIN {link} j ON j.{col} = l.id
         WHERE j.planet_id = ?1 ORDER BY l.name",
        table = L::TABLE,
        link = L::LINK_TABLE,
        col = L::LINK_COLUMN,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([planet_id], |row| Ok(L::from_parts(row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn link_all<L: LookupEntity>(
    conn: &Connection,
    planet_id: i64,
    entities: &[L],
) -> Result<()> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} (planet_id, {}) VALUES (?1, ?2)",
        L::LINK_TABLE,
        L::LINK_COLUMN
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    for entity in entities {
        stmt.execute([planet_id, entity.id()])?;
    }
    Ok(())
}

pub(crate) fn unlink_all<L: LookupEntity>(conn: &Connection, planet_id: i64) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE planet_id = ?1", L::LINK_TABLE),
        [planet_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, climates: &[&str], terrains: &[&str]) -> CleanRecord {
        CleanRecord {
            name: name.into(),
            population: None,
            climates: climates.iter().map(|s| s.to_string()).collect(),
            terrains: terrains.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_find_or_create_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        let (arid, created) = find_or_create::<Climate>(&store.conn, "Arid").unwrap();
        assert!(created);

        let (again, created) = find_or_create::<Climate>(&store.conn, "arid").unwrap();
        assert!(!created);
        assert_eq!(again.id, arid.id);
        assert_eq!(again.name, "Arid");
        assert_eq!(store.counts().unwrap().climates, 1);
    }

    #[test]
    fn test_unique_constraint_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO terrains (name, name_key) VALUES ('Desert', 'desert')", [])
            .unwrap();
        let err = store
            .conn
            .execute("INSERT INTO terrains (name, name_key) VALUES ('DESERT', 'desert')", [])
            .unwrap_err();
        assert!(crate::error::is_constraint_violation(&err));
    }

    #[test]
    fn test_non_ascii_case_variants_are_one_entity() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_planet(&record("Éos", &["Ärid"], &[])).unwrap();

        let (arid, created) = find_or_create::<Climate>(&store.conn, "ärid").unwrap();
        assert!(!created);
        assert_eq!(arid.name, "Ärid");

        let err = store.create_planet(&record("éos", &[], &[])).unwrap_err();
        assert_eq!(err.kind(), "StorageConflict");
        assert_eq!(store.find_planet("ÉOS").unwrap().unwrap().name, "Éos");

        let counts = store.counts().unwrap();
        assert_eq!(counts.planets, 1);
        assert_eq!(counts.climates, 1);
    }

    #[test]
    fn test_create_planet_with_lazy_lookups() {
        let mut store = Store::open_in_memory().unwrap();
        let planet = store
            .create_planet(&record("Mars", &["arid"], &["desert", "mountains"]))
            .unwrap();
        assert_eq!(planet.name, "Mars");
        assert!(!planet.created_at.is_empty());

        let detail = store.planet_detail("mars").unwrap().unwrap();
        assert_eq!(detail.climates.len(), 1);
        let terrains: Vec<_> = detail.terrains.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(terrains, vec!["desert", "mountains"]);
    }

    #[test]
    fn test_create_duplicate_planet_is_conflict() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_planet(&record("Earth", &[], &[])).unwrap();

        let err = store
            .create_planet(&record("EARTH", &["temperate"], &[]))
            .unwrap_err();
        assert_eq!(err.kind(), "StorageConflict");
        // The lookup created inside the failed transaction is rolled back
        assert_eq!(store.counts().unwrap().climates, 0);
    }

    #[test]
    fn test_delete_planet_keeps_lookups() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_planet(&record("Hoth", &["frozen"], &["tundra"])).unwrap();

        assert!(store.delete_planet("hoth").unwrap());
        assert!(!store.delete_planet("hoth").unwrap());

        let counts = store.counts().unwrap();
        assert_eq!(counts.planets, 0);
        assert_eq!(counts.planet_climates, 0);
        assert_eq!(counts.planet_terrains, 0);
        assert_eq!(counts.climates, 1);
        assert_eq!(counts.terrains, 1);
    }

    #[test]
    fn test_add_lookup_reuses_existing() {
        let store = Store::open_in_memory().unwrap();
        let (swamp, created) = store.add_lookup::<Terrain>("Swamp").unwrap();
        assert!(created);

        let (again, created) = store.add_lookup::<Terrain>("SWAMP").unwrap();
        assert!(!created);
        assert_eq!(again, swamp);
        assert_eq!(store.list_lookups::<Terrain>().unwrap()[0].planets, 0);
    }

    #[test]
    fn test_list_lookups_counts_planets() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_planet(&record("Alderaan", &["temperate"], &[])).unwrap();
        store.create_planet(&record("Yavin IV", &["temperate", "tropical"], &[])).unwrap();

        let usage = store.list_lookups::<Climate>().unwrap();
        assert_eq!(
            usage,
            vec![
                LookupUsage { name: "temperate".into(), planets: 2 },
                LookupUsage { name: "tropical".into(), planets: 1 },
            ]
        );
    }
}
