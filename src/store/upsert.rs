use rusqlite::TransactionBehavior;
use tracing::debug;

use super::entity::{Climate, LookupEntity, Planet, Terrain};
use super::sqlite::{
    find_planet, insert_planet, link_all, linked, planet_by_id, rename_planet, resolve_all,
    resolve_counting, touch_planet, unlink_all, update_population, Store,
};
use crate::error::Result;
use crate::parser::{CleanRecord, PlanetChanges};

/// What to do with a planet that already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpsertMode {
    /// Replace population and relationship sets
    #[default]
    Update,
    /// Leave existing planets untouched
    SkipExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanetAction {
    Created,
    Updated,
    /// Existed with identical population and relationships
    Unchanged,
    SkippedExisting,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub planet: Planet,
    pub action: PlanetAction,
    pub climates_created: usize,
    pub terrains_created: usize,
}

impl Store {
    /// Ensure the planet, its climates and terrains exist and are related.
    ///
    /// Runs in one transaction: on error nothing from this record persists.
    /// Applying the same record twice creates nothing new the second time.
    pub fn upsert_planet(
        &mut self,
        record: &CleanRecord,
        mode: UpsertMode,
    ) -> Result<UpsertOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if mode == UpsertMode::SkipExisting {
            if let Some(planet) = find_planet(&tx, &record.name)? {
                return Ok(UpsertOutcome {
                    planet,
                    action: PlanetAction::SkippedExisting,
                    climates_created: 0,
                    terrains_created: 0,
                });
            }
        }

        let (climates, climates_created) = resolve_counting::<Climate>(&tx, &record.climates)?;
        let (terrains, terrains_created) = resolve_counting::<Terrain>(&tx, &record.terrains)?;

        let (planet, action) = match find_planet(&tx, &record.name)? {
            None => {
                let planet = insert_planet(&tx, &record.name, record.population.as_deref())?;
                link_all(&tx, planet.id, &climates)?;
                link_all(&tx, planet.id, &terrains)?;
                (planet, PlanetAction::Created)
            }
            Some(existing) => {
                let population_changed = existing.population != record.population;
                let climates_changed = replace_links(&tx, existing.id, &climates)?;
                let terrains_changed = replace_links(&tx, existing.id, &terrains)?;

                if population_changed {
                    update_population(&tx, existing.id, record.population.as_deref())?;
                } else if climates_changed || terrains_changed {
                    touch_planet(&tx, existing.id)?;
                }

                if population_changed || climates_changed || terrains_changed {
                    let planet = find_planet(&tx, &record.name)?.unwrap_or(existing);
                    (planet, PlanetAction::Updated)
                } else {
                    (existing, PlanetAction::Unchanged)
                }
            }
        };

        tx.commit()?;
        debug!(planet = %planet.name, action = ?action, "upserted planet");

        Ok(UpsertOutcome {
            planet,
            action,
            climates_created,
            terrains_created,
        })
    }
}

impl Store {
    /// Apply an update-request to the planet called `name`, or return `None`
    /// when there is no such planet.
    ///
    /// Only the fields present in `changes` are touched. Lookups are created
    /// as needed. Renaming onto another planet's name is a `StorageConflict`
    /// and nothing from the request persists.
    pub fn update_planet(
        &mut self,
        name: &str,
        changes: &PlanetChanges,
    ) -> Result<Option<Planet>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(existing) = find_planet(&tx, name)? else {
            return Ok(None);
        };

        if let Some(new_name) = &changes.name {
            if *new_name != existing.name {
                rename_planet(&tx, existing.id, new_name)?;
            }
        }
        if let Some(population) = &changes.population {
            update_population(&tx, existing.id, population.as_deref())?;
        }
        if let Some(names) = &changes.climates {
            let climates = resolve_all::<Climate>(&tx, names)?;
            replace_links(&tx, existing.id, &climates)?;
        }
        if let Some(names) = &changes.terrains {
            let terrains = resolve_all::<Terrain>(&tx, names)?;
            replace_links(&tx, existing.id, &terrains)?;
        }
        if !changes.is_empty() {
            touch_planet(&tx, existing.id)?;
        }

        let planet = planet_by_id(&tx, existing.id)?;
        tx.commit()?;
        debug!(planet = %planet.name, previous = %existing.name, "updated planet");
        Ok(Some(planet))
    }
}

/// Make the planet's links of kind `L` exactly `wanted`. Returns whether
/// anything changed.
fn replace_links<L: LookupEntity>(
    conn: &rusqlite::Connection,
    planet_id: i64,
    wanted: &[L],
) -> Result<bool> {
    let mut current: Vec<i64> = linked::<L>(conn, planet_id)?.iter().map(|l| l.id()).collect();
    let mut target: Vec<i64> = wanted.iter().map(|l| l.id()).collect();
    current.sort_unstable();
    target.sort_unstable();
    target.dedup();

    if current == target {
        return Ok(false);
    }

    unlink_all::<L>(conn, planet_id)?;
    link_all(conn, planet_id, wanted)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tatooine() -> CleanRecord {
        CleanRecord {
            name: "Tatooine".into(),
            population: Some("200000".into()),
            climates: vec!["arid".into()],
            terrains: vec!["desert".into()],
        }
    }

    #[test]
    fn test_upsert_twice_is_idempotent() {
        let mut store = Store::open_in_memory().unwrap();

        let first = store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();
        assert_eq!(first.action, PlanetAction::Created);
        assert_eq!(first.climates_created, 1);
        assert_eq!(first.terrains_created, 1);

        let second = store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();
        assert_eq!(second.action, PlanetAction::Unchanged);
        assert_eq!(second.planet.id, first.planet.id);
        assert_eq!(second.climates_created, 0);

        let counts = store.counts().unwrap();
        assert_eq!(counts.planets, 1);
        assert_eq!(counts.climates, 1);
        assert_eq!(counts.terrains, 1);
        assert_eq!(counts.planet_climates, 1);
        assert_eq!(counts.planet_terrains, 1);
    }

    #[test]
    fn test_update_replaces_relationships() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();

        let mut changed = tatooine();
        changed.terrains = vec!["dunes".into(), "canyons".into()];
        let outcome = store.upsert_planet(&changed, UpsertMode::Update).unwrap();
        assert_eq!(outcome.action, PlanetAction::Updated);
        assert_eq!(outcome.terrains_created, 2);

        let detail = store.planet_detail("Tatooine").unwrap().unwrap();
        let terrains: Vec<_> = detail.terrains.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(terrains, vec!["canyons", "dunes"]);
        // The old terrain is unlinked but never deleted
        assert_eq!(store.counts().unwrap().terrains, 3);
    }

    #[test]
    fn test_update_population_matches_case_insensitive_name() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();

        let mut renamed = tatooine();
        renamed.name = "TATOOINE".into();
        renamed.population = None;
        let outcome = store.upsert_planet(&renamed, UpsertMode::Update).unwrap();

        assert_eq!(outcome.action, PlanetAction::Updated);
        assert_eq!(outcome.planet.name, "Tatooine");
        assert_eq!(outcome.planet.population, None);
        assert_eq!(store.counts().unwrap().planets, 1);
    }

    #[test]
    fn test_non_ascii_case_variants_share_rows() {
        let mut store = Store::open_in_memory().unwrap();
        let record = |name: &str, climate: &str| CleanRecord {
            name: name.into(),
            population: None,
            climates: vec![climate.into()],
            terrains: vec![],
        };

        store.upsert_planet(&record("Éos", "Ärid"), UpsertMode::Update).unwrap();
        let outcome = store
            .upsert_planet(&record("éos", "ärid"), UpsertMode::Update)
            .unwrap();

        assert_eq!(outcome.action, PlanetAction::Unchanged);
        assert_eq!(outcome.planet.name, "Éos");
        let counts = store.counts().unwrap();
        assert_eq!(counts.planets, 1);
        assert_eq!(counts.climates, 1);
    }

    #[test]
    fn test_skip_existing_leaves_planet_untouched() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();

        let mut changed = tatooine();
        changed.population = Some("1".into());
        changed.climates = vec!["temperate".into()];
        let outcome = store.upsert_planet(&changed, UpsertMode::SkipExisting).unwrap();

        assert_eq!(outcome.action, PlanetAction::SkippedExisting);
        assert_eq!(outcome.planet.population.as_deref(), Some("200000"));
        assert_eq!(store.counts().unwrap().climates, 1);
    }

    #[test]
    fn test_update_planet_renames_and_keeps_unnamed_fields() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();

        let changes = PlanetChanges {
            name: Some("Tatooine II".into()),
            population: Some(None),
            ..Default::default()
        };
        let planet = store.update_planet("tatooine", &changes).unwrap().unwrap();
        assert_eq!(planet.name, "Tatooine II");
        assert_eq!(planet.population, None);

        assert!(store.find_planet("Tatooine").unwrap().is_none());
        let detail = store.planet_detail("tatooine ii").unwrap().unwrap();
        assert_eq!(detail.climates[0].name, "arid");
        assert_eq!(detail.terrains[0].name, "desert");
    }

    #[test]
    fn test_update_planet_replaces_given_sets() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();

        let changes = PlanetChanges {
            climates: Some(vec!["hot".into(), "Arid".into()]),
            terrains: Some(vec![]),
            ..Default::default()
        };
        store.update_planet("Tatooine", &changes).unwrap().unwrap();

        let detail = store.planet_detail("Tatooine").unwrap().unwrap();
        let climates: Vec<_> = detail.climates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(climates, vec!["arid", "hot"]);
        assert!(detail.terrains.is_empty());
        assert_eq!(detail.planet.population.as_deref(), Some("200000"));
    }

    #[test]
    fn test_update_planet_rename_collision_rolls_back() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();
        let mut hoth = tatooine();
        hoth.name = "Hoth".into();
        store.upsert_planet(&hoth, UpsertMode::Update).unwrap();

        let changes = PlanetChanges {
            name: Some("TATOOINE".into()),
            population: Some(Some("1".into())),
            climates: Some(vec!["frozen".into()]),
            ..Default::default()
        };
        let err = store.update_planet("Hoth", &changes).unwrap_err();
        assert_eq!(err.kind(), "StorageConflict");

        let hoth = store.find_planet("Hoth").unwrap().unwrap();
        assert_eq!(hoth.population.as_deref(), Some("200000"));
        assert_eq!(store.counts().unwrap().climates, 1);
    }

    #[test]
    fn test_update_planet_recase_and_missing() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();

        let recased = PlanetChanges {
            name: Some("TATOOINE".into()),
            ..Default::default()
        };
        let planet = store.update_planet("Tatooine", &recased).unwrap().unwrap();
        assert_eq!(planet.name, "TATOOINE");

        assert!(store
            .update_planet("Alderaan", &PlanetChanges::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_case_variants_share_one_lookup() {
        let mut store = Store::open_in_memory().unwrap();
        store.upsert_planet(&tatooine(), UpsertMode::Update).unwrap();

        let mut jakku = tatooine();
        jakku.name = "Jakku".into();
        jakku.climates = vec!["Arid".into()];
        let outcome = store.upsert_planet(&jakku, UpsertMode::Update).unwrap();

        assert_eq!(outcome.climates_created, 0);
        assert_eq!(store.counts().unwrap().climates, 1);
        assert_eq!(store.counts().unwrap().planet_climates, 2);
    }
}
