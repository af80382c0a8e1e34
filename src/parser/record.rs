use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{IngestError, Result};

/// Placeholder upstream uses for "no data"
pub const UNKNOWN: &str = "unknown";

/// A raw upstream record: field name to unnormalized JSON value
pub type RawRecord = Map<String, Value>;

/// A record ready for entity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanRecord {
    pub name: String,
    pub population: Option<String>,
    pub climates: Vec<String>,
    pub terrains: Vec<String>,
}

/// Normalize one raw record.
///
/// Only `name`, `population`, `climate` and `terrain` are read; the plural
/// `climates`/`terrains` keys are accepted when the singular one is absent.
pub fn clean_record(raw: &RawRecord) -> Result<CleanRecord> {
    let name = clean_name(raw.get("name"))?;
    let population = clean_population(raw.get("population"));
    let climates = clean_multi_value(field_or_alias(raw, "climate", "climates"));
    let terrains = clean_multi_value(field_or_alias(raw, "terrain", "terrains"));

    Ok(CleanRecord {
        name,
        population,
        climates,
        terrains,
    })
}

/// Field changes for an existing planet; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanetChanges {
    pub name: Option<String>,
    /// `Some(None)` clears the population
    pub population: Option<Option<String>>,
    pub climates: Option<Vec<String>>,
    pub terrains: Option<Vec<String>>,
}

impl PlanetChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.population.is_none()
            && self.climates.is_none()
            && self.terrains.is_none()
    }
}

/// Case-folded form of a name. Names with equal keys are the same entity.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Build a record from a direct create-request. Goes through the same
/// cleaning as upstream records; names must also be at least 2 characters.
pub fn planet_request(
    name: &str,
    population: Option<&str>,
    climates: &[String],
    terrains: &[String],
) -> Result<CleanRecord> {
    let mut raw = RawRecord::new();
    raw.insert("name".into(), Value::from(name));
    if let Some(population) = population {
        raw.insert("population".into(), Value::from(population));
    }
    raw.insert("climate".into(), Value::from(climates.to_vec()));
    raw.insert("terrain".into(), Value::from(terrains.to_vec()));

    let record = clean_record(&raw)?;
    check_request_name(&record.name)?;
    Ok(record)
}

/// Build the changes for an update-request. Values are cleaned like
/// upstream fields; a population of "unknown" clears it and an empty list
/// removes every relationship of that kind.
pub fn planet_changes(
    name: Option<&str>,
    population: Option<&str>,
    climates: Option<&[String]>,
    terrains: Option<&[String]>,
) -> Result<PlanetChanges> {
    let name = match name {
        Some(name) => {
            let name = clean_name(Some(&Value::from(name)))?;
            check_request_name(&name)?;
            Some(name)
        }
        None => None,
    };
    let list = |values: &[String]| clean_multi_value(Some(&Value::from(values.to_vec())));

    Ok(PlanetChanges {
        name,
        population: population.map(|p| clean_population(Some(&Value::from(p)))),
        climates: climates.map(list),
        terrains: terrains.map(list),
    })
}

/// Clean the name of a climate or terrain created on its own
pub fn lookup_request(name: &str) -> Result<String> {
    let name = clean_name(Some(&Value::from(name)))?;
    if name.eq_ignore_ascii_case(UNKNOWN) {
        return Err(IngestError::invalid("name", Some(name.as_str()), "is a placeholder"));
    }
    Ok(name)
}

fn check_request_name(name: &str) -> Result<()> {
    if name.chars().count() < 2 {
        return Err(IngestError::invalid(
            "name",
            Some(name),
            "must be at least 2 characters long",
        ));
    }
    Ok(())
}

fn field_or_alias<'a>(raw: &'a RawRecord, key: &str, alias: &str) -> Option<&'a Value> {
    match raw.get(key) {
        None | Some(Value::Null) => raw.get(alias),
        found => found,
    }
}

fn clean_name(value: Option<&Value>) -> Result<String> {
    match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(IngestError::invalid("name", Some(s.as_str()), "is empty"))
            } else {
                Ok(trimmed.to_string())
            }
        }
        None | Some(Value::Null) => Err(IngestError::invalid("name", None, "is missing")),
        Some(other) => Err(IngestError::invalid(
            "name",
            Some(other.to_string().as_str()),
            "is not a string",
        )),
    }
}

fn clean_population(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    if text.is_empty() || text.eq_ignore_ascii_case(UNKNOWN) {
        None
    } else {
        Some(text)
    }
}

/// Split a comma-separated string (or a sequence of them) into distinct
/// tokens, first-seen order, sentinels and blanks dropped.
pub fn clean_multi_value(value: Option<&Value>) -> Vec<String> {
    let mut pieces: Vec<&str> = Vec::new();
    match value {
        Some(Value::String(s)) => pieces.extend(s.split(',')),
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    pieces.extend(s.split(','));
                }
            }
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(UNKNOWN))
        .filter(|t| seen.insert(name_key(t)))
        .map(str::to_string)
        .collect()
}
