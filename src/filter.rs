use crate::parser::name_key;

/// Narrows the planet listing. All criteria are case-insensitive and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanetFilter {
    /// Substring of the planet name or population
    pub search: Option<String>,
    /// Exact climate name the planet must have
    pub climate: Option<String>,
    /// Exact terrain name the planet must have
    pub terrain: Option<String>,
}

impl PlanetFilter {
    pub fn new(search: Option<String>, climate: Option<String>, terrain: Option<String>) -> Self {
        let clean = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        Self {
            search: clean(search),
            climate: clean(climate),
            terrain: clean(terrain),
        }
    }

    /// WHERE clause over `planets p` plus its positional parameters
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(search) = &self.search {
            values.push(like_pattern(&name_key(search)));
            let idx = values.len();
            clauses.push(format!(
                "(p.name_key LIKE ?{idx} ESCAPE '\\' OR p.population LIKE ?{idx} ESCAPE '\\')"
            ));
        }
        if let Some(climate) = &self.climate {
            values.push(name_key(climate));
            clauses.push(related_clause("planet_climates", "climates", "climate_id", values.len()));
        }
        if let Some(terrain) = &self.terrain {
            values.push(name_key(terrain));
            clauses.push(related_clause("planet_terrains", "terrains", "terrain_id", values.len()));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

fn related_clause(link: &str, table: &str, column: &str, idx: usize) -> String {
    format!(
        "EXISTS (SELECT 1 FROM {link} j JOIN {table} l ON l.id = j.{column} \
         WHERE j.planet_id = p.id AND l.name_key = ?{idx})"
    )
}

/// `%text%` with LIKE wildcards in `text` escaped
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
