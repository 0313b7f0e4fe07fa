use crate::utils::constants::CITY_SUFFIX;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A header column identified as one of the target cities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityColumn {
    pub city: String,
    pub column: usize,
}

fn strip_suffix(name: &str) -> &str {
    name.strip_suffix(CITY_SUFFIX).unwrap_or(name)
}

/// Match a header column against the known cities.
///
/// Rules are applied in priority order across the whole list, so an exact
/// match anywhere wins over a fuzzy match earlier in the list:
/// 1. exact match
/// 2. match after stripping the `市` suffix from either side
/// 3. substring: the column contains the city (or its stripped name), or the
///    city contains the column
pub fn match_city<'a>(column: &str, known_cities: &'a [String]) -> Option<&'a String> {
    let column = column.trim();
    if column.is_empty() {
        return None;
    }

    if let Some(city) = known_cities.iter().find(|city| city.as_str() == column) {
        return Some(city);
    }

    let stripped_column = strip_suffix(column);
    if let Some(city) = known_cities
        .iter()
        .find(|city| strip_suffix(city) == stripped_column)
    {
        return Some(city);
    }

    known_cities.iter().find(|city| {
        let stripped = strip_suffix(city);
        column.contains(city.as_str())
            || (!stripped.is_empty() && column.contains(stripped))
            || city.contains(column)
    })
}

/// Resolve the city columns of a header. The first column matched for a
/// city wins; columns in `skip` (the date/hour/type columns) are ignored.
pub fn city_columns(headers: &[String], known_cities: &[String], skip: &[usize]) -> Vec<CityColumn> {
    let mut columns: Vec<CityColumn> = Vec::new();

    for (index, header) in headers.iter().enumerate() {
        if skip.contains(&index) {
            continue;
        }

        if let Some(city) = match_city(header, known_cities) {
            if !columns.iter().any(|c| &c.city == city) {
                columns.push(CityColumn {
                    city: city.clone(),
                    column: index,
                });
            }
        }
    }

    columns
}

/// Header-keyed cache of resolved city columns, owned by a parser instance.
/// Daily files share one header layout, so most lookups are hits.
#[derive(Debug, Default)]
pub struct CityColumnCache {
    entries: Mutex<HashMap<String, Arc<Vec<CityColumn>>>>,
}

impl CityColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, headers: &[String], known_cities: &[String], skip: &[usize]) -> Arc<Vec<CityColumn>> {
        let key = headers.join(",");

        if let Ok(entries) = self.entries.lock() {
            if let Some(hit) = entries.get(&key) {
                return Arc::clone(hit);
            }
        }

        let resolved = Arc::new(city_columns(headers, known_cities, skip));
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, Arc::clone(&resolved));
        }

        resolved
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
