use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Placeholder returned for pests absent from the reference table.
pub const NO_RECOMMENDATION: &str = "No recommendation available";

/// Most pesticides reported for a single pest.
pub const MAX_PESTICIDES: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PesticideRecord {
    pub name: String,
    pub description: String,
}

#[derive(Deserialize)]
struct Row {
    #[serde(rename = "Pest Name")]
    pest: String,
    #[serde(rename = "Most Commonly Used Pesticides")]
    pesticides: String,
}

/// Pest name to pesticide list, read once from the reference CSV.
#[derive(Clone, Debug, Default)]
pub struct PesticideTable {
    entries: HashMap<String, String>,
}

fn normalize(pest: &str) -> String {
    pest.trim().to_lowercase()
}

impl PesticideTable {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::artifact(path, e))?;
        let table = Self::from_reader(file).map_err(|e| Error::artifact(path, e))?;

        info!("Loaded {} pesticide entries from {}", table.len(), path.display());

        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut entries = HashMap::new();

        for row in csv::Reader::from_reader(reader).deserialize() {
            let row: Row = row?;
            // First occurrence wins.
            entries
                .entry(normalize(&row.pest))
                .or_insert_with(|| row.pesticides.trim().to_owned());
        }

        Ok(PesticideTable { entries })
    }

    /// Raw comma-separated pesticide string for `pest`.
    pub fn lookup(&self, pest: &str) -> &str {
        self.entries
            .get(&normalize(pest))
            .map(String::as_str)
            .unwrap_or(NO_RECOMMENDATION)
    }

    /// Up to three trimmed pesticide names for `pest`.
    pub fn recommend(&self, pest: &str) -> Vec<PesticideRecord> {
        self.lookup(pest)
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .take(MAX_PESTICIDES)
            .map(|name| PesticideRecord {
                name: name.to_owned(),
                description: format!("Commonly used to control {}", pest),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CSV: &str = "\
Pest Name,Most Commonly Used Pesticides
aphids,\"Imidacloprid, Thiamethoxam , Acetamiprid, Pyrethrin\"
locust,Malathion
Thrips,\"Spinosad,, Abamectin\"
";

    pub(crate) fn table() -> PesticideTable {
        PesticideTable::from_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn caps_and_trims_recommendations() {
        let records = table().recommend("aphids");

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Imidacloprid", "Thiamethoxam", "Acetamiprid"]);
        assert!(records.iter().all(|r| r.description.contains("aphids")));
    }

    #[test]
    fn drops_empty_names() {
        let names: Vec<String> = table().recommend("thrips").into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Spinosad", "Abamectin"]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("LOCUST "), "Malathion");
    }

    #[test]
    fn absent_pest_gets_placeholder() {
        let table = table();
        assert_eq!(table.lookup("mole cricket"), NO_RECOMMENDATION);

        let records = table.recommend("mole cricket");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, NO_RECOMMENDATION);
    }

    #[test]
    fn missing_column_is_an_error() {
        let csv = "Pest,Pesticide\naphids,Pyrethrin\n";
        assert!(PesticideTable::from_reader(csv.as_bytes()).is_err());
    }
}
