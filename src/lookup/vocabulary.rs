use anyhow::{Context, Result, bail};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Sentinel used in the region map for raw values that could not be assigned
/// a canonical region. Resolves to "no match", never passes through.
pub const UNKNOWN_REGION: &str = "UNKNOWN";

const CATEGORIES_FILE: &str = "common_categories.json";
const REGIONS_FILE: &str = "common_regions.json";
const REGION_MAP_FILE: &str = "region_map.json";

/// The canonical category/region vocabulary plus the raw-to-canonical region
/// alias map. Loaded once at startup and read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Canonical categories in file order; this ordering is the fuzzy-match
    /// tie-break order and must stay stable.
    categories: Vec<String>,
    categories_by_folded: HashMap<String, String>,
    region_map: HashMap<String, String>,
    region_map_folded: HashMap<String, String>,
}

impl Vocabulary {
    /// Load the three lookup artefacts from a lookups directory.
    pub fn load(lookups_dir: &Path) -> Result<Self> {
        let categories: Vec<String> = read_json(&lookups_dir.join(CATEGORIES_FILE))
            .with_context(|| format!("{CATEGORIES_FILE} must contain a JSON array of strings"))?;
        let regions: Vec<String> = read_json(&lookups_dir.join(REGIONS_FILE))
            .with_context(|| format!("{REGIONS_FILE} must contain a JSON array of strings"))?;
        let region_map: HashMap<String, String> = read_json(&lookups_dir.join(REGION_MAP_FILE))
            .with_context(|| {
                format!("{REGION_MAP_FILE} must contain a JSON object of string mappings")
            })?;

        let vocabulary = Self::from_parts(categories, regions, region_map)?;
        info!(
            "Loaded vocabulary: {} categories, {} region aliases",
            vocabulary.categories.len(),
            vocabulary.region_map.len()
        );
        Ok(vocabulary)
    }

    /// Build a vocabulary from already-parsed lookup data, validating that
    /// every region alias targets a listed canonical region or the explicit
    /// UNKNOWN sentinel.
    pub fn from_parts(
        categories: Vec<String>,
        regions: Vec<String>,
        region_map: HashMap<String, String>,
    ) -> Result<Self> {
        let mut ordered_categories = Vec::new();
        let mut categories_by_folded = HashMap::new();
        for raw in categories {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let folded = name.to_lowercase();
            if !categories_by_folded.contains_key(&folded) {
                categories_by_folded.insert(folded, name.to_string());
                ordered_categories.push(name.to_string());
            }
        }

        let region_set: HashSet<String> = regions
            .into_iter()
            .map(|region| region.trim().to_string())
            .filter(|region| !region.is_empty())
            .collect();

        let mut cleaned_map = HashMap::new();
        let mut folded_map = HashMap::new();
        for (raw_key, raw_target) in region_map {
            let key = raw_key.trim();
            if key.is_empty() {
                continue;
            }
            let target = raw_target.trim().to_string();
            if target != UNKNOWN_REGION && !region_set.contains(&target) {
                bail!(
                    "region_map entry '{key}' targets '{target}', \
                     which is not a canonical region or {UNKNOWN_REGION}"
                );
            }
            folded_map.insert(key.to_lowercase(), target.clone());
            cleaned_map.insert(key.to_string(), target);
        }

        Ok(Self {
            categories: ordered_categories,
            categories_by_folded,
            region_map: cleaned_map,
            region_map_folded: folded_map,
        })
    }

    /// Canonical categories in tie-break order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Exact case-insensitive category lookup.
    pub fn category_by_folded(&self, folded: &str) -> Option<&String> {
        self.categories_by_folded.get(folded)
    }

    /// Region alias lookup: exact key first, then the case-folded form.
    pub fn region_alias(&self, raw: &str) -> Option<&String> {
        self.region_map
            .get(raw)
            .or_else(|| self.region_map_folded.get(&raw.to_lowercase()))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lookup file {}", path.display()))?;
    let parsed = serde_json::from_str(&content)
        .with_context(|| format!("Malformed JSON in {}", path.display()))?;
    Ok(parsed)
}
