//! Auxiliary reference data: craton boundaries and zone statistics.
//!
//! The raw model files are parsed once and re-serialized to a JSON cache
//! that is regenerated whenever any source file changes on disk. Loaded
//! data is immutable and shared across engine instances through a
//! process-wide read-mostly registry.

pub mod cratons;
pub mod zonestats;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
pub use cratons::{Craton, Cratons};
pub use zonestats::{ZoneStat, ZoneStats};

const CRATON_FILE: &str = "cratons.txt";
const ZONE_KEY_FILE: &str = "zonekey.dat";
const ZONE_STAT_FILE: &str = "zonestat.dat";
const CACHE_FILE: &str = "locaux.json";

/// The auxiliary reference data consumed by the location engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxData {
    pub cratons: Cratons,
    pub zone_stats: ZoneStats,
}

impl AuxData {
    pub fn new(cratons: Cratons, zone_stats: ZoneStats) -> Self {
        Self { cratons, zone_stats }
    }

    /// Load the reference data for a model directory, going through the
    /// process-wide registry. The serialized cache on disk is regenerated
    /// when any raw source file is newer than it.
    pub fn load(model_path: &Path) -> Result<Arc<AuxData>> {
        static REGISTRY: RwLock<Option<HashMap<PathBuf, Arc<AuxData>>>> = RwLock::new(None);

        let key = model_path.to_path_buf();
        {
            let registry = REGISTRY.read();
            if let Some(found) = registry.as_ref().and_then(|map| map.get(&key)) {
                return Ok(found.clone());
            }
        }

        let mut registry = REGISTRY.write();
        let map = registry.get_or_insert_with(HashMap::new);
        if let Some(found) = map.get(&key) {
            return Ok(found.clone());
        }
        let data = Arc::new(Self::load_from_disk(model_path)?);
        map.insert(key, data.clone());
        Ok(data)
    }

    /// Read either the serialized cache or the raw source files,
    /// regenerating the cache in the latter case.
    pub fn load_from_disk(model_path: &Path) -> Result<AuxData> {
        let cache_path = model_path.join(CACHE_FILE);
        let sources = [
            model_path.join(CRATON_FILE),
            model_path.join(ZONE_KEY_FILE),
            model_path.join(ZONE_STAT_FILE),
        ];

        if !any_source_newer(&cache_path, &sources) {
            debug!(path = %cache_path.display(), "reading serialized reference data");
            let text = fs::read_to_string(&cache_path)?;
            return Ok(serde_json::from_str(&text)?);
        }

        info!(path = %model_path.display(), "regenerating reference data cache");
        let data = Self::parse_sources(model_path)?;
        let text = serde_json::to_string(&data)?;
        fs::write(&cache_path, text)?;
        Ok(data)
    }

    fn parse_sources(model_path: &Path) -> Result<AuxData> {
        let craton_text = fs::read_to_string(model_path.join(CRATON_FILE))?;
        let cratons = Cratons::parse(&craton_text)?;

        let key_bytes = fs::read(model_path.join(ZONE_KEY_FILE))?;
        let keys = ZoneStats::read_keys(&key_bytes)?;
        let table_len = ZoneStats::new(keys.clone(), 0, Vec::new()).table_len();

        let stat_bytes = fs::read(model_path.join(ZONE_STAT_FILE))?;
        let (years, stats) = ZoneStats::read_stats(&stat_bytes, table_len)?;

        Ok(AuxData::new(cratons, ZoneStats::new(keys, years, stats)))
    }
}

/// True when the target is missing or any source is newer than it.
fn any_source_newer(target: &Path, sources: &[PathBuf]) -> bool {
    let target_time = match fs::metadata(target).and_then(|m| m.modified()) {
        Ok(time) => time,
        Err(_) => return true,
    };
    sources.iter().any(|source| {
        fs::metadata(source)
            .and_then(|m| m.modified())
            .map(|time| time > target_time)
            .unwrap_or(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use crate::error::LocatorError;

    fn write_sources(dir: &Path) {
        fs::write(
            dir.join(CRATON_FILE),
            "Test Craton 5\n10.0 0.0\n0.0 10.0\n-10.0 0.0\n0.0 -10.0\n10.0 0.0\n",
        )
        .unwrap();

        let mut key_bytes = Vec::new();
        for _ in 0..(zonestats::NUM_LON * zonestats::NUM_COLAT) {
            key_bytes.write_i32::<LittleEndian>(2).unwrap();
        }
        fs::write(dir.join(ZONE_KEY_FILE), &key_bytes).unwrap();

        let mut stat_bytes = Vec::new();
        stat_bytes.write_i32::<LittleEndian>(100).unwrap();
        stat_bytes.extend_from_slice(&[0u8; 36]);
        stat_bytes.write_i32::<LittleEndian>(1).unwrap();
        for value in [0.5f32, 6.0, 3.0, 4.0, 40.0, 80.0, 15.0] {
            stat_bytes.write_f32::<LittleEndian>(value).unwrap();
        }
        stat_bytes.write_i32::<LittleEndian>(10).unwrap();
        stat_bytes.write_f32::<LittleEndian>(0.0).unwrap();
        fs::write(dir.join(ZONE_STAT_FILE), &stat_bytes).unwrap();
    }

    #[test]
    fn cache_is_written_and_reread() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());

        let first = AuxData::load_from_disk(dir.path()).unwrap();
        assert!(dir.path().join(CACHE_FILE).exists());
        assert_eq!(first.cratons.len(), 1);
        assert_eq!(first.zone_stats.years, 100);

        // Second load comes from the cache and sees the same data.
        let second = AuxData::load_from_disk(dir.path()).unwrap();
        assert_eq!(second.cratons.len(), 1);
        assert_eq!(second.zone_stats.years, 100);
        let (depth, _) = second.zone_stats.bayes_depth(45.0, -100.0);
        assert_eq!(depth, 15.0);
    }

    #[test]
    fn missing_sources_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AuxData::load_from_disk(dir.path()),
            Err(LocatorError::Io(_))
        ));
    }
}
