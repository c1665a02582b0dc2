//! Earthquake depth statistics by one-degree geographic cell.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{LocatorError, Result};
use crate::geo;

/// Number of one-degree cells in longitude and colatitude.
pub const NUM_LON: usize = 360;
pub const NUM_COLAT: usize = 180;

/// Historical depth statistics for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneStat {
    pub mean_depth: f64,
    pub min_depth: f64,
    pub max_depth: f64,
}

/// Bayesian depth prior defaults for cells with no usable statistics.
const DEFAULT_BAYES_DEPTH: f64 = 10.0;

/// The 360x180 grid of zone keys and the sparse statistics table they
/// index. Organized by longitude east of Greenwich and colatitude from
/// the north pole, one degree per cell. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStats {
    /// Flat key grid, indexed `lon * NUM_COLAT + colat`; negative keys
    /// mean no statistics for the cell
    keys: Vec<i32>,
    /// Number of years of history behind the statistics
    pub years: i32,
    stats: Vec<Option<ZoneStat>>,
}

impl ZoneStats {
    pub fn new(keys: Vec<i32>, years: i32, stats: Vec<Option<ZoneStat>>) -> Self {
        Self { keys, years, stats }
    }

    /// A grid with no statistics anywhere (every lookup falls back to
    /// the shallow default prior).
    pub fn empty() -> Self {
        Self {
            keys: vec![-1; NUM_LON * NUM_COLAT],
            years: 0,
            stats: Vec::new(),
        }
    }

    /// Number of statistics records the key grid expects.
    pub fn table_len(&self) -> usize {
        self.keys.iter().copied().max().map(|k| (k + 1).max(0) as usize).unwrap_or(0)
    }

    /// Read the zone key file: NUM_LON x NUM_COLAT little-endian 32-bit
    /// integers, colatitude rows from the north pole, longitude within a
    /// row heading east from Greenwich. The raw keys are off by two from
    /// the statistics table because of the legacy header record.
    pub fn read_keys(data: &[u8]) -> Result<Vec<i32>> {
        let expected = NUM_LON * NUM_COLAT;
        if data.len() < expected * 4 {
            return Err(LocatorError::ModelData(format!(
                "zone key file too short: {} bytes",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let mut keys = vec![-1i32; expected];
        for colat in 0..NUM_COLAT {
            for lon in 0..NUM_LON {
                let raw = cursor.read_i32::<LittleEndian>()?;
                keys[lon * NUM_COLAT + colat] = raw - 2;
            }
        }
        Ok(keys)
    }

    /// Read the zone statistics file. A 40-byte header whose first int is
    /// the number of historical years, then one 40-byte record per table
    /// entry; only the depth statistics are kept, and only for cells with
    /// a nonzero free percentage above 900 km minimum depth.
    pub fn read_stats(data: &[u8], table_len: usize) -> Result<(i32, Vec<Option<ZoneStat>>)> {
        let mut cursor = Cursor::new(data);
        let years = cursor.read_i32::<LittleEndian>()?;
        // Skip the rest of the legacy header.
        let mut header = [0u8; 36];
        cursor.read_exact(&mut header)?;

        let mut stats = Vec::with_capacity(table_len);
        for _ in 0..table_len {
            let _ndeg = cursor.read_i32::<LittleEndian>()?;
            let _per_year = cursor.read_f32::<LittleEndian>()?;
            let _max_mag = cursor.read_f32::<LittleEndian>()?;
            let _min_mag = cursor.read_f32::<LittleEndian>()?;
            let min_depth = cursor.read_f32::<LittleEndian>()? as f64;
            let max_depth = cursor.read_f32::<LittleEndian>()? as f64;
            let pct_free = cursor.read_f32::<LittleEndian>()?;
            let mean_depth = cursor.read_f32::<LittleEndian>()? as f64;
            let _depth_mode = cursor.read_i32::<LittleEndian>()?;
            let _pct_ge = cursor.read_f32::<LittleEndian>()?;

            if pct_free > 0.0 && min_depth < 900.0 {
                stats.push(Some(ZoneStat {
                    mean_depth,
                    min_depth,
                    max_depth,
                }));
            } else {
                stats.push(None);
            }
        }

        Ok((years, stats))
    }

    fn cell(&self, latitude: f64, longitude: f64) -> Option<ZoneStat> {
        let colat = (90.0 - latitude).clamp(0.0, 180.0 - 1e-9) as usize;
        let mut lon_east = longitude % 360.0;
        if lon_east < 0.0 {
            lon_east += 360.0;
        }
        let lon = (lon_east as usize).min(NUM_LON - 1);

        let key = self.keys[lon * NUM_COLAT + colat];
        if key < 0 {
            return None;
        }
        self.stats.get(key as usize).copied().flatten()
    }

    /// Bayesian depth prior for the cell containing the epicenter: the
    /// mean historical depth with spread max(0.75 * half-range, default).
    /// Cells without statistics fall back to a loose shallow prior.
    pub fn bayes_depth(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        match self.cell(latitude, longitude) {
            Some(stat) => {
                let spread = (0.75 * (stat.max_depth - stat.min_depth) / 2.0)
                    .max(geo::DEFAULT_DEPTH_SE);
                (stat.mean_depth, spread)
            }
            None => (DEFAULT_BAYES_DEPTH, 2.0 * geo::DEFAULT_DEPTH_SE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use byteorder::{LittleEndian, WriteBytesExt};

    fn grid_with_cell(latitude: f64, longitude: f64, stat: ZoneStat) -> ZoneStats {
        let mut keys = vec![-1i32; NUM_LON * NUM_COLAT];
        let colat = (90.0 - latitude) as usize;
        let lon = if longitude < 0.0 {
            (longitude + 360.0) as usize
        } else {
            longitude as usize
        };
        keys[lon * NUM_COLAT + colat] = 0;
        ZoneStats::new(keys, 100, vec![Some(stat)])
    }

    #[test]
    fn lookup_hits_the_right_cell() {
        let stats = grid_with_cell(
            45.5,
            -100.5,
            ZoneStat {
                mean_depth: 12.0,
                min_depth: 2.0,
                max_depth: 50.0,
            },
        );
        let (depth, spread) = stats.bayes_depth(45.5, -100.5);
        assert_relative_eq!(depth, 12.0);
        assert_relative_eq!(spread, 0.75 * 24.0);
        // A neighboring cell has no statistics.
        let (depth, spread) = stats.bayes_depth(47.5, -100.5);
        assert_relative_eq!(depth, DEFAULT_BAYES_DEPTH);
        assert_relative_eq!(spread, 2.0 * geo::DEFAULT_DEPTH_SE);
    }

    #[test]
    fn narrow_depth_ranges_get_the_default_spread() {
        let stats = grid_with_cell(
            10.0,
            10.0,
            ZoneStat {
                mean_depth: 8.0,
                min_depth: 5.0,
                max_depth: 12.0,
            },
        );
        let (_, spread) = stats.bayes_depth(10.0, 10.0);
        assert_relative_eq!(spread, geo::DEFAULT_DEPTH_SE);
    }

    #[test]
    fn binary_round_trip() {
        // Two cells, keys written colatitude-major like the real file.
        let mut key_bytes = Vec::new();
        for colat in 0..NUM_COLAT {
            for lon in 0..NUM_LON {
                let raw = if colat == 45 && lon == 260 { 2i32 } else { 1i32 };
                key_bytes.write_i32::<LittleEndian>(raw).unwrap();
            }
        }
        let keys = ZoneStats::read_keys(&key_bytes).unwrap();
        assert_eq!(keys[260 * NUM_COLAT + 45], 0);
        assert_eq!(keys[0], -1);

        let mut stat_bytes = Vec::new();
        stat_bytes.write_i32::<LittleEndian>(118).unwrap();
        stat_bytes.extend_from_slice(&[0u8; 36]);
        // One record: usable statistics.
        stat_bytes.write_i32::<LittleEndian>(1).unwrap();
        stat_bytes.write_f32::<LittleEndian>(0.5).unwrap();
        stat_bytes.write_f32::<LittleEndian>(6.0).unwrap();
        stat_bytes.write_f32::<LittleEndian>(3.0).unwrap();
        stat_bytes.write_f32::<LittleEndian>(4.0).unwrap(); // min depth
        stat_bytes.write_f32::<LittleEndian>(40.0).unwrap(); // max depth
        stat_bytes.write_f32::<LittleEndian>(80.0).unwrap(); // pct free
        stat_bytes.write_f32::<LittleEndian>(15.0).unwrap(); // mean depth
        stat_bytes.write_i32::<LittleEndian>(10).unwrap();
        stat_bytes.write_f32::<LittleEndian>(0.0).unwrap();

        let (years, stats) = ZoneStats::read_stats(&stat_bytes, 1).unwrap();
        assert_eq!(years, 118);
        assert_eq!(
            stats[0],
            Some(ZoneStat {
                mean_depth: 15.0,
                min_depth: 4.0,
                max_depth: 40.0,
            })
        );
    }

    #[test]
    fn deep_or_empty_cells_are_rejected() {
        let mut bytes = Vec::new();
        bytes.write_i32::<LittleEndian>(118).unwrap();
        bytes.extend_from_slice(&[0u8; 36]);
        // pct free = 0
        bytes.write_i32::<LittleEndian>(1).unwrap();
        for value in [0.5f32, 6.0, 3.0, 4.0, 40.0, 0.0, 15.0] {
            bytes.write_f32::<LittleEndian>(value).unwrap();
        }
        bytes.write_i32::<LittleEndian>(10).unwrap();
        bytes.write_f32::<LittleEndian>(0.0).unwrap();
        // min depth >= 900
        bytes.write_i32::<LittleEndian>(1).unwrap();
        for value in [0.5f32, 6.0, 3.0, 950.0, 960.0, 50.0, 955.0] {
            bytes.write_f32::<LittleEndian>(value).unwrap();
        }
        bytes.write_i32::<LittleEndian>(10).unwrap();
        bytes.write_f32::<LittleEndian>(0.0).unwrap();

        let (_, stats) = ZoneStats::read_stats(&bytes, 2).unwrap();
        assert_eq!(stats, vec![None, None]);
    }
}
