//! Calibration table
//!
//! Maps a whole-degree (phi, theta) attitude to the four actuator angles. The
//! table is loaded once at startup and never changes afterwards; lookups are
//! exact-key only.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::info;

use crate::error::TableError;

/// Actuator angles stored in one table row [deg]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorAngles {
    pub front: f64,
    pub back: f64,
    pub left: f64,
    pub right: f64,
}

/// One CSV row: phi, theta, front, back, left, right
#[derive(Debug, Deserialize)]
struct CalibrationRow {
    phi: f64,
    theta: f64,
    front: f64,
    back: f64,
    left: f64,
    right: f64,
}

/// Immutable (phi, theta) -> actuator angle lookup
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    entries: HashMap<(i32, i32), ActuatorAngles>,
}

/// Quantise an attitude to the nearest whole degree (halves round away from
/// zero)
///
/// NaN and infinities have no key; casting them would land on a real row.
pub fn quantize(pitch: f64, roll: f64) -> Result<(i32, i32), TableError> {
    if !pitch.is_finite() || !roll.is_finite() {
        return Err(TableError::NonFinite { pitch, roll });
    }
    Ok((pitch.round() as i32, roll.round() as i32))
}

impl CalibrationTable {
    /// Load the table from a CSV file
    ///
    /// # Arguments
    /// * `path` - CSV file with a `phi, theta, front, back, left, right` header
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let file = File::open(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(file)?;
        info!(
            "Calibration table loaded: {} entries from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse the table from any CSV source
    ///
    /// Every row must parse, keys must be whole degrees and unique, and the
    /// table must not be empty.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = HashMap::new();
        for (index, row) in csv.deserialize::<CalibrationRow>().enumerate() {
            // header is line 1
            let line = index as u64 + 2;
            let row = row.map_err(|source| TableError::Row { line, source })?;

            if row.phi.fract() != 0.0 || row.theta.fract() != 0.0 {
                return Err(TableError::NonIntegralKey {
                    line,
                    phi: row.phi,
                    theta: row.theta,
                });
            }
            let key = (row.phi as i32, row.theta as i32);
            let angles = ActuatorAngles {
                front: row.front,
                back: row.back,
                left: row.left,
                right: row.right,
            };
            if entries.insert(key, angles).is_some() {
                return Err(TableError::DuplicateKey {
                    phi: key.0,
                    theta: key.1,
                });
            }
        }

        if entries.is_empty() {
            return Err(TableError::Empty);
        }
        Ok(Self { entries })
    }

    /// Exact-key lookup
    ///
    /// # Arguments
    /// * `phi` - Pitch key [deg]
    /// * `theta` - Roll key [deg]
    ///
    /// # Returns
    /// * `Ok(angles)` if the key is present
    /// * `Err(TableError::Miss)` otherwise; the caller must not actuate
    pub fn lookup(&self, phi: i32, theta: i32) -> Result<ActuatorAngles, TableError> {
        self.entries
            .get(&(phi, theta))
            .copied()
            .ok_or(TableError::Miss { phi, theta })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
phi,theta,front,back,left,right
0,0,0.0,0.0,0.0,0.0
5,-3,2.0,-2.0,1.0,-1.0
-5, 3, -2.0, 2.0, -1.0, 1.0
";

    #[test]
    fn test_lookup_is_deterministic() {
        let table = CalibrationTable::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        let first = table.lookup(5, -3).unwrap();
        let second = table.lookup(5, -3).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            ActuatorAngles {
                front: 2.0,
                back: -2.0,
                left: 1.0,
                right: -1.0
            }
        );
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let table = CalibrationTable::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(table.lookup(-5, 3).unwrap().right, 1.0);
    }

    #[test]
    fn test_miss_is_an_error() {
        let table = CalibrationTable::from_reader(TABLE.as_bytes()).unwrap();
        assert!(matches!(
            table.lookup(1, 1),
            Err(TableError::Miss { phi: 1, theta: 1 })
        ));
    }

    #[test]
    fn test_float_formatted_keys_are_accepted() {
        let csv = "phi,theta,front,back,left,right\n2.0,-1.0,1,2,3,4\n";
        let table = CalibrationTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.lookup(2, -1).unwrap().left, 3.0);
    }

    #[test]
    fn test_malformed_row_is_rejected() {
        let csv = "phi,theta,front,back,left,right\n0,0,1,2,3,4\n1,0,x,2,3,4\n";
        let err = CalibrationTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::Row { line: 3, .. }));
    }

    #[test]
    fn test_fractional_key_is_rejected() {
        let csv = "phi,theta,front,back,left,right\n0.5,0,1,2,3,4\n";
        let err = CalibrationTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::NonIntegralKey { line: 2, .. }));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let csv = "phi,theta,front,back,left,right\n0,0,1,2,3,4\n0,0,5,6,7,8\n";
        let err = CalibrationTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::DuplicateKey { phi: 0, theta: 0 }));
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let csv = "phi,theta,front,back,left,right\n";
        let err = CalibrationTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::Empty));
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let path = std::env::temp_dir().join("thrust-stand-no-such-table.csv");
        assert!(matches!(
            CalibrationTable::load(&path),
            Err(TableError::Io { .. })
        ));
    }

    #[test]
    fn test_quantize_rounds_to_nearest_degree() {
        assert_eq!(quantize(5.0, -3.0).unwrap(), (5, -3));
        assert_eq!(quantize(4.6, -2.6).unwrap(), (5, -3));
        assert_eq!(quantize(0.49, -0.49).unwrap(), (0, 0));
        assert_eq!(quantize(2.5, -2.5).unwrap(), (3, -3));
    }

    #[test]
    fn test_quantize_rejects_non_finite() {
        for (pitch, roll) in [(f64::NAN, 0.0), (0.0, f64::NAN), (f64::INFINITY, 1.0)] {
            assert!(matches!(
                quantize(pitch, roll),
                Err(TableError::NonFinite { .. })
            ));
        }
    }
}
