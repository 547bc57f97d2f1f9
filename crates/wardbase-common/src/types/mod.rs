//! Common types used across wardbase

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Columns of the ward table, in the positional order rows are decoded in.
pub const WARD_COLUMNS: [&str; 6] = ["district", "mandal", "village", "mp", "mla", "no_of_wards"];

/// Number of fields a data row must carry.
pub const WARD_FIELD_COUNT: usize = WARD_COLUMNS.len();

/// A row had the wrong number of fields for a ward record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} fields, found {found}")]
pub struct FieldCountError {
    pub expected: usize,
    pub found: usize,
}

/// One row of the ward table.
///
/// Every column is stored as text; `no_of_wards` is never coerced to a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardRecord {
    pub district: String,
    pub mandal: String,
    pub village: String,
    pub mp: String,
    pub mla: String,
    pub no_of_wards: String,
}

impl WardRecord {
    /// Build a record from positional fields.
    ///
    /// Fails unless exactly [`WARD_FIELD_COUNT`] fields are given.
    pub fn from_fields(fields: Vec<String>) -> Result<Self, FieldCountError> {
        let found = fields.len();
        let [district, mandal, village, mp, mla, no_of_wards]: [String; WARD_FIELD_COUNT] =
            fields.try_into().map_err(|_| FieldCountError {
                expected: WARD_FIELD_COUNT,
                found,
            })?;

        Ok(Self {
            district,
            mandal,
            village,
            mp,
            mla,
            no_of_wards,
        })
    }

    /// Fields in column order
    pub fn into_fields(self) -> [String; WARD_FIELD_COUNT] {
        [self.district, self.mandal, self.village, self.mp, self.mla, self.no_of_wards]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_from_fields_maps_positionally() {
        let record =
            WardRecord::from_fields(fields(&["Krishna", "Gudivada", "Mandavalli", "Machilipatnam", "Gudivada", "07"]))
                .unwrap();

        assert_eq!(record.district, "Krishna");
        assert_eq!(record.mandal, "Gudivada");
        assert_eq!(record.village, "Mandavalli");
        assert_eq!(record.mp, "Machilipatnam");
        assert_eq!(record.mla, "Gudivada");
        // Kept as text, leading zero intact
        assert_eq!(record.no_of_wards, "07");
    }

    #[test]
    fn test_from_fields_short_row() {
        let err = WardRecord::from_fields(fields(&["a", "b", "c"])).unwrap_err();
        assert_eq!(err, FieldCountError { expected: 6, found: 3 });
    }

    #[test]
    fn test_from_fields_long_row() {
        let err = WardRecord::from_fields(fields(&["a", "b", "c", "d", "e", "f", "g"])).unwrap_err();
        assert_eq!(err.found, 7);
        assert_eq!(err.to_string(), "expected 6 fields, found 7");
    }

    #[test]
    fn test_into_fields_round_order() {
        let record = WardRecord::from_fields(fields(&["1", "2", "3", "4", "5", "6"])).unwrap();
        assert_eq!(record.into_fields(), ["1", "2", "3", "4", "5", "6"].map(String::from));
    }
}
