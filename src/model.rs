use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The string-heavy machine log record.
///
/// Every textual field is deterministically derived from the tick's sequence
/// number and date; the fields carry no semantics beyond producing realistic
/// record size and cardinality for storage benchmarking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineLog {
    pub partij_id: String,
    pub partij_omschrijving: String,
    pub herkomst: String,
    pub maat: String,
    pub container: String,
    pub inhaaldatum: String,
    pub locatie: String,
    pub timestamp: String,
    pub value: i64,
}

/// A numeric time-series reading of one device item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    pub device_id: i32,
    pub device_item_id: i32,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mongodb::bson;

    use super::*;

    #[test]
    fn test_reading_datetimes_round_trip_as_bson_datetimes() {
        let ts = Utc.with_ymd_and_hms(2022, 1, 5, 12, 30, 0).unwrap();
        let reading = DeviceReading {
            device_id: 1,
            device_item_id: 2,
            created_at: ts,
            updated_at: ts,
            timestamp: ts,
            value: 1.5,
        };

        let document = bson::to_document(&reading).unwrap();
        // Datetimes must land as native BSON datetimes, not strings,
        // or the $year/$month/$dayOfMonth pipeline stages cannot see them
        assert_eq!(document.get_datetime("timestamp").unwrap().to_chrono(), ts);

        let decoded: DeviceReading = bson::from_document(document).unwrap();
        assert_eq!(decoded, reading);
    }
}
