use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One price/volume measurement for one item at one point in time.
///
/// `(entity_id, event_time)` is the natural key. `fetch_time` records when the
/// data was obtained and survives queueing and replay unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_id: i64,
    pub avg_high_price: Option<i64>,
    pub high_price_volume: Option<i64>,
    pub avg_low_price: Option<i64>,
    pub low_price_volume: Option<i64>,
    pub event_time: i64,
    pub fetch_time: DateTime<Utc>,
}

impl Observation {
    pub fn natural_key(&self) -> (i64, i64) {
        (self.entity_id, self.event_time)
    }
}

/// Price fields shared by both API payload shapes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPriceFields {
    #[serde(default)]
    pub avg_high_price: Option<i64>,
    #[serde(default)]
    pub high_price_volume: Option<i64>,
    #[serde(default)]
    pub avg_low_price: Option<i64>,
    #[serde(default)]
    pub low_price_volume: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTimeseriesPoint {
    pub timestamp: i64,
    #[serde(flatten)]
    pub prices: RawPriceFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeseriesResponse {
    #[serde(default)]
    pub data: Vec<RawTimeseriesPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    #[serde(default)]
    pub data: BTreeMap<String, RawPriceFields>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl RawPriceFields {
    fn into_observation(
        self,
        entity_id: i64,
        event_time: i64,
        fetch_time: DateTime<Utc>,
    ) -> Observation {
        Observation {
            entity_id,
            avg_high_price: self.avg_high_price,
            high_price_volume: self.high_price_volume,
            avg_low_price: self.avg_low_price,
            low_price_volume: self.low_price_volume,
            event_time,
            fetch_time,
        }
    }
}

impl TimeseriesResponse {
    pub fn into_observations(self, entity_id: i64, fetch_time: DateTime<Utc>) -> Vec<Observation> {
        self.data
            .into_iter()
            .map(|point| {
                point
                    .prices
                    .into_observation(entity_id, point.timestamp, fetch_time)
            })
            .collect()
    }
}

impl SnapshotResponse {
    /// Every row shares the snapshot's own timestamp as its event time.
    pub fn into_observations(
        self,
        event_time: i64,
        fetch_time: DateTime<Utc>,
    ) -> Vec<Observation> {
        self.data
            .into_iter()
            .filter_map(|(key, prices)| match key.trim().parse::<i64>() {
                Ok(entity_id) => Some(prices.into_observation(entity_id, event_time, fetch_time)),
                Err(_) => {
                    warn!("Skipping snapshot entry with non-numeric item id {:?}", key);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fetch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn timeseries_missing_fields_map_to_null() {
        let payload = json!({
            "data": [
                {"timestamp": 1000, "avgHighPrice": 210, "highPriceVolume": 40},
                {"timestamp": 1300, "avgHighPrice": null, "avgLowPrice": 190, "lowPriceVolume": 0}
            ]
        });
        let response: TimeseriesResponse =
            serde_json::from_value(payload).expect("payload should deserialize");
        let observations = response.into_observations(565, fetch_time());

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].natural_key(), (565, 1000));
        assert_eq!(observations[0].avg_low_price, None);
        assert_eq!(observations[0].low_price_volume, None);
        assert_eq!(observations[1].avg_high_price, None);
        assert_eq!(observations[1].low_price_volume, Some(0));
        assert!(observations.iter().all(|obs| obs.fetch_time == fetch_time()));
    }

    #[test]
    fn snapshot_uses_snapshot_timestamp_and_skips_bad_keys() {
        let payload = json!({
            "timestamp": 1_717_243_200,
            "data": {
                "2": {"avgHighPrice": 150, "highPriceVolume": 1200},
                "565": {"avgLowPrice": 205, "lowPriceVolume": 77},
                "rune": {"avgHighPrice": 1}
            }
        });
        let response: SnapshotResponse =
            serde_json::from_value(payload).expect("payload should deserialize");
        let event_time = response.timestamp.expect("timestamp present");
        let observations = response.into_observations(event_time, fetch_time());

        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|obs| obs.event_time == 1_717_243_200));
        let ids: Vec<i64> = observations.iter().map(|obs| obs.entity_id).collect();
        assert_eq!(ids, vec![2, 565]);
        assert_eq!(observations[1].avg_high_price, None);
    }

    #[test]
    fn observation_json_preserves_fetch_time() {
        let observation = Observation {
            entity_id: 565,
            avg_high_price: Some(210),
            high_price_volume: None,
            avg_low_price: Some(200),
            low_price_volume: Some(12),
            event_time: 1005,
            fetch_time: fetch_time(),
        };
        let text = serde_json::to_string(&observation).expect("serialize");
        let decoded: Observation = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(decoded, observation);
    }
}
