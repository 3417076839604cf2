//! Decoding of `getpublicdata` and averaging over the stations of an area.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{geo::Coordinate, station::MEASURE_TIME_THRESHOLD_SECS};

/// Default `--type` list of the public-data command.
pub const DEFAULT_TYPES: &str = "temperature,pressure,humidity,rain,wind";

/// Fresh values reported by one public station, keyed by measurement name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StationMeasures {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AverageRow {
    pub name: String,
    /// `None` when no station reported this value.
    pub average: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub rows: Vec<AverageRow>,
    /// Number of rows with at least one sample.
    pub computed: usize,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.computed == 0
    }
}

/// Split a comma-separated `--type` argument.
pub fn parse_types(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand the grouped names into the values that are averaged.
pub fn search_values(types: &[String]) -> Vec<String> {
    types
        .iter()
        .flat_map(|t| match t.as_str() {
            "rain" => vec!["rain_60min".to_string(), "rain_24h".to_string()],
            "wind" => vec!["wind_strength".to_string(), "gust_strength".to_string()],
            other => vec![other.to_string()],
        })
        .collect()
}

/// Collect the values named in `types` that were measured within the last hour.
///
/// `rain` and `wind` pick up every field of the rain gauge or anemometer.
pub fn parse_public_data(
    types: &[String],
    body: &str,
    now: DateTime<Utc>,
) -> Result<Vec<StationMeasures>> {
    let parsed: PublicDataResponse =
        serde_json::from_str(body).context("Failed to parse Netatmo public data JSON")?;

    let fresh = |ts: i64| now.timestamp() - ts < MEASURE_TIME_THRESHOLD_SECS;
    let wants = |name: &str| types.iter().any(|t| t == name);

    parsed
        .body
        .into_iter()
        .map(|station| {
            let mut values = BTreeMap::new();

            for measure in station.measures.into_values() {
                for (ts, samples) in &measure.res {
                    let ts: i64 = ts
                        .parse()
                        .map_err(|_| anyhow!("Invalid measurement timestamp '{ts}'"))?;
                    if !fresh(ts) {
                        continue;
                    }
                    for (kind, sample) in measure.kinds.iter().zip(samples) {
                        match sample {
                            Some(v) if wants(kind) => {
                                values.insert(kind.clone(), *v);
                            }
                            _ => {}
                        }
                    }
                }

                if wants("rain") && measure.rain_timeutc.is_some_and(fresh) {
                    extend_present(
                        &mut values,
                        &[
                            ("rain_60min", measure.rain_60min),
                            ("rain_24h", measure.rain_24h),
                            ("rain_live", measure.rain_live),
                        ],
                    );
                }
                if wants("wind") && measure.wind_timeutc.is_some_and(fresh) {
                    extend_present(
                        &mut values,
                        &[
                            ("wind_strength", measure.wind_strength),
                            ("wind_angle", measure.wind_angle),
                            ("gust_strength", measure.gust_strength),
                            ("gust_angle", measure.gust_angle),
                        ],
                    );
                }
            }

            let location = match station.place.location.as_slice() {
                [lon, lat, ..] => Some(Coordinate::new(*lat, *lon)),
                _ => None,
            };

            Ok::<_, anyhow::Error>(StationMeasures {
                id: station.id,
                location,
                values,
            })
        })
        .collect()
}

fn extend_present(values: &mut BTreeMap<String, f64>, fields: &[(&str, Option<f64>)]) {
    for (name, value) in fields {
        if let Some(v) = value {
            values.insert((*name).to_string(), *v);
        }
    }
}

/// Mean of each value over the stations that reported it, rounded to 2 decimals.
pub fn average(search_values: &[String], stations: &[StationMeasures]) -> Aggregation {
    let rows: Vec<AverageRow> = search_values
        .iter()
        .map(|name| {
            let samples: Vec<f64> = stations
                .iter()
                .filter_map(|s| s.values.get(name))
                .copied()
                .collect();
            let count = samples.len();
            let average = (count > 0).then(|| {
                let mean = samples.iter().sum::<f64>() / count as f64;
                round_half_up(mean, 2)
            });

            AverageRow {
                name: name.clone(),
                average,
                count,
            }
        })
        .collect();

    let computed = rows.iter().filter(|r| r.average.is_some()).count();
    Aggregation { rows, computed }
}

fn round_half_up(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale + 0.5).floor() / scale
}

#[derive(Debug, Deserialize)]
struct PublicDataResponse {
    #[serde(default)]
    body: Vec<RawPublicStation>,
}

#[derive(Debug, Deserialize)]
struct RawPublicStation {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    place: RawPlace,
    #[serde(default)]
    measures: BTreeMap<String, RawMeasure>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPlace {
    /// `[longitude, latitude]`
    #[serde(default)]
    location: Vec<f64>,
}

/// Either a `res`/`type` pair or one of the rain gauge / anemometer shapes.
#[derive(Debug, Default, Deserialize)]
struct RawMeasure {
    #[serde(default)]
    res: BTreeMap<String, Vec<Option<f64>>>,
    #[serde(rename = "type", default)]
    kinds: Vec<String>,

    rain_60min: Option<f64>,
    rain_24h: Option<f64>,
    rain_live: Option<f64>,
    rain_timeutc: Option<i64>,

    wind_strength: Option<f64>,
    wind_angle: Option<f64>,
    gust_strength: Option<f64>,
    gust_angle: Option<f64>,
    wind_timeutc: Option<i64>,
}
