//! Decoding of `getstationsdata` into indoor and outdoor readings.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// A reading older than this many seconds means the device stopped reporting.
pub const MEASURE_TIME_THRESHOLD_SECS: i64 = 3600;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stations {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stations: Vec<Station>,
}

/// One base station with its main (indoor) device and its modules.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Station {
    #[serde(rename = "insideData", skip_serializing_if = "Vec::is_empty")]
    pub inside: Vec<IndoorReading>,
    #[serde(rename = "outsideData", skip_serializing_if = "Vec::is_empty")]
    pub outside: Vec<OutdoorReading>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndoorReading {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub station_name: String,
    #[serde(skip)]
    pub time_utc: Option<i64>,
    #[serde(rename = "Measurement_time", skip_serializing_if = "Option::is_none")]
    pub measurement_time: Option<String>,
    #[serde(rename = "AbsolutePressure", skip_serializing_if = "Option::is_none")]
    pub absolute_pressure: Option<f64>,
    #[serde(rename = "Noise", skip_serializing_if = "Option::is_none")]
    pub noise: Option<i64>,
    #[serde(rename = "Temperature", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_trend: Option<String>,
    #[serde(rename = "Humidity", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(rename = "Pressure", skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_trend: Option<String>,
    #[serde(rename = "CO2", skip_serializing_if = "Option::is_none")]
    pub co2: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_max_temp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_min_temp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temp: Option<f64>,
    pub wifi_status: i64,
    pub firmware: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutdoorReading {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub module_name: String,
    #[serde(skip)]
    pub time_utc: Option<i64>,
    #[serde(rename = "Measurement_time", skip_serializing_if = "Option::is_none")]
    pub measurement_time: Option<String>,
    #[serde(rename = "Temperature", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_trend: Option<String>,
    #[serde(rename = "Humidity", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_max_temp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_min_temp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temp: Option<f64>,
    pub battery_vp: i64,
    pub battery_percent: i64,
    pub rf_status: i64,
    pub firmware: i64,
}

/// `Working.` when the last measurement is recent enough, `Not working!` otherwise.
pub fn working_status(time_utc: Option<i64>, now: DateTime<Utc>) -> &'static str {
    match time_utc {
        Some(t) if now.timestamp() - t <= MEASURE_TIME_THRESHOLD_SECS => "Working.",
        _ => "Not working!",
    }
}

/// Local wall-clock rendering used for measurement times.
pub fn format_local_time(ts: i64) -> Option<String> {
    DateTime::from_timestamp(ts, 0).map(|dt| {
        dt.with_timezone(&Local)
            .format("%Y%m%d %H:%M:%S %Z")
            .to_string()
    })
}

pub fn parse_stations(body: &str) -> Result<Stations> {
    let parsed: StationsDataResponse =
        serde_json::from_str(body).context("Failed to parse Netatmo stations JSON")?;

    let stations = parsed
        .body
        .devices
        .into_iter()
        .map(|device| {
            let outside = device.modules.into_iter().map(outdoor_reading).collect();
            let inside = vec![indoor_reading(device.base)];
            Station { inside, outside }
        })
        .collect();

    Ok(Stations { stations })
}

fn indoor_reading(raw: RawBaseDevice) -> IndoorReading {
    let d = raw.dashboard_data.unwrap_or_default();
    IndoorReading {
        id: raw.id,
        station_name: raw.station_name,
        time_utc: d.time_utc,
        measurement_time: d.time_utc.and_then(format_local_time),
        absolute_pressure: d.absolute_pressure,
        noise: d.noise,
        temperature: d.temperature,
        temp_trend: d.temp_trend,
        humidity: d.humidity,
        pressure: d.pressure,
        pressure_trend: d.pressure_trend,
        co2: d.co2,
        date_max_temp: d.date_max_temp,
        date_min_temp: d.date_min_temp,
        min_temp: d.min_temp,
        max_temp: d.max_temp,
        wifi_status: raw.wifi_status,
        firmware: raw.firmware,
    }
}

fn outdoor_reading(raw: RawModule) -> OutdoorReading {
    // unreachable modules report stale dashboards; keep only the static fields
    let d = if raw.reachable {
        raw.dashboard_data.unwrap_or_default()
    } else {
        RawDashboard::default()
    };
    OutdoorReading {
        id: raw.id,
        module_name: raw.module_name,
        time_utc: d.time_utc,
        measurement_time: d.time_utc.and_then(format_local_time),
        temperature: d.temperature,
        temp_trend: d.temp_trend,
        humidity: d.humidity,
        date_max_temp: d.date_max_temp,
        date_min_temp: d.date_min_temp,
        min_temp: d.min_temp,
        max_temp: d.max_temp,
        battery_vp: raw.battery_vp,
        battery_percent: raw.battery_percent,
        rf_status: raw.rf_status,
        firmware: raw.firmware,
    }
}

#[derive(Debug, Deserialize)]
struct StationsDataResponse {
    body: StationsBody,
}

#[derive(Debug, Deserialize)]
struct StationsBody {
    #[serde(default)]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(flatten)]
    base: RawBaseDevice,
    #[serde(default)]
    modules: Vec<RawModule>,
}

#[derive(Debug, Deserialize)]
struct RawBaseDevice {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    station_name: String,
    #[serde(default)]
    wifi_status: i64,
    #[serde(default)]
    firmware: i64,
    dashboard_data: Option<RawDashboard>,
}

#[derive(Debug, Deserialize)]
struct RawModule {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    module_name: String,
    #[serde(default)]
    rf_status: i64,
    #[serde(default)]
    firmware: i64,
    #[serde(default)]
    battery_percent: i64,
    #[serde(default)]
    battery_vp: i64,
    #[serde(default)]
    reachable: bool,
    dashboard_data: Option<RawDashboard>,
}

/// Union of the indoor and outdoor dashboard fields.
#[derive(Debug, Default, Deserialize)]
struct RawDashboard {
    time_utc: Option<i64>,
    #[serde(rename = "AbsolutePressure")]
    absolute_pressure: Option<f64>,
    #[serde(rename = "Noise")]
    noise: Option<i64>,
    #[serde(rename = "Temperature")]
    temperature: Option<f64>,
    temp_trend: Option<String>,
    #[serde(rename = "Humidity")]
    humidity: Option<f64>,
    #[serde(rename = "Pressure")]
    pressure: Option<f64>,
    pressure_trend: Option<String>,
    #[serde(rename = "CO2")]
    co2: Option<i64>,
    date_max_temp: Option<i64>,
    date_min_temp: Option<i64>,
    min_temp: Option<f64>,
    max_temp: Option<f64>,
}
