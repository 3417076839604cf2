//! Terminal tables.

use chrono::{DateTime, Local, Utc};
use netatmo_core::{
    BoundingBox, Place,
    public::Aggregation,
    station::{Station, working_status},
};
use std::fmt;

/// Borderless table with right-aligned cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    fn widths(&self) -> Vec<usize> {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .chain([self.header.len()])
            .max()
            .unwrap_or(0);
        let mut widths = vec![0; columns];
        for row in std::iter::once(&self.header).chain(&self.rows) {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();

        let write_row = |f: &mut fmt::Formatter<'_>, row: &[String]| -> fmt::Result {
            let line = widths
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    format!("{cell:>w$}", w = *w)
                })
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(f, "{}", line.trim_end())
        };

        let header: Vec<String> = self.header.iter().map(|h| h.to_uppercase()).collect();
        write_row(f, &header)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_row(f, &rule)?;
        for row in &self.rows {
            write_row(f, row)?;
        }
        Ok(())
    }
}

const STATION_LABELS: [&str; 13] = [
    "ID",
    "Status",
    "Measurement time",
    "Temperature [C]",
    "Temperature trend",
    "Humidity [%]",
    "Pressure [hPa]",
    "Pressure trend",
    "CO2 [ppm]",
    "Noise [dB]",
    "WifiStatus",
    "Battery [%]",
    "Firmware",
];

/// One column per device: the indoor base station first, then its modules.
pub fn station_table(station: &Station, now: DateTime<Utc>) -> Table {
    let mut columns: Vec<(&str, [String; 13])> = Vec::new();

    for r in &station.inside {
        columns.push((
            "in",
            [
                r.id.clone(),
                working_status(r.time_utc, now).to_string(),
                r.measurement_time.clone().unwrap_or_default(),
                opt_f64(r.temperature, 1),
                r.temp_trend.clone().unwrap_or_default(),
                opt_f64(r.humidity, 1),
                opt_f64(r.pressure, 1),
                r.pressure_trend.clone().unwrap_or_default(),
                opt_i64(r.co2),
                opt_i64(r.noise),
                r.wifi_status.to_string(),
                String::new(),
                r.firmware.to_string(),
            ],
        ));
    }
    for r in &station.outside {
        columns.push((
            "out",
            [
                r.id.clone(),
                working_status(r.time_utc, now).to_string(),
                r.measurement_time.clone().unwrap_or_default(),
                opt_f64(r.temperature, 1),
                r.temp_trend.clone().unwrap_or_default(),
                opt_f64(r.humidity, 1),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                r.rf_status.to_string(),
                r.battery_percent.to_string(),
                r.firmware.to_string(),
            ],
        ));
    }

    let kinds = columns.iter().map(|(kind, _)| *kind);
    let mut table = Table::new(std::iter::once("").chain(kinds));
    for (i, label) in STATION_LABELS.iter().enumerate() {
        let cells = columns.iter().map(|(_, cells)| cells[i].clone());
        table.push_row(std::iter::once(label.to_string()).chain(cells));
    }
    table
}

/// Where the public data came from.
pub fn area_table(now: DateTime<Utc>, place: &Place, area: &BoundingBox) -> Table {
    let mut table = Table::new(["Properties", "Values"]);
    let coord = |v: f64| format!("{v:.10}");

    let time = now
        .with_timezone(&Local)
        .format("%Y%m%d %H:%M:%S %Z")
        .to_string();

    let rows = [
        ("Time", time),
        ("Formatted address", place.formatted_address.clone()),
        ("Center(Latitude)", coord(place.location.lat)),
        ("Center(Longitude)", coord(place.location.lon)),
        ("North east corner(Latitude)", coord(area.north_east.lat)),
        ("North east corner(Longitude)", coord(area.north_east.lon)),
        ("South west corner(Latitude)", coord(area.south_west.lat)),
        ("South west corner(Longitude)", coord(area.south_west.lon)),
    ];
    for (label, value) in rows {
        table.push_row([label.to_string(), value]);
    }
    table
}

pub fn average_table(aggregation: &Aggregation) -> Table {
    let mut table = Table::new(["", "average", "number"]);
    for row in &aggregation.rows {
        table.push_row([
            row.name.clone(),
            row.average
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            row.count.to_string(),
        ]);
    }
    table
}

fn opt_f64(value: Option<f64>, precision: usize) -> String {
    value.map(|v| format!("{v:.precision$}")).unwrap_or_default()
}

fn opt_i64(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
