//! Square search areas around a center point.
//!
//! Distances use Hubeny's approximation on the WGS84 ellipsoid. The corners are
//! found numerically: a linear scan outward from the center that is refined by
//! a factor of ten per round.

use serde::{Deserialize, Serialize};

use crate::error::GeoError;

const SEMI_MAJOR_AXIS_M: f64 = 6_378_137.0;
const SEMI_MINOR_AXIS_M: f64 = 6_356_752.314245;

const INITIAL_STEP_DEG: f64 = 0.01;

/// Upper bound of the outward scan. Near the poles a degree of longitude is
/// almost zero meters long and the bound may never be reached.
const MAX_OFFSET_DEG: f64 = 360.0;

/// Refinement rounds used by the CLI, which gives roughly 1e-10 degree precision.
pub const DEFAULT_REFINEMENT_STEPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// North-east and south-west corners of a search area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north_east: Coordinate,
    pub south_west: Coordinate,
}

impl BoundingBox {
    /// `[ne_lat, ne_lon, sw_lat, sw_lon]`
    pub fn to_array(&self) -> [f64; 4] {
        [
            self.north_east.lat,
            self.north_east.lon,
            self.south_west.lat,
            self.south_west.lon,
        ]
    }

    pub fn lat_span(&self) -> f64 {
        self.north_east.lat - self.south_west.lat
    }

    pub fn lon_span(&self) -> f64 {
        self.north_east.lon - self.south_west.lon
    }
}

/// Compute the box of `side_km` kilometers on a side centered on `center`.
///
/// The box is symmetric about the center: `SW = 2 * center - NE` on both axes.
pub fn bounding_box(
    side_km: f64,
    center: Coordinate,
    refinement_steps: u32,
) -> Result<BoundingBox, GeoError> {
    if !(-90.0..=90.0).contains(&center.lat) {
        return Err(GeoError::LatitudeOutOfRange(center.lat));
    }
    if !(-180.0..=180.0).contains(&center.lon) {
        return Err(GeoError::LongitudeOutOfRange(center.lon));
    }
    if !side_km.is_finite() || side_km < 0.0 {
        return Err(GeoError::InvalidSide(side_km));
    }
    if refinement_steps == 0 {
        return Err(GeoError::InvalidSteps);
    }

    let half_side_m = side_km * 500.0;

    let north = find_boundary(half_side_m, center.lat, refinement_steps, |lat| {
        axis_distance(center, Coordinate::new(lat, center.lon))
    })?;
    let east = find_boundary(half_side_m, center.lon, refinement_steps, |lon| {
        axis_distance(center, Coordinate::new(center.lat, lon))
    })?;

    Ok(BoundingBox {
        north_east: Coordinate::new(north, east),
        south_west: Coordinate::new(
            center.lat - (north - center.lat),
            center.lon - (east - center.lon),
        ),
    })
}

/// Hubeny distance in meters between two points that differ in one coordinate only.
fn axis_distance(a: Coordinate, b: Coordinate) -> f64 {
    let e2 = (SEMI_MAJOR_AXIS_M.powi(2) - SEMI_MINOR_AXIS_M.powi(2)) / SEMI_MAJOR_AXIS_M.powi(2);

    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let mean_lat = (lat_a + lat_b) / 2.0;

    let w = (1.0 - e2 * mean_lat.sin().powi(2)).sqrt();
    let meridian_radius = SEMI_MAJOR_AXIS_M * (1.0 - e2) / w.powi(3);
    let prime_vertical_radius = SEMI_MAJOR_AXIS_M / w;

    let dy = (lat_a - lat_b) * meridian_radius;
    let dx = (a.lon.to_radians() - b.lon.to_radians()) * prime_vertical_radius * mean_lat.cos();

    dy.hypot(dx)
}

/// Coarse-to-fine scan for the first offset from `origin` at which `distance`
/// reaches `target`.
fn find_boundary(
    target: f64,
    origin: f64,
    rounds: u32,
    distance: impl Fn(f64) -> f64,
) -> Result<f64, GeoError> {
    let mut step = INITIAL_STEP_DEG;
    let mut start = origin;
    let mut found = origin;

    for _ in 0..rounds {
        let mut last_under = None;
        let mut k = 0u64;

        loop {
            let candidate = start + k as f64 * step;
            if distance(candidate) >= target {
                found = candidate;
                break;
            }
            if candidate - origin > MAX_OFFSET_DEG {
                return Err(GeoError::Unreachable(target));
            }
            last_under = Some(candidate);
            k += 1;
        }

        // the next round restarts from the last point strictly under the bound
        if let Some(under) = last_under {
            start = under;
        }
        step /= 10.0;
    }

    Ok(found)
}
