use serde::{Deserialize, Serialize};

/// Successful answer of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub scope: Vec<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub expire_in: i64,
}

/// Parameters of a `getmeasure` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureQuery {
    pub device_id: String,
    pub module_id: Option<String>,
    pub scale: String,
    pub types: String,
    pub date_begin: i64,
    pub date_end: i64,
    pub limit: u32,
}

impl MeasureQuery {
    /// Every scale except `max` asks for real-time aggregation.
    pub fn real_time(&self) -> bool {
        self.scale != "max"
    }
}

/// Parameters of a `getpublicdata` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicDataQuery {
    pub area: crate::geo::BoundingBox,
    pub required_data: Option<String>,
    pub filter: bool,
}

/// One geocoding match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub formatted_address: String,
    pub location: crate::geo::Coordinate,
}
