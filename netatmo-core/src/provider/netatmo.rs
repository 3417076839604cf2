use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::{
    auth::{TokenGrant, TokenIssuer},
    error::AuthError,
    model::{MeasureQuery, PublicDataQuery, TokenResponse},
};

use super::{AUTH_TIMEOUT, DATA_TIMEOUT, has_error_key, truncate_body};

pub const DEFAULT_BASE_URL: &str = "https://api.netatmo.com";

/// Client for the Netatmo token endpoint and weather-station API.
#[derive(Debug, Clone)]
pub struct NetatmoClient {
    base_url: String,
    auth_http: Client,
    data_http: Client,
}

impl NetatmoClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let auth_http = Client::builder()
            .timeout(AUTH_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for the token endpoint")?;
        let data_http = Client::builder()
            .timeout(DATA_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for the Netatmo API")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_http,
            data_http,
        })
    }

    /// https://dev.netatmo.com/apidocumentation/weather#getstationsdata
    pub async fn stations_data(&self, access_token: &str) -> Result<String> {
        self.get_api("getstationsdata", access_token, &[]).await
    }

    /// https://dev.netatmo.com/apidocumentation/weather#getmeasure
    pub async fn measure(&self, access_token: &str, query: &MeasureQuery) -> Result<String> {
        let mut params = vec![("device_id", query.device_id.clone())];
        if let Some(module_id) = query.module_id.as_ref().filter(|m| !m.is_empty()) {
            params.push(("module_id", module_id.clone()));
        }
        params.extend([
            ("type", query.types.clone()),
            ("scale", query.scale.clone()),
            ("date_begin", query.date_begin.to_string()),
            ("date_end", query.date_end.to_string()),
            ("limit", query.limit.to_string()),
            ("real_time", query.real_time().to_string()),
        ]);

        self.get_api("getmeasure", access_token, &params).await
    }

    /// https://dev.netatmo.com/apidocumentation/weather#getpublicdata
    pub async fn public_data(
        &self,
        access_token: &str,
        query: &PublicDataQuery,
    ) -> Result<String> {
        let [lat_ne, lon_ne, lat_sw, lon_sw] = query.area.to_array();
        let mut params = vec![
            ("lat_ne", format!("{lat_ne:.15}")),
            ("lon_ne", format!("{lon_ne:.15}")),
            ("lat_sw", format!("{lat_sw:.15}")),
            ("lon_sw", format!("{lon_sw:.15}")),
        ];
        if let Some(required) = query.required_data.as_ref().filter(|r| !r.is_empty()) {
            params.push(("required_data", required.clone()));
        }
        if query.filter {
            params.push(("filter", "true".to_string()));
        }

        self.get_api("getpublicdata", access_token, &params).await
    }

    async fn get_api(
        &self,
        endpoint: &str,
        access_token: &str,
        params: &[(&str, String)],
    ) -> Result<String> {
        let url = format!("{}/api/{endpoint}", self.base_url);
        debug!(%url, "calling Netatmo API");

        let res = self
            .data_http
            .get(&url)
            .query(&[("access_token", access_token)])
            .query(params)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Netatmo ({endpoint})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read Netatmo {endpoint} response body"))?;

        if has_error_key(&body) {
            return Err(anyhow!("Netatmo {endpoint} request failed: {body}"));
        }
        if !status.is_success() {
            return Err(anyhow!(
                "Netatmo {} request failed with status {}: {}",
                endpoint,
                status,
                truncate_body(&body),
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl TokenIssuer for NetatmoClient {
    async fn request_token(&self, grant: &TokenGrant) -> Result<TokenResponse, AuthError> {
        let url = format!("{}/oauth2/token", self.base_url);
        debug!(%url, grant_type = grant.grant_type(), "requesting tokens");

        let res = self
            .auth_http
            .post(&url)
            .form(&grant.form())
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if has_error_key(&body) {
            return Err(AuthError::TokenEndpoint(truncate_body(&body)));
        }
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "status {status}: {}",
                truncate_body(&body)
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}
