//! Core library for the `netatmo` CLI.
//!
//! This crate defines:
//! - Persisted credentials and the access-token lifecycle
//! - The square search area used for public weather data
//! - HTTP clients for Netatmo and Google geocoding
//! - Decoding of station and public payloads
//!
//! It is used by `netatmo-cli`, but can also be reused by other binaries or services.

pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod model;
pub mod provider;
pub mod public;
pub mod station;

pub use auth::{
    Credential, Invocation, Session, SessionManager, SessionState, TokenGrant, TokenIssuer,
};
pub use config::{CredentialStore, PersistedConfig, TokenSet};
pub use error::{AuthError, ConfigError, GeoError};
pub use geo::{BoundingBox, Coordinate, bounding_box};
pub use model::{MeasureQuery, Place, PublicDataQuery, TokenResponse};
pub use provider::{GoogleGeocoder, NetatmoClient};
