use std::path::PathBuf;

use thiserror::Error;

/// Failures of the persisted config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine the current working directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("Failed to read config file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize configuration to JSON")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to write config file: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while establishing a session with the token endpoint.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "No parameters for retrieving a refresh token.\n\
         Hint: run `netatmo --clientid <id> --clientsecret <secret> \
         --email <mail> --password <password>`.\n\
         See `netatmo --help` for details."
    )]
    MissingCredentials,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "Token endpoint rejected the request: {0}\n\
         The refresh token may be broken or revoked.\n\
         Hint: run again with --clientid, --clientsecret, --email and --password."
    )]
    TokenEndpoint(String),

    #[error("Failed to reach the token endpoint: {0}")]
    Network(String),

    #[error("Unexpected token endpoint response: {0}")]
    InvalidResponse(String),
}

/// Failures of the bounding-box calculation.
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("Wrong latitude {0}: expected a value in [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Wrong longitude {0}: expected a value in [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("Wrong side length {0}: expected a finite, non-negative number of kilometers")]
    InvalidSide(f64),

    #[error("Refinement steps must be at least 1")]
    InvalidSteps,

    #[error("Distance of {0} m cannot be reached along this axis")]
    Unreachable(f64),
}
