//! Weather data providers
//!
//! Implementations of [`WeatherProvider`] that turn a series request for a
//! polygon centroid into a day-keyed [`geowx_core::WeatherSeries`].

pub mod open_meteo;
pub mod simulator;

pub use open_meteo::*;
pub use simulator::*;

use geowx_core::WeatherProvider;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to fetch polygon weather data: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to fetch polygon weather data: HTTP {status}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to fetch polygon weather data: malformed response: {0}")]
    Malformed(String),

    #[error("Invalid provider endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Build the provider named in configuration
pub fn build_provider(kind: &str, base_url: &str) -> ProviderResult<Arc<dyn WeatherProvider>> {
    match kind {
        "open-meteo" => Ok(Arc::new(OpenMeteoProvider::new(base_url)?)),
        "simulator" => Ok(Arc::new(SimulatorProvider::new())),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
