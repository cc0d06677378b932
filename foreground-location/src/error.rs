use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Errors reported to the host through the session's error channel.
///
/// Every one of them ends the running session; nothing is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum ErrorState {
    #[error("location permission has not been granted")]
    NoLocationPermission,
    #[error("GPS location provider is disabled")]
    GpsOff,
    #[error("network location provider is disabled")]
    NetworkOff,
    #[error("location provider is unavailable")]
    Unknown,
}

impl ErrorState {
    /// Stable numeric code, as handed to integer based error listeners.
    pub fn code(&self) -> u8 {
        match self {
            ErrorState::NoLocationPermission => 0,
            ErrorState::GpsOff => 1,
            ErrorState::NetworkOff => 2,
            ErrorState::Unknown => 3,
        }
    }
}

/// A platform location provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum Provider {
    Gps,
    Network,
    Other(String),
}

impl From<&str> for Provider {
    fn from(name: &str) -> Self {
        match name {
            "gps" => Provider::Gps,
            "network" => Provider::Network,
            other => Provider::Other(other.to_string()),
        }
    }
}

impl From<String> for Provider {
    fn from(name: String) -> Self {
        Provider::from(name.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gps => f.write_str("gps"),
            Provider::Network => f.write_str("network"),
            Provider::Other(name) => f.write_str(name),
        }
    }
}

impl From<&Provider> for ErrorState {
    fn from(provider: &Provider) -> Self {
        match provider {
            Provider::Gps => ErrorState::GpsOff,
            Provider::Network => ErrorState::NetworkOff,
            Provider::Other(_) => ErrorState::Unknown,
        }
    }
}

#[test]
fn test_provider_maps_to_error_state() {
    assert_eq!(ErrorState::from(&Provider::from("gps")), ErrorState::GpsOff);
    assert_eq!(ErrorState::from(&Provider::from("network")), ErrorState::NetworkOff);
    assert_eq!(ErrorState::from(&Provider::from("passive")), ErrorState::Unknown);
    assert_eq!(ErrorState::from(&Provider::from("fused")), ErrorState::Unknown);
}

#[test]
fn test_error_codes_are_stable() {
    let codes: Vec<u8> = [
        ErrorState::NoLocationPermission,
        ErrorState::GpsOff,
        ErrorState::NetworkOff,
        ErrorState::Unknown,
    ]
    .iter()
    .map(ErrorState::code)
    .collect();
    assert_eq!(codes, vec![0, 1, 2, 3]);
}

#[test]
fn test_provider_deserializes_from_name() {
    let providers: Vec<Provider> = serde_json::from_str(r#"["gps", "network", "passive"]"#).unwrap();
    assert_eq!(
        providers,
        vec![Provider::Gps, Provider::Network, Provider::Other("passive".to_string())]
    );
    assert_eq!(providers[2].to_string(), "passive");
}
