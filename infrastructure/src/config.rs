use std::env;
use tracing::{info, warn};

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "localhost:27017";

const ADDRESS_VAR: &str = "ENTRY_STORE_ADDRESS";
const APP_NAME_VAR: &str = "ENTRY_STORE_APP_NAME";

/// Options for a store client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// `host:port` of the store to connect to.
    pub address: String,
    /// Name reported to the store for diagnostics.
    pub app_name: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            app_name: None,
        }
    }
}

impl ClientOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            app_name: None,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Reads `ENTRY_STORE_ADDRESS` and `ENTRY_STORE_APP_NAME`, falling back to
    /// the defaults when unset or empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let address = match lookup(ADDRESS_VAR) {
            Some(address) if !address.trim().is_empty() => {
                info!("Using store address {} from environment variable {}.", address, ADDRESS_VAR);
                address.trim().to_string()
            }
            Some(_) => {
                warn!(
                    "Empty {} value in environment. Using default address {}.",
                    ADDRESS_VAR, DEFAULT_ADDRESS
                );
                DEFAULT_ADDRESS.to_string()
            }
            None => {
                info!(
                    "{} environment variable not set. Using default address {}.",
                    ADDRESS_VAR, DEFAULT_ADDRESS
                );
                DEFAULT_ADDRESS.to_string()
            }
        };

        let app_name = lookup(APP_NAME_VAR)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Self { address, app_name }
    }
}
