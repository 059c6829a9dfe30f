use std::{env, time::Duration};

use crm_common::{parse_boolean_flag, Secret};
use log::*;

use crate::errors::ServerError;

const DEFAULT_CPS_HOST: &str = "127.0.0.1";
const DEFAULT_CPS_PORT: u16 = 8470;
const DEFAULT_MT5_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address,
    /// rather than the connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather
    /// than the connection's remote address.
    pub use_forwarded: bool,
    /// Cregis payment gateway configuration
    pub cregis: CregisConfig,
    /// MT5 bridge configuration
    pub mt5: Mt5Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CPS_HOST.to_string(),
            port: DEFAULT_CPS_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            cregis: CregisConfig::default(),
            mt5: Mt5Config::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CPS_HOST").ok().unwrap_or_else(|| DEFAULT_CPS_HOST.into());
        let port = env::var("CPS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for CPS_PORT. {e} Using the default, {DEFAULT_CPS_PORT}, instead."
                    );
                    DEFAULT_CPS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CPS_PORT);
        let database_url = env::var("CPS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CPS_DATABASE_URL is not set. Please set it to the URL for the CRM database.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("CPS_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("CPS_USE_FORWARDED").ok(), false);
        let cregis = CregisConfig::from_env_or_default();
        let mt5 = Mt5Config::from_env_or_default();
        Self { host, port, database_url, use_x_forwarded_for, use_forwarded, cregis, mt5 }
    }
}

//-------------------------------------------------  CregisConfig  -----------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct CregisConfig {
    /// The shared secret used to verify callback signatures. Trust in the webhook endpoint rests
    /// entirely on this value; there is no other authentication on the callback path.
    pub callback_secret: Secret<String>,
}

impl CregisConfig {
    pub fn from_env_or_default() -> Self {
        let callback_secret = env::var("CPS_CREGIS_CALLBACK_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ CPS_CREGIS_CALLBACK_SECRET is not set. Incoming gateway callbacks will ALL fail signature \
                 verification until it is configured."
            );
            String::default()
        });
        Self { callback_secret: Secret::new(callback_secret) }
    }
}

//-------------------------------------------------  Mt5Config  --------------------------------------------------------
#[derive(Clone, Debug)]
pub struct Mt5Config {
    /// Base URL of the MT5 manager bridge, e.g. "https://mt5-bridge.internal:8443"
    pub api_url: String,
    pub api_token: Secret<String>,
    /// Bounded timeout for balance-crediting calls. On expiry the deposit stays Approved and the
    /// credit is retried later.
    pub timeout: Duration,
}

impl Default for Mt5Config {
    fn default() -> Self {
        Self { api_url: String::default(), api_token: Secret::default(), timeout: DEFAULT_MT5_TIMEOUT }
    }
}

impl Mt5Config {
    pub fn from_env_or_default() -> Self {
        let api_url = env::var("CPS_MT5_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .ok()
            .unwrap_or_else(|| {
                error!("🪛️ CPS_MT5_API_URL is not set. Balance crediting calls will fail until it is configured.");
                String::default()
            });
        let api_token = Secret::new(env::var("CPS_MT5_API_TOKEN").ok().unwrap_or_else(|| {
            info!("🪛️ CPS_MT5_API_TOKEN is not set. MT5 requests will be sent without authorization.");
            String::default()
        }));
        let timeout = env::var("CPS_MT5_TIMEOUT_SECS")
            .map_err(|_| {
                info!(
                    "🪛️ CPS_MT5_TIMEOUT_SECS is not set. Using the default value of {} s.",
                    DEFAULT_MT5_TIMEOUT.as_secs()
                )
            })
            .and_then(|s| {
                s.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for CPS_MT5_TIMEOUT_SECS. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_MT5_TIMEOUT);
        Self { api_url, api_token, timeout }
    }
}

//-------------------------------------------------  ProxyOptions  -----------------------------------------------------
/// The subset of the server configuration that request handlers need for resolving the remote
/// peer. Kept as small as possible, and excludes secrets, to avoid passing sensitive information
/// around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ProxyOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

impl ServerConfig {
    /// Fail fast on a configuration that cannot possibly serve traffic.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.database_url.is_empty() {
            return Err(ServerError::ConfigurationError("CPS_DATABASE_URL must be set".to_string()));
        }
        Ok(())
    }
}
