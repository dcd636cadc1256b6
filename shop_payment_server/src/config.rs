//! Server configuration
//!
//! Everything is read from `SPS_*` environment variables. Missing or invalid values fall back to the defaults, with a
//! log message saying so. The status cache TTL and sweep interval are fixed and not configurable.
use std::{env, net::IpAddr, time::Duration};

use log::*;
use shop_payment_engine::{status_stream::KEEPALIVE_INTERVAL, status_cache::STATUS_TTL, StreamOptions};

const DEFAULT_SPS_HOST: &str = "127.0.0.1";
const DEFAULT_SPS_PORT: u16 = 8370;
const DEFAULT_SPS_DATABASE_URL: &str = "sqlite://data/shop_payments.db";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// If supplied, requests against /webhook endpoints will be checked against this list of gateway IP addresses.
    pub gateway_whitelist: Option<Vec<IpAddr>>,
    /// Time between keepalive comments on an open event stream.
    pub stream_keepalive: Duration,
    /// Event streams that see no status change for this long are closed. `None` keeps them open indefinitely.
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPS_HOST.to_string(),
            port: DEFAULT_SPS_PORT,
            database_url: DEFAULT_SPS_DATABASE_URL.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            gateway_whitelist: None,
            stream_keepalive: KEEPALIVE_INTERVAL,
            stream_idle_timeout: Some(STATUS_TTL),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPS_HOST").ok().unwrap_or_else(|| DEFAULT_SPS_HOST.into());
        let port = env::var("SPS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SPS_PORT. {e} Using the default, {DEFAULT_SPS_PORT}, instead."
                    );
                    DEFAULT_SPS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SPS_PORT);
        let database_url = env::var("SPS_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SPS_DATABASE_URL is not set. Using {DEFAULT_SPS_DATABASE_URL}.");
            DEFAULT_SPS_DATABASE_URL.to_string()
        });
        let use_x_forwarded_for = is_truthy(env::var("SPS_USE_X_FORWARDED_FOR").ok().as_deref());
        let use_forwarded = is_truthy(env::var("SPS_USE_FORWARDED").ok().as_deref());
        let gateway_whitelist = parse_whitelist(env::var("SPS_GATEWAY_IP_WHITELIST").ok().as_deref());
        log_whitelist(&gateway_whitelist);
        let stream_keepalive = env::var("SPS_STREAM_KEEPALIVE")
            .map_err(|_| {
                info!(
                    "🪛️ SPS_STREAM_KEEPALIVE is not set. Using the default value of {}s.",
                    KEEPALIVE_INTERVAL.as_secs()
                )
            })
            .and_then(|s| parse_seconds("SPS_STREAM_KEEPALIVE", &s))
            .ok()
            .filter(|d| {
                let valid = !d.is_zero();
                if !valid {
                    warn!("🪛️ SPS_STREAM_KEEPALIVE cannot be zero. Using the default.");
                }
                valid
            })
            .unwrap_or(KEEPALIVE_INTERVAL);
        let stream_idle_timeout = env::var("SPS_STREAM_IDLE_TIMEOUT")
            .map_err(|_| {
                info!("🪛️ SPS_STREAM_IDLE_TIMEOUT is not set. Using the default value of {}s.", STATUS_TTL.as_secs())
            })
            .and_then(|s| parse_seconds("SPS_STREAM_IDLE_TIMEOUT", &s))
            .map(|d| (!d.is_zero()).then_some(d))
            .unwrap_or(Some(STATUS_TTL));
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            gateway_whitelist,
            stream_keepalive,
            stream_idle_timeout,
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions { keepalive_interval: self.stream_keepalive, idle_timeout: self.stream_idle_timeout }
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

fn parse_seconds(name: &str, value: &str) -> Result<Duration, ()> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| warn!("🪛️ Invalid configuration value for {name}. {e}"))
}

/// `None`, `"none"`, `"false"` and `"0"` all disable the whitelist. Invalid addresses are skipped.
pub fn parse_whitelist(value: Option<&str>) -> Option<Vec<IpAddr>> {
    let s = value?;
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Gateway IP whitelist is disabled. If this is not what you want, set SPS_GATEWAY_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| {
                    warn!("🪛️ Ignoring invalid IP address ({s}) in SPS_GATEWAY_IP_WHITELIST: {e}");
                })
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

fn log_whitelist(whitelist: &Option<Vec<IpAddr>>) {
    match whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The gateway IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 payment webhooks."
            );
        },
        None => {
            info!("🪛️ No gateway IP whitelist is set. Webhooks are accepted from any address.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Gateway IP whitelist: {addrs}");
        },
    }
}
