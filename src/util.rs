//! # Formatting Utilities
//!
//! Helpers that turn session data into the fixed-size strings sent over the
//! wire: coordinator URLs, broker addresses, client identifiers and sensor
//! readings. All of them write into `heapless` buffers and report overflow
//! instead of truncating.

use core::fmt::Write;

use heapless::String;
use rand_core::RngCore;

/// Maximum length of a broker host name.
pub const MAX_HOST_LEN: usize = 64;

/// Maximum length of a coordinator URL, query string included.
pub const MAX_URL_LEN: usize = 192;

/// Length of a generated client identifier: `dev-` plus 8 characters.
pub const CLIENT_ID_LEN: usize = 12;

/// Port assumed when the coordinator omits one.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

const CLIENT_ID_PREFIX: &str = "dev-";
const CLIENT_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Broker endpoint as handed out by the coordinator's `/mqtt` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Host name or IP literal.
    pub host: String<MAX_HOST_LEN>,
    /// TCP port.
    pub port: u16,
}

impl BrokerAddress {
    /// Parses `host:port`. A missing port falls back to
    /// [`DEFAULT_BROKER_PORT`]; an empty host, a bad port or a host that does
    /// not fit yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().ok()?),
            None => (s, DEFAULT_BROKER_PORT),
        };
        if host.is_empty() {
            return None;
        }

        let mut owned = String::new();
        owned.push_str(host).ok()?;
        Some(Self { host: owned, port })
    }
}

/// Builds `{scheme}://{host}{path}`.
pub fn write_url(tls: bool, host: &str, path: &str) -> Option<String<MAX_URL_LEN>> {
    let scheme = if tls { "https" } else { "http" };
    let mut url = String::new();
    write!(url, "{scheme}://{host}{path}").ok()?;
    Some(url)
}

/// Generates a fresh `dev-XXXXXXXX` client identifier.
///
/// 62^8 combinations keeps two devices (or two reboots of one device) from
/// kicking each other off the broker.
pub fn generate_client_id<R: RngCore>(rng: &mut R) -> String<CLIENT_ID_LEN> {
    let mut id = String::new();
    let _ = id.push_str(CLIENT_ID_PREFIX);
    while id.len() < CLIENT_ID_LEN {
        let idx = rng.next_u32() as usize % CLIENT_ID_CHARSET.len();
        let _ = id.push(CLIENT_ID_CHARSET[idx] as char);
    }
    id
}

/// Formats a sensor reading with two decimals, the way the coordinator parses it.
pub fn format_reading<const N: usize>(value: f32) -> Option<String<N>> {
    let mut out = String::new();
    write!(out, "{value:.2}").ok()?;
    Some(out)
}
