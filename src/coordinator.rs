//! # Coordinator API
//!
//! URL building and reply parsing for the two coordinator endpoints the
//! session consumes:
//!
//! - `GET /auth/devices/request?uuid={id}` → `{"c": "OK", "t": token}`
//! - `GET /mqtt` → `{"c": "OK", "ip": "host:port"}`
//!
//! The coordinator answers `NOT_REGISTERED` with status 401, so token replies
//! are judged by their body, not by their status.

use heapless::String;

use crate::error::AuthError;
use crate::message::WireBody;
use crate::util::{BrokerAddress, MAX_URL_LEN, write_url};

/// Path of the token request endpoint, up to the device id.
pub const TOKEN_PATH: &str = "/auth/devices/request?uuid=";

/// Path of the broker lookup endpoint.
pub const BROKER_PATH: &str = "/mqtt";

/// Size of the buffer coordinator replies are read into.
pub const HTTP_BODY_LEN: usize = 512;

const CODE_OK: &str = "OK";
const CODE_NOT_REGISTERED: &str = "NOT_REGISTERED";

/// Builds the token request URL for `device_id`.
pub fn token_url(tls: bool, host: &str, device_id: &str) -> Option<String<MAX_URL_LEN>> {
    let mut url = write_url(tls, host, TOKEN_PATH)?;
    url.push_str(device_id).ok()?;
    Some(url)
}

/// Builds the broker lookup URL.
pub fn broker_url(tls: bool, host: &str) -> Option<String<MAX_URL_LEN>> {
    write_url(tls, host, BROKER_PATH)
}

/// Parses a token request reply and returns the issued token.
pub fn parse_token_reply(status: u16, body: &[u8]) -> Result<&str, AuthError> {
    let Ok((reply, _)) = serde_json_core::from_slice::<WireBody<'_>>(body) else {
        return Err(if is_success(status) {
            AuthError::MalformedResponse
        } else {
            AuthError::Rejected
        });
    };

    match reply.code {
        Some(CODE_NOT_REGISTERED) => Err(AuthError::NotRegistered),
        Some(CODE_OK) if is_success(status) => match reply.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(AuthError::Rejected),
        },
        _ => Err(AuthError::Rejected),
    }
}

/// Parses a broker lookup reply.
///
/// 401/403 mean the bearer token is no longer accepted.
pub fn parse_broker_reply(status: u16, body: &[u8]) -> Result<BrokerAddress, AuthError> {
    if status == 401 || status == 403 {
        return Err(AuthError::TokenExpired);
    }
    if !is_success(status) {
        return Err(AuthError::Rejected);
    }

    let (reply, _) = serde_json_core::from_slice::<WireBody<'_>>(body)
        .map_err(|_| AuthError::MalformedResponse)?;
    if reply.code != Some(CODE_OK) {
        return Err(AuthError::Rejected);
    }
    reply
        .ip
        .and_then(BrokerAddress::parse)
        .ok_or(AuthError::MalformedResponse)
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
