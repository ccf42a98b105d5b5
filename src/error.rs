//! # Error Types
//!
//! This module defines the error types used throughout the session library,
//! from storage and coordinator failures to pub/sub connection refusals.
//!
//! Nothing here is fatal to the host: every fallible operation returns one of
//! these values and the caller decides when to retry.

/// The primary error enum for the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// `tick` or a network operation was called before `begin` succeeded.
    NotInitialized,
    /// The broker refused the session for good. No automatic reconnect will be
    /// attempted; the session has to be rebuilt.
    Faulted(ConnectReasonCode),
    /// The options don't fit the fixed-size topic or URL buffers.
    InvalidConfig,
    /// A collaborator below the session layer failed.
    Transport(TransportError),
    /// The coordinator refused or garbled a token-related request.
    Auth(AuthError),
    /// The credential store failed.
    Storage(StorageError),
    /// The pub/sub handshake failed.
    Connect(ConnectFailure),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Transport(err)
    }
}

impl From<AuthError> for SessionError {
    fn from(err: AuthError) -> Self {
        SessionError::Auth(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}

impl From<ConnectFailure> for SessionError {
    fn from(err: ConnectFailure) -> Self {
        SessionError::Connect(err)
    }
}

/// Failures reported by the HTTP or pub/sub collaborators.
///
/// The collaborator's own error is logged at the call site and dropped, so the
/// session error stays `Copy` and printable by every log backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The HTTP request could not be completed.
    Http,
    /// A subscription was not accepted.
    Subscribe,
    /// A publish could not be sent.
    Publish,
    /// Servicing pending pub/sub I/O failed.
    Poll,
    /// The pub/sub client is not connected.
    NotConnected,
}

/// Token and coordinator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthError {
    /// The coordinator knows the device but it has not been registered yet.
    /// The persisted token has been erased.
    NotRegistered,
    /// The coordinator answered with a code other than `OK`, or without a token.
    Rejected,
    /// The bearer token was refused by a token-authenticated endpoint.
    TokenExpired,
    /// The response body was not the expected JSON object.
    MalformedResponse,
    /// The issued token does not fit the in-memory token buffer.
    TokenTooLong,
}

/// Failures of the persistent key/value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The key is longer than the slot's key field.
    KeyTooLong,
    /// The value is longer than the slot's value field.
    ValueTooLong,
    /// The key is empty or contains a NUL byte.
    InvalidKey,
    /// Every slot is occupied.
    Full,
    /// No slot holds the key.
    NotFound,
    /// The backing storage is smaller than the configured region.
    RegionTooSmall,
    /// A slot holds bytes that are not a valid entry.
    InvalidData,
    /// The storage driver reported an error.
    Backend,
}

/// Why a pub/sub connect attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectFailure {
    /// The broker answered the handshake with a refusal.
    Refused(ConnectReasonCode),
    /// The broker did not answer in time.
    Timeout,
    /// The connection broke during the handshake.
    ConnectionLost,
    /// The network connection could not be opened.
    Failed,
}

impl ConnectFailure {
    /// Returns `true` if retrying with the same identity can never succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            ConnectFailure::Refused(code) => code.is_permanent(),
            ConnectFailure::Timeout | ConnectFailure::ConnectionLost | ConnectFailure::Failed => {
                false
            }
        }
    }
}

/// Represents the reason codes for a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success = 0,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not valid.
    IdentifierRejected = 2,
    /// The broker is unavailable.
    ServerUnavailable = 3,
    /// The username or password is not valid.
    BadUserNameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl ConnectReasonCode {
    /// Refusals that mean the device identity or protocol is wrong, not that
    /// the broker is having a bad day.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ConnectReasonCode::UnacceptableProtocolVersion
                | ConnectReasonCode::IdentifierRejected
                | ConnectReasonCode::BadUserNameOrPassword
                | ConnectReasonCode::NotAuthorized
        )
    }
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// A packet body that could not be decoded.
///
/// Never surfaced to the caller: the message is still queued with its raw
/// payload and empty decoded fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The payload is not a JSON object.
    Malformed,
    /// A decoded field does not fit its buffer.
    FieldTooLong,
}
