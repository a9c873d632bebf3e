//! Status codes carried on the wire.
//!
//! Pairing endpoints report failures as a one-byte TLV error code, while the
//! JSON accessory endpoints use the signed HAP status integers.

/// Error codes sent in the `Error` TLV of a pairing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvErrorCode {
    Unknown = 0x01,
    Authentication = 0x02,
    Backoff = 0x03,
    MaxPeers = 0x04,
    MaxTries = 0x05,
    Unavailable = 0x06,
    Busy = 0x07,
}

impl TlvErrorCode {
    /// Convert from a received byte. Unassigned values yield `None`.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Unknown),
            0x02 => Some(Self::Authentication),
            0x03 => Some(Self::Backoff),
            0x04 => Some(Self::MaxPeers),
            0x05 => Some(Self::MaxTries),
            0x06 => Some(Self::Unavailable),
            0x07 => Some(Self::Busy),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Unknown => "Generic error",
            Self::Authentication => "Setup code or signature verification failed",
            Self::Backoff => "Client must look at retry delay",
            Self::MaxPeers => "Server cannot accept any more pairings",
            Self::MaxTries => "Server reached its maximum number of authentication attempts",
            Self::Unavailable => "Server pairing method is unavailable",
            Self::Busy => "Server is busy with another pairing",
        }
    }
}

/// Status codes returned in JSON bodies of accessory endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HapStatus {
    Success,
    InsufficientPrivileges,
    ServiceCommunicationFailure,
    ResourceBusy,
    ReadOnly,
    WriteOnly,
    NotificationNotSupported,
    OutOfResource,
    Timeout,
    ResourceDoesNotExist,
    InvalidValue,
    InsufficientAuthorization,
}

impl HapStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InsufficientPrivileges => -70401,
            Self::ServiceCommunicationFailure => -70402,
            Self::ResourceBusy => -70403,
            Self::ReadOnly => -70404,
            Self::WriteOnly => -70405,
            Self::NotificationNotSupported => -70406,
            Self::OutOfResource => -70407,
            Self::Timeout => -70408,
            Self::ResourceDoesNotExist => -70409,
            Self::InvalidValue => -70410,
            Self::InsufficientAuthorization => -70411,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let all = [
            Self::Success,
            Self::InsufficientPrivileges,
            Self::ServiceCommunicationFailure,
            Self::ResourceBusy,
            Self::ReadOnly,
            Self::WriteOnly,
            Self::NotificationNotSupported,
            Self::OutOfResource,
            Self::Timeout,
            Self::ResourceDoesNotExist,
            Self::InvalidValue,
            Self::InsufficientAuthorization,
        ];
        all.into_iter().find(|s| s.code() == code)
    }
}
