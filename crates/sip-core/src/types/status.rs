use std::fmt;

use serde::{Deserialize, Serialize};

/// A SIP response status code.
///
/// Kept as a plain number so that codes outside the well-known set can be
/// carried through unchanged; [`StatusCode::reason_phrase`] knows the
/// standard phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const TRYING: StatusCode = StatusCode(100);
    pub const RINGING: StatusCode = StatusCode(180);
    pub const OK: StatusCode = StatusCode(200);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const PROXY_AUTHENTICATION_REQUIRED: StatusCode = StatusCode(407);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const REQUEST_TERMINATED: StatusCode = StatusCode(487);

    /// Returns the numeric code
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// 1xx
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.0)
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// 200 and above
    pub fn is_final(&self) -> bool {
        self.0 >= 200
    }

    /// 300 and above
    pub fn is_failure(&self) -> bool {
        self.0 >= 300
    }

    /// Standard reason phrase, or `None` for codes outside the table.
    pub fn reason_phrase(&self) -> Option<&'static str> {
        let reason = match self.0 {
            100 => "Trying",
            180 => "Ringing",
            181 => "Call Is Being Forwarded",
            182 => "Queued",
            183 => "Session Progress",
            200 => "OK",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Moved Temporarily",
            305 => "Use Proxy",
            380 => "Alternative Service",
            400 => "Bad Request",
            401 => "Unauthorized",
            402 => "Payment Required",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            410 => "Gone",
            413 => "Request Entity Too Large",
            414 => "Request-URI Too Long",
            415 => "Unsupported Media Type",
            416 => "Unsupported URI Scheme",
            420 => "Bad Extension",
            421 => "Extension Required",
            423 => "Interval Too Brief",
            480 => "Temporarily Unavailable",
            481 => "Call/Transaction Does Not Exist",
            482 => "Loop Detected",
            483 => "Too Many Hops",
            484 => "Address Incomplete",
            485 => "Ambiguous",
            486 => "Busy Here",
            487 => "Request Terminated",
            488 => "Not Acceptable Here",
            491 => "Request Pending",
            493 => "Undecipherable",
            500 => "Server Internal Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Server Time-out",
            505 => "Version Not Supported",
            513 => "Message Too Large",
            600 => "Busy Everywhere",
            603 => "Decline",
            604 => "Does Not Exist Anywhere",
            606 => "Not Acceptable",
            _ => return None,
        };
        Some(reason)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert!(StatusCode(100).is_provisional());
        assert!(!StatusCode(100).is_final());
        assert!(StatusCode(200).is_success());
        assert!(StatusCode(486).is_failure());
        assert!(StatusCode(603).is_final());
    }

    #[test]
    fn test_reason_table() {
        assert_eq!(StatusCode(100).reason_phrase(), Some("Trying"));
        assert_eq!(StatusCode(481).reason_phrase(), Some("Call/Transaction Does Not Exist"));
        assert_eq!(StatusCode(606).reason_phrase(), Some("Not Acceptable"));
        assert_eq!(StatusCode(499).reason_phrase(), None);
    }
}
