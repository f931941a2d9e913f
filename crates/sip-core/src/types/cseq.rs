use std::fmt;

use crate::types::method::Method;

/// CSeq header: sequence number plus the method it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        Self { seq, method }
    }

    /// Same sequence number, different method (CANCEL and failure ACK).
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            seq: self.seq,
            method,
        }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}
