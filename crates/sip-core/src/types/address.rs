use std::fmt;

use crate::types::param::{find_tag, Param};
use crate::types::uri::Uri;

/// A name-addr as used by To, From, Contact, Route and Record-Route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameAddr {
    pub display_name: Option<String>,
    pub uri: Uri,
    /// Header parameters (outside the angle brackets)
    pub params: Vec<Param>,
}

impl NameAddr {
    pub fn new(uri: Uri) -> Self {
        Self {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.set_tag(tag);
        self
    }

    /// The dialog tag, if one has been assigned
    pub fn tag(&self) -> Option<&str> {
        find_tag(&self.params)
    }

    /// Sets the tag, replacing any existing one.
    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.params.retain(|p| !matches!(p, Param::Tag(_)));
        self.params.push(Param::Tag(tag.into()));
    }

    /// True if this route entry is marked as a loose router (`;lr`).
    pub fn is_loose_route(&self) -> bool {
        self.uri.is_loose_route() || self.params.iter().any(|p| matches!(p, Param::Lr))
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name)?;
        }
        write!(f, "<{}>", self.uri)?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

impl From<Uri> for NameAddr {
    fn from(uri: Uri) -> Self {
        NameAddr::new(uri)
    }
}
