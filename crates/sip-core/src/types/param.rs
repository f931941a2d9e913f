use std::fmt;

/// A generic parameter attached to a URI, name-addr or Via.
///
/// The parameters this stack acts on get their own variant; everything
/// else is carried as [`Param::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// The `branch` parameter, used in Via headers.
    Branch(String),
    /// The `tag` parameter, used in From/To headers for dialog identification.
    Tag(String),
    /// The `lr` parameter (loose routing), a flag parameter used in Route/Record-Route.
    Lr,
    /// Transport parameter.
    Transport(String),
    /// The `received` parameter, used in Via headers to indicate the source IP.
    Received(String),
    /// The `rport` parameter (RFC 3581), with its value once filled in.
    Rport(Option<u16>),
    /// Generic parameter represented as key-value.
    Other(String, Option<String>),
}

impl Param {
    /// The lower-case parameter name
    pub fn name(&self) -> &str {
        match self {
            Param::Branch(_) => "branch",
            Param::Tag(_) => "tag",
            Param::Lr => "lr",
            Param::Transport(_) => "transport",
            Param::Received(_) => "received",
            Param::Rport(_) => "rport",
            Param::Other(name, _) => name,
        }
    }

    /// Parses a single `name[=value]` pair (no leading `;`).
    pub fn parse(s: &str) -> Param {
        let (name, value) = match s.split_once('=') {
            Some((n, v)) => (n.trim(), Some(v.trim())),
            None => (s.trim(), None),
        };
        match (name.to_ascii_lowercase().as_str(), value) {
            ("branch", Some(v)) => Param::Branch(v.to_string()),
            ("tag", Some(v)) => Param::Tag(v.to_string()),
            ("lr", None) => Param::Lr,
            ("transport", Some(v)) => Param::Transport(v.to_string()),
            ("received", Some(v)) => Param::Received(v.to_string()),
            ("rport", None) => Param::Rport(None),
            ("rport", Some(v)) => match v.parse() {
                Ok(port) => Param::Rport(Some(port)),
                Err(_) => Param::Other(name.to_string(), Some(v.to_string())),
            },
            _ => Param::Other(name.to_string(), value.map(str::to_string)),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Branch(val) => write!(f, ";branch={}", val),
            Param::Tag(val) => write!(f, ";tag={}", val),
            Param::Lr => write!(f, ";lr"),
            Param::Transport(val) => write!(f, ";transport={}", val),
            Param::Received(val) => write!(f, ";received={}", val),
            Param::Rport(Some(port)) => write!(f, ";rport={}", port),
            Param::Rport(None) => write!(f, ";rport"),
            Param::Other(name, Some(val)) => write!(f, ";{}={}", name, val),
            Param::Other(name, None) => write!(f, ";{}", name),
        }
    }
}

/// Finds the value of the `tag` parameter in a parameter list.
pub(crate) fn find_tag(params: &[Param]) -> Option<&str> {
    params.iter().find_map(|p| match p {
        Param::Tag(tag) => Some(tag.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_params() {
        assert_eq!(Param::parse("branch=z9hG4bK1"), Param::Branch("z9hG4bK1".into()));
        assert_eq!(Param::parse("lr"), Param::Lr);
        assert_eq!(Param::parse("rport"), Param::Rport(None));
        assert_eq!(Param::parse("rport=5070"), Param::Rport(Some(5070)));
        assert_eq!(
            Param::parse("maddr=10.0.0.1"),
            Param::Other("maddr".into(), Some("10.0.0.1".into()))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Param::Tag("abc".into()).to_string(), ";tag=abc");
        assert_eq!(Param::Lr.to_string(), ";lr");
    }
}
