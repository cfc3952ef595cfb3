//! PV name handling: `protocol://name` splitting and re-qualification.

use std::fmt;

/// Separator between a protocol prefix and the channel name.
pub const DELIMITER: &str = "://";
/// Protocol assumed when a name carries none.
pub const DEFAULT_PROTOCOL: &str = "ca";

/// A PV name split into protocol and channel parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PvName {
    pub name: String,
    pub protocol: String,
}

impl PvName {
    pub fn new(name: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
        }
    }

    /// Splits `protocol://name`. A leading `=` marks a formula and selects the
    /// `eq` protocol. Names without a delimiter get `default_protocol`.
    pub fn parse(pv_name: &str, default_protocol: &str) -> Self {
        if let Some(formula) = pv_name.strip_prefix('=') {
            return Self::new(formula, "eq");
        }
        // The protocol runs up to the last delimiter.
        match pv_name.rfind(DELIMITER) {
            Some(idx) => Self::new(&pv_name[idx + DELIMITER.len()..], &pv_name[..idx]),
            None => Self::new(pv_name, default_protocol),
        }
    }

    /// `protocol://name`, unless the name is already qualified (after macro
    /// substitution, for example) or is itself a formula.
    pub fn qualified_name(&self) -> String {
        let quoted = self.name.contains('`') || self.name.contains('\'');
        if self.name.contains(DELIMITER) && !quoted {
            self.name.clone()
        } else if self.name.starts_with("eq://") {
            self.name.clone()
        } else if let Some(formula) = self.name.strip_prefix('=') {
            format!("eq://{formula}")
        } else {
            format!("{}{}{}", self.protocol, DELIMITER, self.name)
        }
    }
}

impl fmt::Display for PvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}
