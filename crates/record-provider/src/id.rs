//! Document id helpers

use std::fmt;

/// Sentinel asking the service to generate the id itself.
const UNIQUE: &str = "unique()";

/// A document id to send with a create call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id(String);

impl Id {
    /// Let the service generate a unique id.
    pub fn unique() -> Self {
        Id(UNIQUE.to_string())
    }

    /// Use a caller-chosen id.
    pub fn custom(id: impl Into<String>) -> Self {
        Id(id.into())
    }

    /// True if this is the server-generated sentinel.
    pub fn is_unique(&self) -> bool {
        self.0 == UNIQUE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}
