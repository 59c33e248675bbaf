use std::fmt;

/// Names a lookup dimension within an [`AttributeLoader`](crate::AttributeLoader),
/// e.g. `"id"` or `"email"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Attribute(String);

impl Attribute {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Attribute {
    fn from(s: &str) -> Self {
        Attribute(s.to_owned())
    }
}

impl From<String> for Attribute {
    fn from(s: String) -> Self {
        Attribute(s)
    }
}

/// Names a domain entity within an [`ObjectAttributeLoader`](crate::ObjectAttributeLoader),
/// e.g. `"account"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectType(String);

impl ObjectType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectType {
    fn from(s: &str) -> Self {
        ObjectType(s.to_owned())
    }
}

impl From<String> for ObjectType {
    fn from(s: String) -> Self {
        ObjectType(s)
    }
}
