use crate::Error;
use std::borrow::Borrow;
use std::fmt;

/// Class name in its JVM binary form (slash separated, eg. `java/lang/Object`)
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BinaryName {
    name: String,
}

impl BinaryName {
    /// Binary name of the root object type
    pub const OBJECT: &'static str = "java/lang/Object";

    /// Validate and wrap a binary name
    ///
    /// Dot-separated source names are not binary names and are rejected, as
    /// is the empty string.
    pub fn from_string(name: String) -> Result<BinaryName, Error> {
        if name.is_empty() || name.contains('.') {
            return Err(Error::BadBinaryName(name));
        }
        Ok(BinaryName { name })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Is this the root object type (the one class with no superclass)?
    pub fn is_object(&self) -> bool {
        self.name == BinaryName::OBJECT
    }
}

impl Borrow<str> for BinaryName {
    fn borrow(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dotted_and_empty_names() {
        assert!(BinaryName::from_string(String::from("java.lang.Object")).is_err());
        assert!(BinaryName::from_string(String::new()).is_err());
    }

    #[test]
    fn object_is_root() {
        let name = BinaryName::from_string(String::from("java/lang/Object")).unwrap();
        assert!(name.is_object());
        let name = BinaryName::from_string(String::from("Example")).unwrap();
        assert!(!name.is_object());
    }
}
