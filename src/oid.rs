//! Object ID (OID) - the content hash that names a stored object.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::Error;

/// Opaque content-hash identifier.
///
/// The server treats it as a lookup key, so the client does not assume a
/// particular hash length. It is restricted to characters that can be
/// appended to a URL path as a single segment.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(String);

impl Oid {
    /// Validate and wrap an OID string.
    ///
    /// The string is taken as is; surrounding whitespace is an error.
    pub fn new(oid: &str) -> Result<Self, Error> {
        if oid.is_empty() {
            return Err(Error::InvalidOid("empty OID".into()));
        }
        if oid == "." || oid == ".." {
            return Err(Error::InvalidOid(format!("reserved name {:?}", oid)));
        }
        if let Some(c) = oid
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(Error::InvalidOid(format!(
                "unexpected character {:?} in {:?}",
                c, oid
            )));
        }
        Ok(Oid(oid.to_string()))
    }

    /// Take the OID from the final component of a local object path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .ok_or_else(|| Error::InvalidOid(format!("no file name in {}", path.display())))?;
        let name = name
            .to_str()
            .ok_or_else(|| Error::InvalidOid(format!("non UTF-8 path {}", path.display())))?;
        Oid::new(name)
    }

    /// Compute the OID (SHA256 hash) of content.
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Oid(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Oid::new(s)
    }
}
