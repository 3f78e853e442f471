//! Local object store.
//!
//! Uploads read object content through an [`ObjectStore`]; the stock
//! [`LocalObjectStore`] keeps objects under `.git/media/objects/`.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::Oid;

/// An opened object ready to be streamed.
pub struct StoredObject {
    pub reader: Box<dyn Read + Send>,
    pub size: u64,
}

/// Read access to locally stored objects.
pub trait ObjectStore: Send + Sync {
    /// Open an object for reading.
    fn open(&self, oid: &Oid) -> io::Result<StoredObject>;

    /// Size of an object in bytes.
    fn size(&self, oid: &Oid) -> io::Result<u64> {
        Ok(self.open(oid)?.size)
    }
}

/// Objects on disk, laid out as `<base>/<oid[0:2]>/<oid[2:4]>/<oid>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        LocalObjectStore {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// The store for a repository's `.git/media/objects` directory.
    pub fn for_repo<P: AsRef<Path>>(git_dir: P) -> Self {
        Self::new(git_dir.as_ref().join("media").join("objects"))
    }

    /// Get the path where an object with the given OID would be stored.
    ///
    /// OIDs of four characters or fewer are stored directly under the base.
    pub fn object_path(&self, oid: &Oid) -> PathBuf {
        let id = oid.as_str();
        match (id.get(0..2), id.get(2..4)) {
            (Some(a), Some(b)) if id.len() > 4 => self.base_path.join(a).join(b).join(id),
            _ => self.base_path.join(id),
        }
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.object_path(oid).is_file()
    }

    /// Store `content` under its SHA256 OID.
    ///
    /// Written to a temp file and renamed into place.
    pub fn put(&self, content: &[u8]) -> io::Result<Oid> {
        let oid = Oid::from_content(content);
        let path = self.object_path(&oid);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(content)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;

        Ok(oid)
    }
}

impl ObjectStore for LocalObjectStore {
    fn open(&self, oid: &Oid) -> io::Result<StoredObject> {
        let file = File::open(self.object_path(oid))?;
        let size = file.metadata()?.len();
        Ok(StoredObject {
            reader: Box::new(file),
            size,
        })
    }

    fn size(&self, oid: &Oid) -> io::Result<u64> {
        Ok(fs::metadata(self.object_path(oid))?.len())
    }
}
