use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Named binary blobs: loader stubs and firmware images.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Resources read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirResources {
    root: PathBuf,
}

impl DirResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLoader for DirResources {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(name);
        std::fs::read(&path).map_err(|err| Error::Resource {
            name: name.to_string(),
            reason: format!("{}: {err}", path.display()),
        })
    }
}

/// Resources held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(name, data);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), data.into());
    }
}

impl ResourceLoader for MemoryResources {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.files.get(name).cloned().ok_or_else(|| Error::Resource {
            name: name.to_string(),
            reason: "not found".to_string(),
        })
    }
}
