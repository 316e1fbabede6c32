//! Source reference resolution.
//!
//! Queue rows carry opaque `source_ref` strings rather than paths, so the
//! queue never assumes a particular storage layout. The resolver maps refs
//! to filesystem paths and back; the default implementation treats a ref as
//! a relative path under the managed storage root.

use pixelforge_common::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Maps opaque source refs to filesystem paths and back.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, source_ref: &str) -> Result<PathBuf>;

    fn to_ref(&self, path: &Path) -> Result<String>;
}

/// Resolver mapping refs to paths under a fixed root.
#[derive(Debug, Clone)]
pub struct RootResolver {
    root: PathBuf,
}

impl RootResolver {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl SourceResolver for RootResolver {
    fn resolve(&self, source_ref: &str) -> Result<PathBuf> {
        let rel = Path::new(source_ref);
        // Cheap structural guard; the security validator re-checks the
        // canonical path against the root before anything is read.
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(Error::invalid_input(format!(
                "Source ref must be a relative path without '..': {source_ref}"
            )));
        }
        Ok(self.root.join(rel))
    }

    fn to_ref(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.root).map_err(|_| {
            Error::invalid_input(format!("{} is outside the storage root", path.display()))
        })?;
        Ok(rel.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_joins_root() {
        let resolver = RootResolver::new(PathBuf::from("/data/media"));
        let path = resolver.resolve("2026/08/photo.jpg").unwrap();
        assert_eq!(path, PathBuf::from("/data/media/2026/08/photo.jpg"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let resolver = RootResolver::new(PathBuf::from("/data/media"));
        assert!(resolver.resolve("../etc/passwd").unwrap_err().to_string().contains("relative"));
        assert!(resolver.resolve("a/../../b.jpg").is_err());
        assert!(resolver.resolve("/etc/passwd").is_err());
    }

    #[test]
    fn test_to_ref_roundtrip() {
        let resolver = RootResolver::new(PathBuf::from("/data/media"));
        let path = resolver.resolve("uploads/photo.png").unwrap();
        assert_eq!(resolver.to_ref(&path).unwrap(), "uploads/photo.png");
    }

    #[test]
    fn test_to_ref_outside_root() {
        let resolver = RootResolver::new(PathBuf::from("/data/media"));
        assert!(resolver.to_ref(Path::new("/tmp/photo.png")).is_err());
    }
}
