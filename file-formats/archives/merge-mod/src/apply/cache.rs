//! Opened containers shared across documents of one apply session

use crate::Result;
use crate::package::Package;
use crate::update::ScriptSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opened container and its compilation state
#[derive(Debug)]
pub struct CachedPackage {
    /// The container
    pub package: Package,
    /// Compilation context for this container
    pub scripts: ScriptSession,
}

/// Shared handle to a cached container
pub type PackageHandle = Arc<Mutex<CachedPackage>>;

/// Path → opened container
///
/// The map lock is only held for lookups and inserts. Opening a container
/// happens outside it, so two threads may race to open the same file; the
/// first insert wins and the other copy is dropped.
#[derive(Debug, Default)]
pub struct PackageCache {
    packages: Mutex<HashMap<PathBuf, PackageHandle>>,
}

impl PackageCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached container for `path`, opening it with `open` when absent
    pub fn get_or_open<F>(&self, path: &Path, open: F) -> Result<PackageHandle>
    where
        F: FnOnce() -> Result<Package>,
    {
        if let Some(handle) = self.packages.lock().get(path) {
            log::debug!("Reusing cached container {}", path.display());
            return Ok(Arc::clone(handle));
        }

        let package = open()?;
        let handle = Arc::new(Mutex::new(CachedPackage {
            package,
            scripts: ScriptSession::new(),
        }));
        let mut packages = self.packages.lock();
        Ok(Arc::clone(
            packages.entry(path.to_path_buf()).or_insert(handle),
        ))
    }

    /// Cached container, if any
    pub fn get(&self, path: &Path) -> Option<PackageHandle> {
        self.packages.lock().get(path).cloned()
    }

    /// Drop a container from the cache
    pub fn evict(&self, path: &Path) -> Option<PackageHandle> {
        let evicted = self.packages.lock().remove(path);
        if evicted.is_some() {
            log::debug!("Evicted {} from the container cache", path.display());
        }
        evicted
    }

    /// Paths currently cached
    pub fn paths(&self) -> Vec<PathBuf> {
        self.packages.lock().keys().cloned().collect()
    }

    /// Number of cached containers
    pub fn len(&self) -> usize {
        self.packages.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.packages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_open_once_then_reuse() {
        let cache = PackageCache::new();
        let opens = AtomicUsize::new(0);
        let path = Path::new("/game/SFXGame.pcc");
        let open = || {
            opens.fetch_add(1, Ordering::SeqCst);
            Ok(Package::new("SFXGame.pcc"))
        };

        let first = cache.get_or_open(path, open).unwrap();
        let second = cache.get_or_open(path, open).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        assert!(cache.evict(path).is_some());
        assert!(cache.is_empty());
        assert!(cache.evict(path).is_none());
    }

    #[test]
    fn test_failed_open_is_not_cached() {
        let cache = PackageCache::new();
        let path = Path::new("/game/Broken.pcc");
        let result = cache.get_or_open(path, || Err(crate::Error::invalid_format("bad")));
        assert!(result.is_err());
        assert!(cache.get(path).is_none());
    }

    #[test]
    fn test_concurrent_opens_share_one_handle() {
        let cache = Arc::new(PackageCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache
                        .get_or_open(Path::new("/game/Startup_INT.pcc"), || {
                            Ok(Package::new("Startup_INT.pcc"))
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for handle in &results[1..] {
            assert!(Arc::ptr_eq(handle, &results[0]));
        }
        assert_eq!(cache.len(), 1);
    }
}
