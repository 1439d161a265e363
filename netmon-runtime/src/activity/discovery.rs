use super::cadence::Scope;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Scripts found under the callbacks root, split by scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptInventory {
    pub interface: Vec<PathBuf>,
    pub system: Vec<PathBuf>,
}

impl ScriptInventory {
    pub fn is_empty(&self) -> bool {
        self.interface.is_empty() && self.system.is_empty()
    }

    pub fn len(&self) -> usize {
        self.interface.len() + self.system.len()
    }

    pub fn scripts(&self, scope: Scope) -> &[PathBuf] {
        match scope {
            Scope::PerInterface => &self.interface,
            Scope::SystemWide => &self.system,
        }
    }
}

/// Scan `<root>/interface` and `<root>/system` for scripts with `extension`.
///
/// A directory that cannot be read yields an empty inventory for its scope;
/// the caller then sizes the pool to its minimum.
pub fn discover_scripts(root: &Path, extension: &str) -> ScriptInventory {
    ScriptInventory {
        interface: list_scripts(&root.join(Scope::PerInterface.dir_name()), extension),
        system: list_scripts(&root.join(Scope::SystemWide.dir_name()), extension),
    }
}

fn list_scripts(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read scripts directory");
            return Vec::new();
        }
    };

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .collect();
    scripts.sort();

    debug!(dir = %dir.display(), count = scripts.len(), "Discovered scripts");
    scripts
}

/// Size of the worker pool for the given inventories: one thread per script,
/// clamped into `[min_threads, max_threads]`.
pub fn threads_per_pool(
    iface_scripts: &[PathBuf],
    system_scripts: &[PathBuf],
    min_threads: usize,
    max_threads: usize,
) -> usize {
    let min_threads = min_threads.max(1);
    let max_threads = max_threads.max(min_threads);
    (iface_scripts.len() + system_scripts.len()).clamp(min_threads, max_threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_scripts_by_scope_and_extension() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("interface")).unwrap();
        fs::create_dir_all(root.path().join("system")).unwrap();
        fs::write(root.path().join("interface/minute.lua"), "").unwrap();
        fs::write(root.path().join("interface/daily.lua"), "").unwrap();
        fs::write(root.path().join("interface/README.md"), "").unwrap();
        fs::write(root.path().join("system/hourly.lua"), "").unwrap();

        let inventory = discover_scripts(root.path(), "lua");
        assert_eq!(
            inventory.interface,
            vec![
                root.path().join("interface/daily.lua"),
                root.path().join("interface/minute.lua"),
            ]
        );
        assert_eq!(inventory.system, vec![root.path().join("system/hourly.lua")]);
        assert_eq!(inventory.len(), 3);
    }

    #[test]
    fn missing_root_yields_empty_inventory() {
        let inventory = discover_scripts(Path::new("/nonexistent/netmon/callbacks"), "lua");
        assert!(inventory.is_empty());
    }

    #[test]
    fn pool_size_is_clamped() {
        let scripts: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("{i}.lua"))).collect();
        assert_eq!(threads_per_pool(&[], &[], 2, 8), 2);
        assert_eq!(threads_per_pool(&scripts[..3], &scripts[..2], 2, 8), 5);
        assert_eq!(threads_per_pool(&scripts, &scripts, 2, 8), 8);
        assert_eq!(threads_per_pool(&[], &[], 0, 0), 1);
    }
}
