use devboot_core::paths::CONFIG_FILE;
use std::path::{Path, PathBuf};

const MANAGE_SCRIPT: &str = "manage.py";

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `DEVBOOT_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `devboot.yaml`
/// 3. Walk upward from `cwd` looking for `manage.py`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    find_upward(&cwd, CONFIG_FILE)
        .or_else(|| find_upward(&cwd, MANAGE_SCRIPT))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_file())
        .map(Path::to_path_buf)
}
