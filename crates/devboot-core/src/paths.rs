use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_PORT: u16 = 8000;

pub const CONFIG_FILE: &str = "devboot.yaml";
pub const ENV_FILE: &str = ".env";

pub const BACKUP_FILE: &str = "db_dumps/backup.sql";
pub const DATA_EXPORT_FILE: &str = "db_dumps/dumpdata.json";

pub const MODELS_FILE: &str = "models.py";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn env_path(root: &Path) -> PathBuf {
    root.join(ENV_FILE)
}

/// Generated schema source for `app`: `<root>/<app>/models.py`.
pub fn models_path(root: &Path, app: &str) -> PathBuf {
    root.join(app).join(MODELS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(config_path(root), PathBuf::from("/tmp/proj/devboot.yaml"));
        assert_eq!(env_path(root), PathBuf::from("/tmp/proj/.env"));
        assert_eq!(
            models_path(root, "shop"),
            PathBuf::from("/tmp/proj/shop/models.py")
        );
    }
}
