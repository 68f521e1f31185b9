//! Verbose mode keeps the raw documents of the current cycle on disk for inspection.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    dir: Option<PathBuf>,
}

impl Diagnostics {
    pub fn disabled() -> Self {
        Diagnostics { dir: None }
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Diagnostics {
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Drop whatever the previous cycle left behind.
    pub fn reset(&self) {
        if let Some(dir) = &self.dir {
            if dir.exists() {
                if let Err(e) = fs::remove_dir_all(dir) {
                    log::warn!("Unable to clear {}: {}", dir.display(), e);
                }
            }
            if let Err(e) = fs::create_dir_all(dir) {
                log::warn!("Unable to create {}: {}", dir.display(), e);
            }
        }
    }

    /// Store `document` as `<name>.json`. Failures are logged and otherwise ignored.
    pub fn record(&self, name: &str, document: &Value) {
        let dir = match &self.dir {
            Some(dir) => dir,
            None => return,
        };

        let pretty = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
        log::debug!("{}\n{}", name, pretty);

        let path = dir.join(format!("{}.json", name));
        if let Err(e) = fs::write(&path, pretty) {
            log::warn!("Unable to write {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sunsynk-rs-{}-{}", name, std::process::id()))
    }

    #[test]
    fn records_and_resets() {
        let dir = scratch("diagnostics");
        let diagnostics = Diagnostics::new(&dir);
        diagnostics.reset();

        diagnostics.record("123456_battery", &json!({"data": {"soc": 76}}));
        let written = fs::read_to_string(dir.join("123456_battery.json")).unwrap();
        assert!(written.contains("\"soc\": 76"));

        diagnostics.reset();
        assert!(dir.exists());
        assert!(!dir.join("123456_battery.json").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn disabled_writes_nothing() {
        let diagnostics = Diagnostics::disabled();
        diagnostics.reset();
        diagnostics.record("ignored", &json!({}));
        assert!(diagnostics.dir().is_none());
    }
}
