//! Rule and task persistence using JSON file storage

use crate::error::AutomationError;
use crate::model::{Rule, ScheduledTask};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Settings key holding the rule list
pub const RULES_KEY: &str = "autoRules";
/// Settings key holding the task list
pub const TASKS_KEY: &str = "schedTasks";

/// File backing a settings key
#[must_use]
pub fn settings_path(data_dir: &Path, key: &str) -> PathBuf {
    data_dir.join(format!("{key}.json"))
}

/// Load rules; `None` when nothing has been saved
pub async fn load_rules(data_dir: &Path) -> Result<Option<Vec<Rule>>, AutomationError> {
    load_array(&settings_path(data_dir, RULES_KEY)).await
}

/// Save rules
#[allow(clippy::missing_errors_doc)]
pub async fn save_rules(data_dir: &Path, rules: &[Rule]) -> Result<(), AutomationError> {
    save_array(&settings_path(data_dir, RULES_KEY), rules).await
}

/// Forget saved rules so the defaults apply on next load
pub async fn clear_rules(data_dir: &Path) -> Result<(), AutomationError> {
    let path = settings_path(data_dir, RULES_KEY);
    match fs::remove_file(&path).await {
        Ok(()) => {
            tracing::debug!("Removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Load tasks; `None` when nothing has been saved
pub async fn load_tasks(data_dir: &Path) -> Result<Option<Vec<ScheduledTask>>, AutomationError> {
    load_array(&settings_path(data_dir, TASKS_KEY)).await
}

/// Save tasks
#[allow(clippy::missing_errors_doc)]
pub async fn save_tasks(data_dir: &Path, tasks: &[ScheduledTask]) -> Result<(), AutomationError> {
    save_array(&settings_path(data_dir, TASKS_KEY), tasks).await
}

async fn load_array<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>, AutomationError> {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<Vec<T>>(&contents) {
            Ok(items) => {
                tracing::info!("Loaded {} records from {:?}", items.len(), path);
                Ok(Some(items))
            }
            Err(source) => Err(AutomationError::CorruptState {
                path: path.to_path_buf(),
                source,
            }),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No file found at {:?}, using defaults", path);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write atomically: write to temp file, then rename
async fn save_array<T: Serialize>(path: &Path, items: &[T]) -> Result<(), AutomationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(items)?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await?;
    fs::rename(&tmp_path, path).await?;

    tracing::debug!("Saved {} records to {:?}", items.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::Preset;
    use crate::scheduler::default_tasks;

    #[tokio::test]
    async fn test_missing_files_mean_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rules(dir.path()).await.unwrap().is_none());
        assert!(load_tasks(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let rules = Preset::FireSafety.rules();
        save_rules(dir.path(), &rules).await.unwrap();
        save_tasks(dir.path(), &default_tasks()).await.unwrap();

        assert_eq!(load_rules(dir.path()).await.unwrap(), Some(rules));
        assert_eq!(load_tasks(dir.path()).await.unwrap(), Some(default_tasks()));
        assert!(!dir.path().join("autoRules.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(settings_path(dir.path(), TASKS_KEY), "[{\"id\":").unwrap();
        let err = load_tasks(dir.path()).await.unwrap_err();
        assert!(matches!(err, AutomationError::CorruptState { .. }));
    }

    #[tokio::test]
    async fn test_legacy_rule_format() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"[{"id":"custom-1","condition":"temp","operator":">","threshold":"30","action":"purifier_on"}]"#;
        std::fs::write(settings_path(dir.path(), RULES_KEY), json).unwrap();
        let rules = load_rules(dir.path()).await.unwrap().unwrap();
        assert_eq!(rules[0].threshold, crate::model::Threshold::Value(30.0));
    }

    #[tokio::test]
    async fn test_clear_rules() {
        let dir = tempfile::tempdir().unwrap();
        clear_rules(dir.path()).await.unwrap();
        save_rules(dir.path(), &Preset::NightMode.rules()).await.unwrap();
        clear_rules(dir.path()).await.unwrap();
        assert!(load_rules(dir.path()).await.unwrap().is_none());
    }
}
