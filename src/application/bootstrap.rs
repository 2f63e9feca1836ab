use crate::infrastructure::config::{AppConfig, ensure_default_config, load_app_config};
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config: AppConfig,
    pub token_path: PathBuf,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_config(&config_dir)?;
    let config = load_app_config(&config_dir)?;
    let token_path = config.token_path(workspace_root);

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config,
        token_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_layout_and_default_config() {
        let dir = tempfile::tempdir().expect("temp dir");

        let result = bootstrap_workspace(dir.path()).expect("bootstrap");

        assert!(dir.path().join("config").join("app.json").exists());
        assert!(dir.path().join("state").is_dir());
        assert!(dir.path().join("logs").is_dir());
        assert_eq!(result.token_path, dir.path().join("state").join("token.txt"));
        assert_eq!(result.config, AppConfig::default());

        bootstrap_workspace(dir.path()).expect("bootstrap is repeatable");
    }
}
