use anyhow::{Context, Result};
use std::path::Path;
use waypost_core::WaypostConfig;

pub async fn load_config(path: &Path) -> Result<WaypostConfig> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .context("Failed to read configuration file")?;

    let config: WaypostConfig = toml::from_str(&contents).context("Failed to parse configuration file")?;

    Ok(config)
}

pub async fn save_config(path: &Path, config: &WaypostConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let contents = toml::to_string_pretty(config).context("Failed to serialize configuration")?;

    tokio::fs::write(path, contents)
        .await
        .context("Failed to write configuration file")?;

    Ok(())
}
