//! Config command - show or create configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::BasinResult;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> BasinResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> BasinResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> BasinResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;

    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    ui::note(
        &ctx,
        "Next",
        "Point [inputs] at your national datasets, then run: basin build <HUC> -o <dir>",
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_writes_defaults_once() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("basin").join("config.toml"));

        init_config(&manager, false).await.unwrap();
        let written = std::fs::read_to_string(manager.path()).unwrap();
        assert!(written.contains("[processing]"));

        std::fs::write(manager.path(), "[general]\nlog_format = \"json\"\n").unwrap();
        init_config(&manager, false).await.unwrap();
        let kept = manager.load().await.unwrap();
        assert_eq!(kept.general.log_format, "json");

        init_config(&manager, true).await.unwrap();
        let reset = manager.load().await.unwrap();
        assert_eq!(reset.general.log_format, "text");
    }
}
