//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::LayerResult;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> LayerResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config),
        Some(ConfigAction::Path) => {
            println!("{}", manager.path().display());
            Ok(())
        }
        Some(ConfigAction::Init { force }) => init_config(manager, force).await,
    }
}

fn show_config(config: &Config) -> LayerResult<()> {
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

/// Copy of `config` safe to print
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.storage.api_key.is_some() {
        config.storage.api_key = Some("<redacted>".to_string());
    }
    config
}

async fn init_config(manager: &ConfigManager, force: bool) -> LayerResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn(
            &ctx,
            &format!("Config already exists at {} (use --force to overwrite)", path.display()),
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}
