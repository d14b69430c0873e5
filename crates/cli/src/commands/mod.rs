//! Command implementations.

mod info;
mod ping;
mod run;
mod upload;
mod validate;

pub use info::run_info;
pub use ping::run_ping;
pub use run::run_pipeline;
pub use upload::run_upload;
pub use validate::run_validate;

use config_loader::ConfigLoader;
use contracts::PipelineConfig;
use tracing::info;

use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};

/// Load the configuration file (or defaults), apply overrides and validate
pub(crate) fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()));
            }
            info!(config = %path.display(), "Loading configuration");
            ConfigLoader::load_from_path(path)?
        }
        None => {
            info!("No configuration file given, using defaults");
            PipelineConfig::default()
        }
    };

    args.apply(&mut config);
    ConfigLoader::validate(&config)?;
    Ok(config)
}
