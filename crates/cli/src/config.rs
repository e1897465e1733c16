//! Configuration management for the CLI

use anyhow::{Context, Result};
use model_lib::PipelineConfig;
use std::path::Path;

/// Environment variable prefix, e.g. `POWER_MODEL_ENERGY_SOURCE=acpi`
const ENV_PREFIX: &str = "POWER_MODEL";

/// Load pipeline configuration from an optional file and the environment
///
/// Environment variables take precedence over the file; list values such as
/// `POWER_MODEL_DYN_TRAINERS` are comma separated.
pub fn load(file: Option<&Path>) -> Result<PipelineConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path).required(true));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("abs_trainers")
                .with_list_parse_key("dyn_trainers")
                .with_list_parse_key("feature_groups"),
        )
        .build()
        .context("Failed to read configuration")?;

    settings
        .try_deserialize()
        .context("Invalid pipeline configuration")
}
