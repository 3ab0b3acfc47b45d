//! Configuration for the staking report

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Input path meaning "read the payload from stdin".
pub const STDIN_INPUT: &str = "-";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// Payload path, or `-` for stdin
    #[serde(default = "default_input")]
    pub input: String,
    /// Pretty-print the JSON report
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            pretty: default_pretty(),
        }
    }
}

fn default_input() -> String {
    STDIN_INPUT.to_string()
}

fn default_pretty() -> bool {
    true
}

impl ReportConfig {
    pub fn reads_stdin(&self) -> bool {
        self.input.is_empty() || self.input == STDIN_INPUT
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("report.input", default_input())?
            .set_default("report.pretty", default_pretty())?
            // Load from config file if it exists
            .add_source(File::with_name("staking-report").required(false))
            // Override with environment variables (STAKING_REPORT__REPORT__PRETTY, etc.)
            .add_source(
                Environment::with_prefix("STAKING_REPORT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
