//! Static monitor configuration: targets, timing and baseline policy.
//!
//! Configuration comes from an optional YAML file. Every field has a default,
//! so an empty file, or no file at all, yields the built-in targets.
//!
//! ```yaml
//! baseline: silent
//! timing:
//!   interval_secs: 60
//!   request_timeout_secs: 25
//!   max_attempts: 2
//!   retry_delay_ms: 1500
//!   pacing_ms: 2000
//! targets:
//!   - url: https://www.quintoandar.com.br/alugar/imovel/leblon-rio-de-janeiro-rj-brasil
//!     label: Leblon
//!     detection:
//!       mode: marker_count
//!       threshold: 5
//! ```

use crate::error::{MonitorError, Result};
use crate::models::{BaselinePolicy, DEFAULT_MARKER, Detection, Target};
use itertools::Itertools;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use std::ops::RangeInclusive;
use url::Url;

/// Accepted per-attempt timeout, in seconds.
const REQUEST_TIMEOUT_SECS: RangeInclusive<u64> = 25..=30;

/// Fixed timing constants for the scheduler and fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub pacing_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            request_timeout_secs: 25,
            max_attempts: 2,
            retry_delay_ms: 1500,
            pacing_ms: 2000,
        }
    }
}

impl Timing {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub baseline: BaselinePolicy,
    pub timing: Timing,
    pub targets: Vec<Target>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baseline: BaselinePolicy::default(),
            timing: Timing::default(),
            targets: default_targets(),
        }
    }
}

/// Kitnet rentals between R$500 and R$3500 in two Rio neighbourhoods.
fn default_targets() -> Vec<Target> {
    vec![
        Target {
            url: "https://www.quintoandar.com.br/alugar/imovel/leblon-rio-de-janeiro-rj-brasil/de-500-a-3500-reais/apartamento/kitnet/1-quartos".to_string(),
            label: "Leblon".to_string(),
            detection: Detection::MarkerCount {
                marker: DEFAULT_MARKER.to_string(),
                threshold: 5,
            },
        },
        Target {
            url: "https://www.quintoandar.com.br/alugar/imovel/ilha-dos-caicaras-lagoa-rio-de-janeiro-rj-brasil/de-500-a-3500-reais/apartamento/kitnet/1-quartos".to_string(),
            label: "Ilha dos Caiçaras".to_string(),
            detection: Detection::MarkerCount {
                marker: DEFAULT_MARKER.to_string(),
                threshold: 1,
            },
        },
    ]
}

impl Config {
    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self> {
        // serde_yaml rejects an empty document; treat it as "all defaults".
        let config: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(text).map_err(|source| MonitorError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(MonitorError::invalid("at least one target is required"));
        }

        for target in &self.targets {
            if target.label.trim().is_empty() {
                return Err(MonitorError::invalid(format!(
                    "target {} has an empty label",
                    target.url
                )));
            }
            let url = Url::parse(&target.url).map_err(|e| {
                MonitorError::invalid(format!("target {}: bad url {}: {e}", target.label, target.url))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(MonitorError::invalid(format!(
                    "target {}: url must be http or https",
                    target.label
                )));
            }
            validate_detection(&target.label, &target.detection)?;
        }

        if let Some(dup) = self.targets.iter().map(|t| t.url.as_str()).duplicates().next() {
            return Err(MonitorError::invalid(format!("duplicate target url {dup}")));
        }

        let t = &self.timing;
        if t.max_attempts == 0 {
            return Err(MonitorError::invalid("timing.max_attempts must be at least 1"));
        }
        if t.interval_secs == 0 {
            return Err(MonitorError::invalid("timing.interval_secs must be at least 1"));
        }
        if !REQUEST_TIMEOUT_SECS.contains(&t.request_timeout_secs) {
            return Err(MonitorError::invalid(format!(
                "timing.request_timeout_secs must be between {} and {}, got {}",
                REQUEST_TIMEOUT_SECS.start(),
                REQUEST_TIMEOUT_SECS.end(),
                t.request_timeout_secs
            )));
        }
        Ok(())
    }
}

fn validate_detection(label: &str, detection: &Detection) -> Result<()> {
    match detection {
        Detection::PhraseAbsence { phrase } if phrase.trim().is_empty() => Err(
            MonitorError::invalid(format!("target {label}: phrase must not be empty")),
        ),
        Detection::MarkerPresence { marker } | Detection::MarkerCount { marker, .. }
            if marker.is_empty() =>
        {
            Err(MonitorError::invalid(format!(
                "target {label}: marker must not be empty"
            )))
        }
        Detection::MarkerCount { threshold: 0, .. } => Err(MonitorError::invalid(format!(
            "target {label}: threshold must be at least 1"
        ))),
        _ => Ok(()),
    }
}

/// Load the configuration file at `path`, or the defaults when `path` is `None`.
#[instrument(level = "info", skip_all)]
pub async fn load(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| MonitorError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })?;
            let config = Config::from_yaml(&text, path)?;
            info!(path = %path.display(), "Loaded configuration file");
            config
        }
        None => {
            let config = Config::default();
            config.validate()?;
            info!("No configuration file given; using built-in targets");
            config
        }
    };

    info!(
        targets = config.targets.len(),
        interval_secs = config.timing.interval_secs,
        max_attempts = config.timing.max_attempts,
        baseline = ?config.baseline,
        "Configuration ready"
    );
    Ok(config)
}
