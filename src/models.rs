//! Data models for monitored targets and their observed state.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Target`]: One monitored listing page and how to read it
//! - [`Detection`]: The strategy used to turn a page into a [`Signal`]
//! - [`Signal`]: The result of one successful check
//! - [`TargetState`]: What the monitor remembers about a target between cycles
//!
//! Every signal uses the same polarity: `active` means listings are available.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker found once per listing card on the result pages we watch.
pub const DEFAULT_MARKER: &str = "cozy__cardrow-container";

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

/// A single listing page to watch.
///
/// Targets are loaded once at startup and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Target {
    /// The page URL, also used as the state key.
    pub url: String,
    /// Human-readable name used in notifications.
    pub label: String,
    /// How to decide whether listings are available.
    pub detection: Detection,
}

impl Target {
    /// The minimum count, for strategies that have one.
    pub fn threshold(&self) -> Option<u32> {
        match self.detection {
            Detection::MarkerCount { threshold, .. } => Some(threshold),
            _ => None,
        }
    }
}

/// Detection strategy for a target.
///
/// In YAML the strategy is tagged by `mode`:
///
/// ```yaml
/// detection:
///   mode: marker_count
///   threshold: 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Detection {
    /// Listings are available while the visible text does not contain `phrase`
    /// (typically a "no results" message).
    PhraseAbsence { phrase: String },
    /// Listings are available while the markup contains `marker`.
    MarkerPresence {
        #[serde(default = "default_marker")]
        marker: String,
    },
    /// Listings are available while `marker` appears at least `threshold` times.
    MarkerCount {
        #[serde(default = "default_marker")]
        marker: String,
        threshold: u32,
    },
}

/// Outcome of applying a [`Detection`] to one fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub active: bool,
    pub count: u32,
}

/// What the monitor remembers about one target.
///
/// `last_signal` is `None` until the first successful check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetState {
    pub last_signal: Option<bool>,
    pub last_count: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Whether leaving the Unknown state sends a notification.
///
/// Applies to every target alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// Record the first observation without telling anyone.
    #[default]
    Silent,
    /// Report the first observation like any other transition.
    Announce,
}

/// Row of the `/status` report.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub label: String,
    pub url: String,
    #[serde(flatten)]
    pub state: TargetState,
}
