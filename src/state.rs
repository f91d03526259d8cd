//! Per-target memory and the transition rule.
//!
//! Each target moves between three states: Unknown, inactive and active.
//! Only a successful check can move it, and only a change of `active` counts
//! as a transition. Failed checks never reach this module.

use crate::models::{BaselinePolicy, Signal, Target, TargetState, TargetStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// What [`StateStore::record`] concluded about a new signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First successful check for this target.
    Baseline { active: bool },
    /// Same `active` value as last time.
    Unchanged,
    /// `active` flipped.
    Changed { active: bool },
}

impl Observation {
    /// Whether this observation warrants a message under `policy`.
    pub fn should_notify(self, policy: BaselinePolicy) -> bool {
        match self {
            Observation::Changed { .. } => true,
            Observation::Baseline { .. } => policy == BaselinePolicy::Announce,
            Observation::Unchanged => false,
        }
    }
}

/// Owned map from target URL to [`TargetState`].
///
/// Only successful checks go through [`StateStore::record`]; a failed fetch
/// leaves the entry untouched, so the next success is compared with the last
/// one that actually read the page.
#[derive(Debug, Default)]
pub struct StateStore {
    states: HashMap<String, TargetState>,
}

impl StateStore {
    /// One Unknown entry per target.
    pub fn new(targets: &[Target]) -> Self {
        let states = targets
            .iter()
            .map(|t| (t.url.clone(), TargetState::default()))
            .collect();
        Self { states }
    }

    /// State recorded for `url`.
    ///
    /// # Returns
    ///
    /// `None` for a URL that was never configured or recorded.
    pub fn get(&self, url: &str) -> Option<&TargetState> {
        self.states.get(url)
    }

    /// Store a successful check and classify it against the previous one.
    ///
    /// # Arguments
    ///
    /// * `url` - Key of the checked target
    /// * `signal` - What detection found in this check
    /// * `now` - Time of the check, kept as `last_checked_at`
    ///
    /// # Returns
    ///
    /// [`Observation::Baseline`] on the first record for `url`, then
    /// [`Observation::Changed`] or [`Observation::Unchanged`] depending on
    /// whether `active` differs from the previous record.
    pub fn record(&mut self, url: &str, signal: Signal, now: DateTime<Utc>) -> Observation {
        let state = self.states.entry(url.to_string()).or_default();

        let observation = match state.last_signal {
            None => Observation::Baseline {
                active: signal.active,
            },
            Some(previous) if previous == signal.active => Observation::Unchanged,
            Some(_) => Observation::Changed {
                active: signal.active,
            },
        };

        state.last_signal = Some(signal.active);
        state.last_count = signal.count;
        state.last_checked_at = Some(now);
        observation
    }

    /// Current state of every target, in configuration order.
    pub fn snapshot(&self, targets: &[Target]) -> Vec<TargetStatus> {
        targets
            .iter()
            .map(|t| TargetStatus {
                label: t.label.clone(),
                url: t.url.clone(),
                state: self.get(&t.url).cloned().unwrap_or_default(),
            })
            .collect()
    }
}
