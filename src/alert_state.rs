// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Alert status store capability.
//!
//! Evaluation of alert rules happens elsewhere. That subsystem records the
//! state of each rule through an [`AlertStatusStore`], and this crate reads it
//! back to decorate alert groups and rules it returns.

use crate::model::AlertRuleStatus;

use parking_lot::Mutex;
use std::collections::HashMap;

/// Storage for runtime state of alert rules.
pub trait AlertStatusStore: Send + Sync {
    /// Fetch state of rule, recording the output of `create` if none exists.
    fn alert_get_or_create(
        &self,
        project: &str,
        group: &str,
        rule: &str,
        create: &dyn Fn() -> AlertRuleStatus,
    ) -> Result<AlertRuleStatus, AlertStateError>;

    /// Record new state of rule.
    fn alert_update_state(
        &self,
        project: &str,
        group: &str,
        rule: &str,
        status: AlertRuleStatus,
    ) -> Result<(), AlertStateError>;

    /// Forget state of every rule of group that is not listed in `keep`.
    fn alert_delete_state_not_in_list(
        &self,
        project: &str,
        group: &str,
        keep: &[String],
    ) -> Result<(), AlertStateError>;
}

type RuleKey = (String, String, String);

/// Alert status store held in memory.
#[derive(Debug, Default)]
pub struct MemoryAlertStatusStore {
    states: Mutex<HashMap<RuleKey, AlertRuleStatus>>,
}

impl MemoryAlertStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules with recorded state.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

fn key(project: &str, group: &str, rule: &str) -> RuleKey {
    (project.into(), group.into(), rule.into())
}

impl AlertStatusStore for MemoryAlertStatusStore {
    fn alert_get_or_create(
        &self,
        project: &str,
        group: &str,
        rule: &str,
        create: &dyn Fn() -> AlertRuleStatus,
    ) -> Result<AlertRuleStatus, AlertStateError> {
        let mut states = self.states.lock();
        let status = states
            .entry(key(project, group, rule))
            .or_insert_with(create);
        Ok(status.clone())
    }

    fn alert_update_state(
        &self,
        project: &str,
        group: &str,
        rule: &str,
        status: AlertRuleStatus,
    ) -> Result<(), AlertStateError> {
        self.states.lock().insert(key(project, group, rule), status);
        Ok(())
    }

    fn alert_delete_state_not_in_list(
        &self,
        project: &str,
        group: &str,
        keep: &[String],
    ) -> Result<(), AlertStateError> {
        self.states.lock().retain(|(p, g, rule), _| {
            p != project || g != group || keep.iter().any(|kept| kept == rule)
        });
        Ok(())
    }
}

/// Status store failed to answer.
#[derive(Debug, thiserror::Error)]
#[error("alert status store failure: {0}")]
pub struct AlertStateError(pub String);
