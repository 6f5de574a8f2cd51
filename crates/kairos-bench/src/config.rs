//! Run configuration loaded from TOML.
//!
//! ```toml
//! scenario = "logistic"
//! end_time = 2.0
//! scheme = "theta"
//! theta = 0.6
//! linear_solver = "bicgstab"
//!
//! [controller]
//! target_tolerance = 1e-3
//! max_growth = 2.0
//! ```
//!
//! Every key except `scenario` is optional and falls back to the
//! scenario's own setting. A `[controller]` or `[newton]` table replaces
//! the scenario's table as a whole; keys omitted inside it take the
//! library defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use kairos_solver::{ControllerConfig, NewtonConfig};
use kairos_types::{KairosError, KairosResult};

use crate::scenarios::{LinearSolverKind, Scenario, ScenarioKind, SchemeKind};

/// User-facing description of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub scenario: ScenarioKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_deltat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SchemeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_solver: Option<LinearSolverKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newton: Option<NewtonConfig>,
}

impl RunConfig {
    /// A config that spells out every setting of `scenario`.
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            scenario: scenario.kind,
            end_time: Some(scenario.end_time),
            initial_deltat: Some(scenario.initial_deltat),
            scheme: Some(scenario.scheme),
            theta: scenario.theta,
            linear_solver: Some(scenario.linear_solver),
            max_steps: Some(scenario.max_steps),
            controller: Some(scenario.controller.clone()),
            newton: Some(scenario.newton.clone()),
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> KairosResult<Self> {
        toml::from_str(text).map_err(|e| KairosError::Serialization(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> KairosResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serializes back to TOML.
    pub fn to_toml_string(&self) -> KairosResult<String> {
        toml::to_string_pretty(self).map_err(|e| KairosError::Serialization(e.to_string()))
    }

    /// Builds the scenario with every override applied, then validates it.
    pub fn to_scenario(&self) -> KairosResult<Scenario> {
        let mut scenario = Scenario::from_kind(self.scenario)?;
        if let Some(end_time) = self.end_time {
            scenario.end_time = end_time;
        }
        if let Some(deltat) = self.initial_deltat {
            scenario.initial_deltat = deltat;
        }
        if let Some(scheme) = self.scheme {
            scenario.scheme = scheme;
        }
        if self.theta.is_some() {
            scenario.theta = self.theta;
        }
        if let Some(kind) = self.linear_solver {
            scenario.linear_solver = kind;
        }
        if let Some(max_steps) = self.max_steps {
            scenario.max_steps = max_steps;
        }
        if let Some(controller) = &self.controller {
            scenario.controller = controller.clone();
        }
        if let Some(newton) = &self.newton {
            scenario.newton = newton.clone();
        }
        scenario.validate()?;
        Ok(scenario)
    }
}
