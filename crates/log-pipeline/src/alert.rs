//! Alert evaluation -- named rules matched against every event.
//!
//! [`AlertEvaluator`] is compiled once from the configured rules and is
//! immutable afterwards, so it can be shared (`Arc`) and evaluated from any
//! task without locking. Evaluation does not depend on the output criteria:
//! every parsed or degraded event is checked.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tailhub_core::config::AlertRuleConfig;
use tailhub_core::types::StructuredEvent;

use crate::error::LogPipelineError;

/// One compiled rule.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: String,
    pub pattern: Regex,
    /// Lower-cased; `None` matches any severity
    pub severity: Option<String>,
    /// `None` matches any source
    pub source_name: Option<String>,
}

impl AlertRule {
    /// Compiles one rule declaration.
    pub fn compile(config: &AlertRuleConfig) -> Result<Self, LogPipelineError> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(LogPipelineError::RuleCompilation {
                rule: config.name.clone(),
                reason: "name is required".to_owned(),
            });
        }
        if config.pattern.trim().is_empty() {
            return Err(LogPipelineError::RuleCompilation {
                rule: name.to_owned(),
                reason: "pattern is required".to_owned(),
            });
        }
        let pattern = Regex::new(&config.pattern).map_err(|e| LogPipelineError::RuleCompilation {
            rule: name.to_owned(),
            reason: format!("invalid pattern: {e}"),
        })?;

        let constraint = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        Ok(Self {
            name: name.to_owned(),
            pattern,
            severity: constraint(&config.severity).map(|s| s.to_lowercase()),
            source_name: constraint(&config.source_name),
        })
    }

    /// Whether this rule fires for `event`.
    pub fn matches(&self, event: &StructuredEvent) -> bool {
        if let Some(severity) = &self.severity
            && !event.severity.eq_ignore_ascii_case(severity)
        {
            return false;
        }
        if let Some(source) = &self.source_name
            && !event.source_name.eq_ignore_ascii_case(source)
        {
            return false;
        }
        self.pattern.is_match(&event.raw) || self.pattern.is_match(&event.message)
    }
}

/// A rule that fired, with the event that triggered it.
#[derive(Debug, Clone)]
pub struct Match {
    pub rule_name: String,
    pub event: Arc<StructuredEvent>,
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ALERT {} source={} message={}",
            self.rule_name, self.event.source_name, self.event.message
        )
    }
}

/// Immutable, ordered rule set.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    rules: Vec<AlertRule>,
}

impl AlertEvaluator {
    /// Compiles every rule; the first bad rule fails construction.
    pub fn new(configs: &[AlertRuleConfig]) -> Result<Self, LogPipelineError> {
        let rules = configs
            .iter()
            .map(AlertRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(rules = rules.len(), "alert rules compiled");
        Ok(Self { rules })
    }

    /// Rules that fire for `event`, in declaration order.
    pub fn evaluate(&self, event: &Arc<StructuredEvent>) -> Vec<Match> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(event))
            .map(|rule| Match {
                rule_name: rule.name.clone(),
                event: Arc::clone(event),
            })
            .collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
