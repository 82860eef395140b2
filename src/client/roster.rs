//! Ordered model roster with rate-limit failover.
//!
//! K_i: `current` only ever moves forward, and every model before it has been
//! marked rate-limited, so it never points at an exhausted model while a
//! fresh one remains.

use crate::models::ConfigError;
use tracing::{info, warn};

/// Ordered list of interchangeable models.
#[derive(Debug, Clone)]
pub struct ModelRoster {
    models: Vec<String>,
    current: usize,
    rate_limited: Vec<String>,
}

impl ModelRoster {
    /// Build a roster, dropping blank entries.
    pub fn new<I, S>(models: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| m.as_ref().trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        if models.is_empty() {
            return Err(ConfigError::NoModels);
        }

        info!(models = ?models, "Initialized model roster");
        Ok(Self {
            models,
            current: 0,
            rate_limited: Vec::new(),
        })
    }

    /// Parse a comma-separated list such as `"gemini-2.5-pro, gemini-2.5-flash"`.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        Self::new(list.split(','))
    }

    pub fn current_model(&self) -> &str {
        &self.models[self.current]
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn has_next(&self) -> bool {
        self.current + 1 < self.models.len()
    }

    /// Models marked rate-limited so far, in the order they were marked.
    pub fn rate_limited_models(&self) -> &[String] {
        &self.rate_limited
    }

    /// Mark the current model rate-limited and advance if another remains.
    ///
    /// Returns `true` if the roster switched to a new model.
    pub fn mark_rate_limited(&mut self) -> bool {
        self.record_current();

        if self.has_next() {
            self.current += 1;
            warn!(
                model = %self.current_model(),
                rate_limited = ?self.rate_limited,
                "Switching to next model"
            );
            true
        } else {
            warn!(
                rate_limited = ?self.rate_limited,
                "No more models available"
            );
            false
        }
    }

    /// Record the current model as rate-limited without switching.
    pub fn mark_rate_limited_dry_run(&mut self) {
        self.record_current();
        info!(model = %self.current_model(), "Dry run: not switching model");
    }

    /// Models that served or were tried: rate-limited ones plus the current one.
    pub fn models_used(&self) -> Vec<String> {
        let mut used = self.rate_limited.clone();
        let current = self.current_model();
        if !used.iter().any(|m| m == current) {
            used.push(current.to_string());
        }
        used
    }

    /// Back to the first model with a clean rate-limit record.
    pub fn reset(&mut self) {
        self.current = 0;
        self.rate_limited.clear();
        info!("Model roster reset to first model");
    }

    fn record_current(&mut self) {
        let current = self.models[self.current].clone();
        if !self.rate_limited.contains(&current) {
            self.rate_limited.push(current);
        }
    }
}
