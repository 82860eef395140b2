//! Prompt assembly for article evaluation.

use crate::models::{ConfigError, LlmConfig};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// System and curation prompts, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
    curation: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, curation: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            curation: curation.into(),
        }
    }

    pub fn load(config: &LlmConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            read_prompt(&config.system_prompt)?,
            read_prompt(&config.curation_prompt)?,
        ))
    }

    /// System prompt with the evaluation date appended.
    pub fn system_for(&self, today: NaiveDate) -> String {
        format!("{}\n\nToday is {}.\n", self.system, today.format("%Y-%m-%d"))
    }

    pub fn user_for(&self, article: &str) -> String {
        format!("{}\n\n## ARTICLE FOR EVALUATION\n\n{}", self.curation, article)
    }

    /// Build the message list, optionally folding the system prompt into the
    /// user turn for models without system-role support.
    pub fn messages(&self, article: &str, today: NaiveDate, merge_system: bool) -> Vec<Message> {
        let system = self.system_for(today);
        let user = self.user_for(article);

        if merge_system {
            vec![Message::user(format!(
                "**SYSTEM INSTRUCTIONS:**\n{system}\n\n**USER REQUEST:**\n{user}"
            ))]
        } else {
            vec![Message::system(system), Message::user(user)]
        }
    }
}

fn read_prompt(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::PromptMissing(path.to_path_buf()))
}
