//! Body and tag checks that need no network access.

use super::verdict::{RejectReason, StageResult};
use crate::models::{Candidate, ContentConfig};
use regex::Regex;

/// Line-level diff marker left in bodies edited through a patch.
const PATCH_MARKER: &str = "@@ ";

/// Markdown/HTML stripper used before word counting and language detection.
pub struct FormattingRemover {
    rules: Vec<(Regex, &'static str)>,
}

impl FormattingRemover {
    pub fn new() -> Result<Self, regex::Error> {
        // Order matters: whole blocks go before the generic tag rule
        let rules = [
            (r"(?s)<!--.*?-->", ""),
            (r"(?is)<script[^>]*>.*?</script>", ""),
            (r"(?is)<style[^>]*>.*?</style>", ""),
            (r"(?m)^#{1,6} (.*)$", "$1"),
            (r"!\[[^\]]*\]\([^)]*\)", ""),
            (r"\*\*(.*?)\*\*", "$1"),
            (r"\*(.*?)\*", "$1"),
            (r"\[(.*?)\]\((.*?)\)", "$1"),
            (r"!\w+\.\w+", ""),
            (r"<[^>]*>", ""),
        ];

        let rules = rules
            .into_iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, replacement)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    pub fn strip(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, (re, replacement)| {
                re.replace_all(&acc, *replacement).into_owned()
            })
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn has_patch_marker(body: &str) -> bool {
    body.contains(PATCH_MARKER)
}

/// Tag, length and tag-count rules.
pub struct ContentRules {
    config: ContentConfig,
}

impl ContentRules {
    pub fn new(config: ContentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContentConfig {
        &self.config
    }

    pub fn check_blacklisted_tags(&self, candidate: &Candidate) -> StageResult {
        match candidate
            .tags
            .iter()
            .find(|tag| contains_tag(&self.config.blacklisted_tags, tag))
        {
            Some(tag) => Err(RejectReason::BlacklistedTag(tag.clone())),
            None => Ok(()),
        }
    }

    pub fn check_required_tags(&self, candidate: &Candidate) -> StageResult {
        if self.config.required_tags.is_empty()
            || candidate
                .tags
                .iter()
                .any(|tag| contains_tag(&self.config.required_tags, tag))
        {
            Ok(())
        } else {
            Err(RejectReason::MissingRequiredTag)
        }
    }

    /// `plain_body` must already be stripped of formatting.
    pub fn check_length(&self, plain_body: &str) -> StageResult {
        let words = word_count(plain_body);
        if words < self.config.min_words {
            return Err(RejectReason::TooShort {
                words,
                min: self.config.min_words,
            });
        }
        Ok(())
    }

    pub fn check_tag_count(&self, candidate: &Candidate) -> StageResult {
        match self.config.max_tags {
            Some(max) if candidate.tags.len() > max => Err(RejectReason::TooManyTags {
                count: candidate.tags.len(),
                max,
            }),
            _ => Ok(()),
        }
    }
}

fn contains_tag(list: &[String], tag: &str) -> bool {
    list.iter().any(|t| t.eq_ignore_ascii_case(tag))
}
