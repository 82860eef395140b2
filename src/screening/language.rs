//! Language identification.

/// Detects the language of a text as an ISO 639-3 code.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

/// Trigram detector backed by `whatlang`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        whatlang::detect(text).map(|info| info.lang().code().to_string())
    }
}

/// Whether both body and title are in one of `targets`.
///
/// Returns the first offending detection on mismatch (`None` when undetectable).
pub fn language_mismatch(
    detector: &dyn LanguageDetector,
    targets: &[String],
    body: &str,
    title: &str,
) -> Result<(), Option<String>> {
    for text in [body, title] {
        let detected = detector.detect(text);
        let accepted = detected
            .as_deref()
            .is_some_and(|code| targets.iter().any(|t| t.eq_ignore_ascii_case(code)));
        if !accepted {
            return Err(detected);
        }
    }
    Ok(())
}
