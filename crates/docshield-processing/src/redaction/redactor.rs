use std::time::{Duration, Instant};

use regex::RegexBuilder;

use super::literal::replace_literal_ignore_case;
use super::phrases::prepare_phrases;

/// Default time budget for matching a single phrase.
pub const DEFAULT_MATCH_TIMEOUT: Duration = Duration::from_secs(1);

// Compiled program size cap for a single phrase pattern.
const DEFAULT_PATTERN_SIZE_LIMIT: usize = 1024 * 1024;

const MASK_CHAR: char = '*';

/// Redactor settings.
#[derive(Debug, Clone)]
pub struct RedactorConfig {
    /// Budget for compiling and scanning one phrase's pattern.
    pub match_timeout: Duration,
    /// Maximum compiled size of one phrase's pattern, in bytes.
    pub pattern_size_limit: usize,
}

impl Default for RedactorConfig {
    fn default() -> Self {
        Self {
            match_timeout: DEFAULT_MATCH_TIMEOUT,
            pattern_size_limit: DEFAULT_PATTERN_SIZE_LIMIT,
        }
    }
}

impl RedactorConfig {
    pub fn with_match_timeout(mut self, match_timeout: Duration) -> Self {
        self.match_timeout = match_timeout;
        self
    }

    pub fn with_pattern_size_limit(mut self, limit: usize) -> Self {
        self.pattern_size_limit = limit;
        self
    }
}

/// What a redaction pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionReport {
    /// Distinct phrases after trimming and case-insensitive dedup.
    pub phrases_applied: usize,
    /// Total occurrences masked.
    pub replacements: usize,
    /// Phrases that fell back to literal substring replacement.
    pub fallbacks: usize,
}

enum PatternAbort {
    Compile(regex::Error),
    Timeout,
}

/// Masks whole-word, case-insensitive occurrences of phrases in plain text.
///
/// Each occurrence is replaced by `*` repeated once per character of the
/// phrase. Phrases are applied one after the other to the progressively
/// masked buffer, so a later phrase never matches text an earlier one
/// already masked.
///
/// When a phrase's pattern cannot be compiled within the size limit or does
/// not finish scanning within `match_timeout`, that phrase is applied as a
/// literal case-insensitive substring instead, without word boundaries. This
/// may mask more than the whole-word match would, never less.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    config: RedactorConfig,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RedactorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RedactorConfig {
        &self.config
    }

    pub fn redact<S: AsRef<str>>(&self, content: &str, phrases: &[S]) -> String {
        self.redact_with_report(content, phrases).0
    }

    pub fn redact_with_report<S: AsRef<str>>(
        &self,
        content: &str,
        phrases: &[S],
    ) -> (String, RedactionReport) {
        let mut report = RedactionReport::default();
        if content.is_empty() || phrases.is_empty() {
            return (content.to_string(), report);
        }

        let phrases = prepare_phrases(phrases);
        report.phrases_applied = phrases.len();

        let mut buffer = content.to_string();
        for phrase in &phrases {
            let mask: String = std::iter::repeat(MASK_CHAR)
                .take(phrase.chars().count())
                .collect();
            let deadline = Instant::now() + self.config.match_timeout;

            let (next, count) = match self.replace_whole_words(&buffer, phrase, &mask, deadline) {
                Ok(result) => result,
                Err(abort) => {
                    match abort {
                        PatternAbort::Compile(err) => tracing::warn!(
                            phrase_len = phrase.chars().count(),
                            error = %err,
                            "Phrase pattern could not be compiled, using literal match"
                        ),
                        PatternAbort::Timeout => tracing::warn!(
                            phrase_len = phrase.chars().count(),
                            timeout_ms = self.config.match_timeout.as_millis() as u64,
                            "Phrase match timed out, using literal match"
                        ),
                    }
                    report.fallbacks += 1;
                    replace_literal_ignore_case(&buffer, phrase, &mask)
                }
            };

            report.replacements += count;
            buffer = next;
        }

        (buffer, report)
    }

    fn replace_whole_words(
        &self,
        buffer: &str,
        phrase: &str,
        mask: &str,
        deadline: Instant,
    ) -> Result<(String, usize), PatternAbort> {
        // Half boundaries: no word character directly outside the phrase, even
        // when the phrase itself starts or ends with punctuation.
        let pattern = format!(
            r"(?i)\b{{start-half}}{}\b{{end-half}}",
            regex::escape(phrase)
        );
        let regex = RegexBuilder::new(&pattern)
            .size_limit(self.config.pattern_size_limit)
            .build()
            .map_err(PatternAbort::Compile)?;

        let mut output = String::with_capacity(buffer.len());
        let mut last = 0;
        let mut count = 0;

        if Instant::now() >= deadline {
            return Err(PatternAbort::Timeout);
        }
        for found in regex.find_iter(buffer) {
            if Instant::now() >= deadline {
                return Err(PatternAbort::Timeout);
            }
            output.push_str(&buffer[last..found.start()]);
            output.push_str(mask);
            last = found.end();
            count += 1;
        }
        if Instant::now() >= deadline {
            return Err(PatternAbort::Timeout);
        }
        output.push_str(&buffer[last..]);

        Ok((output, count))
    }
}
