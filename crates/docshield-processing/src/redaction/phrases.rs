use std::collections::HashSet;

/// Trim phrases, drop blank ones and collapse case variants.
///
/// The first occurrence of each phrase (compared lower-cased) is kept and the
/// input order is preserved, since later phrases are applied to text already
/// masked by earlier ones.
pub fn prepare_phrases<S: AsRef<str>>(phrases: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    phrases
        .iter()
        .map(|phrase| phrase.as_ref().trim())
        .filter(|phrase| !phrase.is_empty())
        .filter(|phrase| seen.insert(phrase.to_lowercase()))
        .map(str::to_string)
        .collect()
}
