/// Replace every case-insensitive occurrence of `needle` in `haystack` with `mask`.
///
/// No word boundaries are enforced. Occurrences are consumed left to right and
/// never overlap. Returns the new text and the number of replacements.
pub fn replace_literal_ignore_case(haystack: &str, needle: &str, mask: &str) -> (String, usize) {
    let folded: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if folded.is_empty() {
        return (haystack.to_string(), 0);
    }

    let mut output = String::with_capacity(haystack.len());
    let mut replacements = 0;
    let mut rest = haystack;

    while let Some(ch) = rest.chars().next() {
        if let Some(len) = folded_prefix_len(rest, &folded) {
            output.push_str(mask);
            replacements += 1;
            rest = &rest[len..];
        } else {
            output.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }

    (output, replacements)
}

/// Byte length of the prefix of `text` whose lower-case form equals `folded`.
fn folded_prefix_len(text: &str, folded: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (idx, ch) in text.char_indices() {
        for lower in ch.to_lowercase() {
            if matched == folded.len() || lower != folded[matched] {
                return None;
            }
            matched += 1;
        }
        if matched == folded.len() {
            return Some(idx + ch.len_utf8());
        }
    }
    None
}
