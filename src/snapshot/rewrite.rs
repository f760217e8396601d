use crate::config::Replacement;

/// Apply literal substitutions in order, returning the rewritten text and
/// the number of occurrences replaced.
///
/// Entries with an empty `from` are ignored.
pub fn apply_replacements(text: &str, replacements: &[Replacement]) -> (String, usize) {
    let mut out = text.to_string();
    let mut count = 0;
    for replacement in replacements {
        if replacement.from.is_empty() {
            continue;
        }
        let hits = out.matches(replacement.from.as_str()).count();
        if hits > 0 {
            out = out.replace(replacement.from.as_str(), &replacement.to);
            count += hits;
        }
    }
    (out, count)
}
