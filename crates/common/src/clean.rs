/// Normalize a measurement or tag name to a safe token.
///
/// Lowercases the input and replaces every character outside
/// `[a-z0-9_]` with `_`. Total and idempotent, so it can be applied to
/// already-cleaned names without change.
pub fn clean_string(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect()
}
