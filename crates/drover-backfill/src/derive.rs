//! Stock derivation: URL-safe slugs from display titles.

/// Lowercase the input and join alphanumeric runs with single dashes.
///
/// Deterministic: equal inputs always produce equal slugs, which is what
/// makes a slug backfill idempotent.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}
