use regex::Regex;

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 40;

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Portfolio slugs also have a length window.
pub fn is_valid_profile_slug(slug: &str) -> bool {
    (SLUG_MIN_LEN..=SLUG_MAX_LEN).contains(&slug.len()) && is_valid_slug(slug)
}

/// Lowercase, ASCII-only, hyphen-separated form of `text`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.len() > SLUG_MAX_LEN {
        out.truncate(SLUG_MAX_LEN);
        while out.ends_with('-') {
            out.pop();
        }
    }
    out
}
