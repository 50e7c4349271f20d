//! Container display-name parsing.
//!
//! The runtime lists container names with a leading separator (`/web`).
//! Legacy link aliases carry a second separator (`/app/db`) and never name
//! the container itself.

/// Separator the runtime puts in front of every container name.
pub const NAME_SEPARATOR: char = '/';

/// Strip the leading separator from a listed name.
///
/// Returns `None` for empty names and link aliases.
pub fn display_name(raw: &str) -> Option<&str> {
    let name = raw.strip_prefix(NAME_SEPARATOR).unwrap_or(raw);
    if name.is_empty() || name.contains(NAME_SEPARATOR) {
        return None;
    }
    Some(name)
}

/// Render a display name the way the runtime lists it.
pub fn listed_name(name: &str) -> String {
    format!("{NAME_SEPARATOR}{name}")
}
