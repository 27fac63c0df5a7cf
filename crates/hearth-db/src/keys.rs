//! Natural-key normalisation. Every writer and reader of a natural-keyed
//! table must go through these so that equal keys compare equal in SQL.

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Channel names are case-insensitive and treat runs of whitespace as `-`.
pub fn normalize_channel_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Friendships are unordered; store the pair lowest id first.
pub fn friendship_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}
