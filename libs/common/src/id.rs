use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = accounts_common::id::prefixed_ulid("usr");
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types whose identity is a prefixed ULID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
}

/// Returns `true` if `id` looks like an ID minted with `prefix`.
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.split_once('_')
        .is_some_and(|(p, rest)| p == prefix && rest.parse::<Ulid>().is_ok())
}
