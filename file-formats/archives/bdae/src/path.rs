//! Entry-name normalization and hashing
//!
//! Archive entries are indexed by a 32-bit hash of their normalized name:
//! ASCII-lowercased, optionally stripped of its directory path, with a
//! leading `./` removed from query names. Both forward and back slashes are
//! accepted as path separators.
//!
//! # Examples
//!
//! ```
//! use bdae::path::{normalize_name, simple_hash};
//!
//! assert_eq!(normalize_name("./Models/Hero.BDAE", false), "models/hero.bdae");
//! assert_eq!(normalize_name("Models/Hero.BDAE", true), "hero.bdae");
//! assert_eq!(
//!     simple_hash("hero.bdae"),
//!     simple_hash(&normalize_name("HERO.BDAE", false))
//! );
//! ```

/// Fold a name to ASCII lowercase
pub fn fold_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_uppercase() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Strip the directory path, keeping only the simple file name
pub fn strip_path(name: &str) -> &str {
    match name.rfind(['/', '\\']) {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Normalize a name for indexing or lookup
///
/// Strips a leading `./`, folds to lowercase, and removes the directory path
/// when `ignore_paths` is set.
pub fn normalize_name(name: &str, ignore_paths: bool) -> String {
    let name = name.strip_prefix("./").unwrap_or(name);
    let folded = fold_name(name);
    if ignore_paths {
        strip_path(&folded).to_string()
    } else {
        folded
    }
}

/// Simple multiplicative hash over a normalized name
///
/// `hash = hash * 13 + byte`, the scheme the PACK index uses. Collisions are
/// possible and are disambiguated by comparing normalized names.
pub fn simple_hash(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for &b in name.as_bytes() {
        hash = hash.wrapping_mul(13).wrapping_add(u32::from(b));
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fold_name() {
        assert_eq!(fold_name("Hero.BDAE"), "hero.bdae");
        assert_eq!(fold_name("already_lower"), "already_lower");
        // non-ASCII is left alone
        assert_eq!(fold_name("héRO"), "héro");
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(strip_path("a/b/c.txt"), "c.txt");
        assert_eq!(strip_path("a\\b\\c.txt"), "c.txt");
        assert_eq!(strip_path("mixed/sep\\c.txt"), "c.txt");
        assert_eq!(strip_path("plain.txt"), "plain.txt");
        assert_eq!(strip_path("trailing/"), "");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("./a/B.TXT", false), "a/b.txt");
        assert_eq!(normalize_name("./a/B.TXT", true), "b.txt");
        assert_eq!(normalize_name("B.TXT", true), "b.txt");
    }

    #[test]
    fn test_simple_hash_known_values() {
        assert_eq!(simple_hash(""), 0);
        assert_eq!(simple_hash("a"), 97);
        assert_eq!(simple_hash("ab"), 97 * 13 + 98);
    }

    proptest! {
        #[test]
        fn normalized_lookups_agree(name in "[a-zA-Z0-9_./]{1,64}") {
            // hashing the normalized form must not depend on input case
            let upper = name.to_ascii_uppercase();
            prop_assert_eq!(
                simple_hash(&normalize_name(&name, true)),
                simple_hash(&normalize_name(&upper, true))
            );
        }

        #[test]
        fn normalize_is_idempotent(name in "[a-zA-Z0-9_./]{1,64}") {
            let once = normalize_name(&name, true);
            prop_assert_eq!(normalize_name(&once, true), once.clone());
        }
    }
}
