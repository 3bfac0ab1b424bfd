//! Collision-safe sibling naming.
//!
//! Pure function, no tree access. The tree calls it on every structural
//! mutation with the names of the destination's other children.
//!
//! ```text
//! desired  siblings                     result
//! Folder   {}                           Folder
//! Folder   {Folder}                     Folder_2
//! Folder   {Folder, Folder_2}           Folder_3
//! Folder_2 {Folder, Folder_2}           Folder_3     (never Folder_2_2)
//! ```

use std::collections::HashSet;

/// Resolve `desired` against the names already used by siblings.
///
/// Returns `desired` unchanged when free. Otherwise strips any numeric
/// `_<n>` suffix (n >= 2, no leading zero) to find the base name and returns
/// `<base>_<k>` for the smallest unused `k >= 2`.
#[must_use]
pub fn resolve_name<'a, I>(desired: &str, siblings: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = siblings.into_iter().collect();
    if !taken.contains(desired) {
        return desired.to_string();
    }

    let base = base_name(desired);
    let mut suffix: u64 = 2;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Base of a possibly-suffixed name: `Folder_3` -> `Folder`, `Folder_1` -> `Folder_1`.
#[must_use]
pub fn base_name(name: &str) -> &str {
    name.rsplit_once('_')
        .filter(|(prefix, suffix)| !prefix.is_empty() && is_collision_suffix(suffix))
        .map_or(name, |(prefix, _)| prefix)
}

fn is_collision_suffix(suffix: &str) -> bool {
    !suffix.is_empty()
        && !suffix.starts_with('0')
        && suffix.bytes().all(|b| b.is_ascii_digit())
        && suffix.parse::<u64>().is_ok_and(|n| n >= 2)
}
