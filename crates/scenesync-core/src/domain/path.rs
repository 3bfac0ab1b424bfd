//! Instance paths.
//!
//! A path is the ordered sequence of names from a top-level instance down to a
//! node. It is derived identity: the tree recomputes it from ancestor names and
//! never stores it on the instance itself. The empty path is the virtual root
//! that top-level instances hang from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered name sequence addressing one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstancePath(Vec<String>);

impl InstancePath {
    /// The virtual root.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from its segments.
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path string (`"Workspace.Folder"`).
    ///
    /// Convenience for tests and operators; names containing dots cannot be
    /// expressed this way and must use the segment form.
    #[must_use]
    pub fn from_dotted(s: &str) -> Self {
        if s.is_empty() {
            return Self::root();
        }
        Self::new(s.split('.'))
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last segment, `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Parent path, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, init)| Self(init.to_vec()))
    }

    /// Child path with one more segment.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// True when `self` equals `other` or lies above it.
    #[must_use]
    pub fn is_ancestor_or_self_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// True when `self` lies strictly below `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        self.0.len() > other.0.len() && self.0.starts_with(&other.0)
    }

    /// Every non-root prefix, shortest first, ending with `self`.
    pub fn ancestors_and_self(&self) -> impl Iterator<Item = Self> + '_ {
        (1..=self.0.len()).map(move |len| Self(self.0[..len].to_vec()))
    }

    /// Rebase `self` from under `old_prefix` to under `new_prefix`.
    ///
    /// Returns `None` when `self` is not under `old_prefix`.
    #[must_use]
    pub fn rebase(&self, old_prefix: &Self, new_prefix: &Self) -> Option<Self> {
        self.0.strip_prefix(old_prefix.0.as_slice()).map(|rest| {
            let mut segments = new_prefix.0.clone();
            segments.extend(rest.iter().cloned());
            Self(segments)
        })
    }

    /// Dotted display form (`"Workspace.Folder_2"`).
    #[must_use]
    pub fn path_string(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.path_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_and_child() {
        let path = InstancePath::from_dotted("Workspace.Folder");
        assert_eq!(path.parent(), Some(InstancePath::from_dotted("Workspace")));
        assert_eq!(path.child("Part").path_string(), "Workspace.Folder.Part");
        assert_eq!(InstancePath::root().parent(), None);
        assert_eq!(path.name(), Some("Folder"));
    }

    #[test]
    fn test_ancestry() {
        let a = InstancePath::from_dotted("Workspace");
        let b = InstancePath::from_dotted("Workspace.Folder");
        let c = InstancePath::from_dotted("WorkspaceX");
        assert!(a.is_ancestor_or_self_of(&b));
        assert!(a.is_ancestor_or_self_of(&a));
        assert!(!c.is_ancestor_or_self_of(&b));
        assert!(b.is_descendant_of(&a));
        assert!(!a.is_descendant_of(&a));
    }

    #[test]
    fn test_ancestors_and_self_shortest_first() {
        let path = InstancePath::from_dotted("A.B.C");
        let all: Vec<String> = path.ancestors_and_self().map(|p| p.path_string()).collect();
        assert_eq!(all, vec!["A", "A.B", "A.B.C"]);
    }

    #[test]
    fn test_rebase() {
        let path = InstancePath::from_dotted("A.B.C");
        let rebased = path.rebase(&InstancePath::from_dotted("A.B"), &InstancePath::from_dotted("X"));
        assert_eq!(rebased, Some(InstancePath::from_dotted("X.C")));
        assert_eq!(path.rebase(&InstancePath::from_dotted("Z"), &InstancePath::root()), None);
    }

    #[test]
    fn test_serializes_as_array() -> Result<(), serde_json::Error> {
        let path = InstancePath::from_dotted("Workspace.Folder");
        assert_eq!(serde_json::to_string(&path)?, r#"["Workspace","Folder"]"#);
        Ok(())
    }
}
