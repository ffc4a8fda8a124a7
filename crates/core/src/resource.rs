//! Hierarchical resource names.

use std::fmt;
use std::sync::Arc;

/// The full name of a lockable resource.
///
/// A name is an ordered path of segments; every non-empty prefix names a
/// resource higher up the hierarchy. `("database", "table-users", "3")` is a
/// page whose ancestors are the `table-users` table and the database.
///
/// Segments are shared, so cloning a name (which the lock tables do
/// constantly) copies one pointer per segment.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName {
    segments: Vec<Arc<str>>,
}

impl ResourceName {
    /// Creates a top-level resource name.
    pub fn new(name: impl fmt::Display) -> Self {
        Self {
            segments: vec![Arc::from(name.to_string())],
        }
    }

    /// Creates a name from a full path. Returns `None` for an empty path.
    pub fn from_segments<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        let segments: Vec<Arc<str>> = segments
            .into_iter()
            .map(|s| Arc::from(s.to_string()))
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    /// Returns the name of the child `name` of this resource.
    pub fn child(&self, name: impl fmt::Display) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(Arc::from(name.to_string()));
        Self { segments }
    }

    /// Returns the parent name, or `None` for a top-level resource.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() > 1 {
            Some(Self {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        } else {
            None
        }
    }

    /// Returns true if `other` is a strict prefix of this name.
    pub fn is_child_of(&self, other: &ResourceName) -> bool {
        other.segments.len() < self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// Returns the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| &**s)
    }

    /// Returns the first segment.
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    /// Returns the last segment.
    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Number of segments; a top-level resource has depth 1.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceName({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent() {
        let db = ResourceName::new("database");
        let page = db.child("table1").child(4u64);

        assert_eq!(page.parent(), Some(db.child("table1")));
        assert_eq!(page.parent().and_then(|p| p.parent()), Some(db.clone()));
        assert_eq!(db.parent(), None);
    }

    #[test]
    fn test_is_child_of() {
        let db = ResourceName::new("database");
        let table = db.child("table1");
        let page = table.child(4);
        let other = ResourceName::new("database2").child("table1");

        assert!(table.is_child_of(&db));
        assert!(page.is_child_of(&db));
        assert!(page.is_child_of(&table));
        assert!(!db.is_child_of(&table));
        assert!(!table.is_child_of(&table));
        assert!(!other.is_child_of(&db));
        assert!(!db.child("table2").child(4).is_child_of(&table));
    }

    #[test]
    fn test_equality_is_structural() {
        let a = ResourceName::new("database").child("t").child(3);
        let b = ResourceName::from_segments(["database", "t", "3"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ResourceName::from_segments(["database", "3", "t"]).unwrap());
        assert!(ResourceName::from_segments(Vec::<String>::new()).is_none());
    }

    #[test]
    fn test_display_and_accessors() {
        let page = ResourceName::new("database").child("table-users").child(12);
        assert_eq!(page.to_string(), "database/table-users/12");
        assert_eq!(page.root(), "database");
        assert_eq!(page.last(), "12");
        assert_eq!(page.depth(), 3);
        assert_eq!(
            page.segments().collect::<Vec<_>>(),
            vec!["database", "table-users", "12"]
        );
    }
}
