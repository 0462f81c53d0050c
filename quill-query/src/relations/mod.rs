//! Relation definitions.
//!
//! Relations are declared on a [`TableDef`](crate::TableDef) and indexed by
//! name once, when the table is defined. Nested writes and relation loads
//! dispatch on [`RelationKind`].

pub(crate) mod loader;

pub use loader::RelationLoad;

/// Join table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    /// Join table name.
    pub table: String,
    /// Key on the source table the join table references.
    pub primary_key: String,
    /// Join table column referencing the source table.
    pub foreign_key: String,
    /// Key on the target table the join table references.
    pub association_primary_key: String,
    /// Join table column referencing the target table.
    pub association_foreign_key: String,
}

impl JoinTable {
    /// Create a join table description; both referenced keys default to `id`.
    pub fn new(
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        association_foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            foreign_key: foreign_key.into(),
            association_primary_key: "id".to_string(),
            association_foreign_key: association_foreign_key.into(),
        }
    }

    /// Set the referenced keys on the source and target tables.
    pub fn references(mut self, primary_key: impl Into<String>, association_primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self.association_primary_key = association_primary_key.into();
        self
    }
}

/// Kind of relation, with the keys that link the two tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// The source row holds `foreign_key`, referencing the target's `primary_key`.
    BelongsTo {
        /// Column on the source table.
        foreign_key: String,
        /// Column on the target table.
        primary_key: String,
    },
    /// One target row holds `foreign_key`, referencing the source's `primary_key`.
    HasOne {
        /// Column on the source table.
        primary_key: String,
        /// Column on the target table.
        foreign_key: String,
    },
    /// Many target rows hold `foreign_key`, referencing the source's `primary_key`.
    HasMany {
        /// Column on the source table.
        primary_key: String,
        /// Column on the target table.
        foreign_key: String,
    },
    /// Source and target rows are linked through a join table.
    HasAndBelongsToMany(JoinTable),
}

impl RelationKind {
    /// Lowercase kind name, used in errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo { .. } => "belongs_to",
            Self::HasOne { .. } => "has_one",
            Self::HasMany { .. } => "has_many",
            Self::HasAndBelongsToMany(_) => "has_and_belongs_to_many",
        }
    }
}

/// A relation from one table to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relation name; also the key relation payloads and loaded values use.
    pub name: String,
    /// Target table name.
    pub target: String,
    /// Kind and keys.
    pub kind: RelationKind,
}

impl Relation {
    /// Create a relation.
    pub fn new(name: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
        }
    }

    /// Check if the relation yields a list.
    pub fn is_many(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::HasMany { .. } | RelationKind::HasAndBelongsToMany(_)
        )
    }

    /// Check if nested writes for this relation must run before the parent's statement.
    pub fn is_prepend(&self) -> bool {
        matches!(self.kind, RelationKind::BelongsTo { .. })
    }

    /// Column on the source table that identifies related rows.
    pub fn source_key(&self) -> &str {
        match &self.kind {
            RelationKind::BelongsTo { foreign_key, .. } => foreign_key,
            RelationKind::HasOne { primary_key, .. } | RelationKind::HasMany { primary_key, .. } => {
                primary_key
            }
            RelationKind::HasAndBelongsToMany(join) => &join.primary_key,
        }
    }

    /// Column on the target table matched against [`source_key`](Self::source_key).
    /// For many-to-many relations this is the target key the join table references.
    pub fn target_key(&self) -> &str {
        match &self.kind {
            RelationKind::BelongsTo { primary_key, .. } => primary_key,
            RelationKind::HasOne { foreign_key, .. } | RelationKind::HasMany { foreign_key, .. } => {
                foreign_key
            }
            RelationKind::HasAndBelongsToMany(join) => &join.association_primary_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belongs_to_keys() {
        let rel = Relation::new(
            "author",
            "users",
            RelationKind::BelongsTo {
                foreign_key: "author_id".into(),
                primary_key: "id".into(),
            },
        );
        assert!(rel.is_prepend());
        assert!(!rel.is_many());
        assert_eq!(rel.source_key(), "author_id");
        assert_eq!(rel.target_key(), "id");
    }

    #[test]
    fn test_has_many_keys() {
        let rel = Relation::new(
            "posts",
            "posts",
            RelationKind::HasMany {
                primary_key: "id".into(),
                foreign_key: "author_id".into(),
            },
        );
        assert!(rel.is_many());
        assert!(!rel.is_prepend());
        assert_eq!(rel.source_key(), "id");
        assert_eq!(rel.target_key(), "author_id");
    }

    #[test]
    fn test_join_table_defaults() {
        let join = JoinTable::new("post_tags", "post_id", "tag_id");
        assert_eq!(join.primary_key, "id");
        let join = join.references("uuid", "code");
        assert_eq!(join.association_primary_key, "code");
    }
}
