//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use std::collections::{HashMap, HashSet};

/// Direction of a related-include: to_one (we have FK to them) or to_many (they have FK to us).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// Spec for including a related entity in list/read responses.
#[derive(Clone, Debug)]
pub struct IncludeSpec {
    /// API name for the include: FK column without `_id` for to_one, child path segment for to_many.
    pub name: String,
    pub direction: IncludeDirection,
    /// Path segment of the related entity (for lookup in model).
    pub related_path_segment: String,
    /// Our column used in the join (our FK for to_one; our PK for to_many).
    pub our_key_column: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub their_key_column: String,
}

/// Primary key type for parsing path ids.
#[derive(Clone, Debug)]
pub enum PkType {
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub pk_type: Option<PkType>,
    pub nullable: bool,
    /// Whether the column has a DB default (serial sequence, NOW(), literal).
    pub has_default: bool,
    /// PostgreSQL type used for placeholder casts (e.g. "timestamptz", "onset.user_role").
    pub pg_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CredentialSpec {
    pub login_column: String,
    pub password_column: String,
    pub active_column: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub table_id: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub pk_columns: Vec<String>,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    /// Column names never selected or returned (sensitive data).
    pub sensitive_columns: HashSet<String>,
    /// Column names dropped from create/update request bodies.
    pub read_only_columns: HashSet<String>,
    /// Available includes (related entities) for ?include=name1,name2. Built from relationships.
    pub includes: Vec<IncludeSpec>,
    pub validation: HashMap<String, ValidationRule>,
    pub credentials: Option<CredentialSpec>,
    /// Path segments of entities whose rows are deleted along with ours (direct FK children with ON DELETE CASCADE).
    pub cascades_to: Vec<String>,
}

impl ResolvedEntity {
    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn include(&self, name: &str) -> Option<&IncludeSpec> {
        self.includes.iter().find(|i| i.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }

    /// Every entity path whose rows are (transitively) deleted when a row of `path` is deleted.
    /// Sorted, without `path` itself.
    pub fn cascade_closure(&self, path: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<&str> = vec![path];
        while let Some(current) = stack.pop() {
            let Some(entity) = self.entity_by_path(current) else { continue };
            for child in &entity.cascades_to {
                if child != path && seen.insert(child.clone()) {
                    stack.push(child);
                }
            }
        }
        let mut out: Vec<String> = seen.into_iter().collect();
        out.sort();
        out
    }
}
