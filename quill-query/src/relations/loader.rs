//! Relation loading after the parent rows are known.
//!
//! Each [`RelationLoad`] becomes one follow-up query per parent result: keys
//! are collected from the parent rows, the related rows are read with a
//! single `IN (...)` condition, and every parent row gets the relation's
//! value under the relation name. Loads of different relations run
//! concurrently.
//!
//! ```rust,ignore
//! let users = db
//!     .table("users")?
//!     .with_relation("posts", |posts| posts.select(["title"]).order_by("id"))?
//!     .all()
//!     .exec()
//!     .await?
//!     .into_rows();
//! // users[0]["posts"] is a list of `{ "title": ... }` records.
//! ```

use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::query::Query;
use crate::transaction::TransactionContext;
use crate::types::{QueryKind, SelectItem};
use crate::value::{Row, Value};

use super::{Relation, RelationKind};

/// Output key carrying the parent key of many-to-many rows.
const PARENT_KEY: &str = "__quill_parent";

/// A relation to load for every row of a query.
#[derive(Debug, Clone)]
pub struct RelationLoad {
    /// The relation.
    pub relation: Arc<Relation>,
    /// Query on the target table; the loader adds the key condition.
    pub query: Query,
}

impl Query {
    /// Load a relation into every result row under the relation's name.
    ///
    /// `f` shapes the query on the target table (select list, conditions,
    /// order). One-relations load a record or null; many-relations load a
    /// list. A `LIMIT` on the sub-query applies to all parents together.
    pub fn with_relation<F>(&self, name: &str, f: F) -> QueryResult<Query>
    where
        F: FnOnce(Query) -> Query,
    {
        let relation = self
            .table()
            .relation(name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_relation(self.table().name(), name))?;
        let query = f(self.db().table(&relation.target)?);
        if query.kind() != QueryKind::Select {
            return Err(QueryError::invalid_query(format!(
                "relation '{}' can only be loaded with a select",
                name
            )));
        }
        let load = RelationLoad { relation, query };
        Ok(self.with(|s| {
            s.loads.retain(|l| l.relation.name != load.relation.name);
            s.loads.push(load);
        }))
    }
}

/// Follow-up query of one load, with what it adds to the related rows.
struct Plan<'a> {
    load: &'a RelationLoad,
    query: Option<Query>,
    /// Column of the related rows holding the parent key.
    key: String,
    /// Columns added for matching, to strip afterwards.
    added: Vec<String>,
}

fn unique_keys(rows: &[Row], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|value| !value.is_null())
        .filter(|value| seen.insert(value.group_key()))
        .cloned()
        .collect()
}

fn plan<'a>(load: &'a RelationLoad, rows: &[Row]) -> Plan<'a> {
    let relation = &load.relation;
    let keys = unique_keys(rows, relation.source_key());
    let mut plan = Plan {
        load,
        query: None,
        key: relation.target_key().to_string(),
        added: Vec::new(),
    };
    if keys.is_empty() {
        return plan;
    }

    let query = load.query.all();
    let query = match &relation.kind {
        RelationKind::HasAndBelongsToMany(join) => {
            let target = query.alias_or_name().to_string();
            let mut query = query;
            if query.state().select.is_empty() {
                query.select_mut([format!("{}.*", target)]);
            }
            plan.key = PARENT_KEY.to_string();
            plan.added.push(PARENT_KEY.to_string());
            query
                .join(
                    join.table.as_str(),
                    (
                        format!("{}.{}", join.table, join.association_foreign_key).as_str(),
                        format!("{}.{}", target, join.association_primary_key).as_str(),
                    ),
                )
                .select_as(format!("{}.{}", join.table, join.foreign_key), PARENT_KEY)
                .r#where(Filter::is_in(format!("{}.{}", join.table, join.foreign_key), keys))
        }
        _ => {
            let key = relation.target_key();
            let mut query = query.r#where(Filter::is_in(key, keys));
            let selected = &query.state().select;
            if !selected.is_empty() && !selected.iter().any(|item| item.covers(key)) {
                query.select_mut([SelectItem::from(key)]);
                plan.added.push(key.to_string());
            }
            query
        }
    };
    plan.query = Some(query);
    plan
}

/// Load every scheduled relation of `query` into `rows`.
pub(crate) async fn load_relations(
    query: &Query,
    rows: &mut [Row],
    tx: Option<&TransactionContext>,
) -> QueryResult<()> {
    let loads = &query.state().loads;
    if loads.is_empty() || rows.is_empty() {
        return Ok(());
    }
    let plans: Vec<Plan<'_>> = loads.iter().map(|load| plan(load, rows)).collect();

    let fetched = try_join_all(plans.iter().map(|plan| async move {
        match &plan.query {
            Some(query) => Ok::<_, QueryError>(query.run(tx).await?.into_rows()),
            None => Ok(Vec::new()),
        }
    }))
    .await?;

    for (plan, related) in plans.iter().zip(fetched) {
        let relation = &plan.load.relation;
        debug!(
            table = %query.table().name(),
            relation = %relation.name,
            parents = rows.len(),
            related = related.len(),
            "Loaded relation"
        );

        let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
        for mut row in related {
            let key = row.get(&plan.key).map(Value::group_key).unwrap_or_default();
            for column in &plan.added {
                row.shift_remove(column);
            }
            groups.entry(key).or_default().push(row);
        }

        for row in rows.iter_mut() {
            let matched = row
                .get(relation.source_key())
                .filter(|key| !key.is_null())
                .and_then(|key| groups.get(&key.group_key()));
            let value = if relation.is_many() {
                Value::List(
                    matched
                        .map(|rows| rows.iter().cloned().map(Value::Record).collect())
                        .unwrap_or_default(),
                )
            } else {
                matched
                    .and_then(|rows| rows.first())
                    .cloned()
                    .map(Value::Record)
                    .unwrap_or(Value::Null)
            };
            row.insert(relation.name.clone(), value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, sql_text, users};
    use pretty_assertions::assert_eq;

    fn parents(ids: &[i64]) -> Vec<Row> {
        ids.iter()
            .map(|id| Row::from_iter([("id".to_string(), Value::Int(*id))]))
            .collect()
    }

    #[test]
    fn test_with_relation_unknown() {
        let db = db();
        let err = users(&db).with_relation("friends", |q| q).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::UnknownRelation);
    }

    #[test]
    fn test_plan_adds_key_column() {
        let db = db();
        let q = users(&db)
            .with_relation("posts", |posts| posts.select(["title"]))
            .unwrap();
        let load = &q.state().loads[0];
        let plan = plan(load, &parents(&[1, 2, 1]));
        let sub = plan.query.unwrap();
        assert_eq!(
            sql_text(&sub),
            r#"SELECT "posts"."title", "posts"."author_id" FROM "posts" WHERE "posts"."author_id" IN ($1, $2)"#
        );
        assert_eq!(plan.added, ["author_id"]);
    }

    #[test]
    fn test_plan_many_to_many() {
        let db = db();
        let q = db.table("posts").unwrap().with_relation("tags", |tags| tags).unwrap();
        let plan = plan(&q.state().loads[0], &parents(&[7]));
        assert_eq!(
            sql_text(&plan.query.unwrap()),
            r#"SELECT "tags".*, "post_tags"."post_id" AS "__quill_parent" FROM "tags" JOIN "post_tags" ON "post_tags"."tag_id" = "tags"."id" WHERE "post_tags"."post_id" IN ($1)"#
        );
    }

    #[test]
    fn test_plan_without_keys_skips_query() {
        let db = db();
        let q = users(&db).with_relation("posts", |posts| posts).unwrap();
        let plan = plan(&q.state().loads[0], &[Row::new()]);
        assert!(plan.query.is_none());
    }

    #[test]
    fn test_with_relation_replaces_same_name() {
        let db = db();
        let q = users(&db)
            .with_relation("posts", |p| p)
            .unwrap()
            .with_relation("posts", |p| p.limit(1))
            .unwrap();
        assert_eq!(q.state().loads.len(), 1);
    }
}
