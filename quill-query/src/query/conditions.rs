//! WHERE conditions.
//!
//! Conditions added with [`Query::where`] form one AND-group. Each
//! [`Query::or_where`] call opens a further group; groups are OR-combined.

use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::raw::RawSql;
use crate::value::Value;

use super::Query;

impl Query {
    /// Add a condition to the AND-group.
    pub fn r#where(&self, filter: impl Into<Filter>) -> Query {
        let mut query = self.clone();
        query.where_mut(filter);
        query
    }

    /// In-place variant of [`where`](Self::where).
    pub fn where_mut(&mut self, filter: impl Into<Filter>) {
        let filter = filter.into();
        if !filter.is_none() {
            self.state_mut().and.push(filter);
        }
    }

    /// Add a negated condition to the AND-group.
    pub fn where_not(&self, filter: impl Into<Filter>) -> Query {
        self.r#where(Filter::not(filter.into()))
    }

    /// Add a group of conditions, OR-combined with the existing groups.
    pub fn or_where(&self, filter: impl Into<Filter>) -> Query {
        let mut query = self.clone();
        query.or_where_mut(filter);
        query
    }

    /// In-place variant of [`or_where`](Self::or_where).
    pub fn or_where_mut(&mut self, filter: impl Into<Filter>) {
        let filter = filter.into();
        if filter.is_none() {
            return;
        }
        let group = match filter {
            Filter::And(filters) => filters,
            other => vec![other],
        };
        self.state_mut().or.push(group);
    }

    /// `column IN (values)`. An empty list matches nothing.
    pub fn where_in<V: Into<Value>>(&self, column: &str, values: impl IntoIterator<Item = V>) -> Query {
        self.r#where(Filter::is_in(column, values))
    }

    /// `EXISTS (query)`.
    pub fn where_exists(&self, query: Query) -> Query {
        self.r#where(Filter::exists(query))
    }

    /// `column IN (query)`.
    pub fn where_in_query(&self, column: &str, query: Query) -> Query {
        self.r#where(Filter::in_query(column, query))
    }

    /// A raw SQL condition.
    pub fn where_raw(&self, sql: impl Into<RawSql>) -> Query {
        self.r#where(Filter::raw(sql))
    }

    /// Allow an update or delete to affect every row.
    pub fn all_rows(&self) -> Query {
        if self.state().all_rows {
            return self.clone();
        }
        self.with(|s| s.all_rows = true)
    }

    /// Mark the query as matching nothing. Execution returns the empty
    /// result of its return type without contacting the database.
    pub fn none(&self) -> Query {
        if self.state().none {
            return self.clone();
        }
        self.with(|s| s.none = true)
    }

    /// Condition on the primary key; composite keys take one value per column.
    pub(crate) fn primary_key_filter(&self, values: Vec<Value>) -> QueryResult<Filter> {
        let keys = self.table().primary_keys();
        if keys.is_empty() || keys.len() != values.len() {
            return Err(QueryError::invalid_query(format!(
                "table '{}' has {} primary key column(s), got {} value(s)",
                self.table().name(),
                keys.len(),
                values.len()
            )));
        }
        Ok(Filter::and(
            keys.iter().zip(values).map(|(key, value)| Filter::eq(key.as_str(), value)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::Filter;
    use crate::test_support::{db, sql, sql_text, users};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_and_group() {
        let db = db();
        let q = users(&db).r#where(("name", "Ann")).r#where(Filter::gte("id", 3));
        let compiled = sql(&q);
        assert_eq!(
            compiled.text,
            r#"SELECT * FROM "users" WHERE "users"."name" = $1 AND "users"."id" >= $2"#
        );
        assert_eq!(compiled.values, vec![Value::from("Ann"), Value::Int(3)]);
    }

    #[test]
    fn test_or_groups() {
        let db = db();
        let q = users(&db)
            .r#where(("name", "Ann"))
            .r#where(("id", 1))
            .or_where(("name", "Bob"));
        assert_eq!(
            sql_text(&q),
            r#"SELECT * FROM "users" WHERE ("users"."name" = $1 AND "users"."id" = $2) OR "users"."name" = $3"#
        );
    }

    #[test]
    fn test_null_equality_is_is_null() {
        let db = db();
        let q = users(&db).r#where(("email", Value::Null)).where_not(("name", Value::Null));
        assert_eq!(
            sql_text(&q),
            r#"SELECT * FROM "users" WHERE "users"."email" IS NULL AND NOT ("users"."name" IS NULL)"#
        );
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let db = db();
        let q = users(&db).where_in("id", Vec::<i64>::new());
        assert_eq!(sql_text(&q), r#"SELECT * FROM "users" WHERE FALSE"#);
    }

    #[test]
    fn test_like_operators_escape_wildcards() {
        let db = db();
        let q = users(&db).r#where(Filter::contains("name", "50%"));
        let compiled = sql(&q);
        assert_eq!(compiled.text, r#"SELECT * FROM "users" WHERE "users"."name" LIKE $1"#);
        assert_eq!(compiled.values, vec![Value::from("%50\\%%")]);
    }

    #[test]
    fn test_exists_subquery_shares_numbering() {
        let db = db();
        let posts = db
            .table("posts")
            .unwrap()
            .select([crate::SelectItem::Raw { sql: "1".into(), alias: None }])
            .r#where(Filter::columns("posts.author_id", crate::CompareOp::Eq, "users.id"))
            .r#where(("title", "x"));
        let q = users(&db).r#where(("name", "Ann")).where_exists(posts);
        let compiled = sql(&q);
        assert_eq!(
            compiled.text,
            r#"SELECT * FROM "users" WHERE "users"."name" = $1 AND EXISTS (SELECT 1 FROM "posts" WHERE "posts"."author_id" = "users"."id" AND "posts"."title" = $2)"#
        );
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_raw_condition_with_named_variable() {
        let db = db();
        let q = users(&db).where_raw(crate::RawSql::new("lower(name) = $name").var("name", "ann"));
        let compiled = sql(&q);
        assert_eq!(compiled.text, r#"SELECT * FROM "users" WHERE (lower(name) = $1)"#);
        assert_eq!(compiled.values, vec![Value::from("ann")]);
    }

    #[test]
    fn test_none_is_idempotent() {
        let db = db();
        let q = users(&db).none();
        assert!(q.none().ptr_eq(&q));
    }
}
