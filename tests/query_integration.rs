//! Integration tests for building and compiling queries.

mod common;

use common::{MemoryAdapter, blog, text};
use pretty_assertions::assert_eq;
use quill::{CompiledSql, Data, ErrorCode, Filter, OrderItem, QueryKind, ReturnType, Value};

#[test]
fn test_chain_methods_leave_receiver_untouched() {
    let db = blog(MemoryAdapter::new());
    let users = db.table("users").unwrap();

    let named = users.r#where(("name", "Ann"));
    let limited = named.limit(3);

    assert_eq!(text(&users), r#"SELECT * FROM "users""#);
    assert_eq!(text(&named), r#"SELECT * FROM "users" WHERE "users"."name" = $1"#);
    assert_eq!(text(&limited), r#"SELECT * FROM "users" WHERE "users"."name" = $1 LIMIT 3"#);
}

#[test]
fn test_shared_base_branches_independently() {
    let db = blog(MemoryAdapter::new());
    let base = db.table("users").unwrap().select(["id"]);

    let by_name = base.r#where(("name", "Ann"));
    let by_email = base.r#where(("email", "a@example.com"));

    assert_eq!(text(&base), r#"SELECT "users"."id" FROM "users""#);
    assert_eq!(text(&by_name), r#"SELECT "users"."id" FROM "users" WHERE "users"."name" = $1"#);
    assert_eq!(text(&by_email), r#"SELECT "users"."id" FROM "users" WHERE "users"."email" = $1"#);
}

#[test]
fn test_setting_same_return_type_is_idempotent() {
    let db = blog(MemoryAdapter::new());
    let users = db.table("users").unwrap();

    assert!(users.all().ptr_eq(&users));
    assert!(!users.take().ptr_eq(&users));
    assert_eq!(users.take().return_type(), ReturnType::OneOrThrow);
}

#[test]
fn test_values_are_bound_in_order() {
    let db = blog(MemoryAdapter::new());
    let query = db
        .table("users")
        .unwrap()
        .r#where(Filter::and([Filter::eq("name", "Ann"), Filter::gte("id", 10)]))
        .or_where(("email", "ann@example.com"));

    let compiled = query.to_sql().unwrap();
    let sql = compiled.as_single().unwrap();
    assert_eq!(
        sql.text,
        r#"SELECT * FROM "users" WHERE ("users"."name" = $1 AND "users"."id" >= $2) OR "users"."email" = $3"#
    );
    assert_eq!(sql.values, vec![Value::from("Ann"), Value::Int(10), Value::from("ann@example.com")]);
}

#[test]
fn test_update_without_conditions_is_rejected() {
    let db = blog(MemoryAdapter::new());
    let users = db.table("users").unwrap();

    let err = users.update(Data::new().set("name", "x")).unwrap_err();
    assert_eq!(err.code, ErrorCode::UnconditionalWrite);

    let err = users.delete().unwrap_err();
    assert_eq!(err.code, ErrorCode::UnconditionalWrite);

    assert!(users.all_rows().delete().is_ok());
}

#[test]
fn test_write_returns_only_selected_columns() {
    let db = blog(MemoryAdapter::new());
    let users = db.table("users").unwrap();

    let bare = users.insert(Data::new().set("name", "Ann").set("email", "a@x")).unwrap();
    assert_eq!(bare.kind(), QueryKind::Insert);
    assert_eq!(bare.return_type(), ReturnType::RowCount);
    assert_eq!(text(&bare), r#"INSERT INTO "users" ("name", "email") VALUES ($1, $2)"#);

    let returning = bare.select(["id"]);
    assert_eq!(
        text(&returning),
        r#"INSERT INTO "users" ("name", "email") VALUES ($1, $2) RETURNING "users"."id""#
    );
}

#[test]
fn test_insert_many_splits_at_bind_limit() {
    let db = quill::Db::builder(MemoryAdapter::new())
        .config(quill::QueryConfig::builder().max_bind_params(4).build())
        .table(quill::TableDef::new("users").columns(["id", "name", "email"]))
        .build()
        .unwrap();

    let rows = (0..3).map(|i| Data::new().set("name", format!("u{}", i)).set("email", "x"));
    let compiled = db.table("users").unwrap().insert_many(rows).unwrap().to_sql().unwrap();

    assert!(compiled.is_batch());
    let texts: Vec<&str> = compiled.statements().iter().map(|s| s.text.as_str()).collect();
    assert_eq!(
        texts,
        [
            r#"INSERT INTO "users" ("name", "email") VALUES ($1, $2), ($3, $4)"#,
            r#"INSERT INTO "users" ("name", "email") VALUES ($1, $2)"#,
        ]
    );
    assert!(compiled.statements().iter().all(|s| s.values.len() <= 4));
    assert!(!matches!(compiled, CompiledSql::Single(_)));
}

#[test]
fn test_relation_join_uses_declared_keys() {
    let db = blog(MemoryAdapter::new());
    let query = db
        .table("posts")
        .unwrap()
        .join_relation("author")
        .unwrap()
        .select(["author.name"]);

    assert_eq!(
        text(&query),
        r#"SELECT "author"."name" FROM "posts" JOIN "users" AS "author" ON "author"."id" = "posts"."author_id""#
    );
}

#[test]
fn test_unknown_relation_is_reported() {
    let db = blog(MemoryAdapter::new());
    let err = db.table("posts").unwrap().join_relation("comments").unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownRelation);
}

#[test]
fn test_order_and_pagination() {
    let db = blog(MemoryAdapter::new());
    let query = db
        .table("posts")
        .unwrap()
        .select(["title"])
        .order_by(OrderItem::desc("id"))
        .limit(10)
        .offset(20);

    assert_eq!(
        text(&query),
        r#"SELECT "posts"."title" FROM "posts" ORDER BY "posts"."id" DESC LIMIT 10 OFFSET 20"#
    );
}

#[test]
fn test_raw_condition_renumbers_placeholders() {
    let db = blog(MemoryAdapter::new());
    let query = db
        .table("users")
        .unwrap()
        .r#where(("name", "Ann"))
        .where_raw(quill::raw!("lower(email) = {}", "a@x"));

    let compiled = query.to_sql().unwrap();
    let sql = compiled.as_single().unwrap();
    assert_eq!(sql.text, r#"SELECT * FROM "users" WHERE "users"."name" = $1 AND (lower(email) = $2)"#);
    assert_eq!(sql.values.len(), 2);
}
