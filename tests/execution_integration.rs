//! Integration tests for executing queries against an adapter.

mod common;

use std::sync::Arc;

use common::{MemoryAdapter, blog, row};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use quill::{
    Data, ErrorCode, Filter, IsolationLevel, NestedWrite, QueryConfig, QueryError, QueryOutput, TransactionConfig,
    Value,
};

#[tokio::test]
async fn test_value_and_pluck_extraction() {
    let adapter = MemoryAdapter::new();
    adapter.on("count(*)", vec![row(&[("count", Value::Int(42))])]);
    adapter.on(
        "\"users\".\"email\" FROM",
        vec![row(&[("email", "a@x".into())]), row(&[("email", "b@x".into())])],
    );
    let db = blog(adapter.clone());
    let users = db.table("users").unwrap();

    let count = users.count().exec().await.unwrap();
    assert_eq!(count, QueryOutput::Value(Some(Value::Int(42))));

    let emails = users.pluck("email").exec().await.unwrap().into_pluck();
    assert_eq!(emails, vec![Value::from("a@x"), Value::from("b@x")]);
}

#[tokio::test]
async fn test_value_or_throw_on_empty_result() {
    let db = blog(MemoryAdapter::new());
    let err = db.table("users").unwrap().get("email").exec().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RecordNotFound);
}

#[tokio::test]
async fn test_before_hooks_run_in_registration_order() {
    let adapter = MemoryAdapter::new();
    adapter.on_count("UPDATE \"users\"", 1);
    let db = blog(adapter.clone());
    let events = Arc::new(Mutex::new(Vec::new()));

    let (first, second, after) = (events.clone(), events.clone(), events.clone());
    db.table("users")
        .unwrap()
        .before_update(move |_| {
            let events = first.clone();
            async move {
                events.lock().push("first");
                Ok(())
            }
        })
        .before_update(move |_| {
            let events = second.clone();
            async move {
                events.lock().push("second");
                Ok(())
            }
        })
        .after_update(move |_| {
            let events = after.clone();
            async move {
                events.lock().push("after");
                Ok(())
            }
        })
        .r#where(("id", 1))
        .update(Data::new().set("name", "Bo"))
        .unwrap()
        .exec()
        .await
        .unwrap();

    assert_eq!(*events.lock(), ["first", "second", "after"]);
}

#[tokio::test]
async fn test_failing_before_hook_stops_statement() {
    let adapter = MemoryAdapter::new();
    let db = blog(adapter.clone());

    let err = db
        .table("users")
        .unwrap()
        .before_create(|_| async { Err(QueryError::invalid_data("name is required")) })
        .insert(Data::new().set("email", "a@x"))
        .unwrap()
        .exec()
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidData);
    assert!(adapter.log().is_empty());
}

#[tokio::test]
async fn test_nested_write_failure_rolls_back_everything() {
    let adapter = MemoryAdapter::new();
    adapter.on("INSERT INTO \"users\"", vec![row(&[("id", Value::Int(5))])]);
    adapter.fail_on("INSERT INTO \"posts\"");
    let db = blog(adapter.clone());

    let err = db
        .table("users")
        .unwrap()
        .insert(
            Data::new()
                .set("name", "Ann")
                .set("posts", NestedWrite::create_many([Data::new().set("title", "one"), Data::new().set("title", "two")])),
        )
        .unwrap()
        .exec()
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::DatabaseError);
    assert_eq!(adapter.rollbacks(), 1);
    assert!(adapter.committed().is_empty());
    assert_eq!(adapter.log().last().map(String::as_str), Some("ROLLBACK"));
}

#[tokio::test]
async fn test_nested_belongs_to_runs_before_parent() {
    let adapter = MemoryAdapter::new();
    adapter.on("INSERT INTO \"users\"", vec![row(&[("id", Value::Int(8))])]);
    let db = blog(adapter.clone());

    db.table("posts")
        .unwrap()
        .insert(
            Data::new()
                .set("title", "hello")
                .set("author", NestedWrite::create(Data::new().set("name", "Ann"))),
        )
        .unwrap()
        .exec()
        .await
        .unwrap();

    let log = adapter.log();
    assert_eq!(log.first().map(String::as_str), Some("BEGIN"));
    assert!(log[1].starts_with("INSERT INTO \"users\""));
    assert!(log[2].starts_with("INSERT INTO \"posts\""));
    assert_eq!(log.last().map(String::as_str), Some("COMMIT"));
}

#[tokio::test]
async fn test_batched_insert_commits_every_batch() {
    let adapter = MemoryAdapter::new();
    adapter.on_count("INSERT INTO", 2);
    let db = quill::Db::builder(adapter.clone())
        .config(QueryConfig::builder().max_bind_params(4).build())
        .table(quill::TableDef::new("users").columns(["id", "name", "email"]))
        .build()
        .unwrap();

    let rows = (0..6).map(|i| Data::new().set("name", format!("u{}", i)).set("email", "x"));
    let output = db.table("users").unwrap().insert_many(rows).unwrap().exec().await.unwrap();

    assert_eq!(output, QueryOutput::RowCount(6));
    assert_eq!(adapter.committed().len(), 3);
    assert_eq!(adapter.begins().len(), 1);
}

#[tokio::test]
async fn test_after_commit_hook_is_deferred_until_commit() {
    let adapter = MemoryAdapter::new();
    adapter.on("INSERT INTO", vec![row(&[("id", Value::Int(1))])]);
    let db = blog(adapter.clone());
    let (sender, mut receiver) = tokio::sync::oneshot::channel();
    let sender = Arc::new(Mutex::new(Some(sender)));

    let insert = db
        .table("users")
        .unwrap()
        .after_create_commit(move |ctx| {
            let sender = sender.clone();
            async move {
                if let Some(sender) = sender.lock().take() {
                    let _ = sender.send(ctx.rows.len());
                }
                Ok(())
            }
        })
        .insert(Data::new().set("name", "Ann"))
        .unwrap()
        .select(["id"]);

    db.transaction(|tx| async move {
        insert.exec_in(&tx).await?;
        Ok(())
    })
    .await
    .unwrap();

    assert!(receiver.try_recv().is_err());
    assert_eq!(receiver.await.unwrap(), 1);
}

#[tokio::test]
async fn test_after_commit_hook_dropped_on_rollback() {
    let adapter = MemoryAdapter::new();
    adapter.on("INSERT INTO", vec![row(&[("id", Value::Int(1))])]);
    let db = blog(adapter.clone());
    let fired = Arc::new(Mutex::new(false));

    let flag = fired.clone();
    let insert = db
        .table("users")
        .unwrap()
        .after_create_commit(move |_| {
            let flag = flag.clone();
            async move {
                *flag.lock() = true;
                Ok(())
            }
        })
        .insert(Data::new().set("name", "Ann"))
        .unwrap()
        .select(["id"]);

    let result: Result<(), QueryError> = db
        .transaction(|tx| async move {
            insert.exec_in(&tx).await?;
            Err(QueryError::internal("abort"))
        })
        .await;

    assert!(result.is_err());
    tokio::task::yield_now().await;
    assert!(!*fired.lock());
    assert_eq!(adapter.rollbacks(), 1);
}

#[tokio::test]
async fn test_transaction_with_uses_given_isolation() {
    let adapter = MemoryAdapter::new();
    let db = blog(adapter.clone());

    db.transaction_with(TransactionConfig::new().isolation(IsolationLevel::Serializable), |tx| async move {
        tx.db().table("users")?.exec_in(&tx).await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(adapter.begins(), ["BEGIN ISOLATION LEVEL SERIALIZABLE READ WRITE"]);
}

#[tokio::test]
async fn test_upsert_updates_single_match() {
    let adapter = MemoryAdapter::new();
    adapter.on("UPDATE \"users\"", vec![row(&[("id", Value::Int(3))])]);
    let db = blog(adapter.clone());

    let output = db
        .table("users")
        .unwrap()
        .r#where(("email", "a@x"))
        .select(["id"])
        .upsert(Data::new().set("name", "Bo"), Data::new().set("name", "Bo"))
        .await
        .unwrap();

    assert_eq!(output, QueryOutput::One(Some(row(&[("id", Value::Int(3))]))));
    assert!(adapter.log().iter().all(|s| !s.starts_with("INSERT")));
}

#[tokio::test]
async fn test_upsert_with_many_matches_is_not_unique() {
    let adapter = MemoryAdapter::new();
    adapter.on("UPDATE \"users\"", vec![row(&[("id", Value::Int(1))]), row(&[("id", Value::Int(2))])]);
    let db = blog(adapter.clone());

    let err = db
        .table("users")
        .unwrap()
        .r#where(("name", "Ann"))
        .select(["id"])
        .upsert(Data::new().set("email", "x"), Data::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NotUnique);
    assert!(adapter.committed().is_empty());
}

#[tokio::test]
async fn test_belongs_to_loader_attaches_parent() {
    let adapter = MemoryAdapter::new();
    adapter.on(
        "FROM \"posts\"",
        vec![
            row(&[("title", "a".into()), ("author_id", Value::Int(1))]),
            row(&[("title", "b".into()), ("author_id", Value::Int(2))]),
        ],
    );
    adapter.on("FROM \"users\"", vec![row(&[("name", "Ann".into()), ("id", Value::Int(1))])]);
    let db = blog(adapter.clone());

    let rows = db
        .table("posts")
        .unwrap()
        .select(["title"])
        .with_relation("author", |author| author.select(["name"]))
        .unwrap()
        .exec()
        .await
        .unwrap()
        .into_rows();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["author"], Value::Record(row(&[("name", "Ann".into())])));
    assert_eq!(rows[1]["author"], Value::Null);
    assert!(!rows[0].contains_key("author_id"));
}

#[tokio::test]
async fn test_where_filters_reach_adapter_as_parameters() {
    let adapter = MemoryAdapter::new();
    let db = blog(adapter.clone());

    db.table("users")
        .unwrap()
        .r#where(Filter::contains("name", "an"))
        .exec()
        .await
        .unwrap();

    assert_eq!(adapter.log(), [r#"SELECT * FROM "users" WHERE "users"."name" LIKE $1"#]);
}

#[tokio::test]
async fn test_table_hooks_run_before_query_hooks() {
    let adapter = MemoryAdapter::new();
    adapter.on("INSERT INTO", vec![row(&[("name", "Ann".into()), ("email", "a@x".into())])]);
    let events = Arc::new(Mutex::new(Vec::new()));

    let table_events = events.clone();
    let db = quill::Db::builder(adapter.clone())
        .table(quill::TableDef::new("users").columns(["id", "name", "email"]).hook_select(
            quill::HookEvent::AfterCreate,
            ["email"],
            quill::Hook::new(move |ctx: quill::HookContext| {
                let events = table_events.clone();
                async move {
                    let email = ctx.rows[0].get("email").cloned().unwrap_or(Value::Null);
                    events.lock().push(format!("table {}", email));
                    Ok(())
                }
            }),
        ))
        .build()
        .unwrap();

    let query_events = events.clone();
    let output = db
        .table("users")
        .unwrap()
        .after_create(move |_| {
            let events = query_events.clone();
            async move {
                events.lock().push("query".to_string());
                Ok(())
            }
        })
        .insert(Data::new().set("name", "Ann").set("email", "a@x"))
        .unwrap()
        .select(["name"])
        .all()
        .exec()
        .await
        .unwrap();

    assert_eq!(*events.lock(), ["table a@x", "query"]);
    assert_eq!(output, QueryOutput::All(vec![row(&[("name", "Ann".into())])]));
}

#[tokio::test]
async fn test_nested_transaction_scope_reuses_outer() {
    let adapter = MemoryAdapter::new();
    let db = blog(adapter.clone());

    db.transaction(|tx| async move {
        assert!(tx.is_outermost());
        tx.transaction(|inner| async move {
            assert!(!inner.is_outermost());
            inner.db().table("tags")?.exec_in(&inner).await?;
            Ok(())
        })
        .await
    })
    .await
    .unwrap();

    assert_eq!(adapter.begins().len(), 1);
    assert_eq!(adapter.log(), ["BEGIN", r#"SELECT * FROM "tags""#, "COMMIT"]);
}
