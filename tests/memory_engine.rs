mod common;

use common::{names, seeded, Author};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tidepool::memory::{Matcher, MemoryStore};
use tidepool::{Criterion, Filter, JoinOptions, ModelError, Query};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Post {
    id: Option<i64>,
    title: String,
    comment_id: Option<i64>,
}

fn blog() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table("posts");
    store.create_table("comments");
    store.insert_row("comments", json!({ "body": "first!" })).unwrap();
    store.insert_row("comments", json!({ "body": "nice" })).unwrap();
    store
        .insert_row("posts", json!({ "title": "hello", "comment_id": 2 }))
        .unwrap();
    store
        .insert_row("posts", json!({ "title": "quiet", "comment_id": null }))
        .unwrap();
    store
        .insert_row("posts", json!({ "title": "again", "comment_id": 1 }))
        .unwrap();
    store
}

#[test]
fn test_or_widens_and_exclude_narrows() {
    let (_store, repo) = seeded();

    let query = repo.query(|q| {
        q.filter(Filter::new().eq("name", "S"))
            .or(Filter::new().eq("name", "L"))
    });
    assert_eq!(names(&query.all().unwrap()), vec!["S", "L"]);

    let query = query.exclude(Filter::new().eq("age", 50));
    assert_eq!(names(&query.all().unwrap()), vec!["S"]);
}

#[test]
fn test_or_without_filter_acts_as_filter() {
    let (_store, repo) = seeded();
    let query = repo.query(|q| q.or(Filter::new().eq("name", "MG")));
    assert_eq!(names(&query.all().unwrap()), vec!["MG"]);
}

#[test]
fn test_between_is_inclusive() {
    let (_store, repo) = seeded();
    let query = repo.query(|q| q.filter(Filter::new().between("age", 30, 40)));
    assert_eq!(names(&query.all().unwrap()), vec!["S", "MG"]);

    let query = repo.query(|q| {
        q.filter(Filter::new().with("age", Criterion::from(json!(41)..=json!(60))))
    });
    assert_eq!(names(&query.all().unwrap()), vec!["L"]);
}

#[test]
fn test_expression_predicate() {
    let (_store, repo) = seeded();
    let query = repo.query(|q| {
        q.filter_expr(Matcher::new(|row| row["name"].as_str().is_some_and(|n| n.len() == 1)))
    });
    assert_eq!(names(&query.all().unwrap()), vec!["S", "L"]);
}

#[test]
fn test_limit_offset_and_count() {
    let (_store, repo) = seeded();
    let query = repo.query(|q| q.order(["name"]).offset(1).limit(1));

    assert_eq!(names(&query.all().unwrap()), vec!["MG"]);
    assert_eq!(query.count().unwrap(), 1);
}

#[test]
fn test_select_projects_columns() {
    let (store, _repo) = seeded();
    let rows = store
        .collection::<serde_json::Value>("authors")
        .select(&["name".to_string()])
        .rows()
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["name"]);
}

#[test]
fn test_aggregates() {
    let (_store, repo) = seeded();
    let all = repo.query(|q| q);

    assert_eq!(all.sum("age").unwrap(), Some(json!(120)));
    assert_eq!(all.avg("age").unwrap(), Some(json!(40.0)));
    assert_eq!(all.max("age").unwrap(), Some(json!(50)));
    assert_eq!(all.min("age").unwrap(), Some(json!(30)));
    assert_eq!(all.interval("age").unwrap(), Some(json!(20)));
    assert_eq!(all.range("age").unwrap(), Some((json!(30), json!(50))));
    assert_eq!(all.max("name").unwrap(), Some(json!("S")));
}

#[test]
fn test_aggregates_ignore_limit_but_respect_filter() {
    let (_store, repo) = seeded();
    let query = repo.query(|q| {
        q.exclude(Filter::new().eq("name", "S"))
            .order(["age"])
            .limit(1)
    });
    assert_eq!(query.sum("age").unwrap(), Some(json!(90)));
}

#[test]
fn test_non_numeric_sum_is_an_engine_error() {
    let (_store, repo) = seeded();
    let err = repo.query(|q| q).sum("name").unwrap_err();
    match err {
        ModelError::Engine(engine) => assert_eq!(engine.code, "memory.invalid_aggregate"),
        other => panic!("expected an engine error, got {other:?}"),
    }
}

#[test]
fn test_inner_join_uses_default_keys() {
    let store = blog();
    let posts = Query::new(store.collection::<Post>("posts"))
        .join("comments", JoinOptions::default())
        .order(["comments.body"]);

    let titles: Vec<String> = posts.all().unwrap().into_iter().map(|p| p.title).collect();
    assert_eq!(titles, vec!["again", "hello"]);
}

#[test]
fn test_left_join_keeps_unmatched_rows() {
    let store = blog();
    let posts = Query::new(store.collection::<Post>("posts"))
        .left_join("comments", JoinOptions::default())
        .filter(Filter::new().eq("comments.body", serde_json::Value::Null));

    let titles: Vec<String> = posts.all().unwrap().into_iter().map(|p| p.title).collect();
    assert_eq!(titles, vec!["quiet"]);
}

#[test]
fn test_group_keeps_one_row_per_key() {
    let store = MemoryStore::new();
    store.create_table("authors");
    for (name, age) in [("A", 1), ("B", 1), ("C", 2)] {
        store
            .insert_row("authors", json!({ "name": name, "age": age }))
            .unwrap();
    }

    let grouped = Query::new(store.collection::<Author>("authors")).group(["age"]);
    assert_eq!(grouped.count().unwrap(), 2);
}

#[test]
fn test_unknown_table_is_an_invalid_query() {
    let store = MemoryStore::new();
    let err = Query::new(store.collection::<Author>("missing")).all().unwrap_err();
    assert!(matches!(err, ModelError::InvalidQuery(message) if message.contains("does not exist")));
}

#[test]
fn test_update_through_query_scope() {
    let (_store, repo) = seeded();
    let scoped = repo
        .query(|q| q.filter(Filter::new().eq("name", "S")))
        .scoped();

    let updated = scoped
        .update(&Author {
            id: Some(1),
            ..Author::aged("S", 31)
        })
        .unwrap();

    assert_eq!(updated.age, Some(31));
    assert_eq!(repo.find(1).unwrap().unwrap().age, Some(31));
    assert_eq!(repo.find(2).unwrap().unwrap().age, Some(40));
}

#[test]
fn test_exclude_drops_rows_with_null_columns() {
    let store = MemoryStore::new();
    store.create_table("authors");
    for name in [json!("x"), serde_json::Value::Null, json!("y")] {
        store.insert_row("authors", json!({ "name": name })).unwrap();
    }
    let authors = Query::new(store.collection::<serde_json::Value>("authors"));

    let kept = authors.clone().exclude(Filter::new().eq("name", "x")).all().unwrap();
    assert_eq!(kept, vec![json!({ "id": 3, "name": "y" })]);

    let nulls = authors
        .clone()
        .filter(Filter::new().eq("name", serde_json::Value::Null))
        .all()
        .unwrap();
    assert_eq!(nulls, vec![json!({ "id": 2, "name": null })]);

    let not_null = authors.exclude(Filter::new().eq("name", serde_json::Value::Null));
    assert_eq!(not_null.count().unwrap(), 2);
}
