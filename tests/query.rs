mod common;

use common::{recording, Author};
use serde_json::json;
use tidepool::mapping::SerdeMapping;
use tidepool::{
    Condition, ConditionKind, Filter, Join, JoinKind, JoinOptions, ModelError, Query, Repository,
};

use ConditionKind::*;

#[test]
fn test_chaining_leaves_receiver_untouched() {
    let base = Query::new(recording("authors"));
    let narrowed = base.clone().filter(Filter::new().eq("name", "L")).limit(1);
    let other = base.clone().order(["name"]);

    assert!(base.conditions().is_empty());
    assert_eq!(narrowed.kinds(), vec![Where, Limit]);
    assert_eq!(other.kinds(), vec![Order]);
}

#[test]
fn test_conditions_replay_in_insertion_order() {
    let base = recording("authors");
    let query = Query::new(base.clone())
        .limit(2)
        .filter(Filter::new().eq("name", "L"))
        .or(Filter::new().eq("name", "MG"))
        .order(["name"])
        .offset(1)
        .exclude(Filter::new().eq("age", 3))
        .group(["name"]);

    query.scoped();

    assert_eq!(
        base.scope().calls(),
        vec!["limit 2", "filter", "or", "order", "offset 1", "exclude", "group"]
    );
}

#[test]
fn test_scoped_is_repeatable() {
    let base = recording("authors");
    let query = Query::new(base.clone()).limit(1).order(["name"]);

    query.scoped();
    query.scoped();

    assert_eq!(
        base.scope().calls(),
        vec!["limit 1", "order", "limit 1", "order"]
    );
}

#[test]
fn test_first_ordering_replaces_later_ones_append() {
    let query = Query::new(recording("authors"))
        .limit(1)
        .order(["name"])
        .order(["age"])
        .reverse_order(["id"]);
    assert_eq!(query.kinds(), vec![Limit, Order, OrderMore, OrderMore]);
}

#[test]
fn test_reverse_order_pushes_one_condition_per_column() {
    let query = Query::new(recording("authors")).reverse_order(["name", "age"]);
    assert_eq!(query.kinds(), vec![Order, OrderMore]);

    let query = Query::new(recording("authors")).desc(["name"]).asc(["age"]);
    assert_eq!(query.kinds(), vec![Order, OrderMore]);
}

#[test]
fn test_negate_swaps_filters_and_round_trips() {
    let query = Query::new(recording("authors"))
        .filter(Filter::new().eq("name", "L"))
        .exclude(Filter::new().eq("age", 3))
        .limit(5);

    let negated = query.inverted();
    assert_eq!(negated.kinds(), vec![Exclude, Where, Limit]);
    assert_eq!(query.kinds(), vec![Where, Exclude, Limit]);

    assert_eq!(negated.negate().conditions(), query.conditions());
}

#[test]
fn test_join_defaults() {
    let query = Query::new(recording("posts")).join("comments", JoinOptions::default());

    assert_eq!(query.kinds(), vec![SelectAll, JoinTable]);
    assert_eq!(
        query.conditions()[1],
        Condition::JoinTable(Join {
            kind: JoinKind::Inner,
            table: "comments".to_string(),
            key: "id".to_string(),
            foreign_key: "posts.comment_id".to_string(),
        })
    );
}

#[test]
fn test_join_overrides_and_left_join() {
    let query = Query::new(recording("posts")).left_join(
        "users",
        JoinOptions::default().key("uuid").foreign_key("posts.author_uuid"),
    );

    match &query.conditions()[1] {
        Condition::JoinTable(join) => {
            assert_eq!(join.kind, JoinKind::Left);
            assert_eq!(join.key, "uuid");
            assert_eq!(join.foreign_key, "posts.author_uuid");
        }
        other => panic!("expected a join, got {other:?}"),
    }
}

#[test]
fn test_empty_predicate_is_reported_by_terminal_methods() {
    let query = Query::new(recording("authors")).filter(Filter::new()).limit(1);

    assert_eq!(query.kinds(), vec![Limit]);
    assert!(matches!(query.all(), Err(ModelError::Argument(_))));
    assert!(matches!(query.count(), Err(ModelError::Argument(_))));
    assert!(matches!(query.sum("age"), Err(ModelError::Argument(_))));
}

#[test]
fn test_expression_predicates_are_passed_through() {
    let base = recording("authors");
    let query = Query::new(base.clone())
        .filter_expr("age > 18".to_string())
        .or_expr("age < 3".to_string())
        .exclude_expr("name IS NULL".to_string());

    query.scoped();

    assert_eq!(base.scope().calls(), vec!["filter", "or", "exclude"]);
}

#[test]
fn test_fragment_appends_after_own_conditions() {
    let repo = Repository::new(recording("authors"))
        .with_fragment("by_name", |q, args| {
            q.filter(Filter::new().eq("name", args[0].clone()))
        });

    let query = repo
        .query(|q| q.limit(1))
        .fragment("by_name", &[json!("L")])
        .unwrap();

    assert_eq!(query.kinds(), vec![Limit, Where]);
}

#[test]
fn test_unknown_fragment() {
    let repo: Repository<_, SerdeMapping<Author>> = Repository::new(recording("authors"));
    let err = repo.query(|q| q).fragment("missing", &[]).unwrap_err();
    assert_eq!(err, ModelError::UnknownFragment("missing".to_string()));

    let err = Query::new(recording("authors")).fragment("any", &[]).unwrap_err();
    assert_eq!(err, ModelError::UnknownFragment("any".to_string()));
}

#[test]
fn test_merge_concatenates() {
    let left = Query::new(recording("authors")).limit(1);
    let right = Query::new(recording("authors")).order(["name"]).offset(2);

    assert_eq!(left.merge(&right).kinds(), vec![Limit, Order, Offset]);
}
