use std::sync::Arc;

use modelkit::{
    to_attributes, Attribute, Capability, MockAdapter, Model, ModelError, Query, RelationKind,
    RelationOptions,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

struct Blog {
    user: Model,
    post: Model,
    tag: Model,
}

fn blog() -> Blog {
    let user = Model::new("user");
    user.attr("id", Attribute::primary())
        .unwrap()
        .attr("name", Attribute::new())
        .unwrap();

    let post = Model::new("post");
    post.attr("id", Attribute::primary())
        .unwrap()
        .attr("title", Attribute::new())
        .unwrap()
        .attr("user_id", Attribute::new())
        .unwrap();

    let tag = Model::new("tag");
    tag.attr("id", Attribute::primary())
        .unwrap()
        .attr("label", Attribute::new())
        .unwrap();

    user.has_many(&post, RelationOptions::new().role("posts").foreign_key("user_id"))
        .unwrap();
    post.belongs_to(&user, RelationOptions::new().role("author").foreign_key("user_id"))
        .unwrap();
    post.has_and_belongs_to_many(
        &tag,
        RelationOptions::new()
            .role("tags")
            .from_key("post_id")
            .to_key("tag_id"),
    )
    .unwrap();

    Blog { user, post, tag }
}

#[tokio::test]
async fn test_has_many_add_without_adapter_sets_foreign_key() {
    let Blog { user, post, .. } = blog();
    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let draft = post.build(to_attributes(json!({ "id": 1 })));

    let added = owner.relation("posts").unwrap().add(vec![&draft]).await.unwrap();

    assert_eq!(added.len(), 1);
    assert!(added[0].ptr_eq(&draft));
    assert_eq!(draft.get("user_id"), Some(json!(2)));
    assert!(!draft.is_dirty());
}

#[tokio::test]
async fn test_belongs_to_add_updates_owner() {
    let Blog { user, post, .. } = blog();
    let entry = post.build(to_attributes(json!({ "id": 5 })));
    let alex = user.build(to_attributes(json!({ "id": 9, "name": "alex" })));

    entry.relation("author").unwrap().add_one(&alex).await.unwrap();

    assert_eq!(entry.get("user_id"), Some(json!(9)));
    assert!(!entry.is_dirty());
    assert!(!alex.is_dirty());
}

#[tokio::test]
async fn test_has_many_remove_nulls_foreign_key() {
    let Blog { user, post, .. } = blog();
    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let entry = post.build(to_attributes(json!({ "id": 1, "user_id": 2 })));

    owner.relation("posts").unwrap().remove(vec![&entry]).await.unwrap();

    assert_eq!(entry.get("user_id"), Some(Value::Null));
}

#[tokio::test]
async fn test_belongs_to_remove_saves_related_then_owner() {
    let Blog { user, post, .. } = blog();
    let saves = Arc::new(Mutex::new(Vec::new()));
    for (model, label) in [(&user, "user"), (&post, "post")] {
        let seen = saves.clone();
        model.on("before save", move |_| seen.lock().push(label));
    }

    let entry = post.build(to_attributes(json!({ "id": 5, "user_id": 9 })));
    let alex = user.build(to_attributes(json!({ "id": 9, "name": "alex" })));
    entry.relation("author").unwrap().remove(vec![&alex]).await.unwrap();

    assert_eq!(*saves.lock(), vec!["user", "post"]);
    assert_eq!(entry.get("user_id"), Some(Value::Null));
    assert!(!entry.is_dirty());
    assert!(!alex.is_dirty());
}

#[tokio::test]
async fn test_create_without_adapter_links_in_order() {
    let Blog { user, .. } = blog();
    let owner = user.build(to_attributes(json!({ "id": 3 })));

    let created = owner
        .relation("posts")
        .unwrap()
        .create(vec![
            to_attributes(json!({ "title": "one" })),
            to_attributes(json!({ "title": "two" })),
        ])
        .await
        .unwrap();

    let titles: Vec<_> = created.iter().filter_map(|p| p.get("title")).collect();
    assert_eq!(titles, vec![json!("one"), json!("two")]);
    assert!(created.iter().all(|p| p.get("user_id") == Some(json!(3))));
}

#[tokio::test]
async fn test_many_to_many_join_type_is_shared() {
    let Blog { post, tag, .. } = blog();
    tag.has_and_belongs_to_many(
        &post,
        RelationOptions::new()
            .role("posts")
            .from_key("tag_id")
            .to_key("post_id"),
    )
    .unwrap();

    let from_post = post.relation("tags").unwrap();
    let from_tag = tag.relation("posts").unwrap();
    let join = from_post.through().unwrap();

    assert!(join.ptr_eq(from_tag.through().unwrap()));
    assert_eq!(from_post.kind(), RelationKind::HasAndBelongsToMany);
    // Both participants see the relation that names the join type.
    assert!(tag
        .relations()
        .iter()
        .any(|r| r.through().is_some_and(|t| t.ptr_eq(join))));
    assert!(post
        .relations()
        .iter()
        .any(|r| r.through().is_some_and(|t| t.ptr_eq(join))));
}

#[tokio::test]
async fn test_many_to_many_add_resolves_ids_and_saves_join_rows() {
    let Blog { post, tag, .. } = blog();
    let tags = MockAdapter::new();
    tags.expect_find_all().return_ok(vec![to_attributes(json!({ "id": 1, "label": "rust" }))].into());
    tag.set_adapter(tags.clone());

    let join = post.relation("tags").unwrap().through().cloned().unwrap();
    let rows = MockAdapter::new();
    rows.expect_save()
        .return_ok(Some(to_attributes(json!({ "id": 100 }))));
    join.set_adapter(rows.clone());

    let entry = post.build(to_attributes(json!({ "id": 7 })));
    let added = entry
        .relation("tags")
        .unwrap()
        .add(vec![1, 2])
        .await
        .unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(added[0].get("label"), Some(json!("rust")));
    assert_eq!(
        tags.calls()[0].payload,
        json!({ "id": { "$in": [1, 2] }, "limit": 2 })
    );
    assert_eq!(rows.calls()[0].payload, json!({ "post_id": 7, "tag_id": 1 }));
    tags.verify();
    rows.verify();
}

#[tokio::test]
async fn test_many_to_many_remove_deletes_join_row() {
    let Blog { post, tag, .. } = blog();
    let join = post.relation("tags").unwrap().through().cloned().unwrap();
    let rows = MockAdapter::new();
    rows.expect_find()
        .return_ok(Some(to_attributes(json!({ "id": 100, "post_id": 7, "tag_id": 1 }))));
    rows.expect_remove().return_ok(());
    join.set_adapter(rows.clone());

    let entry = post.build(to_attributes(json!({ "id": 7 })));
    let rust = tag.build(to_attributes(json!({ "id": 1 })));
    entry.relation("tags").unwrap().remove(vec![&rust]).await.unwrap();

    rows.verify();
    assert_eq!(rows.calls()[0].payload, json!({ "post_id": 7, "tag_id": 1 }));
    assert_eq!(rows.calls()[1].payload, json!(100));
}

#[tokio::test]
async fn test_bulk_add_short_circuits_per_item_saves() {
    let Blog { user, post, .. } = blog();
    let users = MockAdapter::new();
    users.expect_related_add().return_ok(());
    user.set_adapter(users.clone());
    let posts = MockAdapter::new();
    post.set_adapter(posts.clone());

    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let entry = post.build(to_attributes(json!({ "id": 1 })));
    owner.relation("posts").unwrap().add(vec![&entry]).await.unwrap();

    users.verify();
    assert_eq!(users.calls()[0].payload, json!([1]));
    assert!(posts.calls().is_empty());
    assert_eq!(entry.get("user_id"), Some(Value::Null));
}

#[tokio::test]
async fn test_bulk_create_hydrates_adapter_rows() {
    let Blog { user, post, .. } = blog();
    let posts = MockAdapter::new();
    posts.expect_related_create().return_ok(vec![to_attributes(
        json!({ "id": 12, "title": "bulk", "user_id": 2 }),
    )]);
    post.set_adapter(posts.clone());

    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let created = owner
        .relation("posts")
        .unwrap()
        .create_one(to_attributes(json!({ "title": "bulk" })))
        .await
        .unwrap();

    posts.verify();
    assert_eq!(created.primary().unwrap(), json!(12));
    assert_eq!(posts.calls()[0].payload, json!([{ "title": "bulk" }]));
}

#[tokio::test]
async fn test_reads_go_to_related_adapter() {
    let Blog { user, post, .. } = blog();
    let posts = MockAdapter::new();
    posts.expect_related_find_all().return_ok(vec![
        to_attributes(json!({ "id": 1, "title": "a", "user_id": 2 })),
        to_attributes(json!({ "id": 2, "title": "b", "user_id": 2 })),
    ]);
    posts.expect_related_count().return_ok(2);
    posts.expect_related_find()
        .return_ok(Some(to_attributes(json!({ "id": 2, "title": "b" }))));
    post.set_adapter(posts.clone());

    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let relation = owner.relation("posts").unwrap();

    let all = relation.all(Query::new()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|p| p.model().ptr_eq(&post)));
    assert_eq!(relation.count(Query::new()).await.unwrap(), 2);
    let found = relation.find_one(Query::new().with("title", "b")).await.unwrap();
    assert_eq!(found.unwrap().primary().unwrap(), json!(2));
    posts.verify();
}

#[tokio::test]
async fn test_has_asks_owner_adapter() {
    let Blog { user, post, .. } = blog();
    let users = MockAdapter::new();
    users.expect_related_has().return_ok(true);
    user.set_adapter(users.clone());

    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let entry = post.build(to_attributes(json!({ "id": 4 })));

    assert!(owner.relation("posts").unwrap().has(&entry).await.unwrap());
    assert_eq!(users.calls()[0].payload, json!(4));
}

#[tokio::test]
async fn test_reads_without_capability_fail() {
    let Blog { user, post, .. } = blog();
    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let relation = owner.relation("posts").unwrap();

    let err = relation.find_all(Query::new()).await.unwrap_err();
    assert!(matches!(err, ModelError::NoAdapterSupport(Capability::RelatedFindAll)));
    assert!(err.is_structural());

    let err = relation.count(Query::new()).await.unwrap_err();
    assert!(matches!(err, ModelError::NoAdapterSupport(Capability::RelatedCount)));

    let entry = post.create_empty();
    let err = relation.has(&entry).await.unwrap_err();
    assert!(matches!(err, ModelError::NoAdapterSupport(Capability::RelatedHas)));
}

#[test]
fn test_unknown_relation() {
    let Blog { user, .. } = blog();
    let owner = user.create_empty();
    let err = owner.relation("comments").unwrap_err();
    assert_eq!(err.to_string(), "Relation \"comments\" not defined.");
    assert!(err.is_structural());

    // Relations are looked up on the owning side only.
    assert!(owner.relation("author").is_err());
}

#[tokio::test]
async fn test_failed_item_stops_the_loop() {
    let Blog { user, post, .. } = blog();
    let posts = MockAdapter::new();
    posts.expect_save().return_ok(None);
    posts.expect_save()
        .return_err(ModelError::adapter("constraint violated"));
    post.set_adapter(posts.clone());

    let owner = user.build(to_attributes(json!({ "id": 2 })));
    let first = post.build(to_attributes(json!({ "id": 1 })));
    let second = post.build(to_attributes(json!({ "id": 2 })));
    let third = post.build(to_attributes(json!({ "id": 3 })));

    let err = owner
        .relation("posts")
        .unwrap()
        .add(vec![&first, &second, &third])
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "constraint violated");
    assert!(!first.is_dirty());
    assert!(second.is_dirty());
    assert_eq!(third.get("user_id"), Some(Value::Null));
    posts.verify();
}
