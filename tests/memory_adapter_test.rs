use modelkit::{
    to_attributes, Attribute, MemoryAdapter, Model, Query, RelationOptions,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

struct Store {
    storage: MemoryAdapter,
    user: Model,
    post: Model,
    tag: Model,
}

fn store() -> Store {
    let storage = MemoryAdapter::new();

    let user = Model::new("user");
    user.attr("id", Attribute::primary())
        .unwrap()
        .attr("name", Attribute::new().required())
        .unwrap()
        .set_adapter(storage.clone());

    let post = Model::new("post");
    post.attr("id", Attribute::primary())
        .unwrap()
        .attr("title", Attribute::new())
        .unwrap()
        .attr("user_id", Attribute::new())
        .unwrap()
        .set_adapter(storage.clone());

    let tag = Model::new("tag");
    tag.attr("id", Attribute::primary())
        .unwrap()
        .attr("label", Attribute::new())
        .unwrap()
        .set_adapter(storage.clone());

    user.has_many(&post, RelationOptions::new()).unwrap();
    post.belongs_to(&user, RelationOptions::new().role("author"))
        .unwrap();
    post.has_and_belongs_to_many(&tag, RelationOptions::new()).unwrap();
    if let Some(join) = post.relation("tags").and_then(|r| r.through().cloned()) {
        join.set_adapter(storage.clone());
    }

    Store {
        storage,
        user,
        post,
        tag,
    }
}

#[tokio::test]
async fn test_save_assigns_ids_and_updates_in_place() {
    let Store { storage, user, .. } = store();

    let alex = user.build(to_attributes(json!({ "name": "alex" })));
    let sam = user.build(to_attributes(json!({ "name": "sam" })));
    alex.save().await.unwrap();
    sam.save().await.unwrap();
    assert_eq!(alex.primary().unwrap(), json!(1));
    assert_eq!(sam.primary().unwrap(), json!(2));

    alex.set("name", "alexandra");
    alex.save().await.unwrap();
    assert_eq!(storage.len("user"), 2);

    let found = user.find(1).await.unwrap().unwrap();
    assert_eq!(found.get("name"), Some(json!("alexandra")));
    assert!(!found.ptr_eq(&alex));
}

#[tokio::test]
async fn test_explicit_ids_advance_the_counter() {
    let Store { user, .. } = store();

    let fixed = user.build(to_attributes(json!({ "id": 10, "name": "fixed" })));
    fixed.save().await.unwrap();
    let next = user.build(to_attributes(json!({ "name": "next" })));
    next.save().await.unwrap();

    assert_eq!(next.primary().unwrap(), json!(11));
}

#[tokio::test]
async fn test_queries_and_pagination() {
    let Store { user, .. } = store();
    for name in ["a", "b", "c", "d"] {
        user.build(to_attributes(json!({ "name": name })))
            .save()
            .await
            .unwrap();
    }

    let page = user
        .find_all(Query::new().with("offset", 1).with("limit", 2))
        .await
        .unwrap();
    let names: Vec<_> = page.iter().filter_map(|u| u.get("name")).collect();
    assert_eq!(names, vec![json!("b"), json!("c")]);
    assert_eq!((page.total, page.offset, page.limit), (4, 1, 2));

    let picked = user
        .find_all(Query::any_of("id", vec![json!(1), json!(4)]))
        .await
        .unwrap();
    assert_eq!(picked.len(), 2);
    assert_eq!(picked.limit, 50);

    assert_eq!(user.count(Query::new().with("name", "c")).await.unwrap(), 1);
    assert!(user.find_one(Query::new().with("name", "z")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_all_pages_by_default_limit() {
    let Store { post, .. } = store();
    for n in 0..55 {
        post.build(to_attributes(json!({ "title": format!("post {n}") })))
            .save()
            .await
            .unwrap();
    }

    let page = post.find_all(Query::new()).await.unwrap();
    assert_eq!(page.len(), 50);
    assert_eq!((page.total, page.offset, page.limit), (55, 0, 50));

    let rest = post.find_all(Query::new().with("offset", 50)).await.unwrap();
    assert_eq!(rest.len(), 5);
    assert_eq!(rest.limit, 50);
}

#[tokio::test]
async fn test_remove_and_remove_all() {
    let Store { storage, user, .. } = store();
    let alex = user.build(to_attributes(json!({ "name": "alex" })));
    let sam = user.build(to_attributes(json!({ "name": "sam" })));
    alex.save().await.unwrap();
    sam.save().await.unwrap();

    alex.remove().await.unwrap();
    assert_eq!(alex.primary().unwrap(), Value::Null);
    assert_eq!(storage.len("user"), 1);

    user.remove_all(Query::new().with("name", "sam")).await.unwrap();
    assert!(storage.is_empty("user"));
}

#[tokio::test]
async fn test_has_many_round_trip() {
    let Store { user, post, .. } = store();
    let alex = user.build(to_attributes(json!({ "name": "alex" })));
    alex.save().await.unwrap();
    let other = user.build(to_attributes(json!({ "name": "sam" })));
    other.save().await.unwrap();

    let posts = alex.relation("posts").unwrap();
    posts
        .create(vec![
            to_attributes(json!({ "title": "one" })),
            to_attributes(json!({ "title": "two" })),
        ])
        .await
        .unwrap();
    other
        .relation("posts")
        .unwrap()
        .create_one(to_attributes(json!({ "title": "elsewhere" })))
        .await
        .unwrap();

    assert_eq!(posts.count(Query::new()).await.unwrap(), 2);
    assert_eq!(post.count(Query::new()).await.unwrap(), 3);

    let two = posts
        .find(Query::new().with("title", "two"))
        .await
        .unwrap()
        .unwrap();
    assert!(posts.has(&two).await.unwrap());

    posts.remove(vec![&two]).await.unwrap();
    assert_eq!(posts.count(Query::new()).await.unwrap(), 1);
    assert_eq!(two.get("user_id"), Some(Value::Null));
}

#[tokio::test]
async fn test_belongs_to_round_trip() {
    let Store { user, post, .. } = store();
    let entry = post.build(to_attributes(json!({ "title": "hello" })));
    entry.save().await.unwrap();

    let author = entry.relation("author").unwrap();
    assert!(author.get(Query::new()).await.unwrap().is_none());

    let created = author
        .create_one(to_attributes(json!({ "name": "alex" })))
        .await
        .unwrap();
    assert_eq!(entry.get("user_id"), Some(created.primary().unwrap()));

    let loaded = author.get(Query::new()).await.unwrap().unwrap();
    assert_eq!(loaded.get("name"), Some(json!("alex")));

    author.remove(vec![&created]).await.unwrap();
    assert!(author.get(Query::new()).await.unwrap().is_none());
    let stored = post.find(entry.primary().unwrap().as_i64().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.get("user_id"), Some(Value::Null));
}

#[tokio::test]
async fn test_many_to_many_round_trip() {
    let Store {
        storage, post, tag, ..
    } = store();
    let entry = post.build(to_attributes(json!({ "title": "hello" })));
    entry.save().await.unwrap();
    for label in ["rust", "notes", "misc"] {
        tag.build(to_attributes(json!({ "label": label })))
            .save()
            .await
            .unwrap();
    }

    let tags = entry.relation("tags").unwrap();
    let added = tags.add(vec![1, 3, 99]).await.unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(storage.len("post_tag"), 2);

    let labels: Vec<_> = tags
        .all(Query::new())
        .await
        .unwrap()
        .iter()
        .filter_map(|t| t.get("label"))
        .collect();
    assert_eq!(labels, vec![json!("rust"), json!("misc")]);

    let created = tags
        .create_one(to_attributes(json!({ "label": "fresh" })))
        .await
        .unwrap();
    assert_eq!(tags.count(Query::new()).await.unwrap(), 3);
    assert!(tags.has(&created).await.unwrap());

    tags.remove(vec![1]).await.unwrap();
    assert_eq!(tags.count(Query::new()).await.unwrap(), 2);
    assert_eq!(storage.len("post_tag"), 2);
    assert_eq!(storage.len("tag"), 4);

    let rows = storage.rows("post_tag");
    assert!(rows.iter().all(|row| row.get("post_id") == Some(&json!(1))));
}

#[tokio::test]
async fn test_has_one_through_key_uses_join_rows() {
    let Store { storage, user, .. } = store();
    let group = Model::new("group");
    group
        .attr("id", Attribute::primary())
        .unwrap()
        .attr("name", Attribute::new())
        .unwrap()
        .set_adapter(storage.clone());
    user.has_one(
        &group,
        RelationOptions::new()
            .role("group")
            .through_key("group_id")
            .foreign_key("user_id"),
    )
    .unwrap();
    if let Some(join) = user.relation("group").and_then(|r| r.through().cloned()) {
        join.set_adapter(storage.clone());
    }

    let alex = user.build(to_attributes(json!({ "name": "alex" })));
    alex.save().await.unwrap();
    let membership = alex.relation("group").unwrap();
    membership
        .create_one(to_attributes(json!({ "name": "admins" })))
        .await
        .unwrap();

    let found = membership.get(Query::new()).await.unwrap().unwrap();
    assert_eq!(found.get("name"), Some(json!("admins")));
    assert_eq!(storage.len("group_user"), 1);
}
