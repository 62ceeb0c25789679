//! # modelkit demo
//!
//! Declares `User`, `Post` and `Tag` over one [`MemoryAdapter`], then walks
//! through the lifecycle:
//!
//! 1. Saving a user (and failing validation first).
//! 2. Creating posts through the `posts` relation.
//! 3. Tagging a post through a synthesized join type.
//! 4. Querying and removing.

use modelkit::{
    setup_tracing, to_attributes, AttrType, Attribute, Event, MemoryAdapter, Model, ModelError,
    Query, RelationOptions,
};
use serde_json::json;
use tracing::{info, warn, Instrument};

fn timestamps(model: &Model) -> Result<(), ModelError> {
    model.attr(
        "created_at",
        Attribute::new().default_with(|_| json!("2024-01-01T00:00:00Z")),
    )?;
    Ok(())
}

fn declare(storage: &MemoryAdapter) -> Result<(Model, Model, Model), ModelError> {
    let user = Model::new("user");
    user.attr("id", Attribute::primary())?
        .attr("name", Attribute::new().required().kind(AttrType::String))?
        .attr(
            "email",
            Attribute::new().kind(AttrType::String).format("email"),
        )?
        .use_plugin(timestamps)?
        .set_adapter(storage.clone());

    let post = Model::new("post");
    post.attr("id", Attribute::primary())?
        .attr("title", Attribute::new().required())?
        .attr("user_id", Attribute::new())?
        .use_plugin(timestamps)?
        .set_adapter(storage.clone());

    let tag = Model::new("tag");
    tag.attr("id", Attribute::primary())?
        .attr("label", Attribute::new().required())?
        .set_adapter(storage.clone());

    user.has_many(&post, RelationOptions::new())?;
    post.belongs_to(&user, RelationOptions::new().role("author"))?;
    post.has_and_belongs_to_many(
        &tag,
        RelationOptions::new()
            .role("tags")
            .from_key("post_id")
            .to_key("tag_id"),
    )?;

    if let Some(join) = post.relation("tags").and_then(|r| r.through().cloned()) {
        join.set_adapter(storage.clone());
    }

    post.on("after save", |event| {
        if let Event::AfterSave { instance } = event {
            info!(title = ?instance.get("title"), "Post stored");
        }
    });

    Ok((user, post, tag))
}

async fn run() -> Result<(), ModelError> {
    let storage = MemoryAdapter::new();
    let (user, post, tag) = declare(&storage)?;

    let alice = user.build(to_attributes(json!({ "email": "alice@example.com" })));
    let span = tracing::info_span!("user_creation");
    async {
        if let Err(e) = alice.save().await {
            warn!(error = %e, errors = ?e.validation_errors(), "First save rejected");
        }
        alice.set("name", "Alice");
        alice.save().await
    }
    .instrument(span)
    .await?;
    info!(id = %alice.primary()?, "User created");

    let posts = alice.relation("posts")?;
    let created = posts
        .create(vec![
            to_attributes(json!({ "title": "Hello, world" })),
            to_attributes(json!({ "title": "Second thoughts" })),
        ])
        .await?;
    info!(count = posts.count(Query::new()).await?, "Posts created");

    let first = &created[0];
    let rust = tag.build(to_attributes(json!({ "label": "rust" })));
    let notes = tag.build(to_attributes(json!({ "label": "notes" })));
    rust.save().await?;
    notes.save().await?;

    let tags = first.relation("tags")?;
    tags.add(vec![rust.clone(), notes.clone()]).await?;
    let labels: Vec<_> = tags
        .find_all(Query::new())
        .await?
        .iter()
        .filter_map(|t| t.get("label"))
        .collect();
    info!(?labels, "Post tagged");

    tags.remove(vec![notes.primary()?.as_i64().unwrap_or_default()])
        .await?;
    info!(has_notes = tags.has(&notes).await?, "Tag removed");

    let author = first.relation("author")?.find(Query::new()).await?;
    info!(author = ?author.and_then(|a| a.get("name")), "Author loaded");

    let all = post.find_all(Query::new().with("limit", 1)).await?;
    info!(total = all.total, page = all.len(), limit = all.limit, "Paged posts");

    created[1].remove().await?;
    info!(remaining = post.count(Query::new()).await?, "Post removed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();
    info!("Starting modelkit demo");

    run().await.map_err(|e| e.to_string())?;

    info!("Demo complete");
    Ok(())
}
