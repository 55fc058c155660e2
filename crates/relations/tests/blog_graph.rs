use std::rc::Rc;

use elif_relations::{
    EmbedOptions, FetchOptions, Hydration, Item, MemoryStore, ModelRegistry, Orm, OrmConfig,
    RelationshipConfig, RelationshipType, SaveOptions, Schema, FieldType, Keys,
};
use serde_json::{json, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("elif_relations=debug")
        .try_init();
}

/// Models are registered under path-like identities; conventions use the basename
fn registry() -> ModelRegistry {
    ModelRegistry::builder()
        .schema(
            Schema::new("blog::Author")
                .field("id", FieldType::Integer)
                .field("name", FieldType::String),
        )
        .schema(
            Schema::new("blog::Post")
                .field("id", FieldType::Integer)
                .field("author_id", FieldType::Integer)
                .field("title", FieldType::String)
                .field("published_at", FieldType::DateTime),
        )
        .schema(
            Schema::new("blog::Comment")
                .field("id", FieldType::Integer)
                .field("post_id", FieldType::Integer)
                .field("body", FieldType::String),
        )
        .schema(
            Schema::new("blog::Category")
                .field("id", FieldType::Integer)
                .field("slug", FieldType::String),
        )
        .schema(
            Schema::new("blog::PostCategory")
                .source("posts_categories")
                .field("id", FieldType::Integer)
                .field("post_id", FieldType::Integer)
                .field("category_id", FieldType::Integer)
                .field("position", FieldType::Integer),
        )
        .bind(
            "blog::Author",
            RelationshipConfig::new(RelationshipType::HasMany).to("blog::Post"),
        )
        .bind(
            "blog::Post",
            RelationshipConfig::new(RelationshipType::BelongsTo).to("blog::Author"),
        )
        .bind(
            "blog::Post",
            RelationshipConfig::new(RelationshipType::HasMany).to("blog::Comment"),
        )
        .bind(
            "blog::Post",
            RelationshipConfig::has_many("posts_categories", "blog::PostCategory"),
        )
        .bind(
            "blog::Post",
            RelationshipConfig::new(RelationshipType::HasManyThrough)
                .named("categories")
                .through("posts_categories"),
        )
        .bind(
            "blog::PostCategory",
            RelationshipConfig::new(RelationshipType::BelongsTo).to("blog::Category"),
        )
        .bind(
            "blog::Comment",
            RelationshipConfig::new(RelationshipType::BelongsTo).to("blog::Post"),
        )
        .build()
        .unwrap()
}

fn store() -> Rc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .seed(
            "authors",
            [json!({"id": 1, "name": "Ada"}), json!({"id": 2, "name": "Linus"})],
        )
        .unwrap();
    store
        .seed(
            "posts",
            [
                json!({"id": 1, "author_id": 1, "title": "Notes on the engine", "published_at": "2024-03-01 10:00:00"}),
                json!({"id": 2, "author_id": "1", "title": "Loops", "published_at": null}),
                json!({"id": 3, "author_id": 2, "title": "Kernels", "published_at": 1700000000}),
            ],
        )
        .unwrap();
    store
        .seed(
            "comments",
            [
                json!({"id": 1, "post_id": 1, "body": "Great"}),
                json!({"id": 2, "post_id": 1, "body": "Thanks"}),
                json!({"id": 3, "post_id": 3, "body": "Nice"}),
            ],
        )
        .unwrap();
    store
        .seed(
            "categories",
            [
                json!({"id": 1, "slug": "math"}),
                json!({"id": 2, "slug": "history"}),
                json!({"id": 3, "slug": "systems"}),
            ],
        )
        .unwrap();
    store
        .seed(
            "posts_categories",
            [
                json!({"id": 1, "post_id": 1, "category_id": 2, "position": 1}),
                json!({"id": 2, "post_id": 1, "category_id": 1, "position": 2}),
                json!({"id": 3, "post_id": 3, "category_id": 3, "position": 1}),
            ],
        )
        .unwrap();
    Rc::new(store)
}

fn orm() -> (Orm, Rc<MemoryStore>) {
    init_tracing();
    let store = store();
    (Orm::new(registry(), store.clone()), store)
}

#[test]
fn test_conventions_resolve_path_like_models() {
    let registry = registry();
    let post = registry.schema("blog::Post").unwrap();
    assert_eq!(post.source_name(), "posts");
    assert_eq!(registry.schema("blog::Category").unwrap().source_name(), "categories");

    let author = post.relation("author").unwrap();
    assert_eq!(author.keys(), &Keys::new("author_id", "id"));
    let categories = post.relation("categories").unwrap();
    assert_eq!(categories.using(), Some("category"));
    assert_eq!(categories.to(), "blog::Category");
    assert!(post.relation("posts_categories").unwrap().is_junction());
    assert_eq!(
        registry.schema("blog::Author").unwrap().relation("posts").unwrap().keys(),
        &Keys::new("id", "author_id")
    );
}

#[test]
fn test_nested_embed_costs_one_fetch_per_relation() {
    let (orm, store) = orm();
    let authors = orm.all("blog::Author", &FetchOptions::default()).unwrap();
    store.reset_log();

    orm.embed(
        &authors,
        &["posts.comments", "posts.categories", "posts.author"],
        &EmbedOptions::new(),
    )
    .unwrap();
    // posts, comments, posts_categories, categories, authors
    assert_eq!(store.fetch_count(), 5);

    let ada = authors.borrow().get_at(0).and_then(Item::as_entity).cloned().unwrap();
    let exported = ada.borrow().to_value();
    let first = &exported["posts"][0];
    assert_eq!(first["title"], json!("Notes on the engine"));
    assert_eq!(first["published_at"], json!("2024-03-01T10:00:00Z"));
    assert_eq!(first["comments"][1]["body"], json!("Thanks"));
    let slugs: Vec<Value> = first["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|category| category["slug"].clone())
        .collect();
    assert_eq!(slugs, vec![json!("history"), json!("math")]);

    // Post 2 stores its author key as a string and still correlates
    assert_eq!(exported["posts"][1]["title"], json!("Loops"));
    assert_eq!(exported["posts"][1]["published_at"], Value::Null);
    assert_eq!(exported["posts"][1]["categories"], json!([]));
    // Nested belongsTo rows are fetched anew, not shared with the outer collection
    assert_eq!(first["author"], json!({"id": 1, "name": "Ada"}));
}

#[test]
fn test_default_array_hydration_exports_plain_rows() {
    init_tracing();
    let orm = Orm::new(registry(), store())
        .with_config(OrmConfig::default().with_default_hydration(Hydration::Array));
    let posts = orm.all("blog::Post", &orm.options()).unwrap();

    orm.embed(&posts, &["author", "categories"], &EmbedOptions::new())
        .unwrap();

    let exported = posts.borrow().to_value();
    assert_eq!(exported[2]["author"]["name"], json!("Linus"));
    assert_eq!(exported[2]["published_at"], json!("2023-11-14T22:13:20Z"));
    assert_eq!(exported[2]["categories"], json!([{"id": 3, "slug": "systems"}]));
    assert_eq!(exported[1]["author"]["name"], json!("Ada"));
}

#[test]
fn test_new_author_with_posts_saved_in_one_call() {
    let (orm, store) = orm();
    let grace = orm
        .create(
            "blog::Author",
            json!({"name": "Grace", "posts": [{"title": "Compilers"}, {"title": "Debugging"}]}),
        )
        .unwrap();

    assert!(orm
        .save(&grace, &SaveOptions::new().with_embed(["posts"]))
        .unwrap());

    assert_eq!(grace.borrow().key_value(), Some(json!(3)));
    let posts: Vec<_> = store
        .rows("posts")
        .into_iter()
        .filter(|row| row.get("author_id") == Some(&json!(3)))
        .map(|row| row["title"].clone())
        .collect();
    assert_eq!(posts, vec![json!("Compilers"), json!("Debugging")]);
    assert!(!grace.borrow().modified());
}

#[test]
fn test_dropped_comment_is_detached_not_deleted() {
    let (orm, store) = orm();
    let post = orm.find("blog::Post", 1).unwrap().unwrap();
    let comments = orm.load(&post, "comments").unwrap();
    let comments = comments.as_collection().cloned().unwrap();

    comments.borrow_mut().splice(0, 1);
    orm.save(&post, &SaveOptions::new().with_embed(["comments"]))
        .unwrap();

    let first = store.find("comments", &json!(1)).unwrap();
    assert_eq!(first["post_id"], Value::Null);
    let second = store.find("comments", &json!(2)).unwrap();
    assert_eq!(second["post_id"], json!(1));
}
