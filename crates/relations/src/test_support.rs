//! Shared test fixtures: a gallery / image / tag graph on a memory store

pub mod fixtures {
    use std::rc::Rc;

    use serde_json::json;

    use crate::config::RelationshipConfig;
    use crate::orm::Orm;
    use crate::schema::{FieldType, ModelRegistry, RegistryBuilder, Schema};
    use crate::store::MemoryStore;

    /// Gallery 1-n Image, Gallery 1-1 GalleryDetail, Image n-n Tag through ImageTag
    pub fn registry() -> ModelRegistry {
        builder().build().expect("fixture registry")
    }

    /// Schemas and bindings of [`registry`], open to further bindings
    pub fn builder() -> RegistryBuilder {
        ModelRegistry::builder()
            .schema(
                Schema::new("Gallery")
                    .field("id", FieldType::Integer)
                    .field("name", FieldType::String),
            )
            .schema(
                Schema::new("GalleryDetail")
                    .field("id", FieldType::Integer)
                    .field("gallery_id", FieldType::Integer)
                    .field("description", FieldType::String),
            )
            .schema(
                Schema::new("Image")
                    .field("id", FieldType::Integer)
                    .field("gallery_id", FieldType::Integer)
                    .field("name", FieldType::String)
                    .field("title", FieldType::String),
            )
            .schema(
                Schema::new("ImageTag")
                    .source("images_tags")
                    .field("id", FieldType::Integer)
                    .field("image_id", FieldType::Integer)
                    .field("tag_id", FieldType::Integer),
            )
            .schema(
                Schema::new("Tag")
                    .field("id", FieldType::Integer)
                    .field("name", FieldType::String),
            )
            .bind("Gallery", RelationshipConfig::has_many("images", "Image"))
            .bind("Gallery", RelationshipConfig::has_one("detail", "GalleryDetail"))
            .bind("GalleryDetail", RelationshipConfig::belongs_to("gallery", "Gallery"))
            .bind("Image", RelationshipConfig::belongs_to("gallery", "Gallery"))
            .bind("Image", RelationshipConfig::has_many("images_tags", "ImageTag"))
            .bind(
                "Image",
                RelationshipConfig::has_many_through("tags", "images_tags", "tag"),
            )
            .bind("ImageTag", RelationshipConfig::belongs_to("image", "Image"))
            .bind("ImageTag", RelationshipConfig::belongs_to("tag", "Tag"))
            .bind("Tag", RelationshipConfig::has_many("images_tags", "ImageTag"))
            .bind(
                "Tag",
                RelationshipConfig::has_many_through("images", "images_tags", "image"),
            )
    }

    /// Seeded store; image 5 has no gallery, tag 4 and gallery 3 are unused
    pub fn store() -> Rc<MemoryStore> {
        let store = MemoryStore::new();
        store
            .seed(
                "galleries",
                [
                    json!({"id": 1, "name": "Amiga"}),
                    json!({"id": 2, "name": "Server rooms"}),
                    json!({"id": 3, "name": "Empty"}),
                ],
            )
            .expect("galleries");
        store
            .seed(
                "gallery_details",
                [
                    json!({"id": 1, "gallery_id": 1, "description": "Retro computers"}),
                    json!({"id": 2, "gallery_id": 2, "description": "Racks and cables"}),
                ],
            )
            .expect("gallery_details");
        store
            .seed(
                "images",
                [
                    json!({"id": 1, "gallery_id": 1, "name": "amiga_1200.jpg", "title": "Amiga 1200"}),
                    json!({"id": 2, "gallery_id": 1, "name": "amiga_500.jpg", "title": "Amiga 500"}),
                    json!({"id": 3, "gallery_id": 2, "name": "srv_room.jpg", "title": "Server room"}),
                    json!({"id": 4, "gallery_id": 2, "name": "srv_rack.jpg", "title": "Server rack"}),
                    json!({"id": 5, "gallery_id": null, "name": "unsorted.jpg", "title": "Unsorted"}),
                ],
            )
            .expect("images");
        store
            .seed(
                "tags",
                [
                    json!({"id": 1, "name": "Computer"}),
                    json!({"id": 2, "name": "Travel"}),
                    json!({"id": 3, "name": "Server"}),
                    json!({"id": 4, "name": "Unused"}),
                ],
            )
            .expect("tags");
        store
            .seed(
                "images_tags",
                [
                    json!({"id": 1, "image_id": 1, "tag_id": 1}),
                    json!({"id": 2, "image_id": 1, "tag_id": 2}),
                    json!({"id": 3, "image_id": 2, "tag_id": 1}),
                    json!({"id": 4, "image_id": 3, "tag_id": 3}),
                    json!({"id": 5, "image_id": 3, "tag_id": 1}),
                    json!({"id": 6, "image_id": 5, "tag_id": 2}),
                ],
            )
            .expect("images_tags");
        Rc::new(store)
    }

    /// Engine over a freshly seeded store, with the store kept for assertions
    pub fn orm() -> (Orm, Rc<MemoryStore>) {
        let store = store();
        let orm = Orm::new(registry(), store.clone());
        (orm, store)
    }
}
