//! Shared library schema used across the integration tests.
//!
//! - `Publisher` is a class-table base (`SmallPublisher`, `LargePublisher`) with soft deletes.
//! - `Author` is soft-deletable, has a self-referencing `mentor` and an array column.
//! - `BookReview` is a single-table base with `CriticReview` as its only sub-type, which `Quote` joins.
//! - `Comment.parent` is polymorphic over authors, books and publishers.
//! - `Token` has uuid ids; `Session` points at it by foreign key and polymorphically.

use orm_find::metadata::{Column, ColumnCodec, EntityMetadata, MetadataRegistry};
use orm_find::query_builder::{
    CompileOptions, EmitOptions, EmittedSql, FindQueryCompiler, ParsedFindQuery, SqlEmitter,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn library_registry() -> Arc<MetadataRegistry> {
    let registry = MetadataRegistry::builder()
        .entity(
            EntityMetadata::new("PublisherGroup", "pg", "publisher_groups")
                .primitive("name", "name", "varchar")
                .one_to_many("publishers", "Publisher", "group_id"),
        )
        .entity(
            EntityMetadata::new("Publisher", "p", "publishers")
                .primitive("name", "name", "varchar")
                .many_to_one("group", "group_id", "PublisherGroup")
                .one_to_many("authors", "Author", "publisher_id")
                .soft_delete("deleted_at"),
        )
        .entity(
            EntityMetadata::new("SmallPublisher", "p", "small_publishers")
                .extends("Publisher")
                .primitive("city", "city", "varchar"),
        )
        .entity(
            EntityMetadata::new("LargePublisher", "p", "large_publishers")
                .extends("Publisher")
                .primitive("country", "country", "varchar"),
        )
        .entity(
            EntityMetadata::new("Author", "a", "authors")
                .primitive("firstName", "first_name", "varchar")
                .primitive("lastName", "last_name", "varchar")
                .primitive("age", "age", "int")
                .primitive_with(
                    "nicknames",
                    Column::new("nicknames", "varchar[]")
                        .with_codec(ColumnCodec::array_of(ColumnCodec::Identity)),
                )
                .many_to_one("publisher", "publisher_id", "Publisher")
                .many_to_one("mentor", "mentor_id", "Author")
                .one_to_many("books", "Book", "author_id")
                .one_to_one("image", "Image", "author_id")
                .soft_delete("deleted_at"),
        )
        .entity(
            EntityMetadata::new("Book", "b", "books")
                .primitive("title", "title", "varchar")
                .many_to_one("author", "author_id", "Author")
                .one_to_many("reviews", "BookReview", "book_id")
                .many_to_many("tags", "books_to_tags", "book_id", "tag_id", "Tag")
                .default_order("title"),
        )
        .entity(
            EntityMetadata::new("Image", "i", "images")
                .primitive("fileName", "file_name", "varchar")
                .many_to_one("author", "author_id", "Author"),
        )
        .entity(
            EntityMetadata::new("Tag", "t", "tags")
                .primitive("name", "name", "varchar")
                .many_to_many("books", "books_to_tags", "tag_id", "book_id", "Book"),
        )
        .entity(
            EntityMetadata::new("BookReview", "br", "book_reviews")
                .primitive("rating", "rating", "int")
                .many_to_one("book", "book_id", "Book")
                .discriminator("kind"),
        )
        .entity(
            EntityMetadata::new("CriticReview", "br", "book_reviews")
                .extends_single_table("BookReview", "kind", json!("critic"))
                .primitive("outlet", "outlet", "varchar"),
        )
        .entity(
            EntityMetadata::new("Quote", "q", "quotes")
                .primitive("text", "text", "varchar")
                .many_to_one("review", "review_id", "CriticReview"),
        )
        .entity(
            EntityMetadata::new("Comment", "c", "comments")
                .primitive("text", "text", "varchar")
                .polymorphic(
                    "parent",
                    &[
                        ("Author", "parent_author_id"),
                        ("Book", "parent_book_id"),
                        ("Publisher", "parent_publisher_id"),
                    ],
                ),
        )
        .entity(
            EntityMetadata::new("Token", "tk", "tokens")
                .uuid_ids()
                .primitive("label", "label", "varchar")
                .one_to_many("sessions", "Session", "token_id"),
        )
        .entity(
            EntityMetadata::new("Session", "s", "sessions")
                .primitive("ip", "ip", "varchar")
                .many_to_one("token", "token_id", "Token")
                .polymorphic(
                    "subject",
                    &[("Author", "subject_author_id"), ("Token", "subject_token_id")],
                ),
        )
        .build()
        .expect("library schema is valid");
    Arc::new(registry)
}

pub fn compiler() -> FindQueryCompiler {
    FindQueryCompiler::new(library_registry())
}

/// Compile and emit with `?` placeholders.
pub fn find_sql(entity: &str, filter: Value, options: &CompileOptions) -> EmittedSql {
    let query = compile(entity, filter, options);
    SqlEmitter::default().emit(&query, &EmitOptions::default())
}

pub fn compile(entity: &str, filter: Value, options: &CompileOptions) -> ParsedFindQuery {
    compiler()
        .compile(entity, &filter, options)
        .unwrap_or_else(|e| panic!("{entity} {filter} failed to compile: {e}"))
}

/// A fixed uuid for `Token` ids.
pub const TOKEN_UUID: &str = "6f9619ff-8b86-d011-b42d-00cf4fc964ff";

/// Aliases of the root scope's tables, in emission order.
pub fn table_aliases(query: &ParsedFindQuery) -> Vec<String> {
    query.tables.iter().map(|t| t.alias().to_string()).collect()
}
