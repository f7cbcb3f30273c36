use crate::common::*;
use orm_find::constants::SoftDeletes;
use orm_find::query_builder::{CompileOptions, Dialect, EmitOptions, EntityRef, SqlEmitter};
use orm_find::FindError;
use serde_json::json;

#[test]
fn test_primitive_filter() {
    let emitted = find_sql("Book", json!({"title": "Anna Karenina"}), &CompileOptions::default());
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b WHERE b.title = ? ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("Anna Karenina")]);
}

#[test]
fn test_nested_filter_joins_with_soft_delete_guard() {
    let emitted = find_sql(
        "Book",
        json!({"author": {"lastName": "Tolstoy"}}),
        &CompileOptions::default(),
    );
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
         WHERE a.deleted_at IS NULL AND a.last_name = ? ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("Tolstoy")]);
}

#[test]
fn test_id_filters_short_circuit_to_the_foreign_key() {
    for filter in [
        json!({"author": "a:1"}),
        json!({"author": {"id": "a:1"}}),
        json!({"author": 1}),
        json!({"author": EntityRef::new("Author", "a:1").to_filter()}),
        json!({"author": {"id": EntityRef::new("Author", "a:1").to_filter()}}),
    ] {
        let emitted = find_sql("Book", filter.clone(), &CompileOptions::default());
        assert_eq!(
            emitted.sql,
            "SELECT b.* FROM books AS b WHERE b.author_id = ? ORDER BY b.title ASC, b.id ASC",
            "filter {filter}"
        );
        assert_eq!(emitted.bindings, vec![json!(1)], "filter {filter}");
    }
}

#[test]
fn test_guard_join_is_kept_without_pruning() {
    let emitted = find_sql(
        "Book",
        json!({"author": "a:1"}),
        &CompileOptions::default().without_pruning(),
    );
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
         WHERE b.author_id = ? AND a.deleted_at IS NULL ORDER BY b.title ASC, b.id ASC"
    );
}

#[test]
fn test_id_list_and_negation() {
    let emitted = find_sql(
        "Book",
        json!({"author": {"id": ["a:1", "a:2"]}}),
        &CompileOptions::default(),
    );
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b WHERE b.author_id = ANY(?) ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!([1, 2])]);

    let emitted = find_sql("Book", json!({"author": {"ne": "a:3"}}), &CompileOptions::default());
    assert!(emitted.sql.contains("WHERE b.author_id != ? ORDER BY"));
    assert_eq!(emitted.bindings, vec![json!(3)]);
}

#[test]
fn test_null_reference() {
    let emitted = find_sql("Book", json!({"author": null}), &CompileOptions::default());
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b WHERE b.author_id IS NULL ORDER BY b.title ASC, b.id ASC"
    );
    assert!(emitted.bindings.is_empty());

    // Nothing to guard when asking for the absence of an author
    let query = compile(
        "Book",
        json!({"author": null}),
        &CompileOptions::default().without_pruning(),
    );
    assert_eq!(table_aliases(&query), vec!["b"]);
}

#[test]
fn test_unsaved_entity_matches_nothing() {
    let emitted = find_sql(
        "Book",
        json!({"author": EntityRef::unsaved("Author").to_filter()}),
        &CompileOptions::default(),
    );
    assert!(emitted.sql.contains("WHERE b.author_id = ?"));
    assert_eq!(emitted.bindings, vec![json!(-1)]);

    let emitted = find_sql(
        "Book",
        json!({"author": {"id": EntityRef::unsaved("Author").to_filter()}}),
        &CompileOptions::default(),
    );
    assert!(emitted.sql.contains("WHERE b.author_id = ?"));
    assert_eq!(emitted.bindings, vec![json!(-1)]);
}

#[test]
fn test_entity_references_as_primary_key_values() {
    let book = EntityRef::new("Book", "b:1").to_filter();
    let emitted = find_sql("Book", json!({"id": book}), &CompileOptions::default());
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b WHERE b.id = ? ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!(1)]);

    let emitted = find_sql(
        "Book",
        json!({"id": [book, "b:2", EntityRef::unsaved("Book").to_filter()]}),
        &CompileOptions::default(),
    );
    assert!(emitted.sql.contains("WHERE b.id = ANY(?)"));
    assert_eq!(emitted.bindings, vec![json!([1, 2, -1])]);
}

#[test]
fn test_id_and_fields_force_a_join() {
    let emitted = find_sql(
        "Book",
        json!({"author": {"id": "a:1", "lastName": "Tolstoy"}}),
        &CompileOptions::default(),
    );
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
         WHERE a.deleted_at IS NULL AND a.id = ? AND a.last_name = ? ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!(1), json!("Tolstoy")]);
}

#[test]
fn test_two_level_join() {
    let emitted = find_sql(
        "Author",
        json!({"publisher": {"group": {"name": "Big Five"}}}),
        &CompileOptions::default(),
    );
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a \
         JOIN publishers AS p ON a.publisher_id = p.id \
         JOIN publisher_groups AS pg ON p.group_id = pg.id \
         WHERE a.deleted_at IS NULL AND p.deleted_at IS NULL AND pg.name = ? ORDER BY a.id ASC"
    );
}

#[test]
fn test_self_reference_gets_a_second_alias() {
    let emitted = find_sql(
        "Author",
        json!({"lastName": "Tolstoy", "mentor": {"lastName": "Pushkin"}}),
        &CompileOptions::default(),
    );
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a JOIN authors AS a1 ON a.mentor_id = a1.id \
         WHERE a.deleted_at IS NULL AND a.last_name = ? AND a1.deleted_at IS NULL AND a1.last_name = ? \
         ORDER BY a.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("Tolstoy"), json!("Pushkin")]);
}

#[test]
fn test_soft_deletes_can_be_included() {
    let options = CompileOptions::default().with_soft_deletes(SoftDeletes::Include);
    let emitted = find_sql("Author", json!({}), &options);
    assert_eq!(emitted.sql, "SELECT a.* FROM authors AS a ORDER BY a.id ASC");

    let emitted = find_sql("Book", json!({"author": {"lastName": "Tolstoy"}}), &options);
    assert!(!emitted.sql.contains("deleted_at"));
}

#[test]
fn test_postgres_placeholders_are_cast() {
    let query = compile(
        "Book",
        json!({"author": {"lastName": "Tolstoy", "age": {"gte": 40}}}),
        &CompileOptions::default(),
    );
    let emitted = SqlEmitter::new(Dialect::Postgres).emit(&query, &EmitOptions::default());
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
         WHERE a.deleted_at IS NULL AND a.last_name = $1::varchar AND a.age >= $2::int \
         ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("Tolstoy"), json!(40)]);
}

#[test]
fn test_programmer_errors() {
    let compiler = compiler();
    let options = CompileOptions::default();

    let err = compiler
        .compile("Book", &json!({"author": "b:1"}), &options)
        .unwrap_err();
    assert!(matches!(err, FindError::InvalidId { .. }));

    let err = compiler
        .compile("Book", &json!({"author": {"lastNme": "x"}}), &options)
        .unwrap_err();
    assert!(matches!(err, FindError::UnknownField { ref field, .. } if field == "lastNme"));

    let err = compiler
        .compile("Book", &json!({"title": {"near": "x"}}), &options)
        .unwrap_err();
    assert!(matches!(err, FindError::UnsupportedOperator(_)));

    let err = compiler
        .compile("Book", &json!({"author": true}), &options)
        .unwrap_err();
    assert!(matches!(err, FindError::UnsupportedOperator(_)));

    let err = compiler.compile("Magazine", &json!({}), &options).unwrap_err();
    assert!(matches!(err, FindError::UnknownEntity(_)));

    assert!(err.is_programmer_error());
}
