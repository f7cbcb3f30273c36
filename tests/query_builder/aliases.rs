use crate::common::*;
use orm_find::constants::CollectionJoins;
use orm_find::query_builder::{AliasExpression, CompileOptions, EntityAlias};
use orm_find::FindError;
use serde_json::json;

#[test]
fn test_or_across_one_joined_alias() {
    let a = EntityAlias::new("Author");
    let options = CompileOptions::default().with_conditions(AliasExpression::or(vec![
        a.primitive("lastName").eq("Tolstoy"),
        a.primitive("firstName").is_null(),
    ]));
    let emitted = find_sql("Book", json!({"author": a.marker()}), &options);
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
         WHERE a.deleted_at IS NULL AND (a.last_name = ? OR a.first_name IS NULL) \
         ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("Tolstoy")]);
}

#[test]
fn test_root_alias_and_nested_expression() {
    let b = EntityAlias::new("Book");
    let a = EntityAlias::new("Author");
    let options = CompileOptions::default().with_conditions(AliasExpression::and(vec![
        b.primitive("title").like("A%"),
        AliasExpression::or(vec![
            a.primitive("age").gt(30),
            a.many_to_one("publisher").eq("p:2"),
        ]),
    ]));
    let mut filter = b.marker();
    filter["author"] = a.marker();
    let emitted = find_sql("Book", filter, &options);
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
         WHERE a.deleted_at IS NULL AND b.title LIKE ? AND (a.age > ? OR a.publisher_id = ?) \
         ORDER BY b.title ASC, b.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("A%"), json!(30), json!(2)]);
}

#[test]
fn test_alias_marker_alongside_fields() {
    let a = EntityAlias::new("Author");
    let options =
        CompileOptions::default().with_conditions(a.primitive("firstName").ne("Leo"));
    let emitted = find_sql(
        "Book",
        json!({"author": {"$alias": a.handle(), "lastName": "Tolstoy"}}),
        &options,
    );
    assert_eq!(
        emitted.sql,
        "SELECT b.* FROM books AS b JOIN authors AS a ON b.author_id = a.id \
         WHERE a.deleted_at IS NULL AND a.last_name = ? AND a.first_name != ? \
         ORDER BY b.title ASC, b.id ASC"
    );
}

#[test]
fn test_alias_on_a_collection() {
    let b = EntityAlias::new("Book");
    let options = CompileOptions::default().with_conditions(b.primitive("title").is_in(["x", "y"]));
    let emitted = find_sql("Author", json!({"books": b.marker()}), &options);
    assert_eq!(
        emitted.sql,
        "SELECT DISTINCT a.* FROM authors AS a LEFT OUTER JOIN books AS b ON a.id = b.author_id \
         WHERE a.deleted_at IS NULL AND b.title = ANY(?) ORDER BY a.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!(["x", "y"])]);
}

/// `authors a` with `books b` bound, and `a.lastName = 'Tolstoy' OR b.title = 'Hadji Murat'`.
fn root_or_collection(collection_joins: CollectionJoins) -> orm_find::query_builder::EmittedSql {
    let a = EntityAlias::new("Author");
    let b = EntityAlias::new("Book");
    let options = CompileOptions::default()
        .with_collection_joins(collection_joins)
        .with_conditions(AliasExpression::or(vec![
            a.primitive("lastName").eq("Tolstoy"),
            b.primitive("title").eq("Hadji Murat"),
        ]));
    let mut filter = a.marker();
    filter["books"] = b.marker();
    find_sql("Author", filter, &options)
}

#[test]
fn test_or_across_root_and_collection_outer() {
    let emitted = root_or_collection(CollectionJoins::Outer);
    assert_eq!(
        emitted.sql,
        "SELECT DISTINCT a.* FROM authors AS a LEFT OUTER JOIN books AS b ON a.id = b.author_id \
         WHERE a.deleted_at IS NULL AND (a.last_name = ? OR b.title = ?) ORDER BY a.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("Tolstoy"), json!("Hadji Murat")]);
}

#[test]
fn test_or_across_root_and_collection_lateral() {
    let emitted = root_or_collection(CollectionJoins::Lateral);
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a \
         CROSS JOIN LATERAL (SELECT count(*) AS _, BOOL_OR(b.title = ?) AS _b_0 FROM books AS b \
         WHERE b.author_id = a.id) AS _b \
         WHERE a.deleted_at IS NULL AND (a.last_name = ? OR _b._b_0 = ?) ORDER BY a.id ASC"
    );
    assert_eq!(
        emitted.bindings,
        vec![json!("Hadji Murat"), json!("Tolstoy"), json!(true)]
    );
}

#[test]
fn test_alias_condition_on_a_lateral_collection_needs_a_member() {
    let b = EntityAlias::new("Book");
    let options = CompileOptions::default()
        .with_collection_joins(CollectionJoins::Lateral)
        .with_conditions(b.primitive("title").eq("Hadji Murat"));
    let emitted = find_sql("Author", json!({"books": b.marker()}), &options);
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a \
         CROSS JOIN LATERAL (SELECT count(*) AS _ FROM books AS b \
         WHERE b.author_id = a.id AND b.title = ?) AS _b \
         WHERE a.deleted_at IS NULL AND _b._ > ? ORDER BY a.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("Hadji Murat"), json!(0)]);

    // Bound but never read: no existence check, and the lateral is pruned.
    let emitted = find_sql(
        "Author",
        json!({"books": b.marker()}),
        &CompileOptions::default().with_collection_joins(CollectionJoins::Lateral),
    );
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a WHERE a.deleted_at IS NULL ORDER BY a.id ASC"
    );
}

#[test]
fn test_alias_on_inherited_field() {
    let sp = EntityAlias::new("SmallPublisher");
    let options = CompileOptions::default().with_conditions(sp.primitive("name").eq("Peepal"));
    let emitted = find_sql("SmallPublisher", sp.marker(), &options);
    assert!(emitted
        .sql
        .contains("WHERE sp_b0.deleted_at IS NULL AND sp_b0.name = ? ORDER BY sp.id ASC"));
}

#[test]
fn test_polymorphic_alias_condition() {
    let c = EntityAlias::new("Comment");
    let options = CompileOptions::default()
        .with_conditions(c.polymorphic("parent").is_in(["a:1", "b:2"]));
    let emitted = find_sql("Comment", c.marker(), &options);
    assert_eq!(
        emitted.sql,
        "SELECT c.* FROM comments AS c \
         WHERE (c.parent_author_id = ANY(?) OR c.parent_book_id = ANY(?)) ORDER BY c.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!([1]), json!([2])]);
}

#[test]
fn test_unbound_alias_fails() {
    let a = EntityAlias::new("Author");
    let options = CompileOptions::default().with_conditions(a.primitive("lastName").eq("x"));
    let err = compiler()
        .compile("Book", &json!({"title": "x"}), &options)
        .unwrap_err();
    assert!(matches!(err, FindError::UnboundAlias(ref handle) if handle == a.handle()));
}

#[test]
fn test_alias_bound_twice_fails() {
    let a = EntityAlias::new("Author");
    let mut filter = a.marker();
    filter["mentor"] = a.marker();
    let err = compiler()
        .compile("Author", &filter, &CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, FindError::UnsupportedFilter { .. }));
}

#[test]
fn test_alias_conditions_reject_collections() {
    let a = EntityAlias::new("Author");
    let options = CompileOptions::default().with_conditions(a.primitive("books").eq("b:1"));
    let err = compiler()
        .compile("Author", &a.marker(), &options)
        .unwrap_err();
    assert!(matches!(err, FindError::UnsupportedFilter { .. }));
}
