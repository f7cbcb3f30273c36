use crate::common::*;
use orm_find::query_builder::{CompileOptions, Dialect, EmitOptions, Pagination, SqlEmitter};
use orm_find::FindError;
use serde_json::json;

fn where_clause(entity: &str, filter: serde_json::Value) -> (String, Vec<serde_json::Value>) {
    let emitted = find_sql(entity, filter, &CompileOptions::default());
    let start = emitted.sql.find(" WHERE ").map(|i| i + 7).unwrap_or(emitted.sql.len());
    let end = emitted.sql.find(" ORDER BY ").unwrap_or(emitted.sql.len());
    (emitted.sql[start..end].to_string(), emitted.bindings)
}

#[test]
fn test_comparison_operators() {
    let (sql, bindings) = where_clause("Author", json!({"age": {"gte": 18, "lte": 65}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.age BETWEEN ? AND ?");
    assert_eq!(bindings, vec![json!(18), json!(65)]);

    let (sql, _) = where_clause("Author", json!({"age": {"gt": 18, "lt": 65}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.age > ? AND a.age < ?");

    let (sql, bindings) = where_clause("Author", json!({"age": {"between": [1, 9]}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.age BETWEEN ? AND ?");
    assert_eq!(bindings, vec![json!(1), json!(9)]);

    let (sql, _) = where_clause("Author", json!({"lastName": {"op": "ilike", "value": "tol%"}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.last_name ILIKE ?");

    let (sql, _) = where_clause("Author", json!({"lastName": {"nlike": "x%"}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.last_name NOT LIKE ?");
}

#[test]
fn test_ignored_filters() {
    for filter in [
        json!({"lastName": {"op": "eq"}}),
        json!({"lastName": {}}),
        json!({}),
    ] {
        let (sql, bindings) = where_clause("Author", filter);
        assert_eq!(sql, "a.deleted_at IS NULL");
        assert!(bindings.is_empty());
    }
}

#[test]
fn test_list_operators() {
    let (sql, bindings) = where_clause("Author", json!({"lastName": ["Tolstoy", "Gogol"]}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.last_name = ANY(?)");
    assert_eq!(bindings, vec![json!(["Tolstoy", "Gogol"])]);

    let (sql, _) = where_clause("Author", json!({"lastName": {"nin": ["Gogol"]}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.last_name != ALL(?)");
}

#[test]
fn test_empty_lists_are_constant_conditions() {
    let (sql, bindings) = where_clause("Author", json!({"lastName": []}));
    assert_eq!(sql, "a.deleted_at IS NULL AND FALSE");
    assert!(bindings.is_empty());

    let (sql, _) = where_clause("Author", json!({"lastName": {"nin": []}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND TRUE");
}

#[test]
fn test_null_comparisons() {
    let (sql, _) = where_clause("Author", json!({"firstName": null}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.first_name IS NULL");

    let (sql, _) = where_clause("Author", json!({"firstName": {"ne": null}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.first_name IS NOT NULL");

    let (sql, _) = where_clause("Author", json!({"firstName": {"eq": null}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.first_name IS NULL");
}

#[test]
fn test_array_column_operators() {
    let (sql, bindings) = where_clause("Author", json!({"nicknames": ["Leo"]}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.nicknames @> ?");
    assert_eq!(bindings, vec![json!(["Leo"])]);

    let (sql, _) = where_clause("Author", json!({"nicknames": {"overlaps": ["Leo", "Lev"]}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND a.nicknames && ?");

    let (sql, _) = where_clause("Author", json!({"nicknames": {"ncontains": ["Leo"]}}));
    assert_eq!(sql, "a.deleted_at IS NULL AND NOT (a.nicknames @> ?)");

    let err = compiler()
        .compile("Book", &json!({"title": {"contains": ["x"]}}), &CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, FindError::UnsupportedFilter { .. }));
}

#[test]
fn test_postgres_list_casts() {
    let query = compile(
        "Author",
        json!({"age": [30, 40], "nicknames": ["Leo"]}),
        &CompileOptions::default(),
    );
    let emitted = SqlEmitter::new(Dialect::Postgres).emit(&query, &EmitOptions::default());
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a WHERE a.deleted_at IS NULL \
         AND a.age = ANY($1::int[]) AND a.nicknames @> $2::varchar[] ORDER BY a.id ASC"
    );
}

#[test]
fn test_postgres_numbers_lateral_and_select_bindings_in_order() {
    let query = compile(
        "BookReview",
        json!({"book": {"tags": {"name": "classic"}}, "rating": 5}),
        &CompileOptions::default(),
    );
    let emitted = SqlEmitter::new(Dialect::Postgres).emit(&query, &EmitOptions::default());
    assert_eq!(
        emitted.sql,
        "SELECT DISTINCT br.*, CASE WHEN br.kind = $1 THEN 'CriticReview' ELSE 'BookReview' END AS __class \
         FROM book_reviews AS br JOIN books AS b ON br.book_id = b.id \
         LEFT OUTER JOIN books_to_tags AS btt ON b.id = btt.book_id \
         LEFT OUTER JOIN tags AS t ON btt.tag_id = t.id \
         WHERE t.name = $2::varchar AND br.rating = $3::int ORDER BY br.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!("critic"), json!("classic"), json!(5)]);
}

#[test]
fn test_pagination_is_appended() {
    let query = compile("Book", json!({"title": "x"}), &CompileOptions::default());
    let emitted = SqlEmitter::default().emit(&query, &EmitOptions::from(&Pagination::page(3, 20)));
    assert!(emitted.sql.ends_with("ORDER BY b.title ASC, b.id ASC LIMIT 20 OFFSET 40"));

    let emitted = SqlEmitter::default().emit(&query, &EmitOptions::from(&Pagination::limit(5)));
    assert!(emitted.sql.ends_with("b.id ASC LIMIT 5"));
}

#[test]
fn test_shape_key_ignores_values() {
    let one = compile("Book", json!({"title": "x"}), &CompileOptions::default());
    let two = compile("Book", json!({"title": "y"}), &CompileOptions::default());
    let other = compile("Book", json!({"title": 3}), &CompileOptions::default());
    assert_eq!(one.shape_key(), two.shape_key());
    assert_ne!(one.shape_key(), other.shape_key());
}
