use crate::common::*;
use orm_find::query_builder::{AliasExpression, CompileOptions, Dialect, EmitOptions, EntityAlias, EntityRef, SqlEmitter};
use serde_json::{json, Value};

fn postgres_sql(entity: &str, filter: Value, options: &CompileOptions) -> (String, Vec<Value>) {
    let query = compile(entity, filter, options);
    let emitted = SqlEmitter::new(Dialect::Postgres).emit(&query, &EmitOptions::default());
    (emitted.sql, emitted.bindings)
}

const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

#[test]
fn test_uuid_foreign_key_is_cast_as_uuid() {
    let (sql, bindings) = postgres_sql(
        "Session",
        json!({"token": format!("tk:{TOKEN_UUID}")}),
        &CompileOptions::default(),
    );
    assert_eq!(
        sql,
        "SELECT s.* FROM sessions AS s WHERE s.token_id = $1::uuid ORDER BY s.id ASC"
    );
    assert_eq!(bindings, vec![json!(TOKEN_UUID)]);
}

#[test]
fn test_unsaved_uuid_entity_binds_the_nil_uuid() {
    for filter in [
        json!({"token": EntityRef::unsaved("Token").to_filter()}),
        json!({"token": {"id": EntityRef::unsaved("Token").to_filter()}}),
    ] {
        let (sql, bindings) = postgres_sql("Session", filter.clone(), &CompileOptions::default());
        assert!(sql.contains("WHERE s.token_id = $1::uuid"), "filter {filter}");
        assert_eq!(bindings, vec![json!(NIL_UUID)], "filter {filter}");
    }

    let (sql, bindings) = postgres_sql(
        "Token",
        json!({"id": EntityRef::unsaved("Token").to_filter()}),
        &CompileOptions::default(),
    );
    assert_eq!(sql, "SELECT t.* FROM tokens AS t WHERE t.id = $1::uuid ORDER BY t.id ASC");
    assert_eq!(bindings, vec![json!(NIL_UUID)]);
}

#[test]
fn test_polymorphic_uuid_component() {
    let (sql, bindings) = postgres_sql(
        "Session",
        json!({"subject": format!("tk:{TOKEN_UUID}")}),
        &CompileOptions::default(),
    );
    assert_eq!(
        sql,
        "SELECT s.* FROM sessions AS s WHERE s.subject_token_id = $1::uuid ORDER BY s.id ASC"
    );
    assert_eq!(bindings, vec![json!(TOKEN_UUID)]);

    let (sql, _) = postgres_sql("Session", json!({"subject": "a:3"}), &CompileOptions::default());
    assert!(sql.contains("WHERE s.subject_author_id = $1::int"));
}

#[test]
fn test_alias_condition_on_uuid_foreign_key() {
    let s = EntityAlias::new("Session");
    let options = CompileOptions::default().with_conditions(AliasExpression::or(vec![
        s.many_to_one("token").eq(format!("tk:{TOKEN_UUID}")),
        s.primitive("ip").is_null(),
    ]));
    let (sql, bindings) = postgres_sql("Session", s.marker(), &options);
    assert_eq!(
        sql,
        "SELECT s.* FROM sessions AS s \
         WHERE (s.token_id = $1::uuid OR s.ip IS NULL) ORDER BY s.id ASC"
    );
    assert_eq!(bindings, vec![json!(TOKEN_UUID)]);
}

#[test]
fn test_uuid_members_of_a_collection() {
    let (sql, bindings) = postgres_sql(
        "Token",
        json!({"sessions": {"ip": "10.0.0.1"}, "label": "ci"}),
        &CompileOptions::default(),
    );
    assert_eq!(
        sql,
        "SELECT DISTINCT t.* FROM tokens AS t LEFT OUTER JOIN sessions AS s ON t.id = s.token_id \
         WHERE s.ip = $1::varchar AND t.label = $2::varchar ORDER BY t.id ASC"
    );
    assert_eq!(bindings, vec![json!("10.0.0.1"), json!("ci")]);
}
