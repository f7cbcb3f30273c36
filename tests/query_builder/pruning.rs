use crate::common::*;
use orm_find::query_builder::{CompileOptions, EmitOptions, JoinPruner, SqlEmitter};
use serde_json::json;

#[test]
fn test_probed_but_empty_join_is_pruned() {
    let emitted = find_sql("Author", json!({"image": {}}), &CompileOptions::default());
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a WHERE a.deleted_at IS NULL ORDER BY a.id ASC"
    );
}

#[test]
fn test_keep_alias_survives_pruning() {
    let options = CompileOptions::default().keep_alias("i");
    let emitted = find_sql("Author", json!({"image": {}}), &options);
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a LEFT OUTER JOIN images AS i ON a.id = i.author_id \
         WHERE a.deleted_at IS NULL ORDER BY a.id ASC"
    );
}

#[test]
fn test_used_join_keeps_its_guard() {
    let emitted = find_sql(
        "Author",
        json!({"publisher": {"group": "pg:1"}}),
        &CompileOptions::default(),
    );
    assert_eq!(
        emitted.sql,
        "SELECT a.* FROM authors AS a JOIN publishers AS p ON a.publisher_id = p.id \
         WHERE a.deleted_at IS NULL AND p.deleted_at IS NULL AND p.group_id = ? ORDER BY a.id ASC"
    );
    assert_eq!(emitted.bindings, vec![json!(1)]);
}

#[test]
fn test_pruning_after_the_fact_matches_pruned_compile() {
    let filter = json!({"image": {}, "books": {}, "publisher": "p:4"});
    let mut query = compile("Author", filter.clone(), &CompileOptions::default().without_pruning());
    assert_eq!(table_aliases(&query), vec!["a", "i", "b", "p"]);

    let removed = JoinPruner::prune(&mut query, &[]);
    assert_eq!(removed, 3);
    assert_eq!(table_aliases(&query), vec!["a"]);

    let pruned = SqlEmitter::default().emit(&query, &EmitOptions::default());
    assert_eq!(pruned, find_sql("Author", filter, &CompileOptions::default()));
    assert_eq!(
        pruned.sql,
        "SELECT a.* FROM authors AS a WHERE a.deleted_at IS NULL AND a.publisher_id = ? ORDER BY a.id ASC"
    );
}

#[test]
fn test_root_sub_type_joins_are_never_pruned() {
    let query = compile("Publisher", json!({}), &CompileOptions::default());
    assert_eq!(table_aliases(&query), vec!["p", "p_s0", "p_s1"]);
}
