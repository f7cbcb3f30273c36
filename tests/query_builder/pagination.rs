use orm_find::query_builder::{EmitOptions, Pagination};
use serde_json::json;

#[test]
fn test_paging_forward() {
    let first = Pagination::page(1, 25);
    assert_eq!(first.to_sql(), " LIMIT 25 OFFSET 0");

    let second = first.next().unwrap();
    assert_eq!(second, Pagination::page(2, 25));
    assert_eq!(second.to_sql(), " LIMIT 25 OFFSET 25");

    assert!(Pagination::default().next().is_none());
}

#[test]
fn test_clamping_to_a_row_ceiling() {
    assert_eq!(Pagination::default().clamped(100).to_sql(), " LIMIT 100");
    assert_eq!(Pagination::limit(500).clamped(100).limit, Some(100));
    assert_eq!(Pagination::limit_offset(10, 30).clamped(100).to_sql(), " LIMIT 10 OFFSET 30");
}

#[test]
fn test_deserializes_from_request_json() -> anyhow::Result<()> {
    let pagination: Pagination = serde_json::from_value(json!({"limit": 10, "offset": 20}))?;
    assert_eq!(pagination, Pagination::limit_offset(10, 20));

    let pagination: Pagination = serde_json::from_value(json!({"limit": 10, "offset": null}))?;
    assert_eq!(pagination, Pagination::limit(10));
    Ok(())
}

#[test]
fn test_emit_options_from_pagination() {
    let options = EmitOptions::from(&Pagination::page(2, 10));
    assert_eq!(options.limit, Some(10));
    assert_eq!(options.offset, Some(10));
    assert!(options.is_top_level);
    assert!(Pagination::default().is_empty());
}
