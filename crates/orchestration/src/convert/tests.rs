use serde_json::json;

use super::*;

fn catalog() -> ConverterCatalog {
    ConverterCatalog::new()
        .with("user", |raw, _| Ok(json!({ "login": required_str(raw, "login")? })))
        .with("milestone", |raw, catalog| {
            Ok(json!({
                "number": required_u64(raw, "number")?,
                "title": required_str(raw, "title")?,
                "creator": catalog.convert_optional("user", raw.get("creator"))?,
            }))
        })
}

#[test]
fn test_convert_delegates_nested_records_through_the_catalog() {
    let raw = json!({ "number": 3, "title": "v1", "creator": { "login": "octocat", "id": 1 } });

    let converted = catalog().convert("milestone", &raw).unwrap();

    assert_eq!(
        converted,
        json!({ "number": 3, "title": "v1", "creator": { "login": "octocat" } })
    );
}

#[test]
fn test_null_nested_record_converts_to_null() {
    let raw = json!({ "number": 3, "title": "v1", "creator": null });

    let converted = catalog().convert("milestone", &raw).unwrap();

    assert_eq!(converted["creator"], Value::Null);
}

#[test]
fn test_unknown_converter_is_reported() {
    let err = catalog().convert("label", &json!({})).unwrap_err();
    assert_eq!(
        err,
        ConversionError::UnknownConverter {
            converter: "label".to_string()
        }
    );
}

#[test]
fn test_nested_failure_reads_as_a_chain() {
    let raw = json!({ "number": 3, "title": "v1", "creator": { "id": 1 } });

    let err = catalog().convert("milestone", &raw).unwrap_err();

    assert_eq!(
        err.to_string(),
        "converter 'milestone' rejected record: converter 'user' rejected record: missing field 'login'"
    );
}

#[test]
fn test_list_results_are_converted_element_wise() {
    let raw = json!([{ "login": "a" }, { "login": "b" }]);

    let converted = catalog().convert_result("user", &raw).unwrap();

    assert_eq!(converted, json!([{ "login": "a" }, { "login": "b" }]));
}

#[test]
fn test_failing_list_element_is_reported_with_its_index() {
    let raw = json!([{ "login": "a" }, { "login": 7 }]);

    let err = catalog().convert_result("user", &raw).unwrap_err();

    match err {
        ConversionError::InvalidRecord { converter, index, .. } => {
            assert_eq!(converter, "user");
            assert_eq!(index, Some(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_convert_each_keeps_good_siblings_of_a_rejected_element() {
    let raw = json!([{ "login": "a" }, { "login": 7 }, { "login": "c" }]);

    let converted = catalog().convert_each("user", &raw);

    assert_eq!(converted.len(), 3);
    assert_eq!(converted[0], Ok(json!({ "login": "a" })));
    assert!(matches!(
        converted[1],
        Err(ConversionError::InvalidRecord { index: Some(1), .. })
    ));
    assert_eq!(converted[2], Ok(json!({ "login": "c" })));
}

#[test]
fn test_convert_each_treats_a_single_record_as_one_element() {
    let converted = catalog().convert_each("user", &json!({ "login": "a" }));

    assert_eq!(converted, vec![Ok(json!({ "login": "a" }))]);
}

#[test]
fn test_field_helpers_treat_null_as_absent() {
    let raw = json!({ "title": null, "state": "open", "number": -1 });

    assert_eq!(
        required_str(&raw, "title").unwrap_err(),
        ConversionError::MissingField {
            field: "title".to_string()
        }
    );
    assert_eq!(optional_str(&raw, "title").unwrap(), None);
    assert_eq!(optional_str(&raw, "state").unwrap(), Some("open"));
    assert!(matches!(
        required_u64(&raw, "number"),
        Err(ConversionError::InvalidField { .. })
    ));
}
