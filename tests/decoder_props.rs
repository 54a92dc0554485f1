//! 参数解码的性质测试：对本系统自己序列化出的 JSON，解码不改变语义内容

use proptest::prelude::*;
use serde_json::Value;

use ideaforge::react::arguments::{decode, extract_outermost_json_object, repair_trailing_commas};

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ,:{}\\[\\]\"\\\\`\n]{0,16}".prop_map(Value::String),
        Just(Value::String("Use config:\n```json\n{\"lr\": 0.1}\n```".to_string())),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_ ]{1,10}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn test_decode_is_idempotent(v in json_value()) {
        prop_assert_eq!(decode(&serde_json::to_string(&v).unwrap()).unwrap(), v.clone());
        prop_assert_eq!(decode(&serde_json::to_string_pretty(&v).unwrap()).unwrap(), v);
    }

    #[test]
    fn test_fenced_object_decodes_to_same_value(
        m in prop::collection::btree_map("[a-z]{1,8}", json_value(), 0..5)
    ) {
        let v = Value::Object(m.into_iter().collect());
        let fenced = format!("Here is the payload:\n```json\n{}\n```\nDone.", serde_json::to_string_pretty(&v).unwrap());
        prop_assert_eq!(decode(&fenced).unwrap(), v);
    }

    #[test]
    fn test_outermost_object_survives_surrounding_prose(
        m in prop::collection::btree_map("[a-z]{1,8}", json_value(), 1..5)
    ) {
        let v = Value::Object(m.into_iter().collect());
        let text = serde_json::to_string(&v).unwrap();
        let wrapped = format!("Some prose first. {} and trailing words {{", text);
        prop_assert_eq!(extract_outermost_json_object(&wrapped), Some(text.as_str()));
    }

    #[test]
    fn test_repair_leaves_valid_json_unchanged(v in json_value()) {
        let text = serde_json::to_string(&v).unwrap();
        prop_assert_eq!(repair_trailing_commas(&text), text);
    }
}

#[test]
fn test_escaped_quote_and_brace_inside_string() {
    let text = r#"prefix {"a": "contains \" and } inside", "b": [1, 2,]} suffix"#;
    assert_eq!(
        extract_outermost_json_object(text),
        Some(r#"{"a": "contains \" and } inside", "b": [1, 2,]}"#)
    );
    let v = decode(text).unwrap();
    assert_eq!(v["a"], "contains \" and } inside");
    assert_eq!(v["b"], serde_json::json!([1, 2]));
}
