//! Codec integration tests

use nbdeploy::codec::{decode, decode_as, decode_to_string, encode, CodecError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Upload {
    pipeline_package_path: String,
    overwrite: bool,
}

#[test]
fn test_values_survive_encoding() {
    let values = vec![
        Value::Null,
        json!(true),
        json!(-12.5),
        json!("ünïcødé 'quoted' \"double\" \\ back"),
        json!([1, "two", null, {"three": [3]}]),
        json!({"volumes": [{"type": "clone", "size": 1073741824u64}], "debug": false}),
    ];

    for value in values {
        let encoded = encode(&value).unwrap();
        assert_eq!(decode(&encoded).unwrap(), value);
    }
}

#[test]
fn test_key_order_is_preserved() {
    let value = json!({"z": 1, "a": 2, "m": 3});
    let encoded = encode(&value).unwrap();
    assert_eq!(decode_to_string(&encoded).unwrap(), r#"{"z":1,"a":2,"m":3}"#);
}

#[test]
fn test_typed_decode() {
    let upload = Upload {
        pipeline_package_path: "/tmp/p.tar.gz".to_string(),
        overwrite: true,
    };
    let encoded = encode(&upload).unwrap();
    assert_eq!(decode_as::<Upload>(&encoded).unwrap(), upload);
    assert_eq!(decode_as::<Upload>(&format!("\"{}\"", encoded)).unwrap(), upload);
}

#[test]
fn test_plain_text_is_rejected() {
    assert!(matches!(decode("hello"), Err(CodecError::Base64(_))));
    assert!(matches!(decode("{\"code\": 0}"), Err(CodecError::Base64(_))));
}

#[test]
fn test_corrupted_payload_is_rejected() {
    let encoded = encode(&json!({"code": 0, "result": [1, 2, 3]})).unwrap();

    // dropping characters breaks the padding
    let truncated = &encoded[..encoded.len() - 3];
    assert!(decode(truncated).is_err());

    // valid base64 of something that is not JSON
    assert!(matches!(decode("aGVsbG8="), Err(CodecError::Json(_))));

    // valid base64 of bytes that are not UTF-8
    assert!(matches!(decode("//79"), Err(CodecError::Utf8(_))));
}

#[test]
fn test_mismatched_quotes_are_kept() {
    let encoded = encode(&json!(1)).unwrap();
    assert!(decode(&format!("'{}\"", encoded)).is_err());
}
