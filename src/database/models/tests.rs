use chrono::TimeZone;

use super::*;

fn sample_record() -> VectorRecord {
    VectorRecord {
        id: "sheet_1_row0".to_string(),
        vector: vec![0.25, -0.5],
        metadata: RowMetadata {
            table_uid: "sheet_1".to_string(),
            table_name: "Characters".to_string(),
            row_index: 0,
            headers: vec!["Name".to_string()],
            values: vec!["Alice".to_string()],
            timestamp: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid timestamp"),
        },
    }
}

#[test]
fn stored_collection_uses_camel_case_keys() {
    let collection = StoredCollection::new("Alice_chat-1", vec![sample_record()]);
    let json = serde_json::to_value(&collection).expect("serializable");

    assert_eq!(json["chatId"], "Alice_chat-1");
    assert_eq!(json["version"], "1.0");
    assert!(json.get("lastUpdate").is_some());

    let metadata = &json["vectors"][0]["metadata"];
    assert_eq!(metadata["tableUid"], "sheet_1");
    assert_eq!(metadata["tableName"], "Characters");
    assert_eq!(metadata["rowIndex"], 0);
}

#[test]
fn stored_collection_json_round_trip() {
    let collection = StoredCollection::new("Alice_chat-1", vec![sample_record()]);
    let json = serde_json::to_string(&collection).expect("serializable");
    let parsed: StoredCollection = serde_json::from_str(&json).expect("deserializable");
    assert_eq!(parsed, collection);
}
