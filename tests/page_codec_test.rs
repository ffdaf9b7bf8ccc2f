use pagedb::storage::page::{codec, Page};
use pagedb::tuple::{Attribute, DataType, Record, Value};
use pagedb::{record, PageIndex, StorageError};

fn attributes() -> Vec<Attribute> {
    vec![
        Attribute::new("id", DataType::Integer).primary_key(),
        Attribute::new("score", DataType::Double),
        Attribute::new("code", DataType::Char(4)),
        Attribute::new("note", DataType::VarChar(20)),
        Attribute::new("flag", DataType::Boolean),
    ]
}

#[test]
fn test_page_round_trip_with_nulls() {
    let records = vec![
        record![1, 0.5, "ab", "first", true],
        Record::new(vec![
            Value::Integer(2),
            Value::Null,
            Value::Null,
            "é unicode".into(),
            Value::Null,
        ]),
        record![-3, f64::MAX, "wxyz", "", false],
    ];
    let page = Page::new("t", PageIndex::new(4), 2)
        .with_records(records.clone())
        .with_links(Some(PageIndex::new(1)), None);

    let bytes = codec::encode(&page, 256).unwrap();
    assert_eq!(bytes.len(), 256);

    let decoded = codec::decode("t", PageIndex::new(4), &bytes, &attributes(), 256)
        .unwrap()
        .unwrap();
    assert_eq!(decoded, page);
    assert_eq!(decoded.records(), records.as_slice());
}

#[test]
fn test_encode_rejects_oversize() {
    let records: Vec<Record> = (0..10).map(|i| record![i, 1.0, "abcd", "0123456789", true]).collect();
    let page = Page::new("t", PageIndex::new(0), 0).with_records(records.clone());

    let size = codec::encoded_size(&records);
    assert!(matches!(
        codec::encode(&page, 128),
        Err(StorageError::PageOverflow { size: s, page_size: 128 }) if s == size
    ));
    assert!(!codec::fits(&records, 128));
    assert!(codec::fits(&records, size));
}

#[test]
fn test_decode_rejects_wrong_length() {
    let page = Page::new("t", PageIndex::new(0), 0);
    let bytes = codec::encode(&page, 64).unwrap();

    let err = codec::decode("t", PageIndex::new(0), &bytes[..60], &attributes(), 64).unwrap_err();
    assert!(err.is_corruption());
}
