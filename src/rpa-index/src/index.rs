//! Typed archive index decoded from a pickle stream

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_pickle::{DeOptions, Value};

use crate::field::{hashable_to_value, kind_name};
use crate::{Error, Field, Result};

/// A decoded archive index: file name -> records.
///
/// Entries keep the pickle stream's key order, the order the producing
/// dict was written in. Records keep their sequence order.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub entries: Vec<Entry>,
}

/// All records listed under one index key
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub label: String,
    pub records: Vec<Record>,
}

/// One index record. The first two fields locate the file in the archive;
/// anything past them is carried but never reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub offset: Field,
    pub length: Field,
    pub extra: Vec<Field>,
}

impl Index {
    /// Deserialize a pickle stream and shape-check it into an index.
    ///
    /// Entries come out in stream order, not sorted. Python 2 byte
    /// strings decode as text, so classic archives keep their string
    /// keys readable.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let raw: RawIndex = serde_pickle::from_slice(data, DeOptions::new().decode_strings())?;
        match raw {
            RawIndex::Entries(pairs) => Self::from_pairs(pairs),
            RawIndex::Other(found) => Err(Error::NotAnIndex { found }),
        }
    }

    /// Convert a decoded value tree into an index.
    ///
    /// The top level must be a dict with string keys; every value must be
    /// a list or tuple of records with at least two fields each. The first
    /// shape violation fails the whole conversion. The value tree stores
    /// its dict sorted by key, so entries follow that order here; decoding
    /// bytes through `from_slice` sees the stream itself and keeps its
    /// order instead.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Dict(dict) => Self::from_pairs(
                dict.into_iter()
                    .map(|(key, value)| (hashable_to_value(key), value))
                    .collect(),
            ),
            other => Err(Error::NotAnIndex {
                found: kind_name(&other),
            }),
        }
    }

    /// Shape-check `(key, value)` pairs in the order given. A repeated
    /// key keeps its first position and its last value, matching dict
    /// assignment in the producing runtime.
    fn from_pairs(pairs: Vec<(Value, Value)>) -> Result<Self> {
        let mut labeled: Vec<(String, Value)> = Vec::with_capacity(pairs.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (key, value) in pairs {
            let label = match key {
                Value::String(label) => label,
                other => {
                    return Err(Error::LabelNotText {
                        found: kind_name(&other),
                    })
                }
            };
            match positions.get(&label) {
                Some(&at) => labeled[at].1 = value,
                None => {
                    positions.insert(label.clone(), labeled.len());
                    labeled.push((label, value));
                }
            }
        }

        let mut entries = Vec::with_capacity(labeled.len());
        for (label, value) in labeled {
            let records = match value {
                Value::List(items) | Value::Tuple(items) => {
                    let mut records = Vec::with_capacity(items.len());
                    for (position, item) in items.into_iter().enumerate() {
                        records.push(Record::from_value(&label, position, item)?);
                    }
                    records
                }
                other => {
                    return Err(Error::NotASequence {
                        label,
                        found: kind_name(&other),
                    })
                }
            };
            entries.push(Entry { label, records });
        }

        Ok(Index { entries })
    }

    /// Number of labels in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total record count, which is also the report's line count
    pub fn record_count(&self) -> usize {
        self.entries.iter().map(|e| e.records.len()).sum()
    }
}

impl Record {
    fn from_value(label: &str, position: usize, value: Value) -> Result<Self> {
        let items = match value {
            Value::Tuple(items) | Value::List(items) => items,
            other => {
                return Err(Error::NotARecord {
                    label: label.to_string(),
                    position,
                    found: kind_name(&other),
                })
            }
        };

        let count = items.len();
        let mut fields = items.into_iter().map(Field::from_value);
        match (fields.next(), fields.next()) {
            (Some(offset), Some(length)) => Ok(Record {
                offset,
                length,
                extra: fields.collect(),
            }),
            _ => Err(Error::RecordTooShort {
                label: label.to_string(),
                position,
                found: count,
            }),
        }
    }
}

/// Decode target for the top level of the stream.
///
/// Going through the deserializer's map visitor is what preserves key
/// order: the typed value tree stores dicts sorted. A non-dict top level
/// is captured with its type name so the caller can report it.
enum RawIndex {
    Entries(Vec<(Value, Value)>),
    Other(&'static str),
}

impl<'de> Deserialize<'de> for RawIndex {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawIndexVisitor;

        impl<'de> Visitor<'de> for RawIndexVisitor {
            type Value = RawIndex;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a pickled dict")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<RawIndex, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(pair) = map.next_entry::<Value, Value>()? {
                    pairs.push(pair);
                }
                Ok(RawIndex::Entries(pairs))
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<RawIndex, A::Error>
            where
                A: SeqAccess<'de>,
            {
                // Tuples and sets arrive here too; drain before returning
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(RawIndex::Other("list"))
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<RawIndex, E> {
                Ok(RawIndex::Other("NoneType"))
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<RawIndex, E> {
                Ok(RawIndex::Other("bool"))
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<RawIndex, E> {
                Ok(RawIndex::Other("int"))
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<RawIndex, E> {
                Ok(RawIndex::Other("int"))
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<RawIndex, E> {
                Ok(RawIndex::Other("float"))
            }

            fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<RawIndex, E> {
                Ok(RawIndex::Other("str"))
            }

            fn visit_bytes<E: de::Error>(self, _: &[u8]) -> std::result::Result<RawIndex, E> {
                Ok(RawIndex::Other("bytes"))
            }
        }

        deserializer.deserialize_any(RawIndexVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_pickle::{value_to_vec, HashableValue, SerOptions};
    use std::collections::BTreeMap;

    /// pickle.dumps({"a": [(1, 2), (3, 4)], "b": [(5, 6)]}, protocol=2)
    ///
    /// \x80\x02            PROTO 2
    /// }q\x00              EMPTY_DICT, BINPUT 0
    /// (                   MARK
    /// X\x01\x00\x00\x00a  BINUNICODE "a"
    /// ]q\x02(...e         list of BININT1 pairs via TUPLE2, APPENDS
    /// X\x01\x00\x00\x00b  BINUNICODE "b"
    /// ]q\x06...a          single-pair list via APPEND
    /// u.                  SETITEMS, STOP
    const SAMPLE: &[u8] = b"\x80\x02}q\x00(X\x01\x00\x00\x00aq\x01]q\x02(K\x01K\x02\x86q\x03K\x03K\x04\x86q\x04eX\x01\x00\x00\x00bq\x05]q\x06K\x05K\x06\x86q\x07au.";

    /// pickle.dumps({"b": [(5, 6)], "a": [(1, 2)]}, protocol=2)
    ///
    /// Same shape as SAMPLE but written with "b" before "a", so stream
    /// order and sorted order disagree.
    const UNSORTED: &[u8] = b"\x80\x02}q\x00(X\x01\x00\x00\x00bq\x01]q\x02K\x05K\x06\x86q\x03aX\x01\x00\x00\x00aq\x04]q\x05K\x01K\x02\x86q\x06au.";

    fn key(s: &str) -> HashableValue {
        HashableValue::String(s.to_string())
    }

    fn pair(a: i64, b: i64) -> Value {
        Value::Tuple(vec![Value::I64(a), Value::I64(b)])
    }

    fn pickled(entries: Vec<(HashableValue, Value)>) -> Vec<u8> {
        let dict: BTreeMap<_, _> = entries.into_iter().collect();
        value_to_vec(&Value::Dict(dict), SerOptions::new()).unwrap()
    }

    #[test]
    fn test_from_slice_sample() {
        let index = Index::from_slice(SAMPLE).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.record_count(), 3);

        let first = &index.entries[0];
        assert_eq!(first.label, "a");
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0].offset, Field::Int(1));
        assert_eq!(first.records[0].length, Field::Int(2));
        assert!(first.records[0].extra.is_empty());

        let second = &index.entries[1];
        assert_eq!(second.label, "b");
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].offset, Field::Int(5));
        assert_eq!(second.records[0].length, Field::Int(6));
    }

    #[test]
    fn test_empty_dict() {
        let index = Index::from_slice(&pickled(vec![])).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.record_count(), 0);
    }

    #[test]
    fn test_garbage_is_a_pickle_error() {
        let err = Index::from_slice(b"not a pickle").unwrap_err();
        assert!(matches!(err, Error::Pickle(_)));
    }

    #[test]
    fn test_truncated_stream() {
        // SAMPLE without the trailing STOP opcode
        let err = Index::from_slice(&SAMPLE[..SAMPLE.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Pickle(_)));
    }

    #[test]
    fn test_top_level_must_be_dict() {
        let data = value_to_vec(&Value::List(vec![pair(1, 2)]), SerOptions::new()).unwrap();
        let err = Index::from_slice(&data).unwrap_err();
        assert!(matches!(err, Error::NotAnIndex { found: "list" }));
    }

    #[test]
    fn test_key_must_be_text() {
        let data = pickled(vec![(HashableValue::I64(1), Value::List(vec![]))]);
        let err = Index::from_slice(&data).unwrap_err();
        assert!(matches!(err, Error::LabelNotText { found: "int" }));
    }

    #[test]
    fn test_from_value_key_must_be_text() {
        let dict = [(HashableValue::I64(1), Value::List(vec![]))]
            .into_iter()
            .collect();
        let err = Index::from_value(Value::Dict(dict)).unwrap_err();
        assert!(matches!(err, Error::LabelNotText { found: "int" }));
    }

    #[test]
    fn test_value_must_be_sequence() {
        let data = pickled(vec![(key("a"), Value::I64(5))]);
        let err = Index::from_slice(&data).unwrap_err();
        match err {
            Error::NotASequence { label, found } => {
                assert_eq!(label, "a");
                assert_eq!(found, "int");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_record_must_be_indexable() {
        let data = pickled(vec![(key("a"), Value::List(vec![Value::I64(7)]))]);
        let err = Index::from_slice(&data).unwrap_err();
        match err {
            Error::NotARecord {
                label,
                position,
                found,
            } => {
                assert_eq!(label, "a");
                assert_eq!(position, 0);
                assert_eq!(found, "int");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_one_field_record_is_too_short() {
        let data = pickled(vec![(
            key("a"),
            Value::List(vec![Value::Tuple(vec![Value::I64(1)])]),
        )]);
        let err = Index::from_slice(&data).unwrap_err();
        match err {
            Error::RecordTooShort {
                label,
                position,
                found,
            } => {
                assert_eq!(label, "a");
                assert_eq!(position, 0);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_extra_fields_are_kept() {
        let record = Value::Tuple(vec![
            Value::I64(1),
            Value::I64(2),
            Value::String("prefix".into()),
        ]);
        let data = pickled(vec![(key("a"), Value::List(vec![record]))]);
        let index = Index::from_slice(&data).unwrap();
        let record = &index.entries[0].records[0];
        assert_eq!(record.offset, Field::Int(1));
        assert_eq!(record.extra, vec![Field::Text("prefix".into())]);
    }

    #[test]
    fn test_tuple_of_records() {
        // The per-key sequence may itself be a tuple
        let data = pickled(vec![(key("a"), Value::Tuple(vec![pair(1, 2)]))]);
        let index = Index::from_slice(&data).unwrap();
        assert_eq!(index.record_count(), 1);
    }

    #[test]
    fn test_record_as_list() {
        let record = Value::List(vec![Value::I64(3), Value::I64(9)]);
        let data = pickled(vec![(key("a"), Value::List(vec![record]))]);
        let index = Index::from_slice(&data).unwrap();
        assert_eq!(index.entries[0].records[0].offset, Field::Int(3));
        assert_eq!(index.entries[0].records[0].length, Field::Int(9));
    }

    #[test]
    fn test_entries_follow_stream_order() {
        let index = Index::from_slice(UNSORTED).unwrap();
        let labels: Vec<&str> = index.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["b", "a"]);
        assert_eq!(index.entries[0].records[0].offset, Field::Int(5));
        assert_eq!(index.entries[1].records[0].offset, Field::Int(1));
    }

    #[test]
    fn test_python2_string_keys() {
        // pickle.dumps({'a': [(1, 2)]}, protocol=2) under Python 2:
        // the key is a byte string, U\x01a (SHORT_BINSTRING "a")
        let data = b"\x80\x02}q\x00U\x01aq\x01]q\x02K\x01K\x02\x86q\x03as.";
        let index = Index::from_slice(data).unwrap();
        assert_eq!(index.entries[0].label, "a");
        assert_eq!(index.entries[0].records[0].offset, Field::Int(1));
        assert_eq!(index.entries[0].records[0].length, Field::Int(2));
    }

    #[test]
    fn test_repeated_key_overwrites_in_place() {
        // Hand-built stream whose SETITEMS batch sets "a" twice:
        // {"a": [(1, 2)], "b": [(3, 4)], "a": [(5, 6)]}. Dict assignment
        // keeps the first position and takes the last value.
        let data = b"\x80\x02}(X\x01\x00\x00\x00a]K\x01K\x02\x86aX\x01\x00\x00\x00b]K\x03K\x04\x86aX\x01\x00\x00\x00a]K\x05K\x06\x86au.";
        let index = Index::from_slice(data).unwrap();
        let labels: Vec<&str> = index.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["a", "b"]);
        assert_eq!(index.entries[0].records[0].offset, Field::Int(5));
        assert_eq!(index.entries[0].records[0].length, Field::Int(6));
    }

    #[test]
    fn test_shape_error_stops_at_later_entry() {
        // First entry is fine, second one is malformed
        let data = pickled(vec![
            (key("good"), Value::List(vec![pair(1, 2)])),
            (key("short"), Value::List(vec![Value::Tuple(vec![Value::I64(1)])])),
        ]);
        let err = Index::from_slice(&data).unwrap_err();
        assert!(matches!(err, Error::RecordTooShort { .. }));
    }
}
