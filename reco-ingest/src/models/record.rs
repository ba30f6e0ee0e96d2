//! Recommendation payloads
//!
//! Wire shapes shared by both ingestion modes: the per-signal item lists,
//! one decoded line of a file upload, and the ordered signal maps of a
//! direct upload.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One recommended item plus its score and metadata (`{"id": "a1", "score": "0.9"}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemScore(pub BTreeMap<String, String>);

impl ItemScore {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ItemScore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Serialize an item list the way it is stored under a signal key
pub fn encode_items(items: &[ItemScore]) -> serde_json::Result<String> {
    serde_json::to_string(items)
}

pub fn decode_items(value: &str) -> serde_json::Result<Vec<ItemScore>> {
    serde_json::from_str(value)
}

/// One line of a file upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordLine {
    pub signal_id: String,
    pub recommended: Vec<ItemScore>,
}

/// A validated line bound to the keyspace it will be written into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub table: String,
    pub signal_id: String,
    pub recommended: Vec<ItemScore>,
}

/// One `{signal: [items...]}` object of a direct upload, in document order
///
/// Line numbers in direct-mode errors follow the order signals appear in the
/// request, so the map keeps its entries as an ordered list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalEntries(pub Vec<(String, Vec<ItemScore>)>);

impl SignalEntries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Vec<ItemScore>)> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<ItemScore>)> for SignalEntries {
    fn from_iter<I: IntoIterator<Item = (S, Vec<ItemScore>)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, items)| (s.into(), items)).collect())
    }
}

impl Serialize for SignalEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (signal, items) in &self.0 {
            map.serialize_entry(signal, items)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SignalEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = SignalEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of signal id to recommended items")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((signal, items)) = access.next_entry::<String, Vec<ItemScore>>()? {
                    entries.push((signal, items));
                }
                Ok(SignalEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Counts and line numbers travel as decimal strings (`"numberOfLines": "2"`).
/// Decoding also accepts plain integers.
pub mod count_as_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &usize, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Count {
            Text(String),
            Number(usize),
        }

        match Count::deserialize(deserializer)? {
            Count::Number(n) => Ok(n),
            Count::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, score: &str) -> ItemScore {
        [("id", id), ("score", score)].into_iter().collect()
    }

    #[test]
    fn test_signal_entries_keep_document_order() {
        let entries: Vec<SignalEntries> = serde_json::from_str(
            r#"[{"zeta_1": [{"id": "a"}], "alpha_2": []}, {"mid_3": [{"id": "b", "score": "1"}]}]"#,
        )
        .unwrap();

        assert_eq!(entries.len(), 2);
        let signals: Vec<&str> = entries
            .iter()
            .flat_map(|e| e.iter().map(|(s, _)| s.as_str()))
            .collect();
        assert_eq!(signals, vec!["zeta_1", "alpha_2", "mid_3"]);
    }

    #[test]
    fn test_item_list_round_trip_including_empty() {
        let lists = vec![
            vec![],
            vec![item("a1", "0.9"), item("b2", "0.5")],
            vec![ItemScore::default()],
            vec![[("type", "video"), ("weird key \"q\"", "ü")].into_iter().collect()],
        ];

        for items in lists {
            let encoded = encode_items(&items).unwrap();
            assert_eq!(decode_items(&encoded).unwrap(), items);
        }
    }

    #[test]
    fn test_record_line_uses_camel_case() {
        let line: RecordLine =
            serde_json::from_str(r#"{"signalId": "u1", "recommended": [{"id": "x"}]}"#).unwrap();
        assert_eq!(line.signal_id, "u1");
        assert_eq!(line.recommended[0].get("id"), Some("x"));

        assert!(serde_json::from_str::<RecordLine>(r#"{"signal": "u1"}"#).is_err());
    }
}
