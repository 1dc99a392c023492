use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::errors::PlatformError;

/// Which uploaded item a metadata update targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    ItemId(String),
    ProducerId(String),
}

impl ItemRef {
    fn wire_field(&self) -> (&'static str, &str) {
        match self {
            ItemRef::ItemId(id) => ("item_id", id),
            ItemRef::ProducerId(id) => ("producer_id", id),
        }
    }
}

/// The metadata fields the item endpoint accepts from this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_tags: Option<Vec<String>>,
}

impl ItemMetadata {
    /// Builds metadata from `key=value` style pairs. Keys are `title`,
    /// `author` and `tags` or their wire names; tags are comma separated.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, PlatformError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut metadata = ItemMetadata::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim();
            match key.as_ref().trim() {
                "title" | "item_title" => metadata.item_title = Some(value.to_string()),
                "author" => metadata.author = Some(vec![value.to_string()]),
                "tags" | "item_tags" => metadata.item_tags = Some(split_list(value)),
                other => {
                    return Err(PlatformError::Config(format!(
                        "unknown metadata field '{}' (expected title, author or tags)",
                        other
                    )))
                }
            }
        }
        Ok(metadata)
    }

    pub fn is_empty(&self) -> bool {
        self.item_title.is_none() && self.author.is_none() && self.item_tags.is_none()
    }

    pub(crate) fn to_body(&self, publisher_id: &str, item: &ItemRef) -> Value {
        let mut body = Map::new();
        body.insert("publisher_id".to_string(), Value::from(publisher_id));
        let (field, id) = item.wire_field();
        body.insert(field.to_string(), Value::from(id));
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            body.extend(fields);
        }
        Value::Object(body)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_short_and_wire_names() {
        let metadata = ItemMetadata::from_pairs([
            ("title", "Developer Happiness"),
            ("author", "Jane Doe"),
            ("item_tags", "culture, dx,,"),
        ])
        .unwrap();
        assert_eq!(metadata.item_title.as_deref(), Some("Developer Happiness"));
        assert_eq!(metadata.author, Some(vec!["Jane Doe".to_string()]));
        assert_eq!(
            metadata.item_tags,
            Some(vec!["culture".to_string(), "dx".to_string()])
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ItemMetadata::from_pairs([("title", "x"), ("publisher", "y")]).unwrap_err();
        assert!(matches!(err, PlatformError::Config(_)));
        assert!(err.to_string().contains("publisher"));
    }

    #[test]
    fn body_carries_target_and_only_set_fields() {
        let metadata = ItemMetadata {
            item_title: Some("T".to_string()),
            ..ItemMetadata::default()
        };
        let body = metadata.to_body("pub-1", &ItemRef::ItemId("item-9".to_string()));
        assert_eq!(
            body,
            json!({ "publisher_id": "pub-1", "item_id": "item-9", "item_title": "T" })
        );

        let body = ItemMetadata::default().to_body("pub-1", &ItemRef::ProducerId("p-1".to_string()));
        assert_eq!(body, json!({ "publisher_id": "pub-1", "producer_id": "p-1" }));
    }
}
