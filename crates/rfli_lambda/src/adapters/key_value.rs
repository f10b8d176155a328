//! Document store boundary and its DynamoDB implementation.
//!
//! Handlers exchange `serde_json::Value` documents; the store owns the
//! mapping to attribute values and the batching rules of the backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, PutRequest, WriteRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::errors::StoreError;
use crate::runtime::table_names::Table;

/// Items per `BatchWriteItem` call.
pub const BATCH_WRITE_LIMIT: usize = 25;
const UNPROCESSED_RETRIES: u32 = 5;

/// Primary key of an item; attribute names come from [`Table::key_attributes`].
#[derive(Debug, Clone, PartialEq)]
pub struct ItemKey {
    pub partition: Value,
    pub sort: Option<Value>,
}

impl ItemKey {
    pub fn new(partition: impl Into<Value>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn with_sort(partition: impl Into<Value>, sort: impl Into<Value>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }

    /// Key of a stored document, read from its key attributes.
    pub fn of_document(table: Table, document: &Value) -> Option<Self> {
        let (partition, sort) = table.key_attributes();
        let partition = document.get(partition)?.clone();
        let sort = match sort {
            Some(name) => Some(document.get(name)?.clone()),
            None => None,
        };
        Some(Self { partition, sort })
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, table: Table, key: &ItemKey) -> Result<Option<Value>, StoreError>;
    async fn put_item(&self, table: Table, item: Value) -> Result<(), StoreError>;
    /// Writes in batches; a failed batch aborts the remaining ones.
    async fn put_items(&self, table: Table, items: Vec<Value>) -> Result<(), StoreError>;
    async fn scan_items(&self, table: Table) -> Result<Vec<Value>, StoreError>;
    async fn delete_items(&self, table: Table, keys: Vec<ItemKey>) -> Result<(), StoreError>;
}

fn encode<T: Serialize>(table: Table, document: &T) -> Result<Value, StoreError> {
    serde_json::to_value(document).map_err(|error| StoreError::Encode {
        table: table.name(),
        message: error.to_string(),
    })
}

fn decode<T: DeserializeOwned>(table: Table, item: Value) -> Result<T, StoreError> {
    serde_json::from_value(item).map_err(|error| StoreError::Decode {
        table: table.name(),
        message: error.to_string(),
    })
}

pub async fn get_document<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    table: Table,
    key: &ItemKey,
) -> Result<Option<T>, StoreError> {
    store
        .get_item(table, key)
        .await?
        .map(|item| decode(table, item))
        .transpose()
}

pub async fn put_document<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    table: Table,
    document: &T,
) -> Result<(), StoreError> {
    store.put_item(table, encode(table, document)?).await
}

/// Returns the number of documents written.
pub async fn put_documents<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    table: Table,
    documents: &[T],
) -> Result<usize, StoreError> {
    let items = documents
        .iter()
        .map(|document| encode(table, document))
        .collect::<Result<Vec<_>, _>>()?;
    let written = items.len();
    store.put_items(table, items).await?;
    Ok(written)
}

pub async fn scan_documents<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    table: Table,
) -> Result<Vec<T>, StoreError> {
    store
        .scan_items(table)
        .await?
        .into_iter()
        .map(|item| decode(table, item))
        .collect()
}

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(flag) => AttributeValue::Bool(*flag),
        Value::Number(number) => AttributeValue::N(number.to_string()),
        Value::String(text) => AttributeValue::S(text.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), to_attribute(field)))
                .collect(),
        ),
    }
}

fn number_value(text: &str) -> Value {
    if let Ok(integer) = text.parse::<i64>() {
        return Value::from(integer);
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

pub fn from_attribute(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(text) => Value::String(text.clone()),
        AttributeValue::N(number) => number_value(number),
        AttributeValue::Bool(flag) => Value::Bool(*flag),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), from_attribute(field)))
                .collect(),
        ),
        AttributeValue::Ss(texts) => {
            Value::Array(texts.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(numbers) => {
            Value::Array(numbers.iter().map(|number| number_value(number)).collect())
        }
        _ => Value::Null,
    }
}

fn item_from_attributes(attributes: &HashMap<String, AttributeValue>) -> Value {
    Value::Object(
        attributes
            .iter()
            .map(|(name, value)| (name.clone(), from_attribute(value)))
            .collect::<Map<_, _>>(),
    )
}

fn attributes_from_item(
    table: Table,
    item: &Value,
) -> Result<HashMap<String, AttributeValue>, StoreError> {
    match to_attribute(item) {
        AttributeValue::M(attributes) => Ok(attributes),
        _ => Err(StoreError::Encode {
            table: table.name(),
            message: "documents must be JSON objects".to_string(),
        }),
    }
}

fn key_attributes(
    table: Table,
    key: &ItemKey,
) -> Result<HashMap<String, AttributeValue>, StoreError> {
    let (partition, sort) = table.key_attributes();
    let mut attributes = HashMap::from([(partition.to_string(), to_attribute(&key.partition))]);
    match (sort, &key.sort) {
        (Some(name), Some(value)) => {
            attributes.insert(name.to_string(), to_attribute(value));
        }
        (None, None) => {}
        (Some(name), None) => {
            return Err(StoreError::Encode {
                table: table.name(),
                message: format!("key is missing sort attribute {name}"),
            })
        }
        (None, Some(_)) => {
            return Err(StoreError::Encode {
                table: table.name(),
                message: "table has no sort key".to_string(),
            })
        }
    }
    Ok(attributes)
}

pub struct DynamoDbStore {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoDbStore {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }

    fn request_error(
        table: Table,
        operation: &'static str,
        error: impl std::error::Error + 'static,
    ) -> StoreError {
        StoreError::Request {
            table: table.name(),
            operation,
            message: aws_sdk_dynamodb::error::DisplayErrorContext(&error).to_string(),
        }
    }

    async fn write_batches(
        &self,
        table: Table,
        requests: Vec<WriteRequest>,
    ) -> Result<(), StoreError> {
        for chunk in requests.chunks(BATCH_WRITE_LIMIT) {
            self.write_batch(table, chunk.to_vec()).await?;
        }
        Ok(())
    }

    /// Retries unprocessed items with exponential backoff.
    async fn write_batch(
        &self,
        table: Table,
        mut pending: Vec<WriteRequest>,
    ) -> Result<(), StoreError> {
        let mut attempt = 0u32;
        while !pending.is_empty() {
            if attempt > UNPROCESSED_RETRIES {
                return Err(StoreError::Unprocessed {
                    table: table.name(),
                    count: pending.len(),
                });
            }
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(50 * 2u64.pow(attempt))).await;
            }
            let output = self
                .client
                .batch_write_item()
                .request_items(table.name(), pending)
                .send()
                .await
                .map_err(|error| Self::request_error(table, "BatchWriteItem", error))?;
            pending = output
                .unprocessed_items()
                .and_then(|unprocessed| unprocessed.get(table.name()))
                .cloned()
                .unwrap_or_default();
            attempt += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for DynamoDbStore {
    async fn get_item(&self, table: Table, key: &ItemKey) -> Result<Option<Value>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(table.name())
            .set_key(Some(key_attributes(table, key)?))
            .send()
            .await
            .map_err(|error| Self::request_error(table, "GetItem", error))?;
        Ok(output.item().map(item_from_attributes))
    }

    async fn put_item(&self, table: Table, item: Value) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(table.name())
            .set_item(Some(attributes_from_item(table, &item)?))
            .send()
            .await
            .map_err(|error| Self::request_error(table, "PutItem", error))?;
        Ok(())
    }

    async fn put_items(&self, table: Table, items: Vec<Value>) -> Result<(), StoreError> {
        let requests = items
            .iter()
            .map(|item| -> Result<WriteRequest, StoreError> {
                let put = PutRequest::builder()
                    .set_item(Some(attributes_from_item(table, item)?))
                    .build()
                    .map_err(|error| StoreError::Encode {
                        table: table.name(),
                        message: error.to_string(),
                    })?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.write_batches(table, requests).await
    }

    async fn scan_items(&self, table: Table) -> Result<Vec<Value>, StoreError> {
        let mut items = Vec::new();
        let mut start_key = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(table.name())
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|error| Self::request_error(table, "Scan", error))?;
            items.extend(output.items().iter().map(item_from_attributes));
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn delete_items(&self, table: Table, keys: Vec<ItemKey>) -> Result<(), StoreError> {
        let requests = keys
            .iter()
            .map(|key| -> Result<WriteRequest, StoreError> {
                let delete = DeleteRequest::builder()
                    .set_key(Some(key_attributes(table, key)?))
                    .build()
                    .map_err(|error| StoreError::Encode {
                        table: table.name(),
                        message: error.to_string(),
                    })?;
                Ok(WriteRequest::builder().delete_request(delete).build())
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.write_batches(table, requests).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn documents_survive_the_attribute_mapping() {
        let document = json!({
            "isin": "COT09CB00049",
            "data": {"yield": 10.25, "category_id": 12, "rating": "AAA", "spread": null},
            "folios": [{"amount": 5000000000i64, "folio": "771"}],
            "active": true
        });
        let attributes = attributes_from_item(Table::IsinTrackFolios, &document).expect("object");
        assert_eq!(
            attributes["isin"],
            AttributeValue::S("COT09CB00049".to_string())
        );
        assert_eq!(item_from_attributes(&attributes), document);
    }

    #[test]
    fn non_object_documents_are_rejected() {
        let error = attributes_from_item(Table::Slider, &json!([1, 2])).expect_err("array");
        assert!(matches!(error, StoreError::Encode { table: "dnb-rfli-slider", .. }));
    }

    #[test]
    fn number_sets_and_exotic_numbers_decode() {
        let numbers = AttributeValue::Ns(vec!["3".to_string(), "2.5".to_string()]);
        assert_eq!(from_attribute(&numbers), json!([3, 2.5]));
        assert_eq!(number_value("1e400"), json!("1e400"));
    }

    #[test]
    fn keys_follow_the_table_schema() {
        let key = ItemKey::with_sort("2024-03-12", "CEC");
        let attributes = key_attributes(Table::CurvesEod, &key).expect("composite key");
        assert_eq!(
            attributes["valuation_date"],
            AttributeValue::S("2024-03-12".to_string())
        );
        assert_eq!(attributes["cc_curve"], AttributeValue::S("CEC".to_string()));

        assert!(key_attributes(Table::CurvesEod, &ItemKey::new("2024-03-12")).is_err());
        assert!(key_attributes(Table::Slider, &ItemKey::with_sort(1, "x")).is_err());
    }

    #[test]
    fn document_keys_are_read_from_key_attributes() {
        let document =
            json!({"user_id": "luz", "update_date": "2024-03-12 10:00:00", "isines": []});
        let key = ItemKey::of_document(Table::PortfolioParamsHistory, &document).expect("key");
        assert_eq!(key, ItemKey::with_sort("luz", "2024-03-12 10:00:00"));
        assert_eq!(ItemKey::of_document(Table::Slider, &document), None);
    }
}
