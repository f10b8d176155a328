//! Reads and writes of the data-version ledger table.

use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::key_value::{get_document, put_document, put_documents, ItemKey, KeyValueStore};
use crate::errors::StoreError;
use crate::runtime::contract::{Component, VersionRecord};
use crate::runtime::table_names::Table;

pub async fn read_version(
    store: &dyn KeyValueStore,
    component: Component,
) -> Result<Option<VersionRecord>, StoreError> {
    get_document(store, Table::DataVersion, &ItemKey::new(component.as_str())).await
}

pub async fn write_version(
    store: &dyn KeyValueStore,
    record: &VersionRecord,
) -> Result<(), StoreError> {
    put_document(store, Table::DataVersion, record).await
}

/// Applies `advance` to the stored row. A missing row is logged and left
/// missing; data jobs never create ledger rows.
pub async fn advance_version(
    store: &dyn KeyValueStore,
    component: Component,
    advance: impl FnOnce(&VersionRecord) -> VersionRecord,
) -> Result<Option<VersionRecord>, StoreError> {
    let Some(current) = read_version(store, component).await? else {
        warn!(
            component = component.as_str(),
            event = "version_row_missing",
            "ledger row not found, version update skipped"
        );
        return Ok(None);
    };
    let next = advance(&current);
    write_version(store, &next).await?;
    info!(
        component = component.as_str(),
        event = "version_updated",
        version = next.version,
        next_update = next.next_update,
        next_status = next.next_status.as_str(),
    );
    Ok(Some(next))
}

/// Batch-puts one document set; empty sets are skipped.
pub async fn write_documents<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    job: &str,
    table: Table,
    documents: &[T],
) -> Result<usize, StoreError> {
    if documents.is_empty() {
        info!(job, table = table.name(), event = "documents_skipped", "no documents to write");
        return Ok(0);
    }
    let written = put_documents(store, table, documents).await?;
    info!(job, table = table.name(), event = "documents_written", count = written);
    Ok(written)
}
