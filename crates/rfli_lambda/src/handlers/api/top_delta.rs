use serde_json::Value;

use super::{encode_body, ApiContext, ApiRequest};
use crate::adapters::key_value::{get_document, ItemKey};
use crate::errors::ApiError;
use crate::runtime::contract::{Component, Envelope};
use crate::runtime::top_delta::{CategoryDetailsDocument, TopCategoryDocument};
use crate::runtime::table_names::Table;

const RANKING_KEY: i64 = 1;

pub(super) async fn ranking(ctx: &ApiContext<'_>) -> Result<Value, ApiError> {
    let record = ctx.ledger(Component::TopDeltaCategory).await?;
    let document: Option<TopCategoryDocument> =
        get_document(ctx.store, Table::TopDeltaCategory, &ItemKey::new(RANKING_KEY)).await?;
    let wait = ctx.client_wait(&record).await?;
    encode_body(&Envelope::versioned(
        &record,
        Some(wait),
        document.map(|document| document.data),
    ))
}

/// Details of one ranked category, tagged with the ledger version only.
pub(super) async fn details(ctx: &ApiContext<'_>, request: &ApiRequest) -> Result<Value, ApiError> {
    let raw = request.required_query("ranking_index")?;
    let index: usize = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("ranking_index '{raw}' is not a number")))?;
    let record = ctx.ledger(Component::TopDeltaCategory).await?;
    let document: CategoryDetailsDocument =
        get_document(ctx.store, Table::TopDeltaCategoryDetails, &ItemKey::new(index))
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("no details for ranking index {index}")))?;
    encode_body(&Envelope {
        version: Some(record.version),
        next_update: None,
        next_status: None,
        data: Some(document.data),
        message: None,
    })
}
