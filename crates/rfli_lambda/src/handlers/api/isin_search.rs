use serde_json::Value;

use super::{encode_body, ApiContext, ApiRequest};
use crate::adapters::key_value::{get_document, scan_documents, ItemKey};
use crate::errors::ApiError;
use crate::runtime::contract::{Component, Envelope};
use crate::runtime::isin_search::{IssuerDocument, SearchIsin, TitleFilter};
use crate::runtime::table_names::Table;

pub(super) async fn isines(ctx: &ApiContext<'_>, request: &ApiRequest) -> Result<Value, ApiError> {
    let isin = request
        .query("isin")
        .ok_or_else(|| ApiError::Internal("query parameter 'isin' is required".to_string()))?;
    let record = ctx.ledger(Component::IsinSearch).await?;
    let document: SearchIsin =
        get_document(ctx.store, Table::IsinSearchAllIsines, &ItemKey::new(isin))
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("isin {isin} not found")))?;
    let wait = ctx.client_wait(&record).await?;
    encode_body(&Envelope::versioned(&record, Some(wait), Some(document)))
}

/// Filters the whole catalogue; at most `MAX_RESPONSE_ITEMS` come back.
pub(super) async fn titles(ctx: &ApiContext<'_>, request: &ApiRequest) -> Result<Value, ApiError> {
    let filter: TitleFilter = request.json_body()?;
    let catalogue: Vec<SearchIsin> = scan_documents(ctx.store, Table::IsinSearchAllIsines).await?;
    let matches = filter.apply(catalogue, ctx.config.max_response_items);
    encode_body(&Envelope::unversioned(matches))
}

pub(super) async fn issuers(ctx: &ApiContext<'_>) -> Result<Value, ApiError> {
    let mut issuers: Vec<String> =
        scan_documents::<IssuerDocument>(ctx.store, Table::IsinSearchIssuers)
            .await?
            .into_iter()
            .map(|document| document.issuer)
            .collect();
    issuers.sort();
    encode_body(&Envelope::unversioned(issuers))
}
