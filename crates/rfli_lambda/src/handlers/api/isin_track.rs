use serde::Deserialize;
use serde_json::Value;

use super::{caller, encode_body, select_isines, user_document, ApiContext, ApiRequest};
use crate::adapters::key_value::{get_document, put_document, ItemKey};
use crate::errors::ApiError;
use crate::runtime::contract::{unique_isines, Component, Envelope};
use crate::runtime::isin_track::{FoliosDocument, IsinDocument, UserIsinesDocument, UserParams};
use crate::runtime::table_names::Table;

#[derive(Debug, Deserialize)]
struct IsinesBody {
    #[serde(default)]
    isines: Vec<String>,
}

pub(super) async fn user_isines(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let user = caller(request)?;
    let record = ctx.ledger(Component::IsinTrack).await?;
    let document: UserIsinesDocument = user_document(ctx.store, Table::IsinTrackUserIsines, &user)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no tracked isines for {user}")))?;
    let wait = ctx.client_wait(&record).await?;
    encode_body(&Envelope::versioned(&record, Some(wait), Some(document.isines)))
}

/// Replaces the caller's tracked ISINs with the requested ones that exist.
pub(super) async fn user_params(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let user = caller(request)?;
    let body: IsinesBody = request.json_body()?;
    let requested = unique_isines(&body.isines)?;
    let record = ctx.ledger(Component::IsinTrack).await?;

    let selection =
        select_isines::<IsinDocument>(ctx.store, Table::IsinTrackAllIsines, &requested).await?;
    let message = selection.correction_message();
    if selection.found.is_empty() {
        return Err(ApiError::NotFound(
            message.unwrap_or_else(|| "none of the requested isines exist".to_string()),
        ));
    }

    let params = UserParams {
        user_id: user.clone(),
        isines: selection.found.iter().map(|document| document.isin.clone()).collect(),
    };
    put_document(ctx.store, Table::IsinTrackUserParams, &params).await?;
    let documents = UserIsinesDocument {
        user_id: user,
        isines: selection.found,
    };
    put_document(ctx.store, Table::IsinTrackUserIsines, &documents).await?;

    let wait = ctx.client_wait(&record).await?;
    let envelope = Envelope::versioned(&record, Some(wait), Some(documents.isines));
    match message {
        Some(message) => encode_body(&envelope.with_message(message)),
        None => encode_body(&envelope),
    }
}

pub(super) async fn folios(ctx: &ApiContext<'_>, request: &ApiRequest) -> Result<Value, ApiError> {
    let isin = request.required_query("isin")?;
    let document: FoliosDocument =
        get_document(ctx.store, Table::IsinTrackFolios, &ItemKey::new(isin))
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("no folios for isin {isin}")))?;
    encode_body(&Envelope::unversioned(document.folios))
}
