use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{caller, encode_body, select_isines, user_document, ApiContext, ApiRequest};
use crate::adapters::key_value::put_document;
use crate::errors::ApiError;
use crate::runtime::contract::{unique_isines, Component, Envelope};
use crate::runtime::portfolio_track::{
    IsinParams, PortfolioIsinDocument, PortfolioParams, PortfolioUserIsines, Portfolios,
};
use crate::runtime::schedule::market_now;
use crate::runtime::table_names::Table;

#[derive(Debug, Deserialize)]
struct PortfolioBody {
    #[serde(default)]
    portfolios: Portfolios,
    #[serde(default)]
    isines: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PortfolioView {
    portfolios: Portfolios,
    isines: Vec<PortfolioIsinDocument>,
}

/// Audit row of a params document.
#[derive(Serialize)]
struct HistoryRow<'a, T: Serialize> {
    #[serde(flatten)]
    params: &'a T,
    update_date: &'a str,
}

fn update_date(now: DateTime<Utc>) -> String {
    market_now(now).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Saves the caller's portfolios and tracked ISINs, keeping a history row
/// of each params document.
pub(super) async fn user_params(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let user = caller(request)?;
    let body: PortfolioBody = request.json_body()?;
    let requested = unique_isines(&body.isines)?;
    let record = ctx.ledger(Component::PortfolioTrack).await?;

    let selection =
        select_isines::<PortfolioIsinDocument>(ctx.store, Table::PortfolioAllIsines, &requested)
            .await?;
    let message = selection.correction_message();
    if selection.found.is_empty() {
        return Err(ApiError::NotFound(
            message.unwrap_or_else(|| "none of the requested isines exist".to_string()),
        ));
    }

    let updated = update_date(ctx.now);
    let isin_params = IsinParams {
        user_id: user.clone(),
        isines: selection
            .found
            .iter()
            .map(|document| document.isin.clone())
            .collect(),
    };
    put_document(ctx.store, Table::PortfolioIsinParams, &isin_params).await?;
    put_document(
        ctx.store,
        Table::PortfolioIsinParamsHistory,
        &HistoryRow {
            params: &isin_params,
            update_date: &updated,
        },
    )
    .await?;
    let user_isines = PortfolioUserIsines {
        user_id: user.clone(),
        isines: selection.found,
    };
    put_document(ctx.store, Table::PortfolioUserIsines, &user_isines).await?;

    let portfolio = PortfolioParams {
        user_id: user,
        portfolios: body.portfolios,
    };
    put_document(ctx.store, Table::PortfolioParams, &portfolio).await?;
    put_document(
        ctx.store,
        Table::PortfolioParamsHistory,
        &HistoryRow {
            params: &portfolio,
            update_date: &updated,
        },
    )
    .await?;

    let wait = ctx.client_wait(&record).await?;
    let view = PortfolioView {
        portfolios: portfolio.portfolios,
        isines: user_isines.isines,
    };
    let envelope = Envelope::versioned(&record, Some(wait), Some(view));
    match message {
        Some(message) => encode_body(&envelope.with_message(message)),
        None => encode_body(&envelope),
    }
}

pub(super) async fn user_portfolios(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let user = caller(request)?;
    let record = ctx.ledger(Component::PortfolioTrack).await?;
    let portfolio: Option<PortfolioParams> =
        user_document(ctx.store, Table::PortfolioParams, &user).await?;
    let isines: Option<PortfolioUserIsines> =
        user_document(ctx.store, Table::PortfolioUserIsines, &user).await?;
    if portfolio.is_none() && isines.is_none() {
        return Err(ApiError::NotFound(format!("no portfolios for {user}")));
    }

    let view = PortfolioView {
        portfolios: portfolio.map(|params| params.portfolios).unwrap_or_default(),
        isines: isines.map(|document| document.isines).unwrap_or_default(),
    };
    let wait = ctx.client_wait(&record).await?;
    encode_body(&Envelope::versioned(&record, Some(wait), Some(view)))
}
