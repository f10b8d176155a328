use serde_json::Value;

use super::{encode_body, ApiContext};
use crate::adapters::key_value::{get_document, ItemKey};
use crate::errors::ApiError;
use crate::runtime::contract::{Component, Envelope};
use crate::runtime::slider::{SliderDocument, SLIDER_KEY};
use crate::runtime::table_names::Table;

pub(super) async fn slider(ctx: &ApiContext<'_>) -> Result<Value, ApiError> {
    let record = ctx.ledger(Component::Slider).await?;
    let document: Option<SliderDocument> =
        get_document(ctx.store, Table::Slider, &ItemKey::new(SLIDER_KEY)).await?;
    let wait = ctx.client_wait(&record).await?;
    encode_body(&Envelope::versioned(
        &record,
        Some(wait),
        document.map(|document| document.data),
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handlers::api::handle_api_event;
    use crate::runtime::contract::NextStatus;
    use crate::testing::{
        api_event, bogota, response_body, runtime_config, schedule_parameters, version_row,
        InMemoryStore,
    };

    #[tokio::test]
    async fn slider_entries_carry_the_client_wait() {
        let store = InMemoryStore::new();
        store.seed(
            Table::DataVersion,
            vec![version_row(
                Component::Slider,
                4,
                NextStatus::Intraday,
                bogota(9, 5).timestamp(),
            )],
        );
        let parameters = schedule_parameters(&[]);
        let config = runtime_config(&[]);
        let ctx = ApiContext {
            store: &store,
            parameters: &parameters,
            config: &config,
            now: bogota(9, 0),
        };

        let response = handle_api_event(

            &ctx,

            api_event("GET", "/slider", json!({}), None, None),

        )

        .await;
        assert_eq!(
            response_body(&response),
            json!({"version": 4, "next_update": 300, "next_status": "intraday", "data": null})
        );

        store.seed(
            Table::Slider,
            vec![json!({"slider_key": 1, "data": [
                {"name": "TES 2024", "yield": 10.2, "pbs_change": -3}
            ]})],
        );
        let response = handle_api_event(
            &ctx,
            api_event("GET", "/slider", json!({}), None, None),
        )
        .await;
        let body = response_body(&response);
        assert_eq!(body["data"][0]["name"], "TES 2024");
        assert_eq!(body["data"][0]["pbs_change"], json!(-3.0));
    }
}
