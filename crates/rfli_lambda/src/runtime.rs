//! Domain primitives used by the Lambda handlers.

pub use rfli_core::{
    contract, curve_compare, isin_search, isin_track, portfolio_track, ratings, schedule, slider,
    table_names, top_delta, versioning,
};
