//! Relational source of prices, curves, folios and categories.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::{
    MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow,
};
use sqlx::FromRow;

use crate::adapters::secrets::DbCredentials;
use crate::errors::{SourceError, MYSQL_QUERY_TIMEOUT};
use crate::runtime::curve_compare::{CurveFolioRow, CurveRow};
use crate::runtime::isin_search::{IsinIssuerRow, SearchCategoryRow, SearchPriceRow};
use crate::runtime::isin_track::{CategoryRow, FolioRow, PriceRow};
use crate::runtime::portfolio_track::{InstrumentRow, PortfolioPriceRow};
use crate::runtime::ratings::CategoryRatingRow;
use crate::runtime::slider::SliderRow;
use crate::runtime::top_delta::{
    CategoryAggregateRow, CategoryIsinRow, CategoryMarginRow, CurveChangeRow, RangeMidpointRow,
    TopDeltaFolioRow,
};
use crate::sql;

/// Queries used by the ETL jobs. `today`/`yesterday` are calendar days;
/// callers derive `yesterday` as `today - 1 day`.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn is_business_day(&self, date: NaiveDate) -> Result<bool, SourceError>;
    async fn category_ratings(&self) -> Result<Vec<CategoryRatingRow>, SourceError>;

    async fn isin_track_prices(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
    ) -> Result<Vec<PriceRow>, SourceError>;
    async fn isin_track_categories(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<CategoryRow>, SourceError>;
    async fn isin_track_folios(&self, today: NaiveDate) -> Result<Vec<FolioRow>, SourceError>;

    async fn curves(&self, date: NaiveDate) -> Result<Vec<CurveRow>, SourceError>;
    async fn curve_folios(&self, date: NaiveDate) -> Result<Vec<CurveFolioRow>, SourceError>;

    /// `rated` selects the published `real_rating` column (end of day).
    async fn portfolio_prices(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        rated: bool,
    ) -> Result<Vec<PortfolioPriceRow>, SourceError>;
    async fn portfolio_instruments(&self) -> Result<Vec<InstrumentRow>, SourceError>;

    async fn search_prices(&self, today: NaiveDate) -> Result<Vec<SearchPriceRow>, SourceError>;
    async fn search_categories(&self) -> Result<Vec<SearchCategoryRow>, SourceError>;
    async fn isin_issuers(&self) -> Result<Vec<IsinIssuerRow>, SourceError>;
    async fn matured_isines(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
    ) -> Result<Vec<String>, SourceError>;
    async fn active_issuers(&self) -> Result<Vec<String>, SourceError>;

    async fn category_aggregates(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
    ) -> Result<Vec<CategoryAggregateRow>, SourceError>;
    async fn category_margins(
        &self,
        today: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<CategoryMarginRow>, SourceError>;
    /// `max_term: None` averages over every term.
    async fn curve_changes(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        max_term: Option<i64>,
    ) -> Result<Vec<CurveChangeRow>, SourceError>;
    async fn category_folios(
        &self,
        today: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<TopDeltaFolioRow>, SourceError>;
    async fn category_isines(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<CategoryIsinRow>, SourceError>;
    async fn range_midpoints(
        &self,
        category_ids: &[i64],
    ) -> Result<Vec<RangeMidpointRow>, SourceError>;

    async fn slider_tes(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        month_ago: NaiveDate,
    ) -> Result<Vec<SliderRow>, SourceError>;
    async fn slider_category(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        category_id: i64,
    ) -> Result<Vec<SliderRow>, SourceError>;
}

#[derive(FromRow)]
struct IsinRow {
    isin_code: String,
}

#[derive(FromRow)]
struct IssuerRow {
    issuer: String,
}

pub struct MySqlMarketSource {
    pool: MySqlPool,
    time_limit_ms: u64,
}

impl MySqlMarketSource {
    /// The pool connects on first use.
    pub fn connect_lazy(credentials: &DbCredentials, query_timeout: Duration) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.username)
            .password(&credentials.password);
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect_lazy_with(options);
        Self {
            pool,
            time_limit_ms: u64::try_from(query_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn statement(&self, sql: &str) -> String {
        sql::with_time_limit(sql, self.time_limit_ms)
    }

    fn classify(query: &'static str, error: sqlx::Error) -> SourceError {
        if let sqlx::Error::Database(database_error) = &error {
            let timed_out = database_error
                .try_downcast_ref::<MySqlDatabaseError>()
                .map_or(false, |mysql| mysql.number() == MYSQL_QUERY_TIMEOUT);
            if timed_out {
                return SourceError::QueryTimeout { query };
            }
        }
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                SourceError::Connect(error)
            }
            other => SourceError::Query {
                query,
                source: other,
            },
        }
    }

    async fn fetch<T>(
        &self,
        query: &'static str,
        sql: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<T>, SourceError>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        let statement = self.statement(sql);
        let mut prepared = sqlx::query_as::<_, T>(&statement);
        for date in dates {
            prepared = prepared.bind(*date);
        }
        let rows = prepared
            .fetch_all(&self.pool)
            .await
            .map_err(|error| Self::classify(query, error))?;
        tracing::debug!(query, rows = rows.len(), "source query finished");
        Ok(rows)
    }
}

#[async_trait]
impl MarketSource for MySqlMarketSource {
    async fn is_business_day(&self, date: NaiveDate) -> Result<bool, SourceError> {
        let statement = self.statement(sql::BUSINESS_DAY);
        let row = sqlx::query(&statement)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| Self::classify("business_day", error))?;
        Ok(row.is_some())
    }

    async fn category_ratings(&self) -> Result<Vec<CategoryRatingRow>, SourceError> {
        self.fetch("category_ratings", sql::CATEGORY_RATINGS, &[]).await
    }

    async fn isin_track_prices(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
    ) -> Result<Vec<PriceRow>, SourceError> {
        self.fetch("isin_track_prices", sql::ISIN_TRACK_PRICES, &[yesterday, today])
            .await
    }

    async fn isin_track_categories(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<CategoryRow>, SourceError> {
        self.fetch("isin_track_categories", sql::ISIN_TRACK_CATEGORIES, &[today])
            .await
    }

    async fn isin_track_folios(&self, today: NaiveDate) -> Result<Vec<FolioRow>, SourceError> {
        self.fetch("isin_track_folios", sql::ISIN_TRACK_FOLIOS, &[today, today])
            .await
    }

    async fn curves(&self, date: NaiveDate) -> Result<Vec<CurveRow>, SourceError> {
        self.fetch("curves", sql::CURVES, &[date]).await
    }

    async fn curve_folios(&self, date: NaiveDate) -> Result<Vec<CurveFolioRow>, SourceError> {
        self.fetch("curve_folios", sql::CURVE_FOLIOS, &[date, date]).await
    }

    async fn portfolio_prices(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        rated: bool,
    ) -> Result<Vec<PortfolioPriceRow>, SourceError> {
        let statement = if rated {
            sql::PORTFOLIO_PRICES_RATED
        } else {
            sql::PORTFOLIO_PRICES
        };
        self.fetch("portfolio_prices", statement, &[today, yesterday, today])
            .await
    }

    async fn portfolio_instruments(&self) -> Result<Vec<InstrumentRow>, SourceError> {
        self.fetch("portfolio_instruments", sql::PORTFOLIO_INSTRUMENTS, &[])
            .await
    }

    async fn search_prices(&self, today: NaiveDate) -> Result<Vec<SearchPriceRow>, SourceError> {
        self.fetch("search_prices", sql::SEARCH_PRICES, &[today]).await
    }

    async fn search_categories(&self) -> Result<Vec<SearchCategoryRow>, SourceError> {
        self.fetch("search_categories", sql::SEARCH_CATEGORIES, &[]).await
    }

    async fn isin_issuers(&self) -> Result<Vec<IsinIssuerRow>, SourceError> {
        self.fetch("isin_issuers", sql::ISIN_ISSUERS, &[]).await
    }

    async fn matured_isines(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
    ) -> Result<Vec<String>, SourceError> {
        let rows: Vec<IsinRow> = self
            .fetch("matured_isines", sql::MATURED_ISINES, &[yesterday, today])
            .await?;
        Ok(rows.into_iter().map(|row| row.isin_code).collect())
    }

    async fn active_issuers(&self) -> Result<Vec<String>, SourceError> {
        let rows: Vec<IssuerRow> = self.fetch("active_issuers", sql::ACTIVE_ISSUERS, &[]).await?;
        Ok(rows.into_iter().map(|row| row.issuer).collect())
    }

    async fn category_aggregates(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
    ) -> Result<Vec<CategoryAggregateRow>, SourceError> {
        self.fetch("category_aggregates", sql::CATEGORY_AGGREGATES, &[today, yesterday])
            .await
    }

    async fn category_margins(
        &self,
        today: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<CategoryMarginRow>, SourceError> {
        let statement = sql::with_category_ids(sql::CATEGORY_MARGINS, category_ids);
        self.fetch("category_margins", &statement, &[today]).await
    }

    async fn curve_changes(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        max_term: Option<i64>,
    ) -> Result<Vec<CurveChangeRow>, SourceError> {
        let Some(max_term) = max_term else {
            return self
                .fetch("curve_changes", sql::CURVE_CHANGES, &[today, yesterday])
                .await;
        };
        let statement = self.statement(sql::CURVE_CHANGES_UP_TO_TERM);
        sqlx::query_as::<_, CurveChangeRow>(&statement)
            .bind(today)
            .bind(yesterday)
            .bind(max_term)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| Self::classify("curve_changes", error))
    }

    async fn category_folios(
        &self,
        today: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<TopDeltaFolioRow>, SourceError> {
        let statement = sql::with_category_ids(sql::CATEGORY_FOLIOS, category_ids);
        self.fetch("category_folios", &statement, &[today, today]).await
    }

    async fn category_isines(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<CategoryIsinRow>, SourceError> {
        let statement = sql::with_category_ids(sql::CATEGORY_ISINES, category_ids);
        self.fetch("category_isines", &statement, &[yesterday, today]).await
    }

    async fn range_midpoints(
        &self,
        category_ids: &[i64],
    ) -> Result<Vec<RangeMidpointRow>, SourceError> {
        let statement = sql::with_category_ids(sql::RANGE_MIDPOINTS, category_ids);
        self.fetch("range_midpoints", &statement, &[]).await
    }

    async fn slider_tes(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        month_ago: NaiveDate,
    ) -> Result<Vec<SliderRow>, SourceError> {
        self.fetch("slider_tes", sql::SLIDER_TES, &[month_ago, today, today, yesterday])
            .await
    }

    async fn slider_category(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        category_id: i64,
    ) -> Result<Vec<SliderRow>, SourceError> {
        let statement = self.statement(sql::SLIDER_CATEGORY);
        sqlx::query_as::<_, SliderRow>(&statement)
            .bind(today)
            .bind(category_id)
            .bind(yesterday)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| Self::classify("slider_category", error))
    }
}
