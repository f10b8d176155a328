//! SQL sent to the pricing database.
//!
//! Every statement starts with `SELECT` so [`with_time_limit`] can add the
//! optimizer hint. `{ids}` placeholders take a comma separated list of
//! integer category ids; everything else is bound with `?`.

/// Prefixes the statement with `MAX_EXECUTION_TIME`, in milliseconds.
pub fn with_time_limit(sql: &str, limit_ms: u64) -> String {
    match sql.trim_start().strip_prefix("SELECT") {
        Some(rest) => format!("SELECT /*+ MAX_EXECUTION_TIME({limit_ms}) */{rest}"),
        None => sql.to_string(),
    }
}

/// Expands `{ids}`; an empty list matches no category.
pub fn with_category_ids(sql: &str, ids: &[i64]) -> String {
    let list = if ids.is_empty() {
        "NULL".to_string()
    } else {
        ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
    };
    sql.replace("{ids}", &list)
}

/// Binds: date.
pub const BUSINESS_DAY: &str = "SELECT business_date
    FROM precia_sources.src_rfl_settdaysco
    WHERE business_date = ?
    LIMIT 1";

pub const CATEGORY_RATINGS: &str = "SELECT CAST(category_id AS SIGNED) AS category_id,
        CAST(rating_group AS CHAR) AS rating_group
    FROM precia_sources.src_rfl_category";

/// Binds: yesterday, today.
pub const ISIN_TRACK_PRICES: &str = "SELECT today_prices.isin_code,
        today_prices.instrument,
        today_prices.yield,
        today_prices.equivalent_margin,
        ROUND(today_prices.margin_value, 4) AS margin,
        today_prices.spread,
        today_prices.mean_price,
        today_prices.clean_price,
        CAST(today_prices.issue_date AS CHAR) AS issue_date,
        CAST(today_prices.maturity_date AS CHAR) AS maturity_date,
        CAST(today_prices.category_id AS SIGNED) AS category_id,
        yesterday_prices.yesterday_yield,
        yesterday_prices.yesterday_mean_price,
        (today_prices.yield - yesterday_prices.yesterday_yield) * 100 AS pbs_change
    FROM precia_published.pub_rfl_prices AS today_prices
        LEFT JOIN (
            SELECT isin_code AS yesterday_isin_code,
                yield AS yesterday_yield,
                mean_price AS yesterday_mean_price
            FROM precia_published.pub_rfl_prices
            WHERE valuation_date = ?
                AND isin_code != ''
                AND instrument NOT IN ('TIDISDVL', 'CERTS')
        ) AS yesterday_prices ON today_prices.isin_code = yesterday_prices.yesterday_isin_code
    WHERE today_prices.valuation_date = ?
        AND today_prices.isin_code != ''
        AND today_prices.instrument NOT IN ('TIDISDVL', 'CERTS')";

/// Binds: today.
pub const ISIN_TRACK_CATEGORIES: &str = "SELECT isin_code,
        CASE
            WHEN margin_origin = 'CAT' THEN 'Categoria'
            WHEN margin_origin = 'IND' THEN 'Individual'
            ELSE 'NA'
        END AS margin_origin,
        CASE
            WHEN margin_type = 'C' THEN 'Calculado'
            WHEN margin_type = 'H' THEN 'Historico'
            WHEN margin_type = 'A' THEN 'Actualizado'
            ELSE 'NA'
        END AS margin_type,
        get_category.issuer AS instrument_issuer,
        issuer_information.name AS issuer_name,
        cc_curve
    FROM precia_process.prc_rfl_get_category AS get_category
        LEFT JOIN precia_sources.src_rfl_issuer AS issuer_information
            ON get_category.issuer = issuer_information.issuer
    WHERE category_date = ?
        AND instrument NOT IN ('TIDISDVL', 'CERTS')
        AND isin_code != ''";

/// Binds: today, today.
pub const ISIN_TRACK_FOLIOS: &str = "SELECT prc_rfl_operations.amount,
        CAST(prc_rfl_operations.maturity_date AS CHAR) AS maturity_date,
        curve_instrument.instrument,
        CAST(prc_rfl_operations.folio AS CHAR) AS folio,
        CAST(prc_rfl_operations.maturity_days AS SIGNED) AS maturity_days,
        prc_rfl_operations.yield,
        CAST(prc_rfl_operations.category_id AS SIGNED) AS category_id
    FROM (
            (
                SELECT operation_date, instrument
                FROM precia_process.prc_rfl_basket_tes
                WHERE operation_date = ?
            )
            UNION
            (
                SELECT operation_date, instrument
                FROM precia_process.prc_rfl_corporative_basket
                WHERE operation_date = ?
                    AND instrument REGEXP '^(?!TFIT|TUVT)'
            )
        ) AS curve_instrument
        JOIN precia_process.prc_rfl_operations
            ON curve_instrument.operation_date = prc_rfl_operations.operation_date
            AND curve_instrument.instrument = prc_rfl_operations.instrument
            AND prc_rfl_operations.num_control = 1
            AND prc_rfl_operations.yield != 100";

/// Binds: curve date.
pub const CURVES: &str = "SELECT pub_rfl_betas.cc_curve,
        pub_rfl_betas.beta_0,
        pub_rfl_betas.beta_1,
        pub_rfl_betas.beta_2,
        pub_rfl_betas.tao_1 AS tau,
        CAST(cc_curve_days.days AS CHAR) AS days
    FROM (
            SELECT parameter_value AS days,
                CASE
                    WHEN parameter_name = 'curve_term_cop' THEN 'CEC'
                    WHEN parameter_name = 'curve_term_uvr' THEN 'CECUVR'
                    WHEN parameter_name = 'BAAA2_term' THEN 'BAAA2'
                    WHEN parameter_name = 'BAAA3_term' THEN 'BAAA3'
                    WHEN parameter_name = 'BAAA12_term' THEN 'BAAA12'
                END AS cc_curve
            FROM precia_sources.src_rfl_parameters
            WHERE parameter_name IN (
                'curve_term_cop', 'curve_term_uvr', 'BAAA2_term', 'BAAA3_term', 'BAAA12_term'
            )
        ) AS cc_curve_days
        INNER JOIN precia_published.pub_rfl_betas
            ON cc_curve_days.cc_curve = pub_rfl_betas.cc_curve
    WHERE pub_rfl_betas.curve_date = ?";

/// Binds: operation date, operation date.
pub const CURVE_FOLIOS: &str = "SELECT curve_instrument.cc_curve AS cc_curve,
        prc_rfl_operations.amount AS amount,
        CAST(prc_rfl_operations.maturity_date AS CHAR) AS maturity_date,
        curve_instrument.instrument AS nemo,
        CAST(prc_rfl_operations.folio AS CHAR) AS sheet,
        CAST(prc_rfl_operations.maturity_days AS SIGNED) AS maturity_days,
        prc_rfl_operations.yield AS yield,
        CAST(DATE_SUB(prc_rfl_operations.timestamp_operation, INTERVAL 5 HOUR) AS CHAR) AS timestamp_operation
    FROM (
            (
                SELECT operation_date, instrument, cc_curve
                FROM precia_process.prc_rfl_basket_tes
                WHERE operation_date = ?
            )
            UNION
            (
                SELECT operation_date, instrument, cc_curve
                FROM precia_process.prc_rfl_corporative_basket
                WHERE operation_date = ?
                    AND instrument REGEXP '^(?!TFIT|TUVT)'
            )
        ) AS curve_instrument
        JOIN precia_process.prc_rfl_operations
            ON curve_instrument.operation_date = prc_rfl_operations.operation_date
            AND curve_instrument.instrument = prc_rfl_operations.instrument
            AND prc_rfl_operations.num_control = 1
            AND prc_rfl_operations.yield != 100
    ORDER BY cc_curve, prc_rfl_operations.folio";

/// Binds: today, yesterday, today.
pub const PORTFOLIO_PRICES: &str = "SELECT rfl_prices.isin_code,
        CAST(rfl_prices.maturity_date AS CHAR) AS maturity_date,
        rfl_prices.yield,
        rfl_prices_yesterday.yield AS yesterday_yield,
        rfl_prices.clean_price,
        rfl_prices.accrued_interest,
        rfl_prices_yesterday.clean_price AS clean_price_yesterday,
        (rfl_prices.clean_price - rfl_prices_yesterday.clean_price) * 100 AS difference,
        rfl_prices.instrument,
        CAST(rfl_prices.issue_date AS CHAR) AS issue_date,
        rfl_prices.spread,
        CAST(rfl_prices.payment_frequency AS CHAR) AS payment_frequency,
        rfl_prices.mean_price,
        rfl_prices_yesterday.mean_price AS mean_price_yesterday,
        ROUND(rfl_prices.margin_value, 4) AS margin_value,
        CAST(rfl_prices.category_id AS SIGNED) AS category_id,
        rfl_prices.equivalent_margin
    FROM precia_published.pub_rfl_prices AS rfl_prices
        INNER JOIN precia_published.pub_rfl_prices AS rfl_prices_yesterday
            ON rfl_prices.isin_code = rfl_prices_yesterday.isin_code
    WHERE rfl_prices.valuation_date = ?
        AND rfl_prices_yesterday.valuation_date = ?
        AND rfl_prices.isin_code != ''
        AND rfl_prices.instrument NOT IN ('TIDISDVL', 'CERTS')
        AND rfl_prices_yesterday.maturity_date > ?";

/// End-of-day variant carrying the published rating. Binds as above.
pub const PORTFOLIO_PRICES_RATED: &str = "SELECT rfl_prices.isin_code,
        CAST(rfl_prices.maturity_date AS CHAR) AS maturity_date,
        rfl_prices.yield,
        rfl_prices_yesterday.yield AS yesterday_yield,
        rfl_prices.clean_price,
        rfl_prices.accrued_interest,
        rfl_prices_yesterday.clean_price AS clean_price_yesterday,
        (rfl_prices.clean_price - rfl_prices_yesterday.clean_price) * 100 AS difference,
        rfl_prices.instrument,
        CAST(rfl_prices.issue_date AS CHAR) AS issue_date,
        rfl_prices.spread,
        CAST(rfl_prices.payment_frequency AS CHAR) AS payment_frequency,
        rfl_prices.mean_price,
        rfl_prices_yesterday.mean_price AS mean_price_yesterday,
        ROUND(rfl_prices.margin_value, 4) AS margin_value,
        CAST(rfl_prices.category_id AS SIGNED) AS category_id,
        rfl_prices.equivalent_margin,
        rfl_prices.real_rating
    FROM precia_published.pub_rfl_prices AS rfl_prices
        INNER JOIN precia_published.pub_rfl_prices AS rfl_prices_yesterday
            ON rfl_prices.isin_code = rfl_prices_yesterday.isin_code
    WHERE rfl_prices.valuation_date = ?
        AND rfl_prices_yesterday.valuation_date = ?
        AND rfl_prices.isin_code != ''
        AND rfl_prices.instrument NOT IN ('TIDISDVL', 'CERTS')
        AND rfl_prices_yesterday.maturity_date > ?";

pub const PORTFOLIO_INSTRUMENTS: &str = "SELECT rfl_instrument.isin_code,
        rfl_instrument.issuer,
        issuer_information.name AS issuer_name,
        rfl_instrument.cc_curve
    FROM precia_sources.src_rfl_instrument AS rfl_instrument
        LEFT JOIN precia_sources.src_rfl_issuer AS issuer_information
            ON rfl_instrument.issuer = issuer_information.issuer
    WHERE rfl_instrument.isin_code != ''";

/// Binds: today.
pub const SEARCH_PRICES: &str = "SELECT today_prices.isin_code AS isin,
        today_prices.instrument AS nemo,
        CAST(today_prices.issue_date AS CHAR) AS issue_date,
        CAST(today_prices.maturity_date AS CHAR) AS maturity_date,
        CAST(today_prices.maturity_days AS SIGNED) AS maturity_days,
        today_prices.margin_value AS margin,
        CAST(IF(today_prices.rate_type = 'FS', 'NA', today_prices.equivalent_margin) AS CHAR) AS equivalent_margin,
        today_prices.mean_price,
        today_prices.clean_price,
        today_prices.accrued_interest,
        today_prices.convexity,
        today_prices.duration,
        today_prices.modified_duration,
        today_prices.rate_type,
        CAST(today_prices.category_id AS SIGNED) AS category_id,
        today_prices.currency_type,
        today_prices.yield
    FROM precia_published.pub_rfl_prices AS today_prices
    WHERE today_prices.valuation_date = ?
        AND today_prices.isin_code != ''
        AND today_prices.instrument NOT IN ('TIDISDVL', 'CERTS')";

pub const SEARCH_CATEGORIES: &str = "SELECT CAST(category_id AS SIGNED) AS category_id,
        CAST(CONVERT(class, DECIMAL(3, 0)) AS CHAR) AS category_class,
        CAST(rating_group AS CHAR) AS rating_group,
        CAST(maturity_range AS SIGNED) AS maturity_range
    FROM precia_sources.src_rfl_category";

pub const ISIN_ISSUERS: &str = "SELECT DISTINCT instrument_table.isin_code AS isin_code,
        COALESCE(issuer_table.name, 'NA') AS issuer_name
    FROM precia_sources.src_rfl_instrument AS instrument_table
        LEFT JOIN precia_sources.src_rfl_issuer AS issuer_table
            ON instrument_table.issuer = issuer_table.issuer";

/// Binds: yesterday, today.
pub const MATURED_ISINES: &str = "SELECT isin_code
    FROM precia_published.pub_rfl_prices
    WHERE valuation_date = ?
        AND maturity_date <= ?
        AND isin_code != ''";

pub const ACTIVE_ISSUERS: &str = "SELECT DISTINCT COALESCE(all_issuers.name, 'NA') AS issuer
    FROM precia_sources.src_rfl_instrument AS active_issuers
        LEFT JOIN precia_sources.src_rfl_issuer AS all_issuers
            ON active_issuers.issuer = all_issuers.issuer
    WHERE active_issuers.inst_condition = 'A'";

/// Binds: today, yesterday.
pub const CATEGORY_AGGREGATES: &str = "SELECT CAST(category_info.category_id AS SIGNED) AS category_id,
        CAST(today_prices.average_yield AS DECIMAL(20, 10)) AS today_avg,
        CAST(yesterday_prices.average_yield AS DECIMAL(20, 10)) AS yesterday_avg,
        CAST(COALESCE(today_prices.category_volume, 0) AS SIGNED) AS volume,
        CAST(CONVERT(category_info.class, DECIMAL(3, 0)) AS CHAR) AS category_class,
        CAST(category_info.currency_group AS CHAR) AS currency_group,
        CAST(category_info.rate_group AS CHAR) AS rate_group,
        CAST(category_info.rating_group AS CHAR) AS rating_group,
        CAST(category_info.maturity_range AS CHAR) AS maturity_range
    FROM precia_sources.src_rfl_category AS category_info
        LEFT JOIN (
            SELECT category_id, AVG(yield) AS average_yield, COUNT(isin_code) AS category_volume
            FROM precia_published.pub_rfl_prices
            WHERE valuation_date = ?
            GROUP BY category_id
        ) AS today_prices ON today_prices.category_id = category_info.category_id
        LEFT JOIN (
            SELECT category_id, AVG(yield) AS average_yield
            FROM precia_published.pub_rfl_prices
            WHERE valuation_date = ?
            GROUP BY category_id
        ) AS yesterday_prices ON yesterday_prices.category_id = category_info.category_id";

/// Binds: today.
pub const CATEGORY_MARGINS: &str = "SELECT CAST(category_id AS SIGNED) AS category_id,
        CAST(margin_type AS CHAR) AS margin_type
    FROM precia_process.prc_rfl_category_margin
    WHERE margin_date = ?
        AND category_id IN ({ids})";

/// Binds: today, yesterday.
pub const CURVE_CHANGES: &str = "SELECT today_yield.cc_curve,
        ROUND(AVG(today_yield.rate - yesterday_yield.rate) * 100, 2) AS pbs_diff
    FROM precia_published.pub_rfl_yield AS today_yield
        LEFT JOIN precia_published.pub_rfl_yield AS yesterday_yield
            ON today_yield.cc_curve = yesterday_yield.cc_curve
            AND today_yield.term = yesterday_yield.term
    WHERE today_yield.rate_date = ?
        AND yesterday_yield.rate_date = ?
    GROUP BY today_yield.cc_curve";

/// Binds: today, yesterday, max term.
pub const CURVE_CHANGES_UP_TO_TERM: &str = "SELECT today_yield.cc_curve,
        ROUND(AVG(today_yield.rate - yesterday_yield.rate) * 100, 2) AS pbs_diff
    FROM precia_published.pub_rfl_yield AS today_yield
        LEFT JOIN precia_published.pub_rfl_yield AS yesterday_yield
            ON today_yield.cc_curve = yesterday_yield.cc_curve
            AND today_yield.term = yesterday_yield.term
    WHERE today_yield.rate_date = ?
        AND yesterday_yield.rate_date = ?
        AND today_yield.term <= ?
    GROUP BY today_yield.cc_curve";

/// Binds: today, today.
pub const CATEGORY_FOLIOS: &str = "SELECT CAST(category_id AS SIGNED) AS category_id,
        instrument AS nemo,
        CAST(folio AS CHAR) AS sheet,
        yield,
        amount,
        CAST(trading_system AS CHAR) AS trading_system,
        IF(issue_date = ? AND sesion REGEXP '^([fFxG])$', 'PRIMARIO', 'SECUNDARIO') AS folio_type,
        CAST(maturity_date AS CHAR) AS maturity_date,
        CAST(DATE_SUB(timestamp_operation, INTERVAL 5 HOUR) AS CHAR) AS timestamp_operation
    FROM precia_process.prc_rfl_operations
    WHERE category_id IN ({ids})
        AND operation_date = ?
        AND num_control = 1";

/// Binds: yesterday, today.
pub const CATEGORY_ISINES: &str = "SELECT CAST(today_prices.category_id AS SIGNED) AS category_id,
        today_prices.isin_code,
        today_prices.instrument,
        CAST(today_prices.maturity_days AS SIGNED) AS maturity_days,
        today_prices.yield,
        yesterday_prices.yield AS yesterday_yield,
        issuer_information.name AS issuer_name
    FROM precia_published.pub_rfl_prices AS today_prices
        LEFT JOIN precia_published.pub_rfl_prices AS yesterday_prices
            ON yesterday_prices.isin_code = today_prices.isin_code
            AND yesterday_prices.valuation_date = ?
        LEFT JOIN precia_sources.src_rfl_instrument AS instrument_information
            ON instrument_information.isin_code = today_prices.isin_code
        LEFT JOIN precia_sources.src_rfl_issuer AS issuer_information
            ON issuer_information.issuer = instrument_information.issuer
    WHERE today_prices.valuation_date = ?
        AND today_prices.category_id IN ({ids})
        AND today_prices.maturity_days IS NOT NULL
        AND today_prices.isin_code != ''";

pub const RANGE_MIDPOINTS: &str = "SELECT CAST(category_info.category_id AS SIGNED) AS category_id,
        CAST((expiration.start_range + expiration.end_range) / 2 AS DECIMAL(20, 4)) AS range_average
    FROM precia_sources.src_rfl_category AS category_info
        JOIN precia_sources.src_rfl_expiration_range AS expiration
            ON category_info.maturity_range = expiration.id_expiration_range
    WHERE category_info.category_id IN ({ids})";

/// Binds: month ago, today, today, yesterday.
pub const SLIDER_TES: &str = "SELECT top_instrument_table.instrument AS instrument,
        prices.isin_code AS isin_code,
        prices.yield AS yield,
        prices.pbs_change AS pbs_change,
        CAST(0 AS SIGNED) AS category_id
    FROM (
            SELECT instrument, SUM(volume) AS volume
            FROM precia_process.prc_rfl_operations
            WHERE operation_date >= ?
                AND operation_date <= ?
                AND (instrument LIKE 'TUVT%' OR instrument LIKE 'TFIT%')
            GROUP BY instrument
            ORDER BY volume DESC
            LIMIT 6
        ) AS top_instrument_table
        LEFT JOIN (
            SELECT prices_today.instrument,
                prices_today.yield,
                COALESCE(prices_today.yield - prices_yesterday.yield, 0) * 100 AS pbs_change,
                prices_today.isin_code,
                prices_today.maturity_days
            FROM precia_published.pub_rfl_prices AS prices_today
                LEFT JOIN precia_published.pub_rfl_prices AS prices_yesterday
                    ON prices_yesterday.isin_code = prices_today.isin_code
            WHERE prices_today.valuation_date = ?
                AND prices_yesterday.valuation_date = ?
        ) AS prices ON top_instrument_table.instrument = prices.instrument
    ORDER BY prices.maturity_days ASC";

/// Binds: today, category id, yesterday.
pub const SLIDER_CATEGORY: &str = "SELECT today_prices.instrument,
        today_prices.isin_code,
        today_prices.yield,
        COALESCE(today_prices.yield - yesterday_prices.yield, 0) * 100 AS pbs_change,
        CAST(today_prices.category_id AS SIGNED) AS category_id
    FROM (
            SELECT category_id, instrument, isin_code, maturity_days, yield
            FROM precia_published.pub_rfl_prices
            WHERE valuation_date = ?
                AND category_id = ?
            ORDER BY maturity_days DESC
            LIMIT 1
        ) AS today_prices
        LEFT JOIN (
            SELECT isin_code, yield
            FROM precia_published.pub_rfl_prices
            WHERE valuation_date = ?
        ) AS yesterday_prices ON today_prices.isin_code = yesterday_prices.isin_code";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_limit_hint_follows_the_select_keyword() {
        let sql = with_time_limit(CATEGORY_RATINGS, 300_000);
        assert!(sql.starts_with("SELECT /*+ MAX_EXECUTION_TIME(300000) */ CAST(category_id"));
        assert_eq!(with_time_limit("SHOW TABLES", 10), "SHOW TABLES");
    }

    #[test]
    fn category_ids_expand_into_the_in_list() {
        let sql = with_category_ids(CATEGORY_MARGINS, &[12, 7]);
        assert!(sql.contains("category_id IN (12,7)"));
        assert!(with_category_ids(RANGE_MIDPOINTS, &[]).contains("IN (NULL)"));
    }

    #[test]
    fn every_statement_accepts_the_time_limit() {
        for sql in [
            BUSINESS_DAY,
            ISIN_TRACK_PRICES,
            ISIN_TRACK_FOLIOS,
            CURVES,
            CURVE_FOLIOS,
            PORTFOLIO_PRICES_RATED,
            SEARCH_PRICES,
            CATEGORY_AGGREGATES,
            CATEGORY_ISINES,
            SLIDER_TES,
            SLIDER_CATEGORY,
        ] {
            assert!(with_time_limit(sql, 1).contains("MAX_EXECUTION_TIME(1)"));
        }
    }
}
