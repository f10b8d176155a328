//! Key-value table names and their key attributes.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    DataVersion,
    IsinTrackUserParams,
    IsinTrackAllIsines,
    IsinTrackFolios,
    IsinTrackUserIsines,
    CurvesIntra,
    FoliosIntra,
    CurvesEod,
    FoliosEod,
    PortfolioAllIsines,
    PortfolioUserIsines,
    PortfolioParams,
    PortfolioParamsHistory,
    PortfolioIsinParams,
    PortfolioIsinParamsHistory,
    IsinSearchAllIsines,
    IsinSearchIssuers,
    TopDeltaCategory,
    TopDeltaCategoryDetails,
    Slider,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::DataVersion => "dnb-rfli-data-version-intra",
            Self::IsinTrackUserParams => "dnb-rfli-isin-track-user-params",
            Self::IsinTrackAllIsines => "dnb-rfli-isin-track-all-isines",
            Self::IsinTrackFolios => "dnb-rfli-isin-track-folios",
            Self::IsinTrackUserIsines => "dnb-rfli-isin-track-user-isines",
            Self::CurvesIntra => "dnb-rfli-curve-compare-curves-intra",
            Self::FoliosIntra => "dnb-rfli-curve-compare-folios-intra",
            Self::CurvesEod => "dnb-rfli-curve-compare-curves-eod",
            Self::FoliosEod => "dnb-rfli-curve-compare-folios-eod",
            Self::PortfolioAllIsines => "dnb-rfli-portfolio-track-all-isines",
            Self::PortfolioUserIsines => "dnb-rfli-portfolio-track-user-isines",
            Self::PortfolioParams => "dnb-rfli-portfolio-track-params-portfolios",
            Self::PortfolioParamsHistory => "dnb-rfli-portfolio-track-params-portfolios-hist",
            Self::PortfolioIsinParams => "dnb-rfli-portfolio-track-params-isines",
            Self::PortfolioIsinParamsHistory => "dnb-rfli-portfolio-track-params-isines-hist",
            Self::IsinSearchAllIsines => "dnb-rfli-isin-search-all-isines",
            Self::IsinSearchIssuers => "dnb-rfli-isin-search-issuers",
            Self::TopDeltaCategory => "dnb-rfli-top-delta-category",
            Self::TopDeltaCategoryDetails => "dnb-rfli-top-delta-category-details",
            Self::Slider => "dnb-rfli-slider",
        }
    }

    /// Partition key attribute, plus the sort key for composite tables.
    pub fn key_attributes(self) -> (&'static str, Option<&'static str>) {
        match self {
            Self::DataVersion => ("component", None),
            Self::IsinTrackUserParams
            | Self::IsinTrackUserIsines
            | Self::PortfolioUserIsines
            | Self::PortfolioParams
            | Self::PortfolioIsinParams => ("user_id", None),
            Self::PortfolioParamsHistory | Self::PortfolioIsinParamsHistory => {
                ("user_id", Some("update_date"))
            }
            Self::IsinTrackAllIsines
            | Self::IsinTrackFolios
            | Self::PortfolioAllIsines
            | Self::IsinSearchAllIsines => ("isin", None),
            Self::CurvesIntra | Self::FoliosIntra => ("cc_curve", None),
            Self::CurvesEod | Self::FoliosEod => ("valuation_date", Some("cc_curve")),
            Self::IsinSearchIssuers => ("issuer", None),
            Self::TopDeltaCategory => ("top_category", None),
            Self::TopDeltaCategoryDetails => ("ranking_index", None),
            Self::Slider => ("slider_key", None),
        }
    }
}
