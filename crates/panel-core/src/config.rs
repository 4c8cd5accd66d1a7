//! Pipeline configuration.
//!
//! All policy that used to live in process-wide constants (the tag-group table,
//! the treated entity, the treatment start, the coverage thresholds) is carried by
//! an explicit [`PipelineConfig`] passed to the pipeline's entry point. The fetch
//! collaborator is configured separately by [`FetchConfig`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{PanelError, Result};
use crate::frequency::{PeriodType, TimeIndex};
use crate::types::Ticker;

/// One metric label and its acceptable source tags, in priority order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroup {
    /// Canonical metric label.
    pub label: String,
    /// Acceptable source tags, highest priority first.
    pub tags: Vec<String>,
}

impl TagGroup {
    /// Creates a tag group.
    #[must_use]
    pub fn new(label: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            label: label.into(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

/// Static mapping from metric label to an ordered list of source tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagGroups(Vec<TagGroup>);

impl TagGroups {
    /// Creates a tag-group table from explicit groups.
    #[must_use]
    pub const fn new(groups: Vec<TagGroup>) -> Self {
        Self(groups)
    }

    /// Iterates over the groups in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &TagGroup> {
        self.0.iter()
    }

    /// Metric labels in configuration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|g| g.label.as_str())
    }

    /// Looks up the group for a label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&TagGroup> {
        self.0.iter().find(|g| g.label == label)
    }

    /// Every tag of every group, sorted and deduplicated.
    #[must_use]
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.0.iter().flat_map(|g| g.tags.clone()).collect();
        tags.sort();
        tags.dedup();
        tags
    }

    /// Reverse map from source tag to metric label.
    #[must_use]
    pub fn tag_to_label(&self) -> HashMap<&str, &str> {
        self.0
            .iter()
            .flat_map(|g| g.tags.iter().map(move |t| (t.as_str(), g.label.as_str())))
            .collect()
    }

    /// Checks that labels are unique and non-empty and that no tag belongs to two groups.
    pub fn validate(&self) -> Result<()> {
        let mut owner: HashMap<&str, &str> = HashMap::new();
        let mut labels = Vec::new();
        for group in &self.0 {
            if group.label.is_empty() {
                return Err(PanelError::Config("empty metric label".to_string()));
            }
            if labels.contains(&group.label.as_str()) {
                return Err(PanelError::Config(format!(
                    "metric label {} configured twice",
                    group.label
                )));
            }
            labels.push(group.label.as_str());
            for tag in &group.tags {
                if let Some(other) = owner.insert(tag.as_str(), group.label.as_str()) {
                    return Err(PanelError::Config(format!(
                        "tag {} belongs to both {} and {}",
                        tag, other, group.label
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for TagGroups {
    fn default() -> Self {
        Self(vec![
            TagGroup::new(
                "revenue",
                &[
                    "Revenues",
                    "SalesRevenueNet",
                    "RevenueFromContractWithCustomerExcludingAssessedTax",
                    "SalesRevenueGoodsNet",
                    "SalesRevenueServicesNet",
                    "SalesRevenueNetOfReturnsAndAllowances",
                    "OperatingRevenues",
                    "InterestAndDividendIncomeOperating",
                ],
            ),
            TagGroup::new(
                "cost",
                &[
                    "CostOfRevenue",
                    "CostOfGoodsAndServicesSold",
                    "CostOfGoodsSold",
                    "CostOfServices",
                ],
            ),
            TagGroup::new("gross_profit", &["GrossProfit"]),
            TagGroup::new(
                "operating_exp",
                &[
                    "OperatingExpenses",
                    "SellingGeneralAndAdministrativeExpenses",
                    "GeneralAndAdministrativeExpense",
                    "SellingAndMarketingExpense",
                    "AdvertisingExpense",
                ],
            ),
            TagGroup::new(
                "r_and_d",
                &[
                    "ResearchAndDevelopmentExpense",
                    "ResearchAndDevelopmentExpenseExcludingAcquiredInProcessCost",
                ],
            ),
            TagGroup::new(
                "depr_amort",
                &[
                    "DepreciationAndAmortization",
                    "Depreciation",
                    "AmortizationExpense",
                    "DepreciationAmortizationAndAccretionNet",
                ],
            ),
            TagGroup::new(
                "interest_exp",
                &["InterestExpense", "InterestExpenseNet", "InterestAndDebtExpense"],
            ),
            TagGroup::new(
                "tax",
                &[
                    "IncomeTaxExpenseBenefit",
                    "ProvisionForIncomeTaxes",
                    "IncomeTaxesPaid",
                ],
            ),
            TagGroup::new(
                "net_income",
                &[
                    "NetIncomeLoss",
                    "ProfitLoss",
                    "NetIncomeLossAttributableToParent",
                    "IncomeLossFromContinuingOperations",
                    "IncomeLossFromContinuingOperationsAttributableToParent",
                ],
            ),
            TagGroup::new(
                "eps_basic",
                &[
                    "EarningsPerShareBasic",
                    "EarningsPerShareBasicContinuingOperations",
                ],
            ),
            TagGroup::new(
                "eps_diluted",
                &[
                    "EarningsPerShareDiluted",
                    "EarningsPerShareDilutedContinuingOperations",
                ],
            ),
            TagGroup::new(
                "shares_basic",
                &[
                    "WeightedAverageNumberOfSharesOutstandingBasic",
                    "WeightedAverageNumberOfSharesOutstanding",
                ],
            ),
            TagGroup::new(
                "shares_diluted",
                &["WeightedAverageNumberOfDilutedSharesOutstanding"],
            ),
            TagGroup::new("assets", &["Assets"]),
            TagGroup::new("assets_curr", &["AssetsCurrent"]),
            TagGroup::new("liab", &["Liabilities"]),
            TagGroup::new("liab_curr", &["LiabilitiesCurrent"]),
            TagGroup::new(
                "equity",
                &[
                    "StockholdersEquity",
                    "StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
                    "Equity",
                ],
            ),
            TagGroup::new(
                "cash",
                &[
                    "CashAndCashEquivalentsAtCarryingValue",
                    "CashCashEquivalentsAndShortTermInvestments",
                ],
            ),
            TagGroup::new(
                "receivables",
                &["AccountsReceivableNetCurrent", "ReceivablesNetCurrent"],
            ),
            TagGroup::new(
                "debt",
                &["LongTermDebt", "LongTermDebtNoncurrent", "LongTermBorrowings"],
            ),
        ])
    }
}

/// How a metric's source tag is chosen for an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSelection {
    /// Most frequently used tag, with a secondary tag filling sustained gaps.
    #[default]
    DominantWithFallback,
    /// First tag in priority order that has any reported value.
    FirstAvailable,
}

/// Open interval of period lengths (in days) classified as quarterly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterlyWindow {
    /// Exclusive lower bound in days.
    pub lower: i64,
    /// Exclusive upper bound in days.
    pub upper: i64,
}

impl QuarterlyWindow {
    /// The (80, 120) day window.
    pub const STRICT: Self = Self {
        lower: 80,
        upper: 120,
    };

    /// The (60, 122) day window.
    pub const LOOSE: Self = Self {
        lower: 60,
        upper: 122,
    };

    /// Returns true if `days` lies strictly inside the window.
    #[must_use]
    pub const fn contains(&self, days: i64) -> bool {
        days > self.lower && days < self.upper
    }
}

impl Default for QuarterlyWindow {
    fn default() -> Self {
        Self::STRICT
    }
}

/// First treated period, either as a time index or as a calendar date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreatmentStart {
    /// Explicit panel time index.
    Index(TimeIndex),
    /// A date, converted with the branch's time-index function.
    Date(NaiveDate),
}

impl TreatmentStart {
    /// Resolves the start to a time index for the given branch.
    #[must_use]
    pub fn to_time_index(&self, period_type: PeriodType) -> TimeIndex {
        match self {
            Self::Index(t) => *t,
            Self::Date(d) => period_type.time_index(*d),
        }
    }
}

/// The treated entity and the start of its treatment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentConfig {
    /// The single entity under study.
    pub ticker: Ticker,
    /// First treated period.
    pub start: TreatmentStart,
}

impl Default for TreatmentConfig {
    fn default() -> Self {
        Self {
            ticker: Ticker::new("MCD"),
            start: TreatmentStart::Date(
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap_or(NaiveDate::MIN),
            ),
        }
    }
}

/// Direction of within-entity carry filling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeMethod {
    /// Carry the last observed value forward.
    Forward,
    /// Carry the next observed value backward.
    Backward,
    /// Forward fill, then backward fill.
    #[default]
    Both,
}

/// Imputer settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImputeConfig {
    /// Fill direction.
    pub method: ImputeMethod,
    /// Metric columns left untouched.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// How values are rescaled against the entity baseline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardizeMethod {
    /// `value / baseline`.
    #[default]
    Ratio,
    /// `value - baseline`.
    Diff,
}

/// Standardizer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardizeConfig {
    /// Rescaling method.
    pub method: StandardizeMethod,
    /// Metric columns to standardize.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Suffix of the derived column names (`revenue` -> `revenue_std`).
    pub suffix: String,
}

impl Default for StandardizeConfig {
    fn default() -> Self {
        Self {
            method: StandardizeMethod::Ratio,
            columns: Vec::new(),
            suffix: "std".to_string(),
        }
    }
}

/// A derived column `numerator / denominator`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRatio {
    /// Output column name.
    pub name: String,
    /// Numerator metric.
    pub numerator: String,
    /// Denominator metric.
    pub denominator: String,
}

impl DerivedRatio {
    /// Creates a derived ratio.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }
}

/// Closed range of time indices kept for estimation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationWindow {
    /// First kept time index.
    pub start: Option<TimeIndex>,
    /// Last kept time index.
    pub end: Option<TimeIndex>,
}

impl EstimationWindow {
    /// Returns true if `time` lies inside the window.
    #[must_use]
    pub fn contains(&self, time: TimeIndex) -> bool {
        self.start.is_none_or(|s| time >= s) && self.end.is_none_or(|e| time <= e)
    }
}

/// Configuration of the whole reconciliation pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Metric label to ordered source tags.
    pub tag_groups: TagGroups,
    /// Tag selection policy.
    pub tag_selection: TagSelection,
    /// Quarterly or annual branch.
    pub period_type: PeriodType,
    /// Interval classification bounds for the quarterly branch.
    pub quarterly_window: QuarterlyWindow,
    /// Treated entity and treatment start.
    pub treatment: TreatmentConfig,
    /// Minimum consecutive gap years before a secondary tag is substituted.
    pub min_gap: usize,
    /// Minimum pre-treatment coverage of the outcome for a donor to be kept.
    pub min_pre_coverage: f64,
    /// Explicit pre-treatment cutoff; inferred from the treatment indicator when absent.
    pub pre_treatment_cutoff: Option<TimeIndex>,
    /// Outcome metric used by the donor filter.
    pub outcome_metric: String,
    /// Imputer settings.
    pub impute: ImputeConfig,
    /// Standardizer settings.
    pub standardize: StandardizeConfig,
    /// Columns replaced by their natural logarithm.
    pub log_columns: Vec<String>,
    /// Ratio columns derived after imputation.
    pub derived_ratios: Vec<DerivedRatio>,
    /// Time range kept for estimation.
    pub estimation_window: EstimationWindow,
    /// Keep only time points where every entity observes this metric.
    pub common_support_metric: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tag_groups: TagGroups::default(),
            tag_selection: TagSelection::default(),
            period_type: PeriodType::Quarterly,
            quarterly_window: QuarterlyWindow::STRICT,
            treatment: TreatmentConfig::default(),
            min_gap: 2,
            min_pre_coverage: 0.7,
            pre_treatment_cutoff: None,
            outcome_metric: "revenue".to_string(),
            impute: ImputeConfig::default(),
            standardize: StandardizeConfig::default(),
            log_columns: Vec::new(),
            derived_ratios: vec![
                DerivedRatio::new("gross_margin_pct", "gross_profit", "revenue"),
                DerivedRatio::new("net_margin_pct", "net_income", "revenue"),
            ],
            estimation_window: EstimationWindow::default(),
            common_support_metric: None,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from JSON; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PanelError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Sets the tag-group table.
    #[must_use]
    pub fn with_tag_groups(mut self, tag_groups: TagGroups) -> Self {
        self.tag_groups = tag_groups;
        self
    }

    /// Sets the tag selection policy.
    #[must_use]
    pub const fn with_tag_selection(mut self, tag_selection: TagSelection) -> Self {
        self.tag_selection = tag_selection;
        self
    }

    /// Sets the pipeline branch.
    #[must_use]
    pub const fn with_period_type(mut self, period_type: PeriodType) -> Self {
        self.period_type = period_type;
        self
    }

    /// Sets the quarterly classification window.
    #[must_use]
    pub const fn with_quarterly_window(mut self, window: QuarterlyWindow) -> Self {
        self.quarterly_window = window;
        self
    }

    /// Sets the treated entity and treatment start.
    #[must_use]
    pub fn with_treatment(mut self, ticker: impl Into<Ticker>, start: TreatmentStart) -> Self {
        self.treatment = TreatmentConfig {
            ticker: ticker.into(),
            start,
        };
        self
    }

    /// Sets the outcome metric.
    #[must_use]
    pub fn with_outcome(mut self, metric: impl Into<String>) -> Self {
        self.outcome_metric = metric.into();
        self
    }

    /// Sets the standardizer settings.
    #[must_use]
    pub fn with_standardize(mut self, standardize: StandardizeConfig) -> Self {
        self.standardize = standardize;
        self
    }

    /// Treatment start as a time index of the configured branch.
    #[must_use]
    pub fn treatment_start_index(&self) -> TimeIndex {
        self.treatment.start.to_time_index(self.period_type)
    }

    /// Checks the configuration for structural errors.
    pub fn validate(&self) -> Result<()> {
        self.tag_groups.validate()?;
        if self.min_gap == 0 {
            return Err(PanelError::Config("min_gap must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_pre_coverage) {
            return Err(PanelError::Config(format!(
                "min_pre_coverage must lie in [0, 1], got {}",
                self.min_pre_coverage
            )));
        }
        if self.quarterly_window.lower >= self.quarterly_window.upper {
            return Err(PanelError::Config(format!(
                "empty quarterly window ({}, {})",
                self.quarterly_window.lower, self.quarterly_window.upper
            )));
        }
        if let (Some(start), Some(end)) = (self.estimation_window.start, self.estimation_window.end) {
            if start > end {
                return Err(PanelError::Config(format!(
                    "estimation window start {} is after end {}",
                    start, end
                )));
            }
        }
        if self.treatment.ticker.as_str().is_empty() {
            return Err(PanelError::Config("treated ticker is empty".to_string()));
        }
        Ok(())
    }
}

/// Settings of the regulator fetch client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Identifying user agent ("AppName/Version (contact@email.com)").
    pub user_agent: String,
    /// Minimum delay between two requests, in milliseconds.
    pub min_interval_ms: u64,
    /// Maximum attempts for a transiently failing request.
    pub max_retries: u32,
    /// Base of the exponential backoff, in milliseconds.
    pub backoff_base_ms: u64,
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            min_interval_ms: 300,
            max_retries: 5,
            backoff_base_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    /// Creates a fetch configuration with the given user agent.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Default::default()
        }
    }

    /// Validates the fetch settings.
    ///
    /// Requires a non-blank user agent and at least one attempt per request.
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(PanelError::InvalidParameter(
                "SEC requests require an identifying user agent".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(PanelError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum delay between requests.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}
