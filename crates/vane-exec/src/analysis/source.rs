use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

/// One row of the real-time quote listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume: f64,
    pub amount: f64,
}

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub code: String,
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
}

/// Remote market data provider.
#[async_trait]
pub trait MarketSource: Send + Sync + 'static {
    /// Most recent trading day, `None` when the calendar is unavailable.
    async fn latest_trade_date(&self) -> anyhow::Result<Option<Date>>;

    /// Current hot-spot quote listing.
    async fn spot_quotes(&self) -> anyhow::Result<Vec<Quote>>;

    /// Stocks on the dragon-tiger list for `date`.
    async fn dragon_tiger(&self, date: Date) -> anyhow::Result<Vec<Quote>>;

    /// Daily bars of `code` in `[start, end]`.
    async fn history(&self, code: &str, start: Date, end: Date) -> anyhow::Result<Vec<Bar>>;
}

/// Local market database.
#[async_trait]
pub trait MarketStore: Send + Sync + 'static {
    async fn save_basic_info(&self, quotes: &[Quote]) -> anyhow::Result<usize>;

    /// Number of daily bars stored for `date`.
    async fn bar_count_on(&self, date: Date) -> anyhow::Result<usize>;

    /// How many of `codes` have at least one stored bar.
    async fn codes_with_bars(&self, codes: &[String]) -> anyhow::Result<usize>;

    /// Store quotes as the daily bar of `date`, replacing existing rows.
    async fn upsert_spot_bars(&self, date: Date, quotes: &[Quote]) -> anyhow::Result<usize>;

    async fn save_bars(&self, code: &str, bars: &[Bar]) -> anyhow::Result<usize>;

    /// Codes with at least `min_bars` stored bars, by traded amount, at most `limit`.
    async fn candidates(&self, min_bars: usize, limit: usize) -> anyhow::Result<Vec<String>>;

    /// Recompute limit-up flags for bars in `[since, until]`.
    async fn backfill_limit_up(&self, since: Date, until: Date) -> anyhow::Result<usize>;

    async fn rebuild_weekly(&self, codes: &[String]) -> anyhow::Result<usize>;

    async fn rebuild_monthly(&self, codes: &[String]) -> anyhow::Result<usize>;
}

/// Factor computation over stored history.
#[async_trait]
pub trait FactorEngine: Send + Sync + 'static {
    /// One JSON object per code, carrying at least a `code` field.
    ///
    /// `factors = None` computes every known factor.
    async fn compute(
        &self,
        codes: &[String],
        factors: Option<&[String]>,
    ) -> anyhow::Result<Vec<Value>>;
}
