use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::Duration;
use tracing::{debug, info, warn};
use vane_core::{ResultStore, Stage, StageContext, StageError, StageSpec};
use vane_model::JobFamily;

use crate::{
    analysis::{AnalysisState, FactorEngine, MarketSource, MarketStore, SpotDecision},
    error::ExecError,
    util::{dedupe_codes, previous_trading_day, strip_exchange_prefix},
};

/// Minimum stored bars a code needs for factor computation.
pub const MIN_BARS: usize = 35;
/// History window fetched per code on refresh.
pub const HISTORY_DAYS: i64 = 365;
/// Lookback of the limit-up flag backfill.
pub const LIMIT_UP_LOOKBACK_DAYS: i64 = 180;

const USING_STORED: &str = "using stored data";

pub struct ResolveTradeDate {
    pub source: Arc<dyn MarketSource>,
}

#[async_trait]
impl Stage<AnalysisState> for ResolveTradeDate {
    fn spec(&self) -> StageSpec {
        StageSpec::new("trade_date", "resolving latest trade date", 0.0, 0.05)
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        _: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let date = self
            .source
            .latest_trade_date()
            .await
            .map_err(|e| StageError::setup(format!("cannot resolve latest trade date: {e:#}")))?
            .ok_or(ExecError::NoTradeDate)?;

        info!(%date, "latest trade date");
        state.trade_date = Some(date);
        Ok(())
    }
}

pub struct CollectQuotes {
    pub source: Arc<dyn MarketSource>,
    pub store: Arc<dyn MarketStore>,
}

#[async_trait]
impl Stage<AnalysisState> for CollectQuotes {
    fn spec(&self) -> StageSpec {
        StageSpec::new("collect", "collecting spot quotes", 0.05, 0.15)
    }

    fn skip_reason(&self, state: &AnalysisState) -> Option<String> {
        (!state.params.collect_latest_data).then(|| USING_STORED.to_string())
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let date = state.trade_date()?;

        let quotes = self.source.spot_quotes().await?;
        if quotes.is_empty() {
            return Err(ExecError::NoSpotData.into());
        }
        ctx.report(0.5, "saving stock basic info");
        self.store.save_basic_info(&quotes).await?;

        // the dragon-tiger list only widens the selection
        let dragon_tiger = match self.source.dragon_tiger(date).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "dragon-tiger list unavailable");
                Vec::new()
            }
        };
        if !dragon_tiger.is_empty() {
            self.store.save_basic_info(&dragon_tiger).await?;
        }

        let before = quotes.len() + dragon_tiger.len();
        state.codes = dedupe_codes(
            quotes
                .iter()
                .chain(dragon_tiger.iter())
                .map(|q| q.code.clone()),
        );
        debug!(before, after = state.codes.len(), "codes merged");
        state.quotes = quotes;
        Ok(())
    }
}

pub struct SelectStored {
    pub store: Arc<dyn MarketStore>,
}

#[async_trait]
impl Stage<AnalysisState> for SelectStored {
    fn spec(&self) -> StageSpec {
        StageSpec::new("select", "selecting stocks from stored history", 0.05, 0.15)
    }

    fn skip_reason(&self, state: &AnalysisState) -> Option<String> {
        state
            .params
            .collect_latest_data
            .then(|| "collecting fresh data".to_string())
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        _: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let limit = state.params.top_n.saturating_mul(2);
        let codes = self.store.candidates(MIN_BARS, limit).await?;
        if codes.is_empty() {
            return Err(ExecError::NoCandidates { min_bars: MIN_BARS }.into());
        }
        state.codes = codes;
        Ok(())
    }
}

/// Decides whether today's quotes can stand in for a history refresh.
pub struct SpotUpsert {
    pub store: Arc<dyn MarketStore>,
}

impl SpotUpsert {
    async fn decide(&self, state: &AnalysisState) -> Result<Option<String>, StageError> {
        let date = state.trade_date()?;
        if self.store.bar_count_on(date).await? == 0 {
            return Ok(Some(format!("no bars stored for {date}")));
        }
        let previous = previous_trading_day(date);
        if self.store.bar_count_on(previous).await? == 0 {
            return Ok(Some(format!("no bars stored for previous trading day {previous}")));
        }
        let covered = self.store.codes_with_bars(&state.codes).await?;
        if covered != state.codes.len() {
            return Ok(Some(format!(
                "{} of {} codes have no stored bars",
                state.codes.len().saturating_sub(covered),
                state.codes.len()
            )));
        }
        Ok(None)
    }
}

#[async_trait]
impl Stage<AnalysisState> for SpotUpsert {
    fn spec(&self) -> StageSpec {
        StageSpec::new("spot_upsert", "checking whether today's bars can be upserted", 0.15, 0.25)
    }

    fn skip_reason(&self, state: &AnalysisState) -> Option<String> {
        (!state.params.collect_latest_data).then(|| USING_STORED.to_string())
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        state.spot = match self.decide(state).await? {
            Some(reason) => {
                info!(%reason, "spot upsert declined, history will be fetched");
                ctx.report(0.5, &format!("spot upsert skipped: {reason}"));
                SpotDecision::Declined { reason }
            }
            None => {
                ctx.report(0.5, "saving today's quotes as daily bars");
                let rows = self
                    .store
                    .upsert_spot_bars(state.trade_date()?, &state.quotes)
                    .await?;
                info!(rows, "spot quotes upserted as daily bars");
                SpotDecision::Upserted { rows }
            }
        };
        Ok(())
    }
}

pub struct RefreshHistory {
    pub source: Arc<dyn MarketSource>,
    pub store: Arc<dyn MarketStore>,
}

#[async_trait]
impl Stage<AnalysisState> for RefreshHistory {
    fn spec(&self) -> StageSpec {
        StageSpec::new("history", "fetching history", 0.25, 0.40)
    }

    fn skip_reason(&self, state: &AnalysisState) -> Option<String> {
        if !state.params.collect_latest_data {
            return Some(USING_STORED.to_string());
        }
        state
            .spot
            .is_upserted()
            .then(|| "today's bars already upserted".to_string())
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let end = state.trade_date()?;
        let start = end.saturating_sub(Duration::days(HISTORY_DAYS));

        let report = ctx
            .for_each(state.codes.clone(), |code| {
                let (source, store) = (self.source.clone(), self.store.clone());
                async move {
                    let bars = source.history(&code, start, end).await?;
                    if bars.is_empty() {
                        return Err(ExecError::EmptyHistory { code }.into());
                    }
                    store.save_bars(&code, &bars).await
                }
            })
            .await?;

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "history refresh finished"
        );
        state.batches.push(report.summary);
        Ok(())
    }
}

pub struct BackfillLimitUp {
    pub store: Arc<dyn MarketStore>,
}

#[async_trait]
impl Stage<AnalysisState> for BackfillLimitUp {
    fn spec(&self) -> StageSpec {
        StageSpec::new("limit_up_backfill", "backfilling limit-up flags", 0.40, 0.50)
    }

    fn skip_reason(&self, state: &AnalysisState) -> Option<String> {
        (!state.params.collect_latest_data).then(|| USING_STORED.to_string())
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        _: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let until = state.trade_date()?;
        let since = until.saturating_sub(Duration::days(LIMIT_UP_LOOKBACK_DAYS));

        match self.store.backfill_limit_up(since, until).await {
            Ok(rows) => debug!(rows, "limit-up flags backfilled"),
            Err(e) => warn!(error = %e, "limit-up backfill failed, continuing"),
        }
        Ok(())
    }
}

pub struct Rollups {
    pub store: Arc<dyn MarketStore>,
}

#[async_trait]
impl Stage<AnalysisState> for Rollups {
    fn spec(&self) -> StageSpec {
        StageSpec::new("rollups", "building weekly bars", 0.50, 0.70)
    }

    fn skip_reason(&self, state: &AnalysisState) -> Option<String> {
        if !state.params.collect_latest_data {
            return Some(USING_STORED.to_string());
        }
        state
            .spot
            .is_upserted()
            .then(|| "only today's bars changed".to_string())
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let weekly = self.store.rebuild_weekly(&state.codes).await?;
        ctx.report(0.5, "building monthly bars");
        let monthly = self.store.rebuild_monthly(&state.codes).await?;
        debug!(weekly, monthly, "rollups rebuilt");
        Ok(())
    }
}

pub struct ComputeFactors {
    pub engine: Arc<dyn FactorEngine>,
}

#[async_trait]
impl Stage<AnalysisState> for ComputeFactors {
    fn spec(&self) -> StageSpec {
        StageSpec::new("factors", "loading history for factor computation", 0.70, 0.95)
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let selected = state.params.selected_factors.as_deref();
        let msg = if selected.is_some() {
            "computing selected factors"
        } else {
            "computing all factors"
        };
        ctx.report(0.6, msg);

        state.rows = self.engine.compute(&state.codes, selected).await?;
        Ok(())
    }
}

/// Prefixes each row with the best-ranked sector it appears in.
pub struct TagSectors {
    pub results: ResultStore,
}

impl TagSectors {
    /// Tag map from the analysis view, rebuilt from the latest extended
    /// analysis result when the view was invalidated.
    async fn tags(&self) -> Map<String, Value> {
        if let Some(Value::Object(map)) = self.results.view(JobFamily::Analysis) {
            return map;
        }

        let map = match self.results.latest(JobFamily::ExtendedAnalysis).await {
            Ok(Some(latest)) => sector_tags(&latest.payload),
            Ok(None) => Map::new(),
            Err(e) => {
                warn!(error = %e, "extended analysis result unreadable, rows left untagged");
                return Map::new();
            }
        };
        self.results
            .put_view(JobFamily::Analysis, Value::Object(map.clone()));
        map
    }
}

#[async_trait]
impl Stage<AnalysisState> for TagSectors {
    fn spec(&self) -> StageSpec {
        StageSpec::new("sectors", "adding sector ranks", 0.95, 1.0)
    }

    fn skip_reason(&self, state: &AnalysisState) -> Option<String> {
        state.rows.is_empty().then(|| "no rows to tag".to_string())
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        _: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let tags = self.tags().await;
        if tags.is_empty() {
            return Ok(());
        }

        let mut tagged = 0usize;
        for row in state.rows.iter_mut() {
            let Some(obj) = row.as_object_mut() else {
                continue;
            };
            let tag = obj
                .get("code")
                .and_then(Value::as_str)
                .and_then(|code| tags.get(code))
                .cloned();
            if let Some(tag) = tag {
                obj.insert("sector".to_string(), tag);
                tagged += 1;
            }
        }
        debug!(tagged, "rows tagged with sectors");
        Ok(())
    }
}

/// `code -> "{rank:02}-{sector}"` from an extended analysis payload.
///
/// Sectors are ranked by their position; a code listed under several sectors
/// keeps the best rank.
pub fn sector_tags(payload: &Value) -> Map<String, Value> {
    let mut tags = Map::new();
    let Some(sectors) = payload.get("sectors").and_then(Value::as_array) else {
        return tags;
    };

    for (i, sector) in sectors.iter().enumerate() {
        let Some(name) = sector.get("sector_name").and_then(Value::as_str) else {
            continue;
        };
        let tag = format!("{:02}-{name}", i + 1);

        let stocks = sector.get("stocks").and_then(Value::as_array);
        for stock in stocks.into_iter().flatten() {
            let code = match stock {
                Value::String(code) => Some(code.as_str()),
                other => other.get("code").and_then(Value::as_str),
            };
            if let Some(code) = code {
                tags.entry(strip_exchange_prefix(code).to_string())
                    .or_insert_with(|| Value::String(tag.clone()));
            }
        }
    }
    tags
}
