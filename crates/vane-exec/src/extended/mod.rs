//! Sector ranking by limit-up ratio with per-sector analyst commentary.
//!
//! At most one extended analysis runs at a time; see
//! [`JobFamily::is_singleton`](vane_model::JobFamily::is_singleton).

mod rank;
pub use rank::rank_sectors;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::Date;
use tracing::{debug, info};
use vane_core::{
    BatchSummary, BuildContext, Completion, JobPipeline, Pipeline, ResultStore, Runner,
    RunnerError, Stage, StageContext, StageError, StageSpec,
};
use vane_model::{ExtendedParams, JobFamily, JobParams};

use crate::error::ExecError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitUpStock {
    pub code: String,
    pub name: String,
    /// Limit-up days over the trailing 180 days.
    pub limit_up_count: u32,
    pub price: f64,
}

/// One sector's market picture on a trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorDay {
    pub sector_code: String,
    pub sector_name: String,
    /// Member stocks with a bar on that day.
    pub total_stocks: usize,
    /// Members that closed limit-up.
    pub limit_ups: Vec<LimitUpStock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSector {
    pub sector_code: String,
    pub sector_name: String,
    pub total_stocks: usize,
    pub limit_up_count_today: usize,
    /// Percentage rounded to two decimals.
    pub limit_up_ratio: f64,
    pub stocks: Vec<LimitUpStock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[async_trait]
pub trait SectorSource: Send + Sync + 'static {
    /// Latest day with stored market data.
    async fn latest_trade_date(&self) -> anyhow::Result<Option<Date>>;

    async fn sector_day(&self, date: Date) -> anyhow::Result<Vec<SectorDay>>;
}

/// LLM/search backed commentary.
#[async_trait]
pub trait Analyst: Send + Sync + 'static {
    async fn summarize(&self, sector: &RankedSector, date: Date) -> anyhow::Result<String>;
}

#[derive(Debug)]
pub struct ExtendedState {
    pub params: ExtendedParams,
    pub date: Option<Date>,
    pub total_with_limit_ups: usize,
    pub sectors: Vec<RankedSector>,
    pub batches: Vec<BatchSummary>,
}

impl ExtendedState {
    fn date(&self) -> Result<Date, StageError> {
        self.date
            .ok_or_else(|| StageError::setup("analysis date not resolved"))
    }

    fn finish(self) -> Result<Completion, StageError> {
        let date = self.date()?;
        let summary = format!(
            "extended analysis completed: {} of {} sectors",
            self.sectors.len(),
            self.total_with_limit_ups
        );
        Ok(Completion::new(
            json!({
                "analysis_date": date.to_string(),
                "total_sectors_with_limit_ups": self.total_with_limit_ups,
                "sectors": self.sectors,
                "batches": self.batches,
            }),
            summary,
        ))
    }
}

struct ResolveDate {
    sectors: Arc<dyn SectorSource>,
}

#[async_trait]
impl Stage<ExtendedState> for ResolveDate {
    fn spec(&self) -> StageSpec {
        StageSpec::new("analysis_date", "resolving latest market date", 0.0, 0.05)
    }

    async fn run(&self, state: &mut ExtendedState, _: &StageContext<'_>) -> Result<(), StageError> {
        let date = self
            .sectors
            .latest_trade_date()
            .await?
            .ok_or(ExecError::NoMarketData)?;
        state.date = Some(date);
        Ok(())
    }
}

/// Cached ranking of one day, kept as the extended-analysis view.
#[derive(Serialize, Deserialize)]
struct RankingView {
    analysis_date: String,
    sectors: Vec<RankedSector>,
}

struct RankSectors {
    sectors: Arc<dyn SectorSource>,
    results: ResultStore,
}

impl RankSectors {
    fn cached(&self, date: Date) -> Option<Vec<RankedSector>> {
        let view: RankingView =
            serde_json::from_value(self.results.view(JobFamily::ExtendedAnalysis)?).ok()?;
        (view.analysis_date == date.to_string()).then_some(view.sectors)
    }
}

#[async_trait]
impl Stage<ExtendedState> for RankSectors {
    fn spec(&self) -> StageSpec {
        StageSpec::new("rank", "ranking sectors by limit-up ratio", 0.05, 0.30)
    }

    async fn run(
        &self,
        state: &mut ExtendedState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let date = state.date()?;

        let ranked = match self.cached(date) {
            Some(ranked) => {
                debug!(%date, "sector ranking reused");
                ranked
            }
            None => {
                let days = self.sectors.sector_day(date).await?;
                ctx.report(0.5, "computing limit-up ratios");
                let ranked = rank_sectors(days);
                let view = RankingView {
                    analysis_date: date.to_string(),
                    sectors: ranked.clone(),
                };
                if let Ok(value) = serde_json::to_value(&view) {
                    self.results.put_view(JobFamily::ExtendedAnalysis, value);
                }
                ranked
            }
        };

        state.total_with_limit_ups = ranked.len();
        state.sectors = ranked;
        state.sectors.truncate(state.params.sector_limit);
        info!(
            total = state.total_with_limit_ups,
            kept = state.sectors.len(),
            "sectors ranked"
        );
        Ok(())
    }
}

struct SectorItem {
    index: usize,
    sector: RankedSector,
}

impl fmt::Display for SectorItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index + 1, self.sector.sector_name)
    }
}

struct Summarize {
    analyst: Arc<dyn Analyst>,
}

#[async_trait]
impl Stage<ExtendedState> for Summarize {
    fn spec(&self) -> StageSpec {
        StageSpec::new("summarize", "requesting sector commentary", 0.30, 0.95)
    }

    fn skip_reason(&self, state: &ExtendedState) -> Option<String> {
        (!state.params.summarize).then(|| "commentary disabled".to_string())
    }

    async fn run(
        &self,
        state: &mut ExtendedState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let date = state.date()?;
        let items = state
            .sectors
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, sector)| SectorItem { index, sector })
            .collect();

        let report = ctx
            .for_each(items, |item: SectorItem| {
                let analyst = self.analyst.clone();
                async move {
                    let text = analyst.summarize(&item.sector, date).await?;
                    Ok((item.index, text))
                }
            })
            .await?;

        for (index, text) in report.outputs {
            if let Some(sector) = state.sectors.get_mut(index) {
                sector.summary = Some(text);
            }
        }
        state.batches.push(report.summary);
        Ok(())
    }
}

/// Runner for [`JobParams::ExtendedAnalysis`].
pub struct ExtendedRunner {
    name: &'static str,
    sectors: Arc<dyn SectorSource>,
    analyst: Arc<dyn Analyst>,
}

impl ExtendedRunner {
    pub fn new(sectors: Arc<dyn SectorSource>, analyst: Arc<dyn Analyst>) -> Self {
        Self {
            name: "extended_analysis",
            sectors,
            analyst,
        }
    }
}

impl Runner for ExtendedRunner {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, params: &JobParams) -> bool {
        matches!(params, JobParams::ExtendedAnalysis(_))
    }

    fn build_pipeline(
        &self,
        params: &JobParams,
        ctx: &BuildContext,
    ) -> Result<Box<dyn JobPipeline>, RunnerError> {
        let JobParams::ExtendedAnalysis(params) = params else {
            return Err(RunnerError::Unsupported(params.family()));
        };
        if params.sector_limit == 0 {
            return Err(RunnerError::InvalidParams(
                "sector_limit must be positive".into(),
            ));
        }

        let state = ExtendedState {
            params: params.clone(),
            date: None,
            total_with_limit_ups: 0,
            sectors: Vec::new(),
            batches: Vec::new(),
        };
        let pipeline = Pipeline::new(self.name, state)
            .stage(ResolveDate {
                sectors: self.sectors.clone(),
            })
            .stage(RankSectors {
                sectors: self.sectors.clone(),
                results: ctx.results().clone(),
            })
            .stage(Summarize {
                analyst: self.analyst.clone(),
            })
            .finish_with(ExtendedState::finish);

        Ok(pipeline.boxed())
    }
}

/// Sector names of a stored extended-analysis payload, best rank first.
pub fn sector_names(payload: &Value) -> Vec<String> {
    payload
        .get("sectors")
        .and_then(Value::as_array)
        .map(|sectors| {
            sectors
                .iter()
                .filter_map(|s| s.get("sector_name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use vane_core::{EngineConfig, JobSupervisor};
    use vane_model::JobStatus;

    use crate::testkit::{FakeAnalyst, FakeSectors, date};

    const WAIT: Duration = Duration::from_secs(5);

    fn supervisor(
        dir: &std::path::Path,
        sectors: &Arc<FakeSectors>,
        analyst: &Arc<FakeAnalyst>,
    ) -> JobSupervisor {
        JobSupervisor::builder(
            EngineConfig::default()
                .with_results_dir(dir)
                .with_poll_interval(Duration::from_millis(5)),
        )
        .with_runner(Arc::new(ExtendedRunner::new(sectors.clone(), analyst.clone())))
        .build()
    }

    fn params(sector_limit: usize, summarize: bool) -> JobParams {
        JobParams::ExtendedAnalysis(ExtendedParams {
            sector_limit,
            summarize,
        })
    }

    fn market() -> FakeSectors {
        FakeSectors::new(date(10))
            .with_sector("BK01", "Chips", 10, &[("600000", 3), ("000001", 5)])
            .with_sector("BK02", "Robots", 3, &[("300750", 1)])
            .with_sector("BK03", "Banks", 20, &[])
            .with_sector("BK04", "Liquor", 4, &[("000858", 2), ("600519", 0)])
    }

    #[tokio::test]
    async fn ranks_truncates_and_summarizes() {
        let dir = tempfile::tempdir().unwrap();
        let sectors = Arc::new(market());
        let analyst = Arc::new(FakeAnalyst::default());
        let sup = supervisor(dir.path(), &sectors, &analyst);

        let id = sup.submit(params(2, true)).unwrap().job_id;
        let rec = sup.wait_terminal(&id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Completed, "{:?}", rec.error);

        let payload = rec.result.unwrap();
        assert_eq!(payload["analysis_date"], "2024-01-10");
        assert_eq!(payload["total_sectors_with_limit_ups"], 3);
        assert_eq!(sector_names(&payload), vec!["Liquor", "Robots"]);

        let top = &payload["sectors"][0];
        assert_eq!(top["limit_up_ratio"], 50.0);
        assert_eq!(top["summary"], "Liquor: 2 limit-ups");
        assert_eq!(payload["sectors"][1]["limit_up_ratio"], 33.33);
        assert_eq!(analyst.calls(), 2);
    }

    #[tokio::test]
    async fn commentary_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let sectors = Arc::new(market());
        let analyst = Arc::new(FakeAnalyst::default());
        let sup = supervisor(dir.path(), &sectors, &analyst);

        let id = sup.submit(params(10, false)).unwrap().job_id;
        let rec = sup.wait_terminal(&id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(analyst.calls(), 0);
        assert!(rec.result.unwrap()["sectors"][0].get("summary").is_none());
    }

    #[tokio::test]
    async fn failing_commentary_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let sectors = Arc::new(market());
        let analyst = Arc::new(FakeAnalyst::default().failing_on("Robots"));
        let sup = supervisor(dir.path(), &sectors, &analyst);

        let id = sup.submit(params(10, true)).unwrap().job_id;
        let rec = sup.wait_terminal(&id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Completed);

        let payload = rec.result.unwrap();
        assert_eq!(payload["batches"][0]["failed"], 1);
        assert_eq!(payload["batches"][0]["succeeded"], 2);
        assert!(payload["sectors"][1].get("summary").is_none());
    }

    #[tokio::test]
    async fn no_market_data_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let sectors = Arc::new(FakeSectors::empty());
        let analyst = Arc::new(FakeAnalyst::default());
        let sup = supervisor(dir.path(), &sectors, &analyst);

        let id = sup.submit(params(10, true)).unwrap().job_id;
        let rec = sup.wait_terminal(&id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("no market data stored"));
    }

    #[tokio::test]
    async fn second_submission_joins_running_job() {
        let dir = tempfile::tempdir().unwrap();
        let sectors = Arc::new(market());
        let analyst = Arc::new(FakeAnalyst::default().with_delay(Duration::from_millis(50)));
        let sup = supervisor(dir.path(), &sectors, &analyst);

        let first = sup.submit(params(10, true)).unwrap();
        let second = sup.submit(params(10, true)).unwrap();
        assert!(second.already_running);
        assert_eq!(first.job_id, second.job_id);

        let rec = sup.wait_terminal(&first.job_id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Completed);

        let third = sup.submit(params(10, true)).unwrap();
        assert!(!third.already_running);
        sup.wait_terminal(&third.job_id, WAIT).await;
    }

    #[tokio::test]
    async fn ranking_view_is_reused_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let sectors = Arc::new(market());
        let analyst = Arc::new(FakeAnalyst::default());
        let sup = supervisor(dir.path(), &sectors, &analyst);
        sup.results().put_view(JobFamily::Analysis, json!({"600000": "01-Chips"}));

        for _ in 0..2 {
            let id = sup.submit(params(10, false)).unwrap().job_id;
            sup.wait_terminal(&id, WAIT).await;
        }
        assert_eq!(sectors.snapshot_calls(), 1);
        // sector tags derive from the extended result
        assert!(sup.results().view(JobFamily::Analysis).is_none());

        sup.results().invalidate(JobFamily::ExtendedAnalysis);
        let id = sup.submit(params(10, false)).unwrap().job_id;
        sup.wait_terminal(&id, WAIT).await;
        assert_eq!(sectors.snapshot_calls(), 2);
    }
}
