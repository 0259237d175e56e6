//! Full market analysis: quotes, history refresh, roll-ups, factor ranking.

mod source;
pub use source::{Bar, FactorEngine, MarketSource, MarketStore, Quote};

mod stages;
pub use stages::{HISTORY_DAYS, LIMIT_UP_LOOKBACK_DAYS, MIN_BARS, sector_tags};

use std::sync::Arc;

use serde_json::{Value, json};
use time::Date;
use tracing::debug;
use vane_core::{
    BatchSummary, BuildContext, Completion, JobPipeline, Pipeline, Runner, RunnerError,
    StageError,
};
use vane_model::{AnalysisParams, JobParams};

/// Outcome of the spot upsert check, consumed by the refresh and roll-up stages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpotDecision {
    #[default]
    Undecided,
    /// Today's quotes were stored as daily bars; stored history is current.
    Upserted { rows: usize },
    /// History must be fetched from the source.
    Declined { reason: String },
}

impl SpotDecision {
    pub fn is_upserted(&self) -> bool {
        matches!(self, SpotDecision::Upserted { .. })
    }
}

/// State threaded through the analysis stages.
#[derive(Debug)]
pub struct AnalysisState {
    pub params: AnalysisParams,
    pub trade_date: Option<Date>,
    pub quotes: Vec<Quote>,
    pub codes: Vec<String>,
    pub spot: SpotDecision,
    pub rows: Vec<Value>,
    pub batches: Vec<BatchSummary>,
}

impl AnalysisState {
    pub fn new(params: AnalysisParams) -> Self {
        Self {
            params,
            trade_date: None,
            quotes: Vec::new(),
            codes: Vec::new(),
            spot: SpotDecision::default(),
            rows: Vec::new(),
            batches: Vec::new(),
        }
    }

    fn trade_date(&self) -> Result<Date, StageError> {
        self.trade_date
            .ok_or_else(|| StageError::setup("trade date not resolved"))
    }

    fn finish(self) -> Result<Completion, StageError> {
        let date = self.trade_date()?;
        let count = self.rows.len();
        let payload = json!({
            "trade_date": date.to_string(),
            "data": self.rows,
            "count": count,
            "batches": self.batches,
        });
        Ok(Completion::new(
            payload,
            format!("analysis completed: {count} stocks ranked"),
        ))
    }
}

/// Runner for [`JobParams::Analysis`].
pub struct AnalysisRunner {
    name: &'static str,
    source: Arc<dyn MarketSource>,
    store: Arc<dyn MarketStore>,
    factors: Arc<dyn FactorEngine>,
}

impl AnalysisRunner {
    pub fn new(
        source: Arc<dyn MarketSource>,
        store: Arc<dyn MarketStore>,
        factors: Arc<dyn FactorEngine>,
    ) -> Self {
        Self {
            name: "analysis",
            source,
            store,
            factors,
        }
    }
}

impl Runner for AnalysisRunner {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, params: &JobParams) -> bool {
        matches!(params, JobParams::Analysis(_))
    }

    fn build_pipeline(
        &self,
        params: &JobParams,
        ctx: &BuildContext,
    ) -> Result<Box<dyn JobPipeline>, RunnerError> {
        let JobParams::Analysis(params) = params else {
            return Err(RunnerError::Unsupported(params.family()));
        };
        if params.top_n == 0 {
            return Err(RunnerError::InvalidParams("top_n must be positive".into()));
        }
        debug!(top_n = params.top_n, collect = params.collect_latest_data, "building analysis pipeline");

        let pipeline = Pipeline::new(self.name, AnalysisState::new(params.clone()))
            .stage(stages::ResolveTradeDate {
                source: self.source.clone(),
            })
            .stage(stages::CollectQuotes {
                source: self.source.clone(),
                store: self.store.clone(),
            })
            .stage(stages::SelectStored {
                store: self.store.clone(),
            })
            .stage(stages::SpotUpsert {
                store: self.store.clone(),
            })
            .stage(stages::RefreshHistory {
                source: self.source.clone(),
                store: self.store.clone(),
            })
            .stage(stages::BackfillLimitUp {
                store: self.store.clone(),
            })
            .stage(stages::Rollups {
                store: self.store.clone(),
            })
            .stage(stages::ComputeFactors {
                engine: self.factors.clone(),
            })
            .stage(stages::TagSectors {
                results: ctx.results().clone(),
            })
            .finish_with(AnalysisState::finish);

        Ok(pipeline.boxed())
    }
}
