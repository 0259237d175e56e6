//! Concept board membership collection.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use vane_core::{
    BatchSummary, BuildContext, Completion, JobPipeline, Pipeline, Runner, RunnerError, Stage,
    StageContext, StageError, StageSpec,
};
use vane_model::{CollectionParams, JobParams};

use crate::error::ExecError;

/// A concept (sector) board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub code: String,
    pub name: String,
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.code)
    }
}

#[async_trait]
pub trait ConceptSource: Send + Sync + 'static {
    async fn list_concepts(&self) -> anyhow::Result<Vec<Concept>>;

    /// Member stock codes of one board.
    async fn members(&self, concept: &Concept) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait ConceptStore: Send + Sync + 'static {
    /// Remove every stored board and membership.
    async fn clear(&self) -> anyhow::Result<()>;

    /// Replace the membership of one board; returns rows written.
    async fn save_concept(&self, concept: &Concept, members: &[String]) -> anyhow::Result<usize>;
}

#[derive(Debug, Default)]
pub struct CollectionState {
    pub params: CollectionParams,
    pub concepts: Vec<Concept>,
    pub saved_concepts: usize,
    pub saved_stocks: usize,
    pub batches: Vec<BatchSummary>,
}

impl CollectionState {
    fn finish(self) -> Result<Completion, StageError> {
        let failed: usize = self.batches.iter().map(|b| b.failed).sum();
        let summary = format!(
            "collected {} concepts with {} stocks",
            self.saved_concepts, self.saved_stocks
        );
        Ok(Completion::new(
            json!({
                "concepts_count": self.saved_concepts,
                "stocks_count": self.saved_stocks,
                "failed": failed,
                "batches": self.batches,
            }),
            summary,
        ))
    }
}

struct ClearExisting {
    store: Arc<dyn ConceptStore>,
}

#[async_trait]
impl Stage<CollectionState> for ClearExisting {
    fn spec(&self) -> StageSpec {
        StageSpec::new("clear", "clearing stored concepts", 0.0, 0.10)
    }

    fn skip_reason(&self, state: &CollectionState) -> Option<String> {
        (!state.params.clear_existing).then(|| "keeping stored concepts".to_string())
    }

    async fn run(&self, _: &mut CollectionState, _: &StageContext<'_>) -> Result<(), StageError> {
        self.store.clear().await?;
        info!("stored concepts cleared");
        Ok(())
    }
}

struct ListConcepts {
    source: Arc<dyn ConceptSource>,
}

#[async_trait]
impl Stage<CollectionState> for ListConcepts {
    fn spec(&self) -> StageSpec {
        StageSpec::new("list", "listing concept boards", 0.10, 0.15)
    }

    async fn run(
        &self,
        state: &mut CollectionState,
        _: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let concepts = self.source.list_concepts().await?;
        if concepts.is_empty() {
            return Err(ExecError::EmptyConceptListing.into());
        }
        debug!(count = concepts.len(), "concept boards listed");
        state.concepts = concepts;
        Ok(())
    }
}

struct CollectMembers {
    source: Arc<dyn ConceptSource>,
    store: Arc<dyn ConceptStore>,
}

#[async_trait]
impl Stage<CollectionState> for CollectMembers {
    fn spec(&self) -> StageSpec {
        StageSpec::new("members", "collecting concept members", 0.15, 0.95)
    }

    async fn run(
        &self,
        state: &mut CollectionState,
        ctx: &StageContext<'_>,
    ) -> Result<(), StageError> {
        let concepts = std::mem::take(&mut state.concepts);
        let report = ctx
            .for_each(concepts, |concept| {
                let (source, store) = (self.source.clone(), self.store.clone());
                async move {
                    let members = source.members(&concept).await?;
                    store.save_concept(&concept, &members).await
                }
            })
            .await?;

        state.saved_concepts = report.succeeded();
        state.saved_stocks = report.outputs.iter().sum();
        state.batches.push(report.summary);
        Ok(())
    }
}

/// Runner for [`JobParams::ConceptCollection`].
pub struct ConceptRunner {
    name: &'static str,
    source: Arc<dyn ConceptSource>,
    store: Arc<dyn ConceptStore>,
}

impl ConceptRunner {
    pub fn new(source: Arc<dyn ConceptSource>, store: Arc<dyn ConceptStore>) -> Self {
        Self {
            name: "concept_collection",
            source,
            store,
        }
    }
}

impl Runner for ConceptRunner {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, params: &JobParams) -> bool {
        matches!(params, JobParams::ConceptCollection(_))
    }

    fn build_pipeline(
        &self,
        params: &JobParams,
        _: &BuildContext,
    ) -> Result<Box<dyn JobPipeline>, RunnerError> {
        let JobParams::ConceptCollection(params) = params else {
            return Err(RunnerError::Unsupported(params.family()));
        };

        let state = CollectionState {
            params: params.clone(),
            ..CollectionState::default()
        };
        let pipeline = Pipeline::new(self.name, state)
            .stage(ClearExisting {
                store: self.store.clone(),
            })
            .stage(ListConcepts {
                source: self.source.clone(),
            })
            .stage(CollectMembers {
                source: self.source.clone(),
                store: self.store.clone(),
            })
            .finish_with(CollectionState::finish);

        Ok(pipeline.boxed())
    }
}
