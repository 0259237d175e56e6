//! Pipelines of the three job families and the collaborator traits their
//! stages call into.
//!
//! Data access, scraping, factor formulas and LLM calls live behind
//! [`MarketSource`], [`MarketStore`], [`FactorEngine`], [`ConceptSource`],
//! [`ConceptStore`], [`SectorSource`] and [`Analyst`]; the engine only sees
//! their `anyhow` errors.

mod error;
pub use error::ExecError;

mod util;
pub use util::{dedupe_codes, previous_trading_day, strip_exchange_prefix};

pub mod analysis;
pub use analysis::{AnalysisRunner, Bar, FactorEngine, MarketSource, MarketStore, Quote};

pub mod collect;
pub use collect::{Concept, ConceptRunner, ConceptSource, ConceptStore};

pub mod extended;
pub use extended::{
    Analyst, ExtendedRunner, LimitUpStock, RankedSector, SectorDay, SectorSource,
};

#[cfg(test)]
mod testkit;

pub mod prelude {
    pub use crate::error::ExecError;
    pub use crate::{AnalysisRunner, ConceptRunner, ExtendedRunner};
}
