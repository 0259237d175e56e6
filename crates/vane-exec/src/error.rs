use thiserror::Error;
use vane_core::StageError;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("latest trade date unavailable")]
    NoTradeDate,
    #[error("no market data stored")]
    NoMarketData,
    #[error("spot quote listing is empty")]
    NoSpotData,
    #[error("no stocks with at least {min_bars} stored bars; run with fresh data collection first")]
    NoCandidates { min_bars: usize },
    #[error("concept board listing is empty")]
    EmptyConceptListing,
    #[error("empty history for {code}")]
    EmptyHistory { code: String },
}

impl From<ExecError> for StageError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::NoTradeDate | ExecError::NoMarketData => StageError::Setup(e.to_string()),
            other => StageError::Other(other.into()),
        }
    }
}
