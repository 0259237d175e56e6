mod job_id;
pub use job_id::JobId;

mod job_family;
pub use job_family::{JobFamily, ParseFamilyError};

mod job_status;
pub use job_status::JobStatus;

mod job_params;
pub use job_params::{AnalysisParams, CollectionParams, ExtendedParams, JobParams};

mod job_record;
pub use job_record::JobRecord;

mod job_query;
pub use job_query::{JobPage, JobQuery};

mod outcome;
pub use outcome::{StoredResult, SubmitOutcome};

mod time_serde;

/// Progress value in `[0.0, 1.0]`.
pub type Progress = f64;

/// Highest progress a job may report before it reaches `Completed`.
///
/// `1.0` is reserved for the completed state.
pub const RUNNING_PROGRESS_CEILING: Progress = 0.99;
