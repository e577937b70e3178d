pub mod generation_request;
pub mod outcome;
pub mod question;

pub use generation_request::{
    GenerationRequestRecord, GenerationResult, JobType, RequestError, RequestStatus,
};
pub use outcome::{FailureKind, GenerationFailure, GenerationOutcome};
pub use question::{Difficulty, GeneratedQuestion, GenerationParams};
