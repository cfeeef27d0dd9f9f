/// Job dispatch and provider matching
///
/// - `geo`: haversine distance
/// - `scoring`: per-component provider scores and [`MatchWeights`]
/// - `matcher`: eligibility filtering and deterministic ranking
/// - `service`: the transactional dispatch and provider job actions

pub mod geo;
pub mod matcher;
pub mod scoring;
pub mod service;

pub use matcher::{rank_providers, JobRequirements, MatchResult, ProviderMatch, Rejection, RejectionReason};
pub use scoring::{MatchWeights, ScoreBreakdown, WeightsError};
pub use service::{DispatchError, DispatchOutcome, DispatchService, Requester, RetryPolicy};
