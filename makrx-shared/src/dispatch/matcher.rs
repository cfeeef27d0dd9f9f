/// Candidate filtering and ranking
///
/// [`rank_providers`] is a pure function over a candidate list: it applies
/// the eligibility rules in order, scores the survivors and sorts them.
///
/// # Eligibility
///
/// The first failing rule is recorded as the rejection reason:
///
/// 1. `inactive`
/// 2. `excluded` (declined or let an earlier offer for this order expire)
/// 3. `service_unsupported`
/// 4. `material_unavailable` (case-insensitive)
/// 5. `at_capacity`
/// 6. `out_of_range` (both locations known and haversine distance > radius)
///
/// # Ordering
///
/// Total score descending, then more free capacity, then provider id
/// ascending, so equal inputs always rank identically.
///
/// # Example
///
/// ```no_run
/// use makrx_shared::dispatch::matcher::{rank_providers, JobRequirements};
/// use makrx_shared::dispatch::scoring::MatchWeights;
/// use makrx_shared::models::provider::Provider;
/// use makrx_shared::models::service_order::ServiceType;
///
/// # fn example(providers: Vec<Provider>) {
/// let job = JobRequirements {
///     service_type: ServiceType::Printing3d,
///     material: "PLA".to_string(),
///     location: Some((12.97, 77.59)),
///     excluded: vec![],
/// };
///
/// let result = rank_providers(&job, &providers, &MatchWeights::default());
/// if let Some(best) = result.best() {
///     println!("offer to {} (score {:.3})", best.provider_id, best.score.total);
/// }
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::geo::haversine_km;
use super::scoring::{score_provider, MatchWeights, ScoreBreakdown};
use crate::models::provider::Provider;
use crate::models::service_order::{ServiceOrder, ServiceType};

/// What a job needs from a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    pub service_type: ServiceType,
    pub material: String,
    /// Delivery `(latitude, longitude)`
    pub location: Option<(f64, f64)>,
    /// Providers that must not be offered this job again
    pub excluded: Vec<Uuid>,
}

impl From<&ServiceOrder> for JobRequirements {
    fn from(order: &ServiceOrder) -> Self {
        Self {
            service_type: order.service_type,
            material: order.material.clone(),
            location: order.delivery_location(),
            excluded: order.excluded_provider_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Inactive,
    Excluded,
    ServiceUnsupported,
    MaterialUnavailable,
    AtCapacity,
    OutOfRange,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Inactive => "inactive",
            RejectionReason::Excluded => "excluded",
            RejectionReason::ServiceUnsupported => "service_unsupported",
            RejectionReason::MaterialUnavailable => "material_unavailable",
            RejectionReason::AtCapacity => "at_capacity",
            RejectionReason::OutOfRange => "out_of_range",
        }
    }
}

/// An eligible provider with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMatch {
    pub provider_id: Uuid,
    pub business_name: String,
    pub score: ScoreBreakdown,
    pub distance_km: Option<f64>,
    pub free_capacity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub provider_id: Uuid,
    pub reason: RejectionReason,
}

/// Ranked matches (best first) and rejected providers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matches: Vec<ProviderMatch>,
    pub rejected: Vec<Rejection>,
}

impl MatchResult {
    pub fn best(&self) -> Option<&ProviderMatch> {
        self.matches.first()
    }

    /// Human-readable summary of why nobody matched
    pub fn rejection_summary(&self) -> String {
        if self.rejected.is_empty() {
            return "no providers offer this service".to_string();
        }

        let mut counts: Vec<(RejectionReason, usize)> = Vec::new();
        for rejection in &self.rejected {
            match counts.iter_mut().find(|(reason, _)| *reason == rejection.reason) {
                Some((_, count)) => *count += 1,
                None => counts.push((rejection.reason, 1)),
            }
        }

        let parts: Vec<String> = counts
            .iter()
            .map(|(reason, count)| format!("{} {}", count, reason.as_str()))
            .collect();
        format!("no eligible provider ({})", parts.join(", "))
    }
}

/// First failing eligibility rule, plus the distance when it was computed
pub fn check_eligibility(job: &JobRequirements, provider: &Provider) -> Result<Option<f64>, RejectionReason> {
    if !provider.is_active {
        return Err(RejectionReason::Inactive);
    }
    if job.excluded.contains(&provider.id) {
        return Err(RejectionReason::Excluded);
    }
    if !provider.services.contains(&job.service_type) {
        return Err(RejectionReason::ServiceUnsupported);
    }
    if !provider.offers_material(&job.material) {
        return Err(RejectionReason::MaterialUnavailable);
    }
    if provider.current_jobs >= provider.max_concurrent_jobs {
        return Err(RejectionReason::AtCapacity);
    }

    let distance = match (job.location, provider.location()) {
        (Some(job_at), Some(provider_at)) => Some(haversine_km(job_at, provider_at)),
        _ => None,
    };

    if let Some(d) = distance {
        if d > provider.service_radius_km {
            return Err(RejectionReason::OutOfRange);
        }
    }

    Ok(distance)
}

fn compare_matches(a: &ProviderMatch, b: &ProviderMatch) -> Ordering {
    b.score
        .total
        .total_cmp(&a.score.total)
        .then_with(|| b.free_capacity.cmp(&a.free_capacity))
        .then_with(|| a.provider_id.cmp(&b.provider_id))
}

/// Filters, scores and orders candidates for a job
pub fn rank_providers(job: &JobRequirements, providers: &[Provider], weights: &MatchWeights) -> MatchResult {
    let mut result = MatchResult::default();

    for provider in providers {
        match check_eligibility(job, provider) {
            Ok(distance_km) => result.matches.push(ProviderMatch {
                provider_id: provider.id,
                business_name: provider.business_name.clone(),
                score: score_provider(provider, distance_km, weights),
                distance_km,
                free_capacity: provider.free_capacity(),
            }),
            Err(reason) => result.rejected.push(Rejection {
                provider_id: provider.id,
                reason,
            }),
        }
    }

    result.matches.sort_by(compare_matches);
    result.rejected.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
    result
}
