/// Provider scoring
///
/// Each component is normalized to `[0, 1]`; the total is their weighted
/// sum under [`MatchWeights`].
///
/// | Component  | Value                                          | Unknown |
/// |------------|------------------------------------------------|---------|
/// | rating     | `rating / 5`                                   |         |
/// | distance   | `1 - distance_km / max(radius_km, 1)`          | 0.5     |
/// | response   | `1 - min(avg_response_minutes, 240) / 240`     | 0.5     |
/// | capacity   | `(max_jobs - current_jobs) / max_jobs`         |         |
/// | experience | `min(completed_jobs, 100) / 100`               |         |

use serde::{Deserialize, Serialize};

use crate::models::provider::Provider;

/// Response times at or above this count as the slowest possible
pub const RESPONSE_CAP_MINUTES: f64 = 240.0;

/// Completed jobs at or above this count as fully experienced
pub const EXPERIENCE_CAP_JOBS: f64 = 100.0;

/// Score for a component whose input is unknown
pub const NEUTRAL_SCORE: f64 = 0.5;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Relative importance of each score component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub rating: f64,
    pub distance: f64,
    pub response: f64,
    pub capacity: f64,
    pub experience: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            rating: 0.30,
            distance: 0.25,
            response: 0.20,
            capacity: 0.15,
            experience: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeightsError {
    #[error("weight {0} must be a non-negative number")]
    Negative(&'static str),

    #[error("weights must sum to 1, got {0}")]
    BadSum(f64),
}

impl MatchWeights {
    /// Builds validated weights
    pub fn new(rating: f64, distance: f64, response: f64, capacity: f64, experience: f64) -> Result<Self, WeightsError> {
        let weights = Self {
            rating,
            distance,
            response,
            capacity,
            experience,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), WeightsError> {
        let named = [
            ("rating", self.rating),
            ("distance", self.distance),
            ("response", self.response),
            ("capacity", self.capacity),
            ("experience", self.experience),
        ];

        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightsError::Negative(name));
            }
        }

        let sum: f64 = named.iter().map(|(_, v)| v).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(WeightsError::BadSum(sum));
        }

        Ok(())
    }
}

/// Per-component scores and the weighted total
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub rating: f64,
    pub distance: f64,
    pub response: f64,
    pub capacity: f64,
    pub experience: f64,
    pub total: f64,
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn rating_score(rating: f64) -> f64 {
    unit(rating / 5.0)
}

pub fn distance_score(distance_km: Option<f64>, radius_km: f64) -> f64 {
    match distance_km {
        Some(d) => unit(1.0 - d / radius_km.max(1.0)),
        None => NEUTRAL_SCORE,
    }
}

pub fn response_score(avg_response_minutes: Option<f64>) -> f64 {
    match avg_response_minutes {
        Some(minutes) => unit(1.0 - minutes.clamp(0.0, RESPONSE_CAP_MINUTES) / RESPONSE_CAP_MINUTES),
        None => NEUTRAL_SCORE,
    }
}

pub fn capacity_score(max_jobs: i32, current_jobs: i32) -> f64 {
    if max_jobs <= 0 {
        return 0.0;
    }
    unit(f64::from(max_jobs - current_jobs) / f64::from(max_jobs))
}

pub fn experience_score(completed_jobs: i32) -> f64 {
    unit(f64::from(completed_jobs).min(EXPERIENCE_CAP_JOBS) / EXPERIENCE_CAP_JOBS)
}

/// Scores a provider; `distance_km` is `None` when either location is unknown
pub fn score_provider(provider: &Provider, distance_km: Option<f64>, weights: &MatchWeights) -> ScoreBreakdown {
    let rating = rating_score(provider.rating);
    let distance = distance_score(distance_km, provider.service_radius_km);
    let response = response_score(provider.avg_response_minutes);
    let capacity = capacity_score(provider.max_concurrent_jobs, provider.current_jobs);
    let experience = experience_score(provider.completed_jobs);

    let total = weights.rating * rating
        + weights.distance * distance
        + weights.response * response
        + weights.capacity * capacity
        + weights.experience * experience;

    ScoreBreakdown {
        rating,
        distance,
        response,
        capacity,
        experience,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_default_weights_are_valid() {
        assert!(MatchWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_validation() {
        assert!(MatchWeights::new(0.2, 0.2, 0.2, 0.2, 0.2).is_ok());
        assert!(MatchWeights::new(1.0, 0.0, 0.0, 0.0, 0.0).is_ok());
        assert_eq!(
            MatchWeights::new(0.5, -0.1, 0.2, 0.2, 0.2),
            Err(WeightsError::Negative("distance"))
        );
        assert!(matches!(
            MatchWeights::new(0.3, 0.3, 0.3, 0.3, 0.3),
            Err(WeightsError::BadSum(_))
        ));
        assert!(matches!(
            MatchWeights::new(f64::NAN, 0.25, 0.25, 0.25, 0.25),
            Err(WeightsError::Negative("rating"))
        ));
    }

    #[test]
    fn test_rating_score() {
        assert!((rating_score(5.0) - 1.0).abs() < EPS);
        assert!((rating_score(4.0) - 0.8).abs() < EPS);
        assert_eq!(rating_score(0.0), 0.0);
    }

    #[test]
    fn test_distance_score() {
        assert!((distance_score(Some(0.0), 50.0) - 1.0).abs() < EPS);
        assert!((distance_score(Some(25.0), 50.0) - 0.5).abs() < EPS);
        assert_eq!(distance_score(Some(80.0), 50.0), 0.0);
        assert_eq!(distance_score(None, 50.0), NEUTRAL_SCORE);
        // zero radius is treated as 1 km
        assert!((distance_score(Some(0.5), 0.0) - 0.5).abs() < EPS);
    }

    #[test]
    fn test_response_score() {
        assert_eq!(response_score(Some(0.0)), 1.0);
        assert!((response_score(Some(60.0)) - 0.75).abs() < EPS);
        assert_eq!(response_score(Some(240.0)), 0.0);
        assert_eq!(response_score(Some(1000.0)), 0.0);
        assert_eq!(response_score(None), NEUTRAL_SCORE);
    }

    #[test]
    fn test_capacity_and_experience() {
        assert!((capacity_score(5, 2) - 0.6).abs() < EPS);
        assert_eq!(capacity_score(5, 5), 0.0);
        assert_eq!(capacity_score(0, 0), 0.0);
        assert!((experience_score(40) - 0.4).abs() < EPS);
        assert_eq!(experience_score(250), 1.0);
    }
}
