// src/scaling.rs

//! Scaling recommendations
//!
//! Turns current utilization plus forecasts into a scale-up, scale-down,
//! or optimize recommendation with cost and risk attached. A healthy
//! middle band produces no recommendation at all.

use chrono::Utc;
use tracing::debug;

use crate::types::{
    CapacityModel, CurrentState, ImplementationPlan, Prediction, Priority, RiskLevel,
    ScalingAction, ScalingRecommendation, Timeframe,
};

/// Utilization above this demands more capacity now
const SCALE_UP_UTILIZATION: f64 = 85.0;
/// A forecast peak above this demands more capacity ahead of time
const SCALE_UP_FORECAST: f64 = 90.0;
/// Utilization below this (with a quiet forecast) wastes capacity
const SCALE_DOWN_UTILIZATION: f64 = 20.0;
/// Forecast peak must stay under this to shrink safely
const SCALE_DOWN_FORECAST: f64 = 30.0;
/// Utilization above this is worth tuning before it becomes pressure
const OPTIMIZE_UTILIZATION: f64 = 70.0;
/// Forecast confidence below this elevates the action's risk
const LOW_CONFIDENCE: f64 = 0.7;

/// Converts forecasts and current state into scaling recommendations
pub struct ScalingRecommender {
    cost_per_unit: f64,
}

impl ScalingRecommender {
    pub fn new(cost_per_unit: f64) -> Self {
        Self { cost_per_unit }
    }

    /// Decide what, if anything, to do about a resource.
    ///
    /// `None` means maintain: utilization and forecasts sit in the healthy
    /// band and no recommendation object is produced.
    pub fn decide(
        &self,
        resource: &str,
        current_utilization: f64,
        predictions: &[Prediction],
        model: &CapacityModel,
    ) -> Option<ScalingRecommendation> {
        let max_predicted = predictions
            .iter()
            .map(|p| p.predicted_value)
            .fold(f64::NEG_INFINITY, f64::max);
        let max_predicted = if max_predicted.is_finite() {
            max_predicted
        } else {
            current_utilization
        };
        let min_confidence = predictions
            .iter()
            .map(|p| p.confidence)
            .fold(1.0, f64::min);

        let (action, priority, timeframe) =
            if current_utilization > SCALE_UP_UTILIZATION || max_predicted > SCALE_UP_FORECAST {
                (ScalingAction::ScaleUp, Priority::High, Timeframe::OneDay)
            } else if current_utilization < SCALE_DOWN_UTILIZATION
                && max_predicted < SCALE_DOWN_FORECAST
            {
                (
                    ScalingAction::ScaleDown,
                    Priority::Medium,
                    Timeframe::SevenDays,
                )
            } else if current_utilization > OPTIMIZE_UTILIZATION {
                (
                    ScalingAction::Optimize,
                    Priority::Medium,
                    Timeframe::SevenDays,
                )
            } else {
                debug!(
                    resource = resource,
                    utilization = current_utilization,
                    "Utilization in healthy band, maintaining"
                );
                return None;
            };

        let target_capacity = match action {
            // Land the forecast peak at 70% utilization with margin
            ScalingAction::ScaleUp => (max_predicted * 1.2 / 0.7).ceil(),
            // Shrink conservatively toward 60% utilization
            ScalingAction::ScaleDown => (max_predicted * 1.1 / 0.6).ceil(),
            ScalingAction::Optimize => model.current_capacity,
        };

        let mut risk = RiskLevel::Low;
        if min_confidence < LOW_CONFIDENCE {
            risk = RiskLevel::High;
        }
        if action == ScalingAction::ScaleDown {
            // Removing capacity is the harder action to undo
            risk = risk.elevated();
        }

        let mut reasoning = Vec::new();
        reasoning.push(format!(
            "Current utilization {:.1}% against warning {:.0}% / critical {:.0}%",
            current_utilization, model.thresholds.warning, model.thresholds.critical
        ));
        if !predictions.is_empty() {
            reasoning.push(format!(
                "Forecast peak {:.1}% across {} horizons (min confidence {:.2})",
                max_predicted,
                predictions.len(),
                min_confidence
            ));
        }
        if model.growth_trend.rate.abs() > 1e-6 {
            reasoning.push(format!(
                "Observed growth {:.2}%/day",
                model.growth_trend.rate * 100.0
            ));
        }
        match action {
            ScalingAction::ScaleUp => reasoning.push(format!(
                "Scaling up to {:.0} units keeps the forecast peak near 70% utilization",
                target_capacity
            )),
            ScalingAction::ScaleDown => reasoning.push(format!(
                "Scaling down to {:.0} units still leaves the forecast peak near 60%",
                target_capacity
            )),
            ScalingAction::Optimize => reasoning.push(
                "Sustained pressure without forecast breach favors tuning over capacity"
                    .to_string(),
            ),
        }

        let steps = match action {
            ScalingAction::ScaleUp => vec![
                format!("Provision capacity toward {:.0} units", target_capacity),
                "Confirm utilization settles below 70%".to_string(),
                "Re-evaluate at the next capacity pass".to_string(),
            ],
            ScalingAction::ScaleDown => vec![
                format!("Drain capacity stepwise toward {:.0} units", target_capacity),
                "Hold each step until utilization stays below 60%".to_string(),
                "Restore the previous capacity at the first sign of pressure".to_string(),
            ],
            ScalingAction::Optimize => vec![
                "Profile the heaviest consumers of this resource".to_string(),
                "Apply tuning before adding capacity".to_string(),
            ],
        };

        Some(ScalingRecommendation {
            resource: resource.to_string(),
            current_state: CurrentState {
                capacity: model.current_capacity,
                utilization: current_utilization,
            },
            action,
            target_capacity,
            priority,
            estimated_cost: (target_capacity - model.current_capacity) * self.cost_per_unit,
            risk,
            reasoning,
            implementation: ImplementationPlan { timeframe, steps },
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CapacityThresholds, GrowthTrend};
    use std::collections::VecDeque;

    fn capacity_model() -> CapacityModel {
        CapacityModel {
            resource: "web".to_string(),
            current_capacity: 100.0,
            utilization_history: VecDeque::new(),
            growth_trend: GrowthTrend::default(),
            thresholds: CapacityThresholds::default(),
            forecasts: Vec::new(),
        }
    }

    fn prediction(value: f64, confidence: f64) -> Prediction {
        Prediction {
            metric: "web".to_string(),
            timeframe: Timeframe::OneDay,
            predicted_value: value,
            confidence,
            will_exceed_threshold: false,
            time_to_threshold_hours: None,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn high_utilization_scales_up_with_high_priority() {
        let recommender = ScalingRecommender::new(1.0);
        let rec = recommender
            .decide("web", 90.0, &[prediction(95.0, 0.9)], &capacity_model())
            .unwrap();

        assert_eq!(rec.action, ScalingAction::ScaleUp);
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.implementation.timeframe, Timeframe::OneDay);
        // ceil(95 * 1.2 / 0.7)
        assert_eq!(rec.target_capacity, 163.0);
        assert!(rec.estimated_cost > 0.0);
    }

    #[test]
    fn idle_resource_scales_down_with_medium_priority() {
        let recommender = ScalingRecommender::new(1.0);
        let rec = recommender
            .decide("web", 15.0, &[prediction(25.0, 0.9)], &capacity_model())
            .unwrap();

        assert_eq!(rec.action, ScalingAction::ScaleDown);
        assert_eq!(rec.priority, Priority::Medium);
        assert_eq!(rec.implementation.timeframe, Timeframe::SevenDays);
        // ceil(25 * 1.1 / 0.6)
        assert_eq!(rec.target_capacity, 46.0);
        // Shrinking 100 -> 46 saves cost
        assert!(rec.estimated_cost < 0.0);
    }

    #[test]
    fn sustained_pressure_without_breach_optimizes() {
        let recommender = ScalingRecommender::new(1.0);
        let rec = recommender
            .decide("web", 75.0, &[prediction(78.0, 0.9)], &capacity_model())
            .unwrap();

        assert_eq!(rec.action, ScalingAction::Optimize);
        assert_eq!(rec.priority, Priority::Medium);
        assert_eq!(rec.target_capacity, 100.0);
    }

    #[test]
    fn healthy_band_produces_no_recommendation() {
        let recommender = ScalingRecommender::new(1.0);
        assert!(recommender
            .decide("web", 50.0, &[prediction(55.0, 0.9)], &capacity_model())
            .is_none());
    }

    #[test]
    fn boundaries_are_strict() {
        let recommender = ScalingRecommender::new(1.0);
        // Exactly 85 with a quiet forecast is not scale-up territory
        let rec = recommender
            .decide("web", 85.0, &[prediction(80.0, 0.9)], &capacity_model())
            .unwrap();
        assert_eq!(rec.action, ScalingAction::Optimize);

        // A forecast peak just over 90 triggers scale-up even when calm now
        let rec = recommender
            .decide("web", 40.0, &[prediction(90.5, 0.9)], &capacity_model())
            .unwrap();
        assert_eq!(rec.action, ScalingAction::ScaleUp);
    }

    #[test]
    fn low_confidence_elevates_risk() {
        let recommender = ScalingRecommender::new(1.0);

        let confident = recommender
            .decide("web", 90.0, &[prediction(95.0, 0.9)], &capacity_model())
            .unwrap();
        assert_eq!(confident.risk, RiskLevel::Low);

        let shaky = recommender
            .decide("web", 90.0, &[prediction(95.0, 0.5)], &capacity_model())
            .unwrap();
        assert_eq!(shaky.risk, RiskLevel::High);
    }

    #[test]
    fn scale_down_risk_is_always_a_step_higher() {
        let recommender = ScalingRecommender::new(1.0);

        let confident = recommender
            .decide("web", 15.0, &[prediction(25.0, 0.9)], &capacity_model())
            .unwrap();
        assert_eq!(confident.risk, RiskLevel::Medium);

        let shaky = recommender
            .decide("web", 15.0, &[prediction(25.0, 0.4)], &capacity_model())
            .unwrap();
        assert_eq!(shaky.risk, RiskLevel::Critical);
    }

    #[test]
    fn no_predictions_falls_back_to_current_utilization() {
        let recommender = ScalingRecommender::new(1.0);
        let rec = recommender.decide("web", 92.0, &[], &capacity_model()).unwrap();
        assert_eq!(rec.action, ScalingAction::ScaleUp);

        assert!(recommender.decide("web", 50.0, &[], &capacity_model()).is_none());
    }
}
