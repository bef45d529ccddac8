// THEORY:
// The `classifier` is the Quality/Safety layer: the last analytical step before a
// result is persisted. Unlike the estimator it is a pure, deterministic function.
// Given the same parameters and source it always produces the same labels, alerts
// and recommendations.
//
// Algorithm:
// 1.  **Band Table**: Each parameter has an ordered list of bands (most severe
//     first). The first band a reading falls into deducts its points from a score
//     that starts at 100 and appends one alert and one recommendation.
// 2.  **Hard Overrides**: Bacterial contamination, pH extremes and excess chlorine
//     are not scored. Any one forces `Unsafe` / `Poor`, no matter how good
//     everything else is.
// 3.  **Critical Readings**: Otherwise a critical band (dangerous nitrates) yields
//     `Critical` / `Unsafe for Consumption`.
// 4.  **Score Labels**: Otherwise quality follows the score (85 / 70 / 50), and
//     safety follows the worst breach. Advisory bands (hardness, alkalinity) cost
//     points but never change safety.
// 5.  **Never Silent**: With no breaches at all, the classifier confirms each
//     parameter explicitly, so the recommendation list is never empty.

use crate::model::{OverallQuality, SafetyLevel, WaterParameters, WaterSource};
use serde::{Deserialize, Serialize};

const EXCELLENT_SCORE: i32 = 85;
const GOOD_SCORE: i32 = 70;
const FAIR_SCORE: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Ph,
    Chlorine,
    Nitrates,
    Bacteria,
    Hardness,
    Alkalinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandSeverity {
    /// Costs points, never changes safety.
    Advisory,
    /// Drops safety to at most `Caution`.
    Caution,
    /// Dangerous reading.
    Critical,
}

/// One band a parameter fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandBreach {
    pub parameter: Parameter,
    pub severity: BandSeverity,
    pub deduction: i32,
    /// Forces `Unsafe` / `Poor` regardless of score.
    pub hard_override: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub overall_quality: OverallQuality,
    pub safety_level: SafetyLevel,
    pub score: i32,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
    pub breaches: Vec<BandBreach>,
}

struct Band {
    parameter: Parameter,
    severity: BandSeverity,
    deduction: i32,
    hard_override: bool,
    matches: fn(&WaterParameters, WaterSource) -> bool,
    alert: fn(&WaterParameters) -> String,
    recommendation: &'static str,
}

// Ordered by parameter, most severe band first. Only the first matching band of
// each parameter applies.
const BANDS: &[Band] = &[
    Band {
        parameter: Parameter::Ph,
        severity: BandSeverity::Critical,
        deduction: 20,
        hard_override: true,
        matches: |p, _| p.ph < 6.0 || p.ph > 9.0,
        alert: |p| format!("Critical pH level: {:.1} (safe range: 6.5-8.5)", p.ph),
        recommendation: "Contact water authority immediately - pH outside safe drinking range",
    },
    Band {
        parameter: Parameter::Ph,
        severity: BandSeverity::Caution,
        deduction: 20,
        hard_override: false,
        matches: |p, _| p.ph < 6.5 || p.ph > 8.5,
        alert: |p| format!("pH levels outside optimal range: {:.1}", p.ph),
        recommendation: "Consider pH adjustment or filtration system",
    },
    Band {
        parameter: Parameter::Chlorine,
        severity: BandSeverity::Critical,
        deduction: 15,
        hard_override: true,
        matches: |p, _| p.chlorine > 4.0,
        alert: |p| format!("High chlorine levels: {:.1} ppm", p.chlorine),
        recommendation: "Let water sit uncovered for 30 minutes before drinking",
    },
    Band {
        parameter: Parameter::Chlorine,
        severity: BandSeverity::Caution,
        deduction: 10,
        hard_override: false,
        matches: |p, source| p.chlorine < 0.2 && source == WaterSource::TapWater,
        alert: |_| "Low chlorine in tap water may indicate contamination risk".to_string(),
        recommendation: "Consider boiling water or using filtration",
    },
    Band {
        parameter: Parameter::Nitrates,
        severity: BandSeverity::Critical,
        deduction: 25,
        hard_override: false,
        matches: |p, _| p.nitrates > 45.0,
        alert: |p| format!("Dangerous nitrate levels: {:.1} ppm", p.nitrates),
        recommendation: "DO NOT DRINK - Especially dangerous for infants and pregnant women",
    },
    Band {
        parameter: Parameter::Nitrates,
        severity: BandSeverity::Caution,
        deduction: 25,
        hard_override: false,
        matches: |p, _| p.nitrates > 10.0,
        alert: |p| format!("Elevated nitrate levels: {:.1} ppm (safe limit: 10 ppm)", p.nitrates),
        recommendation: "Consider reverse osmosis filtration or alternative water source",
    },
    Band {
        parameter: Parameter::Bacteria,
        severity: BandSeverity::Critical,
        deduction: 40,
        hard_override: true,
        matches: |p, _| p.bacteria > 0,
        alert: |_| "Bacterial contamination detected".to_string(),
        recommendation: "Boil water for 1 minute before drinking or use alternative source",
    },
    Band {
        parameter: Parameter::Hardness,
        severity: BandSeverity::Advisory,
        deduction: 5,
        hard_override: false,
        matches: |p, _| p.hardness > 180.0,
        alert: |p| format!("Very hard water: {:.0} ppm", p.hardness),
        recommendation: "Consider water softener to protect plumbing and improve taste",
    },
    Band {
        parameter: Parameter::Alkalinity,
        severity: BandSeverity::Advisory,
        deduction: 5,
        hard_override: false,
        matches: |p, _| p.alkalinity > 240.0,
        alert: |p| format!("High alkalinity: {:.0} ppm", p.alkalinity),
        recommendation: "High alkalinity can cause scale buildup - consider treatment",
    },
    Band {
        parameter: Parameter::Alkalinity,
        severity: BandSeverity::Advisory,
        deduction: 5,
        hard_override: false,
        matches: |p, _| p.alkalinity < 40.0,
        alert: |p| format!("Low alkalinity: {:.0} ppm", p.alkalinity),
        recommendation: "Low alkalinity lets pH swing quickly - monitor pH closely",
    },
];

const CONFIRMATIONS: [&str; 5] = [
    "pH levels are within safe drinking water standards",
    "Chlorine levels are within safe limits",
    "Nitrate levels are below the 10 ppm safety limit",
    "No bacterial contamination detected",
    "Water quality appears good - continue regular monitoring",
];

fn quality_for_score(score: i32) -> OverallQuality {
    if score >= EXCELLENT_SCORE {
        OverallQuality::Excellent
    } else if score >= GOOD_SCORE {
        OverallQuality::Good
    } else if score >= FAIR_SCORE {
        OverallQuality::Fair
    } else {
        OverallQuality::Poor
    }
}

/// Classifies a set of parameters for a given source.
pub fn classify(parameters: &WaterParameters, source: WaterSource) -> Classification {
    let mut score = 100;
    let mut alerts = Vec::new();
    let mut recommendations = Vec::new();
    let mut breaches: Vec<BandBreach> = Vec::new();

    for band in BANDS {
        if breaches.iter().any(|b| b.parameter == band.parameter) {
            continue;
        }
        if !(band.matches)(parameters, source) {
            continue;
        }
        score -= band.deduction;
        alerts.push((band.alert)(parameters));
        recommendations.push(band.recommendation.to_string());
        breaches.push(BandBreach {
            parameter: band.parameter,
            severity: band.severity,
            deduction: band.deduction,
            hard_override: band.hard_override,
        });
    }

    let hard_override = breaches.iter().any(|b| b.hard_override);
    let critical = breaches.iter().any(|b| b.severity == BandSeverity::Critical);
    let caution = breaches.iter().any(|b| b.severity == BandSeverity::Caution);

    let (overall_quality, safety_level) = if hard_override {
        (OverallQuality::Poor, SafetyLevel::Unsafe)
    } else if critical {
        (OverallQuality::UnsafeForConsumption, SafetyLevel::Critical)
    } else {
        let safety = if score < FAIR_SCORE {
            SafetyLevel::Unsafe
        } else if caution {
            SafetyLevel::Caution
        } else {
            SafetyLevel::Safe
        };
        (quality_for_score(score), safety)
    };

    if breaches.is_empty() {
        recommendations.extend(CONFIRMATIONS.iter().map(|s| s.to_string()));
    }

    Classification {
        overall_quality,
        safety_level,
        score,
        alerts,
        recommendations,
        breaches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safe_parameters() -> WaterParameters {
        WaterParameters {
            ph: 7.2,
            chlorine: 1.5,
            nitrates: 3.0,
            hardness: 120.0,
            alkalinity: 100.0,
            bacteria: 0,
        }
    }

    #[test]
    fn clean_sample_is_excellent_and_confirmed() {
        let c = classify(&safe_parameters(), WaterSource::TapWater);
        assert_eq!(c.overall_quality, OverallQuality::Excellent);
        assert_eq!(c.safety_level, SafetyLevel::Safe);
        assert_eq!(c.score, 100);
        assert!(c.alerts.is_empty());
        assert_eq!(c.recommendations.len(), CONFIRMATIONS.len());
        assert_eq!(c.recommendations[0], "pH levels are within safe drinking water standards");
    }

    #[test]
    fn classification_is_deterministic() {
        let mut p = safe_parameters();
        p.nitrates = 14.0;
        p.hardness = 250.0;
        let a = classify(&p, WaterSource::WellWater);
        let b = classify(&p, WaterSource::WellWater);
        assert_eq!(a, b);
    }

    #[test]
    fn bacteria_overrides_an_otherwise_perfect_score() {
        let mut p = safe_parameters();
        p.bacteria = 1;
        let c = classify(&p, WaterSource::BottledWater);
        assert_eq!(c.safety_level, SafetyLevel::Unsafe);
        assert_eq!(c.overall_quality, OverallQuality::Poor);
        assert!(c.alerts.iter().any(|a| a.contains("Bacterial contamination")));
    }

    #[test]
    fn bacteria_wins_over_critical_nitrates() {
        let mut p = safe_parameters();
        p.bacteria = 12;
        p.nitrates = 60.0;
        p.ph = 9.4;
        let c = classify(&p, WaterSource::RiverStream);
        assert_eq!(c.safety_level, SafetyLevel::Unsafe);
        assert_eq!(c.overall_quality, OverallQuality::Poor);
        assert_eq!(c.alerts.len(), 3);
    }

    #[test]
    fn ph_extreme_is_a_hard_override() {
        let mut p = safe_parameters();
        p.ph = 5.6;
        let c = classify(&p, WaterSource::LakePond);
        assert_eq!(c.safety_level, SafetyLevel::Unsafe);
        assert_eq!(c.overall_quality, OverallQuality::Poor);
        // Only the critical pH band fires, not the caution band as well.
        assert_eq!(c.breaches.len(), 1);
        assert_eq!(c.score, 80);
    }

    #[test]
    fn mild_ph_deviation_is_caution() {
        let mut p = safe_parameters();
        p.ph = 8.7;
        let c = classify(&p, WaterSource::TapWater);
        assert_eq!(c.safety_level, SafetyLevel::Caution);
        assert_eq!(c.overall_quality, OverallQuality::Good);
        assert_eq!(c.score, 80);
    }

    #[test]
    fn dangerous_nitrates_are_critical() {
        let mut p = safe_parameters();
        p.nitrates = 50.0;
        let c = classify(&p, WaterSource::WellWater);
        assert_eq!(c.safety_level, SafetyLevel::Critical);
        assert_eq!(c.overall_quality, OverallQuality::UnsafeForConsumption);
    }

    #[test]
    fn low_chlorine_only_matters_for_tap_water() {
        let mut p = safe_parameters();
        p.chlorine = 0.1;
        assert_eq!(classify(&p, WaterSource::TapWater).safety_level, SafetyLevel::Caution);
        assert_eq!(classify(&p, WaterSource::WellWater).safety_level, SafetyLevel::Safe);
    }

    #[test]
    fn advisory_bands_cost_points_but_stay_safe() {
        let mut p = safe_parameters();
        p.hardness = 300.0;
        p.alkalinity = 280.0;
        let c = classify(&p, WaterSource::WellWater);
        assert_eq!(c.score, 90);
        assert_eq!(c.safety_level, SafetyLevel::Safe);
        assert_eq!(c.overall_quality, OverallQuality::Excellent);
        assert_eq!(c.alerts.len(), 2);
        assert_eq!(c.recommendations.len(), 2);
    }

    #[test]
    fn stacked_cautions_drop_to_unsafe() {
        let p = WaterParameters {
            ph: 8.8,
            chlorine: 0.1,
            nitrates: 20.0,
            hardness: 200.0,
            alkalinity: 100.0,
            bacteria: 0,
        };
        let c = classify(&p, WaterSource::TapWater);
        assert_eq!(c.score, 100 - 20 - 10 - 25 - 5);
        assert!(c.breaches.iter().all(|b| !b.hard_override));
        assert_eq!(c.overall_quality, OverallQuality::Poor);
        assert_eq!(c.safety_level, SafetyLevel::Unsafe);
    }

    #[test]
    fn high_chlorine_is_unsafe_despite_a_high_score() {
        let mut p = safe_parameters();
        p.chlorine = 4.5;
        let c = classify(&p, WaterSource::SwimmingPool);
        assert_eq!(c.score, 85);
        assert_eq!(c.safety_level, SafetyLevel::Unsafe);
        assert_eq!(c.overall_quality, OverallQuality::Poor);
        assert_eq!(c.alerts, vec!["High chlorine levels: 4.5 ppm".to_string()]);
        assert!(c.breaches[0].hard_override);

        p.chlorine = 4.0;
        assert_eq!(classify(&p, WaterSource::SwimmingPool).safety_level, SafetyLevel::Safe);
    }

    #[test]
    fn recommendations_are_never_empty() {
        let phs = [5.5, 6.2, 7.0, 8.7, 9.5];
        let bacteria = [0, 1, 40];
        let nitrates = [0.5, 12.0, 50.0];
        for ph in phs {
            for b in bacteria {
                for n in nitrates {
                    for source in WaterSource::ALL {
                        let p = WaterParameters {
                            ph,
                            bacteria: b,
                            nitrates: n,
                            ..safe_parameters()
                        };
                        let c = classify(&p, source);
                        assert!(!c.recommendations.is_empty());
                        if b > 0 {
                            assert_eq!(c.safety_level, SafetyLevel::Unsafe);
                            assert_eq!(c.overall_quality, OverallQuality::Poor);
                        }
                    }
                }
            }
        }
    }
}
