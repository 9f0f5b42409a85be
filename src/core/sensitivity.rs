use serde::{Deserialize, Serialize};

use super::error::EngineResult;
use super::self_managed::project_self_managed;
use super::tax::ProgressiveTaxCalculator;
use super::types::ScenarioParameters;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensitivityParameter {
    ActiveReturn,
    ActiveTurnover,
    /// Active share of the portfolio; the passive share is its complement.
    ActiveAllocation,
}

impl SensitivityParameter {
    pub fn default_values(self) -> Vec<f64> {
        match self {
            SensitivityParameter::ActiveReturn => vec![0.07, 0.08, 0.09, 0.10, 0.11],
            SensitivityParameter::ActiveTurnover | SensitivityParameter::ActiveAllocation => {
                vec![0.1, 0.2, 0.3, 0.4, 0.5]
            }
        }
    }

    /// A fresh scenario with only this parameter changed.
    pub fn apply(self, params: &ScenarioParameters, value: f64) -> ScenarioParameters {
        let mut varied = params.clone();
        match self {
            SensitivityParameter::ActiveReturn => varied.active_return = value,
            SensitivityParameter::ActiveTurnover => varied.active_turnover_rate = value,
            SensitivityParameter::ActiveAllocation => varied.passive_ratio = 1.0 - value,
        }
        varied
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityPoint {
    pub value: f64,
    pub final_real_value: f64,
}

/// Self-managed final real value at each swept value. Every variant is
/// validated, so an out-of-range sweep value aborts the sweep.
pub fn sensitivity(
    params: &ScenarioParameters,
    federal: &ProgressiveTaxCalculator,
    parameter: SensitivityParameter,
    values: &[f64],
) -> EngineResult<Vec<SensitivityPoint>> {
    values
        .iter()
        .map(|&value| {
            let varied = parameter.apply(params, value);
            varied.validate()?;
            Ok(SensitivityPoint {
                value,
                final_real_value: project_self_managed(&varied, federal).final_real_value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;
    use crate::core::tax::federal_brackets_2023;

    fn federal() -> ProgressiveTaxCalculator {
        ProgressiveTaxCalculator::new(federal_brackets_2023()).expect("valid table")
    }

    #[test]
    fn higher_active_return_raises_final_value() {
        let params = ScenarioParameters::default();
        let parameter = SensitivityParameter::ActiveReturn;
        let points = sensitivity(&params, &federal(), parameter, &parameter.default_values())
            .expect("valid sweep");
        assert_eq!(points.len(), 5);
        for pair in points.windows(2) {
            assert!(pair[1].final_real_value > pair[0].final_real_value);
        }
    }

    #[test]
    fn higher_turnover_lowers_final_value() {
        let params = ScenarioParameters::default();
        let parameter = SensitivityParameter::ActiveTurnover;
        let points = sensitivity(&params, &federal(), parameter, &parameter.default_values())
            .expect("valid sweep");
        for pair in points.windows(2) {
            assert!(pair[1].final_real_value < pair[0].final_real_value);
        }
    }

    #[test]
    fn sweep_does_not_alter_the_base_scenario() {
        let params = ScenarioParameters::default();
        let before = params.clone();
        let varied = SensitivityParameter::ActiveAllocation.apply(&params, 0.3);
        assert!((varied.passive_ratio - 0.7).abs() < 1e-12);
        assert_eq!(params, before);
    }

    #[test]
    fn out_of_range_value_aborts_sweep() {
        let params = ScenarioParameters::default();
        let err = sensitivity(
            &params,
            &federal(),
            SensitivityParameter::ActiveTurnover,
            &[0.2, 1.5],
        )
        .expect_err("turnover above 1 is invalid");
        assert!(matches!(
            err,
            EngineError::RatioOutOfRange {
                name: "active_turnover_rate",
                ..
            }
        ));
    }
}
