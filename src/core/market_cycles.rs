use rand::Rng;
use rand::distributions::WeightedIndex;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use super::error::{EngineError, EngineResult};
use super::monte_carlo::clamp_return;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketRegime {
    Bull,
    Bear,
    Crash,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeProfile {
    pub regime: MarketRegime,
    pub probability: f64,
    pub mean_return: f64,
    pub volatility: f64,
}

pub fn standard_regimes() -> Vec<RegimeProfile> {
    vec![
        RegimeProfile {
            regime: MarketRegime::Bull,
            probability: 0.6,
            mean_return: 0.15,
            volatility: 0.12,
        },
        RegimeProfile {
            regime: MarketRegime::Bear,
            probability: 0.3,
            mean_return: -0.10,
            volatility: 0.25,
        },
        RegimeProfile {
            regime: MarketRegime::Crash,
            probability: 0.1,
            mean_return: -0.30,
            volatility: 0.40,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCycleYear {
    pub year_index: u32,
    pub regime: MarketRegime,
    pub nominal_return: f64,
    pub real_return: f64,
    pub after_tax_return: f64,
}

/// Share of a positive return assumed to be realized and taxed each year.
const TAXABLE_SHARE: f64 = 0.5;

/// Regime-switching return generator: each year picks a regime by weight and
/// draws that regime's normal return.
#[derive(Debug, Clone)]
pub struct MarketCycleSimulator {
    regimes: Vec<RegimeProfile>,
    selector: WeightedIndex<f64>,
    draws: Vec<Normal<f64>>,
}

impl MarketCycleSimulator {
    pub fn new(regimes: Vec<RegimeProfile>) -> EngineResult<Self> {
        for r in &regimes {
            if !r.probability.is_finite() || r.probability < 0.0 {
                return Err(EngineError::InvalidDistribution(format!(
                    "{:?} regime probability must be finite and >= 0, got {}",
                    r.regime, r.probability
                )));
            }
            if !r.volatility.is_finite() || r.volatility < 0.0 {
                return Err(EngineError::InvalidDistribution(format!(
                    "{:?} regime volatility must be finite and >= 0, got {}",
                    r.regime, r.volatility
                )));
            }
        }
        let selector = WeightedIndex::new(regimes.iter().map(|r| r.probability))
            .map_err(|e| EngineError::InvalidDistribution(format!("regime weights: {e}")))?;
        let draws = regimes
            .iter()
            .map(|r| {
                Normal::new(r.mean_return, r.volatility).map_err(|e| {
                    EngineError::InvalidDistribution(format!("{:?} regime: {e}", r.regime))
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self {
            regimes,
            selector,
            draws,
        })
    }

    pub fn standard() -> EngineResult<Self> {
        Self::new(standard_regimes())
    }

    pub fn regimes(&self) -> &[RegimeProfile] {
        &self.regimes
    }

    pub fn simulate<R: Rng + ?Sized>(
        &self,
        years: u32,
        inflation_rate: f64,
        long_term_gains_rate: f64,
        rng: &mut R,
    ) -> Vec<MarketCycleYear> {
        (0..years)
            .map(|year| {
                let index = self.selector.sample(rng);
                let nominal = clamp_return(self.draws[index].sample(rng));
                let after_tax = if nominal > 0.0 {
                    nominal - nominal * TAXABLE_SHARE * long_term_gains_rate
                } else {
                    nominal
                };
                MarketCycleYear {
                    year_index: year,
                    regime: self.regimes[index].regime,
                    nominal_return: nominal,
                    real_return: (1.0 + nominal) / (1.0 + inflation_rate) - 1.0,
                    after_tax_return: after_tax,
                }
            })
            .collect()
    }
}
