use super::stats::{mean, percentile, std_dev};
use super::types::{RiskMetrics, SimulationResult};

/// Geometric-mean annual return of each path. Paths with no years are skipped.
pub fn annualized_returns(annual_return_samples: &[Vec<f64>]) -> Vec<f64> {
    annual_return_samples
        .iter()
        .filter(|path| !path.is_empty())
        .map(|path| {
            let growth: f64 = path.iter().map(|r| (1.0 + r).max(0.0)).product();
            growth.powf(1.0 / path.len() as f64) - 1.0
        })
        .collect()
}

/// Deviations below this are rounding noise from identical samples.
const MIN_DEVIATION: f64 = 1e-12;

fn ratio_or_zero(excess: f64, deviation: f64) -> f64 {
    if deviation > MIN_DEVIATION {
        excess / deviation
    } else {
        0.0
    }
}

/// Risk summary over the annualized per-path returns of a simulation.
pub fn risk_metrics(result: &SimulationResult, risk_free_rate: f64) -> RiskMetrics {
    let mut annualized = annualized_returns(&result.annual_return_samples);

    let mean_return = mean(&annualized);
    let volatility = std_dev(&annualized);
    let excess = mean_return - risk_free_rate;

    let downside: Vec<f64> = annualized.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_deviation = std_dev(&downside);

    let worst_year = result
        .annual_return_samples
        .iter()
        .flatten()
        .copied()
        .fold(0.0_f64, f64::min);

    RiskMetrics {
        mean_return,
        volatility,
        sharpe_ratio: ratio_or_zero(excess, volatility),
        sortino_ratio: ratio_or_zero(excess, downside_deviation),
        max_drawdown: -worst_year,
        var_95: percentile(&mut annualized, 5.0),
    }
}
