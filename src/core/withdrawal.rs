use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::error::{EngineError, EngineResult};
use super::monte_carlo::{Stream, clamp_return, path_rng};
use super::types::{ScenarioParameters, SimulationSettings, WithdrawalOutcome};

/// One drawdown path: withdraw, grow, index the withdrawal to inflation.
/// Succeeds only if the balance stays positive through every year.
fn path_survives<R: Rng + ?Sized>(
    starting_balance: f64,
    rate: f64,
    years: u32,
    inflation: f64,
    returns: &Normal<f64>,
    rng: &mut R,
) -> bool {
    let mut balance = starting_balance;
    let mut withdrawal = starting_balance * rate;

    for _ in 0..years {
        balance -= withdrawal;
        if balance <= 0.0 {
            return false;
        }
        balance *= 1.0 + clamp_return(returns.sample(rng));
        if balance <= 0.0 {
            return false;
        }
        withdrawal *= 1.0 + inflation;
    }
    true
}

/// Success probability of each withdrawal rate, starting every path from the
/// supplied retirement balance (in today's money).
pub fn simulate_withdrawal_sustainability(
    params: &ScenarioParameters,
    settings: &SimulationSettings,
    starting_balance: f64,
) -> EngineResult<Vec<WithdrawalOutcome>> {
    let returns = Normal::new(params.blended_net_return(), settings.withdrawal_return_std)
        .map_err(|e| EngineError::InvalidDistribution(format!("normal: {e}")))?;

    let outcomes: Vec<WithdrawalOutcome> = settings
        .withdrawal_rates
        .iter()
        .enumerate()
        .map(|(index, &rate)| {
            let successes = (0..settings.paths)
                .filter(|&path| {
                    let mut rng = path_rng(settings.seed, Stream::Withdrawal(index as u32), path);
                    path_survives(
                        starting_balance,
                        rate,
                        settings.withdrawal_years,
                        params.inflation_rate,
                        &returns,
                        &mut rng,
                    )
                })
                .count();
            WithdrawalOutcome {
                withdrawal_rate: rate,
                success_probability: successes as f64 / settings.paths.max(1) as f64,
                starting_balance,
            }
        })
        .collect();

    for outcome in &outcomes {
        log::debug!(
            "withdrawal rate={:.3} success={:.3} start={starting_balance:.2}",
            outcome.withdrawal_rate,
            outcome.success_probability
        );
    }
    Ok(outcomes)
}
