use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StudentT};
use rand_pcg::Pcg64Mcg;

use super::error::{EngineError, EngineResult};
use super::stats::{mean, percentile};
use super::tax_advantaged::employer_match;
use super::types::{
    ConfidenceInterval, PercentileBand, ScenarioParameters, SimulationResult, SimulationSettings,
    Strategy,
};

const MIN_SAMPLED_RETURN: f64 = -0.95;
const MAX_SAMPLED_RETURN: f64 = 2.5;

/// Stable generator slots. A slot must never be renumbered once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    TaxAdvantaged,
    SelfManaged,
    MarketCycles,
    Withdrawal(u32),
}

impl Stream {
    fn slot(self) -> u64 {
        match self {
            Stream::TaxAdvantaged => 0,
            Stream::SelfManaged => 1,
            Stream::MarketCycles => 2,
            Stream::Withdrawal(rate_index) => 16 + rate_index as u64,
        }
    }
}

pub(crate) fn derive_seed(base_seed: u64, stream: Stream, path: u32) -> u64 {
    let mixed = base_seed ^ (stream.slot() << 32) ^ path as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Private generator for one path of one stream.
pub(crate) fn path_rng(base_seed: u64, stream: Stream, path: u32) -> Pcg64Mcg {
    Pcg64Mcg::seed_from_u64(derive_seed(base_seed, stream, path))
}

pub(crate) fn clamp_return(r: f64) -> f64 {
    r.clamp(MIN_SAMPLED_RETURN, MAX_SAMPLED_RETURN)
}

/// Location-scale Student-t draw for one pool's annual gross return.
#[derive(Debug, Clone)]
struct ReturnSampler {
    mean: f64,
    volatility: f64,
    t: StudentT<f64>,
}

impl ReturnSampler {
    fn new(mean: f64, volatility: f64, degrees_of_freedom: f64) -> EngineResult<Self> {
        let t = StudentT::new(degrees_of_freedom)
            .map_err(|e| EngineError::InvalidDistribution(format!("student-t: {e}")))?;
        Ok(Self {
            mean,
            volatility,
            t,
        })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.volatility == 0.0 {
            return clamp_return(self.mean);
        }
        clamp_return(self.mean + self.volatility * self.t.sample(rng))
    }
}

#[derive(Debug, Default)]
struct PathOutcome {
    real_values: Vec<f64>,
    net_returns: Vec<f64>,
    final_real_value: f64,
}

fn run_tax_advantaged_path<R: Rng + ?Sized>(
    params: &ScenarioParameters,
    sampler: &ReturnSampler,
    rng: &mut R,
) -> PathOutcome {
    let years = params.investment_years();
    let mut balance = 0.0_f64;
    let mut outcome = PathOutcome {
        real_values: Vec::with_capacity(years as usize),
        net_returns: Vec::with_capacity(years as usize),
        final_real_value: 0.0,
    };

    for year in 0..years {
        let projected = params.projected_year(year);
        let contribution = projected.contribution.max(0.0) + employer_match(params, &projected);
        let net = sampler.sample(rng) - params.tax_advantaged_fee;
        balance = ((balance + contribution) * (1.0 + net)).max(0.0);
        outcome.real_values.push(balance / params.year_end_deflator(year));
        outcome.net_returns.push(net);
    }

    outcome.final_real_value = balance / params.horizon_deflator();
    outcome
}

fn run_self_managed_path<R: Rng + ?Sized>(
    params: &ScenarioParameters,
    passive_sampler: &ReturnSampler,
    active_sampler: &ReturnSampler,
    rng: &mut R,
) -> PathOutcome {
    let years = params.investment_years();
    let target = params.passive_ratio;
    let mut passive = 0.0_f64;
    let mut active = 0.0_f64;
    let mut outcome = PathOutcome {
        real_values: Vec::with_capacity(years as usize),
        net_returns: Vec::with_capacity(years as usize),
        final_real_value: 0.0,
    };

    for year in 0..years {
        let contribution = params.projected_year(year).contribution.max(0.0);
        let passive_net = passive_sampler.sample(rng) - params.passive_fee;
        let active_net = active_sampler.sample(rng) - params.active_fee;

        passive = ((passive + contribution * target) * (1.0 + passive_net)).max(0.0);
        active = ((active + contribution * (1.0 - target)) * (1.0 + active_net)).max(0.0);

        // Untaxed drift correction; tax drag is not modeled here.
        let total = passive + active;
        if total > 0.0 && (passive / total - target).abs() > params.rebalance_threshold {
            passive = total * target;
            active = total - passive;
        }

        outcome
            .real_values
            .push((passive + active) / params.year_end_deflator(year));
        outcome
            .net_returns
            .push(target * passive_net + (1.0 - target) * active_net);
    }

    outcome.final_real_value = (passive + active) / params.horizon_deflator();
    outcome
}

/// Runs `settings.paths` independent pre-tax paths for one strategy.
pub fn simulate_with_volatility(
    params: &ScenarioParameters,
    settings: &SimulationSettings,
    strategy: Strategy,
) -> EngineResult<SimulationResult> {
    let years = params.investment_years();
    let df = settings.degrees_of_freedom;

    let outcomes: Vec<PathOutcome> = match strategy {
        Strategy::TaxAdvantaged => {
            let sampler = ReturnSampler::new(
                params.tax_advantaged_return,
                settings.tax_advantaged_volatility,
                df,
            )?;
            (0..settings.paths)
                .map(|path| {
                    let mut rng = path_rng(settings.seed, Stream::TaxAdvantaged, path);
                    run_tax_advantaged_path(params, &sampler, &mut rng)
                })
                .collect()
        }
        Strategy::SelfManaged => {
            let passive =
                ReturnSampler::new(params.passive_return, settings.passive_volatility, df)?;
            let active = ReturnSampler::new(params.active_return, settings.active_volatility, df)?;
            (0..settings.paths)
                .map(|path| {
                    let mut rng = path_rng(settings.seed, Stream::SelfManaged, path);
                    run_self_managed_path(params, &passive, &active, &mut rng)
                })
                .collect()
        }
    };

    let total_contributions: f64 = (0..years)
        .map(|year| {
            let projected = params.projected_year(year);
            let employee = projected.contribution.max(0.0);
            match strategy {
                Strategy::TaxAdvantaged => employee + employer_match(params, &projected),
                Strategy::SelfManaged => employee,
            }
        })
        .sum();

    let final_value_samples: Vec<f64> = outcomes.iter().map(|o| o.final_real_value).collect();
    let mean_final_value = mean(&final_value_samples);

    log::debug!(
        "monte carlo {strategy:?}: paths={} years={years} seed={} mean_final={mean_final_value:.2}",
        settings.paths,
        settings.seed
    );

    let (all_annual_trajectories, annual_return_samples): (Vec<Vec<f64>>, Vec<Vec<f64>>) = outcomes
        .into_iter()
        .map(|o| (o.real_values, o.net_returns))
        .unzip();

    Ok(SimulationResult {
        strategy,
        mean_final_value,
        all_annual_trajectories,
        final_value_samples,
        annual_return_samples,
        total_contributions,
    })
}

/// Lower/median/upper of each year's slice across paths, computed per year.
pub fn confidence_bands(result: &SimulationResult, lower: f64, upper: f64) -> Vec<PercentileBand> {
    let years = result
        .all_annual_trajectories
        .iter()
        .map(Vec::len)
        .min()
        .unwrap_or(0);

    (0..years)
        .map(|year| {
            let mut slice: Vec<f64> = result
                .all_annual_trajectories
                .iter()
                .map(|path| path[year])
                .collect();
            PercentileBand {
                year_index: year as u32,
                lower: percentile(&mut slice, lower),
                median: percentile(&mut slice, 50.0),
                upper: percentile(&mut slice, upper),
            }
        })
        .collect()
}

pub fn final_value_interval(result: &SimulationResult, lower: f64, upper: f64) -> ConfidenceInterval {
    let mut finals = result.final_value_samples.clone();
    ConfidenceInterval {
        lower: percentile(&mut finals, lower),
        upper: percentile(&mut finals, upper),
    }
}
