use serde::Serialize;

use super::error::{EngineError, EngineResult, ensure_finite, ensure_ratio};
use super::limits::ContributionLimitPolicy;
use super::tax::{CapitalGainsSchedule, TaxBracket, federal_brackets_2023};

/// Relative slack on the contribution limit; a rate clamped to
/// `limit / income` can land a few ulps above `limit` once multiplied back.
const LIMIT_TOLERANCE: f64 = 4.0 * f64::EPSILON;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    TaxAdvantaged,
    SelfManaged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioParameters {
    pub current_age: u32,
    pub retirement_age: u32,
    pub annual_income: f64,
    pub contribution_rate: f64,
    pub salary_growth: f64,
    pub inflation_rate: f64,
    pub tax_advantaged_return: f64,
    pub tax_advantaged_fee: f64,
    pub passive_return: f64,
    pub passive_fee: f64,
    pub active_return: f64,
    pub active_fee: f64,
    pub passive_ratio: f64,
    pub passive_dividend_yield: f64,
    pub active_dividend_yield: f64,
    pub dividend_tax_rate: f64,
    pub short_term_gains_rate: f64,
    pub long_term_gains_rate: f64,
    pub active_turnover_rate: f64,
    pub active_short_term_share: f64,
    pub rebalance_threshold: f64,
    pub employer_match_rate: f64,
    pub employer_match_limit: f64,
    pub federal_brackets: Vec<TaxBracket>,
    pub capital_gains: CapitalGainsSchedule,
    pub state_tax_rate: Option<f64>,
    pub liquidation_percent: f64,
    pub contribution_limits: ContributionLimitPolicy,
}

impl Default for ScenarioParameters {
    fn default() -> Self {
        Self {
            current_age: 22,
            retirement_age: 65,
            annual_income: 100_000.0,
            contribution_rate: 0.10,
            salary_growth: 0.04,
            inflation_rate: 0.03,
            tax_advantaged_return: 0.10,
            tax_advantaged_fee: 0.005,
            passive_return: 0.10,
            passive_fee: 0.001,
            active_return: 0.12,
            active_fee: 0.002,
            passive_ratio: 0.80,
            passive_dividend_yield: 0.015,
            active_dividend_yield: 0.02,
            dividend_tax_rate: 0.15,
            short_term_gains_rate: 0.24,
            long_term_gains_rate: 0.15,
            active_turnover_rate: 0.30,
            active_short_term_share: 0.60,
            rebalance_threshold: 0.10,
            employer_match_rate: 0.0,
            employer_match_limit: 0.06,
            federal_brackets: federal_brackets_2023(),
            capital_gains: CapitalGainsSchedule::us_2023(),
            state_tax_rate: None,
            liquidation_percent: 100.0,
            contribution_limits: ContributionLimitPolicy::plan_year_2024(),
        }
    }
}

impl ScenarioParameters {
    pub fn investment_years(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }

    pub fn active_ratio(&self) -> f64 {
        1.0 - self.passive_ratio
    }

    pub fn real_salary_growth(&self) -> f64 {
        (1.0 + self.salary_growth) / (1.0 + self.inflation_rate) - 1.0
    }

    pub fn state_overlay_rate(&self) -> f64 {
        self.state_tax_rate.unwrap_or(0.0)
    }

    /// Blended short/long rate applied to gains realized out of the active pool.
    pub fn active_realization_rate(&self) -> f64 {
        self.active_short_term_share * self.short_term_gains_rate
            + (1.0 - self.active_short_term_share) * self.long_term_gains_rate
    }

    /// Expected portfolio return net of fees at the target allocation.
    pub fn blended_net_return(&self) -> f64 {
        self.passive_ratio * (self.passive_return - self.passive_fee)
            + self.active_ratio() * (self.active_return - self.active_fee)
    }

    pub fn initial_contribution(&self) -> f64 {
        self.annual_income * self.contribution_rate
    }

    /// Nominal income and contribution for `year`: grown at the real salary
    /// rate, then re-inflated by `(1+inflation)^year`.
    pub fn projected_year(&self, year: u32) -> ProjectedYear {
        let real_growth = (1.0 + self.real_salary_growth()).powi(year as i32);
        let real_income = self.annual_income * real_growth;
        let real_contribution = real_income * self.contribution_rate;
        let inflator = (1.0 + self.inflation_rate).powi(year as i32);
        ProjectedYear {
            income: real_income * inflator,
            contribution: real_contribution * inflator,
        }
    }

    /// Divisor that brings an end-of-year nominal balance for `year` into today's money.
    pub fn year_end_deflator(&self, year: u32) -> f64 {
        (1.0 + self.inflation_rate).powi(year as i32 + 1)
    }

    pub fn horizon_deflator(&self) -> f64 {
        (1.0 + self.inflation_rate).powi(self.investment_years() as i32)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.retirement_age <= self.current_age {
            return Err(EngineError::InvalidAgeRange {
                current_age: self.current_age,
                retirement_age: self.retirement_age,
            });
        }

        for (name, value) in [
            ("annual_income", self.annual_income),
            ("salary_growth", self.salary_growth),
            ("inflation_rate", self.inflation_rate),
            ("tax_advantaged_return", self.tax_advantaged_return),
            ("tax_advantaged_fee", self.tax_advantaged_fee),
            ("passive_return", self.passive_return),
            ("passive_fee", self.passive_fee),
            ("active_return", self.active_return),
            ("active_fee", self.active_fee),
        ] {
            ensure_finite(name, value)?;
        }

        if self.annual_income <= 0.0 {
            return Err(EngineError::NonPositiveIncome {
                income: self.annual_income,
            });
        }
        if self.inflation_rate <= -1.0 {
            return Err(EngineError::NonFiniteParameter {
                name: "inflation_rate",
                value: self.inflation_rate,
            });
        }

        for (name, value) in [
            ("contribution_rate", self.contribution_rate),
            ("passive_ratio", self.passive_ratio),
            ("passive_dividend_yield", self.passive_dividend_yield),
            ("active_dividend_yield", self.active_dividend_yield),
            ("dividend_tax_rate", self.dividend_tax_rate),
            ("short_term_gains_rate", self.short_term_gains_rate),
            ("long_term_gains_rate", self.long_term_gains_rate),
            ("active_turnover_rate", self.active_turnover_rate),
            ("active_short_term_share", self.active_short_term_share),
            ("rebalance_threshold", self.rebalance_threshold),
            ("employer_match_rate", self.employer_match_rate),
            ("employer_match_limit", self.employer_match_limit),
        ] {
            ensure_ratio(name, value)?;
        }

        if let Some(rate) = self.state_tax_rate {
            ensure_ratio("state_tax_rate", rate)?;
        }

        if !self.liquidation_percent.is_finite()
            || !(0.0..=100.0).contains(&self.liquidation_percent)
        {
            return Err(EngineError::InvalidPercent {
                name: "liquidation_percent",
                value: self.liquidation_percent,
            });
        }

        let contribution = self.initial_contribution();
        let limit = self.contribution_limits.limit_for_age(self.current_age);
        if contribution > limit * (1.0 + LIMIT_TOLERANCE) {
            return Err(EngineError::ContributionAboveLimit {
                contribution,
                limit,
                age: self.current_age,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedYear {
    pub income: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub paths: u32,
    pub seed: u64,
    pub degrees_of_freedom: f64,
    pub tax_advantaged_volatility: f64,
    pub passive_volatility: f64,
    pub active_volatility: f64,
    pub risk_free_rate: f64,
    pub withdrawal_rates: Vec<f64>,
    pub withdrawal_years: u32,
    pub withdrawal_return_std: f64,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            paths: 1_000,
            seed: 42,
            degrees_of_freedom: 5.0,
            tax_advantaged_volatility: 0.15,
            passive_volatility: 0.15,
            active_volatility: 0.25,
            risk_free_rate: 0.03,
            withdrawal_rates: vec![0.03, 0.04, 0.05],
            withdrawal_years: 30,
            withdrawal_return_std: 0.12,
            lower_percentile: 5.0,
            upper_percentile: 95.0,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: &str| Err(EngineError::InvalidSimulationSettings(msg.to_string()));

        if self.paths == 0 {
            return invalid("paths must be > 0");
        }
        if !(self.degrees_of_freedom > 0.0) || !self.degrees_of_freedom.is_finite() {
            return invalid("degrees_of_freedom must be a positive number");
        }
        for (name, vol) in [
            ("tax_advantaged_volatility", self.tax_advantaged_volatility),
            ("passive_volatility", self.passive_volatility),
            ("active_volatility", self.active_volatility),
            ("withdrawal_return_std", self.withdrawal_return_std),
        ] {
            if !vol.is_finite() || vol < 0.0 {
                return Err(EngineError::InvalidSimulationSettings(format!(
                    "{name} must be >= 0"
                )));
            }
        }
        ensure_finite("risk_free_rate", self.risk_free_rate)?;
        if self.withdrawal_rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return invalid("withdrawal rates must be >= 0");
        }
        if self.withdrawal_years == 0 {
            return invalid("withdrawal_years must be > 0");
        }
        if !(0.0..=100.0).contains(&self.lower_percentile)
            || !(0.0..=100.0).contains(&self.upper_percentile)
            || self.lower_percentile > self.upper_percentile
        {
            return invalid("percentiles must satisfy 0 <= lower <= upper <= 100");
        }
        Ok(())
    }
}

/// Final outcome of one deterministic projection plus its per-year trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult<Y> {
    pub final_real_value: f64,
    pub annual_real_values: Vec<f64>,
    pub total_contributions: f64,
    /// Match tax for the tax-advantaged path, liquidation tax for the self-managed path.
    pub final_tax: f64,
    pub years: Vec<Y>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxAdvantagedYear {
    pub year_index: u32,
    pub age: u32,
    pub income: f64,
    pub contribution: f64,
    pub true_marginal_rate: f64,
    pub employer_match: f64,
    pub tax_free_balance: f64,
    pub matched_balance: f64,
    pub end_real_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfManagedYear {
    pub year_index: u32,
    pub age: u32,
    pub income: f64,
    pub gross_contribution: f64,
    pub invested_contribution: f64,
    pub true_marginal_rate: f64,
    pub dividend_tax: f64,
    pub trading_tax: f64,
    pub rebalance_tax: f64,
    pub rebalanced: bool,
    pub passive_balance: f64,
    pub active_balance: f64,
    pub passive_unrealized_gain: f64,
    pub active_unrealized_gain: f64,
    pub end_real_total: f64,
}

pub type TaxAdvantagedProjection = ProjectionResult<TaxAdvantagedYear>;
pub type SelfManagedProjection = ProjectionResult<SelfManagedYear>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyComparison {
    pub tax_advantaged: TaxAdvantagedProjection,
    pub self_managed: SelfManagedProjection,
    /// `self_managed / tax_advantaged - 1`; absent when the tax-advantaged value is zero.
    pub relative_difference: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub strategy: Strategy,
    pub mean_final_value: f64,
    /// Real (inflation-deflated) balance per year, one sequence per path.
    pub all_annual_trajectories: Vec<Vec<f64>>,
    pub final_value_samples: Vec<f64>,
    /// Fee-net portfolio return per year, one sequence per path.
    pub annual_return_samples: Vec<Vec<f64>>,
    pub total_contributions: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileBand {
    pub year_index: u32,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub mean_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub var_95: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalOutcome {
    pub withdrawal_rate: f64,
    pub success_probability: f64,
    pub starting_balance: f64,
}
