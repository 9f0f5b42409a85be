use super::tax::ProgressiveTaxCalculator;
use super::types::{ScenarioParameters, SelfManagedProjection, SelfManagedYear};

/// One taxable pool: market value and the portion of it that is untaxed gain.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct Pool {
    pub balance: f64,
    pub unrealized_gain: f64,
}

impl Pool {
    fn gain_share(&self, amount: f64) -> f64 {
        if self.balance > 0.0 {
            amount * (self.unrealized_gain / self.balance).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn clamp_gain(&mut self) {
        self.unrealized_gain = self.unrealized_gain.clamp(0.0, self.balance.max(0.0));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Rebalance {
    pub tax: f64,
    pub passive: Pool,
    pub active: Pool,
}

/// Caps a tax at the balance it is paid from.
fn capped_tax(tax: f64, balance: f64, label: &str, year: u32) -> f64 {
    let balance = balance.max(0.0);
    if tax > balance {
        log::warn!("year={year} self-managed: {label} {tax:.2} exceeds balance {balance:.2}; capping");
        balance
    } else {
        tax.max(0.0)
    }
}

/// Adds the contribution, compounds net of fees and takes the dividend tax.
/// Returns the dividend tax paid.
fn grow_pool(
    pool: &mut Pool,
    contribution: f64,
    net_return: f64,
    dividend_yield: f64,
    dividend_tax_rate: f64,
    year: u32,
) -> f64 {
    let base = pool.balance + contribution;
    let grown = (base * (1.0 + net_return)).max(0.0);
    let growth = grown - base;

    // Dividends are realized the year they are received.
    let dividend = (grown * dividend_yield).max(0.0);
    let tax = capped_tax(dividend * dividend_tax_rate, grown, "dividend tax", year);

    pool.balance = grown - tax;
    pool.unrealized_gain += growth - dividend;
    pool.clamp_gain();
    tax
}

fn realize_trading_gains(pool: &mut Pool, turnover: f64, rate: f64, year: u32) -> f64 {
    if pool.balance <= 0.0 || turnover <= 0.0 {
        return 0.0;
    }
    let realized = pool.unrealized_gain * turnover;
    let tax = capped_tax(realized * rate, pool.balance, "trading tax", year);
    pool.balance -= tax;
    pool.unrealized_gain -= realized;
    pool.clamp_gain();
    tax
}

/// Restores the target split when drift exceeds the threshold, realizing the
/// overweight side's share of unrealized gain. An empty portfolio has no drift.
pub(crate) fn plan_rebalance(
    passive: &Pool,
    active: &Pool,
    params: &ScenarioParameters,
) -> Option<Rebalance> {
    let total = passive.balance + active.balance;
    if !(total > 0.0) {
        return None;
    }

    let target = params.passive_ratio;
    let drift = (passive.balance / total - target).abs();
    if drift <= params.rebalance_threshold {
        return None;
    }

    let mut passive = *passive;
    let mut active = *active;
    let target_passive = total * target;

    let tax = if passive.balance > target_passive {
        let realized = passive.gain_share(passive.balance - target_passive);
        passive.unrealized_gain -= realized;
        realized * params.long_term_gains_rate
    } else {
        let target_active = total - target_passive;
        let realized = active.gain_share(active.balance - target_active);
        active.unrealized_gain -= realized;
        realized * params.active_realization_rate()
    };
    let tax = tax.clamp(0.0, total);

    let remaining = total - tax;
    passive.balance = remaining * target;
    active.balance = remaining - passive.balance;
    passive.clamp_gain();
    active.clamp_gain();

    Some(Rebalance {
        tax,
        passive,
        active,
    })
}

/// Tax a rebalance of these balances would cost if every trimmed dollar were gain.
pub fn calculate_rebalancing_costs(
    params: &ScenarioParameters,
    passive_value: f64,
    active_value: f64,
) -> f64 {
    let passive = Pool {
        balance: passive_value.max(0.0),
        unrealized_gain: passive_value.max(0.0),
    };
    let active = Pool {
        balance: active_value.max(0.0),
        unrealized_gain: active_value.max(0.0),
    };
    plan_rebalance(&passive, &active, params)
        .map(|r| r.tax)
        .unwrap_or(0.0)
}

/// Year-by-year projection of the after-tax passive/active portfolio.
pub fn project_self_managed(
    params: &ScenarioParameters,
    federal: &ProgressiveTaxCalculator,
) -> SelfManagedProjection {
    let investment_years = params.investment_years();
    let state_rate = params.state_overlay_rate();
    let passive_net = params.passive_return - params.passive_fee;
    let active_net = params.active_return - params.active_fee;
    let active_rate = params.active_realization_rate();

    let mut passive = Pool::default();
    let mut active = Pool::default();
    let mut total_contributions = 0.0;
    let mut rebalance_count = 0_u32;
    let mut annual_real_values = Vec::with_capacity(investment_years as usize);
    let mut years = Vec::with_capacity(investment_years as usize);

    for year in 0..investment_years {
        let projected = params.projected_year(year);
        let gross_contribution = projected.contribution.max(0.0);
        let base_income = (projected.income - gross_contribution).max(0.0);
        let true_marginal_rate = (federal.true_marginal_rate(base_income, gross_contribution)
            + state_rate)
            .clamp(0.0, 1.0);
        let invested = gross_contribution * (1.0 - true_marginal_rate);
        total_contributions += invested;

        let passive_contribution = invested * params.passive_ratio;
        let active_contribution = invested - passive_contribution;

        let mut dividend_tax = grow_pool(
            &mut passive,
            passive_contribution,
            passive_net,
            params.passive_dividend_yield,
            params.dividend_tax_rate,
            year,
        );
        dividend_tax += grow_pool(
            &mut active,
            active_contribution,
            active_net,
            params.active_dividend_yield,
            params.dividend_tax_rate,
            year,
        );

        let trading_tax =
            realize_trading_gains(&mut active, params.active_turnover_rate, active_rate, year);

        let (rebalance_tax, rebalanced) = match plan_rebalance(&passive, &active, params) {
            Some(rebalance) => {
                passive = rebalance.passive;
                active = rebalance.active;
                rebalance_count += 1;
                (rebalance.tax, true)
            }
            None => (0.0, false),
        };

        let end_real_total = (passive.balance + active.balance) / params.year_end_deflator(year);
        annual_real_values.push(end_real_total);
        years.push(SelfManagedYear {
            year_index: year,
            age: params.current_age + year,
            income: projected.income,
            gross_contribution,
            invested_contribution: invested,
            true_marginal_rate,
            dividend_tax,
            trading_tax,
            rebalance_tax,
            rebalanced,
            passive_balance: passive.balance,
            active_balance: active.balance,
            passive_unrealized_gain: passive.unrealized_gain,
            active_unrealized_gain: active.unrealized_gain,
            end_real_total,
        });
    }

    let total = passive.balance + active.balance;
    let final_income = params
        .projected_year(investment_years.saturating_sub(1))
        .income;
    let liquidation_rate =
        (params.capital_gains.rate_for_income(final_income) + state_rate).clamp(0.0, 1.0);
    let liquidated_gain = (passive.unrealized_gain + active.unrealized_gain)
        * (params.liquidation_percent / 100.0);
    let liquidation_tax = capped_tax(
        liquidated_gain * liquidation_rate,
        total,
        "liquidation tax",
        investment_years,
    );

    // Deflate over the full horizon whether or not a liquidation tax was owed.
    let final_real_value = (total - liquidation_tax) / params.horizon_deflator();

    log::debug!(
        "self-managed projection: years={investment_years} final_real={final_real_value:.2} contributions={total_contributions:.2} rebalances={rebalance_count} liquidation_tax={liquidation_tax:.2}"
    );

    SelfManagedProjection {
        final_real_value,
        annual_real_values,
        total_contributions,
        final_tax: liquidation_tax,
        years,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tax::{CapitalGainsSchedule, TaxBracket, federal_brackets_2023};
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn federal() -> ProgressiveTaxCalculator {
        ProgressiveTaxCalculator::new(federal_brackets_2023()).expect("valid table")
    }

    fn flat_gains(rate: f64) -> CapitalGainsSchedule {
        CapitalGainsSchedule::new(vec![TaxBracket::new(0.0, f64::INFINITY, rate)], 0.0, 0.0)
            .expect("valid schedule")
    }

    fn one_year_params() -> ScenarioParameters {
        ScenarioParameters {
            current_age: 30,
            retirement_age: 31,
            annual_income: 1_000.0,
            contribution_rate: 0.10,
            salary_growth: 0.0,
            inflation_rate: 0.0,
            passive_return: 0.10,
            passive_fee: 0.0,
            active_return: 0.10,
            active_fee: 0.0,
            capital_gains: flat_gains(0.15),
            ..ScenarioParameters::default()
        }
    }

    #[test]
    fn oracle_passive_only_year_applies_income_dividend_and_liquidation_tax() {
        let mut params = one_year_params();
        params.passive_ratio = 1.0;
        params.passive_dividend_yield = 0.02;
        params.dividend_tax_rate = 0.15;

        // invested = 100 * (1 - 10%) = 90; grown = 99; dividend 1.98 taxed 0.297
        // unrealized = 9 - 1.98 = 7.02; liquidation 7.02 * 15% = 1.053
        let result = project_self_managed(&params, &federal());
        let year = result.years[0];
        assert_approx(year.true_marginal_rate, 0.10);
        assert_approx(year.invested_contribution, 90.0);
        assert_approx(year.dividend_tax, 0.297);
        assert_approx(year.passive_balance, 98.703);
        assert_approx(year.passive_unrealized_gain, 7.02);
        assert_approx(year.trading_tax, 0.0);
        assert!(!year.rebalanced);
        assert_approx(result.final_tax, 1.053);
        assert_approx(result.final_real_value, 97.65);
        assert_approx(result.total_contributions, 90.0);
    }

    #[test]
    fn oracle_active_only_year_realizes_turnover_at_blended_rate() {
        let mut params = one_year_params();
        params.passive_ratio = 0.0;
        params.active_dividend_yield = 0.0;
        params.active_turnover_rate = 0.5;
        params.short_term_gains_rate = 0.30;
        params.long_term_gains_rate = 0.10;
        params.active_short_term_share = 0.6;

        // realized = 9 * 50% = 4.5 taxed at 0.6*30% + 0.4*10% = 22% -> 0.99
        let result = project_self_managed(&params, &federal());
        let year = result.years[0];
        assert_approx(year.trading_tax, 0.99);
        assert_approx(year.active_balance, 98.01);
        assert_approx(year.active_unrealized_gain, 4.5);
        assert_approx(result.final_tax, 0.675);
        assert_approx(result.final_real_value, 97.335);
    }

    #[test]
    fn partial_liquidation_taxes_only_that_share_of_gains() {
        let mut params = one_year_params();
        params.passive_ratio = 0.0;
        params.active_dividend_yield = 0.0;
        params.active_turnover_rate = 0.5;
        params.short_term_gains_rate = 0.30;
        params.long_term_gains_rate = 0.10;
        params.liquidation_percent = 50.0;

        let result = project_self_managed(&params, &federal());
        assert_approx(result.final_tax, 0.3375);
        assert_approx(result.final_real_value, 97.6725);
    }

    #[test]
    fn zero_liquidation_still_deflates_over_full_horizon() {
        let mut params = one_year_params();
        params.passive_ratio = 1.0;
        params.passive_dividend_yield = 0.0;
        params.inflation_rate = 0.10;
        params.salary_growth = 0.10;
        params.liquidation_percent = 0.0;

        let result = project_self_managed(&params, &federal());
        assert_eq!(result.final_tax, 0.0);
        assert_approx(result.final_real_value, 99.0 / 1.1);
        assert_approx(result.annual_real_values[0], result.final_real_value);
    }

    #[test]
    fn fully_passive_portfolio_never_pays_trading_tax() {
        let params = ScenarioParameters {
            passive_ratio: 1.0,
            ..ScenarioParameters::default()
        };
        let result = project_self_managed(&params, &federal());
        assert_eq!(result.years.len(), 43);
        assert!(result.years.iter().all(|y| y.trading_tax == 0.0));
        assert!(result.years.iter().all(|y| y.active_balance == 0.0));
        assert!(result.years.iter().all(|y| !y.rebalanced));
        assert!(result.years.iter().all(|y| y.dividend_tax > 0.0));
        assert!(result.final_tax > 0.0);
    }

    #[test]
    fn plan_rebalance_trims_overweight_passive_at_long_term_rate() {
        let params = ScenarioParameters {
            passive_ratio: 0.5,
            rebalance_threshold: 0.10,
            long_term_gains_rate: 0.15,
            ..ScenarioParameters::default()
        };
        let passive = Pool {
            balance: 90.0,
            unrealized_gain: 45.0,
        };
        let active = Pool {
            balance: 10.0,
            unrealized_gain: 0.0,
        };

        // trim 40 of which half is gain: 20 * 15% = 3
        let rebalance = plan_rebalance(&passive, &active, &params).expect("drift 0.4");
        assert_approx(rebalance.tax, 3.0);
        assert_approx(rebalance.passive.balance, 48.5);
        assert_approx(rebalance.active.balance, 48.5);
        assert_approx(rebalance.passive.unrealized_gain, 25.0);
        assert_approx(rebalance.active.unrealized_gain, 0.0);
    }

    #[test]
    fn plan_rebalance_trims_overweight_active_at_blended_rate() {
        let params = ScenarioParameters {
            passive_ratio: 0.5,
            ..ScenarioParameters::default()
        };
        let passive = Pool {
            balance: 10.0,
            unrealized_gain: 0.0,
        };
        let active = Pool {
            balance: 90.0,
            unrealized_gain: 30.0,
        };

        let rebalance = plan_rebalance(&passive, &active, &params).expect("drift 0.4");
        let realized = 40.0 * 30.0 / 90.0;
        assert_approx(rebalance.tax, realized * params.active_realization_rate());
        assert_approx(rebalance.active.unrealized_gain, 30.0 - realized);
    }

    #[test]
    fn plan_rebalance_skips_empty_portfolio() {
        let params = ScenarioParameters::default();
        assert!(plan_rebalance(&Pool::default(), &Pool::default(), &params).is_none());
    }

    #[test]
    fn rebalancing_costs_are_zero_at_target() {
        let params = ScenarioParameters::default();
        assert_eq!(calculate_rebalancing_costs(&params, 80.0, 20.0), 0.0);
        assert_eq!(calculate_rebalancing_costs(&params, 0.0, 0.0), 0.0);
        // drift 0.15 trims 15 of passive at the long-term rate
        assert_approx(calculate_rebalancing_costs(&params, 95.0, 5.0), 15.0 * 0.15);
    }

    #[test]
    fn drift_triggers_rebalance_back_to_target() {
        let params = ScenarioParameters {
            current_age: 30,
            retirement_age: 50,
            passive_ratio: 0.5,
            passive_return: 0.02,
            active_return: 0.30,
            active_turnover_rate: 0.0,
            ..ScenarioParameters::default()
        };
        let result = project_self_managed(&params, &federal());
        let rebalanced: Vec<_> = result.years.iter().filter(|y| y.rebalanced).collect();
        assert!(!rebalanced.is_empty(), "returns this far apart must drift");
        for year in rebalanced {
            let total = year.passive_balance + year.active_balance;
            assert_approx(year.passive_balance / total, 0.5);
            assert!(year.rebalance_tax > 0.0);
        }
    }

    #[test]
    fn reruns_are_bit_identical() {
        let params = ScenarioParameters::default();
        assert_eq!(
            project_self_managed(&params, &federal()),
            project_self_managed(&params, &federal())
        );
    }

    proptest! {
        #[test]
        fn final_value_is_non_negative_for_non_negative_assumptions(
            passive_return in 0.0f64..0.2,
            active_return in 0.0f64..0.3,
            passive_fee in 0.0f64..0.02,
            active_fee in 0.0f64..0.02,
            passive_ratio in 0.0f64..=1.0,
            turnover in 0.0f64..=1.0,
            dividend_yield in 0.0f64..0.05,
            income in 10_000.0f64..400_000.0,
        ) {
            let params = ScenarioParameters {
                passive_return,
                active_return,
                passive_fee,
                active_fee,
                passive_ratio,
                active_turnover_rate: turnover,
                passive_dividend_yield: dividend_yield,
                active_dividend_yield: dividend_yield,
                annual_income: income,
                contribution_rate: 0.05,
                ..ScenarioParameters::default()
            };
            let result = project_self_managed(&params, &federal());
            prop_assert!(result.final_real_value >= 0.0);
            prop_assert!(result.annual_real_values.iter().all(|v| *v >= 0.0));
            let gains_within_balances = result.years.iter().all(|y| {
                y.passive_unrealized_gain <= y.passive_balance + 1e-9
                    && y.active_unrealized_gain <= y.active_balance + 1e-9
            });
            prop_assert!(gains_within_balances);
        }
    }
}
