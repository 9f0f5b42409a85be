use super::tax::ProgressiveTaxCalculator;
use super::types::{ProjectedYear, ScenarioParameters, TaxAdvantagedProjection, TaxAdvantagedYear};

#[derive(Debug, Default)]
struct AccountState {
    tax_free: f64,
    matched: f64,
}

pub(crate) fn employer_match(params: &ScenarioParameters, year: &ProjectedYear) -> f64 {
    let matchable = year
        .contribution
        .min(year.income * params.employer_match_limit)
        .max(0.0);
    matchable * params.employer_match_rate
}

/// Year-by-year compounding of the tax-free account and the pre-tax matched
/// sub-account. Only the matched balance is taxed, once, at the marginal rate
/// projected for the final working year.
pub fn project_tax_advantaged(
    params: &ScenarioParameters,
    federal: &ProgressiveTaxCalculator,
) -> TaxAdvantagedProjection {
    let investment_years = params.investment_years();
    let growth = 1.0 + params.tax_advantaged_return - params.tax_advantaged_fee;
    let state_rate = params.state_overlay_rate();

    let mut account = AccountState::default();
    let mut total_contributions = 0.0;
    let mut annual_real_values = Vec::with_capacity(investment_years as usize);
    let mut years = Vec::with_capacity(investment_years as usize);

    for year in 0..investment_years {
        let projected = params.projected_year(year);
        let base_income = (projected.income - projected.contribution).max(0.0);
        let true_marginal_rate =
            federal.true_marginal_rate(base_income, projected.contribution) + state_rate;

        // Contributions go in whole; the account is never taxed on the way in.
        let contribution = projected.contribution.max(0.0);
        let matched = employer_match(params, &projected);

        account.tax_free = (account.tax_free + contribution) * growth;
        account.matched = (account.matched + matched) * growth;
        total_contributions += contribution;

        let end_real_total = (account.tax_free + account.matched) / params.year_end_deflator(year);
        annual_real_values.push(end_real_total);
        years.push(TaxAdvantagedYear {
            year_index: year,
            age: params.current_age + year,
            income: projected.income,
            contribution,
            true_marginal_rate,
            employer_match: matched,
            tax_free_balance: account.tax_free,
            matched_balance: account.matched,
            end_real_total,
        });
    }

    let match_tax = if params.employer_match_rate > 0.0 && account.matched > 0.0 {
        let final_income = params
            .projected_year(investment_years.saturating_sub(1))
            .income;
        let rate = (federal.marginal_rate(final_income) + state_rate).clamp(0.0, 1.0);
        account.matched * rate
    } else {
        0.0
    };

    let final_nominal = account.tax_free + account.matched - match_tax;
    let final_real_value = final_nominal / params.horizon_deflator();

    log::debug!(
        "tax-advantaged projection: years={investment_years} final_real={final_real_value:.2} contributions={total_contributions:.2} match_tax={match_tax:.2}"
    );

    TaxAdvantagedProjection {
        final_real_value,
        annual_real_values,
        total_contributions,
        final_tax: match_tax,
        years,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tax::federal_brackets_2023;

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

    fn oracle_params() -> ScenarioParameters {
        ScenarioParameters {
            current_age: 30,
            retirement_age: 32,
            annual_income: 1_000.0,
            contribution_rate: 0.10,
            salary_growth: 0.0,
            inflation_rate: 0.0,
            tax_advantaged_return: 0.10,
            tax_advantaged_fee: 0.0,
            employer_match_rate: 0.0,
            ..ScenarioParameters::default()
        }
    }

    fn reference_scenario() -> ScenarioParameters {
        ScenarioParameters {
            current_age: 22,
            retirement_age: 65,
            annual_income: 100_000.0,
            contribution_rate: 0.10,
            salary_growth: 0.04,
            inflation_rate: 0.03,
            tax_advantaged_return: 0.10,
            tax_advantaged_fee: 0.003,
            employer_match_rate: 0.0,
            ..ScenarioParameters::default()
        }
    }

    #[test]
    fn oracle_two_year_compounding_matches_hand_calculation() {
        // (100 * 1.1 + 100) * 1.1 = 231
        let result = project_tax_advantaged(&oracle_params(), &federal());
        assert_eq!(result.annual_real_values.len(), 2);
        assert_approx(result.annual_real_values[0], 110.0);
        assert_approx(result.annual_real_values[1], 231.0);
        assert_approx(result.final_real_value, 231.0);
        assert_approx(result.total_contributions, 200.0);
        assert_approx(result.final_tax, 0.0);
    }

    #[test]
    fn oracle_match_is_capped_and_taxed_at_final_marginal_rate() {
        let mut params = oracle_params();
        params.employer_match_rate = 0.5;
        params.employer_match_limit = 0.06;

        // match = min(100, 60) * 0.5 = 30; (30 * 1.1 + 30) * 1.1 = 69.3
        // taxed at the 10% bracket: 6.93
        let result = project_tax_advantaged(&params, &federal());
        let last = result.years.last().expect("two years");
        assert_approx(result.years[0].employer_match, 30.0);
        assert_approx(last.matched_balance, 69.3);
        assert_approx(last.tax_free_balance, 231.0);
        assert_approx(result.final_tax, 6.93);
        assert_approx(result.final_real_value, 231.0 + 69.3 - 6.93);
    }

    #[test]
    fn state_overlay_raises_match_tax() {
        let mut params = oracle_params();
        params.employer_match_rate = 0.5;
        params.employer_match_limit = 0.06;
        params.state_tax_rate = Some(0.05);

        let result = project_tax_advantaged(&params, &federal());
        assert_approx(result.final_tax, 69.3 * 0.15);
        assert_approx(result.years[0].true_marginal_rate, 0.15);
    }

    #[test]
    fn oracle_inflation_deflates_each_year_independently() {
        let mut params = oracle_params();
        params.inflation_rate = 0.10;
        params.salary_growth = 0.10;

        // real salary growth is 0, so the nominal contribution grows with inflation
        let result = project_tax_advantaged(&params, &federal());
        assert_approx(result.years[1].contribution, 110.0);
        assert_approx(result.annual_real_values[0], 110.0 / 1.1);
        // (110 + 110) * 1.1 = 242 nominal
        assert_approx(result.annual_real_values[1], 242.0 / 1.21);
        assert_approx(result.final_real_value, 242.0 / 1.21);
    }

    #[test]
    fn forty_three_year_scenario_matches_closed_form() {
        let params = reference_scenario();
        let result = project_tax_advantaged(&params, &federal());

        assert_eq!(result.annual_real_values.len(), 43);
        for pair in result.annual_real_values.windows(2) {
            assert!(pair[1] > pair[0], "real values must strictly increase");
        }

        let growth: f64 = 1.0 + 0.10 - 0.003;
        let mut expected_nominal = 0.0;
        for year in 0..43 {
            let contribution = 10_000.0 * 1.04_f64.powi(year);
            expected_nominal += contribution * growth.powi(43 - year);
        }
        let expected_real = expected_nominal / 1.03_f64.powi(43);
        let relative = (result.final_real_value - expected_real).abs() / expected_real;
        assert!(relative < 1e-9, "expected {expected_real}, got {}", result.final_real_value);
    }

    #[test]
    fn employer_match_increases_final_value_but_stays_below_roth_component() {
        let base = reference_scenario();
        let mut matched = base.clone();
        matched.employer_match_rate = 0.03;
        matched.employer_match_limit = 0.06;

        let without = project_tax_advantaged(&base, &federal());
        let with = project_tax_advantaged(&matched, &federal());

        assert!(with.final_real_value > without.final_real_value);
        let last = with.years.last().expect("43 years");
        assert!(last.matched_balance > 0.0);
        assert!(last.matched_balance < last.tax_free_balance);
        assert!(with.final_tax > 0.0);
    }

    #[test]
    fn zero_match_rate_skips_match_tax() {
        let result = project_tax_advantaged(&reference_scenario(), &federal());
        assert_eq!(result.final_tax, 0.0);
        assert!(result.years.iter().all(|y| y.matched_balance == 0.0));
    }

    #[test]
    fn reruns_are_bit_identical() {
        let params = reference_scenario();
        let a = project_tax_advantaged(&params, &federal());
        let b = project_tax_advantaged(&params, &federal());
        assert_eq!(a, b);
    }
}
