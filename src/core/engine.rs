use super::error::EngineResult;
use super::market_cycles::{MarketCycleSimulator, MarketCycleYear};
use super::monte_carlo::{self, Stream, path_rng};
use super::risk;
use super::self_managed;
use super::sensitivity::{self, SensitivityParameter, SensitivityPoint};
use super::tax::ProgressiveTaxCalculator;
use super::tax_advantaged;
use super::types::{
    ConfidenceInterval, PercentileBand, RiskMetrics, ScenarioParameters, SelfManagedProjection,
    SimulationResult, SimulationSettings, Strategy, StrategyComparison, TaxAdvantagedProjection,
    WithdrawalOutcome,
};
use super::withdrawal;

/// A validated scenario together with its stochastic settings.
///
/// Construction is the only place inputs are checked; every method after that
/// reads the same immutable configuration. A different scenario means a new
/// engine.
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    params: ScenarioParameters,
    settings: SimulationSettings,
    federal: ProgressiveTaxCalculator,
}

impl ProjectionEngine {
    pub fn new(params: ScenarioParameters, settings: SimulationSettings) -> EngineResult<Self> {
        params.validate()?;
        settings.validate()?;
        let federal = ProgressiveTaxCalculator::new(params.federal_brackets.clone())?;
        Ok(Self {
            params,
            settings,
            federal,
        })
    }

    /// New engine for `params` sharing this engine's simulation settings.
    pub fn with_parameters(&self, params: ScenarioParameters) -> EngineResult<Self> {
        Self::new(params, self.settings.clone())
    }

    pub fn parameters(&self) -> &ScenarioParameters {
        &self.params
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn federal(&self) -> &ProgressiveTaxCalculator {
        &self.federal
    }

    pub fn project_tax_advantaged(&self) -> TaxAdvantagedProjection {
        tax_advantaged::project_tax_advantaged(&self.params, &self.federal)
    }

    pub fn project_self_managed(&self) -> SelfManagedProjection {
        self_managed::project_self_managed(&self.params, &self.federal)
    }

    pub fn compare(&self) -> StrategyComparison {
        let tax_advantaged = self.project_tax_advantaged();
        let self_managed = self.project_self_managed();
        let relative_difference = (tax_advantaged.final_real_value != 0.0)
            .then(|| self_managed.final_real_value / tax_advantaged.final_real_value - 1.0);
        StrategyComparison {
            tax_advantaged,
            self_managed,
            relative_difference,
        }
    }

    pub fn simulate_with_volatility(&self, strategy: Strategy) -> EngineResult<SimulationResult> {
        monte_carlo::simulate_with_volatility(&self.params, &self.settings, strategy)
    }

    pub fn confidence_bands(&self, result: &SimulationResult) -> Vec<PercentileBand> {
        monte_carlo::confidence_bands(
            result,
            self.settings.lower_percentile,
            self.settings.upper_percentile,
        )
    }

    pub fn final_value_interval(&self, result: &SimulationResult) -> ConfidenceInterval {
        monte_carlo::final_value_interval(
            result,
            self.settings.lower_percentile,
            self.settings.upper_percentile,
        )
    }

    /// Risk summary of the self-managed portfolio's simulated returns.
    pub fn risk_metrics(&self) -> EngineResult<RiskMetrics> {
        let result = self.simulate_with_volatility(Strategy::SelfManaged)?;
        Ok(risk::risk_metrics(&result, self.settings.risk_free_rate))
    }

    /// Drawdown success per withdrawal rate, starting from a fresh
    /// self-managed projection of the current scenario.
    pub fn simulate_withdrawal_sustainability(&self) -> EngineResult<Vec<WithdrawalOutcome>> {
        let starting_balance = self.project_self_managed().final_real_value;
        withdrawal::simulate_withdrawal_sustainability(
            &self.params,
            &self.settings,
            starting_balance,
        )
    }

    pub fn simulate_market_cycles(&self) -> EngineResult<Vec<MarketCycleYear>> {
        let simulator = MarketCycleSimulator::standard()?;
        let mut rng = path_rng(self.settings.seed, Stream::MarketCycles, 0);
        Ok(simulator.simulate(
            self.params.investment_years(),
            self.params.inflation_rate,
            self.params.long_term_gains_rate,
            &mut rng,
        ))
    }

    pub fn sensitivity(
        &self,
        parameter: SensitivityParameter,
        values: &[f64],
    ) -> EngineResult<Vec<SensitivityPoint>> {
        sensitivity::sensitivity(&self.params, &self.federal, parameter, values)
    }

    pub fn calculate_rebalancing_costs(&self, passive_value: f64, active_value: f64) -> f64 {
        self_managed::calculate_rebalancing_costs(&self.params, passive_value, active_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;
    use crate::core::tax::TaxBracket;

    fn engine() -> ProjectionEngine {
        ProjectionEngine::new(ScenarioParameters::default(), SimulationSettings::default())
            .expect("defaults are valid")
    }

    fn quick_settings() -> SimulationSettings {
        SimulationSettings {
            paths: 100,
            ..SimulationSettings::default()
        }
    }

    #[test]
    fn invalid_configuration_aborts_construction() {
        let params = ScenarioParameters {
            retirement_age: 20,
            ..ScenarioParameters::default()
        };
        let err = ProjectionEngine::new(params, SimulationSettings::default())
            .expect_err("ages are inverted");
        assert!(matches!(err, EngineError::InvalidAgeRange { .. }));
        assert!(err.to_string().contains("retirement age"));
    }

    #[test]
    fn non_monotonic_bracket_table_is_rejected() {
        let params = ScenarioParameters {
            federal_brackets: vec![
                TaxBracket::new(0.0, 10_000.0, 0.20),
                TaxBracket::new(10_000.0, f64::INFINITY, 0.10),
            ],
            ..ScenarioParameters::default()
        };
        assert!(matches!(
            ProjectionEngine::new(params, SimulationSettings::default()),
            Err(EngineError::InvalidBracketTable { .. })
        ));
    }

    #[test]
    fn compare_reports_relative_difference() {
        let comparison = engine().compare();
        let expected = comparison.self_managed.final_real_value
            / comparison.tax_advantaged.final_real_value
            - 1.0;
        let relative = comparison.relative_difference.expect("non-zero baseline");
        assert!((relative - expected).abs() < 1e-12);
        // tax-free compounding beats the taxable portfolio at default assumptions
        assert!(relative < 0.0);
    }

    #[test]
    fn with_parameters_validates_the_new_scenario() {
        let base = engine();
        let params = ScenarioParameters {
            passive_ratio: 1.0,
            ..base.parameters().clone()
        };
        let passive_only = base.with_parameters(params).expect("valid");
        assert_eq!(passive_only.settings(), base.settings());
        assert!(
            passive_only
                .project_self_managed()
                .years
                .iter()
                .all(|y| y.trading_tax == 0.0)
        );

        let bad = ScenarioParameters {
            passive_ratio: -0.1,
            ..base.parameters().clone()
        };
        assert!(base.with_parameters(bad).is_err());
    }

    #[test]
    fn withdrawal_outcomes_cover_every_configured_rate() {
        let engine = ProjectionEngine::new(ScenarioParameters::default(), quick_settings())
            .expect("valid");
        let outcomes = engine.simulate_withdrawal_sustainability().expect("valid");
        let start = engine.project_self_managed().final_real_value;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.starting_balance == start));
        assert!(
            outcomes
                .iter()
                .all(|o| (0.0..=1.0).contains(&o.success_probability))
        );
    }

    #[test]
    fn risk_metrics_and_bands_come_from_the_same_seeded_run() {
        let engine = ProjectionEngine::new(ScenarioParameters::default(), quick_settings())
            .expect("valid");
        let a = engine.risk_metrics().expect("valid");
        let b = engine.risk_metrics().expect("valid");
        assert_eq!(a, b);
        assert!(a.volatility > 0.0);
        assert!(a.var_95 <= a.mean_return);

        let result = engine
            .simulate_with_volatility(Strategy::TaxAdvantaged)
            .expect("valid");
        let bands = engine.confidence_bands(&result);
        assert_eq!(bands.len(), 43);
        let interval = engine.final_value_interval(&result);
        assert!(interval.lower <= result.mean_final_value * 1.5);
        assert!(interval.lower < interval.upper);
    }

    #[test]
    fn market_cycles_span_the_investment_horizon() {
        let years = engine().simulate_market_cycles().expect("standard regimes");
        assert_eq!(years.len(), 43);
        assert_eq!(years, engine().simulate_market_cycles().expect("standard regimes"));
    }

    #[test]
    fn rebalancing_cost_uses_scenario_target() {
        let engine = engine();
        assert_eq!(engine.calculate_rebalancing_costs(80.0, 20.0), 0.0);
        assert!(engine.calculate_rebalancing_costs(50.0, 50.0) > 0.0);
    }

    #[test]
    fn sensitivity_runs_through_engine() {
        let parameter = SensitivityParameter::ActiveAllocation;
        let points = engine()
            .sensitivity(parameter, &parameter.default_values())
            .expect("valid sweep");
        assert_eq!(points.len(), 5);
        let base = engine().project_self_managed().final_real_value;
        assert!((points[1].final_real_value - base).abs() < 1e-6);
    }
}
