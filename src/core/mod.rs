mod engine;
mod error;
mod limits;
mod market_cycles;
mod monte_carlo;
mod risk;
mod self_managed;
mod sensitivity;
mod state_tax;
mod stats;
mod tax;
mod tax_advantaged;
mod types;
mod withdrawal;

pub use engine::ProjectionEngine;
pub use error::{EngineError, EngineResult};
pub use limits::{CatchUpBand, ContributionLimitPolicy};
pub use market_cycles::{
    MarketCycleSimulator, MarketCycleYear, MarketRegime, RegimeProfile, standard_regimes,
};
pub use monte_carlo::{confidence_bands, final_value_interval, simulate_with_volatility};
pub use risk::{annualized_returns, risk_metrics};
pub use self_managed::{calculate_rebalancing_costs, project_self_managed};
pub use sensitivity::{SensitivityParameter, SensitivityPoint, sensitivity};
pub use state_tax::{InMemoryStateTaxTable, StateTaxInfo, StateTaxProvider};
pub use stats::percentile;
pub use tax::{
    CapitalGainsSchedule, NET_INVESTMENT_INCOME_SURTAX, NET_INVESTMENT_INCOME_THRESHOLD,
    ProgressiveTaxCalculator, TaxBracket, capital_gains_brackets_2023, federal_brackets_2023,
};
pub use tax_advantaged::project_tax_advantaged;
pub use types::{
    ConfidenceInterval, PercentileBand, ProjectedYear, ProjectionResult, RiskMetrics,
    ScenarioParameters, SelfManagedProjection, SelfManagedYear, SimulationResult,
    SimulationSettings, Strategy, StrategyComparison, TaxAdvantagedProjection, TaxAdvantagedYear,
    WithdrawalOutcome,
};
pub use withdrawal::simulate_withdrawal_sustainability;
