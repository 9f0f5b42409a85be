use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::{
    ConfidenceInterval, ContributionLimitPolicy, InMemoryStateTaxTable, MarketCycleYear,
    PercentileBand, ProjectionEngine, RiskMetrics, ScenarioParameters, SensitivityParameter,
    SensitivityPoint, SimulationResult, SimulationSettings, StateTaxProvider, Strategy,
    StrategyComparison, WithdrawalOutcome, risk_metrics,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    annual_income: Option<f64>,
    contribution_rate: Option<f64>,
    salary_growth: Option<f64>,
    inflation_rate: Option<f64>,

    tax_advantaged_return: Option<f64>,
    tax_advantaged_fee: Option<f64>,
    passive_return: Option<f64>,
    passive_fee: Option<f64>,
    active_return: Option<f64>,
    active_fee: Option<f64>,
    passive_allocation: Option<f64>,

    passive_dividend_yield: Option<f64>,
    active_dividend_yield: Option<f64>,
    dividend_tax_rate: Option<f64>,
    short_term_gains_rate: Option<f64>,
    long_term_gains_rate: Option<f64>,
    active_turnover: Option<f64>,
    active_short_term_share: Option<f64>,
    rebalance_threshold: Option<f64>,

    employer_match_rate: Option<f64>,
    employer_match_limit: Option<f64>,
    state: Option<String>,
    state_tax_rate: Option<f64>,
    liquidation_percent: Option<f64>,
    plan_year: Option<u16>,

    simulations: Option<u32>,
    seed: Option<u64>,
    degrees_of_freedom: Option<f64>,
    tax_advantaged_volatility: Option<f64>,
    passive_volatility: Option<f64>,
    active_volatility: Option<f64>,
    risk_free_rate: Option<f64>,
    /// Comma-separated percents, e.g. "3,4,5".
    withdrawal_rates: Option<String>,
    withdrawal_years: Option<u32>,
    withdrawal_return_std: Option<f64>,

    parameter: Option<SensitivityParameter>,
    /// Comma-separated percents for the sensitivity sweep.
    values: Option<String>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nestegg",
    about = "Tax-advantaged vs self-managed retirement projection with Monte Carlo risk analysis"
)]
struct Cli {
    #[arg(long, default_value_t = 22)]
    current_age: u32,
    #[arg(long, default_value_t = 65)]
    retirement_age: u32,
    #[arg(long, default_value_t = 100_000.0, help = "Gross annual income today")]
    annual_income: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Share of income contributed each year in percent"
    )]
    contribution_rate: f64,
    #[arg(long, default_value_t = 4.0, help = "Nominal annual salary growth in percent")]
    salary_growth: f64,
    #[arg(long, default_value_t = 3.0, help = "Annual inflation in percent")]
    inflation_rate: f64,

    #[arg(long, default_value_t = 10.0, help = "Tax-advantaged account return in percent")]
    tax_advantaged_return: f64,
    #[arg(long, default_value_t = 0.5, help = "Tax-advantaged account fee in percent")]
    tax_advantaged_fee: f64,
    #[arg(long, default_value_t = 10.0, help = "Passive pool return in percent")]
    passive_return: f64,
    #[arg(long, default_value_t = 0.1, help = "Passive pool fee in percent")]
    passive_fee: f64,
    #[arg(long, default_value_t = 12.0, help = "Active pool return in percent")]
    active_return: f64,
    #[arg(long, default_value_t = 0.2, help = "Active pool fee in percent")]
    active_fee: f64,
    #[arg(
        long,
        default_value_t = 80.0,
        help = "Passive share of the self-managed portfolio in percent"
    )]
    passive_allocation: f64,

    #[arg(long, default_value_t = 1.5, help = "Passive dividend yield in percent")]
    passive_dividend_yield: f64,
    #[arg(long, default_value_t = 2.0, help = "Active dividend yield in percent")]
    active_dividend_yield: f64,
    #[arg(long, default_value_t = 15.0, help = "Dividend tax rate in percent")]
    dividend_tax_rate: f64,
    #[arg(long, default_value_t = 24.0, help = "Short-term capital gains rate in percent")]
    short_term_gains_rate: f64,
    #[arg(long, default_value_t = 15.0, help = "Long-term capital gains rate in percent")]
    long_term_gains_rate: f64,
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Share of active unrealized gains realized each year in percent"
    )]
    active_turnover: f64,
    #[arg(
        long,
        default_value_t = 60.0,
        help = "Share of active realizations taxed as short-term in percent"
    )]
    active_short_term_share: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Allocation drift that triggers a rebalance in percentage points"
    )]
    rebalance_threshold: f64,

    #[arg(long, default_value_t = 0.0, help = "Employer match rate in percent")]
    employer_match_rate: f64,
    #[arg(
        long,
        default_value_t = 6.0,
        help = "Salary share eligible for the employer match in percent"
    )]
    employer_match_limit: f64,
    #[arg(long, help = "Region name looked up in the state tax table")]
    state: Option<String>,
    #[arg(long, help = "State tax overlay in percent; overrides --state")]
    state_tax_rate: Option<f64>,
    #[arg(long, help = "JSON state tax table used to resolve --state in reports")]
    state_table: Option<String>,
    #[arg(
        long,
        default_value_t = 100.0,
        help = "Share of unrealized gains liquidated at retirement in percent"
    )]
    liquidation_percent: f64,
    #[arg(long, default_value_t = 2024, help = "Contribution-limit plan year")]
    plan_year: u16,

    #[arg(long, default_value_t = 1_000)]
    simulations: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 5.0, help = "Student-t degrees of freedom")]
    degrees_of_freedom: f64,
    #[arg(long, default_value_t = 15.0, help = "Tax-advantaged return volatility in percent")]
    tax_advantaged_volatility: f64,
    #[arg(long, default_value_t = 15.0, help = "Passive return volatility in percent")]
    passive_volatility: f64,
    #[arg(long, default_value_t = 25.0, help = "Active return volatility in percent")]
    active_volatility: f64,
    #[arg(long, default_value_t = 3.0, help = "Risk-free rate in percent")]
    risk_free_rate: f64,
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [3.0, 4.0, 5.0],
        help = "Initial withdrawal rates in percent"
    )]
    withdrawal_rates: Vec<f64>,
    #[arg(long, default_value_t = 30)]
    withdrawal_years: u32,
    #[arg(
        long,
        default_value_t = 12.0,
        help = "Retirement return standard deviation in percent"
    )]
    withdrawal_return_std: f64,
}

#[derive(Clone)]
struct AppState {
    states: Arc<dyn StateTaxProvider + Send + Sync>,
}

struct ApiRequest {
    engine: ProjectionEngine,
    sensitivity: Option<SensitivityRequest>,
}

struct SensitivityRequest {
    parameter: SensitivityParameter,
    values: Option<Vec<f64>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    contribution_rate: f64,
    contribution_limit: f64,
    state_tax_rate: Option<f64>,
    comparison: StrategyComparison,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationSummary {
    strategy: Strategy,
    paths: usize,
    mean_final_value: f64,
    total_contributions: f64,
    final_value_interval: ConfidenceInterval,
    bands: Vec<PercentileBand>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    tax_advantaged: SimulationSummary,
    self_managed: SimulationSummary,
    risk_metrics: RiskMetrics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalResponse {
    starting_balance: f64,
    outcomes: Vec<WithdrawalOutcome>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketCyclesResponse {
    years: Vec<MarketCycleYear>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SensitivityResponse {
    parameter: SensitivityParameter,
    points: Vec<SensitivityPoint>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse {
    project: ProjectResponse,
    simulation: SimulateResponse,
    withdrawal: WithdrawalResponse,
    sensitivity: Vec<SensitivityResponse>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn percent(flag: &str, value: f64) -> Result<f64, String> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(format!("{flag} must be between 0 and 100"));
    }
    Ok(value / 100.0)
}

fn rate(flag: &str, value: f64) -> Result<f64, String> {
    if !value.is_finite() || value <= -100.0 {
        return Err(format!("{flag} must be a number > -100"));
    }
    Ok(value / 100.0)
}

fn parse_percent_list(flag: &str, raw: &str) -> Result<Vec<f64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| format!("{flag} must be a comma-separated list of percents"))
        })
        .collect()
}

fn resolve_state_rate(cli: &Cli, states: &dyn StateTaxProvider) -> Result<Option<f64>, String> {
    if let Some(rate) = cli.state_tax_rate {
        return percent("--state-tax-rate", rate).map(Some);
    }
    match cli.state.as_deref() {
        Some(region) => states
            .lookup(region)
            .map(|info| Some(info.overlay_rate()))
            .ok_or_else(|| format!("--state {region} is not in the state tax table")),
        None => Ok(None),
    }
}

fn build_parameters(cli: &Cli, states: &dyn StateTaxProvider) -> Result<ScenarioParameters, String> {
    if cli.retirement_age <= cli.current_age {
        return Err("--retirement-age must be > --current-age".to_string());
    }

    if !cli.annual_income.is_finite() || cli.annual_income <= 0.0 {
        return Err("--annual-income must be > 0".to_string());
    }

    let Some(contribution_limits) = ContributionLimitPolicy::for_plan_year(cli.plan_year) else {
        return Err("--plan-year must be 2024 or 2025".to_string());
    };

    let mut contribution_rate = percent("--contribution-rate", cli.contribution_rate)?;
    let limit = contribution_limits.limit_for_age(cli.current_age);
    if cli.annual_income * contribution_rate > limit {
        log::warn!(
            "contribution {:.2} exceeds the {} limit {limit:.2} at age {}; capping",
            cli.annual_income * contribution_rate,
            cli.plan_year,
            cli.current_age
        );
        contribution_rate = limit / cli.annual_income;
    }
    percent("--liquidation-percent", cli.liquidation_percent)?;

    Ok(ScenarioParameters {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        annual_income: cli.annual_income,
        contribution_rate,
        salary_growth: rate("--salary-growth", cli.salary_growth)?,
        inflation_rate: rate("--inflation-rate", cli.inflation_rate)?,
        tax_advantaged_return: rate("--tax-advantaged-return", cli.tax_advantaged_return)?,
        tax_advantaged_fee: percent("--tax-advantaged-fee", cli.tax_advantaged_fee)?,
        passive_return: rate("--passive-return", cli.passive_return)?,
        passive_fee: percent("--passive-fee", cli.passive_fee)?,
        active_return: rate("--active-return", cli.active_return)?,
        active_fee: percent("--active-fee", cli.active_fee)?,
        passive_ratio: percent("--passive-allocation", cli.passive_allocation)?,
        passive_dividend_yield: percent("--passive-dividend-yield", cli.passive_dividend_yield)?,
        active_dividend_yield: percent("--active-dividend-yield", cli.active_dividend_yield)?,
        dividend_tax_rate: percent("--dividend-tax-rate", cli.dividend_tax_rate)?,
        short_term_gains_rate: percent("--short-term-gains-rate", cli.short_term_gains_rate)?,
        long_term_gains_rate: percent("--long-term-gains-rate", cli.long_term_gains_rate)?,
        active_turnover_rate: percent("--active-turnover", cli.active_turnover)?,
        active_short_term_share: percent(
            "--active-short-term-share",
            cli.active_short_term_share,
        )?,
        rebalance_threshold: percent("--rebalance-threshold", cli.rebalance_threshold)?,
        employer_match_rate: percent("--employer-match-rate", cli.employer_match_rate)?,
        employer_match_limit: percent("--employer-match-limit", cli.employer_match_limit)?,
        state_tax_rate: resolve_state_rate(cli, states)?,
        liquidation_percent: cli.liquidation_percent,
        contribution_limits,
        ..ScenarioParameters::default()
    })
}

fn build_settings(cli: &Cli) -> Result<SimulationSettings, String> {
    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }

    if !cli.degrees_of_freedom.is_finite() || cli.degrees_of_freedom <= 0.0 {
        return Err("--degrees-of-freedom must be > 0".to_string());
    }

    if cli.withdrawal_years == 0 {
        return Err("--withdrawal-years must be > 0".to_string());
    }

    let withdrawal_rates = cli
        .withdrawal_rates
        .iter()
        .map(|r| percent("--withdrawal-rates", *r))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SimulationSettings {
        paths: cli.simulations,
        seed: cli.seed,
        degrees_of_freedom: cli.degrees_of_freedom,
        tax_advantaged_volatility: percent(
            "--tax-advantaged-volatility",
            cli.tax_advantaged_volatility,
        )?,
        passive_volatility: percent("--passive-volatility", cli.passive_volatility)?,
        active_volatility: percent("--active-volatility", cli.active_volatility)?,
        risk_free_rate: rate("--risk-free-rate", cli.risk_free_rate)?,
        withdrawal_rates,
        withdrawal_years: cli.withdrawal_years,
        withdrawal_return_std: percent("--withdrawal-return-std", cli.withdrawal_return_std)?,
        ..SimulationSettings::default()
    })
}

fn build_engine(cli: &Cli, states: &dyn StateTaxProvider) -> Result<ProjectionEngine, String> {
    let params = build_parameters(cli, states)?;
    let settings = build_settings(cli)?;
    ProjectionEngine::new(params, settings).map_err(|e| e.to_string())
}

pub fn load_state_table(path: &str) -> Result<InMemoryStateTaxTable, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read state tax table {path}: {e}"))?;
    InMemoryStateTaxTable::from_json_str(&json)
        .map_err(|e| format!("invalid state tax table {path}: {e}"))
}

pub async fn run_http_server<P>(port: u16, states: P) -> std::io::Result<()>
where
    P: StateTaxProvider + Send + Sync + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = AppState {
        states: Arc::new(states),
    };
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/withdrawal",
            get(withdrawal_get_handler).post(withdrawal_post_handler),
        )
        .route(
            "/api/market-cycles",
            get(market_cycles_get_handler).post(market_cycles_post_handler),
        )
        .route(
            "/api/sensitivity",
            get(sensitivity_get_handler).post(sensitivity_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    log::info!("nestegg HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

/// Parses CLI-style arguments (the first is the program name) and renders
/// the full JSON report.
pub fn run_report<I, T>(args: I, states: &dyn StateTaxProvider) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;
    let loaded = cli.state_table.as_deref().map(load_state_table).transpose()?;
    let states: &dyn StateTaxProvider = match &loaded {
        Some(table) => table,
        None => states,
    };
    let engine = build_engine(&cli, states)?;
    let report = build_report(&engine)?;
    serde_json::to_string_pretty(&report).map_err(|e| format!("failed to encode report: {e}"))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(
    State(app): State<AppState>,
    Query(payload): Query<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).map(|r| build_project_response(&r.engine)))
}

async fn project_post_handler(
    State(app): State<AppState>,
    Json(payload): Json<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).map(|r| build_project_response(&r.engine)))
}

async fn simulate_get_handler(
    State(app): State<AppState>,
    Query(payload): Query<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_simulate_response(&r.engine)))
}

async fn simulate_post_handler(
    State(app): State<AppState>,
    Json(payload): Json<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_simulate_response(&r.engine)))
}

async fn withdrawal_get_handler(
    State(app): State<AppState>,
    Query(payload): Query<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_withdrawal_response(&r.engine)))
}

async fn withdrawal_post_handler(
    State(app): State<AppState>,
    Json(payload): Json<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_withdrawal_response(&r.engine)))
}

async fn market_cycles_get_handler(
    State(app): State<AppState>,
    Query(payload): Query<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_market_cycles_response(&r.engine)))
}

async fn market_cycles_post_handler(
    State(app): State<AppState>,
    Json(payload): Json<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_market_cycles_response(&r.engine)))
}

async fn sensitivity_get_handler(
    State(app): State<AppState>,
    Query(payload): Query<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_sensitivity_for_request(&r)))
}

async fn sensitivity_post_handler(
    State(app): State<AppState>,
    Json(payload): Json<ScenarioPayload>,
) -> Response {
    respond(api_request(&app, payload).and_then(|r| build_sensitivity_for_request(&r)))
}

fn respond<T: Serialize>(result: Result<T, String>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn api_request(app: &AppState, payload: ScenarioPayload) -> Result<ApiRequest, String> {
    api_request_from_payload(payload, app.states.as_ref())
}

#[cfg(test)]
fn api_request_from_json(json: &str, states: &dyn StateTaxProvider) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ScenarioPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload, states)
}

fn api_request_from_payload(
    payload: ScenarioPayload,
    states: &dyn StateTaxProvider,
) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.annual_income {
        cli.annual_income = v;
    }
    if let Some(v) = payload.contribution_rate {
        cli.contribution_rate = v;
    }
    if let Some(v) = payload.salary_growth {
        cli.salary_growth = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }

    if let Some(v) = payload.tax_advantaged_return {
        cli.tax_advantaged_return = v;
    }
    if let Some(v) = payload.tax_advantaged_fee {
        cli.tax_advantaged_fee = v;
    }
    if let Some(v) = payload.passive_return {
        cli.passive_return = v;
    }
    if let Some(v) = payload.passive_fee {
        cli.passive_fee = v;
    }
    if let Some(v) = payload.active_return {
        cli.active_return = v;
    }
    if let Some(v) = payload.active_fee {
        cli.active_fee = v;
    }
    if let Some(v) = payload.passive_allocation {
        cli.passive_allocation = v;
    }

    if let Some(v) = payload.passive_dividend_yield {
        cli.passive_dividend_yield = v;
    }
    if let Some(v) = payload.active_dividend_yield {
        cli.active_dividend_yield = v;
    }
    if let Some(v) = payload.dividend_tax_rate {
        cli.dividend_tax_rate = v;
    }
    if let Some(v) = payload.short_term_gains_rate {
        cli.short_term_gains_rate = v;
    }
    if let Some(v) = payload.long_term_gains_rate {
        cli.long_term_gains_rate = v;
    }
    if let Some(v) = payload.active_turnover {
        cli.active_turnover = v;
    }
    if let Some(v) = payload.active_short_term_share {
        cli.active_short_term_share = v;
    }
    if let Some(v) = payload.rebalance_threshold {
        cli.rebalance_threshold = v;
    }

    if let Some(v) = payload.employer_match_rate {
        cli.employer_match_rate = v;
    }
    if let Some(v) = payload.employer_match_limit {
        cli.employer_match_limit = v;
    }
    if let Some(v) = payload.state {
        cli.state = Some(v);
    }
    if let Some(v) = payload.state_tax_rate {
        cli.state_tax_rate = Some(v);
    }
    if let Some(v) = payload.liquidation_percent {
        cli.liquidation_percent = v;
    }
    if let Some(v) = payload.plan_year {
        cli.plan_year = v;
    }

    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.degrees_of_freedom {
        cli.degrees_of_freedom = v;
    }
    if let Some(v) = payload.tax_advantaged_volatility {
        cli.tax_advantaged_volatility = v;
    }
    if let Some(v) = payload.passive_volatility {
        cli.passive_volatility = v;
    }
    if let Some(v) = payload.active_volatility {
        cli.active_volatility = v;
    }
    if let Some(v) = payload.risk_free_rate {
        cli.risk_free_rate = v;
    }
    if let Some(v) = payload.withdrawal_rates {
        cli.withdrawal_rates = parse_percent_list("--withdrawal-rates", &v)?;
    }
    if let Some(v) = payload.withdrawal_years {
        cli.withdrawal_years = v;
    }
    if let Some(v) = payload.withdrawal_return_std {
        cli.withdrawal_return_std = v;
    }

    let values = payload
        .values
        .map(|raw| {
            parse_percent_list("--values", &raw)
                .map(|values| values.into_iter().map(|v| v / 100.0).collect::<Vec<_>>())
        })
        .transpose()?;
    let sensitivity = payload
        .parameter
        .map(|parameter| SensitivityRequest { parameter, values });

    let engine = build_engine(&cli, states)?;
    Ok(ApiRequest {
        engine,
        sensitivity,
    })
}

fn default_cli_for_api() -> Cli {
    Cli::parse_from(["nestegg"])
}

fn build_project_response(engine: &ProjectionEngine) -> ProjectResponse {
    let params = engine.parameters();
    ProjectResponse {
        contribution_rate: params.contribution_rate,
        contribution_limit: params.contribution_limits.limit_for_age(params.current_age),
        state_tax_rate: params.state_tax_rate,
        comparison: engine.compare(),
    }
}

fn summarize(engine: &ProjectionEngine, result: &SimulationResult) -> SimulationSummary {
    SimulationSummary {
        strategy: result.strategy,
        paths: result.final_value_samples.len(),
        mean_final_value: result.mean_final_value,
        total_contributions: result.total_contributions,
        final_value_interval: engine.final_value_interval(result),
        bands: engine.confidence_bands(result),
    }
}

fn build_simulate_response(engine: &ProjectionEngine) -> Result<SimulateResponse, String> {
    let tax_advantaged = engine
        .simulate_with_volatility(Strategy::TaxAdvantaged)
        .map_err(|e| e.to_string())?;
    let self_managed = engine
        .simulate_with_volatility(Strategy::SelfManaged)
        .map_err(|e| e.to_string())?;
    Ok(SimulateResponse {
        tax_advantaged: summarize(engine, &tax_advantaged),
        risk_metrics: risk_metrics(&self_managed, engine.settings().risk_free_rate),
        self_managed: summarize(engine, &self_managed),
    })
}

fn build_withdrawal_response(engine: &ProjectionEngine) -> Result<WithdrawalResponse, String> {
    let outcomes = engine
        .simulate_withdrawal_sustainability()
        .map_err(|e| e.to_string())?;
    let starting_balance = outcomes
        .first()
        .map(|o| o.starting_balance)
        .unwrap_or_else(|| engine.project_self_managed().final_real_value);
    Ok(WithdrawalResponse {
        starting_balance,
        outcomes,
    })
}

fn build_market_cycles_response(engine: &ProjectionEngine) -> Result<MarketCyclesResponse, String> {
    let years = engine.simulate_market_cycles().map_err(|e| e.to_string())?;
    Ok(MarketCyclesResponse { years })
}

fn build_sensitivity_response(
    engine: &ProjectionEngine,
    parameter: SensitivityParameter,
    values: Option<&[f64]>,
) -> Result<SensitivityResponse, String> {
    let defaults = parameter.default_values();
    let points = engine
        .sensitivity(parameter, values.unwrap_or(&defaults))
        .map_err(|e| e.to_string())?;
    Ok(SensitivityResponse { parameter, points })
}

fn build_sensitivity_for_request(request: &ApiRequest) -> Result<SensitivityResponse, String> {
    let Some(sensitivity) = &request.sensitivity else {
        return Err(
            "parameter must be one of active-return, active-turnover, active-allocation"
                .to_string(),
        );
    };
    build_sensitivity_response(
        &request.engine,
        sensitivity.parameter,
        sensitivity.values.as_deref(),
    )
}

fn build_report(engine: &ProjectionEngine) -> Result<ReportResponse, String> {
    let sensitivity = [
        SensitivityParameter::ActiveReturn,
        SensitivityParameter::ActiveTurnover,
        SensitivityParameter::ActiveAllocation,
    ]
    .into_iter()
    .map(|parameter| build_sensitivity_response(engine, parameter, None))
    .collect::<Result<Vec<_>, _>>()?;

    Ok(ReportResponse {
        project: build_project_response(engine),
        simulation: build_simulate_response(engine)?,
        withdrawal: build_withdrawal_response(engine)?,
        sensitivity,
    })
}
