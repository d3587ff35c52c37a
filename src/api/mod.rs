use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AnnuityTiming, FormulaPolicies, MAX_SIMULATED_AGE, ParameterInput, ParameterSet, RuinDisplay,
    Strategy, SwrPolicy, TdbReport, TrajectoryHorizon, WithdrawalTiming, compute,
};

const CURRENCY_SYMBOLS: [&str; 3] = ["$", "€", "£"];

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSwrPolicy {
    Tiered,
    Fixed,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliAnnuityTiming {
    Due,
    Ordinary,
}

impl From<CliAnnuityTiming> for AnnuityTiming {
    fn from(value: CliAnnuityTiming) -> Self {
        match value {
            CliAnnuityTiming::Due => AnnuityTiming::Due,
            CliAnnuityTiming::Ordinary => AnnuityTiming::Ordinary,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalTiming {
    WithdrawThenGrow,
    GrowThenWithdraw,
}

impl From<CliWithdrawalTiming> for WithdrawalTiming {
    fn from(value: CliWithdrawalTiming) -> Self {
        match value {
            CliWithdrawalTiming::WithdrawThenGrow => WithdrawalTiming::WithdrawThenGrow,
            CliWithdrawalTiming::GrowThenWithdraw => WithdrawalTiming::GrowThenWithdraw,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRuinDisplay {
    AllowNegative,
    ClampAtZero,
}

impl From<CliRuinDisplay> for RuinDisplay {
    fn from(value: CliRuinDisplay) -> Self {
        match value {
            CliRuinDisplay::AllowNegative => RuinDisplay::AllowNegative,
            CliRuinDisplay::ClampAtZero => RuinDisplay::ClampAtZero,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSwrPolicy {
    #[serde(alias = "three-tier", alias = "threeTier")]
    Tiered,
    #[serde(alias = "flat")]
    Fixed,
}

impl From<ApiSwrPolicy> for CliSwrPolicy {
    fn from(value: ApiSwrPolicy) -> Self {
        match value {
            ApiSwrPolicy::Tiered => CliSwrPolicy::Tiered,
            ApiSwrPolicy::Fixed => CliSwrPolicy::Fixed,
        }
    }
}

impl From<SwrPolicy> for ApiSwrPolicy {
    fn from(value: SwrPolicy) -> Self {
        match value {
            SwrPolicy::Tiered => ApiSwrPolicy::Tiered,
            SwrPolicy::Fixed { .. } => ApiSwrPolicy::Fixed,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiAnnuityTiming {
    #[serde(alias = "annuity-due", alias = "annuityDue")]
    Due,
    #[serde(alias = "ordinary-annuity", alias = "ordinaryAnnuity")]
    Ordinary,
}

impl From<ApiAnnuityTiming> for CliAnnuityTiming {
    fn from(value: ApiAnnuityTiming) -> Self {
        match value {
            ApiAnnuityTiming::Due => CliAnnuityTiming::Due,
            ApiAnnuityTiming::Ordinary => CliAnnuityTiming::Ordinary,
        }
    }
}

impl From<AnnuityTiming> for ApiAnnuityTiming {
    fn from(value: AnnuityTiming) -> Self {
        match value {
            AnnuityTiming::Due => ApiAnnuityTiming::Due,
            AnnuityTiming::Ordinary => ApiAnnuityTiming::Ordinary,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalTiming {
    #[serde(alias = "withdrawThenGrow", alias = "withdraw_then_grow")]
    WithdrawThenGrow,
    #[serde(alias = "growThenWithdraw", alias = "grow_then_withdraw")]
    GrowThenWithdraw,
}

impl From<ApiWithdrawalTiming> for CliWithdrawalTiming {
    fn from(value: ApiWithdrawalTiming) -> Self {
        match value {
            ApiWithdrawalTiming::WithdrawThenGrow => CliWithdrawalTiming::WithdrawThenGrow,
            ApiWithdrawalTiming::GrowThenWithdraw => CliWithdrawalTiming::GrowThenWithdraw,
        }
    }
}

impl From<WithdrawalTiming> for ApiWithdrawalTiming {
    fn from(value: WithdrawalTiming) -> Self {
        match value {
            WithdrawalTiming::WithdrawThenGrow => ApiWithdrawalTiming::WithdrawThenGrow,
            WithdrawalTiming::GrowThenWithdraw => ApiWithdrawalTiming::GrowThenWithdraw,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRuinDisplay {
    #[serde(alias = "allowNegative", alias = "negative")]
    AllowNegative,
    #[serde(alias = "clampAtZero", alias = "clamp")]
    ClampAtZero,
}

impl From<ApiRuinDisplay> for CliRuinDisplay {
    fn from(value: ApiRuinDisplay) -> Self {
        match value {
            ApiRuinDisplay::AllowNegative => CliRuinDisplay::AllowNegative,
            ApiRuinDisplay::ClampAtZero => CliRuinDisplay::ClampAtZero,
        }
    }
}

impl From<RuinDisplay> for ApiRuinDisplay {
    fn from(value: RuinDisplay) -> Self {
        match value {
            RuinDisplay::AllowNegative => ApiRuinDisplay::AllowNegative,
            RuinDisplay::ClampAtZero => ApiRuinDisplay::ClampAtZero,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TdbPayload {
    current_age: Option<u32>,
    #[serde(alias = "retireAge")]
    retirement_age: Option<u32>,
    #[serde(alias = "deathAge")]
    depletion_age: Option<u32>,
    #[serde(alias = "currencySymbol")]
    currency: Option<String>,

    annual_spend: Option<f64>,
    annual_savings: Option<f64>,

    coast_growth_rate: Option<f64>,
    retirement_growth_rate: Option<f64>,
    safety_buffer: Option<f64>,
    #[serde(alias = "longevityInsuranceCost")]
    longevity_insurance: Option<f64>,

    swr_policy: Option<ApiSwrPolicy>,
    fixed_swr: Option<f64>,
    annuity_timing: Option<ApiAnnuityTiming>,
    withdrawal_timing: Option<ApiWithdrawalTiming>,
    ruin_display: Option<ApiRuinDisplay>,
    lookahead_years: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "tdb report",
    about = "Targeted Depletion Benchmark: capital to coast, spend down and finish at zero"
)]
struct Cli {
    #[arg(long, default_value_t = 22)]
    current_age: u32,
    #[arg(long, default_value_t = 40, help = "Age at which spending from the pot begins")]
    retirement_age: u32,
    #[arg(
        long,
        default_value_t = 105,
        help = "Age by which the pot should be spent down to zero"
    )]
    depletion_age: u32,
    #[arg(long, default_value = "€", help = "Display symbol: $, € or £")]
    currency: String,
    #[arg(
        long,
        default_value_t = 24_000.0,
        help = "Desired real annual spending in retirement"
    )]
    annual_spend: f64,
    #[arg(
        long,
        default_value_t = 12_000.0,
        help = "Current annual savings, used for the life-energy comparison"
    )]
    annual_savings: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Real annual growth before retirement in percent"
    )]
    coast_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Real annual growth during retirement in percent"
    )]
    retirement_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 1.15,
        help = "Multiplier against sequence-of-returns risk, between 1.0 and 1.5"
    )]
    safety_buffer: f64,
    #[arg(
        long,
        default_value_t = 50_000.0,
        help = "Flat reserve for a longevity annuity"
    )]
    longevity_insurance_cost: f64,
    #[arg(long, value_enum, default_value_t = CliSwrPolicy::Tiered)]
    swr_policy: CliSwrPolicy,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Safe withdrawal rate in percent when --swr-policy is fixed"
    )]
    fixed_swr: f64,
    #[arg(long, value_enum, default_value_t = CliAnnuityTiming::Due)]
    annuity_timing: CliAnnuityTiming,
    #[arg(long, value_enum, default_value_t = CliWithdrawalTiming::WithdrawThenGrow)]
    withdrawal_timing: CliWithdrawalTiming,
    #[arg(long, value_enum, default_value_t = CliRuinDisplay::AllowNegative)]
    ruin_display: CliRuinDisplay,
    #[arg(
        long,
        default_value_t = 4,
        help = "Extra ages simulated past the depletion age"
    )]
    lookahead_years: u32,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyEcho {
    swr_policy: ApiSwrPolicy,
    fixed_swr: Option<f64>,
    annuity_timing: ApiAnnuityTiming,
    withdrawal_timing: ApiWithdrawalTiming,
    ruin_display: ApiRuinDisplay,
    lookahead_years: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TdbResponse {
    policies: PolicyEcho,
    #[serde(flatten)]
    report: TdbReport,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: Cli) -> Result<ParameterSet, String> {
    if !(18..=90).contains(&cli.current_age) {
        return Err("--current-age must be between 18 and 90".to_string());
    }

    if cli.retirement_age <= cli.current_age {
        return Err("--retirement-age must be > --current-age".to_string());
    }

    if cli.retirement_age > 100 {
        return Err("--retirement-age must be <= 100".to_string());
    }

    if cli.depletion_age <= cli.retirement_age {
        return Err("--depletion-age must be > --retirement-age".to_string());
    }

    if cli.depletion_age > 120 {
        return Err("--depletion-age must be <= 120".to_string());
    }

    if !CURRENCY_SYMBOLS.contains(&cli.currency.as_str()) {
        return Err("--currency must be one of $, €, £".to_string());
    }

    if !(10_000.0..=1_000_000.0).contains(&cli.annual_spend) {
        return Err("--annual-spend must be between 10000 and 1000000".to_string());
    }

    if !(0.0..=500_000.0).contains(&cli.annual_savings) {
        return Err("--annual-savings must be between 0 and 500000".to_string());
    }

    if !(0.0..=15.0).contains(&cli.coast_growth_rate) {
        return Err("--coast-growth-rate must be between 0 and 15".to_string());
    }

    if !(0.0..=15.0).contains(&cli.retirement_growth_rate) {
        return Err("--retirement-growth-rate must be between 0 and 15".to_string());
    }

    if !(1.0..=1.5).contains(&cli.safety_buffer) {
        return Err("--safety-buffer must be between 1.0 and 1.5".to_string());
    }

    if !(0.0..=200_000.0).contains(&cli.longevity_insurance_cost) {
        return Err("--longevity-insurance-cost must be between 0 and 200000".to_string());
    }

    if cli.swr_policy == CliSwrPolicy::Fixed && !(cli.fixed_swr > 0.0 && cli.fixed_swr <= 100.0) {
        return Err("--fixed-swr must be > 0 and <= 100".to_string());
    }

    if cli.depletion_age.saturating_add(cli.lookahead_years) > MAX_SIMULATED_AGE {
        return Err(format!(
            "--depletion-age plus --lookahead-years must be <= {MAX_SIMULATED_AGE}"
        ));
    }

    let swr = match cli.swr_policy {
        CliSwrPolicy::Tiered => SwrPolicy::Tiered,
        CliSwrPolicy::Fixed => SwrPolicy::Fixed {
            rate: cli.fixed_swr / 100.0,
        },
    };
    let horizon = if cli.lookahead_years == 0 {
        TrajectoryHorizon::ToDepletion
    } else {
        TrajectoryHorizon::Lookahead {
            years: cli.lookahead_years,
        }
    };

    ParameterSet::new(ParameterInput {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        depletion_age: cli.depletion_age,
        annual_spend: cli.annual_spend,
        annual_savings: cli.annual_savings,
        coast_growth_rate: cli.coast_growth_rate / 100.0,
        retirement_growth_rate: cli.retirement_growth_rate / 100.0,
        safety_buffer: cli.safety_buffer,
        longevity_insurance_cost: cli.longevity_insurance_cost,
        currency_symbol: cli.currency,
        policies: FormulaPolicies {
            swr,
            annuity_timing: cli.annuity_timing.into(),
            withdrawal_timing: cli.withdrawal_timing.into(),
            ruin_display: cli.ruin_display.into(),
            horizon,
        },
    })
    .map_err(|e| e.to_string())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/tdb", get(tdb_get_handler).post(tdb_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "TDB HTTP API listening");
    info!("Local access: http://127.0.0.1:{port}/api/tdb");

    axum::serve(listener, app).await
}

/// Runs the one-shot `report` command and returns what should be printed.
pub fn run_report<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => return Ok(e.to_string()),
        Err(e) => return Err(e.to_string()),
    };
    let format = cli.format;
    let params = build_inputs(cli)?;
    let report = compute(&params).map_err(|e| e.to_string())?;

    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&build_tdb_response(&params, report))
            .map_err(|e| format!("failed to serialize report: {e}")),
        OutputFormat::Text => Ok(render_text_summary(&params, &report)),
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn tdb_get_handler(Query(payload): Query<TdbPayload>) -> Response {
    tdb_response(payload)
}

async fn tdb_post_handler(Json(payload): Json<TdbPayload>) -> Response {
    tdb_response(payload)
}

fn tdb_response(payload: TdbPayload) -> Response {
    let params = match params_from_payload(payload) {
        Ok(params) => params,
        Err(msg) => {
            warn!(error = %msg, "rejected TDB request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match compute(&params) {
        Ok(report) => json_response(StatusCode::OK, build_tdb_response(&params, report)),
        Err(e) => {
            warn!(error = %e, "TDB computation failed");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
        }
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

#[cfg(test)]
fn params_from_json(json: &str) -> Result<ParameterSet, String> {
    let payload = serde_json::from_str::<TdbPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    params_from_payload(payload)
}

fn params_from_payload(payload: TdbPayload) -> Result<ParameterSet, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.depletion_age {
        cli.depletion_age = v;
    }
    if let Some(v) = payload.currency {
        cli.currency = v;
    }

    if let Some(v) = payload.annual_spend {
        cli.annual_spend = v;
    }
    if let Some(v) = payload.annual_savings {
        cli.annual_savings = v;
    }

    if let Some(v) = payload.coast_growth_rate {
        cli.coast_growth_rate = v;
    }
    if let Some(v) = payload.retirement_growth_rate {
        cli.retirement_growth_rate = v;
    }
    if let Some(v) = payload.safety_buffer {
        cli.safety_buffer = v;
    }
    if let Some(v) = payload.longevity_insurance {
        cli.longevity_insurance_cost = v;
    }

    if let Some(v) = payload.swr_policy {
        cli.swr_policy = v.into();
    }
    if let Some(v) = payload.fixed_swr {
        cli.fixed_swr = v;
    }
    if let Some(v) = payload.annuity_timing {
        cli.annuity_timing = v.into();
    }
    if let Some(v) = payload.withdrawal_timing {
        cli.withdrawal_timing = v.into();
    }
    if let Some(v) = payload.ruin_display {
        cli.ruin_display = v.into();
    }
    if let Some(v) = payload.lookahead_years {
        cli.lookahead_years = v;
    }

    build_inputs(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 22,
        retirement_age: 40,
        depletion_age: 105,
        currency: "€".to_string(),
        annual_spend: 24_000.0,
        annual_savings: 12_000.0,
        coast_growth_rate: 7.0,
        retirement_growth_rate: 4.0,
        safety_buffer: 1.15,
        longevity_insurance_cost: 50_000.0,
        swr_policy: CliSwrPolicy::Tiered,
        fixed_swr: 4.0,
        annuity_timing: CliAnnuityTiming::Due,
        withdrawal_timing: CliWithdrawalTiming::WithdrawThenGrow,
        ruin_display: CliRuinDisplay::AllowNegative,
        lookahead_years: 4,
        format: OutputFormat::Json,
    }
}

fn build_tdb_response(params: &ParameterSet, report: TdbReport) -> TdbResponse {
    let policies = params.policies();
    let fixed_swr = match policies.swr {
        SwrPolicy::Fixed { rate } => Some(rate),
        SwrPolicy::Tiered => None,
    };
    TdbResponse {
        policies: PolicyEcho {
            swr_policy: policies.swr.into(),
            fixed_swr,
            annuity_timing: policies.annuity_timing.into(),
            withdrawal_timing: policies.withdrawal_timing.into(),
            ruin_display: policies.ruin_display.into(),
            lookahead_years: policies.horizon.extra_years(),
        },
        report,
    }
}

fn render_text_summary(params: &ParameterSet, report: &TdbReport) -> String {
    let symbol = report.currency_symbol.as_str();
    let mut lines = vec![
        "Targeted Depletion Benchmark (TDB)".to_string(),
        String::new(),
        format!(
            "TDB Number (Today):  {}  Capital required today to coast.",
            format_money(symbol, report.tdb_today)
        ),
        format!(
            "Traditional Advice:  {} ({})  Based on {}",
            format_money(symbol, report.traditional_today),
            format_money(symbol, report.capital_gap),
            report.targets.swr.label
        ),
        format!(
            "Life Energy Saved:   {:.1} Years  Reduction in mandatory accumulation phase.",
            report.years_saved
        ),
        format!(
            "Potential Waste:     {}  Terminal wealth if savings continue.",
            format_money(symbol, report.waste_amount)
        ),
    ];

    lines.push(String::new());
    lines.push(format!("Balances at age {}:", report.markers.depletion_age));
    for strategy in [Strategy::Optimal, Strategy::Traditional, Strategy::Oversaver] {
        if let Some(balance) = report
            .trajectories
            .balance_at(strategy, report.markers.depletion_age)
        {
            lines.push(format!(
                "  {:<27} {}",
                strategy.label(),
                format_money(symbol, balance)
            ));
        }
    }

    if report.buffer_exceeds_traditional {
        let buffer_percent = ((params.safety_buffer() - 1.0) * 100.0).round() as i64;
        lines.push(String::new());
        lines.push(format!(
            "Note: Your TDB number is higher than the Traditional number because the model \
             enforces a {buffer_percent}% safety buffer and insurance for early retirement \
             scenarios, whereas the standard 4% rule carries significant ruin risk over {} years.",
            report.targets.years_in_retirement
        ));
    }

    lines.join("\n")
}

/// Whole currency units with thousands separators, sign ahead of the symbol.
fn format_money(symbol: &str, value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}{symbol}{grouped}")
}
