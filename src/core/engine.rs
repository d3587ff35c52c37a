use tracing::debug;

use super::solver::life_energy;
use super::trajectory::simulate_trajectories;
use super::types::{
    AnnuityTiming, CapitalTargets, LifeEnergy, ParameterSet, ReportMarkers, Strategy,
    StrategyTarget, SwrPolicy, SwrTier, TdbReport, Trajectories,
};
use super::TdbError;

const LONG_RETIREMENT_YEARS: u32 = 40;

/// Runs one full calculation: targets, life-energy horizons and the three trajectories.
pub fn compute(params: &ParameterSet) -> Result<TdbReport, TdbError> {
    let targets = capital_targets(params);
    let energy = life_energy(params, &targets)?;
    let trajectories = simulate_trajectories(params, &targets);

    debug!(
        tdb_today = targets.tdb.present_value_target,
        traditional_today = targets.traditional.present_value_target,
        swr = targets.swr.rate,
        years_to_tdb = energy.years_to_tdb,
        years_to_traditional = energy.years_to_traditional,
        "computed depletion benchmark"
    );

    Ok(assemble_report(params, targets, energy, trajectories))
}

/// Capital needed at retirement and today for both the TDB and the traditional rule.
pub fn capital_targets(params: &ParameterSet) -> CapitalTargets {
    let policies = params.policies();
    let years_in_retirement = params.years_in_retirement();
    let years_to_coast = params.years_to_coast();

    let base_capital_needed = annuity_present_value(
        params.annual_spend(),
        params.retirement_growth_rate(),
        years_in_retirement,
        policies.annuity_timing,
    );
    let tdb_at_retirement =
        base_capital_needed * params.safety_buffer() + params.longevity_insurance_cost();

    let swr = swr_tier(policies.swr, years_in_retirement);
    let traditional_at_retirement = params.annual_spend() / swr.rate;

    let discount_factor = (1.0 + params.coast_growth_rate()).powi(years_to_coast as i32);

    CapitalTargets {
        years_in_retirement,
        years_to_coast,
        base_capital_needed,
        discount_factor,
        swr,
        tdb: StrategyTarget {
            retirement_year_target: tdb_at_retirement,
            present_value_target: tdb_at_retirement / discount_factor,
        },
        traditional: StrategyTarget {
            retirement_year_target: traditional_at_retirement,
            present_value_target: traditional_at_retirement / discount_factor,
        },
    }
}

/// Present value of `years` payments of `annual_spend`.
fn annuity_present_value(annual_spend: f64, rate: f64, years: u32, timing: AnnuityTiming) -> f64 {
    if rate == 0.0 {
        return annual_spend * years as f64;
    }

    let ordinary_factor = (1.0 - (1.0 + rate).powi(-(years as i32))) / rate;
    match timing {
        AnnuityTiming::Due => annual_spend * ordinary_factor * (1.0 + rate),
        AnnuityTiming::Ordinary => annual_spend * ordinary_factor,
    }
}

fn swr_tier(policy: SwrPolicy, years_in_retirement: u32) -> SwrTier {
    match policy {
        SwrPolicy::Fixed { rate } => SwrTier {
            rate,
            label: "Fixed Safe Withdrawal Rate",
        },
        SwrPolicy::Tiered if years_in_retirement > 50 => SwrTier {
            rate: 0.0325,
            label: "3.25% (Early Retirement Safe Rate)",
        },
        SwrPolicy::Tiered if years_in_retirement > 35 => SwrTier {
            rate: 0.035,
            label: "3.5% (Extended Safe Rate)",
        },
        SwrPolicy::Tiered => SwrTier {
            rate: 0.04,
            label: "4.0% (Standard Bengen Rule)",
        },
    }
}

fn assemble_report(
    params: &ParameterSet,
    targets: CapitalTargets,
    life_energy: LifeEnergy,
    trajectories: Trajectories,
) -> TdbReport {
    let tdb_today = targets.tdb.present_value_target;
    let traditional_today = targets.traditional.present_value_target;
    let waste_amount = trajectories
        .balance_at(Strategy::Oversaver, params.depletion_age())
        .unwrap_or(0.0);

    TdbReport {
        currency_symbol: params.currency_symbol().to_string(),
        tdb_today,
        traditional_today,
        capital_gap: tdb_today - traditional_today,
        years_saved: life_energy.years_saved,
        waste_amount,
        buffer_exceeds_traditional: tdb_today > traditional_today
            && targets.years_in_retirement > LONG_RETIREMENT_YEARS,
        targets,
        life_energy,
        markers: ReportMarkers {
            retirement_age: params.retirement_age(),
            depletion_age: params.depletion_age(),
        },
        trajectories,
    }
}
