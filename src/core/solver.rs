use super::{CapitalTargets, LifeEnergy, ParameterSet, TdbError};

/// Years of growth-plus-contribution needed to reach `target` from a zero balance.
///
/// Inverts the future value of an ordinary annuity, `FV = c * ((1 + r)^n - 1) / r`,
/// where each year's contribution lands after that year's growth.
pub fn years_to_reach_target(target: f64, rate: f64, contribution: f64) -> Result<f64, TdbError> {
    if contribution <= 0.0 || target <= 0.0 {
        return Ok(0.0);
    }
    if rate == 0.0 {
        return Ok(target / contribution);
    }

    let unreachable = TdbError::UnreachableTarget {
        target,
        rate,
        contribution,
    };
    if rate <= -1.0 {
        return Err(unreachable);
    }
    let growth_multiple = target * rate / contribution + 1.0;
    if growth_multiple <= 0.0 {
        return Err(unreachable);
    }

    let years = growth_multiple.ln() / rate.ln_1p();
    if !years.is_finite() || years < 0.0 {
        return Err(unreachable);
    }
    Ok(years)
}

/// Working years needed to save each strategy's present-value target at the coast rate.
pub fn life_energy(
    params: &ParameterSet,
    targets: &CapitalTargets,
) -> Result<LifeEnergy, TdbError> {
    let rate = params.coast_growth_rate();
    let contribution = params.annual_savings();

    let years_to_tdb =
        years_to_reach_target(targets.tdb.present_value_target, rate, contribution)?;
    let years_to_traditional = years_to_reach_target(
        targets.traditional.present_value_target,
        rate,
        contribution,
    )?;

    Ok(LifeEnergy {
        years_to_tdb,
        years_to_traditional,
        years_saved: (years_to_traditional - years_to_tdb).max(0.0),
    })
}
