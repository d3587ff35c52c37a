use serde::Serialize;

use super::error::TdbError;

/// Oldest age a trajectory may reach, lookahead included.
pub const MAX_SIMULATED_AGE: u32 = 150;

/// How the traditional benchmark picks its safe withdrawal rate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SwrPolicy {
    /// 3.25% beyond 50 years of retirement, 3.5% beyond 35, otherwise 4%.
    Tiered,
    Fixed { rate: f64 },
}

/// Whether each year's spending is paid at the start (due) or end (ordinary) of the year.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AnnuityTiming {
    Due,
    Ordinary,
}

/// Order of the spending withdrawal and the growth step during decumulation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalTiming {
    WithdrawThenGrow,
    GrowThenWithdraw,
}

/// How negative (ruined) balances are recorded in the trajectories.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RuinDisplay {
    AllowNegative,
    ClampAtZero,
}

/// Last age covered by the trajectories.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrajectoryHorizon {
    ToDepletion,
    /// Keep simulating `years` ages past the depletion age.
    Lookahead { years: u32 },
}

impl TrajectoryHorizon {
    pub fn extra_years(self) -> u32 {
        match self {
            TrajectoryHorizon::ToDepletion => 0,
            TrajectoryHorizon::Lookahead { years } => years,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FormulaPolicies {
    pub swr: SwrPolicy,
    pub annuity_timing: AnnuityTiming,
    pub withdrawal_timing: WithdrawalTiming,
    pub ruin_display: RuinDisplay,
    pub horizon: TrajectoryHorizon,
}

impl Default for FormulaPolicies {
    fn default() -> Self {
        Self {
            swr: SwrPolicy::Tiered,
            annuity_timing: AnnuityTiming::Due,
            withdrawal_timing: WithdrawalTiming::WithdrawThenGrow,
            ruin_display: RuinDisplay::AllowNegative,
            horizon: TrajectoryHorizon::Lookahead { years: 4 },
        }
    }
}

impl FormulaPolicies {
    /// Flat 4% rule, end-of-year spending, grow before withdrawing, no lookahead.
    pub fn simplified() -> Self {
        Self {
            swr: SwrPolicy::Fixed { rate: 0.04 },
            annuity_timing: AnnuityTiming::Ordinary,
            withdrawal_timing: WithdrawalTiming::GrowThenWithdraw,
            ruin_display: RuinDisplay::AllowNegative,
            horizon: TrajectoryHorizon::ToDepletion,
        }
    }
}

/// Unvalidated inputs; turn them into a [`ParameterSet`] with [`ParameterSet::new`].
#[derive(Debug, Clone)]
pub struct ParameterInput {
    pub current_age: u32,
    pub retirement_age: u32,
    pub depletion_age: u32,
    pub annual_spend: f64,
    pub annual_savings: f64,
    pub coast_growth_rate: f64,
    pub retirement_growth_rate: f64,
    pub safety_buffer: f64,
    pub longevity_insurance_cost: f64,
    pub currency_symbol: String,
    pub policies: FormulaPolicies,
}

/// Validated, immutable inputs for one calculation run.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    current_age: u32,
    retirement_age: u32,
    depletion_age: u32,
    annual_spend: f64,
    annual_savings: f64,
    coast_growth_rate: f64,
    retirement_growth_rate: f64,
    safety_buffer: f64,
    longevity_insurance_cost: f64,
    currency_symbol: String,
    policies: FormulaPolicies,
}

impl ParameterSet {
    pub fn new(input: ParameterInput) -> Result<Self, TdbError> {
        if input.retirement_age <= input.current_age {
            return Err(TdbError::invalid(
                "retirement_age",
                format!(
                    "must be greater than current_age ({} <= {})",
                    input.retirement_age, input.current_age
                ),
            ));
        }
        if input.depletion_age <= input.retirement_age {
            return Err(TdbError::invalid(
                "depletion_age",
                format!(
                    "must be greater than retirement_age ({} <= {})",
                    input.depletion_age, input.retirement_age
                ),
            ));
        }
        let last_age = input
            .depletion_age
            .checked_add(input.policies.horizon.extra_years())
            .filter(|age| *age <= MAX_SIMULATED_AGE);
        if last_age.is_none() {
            return Err(TdbError::invalid(
                "depletion_age",
                format!(
                    "depletion age plus lookahead must be <= {MAX_SIMULATED_AGE} (got {} + {})",
                    input.depletion_age,
                    input.policies.horizon.extra_years()
                ),
            ));
        }
        if !input.annual_spend.is_finite() || input.annual_spend <= 0.0 {
            return Err(TdbError::invalid("annual_spend", "must be > 0"));
        }
        require_non_negative("annual_savings", input.annual_savings)?;
        require_non_negative("coast_growth_rate", input.coast_growth_rate)?;
        require_non_negative("retirement_growth_rate", input.retirement_growth_rate)?;
        require_non_negative("longevity_insurance_cost", input.longevity_insurance_cost)?;
        if !input.safety_buffer.is_finite() || input.safety_buffer < 1.0 {
            return Err(TdbError::invalid("safety_buffer", "must be >= 1.0"));
        }
        if let SwrPolicy::Fixed { rate } = input.policies.swr {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(TdbError::invalid("swr", "fixed rate must be > 0"));
            }
        }

        Ok(Self {
            current_age: input.current_age,
            retirement_age: input.retirement_age,
            depletion_age: input.depletion_age,
            annual_spend: input.annual_spend,
            annual_savings: input.annual_savings,
            coast_growth_rate: input.coast_growth_rate,
            retirement_growth_rate: input.retirement_growth_rate,
            safety_buffer: input.safety_buffer,
            longevity_insurance_cost: input.longevity_insurance_cost,
            currency_symbol: input.currency_symbol,
            policies: input.policies,
        })
    }

    pub fn current_age(&self) -> u32 {
        self.current_age
    }

    pub fn retirement_age(&self) -> u32 {
        self.retirement_age
    }

    pub fn depletion_age(&self) -> u32 {
        self.depletion_age
    }

    pub fn annual_spend(&self) -> f64 {
        self.annual_spend
    }

    pub fn annual_savings(&self) -> f64 {
        self.annual_savings
    }

    pub fn coast_growth_rate(&self) -> f64 {
        self.coast_growth_rate
    }

    pub fn retirement_growth_rate(&self) -> f64 {
        self.retirement_growth_rate
    }

    pub fn safety_buffer(&self) -> f64 {
        self.safety_buffer
    }

    pub fn longevity_insurance_cost(&self) -> f64 {
        self.longevity_insurance_cost
    }

    pub fn currency_symbol(&self) -> &str {
        &self.currency_symbol
    }

    pub fn policies(&self) -> FormulaPolicies {
        self.policies
    }

    pub fn years_in_retirement(&self) -> u32 {
        self.depletion_age - self.retirement_age
    }

    pub fn years_to_coast(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), TdbError> {
    if !value.is_finite() || value < 0.0 {
        return Err(TdbError::invalid(field, "must be a finite value >= 0"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwrTier {
    pub rate: f64,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyTarget {
    pub retirement_year_target: f64,
    pub present_value_target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalTargets {
    pub years_in_retirement: u32,
    pub years_to_coast: u32,
    pub base_capital_needed: f64,
    pub discount_factor: f64,
    pub swr: SwrTier,
    pub tdb: StrategyTarget,
    pub traditional: StrategyTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeEnergy {
    pub years_to_tdb: f64,
    pub years_to_traditional: f64,
    pub years_saved: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Optimal,
    Traditional,
    Oversaver,
}

impl Strategy {
    pub fn label(self) -> &'static str {
        match self {
            Strategy::Optimal => "TDB Strategy (Optimal)",
            Strategy::Traditional => "Traditional (Perpetuity)",
            Strategy::Oversaver => "Continued Savings (Waste)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub age: u32,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectories {
    pub optimal: Vec<TrajectoryPoint>,
    pub traditional: Vec<TrajectoryPoint>,
    pub oversaver: Vec<TrajectoryPoint>,
}

impl Trajectories {
    pub fn get(&self, strategy: Strategy) -> &[TrajectoryPoint] {
        match strategy {
            Strategy::Optimal => &self.optimal,
            Strategy::Traditional => &self.traditional,
            Strategy::Oversaver => &self.oversaver,
        }
    }

    pub fn balance_at(&self, strategy: Strategy, age: u32) -> Option<f64> {
        self.get(strategy)
            .iter()
            .find(|point| point.age == age)
            .map(|point| point.balance)
    }
}

/// Ages a chart draws vertical rules at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMarkers {
    pub retirement_age: u32,
    pub depletion_age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TdbReport {
    pub currency_symbol: String,
    pub tdb_today: f64,
    pub traditional_today: f64,
    pub capital_gap: f64,
    pub years_saved: f64,
    pub waste_amount: f64,
    /// The buffered TDB number exceeds the traditional one over a long (>40y) retirement.
    pub buffer_exceeds_traditional: bool,
    pub targets: CapitalTargets,
    pub life_energy: LifeEnergy,
    pub markers: ReportMarkers,
    pub trajectories: Trajectories,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> ParameterInput {
        ParameterInput {
            current_age: 30,
            retirement_age: 60,
            depletion_age: 95,
            annual_spend: 50_000.0,
            annual_savings: 20_000.0,
            coast_growth_rate: 0.07,
            retirement_growth_rate: 0.04,
            safety_buffer: 1.1,
            longevity_insurance_cost: 50_000.0,
            currency_symbol: "$".to_string(),
            policies: FormulaPolicies::default(),
        }
    }

    fn rejected_field(input: ParameterInput) -> &'static str {
        match ParameterSet::new(input) {
            Err(TdbError::InvalidParameter { field, .. }) => field,
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn accepts_ordered_ages_and_derives_phase_lengths() {
        let params = ParameterSet::new(valid_input()).expect("valid parameters");
        assert_eq!(params.years_to_coast(), 30);
        assert_eq!(params.years_in_retirement(), 35);
        assert_eq!(params.currency_symbol(), "$");
    }

    #[test]
    fn rejects_unordered_ages() {
        let mut input = valid_input();
        input.retirement_age = 30;
        assert_eq!(rejected_field(input), "retirement_age");

        let mut input = valid_input();
        input.retirement_age = 20;
        assert_eq!(rejected_field(input), "retirement_age");

        let mut input = valid_input();
        input.depletion_age = 60;
        assert_eq!(rejected_field(input), "depletion_age");
    }

    #[test]
    fn caps_last_simulated_age() {
        let mut input = valid_input();
        input.depletion_age = 146;
        input.policies.horizon = TrajectoryHorizon::Lookahead { years: 4 };
        assert!(ParameterSet::new(input).is_ok());

        let mut input = valid_input();
        input.depletion_age = 147;
        input.policies.horizon = TrajectoryHorizon::Lookahead { years: 4 };
        assert_eq!(rejected_field(input), "depletion_age");

        let mut input = valid_input();
        input.current_age = 0;
        input.retirement_age = 1;
        input.depletion_age = u32::MAX;
        assert_eq!(rejected_field(input), "depletion_age");

        let mut input = valid_input();
        input.current_age = 0;
        input.retirement_age = 2_147_483_649;
        input.depletion_age = 2_147_483_650;
        input.policies.horizon = TrajectoryHorizon::ToDepletion;
        assert_eq!(rejected_field(input), "depletion_age");

        let mut input = valid_input();
        input.policies.horizon = TrajectoryHorizon::Lookahead { years: u32::MAX };
        assert_eq!(rejected_field(input), "depletion_age");
    }

    #[test]
    fn rejects_non_positive_or_nan_spend() {
        for spend in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut input = valid_input();
            input.annual_spend = spend;
            assert_eq!(rejected_field(input), "annual_spend");
        }
    }

    #[test]
    fn rejects_negative_or_non_finite_amounts_and_rates() {
        let mut input = valid_input();
        input.annual_savings = -1.0;
        assert_eq!(rejected_field(input), "annual_savings");

        let mut input = valid_input();
        input.coast_growth_rate = -0.01;
        assert_eq!(rejected_field(input), "coast_growth_rate");

        let mut input = valid_input();
        input.retirement_growth_rate = f64::NAN;
        assert_eq!(rejected_field(input), "retirement_growth_rate");

        let mut input = valid_input();
        input.longevity_insurance_cost = -50_000.0;
        assert_eq!(rejected_field(input), "longevity_insurance_cost");
    }

    #[test]
    fn zero_savings_and_rates_are_accepted() {
        let mut input = valid_input();
        input.annual_savings = 0.0;
        input.coast_growth_rate = 0.0;
        input.retirement_growth_rate = 0.0;
        input.longevity_insurance_cost = 0.0;
        assert!(ParameterSet::new(input).is_ok());
    }

    #[test]
    fn rejects_safety_buffer_below_one() {
        let mut input = valid_input();
        input.safety_buffer = 0.99;
        assert_eq!(rejected_field(input), "safety_buffer");

        let mut input = valid_input();
        input.safety_buffer = 1.0;
        assert!(ParameterSet::new(input).is_ok());
    }

    #[test]
    fn rejects_non_positive_fixed_swr() {
        for rate in [0.0, -0.04, f64::NAN] {
            let mut input = valid_input();
            input.policies.swr = SwrPolicy::Fixed { rate };
            assert_eq!(rejected_field(input), "swr");
        }
    }

    #[test]
    fn strategy_labels_name_each_path() {
        assert_eq!(Strategy::Optimal.label(), "TDB Strategy (Optimal)");
        assert_eq!(Strategy::Traditional.label(), "Traditional (Perpetuity)");
        assert_eq!(Strategy::Oversaver.label(), "Continued Savings (Waste)");
    }
}
