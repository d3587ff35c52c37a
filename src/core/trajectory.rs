use super::types::{
    CapitalTargets, ParameterSet, RuinDisplay, Strategy, TrajectoryPoint, Trajectories,
    WithdrawalTiming,
};

/// Year-by-year balances for the optimal, traditional and oversaver paths.
///
/// The balance recorded at an age is the balance entering that year; the year's
/// growth, contribution or withdrawal is applied afterwards.
pub fn simulate_trajectories(params: &ParameterSet, targets: &CapitalTargets) -> Trajectories {
    let last_age = params.depletion_age() + params.policies().horizon.extra_years();
    let tdb_today = targets.tdb.present_value_target;

    Trajectories {
        optimal: simulate_path(params, Strategy::Optimal, tdb_today, last_age),
        traditional: simulate_path(
            params,
            Strategy::Traditional,
            targets.traditional.present_value_target,
            last_age,
        ),
        oversaver: simulate_path(params, Strategy::Oversaver, tdb_today, last_age),
    }
}

fn simulate_path(
    params: &ParameterSet,
    strategy: Strategy,
    start_balance: f64,
    last_age: u32,
) -> Vec<TrajectoryPoint> {
    let ruin_display = params.policies().ruin_display;
    let mut points = Vec::with_capacity((last_age - params.current_age() + 1) as usize);
    let mut balance = start_balance;

    for age in params.current_age()..=last_age {
        let recorded = match ruin_display {
            RuinDisplay::AllowNegative => balance,
            RuinDisplay::ClampAtZero => balance.max(0.0),
        };
        points.push(TrajectoryPoint {
            age,
            balance: recorded,
        });
        balance = advance_year(params, strategy, age, balance);
    }

    points
}

fn advance_year(params: &ParameterSet, strategy: Strategy, age: u32, balance: f64) -> f64 {
    if age < params.retirement_age() {
        let grown = balance * (1.0 + params.coast_growth_rate());
        return match strategy {
            Strategy::Oversaver => grown + params.annual_savings(),
            Strategy::Optimal | Strategy::Traditional => grown,
        };
    }

    if age >= params.depletion_age() && strategy == Strategy::Optimal {
        return 0.0;
    }

    apply_withdrawal_year(params, balance)
}

fn apply_withdrawal_year(params: &ParameterSet, balance: f64) -> f64 {
    let growth = 1.0 + params.retirement_growth_rate();
    let spend = params.annual_spend();
    match params.policies().withdrawal_timing {
        WithdrawalTiming::WithdrawThenGrow => (balance - spend) * growth,
        WithdrawalTiming::GrowThenWithdraw => balance * growth - spend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        AnnuityTiming, FormulaPolicies, ParameterInput, TrajectoryHorizon, capital_targets,
    };
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn small_input() -> ParameterInput {
        ParameterInput {
            current_age: 30,
            retirement_age: 33,
            depletion_age: 35,
            annual_spend: 100.0,
            annual_savings: 10.0,
            coast_growth_rate: 0.10,
            retirement_growth_rate: 0.0,
            safety_buffer: 1.0,
            longevity_insurance_cost: 0.0,
            currency_symbol: "£".to_string(),
            policies: FormulaPolicies::default(),
        }
    }

    fn run(input: ParameterInput) -> (ParameterSet, CapitalTargets, Trajectories) {
        let params = ParameterSet::new(input).expect("valid parameters");
        let targets = capital_targets(&params);
        let trajectories = simulate_trajectories(&params, &targets);
        (params, targets, trajectories)
    }

    #[test]
    fn oracle_small_path_matches_hand_calculation() {
        // Base 200 at retirement, discounted by 1.1^3 = 1.331 to ~150.263.
        // Optimal: 150.263 -> 165.289 -> 181.818 -> 200 -> 100 -> 0 -> 0 ...
        // Oversaver adds 10 after each coast year: 150.263 -> 175.289 -> 202.818 -> 233.1.
        let (_, targets, trajectories) = run(small_input());
        assert_approx(targets.tdb.retirement_year_target, 200.0);

        let optimal: Vec<f64> = trajectories.optimal.iter().map(|p| p.balance).collect();
        assert_approx(optimal[0], 200.0 / 1.331);
        assert_approx(optimal[3], 200.0);
        assert_approx(optimal[4], 100.0);
        assert_approx(optimal[5], 0.0);
        assert!(optimal[6..].iter().all(|b| *b == 0.0));

        let oversaver = &trajectories.oversaver;
        assert_approx(oversaver[1].balance, 200.0 / 1.331 * 1.1 + 10.0);
        assert_approx(oversaver[3].balance, 233.1);
        assert_approx(oversaver[4].balance, 133.1);
        assert_approx(oversaver[5].balance, 33.1);
        assert_approx(oversaver[6].balance, -66.9);
    }

    #[test]
    fn ages_cover_current_through_lookahead() {
        let (_, _, trajectories) = run(small_input());
        let ages: Vec<u32> = trajectories.traditional.iter().map(|p| p.age).collect();
        assert_eq!(ages, (30..=39).collect::<Vec<_>>());
    }

    #[test]
    fn to_depletion_horizon_stops_at_depletion_age() {
        let mut input = small_input();
        input.policies.horizon = TrajectoryHorizon::ToDepletion;
        let (_, _, trajectories) = run(input);
        assert_eq!(trajectories.optimal.len(), 6);
        assert_eq!(trajectories.optimal.last().map(|p| p.age), Some(35));
    }

    #[test]
    fn traditional_keeps_withdrawing_past_depletion() {
        let mut input = small_input();
        input.retirement_growth_rate = 0.05;
        let (params, targets, trajectories) = run(input);

        let at_depletion = trajectories
            .balance_at(Strategy::Traditional, params.depletion_age())
            .expect("depletion age present");
        let next = trajectories
            .balance_at(Strategy::Traditional, params.depletion_age() + 1)
            .expect("lookahead age present");
        assert_approx(next, (at_depletion - 100.0) * 1.05);
        assert_approx(
            trajectories.traditional[0].balance,
            targets.traditional.present_value_target,
        );
    }

    #[test]
    fn grow_then_withdraw_orders_growth_first() {
        let mut input = small_input();
        input.retirement_growth_rate = 0.10;
        input.policies.withdrawal_timing = WithdrawalTiming::GrowThenWithdraw;
        let (params, _, trajectories) = run(input);

        let at_retirement = trajectories
            .balance_at(Strategy::Optimal, params.retirement_age())
            .expect("retirement age present");
        let next = trajectories
            .balance_at(Strategy::Optimal, params.retirement_age() + 1)
            .expect("next age present");
        assert_approx(next, at_retirement * 1.1 - 100.0);
    }

    #[test]
    fn clamp_at_zero_floors_recorded_balances_only() {
        let mut input = small_input();
        input.policies.ruin_display = RuinDisplay::ClampAtZero;
        let (_, _, trajectories) = run(input);
        assert_eq!(trajectories.oversaver[6].balance, 0.0);
        assert_eq!(trajectories.oversaver[7].balance, 0.0);
    }

    proptest! {
        #[test]
        fn optimal_path_depletes_exactly_at_target_age(
            coast_years in 1u32..40,
            retirement_years in 1u32..60,
            coast_rate in 0.0f64..0.15,
            retirement_rate in 0.0f64..0.15,
            spend in 10_000.0f64..200_000.0,
            ordinary in proptest::bool::ANY,
        ) {
            let mut input = small_input();
            input.current_age = 25;
            input.retirement_age = 25 + coast_years;
            input.depletion_age = 25 + coast_years + retirement_years;
            input.coast_growth_rate = coast_rate;
            input.retirement_growth_rate = retirement_rate;
            input.annual_spend = spend;
            // Each annuity timing depletes exactly under its matching withdrawal order.
            if ordinary {
                input.policies.annuity_timing = AnnuityTiming::Ordinary;
                input.policies.withdrawal_timing = WithdrawalTiming::GrowThenWithdraw;
            }
            let (params, targets, trajectories) = run(input);

            let at_depletion = trajectories
                .balance_at(Strategy::Optimal, params.depletion_age())
                .expect("depletion age present");
            prop_assert!(at_depletion.abs() <= 1e-6 * targets.tdb.retirement_year_target);
        }

        #[test]
        fn all_paths_share_the_age_axis(
            current_age in 18u32..60,
            coast_years in 1u32..30,
            retirement_years in 1u32..50,
            lookahead in 0u32..10,
        ) {
            let mut input = small_input();
            input.current_age = current_age;
            input.retirement_age = current_age + coast_years;
            input.depletion_age = current_age + coast_years + retirement_years;
            input.policies.horizon = TrajectoryHorizon::Lookahead { years: lookahead };
            let (params, _, trajectories) = run(input);

            let expected_len =
                (params.depletion_age() - params.current_age() + 1 + lookahead) as usize;
            prop_assert_eq!(trajectories.optimal.len(), expected_len);
            prop_assert_eq!(trajectories.traditional.len(), expected_len);
            prop_assert_eq!(trajectories.oversaver.len(), expected_len);
            prop_assert_eq!(trajectories.optimal[0].age, params.current_age());
        }
    }
}
