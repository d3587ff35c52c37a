mod engine;
mod error;
mod solver;
mod trajectory;
mod types;

pub use engine::{capital_targets, compute};
pub use error::TdbError;
pub use solver::{life_energy, years_to_reach_target};
pub use trajectory::simulate_trajectories;
pub use types::{
    AnnuityTiming, CapitalTargets, FormulaPolicies, LifeEnergy, MAX_SIMULATED_AGE, ParameterInput,
    ParameterSet, ReportMarkers, RuinDisplay, Strategy, StrategyTarget, SwrPolicy, SwrTier,
    TdbReport, TrajectoryHorizon, TrajectoryPoint, Trajectories, WithdrawalTiming,
};
