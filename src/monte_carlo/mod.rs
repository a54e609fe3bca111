pub mod paths;
pub mod pricing;

pub use paths::{
    generate_paths, ExecutionMode, PathEnsemble, PathSimulator, SimulationConfig, PRICE_FLOOR,
};
pub use pricing::{
    price_ensemble, Barrier, BarrierDirection, KnockType, MonteCarloPricer, Payoff,
};
