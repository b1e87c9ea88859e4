//! Trading engine: strategies, the risk-gated executor and the session orchestrator.

pub mod executor;
pub mod hybrid;
pub mod mean_reversion;
pub mod momentum;
pub mod orchestrator;
pub mod regime;
pub mod strategy;
