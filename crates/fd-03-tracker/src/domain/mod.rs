//! Domain layer for the tracker: pure planning logic and state records.

pub mod join;
pub mod state;

pub use join::{normalize_declarations, plan_join, Declarations, JoinPlan};
pub use state::{
    DistributionResult, PendingDelivery, PendingJoin, PendingRequests, TrackerCore, TrackerPhase,
    TrackerState, Waiting,
};
