//! Risk scoring: incident taxonomy, per-segment aggregates, time-of-day
//! multipliers and the composite edge weight.

mod aggregate;
mod category;
mod solar;
mod temporal;
mod weight;

pub use aggregate::{
    EdgeAggregates, EdgeRiskAggregate, compute_edge_aggregates, density_per_100m, recency_weight,
};
pub use category::Category;
pub use solar::{SolarEvents, solar_events};
pub use temporal::{TemporalContext, band_name, temporal_multiplier};
pub use weight::{
    EdgeCost, WeightCache, composite_weight, edge_cost, edge_weights, length_weights,
    proximity_bonus,
};
