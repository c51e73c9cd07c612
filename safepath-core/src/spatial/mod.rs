//! Spatial attribution of incidents and infrastructure to street segments

mod attribution;
mod index;
mod infrastructure;
mod projection;

pub use attribution::{Attribution, AttributionGap, attribute};
pub use index::SpatialIndex;
pub use infrastructure::{InfrastructureLayers, InfrastructureSummary, apply_infrastructure};
pub use projection::LocalProjection;
