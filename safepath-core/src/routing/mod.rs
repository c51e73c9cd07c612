//! Route planning over composite weights

mod dijkstra;
mod planner;
mod route;

pub use planner::find_routes;
pub use route::{Route, RouteLabel};
