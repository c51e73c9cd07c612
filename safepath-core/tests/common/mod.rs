//! Shared fixtures for the integration tests.
//!
//! Graphs sit on the equator, where 0.0009 degrees is roughly 100 m in
//! either direction. Every street is two-way.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use safepath_core::{
    EngineConfig, IncidentRecord, Node, NodeId, SafetyEngine, SafetyGraph, Segment,
    TemporalContext,
};

/// Roughly 100 m in degrees at the equator
pub const STEP: f64 = 0.0009;

pub const A: NodeId = 1;
pub const B: NodeId = 2;
pub const C: NodeId = 3;

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn incident(id: u64, lat: f64, lon: f64, severity: f64, days_ago: i64) -> IncidentRecord {
    IncidentRecord {
        id,
        source: "fixture".into(),
        occurred_at: now() - Duration::days(days_ago),
        category: None,
        severity: Some(severity),
        violent: None,
        lat,
        lon,
        description: Some("Robbery".into()),
    }
}

fn two_way(from: NodeId, to: NodeId, length_m: f64) -> [Segment; 2] {
    [Segment::new(from, to, 0, length_m), Segment::new(to, from, 0, length_m)]
}

/// A - B - C along the equator, 200 m per segment
pub fn line_graph() -> SafetyGraph {
    let nodes = vec![
        Node::new(A, 0.0, 0.0),
        Node::new(B, 0.0, 2.0 * STEP),
        Node::new(C, 0.0, 4.0 * STEP),
    ];
    let segments = [two_way(A, B, 200.0), two_way(B, C, 200.0)].concat();
    SafetyGraph::new(nodes, segments).unwrap()
}

/// A - B - C with a 300 m shortcut A - C
pub fn triangle_graph() -> SafetyGraph {
    let nodes = vec![
        Node::new(A, 0.0, 0.0),
        Node::new(B, 0.0, 2.0 * STEP),
        Node::new(C, 2.0 * STEP, 2.0 * STEP),
    ];
    let segments = [
        two_way(A, B, 200.0),
        two_way(B, C, 200.0),
        two_way(A, C, 300.0),
    ]
    .concat();
    SafetyGraph::new(nodes, segments).unwrap()
}

pub fn grid_node(n: i64, row: i64, col: i64) -> NodeId {
    row * n + col + 1
}

/// `n` x `n` grid, blocks about 100 m apart; segment lengths vary with
/// `irregular`
pub fn grid_graph(n: i64, irregular: bool) -> SafetyGraph {
    let mut nodes = Vec::new();
    let mut segments = Vec::new();
    for row in 0..n {
        for col in 0..n {
            let id = grid_node(n, row, col);
            nodes.push(Node::new(id, row as f64 * STEP, col as f64 * STEP));
            let mut link = |other: NodeId| {
                let length = if irregular {
                    100.0 + ((id * 7 + other * 13) % 50) as f64
                } else {
                    100.0
                };
                segments.extend(two_way(id, other, length));
            };
            if col + 1 < n {
                link(grid_node(n, row, col + 1));
            }
            if row + 1 < n {
                link(grid_node(n, row + 1, col));
            }
        }
    }
    SafetyGraph::new(nodes, segments).unwrap()
}

pub fn engine(graph: SafetyGraph) -> SafetyEngine {
    SafetyEngine::new(graph, EngineConfig::default()).unwrap()
}

pub fn band(name: &str) -> TemporalContext {
    TemporalContext::for_band(&EngineConfig::default().temporal, name).unwrap()
}
