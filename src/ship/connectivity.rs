//! Connected components and plane ids
//!
//! A breadth-first visit over live springs assigns every structural particle
//! a connected component id and a plane id. Components are numbered from 0
//! in visit order, which walks particles from the highest index down, so the
//! part of the ship built last ends up on top.

use std::collections::VecDeque;

use crate::core::{ConnectedComponentId, PlaneId, Points};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectivityOutcome {
    pub component_count: usize,
    /// Highest plane id handed out, or `None` for an empty ship.
    pub max_plane_id: Option<PlaneId>,
}

pub fn run_connectivity_visit(points: &mut Points) -> ConnectivityOutcome {
    let count = points.structural_count();
    let mut visited = vec![false; count];
    let mut queue = VecDeque::new();
    let mut next_id: ConnectedComponentId = 0;
    let mut outcome = ConnectivityOutcome::default();

    for seed in (0..count).rev() {
        if visited[seed] {
            continue;
        }

        let component = next_id;
        next_id += 1;

        visited[seed] = true;
        queue.push_back(seed);
        while let Some(point) = queue.pop_front() {
            points.set_connectivity(point, component, component as PlaneId);
            for connected in points.connected_springs(point) {
                let other = connected.other_endpoint;
                if other < count && !visited[other] {
                    visited[other] = true;
                    queue.push_back(other);
                }
            }
        }

        outcome.component_count += 1;
        outcome.max_plane_id = Some(component as PlaneId);
    }

    outcome
}
