//! Building launch specifications from offers.
//!
//! [`TaskBuilder`] is the placement seam: given an app and an offer it
//! either produces a launch spec with a port assignment or reports that
//! the offer does not fit. Implementations must be pure with respect to
//! the offer and the tracker.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::model::{AppDefinition, Offer, TaskLaunch};
use crate::task_tracker::TaskTracker;

/// Builds a launch spec if the offer satisfies the app's requirements.
pub trait TaskBuilder: Send + Sync {
    /// Returns the launch spec and assigned ports, or `None` when the
    /// offer lacks resources, violates a constraint, or cannot satisfy
    /// the port request. Must not mutate the offer or the tracker.
    fn build_if_matches(&self, app: &AppDefinition, offer: &Offer)
        -> Option<(TaskLaunch, Vec<u16>)>;
}

/// Default first-fit matcher: scalar resources, then constraints, then
/// ports drawn in order from the offered ranges.
pub struct ResourceMatcher {
    tracker: Arc<TaskTracker>,
}

impl ResourceMatcher {
    pub fn new(tracker: Arc<TaskTracker>) -> Self {
        Self { tracker }
    }

    /// Assigns one offered port per request. Explicit ports must fall in
    /// an offered range; `0` takes the lowest unassigned offered port.
    fn assign_ports(app: &AppDefinition, offer: &Offer) -> Option<Vec<u16>> {
        let ranges = &offer.resources.port_ranges;
        let mut assigned: Vec<u16> = Vec::with_capacity(app.ports.len());
        let mut used: HashSet<u16> = HashSet::new();

        for &requested in &app.ports {
            let port = if requested == 0 {
                Self::next_free_port(ranges, &used)?
            } else {
                let in_range = ranges
                    .iter()
                    .any(|&(lo, hi)| requested >= lo && requested <= hi);
                if !in_range || used.contains(&requested) {
                    return None;
                }
                requested
            };
            used.insert(port);
            assigned.push(port);
        }
        Some(assigned)
    }

    fn next_free_port(ranges: &[(u16, u16)], used: &HashSet<u16>) -> Option<u16> {
        for &(lo, hi) in ranges {
            for port in lo..=hi {
                if !used.contains(&port) {
                    return Some(port);
                }
            }
        }
        None
    }
}

impl TaskBuilder for ResourceMatcher {
    fn build_if_matches(
        &self,
        app: &AppDefinition,
        offer: &Offer,
    ) -> Option<(TaskLaunch, Vec<u16>)> {
        let res = &offer.resources;
        if res.cpus < app.cpus || res.mem < app.mem || res.disk < app.disk {
            debug!(
                app_id = %app.id,
                offer_id = %offer.id,
                "Offer resources insufficient"
            );
            return None;
        }

        if !app
            .constraints
            .iter()
            .all(|c| c.matches(&offer.hostname, &offer.attributes))
        {
            debug!(app_id = %app.id, offer_id = %offer.id, "Offer violates constraints");
            return None;
        }

        let ports = Self::assign_ports(app, offer)?;

        let launch = TaskLaunch {
            task_id: self.tracker.new_task_id(&app.id),
            app_id: app.id.clone(),
            slave_id: offer.slave_id.clone(),
            host: offer.hostname.clone(),
            cpus: app.cpus,
            mem: app.mem,
            disk: app.disk,
            ports: ports.clone(),
            cmd: app.cmd.clone(),
            image: app.image.clone(),
            uris: app.uris.clone(),
        };
        Some((launch, ports))
    }
}
