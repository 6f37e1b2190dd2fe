//! Per-tick advancement of in-flight ship movement.
//!
//! Advancement is deterministic: the outcome depends only on the elapsed
//! time handed in and the ship's stored [`Movement`]. Measuring real elapsed
//! time is the caller's job.

use shared::grid::GridCatalog;
use shared::hex::hex_line;
use shared::{Movement, Point, ShipState};

/// Slack when comparing traveled distance against waypoint thresholds.
pub const CROSSING_EPSILON: f64 = 1e-6;
/// Remaining distance at or below which a ship counts as arrived.
pub const ARRIVAL_EPSILON: f64 = 1e-4;
/// Shortest duration a committed movement may have, in seconds.
pub const MIN_DURATION: f64 = 1e-3;

/// A ship entered a new sector.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorCrossing {
    pub ship_id: String,
    pub sector: String,
}

/// Outcome of advancing one ship by one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advance {
    pub moved: bool,
    pub arrived: bool,
    pub crossings: Vec<SectorCrossing>,
}

/// Waypoints a movement will cross, paired with cumulative distance.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPlan {
    pub thresholds: Vec<f64>,
    pub labels: Vec<String>,
}

impl PathPlan {
    fn direct(start_label: &str, target_label: &str, distance: f64) -> Self {
        Self {
            thresholds: vec![0.0, distance],
            labels: vec![start_label.to_string(), target_label.to_string()],
        }
    }
}

/// Lays the hex line from the start sector to the target sector over `distance`.
///
/// Falls back to a direct two-point path when either sector is unknown, and
/// forces the final waypoint to be the target sector at the full distance.
pub fn plan_path(
    catalog: &GridCatalog,
    start_label: &str,
    target_label: &str,
    distance: f64,
) -> PathPlan {
    let (start, target) = match (catalog.by_label(start_label), catalog.by_label(target_label)) {
        (Some(start), Some(target)) => (start, target),
        _ => return PathPlan::direct(start_label, target_label, distance),
    };

    let line = hex_line(start.axial(), target.axial());
    if line.is_empty() {
        return PathPlan::direct(start_label, target_label, distance);
    }

    let steps = (line.len() - 1).max(1) as f64;
    let mut labels = Vec::with_capacity(line.len());
    let mut thresholds = Vec::with_capacity(line.len());
    for (index, coords) in line.into_iter().enumerate() {
        let label = catalog
            .by_coords(coords)
            .map_or(start_label, |hex| hex.label.as_str());
        labels.push(label.to_string());
        thresholds.push(distance * index as f64 / steps);
    }

    if labels.last().map(String::as_str) != Some(target_label) {
        if let (Some(label), Some(threshold)) = (labels.last_mut(), thresholds.last_mut()) {
            *label = target_label.to_string();
            *threshold = distance;
        }
    }

    PathPlan { thresholds, labels }
}

/// Builds the movement record for a ship leaving `start` for `target`.
///
/// Returns `None` when the two points coincide.
pub fn begin_movement(
    catalog: &GridCatalog,
    start: Point,
    start_sector: &str,
    target: Point,
    target_sector: &str,
    speed: f64,
    now: f64,
) -> Option<Movement> {
    let distance = start.distance_to(&target);
    if distance <= 1e-9 {
        return None;
    }

    let duration = (distance / speed).max(MIN_DURATION);
    let plan = plan_path(catalog, start_sector, target_sector, distance);

    Some(Movement {
        dir_x: (target.x - start.x) / distance,
        dir_y: (target.y - start.y) / distance,
        speed,
        remaining: distance,
        traveled: 0.0,
        thresholds: plan.thresholds,
        labels: plan.labels,
        next_index: 1,
        start,
        target,
        start_time: now,
        end_time: now + duration,
        target_sector: target_sector.to_string(),
    })
}

/// Advances `ship` along its movement by `delta_seconds`.
///
/// Every sector entered during the step is reported in order; a long step can
/// cross several waypoints. On arrival the ship snaps to the target and
/// becomes stationary.
pub fn advance_one(ship: &mut ShipState, delta_seconds: f64, now: f64) -> Advance {
    let mut advance = Advance::default();

    let Some(movement) = ship.movement.as_mut() else {
        return advance;
    };

    let step = (movement.speed * delta_seconds).min(movement.remaining);
    if !(step > 0.0) {
        return advance;
    }

    ship.x += movement.dir_x * step;
    ship.y += movement.dir_y * step;
    movement.remaining = (movement.remaining - step).max(0.0);
    movement.traveled += step;
    ship.updated_at = now;
    advance.moved = true;

    while movement.next_index < movement.thresholds.len()
        && movement.traveled + CROSSING_EPSILON >= movement.thresholds[movement.next_index]
    {
        if let Some(label) = movement.labels.get(movement.next_index) {
            if ship.sector != *label {
                ship.sector = label.clone();
                advance.crossings.push(SectorCrossing {
                    ship_id: ship.id.clone(),
                    sector: label.clone(),
                });
            }
        }
        movement.next_index += 1;
    }

    if movement.remaining <= ARRIVAL_EPSILON {
        ship.x = movement.target.x;
        ship.y = movement.target.y;
        if let Some(label) = movement.final_label() {
            if ship.sector != label {
                ship.sector = label.to_string();
                advance.crossings.push(SectorCrossing {
                    ship_id: ship.id.clone(),
                    sector: label.to_string(),
                });
            }
        }
        ship.movement = None;
        advance.arrived = true;
    }

    advance
}
