use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
};

use rand::Rng;

use crate::catalog::ImagePool;
use crate::config::{Config, MismatchRotation, Orientation};
use crate::{info, warn};

/// Duplicate-avoidance retry cap, kept from the original behavior. Best
/// effort only: with more monitors than candidates a duplicate is accepted
/// rather than failing the tick.
const MAX_DUPLICATE_ATTEMPTS: usize = 50;

/// Per-monitor wallpaper rules, keyed by monitor id. A monitor without a
/// policy entry is inactive and never receives an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorPolicy {
    pub desired_orientation: Orientation,
    pub allow_all_orientations: bool,
    pub mismatch_rotation: MismatchRotation,
}

pub fn policies_from_config(config: &Config) -> BTreeMap<String, MonitorPolicy> {
    config
        .active_monitors
        .iter()
        .map(|(id, orientation)| {
            (
                id.clone(),
                MonitorPolicy {
                    desired_orientation: *orientation,
                    allow_all_orientations: config
                        .allow_all_orientations
                        .get(id)
                        .copied()
                        .unwrap_or(false),
                    mismatch_rotation: config
                        .mismatch_rotation
                        .get(id)
                        .copied()
                        .unwrap_or_default(),
                },
            )
        })
        .collect()
}

/// All mutable scheduling state, owned by the control thread. Mutations go
/// through `apply_scan_result`, `set_policy`/`remove_policy` and
/// `select_for_tick` only.
#[derive(Debug, Default)]
pub struct EngineState {
    policies: BTreeMap<String, MonitorPolicy>,
    pool: ImagePool,
    cursors: BTreeMap<String, usize>,
    last_assigned: BTreeMap<String, PathBuf>,
}

impl EngineState {
    pub fn new(policies: BTreeMap<String, MonitorPolicy>) -> Self {
        Self {
            policies,
            ..Self::default()
        }
    }

    pub fn policy(&self, id: &str) -> Option<&MonitorPolicy> {
        self.policies.get(id)
    }

    pub fn set_policy(&mut self, id: &str, policy: MonitorPolicy) {
        self.policies.insert(id.to_string(), policy);
    }

    pub fn remove_policy(&mut self, id: &str) {
        self.policies.remove(id);
        self.cursors.remove(id);
        self.last_assigned.remove(id);
    }

    pub fn replace_policies(&mut self, policies: BTreeMap<String, MonitorPolicy>) {
        self.last_assigned.retain(|id, _| policies.contains_key(id));
        self.cursors.retain(|id, _| policies.contains_key(id));
        self.policies = policies;
    }

    pub fn pool(&self) -> &ImagePool {
        &self.pool
    }

    pub fn last_assigned(&self, id: &str) -> Option<&PathBuf> {
        self.last_assigned.get(id)
    }

    pub fn cursor(&self, id: &str) -> Option<usize> {
        self.cursors.get(id).copied()
    }

    /// Installs a freshly scanned pool and re-seeds the per-monitor cursors.
    ///
    /// Monitors are walked in stable id order; same-orientation monitors get
    /// increasing offsets modulo their pool length, so right after a scan no
    /// two of them start on the same image.
    pub fn apply_scan_result(&mut self, pool: ImagePool) {
        self.pool = pool;
        self.cursors.clear();

        let mut portrait_seen = 0usize;
        let mut landscape_seen = 0usize;

        for (id, policy) in &self.policies {
            let (offset, pool_len) = match policy.desired_orientation {
                Orientation::Portrait => {
                    let offset = portrait_seen;
                    portrait_seen += 1;
                    (offset, self.oriented_len(Orientation::Portrait))
                }
                Orientation::Landscape => {
                    let offset = landscape_seen;
                    landscape_seen += 1;
                    (offset, self.oriented_len(Orientation::Landscape))
                }
            };

            let cursor = if pool_len > 0 { offset % pool_len } else { 0 };
            self.cursors.insert(id.clone(), cursor);
        }
    }

    fn oriented_len(&self, orientation: Orientation) -> usize {
        let oriented = self.pool.for_orientation(orientation);
        if oriented.is_empty() {
            self.pool.all.len()
        } else {
            oriented.len()
        }
    }

    /// Candidate list priority: allow-all wins, then the orientation pool
    /// (falling back to `all` when it is empty), then `all`.
    fn candidates(&self, policy: &MonitorPolicy, matching_enabled: bool) -> &[PathBuf] {
        if policy.allow_all_orientations {
            return &self.pool.all;
        }

        if matching_enabled {
            let oriented = self.pool.for_orientation(policy.desired_orientation);
            if oriented.is_empty() {
                &self.pool.all
            } else {
                oriented
            }
        } else {
            &self.pool.all
        }
    }

    /// Picks one image per active monitor, avoiding same-tick duplicates on
    /// a best-effort basis. Monitors with an empty candidate list are simply
    /// absent from the result. Iteration is in stable id order so collisions
    /// resolve the same way for a given random sequence.
    pub fn select_for_tick<R: Rng>(
        &mut self,
        matching_enabled: bool,
        rng: &mut R,
    ) -> BTreeMap<String, PathBuf> {
        let mut used: HashSet<PathBuf> = HashSet::new();
        let mut assignments: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut chosen_cursors: Vec<(String, usize)> = Vec::new();

        for (id, policy) in &self.policies {
            let candidates = self.candidates(policy, matching_enabled);
            let Some((index, forced_duplicate)) = pick_unused(candidates, &used, rng) else {
                info!("[ENGINE] No candidate images for monitor {id}; skipping this tick");
                continue;
            };

            let path = candidates[index].clone();
            if forced_duplicate {
                warn!(
                    "[ENGINE] Monitor {} reuses {} — fewer candidates than monitors",
                    id,
                    path.display()
                );
            }

            used.insert(path.clone());
            chosen_cursors.push((id.clone(), index));
            assignments.insert(id.clone(), path);
        }

        // Cursor updates are bookkeeping only; selection is stateless-random.
        for (id, index) in chosen_cursors {
            self.cursors.insert(id, index);
        }
        for (id, path) in &assignments {
            self.last_assigned.insert(id.clone(), path.clone());
        }

        assignments
    }
}

/// Draws a uniformly random candidate, retrying up to `min(50, len)` times
/// to find one not in `used`. Exhausting the attempts accepts the last draw
/// as a forced duplicate rather than failing.
pub fn pick_unused<R: Rng>(
    candidates: &[PathBuf],
    used: &HashSet<PathBuf>,
    rng: &mut R,
) -> Option<(usize, bool)> {
    if candidates.is_empty() {
        return None;
    }

    let max_attempts = candidates.len().min(MAX_DUPLICATE_ATTEMPTS);
    let mut index = rng.random_range(0..candidates.len());
    for _ in 1..max_attempts {
        if !used.contains(&candidates[index]) {
            return Some((index, false));
        }
        index = rng.random_range(0..candidates.len());
    }

    let forced = used.contains(&candidates[index]);
    Some((index, forced))
}
