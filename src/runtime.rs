use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use rand::Rng;

use crate::catalog::{self, ImagePool};
use crate::config::{Config, FitMode, Orientation};
use crate::display::DisplaySurface;
use crate::engine::{policies_from_config, EngineState};
use crate::monitors::Monitor;
use crate::scheduler::RotationSchedule;
use crate::transform::Transformer;
use crate::{info, warn};

/// Runs directory scans off the control thread. At most one scan is in
/// flight so two scan generations can never race each other; a request made
/// while one is running is deferred (latest request wins) and issued as soon
/// as the running scan drains, so a directory change is never lost.
pub struct ScanWorker {
    receiver: Option<Receiver<ImagePool>>,
    deferred: Option<(PathBuf, bool)>,
}

impl ScanWorker {
    pub fn new() -> Self {
        Self {
            receiver: None,
            deferred: None,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.receiver.is_some()
    }

    /// Returns true when the scan started immediately, false when it was
    /// deferred behind the one already running.
    pub fn request(&mut self, root: PathBuf, orientation_matching_enabled: bool) -> bool {
        if self.receiver.is_some() {
            warn!(
                "[SCAN] Scan of {} deferred until the running scan finishes",
                root.display()
            );
            self.deferred = Some((root, orientation_matching_enabled));
            return false;
        }

        self.spawn(root, orientation_matching_enabled);
        true
    }

    fn spawn(&mut self, root: PathBuf, orientation_matching_enabled: bool) {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            info!("[SCAN] Scanning {}", root.display());
            let pool = catalog::scan(&root, orientation_matching_enabled, None);
            info!(
                "[SCAN] Found {} image(s): {} portrait, {} landscape",
                pool.all.len(),
                pool.portrait.len(),
                pool.landscape.len()
            );
            let _ = tx.send(pool);
        });

        self.receiver = Some(rx);
    }

    /// Non-blocking; returns the finished pool once, then starts any
    /// deferred scan.
    pub fn poll(&mut self) -> Option<ImagePool> {
        let receiver = self.receiver.as_ref()?;
        let result = match receiver.try_recv() {
            Ok(pool) => Some(pool),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                warn!("[SCAN] Scan worker exited without a result");
                None
            }
        };

        self.receiver = None;
        if let Some((root, matching)) = self.deferred.take() {
            self.spawn(root, matching);
        }
        result
    }
}

/// Owns everything a rotation tick touches. All methods run on the control
/// thread; the only concurrency is the scan worker, which communicates by
/// handing back a finished pool.
pub struct RotatorRuntime<S: DisplaySurface> {
    surface: S,
    /// Geometry-derived orientation per monitor id, fixed at enumeration.
    /// The transform decision compares against this, not the configured
    /// desired orientation, which a hand-edited config can diverge from.
    physical_orientations: BTreeMap<String, Orientation>,
    state: EngineState,
    transformer: Option<Transformer>,
    schedule: RotationSchedule,
    wallpaper_root: Option<PathBuf>,
    matching_enabled: bool,
    fit_mode: FitMode,
}

impl<S: DisplaySurface> RotatorRuntime<S> {
    pub fn new(surface: S, monitors: &[Monitor], config: &Config) -> Self {
        Self {
            surface,
            physical_orientations: monitors
                .iter()
                .map(|m| (m.id.clone(), m.orientation()))
                .collect(),
            state: EngineState::new(policies_from_config(config)),
            transformer: config
                .wallpaper_directory
                .as_deref()
                .map(Transformer::new),
            schedule: RotationSchedule::new(Duration::from_secs(
                config.rotation_interval_minutes * 60,
            )),
            wallpaper_root: config.wallpaper_directory.clone(),
            matching_enabled: config.orientation_matching_enabled,
            fit_mode: config.fit_mode,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn wallpaper_root(&self) -> Option<&PathBuf> {
        self.wallpaper_root.as_ref()
    }

    pub fn matching_enabled(&self) -> bool {
        self.matching_enabled
    }

    pub fn running(&self) -> bool {
        self.schedule.running()
    }

    /// Installs updated settings. Returns true when the wallpaper directory
    /// changed, which is the caller's cue to kick off a new scan. A pending
    /// rotation deadline is not disturbed.
    pub fn apply_config(&mut self, config: &Config) -> bool {
        self.matching_enabled = config.orientation_matching_enabled;
        self.fit_mode = config.fit_mode;
        self.schedule
            .set_interval(Duration::from_secs(config.rotation_interval_minutes * 60));
        self.state.replace_policies(policies_from_config(config));

        let directory_changed = self.wallpaper_root != config.wallpaper_directory;
        if directory_changed {
            self.wallpaper_root = config.wallpaper_directory.clone();
            self.transformer = config
                .wallpaper_directory
                .as_deref()
                .map(Transformer::new);
        }
        directory_changed
    }

    pub fn apply_scan(&mut self, pool: ImagePool) {
        if pool.is_empty() {
            warn!("[RUNTIME] Scan produced no usable images; rotation will skip ticks");
        }
        self.state.apply_scan_result(pool);
    }

    /// Arms the schedule and rotates immediately when this call started it.
    pub fn start<R: Rng>(&mut self, now: Instant, rng: &mut R) {
        if self.schedule.start(now) {
            info!("[RUNTIME] Rotation started");
            self.rotate_now(rng);
        }
    }

    /// Stops the schedule. Files painted by the last tick stay on disk since
    /// the desktop is still showing them; everything else is swept.
    pub fn stop(&mut self) {
        if self.schedule.running() {
            info!("[RUNTIME] Rotation stopped");
        }
        self.schedule.stop();
        if let Some(transformer) = &mut self.transformer {
            transformer.cleanup();
        }
    }

    /// Fires a tick if the rotation deadline has passed.
    pub fn poll<R: Rng>(&mut self, now: Instant, rng: &mut R) {
        if self.schedule.poll(now) {
            self.rotate_now(rng);
        }
    }

    /// One rotation tick: select an image per active monitor, rotate
    /// mismatched ones, paint, then sweep stale generated files. A paint
    /// failure on one monitor never blocks the others. Returns the number of
    /// monitors painted.
    pub fn rotate_now<R: Rng>(&mut self, rng: &mut R) -> usize {
        if let Some(transformer) = &mut self.transformer {
            transformer.begin_tick();
        }

        let assignments = self.state.select_for_tick(self.matching_enabled, rng);
        if assignments.is_empty() {
            info!("[RUNTIME] Nothing to paint this tick");
            return 0;
        }

        let mut painted = 0usize;
        for (id, source) in &assignments {
            let Some(policy) = self.state.policy(id).copied() else {
                continue;
            };
            let monitor_orientation = self
                .physical_orientations
                .get(id)
                .copied()
                .unwrap_or(policy.desired_orientation);

            let path = match &mut self.transformer {
                Some(transformer) => {
                    let path =
                        transformer.prepare(monitor_orientation, policy.mismatch_rotation, source);
                    // The path the desktop is about to show must outlive this
                    // tick's sweep even when it was not generated just now
                    transformer.mark_live(&path);
                    path
                }
                None => source.clone(),
            };

            match self.surface.paint(id, &path) {
                Ok(()) => {
                    painted += 1;
                    info!("[RUNTIME] {} <- {}", id, path.display());
                }
                Err(e) => warn!("[RUNTIME] Paint failed for {id}: {e}"),
            }
        }

        if painted > 0 {
            if let Err(e) = self.surface.set_fit_mode(self.fit_mode) {
                warn!("[RUNTIME] Could not apply fit mode: {e}");
            }
            self.surface.refresh();
        }

        if let Some(transformer) = &mut self.transformer {
            transformer.cleanup();
        }

        painted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;

    use rand::{rngs::StdRng, SeedableRng};

    use crate::config::{MismatchRotation, Orientation};
    use crate::display::testing::RecordingSurface;
    use crate::transform::GENERATED_DIR;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn runtime_for(surface: RecordingSurface, config: &Config) -> RotatorRuntime<RecordingSurface> {
        let monitors = crate::monitors::enumerate(&surface).unwrap();
        RotatorRuntime::new(surface, &monitors, config)
    }

    fn config_for(ids: &[(&str, Orientation)]) -> Config {
        let mut config = Config::default();
        for (id, orientation) in ids {
            config
                .active_monitors
                .insert(id.to_string(), *orientation);
        }
        config
    }

    fn pool_of(names: &[&str]) -> ImagePool {
        let all: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
        ImagePool {
            landscape: all.clone(),
            portrait: Vec::new(),
            all,
        }
    }

    fn write_image(path: &Path, width: u32, height: u32) {
        image::RgbImage::new(width, height).save(path).unwrap();
    }

    #[test]
    fn tick_paints_every_active_monitor_and_applies_fit_mode() {
        let surface = RecordingSurface::with_geometry(&[("m1", 1920, 1080), ("m2", 1920, 1080)]);
        let config = config_for(&[
            ("m1", Orientation::Landscape),
            ("m2", Orientation::Landscape),
        ]);

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(pool_of(&["a.png", "b.png", "c.png"]));

        let painted = runtime.rotate_now(&mut rng());

        assert_eq!(painted, 2);
        let paints = runtime.surface().paints.borrow();
        let ids: HashSet<_> = paints.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, HashSet::from(["m1".to_string(), "m2".to_string()]));
        assert_eq!(
            runtime.surface().fit_modes.borrow().as_slice(),
            &[FitMode::Fill]
        );
    }

    #[test]
    fn paint_failure_on_one_monitor_does_not_block_the_rest() {
        let mut surface =
            RecordingSurface::with_geometry(&[("m1", 1920, 1080), ("m2", 1920, 1080)]);
        surface.fail_paints_for("m1");
        let config = config_for(&[
            ("m1", Orientation::Landscape),
            ("m2", Orientation::Landscape),
        ]);

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(pool_of(&["a.png", "b.png"]));

        let painted = runtime.rotate_now(&mut rng());

        assert_eq!(painted, 1);
        assert_eq!(runtime.surface().paints.borrow()[0].0, "m2");
    }

    #[test]
    fn empty_pool_paints_nothing() {
        let surface = RecordingSurface::with_geometry(&[("m1", 1920, 1080)]);
        let config = config_for(&[("m1", Orientation::Landscape)]);

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(ImagePool::default());

        assert_eq!(runtime.rotate_now(&mut rng()), 0);
        assert_eq!(runtime.surface().paint_count(), 0);
        assert!(runtime.surface().fit_modes.borrow().is_empty());
    }

    #[test]
    fn start_rotates_immediately_and_only_once() {
        let surface = RecordingSurface::with_geometry(&[("m1", 1920, 1080)]);
        let config = config_for(&[("m1", Orientation::Landscape)]);

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(pool_of(&["a.png", "b.png"]));

        let t0 = Instant::now();
        let mut seeded = rng();
        runtime.start(t0, &mut seeded);
        assert_eq!(runtime.surface().paint_count(), 1);

        // A second start while running does nothing
        runtime.start(t0 + Duration::from_secs(1), &mut seeded);
        assert_eq!(runtime.surface().paint_count(), 1);
    }

    #[test]
    fn no_tick_fires_after_stop() {
        let surface = RecordingSurface::with_geometry(&[("m1", 1920, 1080)]);
        let config = config_for(&[("m1", Orientation::Landscape)]);

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(pool_of(&["a.png", "b.png"]));

        let t0 = Instant::now();
        let mut seeded = rng();
        runtime.start(t0, &mut seeded);
        let after_start = runtime.surface().paint_count();

        runtime.stop();
        assert!(!runtime.running());
        runtime.poll(t0 + Duration::from_secs(86_400), &mut seeded);
        assert_eq!(runtime.surface().paint_count(), after_start);
    }

    #[test]
    fn scheduled_poll_rotates_when_due() {
        let surface = RecordingSurface::with_geometry(&[("m1", 1920, 1080)]);
        let mut config = config_for(&[("m1", Orientation::Landscape)]);
        config.rotation_interval_minutes = 1;

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(pool_of(&["a.png", "b.png"]));

        let t0 = Instant::now();
        let mut seeded = rng();
        runtime.start(t0, &mut seeded);

        runtime.poll(t0 + Duration::from_secs(30), &mut seeded);
        assert_eq!(runtime.surface().paint_count(), 1);

        runtime.poll(t0 + Duration::from_secs(60), &mut seeded);
        assert_eq!(runtime.surface().paint_count(), 2);
    }

    #[test]
    fn mismatched_image_is_painted_from_the_generated_copy() {
        let dir = tempfile::tempdir().unwrap();
        let wide = dir.path().join("wide.png");
        write_image(&wide, 40, 20);

        let surface = RecordingSurface::with_geometry(&[("m1", 1080, 1920)]);
        let mut config = config_for(&[("m1", Orientation::Portrait)]);
        config.wallpaper_directory = Some(dir.path().to_path_buf());
        config
            .mismatch_rotation
            .insert("m1".to_string(), MismatchRotation::Left);

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(catalog::scan(dir.path(), true, None));

        assert_eq!(runtime.rotate_now(&mut rng()), 1);
        let painted = runtime.surface().paints.borrow()[0].1.clone();
        assert_eq!(
            painted,
            dir.path().join(GENERATED_DIR).join("rotated_left_wide.png")
        );
        assert!(painted.exists());
    }

    #[test]
    fn config_change_swaps_policies_and_reports_directory_moves() {
        let surface = RecordingSurface::with_geometry(&[("m1", 1920, 1080)]);
        let config = config_for(&[("m1", Orientation::Landscape)]);

        let mut runtime = runtime_for(surface, &config);

        let mut updated = config.clone();
        updated.fit_mode = FitMode::Fit;
        assert!(!runtime.apply_config(&updated));

        updated.wallpaper_directory = Some(PathBuf::from("/somewhere/else"));
        assert!(runtime.apply_config(&updated));
        assert_eq!(
            runtime.wallpaper_root(),
            Some(&PathBuf::from("/somewhere/else"))
        );
    }

    fn await_pool(worker: &mut ScanWorker) -> ImagePool {
        for _ in 0..200 {
            if let Some(result) = worker.poll() {
                return result;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("scan did not finish in time");
    }

    #[test]
    fn scan_worker_runs_one_scan_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("a.png"), 40, 20);

        let mut worker = ScanWorker::new();
        assert!(worker.request(dir.path().to_path_buf(), true));
        assert!(!worker.request(dir.path().to_path_buf(), true));

        let pool = await_pool(&mut worker);
        assert_eq!(pool.all.len(), 1);
    }

    #[test]
    fn deferred_scan_request_runs_after_the_current_one_drains() {
        let old_dir = tempfile::tempdir().unwrap();
        write_image(&old_dir.path().join("a.png"), 40, 20);
        let new_dir = tempfile::tempdir().unwrap();
        write_image(&new_dir.path().join("b.png"), 40, 20);
        write_image(&new_dir.path().join("c.png"), 40, 20);

        let mut worker = ScanWorker::new();
        assert!(worker.request(old_dir.path().to_path_buf(), true));
        // Arrives mid-scan, e.g. the wallpaper directory just changed
        assert!(!worker.request(new_dir.path().to_path_buf(), true));

        let first = await_pool(&mut worker);
        assert_eq!(first.all.len(), 1);

        // Draining the first scan started the deferred one
        assert!(worker.in_flight());
        let second = await_pool(&mut worker);
        assert_eq!(second.all.len(), 2);
        assert!(!worker.in_flight());
    }

    #[test]
    fn assigned_file_inside_the_generated_dir_survives_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let generated_dir = dir.path().join(GENERATED_DIR);
        std::fs::create_dir_all(&generated_dir).unwrap();
        let leftover = generated_dir.join("rotated_left_wide.png");
        write_image(&leftover, 20, 40);

        let surface = RecordingSurface::with_geometry(&[("m1", 1080, 1920)]);
        let mut config = config_for(&[("m1", Orientation::Portrait)]);
        config.wallpaper_directory = Some(dir.path().to_path_buf());

        let mut runtime = runtime_for(surface, &config);
        // A pool that carries the leftover rotated copy as a candidate
        runtime.apply_scan(ImagePool {
            all: vec![leftover.clone()],
            portrait: vec![leftover.clone()],
            landscape: Vec::new(),
        });

        assert_eq!(runtime.rotate_now(&mut rng()), 1);
        assert_eq!(runtime.surface().paints.borrow()[0].1, leftover);
        assert!(leftover.exists());
    }

    #[test]
    fn transform_compares_against_the_physical_monitor_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let wide = dir.path().join("wide.png");
        write_image(&wide, 40, 20);

        // Physically landscape monitor whose config asks for portrait images
        let surface = RecordingSurface::with_geometry(&[("m1", 1920, 1080)]);
        let mut config = config_for(&[("m1", Orientation::Portrait)]);
        config.wallpaper_directory = Some(dir.path().to_path_buf());
        config
            .mismatch_rotation
            .insert("m1".to_string(), MismatchRotation::Left);

        let mut runtime = runtime_for(surface, &config);
        runtime.apply_scan(catalog::scan(dir.path(), true, None));

        // The image already matches the screen it lands on, so no rotation
        assert_eq!(runtime.rotate_now(&mut rng()), 1);
        assert_eq!(runtime.surface().paints.borrow()[0].1, wide);
        assert!(!dir.path().join(GENERATED_DIR).exists());
    }
}
