//! Polling watcher that republishes vehicle settings when the config file changes

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DiagnosticsConfig, VehicleSpec};

/// Run the vehicle settings watcher.
///
/// Polls `path` at the given interval. When the file's modification time
/// moves, the config is reloaded and its `[vehicle]` section is published on
/// `tx` if it differs from the current value. A file that fails to load is
/// reported and skipped; the previous settings stay in effect.
pub async fn run_vehicle_watcher(
    path: PathBuf,
    tx: watch::Sender<VehicleSpec>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut last_seen = modified_time(&path);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
        if tx.is_closed() {
            debug!("[Settings] No receivers left, stopping watcher");
            break;
        }

        let current = modified_time(&path);
        if current == last_seen {
            continue;
        }
        last_seen = current;
        if current.is_none() {
            warn!(
                path = %path.display(),
                "[Settings] Config file removed, keeping current vehicle"
            );
            continue;
        }

        match DiagnosticsConfig::load_from_file(&path) {
            Ok(cfg) => {
                if publish_vehicle(&tx, cfg.vehicle) {
                    info!(path = %path.display(), "[Settings] Vehicle settings reloaded");
                } else {
                    debug!(path = %path.display(), "[Settings] Config changed, vehicle unchanged");
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "[Settings] Reload failed"),
        }
    }
}

/// Publish `spec` unless it equals the current value. Returns whether
/// receivers were notified.
pub fn publish_vehicle(tx: &watch::Sender<VehicleSpec>, spec: VehicleSpec) -> bool {
    tx.send_if_modified(|current| {
        if *current == spec {
            false
        } else {
            *current = spec;
            true
        }
    })
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(path: &Path, final_drive_ratio: f64, bump_secs: u64) {
        let mut file = std::fs::File::create(path).expect("create config");
        writeln!(file, "[vehicle]\nfinal_drive_ratio = {final_drive_ratio}").expect("write");
        // Coarse filesystem clocks would otherwise hide back-to-back writes
        file.set_modified(SystemTime::now() + Duration::from_secs(bump_secs))
            .expect("set mtime");
    }

    #[test]
    fn identical_spec_is_not_republished() {
        let (tx, mut rx) = watch::channel(VehicleSpec::default());
        assert!(!publish_vehicle(&tx, VehicleSpec::default()));
        assert!(!rx.has_changed().expect("sender alive"));

        let changed = VehicleSpec { rim_in: 19.0, ..VehicleSpec::default() };
        assert!(publish_vehicle(&tx, changed.clone()));
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), changed);
    }

    #[tokio::test]
    async fn edited_file_reaches_receivers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vibesense.toml");
        write_config(&path, 3.08, 0);

        let (tx, mut rx) = watch::channel(VehicleSpec::default());
        let token = CancellationToken::new();
        let watcher = tokio::spawn(run_vehicle_watcher(
            path.clone(),
            tx,
            Duration::from_millis(10),
            token.clone(),
        ));
        // Let the watcher record the starting mtime
        tokio::time::sleep(Duration::from_millis(50)).await;

        write_config(&path, 4.1, 10);
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("update within timeout")
            .expect("sender alive");
        assert!((rx.borrow().final_drive_ratio - 4.1).abs() < 1e-12);

        token.cancel();
        watcher.await.expect("watcher task");
    }

    #[tokio::test]
    async fn broken_file_keeps_previous_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vibesense.toml");
        write_config(&path, 3.08, 0);

        let (tx, rx) = watch::channel(VehicleSpec::default());
        let token = CancellationToken::new();
        let watcher = tokio::spawn(run_vehicle_watcher(
            path.clone(),
            tx,
            Duration::from_millis(10),
            token.clone(),
        ));
        // Let the watcher record the starting mtime
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let mut file = std::fs::File::create(&path).expect("create config");
            writeln!(file, "[vehicle\nfinal_drive_ratio = ").expect("write");
            file.set_modified(SystemTime::now() + Duration::from_secs(10))
                .expect("set mtime");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!rx.has_changed().expect("sender alive"));

        token.cancel();
        watcher.await.expect("watcher task");
    }
}
