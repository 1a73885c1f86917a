//! Start-on-boot policy.
//!
//! When the host reports that the system is ready, the persisted settings
//! are consulted and, if auto-start is enabled, the supervisor is started
//! in the saved mode after a grace period. The policy fires and forgets:
//! failures only show up in the supervisor's log buffer.

use crate::clock::{Clock, TimerHandle};
use crate::settings::SettingsStore;
use crate::supervisor::Supervisor;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default grace period between "system ready" and the start
pub const DEFAULT_AUTO_START_DELAY: Duration = Duration::from_secs(10);

pub struct AutoStartPolicy {
    settings: SettingsStore,
    clock: Arc<dyn Clock>,
    delay: Duration,
}

impl AutoStartPolicy {
    pub fn new(settings: SettingsStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            delay: DEFAULT_AUTO_START_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Handle the host's "system ready" event.
    ///
    /// Returns the pending start, or `None` when auto-start is disabled.
    pub fn on_system_ready(&self, supervisor: &Supervisor) -> Option<TimerHandle> {
        let settings = match self.settings.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to read auto-start settings, not starting");
                return None;
            }
        };
        debug!(
            auto_start = settings.auto_start,
            mode = %settings.mode,
            "Loaded auto-start settings"
        );

        if !settings.auto_start {
            debug!("Auto-start disabled, not starting");
            return None;
        }

        let mode = settings.mode;
        info!(
            mode = %mode,
            delay_secs = self.delay.as_secs(),
            "Auto-start enabled, scheduling start"
        );

        let supervisor = supervisor.clone();
        let handle = self.clock.schedule(
            self.delay,
            async move {
                info!(mode = %mode, "Auto-starting FRP");
                supervisor.start(mode).await;
            }
            .boxed(),
        );
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::mode::Mode;
    use crate::provision::BinaryAssets;
    use crate::settings::Settings;
    use crate::supervisor::Phase;
    use tempfile::TempDir;

    fn policy(tmp: &TempDir) -> AutoStartPolicy {
        AutoStartPolicy::new(SettingsStore::in_dir(tmp.path()), Arc::new(TokioClock::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_does_nothing() {
        let tmp = TempDir::new().unwrap();
        let supervisor = Supervisor::builder(tmp.path(), BinaryAssets::new()).build();

        assert!(policy(&tmp).on_system_ready(&supervisor).is_none());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(supervisor.phase(), Phase::Idle);
        assert!(supervisor.log_buffer().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_settings_do_nothing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("settings.toml"), "auto_start = 'maybe'").unwrap();
        let supervisor = Supervisor::builder(tmp.path(), BinaryAssets::new()).build();

        assert!(policy(&tmp).on_system_ready(&supervisor).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabled_starts_saved_mode_after_delay() {
        let tmp = TempDir::new().unwrap();
        SettingsStore::in_dir(tmp.path())
            .save(&Settings {
                auto_start: true,
                mode: Mode::Server,
                ..Default::default()
            })
            .unwrap();
        // No bundled binaries: the start attempt fails, which is enough to observe it
        let supervisor = Supervisor::builder(tmp.path(), BinaryAssets::new()).build();

        let pending = policy(&tmp).on_system_ready(&supervisor);
        assert!(pending.is_some());

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(supervisor.phase(), Phase::Idle);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(supervisor.phase(), Phase::Failed);
        assert_eq!(supervisor.current_mode(), Mode::Server);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_auto_start_never_fires() {
        let tmp = TempDir::new().unwrap();
        SettingsStore::in_dir(tmp.path())
            .update(|s| s.auto_start = true)
            .unwrap();
        let supervisor = Supervisor::builder(tmp.path(), BinaryAssets::new()).build();

        let pending = policy(&tmp)
            .with_delay(Duration::from_secs(1))
            .on_system_ready(&supervisor)
            .unwrap();
        pending.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(supervisor.phase(), Phase::Idle);
    }
}
