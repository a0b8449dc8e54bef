//! Waiting for the binding file to appear
//!
//! Polling starts at the configured interval and backs off exponentially up to
//! a ceiling. An optional overall timeout turns an absent file into a fatal
//! error instead of blocking startup forever.

use super::binding::{parse_bindings, select_binding, BindingEntry, BrokerAddress, TopicBinding};
use super::DiscoveryError;
use crate::config::DeviceConfig;
use crate::observability::metrics::metrics;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Poll cadence for the binding file
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    /// Delay after the first miss
    pub initial: Duration,
    /// Ceiling for the doubled delay
    pub max: Duration,
    /// Overall bound on waiting (None = unbounded)
    pub timeout: Option<Duration>,
}

impl PollSchedule {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            initial: config.poll_interval(),
            max: config.max_poll_interval(),
            timeout: config.discovery_timeout(),
        }
    }

    /// Delay before the next check after `attempt` misses (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial.saturating_mul(1u32 << exponent);
        delay.min(self.max.max(self.initial))
    }
}

/// Outcome of a successful discovery
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBinding {
    pub binding: TopicBinding,
    pub broker: BrokerAddress,
    /// Every parsed entry, the selected one first
    pub entries: Vec<BindingEntry>,
    pub path: PathBuf,
}

/// Resolves the active topic and broker from the working directory
#[derive(Debug, Clone)]
pub struct BindingDiscovery {
    file_name: String,
    broker_port: u16,
    schedule: PollSchedule,
}

impl BindingDiscovery {
    pub fn new(file_name: impl Into<String>, broker_port: u16, schedule: PollSchedule) -> Self {
        Self {
            file_name: file_name.into(),
            broker_port,
            schedule,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            config.discovery.file_name.clone(),
            config.broker.port,
            PollSchedule::from_config(config),
        )
    }

    pub fn binding_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.file_name)
    }

    /// Wait for the binding file in `working_dir`, then parse and select.
    ///
    /// A file that exists but holds no bindings yet is still being written and
    /// counts as absent. Malformed lines are fatal at once.
    pub async fn resolve(
        &self,
        working_dir: &Path,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ResolvedBinding, DiscoveryError> {
        let path = self.binding_path(working_dir);
        let (entries, misses) = self.wait_for_entries(&path, shutdown).await?;
        if misses > 0 {
            info!(path = %path.display(), misses, "Binding file appeared");
        }

        let (binding, broker) = select_binding(&entries, self.broker_port)?;
        if entries.len() > 1 {
            warn!(
                ignored = entries.len() - 1,
                "Binding file lists several bindings; only the first is used"
            );
        }
        info!(topic = %binding, broker = %broker, "Resolved broker binding");

        Ok(ResolvedBinding {
            binding,
            broker,
            entries,
            path,
        })
    }

    /// Poll until the file holds at least one binding. Returns the entries and
    /// the number of misses.
    async fn wait_for_entries(
        &self,
        path: &Path,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(Vec<BindingEntry>, u32), DiscoveryError> {
        let started = Instant::now();
        let mut misses = 0u32;

        loop {
            if *shutdown.borrow() {
                return Err(DiscoveryError::ShutdownRequested);
            }
            if let Some(entries) = self.load(path).await? {
                return Ok((entries, misses));
            }

            misses += 1;
            metrics().discovery_poll();

            let mut delay = self.schedule.delay_for(misses);
            if let Some(timeout) = self.schedule.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(DiscoveryError::Timeout {
                        path: path.display().to_string(),
                        waited_secs: timeout.as_secs(),
                    });
                }
                delay = delay.min(timeout - elapsed);
            }

            if misses == 1 {
                info!(path = %path.display(), "Waiting for binding file");
            } else {
                debug!(path = %path.display(), misses, delay_ms = delay.as_millis() as u64, "Binding file still absent or empty");
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender can never signal shutdown; finish the delay instead.
                    if changed.is_err() {
                        tokio::time::sleep(delay).await;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// None while the file is missing or still empty
    async fn load(&self, path: &Path) -> Result<Option<Vec<BindingEntry>>, DiscoveryError> {
        let read_error = |source| DiscoveryError::Read {
            path: path.display().to_string(),
            source,
        };

        if !tokio::fs::try_exists(path).await.map_err(read_error)? {
            return Ok(None);
        }
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            // Removed between the existence check and the read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_error(e)),
        };

        let entries = parse_bindings(&content)?;
        Ok((!entries.is_empty()).then_some(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fast_schedule(timeout: Option<Duration>) -> PollSchedule {
        PollSchedule {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
            timeout,
        }
    }

    #[test]
    fn test_delay_doubles_up_to_ceiling() {
        let schedule = fast_schedule(None);
        assert_eq!(schedule.delay_for(1), Duration::from_millis(10));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(20));
        assert_eq!(schedule.delay_for(3), Duration::from_millis(40));
        assert_eq!(schedule.delay_for(4), Duration::from_millis(40));
        assert_eq!(schedule.delay_for(1000), Duration::from_millis(40));
    }

    #[test]
    fn test_constant_cadence_when_ceiling_equals_initial() {
        let schedule = PollSchedule {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(1),
            timeout: None,
        };
        for attempt in 1..10 {
            assert_eq!(schedule.delay_for(attempt), Duration::from_secs(1));
        }
    }

    #[test]
    fn test_schedule_from_default_config() {
        let schedule = PollSchedule::from_config(&DeviceConfig::default());
        assert_eq!(schedule.initial, Duration::from_secs(1));
        assert_eq!(schedule.max, Duration::from_secs(1));
        assert_eq!(schedule.timeout, Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("connections.txt"), "sensor/dev01=10.0.0.5\n").unwrap();

        let discovery = BindingDiscovery::new("connections.txt", 1883, fast_schedule(None));
        let (_tx, mut rx) = watch::channel(false);
        let resolved = discovery.resolve(dir.path(), &mut rx).await.unwrap();

        assert_eq!(resolved.binding.component, "sensor");
        assert_eq!(resolved.broker, BrokerAddress::new("10.0.0.5", 1883));
        assert_eq!(resolved.path, dir.path().join("connections.txt"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("connections.txt"), "garbage\n").unwrap();

        let discovery = BindingDiscovery::new("connections.txt", 1883, fast_schedule(None));
        let (_tx, mut rx) = watch::channel(false);
        let result = discovery.resolve(dir.path(), &mut rx).await;

        assert!(matches!(result, Err(DiscoveryError::Malformed { line: 1, .. })));
    }

    #[tokio::test]
    async fn test_timeout_when_file_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = BindingDiscovery::new(
            "connections.txt",
            1883,
            fast_schedule(Some(Duration::from_millis(80))),
        );
        let (_tx, mut rx) = watch::channel(false);

        let started = std::time::Instant::now();
        let result = discovery.resolve(dir.path(), &mut rx).await;

        assert!(matches!(result, Err(DiscoveryError::Timeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_blank_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("connections.txt"), "\n  \n").unwrap();

        let discovery = BindingDiscovery::new(
            "connections.txt",
            1883,
            fast_schedule(Some(Duration::from_millis(60))),
        );
        let (_tx, mut rx) = watch::channel(false);
        let result = discovery.resolve(dir.path(), &mut rx).await;

        assert!(matches!(result, Err(DiscoveryError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_wait() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = BindingDiscovery::new("connections.txt", 1883, fast_schedule(None));
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = tx.send(true);
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            discovery.resolve(dir.path(), &mut rx),
        )
        .await
        .expect("shutdown should end discovery");
        assert!(matches!(result, Err(DiscoveryError::ShutdownRequested)));
    }
}
