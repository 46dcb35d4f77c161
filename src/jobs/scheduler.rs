use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::AppConfig;
use crate::jobs::JobError;
use crate::ops::{BackupService, BackupTrigger, OpsError};
use crate::services::domains::DomainVerifier;
use crate::services::ServiceError;

/// Pending domains checked per sweep
const SWEEP_BATCH: i64 = 50;

/// Background loops for scheduled backups and domain re-checks
pub struct Scheduler {
    backups: BackupService,
    verifier: DomainVerifier,
    backup_every: Option<Duration>,
    sweep_every: Option<Duration>,
    retention: usize,
}

impl Scheduler {
    pub fn new(backups: BackupService, verifier: DomainVerifier, config: &AppConfig) -> Self {
        Self {
            backups,
            verifier,
            backup_every: backup_interval(config.backup.schedule_interval_hours),
            sweep_every: non_zero_secs(config.domains.sweep_interval_secs),
            retention: config.backup.retention_count,
        }
    }

    /// Spawn the enabled loops. Each first fires one full interval after start.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        match self.backup_every {
            Some(every) => {
                let backups = self.backups.clone();
                let retention = self.retention;
                tracing::info!("Scheduled backups every {}h, keeping {}", every.as_secs() / 3600, retention);
                handles.push(tokio::spawn(async move {
                    let mut ticker = interval_at(Instant::now() + every, every);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        scheduled_backup(&backups, retention).await;
                    }
                }));
            }
            None => tracing::info!("Scheduled backups are disabled"),
        }

        if let Some(every) = self.sweep_every {
            let verifier = self.verifier.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    match verifier.sweep_due(SWEEP_BATCH).await {
                        Ok(0) => {}
                        Ok(checked) => tracing::debug!("Checked {} pending domain(s)", checked),
                        Err(ServiceError::Database(e)) => tracing::warn!("Domain sweep skipped: {}", e),
                        Err(e) => tracing::error!("Domain sweep failed: {}", e),
                    }
                }
            }));
        }

        handles
    }
}

/// One scheduled backup followed by pruning. Skipped while another system
/// operation holds the slot.
pub async fn scheduled_backup(backups: &BackupService, retention: usize) {
    match backups.run_now(BackupTrigger::Scheduled, None).await {
        Ok(backup) => tracing::info!(backup_id = %backup.id, "Scheduled backup written"),
        Err(OpsError::Job(JobError::Busy(msg))) => {
            tracing::info!("Scheduled backup skipped: {}", msg);
            return;
        }
        Err(e) => {
            tracing::error!("Scheduled backup failed: {}", e);
            return;
        }
    }

    match backups.prune_scheduled(retention).await {
        Ok(0) => {}
        Ok(removed) => tracing::info!("Pruned {} scheduled backup(s)", removed),
        Err(e) => tracing::error!("Backup pruning failed: {}", e),
    }
}

pub fn backup_interval(hours: u64) -> Option<Duration> {
    non_zero_secs(hours.saturating_mul(3600))
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_disables_loops() {
        assert_eq!(backup_interval(0), None);
        assert_eq!(backup_interval(24), Some(Duration::from_secs(86_400)));
        assert_eq!(non_zero_secs(0), None);
        assert_eq!(non_zero_secs(90), Some(Duration::from_secs(90)));
    }
}
