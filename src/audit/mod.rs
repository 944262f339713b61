//! Audit logging for authorization decisions
//!
//! Provides a fire-and-forget audit trail with:
//! - Bounded queue; a full queue drops the record with a warning
//! - Single background worker delivering batches to an [`AuditSink`]
//! - Final synchronous drain on [`AuditLogger::stop`]
//!
//! Records that never reach the sink are counted in
//! [`AuditLogger::dropped_records`], including anything still queued when a
//! logger stops without a worker.

mod sink;

pub use sink::{AuditSink, CollectingAuditSink, TracingAuditSink};

use crate::config::AuditConfig;
use crate::model::{OrganizationId, PrincipalId, PrincipalRef, PrincipalType};
use crate::store::GrantSource;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Every completed check, allowed or not
    AccessCheck {
        action: String,
        resource: String,
        allowed: bool,
        reason: String,
    },
    /// A check that ended in Deny
    AccessDenied {
        action: String,
        resource: String,
        reason: String,
    },
    /// A grant source failed and was treated as empty
    GrantSourceUnavailable { source: GrantSource, reason: String },
    /// A stored policy was skipped
    MalformedPolicy { policy_id: String, reason: String },
    /// A resource permission with an uncompilable pattern was skipped
    MalformedResourcePermission {
        permission_id: String,
        reason: String,
    },
    /// The store returned rows outside the principal's scope
    ForeignGrantsDiscarded { source: GrantSource, count: usize },
}

/// Single audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub organization_id: OrganizationId,
    pub principal_type: PrincipalType,
    pub principal_id: PrincipalId,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    /// Create a new record stamped with the current time
    pub fn new(principal: &PrincipalRef, event: AuditEvent) -> Self {
        AuditRecord {
            timestamp: Utc::now(),
            organization_id: principal.organization_id.clone(),
            principal_type: principal.principal_type,
            principal_id: principal.id.clone(),
            event,
        }
    }

    pub fn is_denial(&self) -> bool {
        matches!(self.event, AuditEvent::AccessDenied { .. })
    }
}

/// Non-blocking audit logger with a background delivery thread
pub struct AuditLogger {
    sender: Sender<AuditRecord>,
    receiver: Receiver<AuditRecord>,
    batch_size: usize,
    /// Whether new records are accepted
    accepting: AtomicBool,
    /// Dropping this sender tells the worker to drain and exit
    shutdown: Mutex<Option<Sender<()>>>,
    dropped: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    /// Create a logger; records queue up until [`AuditLogger::start`]
    pub fn new(config: &AuditConfig) -> Self {
        let (sender, receiver) = channel::bounded(config.queue_capacity.max(1));
        AuditLogger {
            sender,
            receiver,
            batch_size: config.batch_size.max(1),
            accepting: AtomicBool::new(true),
            shutdown: Mutex::new(None),
            dropped: AtomicU64::new(0),
            worker: Mutex::new(None),
        }
    }

    /// Start the background worker
    ///
    /// Calling `start` on a running or stopped logger does nothing.
    pub fn start(&self, sink: Arc<dyn AuditSink>) {
        let mut worker = self.worker.lock();
        if worker.is_some() || !self.accepting.load(Ordering::SeqCst) {
            return;
        }

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let receiver = self.receiver.clone();
        let batch_size = self.batch_size;

        let handle = thread::Builder::new()
            .name("authz-audit".to_string())
            .spawn(move || {
                let mut batch = Vec::with_capacity(batch_size);

                loop {
                    channel::select! {
                        recv(receiver) -> msg => match msg {
                            Ok(record) => {
                                batch.push(record);
                                batch.extend(receiver.try_iter().take(batch_size - 1));
                                sink.write_batch(&batch);
                                batch.clear();
                            }
                            Err(_) => break,
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }

                // Final drain so a graceful stop loses nothing already queued
                let remaining: Vec<AuditRecord> = receiver.try_iter().collect();
                for chunk in remaining.chunks(batch_size) {
                    sink.write_batch(chunk);
                }
                debug!(drained = remaining.len(), "Audit worker stopped");
            });

        match handle {
            Ok(handle) => {
                *worker = Some(handle);
                *self.shutdown.lock() = Some(shutdown_tx);
            }
            Err(e) => warn!(error = %e, "Failed to spawn audit worker; records stay queued"),
        }
    }

    /// Stop intake, drain the queue and join the worker
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);

        // Worker lock first: a concurrent start() stores both handles under it
        let handle = self.worker.lock().take();
        self.shutdown.lock().take();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Audit worker panicked");
            }
        }

        // Never started, or a log() raced past the accepting check
        let leftover = self.receiver.try_iter().count() as u64;
        if leftover > 0 {
            let dropped = self.dropped.fetch_add(leftover, Ordering::Relaxed) + leftover;
            warn!(leftover, dropped_total = dropped, "Audit logger stopped with undelivered records");
        }
    }

    /// Queue a record (non-blocking); drops it when the queue is full or stopped
    pub fn log(&self, record: AuditRecord) {
        if !self.accepting.load(Ordering::SeqCst) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Audit logger stopped, dropping record");
            return;
        }

        match self.sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    organization = %record.organization_id,
                    principal = %record.principal_id,
                    dropped_total = dropped,
                    "Audit queue full, dropping record"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Audit queue disconnected, dropping record");
            }
        }
    }

    /// Records dropped so far
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records waiting for the worker
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for AuditLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(queue_capacity: usize) -> AuditConfig {
        AuditConfig {
            queue_capacity,
            batch_size: 8,
        }
    }

    fn record(n: usize) -> AuditRecord {
        AuditRecord::new(
            &PrincipalRef::user("org-a", "alice"),
            AuditEvent::AccessCheck {
                action: "blog:read".to_string(),
                resource: format!("blog/{}", n),
                allowed: true,
                reason: "test".to_string(),
            },
        )
    }

    #[test]
    fn test_full_queue_drops_records() {
        let logger = AuditLogger::new(&config(2));

        for i in 0..5 {
            logger.log(record(i));
        }

        assert_eq!(logger.queued(), 2);
        assert_eq!(logger.dropped_records(), 3);
    }

    #[test]
    fn test_worker_delivers_records() {
        let logger = AuditLogger::new(&config(128));
        let sink = Arc::new(CollectingAuditSink::new());
        logger.start(sink.clone());
        assert!(logger.is_running());

        for i in 0..20 {
            logger.log(record(i));
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while sink.len() < 20 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        logger.stop();

        assert_eq!(sink.len(), 20);
        assert!(sink.max_batch() <= 8);
    }

    #[test]
    fn test_stop_drains_queued_records() {
        let logger = AuditLogger::new(&AuditConfig {
            queue_capacity: 64,
            batch_size: 4,
        });

        // Queue before the worker exists, then stop immediately
        for i in 0..10 {
            logger.log(record(i));
        }
        let sink = Arc::new(CollectingAuditSink::new());
        logger.start(sink.clone());
        logger.stop();

        assert_eq!(sink.len(), 10);
        assert_eq!(logger.queued(), 0);
    }

    #[test]
    fn test_stop_without_worker_counts_queued_records() {
        let logger = AuditLogger::new(&config(16));
        for i in 0..6 {
            logger.log(record(i));
        }
        assert_eq!(logger.queued(), 6);

        logger.stop();
        assert_eq!(logger.queued(), 0);
        assert_eq!(logger.dropped_records(), 6);

        // A stopped logger cannot be restarted
        let sink = Arc::new(CollectingAuditSink::new());
        logger.start(sink.clone());
        assert!(!logger.is_running());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_records_after_stop_are_dropped() {
        let logger = AuditLogger::new(&config(8));
        logger.start(Arc::new(CollectingAuditSink::new()));
        logger.stop();

        logger.log(record(1));
        assert_eq!(logger.dropped_records(), 1);
        assert!(!logger.is_running());
    }

    #[test]
    fn test_record_serializes_flat() {
        let json = serde_json::to_value(record(7)).unwrap();
        assert_eq!(json["kind"], "access_check");
        assert_eq!(json["organization_id"], "org-a");
        assert_eq!(json["principal_type"], "user");
        assert_eq!(json["resource"], "blog/7");
    }
}
