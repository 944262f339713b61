use super::{AuditEvent, AuditRecord};
use parking_lot::Mutex;
use tracing::info;

/// Destination for delivered audit batches
///
/// Called from the audit worker thread only, never on the decision path.
pub trait AuditSink: Send + Sync {
    fn write_batch(&self, records: &[AuditRecord]);
}

impl<F> AuditSink for F
where
    F: Fn(&[AuditRecord]) + Send + Sync,
{
    fn write_batch(&self, records: &[AuditRecord]) {
        self(records)
    }
}

/// Emits each record as a structured `tracing` event under the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write_batch(&self, records: &[AuditRecord]) {
        for record in records {
            let org = record.organization_id.as_str();
            let principal_type = record.principal_type.as_str();
            let principal = record.principal_id.as_str();

            match &record.event {
                AuditEvent::AccessCheck {
                    action,
                    resource,
                    allowed,
                    reason,
                } => info!(
                    target: "audit",
                    timestamp = %record.timestamp,
                    org, principal_type, principal,
                    action = %action, resource = %resource,
                    allowed, reason = %reason,
                    "access_check"
                ),
                AuditEvent::AccessDenied {
                    action,
                    resource,
                    reason,
                } => info!(
                    target: "audit",
                    timestamp = %record.timestamp,
                    org, principal_type, principal,
                    action = %action, resource = %resource, reason = %reason,
                    "access_denied"
                ),
                AuditEvent::GrantSourceUnavailable { source, reason } => info!(
                    target: "audit",
                    timestamp = %record.timestamp,
                    org, principal_type, principal,
                    source = %source, reason = %reason,
                    "grant_source_unavailable"
                ),
                AuditEvent::MalformedPolicy { policy_id, reason } => info!(
                    target: "audit",
                    timestamp = %record.timestamp,
                    org, principal_type, principal,
                    policy_id = %policy_id, reason = %reason,
                    "malformed_policy"
                ),
                AuditEvent::MalformedResourcePermission {
                    permission_id,
                    reason,
                } => info!(
                    target: "audit",
                    timestamp = %record.timestamp,
                    org, principal_type, principal,
                    permission_id = %permission_id, reason = %reason,
                    "malformed_resource_permission"
                ),
                AuditEvent::ForeignGrantsDiscarded { source, count } => info!(
                    target: "audit",
                    timestamp = %record.timestamp,
                    org, principal_type, principal,
                    source = %source, count,
                    "foreign_grants_discarded"
                ),
            }
        }
    }
}

/// Keeps every delivered record in memory
#[derive(Debug, Default)]
pub struct CollectingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    max_batch: Mutex<usize>,
}

impl CollectingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of delivered records in delivery order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Delivered `AccessDenied` records
    pub fn denials(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.is_denial())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Largest batch seen so far
    pub fn max_batch(&self) -> usize {
        *self.max_batch.lock()
    }
}

impl AuditSink for CollectingAuditSink {
    fn write_batch(&self, records: &[AuditRecord]) {
        let mut max_batch = self.max_batch.lock();
        *max_batch = (*max_batch).max(records.len());
        self.records.lock().extend_from_slice(records);
    }
}
