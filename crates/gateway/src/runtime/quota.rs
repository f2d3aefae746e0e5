//! Quota gate.
//!
//! The visitor-fingerprint quota counter is an external collaborator; the
//! orchestrator only sees this trait: a pre-turn check (exhaustion closes
//! the channel with the dedicated code before any turn work) and a
//! post-turn debit feeding the `quota_update` event. The in-tree
//! implementation is an in-memory daily counter with UTC rollover.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use rg_domain::config::QuotaConfig;

/// Counter snapshot sent to the client after each turn.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaSnapshot {
    pub used: u32,
    pub limit: Option<u32>,
}

/// Returned when the fingerprint has spent its daily budget.
#[derive(Debug)]
pub struct QuotaExhausted {
    pub used: u32,
    pub limit: u32,
}

pub trait QuotaGate: Send + Sync {
    /// Pre-turn check; `Err` means the turn must not start.
    fn check(&self, fingerprint: &str) -> Result<QuotaSnapshot, QuotaExhausted>;

    /// Debit one message post-turn and return the new snapshot.
    fn debit(&self, fingerprint: &str) -> QuotaSnapshot;
}

/// In-memory daily message counter, auto-resetting at UTC midnight.
pub struct DailyQuota {
    limit: Option<u32>,
    usage: RwLock<HashMap<String, (NaiveDate, u32)>>,
}

impl DailyQuota {
    pub fn new(cfg: &QuotaConfig) -> Self {
        Self {
            limit: cfg.daily_messages,
            usage: RwLock::new(HashMap::new()),
        }
    }

    fn used_today(&self, fingerprint: &str) -> u32 {
        let today = Utc::now().date_naive();
        match self.usage.read().get(fingerprint) {
            Some((date, used)) if *date == today => *used,
            _ => 0,
        }
    }
}

impl QuotaGate for DailyQuota {
    fn check(&self, fingerprint: &str) -> Result<QuotaSnapshot, QuotaExhausted> {
        let used = self.used_today(fingerprint);
        if let Some(limit) = self.limit {
            if used >= limit {
                return Err(QuotaExhausted { used, limit });
            }
        }
        Ok(QuotaSnapshot { used, limit: self.limit })
    }

    fn debit(&self, fingerprint: &str) -> QuotaSnapshot {
        let today = Utc::now().date_naive();
        let mut usage = self.usage.write();
        let entry = usage.entry(fingerprint.to_owned()).or_insert((today, 0));
        if entry.0 != today {
            *entry = (today, 0);
        }
        entry.1 += 1;
        QuotaSnapshot {
            used: entry.1,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(limit: Option<u32>) -> DailyQuota {
        DailyQuota::new(&QuotaConfig { daily_messages: limit })
    }

    #[test]
    fn fresh_fingerprint_passes() {
        let quota = gate(Some(3));
        let snap = quota.check("fp1").unwrap();
        assert_eq!(snap.used, 0);
        assert_eq!(snap.limit, Some(3));
    }

    #[test]
    fn debit_until_exhausted() {
        let quota = gate(Some(2));
        quota.debit("fp1");
        assert!(quota.check("fp1").is_ok());
        quota.debit("fp1");
        let err = quota.check("fp1").unwrap_err();
        assert_eq!(err.used, 2);
        assert_eq!(err.limit, 2);
    }

    #[test]
    fn fingerprints_count_separately() {
        let quota = gate(Some(1));
        quota.debit("fp1");
        assert!(quota.check("fp1").is_err());
        assert!(quota.check("fp2").is_ok());
    }

    #[test]
    fn unlimited_never_exhausts() {
        let quota = gate(None);
        for _ in 0..100 {
            quota.debit("fp1");
        }
        assert!(quota.check("fp1").is_ok());
    }
}
