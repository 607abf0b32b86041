//! Flag-backed readiness check for hosts without a platform probe.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::traits::ReadinessCheck;

/// A [`ReadinessCheck`] whose outcome is set by the host.
///
/// Useful when the real precondition is observed elsewhere (a platform
/// callback, a CLI flag) and pushed in. Remediation requests are counted
/// and logged; the host flips the flag when the remediation succeeds.
#[derive(Debug)]
pub struct FlagCheck {
    name: &'static str,
    satisfied: AtomicBool,
    evaluations: AtomicUsize,
    remediation_requests: AtomicUsize,
}

impl FlagCheck {
    pub fn new(name: &'static str, satisfied: bool) -> Self {
        Self {
            name,
            satisfied: AtomicBool::new(satisfied),
            evaluations: AtomicUsize::new(0),
            remediation_requests: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, satisfied: bool) {
        self.satisfied.store(satisfied, Ordering::SeqCst);
    }

    /// How many times the engine has evaluated this check.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn remediation_requests(&self) -> usize {
        self.remediation_requests.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.evaluations.store(0, Ordering::SeqCst);
        self.remediation_requests.store(0, Ordering::SeqCst);
    }
}

impl ReadinessCheck for FlagCheck {
    fn is_satisfied(&self) -> bool {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.satisfied.load(Ordering::SeqCst)
    }

    fn request_remediation(&self) {
        self.remediation_requests.fetch_add(1, Ordering::SeqCst);
        tracing::info!(check = self.name, "Remediation requested");
    }
}
