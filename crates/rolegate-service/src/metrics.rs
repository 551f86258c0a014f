use std::sync::atomic::{AtomicU64, Ordering};

use rolegate_core::model::CheckResult;

#[derive(Debug, Default)]
pub struct Metrics {
    checks_total: AtomicU64,
    checks_allowed: AtomicU64,
    checks_denied: AtomicU64,
    checks_failed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    matrix_total: AtomicU64,
    invalidations: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_check(&self, result: &CheckResult) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        if result.allowed {
            self.checks_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.checks_denied.fetch_add(1, Ordering::Relaxed);
        }
        if result.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A failed check is also a denial.
    pub fn record_check_failure(&self) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        self.checks_failed.fetch_add(1, Ordering::Relaxed);
        self.checks_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matrix(&self) {
        self.matrix_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn checks_total(&self) -> u64 {
        self.checks_total.load(Ordering::Relaxed)
    }

    pub fn checks_allowed(&self) -> u64 {
        self.checks_allowed.load(Ordering::Relaxed)
    }

    pub fn checks_denied(&self) -> u64 {
        self.checks_denied.load(Ordering::Relaxed)
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks_failed.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn matrix_total(&self) -> u64 {
        self.matrix_total.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let counters = [
            ("rolegate_checks_total", "Total permission checks.", self.checks_total()),
            ("rolegate_checks_allowed_total", "Checks that resolved to allow.", self.checks_allowed()),
            ("rolegate_checks_denied_total", "Checks that resolved to deny.", self.checks_denied()),
            ("rolegate_checks_failed_total", "Checks that failed closed.", self.checks_failed()),
            ("rolegate_cache_hits_total", "Decision cache hits.", self.cache_hits()),
            ("rolegate_cache_misses_total", "Decision cache misses.", self.cache_misses()),
            ("rolegate_matrix_total", "Permission matrices computed.", self.matrix_total()),
            ("rolegate_invalidations_total", "Per-user cache invalidations.", self.invalidations()),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n"));
        }
        output
    }
}
