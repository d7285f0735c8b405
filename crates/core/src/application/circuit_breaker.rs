// Per-Domain Circuit Breaker
//
// Tracks consecutive collaborator failures per DNS domain. Once a domain
// crosses the failure threshold its circuit opens and items targeting it are
// failed without dispatch, until the reset timeout expires or a success on
// that domain heals it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::application::constants::{
    DEFAULT_BREAKER_RESET_TIMEOUT_MS, DEFAULT_FAILURE_THRESHOLD,
};
use crate::port::TimeProvider;

/// Circuit breaker tuning
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long an open circuit stays open
    pub reset_timeout_ms: i64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: DEFAULT_BREAKER_RESET_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
struct DomainHealth {
    failure_count: u32,
    last_failure_at: i64,
    open: bool,
}

/// Per-domain circuit breaker
pub struct CircuitBreaker {
    time_provider: Arc<dyn TimeProvider>,
    config: CircuitBreakerConfig,
    domains: Mutex<HashMap<String, DomainHealth>>,
}

impl CircuitBreaker {
    pub fn new(time_provider: Arc<dyn TimeProvider>, config: CircuitBreakerConfig) -> Self {
        Self {
            time_provider,
            config,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure against a domain; opens the circuit at the threshold
    pub fn record_failure(&self, domain: &str) {
        let now = self.time_provider.now_millis();
        let mut domains = self.domains.lock().unwrap();
        let health = domains.entry(domain.to_string()).or_insert(DomainHealth {
            failure_count: 0,
            last_failure_at: now,
            open: false,
        });
        health.failure_count += 1;
        health.last_failure_at = now;

        if health.failure_count >= self.config.failure_threshold && !health.open {
            health.open = true;
            warn!(
                domain = %domain,
                failure_count = %health.failure_count,
                reset_timeout_ms = %self.config.reset_timeout_ms,
                "Circuit opened for domain"
            );
        }
    }

    /// Record a success; one success fully heals the domain
    pub fn record_success(&self, domain: &str) {
        let mut domains = self.domains.lock().unwrap();
        if let Some(health) = domains.remove(domain) {
            if health.open {
                info!(domain = %domain, "Circuit closed after successful fetch");
            }
        }
    }

    /// Check whether a domain's circuit is open.
    ///
    /// Expired circuits are cleared lazily here, so an idle open circuit
    /// costs nothing until the next check.
    pub fn is_open(&self, domain: &str) -> bool {
        let now = self.time_provider.now_millis();
        let mut domains = self.domains.lock().unwrap();
        match domains.get(domain) {
            Some(health) if health.open => {
                if now - health.last_failure_at >= self.config.reset_timeout_ms {
                    domains.remove(domain);
                    info!(domain = %domain, "Circuit reset after timeout");
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Number of domains with open circuits (for stats/logging)
    pub fn open_count(&self) -> usize {
        self.domains.lock().unwrap().values().filter(|h| h.open).count()
    }
}
