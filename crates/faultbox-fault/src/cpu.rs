//! CPU saturation fault.

use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use faultbox_config::{CpuFaultConfig, MAX_BURN_DEPTH};
use tracing::{debug, info};

use crate::error::{FaultCause, FaultError, Result};
use crate::fault::{Fault, FaultName, FaultParams};

/// Outcome of one burn.
#[derive(Debug, Clone, Copy)]
pub struct BurnReport {
    pub elapsed: Duration,
    pub iterations: u64,
    pub cancelled: bool,
}

/// Burn slot shared between the fault and its blocking worker.
#[derive(Default)]
struct BurnState {
    /// Cancellation token of the burn in progress, if any.
    current: Mutex<Option<Arc<AtomicBool>>>,
    active: AtomicBool,
}

impl BurnState {
    fn lock_current(&self) -> MutexGuard<'_, Option<Arc<AtomicBool>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the slot, or returns `None` if a burn is already running.
    fn claim(&self) -> Option<Arc<AtomicBool>> {
        let mut current = self.lock_current();
        if current.is_some() {
            return None;
        }
        let token = Arc::new(AtomicBool::new(false));
        *current = Some(Arc::clone(&token));
        self.active.store(true, Ordering::Release);
        Some(token)
    }

    /// Releases the slot, but only if `token` still owns it. A burn that was
    /// stopped and superseded leaves the newer one alone.
    fn release(&self, token: &Arc<AtomicBool>) {
        let mut current = self.lock_current();
        if current
            .as_ref()
            .is_some_and(|running| Arc::ptr_eq(running, token))
        {
            *current = None;
            self.active.store(false, Ordering::Release);
        }
    }

    /// Signals the running burn, if any, and frees the slot.
    fn cancel(&self) -> bool {
        match self.lock_current().take() {
            Some(token) => {
                token.store(true, Ordering::Release);
                self.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

/// Keeps one core busy with recursive Fibonacci for the requested duration.
///
/// `start` returns once the burn is over, either because the duration ran out
/// or because `stop` cancelled it. The work runs on the blocking pool so the
/// async runtime keeps serving requests while it spins, and the worker frees
/// the slot itself so an abandoned `start` future cannot leave it claimed.
pub struct CpuBurnFault {
    config: CpuFaultConfig,
    state: Arc<BurnState>,
}

impl CpuBurnFault {
    /// Depths past [`MAX_BURN_DEPTH`] are capped so every iteration stays
    /// short enough for `stop` to land promptly.
    pub fn new(mut config: CpuFaultConfig) -> Self {
        config.burn_depth = config.burn_depth.min(MAX_BURN_DEPTH);
        Self {
            config,
            state: Arc::new(BurnState::default()),
        }
    }

    pub fn burn_depth(&self) -> u32 {
        self.config.burn_depth
    }
}

#[async_trait]
impl Fault for CpuBurnFault {
    fn name(&self) -> FaultName {
        FaultName::Cpu
    }

    fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    async fn start(&self, params: FaultParams) -> Result<()> {
        let Some(token) = self.state.claim() else {
            debug!("cpu burn already running");
            return Ok(());
        };

        let target = Duration::from_millis(params.resolve(self.config.default_duration_ms));
        let depth = self.config.burn_depth;
        info!(duration_ms = target.as_millis() as u64, depth, "cpu burn started");

        let state = Arc::clone(&self.state);
        let worker_token = Arc::clone(&token);
        let outcome = tokio::task::spawn_blocking(move || {
            let report = burn(target, depth, &worker_token);
            state.release(&worker_token);
            report
        })
        .await;

        match outcome {
            Ok(report) => {
                info!(
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    iterations = report.iterations,
                    cancelled = report.cancelled,
                    "cpu burn finished"
                );
                Ok(())
            }
            Err(e) => {
                self.state.release(&token);
                Err(FaultError::start(
                    FaultName::Cpu,
                    FaultCause::Worker(e.to_string()),
                ))
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        if self.state.cancel() {
            info!("cpu burn cancelled");
        }
        Ok(())
    }
}

/// Spins until `target` elapses or `cancel` is set.
///
/// Cancellation is checked between iterations, so a stop takes effect within
/// one Fibonacci evaluation.
pub fn burn(target: Duration, depth: u32, cancel: &AtomicBool) -> BurnReport {
    let started = Instant::now();
    let mut iterations = 0u64;

    while started.elapsed() < target {
        if cancel.load(Ordering::Acquire) {
            return BurnReport {
                elapsed: started.elapsed(),
                iterations,
                cancelled: true,
            };
        }
        black_box(fibonacci(black_box(depth)));
        iterations += 1;
    }

    BurnReport {
        elapsed: started.elapsed(),
        iterations,
        cancelled: false,
    }
}

fn fibonacci(n: u32) -> u64 {
    if n <= 1 {
        u64::from(n)
    } else {
        fibonacci(n - 1) + fibonacci(n - 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> CpuFaultConfig {
        CpuFaultConfig {
            default_duration_ms: 50,
            burn_depth: 12,
        }
    }

    #[test]
    fn test_fibonacci() {
        assert_eq!(fibonacci(0), 0);
        assert_eq!(fibonacci(1), 1);
        assert_eq!(fibonacci(10), 55);
        assert_eq!(fibonacci(20), 6_765);
    }

    #[test]
    fn test_burn_depth_is_capped() {
        let fault = CpuBurnFault::new(CpuFaultConfig {
            default_duration_ms: 50,
            burn_depth: 90,
        });
        assert_eq!(fault.burn_depth(), MAX_BURN_DEPTH);
        assert_eq!(CpuBurnFault::new(quick_config()).burn_depth(), 12);
    }

    #[test]
    fn test_burn_runs_for_target() {
        let cancel = AtomicBool::new(false);
        let report = burn(Duration::from_millis(30), 10, &cancel);
        assert!(report.elapsed >= Duration::from_millis(30));
        assert!(report.iterations > 0);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_burn_honors_cancel() {
        let cancel = AtomicBool::new(true);
        let report = burn(Duration::from_secs(60), 10, &cancel);
        assert!(report.cancelled);
        assert_eq!(report.iterations, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_blocks_until_burn_completes() {
        let fault = CpuBurnFault::new(quick_config());
        let started = Instant::now();
        fault.start(FaultParams::with_duration(80)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert!(!fault.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_start_is_noop_and_stop_cancels() {
        let fault = Arc::new(CpuBurnFault::new(quick_config()));

        let burner = {
            let fault = Arc::clone(&fault);
            tokio::spawn(async move { fault.start(FaultParams::with_duration(30_000)).await })
        };

        while !fault.is_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = Instant::now();
        fault.start(FaultParams::with_duration(30_000)).await.unwrap();
        assert!(second.elapsed() < Duration::from_secs(5));

        fault.stop().await.unwrap();
        assert!(!fault.is_active());

        let finished = tokio::time::timeout(Duration::from_secs(10), burner)
            .await
            .expect("burn should end after stop")
            .unwrap();
        assert!(finished.is_ok());
        assert!(!fault.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_start_still_releases_slot() {
        let fault = CpuBurnFault::new(quick_config());
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            fault.start(FaultParams::with_duration(150)),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(fault.is_active());

        let deadline = Instant::now() + Duration::from_secs(10);
        while fault.is_active() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!fault.is_active());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let fault = CpuBurnFault::new(quick_config());
        fault.stop().await.unwrap();
        assert!(!fault.is_active());
    }
}
