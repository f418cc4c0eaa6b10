use std::time::Duration;

use heater_common::{ActualState, CommandResult, ControllerConfig, SwitchState};
use tracing::warn;

use crate::driver::DeviceDriver;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            max_attempts: config.max_command_attempts.max(1),
            backoff: Duration::from_millis(config.command_backoff_ms),
        }
    }

    /// Zero-backoff variant for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// What the device verifiably is after this pass; `Unknown` when no
    /// read confirmed anything.
    pub actual: ActualState,
    pub command_issued: bool,
    pub result: Option<CommandResult>,
}

/// Drives the device toward `desired`. Reads first and returns without a
/// command when the device already agrees (the dominant case). Otherwise
/// issues `set` with a fixed backoff between bounded attempts, then re-reads
/// to confirm; a re-read that disagrees stands as recorded, with the command
/// marked failed. An invocation that cannot converge stops and leaves the
/// next tick to retry.
pub async fn reconcile<D: DeviceDriver>(
    driver: &D,
    desired: SwitchState,
    policy: &RetryPolicy,
) -> ReconcileOutcome {
    match driver.read().await {
        Ok(current) if current == desired => {
            return ReconcileOutcome {
                actual: current.into(),
                command_issued: false,
                result: None,
            };
        }
        Ok(_) => {}
        Err(err) => {
            // The device may still accept commands; fall through to set.
            warn!("pre-command read failed: {err}");
        }
    }

    let mut last_actual = ActualState::Unknown;
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.backoff).await;
        }

        match driver.set(desired).await {
            Ok(()) => match driver.read().await {
                Ok(read) if read == desired => {
                    return ReconcileOutcome {
                        actual: read.into(),
                        command_issued: true,
                        result: Some(CommandResult::Ok),
                    };
                }
                Ok(read) => {
                    // Never fabricate success: the mismatch stands.
                    warn!(
                        "device reported {} after commanding {}",
                        read.as_str(),
                        desired.as_str()
                    );
                    last_actual = read.into();
                    break;
                }
                Err(err) => {
                    warn!("confirming read failed: {err}");
                    break;
                }
            },
            Err(err) => {
                warn!(
                    "set {} failed (attempt {attempt}/{}): {err}",
                    desired.as_str(),
                    policy.max_attempts
                );
            }
        }
    }

    ReconcileOutcome {
        actual: last_actual,
        command_issued: true,
        result: Some(CommandResult::Failed),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicU32, Ordering},
    };

    use heater_common::DriverError;
    use tokio::sync::Mutex;

    use super::*;
    use crate::driver::SimulatedRelay;

    /// Driver with scripted responses and a command counter.
    #[derive(Default)]
    struct ScriptedDriver {
        reads: Mutex<VecDeque<Result<SwitchState, DriverError>>>,
        sets: Mutex<VecDeque<Result<(), DriverError>>>,
        set_calls: AtomicU32,
    }

    impl ScriptedDriver {
        async fn push_read(&self, result: Result<SwitchState, DriverError>) {
            self.reads.lock().await.push_back(result);
        }

        async fn push_set(&self, result: Result<(), DriverError>) {
            self.sets.lock().await.push_back(result);
        }

        fn commands_issued(&self) -> u32 {
            self.set_calls.load(Ordering::SeqCst)
        }
    }

    impl DeviceDriver for ScriptedDriver {
        async fn read(&self) -> Result<SwitchState, DriverError> {
            self.reads
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(DriverError::Unreachable("script exhausted".into())))
        }

        async fn set(&self, _target: SwitchState) -> Result<(), DriverError> {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            self.sets
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(DriverError::Unreachable("script exhausted".into())))
        }
    }

    #[tokio::test]
    async fn converged_device_gets_no_commands() {
        let driver = ScriptedDriver::default();
        driver.push_read(Ok(SwitchState::On)).await;
        driver.push_read(Ok(SwitchState::On)).await;

        let policy = RetryPolicy::immediate(3);
        let first = reconcile(&driver, SwitchState::On, &policy).await;
        let second = reconcile(&driver, SwitchState::On, &policy).await;

        assert_eq!(first.actual, ActualState::On);
        assert!(!first.command_issued);
        assert!(!second.command_issued);
        assert_eq!(driver.commands_issued(), 0);
    }

    #[tokio::test]
    async fn restores_desired_state_after_interference() {
        let relay = SimulatedRelay::new(SwitchState::On);
        let policy = RetryPolicy::immediate(3);

        // External actor flips the relay off between ticks.
        relay.force(SwitchState::Off).await;

        let outcome = reconcile(&relay, SwitchState::On, &policy).await;

        assert!(outcome.command_issued);
        assert_eq!(outcome.result, Some(CommandResult::Ok));
        assert_eq!(outcome.actual, ActualState::On);
        assert_eq!(relay.read().await.unwrap(), SwitchState::On);
    }

    #[tokio::test]
    async fn retries_past_a_transient_failure() {
        let driver = ScriptedDriver::default();
        driver.push_read(Ok(SwitchState::Off)).await;
        driver
            .push_set(Err(DriverError::Unreachable("timeout".into())))
            .await;
        driver.push_set(Ok(())).await;
        driver.push_read(Ok(SwitchState::On)).await;

        let outcome = reconcile(&driver, SwitchState::On, &RetryPolicy::immediate(3)).await;

        assert_eq!(outcome.result, Some(CommandResult::Ok));
        assert_eq!(outcome.actual, ActualState::On);
        assert_eq!(driver.commands_issued(), 2);
    }

    #[tokio::test]
    async fn reread_disagreement_is_recorded_as_failure() {
        let driver = ScriptedDriver::default();
        driver.push_read(Ok(SwitchState::Off)).await;
        driver.push_set(Ok(())).await;
        driver.push_read(Ok(SwitchState::Off)).await;

        let outcome = reconcile(&driver, SwitchState::On, &RetryPolicy::immediate(3)).await;

        assert_eq!(outcome.result, Some(CommandResult::Failed));
        assert_eq!(outcome.actual, ActualState::Off);
        assert_eq!(driver.commands_issued(), 1, "mismatch is not retried");
    }

    #[tokio::test]
    async fn exhausted_budget_leaves_actual_unknown() {
        let driver = ScriptedDriver::default();
        driver.push_read(Ok(SwitchState::Off)).await;
        for _ in 0..3 {
            driver
                .push_set(Err(DriverError::Rejected("busy".into())))
                .await;
        }

        let outcome = reconcile(&driver, SwitchState::On, &RetryPolicy::immediate(3)).await;

        assert_eq!(outcome.result, Some(CommandResult::Failed));
        assert_eq!(outcome.actual, ActualState::Unknown);
        assert_eq!(driver.commands_issued(), 3);
    }

    #[tokio::test]
    async fn unreadable_device_is_still_commanded() {
        let driver = ScriptedDriver::default();
        driver
            .push_read(Err(DriverError::Unreachable("flaky".into())))
            .await;
        driver.push_set(Ok(())).await;
        driver.push_read(Ok(SwitchState::On)).await;

        let outcome = reconcile(&driver, SwitchState::On, &RetryPolicy::immediate(3)).await;

        assert_eq!(outcome.result, Some(CommandResult::Ok));
        assert_eq!(outcome.actual, ActualState::On);
    }
}
