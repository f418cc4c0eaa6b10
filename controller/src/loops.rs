use chrono::Utc;
use chrono_tz::Tz;
use heater_common::{
    resolve, session, ActualState, CommandResult, ControllerConfig, Schedule, StoreError,
    SwitchState,
};
use tracing::{debug, info, warn};

use crate::{
    driver::DeviceDriver,
    reconciler::{reconcile, RetryPolicy},
    store::{try_update, ControlStateStore, ScheduleStore},
};

/// Fine-cadence pass: verify the device and meter the session. A failed
/// read records `Unknown`; it never guesses.
pub async fn verify_job<D, S>(
    driver: &D,
    store: &S,
    config: &ControllerConfig,
) -> Result<(), StoreError>
where
    D: DeviceDriver,
    S: ControlStateStore,
{
    let reading = match driver.read().await {
        Ok(state) => ActualState::from(state),
        Err(err) => {
            warn!("verification read failed: {err}");
            ActualState::Unknown
        }
    };

    let now = Utc::now();
    try_update(store, config.max_store_attempts, |state| {
        session::apply_reading(state, reading, now);
    })
    .await?;
    Ok(())
}

/// Coarse-cadence pass: evaluate the schedule against the persisted
/// previous membership and resolve override precedence. Returns the
/// effective desired state it wrote.
pub async fn schedule_job<S, C>(
    state_store: &S,
    schedule_store: &C,
    config: &ControllerConfig,
    timezone: Tz,
) -> Result<SwitchState, StoreError>
where
    S: ControlStateStore,
    C: ScheduleStore,
{
    let schedule = Schedule {
        windows: schedule_store.windows().await?,
    };
    let now = Utc::now();
    let local = now.with_timezone(&timezone).time();

    let written = try_update(state_store, config.max_store_attempts, |state| {
        let decision = schedule.evaluate(local, state.last_scheduled_on);
        resolve::resolve(state, decision, now, config.override_ttl_ms);
    })
    .await?;

    debug!("resolved desired state {}", written.desired_state.as_str());
    Ok(written.desired_state)
}

/// Medium-cadence pass: resolve, then push the device toward the effective
/// desired state and fold the verified result back into the record.
/// Enforcement runs whether or not an override is active; the override only
/// decides what the desired value is.
pub async fn enforce_job<D, S, C>(
    driver: &D,
    state_store: &S,
    schedule_store: &C,
    config: &ControllerConfig,
    timezone: Tz,
) -> Result<(), StoreError>
where
    D: DeviceDriver,
    S: ControlStateStore,
    C: ScheduleStore,
{
    let desired = schedule_job(state_store, schedule_store, config, timezone).await?;

    let policy = RetryPolicy::from_config(config);
    let outcome = reconcile(driver, desired, &policy).await;

    let now = Utc::now();
    try_update(state_store, config.max_store_attempts, |state| {
        session::apply_reading(state, outcome.actual, now);
        if outcome.command_issued {
            state.record_command(outcome.result.unwrap_or(CommandResult::Failed), now);
        }
    })
    .await?;

    if outcome.command_issued {
        info!(
            "enforced {} -> device now {}",
            desired.as_str(),
            outcome.actual.as_str()
        );
    }
    Ok(())
}
