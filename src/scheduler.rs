//! Cycle cadence.
//!
//! Both modes drive the meter from a single task: the next cycle starts only
//! after the previous one returned, so cycles never overlap. In scheduled mode
//! ticks that fall due while a cycle is running are dropped, not queued.

use crate::codec::BusError;
use crate::meter::{CycleOutcome, Meter};
use crate::publisher::Publisher;
use embedded_hal::spi::SpiDevice;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

pub const IMMEDIATE_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Run, pause, repeat.
    Immediate { pause: Duration },
    /// Run once per period; the first cycle fires one period after start.
    Scheduled { period: Duration },
}

impl Cadence {
    pub fn from_interval(interval: Option<Duration>) -> Self {
        match interval {
            Some(period) if !period.is_zero() => Cadence::Scheduled { period },
            _ => Cadence::Immediate {
                pause: IMMEDIATE_PAUSE,
            },
        }
    }
}

/// Drive `meter` until `shutdown` resolves or a fatal bus error occurs.
pub async fn run<B, P, F>(meter: &mut Meter<B, P>, cadence: Cadence, shutdown: F) -> Result<(), BusError>
where
    B: SpiDevice,
    P: Publisher,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    tracing::info!(?cadence, "meter loop started");

    match cadence {
        Cadence::Immediate { pause } => loop {
            run_once(meter)?;
            tokio::select! {
                () = &mut shutdown => break,
                () = sleep(pause) => {}
            }
        },
        Cadence::Scheduled { period } => {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = &mut shutdown => break,
                    _ = ticker.tick() => run_once(meter)?,
                }
            }
        }
    }

    let stats = meter.stats();
    tracing::info!(
        cycles = stats.cycles_completed,
        abandoned = stats.cycles_abandoned,
        alerts = stats.alerts_emitted,
        publish_failures = stats.publish_failures,
        "meter loop stopped"
    );
    Ok(())
}

fn run_once<B: SpiDevice, P: Publisher>(meter: &mut Meter<B, P>) -> Result<(), BusError> {
    match meter.run_cycle()? {
        CycleOutcome::Published(report) => {
            tracing::debug!(
                channels = report.snapshot.len(),
                alerts = report.alerts.len(),
                delivered = report.snapshot_delivered,
                "cycle complete"
            );
        }
        CycleOutcome::Abandoned(e) => {
            tracing::debug!(error = %e, "cycle abandoned");
        }
    }
    Ok(())
}
