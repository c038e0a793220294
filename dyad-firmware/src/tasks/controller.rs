//! Therapy controller task
//!
//! Owns the therapy state machine and the latency metrics. Everything the
//! other tasks produce is drained into the machine once per tick.

use defmt::*;
use embassy_futures::select::{select, Either};
use heapless::String;

use dyad_core::config::DeviceConfig;
use dyad_core::metrics::LatencyMetrics;
use dyad_core::state::State;
use dyad_core::sync::SyncEvent;
use dyad_core::therapy::{Request, TherapyStateMachine, TickReport};

use crate::bridge::{ChannelHaptic, EmbassyClock, UartLink};
use crate::channels::{Press, BUTTON, DRIFT, ECHO, INBOUND, LINK_EVENTS};
use crate::tasks::tick::{TICK_INTERVAL_MS, TICK_SIGNAL};

type Glove = TherapyStateMachine<UartLink, ChannelHaptic, EmbassyClock>;

/// Status line interval while playing
const STATUS_INTERVAL_MS: u32 = 10_000;

/// Room for the end-of-session report
const REPORT_CAPACITY: usize = 1024;

#[embassy_executor::task]
pub async fn controller_task(config: DeviceConfig) {
    info!("Controller task started ({:?})", config.role);

    let mut glove = Glove::new(config, UartLink, ChannelHaptic, EmbassyClock);
    let mut metrics = LatencyMetrics::new(config.metrics);

    loop {
        match select(TICK_SIGNAL.wait(), BUTTON.receive()).await {
            Either::First(count) => {
                drain_inputs(&mut glove, &mut metrics);
                let report = glove.tick(ECHO.take(), &mut metrics);
                log_tick(&glove, &metrics, &report);

                if count % (STATUS_INTERVAL_MS / TICK_INTERVAL_MS) == 0 {
                    log_status(&glove);
                }
            }
            Either::Second(press) => {
                let Some(request) = request_for(press, glove.current_state()) else {
                    debug!("{:?} press ignored in {}", press, glove.current_state().name());
                    continue;
                };
                info!("Request: {:?}", request);
                if glove.push_request(request).is_err() {
                    warn!("Request queue full, dropping {:?}", request);
                }
            }
        }
    }
}

/// What a button press means in the current state
fn request_for(press: Press, state: State) -> Option<Request> {
    match (press, state) {
        (_, State::Error(_)) => Some(Request::Reset),
        (Press::Long, State::Idle) => None,
        (Press::Long, _) => Some(Request::Stop),
        (Press::Short, State::Idle | State::Ready) => Some(Request::Start(None)),
        (Press::Short, State::Running) => Some(Request::Pause),
        (Press::Short, State::Paused) => Some(Request::Resume),
        (Press::Short, _) => None,
    }
}

/// Move queued link traffic and haptic drift into the machine
fn drain_inputs(glove: &mut Glove, metrics: &mut LatencyMetrics) {
    while let Ok(event) = LINK_EVENTS.try_receive() {
        if glove.on_link_event(event).is_err() {
            warn!("Link event queue full, dropping {:?}", event);
        }
    }

    while let Ok((message, received_at)) = INBOUND.try_receive() {
        if glove.on_message(message, received_at).is_err() {
            warn!("Message queue full, dropping {:?}", message);
        }
    }

    while let Ok(drift) = DRIFT.try_receive() {
        metrics.record_execution(drift);
        if metrics.is_verbose() {
            debug!("Execution drift {} us", drift);
        }
    }
}

fn log_tick(glove: &Glove, metrics: &LatencyMetrics, report: &TickReport) {
    for t in &report.transitions {
        info!("{} -> {} ({:?})", t.from.name(), t.to.name(), t.event);

        if t.from == State::Stopping && t.to == State::Idle {
            log_report(metrics);
        }
    }

    match report.sync {
        Some(SyncEvent::SyncComplete {
            offset_us,
            confidence,
        }) => info!(
            "Sync complete: offset {} us, confidence {}, lead {} us",
            offset_us,
            confidence.as_str(),
            glove.sync().lead_time_us()
        ),
        Some(SyncEvent::SyncFailed(e)) => warn!("Sync failed: {:?}", e),
        Some(SyncEvent::OffsetRefined { offset_us }) => {
            debug!("Offset refined to {} us", offset_us)
        }
        None => {}
    }
}

fn log_status(glove: &Glove) {
    let Some(session) = glove.session() else {
        return;
    };
    let stats = glove.stats();
    info!(
        "{}: cycle {}, {} s elapsed, {} steps, lead {} us",
        glove.current_state().name(),
        session.cycles(),
        session.elapsed_us() / 1_000_000,
        stats.steps,
        glove.sync().lead_time_us()
    );
    if stats.haptic_failures > 0 || stats.peer_send_failures > 0 || stats.buzzes_dropped > 0 {
        warn!("Dispatch problems: {:?}", stats);
    }
}

/// Print the session's latency report line by line
fn log_report(metrics: &LatencyMetrics) {
    let mut text: String<REPORT_CAPACITY> = String::new();
    if metrics.write_report(&mut text).is_err() {
        warn!("Latency report truncated");
    }
    for line in text.lines() {
        info!("{=str}", line);
    }
}
