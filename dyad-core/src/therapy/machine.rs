//! Therapy lifecycle controller
//!
//! Drives the [`State`] table from a periodic tick. Requests, link events
//! and inbound messages are queued by the caller and observed at the next
//! tick; nothing here blocks. PRIMARY owns the schedule and sends each
//! step to SECONDARY as a `Buzz` timed in reference time; SECONDARY echoes
//! probes, follows PRIMARY's session messages and plays what it is sent.

use dyad_protocol::Message;
use heapless::{Deque, Vec};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::config::{DeviceConfig, DeviceRole};
use crate::metrics::{LatencyMetrics, SyncConfidence};
use crate::state::{ErrorKind, Event, State};
use crate::sync::{InboundEcho, SyncEvent, SyncProtocol};
use crate::traits::{HapticOutput, MonotonicClock, Transport};

use super::command::{Actuator, MotorCommand};
use super::pattern::PatternKind;
use super::session::{ScheduledStep, TherapySession};

/// Steps dispatched per tick at most
const MAX_DISPATCH_PER_TICK: usize = 8;

/// Transitions recorded per tick at most
pub const MAX_TRANSITIONS: usize = 16;

/// A request or message queue is full; try again next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull;

/// Commands from the menu/phone side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    /// Start a session; pattern defaults to the configured one
    Start(Option<PatternKind>),
    Pause,
    Resume,
    Stop,
    /// One calibration burst on a finger
    Calibrate(u8),
    /// Leave the error state
    Reset,
}

/// Link status changes reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    PeerDiscovered,
    Established,
    Lost,
}

/// One state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub from: State,
    pub to: State,
    pub event: Event,
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub transitions: Vec<Transition, MAX_TRANSITIONS>,
    /// Sync result surfaced this tick, if any
    pub sync: Option<SyncEvent>,
    /// Steps handed out this tick
    pub dispatched: u8,
}

/// Dispatch counters; failures are absorbed, never surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispatchStats {
    pub steps: u32,
    pub haptic_failures: u32,
    pub peer_send_failures: u32,
    pub buzzes_received: u32,
    pub buzzes_dropped: u32,
}

/// Therapy lifecycle for one glove
pub struct TherapyStateMachine<T, H, C> {
    config: DeviceConfig,
    state: State,
    entered_at_us: u64,
    connect_started_us: u64,
    /// Local time of the last message from the peer
    last_peer_traffic_us: u64,
    sync: SyncProtocol,
    session: Option<TherapySession>,
    pending_pattern: Option<PatternKind>,
    calibration: Option<(u8, u64)>,
    requests: Deque<Request, 8>,
    link_events: Deque<LinkEvent, 4>,
    inbound: Deque<(Message, u64), 16>,
    rng: SmallRng,
    stats: DispatchStats,
    report: TickReport,
    transport: T,
    haptic: H,
    clock: C,
}

impl<T, H, C> TherapyStateMachine<T, H, C>
where
    T: Transport,
    H: HapticOutput,
    C: MonotonicClock,
{
    pub fn new(config: DeviceConfig, transport: T, haptic: H, clock: C) -> Self {
        Self {
            config,
            state: State::Idle,
            entered_at_us: clock.now_us(),
            connect_started_us: 0,
            last_peer_traffic_us: 0,
            sync: SyncProtocol::new(config.role, config.sync),
            session: None,
            pending_pattern: None,
            calibration: None,
            requests: Deque::new(),
            link_events: Deque::new(),
            inbound: Deque::new(),
            rng: SmallRng::seed_from_u64(config.seed),
            stats: DispatchStats::default(),
            report: TickReport::default(),
            transport,
            haptic,
            clock,
        }
    }

    // Requests

    /// Start a session, or start playback when already synced
    pub fn request_start(&mut self, pattern: Option<PatternKind>) -> Result<(), QueueFull> {
        self.push_request(Request::Start(pattern))
    }

    pub fn request_pause(&mut self) -> Result<(), QueueFull> {
        self.push_request(Request::Pause)
    }

    pub fn request_resume(&mut self) -> Result<(), QueueFull> {
        self.push_request(Request::Resume)
    }

    pub fn request_stop(&mut self) -> Result<(), QueueFull> {
        self.push_request(Request::Stop)
    }

    pub fn request_calibrate(&mut self, finger: u8) -> Result<(), QueueFull> {
        self.push_request(Request::Calibrate(finger))
    }

    pub fn request_reset(&mut self) -> Result<(), QueueFull> {
        self.push_request(Request::Reset)
    }

    pub fn push_request(&mut self, request: Request) -> Result<(), QueueFull> {
        self.requests.push_back(request).map_err(|_| QueueFull)
    }

    /// Queue a transport status change
    pub fn on_link_event(&mut self, event: LinkEvent) -> Result<(), QueueFull> {
        self.link_events.push_back(event).map_err(|_| QueueFull)
    }

    /// Queue a decoded message with its local arrival time
    pub fn on_message(&mut self, message: Message, received_at_us: u64) -> Result<(), QueueFull> {
        self.inbound
            .push_back((message, received_at_us))
            .map_err(|_| QueueFull)
    }

    // Accessors

    pub fn current_state(&self) -> State {
        self.state
    }

    pub fn current_confidence(&self) -> SyncConfidence {
        self.sync.confidence()
    }

    pub fn role(&self) -> DeviceRole {
        self.config.role
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Local time the current state was entered
    pub fn entered_at_us(&self) -> u64 {
        self.entered_at_us
    }

    pub fn session(&self) -> Option<&TherapySession> {
        self.session.as_ref()
    }

    pub fn sync(&self) -> &SyncProtocol {
        &self.sync
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn haptic(&self) -> &H {
        &self.haptic
    }

    pub fn haptic_mut(&mut self) -> &mut H {
        &mut self.haptic
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current time on the shared reference clock
    pub fn reference_now_us(&self) -> u64 {
        self.sync.to_reference(self.clock.now_us())
    }

    // Tick

    /// Advance the machine by one tick
    ///
    /// `echo` is whatever the receive path left in the handoff slot.
    pub fn tick(&mut self, echo: Option<InboundEcho>, metrics: &mut LatencyMetrics) -> TickReport {
        let now = self.clock.now_us();
        self.report = TickReport::default();

        self.complete_deferred(now, metrics);
        self.process_link(now, metrics);
        self.process_requests(now, metrics);
        self.process_inbound(now, metrics);
        self.advance_connection(now, metrics);

        let event = self.sync.poll(now, echo, &mut self.transport, metrics);
        if let Some(event) = event {
            self.handle_sync_event(event, now, metrics);
        }

        self.check_timers(now, metrics);
        self.play(now);

        core::mem::take(&mut self.report)
    }

    /// Finish states that complete one tick after entry
    fn complete_deferred(&mut self, now: u64, metrics: &mut LatencyMetrics) {
        match self.state {
            State::Resuming => self.fire(Event::ResumeComplete, now, metrics),
            State::Stopping => {
                self.deactivate_local();
                if self.is_primary() {
                    self.send_to_peer(&Message::Deactivate);
                }
                self.fire(Event::StopComplete, now, metrics);
            }
            _ => {}
        }
    }

    fn process_link(&mut self, now: u64, metrics: &mut LatencyMetrics) {
        while let Some(event) = self.link_events.pop_front() {
            let event = match event {
                LinkEvent::PeerDiscovered => Event::PeerDiscovered,
                LinkEvent::Established => Event::LinkEstablished,
                LinkEvent::Lost if self.state.needs_link() || self.state == State::Stopping => {
                    Event::ErrorDetected(ErrorKind::LinkLost)
                }
                LinkEvent::Lost => continue,
            };
            self.fire(event, now, metrics);
        }

        if self.state.needs_link() && !self.transport.is_connected() {
            self.fire(Event::ErrorDetected(ErrorKind::LinkLost), now, metrics);
        }
    }

    fn process_requests(&mut self, now: u64, metrics: &mut LatencyMetrics) {
        while let Some(request) = self.requests.pop_front() {
            let event = match request {
                Request::Start(pattern) => {
                    if self.is_primary() {
                        self.pending_pattern = Some(pattern.unwrap_or(self.config.therapy.pattern));
                    }
                    if self.state == State::Ready {
                        Event::PatternStart
                    } else {
                        Event::Start
                    }
                }
                Request::Pause => Event::Pause,
                Request::Resume => Event::Resume,
                Request::Stop => Event::Stop,
                Request::Calibrate(finger) => {
                    self.calibration = Some((finger, now));
                    Event::Calibrate
                }
                Request::Reset => Event::Reset,
            };
            self.fire(event, now, metrics);
        }
    }

    fn process_inbound(&mut self, now: u64, metrics: &mut LatencyMetrics) {
        while let Some((message, received_at)) = self.inbound.pop_front() {
            self.last_peer_traffic_us = self.last_peer_traffic_us.max(received_at);
            match message {
                Message::Ping { seq, .. } => {
                    self.sync
                        .on_ping(seq, received_at, self.clock.now_us(), &mut self.transport);
                    if !self.is_primary() && self.state == State::Idle {
                        self.fire(Event::Start, now, metrics);
                    }
                }
                Message::SyncReport {
                    offset_us,
                    confidence,
                } => {
                    if let Some(event) = self.sync.on_sync_report(offset_us, confidence, metrics) {
                        self.handle_sync_event(event, now, metrics);
                    }
                }
                Message::Buzz {
                    finger,
                    amplitude,
                    duration_ms,
                    execute_at_us,
                } if !self.is_primary() => self.execute_buzz(finger, amplitude, duration_ms, execute_at_us),
                Message::Deactivate => self.deactivate_local(),
                _ if self.is_primary() => {}
                Message::StartSession { pattern } => {
                    self.pending_pattern = Some(PatternKind::from_byte(pattern).unwrap_or_default());
                    self.fire(Event::PatternStart, now, metrics);
                }
                Message::PauseSession => self.fire(Event::Pause, now, metrics),
                Message::ResumeSession => self.fire(Event::Resume, now, metrics),
                Message::StopSession => self.fire(Event::Stop, now, metrics),
                _ => {}
            }
        }
    }

    /// Follow the transport through discovery and link-up
    fn advance_connection(&mut self, now: u64, metrics: &mut LatencyMetrics) {
        if !self.transport.is_connected() {
            return;
        }
        if self.state == State::Advertising {
            self.fire(Event::PeerDiscovered, now, metrics);
        }
        if self.state == State::Connecting {
            self.fire(Event::LinkEstablished, now, metrics);
        }
    }

    fn handle_sync_event(&mut self, event: SyncEvent, now: u64, metrics: &mut LatencyMetrics) {
        self.report.sync = Some(event);
        if self.state != State::Syncing {
            return;
        }
        match event {
            SyncEvent::SyncComplete { confidence, .. } => {
                if confidence >= self.config.therapy.min_confidence {
                    self.fire(Event::SyncComplete, now, metrics);
                } else {
                    self.fire(Event::ErrorDetected(ErrorKind::LowConfidence), now, metrics);
                }
            }
            SyncEvent::SyncFailed(e) => self.fire(Event::ErrorDetected(e.into()), now, metrics),
            SyncEvent::OffsetRefined { .. } => {}
        }
    }

    fn check_timers(&mut self, now: u64, metrics: &mut LatencyMetrics) {
        let therapy = self.config.therapy;
        match self.state {
            State::Advertising | State::Connecting => {
                if now.saturating_sub(self.connect_started_us) >= therapy.connect_timeout_us {
                    self.fire(Event::ErrorDetected(ErrorKind::ConnectTimeout), now, metrics);
                }
            }
            State::Calibrating => {
                let done = self.calibration.map_or(true, |(_, started)| {
                    now.saturating_sub(started) >= therapy.calibration_ms as u64 * 1_000
                });
                if done {
                    self.fire(Event::CalibrationDone, now, metrics);
                }
            }
            State::Running if self.is_primary() && therapy.session_duration_us > 0 => {
                let reference = self.sync.to_reference(now);
                let elapsed = self.session.as_mut().map_or(0, |s| {
                    s.accumulate(reference);
                    s.elapsed_us()
                });
                if elapsed >= therapy.session_duration_us {
                    self.fire(Event::SessionComplete, now, metrics);
                }
            }
            State::Running if !self.is_primary() && therapy.peer_silence_timeout_us > 0 => {
                // PRIMARY sends a Buzz or maintenance Ping well inside this window
                if now.saturating_sub(self.last_peer_traffic_us) >= therapy.peer_silence_timeout_us {
                    self.fire(Event::ErrorDetected(ErrorKind::LinkLost), now, metrics);
                }
            }
            _ => {}
        }
    }

    /// Hand out every step due within the lead time
    fn play(&mut self, now: u64) {
        if self.state != State::Running {
            return;
        }
        let reference = self.sync.to_reference(now);
        let primary = self.is_primary();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.accumulate(reference);
        if !primary {
            return;
        }

        let horizon = reference.saturating_add(self.sync.lead_time_us() as u64);
        let mut due: Vec<ScheduledStep, MAX_DISPATCH_PER_TICK> = Vec::new();
        while !due.is_full() {
            match session.next_due(horizon, &self.config.therapy, &mut self.rng) {
                Some(step) => {
                    let _ = due.push(step);
                }
                None => break,
            }
        }

        let offset_us = self.sync.corrected_offset(now);
        for step in due {
            self.dispatch(step, offset_us);
        }
    }

    fn dispatch(&mut self, step: ScheduledStep, offset_us: i64) {
        let amplitude = self.config.therapy.amplitude;
        let command = MotorCommand {
            actuator: Actuator {
                side: DeviceRole::Primary,
                finger: step.primary_finger,
            },
            amplitude,
            duration_ms: step.duration_ms,
            execute_at_us: step.execute_at_us,
            offset_us,
        };
        if self.haptic.execute(command).is_err() {
            self.stats.haptic_failures += 1;
        }

        self.send_to_peer(&Message::Buzz {
            finger: step.secondary_finger,
            amplitude,
            duration_ms: step.duration_ms,
            execute_at_us: step.execute_at_us,
        });
        self.stats.steps += 1;
        self.report.dispatched += 1;
    }

    fn execute_buzz(&mut self, finger: u8, amplitude: u8, duration_ms: u16, execute_at_us: u64) {
        if !self.state.actuators_allowed() {
            self.stats.buzzes_dropped += 1;
            return;
        }
        self.stats.buzzes_received += 1;
        let command = MotorCommand {
            actuator: Actuator {
                side: self.config.role,
                finger,
            },
            amplitude,
            duration_ms,
            execute_at_us,
            offset_us: self.sync.corrected_offset(self.clock.now_us()),
        };
        if self.haptic.execute(command).is_err() {
            self.stats.haptic_failures += 1;
        }
    }

    fn send_to_peer(&mut self, message: &Message) {
        if self.transport.send_message(message).is_err() {
            self.stats.peer_send_failures += 1;
        }
    }

    fn deactivate_local(&mut self) {
        if self.haptic.deactivate_all().is_err() {
            self.stats.haptic_failures += 1;
        }
    }

    fn is_primary(&self) -> bool {
        self.config.role == DeviceRole::Primary
    }

    /// Apply an event and run entry actions until things settle
    fn fire(&mut self, event: Event, now: u64, metrics: &mut LatencyMetrics) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let from = self.state;
            let to = from.transition(event);
            if to == from {
                continue;
            }
            self.state = to;
            self.entered_at_us = now;
            let _ = self.report.transitions.push(Transition { from, to, event });
            next = self.enter(from, to, now, metrics);
        }
    }

    /// Entry actions; may return a follow-up event
    fn enter(
        &mut self,
        from: State,
        to: State,
        now: u64,
        metrics: &mut LatencyMetrics,
    ) -> Option<Event> {
        let primary = self.is_primary();
        let reference = self.sync.to_reference(now);
        if to == State::Running {
            self.last_peer_traffic_us = now;
        }

        match to {
            State::Advertising => {
                self.connect_started_us = now;
                None
            }
            State::Syncing => {
                // Metrics cover the whole session, sync probing included
                if self.config.metrics.auto_enable {
                    metrics.enable(self.config.metrics.verbose);
                }
                self.sync
                    .start(now, &mut self.transport, metrics)
                    .err()
                    .map(|e| Event::ErrorDetected(e.into()))
            }
            State::Ready => self.pending_pattern.is_some().then_some(Event::PatternStart),
            State::Calibrating => {
                let finger = self.calibration.map_or(0, |(finger, _)| finger);
                self.calibration = Some((finger, now));
                let command = MotorCommand {
                    actuator: Actuator {
                        side: self.config.role,
                        finger,
                    },
                    amplitude: self.config.therapy.amplitude,
                    duration_ms: self.config.therapy.calibration_ms,
                    execute_at_us: reference,
                    offset_us: self.sync.corrected_offset(now),
                };
                if self.haptic.execute(command).is_err() {
                    self.stats.haptic_failures += 1;
                }
                None
            }
            State::Running if from == State::Ready => {
                let kind = self
                    .pending_pattern
                    .take()
                    .unwrap_or(self.config.therapy.pattern);
                let first_step = if primary {
                    reference.saturating_add(self.sync.lead_time_us() as u64)
                } else {
                    reference
                };
                self.session = Some(TherapySession::new(
                    kind,
                    &self.config.therapy,
                    reference,
                    first_step,
                    &mut self.rng,
                ));
                if primary {
                    self.send_to_peer(&Message::StartSession {
                        pattern: kind.to_byte(),
                    });
                    self.sync.set_maintenance(true, now);
                }
                None
            }
            State::Running => {
                if let Some(session) = self.session.as_mut() {
                    session.resume(reference);
                }
                None
            }
            State::Paused => {
                if let Some(session) = self.session.as_mut() {
                    session.pause(reference);
                }
                if primary {
                    self.send_to_peer(&Message::PauseSession);
                    self.sync.set_maintenance(false, now);
                }
                None
            }
            State::Resuming => {
                if primary {
                    self.send_to_peer(&Message::ResumeSession);
                    self.sync.set_maintenance(true, now);
                }
                None
            }
            State::Stopping => {
                if let Some(session) = self.session.as_mut() {
                    session.accumulate(reference);
                }
                if primary {
                    self.send_to_peer(&Message::StopSession);
                    self.sync.set_maintenance(false, now);
                }
                None
            }
            State::Idle => {
                self.session = None;
                self.pending_pattern = None;
                self.calibration = None;
                self.sync.cancel();
                if self.config.metrics.auto_enable {
                    metrics.disable();
                }
                None
            }
            State::Error(_) => {
                self.session = None;
                self.pending_pattern = None;
                self.calibration = None;
                self.sync.cancel();
                self.deactivate_local();
                None
            }
            State::Connecting => None,
        }
    }
}
