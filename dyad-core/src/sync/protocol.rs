//! Probe/echo handshake over the glove link
//!
//! PRIMARY sends one `Ping` at a time, waits for the matching `Pong` or the
//! per-probe timeout, and moves on to the next slot until the engine has
//! enough. A lost probe is never retried. When the session ends PRIMARY
//! publishes the result to SECONDARY in a `SyncReport`.
//!
//! SECONDARY only answers pings and waits for that report; its own clock
//! is the reference so it never computes an offset.

use dyad_protocol::Message;

use crate::config::{DeviceRole, SyncConfig};
use crate::metrics::{LatencyMetrics, SyncConfidence};
use crate::traits::Transport;

use super::engine::{ClockSyncEngine, ProbeVerdict, SyncError};
use super::handoff::InboundEcho;
use super::probe::{ClockOffset, SyncProbe};

/// Where the current probe slot stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProbePhase {
    Idle,
    /// Probe handed to the transport
    ProbeSent,
    /// Transport accepted it; timer running
    AwaitingEcho,
    /// Echo arrived in time and was used
    Accepted,
    /// Timer expired, the echo was too slow, or the send failed
    TimedOut,
}

/// Session-level results reported to the therapy state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncEvent {
    /// Initial sync finished; on SECONDARY the offset is PRIMARY's
    SyncComplete {
        offset_us: i64,
        confidence: SyncConfidence,
    },
    SyncFailed(SyncError),
    /// A maintenance probe moved the offset
    OffsetRefined { offset_us: i64 },
}

/// Loss and traffic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncStats {
    pub probes_sent: u32,
    pub probes_lost: u32,
    pub stale_echoes: u32,
    pub send_failures: u32,
    pub echoes_answered: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    /// PRIMARY running the initial probe sequence
    Probing,
    /// SECONDARY waiting for PRIMARY's report
    AwaitingReport { since_us: u64 },
    /// PRIMARY re-probing in the background
    Maintenance { next_probe_at: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    seq: u16,
    sent_at: u64,
}

/// Sync handshake driver for one glove
#[derive(Debug, Clone)]
pub struct SyncProtocol {
    role: DeviceRole,
    config: SyncConfig,
    engine: ClockSyncEngine,
    mode: Mode,
    phase: ProbePhase,
    next_seq: u16,
    outstanding: Option<Outstanding>,
    confidence: SyncConfidence,
    stats: SyncStats,
}

impl SyncProtocol {
    pub fn new(role: DeviceRole, config: SyncConfig) -> Self {
        Self {
            role,
            config,
            engine: ClockSyncEngine::new(config),
            mode: Mode::Idle,
            phase: ProbePhase::Idle,
            next_seq: 0,
            outstanding: None,
            confidence: SyncConfidence::Unknown,
            stats: SyncStats::default(),
        }
    }

    /// Begin initial synchronization
    ///
    /// PRIMARY opens an engine session and sends the first probe right
    /// away. SECONDARY starts waiting for the report.
    pub fn start<T: Transport>(
        &mut self,
        now_us: u64,
        transport: &mut T,
        metrics: &mut LatencyMetrics,
    ) -> Result<(), SyncError> {
        if self.is_syncing() {
            return Err(SyncError::AlreadyInProgress);
        }
        self.outstanding = None;
        self.confidence = SyncConfidence::Unknown;

        match self.role {
            DeviceRole::Primary => {
                self.engine.begin_sync_session(
                    self.config.probe_count,
                    self.config.probe_timeout_us,
                    now_us,
                    metrics,
                )?;
                self.mode = Mode::Probing;
                self.send_probe(now_us, transport);
            }
            DeviceRole::Secondary => {
                self.mode = Mode::AwaitingReport { since_us: now_us };
                self.phase = ProbePhase::Idle;
            }
        }
        Ok(())
    }

    /// Drop any session or maintenance in progress; the offset is kept
    pub fn cancel(&mut self) {
        self.engine.cancel();
        self.mode = Mode::Idle;
        self.phase = ProbePhase::Idle;
        self.outstanding = None;
    }

    /// Advance timers and consume an echo taken from the handoff slot
    pub fn poll<T: Transport>(
        &mut self,
        now_us: u64,
        echo: Option<InboundEcho>,
        transport: &mut T,
        metrics: &mut LatencyMetrics,
    ) -> Option<SyncEvent> {
        match self.mode {
            Mode::Idle => {
                if echo.is_some() {
                    self.stats.stale_echoes += 1;
                }
                None
            }
            Mode::Probing => self.poll_probing(now_us, echo, transport, metrics),
            Mode::AwaitingReport { since_us } => {
                // PRIMARY may enter its session a little later than we do
                if now_us.saturating_sub(since_us) >= 2 * self.config.session_timeout_us {
                    self.mode = Mode::Idle;
                    return Some(SyncEvent::SyncFailed(SyncError::Timeout));
                }
                None
            }
            Mode::Maintenance { .. } => self.poll_maintenance(now_us, echo, transport, metrics),
        }
    }

    fn poll_probing<T: Transport>(
        &mut self,
        now_us: u64,
        echo: Option<InboundEcho>,
        transport: &mut T,
        metrics: &mut LatencyMetrics,
    ) -> Option<SyncEvent> {
        if let Some(echo) = echo.filter(|e| self.match_echo(e).is_some()) {
            let verdict = self.engine.on_probe_turnaround(
                echo.echoed_at,
                echo.echo_sent_at,
                echo.received_at,
                metrics,
            );
            self.phase = match verdict {
                Ok(ProbeVerdict::Accepted { .. }) => ProbePhase::Accepted,
                _ => {
                    self.stats.probes_lost += 1;
                    ProbePhase::TimedOut
                }
            };
        }

        if self.expire_outstanding(now_us) {
            let _ = self.engine.on_probe_lost();
        }

        if self.engine.is_complete(now_us) {
            self.outstanding = None;
            return Some(self.finish(now_us, transport, metrics));
        }

        if self.engine.wants_probe() {
            self.send_probe(now_us, transport);
        }
        None
    }

    fn poll_maintenance<T: Transport>(
        &mut self,
        now_us: u64,
        echo: Option<InboundEcho>,
        transport: &mut T,
        metrics: &mut LatencyMetrics,
    ) -> Option<SyncEvent> {
        let mut event = None;

        if let Some(echo) = echo {
            if let Some(out) = self.match_echo(&echo) {
                let probe = SyncProbe::new(out.sent_at, echo.echoed_at, echo.received_at)
                    .with_echo_sent(echo.echo_sent_at);
                match self.engine.refine(&probe, now_us, metrics) {
                    Some(offset_us) => {
                        self.phase = ProbePhase::Accepted;
                        event = Some(SyncEvent::OffsetRefined { offset_us });
                    }
                    None => {
                        self.phase = ProbePhase::TimedOut;
                        self.stats.probes_lost += 1;
                    }
                }
            }
        }

        self.expire_outstanding(now_us);

        if let Mode::Maintenance { next_probe_at } = self.mode {
            if self.outstanding.is_none() && now_us >= next_probe_at {
                self.mode = Mode::Maintenance {
                    next_probe_at: now_us + self.config.resync_interval_us,
                };
                self.send_ping(now_us, transport);
            }
        }
        event
    }

    /// Take the outstanding probe if the echo answers it
    fn match_echo(&mut self, echo: &InboundEcho) -> Option<Outstanding> {
        match self.outstanding {
            Some(out) if out.seq == echo.seq => {
                self.outstanding = None;
                Some(out)
            }
            _ => {
                self.stats.stale_echoes += 1;
                None
            }
        }
    }

    /// Time out the outstanding probe; returns true if one expired
    fn expire_outstanding(&mut self, now_us: u64) -> bool {
        match self.outstanding {
            Some(out)
                if now_us.saturating_sub(out.sent_at) > self.config.probe_timeout_us as u64 =>
            {
                self.outstanding = None;
                self.phase = ProbePhase::TimedOut;
                self.stats.probes_lost += 1;
                true
            }
            _ => false,
        }
    }

    fn send_probe<T: Transport>(&mut self, now_us: u64, transport: &mut T) {
        let _ = self.engine.on_probe_sent(now_us);
        if !self.send_ping(now_us, transport) {
            let _ = self.engine.on_probe_lost();
        }
    }

    /// Send a ping; a failed send counts as a lost slot
    fn send_ping<T: Transport>(&mut self, now_us: u64, transport: &mut T) -> bool {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.phase = ProbePhase::ProbeSent;
        self.stats.probes_sent += 1;

        match transport.send_message(&Message::Ping { seq, t1: now_us }) {
            Ok(()) => {
                self.outstanding = Some(Outstanding {
                    seq,
                    sent_at: now_us,
                });
                self.phase = ProbePhase::AwaitingEcho;
                true
            }
            Err(_) => {
                self.stats.send_failures += 1;
                self.stats.probes_lost += 1;
                self.phase = ProbePhase::TimedOut;
                false
            }
        }
    }

    fn finish<T: Transport>(
        &mut self,
        now_us: u64,
        transport: &mut T,
        metrics: &mut LatencyMetrics,
    ) -> SyncEvent {
        self.mode = Mode::Idle;
        self.phase = ProbePhase::Idle;

        match self.engine.finalize(now_us, metrics) {
            Ok(outcome) => {
                self.confidence = outcome.confidence;
                let report = Message::SyncReport {
                    offset_us: outcome.offset_us,
                    confidence: outcome.confidence.to_byte(),
                };
                if transport.send_message(&report).is_err() {
                    self.stats.send_failures += 1;
                }
                SyncEvent::SyncComplete {
                    offset_us: outcome.offset_us,
                    confidence: outcome.confidence,
                }
            }
            Err(e) => SyncEvent::SyncFailed(e),
        }
    }

    /// Switch background re-probing on or off (PRIMARY only)
    ///
    /// Only starts once an offset exists and no initial session is running.
    pub fn set_maintenance(&mut self, enabled: bool, now_us: u64) {
        match (enabled, self.mode) {
            (true, Mode::Idle)
                if self.role == DeviceRole::Primary && self.engine.offset().is_some() =>
            {
                self.mode = Mode::Maintenance {
                    next_probe_at: now_us + self.config.resync_interval_us,
                };
            }
            (false, Mode::Maintenance { .. }) => {
                self.mode = Mode::Idle;
                self.phase = ProbePhase::Idle;
                self.outstanding = None;
            }
            _ => {}
        }
    }

    /// Answer a probe (SECONDARY only)
    ///
    /// `received_at` is when the ping arrived, `now_us` when the echo leaves.
    pub fn on_ping<T: Transport>(
        &mut self,
        seq: u16,
        received_at: u64,
        now_us: u64,
        transport: &mut T,
    ) {
        if self.role != DeviceRole::Secondary {
            return;
        }
        let pong = Message::Pong {
            seq,
            t2: received_at,
            t3: now_us,
        };
        match transport.send_message(&pong) {
            Ok(()) => self.stats.echoes_answered += 1,
            Err(_) => self.stats.send_failures += 1,
        }
    }

    /// Accept PRIMARY's published result (SECONDARY only)
    pub fn on_sync_report(
        &mut self,
        offset_us: i64,
        confidence: u8,
        metrics: &mut LatencyMetrics,
    ) -> Option<SyncEvent> {
        if self.role != DeviceRole::Secondary || !matches!(self.mode, Mode::AwaitingReport { .. })
        {
            return None;
        }
        let confidence = SyncConfidence::from_byte(confidence).unwrap_or_default();
        self.mode = Mode::Idle;
        self.confidence = confidence;
        metrics.finalize_sync_probing(offset_us);
        Some(SyncEvent::SyncComplete {
            offset_us,
            confidence,
        })
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn phase(&self) -> ProbePhase {
        self.phase
    }

    /// Confidence of the last completed sync
    pub fn confidence(&self) -> SyncConfidence {
        self.confidence
    }

    /// Initial sync running (or awaited, on SECONDARY)
    pub fn is_syncing(&self) -> bool {
        matches!(self.mode, Mode::Probing | Mode::AwaitingReport { .. })
    }

    pub fn is_maintaining(&self) -> bool {
        matches!(self.mode, Mode::Maintenance { .. })
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn engine(&self) -> &ClockSyncEngine {
        &self.engine
    }

    /// Current offset; identity on SECONDARY or before the first sync
    pub fn offset(&self) -> ClockOffset {
        self.engine.offset().unwrap_or_default()
    }

    pub fn to_reference(&self, local_us: u64) -> u64 {
        self.offset().to_reference(local_us)
    }

    pub fn corrected_offset(&self, now_us: u64) -> i64 {
        self.engine.corrected_offset(now_us)
    }

    pub fn lead_time_us(&self) -> u32 {
        self.engine.lead_time_us()
    }
}
