use std::time::{Duration, Instant};

use rand::Rng;

/// Connection phase of one bot session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    LoggedIn,
    InChannel,
    Stopping,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Disconnected => "disconnected",
            Phase::Connecting => "connecting",
            Phase::Connected => "connected",
            Phase::LoggedIn => "logged in",
            Phase::InChannel => "in channel",
            Phase::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Phase transitions plus the single pending reconnect.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
    intentional_stop: bool,
    reconnect_at: Option<Instant>,
    delay_min: u64,
    delay_max: u64,
}

impl Lifecycle {
    /// Delays are whole seconds; an inverted range is swapped.
    pub fn new(delay_min: u64, delay_max: u64) -> Self {
        let (delay_min, delay_max) = if delay_min <= delay_max {
            (delay_min, delay_max)
        } else {
            (delay_max, delay_min)
        };
        Self {
            phase: Phase::Disconnected,
            intentional_stop: false,
            reconnect_at: None,
            delay_min,
            delay_max,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_intentional_stop(&self) -> bool {
        self.intentional_stop
    }

    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn begin_connect(&mut self) {
        if self.phase != Phase::Stopping {
            self.phase = Phase::Connecting;
        }
        self.reconnect_at = None;
    }

    pub fn on_connected(&mut self) {
        self.advance(Phase::Connected);
    }

    pub fn on_logged_in(&mut self) {
        self.advance(Phase::LoggedIn);
    }

    pub fn on_joined(&mut self) {
        self.advance(Phase::InChannel);
    }

    pub fn on_left_channel(&mut self) {
        if self.phase == Phase::InChannel {
            self.phase = Phase::LoggedIn;
        }
    }

    pub fn on_logged_out(&mut self) {
        if matches!(self.phase, Phase::LoggedIn | Phase::InChannel) {
            self.phase = Phase::Connected;
        }
    }

    fn advance(&mut self, to: Phase) {
        if self.phase != Phase::Stopping {
            self.phase = to;
        }
    }

    /// Account-level fault (bad credentials, banned): never reconnect.
    pub fn mark_intentional_stop(&mut self) {
        self.intentional_stop = true;
        self.reconnect_at = None;
    }

    pub fn begin_stop(&mut self) {
        self.phase = Phase::Stopping;
        self.intentional_stop = true;
        self.reconnect_at = None;
    }

    /// Connect failure or lost connection.
    ///
    /// Returns the delay of a newly scheduled reconnect. At most one reconnect
    /// is pending at a time, and none is scheduled after an intentional stop.
    pub fn on_transport_failure<R: Rng + ?Sized>(
        &mut self,
        now: Instant,
        rng: &mut R,
    ) -> Option<Duration> {
        if self.phase == Phase::Stopping {
            return None;
        }
        self.phase = Phase::Disconnected;
        if self.intentional_stop || self.reconnect_at.is_some() {
            return None;
        }
        let delay = Duration::from_secs(rng.gen_range(self.delay_min..=self.delay_max));
        self.reconnect_at = Some(now + delay);
        Some(delay)
    }

    /// Consume the pending reconnect once its deadline has passed.
    pub fn take_due_reconnect(&mut self, now: Instant) -> bool {
        match self.reconnect_at {
            Some(at) if at <= now && !self.intentional_stop => {
                self.reconnect_at = None;
                true
            }
            _ => false,
        }
    }
}
