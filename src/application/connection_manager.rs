// Connection manager - Live channel lifecycle and inbound dispatch
use crate::application::poller::PollReason;
use crate::application::session::SessionEvent;
use crate::domain::connection::ConnectionState;
use crate::domain::device::{PumpStatus, ValveStatus};
use crate::domain::error::ConnectionError;
use crate::domain::sample::Sample;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Typed event decoded from the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    VialUpdate(Sample),
    PumpStatus(PumpStatus),
    ValveStatus(ValveStatus),
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open the channel and complete its handshake
    async fn connect(&self) -> Result<Box<dyn ChannelStream>, ConnectionError>;
}

#[async_trait]
pub trait ChannelStream: Send {
    /// Next inbound event, `None` once the peer has closed the channel.
    async fn next_event(&mut self) -> Option<Result<InboundEvent, ConnectionError>>;
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up; 0 never gives up.
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(5_000),
            max_attempts: 10,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Doubling backoff capped at `max_delay`. `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts != 0 && failures >= self.max_attempts
    }
}

enum StreamEnd {
    Dropped(ConnectionError),
    SessionClosed,
}

pub struct ConnectionManager {
    transport: Arc<dyn ChannelTransport>,
    policy: ReconnectPolicy,
    events: mpsc::Sender<SessionEvent>,
    seed: mpsc::Sender<PollReason>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        policy: ReconnectPolicy,
        events: mpsc::Sender<SessionEvent>,
        seed: mpsc::Sender<PollReason>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            policy,
            events,
            seed,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Connect, forward events, reconnect on failure. Returns when the
    /// session stops listening or the reconnect budget is spent.
    pub async fn run(self) {
        let mut failures = 0u32;

        loop {
            if !self.transition(ConnectionState::Connecting).await {
                return;
            }

            match self.connect().await {
                Ok(stream) => {
                    failures = 0;
                    if !self.transition(ConnectionState::Connected).await {
                        return;
                    }
                    if let Err(error) = self.seed.try_send(PollReason::Reconnected) {
                        tracing::warn!("Seed poll not scheduled: {}", error);
                    }

                    match self.forward(stream).await {
                        StreamEnd::Dropped(error) => tracing::warn!("Channel dropped: {}", error),
                        StreamEnd::SessionClosed => return,
                    }
                }
                Err(error) => tracing::warn!("Channel connect failed: {}", error),
            }

            failures += 1;
            if !self.transition(ConnectionState::Reconnecting(failures)).await {
                return;
            }

            if self.policy.exhausted(failures) {
                tracing::error!("Giving up on the channel after {} attempts", failures);
                let _ = self
                    .events
                    .send(SessionEvent::ReconnectExhausted { attempts: failures })
                    .await;
                return;
            }

            tokio::time::sleep(self.policy.delay_for(failures)).await;
        }
    }

    async fn connect(&self) -> Result<Box<dyn ChannelStream>, ConnectionError> {
        match tokio::time::timeout(self.policy.connect_timeout, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(self.policy.connect_timeout)),
        }
    }

    async fn forward(&self, mut stream: Box<dyn ChannelStream>) -> StreamEnd {
        loop {
            let event = match stream.next_event().await {
                Some(Ok(InboundEvent::VialUpdate(sample))) => SessionEvent::Sample(sample),
                Some(Ok(InboundEvent::PumpStatus(status))) => SessionEvent::PumpStatus(status),
                Some(Ok(InboundEvent::ValveStatus(status))) => SessionEvent::ValveStatus(status),
                Some(Err(error)) => return StreamEnd::Dropped(error),
                None => return StreamEnd::Dropped(ConnectionError::Closed),
            };

            if self.events.send(event).await.is_err() {
                return StreamEnd::SessionClosed;
            }
        }
    }

    async fn transition(&self, next: ConnectionState) -> bool {
        tracing::info!("Channel {} -> {}", self.state(), next);
        self.state.send_replace(next);
        self.events.send(SessionEvent::Connection(next)).await.is_ok()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Stream that replays events, then either closes or stays open forever.
    pub struct ScriptedStream {
        pub events: VecDeque<InboundEvent>,
        pub hold_open: bool,
    }

    #[async_trait]
    impl ChannelStream for ScriptedStream {
        async fn next_event(&mut self) -> Option<Result<InboundEvent, ConnectionError>> {
            if let Some(event) = self.events.pop_front() {
                return Some(Ok(event));
            }
            if self.hold_open {
                futures::future::pending::<()>().await;
            }
            None
        }
    }

    /// Fails a fixed number of connects, then hands out a scripted stream.
    pub struct ScriptedTransport {
        pub failures_left: Mutex<u32>,
        pub events: Mutex<Vec<InboundEvent>>,
        pub hold_open: bool,
    }

    impl ScriptedTransport {
        pub fn new(failures: u32, events: Vec<InboundEvent>) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                events: Mutex::new(events),
                hold_open: true,
            }
        }
    }

    #[async_trait]
    impl ChannelTransport for ScriptedTransport {
        async fn connect(&self) -> Result<Box<dyn ChannelStream>, ConnectionError> {
            {
                let mut failures = self.failures_left.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(ConnectionError::Unreachable("connection refused".to_string()));
                }
            }
            let events = std::mem::take(&mut *self.events.lock().unwrap());
            Ok(Box::new(ScriptedStream {
                events: events.into(),
                hold_open: self.hold_open,
            }))
        }
    }

    pub fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_attempts,
            connect_timeout: Duration::from_secs(1),
        }
    }
}
