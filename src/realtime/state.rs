//! Connection state machine, free of any I/O.
//!
//! The driver feeds it [`ChannelEvent`]s and carries out the
//! [`ChannelCommand`]s it returns.

use crate::config::RealtimeConfig;
use crate::resilience::Backoff;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled { attempt: u32, delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Caller asked to connect.
    Connect,
    /// The transport handshake completed.
    Opened,
    /// The handshake failed.
    ConnectFailed,
    /// The transport reported the connection closed.
    Closed,
    ReconnectTimerFired,
    /// Caller asked to disconnect. Never followed by a reconnect.
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    Open,
    StartHeartbeat,
    StopHeartbeat,
    ScheduleReconnect(Duration),
    Close,
    /// Reconnect attempts exhausted.
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ChannelStateMachine {
    state: ChannelState,
    attempts: u32,
    max_attempts: u32,
    backoff: Backoff,
    jitter: bool,
}

impl ChannelStateMachine {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            state: ChannelState::Disconnected,
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            backoff: Backoff::new(config.reconnect_base_delay, config.reconnect_max_delay),
            jitter: config.jitter,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn handle(&mut self, event: ChannelEvent) -> Vec<ChannelCommand> {
        use ChannelCommand as C;
        use ChannelEvent as E;
        use ChannelState as S;

        match (self.state, event) {
            (S::Disconnected, E::Connect) => {
                self.attempts = 0;
                self.state = S::Connecting;
                vec![C::Open]
            }
            (S::Connecting, E::Opened) => {
                self.attempts = 0;
                self.state = S::Connected;
                vec![C::StartHeartbeat]
            }
            (S::Connecting, E::ConnectFailed) => self.schedule_reconnect(Vec::new()),
            (S::Connected, E::Closed) => self.schedule_reconnect(vec![C::StopHeartbeat]),
            (S::ReconnectScheduled { .. }, E::ReconnectTimerFired) => {
                self.state = S::Connecting;
                vec![C::Open]
            }
            (S::Connected, E::Disconnect) => {
                self.state = S::Disconnected;
                vec![C::StopHeartbeat, C::Close]
            }
            (S::Connecting | S::ReconnectScheduled { .. }, E::Disconnect) => {
                self.state = S::Disconnected;
                vec![C::Close]
            }
            _ => Vec::new(),
        }
    }

    fn schedule_reconnect(&mut self, mut commands: Vec<ChannelCommand>) -> Vec<ChannelCommand> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            self.state = ChannelState::Disconnected;
            commands.push(ChannelCommand::GiveUp);
            return commands;
        }
        let delay = if self.jitter {
            self.backoff.delay(self.attempts)
        } else {
            self.backoff.delay_with_jitter(self.attempts, Duration::ZERO)
        };
        self.state = ChannelState::ReconnectScheduled {
            attempt: self.attempts,
            delay,
        };
        commands.push(ChannelCommand::ScheduleReconnect(delay));
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(max: u32) -> ChannelStateMachine {
        ChannelStateMachine::new(&RealtimeConfig {
            max_reconnect_attempts: max,
            reconnect_base_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_secs(1),
            jitter: false,
            ..RealtimeConfig::default()
        })
    }

    #[test]
    fn test_connect_open_close_cycle() {
        let mut m = machine(3);
        assert_eq!(m.handle(ChannelEvent::Connect), vec![ChannelCommand::Open]);
        assert_eq!(m.state(), ChannelState::Connecting);
        assert_eq!(m.handle(ChannelEvent::Opened), vec![ChannelCommand::StartHeartbeat]);
        assert_eq!(m.state(), ChannelState::Connected);

        let cmds = m.handle(ChannelEvent::Closed);
        assert_eq!(
            cmds,
            vec![
                ChannelCommand::StopHeartbeat,
                ChannelCommand::ScheduleReconnect(Duration::from_millis(200))
            ]
        );
        assert_eq!(
            m.state(),
            ChannelState::ReconnectScheduled {
                attempt: 1,
                delay: Duration::from_millis(200)
            }
        );
        assert_eq!(m.handle(ChannelEvent::ReconnectTimerFired), vec![ChannelCommand::Open]);
    }

    #[test]
    fn test_delays_grow_then_give_up() {
        let mut m = machine(3);
        m.handle(ChannelEvent::Connect);
        let mut delays = Vec::new();
        for _ in 0..3 {
            match m.handle(ChannelEvent::ConnectFailed).as_slice() {
                [ChannelCommand::ScheduleReconnect(d)] => delays.push(*d),
                other => panic!("unexpected commands: {:?}", other),
            }
            m.handle(ChannelEvent::ReconnectTimerFired);
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800)
            ]
        );
        assert_eq!(m.handle(ChannelEvent::ConnectFailed), vec![ChannelCommand::GiveUp]);
        assert_eq!(m.state(), ChannelState::Disconnected);
    }

    #[test]
    fn test_successful_open_resets_attempts() {
        let mut m = machine(2);
        m.handle(ChannelEvent::Connect);
        m.handle(ChannelEvent::ConnectFailed);
        m.handle(ChannelEvent::ReconnectTimerFired);
        assert_eq!(m.attempts(), 1);
        m.handle(ChannelEvent::Opened);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn test_disconnect_is_final() {
        let mut m = machine(3);
        m.handle(ChannelEvent::Connect);
        m.handle(ChannelEvent::Opened);
        assert_eq!(
            m.handle(ChannelEvent::Disconnect),
            vec![ChannelCommand::StopHeartbeat, ChannelCommand::Close]
        );
        assert_eq!(m.state(), ChannelState::Disconnected);
        assert!(m.handle(ChannelEvent::Closed).is_empty());
        assert!(m.handle(ChannelEvent::ReconnectTimerFired).is_empty());
    }

    #[test]
    fn test_ignores_out_of_order_events() {
        let mut m = machine(3);
        assert!(m.handle(ChannelEvent::Opened).is_empty());
        assert!(m.handle(ChannelEvent::Closed).is_empty());
        assert_eq!(m.state(), ChannelState::Disconnected);
    }
}
