//! 实时通道：心跳与指数退避重连。
//!
//! # Realtime Channel
//!
//! A persistent duplex connection for push events, independent of the
//! request dispatcher.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──opened──► Connected
//!      ▲                        │  ▲                   │
//!      │ give up        failed  ▼  │ timer      closed │
//!      └──────────────── ReconnectScheduled ◄──────────┘
//! ```
//!
//! [`ChannelStateMachine`] holds the transitions and the reconnect backoff and
//! does no I/O. [`RealtimeClient`] drives it over an injected
//! [`ChannelTransport`]: it opens connections, sends `{"event":"ping"}` on the
//! heartbeat interval while connected, and broadcasts inbound
//! `{"event", "data"}` frames to subscribers.

mod client;
mod state;

pub use client::{ChannelConnection, ChannelTransport, RealtimeClient, RealtimeMessage};
pub use state::{ChannelCommand, ChannelEvent, ChannelState, ChannelStateMachine};
