// Message channel — reconnecting WebSocket link to the control server.

pub mod client;
pub mod protocol;

use std::fmt;

/// Connection lifecycle of the message channel.
///
/// Disconnected → Connecting → Connected loops forever on I/O errors with
/// a fixed backoff; ShutDown is terminal and reachable only through an
/// explicit cancellation, never through a network fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ShutDown,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::ShutDown => "shut down",
        };
        write!(f, "{name}")
    }
}
