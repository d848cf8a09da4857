use futures::channel::mpsc::Sender;

use crate::device::command::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Initial,
    Scanning,
    Connecting,
    Connected,
    /// The link was established earlier and has been lost.
    Disconnected,
    /// A connection attempt failed. No automatic retry takes place.
    Failed { message: String },
}

impl DeviceState {
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceState::Connected)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// First event from the device task: the channel to send commands to.
    Ready(Sender<DeviceCommand>),
    StateChange(DeviceState),
}

/// Commands from the gui to the device task.
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    Connect { device_name: String },
    SendMotion { speed: u16, direction: Direction },
    SendText { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_state_may_send() {
        assert!(DeviceState::Connected.is_connected());
        assert!(!DeviceState::Initial.is_connected());
        assert!(!DeviceState::Scanning.is_connected());
        assert!(!DeviceState::Connecting.is_connected());
        assert!(!DeviceState::Disconnected.is_connected());
        assert!(!DeviceState::Failed { message: "nope".to_string() }.is_connected());
    }
}
