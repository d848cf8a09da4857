use iced::Event;

use crate::config::types::Config;
use crate::device::types::DeviceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Control,
    Settings,
}

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    ApplyDirtyConfig,
    ConfigLoadComplete((Config, Option<String>)),
    ConfigSaveComplete(Option<String>),
    NoticeConfirmed,
    DeviceEvent(DeviceEvent),
    ViewSelected(View),
    ConnectPressed,
    SpeedChanged(u16),
    DirectionToggled,
    TextChanged(String),
    SendTextPressed,
    DeviceNameChanged(String),
    MotionDebounceElapsed(u64),
}
