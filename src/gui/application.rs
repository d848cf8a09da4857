use futures::channel::mpsc::Sender;
use iced::{executor, Alignment, Application, Command, Element, Length, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::time::{every as iced_time_every};
use iced::theme::{self, Theme};
use iced::widget::{
    button, column, container, horizontal_rule, row, slider, text, text_input,
};
use std::time::Duration;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::command::Direction;
use crate::device::connection::device_subscription;
use crate::device::constants::{MOTION_DEBOUNCE_DELAY, SPEED_MAX, SPEED_MIN};
use crate::device::types::{DeviceCommand, DeviceEvent, DeviceState};
use crate::error::AppRunError;
use crate::gui::debounce::Debounce;
use crate::gui::types::{Message, View};

/// A debounced motion dispatch fires only for the newest debounce generation,
/// and only while the link is up; everything else is a silent no-op.
fn motion_dispatch_allowed(state: &DeviceState, debounce: &Debounce, generation: u64) -> bool {
    debounce.is_current(generation) && state.is_connected()
}

pub struct ApplicationFlags {
    config_io: ConfigIO,
    device_name_override: Option<String>,
}

pub struct MatrixRemoteApp {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,

    // messages that the user must click away
    notices: Vec<String>,

    // current config, might not be saved to disk yet
    config_io: ConfigIO,
    config: Config,
    config_dirty: bool,
    // this flag is used to make sure that a user is not spammed with save configuration errors
    displayed_config_save_error: bool,

    // --device-name takes precedence over the configured name
    device_name_override: Option<String>,

    // commands are sent to the device task over this channel, handed to us by
    // the device subscription once it has started
    device_sender: Option<Sender<DeviceCommand>>,

    // latest state from the device task
    latest_device_state: DeviceState,

    // session-scoped control state, deliberately not persisted
    view: View,
    display_text: String,
    speed: u16,
    direction: Direction,
    motion_debounce: Debounce,
}

impl MatrixRemoteApp {
    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }

    fn effective_device_name(&self) -> String {
        self.device_name_override.clone().unwrap_or_else(|| self.config.device_name.clone())
    }

    fn dispatch(&mut self, command: DeviceCommand) {
        match &mut self.device_sender {
            Some(sender) => {
                if let Err(err) = sender.try_send(command) {
                    error!("Failed to send command to device task: {:?}", err);
                }
            },
            None => {
                error!("Device task is not running yet, dropping {:?}", command);
            },
        }
    }

    /// (Re)arms the motion debounce timer. Only the newest generation will
    /// still be current when its delayed message arrives, so dragging the
    /// slider results in a single dispatch of the final values.
    fn schedule_motion_dispatch(&mut self) -> Command<Message> {
        let generation = self.motion_debounce.arm();
        let fut = tokio::time::sleep(Duration::from_millis(MOTION_DEBOUNCE_DELAY));
        Command::perform(fut, move |_| Message::MotionDebounceElapsed(generation))
    }

    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    let mut error_message: Option<String> = None;

                    if err.is_file_not_found_error() {
                        // this is probably the first start of the app
                        info!("Config file not found, using defaults");
                    } else {
                        error!("Failed to load config: {:?}", &err);
                        error_message = Some(format!("Failed to load config: {}", &err));
                    }
                    (Config::default(), error_message)
                }
            }
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn save_config(&self) -> Command<Message> {
        let config = self.config.clone();
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.save(config).await {
                Ok(_) => None,
                Err(err) => {
                    error!("Failed to save config: {:?}", &err);
                    return Some(format!("Failed to save config: {}", &err));
                },
            }
        };

        return Command::perform(fut, Message::ConfigSaveComplete);
    }
}

impl Application for MatrixRemoteApp {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (MatrixRemoteApp, Command<Self::Message>) {
        let app = MatrixRemoteApp {
            app_cancel: CancellationToken::new(),
            notices: Vec::new(),
            config_io: flags.config_io,
            config: Config::default(),
            config_dirty: false,
            displayed_config_save_error: false,
            device_name_override: flags.device_name_override,
            device_sender: None,
            latest_device_state: DeviceState::Initial,
            view: View::Control,
            display_text: String::from("HELLO"),
            speed: 50,
            direction: Direction::Left,
            motion_debounce: Debounce::default(),
        };

        let command = app.load_config();
        (app, command)
    }

    fn title(&self) -> String {
        String::from(concat!("Matrix Remote ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                self.config = config;
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }
            },
            Message::ApplyDirtyConfig => {
                if self.config_dirty {
                    self.config_dirty = false;
                    return self.save_config();
                }
            },
            Message::ConfigSaveComplete(error_message) => {
                if !self.displayed_config_save_error {
                    if let Some(error_message) = error_message {
                        self.displayed_config_save_error = true;
                        self.notices.push(error_message);
                    }
                }
            },
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                }
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();
                return window::close(id);
            },
            Message::DeviceEvent(DeviceEvent::Ready(sender)) => {
                self.device_sender = Some(sender);
            },
            Message::DeviceEvent(DeviceEvent::StateChange(state)) => {
                let became_connected = !self.latest_device_state.is_connected() && state.is_connected();
                self.latest_device_state = state;

                if became_connected {
                    // bring the device up to date with the current settings
                    return self.schedule_motion_dispatch();
                }
            },
            Message::ViewSelected(view) => {
                self.view = view;
            },
            Message::ConnectPressed => {
                if !self.latest_device_state.is_connected() {
                    let device_name = self.effective_device_name();
                    self.dispatch(DeviceCommand::Connect { device_name });
                }
            },
            Message::SpeedChanged(speed) => {
                self.speed = speed.clamp(SPEED_MIN, SPEED_MAX);
                return self.schedule_motion_dispatch();
            },
            Message::DirectionToggled => {
                self.direction = self.direction.toggled();
                return self.schedule_motion_dispatch();
            },
            Message::MotionDebounceElapsed(generation) => {
                if motion_dispatch_allowed(&self.latest_device_state, &self.motion_debounce, generation) {
                    self.dispatch(DeviceCommand::SendMotion {
                        speed: self.speed,
                        direction: self.direction,
                    });
                }
            },
            Message::TextChanged(display_text) => {
                self.display_text = display_text;
            },
            Message::SendTextPressed => {
                if self.latest_device_state.is_connected() {
                    self.dispatch(DeviceCommand::SendText {
                        text: self.display_text.clone(),
                    });
                }
            },
            Message::DeviceNameChanged(device_name) => {
                self.config.device_name = device_name;
                self.config_dirty = true;
            },

            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            event::listen().map(Message::EventOccurred),
            iced_time_every(Duration::from_secs(1)).map(|_| Message::ApplyDirtyConfig),
            device_subscription(self.app_cancel.clone()).map(Message::DeviceEvent),
        ])
    }

    fn view(&self) -> Element<Message> {
        if let Some(notice) = self.notices.first() {
            return container(
                column![
                    text(notice),

                    button(text("Okay"))
                        .on_press(Message::NoticeConfirmed),

                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        let connected = self.latest_device_state.is_connected();

        let status = match &self.latest_device_state {
            DeviceState::Initial => "Ready to connect".to_string(),
            DeviceState::Scanning => "Scanning…".to_string(),
            DeviceState::Connecting => "Connecting…".to_string(),
            DeviceState::Connected => "Connected".to_string(),
            DeviceState::Disconnected => "Disconnected".to_string(),
            DeviceState::Failed { message } => format!("Error: {}", message),
        };

        let mut connect_button = button(
            text(if connected { "Connected" } else { "Connect" })
        );
        if !connected {
            connect_button = connect_button.on_press(Message::ConnectPressed);
        }

        let header = row![
            column![
                text("R4 MATRIX").size(28),
                text(status).size(12),
            ].width(Length::Fill),

            connect_button,
        ].align_items(Alignment::Center).spacing(20);

        let view_tab = |label: &'static str, view: View, current: View| -> Element<Message> {
            button(text(label))
                .style(if view == current { theme::Button::Primary } else { theme::Button::Secondary })
                .width(Length::Fill)
                .on_press(Message::ViewSelected(view))
                .into()
        };

        let tabs = row![
            view_tab("Control", View::Control, self.view),
            view_tab("Settings", View::Settings, self.view),
        ].spacing(10);

        let body: Element<Message> = match self.view {
            View::Control => {
                let mut send_button = button(text("Send"));
                if connected {
                    send_button = send_button.on_press(Message::SendTextPressed);
                }

                column![
                    row![
                        text_input("Type text…", &self.display_text)
                            .on_input(Message::TextChanged)
                            .on_submit(Message::SendTextPressed),
                        send_button,
                    ].align_items(Alignment::Center).spacing(10),
                ].spacing(20).into()
            },
            View::Settings => {
                column![
                    column![
                        row![
                            text("Speed").width(Length::Fill),
                            text(self.speed.to_string()),
                        ],
                        slider(SPEED_MIN..=SPEED_MAX, self.speed, Message::SpeedChanged),
                    ].spacing(10),

                    column![
                        text("Direction"),
                        button(text(self.direction.to_string()))
                            .on_press(Message::DirectionToggled),
                    ].spacing(10),

                    column![
                        text("Device name"),
                        text_input("", self.config.device_name.as_str())
                            .on_input(Message::DeviceNameChanged),
                    ].spacing(10),
                ].spacing(30).into()
            },
        };

        container(
            column![
                header,
                tabs,
                horizontal_rule(10),
                body,
            ].spacing(20),
        )
        .width(Length::Fill)
        .padding(20)
        .into()
    }
}

pub fn run_application(device_name_override: Option<String>) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io, device_name_override };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("matrix-remote".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(420.0, 560.0);
    settings.window.resizable = false;

    // this function will call process::exit() unless there was a startup error
    MatrixRemoteApp::run(settings)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounced_motion_is_dropped_while_disconnected() {
        let mut debounce = Debounce::default();
        let generation = debounce.arm();

        assert!(!motion_dispatch_allowed(&DeviceState::Initial, &debounce, generation));
        assert!(!motion_dispatch_allowed(&DeviceState::Scanning, &debounce, generation));
        assert!(!motion_dispatch_allowed(&DeviceState::Connecting, &debounce, generation));
        assert!(!motion_dispatch_allowed(&DeviceState::Disconnected, &debounce, generation));
        assert!(motion_dispatch_allowed(&DeviceState::Connected, &debounce, generation));
    }

    #[test]
    fn stale_debounce_generations_never_dispatch() {
        let mut debounce = Debounce::default();
        let stale = debounce.arm();
        let current = debounce.arm();

        assert!(!motion_dispatch_allowed(&DeviceState::Connected, &debounce, stale));
        assert!(motion_dispatch_allowed(&DeviceState::Connected, &debounce, current));
    }
}
