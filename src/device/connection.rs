use std::convert::Infallible;
use iced::subscription::{self, Subscription};
use futures::{StreamExt, SinkExt};
use futures::channel::mpsc::{channel, Receiver, Sender};
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, info, warn};
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::device::constants::{make_matrix_service_uuid, make_matrix_command_uuid, IS_CONNECTED_DEADLINE, POLL_DELAY, SCAN_DEADLINE};
use crate::device::types::{DeviceCommand, DeviceEvent, DeviceState};
use crate::device::writer::{send_motion, send_text, PeripheralWriter};
use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum IdleReason {
    Initial,
    LinkLost,
    Failed(String),
}

#[derive(Debug)]
enum ConnectionState {
    /// Waiting for the user to initiate a connection. A failed attempt also
    /// ends up here, there is no automatic retry.
    Idle {
        reason: IdleReason,
    },
    Scanning {
        adapters: Vec<Adapter>,
        device_name: String,
        deadline: Instant,
    },
    Connecting {
        peripheral: Peripheral,
    },
    Connected {
        peripheral: Peripheral,
        command_char: Characteristic,
    },
}

fn device_state_of(state: &ConnectionState) -> DeviceState {
    match state {
        ConnectionState::Idle { reason: IdleReason::Initial } => DeviceState::Initial,
        ConnectionState::Idle { reason: IdleReason::LinkLost } => DeviceState::Disconnected,
        ConnectionState::Idle { reason: IdleReason::Failed(message) } => DeviceState::Failed {
            message: message.clone(),
        },
        ConnectionState::Scanning { .. } => DeviceState::Scanning,
        ConnectionState::Connecting { .. } => DeviceState::Connecting,
        ConnectionState::Connected { .. } => DeviceState::Connected,
    }
}

async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, DeviceError> {
    let adapters = manager.adapters().await?;
    let matrix_service_uuid = make_matrix_service_uuid();

    let filter = ScanFilter {
        services: vec![matrix_service_uuid],
    };

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(adapters)
}

async fn stop_scanning(adapters: &Vec<Adapter>) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scan: {:?}", err);
        }
    }
}

async fn find_peripheral(adapters: &Vec<Adapter>, device_name: &str) -> Result<Option<Peripheral>, DeviceError> {
    let matrix_service_uuid = make_matrix_service_uuid();

    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            let properties = peripheral.properties().await;

            match properties {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    warn!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    // Some environments ignore the scan filter, so match on the
                    // advertised name or the advertised service uuid ourselves
                    let name_matches = properties.local_name.as_deref() == Some(device_name);
                    let service_matches = properties.services.contains(&matrix_service_uuid);

                    if name_matches || service_matches {
                        info!(
                            "Using peripheral {} {:?} {} {:?}",
                            properties.address,
                            properties.address_type,
                            properties.local_name.unwrap_or(String::from("NONE")),
                            properties.services,
                        );
                        return Ok(Some(peripheral));
                    }
                }
            }
        }
    }

    Ok(None)
}

async fn connect_peripheral(peripheral: &Peripheral) -> Result<Characteristic, DeviceError> {
    let matrix_service_uuid = make_matrix_service_uuid();
    let matrix_command_uuid = make_matrix_command_uuid();

    info!("Connecting to peripheral...");
    peripheral.connect().await?;

    info!("Connected; Discovering services...");
    peripheral.discover_services().await?;

    for service in peripheral.services() {
        if !service.uuid.eq(&matrix_service_uuid) {
            continue;
        }

        for characteristic in &service.characteristics {
            if !characteristic.uuid.eq(&matrix_command_uuid) {
                continue;
            }

            info!("Using characteristic {:?} {:?}", service.uuid, characteristic.uuid);
            return Ok(characteristic.clone());
        }
    }

    Err(DeviceError::MissingCharacteristic)
}

#[derive(Debug, PartialEq, Eq)]
enum IdleOutcome {
    StartScan { device_name: String },
    Stay(IdleReason),
}

/// While idle, only a connect request advances the state; sends while
/// disconnected are silent no-ops.
async fn advance_idle(reason: IdleReason, commands: &mut Receiver<DeviceCommand>) -> IdleOutcome {
    match commands.next().await {
        Some(DeviceCommand::Connect { device_name }) => IdleOutcome::StartScan { device_name },
        Some(command) => {
            debug!("Ignoring {:?} while not connected", command);
            IdleOutcome::Stay(reason)
        },
        None => {
            // gui gone, nothing left to do
            futures::future::pending().await
        },
    }
}

async fn advance_scanning(adapters: Vec<Adapter>, device_name: String, deadline: Instant, commands: &mut Receiver<DeviceCommand>) -> ConnectionState {
    if Instant::now() >= deadline {
        warn!("No peripheral named {:?} found within the scan deadline", device_name);
        stop_scanning(&adapters).await;
        return ConnectionState::Idle {
            reason: IdleReason::Failed(format!("Device \"{}\" not found", device_name)),
        };
    }

    tokio::select! {
        _ = sleep(Duration::from_millis(POLL_DELAY)) => {
            match find_peripheral(&adapters, &device_name).await {
                Ok(Some(peripheral)) => {
                    stop_scanning(&adapters).await;
                    ConnectionState::Connecting { peripheral }
                },
                Ok(None) => {
                    debug!("No peripherals matched");
                    ConnectionState::Scanning { adapters, device_name, deadline }
                },
                Err(err) => {
                    warn!("Finding peripheral failed: {:?}", err);
                    stop_scanning(&adapters).await;
                    ConnectionState::Idle {
                        reason: IdleReason::Failed(format!("{}", err)),
                    }
                },
            }
        },
        Some(command) = commands.next() => {
            match command {
                DeviceCommand::Connect { device_name: new_name } => {
                    // the name may have been edited since the scan started
                    info!("Restarting scan for {:?}", new_name);
                    ConnectionState::Scanning {
                        adapters,
                        device_name: new_name,
                        deadline: Instant::now() + Duration::from_millis(SCAN_DEADLINE),
                    }
                },
                command => {
                    debug!("Ignoring {:?} while scanning", command);
                    ConnectionState::Scanning { adapters, device_name, deadline }
                },
            }
        },
    }
}

async fn advance_state(state: ConnectionState, manager: &Manager, commands: &mut Receiver<DeviceCommand>) -> ConnectionState {
    match state {
        ConnectionState::Idle { reason } => {
            match advance_idle(reason, commands).await {
                IdleOutcome::StartScan { device_name } => {
                    match start_scanning(manager).await {
                        Ok(adapters) => ConnectionState::Scanning {
                            adapters,
                            device_name,
                            deadline: Instant::now() + Duration::from_millis(SCAN_DEADLINE),
                        },
                        Err(err) => {
                            warn!("Scanning failed: {:?}", err);
                            ConnectionState::Idle {
                                reason: IdleReason::Failed(format!("{}", err)),
                            }
                        },
                    }
                },
                IdleOutcome::Stay(reason) => ConnectionState::Idle { reason },
            }
        },
        ConnectionState::Scanning { adapters, device_name, deadline } => {
            advance_scanning(adapters, device_name, deadline, commands).await
        },
        ConnectionState::Connecting { peripheral } => {
            match connect_peripheral(&peripheral).await {
                Ok(command_char) => {
                    info!("Peripheral ready");
                    ConnectionState::Connected { peripheral, command_char }
                },
                Err(err) => {
                    warn!("Connecting to peripheral failed: {:?}", err);
                    ConnectionState::Idle {
                        reason: IdleReason::Failed(format!("{}", err)),
                    }
                },
            }
        },
        ConnectionState::Connected { peripheral, command_char } => {
            tokio::select! {
                Some(command) = commands.next() => {
                    let mut writer = PeripheralWriter {
                        peripheral: &peripheral,
                        command_char: &command_char,
                    };

                    match command {
                        DeviceCommand::Connect { .. } => {
                            debug!("Already connected, ignoring connect request");
                        },
                        DeviceCommand::SendMotion { speed, direction } => {
                            send_motion(&mut writer, speed, direction).await;
                        },
                        DeviceCommand::SendText { text } => {
                            send_text(&mut writer, &text).await;
                        },
                    }

                    ConnectionState::Connected { peripheral, command_char }
                },
                _ = sleep(Duration::from_millis(POLL_DELAY)) => {
                    check_connection(peripheral, command_char).await
                },
            }
        },
    }
}

#[allow(async_fn_in_trait)]
trait LinkProbe {
    async fn is_connected(&self) -> Result<bool, DeviceError>;
}

struct PeripheralLink<'a> {
    peripheral: &'a Peripheral,
}

impl LinkProbe for PeripheralLink<'_> {
    async fn is_connected(&self) -> Result<bool, DeviceError> {
        Ok(self.peripheral.is_connected().await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkVerdict {
    Alive,
    Lost,
}

/// The explicit connection status of the platform is the sole authority on
/// link loss; a failed or slow check counts as lost.
async fn check_link<P: LinkProbe>(probe: &P) -> LinkVerdict {
    tokio::select! {
        _ = sleep(Duration::from_millis(IS_CONNECTED_DEADLINE)) => {
            // macOS
            warn!("Checking for connection status took too long");
            LinkVerdict::Lost
        }
        result = probe.is_connected() => match result {
            Err(err) => {
                warn!("Error checking for connection state: {:?}", err);
                LinkVerdict::Lost
            },
            Ok(false) => {
                warn!("Connection lost");
                LinkVerdict::Lost
            },
            Ok(true) => LinkVerdict::Alive,
        }
    }
}

/// Link loss drops the characteristic handle along with the state.
async fn check_connection(peripheral: Peripheral, command_char: Characteristic) -> ConnectionState {
    match check_link(&PeripheralLink { peripheral: &peripheral }).await {
        LinkVerdict::Alive => ConnectionState::Connected { peripheral, command_char },
        LinkVerdict::Lost => ConnectionState::Idle { reason: IdleReason::LinkLost },
    }
}

async fn run_device(cancel: CancellationToken, mut commands: Receiver<DeviceCommand>, mut output: Sender<DeviceEvent>) -> Infallible {
    let manager = Manager::new().await.expect("Failed to initialize the bluetooth manager");
    let mut connection_state = Some(ConnectionState::Idle { reason: IdleReason::Initial });
    let mut previous_device_state: Option<DeviceState> = None;

    // note: subscription::channel expects the future to never resolve
    // (Infallible), so after cancellation this loop parks forever instead of
    // returning.
    loop {
        if cancel.is_cancelled() {
            if let Some(ConnectionState::Connected { peripheral, .. }) = &connection_state {
                info!("Disconnecting from peripheral before exit");
                if let Err(err) = peripheral.disconnect().await {
                    warn!("Failed to disconnect peripheral: {:?}", err);
                }
            }
            futures::future::pending::<()>().await;
        }

        let device_state = device_state_of(connection_state.as_ref().unwrap());

        if previous_device_state.is_none() || previous_device_state.as_ref().unwrap() != &device_state {
            let event = DeviceEvent::StateChange(device_state.clone());
            output.send(event).await.expect("Failed to send DeviceEvent");
            previous_device_state = Some(device_state);
        }

        let new_state = advance_state(connection_state.take().unwrap(), &manager, &mut commands).await;
        connection_state = Some(new_state);
    }
}

pub fn device_subscription(cancel: CancellationToken) -> Subscription<DeviceEvent> {
    struct Connect;

    subscription::channel(
        std::any::TypeId::of::<Connect>(),
        64,
        move |mut subscription_sender| {
            let cancel2 = cancel.clone();

            async move {
                let (command_sender, command_receiver) = channel::<DeviceCommand>(64);

                subscription_sender.send(DeviceEvent::Ready(command_sender)).await
                    .expect("Failed to send DeviceEvent");

                run_device(cancel2, command_receiver, subscription_sender).await
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::command::Direction;

    struct HealthyLink;
    struct SeveredLink;
    struct FailingLink;
    struct StalledLink;

    impl LinkProbe for HealthyLink {
        async fn is_connected(&self) -> Result<bool, DeviceError> {
            Ok(true)
        }
    }

    impl LinkProbe for SeveredLink {
        async fn is_connected(&self) -> Result<bool, DeviceError> {
            Ok(false)
        }
    }

    impl LinkProbe for FailingLink {
        async fn is_connected(&self) -> Result<bool, DeviceError> {
            Err(DeviceError::MissingCharacteristic)
        }
    }

    impl LinkProbe for StalledLink {
        async fn is_connected(&self) -> Result<bool, DeviceError> {
            futures::future::pending().await
        }
    }

    fn fresh_deadline() -> Instant {
        Instant::now() + Duration::from_millis(SCAN_DEADLINE)
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_is_detected_for_every_check_outcome() {
        assert_eq!(check_link(&HealthyLink).await, LinkVerdict::Alive);
        assert_eq!(check_link(&SeveredLink).await, LinkVerdict::Lost);
        assert_eq!(check_link(&FailingLink).await, LinkVerdict::Lost);
        // a check that never completes counts as lost once the deadline passes
        assert_eq!(check_link(&StalledLink).await, LinkVerdict::Lost);
    }

    #[test]
    fn link_loss_leaves_a_state_without_a_characteristic_handle() {
        let state = ConnectionState::Idle { reason: IdleReason::LinkLost };
        assert_eq!(device_state_of(&state), DeviceState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_while_disconnected_are_dropped() {
        let (mut sender, mut receiver) = channel::<DeviceCommand>(8);

        sender.try_send(DeviceCommand::SendMotion { speed: 42, direction: Direction::Left })
            .expect("Failed to queue command");
        let outcome = advance_idle(IdleReason::Initial, &mut receiver).await;
        assert_eq!(outcome, IdleOutcome::Stay(IdleReason::Initial));

        sender.try_send(DeviceCommand::SendText { text: "hello".to_string() })
            .expect("Failed to queue command");
        let outcome = advance_idle(IdleReason::LinkLost, &mut receiver).await;
        assert_eq!(outcome, IdleOutcome::Stay(IdleReason::LinkLost));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_request_starts_a_scan() {
        let (mut sender, mut receiver) = channel::<DeviceCommand>(8);

        sender.try_send(DeviceCommand::Connect { device_name: "UnoR4_Bluetooth".to_string() })
            .expect("Failed to queue command");
        let outcome = advance_idle(IdleReason::Initial, &mut receiver).await;
        assert_eq!(outcome, IdleOutcome::StartScan { device_name: "UnoR4_Bluetooth".to_string() });
    }

    #[tokio::test(start_paused = true)]
    async fn idle_parks_when_the_gui_is_gone() {
        let (sender, mut receiver) = channel::<DeviceCommand>(8);
        drop(sender);

        let result = tokio::time::timeout(
            Duration::from_secs(60),
            advance_idle(IdleReason::Initial, &mut receiver),
        ).await;
        assert!(result.is_err(), "Expected advance_idle to park forever");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_scanning_restarts_with_the_new_name() {
        let (mut sender, mut receiver) = channel::<DeviceCommand>(8);

        sender.try_send(DeviceCommand::Connect { device_name: "Other_Matrix".to_string() })
            .expect("Failed to queue command");
        let state = advance_scanning(
            vec![],
            "UnoR4_Bluetooth".to_string(),
            fresh_deadline(),
            &mut receiver,
        ).await;

        match state {
            ConnectionState::Scanning { device_name, .. } => assert_eq!(device_name, "Other_Matrix"),
            other => panic!("Expected to keep scanning, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_while_scanning_are_dropped() {
        let (mut sender, mut receiver) = channel::<DeviceCommand>(8);

        sender.try_send(DeviceCommand::SendText { text: "hello".to_string() })
            .expect("Failed to queue command");
        let state = advance_scanning(
            vec![],
            "UnoR4_Bluetooth".to_string(),
            fresh_deadline(),
            &mut receiver,
        ).await;

        match state {
            ConnectionState::Scanning { device_name, .. } => assert_eq!(device_name, "UnoR4_Bluetooth"),
            other => panic!("Expected to keep scanning, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scan_deadline_makes_the_attempt_terminal() {
        let (_sender, mut receiver) = channel::<DeviceCommand>(8);

        let state = advance_scanning(
            vec![],
            "UnoR4_Bluetooth".to_string(),
            Instant::now(),
            &mut receiver,
        ).await;

        match state {
            ConnectionState::Idle { reason: IdleReason::Failed(message) } => {
                assert!(message.contains("UnoR4_Bluetooth"), "unexpected message: {}", message);
            },
            other => panic!("Expected a terminal failure, got {:?}", other),
        }
    }
}
