//! Dispatching commands to the peripheral.
//!
//! The write itself sits behind a trait so that the ordering and no-op rules
//! can be tested without bluetooth hardware.

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use log::warn;
use tokio::time::{sleep, Duration};

use crate::device::command::{Command, Direction};
use crate::device::constants::{COMMAND_GAP, WRITE_DEADLINE};
use crate::error::DeviceError;

#[allow(async_fn_in_trait)]
pub trait CommandWriter {
    async fn write_command(&mut self, command: &Command) -> Result<(), DeviceError>;
}

/// Writes commands to the command characteristic of a connected peripheral.
pub struct PeripheralWriter<'a> {
    pub peripheral: &'a Peripheral,
    pub command_char: &'a Characteristic,
}

impl CommandWriter for PeripheralWriter<'_> {
    async fn write_command(&mut self, command: &Command) -> Result<(), DeviceError> {
        let encoded = command.encode();
        self.peripheral
            .write(self.command_char, encoded.as_bytes(), WriteType::WithResponse)
            .await?;
        Ok(())
    }
}

/// A failed write is logged, not surfaced. Only the connection monitor decides
/// that the link is gone.
async fn write_logged<W: CommandWriter>(writer: &mut W, command: &Command) {
    let fut = writer.write_command(command);

    tokio::select! {
        _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
            warn!("Writing {:?} to the command characteristic took too long", command.encode());
        }
        result = fut => {
            if let Err(err) = result {
                warn!("Failed to write {:?} to the command characteristic: {:?}", command.encode(), err);
            }
        }
    };
}

/// One motion dispatch: the speed command followed by the direction command,
/// with a fixed gap in between so the firmware is not overwhelmed.
pub async fn send_motion<W: CommandWriter>(writer: &mut W, speed: u16, direction: Direction) {
    write_logged(writer, &Command::Speed(speed)).await;
    sleep(Duration::from_millis(COMMAND_GAP)).await;
    write_logged(writer, &Command::Direction(direction)).await;
}

pub async fn send_text<W: CommandWriter>(writer: &mut W, text: &str) {
    write_logged(writer, &Command::Text(text.to_string())).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingWriter {
        writes: Vec<String>,
    }

    impl CommandWriter for RecordingWriter {
        async fn write_command(&mut self, command: &Command) -> Result<(), DeviceError> {
            self.writes.push(command.encode());
            Ok(())
        }
    }

    struct FailingWriter {
        attempts: usize,
    }

    impl CommandWriter for FailingWriter {
        async fn write_command(&mut self, _command: &Command) -> Result<(), DeviceError> {
            self.attempts += 1;
            Err(DeviceError::MissingCharacteristic)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn motion_dispatch_writes_speed_then_direction() {
        let mut writer = RecordingWriter::default();
        send_motion(&mut writer, 42, Direction::Left).await;
        assert_eq!(writer.writes, vec!["S:42".to_string(), "D:L".to_string()]);

        let mut writer = RecordingWriter::default();
        send_motion(&mut writer, 200, Direction::Right).await;
        assert_eq!(writer.writes, vec!["S:200".to_string(), "D:R".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn text_dispatch_writes_exactly_once() {
        let mut writer = RecordingWriter::default();
        send_text(&mut writer, "hello").await;
        assert_eq!(writer.writes, vec!["T:HELLO".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn write_errors_do_not_abort_the_dispatch() {
        let mut writer = FailingWriter { attempts: 0 };
        send_motion(&mut writer, 42, Direction::Left).await;
        // both writes are still attempted
        assert_eq!(writer.attempts, 2);
    }
}
