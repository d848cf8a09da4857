use uuid::Uuid;

/**
 * The advertised name of the LED matrix device. Can be overridden in the
 * config file or with --device-name.
 */
pub const DEFAULT_DEVICE_NAME: &str = "UnoR4_Bluetooth";

/**
 * The UUID of the Bluetooth BLE service exposed by the matrix firmware.
 */
pub const MATRIX_SERVICE: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";

/**
 * The UUID of the writable GATT characteristic that receives command strings.
 */
pub const MATRIX_COMMAND_CHARACTERISTIC: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a8";

/**
 * How often (milliseconds) to poll for discovered peripherals / check the
 * connection status.
 */
pub const POLL_DELAY: u64 = 500;

/**
 * How long (milliseconds) a scan may run before the connection attempt is
 * reported as failed.
 */
pub const SCAN_DEADLINE: u64 = 15_000;

/**
 * How long (milliseconds) a write to the command characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) to wait after a speed/direction input before
 * dispatching, so that dragging the slider coalesces into a single dispatch.
 */
pub const MOTION_DEBOUNCE_DELAY: u64 = 150;

/**
 * The gap (milliseconds) between the speed write and the direction write of a
 * single motion dispatch. The firmware reads the two commands separately.
 */
pub const COMMAND_GAP: u64 = 100;

/**
 * The range of the speed value accepted by the firmware.
 */
pub const SPEED_MIN: u16 = 10;
pub const SPEED_MAX: u16 = 200;

pub fn make_matrix_service_uuid() -> Uuid {
    Uuid::parse_str(MATRIX_SERVICE).unwrap()
}

pub fn make_matrix_command_uuid() -> Uuid {
    Uuid::parse_str(MATRIX_COMMAND_CHARACTERISTIC).unwrap()
}
