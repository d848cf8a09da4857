use serde::{Deserialize, Serialize};

use crate::device::constants::DEFAULT_DEVICE_NAME;

/// Settings that survive a restart. The control values themselves (speed,
/// direction, text) are session-scoped and deliberately not part of this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// The advertised name of the device to connect to.
    pub device_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_the_uno_r4() {
        assert_eq!(Config::default().device_name, "UnoR4_Bluetooth");
    }

    #[test]
    fn parses_camel_case_fields() {
        let config: Config = serde_json::from_str(r#"{"deviceName":"MyMatrix"}"#)
            .expect("Failed to parse config");
        assert_eq!(config.device_name, "MyMatrix");
    }
}
