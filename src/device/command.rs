//! The wire format of the matrix firmware: short ASCII command strings written
//! to a single GATT characteristic.

/// Scroll direction of the matrix display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn toggled(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Direction::Left => "Left ←",
            Direction::Right => "Right →",
        };

        write!(f, "{}", result)
    }
}

/// A single command as understood by the firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scroll speed, `S:<value>`. The firmware accepts [SPEED_MIN, SPEED_MAX].
    Speed(u16),
    /// Scroll direction, `D:L` or `D:R`.
    Direction(Direction),
    /// Text to display, `T:<text>`. Uppercased on encode, the firmware font
    /// has no lowercase glyphs.
    Text(String),
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Command::Speed(value) => format!("S:{}", value),
            Command::Direction(Direction::Left) => "D:L".to_string(),
            Command::Direction(Direction::Right) => "D:R".to_string(),
            Command::Text(text) => format!("T:{}", text.to_uppercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::{SPEED_MAX, SPEED_MIN};

    #[test]
    fn encodes_speed() {
        assert_eq!(Command::Speed(50).encode(), "S:50");
        assert_eq!(Command::Speed(SPEED_MIN).encode(), "S:10");
        assert_eq!(Command::Speed(SPEED_MAX).encode(), "S:200");
    }

    #[test]
    fn encodes_direction() {
        assert_eq!(Command::Direction(Direction::Left).encode(), "D:L");
        assert_eq!(Command::Direction(Direction::Right).encode(), "D:R");
    }

    #[test]
    fn encodes_text_uppercased() {
        assert_eq!(Command::Text("hello".to_string()).encode(), "T:HELLO");
        assert_eq!(Command::Text("Hi There".to_string()).encode(), "T:HI THERE");
    }

    #[test]
    fn direction_toggle_round_trips() {
        let direction = Direction::Left;
        let toggled_twice = direction.toggled().toggled();
        assert_eq!(toggled_twice, direction);
        assert_eq!(
            Command::Direction(toggled_twice).encode(),
            Command::Direction(direction).encode(),
        );
        assert_eq!(toggled_twice.to_string(), direction.to_string());
    }
}
