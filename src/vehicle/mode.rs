use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operator-selected autonomy level.
///
/// Controllers only ever produce the three named modes, but whatever string
/// arrives is kept as `Other` instead of being rejected so downstream parts
/// can decide what an unknown mode means.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Mode {
    /// Fully manual.
    #[default]
    User,
    /// Pilot steers, operator keeps the throttle.
    LocalAngle,
    /// Pilot steers and drives.
    Local,
    Other(String),
}

impl Mode {
    pub fn as_str(&self) -> &str {
        match self {
            Mode::User => "user",
            Mode::LocalAngle => "local_angle",
            Mode::Local => "local",
            Mode::Other(s) => s,
        }
    }

    /// Next mode in the controller button cycle `user -> local_angle -> local -> user`.
    pub fn next(&self) -> Mode {
        match self {
            Mode::User => Mode::LocalAngle,
            Mode::LocalAngle => Mode::Local,
            Mode::Local | Mode::Other(_) => Mode::User,
        }
    }
}

impl From<&str> for Mode {
    fn from(value: &str) -> Self {
        match value {
            "user" => Mode::User,
            "local_angle" => Mode::LocalAngle,
            "local" => Mode::Local,
            other => Mode::Other(other.to_string()),
        }
    }
}

impl From<String> for Mode {
    fn from(value: String) -> Self {
        Mode::from(value.as_str())
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}

impl FromStr for Mode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Mode::from(s))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
