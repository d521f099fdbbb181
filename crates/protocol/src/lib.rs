//! The protocol spoken by the drawing bot's microcontroller.
//!
//! Everything is ASCII. Most commands are a single line: a one-letter tag,
//! maybe followed by a number, and then a newline. The exception is the hard
//! reset, which is a bare `R` with no newline.

use core::fmt;

use deltabot_geom::ActuatorAngles;

mod ready;

pub use ready::{Handshake, READY_TOKEN};

/// The scale applied to every angle (in degrees) before it goes on the wire,
/// unless configured otherwise. This matches the workshop firmware.
pub const DEFAULT_GAIN: f64 = 3.0;

/// Which actuator an angle command is for.
///
/// The left joint is tagged `W` and the right joint is tagged `E`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    West,
    East,
}

impl Side {
    pub fn tag(self) -> char {
        match self {
            Side::West => 'W',
            Side::East => 'E',
        }
    }

    pub fn from_tag(c: char) -> Option<Side> {
        match c {
            'W' => Some(Side::West),
            'E' => Some(Side::East),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Cmd {
    /// Asks whether the bot has finished starting up. It answers with
    /// something containing [`READY_TOKEN`].
    Init,
    /// Turns one actuator to an angle, which has already been multiplied by
    /// the gain.
    Angle(Side, f64),
    /// Does nothing, but fails to write if the connection is gone.
    Probe,
    /// Restarts the microcontroller.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command tag '{0}'")]
    UnknownTag(char),
    #[error("invalid angle \"{0}\"")]
    InvalidAngle(String),
    #[error("unexpected argument \"{0}\"")]
    UnexpectedArgument(String),
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmd::Init => f.write_str("I\n"),
            Cmd::Angle(side, angle) => writeln!(f, "{}{:.2}", side.tag(), angle),
            Cmd::Probe => f.write_str("_\n"),
            Cmd::Reset => f.write_str("R"),
        }
    }
}

impl Cmd {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parses a single command. Trailing whitespace (including the newline)
    /// is ignored.
    pub fn parse(line: &str) -> Result<Cmd, ParseError> {
        let line = line.trim_end();
        let mut chars = line.chars();
        let tag = chars.next().ok_or(ParseError::Empty)?;
        let rest = chars.as_str();

        let no_argument = |cmd: Cmd| {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(ParseError::UnexpectedArgument(rest.to_owned()))
            }
        };

        match tag {
            'I' => no_argument(Cmd::Init),
            '_' => no_argument(Cmd::Probe),
            'R' => no_argument(Cmd::Reset),
            c => {
                let side = Side::from_tag(c).ok_or(ParseError::UnknownTag(c))?;
                let angle = rest
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidAngle(rest.to_owned()))?;
                Ok(Cmd::Angle(side, angle))
            }
        }
    }
}

/// Converts actuator angles into wire commands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngleEncoder {
    pub gain: f64,
}

impl Default for AngleEncoder {
    fn default() -> Self {
        AngleEncoder { gain: DEFAULT_GAIN }
    }
}

impl AngleEncoder {
    pub fn new(gain: f64) -> Self {
        AngleEncoder { gain }
    }

    /// The two commands for a pair of angles, left (`W`) first.
    pub fn encode(&self, angles: &ActuatorAngles) -> [Cmd; 2] {
        [
            Cmd::Angle(Side::West, angles.left.to_degrees() * self.gain),
            Cmd::Angle(Side::East, angles.right.to_degrees() * self.gain),
        ]
    }
}
