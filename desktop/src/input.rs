//! Console commands
//!
//! One command per line on stdin. Coordinates are in device pixels of the
//! current frame; commands that need them are rejected until the first
//! frame has been decoded.

use std::str::FromStr;

use droid_shared::control::{MotionEventAction, Position, ScrollEvent, TouchEvent};
use droid_shared::{ControlMessage, FrameSize, Keycode};
use thiserror::Error;

pub const USAGE: &str = "home | back | power | key <name|code> | tap X Y | scroll X Y H V | quit";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Key(Keycode),
    Tap { x: i32, y: i32 },
    Scroll { x: i32, y: i32, h: f32, v: f32 },
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("no frame decoded yet; screen size unknown")]
    NoGeometry,

    #[error("{0}")]
    Invalid(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = tokens.split_first() else {
            return Err(CommandError::Usage(USAGE));
        };

        match (name.to_ascii_lowercase().as_str(), args) {
            ("home", []) => Ok(Command::Key(Keycode::HOME)),
            ("back", []) => Ok(Command::Key(Keycode::BACK)),
            ("power", []) => Ok(Command::Key(Keycode::POWER)),
            ("quit" | "exit", []) => Ok(Command::Quit),
            ("key", [key]) => key
                .parse()
                .map(Command::Key)
                .map_err(|e: droid_shared::Error| CommandError::Invalid(e.to_string())),
            ("key", _) => Err(CommandError::Usage("key <name|code>")),
            ("tap", [x, y]) => Ok(Command::Tap {
                x: number(x, "tap X Y")?,
                y: number(y, "tap X Y")?,
            }),
            ("tap", _) => Err(CommandError::Usage("tap X Y")),
            ("scroll", [x, y, h, v]) => Ok(Command::Scroll {
                x: number(x, "scroll X Y H V")?,
                y: number(y, "scroll X Y H V")?,
                h: number(h, "scroll X Y H V")?,
                v: number(v, "scroll X Y H V")?,
            }),
            ("scroll", _) => Err(CommandError::Usage("scroll X Y H V")),
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl Command {
    /// Control messages for this command, in send order
    ///
    /// `Quit` maps to nothing.
    pub fn messages(&self, screen: Option<FrameSize>) -> Result<Vec<ControlMessage>, CommandError> {
        match *self {
            Command::Key(keycode) => Ok(ControlMessage::key_press(keycode).to_vec()),
            Command::Tap { x, y } => {
                let position = position(x, y, screen)?;
                Ok(vec![
                    TouchEvent::new(MotionEventAction::Down, position).into(),
                    TouchEvent::new(MotionEventAction::Up, position).into(),
                ])
            }
            Command::Scroll { x, y, h, v } => {
                let position = position(x, y, screen)?;
                let scroll = ScrollEvent::new(position, h, v)
                    .map_err(|e| CommandError::Invalid(e.to_string()))?;
                Ok(vec![scroll.into()])
            }
            Command::Quit => Ok(Vec::new()),
        }
    }
}

fn number<T: FromStr>(token: &str, usage: &'static str) -> Result<T, CommandError> {
    token.parse().map_err(|_| CommandError::Usage(usage))
}

fn position(x: i32, y: i32, screen: Option<FrameSize>) -> Result<Position, CommandError> {
    let screen = screen.ok_or(CommandError::NoGeometry)?;
    let width = u16::try_from(screen.width).unwrap_or(u16::MAX);
    let height = u16::try_from(screen.height).unwrap_or(u16::MAX);
    Ok(Position::new(x, y, width, height))
}
