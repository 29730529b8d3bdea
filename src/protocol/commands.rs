//! DragonBot wire protocol.
//!
//! Every command is a short ASCII token wrapped in square brackets and sent
//! as raw bytes over the communication characteristic. There is no
//! terminator and the device never acknowledges a command.
//!
//! Slider values coming from the user interface live in `0..=255` (the
//! delay slider lives in `0..=2000` ms). They are clamped and linearly
//! rescaled to the fixed-width decimal fields the firmware expects.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// DragonBot UART service UUID (0xFFE0)
pub const DRAGONBOT_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe0_0000_1000_8000_0080_5f9b_34fb);

/// Bidirectional command/telemetry characteristic UUID (0xFFE1)
pub const DRAGONBOT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe1_0000_1000_8000_0080_5f9b_34fb);

/// Upper bound of every slider axis.
pub const SLIDER_MAX: f64 = 255.0;

/// Upper bound of the delay slider in milliseconds.
pub const DELAY_MAX_MS: f64 = 2000.0;

/// Largest finite loop count the device accepts.
pub const MAX_LOOP_COUNT: u8 = 99;

/// Fixed infix of the swap-channel command.
const SWAP_INFIX: &str = "992727";

/// Fixed suffix of the swap-channel command.
const SWAP_SUFFIX: &str = "0000";

/// Clamp `value` into `[0, domain]` and rescale it linearly onto `[0, range]`,
/// rounding to the nearest integer.
fn scale(value: f64, domain: f64, range: f64) -> i32 {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, domain)
    };
    (clamped * range / domain).round() as i32
}

/// Map a `0..=255` slider onto the two-digit `0..=99` field.
pub fn scale99(value: f64) -> u8 {
    scale(value, SLIDER_MAX, 99.0) as u8
}

/// Map a `0..=255` slider onto the carriage field `0..=20`.
pub fn scale20(value: f64) -> u8 {
    scale(value, SLIDER_MAX, 20.0) as u8
}

/// Map a `0..=255` slider onto the signed rotation field `-3000..=3000`.
pub fn scale_rotation(value: f64) -> i16 {
    (scale(value, SLIDER_MAX, 6000.0) - 3000) as i16
}

/// Map a `0..=2000` ms delay onto the two-digit cadence field.
pub fn scale_delay(delay_ms: f64) -> u8 {
    scale(delay_ms, DELAY_MAX_MS, 99.0) as u8
}

/// Clamp a slider value into a raw `0..=255` byte.
pub fn clamp_slider(value: f64) -> u8 {
    scale(value, SLIDER_MAX, SLIDER_MAX) as u8
}

/// Errors produced when parsing wire text back into a [`Command`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Text is not wrapped in square brackets
    #[error("Command is not bracketed: {0:?}")]
    Unbracketed(String),

    /// Token is not part of the protocol
    #[error("Unknown command: {0:?}")]
    Unknown(String),

    /// Token is known but a field is malformed
    #[error("Malformed {token} field: {field:?}")]
    MalformedField { token: &'static str, field: String },

    /// Field parsed but lies outside the range the firmware accepts
    #[error("{token} field out of range: {value}")]
    OutOfRange { token: &'static str, value: i32 },
}

/// Manual slider axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Upper launch servo (`A`)
    ServoUp,
    /// Lower launch servo (`B`)
    ServoDown,
    /// Vertical aim (`C`)
    UpDown,
    /// Horizontal aim (`D`)
    LeftRight,
    /// Ball feeder (`E`)
    Feeder,
}

impl Axis {
    /// All axes in wire-letter order.
    pub const ALL: [Axis; 5] = [
        Axis::ServoUp,
        Axis::ServoDown,
        Axis::UpDown,
        Axis::LeftRight,
        Axis::Feeder,
    ];

    fn letter(self) -> char {
        match self {
            Axis::ServoUp => 'A',
            Axis::ServoDown => 'B',
            Axis::UpDown => 'C',
            Axis::LeftRight => 'D',
            Axis::Feeder => 'E',
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|axis| axis.letter() == letter)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::ServoUp => write!(f, "Servo Up"),
            Axis::ServoDown => write!(f, "Servo Down"),
            Axis::UpDown => write!(f, "Up/Down"),
            Axis::LeftRight => write!(f, "Left/Right"),
            Axis::Feeder => write!(f, "Feeder"),
        }
    }
}

/// Raw slider values for one launch, before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShotParams {
    /// Horizontal target (0-255)
    pub target_x: f64,
    /// Vertical target (0-255)
    pub target_y: f64,
    /// First wheel speed (0-255)
    pub speed_1: f64,
    /// Second wheel speed (0-255)
    pub speed_2: f64,
    /// Delay between balls in milliseconds (0-2000)
    pub delay_ms: f64,
    /// Carriage X position (0-255)
    pub carriage_x: f64,
    /// Carriage Y position (0-255)
    pub carriage_y: f64,
    /// Rotation (0-255, centred at 127.5)
    pub rotation: f64,
}

/// Scaled fields of a single-shot `[SH..]` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShotCommand {
    pub target_x: u8,
    pub target_y: u8,
    pub wheel_1: u8,
    pub wheel_2: u8,
    pub feed: u8,
    pub carriage_x: u8,
    pub carriage_y: u8,
    pub rotation: i16,
}

impl ShotCommand {
    /// Scale raw slider values into wire fields.
    pub fn encode(params: &ShotParams) -> Self {
        Self {
            target_x: scale99(params.target_x),
            target_y: scale99(params.target_y),
            wheel_1: scale99(params.speed_1),
            wheel_2: scale99(params.speed_2),
            feed: scale_delay(params.delay_ms),
            carriage_x: scale20(params.carriage_x),
            carriage_y: scale20(params.carriage_y),
            rotation: scale_rotation(params.rotation),
        }
    }
}

impl fmt::Display for ShotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[SH{:02},{:02},{:02},{:02},{:02},{:02},{:02},{}]",
            self.target_x,
            self.target_y,
            self.wheel_1,
            self.wheel_2,
            self.feed,
            self.carriage_x,
            self.carriage_y,
            self.rotation
        )
    }
}

/// A command understood by the DragonBot firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Single shot (`[SH..]`)
    Shot(ShotCommand),
    /// Finite loop count directive (`[N##]`)
    LoopCount(u8),
    /// Infinite loop directive (`[I]`)
    InfiniteLoop,
    /// Start directive (`[GO]`)
    Go,
    /// Stop directive (`[STOP]`)
    Stop,
    /// Delete the current shot on the device (`[X]`)
    DeleteShot,
    /// Zero/reset all axes (`[Z]`)
    ZeroAxes,
    /// Enter drill mode (`[MD]`)
    DrillMode,
    /// Manual mode with parameter (`[L###]`)
    ManualMode(u16),
    /// AI/auto mode with parameter (`[F###]`)
    AutoMode(u16),
    /// Single-axis slider (`[A###]`..`[E###]`)
    Axis(Axis, u8),
    /// Shut the device down (`[O000]`)
    Shutdown,
    /// Remote mode (`[R000]`)
    RemoteMode,
    /// Activate swap mode (`[WA]`)
    SwapActivate,
    /// Execute the configured swap sequence (`[PL]`)
    SwapExecute,
    /// Swap channel speed and delay (`[Y###992727##0000]`)
    Swap { speed: u8, delay: u8 },
}

impl Command {
    /// Finite loop directive, clamped to `1..=99`.
    pub fn loop_count(count: u32) -> Self {
        Command::LoopCount(count.clamp(1, MAX_LOOP_COUNT as u32) as u8)
    }

    /// Slider directive for one axis.
    pub fn axis(axis: Axis, value: f64) -> Self {
        Command::Axis(axis, clamp_slider(value))
    }

    /// Swap-channel directive from raw slider values.
    pub fn swap(speed: f64, delay: f64) -> Self {
        Command::Swap {
            speed: clamp_slider(speed),
            delay: scale99(delay),
        }
    }

    /// Bytes written to the characteristic.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Shot(shot) => shot.fmt(f),
            Command::LoopCount(n) => write!(f, "[N{:02}]", n.min(&MAX_LOOP_COUNT)),
            Command::InfiniteLoop => write!(f, "[I]"),
            Command::Go => write!(f, "[GO]"),
            Command::Stop => write!(f, "[STOP]"),
            Command::DeleteShot => write!(f, "[X]"),
            Command::ZeroAxes => write!(f, "[Z]"),
            Command::DrillMode => write!(f, "[MD]"),
            Command::ManualMode(p) => write!(f, "[L{:03}]", p.min(&999)),
            Command::AutoMode(p) => write!(f, "[F{:03}]", p.min(&999)),
            Command::Axis(axis, value) => write!(f, "[{}{:03}]", axis.letter(), value),
            Command::Shutdown => write!(f, "[O000]"),
            Command::RemoteMode => write!(f, "[R000]"),
            Command::SwapActivate => write!(f, "[WA]"),
            Command::SwapExecute => write!(f, "[PL]"),
            Command::Swap { speed, delay } => write!(
                f,
                "[Y{:03}{}{:02}{}]",
                speed,
                SWAP_INFIX,
                delay.min(&99),
                SWAP_SUFFIX
            ),
        }
    }
}

/// Parse a fixed-width unsigned decimal field.
fn parse_fixed(token: &'static str, field: &str, width: usize) -> Result<u16, ProtocolError> {
    if field.len() != width || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::MalformedField {
            token,
            field: field.to_string(),
        });
    }
    field.parse().map_err(|_| ProtocolError::MalformedField {
        token,
        field: field.to_string(),
    })
}

fn check_max(token: &'static str, value: u16, max: u16) -> Result<u8, ProtocolError> {
    if value > max {
        return Err(ProtocolError::OutOfRange {
            token,
            value: value as i32,
        });
    }
    Ok(value as u8)
}

fn parse_shot(body: &str) -> Result<ShotCommand, ProtocolError> {
    const TOKEN: &str = "SH";
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != 8 {
        return Err(ProtocolError::MalformedField {
            token: TOKEN,
            field: body.to_string(),
        });
    }

    let two_digit = |field: &str, max: u16| -> Result<u8, ProtocolError> {
        check_max(TOKEN, parse_fixed(TOKEN, field, 2)?, max)
    };

    let rotation: i16 = fields[7]
        .parse()
        .map_err(|_| ProtocolError::MalformedField {
            token: TOKEN,
            field: fields[7].to_string(),
        })?;
    if !(-3000..=3000).contains(&rotation) {
        return Err(ProtocolError::OutOfRange {
            token: TOKEN,
            value: rotation as i32,
        });
    }

    Ok(ShotCommand {
        target_x: two_digit(fields[0], 99)?,
        target_y: two_digit(fields[1], 99)?,
        wheel_1: two_digit(fields[2], 99)?,
        wheel_2: two_digit(fields[3], 99)?,
        feed: two_digit(fields[4], 99)?,
        carriage_x: two_digit(fields[5], 20)?,
        carriage_y: two_digit(fields[6], 20)?,
        rotation,
    })
}

fn parse_swap(body: &str) -> Result<Command, ProtocolError> {
    const TOKEN: &str = "Y";
    let malformed = || ProtocolError::MalformedField {
        token: TOKEN,
        field: body.to_string(),
    };

    // speed(3) + infix(6) + delay(2) + suffix(4)
    if body.len() != 15 || !body.is_ascii() {
        return Err(malformed());
    }
    if &body[3..9] != SWAP_INFIX || &body[11..] != SWAP_SUFFIX {
        return Err(malformed());
    }

    let speed = check_max(TOKEN, parse_fixed(TOKEN, &body[..3], 3)?, 255)?;
    let delay = check_max(TOKEN, parse_fixed(TOKEN, &body[9..11], 2)?, 99)?;
    Ok(Command::Swap { speed, delay })
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let inner = text
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| ProtocolError::Unbracketed(text.to_string()))?;

        match inner {
            "I" => return Ok(Command::InfiniteLoop),
            "GO" => return Ok(Command::Go),
            "STOP" => return Ok(Command::Stop),
            "X" => return Ok(Command::DeleteShot),
            "Z" => return Ok(Command::ZeroAxes),
            "MD" => return Ok(Command::DrillMode),
            "O000" => return Ok(Command::Shutdown),
            "R000" => return Ok(Command::RemoteMode),
            "WA" => return Ok(Command::SwapActivate),
            "PL" => return Ok(Command::SwapExecute),
            _ => {}
        }

        if let Some(body) = inner.strip_prefix("SH") {
            return parse_shot(body).map(Command::Shot);
        }

        let mut chars = inner.chars();
        let head = chars.next();
        let body = chars.as_str();

        match head {
            Some('N') => {
                let n = parse_fixed("N", body, 2)?;
                if n == 0 {
                    return Err(ProtocolError::OutOfRange { token: "N", value: 0 });
                }
                Ok(Command::LoopCount(n as u8))
            }
            Some('L') => Ok(Command::ManualMode(parse_fixed("L", body, 3)?)),
            Some('F') => Ok(Command::AutoMode(parse_fixed("F", body, 3)?)),
            Some('Y') => parse_swap(body),
            Some(letter) => match Axis::from_letter(letter) {
                Some(axis) => {
                    let value = check_max("axis", parse_fixed("axis", body, 3)?, 255)?;
                    Ok(Command::Axis(axis, value))
                }
                None => Err(ProtocolError::Unknown(text.to_string())),
            },
            None => Err(ProtocolError::Unknown(text.to_string())),
        }
    }
}

/// One half of a swap configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwapChannel {
    /// Launch speed slider (0-255), sent unscaled
    pub speed: f64,
    /// Delay slider (0-255), sent as a two-digit field
    pub delay: f64,
}

/// Paired alternating-launch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwapConfig {
    pub first: SwapChannel,
    pub second: SwapChannel,
}

impl SwapConfig {
    /// Commands that arm and fire the swap sequence, in transmission order.
    pub fn commands(&self) -> Vec<Command> {
        vec![
            Command::SwapActivate,
            Command::swap(self.first.speed, self.first.delay),
            Command::swap(self.second.speed, self.second.delay),
            Command::SwapExecute,
        ]
    }
}
