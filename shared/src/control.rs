//! Control protocol definitions
//!
//! Input events travel to the device as fixed-layout, big-endian records
//! written back to back on the control socket. Each record starts with a
//! one-byte message type and is self-delimiting by that type's length.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Pointer id the device maps to a generic finger
pub const POINTER_ID_GENERIC_FINGER: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// Pointer id the device maps to the mouse
pub const POINTER_ID_MOUSE: u64 = u64::MAX;

/// Pressure sent with every touch event (full pressure)
const TOUCH_PRESSURE: u16 = 0xFFFF;

/// Action button sent with every touch event (primary)
const TOUCH_ACTION_BUTTON: u32 = 0x0000_0001;

/// Buttons sent with every scroll event (primary)
const SCROLL_BUTTONS: u32 = 0x0000_0001;

/// Control message types understood by the device
///
/// Only a subset is produced by this crate; the numbering follows the
/// device side and is not contiguous with what we encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlMessageType {
    InjectKeycode = 0,
    InjectText = 1,
    InjectTouchEvent = 2,
    InjectScrollEvent = 3,
    BackOrScreenOn = 4,
    ExpandNotificationPanel = 5,
    ExpandSettingsPanel = 6,
    CollapsePanels = 7,
    GetClipboard = 8,
    SetClipboard = 9,
    SetScreenPowerMode = 10,
    RotateDevice = 11,
}

impl TryFrom<u8> for ControlMessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        use ControlMessageType::*;
        Ok(match value {
            0 => InjectKeycode,
            1 => InjectText,
            2 => InjectTouchEvent,
            3 => InjectScrollEvent,
            4 => BackOrScreenOn,
            5 => ExpandNotificationPanel,
            6 => ExpandSettingsPanel,
            7 => CollapsePanels,
            8 => GetClipboard,
            9 => SetClipboard,
            10 => SetScreenPowerMode,
            11 => RotateDevice,
            _ => {
                return Err(Error::protocol(format!(
                    "Unknown control message type: {}",
                    value
                )))
            }
        })
    }
}

/// Key event action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyEventAction {
    Down = 0,
    Up = 1,
    Multiple = 2,
}

/// Motion event action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MotionEventAction {
    Down = 0,
    Up = 1,
    Move = 2,
    Cancel = 3,
    Outside = 4,
    PointerDown = 5,
    PointerUp = 6,
    HoverMove = 7,
    Scroll = 8,
    HoverEnter = 9,
    HoverExit = 10,
    ButtonPress = 11,
    ButtonRelease = 12,
}

bitflags! {
    /// Modifier state attached to a key event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MetaState: u32 {
        const SHIFT_ON = 0x1;
        const ALT_ON = 0x2;
        const SYM_ON = 0x4;
        const FUNCTION_ON = 0x8;
        const ALT_LEFT_ON = 0x10;
        const ALT_RIGHT_ON = 0x20;
        const SHIFT_LEFT_ON = 0x40;
        const SHIFT_RIGHT_ON = 0x80;
        const CTRL_ON = 0x1000;
        const CTRL_LEFT_ON = 0x2000;
        const CTRL_RIGHT_ON = 0x4000;
        const META_ON = 0x10000;
        const META_LEFT_ON = 0x20000;
        const META_RIGHT_ON = 0x40000;
        const CAPS_LOCK_ON = 0x100000;
        const NUM_LOCK_ON = 0x200000;
        const SCROLL_LOCK_ON = 0x400000;
    }
}

bitflags! {
    /// Pointer buttons held during a motion event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MotionButtons: u32 {
        const PRIMARY = 1 << 0;
        const SECONDARY = 1 << 1;
        const TERTIARY = 1 << 2;
        const BACK = 1 << 3;
        const FORWARD = 1 << 4;
        const STYLUS_PRIMARY = 1 << 5;
        const STYLUS_SECONDARY = 1 << 6;
    }
}

/// Device key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keycode(pub i32);

impl Keycode {
    pub const UNKNOWN: Keycode = Keycode(0);
    pub const SOFT_LEFT: Keycode = Keycode(1);
    pub const SOFT_RIGHT: Keycode = Keycode(2);
    pub const HOME: Keycode = Keycode(3);
    pub const BACK: Keycode = Keycode(4);
    pub const CALL: Keycode = Keycode(5);
    pub const ENDCALL: Keycode = Keycode(6);
    pub const NUM_0: Keycode = Keycode(7);
    pub const STAR: Keycode = Keycode(17);
    pub const POUND: Keycode = Keycode(18);
    pub const DPAD_UP: Keycode = Keycode(19);
    pub const DPAD_DOWN: Keycode = Keycode(20);
    pub const DPAD_LEFT: Keycode = Keycode(21);
    pub const DPAD_RIGHT: Keycode = Keycode(22);
    pub const DPAD_CENTER: Keycode = Keycode(23);
    pub const VOLUME_UP: Keycode = Keycode(24);
    pub const VOLUME_DOWN: Keycode = Keycode(25);
    pub const POWER: Keycode = Keycode(26);
    pub const CAMERA: Keycode = Keycode(27);
    pub const A: Keycode = Keycode(29);
    pub const COMMA: Keycode = Keycode(55);
    pub const PERIOD: Keycode = Keycode(56);
    pub const TAB: Keycode = Keycode(61);
    pub const SPACE: Keycode = Keycode(62);
    pub const ENTER: Keycode = Keycode(66);
    pub const DEL: Keycode = Keycode(67);
    pub const MENU: Keycode = Keycode(82);
    pub const SEARCH: Keycode = Keycode(84);
    pub const MEDIA_PLAY_PAUSE: Keycode = Keycode(85);
    pub const PAGE_UP: Keycode = Keycode(92);
    pub const PAGE_DOWN: Keycode = Keycode(93);
    pub const ESCAPE: Keycode = Keycode(111);
    pub const FORWARD_DEL: Keycode = Keycode(112);
    pub const MOVE_HOME: Keycode = Keycode(122);
    pub const MOVE_END: Keycode = Keycode(123);
    pub const VOLUME_MUTE: Keycode = Keycode(164);
    pub const APP_SWITCH: Keycode = Keycode(187);
    pub const BRIGHTNESS_DOWN: Keycode = Keycode(220);
    pub const BRIGHTNESS_UP: Keycode = Keycode(221);
    pub const SLEEP: Keycode = Keycode(223);
    pub const WAKEUP: Keycode = Keycode(224);

    const NAMED: &'static [(&'static str, Keycode)] = &[
        ("soft_left", Self::SOFT_LEFT),
        ("soft_right", Self::SOFT_RIGHT),
        ("home", Self::HOME),
        ("back", Self::BACK),
        ("call", Self::CALL),
        ("endcall", Self::ENDCALL),
        ("star", Self::STAR),
        ("pound", Self::POUND),
        ("up", Self::DPAD_UP),
        ("down", Self::DPAD_DOWN),
        ("left", Self::DPAD_LEFT),
        ("right", Self::DPAD_RIGHT),
        ("center", Self::DPAD_CENTER),
        ("volume_up", Self::VOLUME_UP),
        ("volume_down", Self::VOLUME_DOWN),
        ("power", Self::POWER),
        ("camera", Self::CAMERA),
        ("comma", Self::COMMA),
        ("period", Self::PERIOD),
        ("tab", Self::TAB),
        ("space", Self::SPACE),
        ("enter", Self::ENTER),
        ("del", Self::DEL),
        ("menu", Self::MENU),
        ("search", Self::SEARCH),
        ("play_pause", Self::MEDIA_PLAY_PAUSE),
        ("page_up", Self::PAGE_UP),
        ("page_down", Self::PAGE_DOWN),
        ("escape", Self::ESCAPE),
        ("forward_del", Self::FORWARD_DEL),
        ("move_home", Self::MOVE_HOME),
        ("move_end", Self::MOVE_END),
        ("mute", Self::VOLUME_MUTE),
        ("app_switch", Self::APP_SWITCH),
        ("brightness_down", Self::BRIGHTNESS_DOWN),
        ("brightness_up", Self::BRIGHTNESS_UP),
        ("sleep", Self::SLEEP),
        ("wakeup", Self::WAKEUP),
    ];

    /// Look a key up by name (case-insensitive)
    ///
    /// Accepts the names in the table above, single letters `a`..`z` and
    /// single digits `0`..`9`.
    pub fn from_name(name: &str) -> Option<Keycode> {
        let lower = name.to_ascii_lowercase();
        if let Some((_, code)) = Self::NAMED.iter().find(|(n, _)| *n == lower) {
            return Some(*code);
        }

        let mut chars = lower.chars();
        match (chars.next(), chars.next()) {
            (Some(c @ 'a'..='z'), None) => Some(Keycode(Self::A.0 + (c as i32 - 'a' as i32))),
            (Some(c @ '0'..='9'), None) => {
                Some(Keycode(Self::NUM_0.0 + (c as i32 - '0' as i32)))
            }
            _ => None,
        }
    }
}

impl FromStr for Keycode {
    type Err = Error;

    /// Parse a key name or a raw numeric key code
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(code) = s.parse::<i32>() {
            return Ok(Keycode(code));
        }
        Keycode::from_name(s).ok_or_else(|| Error::range(format!("Unknown key: {}", s)))
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::NAMED.iter().find(|(_, code)| code == self) {
            Some((name, _)) => write!(f, "{}", name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A point on the device screen, together with the screen size the
/// point was computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub screen_width: u16,
    pub screen_height: u16,
}

impl Position {
    /// Encoded size in bytes
    pub const SIZE: usize = 12;

    pub fn new(x: i32, y: i32, screen_width: u16, screen_height: u16) -> Self {
        Self {
            x,
            y,
            screen_width,
            screen_height,
        }
    }

    /// Encode position to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.x);
        buf.put_i32(self.y);
        buf.put_u16(self.screen_width);
        buf.put_u16(self.screen_height);
    }
}

/// Convert a float in `[-1.0, 1.0]` to signed 16-bit fixed point
///
/// `1.0` saturates to `i16::MAX`; anything outside the range is rejected.
pub fn float_to_i16fp(value: f32) -> Result<i16> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(Error::range(format!(
            "Value must be between -1.0 and 1.0, got {}",
            value
        )));
    }

    let fixed = (f64::from(value) * 32768.0).round() as i32;
    if fixed == 0x8000 {
        return Ok(i16::MAX);
    }

    i16::try_from(fixed).map_err(|_| {
        Error::range(format!("Value {} does not fit in 16-bit fixed point", value))
    })
}

/// Inject a key code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeycodeEvent {
    pub action: KeyEventAction,
    pub keycode: Keycode,
    pub repeat: u32,
    pub metastate: MetaState,
}

impl KeycodeEvent {
    pub fn new(action: KeyEventAction, keycode: Keycode) -> Self {
        Self {
            action,
            keycode,
            repeat: 0,
            metastate: MetaState::empty(),
        }
    }
}

/// Press back, or turn the screen on when it is off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackOrScreenOnEvent {
    pub action: KeyEventAction,
}

/// Inject a touch (or mouse) event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub action: MotionEventAction,
    pub pointer_id: u64,
    pub position: Position,
    pub buttons: MotionButtons,
}

impl TouchEvent {
    pub fn new(action: MotionEventAction, position: Position) -> Self {
        Self {
            action,
            pointer_id: POINTER_ID_GENERIC_FINGER,
            position,
            buttons: MotionButtons::PRIMARY,
        }
    }
}

/// Inject a scroll event
///
/// Scroll amounts are stored already converted to fixed point, so a
/// constructed event always encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollEvent {
    position: Position,
    h_scroll: i16,
    v_scroll: i16,
}

impl ScrollEvent {
    /// Create a scroll event; both amounts must lie in `[-1.0, 1.0]`
    pub fn new(position: Position, horizontal: f32, vertical: f32) -> Result<Self> {
        Ok(Self {
            position,
            h_scroll: float_to_i16fp(horizontal)?,
            v_scroll: float_to_i16fp(vertical)?,
        })
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Horizontal amount in fixed point
    pub fn h_scroll(&self) -> i16 {
        self.h_scroll
    }

    /// Vertical amount in fixed point
    pub fn v_scroll(&self) -> i16 {
        self.v_scroll
    }
}

/// A control command queued for the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Keycode(KeycodeEvent),
    BackOrScreenOn(BackOrScreenOnEvent),
    Touch(TouchEvent),
    Scroll(ScrollEvent),
}

impl ControlMessage {
    /// Key down followed by key up for the same key
    pub fn key_press(keycode: Keycode) -> [ControlMessage; 2] {
        [
            ControlMessage::Keycode(KeycodeEvent::new(KeyEventAction::Down, keycode)),
            ControlMessage::Keycode(KeycodeEvent::new(KeyEventAction::Up, keycode)),
        ]
    }

    /// Wire message type
    pub fn message_type(&self) -> ControlMessageType {
        match self {
            ControlMessage::Keycode(_) => ControlMessageType::InjectKeycode,
            ControlMessage::BackOrScreenOn(_) => ControlMessageType::BackOrScreenOn,
            ControlMessage::Touch(_) => ControlMessageType::InjectTouchEvent,
            ControlMessage::Scroll(_) => ControlMessageType::InjectScrollEvent,
        }
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            ControlMessage::Keycode(_) => 14,
            ControlMessage::BackOrScreenOn(_) => 2,
            ControlMessage::Touch(_) => 32,
            ControlMessage::Scroll(_) => 21,
        }
    }

    /// Encode message to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.message_type() as u8);

        match self {
            ControlMessage::Keycode(msg) => {
                buf.put_u8(msg.action as u8);
                buf.put_i32(msg.keycode.0);
                buf.put_u32(msg.repeat);
                buf.put_u32(msg.metastate.bits());
            }
            ControlMessage::BackOrScreenOn(msg) => {
                buf.put_u8(msg.action as u8);
            }
            ControlMessage::Touch(msg) => {
                buf.put_u8(msg.action as u8);
                buf.put_u64(msg.pointer_id);
                msg.position.encode(buf);
                buf.put_u16(TOUCH_PRESSURE);
                buf.put_u32(TOUCH_ACTION_BUTTON);
                buf.put_u32(msg.buttons.bits());
            }
            ControlMessage::Scroll(msg) => {
                msg.position.encode(buf);
                buf.put_i16(msg.h_scroll);
                buf.put_i16(msg.v_scroll);
                buf.put_u32(SCROLL_BUTTONS);
            }
        }
    }

    /// Encode message into a fresh buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl From<KeycodeEvent> for ControlMessage {
    fn from(msg: KeycodeEvent) -> Self {
        ControlMessage::Keycode(msg)
    }
}

impl From<BackOrScreenOnEvent> for ControlMessage {
    fn from(msg: BackOrScreenOnEvent) -> Self {
        ControlMessage::BackOrScreenOn(msg)
    }
}

impl From<TouchEvent> for ControlMessage {
    fn from(msg: TouchEvent) -> Self {
        ControlMessage::Touch(msg)
    }
}

impl From<ScrollEvent> for ControlMessage {
    fn from(msg: ScrollEvent) -> Self {
        ControlMessage::Scroll(msg)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Buf;

    fn decode_position(buf: &mut Bytes) -> Position {
        Position {
            x: buf.get_i32(),
            y: buf.get_i32(),
            screen_width: buf.get_u16(),
            screen_height: buf.get_u16(),
        }
    }

    fn key_action(raw: u8) -> KeyEventAction {
        match raw {
            0 => KeyEventAction::Down,
            1 => KeyEventAction::Up,
            2 => KeyEventAction::Multiple,
            other => panic!("bad key action {}", other),
        }
    }

    fn motion_action(raw: u8) -> MotionEventAction {
        use MotionEventAction::*;
        [
            Down,
            Up,
            Move,
            Cancel,
            Outside,
            PointerDown,
            PointerUp,
            HoverMove,
            Scroll,
            HoverEnter,
            HoverExit,
            ButtonPress,
            ButtonRelease,
        ][raw as usize]
    }

    /// Inverse of `ControlMessage::encode`, as the device would parse it.
    /// Consumes exactly one message from the front of `buf`.
    pub(crate) fn decode(buf: &mut Bytes) -> ControlMessage {
        let ty = ControlMessageType::try_from(buf.get_u8()).unwrap();
        match ty {
            ControlMessageType::InjectKeycode => ControlMessage::Keycode(KeycodeEvent {
                action: key_action(buf.get_u8()),
                keycode: Keycode(buf.get_i32()),
                repeat: buf.get_u32(),
                metastate: MetaState::from_bits_retain(buf.get_u32()),
            }),
            ControlMessageType::BackOrScreenOn => {
                ControlMessage::BackOrScreenOn(BackOrScreenOnEvent {
                    action: key_action(buf.get_u8()),
                })
            }
            ControlMessageType::InjectTouchEvent => {
                let action = motion_action(buf.get_u8());
                let pointer_id = buf.get_u64();
                let position = decode_position(buf);
                assert_eq!(buf.get_u16(), 0xFFFF, "pressure");
                assert_eq!(buf.get_u32(), 1, "action button");
                let buttons = MotionButtons::from_bits_retain(buf.get_u32());
                ControlMessage::Touch(TouchEvent {
                    action,
                    pointer_id,
                    position,
                    buttons,
                })
            }
            ControlMessageType::InjectScrollEvent => {
                let position = decode_position(buf);
                let h_scroll = buf.get_i16();
                let v_scroll = buf.get_i16();
                assert_eq!(buf.get_u32(), 1, "scroll buttons");
                ControlMessage::Scroll(ScrollEvent {
                    position,
                    h_scroll,
                    v_scroll,
                })
            }
            other => panic!("not produced by this crate: {:?}", other),
        }
    }

    #[test]
    fn test_keycode_layout() {
        let msg = ControlMessage::Keycode(KeycodeEvent {
            action: KeyEventAction::Up,
            keycode: Keycode::POWER,
            repeat: 3,
            metastate: MetaState::SHIFT_ON | MetaState::CTRL_ON,
        });

        let bytes = msg.to_bytes();
        assert_eq!(
            &bytes[..],
            &[0x00, 0x01, 0, 0, 0, 26, 0, 0, 0, 3, 0, 0, 0x10, 0x01]
        );
        assert_eq!(decode(&mut bytes.clone()), msg);
    }

    #[test]
    fn test_back_or_screen_on_layout() {
        let msg = ControlMessage::BackOrScreenOn(BackOrScreenOnEvent {
            action: KeyEventAction::Down,
        });
        assert_eq!(&msg.to_bytes()[..], &[0x04, 0x00]);
    }

    #[test]
    fn test_touch_layout() {
        let mut touch = TouchEvent::new(
            MotionEventAction::Move,
            Position::new(100, -7, 1080, 1920),
        );
        touch.buttons = MotionButtons::PRIMARY | MotionButtons::SECONDARY;
        let msg = ControlMessage::Touch(touch);

        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 0x02);
        assert_eq!(&bytes[2..10], &POINTER_ID_GENERIC_FINGER.to_be_bytes());
        assert_eq!(&bytes[10..14], &100i32.to_be_bytes());
        assert_eq!(&bytes[14..18], &(-7i32).to_be_bytes());
        assert_eq!(&bytes[18..20], &1080u16.to_be_bytes());
        assert_eq!(&bytes[20..22], &1920u16.to_be_bytes());
        assert_eq!(&bytes[22..24], &[0xFF, 0xFF]);
        assert_eq!(&bytes[24..28], &[0, 0, 0, 1]);
        assert_eq!(&bytes[28..32], &[0, 0, 0, 3]);

        assert_eq!(decode(&mut bytes.clone()), msg);
    }

    #[test]
    fn test_scroll_layout() {
        let scroll = ScrollEvent::new(Position::new(5, 6, 720, 1280), 1.0, -0.5).unwrap();
        let msg = ControlMessage::Scroll(scroll);

        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[0], 0x03);
        assert_eq!(&bytes[13..15], &i16::MAX.to_be_bytes());
        assert_eq!(&bytes[15..17], &(-16384i16).to_be_bytes());
        assert_eq!(&bytes[17..21], &[0, 0, 0, 1]);

        assert_eq!(decode(&mut bytes.clone()), msg);
    }

    #[test]
    fn test_concatenated_messages_are_self_delimiting() {
        let mut buf = BytesMut::new();
        let [down, up] = ControlMessage::key_press(Keycode::HOME);
        let back = ControlMessage::BackOrScreenOn(BackOrScreenOnEvent {
            action: KeyEventAction::Down,
        });
        for msg in [down, back, up] {
            msg.encode(&mut buf);
        }

        let mut bytes = buf.freeze();
        assert_eq!(decode(&mut bytes), down);
        assert_eq!(decode(&mut bytes), back);
        assert_eq!(decode(&mut bytes), up);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_i16fp_bounds() {
        assert_eq!(float_to_i16fp(1.0).unwrap(), 32767);
        assert_eq!(float_to_i16fp(-1.0).unwrap(), -32768);
        assert_eq!(float_to_i16fp(0.0).unwrap(), 0);
        assert_eq!(float_to_i16fp(0.5).unwrap(), 16384);
        // Just below 1.0 still rounds up to the saturating value
        assert_eq!(float_to_i16fp(0.99999).unwrap(), 32767);
    }

    #[test]
    fn test_i16fp_rejects_out_of_range() {
        assert!(matches!(float_to_i16fp(2.0), Err(Error::Range(_))));
        assert!(matches!(float_to_i16fp(-1.01), Err(Error::Range(_))));
        assert!(matches!(float_to_i16fp(f32::NAN), Err(Error::Range(_))));
        assert!(ScrollEvent::new(Position::default(), 0.0, 1.5).is_err());
    }

    #[test]
    fn test_keycode_names() {
        assert_eq!(Keycode::from_name("HOME"), Some(Keycode::HOME));
        assert_eq!(Keycode::from_name("a"), Some(Keycode(29)));
        assert_eq!(Keycode::from_name("z"), Some(Keycode(54)));
        assert_eq!(Keycode::from_name("7"), Some(Keycode(14)));
        assert_eq!(Keycode::from_name("nope"), None);
        assert_eq!("26".parse::<Keycode>().unwrap(), Keycode::POWER);
        assert!("nope".parse::<Keycode>().is_err());
        assert_eq!(Keycode::APP_SWITCH.to_string(), "app_switch");
        assert_eq!(Keycode(9999).to_string(), "9999");
    }

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(
            ControlMessageType::try_from(4).unwrap(),
            ControlMessageType::BackOrScreenOn
        );
        assert!(ControlMessageType::try_from(200).is_err());
    }
}
