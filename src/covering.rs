//! High-level covering engine and its domain types.
//!
//! Provides the [`CurtainMotor`] engine that owns one logical covering: it
//! classifies inbound datapoint frames, mirrors the device's reported state,
//! issues commands, and runs the one-time auto-calibration sequence.
//!
//! The module also exposes the pure building blocks the engine is made of —
//! the [position transform](logical_position), the
//! [advanced parameter parser](AdvancedParams), the [`MotorState`] tracker
//! and the [`DatapointEvent`] classification — so each can be exercised in
//! isolation.

pub mod motor;

pub use motor::CurtainMotor;

use crate::{DatapointType, DecodeError, Error as ProtocolError, Frame, MAX_POSITION, datapoint};
use alloc::{
    boxed::Box,
    collections::btree_map::BTreeMap,
    string::{String, ToString},
};
use core::fmt::{Display, Formatter};
use strum::FromRepr;

/// A specialized [`Result`] type for covering operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for covering operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// The auto-calibration run currently owns the motor.
    ///
    /// User requests are rejected without sending a frame or changing state
    /// until the run completes.
    CalibrationBusy,
    /// Generic datapoint protocol error.
    Protocol(ProtocolError<E>),
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CalibrationBusy => write!(f, "auto-calibration in progress"),
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<ProtocolError<E>> for Error<E> {
    fn from(err: ProtocolError<E>) -> Self {
        Self::Protocol(err)
    }
}

/// Logical direction of travel.
///
/// `Up` always runs toward logical position 100 (fully open), regardless of
/// how the motor itself is mounted.
#[derive(strum::Display, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "lowercase")]
pub enum MoveDirection {
    /// Toward fully open.
    Up,
    /// Toward fully closed.
    Down,
}

impl MoveDirection {
    /// Returns the opposite direction.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Returns the logical end-stop this direction runs toward.
    #[must_use]
    pub fn end_stop(self) -> u8 {
        match self {
            Self::Up => MAX_POSITION,
            Self::Down => 0,
        }
    }
}

/// Externally visible motion state of the covering.
#[derive(strum::Display, Default, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "lowercase")]
pub enum MotionState {
    /// Opening.
    Up,
    /// Closing.
    Down,
    /// Not moving.
    #[default]
    Idle,
}

impl MotionState {
    /// Returns the direction of travel, if any.
    #[must_use]
    pub fn direction(self) -> Option<MoveDirection> {
        match self {
            Self::Up => Some(MoveDirection::Up),
            Self::Down => Some(MoveDirection::Down),
            Self::Idle => None,
        }
    }
}

impl From<MoveDirection> for MotionState {
    fn from(direction: MoveDirection) -> Self {
        match direction {
            MoveDirection::Up => Self::Up,
            MoveDirection::Down => Self::Down,
        }
    }
}

/// Control command carried by the control datapoint.
///
/// `Open` and `Close` are device-side notions; which logical direction they
/// correspond to depends on the `reverse_direction` setting.
#[derive(FromRepr, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum ControlCommand {
    /// Full travel toward the device's open end-stop.
    Open = 0x00,
    /// Halt at the current position.
    Stop = 0x01,
    /// Full travel toward the device's closed end-stop.
    Close = 0x02,
}

impl ControlCommand {
    /// Resolves the command that moves in the given logical direction.
    #[must_use]
    pub fn for_direction(direction: MoveDirection, reversed: bool) -> Self {
        match (direction, reversed) {
            (MoveDirection::Up, false) | (MoveDirection::Down, true) => Self::Open,
            (MoveDirection::Down, false) | (MoveDirection::Up, true) => Self::Close,
        }
    }

    /// Returns the logical direction this command moves in, or `None` for a stop.
    #[must_use]
    pub fn direction(self, reversed: bool) -> Option<MoveDirection> {
        let direction = match self {
            Self::Open => MoveDirection::Up,
            Self::Close => MoveDirection::Down,
            Self::Stop => return None,
        };

        Some(if reversed { direction.opposite() } else { direction })
    }
}

/// Work state reported by the work-state datapoint.
#[derive(FromRepr, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum WorkState {
    /// Traveling toward the device's open end-stop.
    Opening = 0x00,
    /// Traveling toward the device's closed end-stop.
    Closing = 0x01,
    /// Not traveling.
    Stopped = 0x02,
}

impl WorkState {
    /// Maps the reported work state to the logical motion state.
    #[must_use]
    pub fn motion(self, reversed: bool) -> MotionState {
        let motion = match self {
            Self::Opening => MotionState::Up,
            Self::Closing => MotionState::Down,
            Self::Stopped => return MotionState::Idle,
        };

        match motion.direction() {
            Some(direction) if reversed => direction.opposite().into(),
            _ => motion,
        }
    }
}

/// Locally forced position state.
///
/// Applied by [`CurtainMotor::update_config`] without sending any frame, for
/// installations where the motor's own reporting is unreliable.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum StateOverride {
    /// Assume the covering is fully open.
    Open,
    /// Assume the covering is fully closed.
    Closed,
    /// Forget the position entirely.
    Unknown,
}

/// Immutable configuration snapshot for one covering.
///
/// Written by the platform's settings layer and handed to the engine
/// wholesale via [`CurtainMotor::new`] or [`CurtainMotor::update_config`];
/// protocol logic never queries a mutable settings store.
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct CoveringConfig {
    /// The motor is mounted mirror-inverted; open/close swap meaning.
    pub reverse_direction: bool,
    /// Cosmetic percentage inversion requested by the user.
    ///
    /// Composes with `reverse_direction` via parity: enabling both reads the
    /// same as enabling neither.
    pub fix_percent: bool,
    /// Treat the numeric position datapoint as a confirmed report.
    ///
    /// Some firmware revisions report their position only through this
    /// datapoint. The effective value is this flag OR-ed with the
    /// `dp2_as_report` advanced parameter.
    pub dp2_as_report: bool,
    /// Free-form advanced parameter string, see [`AdvancedParams`].
    pub advanced_params: String,
    /// Favorite position recalled by [`CurtainMotor::recall_preset`].
    pub preset_position: Option<u8>,
    /// Locally forced position state, see [`StateOverride`].
    pub state_override: Option<StateOverride>,
}

/// Converts a device-reported position into the logical position.
///
/// Clamps to `0..=100` and flips the value exactly when `reverse_direction`
/// and `fix_percent` disagree. The transform is self-inverse, so
/// [`device_position`] is the same mapping.
#[must_use]
pub fn logical_position(device: u8, config: &CoveringConfig) -> u8 {
    let clamped = device.min(MAX_POSITION);

    if config.reverse_direction ^ config.fix_percent {
        MAX_POSITION - clamped
    } else {
        clamped
    }
}

/// Converts a logical position into the device-side position.
///
/// Self-inverse counterpart of [`logical_position`].
#[must_use]
pub fn device_position(logical: u8, config: &CoveringConfig) -> u8 {
    logical_position(logical, config)
}

/// The value of an advanced parameter.
///
/// The type is inferred during parsing: boolean literals first, then
/// numbers, then plain text.
#[derive(PartialEq, Clone, Debug)]
pub enum ParamValue {
    /// Boolean value.
    Bool(bool),
    /// Number value.
    Number(f64),
    /// Text value of arbitrary length.
    Text(String),
}

/// Parsed advanced parameters.
///
/// Installers tune rarely-needed behavior through a single free-form
/// settings string of comma-separated `key=value` tokens, e.g.
/// `replace_setlevel_0_with_close=true, dp2_as_report=true`. Whitespace is
/// stripped and keys and values are case folded before parsing. Malformed
/// tokens are skipped; parsing never fails.
#[derive(PartialEq, Clone, Default, Debug)]
pub struct AdvancedParams {
    map: BTreeMap<String, ParamValue>,
}

impl AdvancedParams {
    /// Parses an advanced parameter string.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let folded: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let mut map = BTreeMap::new();

        for token in folded.split(',') {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };

            if key.is_empty() {
                continue;
            }

            let value = if let Ok(flag) = value.parse() {
                ParamValue::Bool(flag)
            } else if let Ok(number) = value.parse() {
                ParamValue::Number(number)
            } else {
                ParamValue::Text(value.to_string())
            };

            map.insert(key.to_string(), value);
        }

        Self { map }
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.map.get(key)
    }

    /// Returns whether a parameter is the boolean `true`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(ParamValue::Bool(true)))
    }

    /// Replace a set-position request for exactly 0 with a full close command.
    #[must_use]
    pub fn replace_close(&self) -> bool {
        self.flag("replace_setlevel_0_with_close")
    }

    /// Replace a set-position request for exactly 100 with a full open command.
    #[must_use]
    pub fn replace_open(&self) -> bool {
        self.flag("replace_setlevel_100_with_open")
    }

    /// Treat the numeric position datapoint as a confirmed report.
    #[must_use]
    pub fn dp2_as_report(&self) -> bool {
        self.flag("dp2_as_report")
    }
}

/// Key of the persisted auto-calibration flag, see [`FlagStore`].
pub const AUTO_CALIBRATED_FLAG: &str = "auto_calibrated";

/// Injected store for persisted per-device flags.
///
/// The engine reads [`AUTO_CALIBRATED_FLAG`] once at activation and writes
/// it once when the auto-calibration run completes. Persistence mechanics
/// and failure handling belong to the platform; from the engine's view the
/// store is infallible and an unreadable flag simply reads as absent.
#[async_trait::async_trait(?Send)]
pub trait FlagStore {
    /// Loads a persisted flag, `None` if it was never written.
    async fn load(&mut self, key: &str) -> Option<bool>;

    /// Persists a flag.
    async fn save(&mut self, key: &str, value: bool);
}

/// Auto-calibration progress.
///
/// Transitions run forward only: `Uncalibrated → InProgress → Calibrated`.
/// Once persisted, `Calibrated` survives restarts; there is no path back
/// short of the platform resetting the persisted flag.
#[derive(Default, PartialEq, Eq, Copy, Clone, Debug)]
pub enum Calibration {
    /// The persisted flag is absent; a calibration run is required.
    #[default]
    Uncalibrated,
    /// The engine is driving the covering to both end-stops.
    InProgress {
        /// Full-travel moves still to confirm, counting down from 2.
        moves_left: u8,
        /// Direction of the currently running move.
        direction: MoveDirection,
    },
    /// Both end-stops confirmed; normal operation.
    Calibrated,
}

/// Last-known state of one covering, mirrored from device reports.
///
/// A passive value type: the device is the source of truth, and the
/// transition methods apply whatever the caller observed without validating
/// ordering. Duplicate or out-of-order signals are idempotent.
#[derive(Default, PartialEq, Eq, Clone, Debug)]
pub struct MotorState {
    /// Last confirmed logical position; `None` after a reset.
    pub position: Option<u8>,
    /// Logical target of an in-flight move, cleared once confirmed.
    pub pending_target: Option<u8>,
    /// Most recent commanded or observed direction.
    pub last_direction: Option<MoveDirection>,
    /// Last raw direction byte echoed by the device; informational only.
    pub device_direction: Option<u8>,
    /// Externally visible motion state.
    pub motion: MotionState,
    /// Auto-calibration progress.
    pub calibration: Calibration,
}

impl MotorState {
    /// Records a confirmed logical position.
    ///
    /// Clears the pending target and settles the motion state to idle.
    pub fn confirm_position(&mut self, position: u8) {
        self.position = Some(position.min(MAX_POSITION));
        self.pending_target = None;
        self.motion = MotionState::Idle;
    }

    /// Derives direction and motion state for a move toward `target`.
    ///
    /// No-op when the current position is unknown or already at the target;
    /// the position itself stays unconfirmed until the device reports.
    pub fn begin_move(&mut self, target: u8) {
        let Some(current) = self.position else {
            return;
        };

        if target != current {
            let direction = if target > current {
                MoveDirection::Up
            } else {
                MoveDirection::Down
            };

            self.last_direction = Some(direction);
            self.motion = direction.into();
        }
    }

    /// Applies an externally signaled motion state.
    pub fn set_motion(&mut self, motion: MotionState) {
        if let Some(direction) = motion.direction() {
            self.last_direction = Some(direction);
        }

        self.motion = motion;
    }

    /// Returns whether the covering is fully closed, if the position is known.
    #[must_use]
    pub fn is_closed(&self) -> Option<bool> {
        self.position.map(|position| position == 0)
    }

    /// Returns the on/off projection of the position, if the position is known.
    ///
    /// Fully open reads as on and fully closed as off; in between, the last
    /// direction of travel decides.
    #[must_use]
    pub fn is_on(&self) -> Option<bool> {
        self.position.map(|position| match position {
            MAX_POSITION => true,
            0 => false,
            _ => self.last_direction != Some(MoveDirection::Down),
        })
    }
}

/// A classified inbound datapoint.
///
/// Produced from decoded frames by [`DatapointEvent::from_frame`] at the
/// codec/dispatcher boundary. Positions are device-side values; the engine
/// applies the [position transform](logical_position) when dispatching.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DatapointEvent {
    /// Control command echoed or initiated by the device.
    Control(ControlCommand),
    /// Numeric target or intermediate position, unconfirmed.
    Target(u8),
    /// Authoritative position report.
    Report(u8),
    /// Raw direction byte echoed by the device.
    DirectionEcho(u8),
    /// Work-state transition.
    WorkState(WorkState),
    /// The motor arrived at its previously announced target.
    Arrived,
}

impl DatapointEvent {
    /// Classifies a decoded frame.
    ///
    /// Returns `None` for datapoints, type bytes and enum values the engine
    /// does not consume; such frames are dropped without effect. Work-state
    /// and arrival datapoints carrying value payloads classify as position
    /// reports.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::ShortPayload`] if the payload is shorter than the
    ///   datapoint's encoding requires.
    pub fn from_frame(frame: &Frame<'_>) -> core::result::Result<Option<Self>, DecodeError> {
        let Some(kind) = DatapointType::from_repr(frame.datapoint_type) else {
            return Ok(None);
        };

        let event = match (frame.datapoint, kind) {
            (datapoint::CONTROL, DatapointType::Enum) => {
                match ControlCommand::from_repr(enum_byte(frame.payload)?) {
                    Some(command) => Self::Control(command),
                    None => return Ok(None),
                }
            }
            (datapoint::POSITION, DatapointType::Value) => Self::Target(frame.position()?),
            (datapoint::POSITION_REPORT | datapoint::WORK_STATE | datapoint::ARRIVAL, DatapointType::Value) => {
                Self::Report(frame.position()?)
            }
            (datapoint::DIRECTION, DatapointType::Enum) => Self::DirectionEcho(enum_byte(frame.payload)?),
            (datapoint::WORK_STATE, DatapointType::Enum) => {
                match WorkState::from_repr(enum_byte(frame.payload)?) {
                    Some(state) => Self::WorkState(state),
                    None => return Ok(None),
                }
            }
            (datapoint::ARRIVAL, DatapointType::Enum) => {
                if enum_byte(frame.payload)? != 0x00 {
                    return Ok(None);
                }

                Self::Arrived
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

fn enum_byte(payload: &[u8]) -> core::result::Result<u8, DecodeError> {
    payload.first().copied().ok_or(DecodeError::ShortPayload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(reverse_direction: bool, fix_percent: bool) -> CoveringConfig {
        CoveringConfig {
            reverse_direction,
            fix_percent,
            ..CoveringConfig::default()
        }
    }

    #[test]
    fn transform_is_self_inverse() {
        for reverse in [false, true] {
            for fix in [false, true] {
                let config = config(reverse, fix);

                for device in 0..=MAX_POSITION {
                    let logical = logical_position(device, &config);

                    assert_eq!(
                        device_position(logical, &config),
                        device,
                        "transform should be self-inverse for ({reverse}, {fix})"
                    );
                }
            }
        }
    }

    #[test]
    fn transform_parity() {
        for value in 0..=MAX_POSITION {
            assert_eq!(
                logical_position(value, &config(true, false)),
                logical_position(value, &config(false, true)),
                "single flips should be equivalent"
            );
            assert_eq!(
                logical_position(value, &config(true, true)),
                value,
                "double flip should cancel"
            );
            assert_eq!(
                logical_position(value, &config(false, false)),
                value,
                "no flip should be identity"
            );
        }
    }

    #[test]
    fn transform_reversed_end_stops() {
        let config = config(true, false);

        assert_eq!(logical_position(0, &config), 100, "device 0 should read fully open");
        assert_eq!(logical_position(100, &config), 0, "device 100 should read fully closed");
        assert_eq!(logical_position(30, &config), 70, "device 30 should read as 70");
    }

    #[test]
    fn transform_clamps() {
        assert_eq!(logical_position(255, &config(false, false)), 100);
        assert_eq!(logical_position(255, &config(true, false)), 0);
    }

    #[test]
    fn params_typing() {
        let params = AdvancedParams::parse("a=true,b=false,c=42,d=1.5,e=curtain");

        assert_eq!(params.get("a"), Some(&ParamValue::Bool(true)));
        assert_eq!(params.get("b"), Some(&ParamValue::Bool(false)));
        assert_eq!(params.get("c"), Some(&ParamValue::Number(42.0)));
        assert_eq!(params.get("d"), Some(&ParamValue::Number(1.5)));
        assert_eq!(params.get("e"), Some(&ParamValue::Text("curtain".to_string())));
    }

    #[test]
    fn params_fold_case_and_whitespace() {
        let params = AdvancedParams::parse(" Replace_SetLevel_0_With_Close = TRUE ,\tdp2_As_Report=True");

        assert!(params.replace_close(), "keys and values should be case folded");
        assert!(params.dp2_as_report(), "whitespace should be stripped");
        assert!(!params.replace_open(), "absent keys should read as false");
    }

    #[test]
    fn params_skip_malformed_tokens() {
        let params = AdvancedParams::parse("novalue,=orphan,,ok=1,final=true");

        assert_eq!(params.get("novalue"), None, "tokens without '=' should be skipped");
        assert_eq!(params.get(""), None, "empty keys should be skipped");
        assert_eq!(params.get("ok"), Some(&ParamValue::Number(1.0)));
        assert!(params.flag("final"), "later valid tokens should survive");
    }

    #[test]
    fn params_flag_requires_bool() {
        let params = AdvancedParams::parse("numeric=1,text=yes");

        assert!(!params.flag("numeric"), "numbers should not count as flags");
        assert!(!params.flag("text"), "text should not count as flags");
        assert!(!params.flag("missing"), "missing keys should not count as flags");
    }

    #[test]
    fn state_confirm_position() {
        let mut state = MotorState {
            pending_target: Some(80),
            motion: MotionState::Up,
            ..MotorState::default()
        };

        state.confirm_position(80);

        assert_eq!(state.position, Some(80), "position should be stored");
        assert_eq!(state.pending_target, None, "pending target should be cleared");
        assert_eq!(state.motion, MotionState::Idle, "motion should settle to idle");
    }

    #[test]
    fn state_confirm_position_clamps() {
        let mut state = MotorState::default();

        state.confirm_position(255);

        assert_eq!(state.position, Some(100), "position should be clamped");
    }

    #[test]
    fn state_begin_move_directions() {
        let mut state = MotorState::default();

        state.begin_move(60);
        assert_eq!(state.motion, MotionState::Idle, "unknown position should not move");

        state.confirm_position(50);
        state.begin_move(60);
        assert_eq!(state.motion, MotionState::Up, "upward move should be derived");
        assert_eq!(state.last_direction, Some(MoveDirection::Up));

        state.begin_move(10);
        assert_eq!(state.motion, MotionState::Down, "downward move should be derived");
        assert_eq!(state.last_direction, Some(MoveDirection::Down));
    }

    #[test]
    fn state_begin_move_to_current_position() {
        let mut state = MotorState::default();

        state.confirm_position(50);
        state.begin_move(50);

        assert_eq!(state.motion, MotionState::Idle, "no-op move should not change motion");
        assert_eq!(state.last_direction, None, "no-op move should not set a direction");
    }

    #[test]
    fn state_set_motion_tracks_direction() {
        let mut state = MotorState::default();

        state.set_motion(MotionState::Down);
        assert_eq!(state.last_direction, Some(MoveDirection::Down));

        state.set_motion(MotionState::Idle);
        assert_eq!(state.motion, MotionState::Idle);
        assert_eq!(
            state.last_direction,
            Some(MoveDirection::Down),
            "idle should keep the last direction"
        );
    }

    #[test]
    fn state_projections() {
        let mut state = MotorState::default();

        assert_eq!(state.is_closed(), None, "unknown position should project nothing");
        assert_eq!(state.is_on(), None, "unknown position should project nothing");

        state.confirm_position(0);
        assert_eq!(state.is_closed(), Some(true));
        assert_eq!(state.is_on(), Some(false));

        state.confirm_position(100);
        assert_eq!(state.is_closed(), Some(false));
        assert_eq!(state.is_on(), Some(true));

        state.confirm_position(50);
        assert_eq!(state.is_on(), Some(true), "mid travel without direction should read on");

        state.last_direction = Some(MoveDirection::Down);
        assert_eq!(state.is_on(), Some(false), "mid travel going down should read off");

        state.last_direction = Some(MoveDirection::Up);
        assert_eq!(state.is_on(), Some(true), "mid travel going up should read on");
    }

    fn frame(datapoint: u8, datapoint_type: u8, payload: &[u8]) -> Frame<'_> {
        Frame {
            sequence: 0,
            datapoint,
            datapoint_type,
            payload,
        }
    }

    #[test]
    fn classify_control() {
        let event = DatapointEvent::from_frame(&frame(datapoint::CONTROL, 0x04, &[0x02]));

        assert_eq!(
            event,
            Ok(Some(DatapointEvent::Control(ControlCommand::Close))),
            "control enums should classify"
        );
    }

    #[test]
    fn classify_positions() {
        let payload = [0x00, 0x00, 0x00, 0x19];

        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::POSITION, 0x02, &payload)),
            Ok(Some(DatapointEvent::Target(25)))
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::POSITION_REPORT, 0x02, &payload)),
            Ok(Some(DatapointEvent::Report(25)))
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::WORK_STATE, 0x02, &payload)),
            Ok(Some(DatapointEvent::Report(25))),
            "value-typed work state should be a report"
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::ARRIVAL, 0x02, &payload)),
            Ok(Some(DatapointEvent::Report(25))),
            "value-typed arrival should be a report"
        );
    }

    #[test]
    fn classify_direction_and_work_state() {
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::DIRECTION, 0x04, &[0x01])),
            Ok(Some(DatapointEvent::DirectionEcho(0x01)))
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::WORK_STATE, 0x04, &[0x01])),
            Ok(Some(DatapointEvent::WorkState(WorkState::Closing)))
        );
    }

    #[test]
    fn classify_arrival() {
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::ARRIVAL, 0x04, &[0x00])),
            Ok(Some(DatapointEvent::Arrived))
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::ARRIVAL, 0x04, &[0x01])),
            Ok(None),
            "non-zero arrival enums should be dropped"
        );
    }

    #[test]
    fn classify_drops_unknown() {
        assert_eq!(
            DatapointEvent::from_frame(&frame(0x2a, 0x02, &[0x00, 0x00, 0x00, 0x00])),
            Ok(None),
            "unknown datapoints should be dropped"
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::CONTROL, 0x01, &[0x00])),
            Ok(None),
            "unknown type bytes should be dropped"
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::CONTROL, 0x04, &[0x7f])),
            Ok(None),
            "unknown control bytes should be dropped"
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::POSITION, 0x04, &[0x00])),
            Ok(None),
            "enum-typed position datapoints should be dropped"
        );
    }

    #[test]
    fn classify_short_payloads() {
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::POSITION_REPORT, 0x02, &[0x00, 0x32])),
            Err(DecodeError::ShortPayload)
        );
        assert_eq!(
            DatapointEvent::from_frame(&frame(datapoint::CONTROL, 0x04, &[])),
            Err(DecodeError::ShortPayload)
        );
    }

    #[test]
    fn command_resolution() {
        assert_eq!(
            ControlCommand::for_direction(MoveDirection::Up, false),
            ControlCommand::Open
        );
        assert_eq!(
            ControlCommand::for_direction(MoveDirection::Up, true),
            ControlCommand::Close
        );
        assert_eq!(
            ControlCommand::for_direction(MoveDirection::Down, false),
            ControlCommand::Close
        );
        assert_eq!(
            ControlCommand::for_direction(MoveDirection::Down, true),
            ControlCommand::Open
        );
    }

    #[test]
    fn command_direction_round_trip() {
        for reversed in [false, true] {
            for direction in [MoveDirection::Up, MoveDirection::Down] {
                let command = ControlCommand::for_direction(direction, reversed);

                assert_eq!(
                    command.direction(reversed),
                    Some(direction),
                    "command resolution should round-trip for reversed={reversed}"
                );
            }
        }

        assert_eq!(ControlCommand::Stop.direction(false), None);
        assert_eq!(ControlCommand::Stop.direction(true), None);
    }

    #[test]
    fn work_state_motion() {
        assert_eq!(WorkState::Opening.motion(false), MotionState::Up);
        assert_eq!(WorkState::Opening.motion(true), MotionState::Down);
        assert_eq!(WorkState::Closing.motion(false), MotionState::Down);
        assert_eq!(WorkState::Closing.motion(true), MotionState::Up);
        assert_eq!(WorkState::Stopped.motion(false), MotionState::Idle);
        assert_eq!(WorkState::Stopped.motion(true), MotionState::Idle);
    }
}
