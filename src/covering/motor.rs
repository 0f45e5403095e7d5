//! The covering engine.
//!
//! [`CurtainMotor`] owns exactly one logical covering: its command channel,
//! its configuration snapshot, its persisted calibration flag and its
//! mirrored [`MotorState`]. Inbound frames and user commands are sequential,
//! non-reentrant operations against that state; a host delivering both
//! concurrently must serialize them behind a single mutex or actor per
//! covering.
//!
//! All sends are fire-and-forget. Confirmation arrives, if at all, as a
//! later inbound frame, which is why the engine remembers a pending target
//! instead of waiting on any acknowledgment.

use super::{
    AUTO_CALIBRATED_FLAG, AdvancedParams, Calibration, ControlCommand, CoveringConfig,
    DatapointEvent, Error, FlagStore, MotionState, MotorState, MoveDirection, Result,
    StateOverride, device_position, logical_position,
};
use crate::{Channel, DatapointType, Frame, MAX_POSITION, datapoint, encode_position};
use embedded_io_async::Write;
use log::{debug, info};

const CALIBRATE_COMMAND: u8 = 0x00;
const DIRECTION_FORWARD: u8 = 0x00;
const DIRECTION_REVERSE: u8 = 0x01;

/// Datapoint protocol engine for one motorized covering.
///
/// Construct with [`CurtainMotor::new`], then call
/// [`activate`](CurtainMotor::activate) once the platform's command channel
/// is ready. Feed every inbound mesh payload to
/// [`handle_frame`](CurtainMotor::handle_frame); the engine classifies,
/// transforms and mirrors it into the [`MotorState`] exposed by
/// [`state`](CurtainMotor::state).
///
/// On first activation the engine autonomously drives the covering to both
/// physical end-stops before user commands are accepted; see
/// [`Calibration`].
///
/// # Examples
///
/// ```no_run
/// # use std::collections::VecDeque;
/// # use tuyacover::covering::{CoveringConfig, CurtainMotor, FlagStore};
/// # struct Store;
/// # #[async_trait::async_trait(?Send)]
/// # impl FlagStore for Store {
/// #     async fn load(&mut self, _key: &str) -> Option<bool> { Some(true) }
/// #     async fn save(&mut self, _key: &str, _value: bool) {}
/// # }
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tuyacover::covering::Result<(), core::convert::Infallible> {
/// # let port: VecDeque<u8> = VecDeque::new();
/// let mut motor = CurtainMotor::new(port, Store, CoveringConfig::default());
///
/// motor.activate().await?;
/// motor.set_position(75).await?;
/// motor.toggle().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CurtainMotor<P, S> {
    channel: Channel<P>,
    store: S,
    config: CoveringConfig,
    params: AdvancedParams,
    state: MotorState,
}

impl<P: Write, S: FlagStore> CurtainMotor<P, S> {
    /// Constructs a new engine over the given command port and flag store.
    ///
    /// The advanced parameter string in `config` is parsed immediately.
    pub fn new(port: P, store: S, config: CoveringConfig) -> Self {
        let params = AdvancedParams::parse(&config.advanced_params);

        Self {
            channel: Channel::new(port),
            store,
            config,
            params,
            state: MotorState::default(),
        }
    }

    /// Activates the engine.
    ///
    /// Reads the persisted calibration flag. If it is absent, the
    /// auto-calibration run starts: the covering is driven to both end-stops
    /// (up first) and user commands are rejected until both arrivals are
    /// confirmed. A configured state override is applied afterwards.
    pub async fn activate(&mut self) -> Result<(), P::Error> {
        if self.store.load(AUTO_CALIBRATED_FLAG).await == Some(true) {
            self.state.calibration = Calibration::Calibrated;

            debug!("Calibration flag present, resuming normal operation");
        } else {
            let direction = MoveDirection::Up;

            self.state.calibration = Calibration::InProgress {
                moves_left: 2,
                direction,
            };

            info!("Starting auto-calibration run");

            self.issue_move(direction).await?;
        }

        if let Some(state_override) = self.config.state_override {
            self.apply_override(state_override);
        }

        Ok(())
    }

    /// Returns the mirrored covering state.
    #[must_use]
    pub fn state(&self) -> &MotorState {
        &self.state
    }

    /// Returns the active configuration snapshot.
    #[must_use]
    pub fn config(&self) -> &CoveringConfig {
        &self.config
    }

    /// Returns the parsed advanced parameters.
    #[must_use]
    pub fn params(&self) -> &AdvancedParams {
        &self.params
    }

    /// Returns a mutable reference to the underlying command channel.
    pub fn channel(&mut self) -> &mut Channel<P> {
        &mut self.channel
    }

    /// Replaces the configuration snapshot.
    ///
    /// Re-derives the advanced parameters. When the mounting direction
    /// changed, the new direction is sent to the motor and a known local
    /// position is mirrored, since its logical sense flipped with the
    /// setting. When the state override changed to a value, it is applied.
    pub async fn update_config(&mut self, config: CoveringConfig) -> Result<(), P::Error> {
        let previous = core::mem::replace(&mut self.config, config);

        self.params = AdvancedParams::parse(&self.config.advanced_params);

        if previous.reverse_direction != self.config.reverse_direction {
            self.set_direction(self.config.reverse_direction).await?;

            if let Some(position) = self.state.position {
                self.state.confirm_position(MAX_POSITION - position);
            }
        }

        if previous.state_override != self.config.state_override {
            if let Some(state_override) = self.config.state_override {
                self.apply_override(state_override);
            }
        }

        Ok(())
    }

    /// Handles one inbound mesh payload.
    ///
    /// Frames that fail to decode or classify are logged and dropped; the
    /// report channel is expected to deliver partial or unrelated frames,
    /// and the device re-reports on its own. Only transport errors from
    /// calibration follow-up moves propagate.
    pub async fn handle_frame(&mut self, data: &[u8]) -> Result<(), P::Error> {
        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("Dropping undecodable frame: {err}");

                return Ok(());
            }
        };

        let event = match DatapointEvent::from_frame(&frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(
                    "Ignoring datapoint {:#04x} (type {:#04x})",
                    frame.datapoint, frame.datapoint_type
                );

                return Ok(());
            }
            Err(err) => {
                debug!("Dropping malformed datapoint {:#04x}: {err}", frame.datapoint);

                return Ok(());
            }
        };

        self.dispatch(event).await
    }

    /// Moves to an absolute logical position.
    ///
    /// Exact end-stop requests are replaced by full-travel commands when the
    /// corresponding advanced parameter asks for it; some firmware revisions
    /// only reach their limit switches through a full open/close command.
    ///
    /// # Errors
    ///
    /// - [`Error::CalibrationBusy`] while the auto-calibration run owns the motor.
    pub async fn set_position(&mut self, target: u8) -> Result<(), P::Error> {
        self.ensure_available()?;

        let target = target.min(MAX_POSITION);

        if target == 0 && self.params.replace_close() {
            return self.issue_move(MoveDirection::Down).await;
        }

        if target == MAX_POSITION && self.params.replace_open() {
            return self.issue_move(MoveDirection::Up).await;
        }

        let device = device_position(target, &self.config);

        self.channel
            .send(datapoint::POSITION, DatapointType::Value, &encode_position(device))
            .await?;
        self.state.pending_target = Some(target);
        self.state.begin_move(target);

        Ok(())
    }

    /// Runs the covering fully open.
    ///
    /// # Errors
    ///
    /// - [`Error::CalibrationBusy`] while the auto-calibration run owns the motor.
    pub async fn open(&mut self) -> Result<(), P::Error> {
        self.ensure_available()?;
        self.issue_move(MoveDirection::Up).await
    }

    /// Runs the covering fully closed.
    ///
    /// # Errors
    ///
    /// - [`Error::CalibrationBusy`] while the auto-calibration run owns the motor.
    pub async fn close(&mut self) -> Result<(), P::Error> {
        self.ensure_available()?;
        self.issue_move(MoveDirection::Down).await
    }

    /// Halts the covering.
    ///
    /// The motion state settles once the device echoes the command.
    ///
    /// # Errors
    ///
    /// - [`Error::CalibrationBusy`] while the auto-calibration run owns the motor.
    pub async fn stop(&mut self) -> Result<(), P::Error> {
        self.ensure_available()?;
        self.channel
            .send(datapoint::CONTROL, DatapointType::Enum, &[ControlCommand::Stop as u8])
            .await?;

        Ok(())
    }

    /// Fully closes or opens the covering.
    ///
    /// # Errors
    ///
    /// - [`Error::CalibrationBusy`] while the auto-calibration run owns the motor.
    pub async fn set_closed(&mut self, closed: bool) -> Result<(), P::Error> {
        if closed {
            self.close().await
        } else {
            self.open().await
        }
    }

    /// Runs the covering in the direction a repeated button press expects.
    ///
    /// From an end-stop (or an unknown position) the covering moves away
    /// from it; mid-travel it moves opposite to the last direction.
    ///
    /// # Errors
    ///
    /// - [`Error::CalibrationBusy`] while the auto-calibration run owns the motor.
    pub async fn toggle(&mut self) -> Result<(), P::Error> {
        self.ensure_available()?;

        let direction = match self.state.position {
            None | Some(0) => MoveDirection::Up,
            Some(position) if position >= MAX_POSITION => MoveDirection::Down,
            _ => match self.state.last_direction {
                Some(direction) => direction.opposite(),
                None => MoveDirection::Up,
            },
        };

        self.issue_move(direction).await
    }

    /// Moves to the configured preset position.
    ///
    /// A no-op when no preset is configured.
    ///
    /// # Errors
    ///
    /// - [`Error::CalibrationBusy`] while the auto-calibration run owns the motor.
    pub async fn recall_preset(&mut self) -> Result<(), P::Error> {
        let Some(preset) = self.config.preset_position else {
            debug!("No preset position configured, ignoring");

            return Ok(());
        };

        self.set_position(preset).await
    }

    /// Triggers the motor's own end-stop calibration routine.
    ///
    /// Single-shot configuration frame, fire-and-forget.
    pub async fn calibrate(&mut self) -> Result<(), P::Error> {
        self.channel
            .send(datapoint::CALIBRATION, DatapointType::Enum, &[CALIBRATE_COMMAND])
            .await?;

        Ok(())
    }

    /// Configures the motor's direction sense.
    ///
    /// Single-shot configuration frame, fire-and-forget.
    pub async fn set_direction(&mut self, reverse: bool) -> Result<(), P::Error> {
        let mode = if reverse { DIRECTION_REVERSE } else { DIRECTION_FORWARD };

        self.channel
            .send(datapoint::DIRECTION, DatapointType::Enum, &[mode])
            .await?;

        Ok(())
    }

    /// Sends the periodic report-channel query.
    ///
    /// Scheduling is the caller's concern; with the `keep-alive` feature the
    /// [`keepalive`](crate::keepalive) module provides a scoped task for it.
    pub async fn send_keep_alive(&mut self) -> Result<(), P::Error> {
        self.channel.send_query().await?;

        Ok(())
    }

    async fn dispatch(&mut self, event: DatapointEvent) -> Result<(), P::Error> {
        match event {
            DatapointEvent::Control(command) => self.handle_control(command),
            DatapointEvent::Target(device) => {
                if self.dp2_as_report() {
                    self.confirm_report(device).await?;
                } else {
                    let target = logical_position(device, &self.config);

                    self.state.pending_target = Some(target);
                    self.state.begin_move(target);
                }
            }
            DatapointEvent::Report(device) => self.confirm_report(device).await?,
            DatapointEvent::DirectionEcho(raw) => self.state.device_direction = Some(raw),
            DatapointEvent::WorkState(work_state) => {
                let motion = work_state.motion(self.config.reverse_direction);

                self.state.set_motion(motion);
            }
            DatapointEvent::Arrived => {
                if let Some(target) = self.state.pending_target {
                    self.state.confirm_position(target);
                    self.advance_calibration(target).await?;
                } else {
                    debug!("Arrival without a pending target, ignoring");
                }
            }
        }

        Ok(())
    }

    fn handle_control(&mut self, command: ControlCommand) {
        match command.direction(self.config.reverse_direction) {
            Some(direction) => {
                self.state.pending_target = Some(direction.end_stop());
                self.state.set_motion(direction.into());
            }
            None => {
                if self.calibrating() {
                    debug!("Suppressing device stop during auto-calibration");
                } else {
                    self.state.set_motion(MotionState::Idle);
                }
            }
        }
    }

    /// Confirms a device-reported position and feeds the calibration sequencer.
    async fn confirm_report(&mut self, device: u8) -> Result<(), P::Error> {
        let logical = logical_position(device, &self.config);

        self.state.confirm_position(logical);
        self.advance_calibration(logical).await
    }

    /// Advances the auto-calibration run on a confirmed logical position.
    ///
    /// Positions strictly between the end-stops leave the sequence untouched.
    async fn advance_calibration(&mut self, position: u8) -> Result<(), P::Error> {
        let Calibration::InProgress { moves_left, direction } = self.state.calibration else {
            return Ok(());
        };

        if position != 0 && position != MAX_POSITION {
            return Ok(());
        }

        let moves_left = moves_left.saturating_sub(1);

        if moves_left == 0 {
            self.state.calibration = Calibration::Calibrated;
            self.store.save(AUTO_CALIBRATED_FLAG, true).await;

            info!("Auto-calibration complete");
        } else {
            let direction = direction.opposite();

            self.state.calibration = Calibration::InProgress { moves_left, direction };

            info!("Auto-calibration end-stop reached, reversing {direction}");

            self.issue_move(direction).await?;
        }

        Ok(())
    }

    /// Sends a full-travel control command.
    ///
    /// Internal path: the auto-calibration sequencer uses it directly,
    /// bypassing the busy gate applied to user commands.
    async fn issue_move(&mut self, direction: MoveDirection) -> Result<(), P::Error> {
        let command = ControlCommand::for_direction(direction, self.config.reverse_direction);

        self.channel
            .send(datapoint::CONTROL, DatapointType::Enum, &[command as u8])
            .await?;
        self.state.pending_target = Some(direction.end_stop());
        self.state.last_direction = Some(direction);

        Ok(())
    }

    fn apply_override(&mut self, state_override: StateOverride) {
        match state_override {
            StateOverride::Open => self.state.confirm_position(MAX_POSITION),
            StateOverride::Closed => self.state.confirm_position(0),
            StateOverride::Unknown => {
                self.state.position = None;
                self.state.pending_target = None;
            }
        }
    }

    fn calibrating(&self) -> bool {
        matches!(self.state.calibration, Calibration::InProgress { .. })
    }

    fn ensure_available(&self) -> Result<(), P::Error> {
        if self.calibrating() {
            Err(Error::CalibrationBusy)
        } else {
            Ok(())
        }
    }

    fn dp2_as_report(&self) -> bool {
        self.config.dp2_as_report || self.params.dp2_as_report()
    }
}
