//! Drive Tuya-based motorized window coverings via their proprietary datapoint protocol.
//!
//! # Overview
//!
//! The `tuyacover` crate implements the proprietary datapoint (DP) protocol
//! spoken by Tuya-based covering motors on top of a low-power wireless mesh
//! link. It offers an asynchronous, platform-agnostic engine for a single
//! covering.
//!
//! Depending on your needs, you can:
//!
//! - Use the high-level [`covering`] module to drive a motor and mirror its
//!   reported state.
//! - Work directly with the low-level frame [`Channel`] and [`Frame`] codec.
//!
//! # Getting started
//!
//! The engine is deliberately narrow about its environment: outbound bytes go
//! to any port implementing [`Write`](embedded_io_async::Write), inbound
//! frames are pushed in as byte slices by whatever delivers mesh payloads,
//! and the single persisted flag lives behind the
//! [`FlagStore`](covering::FlagStore) trait. Everything else (pairing,
//! transport retries, report configuration) stays in the platform layer.
//!
//! ```
//! use std::collections::VecDeque;
//! use tuyacover::covering::{CoveringConfig, CurtainMotor, FlagStore};
//!
//! struct MemoryStore(Option<bool>);
//!
//! #[async_trait::async_trait(?Send)]
//! impl FlagStore for MemoryStore {
//!     async fn load(&mut self, _key: &str) -> Option<bool> {
//!         self.0
//!     }
//!
//!     async fn save(&mut self, _key: &str, value: bool) {
//!         self.0 = Some(value);
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tuyacover::covering::Result<(), core::convert::Infallible> {
//! let port: VecDeque<u8> = VecDeque::new();
//! let store = MemoryStore(Some(true)); // already calibrated
//! let mut motor = CurtainMotor::new(port, store, CoveringConfig::default());
//!
//! motor.activate().await?;
//! motor.set_position(40).await?;
//!
//! // The device confirms asynchronously with a position report frame.
//! motor.handle_frame(&[0x00, 0x01, 0x03, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x28]).await?;
//! assert_eq!(motor.state().position, Some(40));
//! # Ok(())
//! # }
//! ```
//!
//! # Protocol details
//!
//! Every datapoint frame carries a fixed 6-byte header followed by its
//! payload:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 2    | sequence number, big-endian |
//! | 2      | 1    | datapoint identifier, see [`datapoint`] |
//! | 3      | 1    | datapoint type, see [`DatapointType`] |
//! | 4      | 2    | payload length, big-endian |
//!
//! Position values are 4-byte big-endian integers in the domain `0..=100`;
//! out-of-range values are clamped, not rejected. The motor reports
//! unsolicited frames on the same channel, so the engine treats every send
//! as fire-and-forget and reconciles confirmations as they arrive.
//!
//! The report channel of some firmware revisions falls silent unless it is
//! polled periodically with a fixed 4-byte zero query. The optional
//! `keep-alive` feature provides a scoped task for this, see [`keepalive`].

#![no_std]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod covering;

#[cfg(feature = "keep-alive")]
#[cfg_attr(docsrs, doc(cfg(feature = "keep-alive")))]
pub mod keepalive;

pub use embedded_io_async;

use core::fmt::{Display, Formatter};
use embedded_io_async::Write;
use log::trace;
use strum::FromRepr;

/// A specialized [`Result`] type for [`Channel`] operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for [`Channel`] operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// The provided argument is invalid.
    InvalidArgument,
    /// A port-specific input/output error.
    Io(E),
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Io(err) => write!(f, "input/output error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Io(err)
    }
}

/// Error type for decoding inbound frames and payloads.
///
/// Malformed frames are expected on the report channel and are always
/// recovered from locally by dropping the frame.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DecodeError {
    /// Fewer bytes than the fixed frame header requires.
    Truncated,
    /// The header declares more payload bytes than are available.
    LengthMismatch,
    /// The payload is shorter than its datapoint's fixed encoding.
    ShortPayload,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated frame header"),
            Self::LengthMismatch => write!(f, "declared payload length exceeds frame"),
            Self::ShortPayload => write!(f, "payload too short for datapoint"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Highest representable position value.
///
/// Logical and device positions both live in `0..=MAX_POSITION`, with `0`
/// fully closed and `MAX_POSITION` fully open on the logical side.
pub const MAX_POSITION: u8 = 100;

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 6;

/// The fixed report-channel query, see [`Channel::send_query`].
pub const QUERY_FRAME: [u8; 4] = [0x00; 4];

/// Datapoint identifiers used by covering motors.
///
/// The values are fixed by the vendor protocol. Identifiers outside this set
/// occur on shared-firmware devices and are ignored by the engine.
pub mod datapoint {
    /// Control command (open/stop/close), enum-typed.
    pub const CONTROL: u8 = 0x01;
    /// Numeric target or intermediate position, value-typed.
    pub const POSITION: u8 = 0x02;
    /// Authoritative position report, value-typed.
    pub const POSITION_REPORT: u8 = 0x03;
    /// End-stop calibration trigger, enum-typed.
    pub const CALIBRATION: u8 = 0x04;
    /// Motor direction configuration and echo, enum-typed.
    pub const DIRECTION: u8 = 0x05;
    /// Arrival notification, enum- or value-typed.
    pub const ARRIVAL: u8 = 0x06;
    /// Work state (opening/closing/stopped), enum- or value-typed.
    pub const WORK_STATE: u8 = 0x07;
}

/// Wire encoding of a datapoint payload.
///
/// Frames carrying other type bytes survive decoding (the raw byte is kept
/// in [`Frame`]) but are ignored during classification.
#[derive(FromRepr, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum DatapointType {
    /// 4-byte big-endian numeric value.
    Value = 0x02,
    /// Single-byte enumeration.
    Enum = 0x04,
}

/// A decoded datapoint frame.
///
/// The payload borrows from the source buffer; a `Frame` is constructed per
/// received frame and not retained.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Frame<'a> {
    /// Sequence number stamped by the sender.
    pub sequence: u16,
    /// Datapoint identifier, see [`datapoint`].
    pub datapoint: u8,
    /// Raw datapoint type byte, see [`DatapointType`].
    pub datapoint_type: u8,
    /// Payload bytes, exactly as many as the header declares.
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Decodes a frame from raw bytes.
    ///
    /// Bytes beyond the declared payload length are permitted and ignored;
    /// some mesh stacks pad their delivery buffers.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::Truncated`] if `data` is shorter than the header.
    /// - [`DecodeError::LengthMismatch`] if the declared payload length
    ///   exceeds the bytes that follow the header.
    pub fn decode(data: &'a [u8]) -> core::result::Result<Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::Truncated);
        }

        let len = usize::from(u16::from_be_bytes([data[4], data[5]]));
        let payload = data
            .get(HEADER_LEN..HEADER_LEN + len)
            .ok_or(DecodeError::LengthMismatch)?;

        Ok(Self {
            sequence: u16::from_be_bytes([data[0], data[1]]),
            datapoint: data[2],
            datapoint_type: data[3],
            payload,
        })
    }

    /// Decodes the payload as a position value.
    ///
    /// Applies to every value-typed datapoint the engine consumes, regardless
    /// of the declared type byte. Values above [`MAX_POSITION`] are clamped.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::ShortPayload`] if fewer than 4 payload bytes are present.
    pub fn position(&self) -> core::result::Result<u8, DecodeError> {
        let Some(bytes) = self.payload.first_chunk::<4>() else {
            return Err(DecodeError::ShortPayload);
        };

        Ok(u32::from_be_bytes(*bytes).min(u32::from(MAX_POSITION)) as u8)
    }
}

/// Encodes a position value into its fixed 4-byte payload.
///
/// Values above [`MAX_POSITION`] are clamped.
#[must_use]
pub fn encode_position(position: u8) -> [u8; 4] {
    u32::from(position.min(MAX_POSITION)).to_be_bytes()
}

/// Outbound half of the datapoint command channel.
///
/// Owns the outbound sequence counter and a port implementing
/// [`Write`](embedded_io_async::Write). Every send is fire-and-forget; the
/// motor confirms asynchronously through later inbound frames.
///
/// Most users should drive a covering through
/// [`CurtainMotor`](crate::covering::CurtainMotor) instead and reach for the
/// channel only for raw datapoint access.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tuyacover::Result<(), core::convert::Infallible> {
/// use std::collections::VecDeque;
/// use tuyacover::{Channel, DatapointType, datapoint};
///
/// let mut port = VecDeque::new();
/// let mut chan = Channel::new(&mut port);
///
/// chan.send(datapoint::CONTROL, DatapointType::Enum, &[0x01]).await?;
///
/// assert_eq!(port, [0x00, 0x00, 0x01, 0x04, 0x00, 0x01, 0x01]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Channel<P> {
    port: P,
    sequence: u16,
}

impl<P: Write> Channel<P> {
    /// Constructs a new command channel.
    pub fn new(port: P) -> Self {
        Self { port, sequence: 0 }
    }

    /// Returns the sequence number the next outbound frame will carry.
    #[must_use]
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }

    /// Encodes and sends a single datapoint frame.
    ///
    /// The frame carries the current sequence counter value, which is
    /// incremented (wrapping at `u16::MAX`) as a side effect. The used
    /// sequence number is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the payload length exceeds 65535 bytes.
    pub async fn send(
        &mut self,
        datapoint: u8,
        kind: DatapointType,
        payload: &[u8],
    ) -> Result<u16, P::Error> {
        let len = u16::try_from(payload.len()).map_err(|_| Error::InvalidArgument)?;
        let sequence = self.sequence;

        self.sequence = self.sequence.wrapping_add(1);

        let mut header = [0x00; HEADER_LEN];

        header[0..2].copy_from_slice(&sequence.to_be_bytes());
        header[2] = datapoint;
        header[3] = kind as u8;
        header[4..6].copy_from_slice(&len.to_be_bytes());

        trace!("Send frame: seq={sequence} dp={datapoint:#04x} kind={kind:?} payload={payload:02x?}");

        self.port.write_all(&header).await?;
        self.port.write_all(payload).await?;
        self.port.flush().await?;

        Ok(sequence)
    }

    /// Sends the fixed report-channel query.
    ///
    /// The query is the 4-byte all-zero poll some firmware revisions require
    /// to keep reporting. It is not a datapoint frame: it bypasses the codec
    /// and consumes no sequence number, and the motor never acknowledges it.
    pub async fn send_query(&mut self) -> Result<(), P::Error> {
        trace!("Send report query");

        self.port.write_all(&QUERY_FRAME).await?;

        Ok(self.port.flush().await?)
    }
}
