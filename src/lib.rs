//! A byte-oriented driver for NMEA 0183 and u-blox-style UBX GNSS receivers:
//! frame delimiting and checksum validation, sentence/message decoding into
//! a shared location and satellite model, and a configuration driver that
//! walks vendor command tables with ack/retransmit logic.
//!
//! The crate is organized around the path a byte takes from the wire to a
//! host callback:
//!
//! - [`framing`] classifies and checksum-validates raw bytes into NMEA
//!   sentence fields or UBX binary frames.
//! - [`nmea`] and [`ubx`] decode those frames into the shared [`fix::Location`]
//!   and [`satellites::SatelliteTable`].
//! - [`fix`] tracks which sentences/messages a cycle still needs before it
//!   can publish.
//! - [`config`] and [`tables`] drive the startup handshake and runtime
//!   reconfiguration commands.
//! - [`device`] ties all of the above behind one byte-in, callback-out type.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;
extern crate core;
#[cfg(feature = "serde")]
extern crate serde;

pub use crate::{
    config::{ConfigDriver, Phase},
    device::{GnssDevice, GnssDeviceBuilder},
    error::{ConfigError, FrameError},
    fix::{EpochMask, FixCorrelator, FixQuality, FixType, Location, LocationMask, ProtocolMode},
    framing::{BinaryMode, Frame, Framer},
    nmea::NmeaProcessor,
    satellites::{SatelliteEntry, SatelliteFlags, SatelliteTable},
    tables::{GnssMode, Rate},
    ubx::UbxProcessor,
};

pub mod checksum;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod fix;
pub mod framing;
pub mod nmea;
pub mod numeric;
pub mod satellites;
pub mod tables;
pub mod ubx;
