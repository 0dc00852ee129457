//! Public façade (component H): wires the framing, sentence, message,
//! correlation and configuration layers into one type the host drives with
//! raw bytes in and host callbacks out. Host I/O is captured as closures at
//! construction rather than trait objects, keeping the crate usable without
//! `alloc`.

use crate::config::{ConfigDriver, Step as ConfigStep};
use crate::constants::{TX_DATA_SIZE, UBX_RETRANSMIT_MILLIS};
use crate::error::ConfigError;
use crate::fix::{EpochMask, FixCorrelator, Location, ProtocolMode};
use crate::framing::{BinaryMode, Frame, Framer};
use crate::nmea::NmeaProcessor;
use crate::satellites::SatelliteTable;
use crate::tables::{steady_state_location_mask, GnssMode, Rate};
use crate::ubx::UbxProcessor;

/// Builds a [`GnssDevice`] from its protocol mode and host callbacks.
/// Mirrors the parser-builder pattern common to byte-oriented protocol
/// crates: every field has a sensible default except the closures, which
/// the host must supply before `build()`.
pub struct GnssDeviceBuilder<Send, Timer, OnLocation, OnSatellites> {
    mode: GnssMode,
    send: Option<Send>,
    arm_timer: Option<Timer>,
    on_location: Option<OnLocation>,
    on_satellites: Option<OnSatellites>,
}

impl<Send, Timer, OnLocation, OnSatellites> GnssDeviceBuilder<Send, Timer, OnLocation, OnSatellites>
where
    Send: FnMut(&[u8]),
    Timer: FnMut(u32),
    OnLocation: FnMut(&Location),
    OnSatellites: FnMut(&SatelliteTable),
{
    pub fn new(mode: GnssMode) -> Self {
        GnssDeviceBuilder { mode, send: None, arm_timer: None, on_location: None, on_satellites: None }
    }

    /// Host hook that writes bytes to the serial port.
    pub fn send(mut self, send: Send) -> Self {
        self.send = Some(send);
        self
    }

    /// Host hook that arms a one-shot timer for `millis` milliseconds,
    /// expected to call [`GnssDevice::on_timeout`] when it fires.
    pub fn timer(mut self, arm_timer: Timer) -> Self {
        self.arm_timer = Some(arm_timer);
        self
    }

    pub fn on_location(mut self, on_location: OnLocation) -> Self {
        self.on_location = Some(on_location);
        self
    }

    pub fn on_satellites(mut self, on_satellites: OnSatellites) -> Self {
        self.on_satellites = Some(on_satellites);
        self
    }

    /// Assembles the device. Panics if a required callback was never
    /// supplied; every caller is expected to chain all four builder methods
    /// before calling this, the same contract the teacher's own builder
    /// places on its required fields.
    pub fn build(self) -> GnssDevice<Send, Timer, OnLocation, OnSatellites> {
        let protocol_mode = match self.mode {
            GnssMode::Ublox => ProtocolMode::Ubx,
            GnssMode::Nmea | GnssMode::MediaTek => ProtocolMode::Nmea,
        };
        let binary_mode = match self.mode {
            GnssMode::Ublox => BinaryMode::Enabled,
            GnssMode::Nmea | GnssMode::MediaTek => BinaryMode::Disabled,
        };
        GnssDevice {
            mode: self.mode,
            framer: Framer::new(binary_mode),
            nmea: NmeaProcessor::new(),
            ubx: UbxProcessor::new(),
            corr: FixCorrelator::new(protocol_mode),
            config: ConfigDriver::new(self.mode),
            loc: Location::default(),
            sats: SatelliteTable::new(),
            send: self.send.expect("GnssDeviceBuilder::send is required"),
            arm_timer: self.arm_timer.expect("GnssDeviceBuilder::timer is required"),
            on_location: self.on_location.expect("GnssDeviceBuilder::on_location is required"),
            on_satellites: self.on_satellites.expect("GnssDeviceBuilder::on_satellites is required"),
        }
    }
}

/// A command frame copied out of the configuration driver's internal
/// storage. Every [`ConfigStep::Send`] payload is bounded by
/// [`TX_DATA_SIZE`]; copying it into an owned buffer lets the dispatch step
/// take `&mut self` without fighting a borrow still tied to `self.config`.
enum Outcome {
    Send([u8; TX_DATA_SIZE], usize),
    Done,
}

fn capture(step: ConfigStep<'_>) -> Outcome {
    match step {
        ConfigStep::Send(frame) => {
            let mut buf = [0u8; TX_DATA_SIZE];
            let len = frame.len().min(TX_DATA_SIZE);
            buf[..len].copy_from_slice(&frame[..len]);
            Outcome::Send(buf, len)
        },
        ConfigStep::Done => Outcome::Done,
    }
}

/// Ties every component together behind one byte-in, callback-out surface.
pub struct GnssDevice<Send, Timer, OnLocation, OnSatellites> {
    mode: GnssMode,
    framer: Framer,
    nmea: NmeaProcessor,
    ubx: UbxProcessor,
    corr: FixCorrelator,
    config: ConfigDriver,
    loc: Location,
    sats: SatelliteTable,
    send: Send,
    arm_timer: Timer,
    on_location: OnLocation,
    on_satellites: OnSatellites,
}

impl<Send, Timer, OnLocation, OnSatellites> GnssDevice<Send, Timer, OnLocation, OnSatellites>
where
    Send: FnMut(&[u8]),
    Timer: FnMut(u32),
    OnLocation: FnMut(&Location),
    OnSatellites: FnMut(&SatelliteTable),
{
    fn dispatch(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Send(buf, len) => {
                (self.send)(&buf[..len]);
                (self.arm_timer)(UBX_RETRANSMIT_MILLIS);
            },
            Outcome::Done => {
                if self.config.is_done() && self.mode == GnssMode::Nmea {
                    self.corr.set_expected_location(steady_state_location_mask(self.mode));
                }
            },
        }
    }

    /// Starts the baud-rate handshake and init table walk (`spec.md` §4.G
    /// "Init"). Call once at startup, after the host has already switched
    /// its own UART to `baud`.
    pub fn init(&mut self, baud: u32, rate: Rate) {
        let outcome = capture(self.config.begin_init(baud, rate));
        self.dispatch(outcome);
    }

    /// True once the configuration driver has emptied its table and is
    /// waiting for runtime reconfiguration requests.
    pub fn done(&self) -> bool {
        self.config.is_done()
    }

    fn apply_ack(&mut self, acked: bool) {
        let mut expected = EpochMask::empty();
        let outcome = if acked { capture(self.config.on_ack(&mut expected)) } else { capture(self.config.on_nack(&mut expected)) };
        if !expected.is_empty() {
            self.corr.set_expected_location(expected);
        }
        self.dispatch(outcome);
    }

    /// Feeds one byte from the serial stream through framing, the sentence/
    /// message processors, and the fix correlator, firing `on_location`/
    /// `on_satellites` as cycles complete.
    pub fn receive(&mut self, byte: u8) {
        let nmea = &mut self.nmea;
        let ubx = &mut self.ubx;
        let loc = &mut self.loc;
        let sats = &mut self.sats;
        let corr = &mut self.corr;
        let mut pmtk_ack: Option<bool> = None;
        let mut ubx_ack: Option<bool> = None;

        self.framer.feed_byte(byte, |frame| match frame {
            Frame::NmeaField { data, is_last } => {
                nmea.on_field(data, is_last, loc, sats, corr, |_cmd, acked| pmtk_ack = Some(acked));
                None
            },
            Frame::NmeaEnd => None,
            Frame::UbxHeader { class, id, .. } => ubx.on_header(class, id),
            Frame::UbxChunk { offset, data } => ubx.on_chunk(offset, data, loc, sats, corr),
            Frame::UbxEnd { class, id, tail, .. } => {
                ubx.on_end(class, id, tail, loc, sats, corr, |_key, acked| ubx_ack = Some(acked));
                None
            },
        });

        if let Some(acked) = pmtk_ack {
            self.apply_ack(acked);
        }
        if let Some(acked) = ubx_ack {
            self.apply_ack(acked);
        }

        self.corr.try_publish_location(&mut self.loc, &mut self.on_location);
        if self.corr.satellites_ready() {
            self.nmea.cross_reference_used(&mut self.sats);
        }
        self.corr.try_publish_satellites(&self.sats, &mut self.on_satellites);
    }

    /// The host's retransmit timer fired with no ack/nack observed since the
    /// last send.
    pub fn on_timeout(&mut self) {
        let mut expected = EpochMask::empty();
        let outcome = capture(self.config.on_timeout(&mut expected));
        if !expected.is_empty() {
            self.corr.set_expected_location(expected);
        }
        self.dispatch(outcome);
    }

    pub fn set_constellation(&mut self, gps: bool, glonass: bool, qzss: bool) -> Result<(), ConfigError> {
        let outcome = capture(self.config.set_constellation(gps, glonass, qzss)?);
        self.dispatch(outcome);
        Ok(())
    }

    pub fn set_sbas(&mut self, enabled: bool) -> Result<(), ConfigError> {
        let outcome = capture(self.config.set_sbas(enabled)?);
        self.dispatch(outcome);
        Ok(())
    }

    pub fn set_qzss(&mut self, enabled: bool) -> Result<(), ConfigError> {
        let outcome = capture(self.config.set_qzss(enabled)?);
        self.dispatch(outcome);
        Ok(())
    }

    pub fn set_periodic(&mut self, on_time_seconds: u16, period_seconds: u16, force: bool) -> Result<(), ConfigError> {
        let outcome = capture(self.config.set_periodic(on_time_seconds, period_seconds, force)?);
        self.dispatch(outcome);
        Ok(())
    }

    pub fn set_external(&mut self, enabled: bool) -> Result<(), ConfigError> {
        let outcome = capture(self.config.set_external(enabled)?);
        self.dispatch(outcome);
        Ok(())
    }

    pub fn sleep(&mut self) -> Result<(), ConfigError> {
        let outcome = capture(self.config.sleep()?);
        self.dispatch(outcome);
        Ok(())
    }

    pub fn wake(&mut self) -> Result<(), ConfigError> {
        let outcome = capture(self.config.wake()?);
        self.dispatch(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    #[test]
    fn nmea_device_parses_a_full_gga_rmc_cycle() {
        let sent: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let located: Rc<RefCell<Option<Location>>> = Rc::new(RefCell::new(None));

        let sent2 = sent.clone();
        let located2 = located.clone();
        let mut device = GnssDeviceBuilder::new(GnssMode::Nmea)
            .send(move |bytes: &[u8]| sent2.borrow_mut().extend_from_slice(bytes))
            .timer(|_millis: u32| {})
            .on_location(move |loc: &Location| *located2.borrow_mut() = Some(*loc))
            .on_satellites(|_sats: &SatelliteTable| {})
            .build();

        device.init(9600, Rate::Hz1);
        assert!(device.done());

        for &b in b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n" {
            device.receive(b);
        }
        for &b in b"$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39\r\n" {
            device.receive(b);
        }
        for &b in b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n" {
            device.receive(b);
        }

        let loc = located.borrow().expect("a location should have published");
        assert_eq!(loc.hour, 12);
        assert_eq!(loc.minute, 35);
    }

    #[test]
    fn gsa_used_mask_marks_matching_gsv_entries_navigating() {
        let satellites: Rc<RefCell<Option<SatelliteTable>>> = Rc::new(RefCell::new(None));
        let satellites2 = satellites.clone();
        let mut device = GnssDeviceBuilder::new(GnssMode::Nmea)
            .send(|_: &[u8]| {})
            .timer(|_millis: u32| {})
            .on_location(|_: &Location| {})
            .on_satellites(move |sats: &SatelliteTable| *satellites2.borrow_mut() = Some(sats.clone()))
            .build();

        device.init(9600, Rate::Hz1);

        for &b in b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n" {
            device.receive(b);
        }
        for &b in b"$GPGSA,A,3,05,09,,,,,,,,,,,2.5,1.3,2.1*38\r\n" {
            device.receive(b);
        }
        for &b in b"$GPGSV,1,1,02,05,40,100,,09,50,200,45*74\r\n" {
            device.receive(b);
        }
        for &b in b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n" {
            device.receive(b);
        }

        let sats = satellites.borrow().clone().expect("a satellite table should have published");
        assert_eq!(sats.len(), 2);
        assert!(sats.as_slice()[0].flags.contains(crate::satellites::SatelliteFlags::NAVIGATING), "PRN 05 is in the GSA used-mask");
        assert!(sats.as_slice()[1].flags.contains(crate::satellites::SatelliteFlags::NAVIGATING), "PRN 09 is in the GSA used-mask");
    }

    #[test]
    fn ublox_device_enables_binary_framing() {
        let mut device = GnssDeviceBuilder::new(GnssMode::Ublox)
            .send(|_: &[u8]| {})
            .timer(|_: u32| {})
            .on_location(|_: &Location| {})
            .on_satellites(|_: &SatelliteTable| {})
            .build();

        device.init(9600, Rate::Hz1);
        assert!(!device.done(), "ublox init should have an outstanding baud command");
    }

    #[test]
    fn set_sbas_is_rejected_while_the_driver_is_busy() {
        let mut device = GnssDeviceBuilder::new(GnssMode::Ublox)
            .send(|_: &[u8]| {})
            .timer(|_: u32| {})
            .on_location(|_: &Location| {})
            .on_satellites(|_: &SatelliteTable| {})
            .build();

        device.init(9600, Rate::Hz1);
        assert_eq!(device.set_sbas(true).unwrap_err(), ConfigError::NotDone);
    }

    #[test]
    fn set_periodic_sends_the_continuous_mode_frame_first() {
        let sent: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let sent2 = sent.clone();
        let mut device = GnssDeviceBuilder::new(GnssMode::Ublox)
            .send(move |bytes: &[u8]| sent2.borrow_mut().extend_from_slice(bytes))
            .timer(|_: u32| {})
            .on_location(|_: &Location| {})
            .on_satellites(|_: &SatelliteTable| {})
            .build();

        // never initialized, so the configuration driver starts out idle
        assert!(device.done());
        device.set_periodic(1, 2, false).expect("idle driver accepts request");
        assert_eq!(&sent.borrow()[..], &crate::tables::CFG_RXM_CONTINUOUS[..]);
    }
}
