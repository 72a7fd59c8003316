// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! XMODEM-1K receive side.
//!
//! Frame layout:
//!
//! ```text
//! [SOH|STX][index][!index][payload: 128|1024][crc hi][crc lo]
//! ```
//!
//! The receiver polls with `C`, then handles one byte per [`Receiver::step`],
//! calling the packet consumer for every frame that passes its CRC and
//! sequence checks and answering each frame with a single ACK or NAK.
//!
//! A frame that fails its CRC, or a byte that cannot start one, means the
//! receiver may have lost its place in the stream. It then drops everything
//! until the line has been quiet for [`Timing::purge_quiet_ms`] and only then
//! NAKs, so that a retransmission always starts on a frame boundary.

use consts::{PACKET_TIMEOUT_MS, POLL_PERIOD_MS, PURGE_QUIET_MS};

use crate::crc::checksum;
use crate::link::{Clock, Deadline, SerialLink};

/// Start of a 128-byte packet.
pub const SOH: u8 = 0x01;
/// Start of a 1024-byte packet.
pub const STX: u8 = 0x02;
/// End of transmission.
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
/// Receiver ready, CRC mode requested.
pub const POLL: u8 = 0x43;
/// Filler for the unused tail of the last packet.
pub const PAD_BYTE: u8 = 0x1A;

pub const SHORT_PAYLOAD_LEN: usize = 128;
pub const LONG_PAYLOAD_LEN: usize = 1024;
pub const HEADER_LEN: usize = 3;
pub const CRC_LEN: usize = 2;
pub const MAX_PACKET_LEN: usize = HEADER_LEN + LONG_PAYLOAD_LEN + CRC_LEN;

/// Index carried by the first packet of a transfer.
pub const FIRST_INDEX: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketSize {
    Short,
    Long,
}

impl PacketSize {
    pub fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            SOH => Some(PacketSize::Short),
            STX => Some(PacketSize::Long),
            _ => None,
        }
    }

    /// Smallest packet that carries `len` bytes of payload.
    pub fn for_len(len: usize) -> Option<Self> {
        if len <= SHORT_PAYLOAD_LEN {
            Some(PacketSize::Short)
        } else if len <= LONG_PAYLOAD_LEN {
            Some(PacketSize::Long)
        } else {
            None
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            PacketSize::Short => SOH,
            PacketSize::Long => STX,
        }
    }

    pub fn payload_len(self) -> usize {
        match self {
            PacketSize::Short => SHORT_PAYLOAD_LEN,
            PacketSize::Long => LONG_PAYLOAD_LEN,
        }
    }
}

/// Writes one frame for `payload` into `buf` and returns it.
///
/// The payload is padded with [`PAD_BYTE`] up to the packet size. Returns
/// `None` for payloads longer than a long packet.
pub fn encode_packet<'a>(
    index: u8,
    payload: &[u8],
    buf: &'a mut [u8; MAX_PACKET_LEN],
) -> Option<&'a [u8]> {
    let size = PacketSize::for_len(payload.len())?;
    let len = size.payload_len();

    buf[0] = size.marker();
    buf[1] = index;
    buf[2] = !index;
    let body = &mut buf[HEADER_LEN..HEADER_LEN + len];
    body[..payload.len()].copy_from_slice(payload);
    body[payload.len()..].fill(PAD_BYTE);
    let crc = checksum(body);
    buf[HEADER_LEN + len..HEADER_LEN + len + CRC_LEN].copy_from_slice(&crc.to_be_bytes());

    Some(&buf[..HEADER_LEN + len + CRC_LEN])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing sent yet.
    Idle,
    /// Poll sent, waiting for the first packet.
    Polling,
    /// Transfer in progress.
    Receiving,
    /// Out of sync, discarding input until the line goes quiet.
    Purging,
    /// EOT acknowledged.
    Done,
}

/// Timer periods of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    pub poll_period_ms: u64,
    pub packet_timeout_ms: u64,
    /// Silence that ends a purge. Must stay below both the packet timeout
    /// and the sender's reply timeout.
    pub purge_quiet_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_period_ms: POLL_PERIOD_MS,
            packet_timeout_ms: PACKET_TIMEOUT_MS,
            purge_quiet_ms: PURGE_QUIET_MS,
        }
    }
}

/// Notable outcome of one [`Receiver::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    PollSent,
    PacketStarted(PacketSize),
    /// Consumer took the packet, ACK sent.
    Accepted { index: u8, len: usize },
    /// Consumer refused the packet, NAK sent.
    Refused { index: u8 },
    /// Retransmission of the last accepted packet, ACK sent without consuming.
    Duplicate { index: u8 },
    /// Packet number neither expected nor a retransmission, NAK sent.
    OutOfSequence { index: u8, expected: u8 },
    /// Packet number and its complement disagree, NAK sent.
    BadHeader { index: u8, complement: u8 },
    /// Payload CRC mismatch, purge started.
    CrcMismatch { received: u16, computed: u16 },
    /// Byte that cannot start a packet, purge started.
    Malformed(u8),
    /// Line went quiet after a purge, NAK sent.
    Purged { discarded: usize },
    /// Packet did not complete in time, partial data dropped and NAK sent.
    PacketTimedOut { received: usize },
    /// EOT acknowledged, session over.
    Finished,
}

/// Counters accumulated over one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionReport {
    pub polls_sent: u32,
    pub packets_accepted: u32,
    pub bytes_delivered: u32,
    pub duplicates: u32,
    pub naks_sent: u32,
    pub crc_errors: u32,
    pub malformed: u32,
    pub timeouts: u32,
    pub bytes_purged: u32,
}

struct Session {
    state: State,
    size: PacketSize,
    /// Position of the next byte within the current frame; 0 between frames.
    offset: usize,
    index: u8,
    complement: u8,
    crc: u16,
    expected: u8,
    deadline: Option<Deadline>,
    /// Bytes dropped by the purge in progress.
    discarded: usize,
    buffer: [u8; LONG_PAYLOAD_LEN],
    report: SessionReport,
}

impl Session {
    fn new() -> Self {
        Self {
            state: State::Idle,
            size: PacketSize::Long,
            offset: 0,
            index: 0,
            complement: 0,
            crc: 0,
            expected: FIRST_INDEX,
            deadline: None,
            discarded: 0,
            buffer: [0; LONG_PAYLOAD_LEN],
            report: SessionReport::default(),
        }
    }
}

/// XMODEM-1K receiver over a [`SerialLink`], timed by a [`Clock`].
///
/// One receiver is one session: construct a new one per transfer.
pub struct Receiver<L, C> {
    link: L,
    clock: C,
    timing: Timing,
    session: Session,
}

impl<L: SerialLink, C: Clock> Receiver<L, C> {
    pub fn new(link: L, clock: C, timing: Timing) -> Self {
        Self {
            link,
            clock,
            timing,
            session: Session::new(),
        }
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn report(&self) -> SessionReport {
        self.session.report
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Receives a whole transfer, handing every verified payload to
    /// `consumer`. Returns once the sender's EOT has been acknowledged.
    ///
    /// An `Err` from the consumer NAKs the packet so the sender repeats it;
    /// the payload slice is only valid for the duration of the call.
    pub fn run<E, F>(&mut self, mut consumer: F) -> SessionReport
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        while self.session.state != State::Done {
            self.step(&mut consumer);
        }
        info!(
            "Transfer complete: {} packets, {} bytes",
            self.session.report.packets_accepted, self.session.report.bytes_delivered
        );
        self.session.report
    }

    /// Advances the state machine by at most one received byte or one timer
    /// expiry.
    pub fn step<E, F>(&mut self, consumer: &mut F) -> Option<Event>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        match self.session.state {
            State::Idle => {
                self.send_poll();
                self.session.state = State::Polling;
                Some(Event::PollSent)
            }
            State::Polling => match self.link.try_read_byte() {
                Some(byte) => match PacketSize::from_marker(byte) {
                    Some(size) => {
                        self.session.state = State::Receiving;
                        Some(self.begin_packet(size))
                    }
                    None => {
                        trace!("Ignoring {:#x} while polling", byte);
                        None
                    }
                },
                None if self.expired() => {
                    debug!("No sender yet, polling again");
                    self.send_poll();
                    Some(Event::PollSent)
                }
                None => None,
            },
            State::Receiving => match self.link.try_read_byte() {
                Some(byte) => self.receive(byte, consumer),
                None if self.expired() => Some(self.packet_timed_out()),
                None => None,
            },
            State::Purging => match self.link.try_read_byte() {
                Some(_) => {
                    self.session.discarded += 1;
                    self.session.report.bytes_purged += 1;
                    self.arm(self.timing.purge_quiet_ms);
                    None
                }
                None if self.expired() => Some(self.purged()),
                None => None,
            },
            State::Done => None,
        }
    }

    fn receive<E, F>(&mut self, byte: u8, consumer: &mut F) -> Option<Event>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        let s = &mut self.session;
        let payload_end = HEADER_LEN + s.size.payload_len();
        match s.offset {
            0 => {
                if let Some(size) = PacketSize::from_marker(byte) {
                    Some(self.begin_packet(size))
                } else if byte == EOT {
                    self.reply(ACK);
                    self.session.state = State::Done;
                    self.session.deadline = None;
                    info!("EOT received");
                    Some(Event::Finished)
                } else {
                    s.report.malformed += 1;
                    warn!("Unexpected {:#x} at start of packet, purging", byte);
                    self.start_purge();
                    Some(Event::Malformed(byte))
                }
            }
            1 => {
                s.index = byte;
                s.offset += 1;
                None
            }
            2 => {
                s.complement = byte;
                s.offset += 1;
                None
            }
            n if n < payload_end => {
                s.buffer[n - HEADER_LEN] = byte;
                s.offset += 1;
                None
            }
            n if n == payload_end => {
                s.crc = u16::from(byte) << 8;
                s.offset += 1;
                None
            }
            _ => {
                s.crc |= u16::from(byte);
                Some(self.finish_packet(consumer))
            }
        }
    }

    fn begin_packet(&mut self, size: PacketSize) -> Event {
        self.session.size = size;
        self.session.offset = 1;
        self.arm(self.timing.packet_timeout_ms);
        Event::PacketStarted(size)
    }

    fn finish_packet<E, F>(&mut self, consumer: &mut F) -> Event
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        let s = &mut self.session;
        s.offset = 0;
        let len = s.size.payload_len();
        let index = s.index;
        let computed = checksum(&s.buffer[..len]);

        if computed != s.crc {
            s.report.crc_errors += 1;
            warn!("Packet {} CRC mismatch: got {:#x}, computed {:#x}", index, s.crc, computed);
            let received = s.crc;
            // The frame boundary is no longer trustworthy, NAK once the line is quiet.
            self.start_purge();
            return Event::CrcMismatch { received, computed };
        }

        let (reply, event) = if s.complement != !index {
            warn!("Packet {} header complement {:#x} invalid", index, s.complement);
            (NAK, Event::BadHeader { index, complement: s.complement })
        } else if index == s.expected {
            match consumer(&s.buffer[..len]) {
                Ok(()) => {
                    s.expected = s.expected.wrapping_add(1);
                    s.report.packets_accepted += 1;
                    s.report.bytes_delivered += len as u32;
                    debug!("Packet {} accepted ({} bytes)", index, len);
                    (ACK, Event::Accepted { index, len })
                }
                Err(_) => {
                    warn!("Packet {} refused by consumer", index);
                    (NAK, Event::Refused { index })
                }
            }
        } else if s.report.packets_accepted > 0 && index == s.expected.wrapping_sub(1) {
            s.report.duplicates += 1;
            debug!("Packet {} repeated, acknowledging again", index);
            (ACK, Event::Duplicate { index })
        } else {
            warn!("Packet {} out of sequence, expected {}", index, s.expected);
            (NAK, Event::OutOfSequence { index, expected: s.expected })
        };

        self.reply(reply);
        self.arm(self.timing.packet_timeout_ms);
        event
    }

    fn packet_timed_out(&mut self) -> Event {
        let received = self.session.offset;
        self.session.offset = 0;
        self.session.report.timeouts += 1;
        warn!("Packet timed out after {} bytes", received);
        self.reply(NAK);
        self.arm(self.timing.packet_timeout_ms);
        Event::PacketTimedOut { received }
    }

    fn start_purge(&mut self) {
        self.session.state = State::Purging;
        self.session.offset = 0;
        self.session.discarded = 0;
        self.arm(self.timing.purge_quiet_ms);
    }

    fn purged(&mut self) -> Event {
        let discarded = self.session.discarded;
        debug!("Line quiet after dropping {} bytes", discarded);
        self.session.state = State::Receiving;
        self.reply(NAK);
        self.arm(self.timing.packet_timeout_ms);
        Event::Purged { discarded }
    }

    fn send_poll(&mut self) {
        self.link.write_bytes(&[POLL]);
        self.session.report.polls_sent += 1;
        self.arm(self.timing.poll_period_ms);
    }

    fn reply(&mut self, byte: u8) {
        if byte == NAK {
            self.session.report.naks_sent += 1;
        }
        self.link.write_bytes(&[byte]);
    }

    fn arm(&mut self, period_ms: u64) {
        self.session.deadline = Some(Deadline::start(&self.clock, period_ms));
    }

    fn expired(&self) -> bool {
        self.session
            .deadline
            .is_some_and(|deadline| deadline.has_expired(&self.clock))
    }
}
