// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sending half of XMODEM-1K, used to feed an image to the bootloader.

use std::io::{self, Read, Write};

use consts::PACKET_TIMEOUT_MS;

use update_engine::xmodem::{
    encode_packet, ACK, EOT, FIRST_INDEX, LONG_PAYLOAD_LEN, MAX_PACKET_LEN, NAK, POLL,
};

/// Default wait for each reply.
///
/// A receiver that lost a byte only NAKs once its packet timer runs out
/// after [`PACKET_TIMEOUT_MS`]. Resending earlier lands in the middle of the
/// packet it is still counting, so the sender always waits longer.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = PACKET_TIMEOUT_MS + REPLY_MARGIN_MS;

const REPLY_MARGIN_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no poll from the receiver after {0} attempts")]
    NoReceiver(usize),
    #[error("packet {index} not acknowledged after {attempts} attempts")]
    TooManyRetries { index: u8, attempts: usize },
    #[error("end of transmission not acknowledged")]
    EotNotAcknowledged,
    #[error("receiver closed the link")]
    Disconnected,
    #[error("image is empty")]
    EmptyImage,
    #[error("packet {0} could not be framed")]
    Encode(u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSummary {
    pub packets: usize,
    pub retransmissions: usize,
}

enum Reply {
    Ack,
    Nak,
    Poll,
    Timeout,
}

pub struct Sender {
    max_attempts: usize,
    handshake_attempts: usize,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Sender {
    /// `max_attempts` bounds the transmissions of a single packet and the
    /// read timeouts tolerated while waiting for the first poll.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            handshake_attempts: max_attempts.max(1),
        }
    }

    /// Sends `image` over `dev`, calling `on_progress` with the number of
    /// image bytes acknowledged so far.
    ///
    /// `dev` must have a read timeout; timeouts count as lost replies.
    pub fn send<D: Read + Write>(
        &self,
        dev: &mut D,
        image: &[u8],
        mut on_progress: impl FnMut(usize),
    ) -> Result<SendSummary, SendError> {
        if image.is_empty() {
            return Err(SendError::EmptyImage);
        }
        self.wait_for_poll(dev)?;
        tracing::info!("Receiver ready, sending {} bytes", image.len());

        let mut summary = SendSummary { packets: 0, retransmissions: 0 };
        let mut index = FIRST_INDEX;
        let mut sent = 0;
        for chunk in image.chunks(LONG_PAYLOAD_LEN) {
            summary.retransmissions += self.send_packet(dev, index, chunk)?;
            summary.packets += 1;
            sent += chunk.len();
            on_progress(sent);
            index = index.wrapping_add(1);
        }

        self.finish(dev)?;
        tracing::info!(
            "Transfer done: {} packets, {} retransmissions",
            summary.packets,
            summary.retransmissions
        );
        Ok(summary)
    }

    fn wait_for_poll<D: Read>(&self, dev: &mut D) -> Result<(), SendError> {
        let mut timeouts = 0;
        loop {
            match read_byte(dev)? {
                Some(POLL) => return Ok(()),
                Some(other) => tracing::debug!("Ignoring {:#04x} before handshake", other),
                None => {
                    timeouts += 1;
                    if timeouts >= self.handshake_attempts {
                        return Err(SendError::NoReceiver(timeouts));
                    }
                    tracing::debug!("Still waiting for receiver poll");
                }
            }
        }
    }

    /// Returns the number of retransmissions the packet needed.
    fn send_packet<D: Read + Write>(
        &self,
        dev: &mut D,
        index: u8,
        payload: &[u8],
    ) -> Result<usize, SendError> {
        let mut buf = [0u8; MAX_PACKET_LEN];
        let frame = encode_packet(index, payload, &mut buf)
            .ok_or(SendError::Encode(index))?;

        for attempt in 0..self.max_attempts {
            dev.write_all(frame)?;
            dev.flush()?;
            match wait_reply(dev)? {
                Reply::Ack => {
                    tracing::debug!("Packet {} acknowledged", index);
                    return Ok(attempt);
                }
                Reply::Nak => tracing::warn!("Packet {} NAKed, resending", index),
                Reply::Poll => tracing::warn!("Receiver still polling, resending packet {}", index),
                Reply::Timeout => tracing::warn!("No reply to packet {}, resending", index),
            }
        }
        Err(SendError::TooManyRetries { index, attempts: self.max_attempts })
    }

    fn finish<D: Read + Write>(&self, dev: &mut D) -> Result<(), SendError> {
        for _ in 0..self.max_attempts {
            dev.write_all(&[EOT])?;
            dev.flush()?;
            if let Reply::Ack = wait_reply(dev)? {
                return Ok(());
            }
        }
        Err(SendError::EotNotAcknowledged)
    }
}

/// A single poll may be left over from the handshake and is skipped; a
/// second one means the receiver never saw the packet start.
fn wait_reply<D: Read>(dev: &mut D) -> Result<Reply, SendError> {
    let mut polls = 0;
    loop {
        match read_byte(dev)? {
            Some(ACK) => return Ok(Reply::Ack),
            Some(NAK) => return Ok(Reply::Nak),
            Some(POLL) => {
                polls += 1;
                if polls > 1 {
                    return Ok(Reply::Poll);
                }
            }
            Some(other) => tracing::debug!("Ignoring {:#04x} while waiting for reply", other),
            None => return Ok(Reply::Timeout),
        }
    }
}

/// `None` on read timeout.
fn read_byte<D: Read>(dev: &mut D) -> Result<Option<u8>, SendError> {
    let mut byte = [0u8; 1];
    match dev.read(&mut byte) {
        Ok(0) => Err(SendError::Disconnected),
        Ok(_) => Ok(Some(byte[0])),
        Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
