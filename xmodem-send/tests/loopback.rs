// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sender against the device-side receiver over an in-memory serial line.

use std::io::{self, Read, Write};
use std::sync::mpsc::{channel, Receiver as Rx, RecvTimeoutError, Sender as Tx, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use update_engine::{Clock, Receiver, SerialLink, SessionReport, Timing};
use xmodem_send::{SendError, Sender};

const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Host end of the line.
struct HostPort {
    rx: Rx<u8>,
    tx: Tx<u8>,
}

impl Read for HostPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            Err(RecvTimeoutError::Timeout) => Err(io::ErrorKind::TimedOut.into()),
            Err(RecvTimeoutError::Disconnected) => Ok(0),
        }
    }
}

impl Write for HostPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.tx
                .send(byte)
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Device end of the line. `corrupt` flips the byte at that position of
/// the incoming stream.
struct DeviceLink {
    rx: Rx<u8>,
    tx: Tx<u8>,
    received: usize,
    corrupt: Option<usize>,
}

impl SerialLink for DeviceLink {
    fn try_read_byte(&mut self) -> Option<u8> {
        match self.rx.try_recv() {
            Ok(byte) => {
                let position = self.received;
                self.received += 1;
                if self.corrupt == Some(position) {
                    Some(byte ^ 0xFF)
                } else {
                    Some(byte)
                }
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                thread::yield_now();
                None
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let _ = self.tx.send(byte);
        }
    }
}

struct StdClock(Instant);

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}

fn line(corrupt: Option<usize>) -> (HostPort, DeviceLink) {
    let (host_tx, device_rx) = channel();
    let (device_tx, host_rx) = channel();
    (
        HostPort { rx: host_rx, tx: host_tx },
        DeviceLink { rx: device_rx, tx: device_tx, received: 0, corrupt },
    )
}

/// Runs a receiver on its own thread. `refuse` lists packets (by arrival
/// order) the consumer rejects once.
fn spawn_device(
    link: DeviceLink,
    refuse: Vec<usize>,
) -> thread::JoinHandle<(Vec<u8>, SessionReport)> {
    thread::spawn(move || {
        let timing = Timing {
            poll_period_ms: 2000,
            packet_timeout_ms: 300,
            purge_quiet_ms: 50,
        };
        let mut receiver = Receiver::new(link, StdClock(Instant::now()), timing);
        let mut image = Vec::new();
        let mut calls = 0;
        let report = receiver.run(|payload| {
            calls += 1;
            if refuse.contains(&(calls - 1)) {
                return Err(());
            }
            image.extend_from_slice(payload);
            Ok(())
        });
        (image, report)
    })
}

fn test_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + i / 256) as u8).collect()
}

fn padded(image: &[u8]) -> Vec<u8> {
    let mut expected = image.to_vec();
    let tail = image.len() % 1024;
    let packet = if tail <= 128 { 128 } else { 1024 };
    if tail != 0 {
        expected.resize(image.len() - tail + packet, 0x1A);
    }
    expected
}

#[test]
fn image_arrives_intact() {
    let image = test_image(3 * 1024 + 100);
    let (mut host, device) = line(None);
    let handle = spawn_device(device, Vec::new());

    let mut progress = Vec::new();
    let summary = Sender::default()
        .send(&mut host, &image, |n| progress.push(n))
        .unwrap();
    let (received, report) = handle.join().unwrap();

    assert_eq!(summary.packets, 4);
    assert_eq!(summary.retransmissions, 0);
    assert_eq!(progress.last(), Some(&image.len()));
    assert_eq!(received, padded(&image));
    assert_eq!(report.packets_accepted, 4);
    assert_eq!(report.naks_sent, 0);
}

#[test]
fn corrupted_packet_is_resent() {
    let image = test_image(2048);
    // Somewhere in the payload of the first packet.
    let (mut host, device) = line(Some(500));
    let handle = spawn_device(device, Vec::new());

    let summary = Sender::default().send(&mut host, &image, |_| {}).unwrap();
    let (received, report) = handle.join().unwrap();

    assert_eq!(summary.retransmissions, 1);
    assert_eq!(received, image);
    assert_eq!(report.crc_errors, 1);
    assert_eq!(report.naks_sent, 1);
}

#[test]
fn refused_packet_is_resent() {
    let image = test_image(2500);
    let (mut host, device) = line(None);
    let handle = spawn_device(device, vec![1]);

    let summary = Sender::default().send(&mut host, &image, |_| {}).unwrap();
    let (received, report) = handle.join().unwrap();

    assert_eq!(summary.packets, 3);
    assert_eq!(summary.retransmissions, 1);
    assert_eq!(received, padded(&image));
    assert_eq!(report.packets_accepted, 3);
}

#[test]
fn silent_line_reports_no_receiver() {
    let (mut host, _device) = line(None);
    let err = Sender::new(2).send(&mut host, &[0; 64], |_| {}).unwrap_err();
    assert!(matches!(err, SendError::NoReceiver(2)));
}
