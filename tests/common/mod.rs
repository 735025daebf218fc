//! Shared plumbing for the end-to-end scenarios
// (c) 2025 peerlink developers

#![allow(dead_code)] // not every test target uses every helper

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use peerlink::{Client, ClientMode, ConnectionState, MessageSet, Settings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum TestMessage {
    Message = 0,
    Echo = 1,
}

impl MessageSet for TestMessage {
    const COUNT: u16 = 2;
    fn to_wire(self) -> u16 {
        self as u16
    }
    fn from_wire(value: u16) -> Option<Self> {
        match value {
            0 => Some(TestMessage::Message),
            1 => Some(TestMessage::Echo),
            _ => None,
        }
    }
}

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Polls `condition` until it holds or `deadline` elapses.
pub fn wait_for(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Settings with isolated download and certificate directories.
pub fn settings_for(mode: ClientMode, downloads: &Path, certificates: &Path) -> Settings {
    Settings::new(mode, downloads).with_certificate_directory(certificates)
}

/// Seek on loopback, dial the advertised endpoints, and wait for both sides
/// to reach `Connected`. Panics on timeout: every scenario needs this.
pub fn establish(seeker: &Client<TestMessage>, dialer: &Client<TestMessage>) {
    peerlink::util::setup_tracing_for_tests();
    let (tx, rx) = mpsc::channel();
    seeker
        .seek(
            LOCALHOST,
            [0, 0],
            move |address, ports| {
                let _ = tx.send((address, ports));
            },
            || {},
        )
        .expect("seek should begin");
    let (address, ports) = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("seeker should advertise its endpoints");
    assert_ne!(ports, [0, 0]);

    dialer.connect(address, ports, || {}).expect("dial should begin");
    assert!(
        wait_for(Duration::from_secs(3), || {
            seeker.state() == ConnectionState::Connected
                && dialer.state() == ConnectionState::Connected
        }),
        "both peers should reach Connected within 3s (seeker: {}, dialer: {})",
        seeker.state(),
        dialer.state()
    );
}

/// Disconnect both sides and wait for both to reach `Disconnected`.
pub fn teardown(a: &Client<TestMessage>, b: &Client<TestMessage>) {
    a.disconnect();
    b.disconnect();
    assert!(
        wait_for(Duration::from_secs(1), || {
            a.state() == ConnectionState::Disconnected
                && b.state() == ConnectionState::Disconnected
        }),
        "both peers should reach Disconnected within 1s (a: {}, b: {})",
        a.state(),
        b.state()
    );
}
