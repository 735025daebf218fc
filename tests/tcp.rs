//! End-to-end scenarios over plain TCP
// (c) 2025 peerlink developers

mod common;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{establish, settings_for, teardown, wait_for, TestMessage};
use peerlink::{Client, ClientMode, ConnectionState, MessageSet, Package};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Peer {
    client: Client<TestMessage>,
    downloads: TempDir,
}

fn peer(mode: ClientMode) -> Peer {
    let downloads = TempDir::new().unwrap();
    let certificates = downloads.path().join("certificates");
    let client = Client::new(settings_for(mode, downloads.path(), &certificates)).unwrap();
    Peer { client, downloads }
}

#[test]
fn connect_and_disconnect() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);
    teardown(&a.client, &b.client);
}

#[test]
fn peer_disconnect_propagates() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);

    // Only one side hangs up; the other must notice via EOF.
    b.client.disconnect();
    assert!(wait_for(Duration::from_secs(3), || {
        a.client.state() == ConnectionState::Disconnected
            && b.client.state() == ConnectionState::Disconnected
    }));
}

#[test]
fn message_echo() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);

    let a_messages = Arc::new(Mutex::new(Vec::new()));
    {
        let a_messages = Arc::clone(&a_messages);
        a.client.add_handler(TestMessage::Message, move |mut package_in| {
            let body: String = package_in.package.read().unwrap();
            a_messages.lock().unwrap().push(body);
        });
    }
    a.client.add_handler(TestMessage::Echo, |mut package_in| {
        let body: String = package_in.package.read().unwrap();
        let reply = Package::new(TestMessage::Message.to_wire(), (body,)).unwrap();
        package_in.connection.send(reply);
    });

    let b_messages = Arc::new(Mutex::new(Vec::new()));
    {
        let b_messages = Arc::clone(&b_messages);
        b.client.add_handler(TestMessage::Message, move |mut package_in| {
            let body: String = package_in.package.read().unwrap();
            b_messages.lock().unwrap().push(body);
        });
    }

    establish(&a.client, &b.client);

    b.client
        .send(TestMessage::Message, ("message test".to_string(),))
        .unwrap();
    b.client
        .send(TestMessage::Echo, ("echo test".to_string(),))
        .unwrap();

    // A sees the direct message; B gets the echo reply. Each handler fires
    // exactly once per package.
    assert!(wait_for(Duration::from_secs(3), || {
        a_messages.lock().unwrap().len() == 1 && b_messages.lock().unwrap().len() == 1
    }));
    assert_eq!(*a_messages.lock().unwrap(), vec!["message test".to_string()]);
    assert_eq!(*b_messages.lock().unwrap(), vec!["echo test".to_string()]);

    teardown(&a.client, &b.client);
}

#[test]
fn messages_arrive_in_send_order() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);

    let received = Arc::new(Mutex::new(Vec::new()));
    {
        let received = Arc::clone(&received);
        a.client.add_handler(TestMessage::Message, move |mut package_in| {
            let sequence: u32 = package_in.package.read().unwrap();
            received.lock().unwrap().push(sequence);
        });
    }

    establish(&a.client, &b.client);

    const BURST: u32 = 200;
    for sequence in 0..BURST {
        b.client.send(TestMessage::Message, (sequence,)).unwrap();
    }

    assert!(wait_for(Duration::from_secs(3), || {
        received.lock().unwrap().len() == BURST as usize
    }));
    let received = received.lock().unwrap();
    assert_eq!(*received, (0..BURST).collect::<Vec<_>>());

    teardown(&a.client, &b.client);
}

#[test]
fn handlers_fire_once_per_package() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);

    let count = Arc::new(AtomicUsize::new(0));
    {
        let count = Arc::clone(&count);
        a.client.add_handler(TestMessage::Message, move |_| {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        });
    }

    establish(&a.client, &b.client);
    for _ in 0..50 {
        b.client.send(TestMessage::Message, ()).unwrap();
    }
    assert!(wait_for(Duration::from_secs(3), || {
        count.load(Ordering::SeqCst) == 50
    }));
    // Settle, then confirm nothing fired twice.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), 50);

    teardown(&a.client, &b.client);
}

#[test]
fn small_file_transfer() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);

    // The file lives on A (the responder); B requests it.
    let source = a.downloads.path().join("test.txt");
    fs::write(&source, vec![b'a'; 1024]).unwrap();

    b.client
        .request_file(source.to_str().unwrap(), "test_result.txt");

    let destination = b.downloads.path().join("test_result.txt");
    assert!(wait_for(Duration::from_secs(3), || {
        fs::metadata(&destination).map(|m| m.len()).ok() == Some(1024)
    }));
    assert_eq!(fs::read(&destination).unwrap(), vec![b'a'; 1024]);

    teardown(&a.client, &b.client);
}

#[test]
fn sequential_transfers_of_increasing_size() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);

    // 0 bytes, then powers of two up to 4 MiB; enough to cross the file
    // buffer size several times.
    let sizes: Vec<usize> = std::iter::once(0)
        .chain((0..=22).map(|power| 1usize << power))
        .collect();
    for size in sizes {
        let name = format!("blob_{size}");
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let source = a.downloads.path().join(&name);
        fs::write(&source, &payload).unwrap();

        let destination_name = format!("{name}.out");
        b.client
            .request_file(source.to_str().unwrap(), destination_name.clone());

        let destination = b.downloads.path().join(&destination_name);
        assert!(
            wait_for(Duration::from_secs(10), || {
                fs::metadata(&destination).map(|m| m.len() as usize).ok() == Some(size)
            }),
            "transfer of {size} bytes did not complete"
        );
        assert_eq!(fs::read(&destination).unwrap(), payload, "size {size}");
    }

    teardown(&a.client, &b.client);
}

#[test]
#[ignore = "transfers 2 GiB; run explicitly for performance work"]
fn two_gigabyte_transfer() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);

    let size: u64 = 1 << 31;
    let source = a.downloads.path().join("huge");
    {
        use std::io::Write as _;
        let file = fs::File::create(&source).unwrap();
        let mut writer = std::io::BufWriter::new(file);
        let chunk = vec![0x5au8; 1 << 20];
        for _ in 0..(size >> 20) {
            writer.write_all(&chunk).unwrap();
        }
    }

    b.client.request_file(source.to_str().unwrap(), "huge.out");
    let destination = b.downloads.path().join("huge.out");
    assert!(wait_for(Duration::from_secs(300), || {
        fs::metadata(&destination).map(|m| m.len()).ok() == Some(size)
    }));

    teardown(&a.client, &b.client);
}

#[test]
fn auto_named_transfer() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);

    let source = a.downloads.path().join("auto.bin");
    fs::write(&source, b"auto-named").unwrap();

    let name = b.client.request_file_auto(source.to_str().unwrap()).unwrap();
    let destination = b.downloads.path().join(&name);
    assert!(wait_for(Duration::from_secs(3), || destination.is_file()));
    assert_eq!(fs::read(&destination).unwrap(), b"auto-named");

    teardown(&a.client, &b.client);
}

#[test]
fn unknown_transfer_id_is_fatal() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);

    // A file-info frame for a transfer A never requested: a protocol error,
    // terminal for the connection.
    let bogus = Package::new(0, (999u64, 16u32))
        .unwrap()
        .with_flags(peerlink::PackageHeader::FLAG_FILE_RECEIVE_INFO);
    b.client.send_package(bogus);

    assert!(wait_for(Duration::from_secs(3), || {
        a.client.state() == ConnectionState::Disconnected
            && b.client.state() == ConnectionState::Disconnected
    }));
}

#[test]
fn malformed_file_info_is_dropped_not_fatal() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);

    let received = Arc::new(AtomicUsize::new(0));
    {
        let received = Arc::clone(&received);
        a.client.add_handler(TestMessage::Message, move |_| {
            let _ = received.fetch_add(1, Ordering::SeqCst);
        });
    }

    establish(&a.client, &b.client);

    // Empty body where (request_id, byte_count) is expected: the decode
    // overruns, the package is dropped, and the connection carries on.
    let malformed = Package::new(0, ())
        .unwrap()
        .with_flags(peerlink::PackageHeader::FLAG_FILE_RECEIVE_INFO);
    b.client.send_package(malformed);

    b.client.send(TestMessage::Message, ()).unwrap();
    assert!(wait_for(Duration::from_secs(3), || {
        received.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(a.client.state(), ConnectionState::Connected);

    teardown(&a.client, &b.client);
}

#[test]
fn request_for_missing_file_is_fatal() {
    let a = peer(ClientMode::Tcp);
    let b = peer(ClientMode::Tcp);
    establish(&a.client, &b.client);

    b.client
        .request_file("/definitely/not/a/real/file", "never.txt");

    // The responder treats a missing source as fatal and disconnects; the
    // requester observes the close.
    assert!(wait_for(Duration::from_secs(3), || {
        a.client.state() == ConnectionState::Disconnected
            && b.client.state() == ConnectionState::Disconnected
    }));
    assert!(!b.downloads.path().join("never.txt").exists());
}
