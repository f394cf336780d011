//! Encrypted file transfer and receiver-side validation limits.

use meshchat_core::{MessageKind, SessionConfig, UiUpdate};
use meshchat_harness::{InvariantRegistry, SimNetwork};
use meshchat_proto::ChannelId;

const CEILING: usize = 1024;

fn config(max_file_size: usize) -> SessionConfig {
    SessionConfig { max_file_size, ..SessionConfig::default() }
}

/// Sender in tab 0 with `sender_ceiling`, receiver in tab 1 with [`CEILING`].
fn pair(seed: u64, sender_ceiling: usize) -> SimNetwork {
    let mut net = SimNetwork::new(seed).with_invariants(InvariantRegistry::standard());
    let sender = net.open_tab_with(config(sender_ceiling));
    let receiver = net.open_tab_with(config(CEILING));
    let channel = ChannelId::parse("pale-root-mild-cove").expect("valid word code");

    net.create(sender, "Quiet Heron", &channel).expect("create");
    net.join(receiver, "Amber Fox", &channel).expect("join");
    net
}

fn received_files(net: &SimNetwork, tab: usize) -> Vec<(String, usize, bool)> {
    net.ui(tab)
        .iter()
        .filter_map(|update| match update {
            UiUpdate::AppendFile(file) => {
                Some((file.file_name.clone(), file.data.len(), file.unverified))
            },
            _ => None,
        })
        .collect()
}

#[test]
fn file_at_ceiling_is_delivered() {
    let mut net = pair(1, CEILING);
    net.send_file(0, "notes.txt", "text/plain", vec![b'x'; CEILING]).expect("send");

    assert_eq!(received_files(&net, 1), vec![("notes.txt".to_string(), CEILING, false)]);
    assert!(net.lines(0, MessageKind::System).contains(&"Sent notes.txt (1024 bytes)"));
}

#[test]
fn content_survives_transfer() {
    let mut net = pair(2, CEILING);
    let data: Vec<u8> = (0..=255u8).cycle().take(700).collect();
    net.send_file(0, "blob.bin", "application/octet-stream", data.clone()).expect("send");

    let file = net
        .ui(1)
        .iter()
        .find_map(|update| match update {
            UiUpdate::AppendFile(file) => Some(file.clone()),
            _ => None,
        })
        .expect("file delivered");
    assert_eq!(file.data, data);
    assert_eq!(file.mime_type, "application/octet-stream");
    assert_eq!(file.sender, "Quiet Heron");
}

#[test]
fn sender_refuses_oversized_file() {
    let mut net = pair(3, CEILING);
    let sent_before = net.sent().len();
    net.send_file(0, "big.bin", "application/octet-stream", vec![0; CEILING + 1])
        .expect("intent ok");

    assert_eq!(net.sent().len(), sent_before, "nothing may leave the sender");
    assert!(net.lines(0, MessageKind::Error).iter().any(|line| line.starts_with("File not sent")));
    assert!(received_files(&net, 1).is_empty());
}

#[test]
fn receiver_rejects_one_byte_over_its_ceiling() {
    let mut net = pair(4, 2 * CEILING);
    net.send_file(0, "big.bin", "application/octet-stream", vec![0; CEILING + 1]).expect("send");

    assert!(received_files(&net, 1).is_empty());
    let errors = net.lines(1, MessageKind::Error);
    assert!(
        errors.iter().any(|line| {
            line.starts_with("File from Quiet Heron rejected") && line.contains("1025 bytes")
        }),
        "expected a size rejection"
    );
}

#[test]
fn receiver_rejects_empty_file_name() {
    let mut net = pair(5, CEILING);
    net.send_file(0, "", "text/plain", b"data".to_vec()).expect("send");

    assert!(received_files(&net, 1).is_empty());
    let errors = net.lines(1, MessageKind::Error);
    assert!(errors.iter().any(|line| line.contains("file name is empty")));
}

#[test]
fn receiver_rejects_empty_content() {
    let mut net = pair(6, CEILING);
    net.send_file(0, "empty.txt", "text/plain", Vec::new()).expect("send");

    assert!(received_files(&net, 1).is_empty());
    let errors = net.lines(1, MessageKind::Error);
    assert!(errors.iter().any(|line| line.contains("file data is empty")));
}
