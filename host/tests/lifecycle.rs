//! End-to-end host lifecycle: spawn, handshake, replay, resume, resize, and exit (§6).

mod common;

use std::time::Duration;

use common::*;

#[test]
fn fresh_attach_replays_output_then_exits() {
    let host = spawn_host("/bin/echo", &["hi"]).expect("spawn host");
    let mut client = connect(&host.socket_path).expect("connect");

    std::thread::sleep(Duration::from_millis(150));

    let replay = client.wait_for(TAG_BUFFER_REPLAY, Duration::from_secs(2)).expect("buffer replay");
    assert!(String::from_utf8_lossy(&replay.data).contains("hi"));

    let sync = client.wait_for(TAG_SYNC, Duration::from_secs(2)).expect("sync");
    assert_eq!(sync.data.len(), 8);

    let exit = client.wait_for(TAG_EXIT, Duration::from_secs(2)).expect("exit");
    assert_eq!(exit.data, 0i32.to_be_bytes());
}

#[test]
fn handshake_order_is_replay_then_sync_before_anything_else() {
    let host = spawn_host("/bin/echo", &["order-check"]).expect("spawn host");
    let mut client = connect(&host.socket_path).expect("connect");
    std::thread::sleep(Duration::from_millis(150));

    let frames = client.collect_for(Duration::from_secs(2));
    assert!(!frames.is_empty());
    assert_eq!(frames[0].tag, TAG_BUFFER_REPLAY);
    assert_eq!(frames[1].tag, TAG_SYNC);
}

#[test]
fn resume_at_current_offset_yields_empty_replay() {
    let host = spawn_host("/bin/echo", &["resume-test"]).expect("spawn host");

    let mut first = connect(&host.socket_path).expect("connect first");
    std::thread::sleep(Duration::from_millis(150));
    let sync = first.wait_for(TAG_SYNC, Duration::from_secs(2)).expect("sync");
    let mut offset_bytes = [0u8; 8];
    offset_bytes.copy_from_slice(&sync.data);
    let total_written = f64::from_be_bytes(offset_bytes);

    let mut second = connect(&host.socket_path).expect("connect second");
    second.send_resume(total_written).expect("send resume");

    let replay = second.wait_for(TAG_BUFFER_REPLAY, Duration::from_secs(2)).expect("buffer replay");
    assert!(replay.data.is_empty());
}

#[test]
fn resize_is_honored() {
    let host = spawn_host("/bin/cat", &[]).expect("spawn host");
    let mut client = connect(&host.socket_path).expect("connect");
    std::thread::sleep(Duration::from_millis(150));
    client.collect_for(Duration::from_millis(300));

    client.send_resize(120, 40).expect("send resize");
    std::thread::sleep(Duration::from_millis(300));

    let json = read_session_json(&host.session_path).expect("read session json");
    assert_eq!(json["cols"], 120);
    assert_eq!(json["rows"], 40);
}

#[test]
fn echoed_input_is_observed_in_data_frames() {
    let host = spawn_host("/bin/cat", &[]).expect("spawn host");
    let mut client = connect(&host.socket_path).expect("connect");
    std::thread::sleep(Duration::from_millis(150));
    client.collect_for(Duration::from_millis(200));

    client.send_data(b"hello\n").expect("send data");

    let frames = client.collect_for(Duration::from_secs(2));
    let joined: Vec<u8> = frames
        .iter()
        .filter(|f| f.tag == TAG_DATA)
        .flat_map(|f| f.data.clone())
        .collect();
    assert!(String::from_utf8_lossy(&joined).contains("hello"));
}

#[test]
fn nonexistent_command_records_spawn_failure() {
    let session_path = spawn_host_expecting_no_socket("/no/such/binary-xyz");
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(json) = read_session_json(&session_path) {
            assert_eq!(json["status"], "exited");
            assert_eq!(json["exitCode"], 127);
            return;
        }
        if std::time::Instant::now() > deadline {
            panic!("spawn-failure metadata never appeared");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
