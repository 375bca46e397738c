//! End-to-end tests against a server bound to loopback.

mod common;

use common::*;
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};
use vahana_io::core::types::WheelSpeeds;
use vahana_io::streaming::wire::{DEFAULT_MAX_FRAME_LEN, read_frame};

#[test]
fn test_motor_command_over_the_wire() {
    let t = start_server();
    let mut client = connect(t.server.command_addr());

    assert_eq!(request(&mut client, "MOTOR#100#-200#300#-400"), "OK#MOTOR");
    assert_eq!(
        request(&mut client, "motor#1#2#3"),
        "ERROR#Invalid motor command format. Expected 4 speed values."
    );
    assert_eq!(request(&mut client, "STOP"), "OK#STOP");

    assert_eq!(
        t.motor.commands(),
        vec![WheelSpeeds::new(100, -200, 300, -400), WheelSpeeds::STOP]
    );
}

#[test]
fn test_unknown_command_over_the_wire() {
    let t = start_server();
    let mut client = connect(t.server.command_addr());
    assert_eq!(request(&mut client, "FOO"), "ERROR#Unknown command: FOO");
}

#[test]
fn test_status_reports_connected_command_client() {
    let t = start_server();
    let mut client = connect(t.server.command_addr());

    let response = request(&mut client, "STATUS");
    let json: serde_json::Value =
        serde_json::from_str(response.strip_prefix("STATUS#").unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "running": true,
            "streaming": false,
            "video_clients": false,
            "command_clients": true,
        })
    );
}

#[test]
fn test_second_command_client_is_rejected() {
    let t = start_server();
    let ctx = t.server.context();

    let mut first = connect(t.server.command_addr());
    assert!(wait_until(IO_TIMEOUT, || ctx.command_clients().len() == 1));

    let mut second = connect(t.server.command_addr());
    assert_closed_without_data(&mut second);

    // The first session is undisturbed
    assert_eq!(request(&mut first, "STOP"), "OK#STOP");
    assert_eq!(ctx.command_clients().len(), 1);
}

#[test]
fn test_second_video_client_is_rejected() {
    let t = start_server();
    let ctx = t.server.context();

    let _first = connect(t.server.video_addr());
    assert!(wait_until(IO_TIMEOUT, || ctx.video_clients().len() == 1));

    let mut second = connect(t.server.video_addr());
    assert_closed_without_data(&mut second);
    assert_eq!(ctx.video_clients().len(), 1);
}

#[test]
fn test_disconnect_frees_command_slot() {
    let t = start_server();
    let ctx = t.server.context();

    let first = connect(t.server.command_addr());
    assert!(wait_until(IO_TIMEOUT, || ctx.command_clients().len() == 1));
    drop(first);
    assert!(wait_until(IO_TIMEOUT, || ctx.command_clients().is_empty()));

    let mut second = connect(t.server.command_addr());
    assert_eq!(request(&mut second, "STOP"), "OK#STOP");
}

#[test]
fn test_stream_start_twice_starts_camera_once() {
    let t = start_server();
    let mut client = connect(t.server.command_addr());

    assert_eq!(request(&mut client, "STREAM#START"), "OK#STREAM#STARTED");
    assert_eq!(
        request(&mut client, "STREAM#START"),
        "OK#STREAM#ALREADY_RUNNING"
    );
    assert_eq!(t.camera.start_count(), 1);

    assert_eq!(request(&mut client, "STREAM#STOP"), "OK#STREAM#STOPPED");
    assert_eq!(request(&mut client, "STREAM#STOP"), "OK#STREAM#NOT_RUNNING");
    assert!(!t.camera.is_streaming());
}

#[test]
fn test_video_frames_are_length_prefixed() {
    let t = start_server();
    let mut client = connect(t.server.command_addr());
    let mut video = connect(t.server.video_addr());

    assert_eq!(request(&mut client, "STREAM#START"), "OK#STREAM#STARTED");

    let mut last_seq = 0u64;
    for _ in 0..5 {
        let frame = read_frame(&mut video, DEFAULT_MAX_FRAME_LEN).unwrap();
        // SOI, sequence number, 32*32/64 body bytes, EOI
        assert_eq!(frame.len(), 2 + 8 + 16 + 2);
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
        assert_eq!(&frame[frame.len() - 2..], &[0xFF, 0xD9]);

        let seq = u64::from_le_bytes(frame[2..10].try_into().unwrap());
        assert!(seq > last_seq, "frame {} after {}", seq, last_seq);
        last_seq = seq;
    }

    let status = request(&mut client, "STATUS");
    assert!(status.contains("\"streaming\":true"), "{}", status);
    assert!(status.contains("\"video_clients\":true"), "{}", status);
}

#[test]
fn test_departed_viewer_is_replaced() {
    let t = start_server();
    let ctx = t.server.context();
    let mut client = connect(t.server.command_addr());
    assert_eq!(request(&mut client, "STREAM#START"), "OK#STREAM#STARTED");

    let mut first = connect(t.server.video_addr());
    read_frame(&mut first, DEFAULT_MAX_FRAME_LEN).unwrap();
    drop(first);

    assert!(wait_until(IO_TIMEOUT, || ctx.video_clients().is_empty()));
    let mut second = connect(t.server.video_addr());
    assert!(read_frame(&mut second, DEFAULT_MAX_FRAME_LEN).is_ok());
}

#[test]
fn test_shutdown_unblocks_client_sessions() {
    let mut t = start_server();
    let ctx = std::sync::Arc::clone(t.server.context());

    let mut command = connect(t.server.command_addr());
    let mut video = connect(t.server.video_addr());
    assert!(wait_until(IO_TIMEOUT, || {
        ctx.command_clients().len() == 1 && ctx.video_clients().len() == 1
    }));
    assert_eq!(request(&mut command, "STREAM#START"), "OK#STREAM#STARTED");

    // Server-side reader is blocked waiting for the next command
    let reader = thread::spawn(move || {
        let mut buf = [0u8; 16];
        command.read(&mut buf).unwrap_or(0)
    });

    let started = Instant::now();
    t.server.shutdown();
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(reader.join().unwrap(), 0);
    assert!(!ctx.is_running());
    assert!(!ctx.is_streaming());
    assert!(ctx.command_clients().is_empty());
    assert!(ctx.video_clients().is_empty());
    assert!(!t.camera.is_streaming());
    assert_eq!(t.motor.commands().last(), Some(&WheelSpeeds::STOP));

    // Drain whatever frames were in flight, then EOF
    video.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    let mut sink = Vec::new();
    assert!(video.read_to_end(&mut sink).is_ok());
}
