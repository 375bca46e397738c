//! Shared helpers for the loopback server tests.

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use vahana_io::devices::mock::{CameraProbe, MockCamera, MockMotor, MotorProbe};
use vahana_io::motion::MotorController;
use vahana_io::{Config, Server};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub server: Server,
    pub motor: MotorProbe,
    pub camera: CameraProbe,
}

/// Config bound to loopback on ephemeral ports with a short read timeout
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.network.bind_address = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
    config.network.command_port = 0;
    config.network.video_port = 0;
    config.network.read_timeout_secs = 3;
    config.camera.width = 32;
    config.camera.height = 32;
    config.camera.fps = 60;
    config
}

pub fn start_server() -> TestServer {
    let config = test_config();
    let camera = MockCamera::new(config.camera.width, config.camera.height, config.camera.fps);
    let camera_probe = camera.probe();
    let motor = MockMotor::new();
    let motor_probe = motor.probe();

    let mut server = Server::bind(
        &config,
        Box::new(camera),
        MotorController::new(Box::new(motor)),
    )
    .unwrap();
    server.start().unwrap();

    TestServer {
        server,
        motor: motor_probe,
        camera: camera_probe,
    }
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    stream
}

/// Send one command and read its reply
pub fn request(stream: &mut TcpStream, command: &str) -> String {
    stream.write_all(command.as_bytes()).unwrap();
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// The server closed this connection without ever sending data
pub fn assert_closed_without_data(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("rejected connection received {} bytes", n),
        Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
        Err(e) => panic!("expected close, got {}", e),
    }
}
