//! Minimal VahanaIO viewer for checking a running server
//!
//! Starts streaming over the command channel, reads frames from the video
//! channel and reports their size and rate. Frames can be saved as JPEG
//! files for inspection.
//!
//! ```text
//! video-probe --host 192.168.1.20 --frames 100 --save ./frames
//! ```

use clap::Parser;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use vahana_io::streaming::wire::{DEFAULT_MAX_FRAME_LEN, read_frame};
use vahana_io::{Error, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 5000)]
    command_port: u16,

    #[arg(long, default_value_t = 8000)]
    video_port: u16,

    /// Number of frames to read before exiting
    #[arg(short, long, default_value_t = 30)]
    frames: u64,

    /// Directory to write received frames to
    #[arg(short, long)]
    save: Option<PathBuf>,

    /// Leave streaming running on exit
    #[arg(long)]
    keep_streaming: bool,
}

/// Send one command and wait for its reply
fn request(stream: &mut TcpStream, command: &str) -> Result<String> {
    stream.write_all(command.as_bytes())?;
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf)?;
    if n == 0 {
        return Err(Error::Other("Command channel closed".to_string()));
    }
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(dir) = &args.save {
        fs::create_dir_all(dir)?;
    }

    let mut command = TcpStream::connect((args.host.as_str(), args.command_port))?;
    command.set_read_timeout(Some(Duration::from_secs(5)))?;
    log::info!("STREAM#START -> {}", request(&mut command, "STREAM#START")?);

    let mut video = TcpStream::connect((args.host.as_str(), args.video_port))?;
    video.set_read_timeout(Some(Duration::from_secs(5)))?;

    let started = Instant::now();
    let mut bytes = 0usize;
    for index in 0..args.frames {
        let frame = read_frame(&mut video, DEFAULT_MAX_FRAME_LEN)?;
        bytes += frame.len();
        log::debug!("Frame {}: {} bytes", index, frame.len());

        if let Some(dir) = &args.save {
            fs::write(dir.join(format!("frame_{:05}.jpg", index)), &frame)?;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    log::info!(
        "Received {} frames ({} bytes) in {:.2}s, {:.1} fps",
        args.frames,
        bytes,
        elapsed,
        args.frames as f64 / elapsed.max(f64::EPSILON)
    );

    log::info!("STATUS -> {}", request(&mut command, "STATUS")?);
    if !args.keep_streaming {
        log::info!("STREAM#STOP -> {}", request(&mut command, "STREAM#STOP")?);
    }
    Ok(())
}
