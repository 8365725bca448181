//! Sends a synthetic pinch gesture to a running hand-tracker and prints
//! what comes back.
//!
//! Behaves like a detector driver: each frame's landmarks are "detected"
//! inside the crop the server asked for and mapped back to the full frame.
//!
//!   landmark_sender [addr]

use anyhow::{bail, Result};
use tokio::net::TcpStream;

use hand_tracker::hand::synthetic::{open_hand, with_pinch_distance};
use hand_tracker::hand::Landmark;
use hand_tracker::pipeline::{Frame, HandObservation, HandReport};
use hand_tracker::protocol::{self, ClientMessage, MessageStream, ServerMessage};
use hand_tracker::tracker::{remap_landmarks, CropRegion};

const DEFAULT_ADDR: &str = "127.0.0.1:9100";
const FRAME_INTERVAL_MS: f64 = 33.0;

/// thumb-index distance per frame: approach, hold, relax into the band, release
fn pinch_script() -> Vec<f32> {
    let mut script: Vec<f32> = (0..10).map(|i| 0.20 - 0.17 * i as f32 / 9.0).collect();
    script.extend(std::iter::repeat(0.03).take(5));
    script.extend(std::iter::repeat(0.06).take(5));
    script.extend(std::iter::repeat(0.08).take(5));
    script
}

/// Full-frame landmarks as a detector would report them inside `crop`
fn detect_in_crop(landmarks: &[Landmark], crop: &CropRegion) -> Vec<Landmark> {
    landmarks
        .iter()
        .map(|lm| Landmark {
            x: (lm.x - crop.x) / crop.width,
            y: (lm.y - crop.y) / crop.height,
            z: lm.z / crop.width,
        })
        .collect()
}

fn next_crop(hand: &HandReport) -> CropRegion {
    match hand.roi {
        Some(roi) if !hand.full_frame => {
            let crop = roi.to_crop_region();
            if crop.width > 0.0 && crop.height > 0.0 {
                crop
            } else {
                CropRegion::full()
            }
        }
        _ => CropRegion::full(),
    }
}

async fn wait_report(framed: &mut MessageStream) -> Result<HandReport> {
    loop {
        match protocol::recv_message::<ServerMessage>(framed).await? {
            ServerMessage::Report(report) => match report.hand(0) {
                Some(hand) => return Ok(hand.clone()),
                None => bail!("report without slot 0"),
            },
            ServerMessage::SettingAccepted { section, key } => {
                println!("setting accepted: {}.{}", section, key);
            }
            ServerMessage::SettingRejected { section, key, reason } => {
                println!("setting rejected: {}.{} ({})", section, key, reason);
            }
            ServerMessage::Ready { version } => println!("server ready ({})", version),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    let mut framed = protocol::message_stream(stream);
    println!("Connected to {}", addr);

    match protocol::recv_message::<ServerMessage>(&mut framed).await? {
        ServerMessage::Ready { version } => println!("server ready ({})", version),
        other => bail!("expected Ready, got {:?}", other),
    }

    protocol::send_message(&mut framed, &ClientMessage::ResetSlot { slot: 0 }).await?;

    println!();
    println!(
        "{:>5} {:>8} {:>8} {:>10} {:>6}  {}",
        "frame", "input", "dist", "pinch", "count", "crop"
    );
    let mut crop = CropRegion::full();
    for (i, distance) in pinch_script().into_iter().enumerate() {
        let hand = with_pinch_distance(open_hand(), distance);
        let detected = detect_in_crop(&hand, &crop);
        let frame = Frame {
            timestamp_ms: i as f64 * FRAME_INTERVAL_MS,
            hands: vec![HandObservation {
                slot: 0,
                landmarks: remap_landmarks(&detected, &crop),
            }],
        };
        let crop_label = if crop.is_full() {
            "full".to_string()
        } else {
            format!("{:.2},{:.2} {:.2}x{:.2}", crop.x, crop.y, crop.width, crop.height)
        };
        protocol::send_message(&mut framed, &ClientMessage::Frame(frame)).await?;
        let hand = wait_report(&mut framed).await?;

        let measured = hand
            .pinch_distance
            .map(|d| format!("{:.3}", d))
            .unwrap_or_else(|| "-".to_string());
        let marker = if hand.pinch.changed() { " *" } else { "" };
        println!(
            "{:>5} {:>8.3} {:>8} {:>10} {:>6}  {}{}",
            i,
            distance,
            measured,
            hand.pinch.current.as_str(),
            hand.pinch.stable_frame_count,
            crop_label,
            marker
        );
        crop = next_crop(&hand);
    }

    Ok(())
}
