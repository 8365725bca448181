use hand_tracker::config::TrackingConfig;
use futures::SinkExt;
use hand_tracker::hand::synthetic::{open_hand, translate, with_pinch_distance};
use hand_tracker::hand::{Finger, Landmark};
use hand_tracker::pipeline::{Frame, HandEvent, HandObservation, HandReport, HandTracker};
use hand_tracker::protocol::{self, ClientMessage, MessageStream, ServerMessage};
use hand_tracker::server;
use hand_tracker::tracker::{FingerState, PinchState};
use hand_tracker::worker::TrackingWorker;
use tokio::net::{TcpListener, TcpStream};

fn frame(timestamp_ms: f64, landmarks: Vec<Landmark>) -> Frame {
    Frame {
        timestamp_ms,
        hands: vec![HandObservation { slot: 0, landmarks }],
    }
}

#[test]
fn constant_pose_is_passed_through_and_settles() {
    let mut tracker = HandTracker::new(TrackingConfig::default()).unwrap();
    let hand = open_hand();

    let reports: Vec<HandReport> = (0..30)
        .map(|i| {
            let report = tracker.process(&frame(i as f64 * 30.0, hand.clone()));
            report.hand(0).unwrap().clone()
        })
        .collect();

    for report in &reports[3..] {
        assert_eq!(report.landmarks, hand);
    }

    let final_states: Vec<FingerState> =
        Finger::ALL.iter().map(|&f| reports[29].finger(f).current).collect();
    assert!(final_states.iter().all(|&s| s == FingerState::Straight));

    // 一度確定したら最後まで変わらない
    let first_settled = reports
        .iter()
        .position(|r| Finger::ALL.iter().all(|&f| r.finger(f).current == FingerState::Straight))
        .unwrap();
    for report in &reports[first_settled..] {
        for (i, &finger) in Finger::ALL.iter().enumerate() {
            assert_eq!(report.finger(finger).current, final_states[i]);
        }
    }
    let changes: usize = reports.iter().map(|r| r.events.len()).sum();
    assert_eq!(changes, Finger::COUNT);
}

fn pinch_script() -> Vec<f32> {
    let mut script: Vec<f32> = (0..10).map(|i| 0.20 - 0.17 * i as f32 / 9.0).collect();
    script.extend([0.03; 3]);
    script.extend([0.06; 5]);
    script.extend([0.08; 3]);
    script
}

async fn next_report(framed: &mut MessageStream) -> HandReport {
    loop {
        match protocol::recv_message::<ServerMessage>(framed).await.unwrap() {
            ServerMessage::Report(report) => return report.hand(0).unwrap().clone(),
            ServerMessage::SettingRejected { reason, .. } => panic!("rejected: {}", reason),
            _ => {}
        }
    }
}

async fn set(framed: &mut MessageStream, section: &str, key: &str, value: &str) {
    let msg = ClientMessage::Setting {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    };
    protocol::send_message(framed, &msg).await.unwrap();
    match protocol::recv_message::<ServerMessage>(framed).await.unwrap() {
        ServerMessage::SettingAccepted { section: s, key: k } => {
            assert_eq!((s.as_str(), k.as_str()), (section, key));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pinch_over_tcp() {
    let tracker = HandTracker::new(TrackingConfig::default()).unwrap();
    let (out_tx, out_rx) = tokio::sync::mpsc::channel(32);
    let worker = TrackingWorker::start(tracker, out_tx, 8).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = worker.handle();
    tokio::spawn(async move { server::serve(listener, handle, out_rx).await });

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = protocol::message_stream(stream);
    assert!(matches!(
        protocol::recv_message::<ServerMessage>(&mut framed).await.unwrap(),
        ServerMessage::Ready { .. }
    ));

    // 平滑化の遅れでフレーム数がずれないようにする
    set(&mut framed, "filter", "min_cutoff", "1000000").await;
    set(&mut framed, "filter", "beta", "0").await;
    // 親指先端だけを動かすので親指の屈曲イベントは見ない
    set(&mut framed, "fingers", "thumb", "false").await;

    let script = pinch_script();
    let mut reports = Vec::new();
    for (i, &d) in script.iter().enumerate() {
        let landmarks = with_pinch_distance(open_hand(), d);
        let msg = ClientMessage::Frame(frame(i as f64 * 33.0, landmarks));
        protocol::send_message(&mut framed, &msg).await.unwrap();
        reports.push(next_report(&mut framed).await);
    }

    let states: Vec<PinchState> = reports.iter().map(|r| r.pinch.current).collect();
    // 0.05 未満の3フレーム目（index 10）で pinching、0.07 超の3フレーム目で解除
    assert_eq!(states.len(), 21);
    assert!(states[..10].iter().all(|&s| s == PinchState::Inactive));
    assert!(states[10..20].iter().all(|&s| s == PinchState::Pinching));
    assert_eq!(states[20], PinchState::Inactive);
    assert_eq!(reports[10].events, vec![HandEvent::PinchStarted]);
    assert_eq!(reports[20].events, vec![HandEvent::PinchEnded]);
    assert_eq!(reports[19].pinch.stable_frame_count, 2);

    for r in &reports[13..18] {
        let d = r.pinch_distance.unwrap();
        assert!((d - 0.06).abs() < 1e-3);
        assert_eq!(r.pinch.pending, None);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_client_starts_fresh() {
    let tracker = HandTracker::new(TrackingConfig::default()).unwrap();
    let (out_tx, out_rx) = tokio::sync::mpsc::channel(32);
    let worker = TrackingWorker::start(tracker, out_tx, 8).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, worker.handle(), out_rx));

    let pinched = with_pinch_distance(open_hand(), 0.01);
    {
        let mut framed = protocol::message_stream(TcpStream::connect(addr).await.unwrap());
        protocol::recv_message::<ServerMessage>(&mut framed).await.unwrap();
        let mut last = None;
        for i in 0..5 {
            let msg = ClientMessage::Frame(frame(i as f64 * 33.0, pinched.clone()));
            protocol::send_message(&mut framed, &msg).await.unwrap();
            last = Some(next_report(&mut framed).await);
        }
        assert_eq!(last.unwrap().pinch.current, PinchState::Pinching);
    }

    let mut framed = protocol::message_stream(TcpStream::connect(addr).await.unwrap());
    protocol::recv_message::<ServerMessage>(&mut framed).await.unwrap();

    let msg = ClientMessage::Frame(frame(0.0, open_hand()));
    protocol::send_message(&mut framed, &msg).await.unwrap();
    let report = next_report(&mut framed).await;
    assert_eq!(report.pinch.current, PinchState::Inactive);
    assert!(report.full_frame);
    assert_eq!(report.landmarks, open_hand());
}

/// Writes all messages with a single flush so the server reads them together.
async fn send_together(framed: &mut MessageStream, messages: &[ClientMessage]) {
    for msg in messages {
        framed.feed(protocol::encode(msg).unwrap()).await.unwrap();
    }
    SinkExt::<bytes::Bytes>::flush(framed).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_slot_lands_before_next_frame() {
    let tracker = HandTracker::new(TrackingConfig::default()).unwrap();
    let (out_tx, out_rx) = tokio::sync::mpsc::channel(32);
    let worker = TrackingWorker::start(tracker, out_tx, 8).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, worker.handle(), out_rx));

    let mut framed = protocol::message_stream(TcpStream::connect(addr).await.unwrap());
    protocol::recv_message::<ServerMessage>(&mut framed).await.unwrap();

    let pinched = with_pinch_distance(open_hand(), 0.01);
    let other_hand = translate(&open_hand(), 0.2, 0.0);
    let mut t = 0.0;
    for _ in 0..20 {
        send_together(
            &mut framed,
            &[
                ClientMessage::ResetSlot { slot: 0 },
                ClientMessage::Frame(frame(t, pinched.clone())),
            ],
        )
        .await;
        let mut last = next_report(&mut framed).await;
        for _ in 0..4 {
            t += 33.0;
            let msg = ClientMessage::Frame(frame(t, pinched.clone()));
            protocol::send_message(&mut framed, &msg).await.unwrap();
            last = next_report(&mut framed).await;
        }
        assert_eq!(last.pinch.current, PinchState::Pinching);

        // 別の手に入れ替わったフレームは前の手の状態を引き継がない
        t += 33.0;
        send_together(
            &mut framed,
            &[
                ClientMessage::ResetSlot { slot: 0 },
                ClientMessage::Frame(frame(t, other_hand.clone())),
            ],
        )
        .await;
        let report = next_report(&mut framed).await;
        assert_eq!(report.landmarks, other_hand);
        assert_eq!(report.pinch.current, PinchState::Inactive);
        assert!(report.full_frame);
        t += 33.0;
    }
}
