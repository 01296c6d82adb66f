//! Detector behaviour over arbitrary chunkings
//!
//! These tests drive a real pipeline the way the connection handler does:
//! a detector at the head, recording configurator behind it.

use std::sync::Arc;

use bytes::Bytes;

use stomp_http_gateway::pipeline::{Pipeline, RecordingConfigurator};
use stomp_http_gateway::protocol::{DetectorState, ProtocolDetector, ProtocolTag};
use stomp_http_gateway::GatewayError;

const SESSIONS: &[(&[u8], ProtocolTag)] = &[
    (b"CONNECT\naccept-version:1.2\nhost:broker\n\n\0", ProtocolTag::Stomp),
    (b"STOMP\r\nlogin:guest\r\n\r\n\0SEND\ndestination:/q\n\nhi\0", ProtocolTag::Stomp),
    (b"GET /index.html HTTP/1.1\r\nHost: example\r\n\r\n", ProtocolTag::HttpFamily),
    (
        b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n\x81\x05hello",
        ProtocolTag::HttpFamily,
    ),
    (b"\nCONNECT\n", ProtocolTag::HttpFamily),
];

fn detector_pipeline(recorder: &Arc<RecordingConfigurator>) -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline.add_last(ProtocolDetector::new(recorder.clone()));
    pipeline
}

fn delivered(recorder: &RecordingConfigurator, tag: ProtocolTag) -> Bytes {
    match tag {
        ProtocolTag::Stomp => recorder.stomp().bytes(),
        _ => recorder.http().bytes(),
    }
}

fn run(session: &[u8], cuts: &[usize]) -> Arc<RecordingConfigurator> {
    let recorder = Arc::new(RecordingConfigurator::new());
    let mut pipeline = detector_pipeline(&recorder);

    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&session.len())) {
        if cut > start {
            pipeline.fire_read(Bytes::copy_from_slice(&session[start..cut])).unwrap();
            start = cut;
        }
    }

    recorder
}

/// Small deterministic generator so chunkings are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound.max(1)
    }
}

#[test]
fn test_every_two_way_split_conserves_bytes() {
    for &(session, tag) in SESSIONS {
        for cut in 0..=session.len() {
            let recorder = run(session, &[cut]);

            assert_eq!(recorder.total_calls(), 1, "cut at {}", cut);
            assert_eq!(delivered(&recorder, tag), Bytes::copy_from_slice(session), "cut at {}", cut);
        }
    }
}

#[test]
fn test_random_chunkings_conserve_bytes() {
    let mut rng = Lcg(0x5eed);

    for &(session, tag) in SESSIONS {
        for _ in 0..200 {
            let mut cuts: Vec<usize> = (0..rng.next(8)).map(|_| rng.next(session.len() + 1)).collect();
            cuts.sort_unstable();

            let recorder = run(session, &cuts);

            assert_eq!(recorder.total_calls(), 1, "cuts {:?}", cuts);
            assert_eq!(delivered(&recorder, tag), Bytes::copy_from_slice(session), "cuts {:?}", cuts);
        }
    }
}

#[test]
fn test_one_byte_at_a_time_triggers_after_terminator() {
    let session = b"CONNECT\nhost:x\n\n\0";
    let recorder = Arc::new(RecordingConfigurator::new());
    let mut pipeline = detector_pipeline(&recorder);

    for (i, byte) in session.iter().enumerate() {
        pipeline.fire_read(Bytes::copy_from_slice(&[*byte])).unwrap();
        let expected = if i >= 7 { 1 } else { 0 };
        assert_eq!(recorder.stomp_calls(), expected, "after byte {}", i);
    }

    assert_eq!(recorder.http_calls(), 0);
    assert_eq!(recorder.stomp().bytes(), Bytes::from_static(session));
}

#[test]
fn test_detector_leaves_the_pipeline() {
    let recorder = Arc::new(RecordingConfigurator::new());
    let mut pipeline = detector_pipeline(&recorder);

    pipeline.fire_read(Bytes::from_static(b"POST /submit HTTP/1.1\r\n")).unwrap();

    assert_eq!(pipeline.names(), vec![RecordingConfigurator::HTTP_STAGE]);

    // A second line that looks like STOMP changes nothing.
    pipeline.fire_read(Bytes::from_static(b"CONNECT\n")).unwrap();
    assert_eq!(recorder.total_calls(), 1);
    assert_eq!(recorder.http().chunks().len(), 2);
    assert_eq!(recorder.http().chunks()[1], Bytes::from_static(b"CONNECT\n"));
}

#[test]
fn test_overlong_first_line_closes_pipeline() {
    let recorder = Arc::new(RecordingConfigurator::new());
    let mut pipeline = Pipeline::new();
    pipeline.add_last(ProtocolDetector::new(recorder.clone()).with_max_line_length(16));

    pipeline.fire_read(Bytes::from_static(b"GET /aaaaaaa")).unwrap();
    let err = pipeline.fire_read(Bytes::from_static(b"aaaaaaaaaaaaa")).unwrap_err();

    assert!(matches!(err, GatewayError::LineTooLong { limit: 16, .. }));
    assert!(pipeline.is_closed());
    assert_eq!(recorder.total_calls(), 0);
    assert!(matches!(pipeline.fire_read(Bytes::from_static(b"\n")), Err(GatewayError::Closed)));
}

#[test]
fn test_closing_before_a_line_discards_detector() {
    let recorder = Arc::new(RecordingConfigurator::new());
    let mut pipeline = detector_pipeline(&recorder);

    pipeline.fire_read(Bytes::from_static(b"CONN")).unwrap();
    pipeline.close();

    assert_eq!(recorder.total_calls(), 0);
    assert!(pipeline.is_empty());
}

#[test]
fn test_detector_state_is_observable_before_install() {
    let recorder = Arc::new(RecordingConfigurator::new());
    let detector = ProtocolDetector::new(recorder);

    assert_eq!(detector.state(), DetectorState::AwaitingLine);
    assert!(detector.decision().is_none());
}
