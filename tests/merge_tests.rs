//! Integration tests for the merge engine

use std::fs;

use tempfile::TempDir;

use avmerge_cli::engine::compat::{classify, Compatibility};
use avmerge_cli::engine::MergePhase;
use avmerge_cli::{MergeError, Merger};
use ffmpeg_next::codec::Id;
use ffmpeg_next::{format, Packet, Rational};

fn output_context(dir: &TempDir, name: &str) -> format::context::Output {
    ffmpeg_next::init().unwrap();
    format::output(&dir.path().join(name)).unwrap()
}

// Stream compatibility classifier

#[test]
fn h264_and_aac_are_compatible_with_mp4() {
    let dir = TempDir::new().unwrap();
    let output = output_context(&dir, "merged.mp4");

    assert_eq!(classify(Id::H264, &output), Compatibility::Compatible);
    assert_eq!(classify(Id::AAC, &output), Compatibility::Compatible);
}

#[test]
fn h264_requires_transcode_into_wav() {
    let dir = TempDir::new().unwrap();
    let output = output_context(&dir, "merged.wav");

    assert_eq!(classify(Id::H264, &output), Compatibility::RequiresTranscode);
}

#[test]
fn classifier_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let output = output_context(&dir, "merged.mp4");

    let first = classify(Id::H264, &output);
    let second = classify(Id::H264, &output);
    assert_eq!(first, second);
}

// Timestamp rescaling

#[test]
fn identity_rescale_is_a_noop() {
    ffmpeg_next::init().unwrap();
    let mut packet = Packet::empty();
    packet.set_pts(Some(1234));
    packet.set_dts(Some(1200));
    packet.set_duration(40);

    packet.rescale_ts(Rational::new(1, 1000), Rational::new(1, 1000));

    assert_eq!(packet.pts(), Some(1234));
    assert_eq!(packet.dts(), Some(1200));
    assert_eq!(packet.duration(), 40);
}

#[test]
fn sentinel_timestamps_pass_through_unchanged() {
    ffmpeg_next::init().unwrap();
    let mut packet = Packet::empty();
    // An unset PTS is the minimum sentinel on the wire.
    packet.set_pts(None);
    packet.set_dts(Some(i64::MAX));

    packet.rescale_ts(Rational::new(1, 1000), Rational::new(1, 90000));

    assert_eq!(packet.pts(), None);
    assert_eq!(packet.dts(), Some(i64::MAX));
}

#[test]
fn duration_uses_plain_rational_rescale() {
    ffmpeg_next::init().unwrap();
    let mut packet = Packet::empty();
    packet.set_duration(1500);

    packet.rescale_ts(Rational::new(1, 1000), Rational::new(1, 500));

    assert_eq!(packet.duration(), 750);
}

// Failure scenarios

#[test]
fn merge_with_missing_video_input_fails_with_input_error() {
    let dir = TempDir::new().unwrap();
    let mut merger = Merger::new();

    let err = merger
        .merge(
            dir.path().join("missing.mp4"),
            dir.path().join("missing.m4a"),
            dir.path().join("merged.mp4"),
        )
        .unwrap_err();

    assert!(matches!(err, MergeError::InputOpenError { .. }));
    assert_eq!(merger.phase(), MergePhase::Failed);
    assert!(merger.last_error().unwrap().contains("missing.mp4"));
}

#[test]
fn merge_with_unparseable_input_fails_with_input_error() {
    let dir = TempDir::new().unwrap();
    let junk = dir.path().join("junk.mp4");
    fs::write(&junk, b"this is not a media file").unwrap();

    let mut merger = Merger::new();
    let err = merger
        .merge(
            &junk,
            dir.path().join("missing.m4a"),
            dir.path().join("merged.mp4"),
        )
        .unwrap_err();

    assert!(matches!(err, MergeError::InputOpenError { .. }));
    assert_eq!(merger.phase(), MergePhase::Failed);
}

#[test]
fn last_error_reflects_the_most_recent_call() {
    let dir = TempDir::new().unwrap();
    let mut merger = Merger::new();

    let _ = merger.merge(
        dir.path().join("first.mp4"),
        dir.path().join("first.m4a"),
        dir.path().join("out.mp4"),
    );
    let _ = merger.merge(
        dir.path().join("second.mp4"),
        dir.path().join("second.m4a"),
        dir.path().join("out.mp4"),
    );

    let message = merger.last_error().unwrap();
    assert!(message.contains("second.mp4"));
    assert!(!message.contains("first.mp4"));
}
