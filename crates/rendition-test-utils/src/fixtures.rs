//! rstest fixtures for track groups and chunk queues.

use std::sync::Arc;

use rendition_abr::{Format, MediaChunk, TrackGroup};
use rstest::fixture;

/// Audio-only ladder: 200 kbps, 800 kbps, 3 Mbps, listed low to high.
#[fixture]
pub fn three_track_group() -> Arc<TrackGroup> {
    Arc::new(
        TrackGroup::new([
            Format::new(200_000).with_id("low"),
            Format::new(800_000).with_id("mid"),
            Format::new(3_000_000).with_id("high"),
        ])
        .unwrap(),
    )
}

/// Video ladder from 240p to 1080p, listed in arbitrary order.
#[fixture]
pub fn video_ladder() -> Arc<TrackGroup> {
    Arc::new(
        TrackGroup::new([
            video(1_200_000, 854, 480),
            video(6_000_000, 1920, 1080),
            video(400_000, 426, 240),
            video(3_000_000, 1280, 720),
        ])
        .unwrap(),
    )
}

/// Build a video format with a codec string.
#[must_use]
pub fn video(bitrate: u64, width: u32, height: u32) -> Format {
    Format::new(bitrate)
        .with_id(format!("{height}p"))
        .with_size(width, height)
        .with_codecs("avc1.64001f")
}

/// Group with the given bitrates, in order.
#[must_use]
pub fn group_of(bitrates: &[u64]) -> Arc<TrackGroup> {
    Arc::new(TrackGroup::new(bitrates.iter().map(|b| Format::new(*b))).unwrap())
}

/// `count` back-to-back chunks of `format`, `chunk_us` long each, starting
/// at `start_us`.
#[must_use]
pub fn chunk_queue(
    format: &Arc<Format>,
    start_us: u64,
    chunk_us: u64,
    count: usize,
) -> Vec<MediaChunk> {
    (0..count)
        .map(|i| {
            let offset = chunk_us * i as u64;
            MediaChunk {
                format: Arc::clone(format),
                start_time_us: start_us + offset,
                end_time_us: start_us + offset + chunk_us,
                chunk_index: i as u64,
            }
        })
        .collect()
}
