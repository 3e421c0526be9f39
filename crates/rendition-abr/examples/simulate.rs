//! Simulated playback session over a varying network.
//!
//! Run with: `RUST_LOG=rendition_abr=debug cargo run -p rendition-abr --example simulate`

#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use rendition_abr::{
    AdaptiveOptions, AdaptiveSelectionFactory, Clock, EventBus, Format, ManualClock, SelectionResult,
    ThroughputMeter, ThroughputSample, TrackGroup, TrackSelectionFactory,
};

const CHUNK_US: u64 = 4_000_000;

/// Network bandwidth (bps) at a given second of the session.
fn network_bps(second: u64) -> u64 {
    match second {
        0..30 => 1_500_000,
        30..90 => 12_000_000,
        90..120 => 600_000,
        _ => 5_000_000,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn main() -> SelectionResult<()> {
    init_tracing();

    let group = Arc::new(TrackGroup::new([
        Format::new(400_000).with_id("240p").with_size(426, 240),
        Format::new(1_200_000).with_id("480p").with_size(854, 480),
        Format::new(3_000_000).with_id("720p").with_size(1280, 720),
        Format::new(6_000_000).with_id("1080p").with_size(1920, 1080),
    ])?);
    let meter = Arc::new(ThroughputMeter::new().with_initial_estimate(1_000_000));
    let clock = ManualClock::new(0);
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let factory = AdaptiveSelectionFactory::new(AdaptiveOptions::default())
        .with_clock(Arc::new(clock.clone()))
        .with_events(events);
    let mut selection = factory.create(group, meter.clone(), &[0, 1, 2, 3])?;
    selection.enable()?;

    let mut position_us = 0_u64;
    let mut buffered_us = 0_u64;
    let mut downloaded_us = 0_u64;

    while position_us < 150_000_000 {
        let format = Arc::clone(selection.selected_format()?);
        let bitrate = format.bitrate_or_zero();
        let bytes = bitrate * (CHUNK_US / 1_000) / 8_000;
        let bandwidth = network_bps(clock.now_ms() / 1_000);
        let download = Duration::from_millis((bytes * 8_000 / bandwidth.max(1)).max(1));

        // every 25th chunk of the top track fails and gets blacklisted
        if downloaded_us / CHUNK_US % 25 == 24 && selection.selected_index()? == 0 {
            if selection.blacklist(0, 20_000)? {
                tracing::info!(track = ?format.id, "download failed, track excluded");
            }
        } else {
            meter.push_sample(ThroughputSample::network(bytes, download));
            downloaded_us += CHUNK_US;
            buffered_us += CHUNK_US;
        }

        let elapsed_us = u64::try_from(download.as_micros()).unwrap_or(u64::MAX);
        let played = elapsed_us.min(buffered_us);
        position_us += played;
        buffered_us -= played;
        clock.advance(download);

        selection.update_selected_track(position_us, buffered_us, None)?;
        tracing::info!(
            position_s = position_us / 1_000_000,
            buffered_s = buffered_us / 1_000_000,
            network_bps = bandwidth,
            track = ?selection.selected_format()?.id,
            reason = ?selection.selection_reason()?,
            "tick"
        );

        while let Ok(event) = rx.try_recv() {
            tracing::debug!(?event, "selection event");
        }
    }

    selection.disable()?;
    Ok(())
}
