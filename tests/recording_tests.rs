mod common;

use anyhow::Result;
use capture_session::{
    CaptureError, CaptureEvent, CaptureOptions, CaptureStatus, EnvironmentSignal, VideoMeta,
};
use common::{previewing, quiet_options, wait_until, FakePlatform};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_record_and_stop() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    tokio::time::sleep(Duration::from_millis(1000)).await;

    fake.push_chunk(b"first");
    fake.push_chunk(b"second");
    controller.stop().await;
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    let video = session.captured_video.as_ref().expect("captured video");
    assert_eq!(video.blob.bytes(), b"firstsecond");
    assert_eq!(video.blob.mime_type, "video/webm");
    assert_eq!(video.chunks.len(), 2);
    assert_eq!((video.width, video.height), (Some(1280), Some(720)));
    assert_eq!(video.duration_ms, 1000);
    assert_eq!(session.duration_ms, Some(1000));
    assert!(session.captured_audio.is_none());

    // the live stream stays up for another take
    assert!(session.live_video.is_some());
    assert_eq!(fake.state().handles_created.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_recorder_options_follow_session() -> Result<()> {
    let fake = FakePlatform::new();
    let options = CaptureOptions {
        segment_duration_ms: Some(250),
        ..quiet_options()
    };
    let controller = fake.controller(options);
    previewing(&controller).await?;

    controller.start().await;

    let state = fake.state();
    let recorder = &state.recorder_options[0];
    assert_eq!(recorder.mime_type, "video/webm");
    assert_eq!(recorder.video_bits_per_second, Some(2_500_000));
    assert_eq!(recorder.audio_bits_per_second, Some(128_000));
    assert_eq!(recorder.timeslice, Some(Duration::from_millis(250)));
    Ok(())
}

#[tokio::test]
async fn test_audio_recording_lands_in_captured_audio() -> Result<()> {
    let fake = FakePlatform::new();
    let options = CaptureOptions {
        video: false,
        ..quiet_options()
    };
    let controller = fake.controller(options);
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"voice");
    controller.stop().await;
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    let audio = session.captured_audio.as_ref().expect("captured audio");
    assert_eq!(audio.width, None);
    assert!(session.captured_video.is_none());

    let state = fake.state();
    assert_eq!(state.recorder_options[0].mime_type, "audio/webm");
    assert_eq!(state.recorder_options[0].video_bits_per_second, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pause_excludes_paused_time() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    controller.pause().await;
    let paused = wait_until(&controller, |s| s.status == CaptureStatus::Paused).await?;
    assert_eq!(paused.duration_ms, Some(400));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(controller.session().duration_ms, Some(400));

    controller.resume().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    tokio::time::sleep(Duration::from_millis(600)).await;

    fake.push_chunk(b"take");
    controller.stop().await;
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    assert_eq!(session.captured_video.as_ref().map(|v| v.duration_ms), Some(1000));
    assert_eq!(
        fake.state().recorder_calls,
        vec!["start", "pause", "resume", "stop"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duration_ticks_while_recording() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    let session = wait_until(&controller, |s| s.duration_ms.unwrap_or(0) >= 300).await?;

    assert_eq!(session.duration_ms, Some(300));
    Ok(())
}

#[tokio::test]
async fn test_stop_without_data_returns_to_preview() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    controller.stop().await;
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Previewing).await?;

    assert!(session.captured_video.is_none());
    assert_eq!(session.duration_ms, None);
    assert!(fake.state().handles_created.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_stop_without_recorder_is_an_error() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.stop().await;
    let session = controller.session();

    assert_eq!(session.status, CaptureStatus::Previewing);
    assert!(matches!(
        session.last_error,
        Some(CaptureError::RecorderState(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_start_before_preview_is_an_error() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());

    controller.start().await;

    assert!(matches!(
        controller.session().last_error,
        Some(CaptureError::RecorderState(_))
    ));
    assert!(fake.state().recorder_options.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_recorder_start_failure_is_reported() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    fake.state().fail_recorder_start = true;
    controller.start().await;
    let session = controller.session();

    assert_eq!(session.status, CaptureStatus::Previewing);
    assert!(matches!(
        session.last_error,
        Some(CaptureError::RecorderState(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_choose_rejected_while_recording() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    let result = controller.choose("cam-back").await;

    assert!(matches!(result, Err(CaptureError::RecorderState(_))));
    assert_eq!(controller.session().status, CaptureStatus::Capturing);
    assert_eq!(fake.state().requests.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_clear_while_recording_is_refused() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    controller.clear().await;

    assert_eq!(controller.session().status, CaptureStatus::Capturing);
    assert!(controller.session().last_error.is_some());
    Ok(())
}

#[tokio::test]
async fn test_second_take_replaces_first() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"one");
    controller.stop().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    controller.clear().await;
    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"two");
    controller.stop().await;
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    assert_eq!(
        session.captured_video.as_ref().map(|v| v.blob.bytes().to_vec()),
        Some(b"two".to_vec())
    );
    let state = fake.state();
    assert_eq!(state.handles_created.len(), 2);
    assert_eq!(state.handles_revoked, vec![state.handles_created[0].clone()]);
    Ok(())
}

#[tokio::test]
async fn test_segmented_recording_streams_chunks() -> Result<()> {
    let fake = FakePlatform::new();
    let options = CaptureOptions {
        segment_duration_ms: Some(500),
        ..quiet_options()
    };
    let controller = fake.controller(options);
    previewing(&controller).await?;
    let mut events = controller.subscribe();

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"a");
    fake.push_chunk(b"b");
    controller.stop().await;
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;
    assert_eq!(session.captured_video.as_ref().map(|v| v.chunks.len()), Some(2));

    let mut chunks = Vec::new();
    let mut ended = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CaptureEvent::Chunk(blob) => chunks.push(blob.bytes().to_vec()),
            CaptureEvent::End => ended = true,
            CaptureEvent::Change(_) => {}
        }
    }
    assert_eq!(chunks, vec![b"a".to_vec(), b"b".to_vec()]);
    assert!(ended);
    Ok(())
}

#[tokio::test]
async fn test_unsegmented_recording_emits_no_chunks() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;
    let mut events = controller.subscribe();

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"a");
    controller.stop().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    while let Ok(event) = events.try_recv() {
        assert!(matches!(event, CaptureEvent::Change(_)));
    }
    Ok(())
}

#[tokio::test]
async fn test_dimensions_frozen_at_start() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;

    fake.state().meta = Some(VideoMeta {
        width: 720,
        height: 1280,
    });
    controller.signal(EnvironmentSignal::OrientationChanged);
    controller.signal(EnvironmentSignal::Resized);
    let rotated = wait_until(&controller, |s| {
        s.live_video.as_ref().is_some_and(|v| v.width == 720)
    })
    .await?;
    assert_eq!(rotated.live_video.as_ref().map(|v| v.height), Some(1280));

    fake.push_chunk(b"frame");
    controller.stop().await;
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    let video = session.captured_video.as_ref().expect("captured video");
    assert_eq!((video.width, video.height), (Some(1280), Some(720)));
    Ok(())
}

#[tokio::test]
async fn test_track_end_while_recording_finalizes() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"partial");
    controller.signal(EnvironmentSignal::TrackEnded {
        track_id: "stream-1-video".to_string(),
    });
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    assert!(session.captured_video.is_some());
    assert!(session.live_stream().is_none());
    assert_eq!(fake.state().stopped, vec!["stream-1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_track_end_without_data_reacquires() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    controller.signal(EnvironmentSignal::TrackEnded {
        track_id: "stream-1-audio".to_string(),
    });
    let session = wait_until(&controller, |s| {
        s.status == CaptureStatus::Previewing && s.live_stream().is_some()
    })
    .await?;

    assert_eq!(session.live_stream().map(|s| s.id.as_str()), Some("stream-2"));
    assert!(session.captured_video.is_none());
    Ok(())
}

#[tokio::test]
async fn test_deactivate_abandons_recording() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"lost");
    controller.deactivate().await;
    let session = controller.session();

    assert!(!session.active);
    assert_eq!(session.status, CaptureStatus::Previewing);
    assert!(session.captured_video.is_none());
    assert_eq!(session.duration_ms, None);
    assert_eq!(fake.state().recorder_calls.last(), Some(&"stop"));
    Ok(())
}

#[tokio::test]
async fn test_start_with_uncleared_artifact_is_an_error() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"kept");
    controller.stop().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    controller.start().await;
    let session = controller.session();

    assert_eq!(session.status, CaptureStatus::Captured);
    assert!(matches!(
        session.last_error,
        Some(CaptureError::RecorderState(_))
    ));
    assert_eq!(fake.state().recorder_options.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_track_end_after_stop_does_not_stop_twice() -> Result<()> {
    let fake = FakePlatform::new();
    let controller = fake.controller(quiet_options());
    previewing(&controller).await?;

    controller.start().await;
    wait_until(&controller, |s| s.status == CaptureStatus::Capturing).await?;
    fake.push_chunk(b"ending");
    fake.state().defer_stop = true;
    controller.stop().await;

    controller.signal(EnvironmentSignal::TrackEnded {
        track_id: "stream-1-video".to_string(),
    });
    let session = wait_until(&controller, |s| s.live_stream().is_none()).await?;
    assert!(session.last_error.is_none());

    fake.finish_stop();
    let session = wait_until(&controller, |s| s.status == CaptureStatus::Captured).await?;

    assert!(session.last_error.is_none());
    assert!(session.captured_video.is_some());
    assert_eq!(fake.state().recorder_calls, vec!["start", "stop"]);
    Ok(())
}
