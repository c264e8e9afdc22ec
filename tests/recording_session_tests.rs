// Integration tests for recording sessions
//
// Time is paused: the scripted device emits a 10ms frame on every tick and
// the runtime auto-advances whenever every task is waiting on a timer.

mod common;

use anyhow::Result;
use common::ScriptedDevice;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use voicememo::audio::{BackendKind, PlatformCapabilities, WAV_MIME_TYPE};
use voicememo::config::RecorderConfig;
use voicememo::{RecordingError, RecordingSession, SessionState};

fn start(device: &Arc<ScriptedDevice>) -> RecordingSession {
    RecordingSession::start(device.clone(), &RecorderConfig::default())
}

fn wav_sample_count(bytes: &[u8]) -> Result<u32> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    Ok(reader.duration())
}

#[tokio::test(start_paused = true)]
async fn test_stop_delivers_wav_payload() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting());
    let session = start(&device);
    assert_eq!(session.kind(), BackendKind::Streaming);

    sleep(Duration::from_millis(500)).await;
    assert!(session.is_recording());
    assert!(session.stop(false));

    let payload = session.complete().await?.expect("payload after stop");

    assert_eq!(payload.mime_type, WAV_MIME_TYPE);
    assert!(payload.bytes.starts_with(b"RIFF"));
    assert!(wav_sample_count(&payload.bytes)? > 0);
    assert_eq!(session.state(), SessionState::Resolved);
    assert!(device.tracks().iter().all(|t| t.is_stopped()));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_legacy_backend_delivers_wav_payload() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().with_capabilities(PlatformCapabilities::none()));
    let session = start(&device);
    assert_eq!(session.kind(), BackendKind::Buffered);

    sleep(Duration::from_millis(300)).await;
    session.stop(false);

    let payload = session.complete().await?.expect("payload after stop");

    assert_eq!(payload.mime_type, WAV_MIME_TYPE);
    assert!(wav_sample_count(&payload.bytes)? > 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_acquisition_releases_device() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().ready_after(Duration::from_secs(1)));
    let session = start(&device);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), SessionState::Acquiring);
    session.stop(true);

    assert_eq!(session.complete().await?, None);

    // Give the producer a chance to run before checking it stayed silent
    sleep(Duration::from_millis(100)).await;

    let tracks = device.tracks();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].stop_count(), 1);
    assert_eq!(device.frames_sent(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_recording_releases_device() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().ready_after(Duration::from_millis(50)));
    let session = start(&device);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(session.state(), SessionState::Recording);
    assert!(device.frames_sent() > 0);

    assert!(session.stop(true));
    assert_eq!(session.complete().await?, None);

    let tracks = device.tracks();
    assert_eq!(tracks.len(), 1);
    assert!(tracks[0].is_stopped());
    assert_eq!(tracks[0].stop_count(), 1);

    let frames = device.frames_sent();
    sleep(Duration::from_millis(300)).await;
    assert_eq!(device.frames_sent(), frames);
    assert_eq!(session.state(), SessionState::Resolved);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_two_seconds_of_audio_then_stop() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().ready_after(Duration::from_millis(50)));
    let session = start(&device);

    sleep(Duration::from_secs(2)).await;
    assert!(session.stop(false));

    let payload = session.complete().await?.expect("payload after stop");

    let samples = wav_sample_count(&payload.bytes)?;
    let frames = device.frames_sent() as u32;
    assert_eq!(samples, frames * common::FRAME_SAMPLES as u32);
    // Roughly 1.95s of 10ms frames
    assert!((190..=196).contains(&frames), "{} frames", frames);
    assert!(device.tracks().iter().all(|t| t.is_stopped()));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_acquisition_yields_empty_recording() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().ready_after(Duration::from_millis(500)));
    let session = start(&device);

    session.stop(false);
    let payload = session.complete().await?.expect("payload after latched stop");

    assert_eq!(wav_sample_count(&payload.bytes)?, 0);
    assert!(device.tracks().iter().all(|t| t.is_stopped()));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_fails_session() {
    let device = Arc::new(ScriptedDevice::denying("Permission denied"));
    let session = start(&device);

    let outcome = session.complete().await;

    assert_eq!(
        outcome,
        Err(RecordingError::Acquisition("Permission denied".to_string()))
    );
    assert!(device.tracks().is_empty());
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_then_denied_resolves_to_none() {
    let device = Arc::new(
        ScriptedDevice::denying("Permission denied").ready_after(Duration::from_millis(200)),
    );
    let session = start(&device);

    session.stop(true);

    assert_eq!(session.complete().await, Ok(None));
    assert_eq!(session.state(), SessionState::Resolved);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting());
    let session = start(&device);
    sleep(Duration::from_millis(200)).await;

    assert!(session.stop(false));
    assert!(!session.stop(false));
    // The first stop wins: a later cancel does not discard the audio
    assert!(!session.stop(true));

    assert!(session.complete().await?.is_some());
    assert_eq!(device.tracks()[0].stop_count(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_completion_resolves_once_for_every_waiter() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting());
    let session = start(&device);
    let first = session.complete();
    let second = session.complete();

    sleep(Duration::from_millis(200)).await;
    session.stop(false);

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a?, b?);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_completion_waits_for_stop() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().frame_limit(20));
    let session = start(&device);

    // The stream ends after 20 frames but the session keeps waiting
    let pending = timeout(Duration::from_secs(5), session.complete()).await;
    assert!(pending.is_err());
    assert_eq!(device.frames_sent(), 20);

    session.stop(false);
    let payload = session.complete().await?.expect("payload after stop");

    assert_eq!(wav_sample_count(&payload.bytes)?, 20 * common::FRAME_SAMPLES as u32);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_analyser_available_once_recording() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().ready_after(Duration::from_millis(250)));
    let session = start(&device);

    let mut analyser = session.analyser().await?;
    assert_eq!(analyser.frequency_bin_count(), 256);

    sleep(Duration::from_millis(200)).await;
    let mut bins = vec![0u8; analyser.frequency_bin_count()];
    analyser.get_byte_frequency_data(&mut bins);

    // 2kHz tone at 31.25Hz per bin
    let peak = bins
        .iter()
        .enumerate()
        .max_by_key(|&(_, &b)| b)
        .map(|(i, _)| i)
        .unwrap_or_default();
    assert!((62..=66).contains(&peak), "peak at bin {}", peak);

    session.stop(true);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_analyser_gives_up_after_polling_budget() {
    let device = Arc::new(ScriptedDevice::never_answering());
    let session = start(&device);
    let started = Instant::now();

    let result = session.analyser().await;

    assert_eq!(result.err(), Some(RecordingError::AnalyserTimeout { attempts: 200 }));
    assert!(started.elapsed() >= Duration::from_secs(20));
    assert_eq!(session.state(), SessionState::Acquiring);
}

#[tokio::test(start_paused = true)]
async fn test_analyser_stops_polling_when_session_fails() {
    let device = Arc::new(ScriptedDevice::denying("Permission denied"));
    let session = start(&device);
    let started = Instant::now();

    let result = session.analyser().await;

    assert_eq!(result.err(), Some(RecordingError::SessionClosed));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_cancels_capture() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting());
    let session = start(&device);
    let completion = session.complete();

    sleep(Duration::from_millis(200)).await;
    drop(session);

    assert_eq!(completion.await?, None);
    assert!(device.tracks()[0].is_stopped());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_during_acquisition_cancels() -> Result<()> {
    let device = Arc::new(
        ScriptedDevice::denying("Permission denied").ready_after(Duration::from_millis(200)),
    );
    let session = start(&device);
    let completion = session.complete();
    let mut state = session.subscribe();

    sleep(Duration::from_millis(50)).await;
    drop(session);

    // The late denial is swallowed by the cancel
    assert_eq!(completion.await, Ok(None));
    assert_eq!(*state.borrow_and_update(), SessionState::Resolved);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_fails_session() {
    let device = Arc::new(ScriptedDevice::granting().fail_after(5));
    let session = start(&device);

    let outcome = session.complete().await;

    assert_eq!(
        outcome,
        Err(RecordingError::Acquisition("device unplugged".to_string()))
    );
    assert_eq!(session.state(), SessionState::Failed);
    assert!(device.tracks()[0].is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions_are_published() -> Result<()> {
    let device = Arc::new(ScriptedDevice::granting().ready_after(Duration::from_millis(100)));
    let session = start(&device);
    let mut state = session.subscribe();

    state.wait_for(|s| *s == SessionState::Recording).await?;
    session.stop(false);
    state.wait_for(|s| s.is_terminal()).await?;

    assert_eq!(*state.borrow(), SessionState::Resolved);

    Ok(())
}
