// Integration tests for recording from an audio file
//
// An audio file stands in for the microphone: it is decoded and played out
// in real time (paused time here) in its own format; the session converts
// it to 16kHz mono.

use anyhow::Result;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use voicememo::audio::{encode_wav, BackendKind, FileDevice, PlatformCapabilities};
use voicememo::config::RecorderConfig;
use voicememo::RecordingSession;

/// Two seconds of a 440Hz tone
fn write_tone(dir: &Path, sample_rate: u32, channels: u16) -> Result<PathBuf> {
    let path = dir.join(format!("tone-{}-{}.wav", sample_rate, channels));
    let samples: Vec<i16> = (0..sample_rate * 2)
        .flat_map(|n| {
            let phase = 2.0 * std::f32::consts::PI * 440.0 * n as f32 / sample_rate as f32;
            std::iter::repeat((phase.sin() * 8000.0) as i16).take(usize::from(channels))
        })
        .collect();
    std::fs::write(&path, encode_wav(&samples, sample_rate, channels)?)?;
    Ok(path)
}

fn write_fixture(dir: &Path) -> Result<PathBuf> {
    write_tone(dir, 48000, 2)
}

async fn record_whole_file(device: FileDevice) -> Result<(BackendKind, u32)> {
    let session = RecordingSession::start(Arc::new(device), &RecorderConfig::default());

    // Past the end of the file; the session keeps waiting for stop
    sleep(Duration::from_secs(3)).await;
    assert!(session.is_recording());
    session.stop(false);

    let payload = session.complete().await?.expect("payload after stop");
    let reader = hound::WavReader::new(Cursor::new(payload.bytes))?;
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.spec().channels, 1);

    Ok((session.kind(), reader.duration()))
}

#[tokio::test(start_paused = true)]
async fn test_streaming_backend_records_whole_file() -> Result<()> {
    let dir = TempDir::new()?;
    let device = FileDevice::new(write_fixture(dir.path())?);

    let (kind, samples) = record_whole_file(device).await?;

    assert_eq!(kind, BackendKind::Streaming);
    assert_eq!(samples, 32000);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_buffered_backend_records_whole_file() -> Result<()> {
    let dir = TempDir::new()?;
    let device = FileDevice::new(write_fixture(dir.path())?)
        .with_capabilities(PlatformCapabilities::none())
        .with_burst(Duration::from_millis(50));

    let (kind, samples) = record_whole_file(device).await?;

    assert_eq!(kind, BackendKind::Buffered);
    assert_eq!(samples, 32000);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_44k1_file_is_resampled_to_16k() -> Result<()> {
    let dir = TempDir::new()?;
    let device = FileDevice::new(write_tone(dir.path(), 44100, 1)?);

    let (_, samples) = record_whole_file(device).await?;

    // Two seconds at the header's rate
    assert_eq!(samples, 32000);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_8k_stereo_file_is_upsampled_to_16k_mono() -> Result<()> {
    let dir = TempDir::new()?;
    let device = FileDevice::new(write_tone(dir.path(), 8000, 2)?)
        .with_capabilities(PlatformCapabilities::none());

    let (kind, samples) = record_whole_file(device).await?;

    assert_eq!(kind, BackendKind::Buffered);
    assert_eq!(samples, 32000);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_file_fails_acquisition() {
    let session = RecordingSession::start(
        Arc::new(FileDevice::new("/nonexistent/fixture.wav")),
        &RecorderConfig::default(),
    );

    let outcome = session.complete().await;

    assert!(matches!(outcome, Err(voicememo::RecordingError::Acquisition(_))));
}
