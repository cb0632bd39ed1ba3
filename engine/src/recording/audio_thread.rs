use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::{Receiver, Sender, TryRecvError},
    Arc,
};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use rtrb::{Producer, RingBuffer};
use tokio::sync::mpsc::{self as frame_mpsc, error::TrySendError};

use crate::audio_io::{downmix, AudioFrame, LinearResampler};

use super::{AudioCmd, CaptureConfig, RecordingError};

/// Source-rate samples read from the ring per pass, per channel.
const READ_CHUNK: usize = 1024;

/// Turns interleaved device audio into fixed-size frames at the capture rate.
pub(crate) struct FrameCutter {
    channels: usize,
    resampler: LinearResampler,
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameCutter {
    pub(crate) fn new(source_rate: u32, channels: usize, config: &CaptureConfig) -> Self {
        Self {
            channels: channels.max(1),
            resampler: LinearResampler::new(source_rate, config.sample_rate),
            frame_size: config.frame_size.max(1),
            pending: Vec::with_capacity(config.frame_size * 2),
        }
    }

    pub(crate) fn push(&mut self, interleaved: &[f32], emit: &mut impl FnMut(AudioFrame)) {
        let mono = downmix(interleaved, self.channels);
        self.resampler.process(&mono, &mut self.pending);

        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            emit(AudioFrame::new(frame));
        }
    }

    /// Emits whatever is left as a final short frame.
    pub(crate) fn flush(&mut self, emit: &mut impl FnMut(AudioFrame)) {
        if !self.pending.is_empty() {
            emit(AudioFrame::new(std::mem::take(&mut self.pending)));
        }
    }
}

pub(super) fn init_and_run_audio_thread(
    config: CaptureConfig,
    cmd_rx: Receiver<AudioCmd>,
    init_tx: Sender<Result<(), RecordingError>>,
    frames: frame_mpsc::Sender<AudioFrame>,
    overrun_count: Arc<AtomicUsize>,
) -> Result<(), RecordingError> {
    let opened = open_input_stream(Arc::clone(&overrun_count));
    let (stream, mut consumer, sample_rate, channels) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = init_tx.send(Err(e.clone()));
            return Err(e);
        }
    };

    let mut stream = Some(stream);
    let _ = init_tx.send(Ok(()));

    let mut cutter = FrameCutter::new(sample_rate, channels, &config);
    let mut receiver_gone = false;
    let mut stopping = false;

    let dispatch = |frame: AudioFrame, receiver_gone: &mut bool| {
        match frames.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                overrun_count.fetch_add(frame.len(), Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => *receiver_gone = true,
        }
    };

    loop {
        if !stopping {
            match cmd_rx.try_recv() {
                Ok(AudioCmd::Stop) | Err(TryRecvError::Disconnected) => {
                    stopping = true;
                    stream.take();
                }
                Err(TryRecvError::Empty) => {}
            }
        }

        let available = consumer.slots() / channels * channels;
        if available >= READ_CHUNK * channels || (stopping && available > 0) {
            let take = available.min(READ_CHUNK * channels * 8);
            if let Ok(chunk) = consumer.read_chunk(take) {
                let (first, second) = chunk.as_slices();
                let mut interleaved = Vec::with_capacity(take);
                interleaved.extend_from_slice(first);
                interleaved.extend_from_slice(second);
                chunk.commit_all();

                cutter.push(&interleaved, &mut |frame| {
                    dispatch(frame, &mut receiver_gone)
                });
            }
        } else if stopping {
            break;
        } else {
            thread::sleep(Duration::from_millis(5));
        }

        if receiver_gone && !stopping {
            log::debug!("Frame receiver closed; stopping capture");
            stopping = true;
            stream.take();
        }
    }

    if !receiver_gone {
        cutter.flush(&mut |frame| dispatch(frame, &mut receiver_gone));
    }

    Ok(())
}

type OpenedStream = (cpal::Stream, rtrb::Consumer<f32>, u32, usize);

fn open_input_stream(overrun_count: Arc<AtomicUsize>) -> Result<OpenedStream, RecordingError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(RecordingError::NoInputDevice)?;

    let supported = device
        .default_input_config()
        .map_err(|e| RecordingError::Device(e.to_string()))?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;

    log::info!(
        "Audio: {} Hz, {} channels, device={:?}",
        sample_rate,
        channels,
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let (producer, consumer) = RingBuffer::<f32>::new(sample_rate as usize * channels.max(1));
    let err_fn = move |err| log::error!("Stream error: {}", err);
    let stream_config: cpal::StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, producer, err_fn, overrun_count)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, producer, err_fn, overrun_count)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &stream_config, producer, err_fn, overrun_count)
        }
        _ => return Err(RecordingError::UnsupportedFormat),
    }
    .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;

    Ok((stream, consumer, sample_rate, channels.max(1)))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: Producer<f32>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
    overrun_count: Arc<AtomicUsize>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let has_logged = Arc::new(AtomicBool::new(false));

    device.build_input_stream(
        config,
        move |data: &[T], _: &_| {
            if !has_logged.swap(true, Ordering::Relaxed) {
                log::debug!("CPAL: First chunk of {} samples", data.len());
            }

            for &sample in data {
                if producer.push(sample.to_sample::<f32>()).is_err() {
                    overrun_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        },
        err_fn,
        None,
    )
}
