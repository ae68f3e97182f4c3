// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use pipewire as pw;
use pw::{properties::properties, spa};
use spa::pod::Pod;
use std::sync::mpsc::{SyncSender, sync_channel};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

mod capture;
mod decoder;
mod history;

pub use capture::{CaptureReader, CaptureWriter, capture_ring};
pub use decoder::{DecodeError, Decoder, FileDecoder};
pub use history::HistoryWindow;

const CHANNELS: usize = 2;
const STRIDE: usize = CHANNELS * std::mem::size_of::<f32>();
// Frames handed to the decoder per pass, the output buffer is filled in as many passes as needed.
const SCRATCH_FRAMES: usize = 4096;
const NODE_LATENCY_FRAMES: u32 = 512;

/// One stereo sample, `left` drives the X axis and `right` the Y axis.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

/// Receives every buffer of frames sent to the output device, on the playback thread.
pub trait AudioSink: Send + 'static {
    fn on_buffer(&mut self, frames: &[AudioFrame]);
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("PipeWire: {0}")]
    PipeWire(#[from] pw::Error),
    #[error("unable to build the stream format: {0}")]
    Format(String),
    #[error("unable to spawn the playback thread: {0}")]
    Thread(#[from] std::io::Error),
    #[error("playback stream failed to start: {0}")]
    Startup(String),
}

struct Terminate;

struct PlaybackState<D, S> {
    decoder: D,
    sink: S,
    scratch: Vec<AudioFrame>,
    finished: bool,
}

/// Handle on the PipeWire playback thread. Dropping it stops the stream.
pub struct Playback {
    thread: Option<JoinHandle<()>>,
    quit_tx: Option<pw::channel::Sender<Terminate>>,
}

impl Playback {
    /// Spawns the playback thread and blocks until the stream is connected.
    pub fn start<D: Decoder, S: AudioSink>(decoder: D, sink: S) -> Result<Playback, PlaybackError> {
        let (ready_tx, ready_rx) = sync_channel(1);
        let (quit_tx, quit_rx) = pw::channel::channel::<Terminate>();

        let thread = std::thread::Builder::new()
            .name("pw-playback".into())
            .spawn(move || {
                if let Err(e) = run_playback(decoder, sink, quit_rx, &ready_tx) {
                    warn!("Playback stopped: {e}");
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })?;

        let mut playback = Playback {
            thread: Some(thread),
            quit_tx: Some(quit_tx),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(playback),
            Ok(Err(message)) => {
                playback.stop();
                Err(PlaybackError::Startup(message))
            }
            Err(_) => {
                playback.stop();
                Err(PlaybackError::Startup("playback thread exited".into()))
            }
        }
    }

    /// Quits the PipeWire loop and joins the thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(quit_tx) = self.quit_tx.take() {
            // Fails only if the loop is already gone.
            let _ = quit_tx.send(Terminate);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_playback<D: Decoder, S: AudioSink>(
    decoder: D,
    sink: S,
    quit_rx: pw::channel::Receiver<Terminate>,
    ready_tx: &SyncSender<Result<(), String>>,
) -> Result<(), PlaybackError> {
    pw::init();

    let main_loop = pw::main_loop::MainLoop::new(None)?;
    let context = pw::context::Context::new(&main_loop)?;
    let core = context.connect(None)?;
    let rate = decoder.sample_rate();

    let _quit_receiver = quit_rx.attach(main_loop.loop_(), {
        let main_loop = main_loop.clone();
        move |_| main_loop.quit()
    });

    let mut props = properties! {
        // Needed by StreamFlags::AUTOCONNECT
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Music",
    };
    props.insert(
        *pw::keys::NODE_LATENCY,
        format!("{NODE_LATENCY_FRAMES}/{rate}"),
    );

    let stream = pw::stream::Stream::new(&core, "xyscope-playback", props)?;

    let state = PlaybackState {
        decoder,
        sink,
        scratch: vec![AudioFrame::default(); SCRATCH_FRAMES],
        finished: false,
    };

    let _listener = stream
        .add_local_listener_with_user_data(state)
        .state_changed(|_, _, old, new| {
            debug!("Playback stream state: {old:?} -> {new:?}");
        })
        .process(|stream, state| match stream.dequeue_buffer() {
            None => trace!("out of buffers"),
            Some(mut buffer) => {
                let requested = buffer.requested() as usize;
                let datas = buffer.datas_mut();
                if datas.is_empty() {
                    return;
                }
                let data = &mut datas[0];
                let n_frames = match data.data() {
                    Some(bytes) => fill_output(state, bytes, requested),
                    None => 0,
                };
                let chunk = data.chunk_mut();
                *chunk.offset_mut() = 0;
                *chunk.stride_mut() = STRIDE as _;
                *chunk.size_mut() = (STRIDE * n_frames) as _;
            }
        })
        .register()?;

    // Ask for the file's own rate so that the graph resamples rather than us.
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(rate);
    audio_info.set_channels(CHANNELS as u32);
    let obj = pw::spa::pod::Object {
        type_: pw::spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: pw::spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };
    let values: Vec<u8> = pw::spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &pw::spa::pod::Value::Object(obj),
    )
    .map_err(|e| PlaybackError::Format(format!("{e:?}")))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values)
        .ok_or_else(|| PlaybackError::Format("invalid format pod".into()))?;
    let mut params = [pod];

    stream.connect(
        spa::utils::Direction::Output,
        None,
        pw::stream::StreamFlags::AUTOCONNECT | pw::stream::StreamFlags::MAP_BUFFERS,
        &mut params,
    )?;

    info!("Playing at rate:{rate} channels:{CHANNELS}");
    let _ = ready_tx.send(Ok(()));
    main_loop.run();
    debug!("Playback loop exited");
    Ok(())
}

/// Fills an interleaved F32LE output buffer from the decoder and forwards the
/// decoded frames to the sink. Past the end of the stream the buffer is silence.
///
/// Only `requested` frames are written when the graph gives a count, the mapped
/// buffer can be much larger than one quantum. Returns the number of frames written.
fn fill_output<D: Decoder, S: AudioSink>(
    state: &mut PlaybackState<D, S>,
    bytes: &mut [u8],
    requested: usize,
) -> usize {
    let mut n_frames = bytes.len() / STRIDE;
    if requested > 0 {
        n_frames = n_frames.min(requested);
    }
    let mut filled = 0;
    while filled < n_frames && !state.finished {
        let want = (n_frames - filled).min(state.scratch.len());
        let got = state.decoder.read_frames(&mut state.scratch[..want]);
        for (i, frame) in state.scratch[..got].iter().enumerate() {
            let at = (filled + i) * STRIDE;
            bytes[at..at + 4].copy_from_slice(&frame.left.to_le_bytes());
            bytes[at + 4..at + 8].copy_from_slice(&frame.right.to_le_bytes());
        }
        if got > 0 {
            state.sink.on_buffer(&state.scratch[..got]);
        }
        filled += got;
        if got < want {
            state.finished = true;
            debug!("Reached the end of the audio stream");
        }
    }
    bytes[filled * STRIDE..n_frames * STRIDE].fill(0);
    n_frames
}
