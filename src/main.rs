// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;
use tracing::{info, instrument, warn};
use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, filter, fmt};
use winit::event_loop::EventLoop;

use crate::audio::{Decoder, FileDecoder, HistoryWindow, Playback};
use crate::config::Configuration;
use crate::error::AppError;
use crate::scope::Scope;
use crate::surface::sync::{FrameSynchronizer, Presenter};
use crate::surface::window::WindowEventHandler;

mod audio;
mod config;
mod error;
mod scope;
mod surface;
mod view;

const DEFAULT_LOG_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";
// Set to record a Chrome trace of the frame timings, optionally to the given file.
const TRACE_ENV: &str = "XYSCOPE_TRACE";

pub struct ApplicationState {
    pub config: Configuration,
    pub scope: Scope,
    playback: Option<Playback>,
}

impl ApplicationState {
    fn new(config: Configuration, scope: Scope, playback: Playback) -> ApplicationState {
        ApplicationState {
            config,
            scope,
            playback: Some(playback),
        }
    }

    /// Drains new audio into the history and hands it to the drawables, unless paused.
    #[instrument(skip(self, synchronizer))]
    pub fn process_audio<P: Presenter>(&mut self, dt: f32, synchronizer: &mut FrameSynchronizer<P>) {
        if self.scope.update(dt) {
            synchronizer.process_audio(self.scope.history());
        }
    }

    pub fn toggle_pause(&mut self) {
        self.scope.toggle_pause();
    }

    pub fn set_iconified(&mut self, iconified: bool) {
        self.scope.set_iconified(iconified);
    }

    pub fn stop_audio(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Audio file to play and draw (WAV, FLAC, MP3 or Ogg Vorbis)
    file: PathBuf,
}

fn init_tracing() -> Option<FlushGuard> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    if let Some(trace_file) = std::env::var_os(TRACE_ENV) {
        let mut builder = ChromeLayerBuilder::new().include_args(true);
        if !trace_file.is_empty() {
            builder = builder.file(trace_file);
        }
        let (chrome_layer, guard) = builder.build();
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(chrome_layer.with_filter(filter::filter_fn(|metadata| {
                metadata
                    .module_path()
                    .iter()
                    .all(|path| !path.starts_with("naga"))
            })))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(fmt_layer).init();
        None
    }
}

fn load_configuration() -> Configuration {
    match Configuration::load() {
        Ok(Some(config)) => config,
        Ok(None) => {
            let config = Configuration::default();
            if let Err(e) = config.save() {
                warn!("Unable to write the default configuration: {e}");
            }
            config
        }
        Err(e) => {
            warn!("Failed to load configuration, will use default: {e}");
            Configuration::default()
        }
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let config = load_configuration();

    let decoder = FileDecoder::open(&args.file).map_err(|source| AppError::Decode {
        path: args.file.clone(),
        source,
    })?;
    let sample_rate = decoder.sample_rate();
    let samples_per_frame = config.samples_per_frame(sample_rate);
    info!(
        "{} at {sample_rate} Hz, {samples_per_frame} samples per frame",
        args.file.display()
    );

    let (writer, reader) = audio::capture_ring(samples_per_frame * 2);
    let history = HistoryWindow::new(config.history_capacity(sample_rate));
    let scope = Scope::new(reader, history, sample_rate);

    let event_loop = EventLoop::new()?;
    let playback = Playback::start(decoder, writer)?;

    let title = match args.file.file_name() {
        Some(name) => format!("xyscope: {}", name.to_string_lossy()),
        None => "xyscope".to_owned(),
    };
    let mut handler = WindowEventHandler::new(ApplicationState::new(config, scope, playback), title);
    event_loop.run_app(&mut handler)?;

    match handler.take_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn usage_error(e: &clap::Error) -> String {
    match e.kind() {
        ErrorKind::MissingRequiredArgument => "missing the audio file argument, usage: xyscope <FILE>".into(),
        _ => {
            let rendered = e.to_string();
            let first_line = rendered.lines().next().unwrap_or("invalid arguments");
            first_line.trim_start_matches("error: ").to_owned()
        }
    }
}

pub fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            eprintln!("xyscope: {}", usage_error(&e));
            std::process::exit(2);
        }
    };

    let code = {
        let _tracing_guard = init_tracing();
        match run(args) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("xyscope: {e}");
                1
            }
        }
    };
    std::process::exit(code);
}
