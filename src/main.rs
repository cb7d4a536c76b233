// SPDX-License-Identifier: MPL-2.0

mod animated;
mod compositor;
mod effects;
mod engine;
mod frame_queue;
mod monitor;
mod placeholder;
mod pump;
mod sink;
mod status;

use std::{
    env, io,
    path::{Path, PathBuf},
    time::Duration,
};

use calloop::{
    EventLoop, LoopSignal,
    channel::{self, Channel},
    signals::{Signal, Signals},
    timer::{TimeoutAction, Timer},
};
use eyre::{OptionExt, WrapErr, eyre};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};
use voicecam_config::{ConfigFile, EngineConfig};

use crate::{
    engine::{Engine, InitStatus, ParameterUpdate},
    sink::CameraSink,
};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

struct VoiceCam {
    engine: Engine,
    config_file: ConfigFile,
    signal: LoopSignal,
}

impl VoiceCam {
    fn reload_config(&mut self) {
        let config = self.config_file.load_engine_config();
        match self.engine.update_parameters(config) {
            ParameterUpdate::Applied => info!("settings reloaded"),
            ParameterUpdate::RestartRequired { from, to } => {
                info!(from, to, "camera rate changed, restarting engine");
                if let Err(why) = self.restart(config) {
                    error!(?why, "engine restart failed");
                    self.signal.stop();
                }
            }
        }
    }

    fn restart(&mut self, config: EngineConfig) -> eyre::Result<()> {
        self.engine.shutdown();
        start_engine(&mut self.engine, config)
    }
}

fn start_engine(engine: &mut Engine, config: EngineConfig) -> eyre::Result<()> {
    match engine.initialize(config) {
        InitStatus::Ready => engine.start(),
        InitStatus::SinkUnavailable(reason) => {
            Err(eyre!("virtual camera unavailable: {reason}"))
        }
    }
}

fn config_paths() -> eyre::Result<(PathBuf, PathBuf)> {
    let config_dir = dirs::config_dir().ok_or_eyre("no user config directory")?;

    let config = env::var_os("VOICECAM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| ConfigFile::default_path(&config_dir));
    let assets = env::var_os("VOICECAM_ASSETS")
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join(voicecam_config::NAME).join("reactive_avatar"));

    Ok((config, assets))
}

fn camera_sink() -> Box<dyn CameraSink> {
    match env::var("VOICECAM_SINK").as_deref() {
        Ok("memory") => Box::new(sink::MemorySink::new()),
        #[cfg(unix)]
        _ => Box::new(sink::SharedMemorySink::default()),
        #[cfg(not(unix))]
        _ => Box::new(sink::MemorySink::new()),
    }
}

/// Watch the directory holding the settings file; events for other files are
/// filtered out on the loop side.
fn watch_config(path: &Path) -> eyre::Result<(RecommendedWatcher, Channel<notify::Event>)> {
    let (tx, rx) = channel::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(why) => warn!(?why, "settings watcher error"),
        },
        notify::Config::default(),
    )?;

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    debug!(path = %path.display(), "watching settings");
    Ok((watcher, rx))
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let (config_path, assets_dir) = config_paths()?;
    let config_file = ConfigFile::new(&config_path);
    let config = config_file.load_engine_config();

    if let Err(why) = placeholder::ensure_placeholder_assets(&assets_dir) {
        warn!(?why, "could not create placeholder assets");
    }

    let mut engine = Engine::new(&assets_dir, camera_sink());
    engine.set_status_listener(|status, text| {
        info!(%status, text, "voice status changed");
    });
    start_engine(&mut engine, config)?;

    if let Some((width, height)) = engine.camera_resolution() {
        info!(width, height, assets = %engine.assets_dir().display(), "virtual camera running");
    }

    let _monitor = monitor::spawn_line_monitor(io::BufReader::new(io::stdin()), engine.bridge())
        .wrap_err("failed to start status monitor")?;

    let mut event_loop: EventLoop<VoiceCam> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM])?;
    handle
        .insert_source(signals, |event, _, state: &mut VoiceCam| {
            info!(signal = ?event.signal(), "exiting");
            state.signal.stop();
        })
        .map_err(|err| eyre!("{}", err))?;

    // Dropping the watcher ends the notifications.
    let _watcher = match watch_config(&config_path) {
        Ok((watcher, rx)) => {
            let watched = config_path.file_name().map(ToOwned::to_owned);
            handle
                .insert_source(rx, move |event, _, state: &mut VoiceCam| {
                    let channel::Event::Msg(event) = event else {
                        return;
                    };
                    let touches_settings = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == watched.as_deref());
                    if touches_settings && (event.kind.is_modify() || event.kind.is_create()) {
                        state.reload_config();
                    }
                })
                .map_err(|err| eyre!("{}", err))?;
            Some(watcher)
        }
        Err(why) => {
            warn!(?why, "settings hot reload disabled");
            None
        }
    };

    handle
        .insert_source(
            Timer::from_duration(STATS_INTERVAL),
            |_, _, state: &mut VoiceCam| {
                let stats = state.engine.stats();
                let preview = state.engine.preview_stats();
                info!(
                    produced = stats.frames_produced,
                    failed = stats.frames_failed,
                    fps = stats.average_fps,
                    send_ms = stats.last_send.map(|d| d.as_secs_f64() * 1000.0),
                    preview_pushed = preview.frames_pushed,
                    preview_popped = preview.frames_popped,
                    preview_dropped = preview.frames_dropped,
                    preview_reused = preview.frames_reused,
                    "camera statistics"
                );
                if let Some(frame) = state.engine.latest_preview() {
                    debug!(
                        sequence = frame.sequence,
                        width = frame.image.width(),
                        height = frame.image.height(),
                        age = ?frame.queued_at.elapsed(),
                        "latest preview frame"
                    );
                }
                TimeoutAction::ToDuration(STATS_INTERVAL)
            },
        )
        .map_err(|err| eyre!("{}", err))?;

    let mut state = VoiceCam {
        engine,
        config_file,
        signal: event_loop.get_signal(),
    };

    event_loop.run(None, &mut state, |_| {})?;

    state.engine.shutdown();
    Ok(())
}
