// SPDX-License-Identifier: MPL-2.0

//! The camera engine: owns every track, the effect state, the sink and the
//! pump thread, and exposes the control surface used by the rest of the app.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use eyre::{WrapErr, eyre};
use image::{RgbImage, RgbaImage};
use tracing::{debug, error, info, warn};
use voicecam_config::EngineConfig;

use crate::{
    animated::{AnimationTrack, LoadedAsset, load_avatar, load_background},
    compositor::{BOUNCE_RESERVE, CanvasLayout, DEFAULT_CANVAS, compose},
    effects::{EffectController, Transition},
    frame_queue::{PreviewFrame, PreviewQueue, QueueStats},
    pump::{self, PumpStats},
    sink::{CameraSink, SinkFormat},
    status::{AvatarAsset, VoiceStatus},
};

/// Outcome of [`Engine::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    /// Assets loaded and the sink is open; the pump may be started.
    Ready,
    /// The camera device could not be opened. Needs user action.
    SinkUnavailable(String),
}

/// Outcome of [`Engine::update_parameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterUpdate {
    Applied,
    /// The output rate changed; shut down and initialize again.
    RestartRequired { from: u32, to: u32 },
}

/// Receives every status reported to the bridge.
pub type StatusListener = Arc<dyn Fn(VoiceStatus, &str) + Send + Sync>;

/// Everything the pump and the status bridge mutate, behind one lock.
#[derive(Debug)]
pub struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) layout: CanvasLayout,
    pub(crate) background: AnimationTrack<RgbImage>,
    pub(crate) effects: EffectController,
}

/// Inputs for one composition, copied out of the locked state.
#[derive(Debug)]
pub struct FrameInputs {
    pub layout: CanvasLayout,
    pub background: RgbImage,
    pub avatar: Option<RgbaImage>,
    pub y_offset: i32,
}

impl FrameInputs {
    #[must_use]
    pub fn compose(&self) -> RgbImage {
        compose(
            &self.layout,
            &self.background,
            self.avatar.as_ref(),
            self.y_offset,
        )
    }
}

fn layout_for(canvas: (u32, u32), config: &EngineConfig) -> CanvasLayout {
    let reserve = if config.bouncing_enabled {
        BOUNCE_RESERVE
    } else {
        0
    };
    CanvasLayout::new(canvas.0, canvas.1).with_reserve(reserve)
}

impl EngineState {
    /// Load every asset from `dir`.
    pub fn load(dir: &Path, config: EngineConfig, now: Instant) -> Self {
        let background = load_background(dir);
        let avatars = AvatarAsset::ALL.map(|asset| load_avatar(dir, asset));
        Self::from_assets(background, avatars, config, now)
    }

    /// Build state from decoded assets.
    ///
    /// The canvas takes the size of the first background frame. Without a
    /// usable background the canvas falls back to [`DEFAULT_CANVAS`] over black.
    pub fn from_assets(
        background: LoadedAsset<RgbImage>,
        avatars: [LoadedAsset<RgbaImage>; 4],
        config: EngineConfig,
        now: Instant,
    ) -> Self {
        let canvas = background
            .frames
            .first()
            .map(RgbImage::dimensions)
            .filter(|&(w, h)| w > 0 && h > 0);

        let (canvas, background) = match canvas {
            Some(canvas) => (canvas, background),
            None => {
                warn!(
                    width = DEFAULT_CANVAS.0,
                    height = DEFAULT_CANVAS.1,
                    "no usable background, using default canvas"
                );
                let black = RgbImage::new(DEFAULT_CANVAS.0, DEFAULT_CANVAS.1);
                (DEFAULT_CANVAS, LoadedAsset::still(black, None))
            }
        };

        let background = AnimationTrack::new(background, now);
        info!(
            width = canvas.0,
            height = canvas.1,
            background_frames = background.len(),
            background_fps = background.source_fps(),
            "canvas resolution set"
        );

        Self {
            layout: layout_for(canvas, &config),
            background,
            effects: EffectController::new(avatars, canvas, now),
            config,
        }
    }

    #[cfg(test)]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn layout(&self) -> CanvasLayout {
        self.layout
    }

    #[cfg(test)]
    pub fn background(&self) -> &AnimationTrack<RgbImage> {
        &self.background
    }

    #[cfg(test)]
    pub fn effects(&self) -> &EffectController {
        &self.effects
    }

    /// Advance every track to `now` and copy out what the compositor needs.
    pub fn frame_inputs(&mut self, now: Instant) -> eyre::Result<FrameInputs> {
        let y_offset = self.effects.bounce_offset(&self.config, now);
        let background = self
            .background
            .advance(now)
            .cloned()
            .ok_or_else(|| eyre!("background track has no frames"))?;
        let avatar = self.effects.avatar_frame(&self.config, now);

        Ok(FrameInputs {
            layout: self.layout,
            background,
            avatar,
            y_offset,
        })
    }

    /// First frames for `status`, cursors untouched, no bounce or dim.
    #[must_use]
    pub fn static_inputs(&self, status: VoiceStatus) -> Option<FrameInputs> {
        Some(FrameInputs {
            layout: self.layout,
            background: self.background.first_frame()?.clone(),
            avatar: self.effects.static_frame(status).cloned(),
            y_offset: 0,
        })
    }

    /// Apply a status change at `now`.
    pub fn apply_status(&mut self, status: VoiceStatus, now: Instant) -> Transition {
        let config = self.config;
        self.effects.on_status(status, &config, now)
    }

    /// Replace tunables. The output rate is not applied here.
    pub fn apply_config(&mut self, config: EngineConfig) {
        let canvas = (self.layout.width, self.layout.height);
        self.layout = layout_for(canvas, &config);
        self.config = EngineConfig {
            cam_fps: self.config.cam_fps,
            ..config
        };
    }
}

/// State shared between the engine handle, the pump thread and status bridges.
pub(crate) struct Shared {
    pub(crate) state: Mutex<Option<EngineState>>,
    pub(crate) running: AtomicBool,
    pub(crate) preview: PreviewQueue,
    pub(crate) stats: Mutex<PumpStats>,
    listener: Mutex<Option<StatusListener>>,
}

impl Shared {
    pub(crate) fn state(&self) -> MutexGuard<'_, Option<EngineState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stats(&self) -> MutexGuard<'_, PumpStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener(&self) -> Option<StatusListener> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cheap handle through which a monitor reports voice status changes.
#[derive(Clone)]
pub struct StatusBridge {
    shared: Arc<Shared>,
}

impl StatusBridge {
    /// Handle a status label from the monitor.
    ///
    /// Unknown labels are treated as [`VoiceStatus::Error`], with the raw
    /// label carried in the debug text. Never panics into the caller.
    pub fn on_status_changed(&self, label: &str, debug_text: &str) {
        let now = Instant::now();
        match VoiceStatus::from_label(label) {
            Some(status) => self.apply(status, debug_text, now),
            None => {
                warn!(label, "unknown voice status label");
                let text = if debug_text.is_empty() {
                    format!("unknown status: {label}")
                } else {
                    format!("unknown status: {label} | {debug_text}")
                };
                self.apply(VoiceStatus::Error, &text, now);
            }
        }
    }

    /// Handle an already parsed status at `now`.
    pub fn apply(&self, status: VoiceStatus, debug_text: &str, now: Instant) {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let applied = self.shared.state().as_mut().map(|state| {
                let transition = state.apply_status(status, now);
                (transition, state.effects.active(), state.effects.bounce_activations())
            });
            if let Some((transition, active, bounces)) = applied {
                debug!(%status, debug_text, ?transition, ?active, bounces, "voice status");
            }

            if let Some(listener) = self.shared.listener() {
                listener(status, debug_text);
            }
        }));

        if result.is_err() {
            error!(%status, "status handling panicked");
        }
    }
}

/// The virtual camera engine.
pub struct Engine {
    assets_dir: PathBuf,
    shared: Arc<Shared>,
    sink: Option<Box<dyn CameraSink>>,
    pump: Option<JoinHandle<Box<dyn CameraSink>>>,
}

impl Engine {
    pub fn new(assets_dir: impl Into<PathBuf>, sink: Box<dyn CameraSink>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(None),
                running: AtomicBool::new(false),
                preview: PreviewQueue::new(),
                stats: Mutex::new(PumpStats::default()),
                listener: Mutex::new(None),
            }),
            sink: Some(sink),
            pump: None,
        }
    }

    #[must_use]
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Handle for reporting status changes from another thread.
    #[must_use]
    pub fn bridge(&self) -> StatusBridge {
        StatusBridge {
            shared: self.shared.clone(),
        }
    }

    /// Register the callback that receives every reported status.
    pub fn set_status_listener(&self, listener: impl Fn(VoiceStatus, &str) + Send + Sync + 'static) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    /// Load assets and open the sink.
    ///
    /// An engine that is already initialized is shut down first.
    pub fn initialize(&mut self, config: EngineConfig) -> InitStatus {
        if self.is_initialized() {
            self.shutdown();
        }

        let state = EngineState::load(&self.assets_dir, config, Instant::now());
        let layout = state.layout();
        *self.shared.state() = Some(state);
        *self.shared.stats() = PumpStats::default();
        self.shared.preview.reset();

        let format = SinkFormat {
            width: layout.width,
            height: layout.height,
            fps: config.cam_fps,
        };

        let Some(sink) = self.sink.as_mut() else {
            return InitStatus::SinkUnavailable("sink is still owned by the pump".into());
        };

        match sink.open(format) {
            Ok(()) => {
                info!(sink = sink.name(), ?format, "camera initialized");
                InitStatus::Ready
            }
            Err(why) => {
                error!(?why, sink = sink.name(), "camera sink unavailable");
                InitStatus::SinkUnavailable(format!("{why:#}"))
            }
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.state().is_some()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pump.is_some()
    }

    /// Send a first frame and launch the pump thread.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not initialized or the sink is not open.
    pub fn start(&mut self) -> eyre::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let (inputs, fps) = {
            let state = self.shared.state();
            let state = state.as_ref().ok_or_else(|| eyre!("engine is not initialized"))?;
            let inputs = state
                .static_inputs(VoiceStatus::Silent)
                .ok_or_else(|| eyre!("background track has no frames"))?;
            (inputs, state.config.cam_fps)
        };

        let mut sink = self
            .sink
            .take()
            .ok_or_else(|| eyre!("sink is owned by a running pump"))?;
        if !sink.is_open() {
            self.sink = Some(sink);
            return Err(eyre!("camera sink is not open"));
        }

        let first = inputs.compose();
        if let Err(why) = sink.send_frame(&first) {
            warn!(?why, "failed to send first frame");
        }
        self.shared.preview.push(PreviewFrame::new(first, 0));

        self.shared.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("voicecam-pump".into())
            .spawn(move || pump::run(&shared, sink, fps))
            .wrap_err("failed to spawn frame pump")?;

        info!(fps, "frame pump started");
        self.pump = Some(handle);
        Ok(())
    }

    /// Stop the pump thread and take the sink back.
    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let Some(handle) = self.pump.take() else {
            return;
        };

        match handle.join() {
            Ok(sink) => self.sink = Some(sink),
            Err(_) => error!("frame pump panicked; camera sink lost"),
        }
        info!("frame pump stopped");
    }

    /// Stop the pump, close the sink and drop every track.
    ///
    /// Safe to call repeatedly or before [`Engine::initialize`].
    pub fn shutdown(&mut self) {
        self.stop();
        self.shared.preview.stop();
        if let Some(sink) = self.sink.as_mut() {
            sink.close();
        }
        if self.shared.state().take().is_some() {
            info!("engine shut down");
        }
    }

    /// Apply new tunables to the running engine.
    ///
    /// Everything except the output rate takes effect on the next frame; a
    /// different rate needs a full restart, which is reported, not performed.
    pub fn update_parameters(&self, config: EngineConfig) -> ParameterUpdate {
        let mut state = self.shared.state();
        let Some(state) = state.as_mut() else {
            return ParameterUpdate::Applied;
        };

        let current = state.config.cam_fps;
        state.apply_config(config);
        if current == config.cam_fps {
            debug!(?config, "parameters applied");
            ParameterUpdate::Applied
        } else {
            info!(from = current, to = config.cam_fps, "output rate changed, restart required");
            ParameterUpdate::RestartRequired {
                from: current,
                to: config.cam_fps,
            }
        }
    }

    /// Compose the first frame for `status` without touching live cursors.
    ///
    /// Before initialization this is a black frame of the default canvas size.
    #[must_use]
    pub fn static_preview(&self, status: VoiceStatus) -> RgbImage {
        let inputs = self
            .shared
            .state()
            .as_ref()
            .and_then(|state| state.static_inputs(status));

        match inputs {
            Some(inputs) => inputs.compose(),
            None => RgbImage::new(DEFAULT_CANVAS.0, DEFAULT_CANVAS.1),
        }
    }

    /// Output resolution, once initialized.
    #[must_use]
    pub fn camera_resolution(&self) -> Option<(u32, u32)> {
        self.shared
            .state()
            .as_ref()
            .map(|state| (state.layout.width, state.layout.height))
    }

    /// Newest composited frame, without blocking.
    #[must_use]
    pub fn latest_preview(&self) -> Option<PreviewFrame> {
        self.shared.preview.latest()
    }

    #[must_use]
    pub fn stats(&self) -> PumpStats {
        self.shared.stats().clone()
    }

    /// Preview queue counters.
    #[must_use]
    pub fn preview_stats(&self) -> QueueStats {
        self.shared.preview.stats()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
