//! GStreamer `playbin` audio backend.

use gstreamer as gst;
use gstreamer::prelude::*;
use rhythmcat_core::{ActionSender, AudioBackend, CoreError, PlaybackAction, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// How often the bus thread wakes to report the position
const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn backend_error(reason: impl std::fmt::Display) -> CoreError {
    CoreError::Backend {
        reason: reason.to_string(),
    }
}

pub struct GstBackend {
    playbin: gst::Element,
    stop_flag: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
}

impl GstBackend {
    /// # Errors
    ///
    /// Returns `Backend` if GStreamer cannot be initialised or has no `playbin`.
    pub fn new() -> Result<Self> {
        gst::init().map_err(backend_error)?;
        let playbin = gst::ElementFactory::make("playbin")
            .name("rhythmcat-player")
            .build()
            .map_err(backend_error)?;
        debug!("GStreamer {} initialised", gst::version_string());
        Ok(Self {
            playbin,
            stop_flag: Arc::new(AtomicBool::new(false)),
            bus_thread: None,
        })
    }

    fn set_state(&self, state: gst::State) -> Result<()> {
        self.playbin
            .set_state(state)
            .map(|_| ())
            .map_err(|e| backend_error(format!("cannot change state to {state:?}: {e}")))
    }
}

/// Forward end of stream, errors and the position to the engine
fn watch_bus(bus: &gst::Bus, playbin: &gst::Element, reports: &ActionSender, stop_flag: &AtomicBool) {
    while !stop_flag.load(Ordering::Relaxed) {
        let message = bus.timed_pop(gst::ClockTime::from_mseconds(
            u64::try_from(POLL_INTERVAL.as_millis()).unwrap_or(500),
        ));

        let action = match message.as_ref().map(gst::Message::view) {
            Some(gst::MessageView::Eos(..)) => Some(PlaybackAction::EndOfStream),
            Some(gst::MessageView::Error(err)) => {
                let reason = match err.debug() {
                    Some(details) => format!("{} ({details})", err.error()),
                    None => err.error().to_string(),
                };
                Some(PlaybackAction::BackendError(reason))
            }
            Some(_) => None,
            None => {
                let (_, state, _) = playbin.state(gst::ClockTime::ZERO);
                if state == gst::State::Playing {
                    playbin
                        .query_position::<gst::ClockTime>()
                        .map(|p| PlaybackAction::UpdatePosition(Duration::from_nanos(p.nseconds())))
                } else {
                    None
                }
            }
        };

        if let Some(action) = action {
            if reports.send(action).is_err() {
                debug!("Player engine gone, stopping bus watch");
                break;
            }
        }
    }
}

impl AudioBackend for GstBackend {
    fn connect(&mut self, reports: ActionSender) {
        let Some(bus) = self.playbin.bus() else {
            warn!("playbin has no bus, end of stream will not be reported");
            return;
        };
        let playbin = self.playbin.clone();
        let stop_flag = Arc::clone(&self.stop_flag);
        let spawned = std::thread::Builder::new()
            .name("gst-bus".to_string())
            .spawn(move || watch_bus(&bus, &playbin, &reports, &stop_flag));
        match spawned {
            Ok(handle) => self.bus_thread = Some(handle),
            Err(e) => warn!("Cannot start the GStreamer bus thread: {}", e),
        }
    }

    fn set_uri(&mut self, uri: &str) -> Result<()> {
        self.set_state(gst::State::Ready)?;
        self.playbin.set_property("uri", uri);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.set_state(gst::State::Playing)
    }

    fn pause(&mut self) -> Result<()> {
        self.set_state(gst::State::Paused)
    }

    fn stop(&mut self) -> Result<()> {
        self.set_state(gst::State::Null)
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let nanos = u64::try_from(position.as_nanos()).unwrap_or(u64::MAX);
        self.playbin
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                gst::ClockTime::from_nseconds(nanos),
            )
            .map_err(backend_error)
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.playbin.set_property("volume", volume.clamp(0.0, 1.0));
        Ok(())
    }
}

impl Drop for GstBackend {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.bus_thread.take() {
            let _ = thread.join();
        }
        let _ = self.playbin.set_state(gst::State::Null);
    }
}
