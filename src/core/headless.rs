//! Headless render host for the command line.
//!
//! Keeps the committed result in memory, optionally dumps every progressive
//! update to a preview directory, and mirrors progress and reports to the log.

use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::render::{RenderHost, RenderResult, ReportLevel};
use crate::entities::{Frame, FrameError};

#[derive(Debug, Default)]
pub struct HeadlessHost {
    preview_dir: Option<PathBuf>,
    previews: usize,
    last_progress: f32,
    result: Option<Frame>,
    reports: Vec<(ReportLevel, String)>,
    stop: Arc<AtomicBool>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write each progressive update as `preview_NNNN.png` into `dir`.
    pub fn with_preview_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.preview_dir = Some(dir.into());
        self
    }

    /// Flag that makes `test_break` return true once set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Committed image, if the render finished
    pub fn result(&self) -> Option<&Frame> {
        self.result.as_ref()
    }

    pub fn reports(&self) -> &[(ReportLevel, String)] {
        &self.reports
    }

    pub fn previews_written(&self) -> usize {
        self.previews
    }

    /// Save the committed image as PNG.
    pub fn save_result(&self, path: &Path) -> Result<bool, FrameError> {
        match &self.result {
            Some(frame) => {
                frame.save_png(path)?;
                info!("Saved {}", path.display());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl RenderHost for HeadlessHost {
    fn update_result(&mut self, result: &RenderResult) {
        let Some(dir) = &self.preview_dir else {
            return;
        };
        let Some(frame) = result.to_frame() else {
            return;
        };
        let path = dir.join(format!("preview_{:04}.png", self.previews));
        match frame.save_png(&path) {
            Ok(()) => self.previews += 1,
            Err(e) => warn!("Cannot write preview {}: {}", path.display(), e),
        }
    }

    fn end_result(&mut self, result: RenderResult) {
        self.result = result.to_frame();
    }

    fn update_progress(&mut self, progress: f32) {
        // Log in 10% steps
        if (progress * 10.0).floor() > (self.last_progress * 10.0).floor() || progress >= 1.0 {
            info!("Progress: {:.0}%", progress * 100.0);
        }
        self.last_progress = progress;
    }

    fn update_stats(&mut self, stats: &str, info: &str) {
        info!("{}: {}", stats, info);
    }

    fn report(&mut self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Error => error!("{}", message),
            ReportLevel::Warning => warn!("{}", message),
            ReportLevel::Info => info!("{}", message),
        }
        self.reports.push((level, message.to_string()));
    }

    fn test_break(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}
