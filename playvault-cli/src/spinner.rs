//! Per-platform spinners shown while libraries are fetched.
//!
//! One spinner line per platform in flight. Lines are cleared when the
//! platform settles and its outcome is logged in their place.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use playvault_core::Platform;
use playvault_lib::{PlatformOutcome, SyncProgress};

pub(crate) struct SpinnerProgress {
    mp: MultiProgress,
    style: ProgressStyle,
    spinners: Mutex<BTreeMap<Platform, ProgressBar>>,
}

impl SpinnerProgress {
    /// When `quiet` is true, all spinners are hidden.
    pub fn new(quiet: bool) -> Self {
        let mp = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let style = ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("/-\\|");
        Self {
            mp,
            style,
            spinners: Mutex::new(BTreeMap::new()),
        }
    }

    fn release(&self, platform: Platform) {
        let bar = match self.spinners.lock() {
            Ok(mut spinners) => spinners.remove(&platform),
            Err(poisoned) => poisoned.into_inner().remove(&platform),
        };
        if let Some(bar) = bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }

    /// Clear any spinner still on screen.
    pub fn clear_all(&self) {
        let bars: Vec<ProgressBar> = match self.spinners.lock() {
            Ok(mut spinners) => std::mem::take(&mut *spinners).into_values().collect(),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner())
                .into_values()
                .collect(),
        };
        for bar in bars {
            bar.finish_and_clear();
        }
    }
}

impl SyncProgress for SpinnerProgress {
    fn on_fetch_started(&self, platform: Platform) {
        let bar = self.mp.add(ProgressBar::new_spinner());
        bar.set_style(self.style.clone());
        bar.set_message(format!("Fetching {}...", platform.display_name()));
        bar.enable_steady_tick(Duration::from_millis(100));
        match self.spinners.lock() {
            Ok(mut spinners) => spinners.insert(platform, bar),
            Err(poisoned) => poisoned.into_inner().insert(platform, bar),
        };
    }

    fn on_fetch_finished(&self, platform: Platform, outcome: &PlatformOutcome) {
        self.release(platform);
        let name = format!("{:<12}", platform.display_name());
        match outcome {
            PlatformOutcome::Fresh { records } => log::info!(
                "  {} {} {} games",
                "\u{2714}".if_supports_color(Stdout, |t| t.green()),
                name.if_supports_color(Stdout, |t| t.bold()),
                records,
            ),
            other => log::warn!(
                "  {} {} {}",
                "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
                name,
                other,
            ),
        }
    }

    fn on_phase(&self, message: &str) {
        self.clear_all();
        log::debug!("{}", message);
    }

    fn on_complete(&self, message: &str) {
        self.clear_all();
        log::info!("{}", message.if_supports_color(Stdout, |t| t.bold()));
    }
}
