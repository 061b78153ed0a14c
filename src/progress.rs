//! Terminal progress bars

use felflash_core::Progress;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress sink drawing an indicatif bar
pub struct IndicatifProgress {
    phase: &'static str,
    bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    /// Create a sink whose bar is labelled with `phase`
    pub fn new(phase: &'static str) -> Self {
        Self { phase, bar: None }
    }
}

impl Progress for IndicatifProgress {
    fn start(&mut self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                    self.phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    fn update(&mut self, delta: usize) {
        if let Some(pb) = &self.bar {
            pb.inc(delta as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message(format!("{} complete", self.phase));
        }
    }
}
