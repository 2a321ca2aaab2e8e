//! Progress bar for convergence runs

use crate::ui;
use declarative::{Outcome, Phase, ProgressCallback, ResourceId};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress callback backed by an indicatif bar
///
/// The bar grows as batches start, since the number of refreshes and
/// purged members is only known once the run reaches them.
pub struct BarProgress {
    bar: ProgressBar,
    /// Print every changed or failed resource above the bar
    verbose: bool,
}

impl BarProgress {
    pub fn new(visible: bool, verbose: bool) -> Self {
        // Hidden bars still count so the totals stay consistent
        let bar = ProgressBar::new(0);
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar, verbose }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, phase: Phase, count: usize) {
        self.bar.inc_length(count as u64);
        self.bar.set_message(format!("{phase}..."));
    }

    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &Outcome) {
        if self.verbose && (outcome.is_change() || outcome.is_failure()) {
            self.bar.println(format!("  {}", ui::outcome_line(id, outcome)));
        }
        self.bar
            .set_message(format!("{} {}", ui::outcome_symbol(outcome), id));
        self.bar.inc(1);
    }

    fn on_batch_complete(&mut self, _phase: Phase) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_grow_with_batches() {
        let mut progress = BarProgress::new(false, false);
        progress.on_batch_start(Phase::Apply, 2);
        progress.on_resource_complete(&ResourceId::new("package", "cobbler"), &Outcome::Unchanged);
        progress.on_batch_start(Phase::Refresh, 1);

        assert_eq!(progress.bar.length(), Some(3));
        assert_eq!(progress.bar.position(), 1);
        progress.finish();
    }
}
