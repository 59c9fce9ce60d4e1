// AI
//! 📊 progress.rs: "Are we there yet?" Every ingestion, every time, forever.
//!
//! 🚀 This module answers the age-old question: "how many products have landed?"
//! With cold hard numbers, a progress bar, and a table so comfy it has lumbar support.
//!
//! ⚠️  Warning: Watching this progress bar will not make Mongo go faster.
//! Neither will refreshing it. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 rows" → "1,000,000 rows": you're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, your catalogue is either enormous or your cluster is sad.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 The brains behind the progress display. Tracks rows, batches, changes, and your sanity.
///
/// Uses a sliding 5-second window for the rows/s rate so one slow batch doesn't
/// make the number look like a seismograph.
pub(crate) struct ProgressMetrics {
    /// 🏷️ what are we even ingesting? a name to display in the UI
    label: String,
    /// 📏 total rows expected: known up front, the whole table is loaded first
    total_rows: u64,
    rows_done: u64,
    batches_done: u64,
    changed: u64,
    progress_bar: ProgressBar,
    /// 🔄 sliding window of (timestamp, rows) for rate calculation
    rate_samples: VecDeque<(Instant, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_rows", &self.total_rows)
            .field("rows_done", &self.rows_done)
            .field("batches_done", &self.batches_done)
            .field("changed", &self.changed)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Spin up a visible progress display over `total_rows`.
    pub(crate) fn new(label: String, total_rows: u64) -> Self {
        let progress_bar = ProgressBar::new(total_rows);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n| [{bar:40.cyan/blue}]")
                .unwrap() // -- 🐛 safe unwrap: template string is hardcoded and valid, I checked, twice
                .progress_chars("=>-"),
        );
        Self::with_bar(label, total_rows, progress_bar)
    }

    /// 🙈 Same bookkeeping, nothing drawn. For `runtime.progress = false` and tests.
    pub(crate) fn hidden(label: String, total_rows: u64) -> Self {
        Self::with_bar(label, total_rows, ProgressBar::hidden())
    }

    fn with_bar(label: String, total_rows: u64, progress_bar: ProgressBar) -> Self {
        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        // -- 🔄 seed the rate window with t=0 so we don't divide by zero like animals
        rate_samples.push_back((start_time, 0u64));
        Self {
            label,
            total_rows,
            rows_done: 0,
            batches_done: 0,
            changed: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Feed the metrics engine after every flushed batch.
    pub(crate) fn update(&mut self, rows_in_batch: u64, changed_in_batch: u64) {
        self.rows_done += rows_in_batch;
        self.batches_done += 1;
        self.changed += changed_in_batch;

        let rows_per_sec = self.rows_per_sec();
        self.render(rows_per_sec);
        self.progress_bar.set_position(self.rows_done);
    }

    /// ✅ Mark the progress bar done. Ring the bell. We made it.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    #[cfg(test)]
    pub(crate) fn rows_done(&self) -> u64 {
        self.rows_done
    }

    /// 📈 rows/s over a 5-second sliding window.
    fn rows_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.rows_done));

        if let Some(&(oldest_time, oldest_rows)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                return self.rows_done.saturating_sub(oldest_rows) as f64 / elapsed;
            }
        }
        // -- 💤 not enough elapsed time yet: return zero and maintain composure
        0.0
    }

    /// 🎨 Render the progress panel as a comfy-table message on the bar.
    ///
    /// ```text
    /// | source: <label>
    /// | [=====>----------]
    ///   <rows/s>       <rows done / total>
    ///   <batches>      <changed>
    ///   <elapsed>      <remaining>
    /// ```
    fn render(&self, rows_per_sec: f64) {
        let percent = if self.total_rows > 0 {
            (self.rows_done as f64 / self.total_rows as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // 🔮 linear extrapolation: assumes the future looks like the past
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            let remaining_secs = total_estimated - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Rows/s", format_number(rows_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} Rows ({:.2}%)",
                format_number(self.rows_done),
                format_number(self.total_rows),
                percent
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} Batches", format_number(self.batches_done)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Changed", format_number(self.changed)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.label, table));
    }
}
