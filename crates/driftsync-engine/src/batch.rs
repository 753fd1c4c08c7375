//! Batch sizing for archive transfers
//!
//! A hard cap on files per batch plus an optional budget on estimated
//! compressed bytes. The estimate uses a compression-ratio heuristic
//! keyed by file extension; it only has to be good enough to keep
//! archives roughly even, not accurate.

use driftsync_config::TransferConfig;
use driftsync_types::Snapshot;

const TEXT_EXTENSIONS: &[&str] = &[
    "c", "cfg", "cpp", "css", "csv", "h", "html", "ini", "java", "js", "json", "log", "md",
    "properties", "py", "rs", "sh", "sql", "svg", "toml", "ts", "txt", "xml", "yaml", "yml",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "avif", "bz2", "class", "gif", "gz", "jar", "jpeg", "jpg", "mp3", "mp4", "pdf", "png",
    "so", "tgz", "war", "webp", "woff2", "xz", "zip", "zst",
];

/// Estimated compressed fraction of a file's size, by extension
fn compression_ratio(rel: &str) -> f64 {
    let ext = rel.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        0.25
    } else if BINARY_EXTENSIONS.contains(&ext.as_str()) {
        0.95
    } else {
        0.6
    }
}

/// Splits a pending path list into transfer batches
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    max_files: usize,
    byte_budget: Option<u64>,
}

impl BatchPlanner {
    /// Build the planner from transfer configuration
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            max_files: config.max_batch_files.max(1),
            byte_budget: config.batch_byte_budget,
        }
    }

    /// Split `paths` into batches; `snapshot` supplies sizes for the
    /// byte estimate.
    ///
    /// A single file whose estimate alone exceeds the budget still gets
    /// its own batch; the budget never drops a file.
    pub fn split(&self, paths: &[String], snapshot: &Snapshot) -> Vec<Vec<String>> {
        let mut batches = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_bytes = 0u64;

        for rel in paths {
            let estimate = self.byte_budget.map(|_| {
                let size = snapshot.get(rel).map_or(0, |meta| meta.size);
                (size as f64 * compression_ratio(rel)).ceil() as u64
            });

            let over_budget = match (self.byte_budget, estimate) {
                (Some(budget), Some(estimate)) => {
                    !current.is_empty() && current_bytes + estimate > budget
                }
                _ => false,
            };
            if current.len() >= self.max_files || over_budget {
                batches.push(std::mem::take(&mut current));
                current_bytes = 0;
            }

            current_bytes += estimate.unwrap_or(0);
            current.push(rel.clone());
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}
