// ============================================================
// Layer 6 — JSON Lines Tracking Sink
// ============================================================
// The file-backed tracking sink used when tracking is enabled.
// Each run gets its own directory keyed by (group, name):
//
//   {root}/{group}/{name}/
//     config.json     ← run configuration, written once
//     metrics.jsonl   ← one record per line, append-only
//     status.json     ← written by finish()
//
// Example metrics.jsonl:
//   {"epoch":1,"step":1,"metrics":{"train/loss":4.112}}
//   {"epoch":1,"step":2,"metrics":{"train/loss":3.870}}
//   {"epoch":1,"step":2,"metrics":{"val/accuracy":0.21,"val/loss":3.64}}
//
// Nothing touches the filesystem until the first write, so a
// sink pointing at an unwritable location only fails when it is
// actually used, and the tracker absorbs that failure.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::config::RunIdentity;
use crate::domain::error::TrackingDeliveryError;
use crate::domain::traits::{TrackedRecord, TrackingSink};

pub struct JsonlSink {
    run_dir: PathBuf,
    writer:  Option<BufWriter<File>>,
}

impl JsonlSink {
    pub fn new(root: impl AsRef<Path>, identity: &RunIdentity) -> Self {
        let run_dir = root.as_ref().join(&identity.group).join(&identity.name);
        Self { run_dir, writer: None }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, TrackingDeliveryError> {
        let writer = match self.writer.take() {
            Some(w) => w,
            None => {
                fs::create_dir_all(&self.run_dir)?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.run_dir.join("metrics.jsonl"))?;
                tracing::debug!("Opened tracking log in '{}'", self.run_dir.display());
                BufWriter::new(file)
            }
        };
        Ok(self.writer.insert(writer))
    }
}

impl TrackingSink for JsonlSink {
    fn write_config(&mut self, config: &serde_json::Value) -> Result<(), TrackingDeliveryError> {
        fs::create_dir_all(&self.run_dir)?;
        fs::write(
            self.run_dir.join("config.json"),
            serde_json::to_string_pretty(config)?,
        )?;
        Ok(())
    }

    fn write_records(&mut self, records: &[TrackedRecord]) -> Result<(), TrackingDeliveryError> {
        let writer = self.writer()?;
        for record in records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TrackingDeliveryError> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
        }
        fs::create_dir_all(&self.run_dir)?;
        fs::write(
            self.run_dir.join("status.json"),
            serde_json::to_string(&serde_json::json!({ "status": "finished" }))?,
        )?;
        Ok(())
    }
}
