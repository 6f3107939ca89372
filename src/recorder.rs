//! Replay recording.
//!
//! One CSV row per entity per tick, preceded by `#` comment lines naming the
//! scenario and road network files a player needs to reproduce the run.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;
use log::info;
use thiserror::Error;

use crate::model::entity::Entities;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
}

/// Alias for `Result<T, RecordError>`.
pub type RecordResult<T> = Result<T, RecordError>;

/// Files referenced by a recording.
#[derive(Debug, Clone, Copy)]
pub struct RecordedFiles<'a> {
    pub scenario: &'a Path,
    pub logic_file: &'a Path,
    pub scene_graph_file: &'a Path,
}

pub const COLUMNS: [&str; 12] = [
    "time", "id", "name", "x", "y", "z", "h", "p", "r", "speed", "wheel_angle", "wheel_rot",
];

pub struct Recorder {
    writer: Writer<File>,
    rows: usize,
    finished: bool,
}

impl Recorder {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path, files: RecordedFiles<'_>) -> RecordResult<Self> {
        let mut file = File::create(path)?;
        writeln!(file, "# scenario: {}", files.scenario.display())?;
        writeln!(file, "# logic_file: {}", files.logic_file.display())?;
        writeln!(file, "# scene_graph_file: {}", files.scene_graph_file.display())?;

        let mut writer = Writer::from_writer(file);
        writer.write_record(COLUMNS)?;
        info!("Recording to {}", path.display());

        Ok(Self {
            writer,
            rows: 0,
            finished: false,
        })
    }

    pub fn record(&mut self, time: f64, entities: &Entities) -> RecordResult<()> {
        for entity in entities.iter() {
            let pose = &entity.pose;
            self.writer.write_record(&[
                format!("{:.3}", time),
                entity.id.0.to_string(),
                entity.name.clone(),
                format!("{:.4}", pose.x),
                format!("{:.4}", pose.y),
                format!("{:.4}", pose.z),
                format!("{:.4}", pose.h),
                format!("{:.4}", pose.p),
                format!("{:.4}", pose.r),
                format!("{:.4}", entity.speed),
                format!("{:.4}", entity.wheel_angle),
                format!("{:.4}", entity.wheel_rotation),
            ])?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(&mut self) -> RecordResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("rows", &self.rows)
            .field("finished", &self.finished)
            .finish()
    }
}
