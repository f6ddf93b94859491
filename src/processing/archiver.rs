//! Persistence of accepted time-level solutions.
//!
//! The core calls an [`Archiver`] exactly once per accepted step;
//! rejected iterates never reach it.

use super::csv_writer;
use nalgebra::DVector;
use std::io;
use std::path::PathBuf;

pub trait Archiver {
    fn record(&mut self, step: usize, time: f64, solution: &DVector<f64>) -> io::Result<()>;
}

/// Discards everything; useful for tests and benches.
pub struct NullArchiver;

impl Archiver for NullArchiver {
    fn record(&mut self, _step: usize, _time: f64, _solution: &DVector<f64>) -> io::Result<()> {
        Ok(())
    }
}

/// Writes one CSV per accepted step plus a step/time index on `finish`.
pub struct CsvArchiver {
    dir: PathBuf,
    prefix: String,
    steps: Vec<usize>,
    times: Vec<f64>,
}

impl CsvArchiver {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(CsvArchiver {
            dir,
            prefix: prefix.into(),
            steps: Vec::new(),
            times: Vec::new(),
        })
    }

    /// Write the step/time index of everything recorded so far.
    pub fn finish(&self) -> io::Result<()> {
        let path = self.dir.join(format!("{}_steps.csv", self.prefix));
        csv_writer::write_step_index(path, &self.steps, &self.times)
    }
}

impl Archiver for CsvArchiver {
    fn record(&mut self, step: usize, time: f64, solution: &DVector<f64>) -> io::Result<()> {
        let path = self.dir.join(format!("{}_{:05}.csv", self.prefix, step));
        csv_writer::write_single_column(path, &self.prefix, solution.as_slice())?;
        self.steps.push(step);
        self.times.push(time);
        Ok(())
    }
}

/// In-memory archiver retaining every accepted level; used by tests and
/// the run summary.
#[derive(Default)]
pub struct MemoryArchiver {
    pub records: Vec<(usize, f64, DVector<f64>)>,
}

impl Archiver for MemoryArchiver {
    fn record(&mut self, step: usize, time: f64, solution: &DVector<f64>) -> io::Result<()> {
        self.records.push((step, time, solution.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_archiver_keeps_accepted_steps_in_order() {
        let mut archiver = MemoryArchiver::default();
        archiver
            .record(1, 0.1, &DVector::from_vec(vec![1.0]))
            .unwrap();
        archiver
            .record(2, 0.2, &DVector::from_vec(vec![2.0]))
            .unwrap();
        assert_eq!(archiver.records.len(), 2);
        assert_eq!(archiver.records[1].0, 2);
    }
}
