//! CSV output of per-event traces
//!
//! One row per digitized event. The first two columns locate the event in the
//! run (`phase` is `fixed` or `sampling`, `point` the energy-point index or
//! empty), followed by the stage's trace fields in their fixed order. The
//! header is written with the first event.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::digitizer::EventTrace;
use crate::sims::driver::{EventSink, RunPhase};

#[derive(Debug)]
pub struct CsvTraceSink<W: Write> {
    writer: W,
    header_written: bool,
    rows: u64,
}

impl CsvTraceSink<BufWriter<File>> {
    /// Create (or truncate) a CSV file at `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvTraceSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
            rows: 0,
        }
    }

    /// Data rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self, trace: &EventTrace) -> io::Result<()> {
        write!(self.writer, "phase,point")?;
        for (name, _) in trace.fields() {
            write!(self.writer, ",{}", name)?;
        }
        writeln!(self.writer)
    }
}

impl<W: Write> EventSink for CsvTraceSink<W> {
    fn record(&mut self, phase: RunPhase, trace: &EventTrace) -> io::Result<()> {
        if !self.header_written {
            self.write_header(trace)?;
            self.header_written = true;
        }

        match phase {
            RunPhase::FixedPoint(index) => write!(self.writer, "fixed,{}", index)?,
            RunPhase::UniformSampling => write!(self.writer, "sampling,")?,
        }
        for (_, value) in trace.fields() {
            write!(self.writer, ",{}", value)?;
        }
        writeln!(self.writer)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
