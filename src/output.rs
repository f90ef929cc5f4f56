use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, ProgressSinkKind, RetrievalPlan, RetrieveResult};
use crate::assemble::AssembleReport;
use crate::domain::RequestSpec;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_retrieve(result: &RetrieveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(plan: &RetrievalPlan) -> io::Result<()> {
        Self::print_json(plan)
    }

    pub fn print_assemble(report: &AssembleReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_request(request: &RequestSpec) -> io::Result<()> {
        Self::print_json(request)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable progress on stderr.
pub struct ConsoleSink {
    kind: ProgressSinkKind,
}

impl ConsoleSink {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self { kind }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            ProgressSinkKind::Fetch => "fetch",
            ProgressSinkKind::Assemble => "assemble",
        }
    }
}

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(
                stderr,
                "[{}] {} ({:.1}s)",
                self.label(),
                event.message,
                elapsed.as_secs_f64()
            ),
            None => writeln!(stderr, "[{}] {}", self.label(), event.message),
        };
    }
}
