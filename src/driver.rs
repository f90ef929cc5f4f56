use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink};
use crate::ecmwf::ArchiveClient;
use crate::error::RetrieveError;
use crate::splitter::RetrievalBatch;

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub files: Vec<PathBuf>,
}

/// Submits the sub-requests one after another, each written to
/// `dir/<target>`.
///
/// The first failure is returned as is. Chunks fetched before it stay on
/// disk.
pub fn run_batch<C: ArchiveClient + ?Sized>(
    client: &C,
    batch: &RetrievalBatch,
    dir: &Path,
    sink: &dyn ProgressSink,
) -> Result<RetrievalOutcome, RetrieveError> {
    let total = batch.len();
    let mut files = Vec::with_capacity(total);

    for (index, request) in batch.requests().iter().enumerate() {
        let destination = dir.join(request.target()?);
        let date = request.date()?;
        info!(chunk = index + 1, total, date, "retrieving chunk");
        sink.event(ProgressEvent {
            message: format!("ecmwf.request {}/{total} date={date}", index + 1),
            elapsed: None,
        });

        let start = Instant::now();
        client.submit(request, &destination)?;
        sink.event(ProgressEvent {
            message: format!("ecmwf.response {}/{total}", index + 1),
            elapsed: Some(start.elapsed()),
        });
        files.push(destination);
    }

    Ok(RetrievalOutcome { files })
}
