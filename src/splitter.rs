use camino::Utf8Path;
use serde::Serialize;

use crate::domain::{DATE_KEY, RequestSpec, Session, TARGET_KEY};
use crate::error::RetrieveError;
use crate::partition::partition;

pub const CHUNK_EXTENSION: &str = "nc";

/// Sub-requests derived from one request, in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalBatch {
    requests: Vec<RequestSpec>,
}

impl RetrievalBatch {
    pub fn requests(&self) -> &[RequestSpec] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.requests
            .iter()
            .filter_map(|request| request.get(TARGET_KEY))
    }

    /// Rewrites every `target` so the chunk files carry the session tag.
    pub fn tag_session(&mut self, session: &Session) -> Result<(), RetrieveError> {
        for request in &mut self.requests {
            let tagged = tag_target(request.target()?, session);
            request.insert(TARGET_KEY, tagged);
        }
        Ok(())
    }
}

impl IntoIterator for RetrievalBatch {
    type Item = RequestSpec;
    type IntoIter = std::vec::IntoIter<RequestSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.into_iter()
    }
}

/// Breaks `spec` into one request per year of its `date` range.
///
/// Each sub-request is an owned copy with its own `date` slice and a chunk
/// target `<stem>_<NNN>_.nc`; `spec` itself is left untouched.
pub fn split(spec: &RequestSpec) -> Result<RetrievalBatch, RetrieveError> {
    let dates = partition(spec.date()?)?.request_dates();
    let stem = target_stem(spec.target()?);

    let requests = dates
        .into_iter()
        .enumerate()
        .map(|(index, date)| {
            let mut request = spec.clone();
            request.insert(DATE_KEY, date);
            request.insert(TARGET_KEY, chunk_target(&stem, index));
            request
        })
        .collect();

    Ok(RetrievalBatch { requests })
}

/// `target` without its last extension: `era.nc` becomes `era`.
pub fn target_stem(target: &str) -> String {
    Utf8Path::new(target).with_extension("").into_string()
}

pub fn chunk_target(stem: &str, index: usize) -> String {
    format!("{stem}_{index:03}_.{CHUNK_EXTENSION}")
}

/// `x_000_.nc` becomes `x_000__<session>_.nc`.
pub fn tag_target(target: &str, session: &Session) -> String {
    let path = Utf8Path::new(target);
    let stem = path.with_extension("");
    match path.extension() {
        Some(ext) => format!("{stem}{}.{ext}", session.file_tag()),
        None => format!("{stem}{}", session.file_tag()),
    }
}
