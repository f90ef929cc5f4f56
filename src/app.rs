use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::assemble::{AssembleReport, Concatenator, assemble};
use crate::domain::{DatasetTemplate, RequestSpec, Session};
use crate::driver::run_batch;
use crate::ecmwf::ArchiveClient;
use crate::error::RetrieveError;
use crate::fs_util::ensure_working_dir;
use crate::splitter::{RetrievalBatch, split, target_stem};

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub template: DatasetTemplate,
    pub delete_parts: bool,
    pub dry_run: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            template: DatasetTemplate::default(),
            delete_parts: true,
            dry_run: false,
        }
    }
}

/// Everything a run will do, computed without touching disk or network.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalPlan {
    pub session: Session,
    pub request: RequestSpec,
    pub output_name: String,
    pub working_dir: PathBuf,
    pub batch: RetrievalBatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResult {
    pub session: String,
    pub working_dir: String,
    pub output: String,
    pub chunks: Vec<String>,
    pub deleted: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Fetch,
    Assemble,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct Retriever<C: ArchiveClient, K: Concatenator> {
    client: C,
    concatenator: K,
    output_root: PathBuf,
}

impl<C: ArchiveClient, K: Concatenator> Retriever<C, K> {
    pub fn new(client: C, concatenator: K, output_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            concatenator,
            output_root: output_root.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Entry point for untyped overrides, e.g. parsed from JSON.
    ///
    /// Anything but a mapping of strings fails before the first request is
    /// sent or the first directory is created.
    pub fn retrieve(
        &self,
        overrides: Option<&Value>,
        options: RetrieveOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrieveResult, RetrieveError> {
        let overrides = overrides.map(RequestSpec::from_json).transpose()?;
        self.retrieve_spec(overrides.as_ref(), options, sink)
    }

    pub fn plan(
        &self,
        overrides: Option<&RequestSpec>,
        template: DatasetTemplate,
    ) -> Result<RetrievalPlan, RetrieveError> {
        let mut request = template.defaults();
        if let Some(overrides) = overrides {
            request.merge(overrides);
        }

        let output_name = request.target()?.to_string();
        let is_plain_name = Utf8Path::new(&output_name)
            .file_name()
            .map(|name| name == output_name)
            .unwrap_or(false);
        if !is_plain_name {
            return Err(RetrieveError::InvalidTarget(output_name));
        }

        let mut batch = split(&request)?;
        let session = Session::generate();
        batch.tag_session(&session)?;
        let working_dir = self.output_root.join(target_stem(&output_name));

        Ok(RetrievalPlan {
            session,
            request,
            output_name,
            working_dir,
            batch,
        })
    }

    pub fn retrieve_spec(
        &self,
        overrides: Option<&RequestSpec>,
        options: RetrieveOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrieveResult, RetrieveError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; merging onto {} defaults", options.template),
            elapsed: None,
        });
        let plan = self.plan(overrides, options.template)?;
        info!(
            session = %plan.session,
            chunks = plan.batch.len(),
            output = %plan.output_name,
            "retrieval planned"
        );
        if options.dry_run {
            let chunks = plan
                .batch
                .targets()
                .map(|target| plan.working_dir.join(target).display().to_string())
                .collect();
            return Ok(RetrieveResult {
                session: plan.session.to_string(),
                working_dir: plan.working_dir.display().to_string(),
                output: plan.working_dir.join(&plan.output_name).display().to_string(),
                chunks,
                deleted: 0,
                dry_run: true,
            });
        }

        ensure_working_dir(&plan.working_dir)?;

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {} requests", plan.batch.len()),
            elapsed: None,
        });
        let outcome = run_batch(&self.client, &plan.batch, &plan.working_dir, sink)?;

        let report = self.assemble_existing(
            &plan.working_dir,
            &plan.output_name,
            Some(&plan.session),
            options.delete_parts,
            sink,
        )?;
        if report.inputs != outcome.files {
            warn!(
                fetched = outcome.files.len(),
                assembled = report.inputs.len(),
                "assembled chunks differ from the fetched ones"
            );
        }

        Ok(RetrieveResult {
            session: plan.session.to_string(),
            working_dir: plan.working_dir.display().to_string(),
            output: report.output.display().to_string(),
            chunks: outcome
                .files
                .iter()
                .map(|file| file.display().to_string())
                .collect(),
            deleted: report.deleted,
            dry_run: false,
        })
    }

    pub fn assemble_existing(
        &self,
        dir: &Path,
        output_name: &str,
        session: Option<&Session>,
        delete_parts: bool,
        sink: &dyn ProgressSink,
    ) -> Result<AssembleReport, RetrieveError> {
        sink.event(ProgressEvent {
            message: format!("phase=Assemble; writing {output_name}"),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let report = assemble(&self.concatenator, dir, output_name, session, delete_parts)?;
        sink.event(ProgressEvent {
            message: format!(
                "assemble.done inputs={} deleted={}",
                report.inputs.len(),
                report.deleted
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::output::JsonOutput;

    #[derive(Default)]
    struct MockArchive {
        targets: Mutex<Vec<String>>,
    }

    impl ArchiveClient for MockArchive {
        fn submit(&self, request: &RequestSpec, destination: &Path) -> Result<(), RetrieveError> {
            self.targets
                .lock()
                .unwrap()
                .push(request.target()?.to_string());
            std::fs::write(destination, request.date()?)
                .map_err(|err| RetrieveError::Filesystem(err.to_string()))
        }
    }

    struct CatConcatenator;

    impl Concatenator for CatConcatenator {
        fn run(&self, inputs: &[PathBuf], output: &Path) -> Result<(), RetrieveError> {
            let mut content = Vec::new();
            for input in inputs {
                content.extend(std::fs::read(input).unwrap());
            }
            std::fs::write(output, content).map_err(|err| RetrieveError::Filesystem(err.to_string()))
        }
    }

    #[test]
    fn retrieve_joins_chunks_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let retriever = Retriever::new(MockArchive::default(), CatConcatenator, temp.path());
        let overrides: RequestSpec = [("date", "2000-06-01/to/2002-01-31"), ("target", "t.nc")]
            .into_iter()
            .collect();

        let result = retriever
            .retrieve_spec(Some(&overrides), RetrieveOptions::default(), &JsonOutput)
            .unwrap();

        let output = std::fs::read_to_string(temp.path().join("t").join("t.nc")).unwrap();
        assert_eq!(
            output,
            "2000-06-01/to/2000-12-31\
             2001-01-01/to/2001-12-31\
             2002-01-01/to/2002-01-31"
        );
        assert_eq!(result.deleted, 3);
        assert_eq!(retriever.client.targets.lock().unwrap().len(), 3);
    }

    #[test]
    fn target_with_directory_is_rejected() {
        let retriever = Retriever::new(MockArchive::default(), CatConcatenator, ".");
        let overrides: RequestSpec = [("target", "nested/t.nc")].into_iter().collect();
        let err = retriever
            .plan(Some(&overrides), DatasetTemplate::EraInterim)
            .unwrap_err();
        assert!(matches!(err, RetrieveError::InvalidTarget(_)));
    }
}
