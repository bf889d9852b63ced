//! File processing: one lint session per template

use anyhow::Context;
use hamlcop_lib::analyzer::Analyzer;
use hamlcop_lib::document::TemplateDocument;
use hamlcop_lib::session::{LintSession, SessionOptions, SessionReport};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct FileOutcome {
    pub path: PathBuf,
    pub result: anyhow::Result<SessionReport>,
    /// The corrected text was written back
    pub written: bool,
}

pub fn process_file(path: &Path, analyzer: &dyn Analyzer, options: &SessionOptions, keep_broken: bool) -> FileOutcome {
    let start = Instant::now();
    let mut written = false;
    let result = lint_file(path, analyzer, options, keep_broken, &mut written);

    let duration = start.elapsed();
    if duration.as_millis() > 1000 {
        log::debug!("File {} took {:?}", path.display(), duration);
    }
    FileOutcome {
        path: path.to_path_buf(),
        result,
        written,
    }
}

fn lint_file(
    path: &Path,
    analyzer: &dyn Analyzer,
    options: &SessionOptions,
    keep_broken: bool,
    written: &mut bool,
) -> anyhow::Result<SessionReport> {
    let document = TemplateDocument::load(path)?.keep_broken_text(keep_broken);
    let mut session = LintSession::new(document, options.clone());
    let report = session.run(analyzer)?;

    let mut document = session.into_document();
    *written = document
        .write_to_disk()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(report)
}

/// Process every file, in parallel when the `parallel` feature is on.
///
/// The analyzer (and its configuration cache) is the only shared state.
pub fn process_files(paths: &[PathBuf], analyzer: &dyn Analyzer, options: &SessionOptions, keep_broken: bool) -> Vec<FileOutcome> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        paths
            .par_iter()
            .map(|path| process_file(path, analyzer, options, keep_broken))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        paths
            .iter()
            .map(|path| process_file(path, analyzer, options, keep_broken))
            .collect()
    }
}
