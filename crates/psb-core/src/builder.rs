//! Materialize classified links as subscription files.
//!
//! Layout of the output directory:
//! - `<category>.txt` for every non-empty category (fallback included)
//! - `all_proxies.txt`: sorted, unique links of every non-fallback category

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    categories::{CategoryTable, AGGREGATE_NAME},
    classifier::{classify, Buckets},
    errors::{ArtifactFailure, BuildError},
};

/// One file written by the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub links: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub artifacts: Vec<Artifact>,
}

impl BuildReport {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

/// Classify `links` and write one file per category plus the aggregate.
///
/// Writes nothing when `links` is empty or nothing classifies.
pub fn build_sub_files<S: AsRef<str>>(
    links: &[S],
    out_dir: &Path,
    table: &CategoryTable,
) -> Result<BuildReport, BuildError> {
    if links.is_empty() {
        tracing::info!("no links provided; no subscription files generated");
        return Ok(BuildReport::default());
    }
    let buckets = classify(links.iter().map(|l| l.as_ref()), table);
    write_buckets(&buckets, out_dir, table)
}

/// Write already-classified buckets into `out_dir`.
pub fn write_buckets(
    buckets: &Buckets,
    out_dir: &Path,
    table: &CategoryTable,
) -> Result<BuildReport, BuildError> {
    if buckets.is_empty() {
        tracing::info!("no valid links classified; no subscription files generated");
        return Ok(BuildReport::default());
    }

    prepare_destination(out_dir)?;
    tracing::info!(
        categories = buckets.len(),
        dir = %out_dir.display(),
        "building subscription files"
    );

    let mut report = BuildReport::default();
    let mut failures = Vec::new();

    for (category, links) in buckets {
        if links.is_empty() {
            continue;
        }
        write_artifact(out_dir, category, links, &mut report, &mut failures);
    }

    let aggregate: BTreeSet<&str> = buckets
        .iter()
        .filter(|(category, _)| table.is_mapped(category))
        .flat_map(|(_, links)| links.iter().map(String::as_str))
        .collect();
    let aggregate: Vec<&str> = aggregate.into_iter().collect();
    write_artifact(out_dir, AGGREGATE_NAME, &aggregate, &mut report, &mut failures);

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(BuildError::WriteFailure {
            failures,
            written: report.artifacts.into_iter().map(|a| a.name).collect(),
        })
    }
}

/// Newline-joined links with exactly one trailing newline; `"\n"` when empty.
pub fn render_links<S: AsRef<str>>(links: &[S]) -> String {
    let mut content = links
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

fn prepare_destination(out_dir: &Path) -> Result<(), BuildError> {
    let unwritable = |reason: String| BuildError::DestinationUnwritable {
        path: out_dir.to_path_buf(),
        reason,
    };

    match fs::metadata(out_dir) {
        Ok(md) if !md.is_dir() => {
            return Err(unwritable("exists but is not a directory".to_string()));
        }
        Ok(md) if md.permissions().readonly() => {
            return Err(unwritable("directory is read-only".to_string()));
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(out_dir).map_err(|e| unwritable(format!("cannot create: {e}")))?;
        }
        Err(e) => return Err(unwritable(e.to_string())),
    }
    Ok(())
}

fn write_artifact<S: AsRef<str>>(
    out_dir: &Path,
    name: &str,
    links: &[S],
    report: &mut BuildReport,
    failures: &mut Vec<ArtifactFailure>,
) {
    let path = out_dir.join(format!("{name}.txt"));
    match fs::write(&path, render_links(links)) {
        Ok(()) => {
            tracing::info!(count = links.len(), path = %path.display(), "wrote links");
            report.artifacts.push(Artifact {
                name: name.to_string(),
                path,
                links: links.len(),
            });
        }
        Err(source) => {
            tracing::error!(path = %path.display(), "failed to write artifact: {source}");
            failures.push(ArtifactFailure {
                name: name.to_string(),
                path,
                source,
            });
        }
    }
}
