use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Name of the artifact fetched for every build/platform pair.
pub const ARTIFACT_FILE: &str = "latest_commits.txt";
/// Metadata written next to each artifact.
pub const METADATA_FILE: &str = "meta.json";
/// Aggregated failures, written at the output root.
pub const ERROR_REPORT_FILE: &str = "fetch_errors.json";

/// Errors that can occur when expanding builds and platforms into targets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no builds given")]
    NoBuilds,

    #[error("no platforms given")]
    NoPlatforms,

    #[error("base URL is empty")]
    EmptyBaseUrl,

    #[error("invalid {field} identifier {value:?}: must be a single non-empty path segment")]
    InvalidIdentifier { field: &'static str, value: String },
}

/// One artifact to fetch: where it comes from and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTarget {
    build: String,
    platform: String,
    source_url: String,
    dest_dir: PathBuf,
}

impl FetchTarget {
    pub fn build(&self) -> &str {
        &self.build
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dest_dir.join(ARTIFACT_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dest_dir.join(METADATA_FILE)
    }
}

/// Build the artifact URL for a build/platform pair.
///
/// A single trailing `/` on `base_url` is collapsed; nothing else is
/// normalized.
pub fn source_url(base_url: &str, build: &str, platform: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    format!("{base}/{build}/{platform}/{ARTIFACT_FILE}")
}

/// Expand `builds × platforms` into fetch targets.
///
/// Builds form the outer loop and platforms the inner loop. Repeated
/// identifiers are dropped so every pair is unique.
pub fn resolve<B, P>(
    builds: &[B],
    platforms: &[P],
    base_url: &str,
    out_root: &Path,
) -> Result<Vec<FetchTarget>, ResolveError>
where
    B: AsRef<str>,
    P: AsRef<str>,
{
    if base_url.trim().is_empty() {
        return Err(ResolveError::EmptyBaseUrl);
    }

    let builds = unique_identifiers("build", builds)?;
    if builds.is_empty() {
        return Err(ResolveError::NoBuilds);
    }

    let platforms = unique_identifiers("platform", platforms)?;
    if platforms.is_empty() {
        return Err(ResolveError::NoPlatforms);
    }

    let mut targets = Vec::with_capacity(builds.len() * platforms.len());
    for build in &builds {
        for platform in &platforms {
            targets.push(FetchTarget {
                build: (*build).to_owned(),
                platform: (*platform).to_owned(),
                source_url: source_url(base_url, build, platform),
                dest_dir: out_root.join(build).join(platform),
            });
        }
    }

    Ok(targets)
}

fn unique_identifiers<'a, S: AsRef<str>>(
    field: &'static str,
    values: &'a [S],
) -> Result<Vec<&'a str>, ResolveError> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(values.len());

    for value in values {
        let value = value.as_ref();
        if !is_path_segment(value) {
            return Err(ResolveError::InvalidIdentifier {
                field,
                value: value.to_owned(),
            });
        }
        if seen.insert(value) {
            unique.push(value);
        }
    }

    Ok(unique)
}

fn is_path_segment(value: &str) -> bool {
    !value.trim().is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
}
