mod size;

use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{PipewatchError, Result};
use crate::metrics::MetricSeries;
use crate::wildcard::Wildcard;

use size::{measure, PackageFormat};

const MB: f64 = 1_000_000.0;

const COMPRESSED_SIZE_METRIC: &str = "datadog.agent.compressed_package.size";
const UNCOMPRESSED_SIZE_METRIC: &str = "datadog.agent.package.size";

/// Finds the single file matching `pattern`.
///
/// Wildcards are allowed in the file name only; the directory part is taken
/// literally.
///
/// # Errors
///
/// Returns `PipewatchError::Package` unless exactly one file matches.
pub fn get_package_path(pattern: &str) -> Result<PathBuf> {
    let pattern_path = Path::new(pattern);
    let dir = match pattern_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_pattern = pattern_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PipewatchError::Package(format!("Invalid package pattern {pattern}")))?;
    let wildcard = Wildcard::new(file_pattern)?;

    if !wildcard.has_wildcards() {
        return if pattern_path.is_file() {
            Ok(pattern_path.to_path_buf())
        } else {
            Err(PipewatchError::Package(format!(
                "Couldn't find any file matching {pattern}"
            )))
        };
    }

    let mut matches: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| wildcard.is_match(name))
            })
            .map(|entry| entry.path())
            .collect(),
        Err(_) => Vec::new(),
    };
    matches.sort();

    match matches.len() {
        0 => Err(PipewatchError::Package(format!(
            "Couldn't find any file matching {pattern}"
        ))),
        1 => Ok(matches.remove(0)),
        _ => {
            let paths: Vec<String> = matches.iter().map(|p| p.display().to_string()).collect();
            Err(PipewatchError::Package(format!(
                "Too many files matching {pattern}: {}",
                paths.join(", ")
            )))
        }
    }
}

/// Sizes of a freshly built package and of the last stable release.
#[derive(Debug, Clone)]
pub struct SizeComparison {
    pub package_type: String,
    pub last_stable: String,
    pub new_size: u64,
    pub stable_size: u64,
    /// Largest accepted increase, in bytes
    pub threshold: u64,
}

impl SizeComparison {
    /// Signed growth from the stable package, in bytes.
    pub fn diff(&self) -> i128 {
        i128::from(self.new_size) - i128::from(self.stable_size)
    }

    pub fn is_too_large(&self) -> bool {
        self.diff() > i128::from(self.threshold)
    }

    pub fn report(&self) -> String {
        let new_mb = to_mb(self.new_size as f64);
        let stable_mb = to_mb(self.stable_size as f64);
        let diff_mb = to_mb(self.diff() as f64);
        let threshold_mb = to_mb(self.threshold as f64);

        let mut report = String::new();
        let verdict = if self.is_too_large() { "too large" } else { "OK" };
        let _ = writeln!(report, "{} size increase is {verdict}:", self.package_type);
        let _ = writeln!(report, "  New package size is {new_mb:.2}MB");
        let _ = writeln!(
            report,
            "  Stable package ({}) size is {stable_mb:.2}MB",
            self.last_stable
        );
        if self.is_too_large() {
            let _ = write!(
                report,
                "  Diff is {diff_mb:.2}MB > {threshold_mb:.2}MB (max allowed diff)"
            );
        } else {
            let _ = write!(
                report,
                "  Diff is {diff_mb:.2}MB (max allowed diff: {threshold_mb:.2}MB)"
            );
        }
        report
    }
}

fn to_mb(bytes: f64) -> f64 {
    bytes / MB
}

/// Measures both packages concurrently and compares their sizes.
///
/// # Errors
///
/// Returns an error if a pattern does not match exactly one file or a size
/// cannot be measured.
pub async fn compare_size(
    new_package: &str,
    stable_package: &str,
    package_type: &str,
    last_stable: &str,
    threshold: u64,
) -> Result<SizeComparison> {
    let format = PackageFormat::from_package_type(package_type);
    let new_path = get_package_path(new_package)?;
    let stable_path = get_package_path(stable_package)?;

    info!(
        "Comparing {} against {}",
        new_path.display(),
        stable_path.display()
    );

    let (new_size, stable_size) =
        futures::try_join!(measure(&new_path, format), measure(&stable_path, format))?;

    Ok(SizeComparison {
        package_type: package_type.to_string(),
        last_stable: last_stable.to_string(),
        new_size,
        stable_size,
        threshold,
    })
}

/// What a package size series is tagged with.
#[derive(Debug, Clone)]
pub struct PackageTags {
    pub flavor: String,
    pub package_os: String,
    pub major_version: String,
    pub git_ref: String,
    pub bucket_branch: String,
    pub arch: String,
}

impl PackageTags {
    pub fn to_tags(&self) -> Vec<String> {
        vec![
            format!("os:{}", self.package_os),
            format!("package:datadog-{}", self.flavor),
            format!("agent:{}", self.major_version),
            format!("git_ref:{}", self.git_ref),
            format!("bucket_branch:{}", self.bucket_branch),
            format!("arch:{}", self.arch),
        ]
    }
}

/// Compressed and, for deb and rpm packages, uncompressed size series.
///
/// # Errors
///
/// Returns `PipewatchError::Package` if nothing exists at `path`, or an
/// error if the uncompressed size cannot be measured.
pub async fn compute_package_size_metrics(
    path: &Path,
    tags: &PackageTags,
    timestamp: i64,
) -> Result<Vec<MetricSeries>> {
    if !path.exists() {
        return Err(PipewatchError::Package(format!(
            "Package not found at path {}",
            path.display()
        )));
    }

    let tags = tags.to_tags();
    let compressed = fs::metadata(path)?.len();
    let mut series = vec![MetricSeries::gauge(
        COMPRESSED_SIZE_METRIC,
        timestamp,
        compressed as f64,
        &tags,
    )];

    match PackageFormat::from_path(path) {
        Some(format) => {
            let uncompressed = measure(path, format).await?;
            series.push(MetricSeries::gauge(
                UNCOMPRESSED_SIZE_METRIC,
                timestamp,
                uncompressed as f64,
                &tags,
            ));
        }
        None => debug!("No uncompressed size for {}", path.display()),
    }

    Ok(series)
}
