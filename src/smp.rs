use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::{debug, info};
use tokio::process::Command;

use crate::error::{PipewatchError, Result};

const TARGET_IMAGE: &str = "smp-local-agent:latest";
const TARGET_COMMAND: &str = "/bin/entrypoint.sh";
const TARGET: &str = "datadog-agent";

const SMP_INSTALL: &str =
    "cargo install --git https://github.com/DataDog/single-machine-performance smp --bin smp";
const LADING_INSTALL: &str =
    "cargo install --git https://github.com/DataDog/lading lading --bin lading";

/// Family of single-machine-performance experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExperimentKind {
    Workload,
    Regression,
}

impl ExperimentKind {
    /// Directory passed to `smp local-run --experiment-dir`.
    pub fn experiment_dir(self, repo_root: &Path) -> PathBuf {
        let test = repo_root.join("test");
        match self {
            Self::Workload => test.join("workload-checks").join("typical"),
            Self::Regression => test.join("regression"),
        }
    }

    /// Directory holding one sub-directory per case.
    pub fn cases_dir(self, repo_root: &Path) -> PathBuf {
        self.experiment_dir(repo_root).join("cases")
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workload => write!(f, "workload"),
            Self::Regression => write!(f, "regression"),
        }
    }
}

/// Case names available for `kind`, sorted.
///
/// # Errors
///
/// Returns an error if the cases directory cannot be read.
pub fn list_experiments(repo_root: &Path, kind: ExperimentKind) -> Result<Vec<String>> {
    let dir = kind.cases_dir(repo_root);
    let entries = fs::read_dir(&dir).map_err(|e| {
        PipewatchError::Config(format!(
            "Cannot read {kind} experiments in {}: {e}",
            dir.display()
        ))
    })?;

    let mut cases: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    cases.sort();

    Ok(cases)
}

/// One experiment picked from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
    pub kind: ExperimentKind,
    pub name: String,
}

impl Experiment {
    /// # Errors
    ///
    /// Exactly one of `workload` and `regression` must be given.
    pub fn from_options(workload: Option<String>, regression: Option<String>) -> Result<Self> {
        match (workload, regression) {
            (Some(name), None) => Ok(Self {
                kind: ExperimentKind::Workload,
                name,
            }),
            (None, Some(name)) => Ok(Self {
                kind: ExperimentKind::Regression,
                name,
            }),
            (None, None) => Err(PipewatchError::Config(
                "No experiment specified, please specify either --workload-experiment or --regression-experiment".into(),
            )),
            (Some(_), Some(_)) => Err(PipewatchError::Config(
                "Specify only one of --workload-experiment and --regression-experiment".into(),
            )),
        }
    }
}

/// First executable named `binary` in the directories of `path_var`.
pub fn find_in_path(binary: &str, path_var: &std::ffi::OsStr) -> Option<PathBuf> {
    env::split_paths(path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn locate(binary: &str, install: &str) -> Result<PathBuf> {
    let path_var = env::var_os("PATH").unwrap_or_default();
    find_in_path(binary, &path_var).ok_or_else(|| PipewatchError::Command {
        command: binary.to_string(),
        message: format!("'{binary}' binary not found on path. Install via `{install}`"),
    })
}

/// Locations of the `smp` and `lading` binaries.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub smp: PathBuf,
    pub lading: PathBuf,
}

impl Toolchain {
    /// # Errors
    ///
    /// Returns an error naming the install command of the first missing binary.
    pub fn locate() -> Result<Self> {
        Ok(Self {
            smp: locate("smp", SMP_INSTALL)?,
            lading: locate("lading", LADING_INSTALL)?,
        })
    }
}

/// A fully assembled `smp local-run` invocation.
#[derive(Debug, Clone)]
pub struct LocalRun {
    toolchain: Toolchain,
    experiment_dir: PathBuf,
    case: String,
    extra_args: Vec<String>,
}

impl LocalRun {
    pub fn new(
        repo_root: &Path,
        experiment: &Experiment,
        toolchain: Toolchain,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            toolchain,
            experiment_dir: experiment.kind.experiment_dir(repo_root),
            case: experiment.name.clone(),
            extra_args,
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "local-run".into(),
            "--experiment-dir".into(),
            self.experiment_dir.clone().into(),
            "--case".into(),
            self.case.clone().into(),
            "--target-image".into(),
            TARGET_IMAGE.into(),
            "--lading-path".into(),
            self.toolchain.lading.clone().into(),
            "--target-command".into(),
            TARGET_COMMAND.into(),
            "--target".into(),
            TARGET.into(),
        ];
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// # Errors
    ///
    /// Returns an error if `smp` cannot start or exits non-zero.
    pub async fn run(&self) -> Result<()> {
        info!("Running {} experiment {}", self.experiment_dir.display(), self.case);
        run_command(self.toolchain.smp.as_os_str(), &self.args()).await
    }
}

/// Runs `program` with inherited stdio and waits for it.
///
/// # Errors
///
/// Returns `PipewatchError::Command` if it cannot start or exits non-zero.
pub async fn run_command(program: &std::ffi::OsStr, args: &[OsString]) -> Result<()> {
    let command = std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    debug!("Running {command}");

    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| PipewatchError::Command {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(PipewatchError::Command {
            command,
            message: format!("exited with {status}"),
        })
    }
}

/// Builds the agent image, then runs the experiment.
///
/// `build_command` is skipped when `skip_build` is set.
///
/// # Errors
///
/// Returns an error if a binary is missing, no build command is configured
/// while building is requested, or a child process fails.
pub async fn local_run(
    repo_root: &Path,
    experiment: &Experiment,
    extra_args: Vec<String>,
    build_command: Option<&[String]>,
    skip_build: bool,
) -> Result<()> {
    let toolchain = Toolchain::locate()?;

    if !skip_build {
        let Some((program, args)) = build_command.and_then(<[String]>::split_first) else {
            return Err(PipewatchError::Config(
                "No smp build-command configured; set [smp] build-command or pass --skip-build"
                    .into(),
            ));
        };
        info!("Building {TARGET_IMAGE}");
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        run_command(program.as_ref(), &args).await?;
    }

    LocalRun::new(repo_root, experiment, toolchain, extra_args)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_with_cases() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for case in ["uds_dogstatsd_to_api", "file_tree", "basic_py_check"] {
            fs::create_dir_all(root.path().join("test/regression/cases").join(case)).unwrap();
        }
        fs::write(root.path().join("test/regression/cases/README.md"), "").unwrap();
        fs::create_dir_all(root.path().join("test/workload-checks/typical/cases/idle")).unwrap();
        root
    }

    #[test]
    fn test_list_regression_experiments_sorted() {
        let root = repo_with_cases();
        let cases = list_experiments(root.path(), ExperimentKind::Regression).unwrap();
        assert_eq!(cases, vec!["basic_py_check", "file_tree", "uds_dogstatsd_to_api"]);
    }

    #[test]
    fn test_list_workload_experiments() {
        let root = repo_with_cases();
        let cases = list_experiments(root.path(), ExperimentKind::Workload).unwrap();
        assert_eq!(cases, vec!["idle"]);
    }

    #[test]
    fn test_list_without_cases_directory() {
        let root = tempfile::tempdir().unwrap();
        let err = list_experiments(root.path(), ExperimentKind::Workload).unwrap_err();
        assert!(err.to_string().contains("workload experiments"));
    }

    #[cfg(test)]
    mod from_options {
        use super::*;

        #[test]
        fn workload() {
            let experiment = Experiment::from_options(Some("idle".into()), None).unwrap();
            assert_eq!(experiment.kind, ExperimentKind::Workload);
            assert_eq!(experiment.name, "idle");
        }

        #[test]
        fn regression() {
            let experiment = Experiment::from_options(None, Some("file_tree".into())).unwrap();
            assert_eq!(experiment.kind, ExperimentKind::Regression);
        }

        #[test]
        fn neither() {
            let err = Experiment::from_options(None, None).unwrap_err();
            assert!(err.to_string().contains("No experiment specified"));
        }

        #[test]
        fn both() {
            assert!(Experiment::from_options(Some("a".into()), Some("b".into())).is_err());
        }
    }

    #[cfg(unix)]
    fn install(dir: &Path, binary: &str, mode: u32) {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(binary);
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_path() {
        let bin = tempfile::tempdir().unwrap();
        install(bin.path(), "lading", 0o755);
        let path_var = env::join_paths([Path::new("/nonexistent"), bin.path()]).unwrap();

        assert_eq!(
            find_in_path("lading", &path_var),
            Some(bin.path().join("lading"))
        );
        assert_eq!(find_in_path("smp", &path_var), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_path_skips_non_executable_files() {
        let plain = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        install(plain.path(), "smp", 0o644);
        install(bin.path(), "smp", 0o755);

        let path_var = env::join_paths([plain.path(), bin.path()]).unwrap();
        assert_eq!(find_in_path("smp", &path_var), Some(bin.path().join("smp")));

        let only_plain = env::join_paths([plain.path()]).unwrap();
        assert_eq!(find_in_path("smp", &only_plain), None);
    }

    #[test]
    fn test_local_run_arguments() {
        let experiment = Experiment {
            kind: ExperimentKind::Regression,
            name: "file_tree".to_string(),
        };
        let toolchain = Toolchain {
            smp: PathBuf::from("/usr/local/bin/smp"),
            lading: PathBuf::from("/usr/local/bin/lading"),
        };
        let run = LocalRun::new(
            Path::new("/src/agent"),
            &experiment,
            toolchain,
            vec!["--replicas".to_string(), "2".to_string()],
        );

        let args: Vec<String> = run
            .args()
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "local-run",
                "--experiment-dir",
                "/src/agent/test/regression",
                "--case",
                "file_tree",
                "--target-image",
                "smp-local-agent:latest",
                "--lading-path",
                "/usr/local/bin/lading",
                "--target-command",
                "/bin/entrypoint.sh",
                "--target",
                "datadog-agent",
                "--replicas",
                "2",
            ]
        );
    }

    #[test]
    fn test_run_command_success() {
        tokio_test::block_on(run_command("true".as_ref(), &[])).unwrap();
    }

    #[test]
    fn test_run_command_failure() {
        let err = tokio_test::block_on(run_command("false".as_ref(), &[])).unwrap_err();
        assert!(matches!(err, PipewatchError::Command { .. }));
        assert!(err.to_string().contains("exited with"));
    }
}
