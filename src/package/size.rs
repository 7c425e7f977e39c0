use std::path::Path;

use log::debug;
use tokio::process::Command;

use crate::error::{PipewatchError, Result};

/// Package formats whose uncompressed size we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Deb,
    Rpm,
}

impl PackageFormat {
    /// `deb`, `heroku-deb` and friends are Debian packages; anything else is
    /// queried with `rpm`.
    pub fn from_package_type(package_type: &str) -> Self {
        if package_type.ends_with("deb") {
            Self::Deb
        } else {
            Self::Rpm
        }
    }

    /// Format of a package file, from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("deb") => Some(Self::Deb),
            Some("rpm") => Some(Self::Rpm),
            _ => None,
        }
    }

    fn query(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Deb => ("dpkg-deb", &["--info"]),
            Self::Rpm => ("rpm", &["-qip"]),
        }
    }

    /// Extracts the uncompressed size in bytes from the query output.
    pub fn parse_size(self, output: &str) -> Result<u64> {
        match self {
            Self::Deb => parse_deb_installed_size(output),
            Self::Rpm => parse_rpm_size(output),
        }
    }
}

/// `dpkg-deb --info` reports `Installed-Size` in KiB.
fn parse_deb_installed_size(output: &str) -> Result<u64> {
    field_value(output, "Installed-Size")
        .ok_or_else(|| PipewatchError::Package("No Installed-Size in dpkg-deb output".into()))
        .and_then(|value| parse_number(value, "Installed-Size"))
        .map(|kib| kib * 1024)
}

fn parse_rpm_size(output: &str) -> Result<u64> {
    field_value(output, "Size")
        .ok_or_else(|| PipewatchError::Package("No Size in rpm output".into()))
        .and_then(|value| parse_number(value, "Size"))
}

/// Value of the first `key: value` line whose key is exactly `key`.
fn field_value<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == key).then(|| value.trim())
    })
}

fn parse_number(value: &str, field: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| PipewatchError::Package(format!("Invalid {field} value `{value}`")))
}

/// Uncompressed size of the package at `path`, in bytes.
///
/// # Errors
///
/// Returns an error if the query tool cannot run, exits non-zero or prints
/// no size.
pub async fn measure(path: &Path, format: PackageFormat) -> Result<u64> {
    let (program, args) = format.query();
    let command = format!("{program} {} {}", args.join(" "), path.display());
    debug!("Running {command}");

    let output = Command::new(program)
        .args(args)
        .arg(path)
        .output()
        .await
        .map_err(|e| PipewatchError::Command {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(PipewatchError::Command {
            command,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    format.parse_size(&String::from_utf8_lossy(&output.stdout))
}
