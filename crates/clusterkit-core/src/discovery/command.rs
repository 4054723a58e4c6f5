//! Local commands used by the extractors: the `hdfs` client, `unzip` and the
//! database clients, plus the in-process tarball writer.

use anyhow::{Context, Result};
use flate2::{write::GzEncoder, Compression};
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Builder;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::remote::CommandOutput;

/// Run `program args..` and capture its output. A non-zero exit is not an
/// error here; callers decide.
pub async fn run(program: &str, args: &[String]) -> Result<CommandOutput> {
    run_with_env(program, args, &[]).await
}

/// [`run`] with extra environment variables. Their values are never logged.
pub async fn run_with_env(program: &str, args: &[String], env: &[(&str, &str)]) -> Result<CommandOutput> {
    let output = Command::new(program)
        .args(args)
        .envs(env.iter().copied())
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;
    let result = CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    info!(command = %format!("{} {}", program, args.join(" ")), exit_code = ?result.exit_code, "executed system command");
    if !result.stdout.trim().is_empty() {
        debug!(stdout = %result.stdout.trim_end(), "command output");
    }
    if !result.stderr.trim().is_empty() {
        // the hdfs client logs everything to stderr
        if program == "hdfs" && result.success() {
            debug!(stderr = %result.stderr.trim_end(), "command output");
        } else {
            error!(stderr = %result.stderr.trim_end(), "command failed");
        }
    }
    Ok(result)
}

/// Like [`run`] but failing on a non-zero exit.
pub async fn run_checked(program: &str, args: &[String]) -> Result<CommandOutput> {
    let output = run(program, args).await?;
    if !output.success() {
        anyhow::bail!("{} failed: {}", program, output.stderr.trim());
    }
    Ok(output)
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|s| s.as_ref().to_string()).collect()
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// `hdfs --config <dir> ...` against one cluster's client configuration.
#[derive(Debug, Clone)]
pub struct HdfsClient {
    config_dir: PathBuf,
}

impl HdfsClient {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = strings(["--config", path_arg(&self.config_dir).as_str()]);
        args.extend(strings(rest));
        args
    }

    pub async fn groups(&self) -> Result<CommandOutput> {
        run("hdfs", &self.args(&["groups"])).await
    }

    pub async fn dir_exists(&self, dir: &str) -> Result<bool> {
        let exists = run("hdfs", &self.args(&["dfs", "-test", "-d", dir])).await?.success();
        info!(dir, exists, "checked HDFS directory");
        Ok(exists)
    }

    /// `hdfs dfs -get <src> <dest>`, creating `dest` first.
    pub async fn get(&self, src: &str, dest: &Path) -> Result<CommandOutput> {
        tokio::fs::create_dir_all(dest)
            .await
            .with_context(|| format!("Failed to create '{}'", dest.display()))?;
        run("hdfs", &self.args(&["dfs", "-get", src, path_arg(dest).as_str()])).await
    }

    pub async fn fetch_image(&self, dest: &Path) -> Result<CommandOutput> {
        run("hdfs", &self.args(&["dfsadmin", "-fetchImage", path_arg(dest).as_str()])).await
    }
}

/// Arguments of `hdfs oiv` converting an fsimage into a tab-delimited dump.
pub fn oiv_args(image: &Path, output: &Path) -> Vec<String> {
    strings([
        "oiv",
        "-p",
        "Delimited",
        "-i",
        path_arg(image).as_str(),
        "-o",
        path_arg(output).as_str(),
    ])
}

pub async fn convert_image(image: &Path, output: &Path) -> Result<CommandOutput> {
    run("hdfs", &oiv_args(image, output)).await
}

pub fn unzip_args(archive: &Path, dest: &Path) -> Vec<String> {
    strings(["-o", "-q", path_arg(archive).as_str(), "-d", path_arg(dest).as_str()])
}

pub async fn unzip(archive: &Path, dest: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest)
        .await
        .with_context(|| format!("Failed to create '{}'", dest.display()))?;
    run_checked("unzip", &unzip_args(archive, dest))
        .await
        .with_context(|| format!("Failed to unzip '{}'", archive.display()))?;
    Ok(())
}

/// Archive the contents of `dir` into a gzipped `archive`. The archive itself
/// is left out when it lives inside `dir`.
pub async fn tar_directory(archive: &Path, dir: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || write_tarball(&archive, &dir))
        .await
        .context("tarball task panicked")?
}

fn write_tarball(archive: &Path, dir: &Path) -> Result<()> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list '{}'", dir.display()))? {
        let path = entry?.path();
        if path != archive {
            entries.push(path);
        }
    }
    entries.sort();
    info!(archive = %archive.display(), source = %dir.display(), files = entries.len(), "creating tarball");

    let file = File::create(archive).with_context(|| format!("Failed to create '{}'", archive.display()))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    for path in &entries {
        let Some(name) = path.file_name() else { continue };
        let added = if path.is_dir() {
            builder.append_dir_all(name, path)
        } else {
            builder.append_path_with_name(path, name)
        };
        added.with_context(|| format!("Failed to add '{}' to '{}'", path.display(), archive.display()))?;
    }
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .with_context(|| format!("Failed to write '{}'", archive.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdfs_args() {
        let hdfs = HdfsClient::new("/tmp/conf");
        assert_eq!(
            hdfs.args(&["dfs", "-test", "-d", "/user/history/done"]),
            vec!["--config", "/tmp/conf", "dfs", "-test", "-d", "/user/history/done"]
        );
    }

    #[test]
    fn test_oiv_args() {
        let args = oiv_args(Path::new("/b/fsimage"), Path::new("/b/hdfs_fs.tsv"));
        assert_eq!(args, vec!["oiv", "-p", "Delimited", "-i", "/b/fsimage", "-o", "/b/hdfs_fs.tsv"]);
    }

    #[test]
    fn test_unzip_args() {
        let args = unzip_args(Path::new("/tmp/c.zip"), Path::new("/tmp/c"));
        assert_eq!(args, vec!["-o", "-q", "/tmp/c.zip", "-d", "/tmp/c"]);
    }

    fn archive_names(archive: &Path) -> Vec<String> {
        let file = File::open(archive).unwrap();
        let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut names: Vec<String> = tarball
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_tar_directory_skips_archive_itself() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("done/2024")).unwrap();
        std::fs::write(dir.path().join("done/2024/job_1.jhist"), "{}").unwrap();
        std::fs::write(dir.path().join("summary.txt"), "ok").unwrap();
        let archive = dir.path().join("MR_JOB_HISTORY.tar.gz");

        tar_directory(&archive, dir.path()).await.unwrap();

        let names = archive_names(&archive);
        assert!(names.contains(&"done/2024/job_1.jhist".to_string()));
        assert!(names.contains(&"summary.txt".to_string()));
        assert!(!names.iter().any(|n| n.ends_with(".tar.gz")));
    }

    #[tokio::test]
    async fn test_tar_directory_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("IMPALA_PROFILE_LOGS.tar.gz");

        tar_directory(&archive, dir.path()).await.unwrap();

        assert!(archive.exists());
        assert!(archive_names(&archive).is_empty());
    }
}
