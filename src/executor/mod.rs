// src/executor/mod.rs

//! Build execution: the fetch → patch → configure → build → install pipeline
//!
//! Each build runs in a throwaway working directory with a scrubbed,
//! explicitly constructed environment; installed files land in the image
//! directory the caller provides (normally a store staging area), never in
//! a shared prefix. Phase commands run under `sh -c` with captured output
//! and an optional wall-clock timeout, and recipes can attach hooks that
//! run before, after, or instead of a phase.

use crate::error::{Error, Result};
use crate::fetch::SourceCache;
use crate::recipe::{HookWhen, Recipe};
use crate::spec::ConcreteSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// Logical install prefix shared by every built package; actual files are
/// staged under the image directory via DESTDIR
pub const INSTALL_PREFIX: &str = "/usr";

/// The build phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Fetch,
    Patch,
    Autoreconf,
    Configure,
    Build,
    Install,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::Fetch,
        Phase::Patch,
        Phase::Autoreconf,
        Phase::Configure,
        Phase::Build,
        Phase::Install,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Patch => "patch",
            Self::Autoreconf => "autoreconf",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything an executor needs to build one spec
pub struct BuildTask {
    pub spec: Arc<ConcreteSpec>,
    pub recipe: Arc<Recipe>,
    /// Image directories of already-built dependencies visible to this build
    pub dep_images: Vec<PathBuf>,
    /// Destination for installed files (DESTDIR)
    pub image_dir: PathBuf,
    /// Parallelism passed to build tools via `%(jobs)s`
    pub jobs: u32,
    /// Wall-clock limit per phase command
    pub timeout: Option<Duration>,
}

/// Result of a successful build
#[derive(Debug)]
pub struct BuildOutput {
    /// Combined log of every phase command
    pub log: String,
}

/// Something that can turn a build task into an installed image.
///
/// The scheduler only depends on this trait; production uses
/// [`BuildExecutor`], tests substitute scripted implementations.
pub trait Executor: Send + Sync {
    fn build(&self, task: &BuildTask) -> Result<BuildOutput>;
}

/// The real executor: subprocess-per-phase with an isolated workspace
pub struct BuildExecutor {
    sources: SourceCache,
    /// Directory local patch files are resolved against
    patch_dir: Option<PathBuf>,
}

impl BuildExecutor {
    pub fn new(sources: SourceCache) -> Self {
        Self {
            sources,
            patch_dir: None,
        }
    }

    pub fn with_patch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.patch_dir = Some(dir.into());
        self
    }

    fn run_phases(&self, task: &BuildTask, workdir: &Path) -> Result<String> {
        let src_dir = workdir.join("src");
        fs::create_dir_all(&src_dir)?;
        fs::create_dir_all(&task.image_dir)?;

        let env = build_env(workdir, &task.dep_images);
        let mut log = String::new();

        for phase in Phase::ORDER {
            self.run_phase(task, phase, &src_dir, &env, &mut log)?;
        }
        Ok(log)
    }

    fn run_phase(
        &self,
        task: &BuildTask,
        phase: Phase,
        src_dir: &Path,
        env: &BTreeMap<String, String>,
        log: &mut String,
    ) -> Result<()> {
        let hooks = task.recipe.hooks_for(phase);
        let replaced = hooks.iter().any(|h| h.when == HookWhen::Replace);

        for hook in hooks.iter().filter(|h| h.when == HookWhen::Before) {
            self.run_command(task, phase, &hook.run, src_dir, env, log)?;
        }

        if replaced {
            for hook in hooks.iter().filter(|h| h.when == HookWhen::Replace) {
                self.run_command(task, phase, &hook.run, src_dir, env, log)?;
            }
        } else {
            match phase {
                Phase::Fetch => self.do_fetch(task, src_dir, env, log)?,
                Phase::Patch => self.do_patch(task, src_dir, env, log)?,
                _ => {
                    if let Some(template) = task.recipe.phase_command(phase) {
                        let cmd = template.to_string();
                        self.run_command(task, phase, &cmd, src_dir, env, log)?;
                    }
                }
            }
        }

        for hook in hooks.iter().filter(|h| h.when == HookWhen::After) {
            self.run_command(task, phase, &hook.run, src_dir, env, log)?;
        }
        Ok(())
    }

    /// Download (or reuse) the source archive and unpack it into `src_dir`
    fn do_fetch(
        &self,
        task: &BuildTask,
        src_dir: &Path,
        env: &BTreeMap<String, String>,
        log: &mut String,
    ) -> Result<()> {
        let entry = task
            .recipe
            .version_entry(&task.spec.version)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "recipe '{}' has no version {}",
                    task.spec.name, task.spec.version
                ))
            })?;
        let url = task.recipe.source_url(&task.spec.version);
        let archive = self.sources.materialize(&url, &entry.checksum()?)?;

        if is_archive(&archive) {
            let cmd = format!(
                "tar -xf '{}' -C '{}' --strip-components=1",
                archive.display(),
                src_dir.display()
            );
            self.run_command(task, Phase::Fetch, &cmd, src_dir, env, log)?;
        } else {
            let name = archive
                .file_name()
                .ok_or_else(|| Error::IoError(format!("bad source path {}", archive.display())))?;
            fs::copy(&archive, src_dir.join(name))?;
            log.push_str(&format!("==> fetch: copied {}\n", archive.display()));
        }
        Ok(())
    }

    /// Apply declared patches in order with `patch -p<strip>`
    fn do_patch(
        &self,
        task: &BuildTask,
        src_dir: &Path,
        env: &BTreeMap<String, String>,
        log: &mut String,
    ) -> Result<()> {
        for decl in &task.recipe.patches {
            let path = self.resolve_patch(&decl.file, decl.sha256.as_deref())?;
            let cmd = format!("patch -p{} -i '{}'", decl.strip, path.display());
            self.run_command(task, Phase::Patch, &cmd, src_dir, env, log)?;
        }
        Ok(())
    }

    fn resolve_patch(&self, file: &str, sha256: Option<&str>) -> Result<PathBuf> {
        if file.starts_with("http://") || file.starts_with("https://") {
            let sha = sha256.ok_or_else(|| {
                Error::ParseError(format!("remote patch '{}' requires a sha256", file))
            })?;
            let checksum = crate::hash::Hash::parse_prefixed(sha)
                .map_err(|e| Error::ParseError(format!("bad patch checksum: {}", e)))?;
            return self.sources.materialize(file, &checksum);
        }

        let path = PathBuf::from(file);
        if path.is_absolute() {
            return Ok(path);
        }
        match &self.patch_dir {
            Some(dir) => Ok(dir.join(path)),
            None => Ok(path),
        }
    }

    fn run_command(
        &self,
        task: &BuildTask,
        phase: Phase,
        template: &str,
        cwd: &Path,
        env: &BTreeMap<String, String>,
        log: &mut String,
    ) -> Result<()> {
        let cmd = task.recipe.substitute(
            template,
            &task.spec.version,
            INSTALL_PREFIX,
            &task.image_dir.display().to_string(),
            task.jobs,
        );
        debug!("{} [{}]: {}", task.spec.name_version(), phase, cmd);
        log.push_str(&format!("==> {}: {}\n", phase, cmd));

        let output = run_shell(&cmd, cwd, env, task.timeout, phase)?;
        log.push_str(&output.text);

        if !output.success {
            return Err(Error::PhaseFailure {
                phase,
                exit_code: output.exit_code,
                output: tail(&output.text, 50),
            });
        }
        Ok(())
    }
}

impl Executor for BuildExecutor {
    fn build(&self, task: &BuildTask) -> Result<BuildOutput> {
        info!(
            "building {} [{}]",
            task.spec.name_version(),
            task.spec.short_hash()
        );
        let workdir = TempDir::new()?;
        let log = self.run_phases(task, workdir.path())?;
        Ok(BuildOutput { log })
    }
}

struct ShellOutput {
    success: bool,
    exit_code: Option<i32>,
    text: String,
}

/// Run `sh -c cmd` with a scrubbed environment, capturing combined output.
/// On timeout the process is killed and the build fails.
fn run_shell(
    cmd: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
    phase: Phase,
) -> Result<ShellOutput> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // drain pipes on threads so a chatty child cannot deadlock the wait
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = std::thread::spawn(move || read_all(stdout));
    let err_reader = std::thread::spawn(move || read_all(stderr));

    let status = match timeout {
        Some(limit) => match child.wait_timeout(limit)? {
            Some(status) => status,
            None => {
                child.kill()?;
                child.wait()?;
                return Err(Error::TimeoutFailure {
                    phase,
                    seconds: limit.as_secs(),
                });
            }
        },
        None => child.wait()?,
    };

    let mut text = out_reader.join().unwrap_or_default();
    text.push_str(&err_reader.join().unwrap_or_default());

    Ok(ShellOutput {
        success: status.success(),
        exit_code: status.code(),
        text,
    })
}

fn read_all<R: Read>(source: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut r) = source {
        let mut bytes = Vec::new();
        if r.read_to_end(&mut bytes).is_ok() {
            buf = String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    buf
}

/// Environment for build subprocesses: a fixed base plus search paths into
/// every dependency image
pub fn build_env(workdir: &Path, dep_images: &[PathBuf]) -> BTreeMap<String, String> {
    let mut path_entries = Vec::new();
    let mut include_entries = Vec::new();
    let mut lib_entries = Vec::new();
    let mut pkgconfig_entries = Vec::new();

    for image in dep_images {
        let usr = image.join(INSTALL_PREFIX.trim_start_matches('/'));
        path_entries.push(usr.join("bin").display().to_string());
        include_entries.push(usr.join("include").display().to_string());
        lib_entries.push(usr.join("lib").display().to_string());
        pkgconfig_entries.push(usr.join("lib/pkgconfig").display().to_string());
    }
    path_entries.push("/usr/bin:/bin:/usr/sbin:/sbin".to_string());

    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), path_entries.join(":"));
    env.insert("CPATH".to_string(), include_entries.join(":"));
    env.insert("LIBRARY_PATH".to_string(), lib_entries.join(":"));
    env.insert("LD_LIBRARY_PATH".to_string(), lib_entries.join(":"));
    env.insert(
        "PKG_CONFIG_PATH".to_string(),
        pkgconfig_entries.join(":"),
    );
    env.insert("HOME".to_string(), workdir.display().to_string());
    env.insert("LC_ALL".to_string(), "C".to_string());
    env.insert("SOURCE_DATE_EPOCH".to_string(), "0".to_string());
    env
}

fn is_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    name.contains(".tar") || name.ends_with(".tgz") || name.ends_with(".zip")
}

/// Last `lines` lines of a command's output, for error messages
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
