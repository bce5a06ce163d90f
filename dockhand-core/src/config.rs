//! Daemon configuration document.
//!
//! # Storage layout
//!
//! ```text
//! ~/.dockhand/
//!   config.yaml   (mode 0600 — holds the webhook token)
//!   work/         (default parent of the working copy)
//!     <name>/     (clone of `repository`)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the home directory takes it explicitly
//! (`fn_at(home: &Path, …)`), so tests can point it at a `TempDir`.
//! [`home`] resolves the real one from `dirs::home_dir()`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_HTTP_BIND: &str = "0.0.0.0:8000";

// ---------------------------------------------------------------------------
// 1. Document
// ---------------------------------------------------------------------------

/// What a trigger does when a pass is already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    /// Wait for the running pass, then run.
    #[default]
    Queue,
    /// Fail immediately.
    Reject,
}

/// Webhook listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
            token: None,
        }
    }
}

/// Root of `~/.dockhand/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Clone URL of the configuration repository.
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Parent folder of the working copy; `~/.dockhand/work` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    /// Folder holding externally managed `<service>.env` files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_dir: Option<PathBuf>,
    /// Program and leading arguments of the container runtime.
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,
    #[serde(default = "default_git_command")]
    pub git_command: String,
    #[serde(default)]
    pub admission: Admission,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// A configuration with every optional field at its default.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: default_branch(),
            workdir: None,
            env_dir: None,
            compose_command: default_compose_command(),
            git_command: default_git_command(),
            admission: Admission::default(),
            http: HttpConfig::default(),
        }
    }

    /// Working-copy directory name: last URL segment without `.git`.
    ///
    /// `git@gitlab.com:group/example.git` → `example`.
    pub fn repository_name(&self) -> Result<String, CoreError> {
        repository_name(&self.repository)
    }

    /// Parent folder of the working copy, resolved against `home`.
    pub fn workdir_at(&self, home: &Path) -> PathBuf {
        self.workdir
            .clone()
            .unwrap_or_else(|| dockhand_root(home).join("work"))
    }

    /// Full path of the working copy, resolved against `home`.
    pub fn working_copy_at(&self, home: &Path) -> Result<PathBuf, CoreError> {
        Ok(self.workdir_at(home).join(self.repository_name()?))
    }
}

/// See [`Config::repository_name`].
pub fn repository_name(url: &str) -> Result<String, CoreError> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .filter(|segment| *segment != trimmed)
        .ok_or_else(|| CoreError::InvalidRepository(url.to_owned()))?;
    match last.strip_suffix(".git") {
        Some(name) if !name.is_empty() => Ok(name.to_owned()),
        _ => Err(CoreError::InvalidRepository(url.to_owned())),
    }
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    DEFAULT_HTTP_BIND.to_owned()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_owned()
}

fn default_compose_command() -> Vec<String> {
    vec!["docker-compose".to_owned()]
}

fn default_git_command() -> String {
    "git".to_owned()
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.dockhand/`
pub fn dockhand_root(home: &Path) -> PathBuf {
    home.join(".dockhand")
}

/// `<home>/.dockhand/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    dockhand_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load a configuration document from an explicit path.
///
/// Returns `CoreError::ConfigNotFound` if absent,
/// `CoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<Config, CoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load `<home>/.dockhand/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, CoreError> {
    load_from(&config_path_at(home))
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a configuration document to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_to(path: &Path, config: &Config) -> Result<(), CoreError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = tmp_sibling(path);

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(err) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, err));
    }
    Ok(())
}

/// Write a fresh configuration; refuses to replace an existing one unless `force`.
pub fn init_to(path: &Path, config: &Config, force: bool) -> Result<(), CoreError> {
    if path.exists() && !force {
        return Err(CoreError::ConfigExists {
            path: path.to_path_buf(),
        });
    }
    config.repository_name()?;
    save_to(path, config)
}

/// `init_to` at `<home>/.dockhand/config.yaml`.
pub fn init_at(home: &Path, config: &Config, force: bool) -> Result<PathBuf, CoreError> {
    let path = config_path_at(home);
    init_to(&path, config, force)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Home directory from `dirs::home_dir()`.
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.yaml".to_owned());
    path.with_file_name(format!("{name}.tmp"))
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("git@gitlab.com:git-docker/example.git", "example")]
    #[case("git@host:example.git", "example")]
    #[case("https://github.com/acme/infra.git", "infra")]
    #[case("https://github.com/acme/infra.git/", "infra")]
    #[case("/srv/git/stack.git", "stack")]
    fn repository_name_from_url(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(repository_name(url).expect("name"), expected);
    }

    #[rstest]
    #[case("https://github.com/acme/infra")]
    #[case("example.git")]
    #[case("https://github.com/acme/.git")]
    #[case("")]
    fn repository_name_rejects_unusable_urls(#[case] url: &str) {
        let err = repository_name(url).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRepository(_)), "got: {err}");
    }

    #[test]
    fn minimal_document_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("repository: git@host:ops/stack.git\n").expect("parse");
        assert_eq!(cfg.branch, "main");
        assert_eq!(cfg.compose_command, vec!["docker-compose".to_string()]);
        assert_eq!(cfg.git_command, "git");
        assert_eq!(cfg.admission, Admission::Queue);
        assert!(cfg.http.enabled);
        assert_eq!(cfg.http.bind, DEFAULT_HTTP_BIND);
        assert!(cfg.http.token.is_none());
    }

    #[test]
    fn working_copy_defaults_under_dockhand_root() {
        let home = Path::new("/home/ops");
        let cfg = Config::new("git@host:ops/stack.git");
        assert_eq!(
            cfg.working_copy_at(home).expect("path"),
            PathBuf::from("/home/ops/.dockhand/work/stack")
        );
    }

    #[test]
    fn save_and_load_roundtrip_with_private_mode() {
        let home = TempDir::new().expect("tempdir");
        let mut cfg = Config::new("git@host:ops/stack.git");
        cfg.http.token = Some("s3cret".to_string());
        cfg.admission = Admission::Reject;

        let path = init_at(home.path(), &cfg, false).expect("init");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!tmp_sibling(&path).exists(), ".tmp must be gone after save");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let home = TempDir::new().expect("tempdir");
        let cfg = Config::new("git@host:ops/stack.git");
        init_at(home.path(), &cfg, false).expect("first init");

        let err = init_at(home.path(), &cfg, false).unwrap_err();
        assert!(matches!(err, CoreError::ConfigExists { .. }), "got: {err}");
        init_at(home.path(), &cfg, true).expect("forced init");
    }

    #[test]
    fn load_missing_config_returns_not_found() {
        let home = TempDir::new().expect("tempdir");
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigNotFound { .. }), "got: {err}");
    }
}
