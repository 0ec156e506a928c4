//! Git 配置仓库
//!
//! 通过 git CLI 把远端仓库当作一个以路径为 key 的文件存储：
//! - 首次使用时 clone 到临时目录（失败后下次调用会重试）
//! - 所有操作在同一把互斥锁内执行
//! - pull 只允许快进，结果以 `PullOutcome` 区分

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::env::constants::GIT_TIMEOUT_SECS;
use crate::config::GitConfig;
use crate::error::RepositoryError;
use crate::infra::command::{failure_output, CommandRunner};
use crate::infra::store::{CommitHash, ConfigStore, PullOutcome};

/// 本地工作区
struct WorkTree {
    /// 临时目录，drop 时删除
    _dir: TempDir,
    root: PathBuf,
}

/// 初始化状态
enum RepoState {
    Uninitialized,
    Ready(WorkTree),
    Failed(String),
}

/// 对外暴露的仓库状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RepoStatus {
    Uninitialized,
    Ready,
    Failed(String),
    Busy,
}

/// Git 配置仓库
pub struct GitRepository {
    name: String,
    config: GitConfig,
    timeout: Duration,
    state: Mutex<RepoState>,
}

impl GitRepository {
    /// 创建仓库句柄（不会立即 clone）
    pub fn new(config: GitConfig) -> Self {
        Self {
            name: "kubernetes-configs".to_string(),
            config,
            timeout: Duration::from_secs(GIT_TIMEOUT_SECS),
            state: Mutex::new(RepoState::Uninitialized),
        }
    }

    /// 提前 clone，失败时保持可重试
    pub async fn initialize(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        self.ready(&mut state).await.map(|_| ())
    }

    /// 工作区状态快照，正在执行 git 操作时返回 `Busy`
    pub fn status(&self) -> RepoStatus {
        match self.state.try_lock() {
            Ok(state) => match *state {
                RepoState::Uninitialized => RepoStatus::Uninitialized,
                RepoState::Ready(_) => RepoStatus::Ready,
                RepoState::Failed(ref reason) => RepoStatus::Failed(reason.clone()),
            },
            Err(_) => RepoStatus::Busy,
        }
    }

    /// 确保工作区已 clone 并返回
    async fn ready<'a>(&self, state: &'a mut RepoState) -> Result<&'a WorkTree, RepositoryError> {
        if !matches!(*state, RepoState::Ready(_)) {
            match self.clone_work_tree().await {
                Ok(tree) => {
                    if let Err(e) = self.pull_in(&tree).await {
                        *state = RepoState::Failed(e.to_string());
                        return Err(e);
                    }
                    *state = RepoState::Ready(tree);
                }
                Err(e) => {
                    warn!(repo = %self.name, error = %e, "Initializing repository failed, will retry on next use");
                    *state = RepoState::Failed(e.to_string());
                    return Err(e);
                }
            }
        }

        match *state {
            RepoState::Ready(ref tree) => Ok(tree),
            _ => Err(RepositoryError::Clone {
                url: self.config.url.clone(),
                message: "work tree is not initialized".to_string(),
            }),
        }
    }

    async fn clone_work_tree(&self) -> Result<WorkTree, RepositoryError> {
        self.check_credentials().await?;

        let dir = tempfile::Builder::new()
            .prefix("major-tom-")
            .tempdir()
            .map_err(|source| RepositoryError::Io {
                path: std::env::temp_dir().display().to_string(),
                source,
            })?;
        let root = dir.path().join("worktree");

        info!(repo = %self.name, url = %self.config.url, branch = %self.config.branch, "Cloning repository");

        let root_arg = root.to_string_lossy().to_string();
        let output = CommandRunner::run_with_env(
            "git",
            &[
                "clone",
                "--branch",
                &self.config.branch,
                "--single-branch",
                &self.config.url,
                &root_arg,
            ],
            dir.path(),
            &self.git_env(),
            self.timeout,
        )
        .await?;

        if !output.status.success() {
            return Err(RepositoryError::Clone {
                url: self.config.url.clone(),
                message: failure_output(&output),
            });
        }

        info!(repo = %self.name, work_tree = %root.display(), "Repository cloned");
        Ok(WorkTree { _dir: dir, root })
    }

    async fn check_credentials(&self) -> Result<(), RepositoryError> {
        let files = [
            self.config.ssh_key_path.as_ref(),
            self.config.ssh_knownhosts.as_ref(),
        ];
        for path in files.into_iter().flatten() {
            tokio::fs::metadata(path)
                .await
                .map_err(|source| RepositoryError::Credentials {
                    path: path.display().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// git 命令通用的环境变量
    fn git_env(&self) -> Vec<(&'static str, String)> {
        let mut envs = vec![("GIT_TERMINAL_PROMPT", "0".to_string())];
        let key = self.config.ssh_key_path.as_ref();
        let known_hosts = self.config.ssh_knownhosts.as_ref();
        if key.is_none() && known_hosts.is_none() {
            return envs;
        }

        let mut ssh = format!("ssh -l {}", self.config.ssh_key_user);
        if let Some(key) = key {
            ssh.push_str(&format!(" -i '{}' -o IdentitiesOnly=yes", key.display()));
        }
        ssh.push_str(" -o StrictHostKeyChecking=yes");
        if let Some(known_hosts) = known_hosts {
            ssh.push_str(&format!(" -o UserKnownHostsFile='{}'", known_hosts.display()));
        }
        envs.push(("GIT_SSH_COMMAND", ssh));
        envs
    }

    async fn git(
        &self,
        tree: &WorkTree,
        operation: &'static str,
        args: &[&str],
        extra_env: &[(&'static str, String)],
    ) -> Result<String, RepositoryError> {
        let mut envs = self.git_env();
        envs.extend(extra_env.iter().cloned());

        let output =
            CommandRunner::run_with_env("git", args, &tree.root, &envs, self.timeout).await?;
        if !output.status.success() {
            return Err(RepositoryError::Git {
                operation,
                message: failure_output(&output),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn rev_parse_head(&self, tree: &WorkTree) -> Result<CommitHash, RepositoryError> {
        self.git(tree, "rev-parse", &["rev-parse", "HEAD"], &[])
            .await
            .map(CommitHash)
    }

    async fn pull_in(&self, tree: &WorkTree) -> Result<PullOutcome, RepositoryError> {
        let before = self.rev_parse_head(tree).await?;
        self.git(
            tree,
            "pull",
            &["pull", "--ff-only", "origin", &self.config.branch],
            &[],
        )
        .await?;
        let after = self.rev_parse_head(tree).await?;

        if before == after {
            info!(repo = %self.name, head = %after.short(), "Pulling repo, but it's already up-to-date");
            Ok(PullOutcome::AlreadyUpToDate)
        } else {
            info!(repo = %self.name, from = %before.short(), to = %after.short(), "Pulled new commits");
            Ok(PullOutcome::Updated {
                from: before,
                to: after,
            })
        }
    }
}

/// 工作区内的相对路径，禁止绝对路径和 `..`
fn resolve_in(tree: &WorkTree, path: &str) -> Result<PathBuf, RepositoryError> {
    let relative = Path::new(path);
    let escapes = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if path.is_empty() || escapes {
        return Err(RepositoryError::InvalidPath(path.to_string()));
    }
    Ok(tree.root.join(relative))
}

fn file_error(path: &str, source: std::io::Error) -> RepositoryError {
    if source.kind() == std::io::ErrorKind::NotFound {
        RepositoryError::FileNotFound(path.to_string())
    } else {
        RepositoryError::Io {
            path: path.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ConfigStore for GitRepository {
    async fn pull(&self) -> Result<PullOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;
        self.pull_in(tree).await
    }

    async fn head_hash(&self) -> Result<CommitHash, RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;
        self.rev_parse_head(tree).await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;
        let full_path = resolve_in(tree, path)?;
        tokio::fs::read(&full_path)
            .await
            .map_err(|e| file_error(path, e))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;
        let full_path = resolve_in(tree, path)?;

        // 只允许重写已存在的文件
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&full_path)
            .await
            .map_err(|e| file_error(path, e))?;
        file.write_all(content)
            .await
            .map_err(|e| file_error(path, e))?;
        file.flush().await.map_err(|e| file_error(path, e))
    }

    async fn stage(&self, path: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;
        resolve_in(tree, path)?;
        self.git(tree, "add", &["add", "--", path], &[]).await?;
        info!(path, "{} is added to the staging area", path);
        Ok(())
    }

    async fn commit(
        &self,
        path: &str,
        caller: &str,
        message: &str,
    ) -> Result<CommitHash, RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;

        let author = format!("{}({})", self.config.author_name, caller);
        let identity = [
            ("GIT_AUTHOR_NAME", author.clone()),
            ("GIT_AUTHOR_EMAIL", self.config.author_email.clone()),
            ("GIT_COMMITTER_NAME", author.clone()),
            ("GIT_COMMITTER_EMAIL", self.config.author_email.clone()),
        ];
        self.git(
            tree,
            "commit",
            &["-c", "commit.gpgsign=false", "commit", "--no-verify", "-m", message],
            &identity,
        )
        .await?;

        let hash = self.rev_parse_head(tree).await?;
        info!(repo = %self.name, path, author = %author, hash = %hash.short(), "Committed");
        Ok(hash)
    }

    async fn push(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;
        let refspec = format!("HEAD:refs/heads/{}", self.config.branch);
        self.git(tree, "push", &["push", "origin", &refspec], &[])
            .await?;
        info!(repo = %self.name, branch = %self.config.branch, "Pushed");
        Ok(())
    }

    async fn hard_reset(&self, hash: &CommitHash) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let tree = self.ready(&mut state).await?;
        self.git(tree, "reset", &["reset", "--hard", hash.as_str()], &[])
            .await?;
        self.git(tree, "clean", &["clean", "-fd"], &[]).await?;
        warn!(repo = %self.name, hash = %hash.short(), "Repo is hard reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUSTOMIZATION: &str = "images:\n- name: mirrormedia/openwarehouse\n  newTag: old-tag\n";
    const DEV_PATH: &str = "openwarehouse/overlays/dev/base/kustomization.yaml";

    fn git_output(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "seed")
            .env("GIT_AUTHOR_EMAIL", "seed@example.com")
            .env("GIT_COMMITTER_NAME", "seed")
            .env("GIT_COMMITTER_EMAIL", "seed@example.com")
            .output()
            .expect("git must be installed");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// 在 root 下创建 remote.git 与 seed 工作区，返回指向 remote 的配置
    fn seed_remote_in(root: &Path) -> GitConfig {
        let remote = root.join("remote.git");
        let seed = root.join("seed");
        std::fs::create_dir_all(&seed).unwrap();

        git_output(root, &["init", "--bare", remote.to_str().unwrap()]);
        git_output(&seed, &["init"]);
        git_output(&seed, &["checkout", "-b", "main"]);

        let file = seed.join(DEV_PATH);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, KUSTOMIZATION).unwrap();

        git_output(&seed, &["add", "."]);
        git_output(&seed, &["-c", "commit.gpgsign=false", "commit", "-m", "init"]);
        git_output(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
        git_output(&seed, &["push", "origin", "main"]);

        GitConfig::new(remote.to_string_lossy(), "main")
    }

    #[tokio::test]
    async fn test_commit_and_push_reaches_remote() {
        let root = tempfile::tempdir().unwrap();
        let config = seed_remote_in(root.path());
        let repo = GitRepository::new(config);

        let before = repo.head_hash().await.unwrap();
        let content = repo.read_file(DEV_PATH).await.unwrap();
        assert_eq!(String::from_utf8(content).unwrap(), KUSTOMIZATION);

        let updated = KUSTOMIZATION.replace("old-tag", "abc123");
        repo.write_file(DEV_PATH, updated.as_bytes()).await.unwrap();
        repo.stage(DEV_PATH).await.unwrap();
        let after = repo
            .commit(DEV_PATH, "@tester", "deploy(openwarehouse/dev): deployed by @tester")
            .await
            .unwrap();
        repo.push().await.unwrap();

        assert_ne!(before, after);
        let remote = root.path().join("remote.git");
        let author = git_output(&remote, &["log", "-1", "--format=%an <%ae>", "main"]);
        assert_eq!(author, "Major Tom(@tester) <major-tom@localhost>");
        let remote_head = git_output(&remote, &["rev-parse", "main"]);
        assert_eq!(remote_head, after.as_str());
    }

    #[tokio::test]
    async fn test_hard_reset_restores_head_and_content() {
        let root = tempfile::tempdir().unwrap();
        let repo = GitRepository::new(seed_remote_in(root.path()));

        let anchor = repo.head_hash().await.unwrap();
        repo.write_file(DEV_PATH, b"images: []\n").await.unwrap();
        repo.stage(DEV_PATH).await.unwrap();
        repo.commit(DEV_PATH, "@tester", "broken").await.unwrap();
        assert_ne!(repo.head_hash().await.unwrap(), anchor);

        repo.hard_reset(&anchor).await.unwrap();

        assert_eq!(repo.head_hash().await.unwrap(), anchor);
        let content = repo.read_file(DEV_PATH).await.unwrap();
        assert_eq!(String::from_utf8(content).unwrap(), KUSTOMIZATION);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejected_push_then_reset_restores_anchor() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let repo = GitRepository::new(seed_remote_in(root.path()));

        let hook = root.path().join("remote.git/hooks/pre-receive");
        std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
        std::fs::write(&hook, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        let anchor = repo.head_hash().await.unwrap();
        let updated = KUSTOMIZATION.replace("old-tag", "abc123");
        repo.write_file(DEV_PATH, updated.as_bytes()).await.unwrap();
        repo.stage(DEV_PATH).await.unwrap();
        repo.commit(DEV_PATH, "@tester", "rejected").await.unwrap();

        assert!(matches!(
            repo.push().await,
            Err(RepositoryError::Git { operation: "push", .. })
        ));

        repo.hard_reset(&anchor).await.unwrap();
        assert_eq!(repo.head_hash().await.unwrap(), anchor);
        let content = repo.read_file(DEV_PATH).await.unwrap();
        assert_eq!(String::from_utf8(content).unwrap(), KUSTOMIZATION);

        let remote_head = git_output(&root.path().join("remote.git"), &["rev-parse", "main"]);
        assert_eq!(remote_head, anchor.as_str());
    }

    #[tokio::test]
    async fn test_pull_outcomes() {
        let root = tempfile::tempdir().unwrap();
        let repo = GitRepository::new(seed_remote_in(root.path()));

        assert_eq!(repo.pull().await.unwrap(), PullOutcome::AlreadyUpToDate);

        // 上游出现新的提交
        let seed = root.path().join("seed");
        std::fs::write(seed.join("README.md"), "upstream\n").unwrap();
        git_output(&seed, &["add", "README.md"]);
        git_output(&seed, &["-c", "commit.gpgsign=false", "commit", "-m", "upstream"]);
        git_output(&seed, &["push", "origin", "main"]);

        match repo.pull().await.unwrap() {
            PullOutcome::Updated { from, to } => assert_ne!(from, to),
            other => panic!("expected update, got {:?}", other),
        }
        assert!(repo.read_file("README.md").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_and_escaping_paths() {
        let root = tempfile::tempdir().unwrap();
        let repo = GitRepository::new(seed_remote_in(root.path()));

        assert!(matches!(
            repo.read_file("openwarehouse/overlays/qa/base/kustomization.yaml").await,
            Err(RepositoryError::FileNotFound(_))
        ));
        assert!(matches!(
            repo.write_file("new.yaml", b"x").await,
            Err(RepositoryError::FileNotFound(_))
        ));
        assert!(matches!(
            repo.read_file("../remote.git/HEAD").await,
            Err(RepositoryError::InvalidPath(_))
        ));
        assert!(matches!(
            repo.read_file("/etc/passwd").await,
            Err(RepositoryError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_clone_is_retried() {
        let root = tempfile::tempdir().unwrap();
        let remote = root.path().join("remote.git");
        let repo = GitRepository::new(GitConfig::new(remote.to_string_lossy(), "main"));

        // 远端还不存在
        assert!(matches!(
            repo.initialize().await,
            Err(RepositoryError::Clone { .. })
        ));
        assert!(matches!(repo.status(), RepoStatus::Failed(_)));

        seed_remote_in(root.path());

        repo.head_hash().await.unwrap();
        assert_eq!(repo.status(), RepoStatus::Ready);
    }

    #[tokio::test]
    async fn test_missing_ssh_key_fails_before_clone() {
        let mut config = GitConfig::new("git@example.com:org/configs.git", "main");
        config.ssh_key_path = Some(PathBuf::from("/nonexistent/identity"));
        let repo = GitRepository::new(config);
        assert_eq!(repo.status(), RepoStatus::Uninitialized);

        assert!(matches!(
            repo.head_hash().await,
            Err(RepositoryError::Credentials { .. })
        ));
    }

    #[test]
    fn test_git_env_builds_ssh_command() {
        let mut config = GitConfig::new("git@example.com:org/configs.git", "main");
        config.ssh_key_path = Some(PathBuf::from("/keys/identity"));
        config.ssh_knownhosts = Some(PathBuf::from("/keys/known_hosts"));
        let repo = GitRepository::new(config);

        let envs = repo.git_env();
        let ssh = envs
            .iter()
            .find(|(k, _)| *k == "GIT_SSH_COMMAND")
            .map(|(_, v)| v.as_str())
            .unwrap();
        assert!(ssh.contains("-i '/keys/identity'"));
        assert!(ssh.contains("-l git"));
        assert!(ssh.contains("StrictHostKeyChecking=yes"));
        assert!(ssh.contains("UserKnownHostsFile='/keys/known_hosts'"));
    }

    #[test]
    fn test_known_hosts_without_key() {
        let mut config = GitConfig::new("git@example.com:org/configs.git", "main");
        config.ssh_knownhosts = Some(PathBuf::from("/keys/known_hosts"));
        let repo = GitRepository::new(config);

        let envs = repo.git_env();
        let ssh = envs
            .iter()
            .find(|(k, _)| *k == "GIT_SSH_COMMAND")
            .map(|(_, v)| v.as_str())
            .unwrap();
        assert!(!ssh.contains("-i "));
        assert!(ssh.contains("StrictHostKeyChecking=yes"));
        assert!(ssh.contains("UserKnownHostsFile='/keys/known_hosts'"));

        let plain = GitRepository::new(GitConfig::new("/tmp/remote.git", "main"));
        assert!(plain.git_env().iter().all(|(k, _)| *k != "GIT_SSH_COMMAND"));
    }
}
