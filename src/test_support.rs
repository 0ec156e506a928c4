//! 测试辅助：内存配置仓库与示例配置

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::BotConfig;
use crate::error::RepositoryError;
use crate::infra::store::{CommitHash, ConfigStore, PullOutcome};

pub(crate) const FIXTURE_CONFIG: &str = r#"
git:
  url: /tmp/kubernetes-configs.git
  branch: main
codebases:
  - type: 2
    repo: openwarehouse
    stages: [dev, staging, prod]
    projects: [tv]
    services: [cms, gql-external, gql-internal]
  - type: 1
    repo: mirror-tv-nuxt
    stages: [dev, staging, prod]
clusters:
  tv:
    dev: /etc/kube/tv-dev.yaml
    prod: /etc/kube/tv-prod.yaml
"#;

pub(crate) fn fixture_config() -> BotConfig {
    BotConfig::from_yaml(FIXTURE_CONFIG, "fixture").expect("fixture config must parse")
}

pub(crate) fn manifest(tag: &str) -> String {
    format!(
        "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nimages:\n- name: app\n  newName: gcr.io/mirrormedia/app\n  newTag: {}\n",
        tag
    )
}

pub(crate) const FIXTURE_PATHS: [&str; 6] = [
    "openwarehouse/overlays/dev/base/kustomization.yaml",
    "openwarehouse/overlays/staging/base/kustomization.yaml",
    "openwarehouse/overlays/prod/overlays/tv/base/kustomization.yaml",
    "mirror-tv-nuxt/overlays/dev/kustomization.yaml",
    "mirror-tv-nuxt/overlays/staging/kustomization.yaml",
    "mirror-tv-nuxt/overlays/prod/kustomization.yaml",
];

#[derive(Clone, Debug)]
pub(crate) struct CommitRecord {
    pub files: HashMap<String, Vec<u8>>,
    pub author: String,
    pub message: String,
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, Vec<u8>>,
    commits: Vec<CommitRecord>,
    head: usize,
    pushed: usize,
    calls: usize,
    events: Vec<String>,
}

/// 内存实现的 `ConfigStore`，记录调用次数和写入顺序
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
    fail_push: bool,
    write_delay: Option<Duration>,
}

impl MemoryStore {
    /// 以示例 manifest 作为初始提交
    pub fn new() -> Self {
        let files: HashMap<String, Vec<u8>> = FIXTURE_PATHS
            .iter()
            .map(|p| (p.to_string(), manifest("old-tag").into_bytes()))
            .collect();
        let initial = CommitRecord {
            files: files.clone(),
            author: "seed".to_string(),
            message: "init".to_string(),
        };
        Self {
            inner: Mutex::new(Inner {
                files,
                commits: vec![initial],
                ..Default::default()
            }),
            fail_push: false,
            write_delay: None,
        }
    }

    pub fn with_failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// 覆盖初始提交中的文件
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.files.insert(path.to_string(), content.as_bytes().to_vec());
            let files = inner.files.clone();
            inner.commits[0].files = files;
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap().calls
    }

    pub fn head_index(&self) -> usize {
        self.inner.lock().unwrap().head
    }

    pub fn pushed_index(&self) -> usize {
        self.inner.lock().unwrap().pushed
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|b| String::from_utf8_lossy(b).to_string())
    }

    pub fn head_commit(&self) -> CommitRecord {
        let inner = self.inner.lock().unwrap();
        inner.commits[inner.head].clone()
    }

    pub fn commit_count(&self) -> usize {
        self.inner.lock().unwrap().commits.len()
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.lock().unwrap().events.clone()
    }

    fn touch(&self) -> std::sync::MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls += 1;
        inner
    }
}

fn hash_of(index: usize) -> CommitHash {
    CommitHash(format!("commit-{:04}", index))
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn pull(&self) -> Result<PullOutcome, RepositoryError> {
        self.touch();
        Ok(PullOutcome::AlreadyUpToDate)
    }

    async fn head_hash(&self) -> Result<CommitHash, RepositoryError> {
        Ok(hash_of(self.touch().head))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RepositoryError> {
        self.touch()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| RepositoryError::FileNotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), RepositoryError> {
        {
            let mut inner = self.touch();
            if !inner.files.contains_key(path) {
                return Err(RepositoryError::FileNotFound(path.to_string()));
            }
            inner.events.push(format!("enter:{}", path));
        }
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.files.insert(path.to_string(), content.to_vec());
        inner.events.push(format!("exit:{}", path));
        Ok(())
    }

    async fn stage(&self, _path: &str) -> Result<(), RepositoryError> {
        self.touch();
        Ok(())
    }

    async fn commit(
        &self,
        _path: &str,
        caller: &str,
        message: &str,
    ) -> Result<CommitHash, RepositoryError> {
        let mut inner = self.touch();
        let record = CommitRecord {
            files: inner.files.clone(),
            author: format!("Major Tom({})", caller),
            message: message.to_string(),
        };
        inner.commits.push(record);
        inner.head = inner.commits.len() - 1;
        Ok(hash_of(inner.head))
    }

    async fn push(&self) -> Result<(), RepositoryError> {
        let mut inner = self.touch();
        if self.fail_push {
            return Err(RepositoryError::Git {
                operation: "push",
                message: "remote rejected".to_string(),
            });
        }
        inner.pushed = inner.head;
        Ok(())
    }

    async fn hard_reset(&self, hash: &CommitHash) -> Result<(), RepositoryError> {
        let mut inner = self.touch();
        let index = inner
            .commits
            .iter()
            .enumerate()
            .map(|(i, _)| i)
            .find(|i| hash_of(*i) == *hash)
            .ok_or_else(|| RepositoryError::Git {
                operation: "reset",
                message: format!("unknown revision {}", hash),
            })?;
        inner.head = index;
        inner.files = inner.commits[index].files.clone();
        Ok(())
    }
}
