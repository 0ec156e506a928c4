//! 部署配置文件（YAML）
//!
//! 启动时加载一次，之后以 `Arc<BotConfig>` 只读共享

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::codebase::Codebase;
use crate::error::{ConfigError, ValidationError};

/// kubernetes-configs 仓库的 git 配置
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    /// 远端地址（ssh 或本地路径）
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// SSH 私钥路径，未配置时使用系统默认的 ssh 配置
    pub ssh_key_path: Option<PathBuf>,
    #[serde(default = "default_ssh_user")]
    pub ssh_key_user: String,
    /// known_hosts 文件路径
    pub ssh_knownhosts: Option<PathBuf>,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_ssh_user() -> String {
    "git".to_string()
}

fn default_author_name() -> String {
    "Major Tom".to_string()
}

fn default_author_email() -> String {
    "major-tom@localhost".to_string()
}

impl GitConfig {
    /// 使用默认值构造（主要用于测试和本地仓库）
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            ssh_key_path: None,
            ssh_key_user: default_ssh_user(),
            ssh_knownhosts: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

/// project -> stage -> kubeconfig 路径
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ClusterConfigs(pub BTreeMap<String, BTreeMap<String, PathBuf>>);

impl ClusterConfigs {
    /// 查找 project/stage 对应的 kubeconfig
    pub fn kube_config(&self, project: &str, stage: &str) -> Result<&Path, ValidationError> {
        self.0
            .get(project)
            .and_then(|stages| stages.get(stage))
            .map(PathBuf::as_path)
            .ok_or_else(|| ValidationError::UnknownCluster {
                project: project.to_string(),
                stage: stage.to_string(),
            })
    }

    /// 已配置集群的 project（有序）
    pub fn projects(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// project 下已配置 kubeconfig 的 stage（有序）
    pub fn stages(&self, project: &str) -> Option<Vec<&str>> {
        self.0
            .get(project)
            .map(|stages| stages.keys().map(String::as_str).collect())
    }
}

/// 完整的部署配置
#[derive(Clone, Debug, Deserialize)]
pub struct BotConfig {
    pub git: GitConfig,
    #[serde(alias = "configs", default)]
    pub codebases: Vec<Codebase>,
    #[serde(default)]
    pub clusters: ClusterConfigs,
}

impl BotConfig {
    /// 从 YAML 文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw, &path.display().to_string())
    }

    /// 从 YAML 文本解析
    pub fn from_yaml(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        let mut seen = HashSet::new();
        for codebase in &config.codebases {
            if !seen.insert(codebase.repo.as_str()) {
                return Err(ConfigError::DuplicateCodebase(codebase.repo.clone()));
            }
        }

        Ok(config)
    }

    /// 按名称查找 codebase（大小写敏感）
    pub fn find_codebase(&self, repo: &str) -> Option<&Codebase> {
        self.codebases.iter().find(|c| c.repo == repo)
    }

    pub fn codebase_names(&self) -> Vec<&str> {
        self.codebases.iter().map(|c| c.repo.as_str()).collect()
    }
}
