//! Codebase 拓扑与路径解析
//!
//! 根据 codebase 声明的 overlay 结构计算 kustomize 文件路径。
//! 校验失败时仍然返回拼好的路径，调用方可以记录尝试访问的路径。

use serde::Deserialize;

use crate::error::ValidationError;

/// 生产环境 stage 名称
pub const PROD_STAGE: &str = "prod";

/// 镜像 kustomization 文件名
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// HPA 文件名
pub const HPA_FILE: &str = "hpa.yaml";

/// Overlay 结构类型
///
/// 配置文件中以整数表示：`1` = Flat，`2` = NestedByProject
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum StructureType {
    /// 每个 stage 一个 overlay
    Flat,
    /// prod 下再按 project / service 嵌套
    NestedByProject,
}

impl TryFrom<u8> for StructureType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StructureType::Flat),
            2 => Ok(StructureType::NestedByProject),
            other => Err(format!(
                "codebase type({}) is not supported, expected 1 (flat) or 2 (nested by project)",
                other
            )),
        }
    }
}

impl StructureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::Flat => "flat",
            StructureType::NestedByProject => "nested_by_project",
        }
    }
}

/// 一个 codebase 的声明
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Codebase {
    pub repo: String,
    #[serde(rename = "type")]
    pub structure: StructureType,
    #[serde(default)]
    pub stages: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

/// 可部署的服务
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRef {
    pub name: String,
    pub repo: String,
    pub project: Option<String>,
    pub service: Option<String>,
}

/// 路径解析结果
///
/// `path` 总是被构造；`violation` 记录第一个校验失败
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
    pub violation: Option<ValidationError>,
}

impl ResolvedPath {
    fn new(path: String) -> Self {
        Self {
            path,
            violation: None,
        }
    }

    /// 记录校验失败（只保留第一个）
    fn flag(&mut self, violation: ValidationError) {
        if self.violation.is_none() {
            self.violation = Some(violation);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.violation.is_none()
    }

    pub fn into_result(self) -> Result<String, ValidationError> {
        match self.violation {
            Some(violation) => Err(violation),
            None => Ok(self.path),
        }
    }
}

impl Codebase {
    /// 计算 codebase 内某个文件的路径
    ///
    /// - Flat: `{repo}/overlays/{stage}/{filename}`
    /// - Nested，带 service: `{repo}/overlays/{stage}/overlays/{project}/overlays/{service}/{filename}`
    /// - Nested，prod: `{repo}/overlays/prod/overlays/{project}/base/{filename}`
    /// - Nested，其它 stage: `{repo}/overlays/{stage}/base/{filename}`
    pub fn resolve_path(
        &self,
        stage: &str,
        project: Option<&str>,
        service: Option<&str>,
        filename: &str,
    ) -> ResolvedPath {
        match self.structure {
            StructureType::Flat => {
                let mut resolved =
                    ResolvedPath::new(format!("{}/overlays/{}/{}", self.repo, stage, filename));
                self.check_stage(&mut resolved, stage);
                resolved
            }
            StructureType::NestedByProject => match service {
                Some(service) => self.service_path(stage, project, service, filename),
                None if stage == PROD_STAGE => self.project_path(stage, project, filename),
                None => {
                    let mut resolved = ResolvedPath::new(format!(
                        "{}/overlays/{}/base/{}",
                        self.repo, stage, filename
                    ));
                    self.check_stage(&mut resolved, stage);
                    resolved
                }
            },
        }
    }

    /// 镜像 kustomization 文件路径
    pub fn image_kustomization_path(&self, stage: &str, project: Option<&str>) -> ResolvedPath {
        self.resolve_path(stage, project, None, KUSTOMIZATION_FILE)
    }

    /// HPA 文件路径（Flat 结构只有 stage 级别的路径）
    pub fn hpa_path(&self, stage: &str, project: &str, service: &str) -> ResolvedPath {
        self.resolve_path(stage, Some(project), Some(service), HPA_FILE)
    }

    /// 列出可部署的服务，Nested 结构按名称排序
    pub fn services(&self) -> Vec<ServiceRef> {
        match self.structure {
            StructureType::Flat => vec![ServiceRef {
                name: self.repo.clone(),
                repo: self.repo.clone(),
                project: None,
                service: None,
            }],
            StructureType::NestedByProject => {
                let mut services: Vec<ServiceRef> = self
                    .projects
                    .iter()
                    .flat_map(|project| {
                        self.services.iter().map(move |service| ServiceRef {
                            name: format!("{}-{}-{}", self.repo, project, service),
                            repo: self.repo.clone(),
                            project: Some(project.clone()),
                            service: Some(service.clone()),
                        })
                    })
                    .collect();
                services.sort_by(|a, b| a.name.cmp(&b.name));
                services
            }
        }
    }

    pub fn has_stage(&self, stage: &str) -> bool {
        contains(&self.stages, stage)
    }

    fn project_path(&self, stage: &str, project: Option<&str>, filename: &str) -> ResolvedPath {
        let mut resolved = ResolvedPath::new(format!(
            "{}/overlays/{}/overlays/{}/base/{}",
            self.repo,
            stage,
            project.unwrap_or_default(),
            filename
        ));
        self.check_stage(&mut resolved, stage);
        self.check_project(&mut resolved, stage, project);
        resolved
    }

    fn service_path(
        &self,
        stage: &str,
        project: Option<&str>,
        service: &str,
        filename: &str,
    ) -> ResolvedPath {
        let mut resolved = ResolvedPath::new(format!(
            "{}/overlays/{}/overlays/{}/overlays/{}/{}",
            self.repo,
            stage,
            project.unwrap_or_default(),
            service,
            filename
        ));
        self.check_stage(&mut resolved, stage);
        self.check_project(&mut resolved, stage, project);
        if !contains(&self.services, service) {
            resolved.flag(ValidationError::UnsupportedService {
                repo: self.repo.clone(),
                service: service.to_string(),
            });
        }
        resolved
    }

    fn check_stage(&self, resolved: &mut ResolvedPath, stage: &str) {
        if !self.has_stage(stage) {
            resolved.flag(ValidationError::UnsupportedStage {
                repo: self.repo.clone(),
                stage: stage.to_string(),
            });
        }
    }

    fn check_project(&self, resolved: &mut ResolvedPath, stage: &str, project: Option<&str>) {
        match project.filter(|p| !p.is_empty()) {
            None => resolved.flag(ValidationError::MissingProject {
                repo: self.repo.clone(),
                stage: stage.to_string(),
            }),
            Some(project) if !contains(&self.projects, project) => {
                resolved.flag(ValidationError::UnsupportedProject {
                    repo: self.repo.clone(),
                    project: project.to_string(),
                })
            }
            Some(_) => {}
        }
    }
}

/// 大小写敏感的精确匹配
fn contains(values: &[String], target: &str) -> bool {
    values.iter().any(|v| v == target)
}
