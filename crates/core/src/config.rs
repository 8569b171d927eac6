use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DockingError, Result};

/// 应用配置
///
/// 配置加载顺序：TOML文件 -> `DOCKPIPE_*` 环境变量覆盖 -> 校验。
/// 所有字段都有默认值，配置文件只需覆盖需要修改的部分。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub run: RunConfig,
    pub gpu: GpuConfig,
    pub retry: RetryConfig,
    pub engine: EngineConfig,
}

/// 单次运行参数：受体、配体数据库与批次划分
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// 受体的4位结构标识（如 7cpa）
    pub structure_id: String,
    /// 配体数据库（SDF）路径
    pub database_path: PathBuf,
    /// 数据库标签，用于运行目录命名
    pub database_label: String,
    /// 每个批次的配体数量
    pub batch_size: usize,
    /// 工作存储根目录
    pub work_dir: PathBuf,
}

/// GPU资源配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpuConfig {
    /// GPU执行槽位数量（并发对接作业上限）
    pub pool_width: usize,
    /// 单次引擎调用的超时时间（秒）
    pub engine_timeout_seconds: u64,
}

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// 引擎错误的最大重试次数
    pub max_retries: u32,
    /// 基础重试间隔（毫秒）
    pub base_interval_ms: u64,
    /// 最大重试间隔（毫秒）
    pub max_interval_ms: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

/// 外部协作者可执行文件配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// GPU对接引擎可执行文件
    pub engine_binary: String,
    /// 配体格式转换器可执行文件
    pub converter_binary: String,
    /// 受体准备命令（抓取、加氢、生成格点图）
    pub receptor_prep_binary: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            gpu: GpuConfig::default(),
            retry: RetryConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            structure_id: "7cpa".to_string(),
            database_path: PathBuf::from("sweetlead.sdf"),
            database_label: "sweetlead".to_string(),
            batch_size: 10000,
            work_dir: PathBuf::from("data"),
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            pool_width: 1,
            engine_timeout_seconds: 3600, // 单批次最长1小时
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_interval_ms: 500,
            max_interval_ms: 60_000,
            backoff_multiplier: 2.0, // 指数退避倍数
            jitter_factor: 0.1,      // 10%的随机抖动
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_binary: "autodock_gpu".to_string(),
            converter_binary: "obabel".to_string(),
            receptor_prep_binary: "prepare_receptor.sh".to_string(),
        }
    }
}

impl AppConfig {
    /// 加载配置：文件 -> 环境变量覆盖 -> 校验
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从TOML文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DockingError::Configuration(format!("读取配置文件 {} 失败: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            DockingError::Configuration(format!("解析配置文件 {} 失败: {e}", path.display()))
        })
    }

    /// 应用 `DOCKPIPE_<SECTION>_<KEY>` 形式的环境变量覆盖
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = read_env("DOCKPIPE_RUN_STRUCTURE_ID") {
            self.run.structure_id = v;
        }
        if let Some(v) = read_env("DOCKPIPE_RUN_DATABASE_PATH") {
            self.run.database_path = PathBuf::from(v);
        }
        if let Some(v) = read_env("DOCKPIPE_RUN_DATABASE_LABEL") {
            self.run.database_label = v;
        }
        if let Some(v) = read_env("DOCKPIPE_RUN_BATCH_SIZE") {
            self.run.batch_size = parse_env("DOCKPIPE_RUN_BATCH_SIZE", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_RUN_WORK_DIR") {
            self.run.work_dir = PathBuf::from(v);
        }
        if let Some(v) = read_env("DOCKPIPE_GPU_POOL_WIDTH") {
            self.gpu.pool_width = parse_env("DOCKPIPE_GPU_POOL_WIDTH", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_GPU_ENGINE_TIMEOUT_SECONDS") {
            self.gpu.engine_timeout_seconds = parse_env("DOCKPIPE_GPU_ENGINE_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_RETRY_MAX_RETRIES") {
            self.retry.max_retries = parse_env("DOCKPIPE_RETRY_MAX_RETRIES", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_RETRY_BASE_INTERVAL_MS") {
            self.retry.base_interval_ms = parse_env("DOCKPIPE_RETRY_BASE_INTERVAL_MS", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_RETRY_MAX_INTERVAL_MS") {
            self.retry.max_interval_ms = parse_env("DOCKPIPE_RETRY_MAX_INTERVAL_MS", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_RETRY_BACKOFF_MULTIPLIER") {
            self.retry.backoff_multiplier = parse_env("DOCKPIPE_RETRY_BACKOFF_MULTIPLIER", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_RETRY_JITTER_FACTOR") {
            self.retry.jitter_factor = parse_env("DOCKPIPE_RETRY_JITTER_FACTOR", &v)?;
        }
        if let Some(v) = read_env("DOCKPIPE_ENGINE_ENGINE_BINARY") {
            self.engine.engine_binary = v;
        }
        if let Some(v) = read_env("DOCKPIPE_ENGINE_CONVERTER_BINARY") {
            self.engine.converter_binary = v;
        }
        if let Some(v) = read_env("DOCKPIPE_ENGINE_RECEPTOR_PREP_BINARY") {
            self.engine.receptor_prep_binary = v;
        }
        Ok(())
    }

    /// 校验配置
    ///
    /// 运行参数错误属于 `InvalidInput`：在任何批次工作开始之前就中止。
    pub fn validate(&self) -> Result<()> {
        if self.run.batch_size == 0 {
            return Err(DockingError::InvalidInput(
                "batch_size 必须大于等于 1".to_string(),
            ));
        }
        if self.gpu.pool_width == 0 {
            return Err(DockingError::InvalidInput(
                "pool_width 必须大于等于 1".to_string(),
            ));
        }
        if self.gpu.engine_timeout_seconds == 0 {
            return Err(DockingError::InvalidInput(
                "engine_timeout_seconds 必须大于 0".to_string(),
            ));
        }
        if self.run.structure_id.len() != 4
            || !self.run.structure_id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(DockingError::InvalidInput(format!(
                "无效的结构标识 '{}'：必须是4位字母数字",
                self.run.structure_id
            )));
        }
        if self.run.database_label.is_empty() {
            return Err(DockingError::InvalidInput(
                "database_label 不能为空".to_string(),
            ));
        }
        if self.run.database_path.as_os_str().is_empty() {
            return Err(DockingError::InvalidInput(
                "database_path 不能为空".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(DockingError::InvalidInput(
                "jitter_factor 必须在 0.0 到 1.0 之间".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(DockingError::InvalidInput(
                "backoff_multiplier 必须大于等于 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| DockingError::Configuration(format!("环境变量 {key}={value} 无法解析: {e}")))
}
