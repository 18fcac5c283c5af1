//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CLASSFORGE__*` 覆盖（双下划线表示嵌套，如 `CLASSFORGE__JOBS__POLL_INTERVAL_MS=1000`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::graph::GraphStyle;
use crate::model::AllocationOption;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSection,
    pub jobs: JobsSection,
    pub graph: GraphSection,
    pub llm: LlmSection,
}

/// [backend] 段：分配后端地址；未设置时使用内置演示后端
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// [jobs] 段：轮询间隔、默认分配选项、是否让后端保存结果
#[derive(Debug, Clone, Deserialize)]
pub struct JobsSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub default_option: AllocationOption,
    #[serde(default = "default_save_data")]
    pub save_data: bool,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            default_option: AllocationOption::default(),
            save_data: default_save_data(),
        }
    }
}

impl JobsSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_save_data() -> bool {
    true
}

/// [graph] 段：曲率幅度与单位、焦点 / 邻居颜色、节点基础尺寸
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSection {
    #[serde(default = "default_curvature_amplitude")]
    pub curvature_amplitude: f64,
    #[serde(default = "default_curvature_unit")]
    pub curvature_unit: f64,
    #[serde(default = "default_focus_color")]
    pub focus_color: String,
    #[serde(default = "default_neighbor_color")]
    pub neighbor_color: String,
    #[serde(default = "default_base_node_size")]
    pub base_node_size: f64,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            curvature_amplitude: default_curvature_amplitude(),
            curvature_unit: default_curvature_unit(),
            focus_color: default_focus_color(),
            neighbor_color: default_neighbor_color(),
            base_node_size: default_base_node_size(),
        }
    }
}

impl GraphSection {
    pub fn style(&self) -> GraphStyle {
        GraphStyle {
            curvature_amplitude: self.curvature_amplitude,
            curvature_unit: self.curvature_unit,
            focus_color: self.focus_color.clone(),
            neighbor_color: self.neighbor_color.clone(),
            base_node_size: self.base_node_size,
        }
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if !self.style().has_valid_curvature() {
            return Err(config::ConfigError::Message(format!(
                "graph.curvature_amplitude and graph.curvature_unit must be positive (got {} and {})",
                self.curvature_amplitude, self.curvature_unit
            )));
        }
        Ok(())
    }
}

fn default_curvature_amplitude() -> f64 {
    3.5
}

fn default_curvature_unit() -> f64 {
    0.1
}

fn default_focus_color() -> String {
    "#111111".to_string()
}

fn default_neighbor_color() -> String {
    "#cccccc".to_string()
}

fn default_base_node_size() -> f64 {
    1.0
}

/// [llm] 段：对话解析的 LLM 兜底（OpenAI 兼容接口）
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_model(),
            base_url: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// 从 config 目录加载配置，环境变量 CLASSFORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CLASSFORGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<Settings, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CLASSFORGE")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.graph.validate()?;
    Ok(settings)
}
