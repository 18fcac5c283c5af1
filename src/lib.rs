//! ClassForge - 班级分配看板核心
//!
//! 模块划分：
//! - **model**: 数据模型（参与者、关系元组、分配结果、ID 新类型）
//! - **graph**: 关系图构建（平行边曲率、子图作用域）
//! - **backend**: 外部协作方抽象与实现（HTTP / 脚本化）
//! - **core**: 任务编排、选中态、结果组合、Dashboard
//! - **chat**: 对话式重分配（规则 + LLM 解析）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: 日志

pub mod backend;
pub mod chat;
pub mod config;
pub mod core;
pub mod graph;
pub mod llm;
pub mod model;
pub mod observability;

pub use crate::core::Dashboard;
pub use config::{load_config, Settings};
