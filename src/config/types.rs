//! 配置数据结构定义
//!
//! 定义智能体工作流服务的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 主配置结构，包含通用配置、LLM配置表和工作流配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 通用配置项
    #[serde(default)]
    pub general: GeneralConfig,
    /// LLM配置表，按名称索引
    pub llms: HashMap<String, LlmConfig>,
    /// 工作流配置
    pub workflow: WorkflowConfig,
}

/// 通用配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 最大并发工作流数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_runs: usize,
    /// 单次调用超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 全局请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_concurrent_runs: default_max_concurrent(),
            request_timeout_seconds: default_timeout(),
            headers: HashMap::new(),
        }
    }
}

/// 单个LLM的配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// 模型名称
    pub model: String,
    /// 采样温度
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// 最大生成token数
    pub max_tokens: Option<u32>,
    /// 服务端点地址
    pub base_url: Option<String>,
    /// 存放API密钥的环境变量名
    pub api_key_env: Option<String>,
}

/// 工作流配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// 工作流入口名称
    pub entry: String,
    /// 工作流使用的LLM名称，必须在llms表中定义
    pub llm: String,
    /// 工作流描述
    pub description: Option<String>,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 工作流参数
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_concurrent() -> usize {
    8
}
fn default_timeout() -> u64 {
    60
}
fn default_temperature() -> f64 {
    0.7
}
fn default_enabled() -> bool {
    true
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证通用配置
    if config.general.max_concurrent_runs == 0 {
        return Err("最大并发工作流数不能为0".to_string());
    }

    if config.general.request_timeout_seconds == 0 {
        return Err("调用超时时间不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.general.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.general.log_level, valid_log_levels
        ));
    }

    // 验证LLM配置
    if config.llms.is_empty() {
        return Err("至少需要配置一个LLM".to_string());
    }

    for (name, llm) in &config.llms {
        if name.trim().is_empty() {
            return Err("LLM名称不能为空".to_string());
        }

        if llm.model.trim().is_empty() {
            return Err(format!("LLM {} 的模型名称不能为空", name));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(format!(
                "LLM {} 的采样温度 {} 无效，必须在 0.0 到 2.0 之间",
                name, llm.temperature
            ));
        }

        if let Some(max_tokens) = llm.max_tokens {
            if max_tokens == 0 {
                return Err(format!("LLM {} 的最大token数不能为0", name));
            }
        }

        if let Some(ref base_url) = llm.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(format!("LLM {} 的端点地址格式无效", name));
            }
        }
    }

    // 验证工作流配置
    if config.workflow.entry.trim().is_empty() {
        return Err("工作流入口名称不能为空".to_string());
    }

    if !config.llms.contains_key(&config.workflow.llm) {
        return Err(format!(
            "工作流引用了未定义的LLM: {}",
            config.workflow.llm
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        let mut llms = HashMap::new();
        llms.insert(
            "nim_llm".to_string(),
            LlmConfig {
                model: "meta/llama-3.1-70b-instruct".to_string(),
                temperature: 0.7,
                max_tokens: Some(1024),
                base_url: Some("https://integrate.api.example.com/v1".to_string()),
                api_key_env: Some("NIM_API_KEY".to_string()),
            },
        );

        Config {
            general: GeneralConfig::default(),
            llms,
            workflow: WorkflowConfig {
                entry: "react_agent".to_string(),
                llm: "nim_llm".to_string(),
                description: Some("测试工作流".to_string()),
                enabled: true,
                params: HashMap::new(),
            },
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();

        // 测试序列化
        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(!serialized.is_empty());

        // 测试反序列化
        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_validation() {
        let config = create_test_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_empty_llms() {
        let mut config = create_test_config();
        config.llms.clear();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("至少需要配置一个LLM"));
    }

    #[test]
    fn test_config_validation_invalid_temperature() {
        let mut config = create_test_config();
        config.llms.get_mut("nim_llm").unwrap().temperature = 9.9;

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("采样温度"));
    }

    #[test]
    fn test_config_validation_unknown_workflow_llm() {
        let mut config = create_test_config();
        config.workflow.llm = "missing_llm".to_string();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("未定义的LLM"));
    }

    #[test]
    fn test_config_validation_invalid_base_url() {
        let mut config = create_test_config();
        config.llms.get_mut("nim_llm").unwrap().base_url = Some("ftp://invalid".to_string());

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("端点地址格式无效"));
    }

    #[test]
    fn test_default_values() {
        let general = GeneralConfig::default();

        assert_eq!(general.log_level, "info");
        assert_eq!(general.max_concurrent_runs, 8);
        assert_eq!(general.request_timeout_seconds, 60);
        assert!(general.headers.is_empty());
    }
}
