//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和文档转换功能

use crate::config::types::{validate_config, Config};
use crate::error::ValidationError;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// 加载结果类型别名
pub type LoadResult<T> = std::result::Result<T, ValidationError>;

/// 配置加载器trait，定义配置加载接口
///
/// 这是子系统与具体配置格式之间的边界：管理器只依赖
/// `load(path) -> 类型化配置` 这一语义
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `LoadResult<Config>` - 加载的配置或验证错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> LoadResult<Config>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `LoadResult<Config>` - 加载的配置或验证错误
    async fn load_from_string(&self, content: &str) -> LoadResult<Config>;

    /// 验证配置
    ///
    /// # 参数
    /// * `config` - 要验证的配置
    ///
    /// # 返回
    /// * `LoadResult<()>` - 验证结果
    fn validate(&self, config: &Config) -> LoadResult<()>;
}

/// 匹配 ${VAR_NAME} 格式环境变量的正则表达式
fn env_var_regex() -> &'static Regex {
    static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();
    ENV_VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("环境变量正则表达式无效")
    })
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    ///
    /// # 返回
    /// * `Self` - 配置加载器实例
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的环境变量
    ///
    /// # 参数
    /// * `content` - 要处理的字符串
    ///
    /// # 返回
    /// * `LoadResult<String>` - 替换后的字符串或错误
    fn substitute_env_vars(&self, content: &str) -> LoadResult<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let mut result = content.to_string();

        for captures in env_var_regex().captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(ValidationError::EnvVar {
                        var: var_name.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// 解析TOML内容
    ///
    /// # 参数
    /// * `content` - TOML内容
    ///
    /// # 返回
    /// * `LoadResult<Config>` - 解析的配置或错误
    fn parse_toml(&self, content: &str) -> LoadResult<Config> {
        // 替换环境变量
        let processed_content = self.substitute_env_vars(content)?;

        // 解析TOML
        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ValidationError::Parse(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> LoadResult<Config> {
        let path = path.as_ref();

        // 检查文件是否存在
        if !path.exists() {
            return Err(ValidationError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            });
        }

        // 读取文件内容
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ValidationError::Parse(format!("读取文件失败: {}", e)))?;

        // 解析配置
        let config = self.parse_toml(&content)?;

        // 验证配置
        self.validate(&config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> LoadResult<Config> {
        // 解析配置
        let config = self.parse_toml(content)?;

        // 验证配置
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> LoadResult<()> {
        validate_config(config).map_err(ValidationError::Schema)
    }
}

/// 将类型化配置转换为可操作的文档树
///
/// 覆盖层在文档树上按点路径写入，再经 [`config_from_document`]
/// 还原并重新验证
///
/// # 参数
/// * `config` - 类型化配置
///
/// # 返回
/// * `LoadResult<serde_json::Value>` - 文档树
pub fn config_to_document(config: &Config) -> LoadResult<serde_json::Value> {
    serde_json::to_value(config).map_err(|e| ValidationError::Parse(format!("配置序列化失败: {}", e)))
}

/// 将文档树还原为类型化配置并重新验证
///
/// # 参数
/// * `document` - 文档树
///
/// # 返回
/// * `LoadResult<Config>` - 还原的配置或验证错误
pub fn config_from_document(document: serde_json::Value) -> LoadResult<Config> {
    let config: Config = serde_json::from_value(document)
        .map_err(|e| ValidationError::Parse(format!("配置反序列化失败: {}", e)))?;
    validate_config(&config).map_err(ValidationError::Schema)?;
    Ok(config)
}

/// 获取默认配置文件路径
pub fn get_default_config_path() -> std::path::PathBuf {
    // 先检测当前目录是否存在config.toml，不存在则检测用户配置目录
    if std::path::Path::new("config.toml").exists() {
        std::path::PathBuf::from("config.toml")
    } else {
        dirs::config_dir()
            .map(|config_dir| config_dir.join("config-pulse").join("config.toml"))
            .unwrap_or_else(|| std::path::PathBuf::from("config.toml"))
    }
}
