//! 配置覆盖层
//!
//! 提供点路径覆盖表及其在文档树上的应用逻辑

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// 匹配合法点路径（如 `llms.nim_llm.temperature`）的正则表达式
fn override_path_regex() -> &'static Regex {
    static OVERRIDE_PATH_REGEX: OnceLock<Regex> = OnceLock::new();
    OVERRIDE_PATH_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(\.[A-Za-z_][A-Za-z0-9_-]*)*$")
            .expect("覆盖路径正则表达式无效")
    })
}

/// 检查覆盖路径的语法是否合法
///
/// # 参数
/// * `path` - 点路径
///
/// # 返回
/// * `bool` - 语法是否合法
pub fn is_valid_override_path(path: &str) -> bool {
    override_path_regex().is_match(path)
}

/// 插入有序的覆盖表，`点路径 -> 字符串值`
///
/// 叠加在持久化文档之上；只在管理器的锁内被修改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideMap {
    entries: Vec<(String, String)>,
}

impl OverrideMap {
    /// 创建空覆盖表
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入覆盖项；同路径的旧值被原位替换，保持首次插入的顺序
    pub fn insert(&mut self, path: String, value: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| *p == path) {
            entry.1 = value;
        } else {
            self.entries.push((path, value));
        }
    }

    /// 获取指定路径的覆盖值
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v.as_str())
    }

    /// 按插入顺序遍历覆盖项
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    /// 覆盖项数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for OverrideMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = OverrideMap::new();
        for (path, value) in iter {
            map.insert(path, value);
        }
        map
    }
}

/// 在文档树上按点路径应用单个覆盖值
///
/// 路径必须指向文档中已存在的字段；替换值按被替换字段的类型
/// 解析，类型之外的语义检查交给随后的整体重新验证
///
/// # 参数
/// * `document` - 文档树
/// * `path` - 点路径
/// * `raw_value` - 字符串形式的覆盖值
///
/// # 返回
/// * `Result<(), String>` - 应用结果，错误时返回错误信息
pub fn apply_override(document: &mut Value, path: &str, raw_value: &str) -> Result<(), String> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| "覆盖路径不能为空".to_string())?;

    let mut cursor = &mut *document;
    for segment in parents {
        cursor = cursor
            .get_mut(*segment)
            .ok_or_else(|| format!("覆盖路径 {} 中的字段 {} 不存在", path, segment))?;
        if !cursor.is_object() {
            return Err(format!("覆盖路径 {} 中的字段 {} 不是对象", path, segment));
        }
    }

    let target = cursor
        .get_mut(*last)
        .ok_or_else(|| format!("覆盖路径 {} 指向的字段不存在", path))?;

    let coerced = coerce_value(target, path, raw_value)?;
    *target = coerced;
    Ok(())
}

/// 将字符串值解析为目标字段当前的JSON类型
fn coerce_value(target: &Value, path: &str, raw_value: &str) -> Result<Value, String> {
    match target {
        Value::String(_) => Ok(Value::String(raw_value.to_string())),
        Value::Bool(_) => raw_value
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| format!("覆盖路径 {} 需要布尔值，得到: {}", path, raw_value)),
        Value::Number(n) => {
            if n.is_f64() {
                let parsed = raw_value
                    .parse::<f64>()
                    .map_err(|_| format!("覆盖路径 {} 需要浮点数，得到: {}", path, raw_value))?;
                serde_json::Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| format!("覆盖路径 {} 的浮点值 {} 无效", path, raw_value))
            } else if n.is_u64() {
                raw_value
                    .parse::<u64>()
                    .map(|v| Value::Number(v.into()))
                    .map_err(|_| format!("覆盖路径 {} 需要非负整数，得到: {}", path, raw_value))
            } else {
                raw_value
                    .parse::<i64>()
                    .map(|v| Value::Number(v.into()))
                    .map_err(|_| format!("覆盖路径 {} 需要整数，得到: {}", path, raw_value))
            }
        }
        // null字段按字符串处理，数组和对象不支持覆盖
        Value::Null => Ok(Value::String(raw_value.to_string())),
        Value::Array(_) | Value::Object(_) => Err(format!(
            "覆盖路径 {} 指向数组或对象，不支持覆盖",
            path
        )),
    }
}
