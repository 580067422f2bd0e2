//! 配置加载
//!
//! 从 TOML 文档读取配置段，并允许环境变量覆盖单个键，
//! 最后通过 serde 绑定到强类型的配置结构体。
//!
//! 环境变量命名规则：`{PREFIX}{段}__{键}`，双下划线表示层级，
//! 单下划线对应键名中的 `-`，例如 `TRELLIS_AOP__POOL__MAX_SIZE`
//! 覆盖 `[aop.pool] max-size`。

use std::path::Path;

use serde::de::DeserializeOwned;
use toml::{Table, Value};

use crate::error::{ContainerError, ContainerResult};

/// 默认的环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "TRELLIS_";

/// 配置加载器
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    document: Table,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// 空配置（所有段都使用默认值）
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 字符串加载
    pub fn from_toml_str(content: &str) -> ContainerResult<Self> {
        let document = content
            .parse::<Table>()
            .map_err(|e| ContainerError::Configuration(format!("Failed to parse TOML: {}", e)))?;
        Ok(Self {
            document,
            env_prefix: None,
        })
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContainerError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// 启用环境变量覆盖
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// 按点号路径读取原始值，例如 `aop.pool.max-size`
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let first = parts.next()?;
        let mut current = self.document.get(first)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// 读取并绑定一个配置段，缺失的段绑定为默认值
    pub fn section<T>(&self, name: &str) -> ContainerResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let mut table = match self.get(name) {
            Some(Value::Table(table)) => table.clone(),
            Some(other) => {
                return Err(ContainerError::Configuration(format!(
                    "Config section '{}' is a {}, expected a table",
                    name,
                    other.type_str()
                )))
            }
            None => Table::new(),
        };

        if let Some(prefix) = &self.env_prefix {
            apply_env_overrides(&mut table, &env_section_prefix(prefix, name));
        }

        if table.is_empty() {
            return Ok(T::default());
        }

        Value::Table(table).try_into().map_err(|e| {
            ContainerError::Configuration(format!("Invalid config section '{}': {}", name, e))
        })
    }
}

fn env_section_prefix(prefix: &str, section: &str) -> String {
    let section = section.replace('.', "__").replace('-', "_").to_uppercase();
    format!("{}{}__", prefix, section)
}

fn apply_env_overrides(table: &mut Table, section_prefix: &str) {
    for (env_key, raw) in std::env::vars() {
        let Some(rest) = env_key.strip_prefix(section_prefix) else {
            continue;
        };

        let path: Vec<String> = rest
            .split("__")
            .map(|part| part.to_lowercase().replace('_', "-"))
            .collect();
        if path.iter().any(|p| p.is_empty()) {
            tracing::warn!("Ignoring malformed config override {}", env_key);
            continue;
        }

        tracing::debug!("Config override from environment: {}", env_key);
        insert_path(table, &path, parse_env_value(&raw));
    }
}

fn insert_path(table: &mut Table, path: &[String], value: Value) {
    match path {
        [] => {}
        [last] => {
            table.insert(last.clone(), value);
        }
        [head, tail @ ..] => {
            let child = table
                .entry(head.clone())
                .or_insert_with(|| Value::Table(Table::new()));
            if !child.is_table() {
                *child = Value::Table(Table::new());
            }
            if let Value::Table(child) = child {
                insert_path(child, tail, value);
            }
        }
    }
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Boolean(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    Value::String(raw.to_string())
}
