//! AOP 配置
//!
//! ```toml
//! [aop]
//! proxy-target-class = false
//! expose-proxy = true
//!
//! [aop.pool]
//! max-size = 16
//! exhausted-action = "block"
//! max-wait-ms = 500
//! ```

use std::time::Duration;

use serde::Deserialize;
use trellis_core::{ConfigLoader, ContainerResult};

use crate::pool::{ExhaustedAction, PoolConfig, DEFAULT_POOL_SIZE};
use crate::proxy_config::ProxyConfig;

/// 配置段名称
pub const AOP_SECTION: &str = "aop";

/// `[aop]` 配置段
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AopSettings {
    pub proxy_target_class: bool,
    pub expose_proxy: bool,
    pub frozen: bool,
    pub opaque: bool,
    pub optimize: bool,
    pub pool: PoolSettings,
}

/// 池耗尽时的行为
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExhaustedPolicy {
    #[default]
    Fail,
    Block,
}

/// `[aop.pool]` 配置段
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PoolSettings {
    pub max_size: usize,
    pub exhausted_action: ExhaustedPolicy,
    /// 只在 `block` 时生效，缺省为无限等待
    pub max_wait_ms: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_SIZE,
            exhausted_action: ExhaustedPolicy::Fail,
            max_wait_ms: None,
        }
    }
}

impl AopSettings {
    /// 从配置加载器读取 `[aop]`
    pub fn load(loader: &ConfigLoader) -> ContainerResult<Self> {
        let settings: AopSettings = loader.section(AOP_SECTION)?;
        tracing::debug!("Loaded AOP settings: {:?}", settings);
        Ok(settings)
    }

    /// 覆盖到已有的代理配置上
    pub fn apply_to(&self, config: &mut ProxyConfig) {
        config.proxy_target_class = self.proxy_target_class;
        config.expose_proxy = self.expose_proxy;
        config.frozen = self.frozen;
        config.opaque = self.opaque;
        config.optimize = self.optimize;
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        self.apply_to(&mut config);
        config
    }

    pub fn pool_config(&self) -> PoolConfig {
        self.pool.to_pool_config()
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        let action = match self.exhausted_action {
            ExhaustedPolicy::Fail => ExhaustedAction::Fail,
            ExhaustedPolicy::Block => ExhaustedAction::Block {
                max_wait: self.max_wait_ms.map(Duration::from_millis),
            },
        };
        PoolConfig::new(self.max_size).with_exhausted_action(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_section_missing() {
        let settings = AopSettings::load(&ConfigLoader::new()).unwrap();
        assert_eq!(settings, AopSettings::default());
        assert_eq!(settings.proxy_config(), ProxyConfig::default());
        assert_eq!(settings.pool_config(), PoolConfig::default());
    }

    #[test]
    fn test_load_from_toml() {
        let loader = ConfigLoader::from_toml_str(
            r#"
            [aop]
            expose-proxy = true
            frozen = true

            [aop.pool]
            max-size = 3
            exhausted-action = "block"
            max-wait-ms = 250
            "#,
        )
        .unwrap();
        let settings = AopSettings::load(&loader).unwrap();

        let config = settings.proxy_config();
        assert!(config.expose_proxy);
        assert!(config.frozen);
        assert!(!config.proxy_target_class);

        let pool = settings.pool_config();
        assert_eq!(pool.max_size, 3);
        assert_eq!(
            pool.exhausted_action,
            ExhaustedAction::Block {
                max_wait: Some(Duration::from_millis(250))
            }
        );
    }

    #[test]
    fn test_unknown_exhausted_action_rejected() {
        let loader = ConfigLoader::from_toml_str(
            r#"
            [aop.pool]
            exhausted-action = "retry"
            "#,
        )
        .unwrap();
        assert!(AopSettings::load(&loader).is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("AOPSETTINGS_AOP__OPTIMIZE", "true");
        std::env::set_var("AOPSETTINGS_AOP__POOL__MAX_SIZE", "12");
        let loader = ConfigLoader::new().with_env_prefix("AOPSETTINGS_");
        let settings = AopSettings::load(&loader).unwrap();
        std::env::remove_var("AOPSETTINGS_AOP__OPTIMIZE");
        std::env::remove_var("AOPSETTINGS_AOP__POOL__MAX_SIZE");

        assert!(settings.optimize);
        assert_eq!(settings.pool.max_size, 12);
    }
}
