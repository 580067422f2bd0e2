// trellis-core: Trellis 的基础设施
//
// 提供 AOP 层依赖的最小运行环境：
// - 按名称管理的同步 Bean 容器（单例 / 原型）
// - BeanPostProcessor 扩展点（自动代理的挂载点）
// - TOML + 环境变量的配置加载
// - 基于 tracing 的日志初始化

pub mod bean;
pub mod bean_factory;
pub mod bean_post_processor;
pub mod config;
pub mod error;
pub mod logging;
pub mod scope;
pub mod utils;

// 重新导出常用类型
pub use bean::{BeanDefinition, InstanceSupplier, SharedBean};
pub use bean_factory::{BeanFactory, BeanFactoryExt, DefaultListableBeanFactory};
pub use bean_post_processor::{BeanPostProcessor, DEFAULT_PROCESSOR_ORDER};
pub use config::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use error::{ContainerError, ContainerResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig, LOGGING_SECTION};
pub use scope::Scope;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{BeanDefinition, SharedBean};
    pub use crate::bean_factory::{BeanFactory, BeanFactoryExt, DefaultListableBeanFactory};
    pub use crate::bean_post_processor::BeanPostProcessor;
    pub use crate::config::ConfigLoader;
    pub use crate::error::{ContainerError, ContainerResult, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::scope::Scope;
    pub use anyhow::{anyhow, Context};
}
