use thiserror::Error;

/// 统一的错误处理类型
///
/// 框架对外的“调用结果”统一使用 anyhow::Result，目标方法抛出的错误
/// 原样穿过拦截链，调用方可以通过 `downcast_ref` 取回具体类型。
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::{Context, Result};
///
/// fn load(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>> {
///     self.factory.get_bean(name)
///         .context(format!("Failed to get bean '{}'", name))
/// }
/// ```
pub use anyhow::Result;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Bean not found: {0}")]
    BeanNotFound(String),

    #[error("Bean already registered: {0}")]
    BeanAlreadyRegistered(String),

    #[error("Bean '{name}' is not of the requested type {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Bean creation failed: {0}")]
    BeanCreationFailed(String),

    #[error("Bean post processing failed for '{bean}': {reason}")]
    PostProcessingFailed { bean: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 容器操作结果
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_error_display() {
        let err = ContainerError::BeanNotFound("userService".to_string());
        assert_eq!(err.to_string(), "Bean not found: userService");

        let err = ContainerError::TypeMismatch {
            name: "pool".to_string(),
            expected: "u32",
        };
        assert!(err.to_string().contains("u32"));
    }

    #[test]
    fn test_other_is_transparent() {
        let err: ContainerError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
