//! AOP 错误类型
//!
//! 配置错误在构建代理、修改配置时同步返回；调用错误出现在代理方法调用中。
//! 目标方法自身返回的错误不会被包装，原样交给调用方。

use thiserror::Error;

/// 代理配置错误
#[derive(Debug, Error)]
pub enum AopConfigError {
    #[error("Cannot modify advisors: proxy configuration is frozen")]
    Frozen,

    #[error("Cannot create class-based proxy for final class '{0}'")]
    FinalClass(String),

    #[error("Advice type '{0}' is not supported by any registered advisor adapter")]
    UnknownAdviceType(String),

    #[error("Invalid advice: {0}")]
    InvalidAdvice(String),

    #[error("Invalid introduction: {0}")]
    InvalidIntroduction(String),

    #[error("Advisor index {index} out of bounds (advisor count {len})")]
    AdvisorIndexOutOfBounds { index: usize, len: usize },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid pointcut expression '{expression}': {reason}")]
    InvalidPointcutExpression { expression: String, reason: String },

    #[error("Target of type {actual} does not match class descriptor '{expected}'")]
    TargetTypeMismatch { expected: String, actual: String },

    #[error("No target source configured")]
    MissingTargetSource,

    #[error("Proxy is opaque: advised configuration is not accessible")]
    NotAdvised,

    #[error("Pool size must be at least 1")]
    InvalidPoolSize,

    #[error("Bean '{bean}' is not a prototype: {reason}")]
    NotPrototype { bean: String, reason: String },

    #[error("Failed to resolve interceptor '{name}': {reason}")]
    InterceptorResolution { name: String, reason: String },
}

/// 代理调用错误
#[derive(Debug, Error)]
pub enum AopInvocationError {
    #[error("Target pool exhausted (max size {max_size})")]
    PoolExhausted { max_size: usize },

    #[error("Released a target of class '{class}' that was not borrowed from the pool")]
    UnexpectedRelease { class: String },

    #[error("Failed to create target of class '{class}'")]
    TargetCreationFailed { class: String },

    #[error("Method {method} is not exposed by this proxy")]
    MethodNotExposed { method: String },

    #[error("No implementation of {method} registered for class '{class}'")]
    NoInvoker { method: String, class: String },

    #[error("Argument {index} of {method} is not a {expected}")]
    ArgumentMismatch {
        method: String,
        index: usize,
        expected: &'static str,
    },

    #[error("Return value of {method} is not a {expected}")]
    ReturnTypeMismatch { method: String, expected: &'static str },

    #[error("Cannot find current proxy: set 'expose_proxy' to make it available")]
    ProxyNotAvailable,

    #[error("Target is not an instance of '{expected}'")]
    TargetTypeMismatch { expected: String },

    #[error("Proxy does not implement interface '{0}'")]
    InterfaceNotImplemented(String),

    #[error("Target source no longer available: {0}")]
    TargetSourceUnavailable(String),
}
