//! 代理标志位

use std::fmt;

/// 创建代理时使用的标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// 基于类创建代理（即使目标实现了接口）
    pub proxy_target_class: bool,
    /// 允许激进优化，效果同基于类的代理
    pub optimize: bool,
    /// 代理不暴露 `advised()` 配置
    pub opaque: bool,
    /// 调用期间通过 `AopContext` 暴露当前代理
    pub expose_proxy: bool,
    /// 冻结后不能再修改通知器
    pub frozen: bool,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proxy_target_class(mut self, value: bool) -> Self {
        self.proxy_target_class = value;
        self
    }

    pub fn with_optimize(mut self, value: bool) -> Self {
        self.optimize = value;
        self
    }

    pub fn with_opaque(mut self, value: bool) -> Self {
        self.opaque = value;
        self
    }

    pub fn with_expose_proxy(mut self, value: bool) -> Self {
        self.expose_proxy = value;
        self
    }

    pub fn with_frozen(mut self, value: bool) -> Self {
        self.frozen = value;
        self
    }

    /// 复制另一份配置的全部标志
    pub fn copy_from(&mut self, other: &ProxyConfig) {
        *self = *other;
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proxy_target_class={}; optimize={}; opaque={}; expose_proxy={}; frozen={}",
            self.proxy_target_class, self.optimize, self.opaque, self.expose_proxy, self.frozen
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_copy() {
        let config = ProxyConfig::new().with_frozen(true).with_expose_proxy(true);
        let mut other = ProxyConfig::default();
        other.copy_from(&config);
        assert_eq!(other, config);
        assert!(other.frozen && other.expose_proxy && !other.opaque);
        assert!(config.to_string().contains("frozen=true"));
    }
}
