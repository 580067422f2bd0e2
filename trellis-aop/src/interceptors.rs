//! 常用拦截器

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::advice::MethodInterceptor;
use crate::arguments::Value;
use crate::invocation::MethodInvocation;

/// 记录方法进入、退出与耗时
#[derive(Debug, Default, Clone)]
pub struct TracingInterceptor {
    log_args: bool,
}

impl TracingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录参数
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl MethodInterceptor for TracingInterceptor {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        let method = *invocation.method();
        let class_name = invocation.target_class().name();
        if self.log_args {
            tracing::debug!("→ Entering: {}::{} {:?}", class_name, method.name(), invocation.arguments());
        } else {
            tracing::debug!("→ Entering: {}::{}", class_name, method.name());
        }

        let started = Instant::now();
        let result = invocation.proceed();
        match &result {
            Ok(_) => tracing::debug!(
                "← Exiting: {}::{} (took {:?})",
                class_name,
                method.name(),
                started.elapsed()
            ),
            Err(e) => tracing::debug!(
                "← Exiting: {}::{} with error '{}' (took {:?})",
                class_name,
                method.name(),
                e,
                started.elapsed()
            ),
        }
        result
    }
}

/// 调用耗时超过阈值时告警
#[derive(Debug, Clone)]
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl Default for PerformanceMonitorInterceptor {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl MethodInterceptor for PerformanceMonitorInterceptor {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        let started = Instant::now();
        let result = invocation.proceed();
        let elapsed = started.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(
                "Slow method detected: {}::{} took {}ms (threshold: {}ms)",
                invocation.target_class().name(),
                invocation.method().name(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        }
        result
    }
}

/// 统计调用次数，并在 trace 级别输出调用细节
#[derive(Debug, Default)]
pub struct DebugInterceptor {
    count: AtomicUsize,
}

impl DebugInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

impl MethodInterceptor for DebugInterceptor {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(
            "Invocation #{} of {} with {} argument(s)",
            n,
            invocation.method(),
            invocation.arguments().len()
        );
        let result = invocation.proceed();
        if let Err(e) = &result {
            tracing::trace!("Invocation #{} of {} failed: {:#}", n, invocation.method(), e);
        }
        result
    }
}
