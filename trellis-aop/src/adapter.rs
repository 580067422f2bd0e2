//! 通知适配器
//!
//! 拦截链只由 [`MethodInterceptor`] 组成，前置、返回后、最终、异常通知
//! 由注册表里的适配器包装成拦截器。注册表在构建后只读，
//! 默认实例进程内共享。

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::advice::{
    AfterAdvice, AfterReturningAdvice, Advice, MethodBeforeAdvice, MethodInterceptor,
    ThrowsAdvice, ThrowsContext,
};
use crate::advisor::Advisor;
use crate::arguments::Value;
use crate::error::AopConfigError;
use crate::invocation::MethodInvocation;

/// 把某种通知转换成拦截器
pub trait AdvisorAdapter: Send + Sync {
    fn supports_advice(&self, advice: &Advice) -> bool;

    fn get_interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError>;
}

/// 前置通知拦截器
pub struct MethodBeforeAdviceInterceptor {
    advice: Arc<dyn MethodBeforeAdvice>,
}

impl MethodBeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn MethodBeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for MethodBeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        let method = *invocation.method();
        let target = Arc::clone(invocation.this());
        self.advice
            .before(&method, invocation.arguments_mut(), &*target)?;
        invocation.proceed()
    }
}

/// 返回后通知拦截器
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        let value = invocation.proceed()?;
        self.advice.after_returning(
            &*value,
            invocation.method(),
            invocation.arguments(),
            &**invocation.this(),
        )?;
        Ok(value)
    }
}

/// 最终通知拦截器
///
/// 目标失败时原错误优先，最终通知自身的错误只记录日志。
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl AfterAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        let result = invocation.proceed();
        let after = self.advice.after(
            invocation.method(),
            invocation.arguments(),
            &**invocation.this(),
        );
        match (result, after) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(after_error)) => Err(after_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(after_error)) => {
                tracing::warn!(
                    "After advice on {} failed while propagating an error: {:#}",
                    invocation.method(),
                    after_error
                );
                Err(error)
            }
        }
    }
}

/// 异常通知拦截器
pub struct ThrowsAdviceInterceptor {
    advice: Arc<ThrowsAdvice>,
}

impl ThrowsAdviceInterceptor {
    pub fn new(advice: Arc<ThrowsAdvice>) -> Result<Self, AopConfigError> {
        if advice.handler_count() == 0 {
            return Err(AopConfigError::InvalidAdvice(
                "throws advice has no handler".to_string(),
            ));
        }
        Ok(Self { advice })
    }
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        let error = match invocation.proceed() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        let ctx = ThrowsContext {
            method: invocation.method(),
            args: invocation.arguments(),
            target: &**invocation.this(),
        };
        match self.advice.handle(&ctx, &error) {
            Some(Err(replacement)) => Err(replacement),
            Some(Ok(())) | None => Err(error),
        }
    }
}

struct MethodBeforeAdviceAdapter;

impl AdvisorAdapter for MethodBeforeAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Before(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError> {
        match advice {
            Advice::Before(before) => Ok(Arc::new(MethodBeforeAdviceInterceptor::new(Arc::clone(
                before,
            )))),
            other => Err(unsupported(other)),
        }
    }
}

struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterReturning(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError> {
        match advice {
            Advice::AfterReturning(after) => Ok(Arc::new(AfterReturningAdviceInterceptor::new(
                Arc::clone(after),
            ))),
            other => Err(unsupported(other)),
        }
    }
}

struct AfterAdviceAdapter;

impl AdvisorAdapter for AfterAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::After(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError> {
        match advice {
            Advice::After(after) => Ok(Arc::new(AfterAdviceInterceptor::new(Arc::clone(after)))),
            other => Err(unsupported(other)),
        }
    }
}

struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Throws(_))
    }

    fn get_interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError> {
        match advice {
            Advice::Throws(throws) => Ok(Arc::new(ThrowsAdviceInterceptor::new(Arc::clone(throws))?)),
            other => Err(unsupported(other)),
        }
    }
}

fn unsupported(advice: &Advice) -> AopConfigError {
    AopConfigError::UnknownAdviceType(advice.advice_type().to_string())
}

static SHARED_REGISTRY: Lazy<Arc<AdvisorAdapterRegistry>> =
    Lazy::new(|| Arc::new(AdvisorAdapterRegistry::new()));

/// 适配器注册表
#[derive(Clone)]
pub struct AdvisorAdapterRegistry {
    adapters: Vec<Arc<dyn AdvisorAdapter>>,
}

impl AdvisorAdapterRegistry {
    /// 带内置适配器（前置、返回后、最终、异常）的注册表
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Arc::new(MethodBeforeAdviceAdapter),
                Arc::new(AfterReturningAdviceAdapter),
                Arc::new(AfterAdviceAdapter),
                Arc::new(ThrowsAdviceAdapter),
            ],
        }
    }

    /// 进程内共享的默认注册表
    pub fn shared() -> Arc<AdvisorAdapterRegistry> {
        Arc::clone(&SHARED_REGISTRY)
    }

    /// 追加适配器（构建阶段）
    pub fn register_adapter(mut self, adapter: Arc<dyn AdvisorAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// 通知是否能转换成拦截器
    pub fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Around(_) | Advice::Introduction(_))
            || self.adapters.iter().any(|a| a.supports_advice(advice))
    }

    /// 把通知包装成匹配一切的通知器
    pub fn wrap(&self, advice: Advice) -> Result<Advisor, AopConfigError> {
        if let Advice::Introduction(_) = advice {
            return Err(AopConfigError::InvalidIntroduction(
                "introduction advice must be added through an introduction advisor".to_string(),
            ));
        }
        if !self.supports(&advice) {
            return Err(unsupported(&advice));
        }
        Ok(Advisor::new(advice))
    }

    /// 通知器对应的拦截器
    pub fn get_interceptors(
        &self,
        advisor: &Advisor,
    ) -> Result<Vec<Arc<dyn MethodInterceptor>>, AopConfigError> {
        let advice = advisor.advice();
        let mut interceptors: Vec<Arc<dyn MethodInterceptor>> = Vec::new();
        match advice {
            Advice::Around(interceptor) => interceptors.push(Arc::clone(interceptor)),
            Advice::Introduction(introduction) => {
                interceptors.push(Arc::clone(introduction.interceptor()))
            }
            _ => {}
        }
        for adapter in &self.adapters {
            if adapter.supports_advice(advice) {
                interceptors.push(adapter.get_interceptor(advice)?);
            }
        }
        if interceptors.is_empty() {
            return Err(unsupported(advice));
        }
        Ok(interceptors)
    }
}

impl Default for AdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdvisorAdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorAdapterRegistry")
            .field("adapters", &self.adapters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag(&'static str);

    struct TagAdapter;

    impl AdvisorAdapter for TagAdapter {
        fn supports_advice(&self, advice: &Advice) -> bool {
            matches!(advice, Advice::Custom(c) if c.downcast_ref::<Tag>().is_some())
        }

        fn get_interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError> {
            let Advice::Custom(custom) = advice else {
                return Err(unsupported(advice));
            };
            let tag = custom.downcast_ref::<Tag>().map(|t| t.0).unwrap_or_default();
            let Advice::Around(interceptor) = Advice::around(move |inv| {
                tracing::debug!("tag {}", tag);
                inv.proceed()
            }) else {
                unreachable!()
            };
            Ok(interceptor)
        }
    }

    #[test]
    fn test_builtin_adapters() {
        let registry = AdvisorAdapterRegistry::new();
        assert_eq!(registry.adapter_count(), 4);

        for advice in [
            Advice::before(|_, _, _| Ok(())),
            Advice::after_returning(|_, _, _| Ok(())),
            Advice::after(|_, _| Ok(())),
            Advice::throws(ThrowsAdvice::new().on_any(|_, _| Ok(()))),
            Advice::around(|inv| inv.proceed()),
        ] {
            let advisor = registry.wrap(advice).unwrap();
            assert_eq!(registry.get_interceptors(&advisor).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_unknown_advice_rejected() {
        let registry = AdvisorAdapterRegistry::new();
        let err = registry.wrap(Advice::custom(Tag("audit"))).unwrap_err();
        assert!(matches!(err, AopConfigError::UnknownAdviceType(_)));
    }

    #[test]
    fn test_custom_adapter() {
        let registry = AdvisorAdapterRegistry::new().register_adapter(Arc::new(TagAdapter));
        let advisor = registry.wrap(Advice::custom(Tag("audit"))).unwrap();
        assert_eq!(registry.get_interceptors(&advisor).unwrap().len(), 1);
        assert_eq!(AdvisorAdapterRegistry::shared().adapter_count(), 4);
    }

    #[test]
    fn test_empty_throws_advice_is_invalid() {
        let registry = AdvisorAdapterRegistry::new();
        let advisor = registry.wrap(Advice::throws(ThrowsAdvice::new())).unwrap();
        let err = registry.get_interceptors(&advisor).err().unwrap();
        assert!(matches!(err, AopConfigError::InvalidAdvice(_)));
    }
}
