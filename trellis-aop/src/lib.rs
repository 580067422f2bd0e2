//! Trellis AOP - 基于代理的方法拦截
//!
//! 提供类似 Spring AOP 的代理机制：
//! - 切点：类过滤器、方法匹配器、名称/正则/表达式/控制流切点及其组合
//! - 通知：环绕、前置、返回后、异常、最终通知以及引入
//! - 通知器与适配器注册表，按配置生成每个方法的拦截链
//! - 目标源：单例、原型、池化、可热替换、线程本地
//! - 代理工厂与 `#[aop_interface]` 生成的类型化代理门面
//! - 通过 BeanPostProcessor 自动为 Bean 创建代理

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aop_context;
pub mod arguments;
pub mod autoproxy;
pub mod chain;
pub mod class;
pub mod class_filter;
pub mod control_flow;
pub mod error;
pub mod expression;
pub mod interceptors;
pub mod invocation;
pub mod method_matcher;
pub mod name_match;
pub mod pointcut;
pub mod pool;
pub mod proxy;
pub mod proxy_config;
pub mod regexp;
pub mod registry;
pub mod settings;
pub mod target_source;

// 重新导出核心类型
pub use adapter::{
    AdvisorAdapter, AdvisorAdapterRegistry, AfterAdviceInterceptor, AfterReturningAdviceInterceptor,
    MethodBeforeAdviceInterceptor, ThrowsAdviceInterceptor,
};
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, IntroductionAdvice,
    IntroductionInterceptor, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice, ThrowsContext,
};
pub use advised::{AdvisedSupport, AdvisedSupportListener};
pub use advisor::{
    Advisor, DelegatingIntroductionInterceptor, IntroductionAdvisor, PointcutAdvisor,
    HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE,
};
pub use aop_context::AopContext;
pub use arguments::{downcast_value, Arguments, Value};
pub use autoproxy::{
    AutoProxyCreator, AutoProxySupport, BeanNameAutoProxyCreator, DefaultAdvisorAutoProxyCreator,
    PoolingAttribute, PoolingTargetSourceCreator, QuickTargetSourceCreator, TargetSourceCreator,
};
pub use chain::{AdvisorChainFactory, ChainCache, ChainEntry, DefaultAdvisorChainFactory};
pub use class::{
    BindInterface, Class, ClassBuilder, ClassRegistry, Interface, Invoker, Method, MethodKey, Target,
};
pub use class_filter::ClassFilter;
pub use control_flow::{ControlFlow, ControlFlowPointcut};
pub use error::{AopConfigError, AopInvocationError};
pub use interceptors::{DebugInterceptor, PerformanceMonitorInterceptor, TracingInterceptor};
pub use invocation::{MethodInvocation, ReflectiveMethodInvocation};
pub use method_matcher::{MethodMatcher, MethodMatchers};
pub use name_match::NameMatchMethodPointcut;
pub use pointcut::{ComposablePointcut, Pointcut, Pointcuts};
pub use pool::{ExhaustedAction, PoolConfig, PooledTargetSource};
pub use proxy::{AopProxyFactory, DefaultAopProxyFactory, Proxy, ProxyFacade, ProxyFactory, ProxyKind};
pub use proxy_config::ProxyConfig;
pub use regexp::RegexpMethodPointcut;
pub use registry::{global_registry, AdvisorRegistration, AdvisorRegistry};
pub use settings::AopSettings;
pub use target_source::{
    HotSwappableTargetSource, PrototypeTargetSource, SingletonTargetSource, TargetSource,
    ThreadLocalTargetSource,
};

// 导出 inventory 供宏使用
pub use inventory;

#[doc(hidden)]
pub mod __private {
    pub use anyhow;
    pub use once_cell::sync::Lazy;
}

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{Advice, MethodInterceptor, ThrowsAdvice};
    pub use crate::advisor::Advisor;
    pub use crate::aop_context::AopContext;
    pub use crate::arguments::{Arguments, Value};
    pub use crate::class::{Class, ClassRegistry, Interface, Method, Target};
    pub use crate::class_filter::ClassFilter;
    pub use crate::error::{AopConfigError, AopInvocationError};
    pub use crate::invocation::MethodInvocation;
    pub use crate::pointcut::Pointcut;
    pub use crate::proxy::{Proxy, ProxyFacade, ProxyFactory};
    pub use crate::target_source::TargetSource;
}
