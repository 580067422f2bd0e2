//! 通知（Advice）定义
//!
//! 环绕拦截器是唯一真正执行的形态；前置、返回后、最终、异常通知
//! 由适配器注册表转换成拦截器后再进入拦截链。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::arguments::{Arguments, Value};
use crate::class::{Interface, Method};
use crate::invocation::MethodInvocation;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 引入通知（为代理增加接口）
    Introduction,
    /// 需要自定义适配器的通知
    Custom,
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdviceType::Before => "before",
            AdviceType::After => "after",
            AdviceType::AfterReturning => "after-returning",
            AdviceType::AfterThrowing => "after-throwing",
            AdviceType::Around => "around",
            AdviceType::Introduction => "introduction",
            AdviceType::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// 环绕拦截器
///
/// 可以在 `proceed()` 前后做任何事，也可以不调用 `proceed()` 直接返回（短路），
/// 或多次调用（重试）。
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value>;
}

/// 前置通知；可以改写参数，返回错误则终止调用
pub trait MethodBeforeAdvice: Send + Sync {
    fn before(
        &self,
        method: &Method,
        args: &mut Arguments,
        target: &(dyn Any + Send + Sync),
    ) -> anyhow::Result<()>;
}

/// 返回后通知；只观察返回值，返回错误会替换调用结果
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(
        &self,
        return_value: &(dyn Any + Send),
        method: &Method,
        args: &Arguments,
        target: &(dyn Any + Send + Sync),
    ) -> anyhow::Result<()>;
}

/// 最终通知；无论成功或失败都会执行
pub trait AfterAdvice: Send + Sync {
    fn after(
        &self,
        method: &Method,
        args: &Arguments,
        target: &(dyn Any + Send + Sync),
    ) -> anyhow::Result<()>;
}

/// 引入拦截器：让代理额外实现接口
pub trait IntroductionInterceptor: MethodInterceptor {
    fn implements_interface(&self, interface: &Interface) -> bool;
}

struct FnInterceptor<F>(F);

impl<F> MethodInterceptor for FnInterceptor<F>
where
    F: Fn(&mut dyn MethodInvocation) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
        (self.0)(invocation)
    }
}

struct FnBefore<F>(F);

impl<F> MethodBeforeAdvice for FnBefore<F>
where
    F: Fn(&Method, &mut Arguments, &(dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync,
{
    fn before(
        &self,
        method: &Method,
        args: &mut Arguments,
        target: &(dyn Any + Send + Sync),
    ) -> anyhow::Result<()> {
        (self.0)(method, args, target)
    }
}

struct FnAfterReturning<F>(F);

impl<F> AfterReturningAdvice for FnAfterReturning<F>
where
    F: Fn(&(dyn Any + Send), &Method, &Arguments) -> anyhow::Result<()> + Send + Sync,
{
    fn after_returning(
        &self,
        return_value: &(dyn Any + Send),
        method: &Method,
        args: &Arguments,
        _target: &(dyn Any + Send + Sync),
    ) -> anyhow::Result<()> {
        (self.0)(return_value, method, args)
    }
}

struct FnAfter<F>(F);

impl<F> AfterAdvice for FnAfter<F>
where
    F: Fn(&Method, &Arguments) -> anyhow::Result<()> + Send + Sync,
{
    fn after(
        &self,
        method: &Method,
        args: &Arguments,
        _target: &(dyn Any + Send + Sync),
    ) -> anyhow::Result<()> {
        (self.0)(method, args)
    }
}

/// 异常处理上下文
pub struct ThrowsContext<'a> {
    pub method: &'a Method,
    pub args: &'a Arguments,
    pub target: &'a (dyn Any + Send + Sync),
}

type ThrowsHandlerFn =
    Arc<dyn Fn(&ThrowsContext<'_>, &anyhow::Error) -> anyhow::Result<()> + Send + Sync>;

struct ThrowsHandler {
    error_type: &'static str,
    accepts: fn(&anyhow::Error) -> bool,
    handle: ThrowsHandlerFn,
}

/// 异常通知
///
/// 按错误类型注册处理函数，目标出错时选中第一个类型匹配的处理函数，
/// 都不匹配时使用 `on_any` 注册的兜底处理。处理函数不能吞掉错误：
/// 返回 `Ok(())` 时原错误继续向上传播，返回 `Err` 时用新错误替换。
#[derive(Default)]
pub struct ThrowsAdvice {
    handlers: Vec<ThrowsHandler>,
    fallback: Option<ThrowsHandlerFn>,
}

impl ThrowsAdvice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为错误类型 `E` 注册处理函数
    pub fn on<E, F>(mut self, handler: F) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&ThrowsContext<'_>, &E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.push(ThrowsHandler {
            error_type: std::any::type_name::<E>(),
            accepts: |error| error.downcast_ref::<E>().is_some(),
            handle: Arc::new(
                move |ctx: &ThrowsContext<'_>, error: &anyhow::Error| -> anyhow::Result<()> {
                    match error.downcast_ref::<E>() {
                        Some(typed) => handler(ctx, typed),
                        None => Ok(()),
                    }
                },
            ),
        });
        self
    }

    /// 兜底处理函数
    pub fn on_any<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ThrowsContext<'_>, &anyhow::Error) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// 处理函数数量（含兜底）
    pub fn handler_count(&self) -> usize {
        self.handlers.len() + usize::from(self.fallback.is_some())
    }

    /// 已注册的错误类型名
    pub fn handled_types(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.error_type).collect()
    }

    /// 执行匹配的处理函数；没有匹配时返回 None
    pub fn handle(&self, ctx: &ThrowsContext<'_>, error: &anyhow::Error) -> Option<anyhow::Result<()>> {
        let handler = self
            .handlers
            .iter()
            .find(|h| (h.accepts)(error))
            .map(|h| &h.handle)
            .or(self.fallback.as_ref())?;
        Some(handler(ctx, error))
    }
}

impl fmt::Debug for ThrowsAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrowsAdvice")
            .field("handled_types", &self.handled_types())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// 引入通知的两个视图：接口判断与拦截
#[derive(Clone)]
pub struct IntroductionAdvice {
    pub(crate) introduction: Arc<dyn IntroductionInterceptor>,
    pub(crate) interceptor: Arc<dyn MethodInterceptor>,
}

impl IntroductionAdvice {
    pub fn new<I: IntroductionInterceptor + 'static>(interceptor: Arc<I>) -> Self {
        Self {
            introduction: Arc::clone(&interceptor) as Arc<dyn IntroductionInterceptor>,
            interceptor: interceptor as Arc<dyn MethodInterceptor>,
        }
    }

    pub fn implements_interface(&self, interface: &Interface) -> bool {
        self.introduction.implements_interface(interface)
    }

    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        &self.interceptor
    }
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Around(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn MethodBeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    After(Arc<dyn AfterAdvice>),
    Throws(Arc<ThrowsAdvice>),
    Introduction(IntroductionAdvice),
    /// 只有注册了对应适配器才能使用
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Advice {
    /// 闭包环绕通知
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&mut dyn MethodInvocation) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(FnInterceptor(f)))
    }

    /// 闭包前置通知
    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&Method, &mut Arguments, &(dyn Any + Send + Sync)) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Advice::Before(Arc::new(FnBefore(f)))
    }

    /// 闭包返回后通知
    pub fn after_returning<F>(f: F) -> Self
    where
        F: Fn(&(dyn Any + Send), &Method, &Arguments) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(FnAfterReturning(f)))
    }

    /// 闭包最终通知
    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&Method, &Arguments) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::After(Arc::new(FnAfter(f)))
    }

    pub fn interceptor<I: MethodInterceptor + 'static>(interceptor: I) -> Self {
        Advice::Around(Arc::new(interceptor))
    }

    pub fn throws(advice: ThrowsAdvice) -> Self {
        Advice::Throws(Arc::new(advice))
    }

    pub fn introduction<I: IntroductionInterceptor + 'static>(interceptor: Arc<I>) -> Self {
        Advice::Introduction(IntroductionAdvice::new(interceptor))
    }

    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Advice::Custom(Arc::new(value))
    }

    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Around(_) => AdviceType::Around,
            Advice::Before(_) => AdviceType::Before,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::After(_) => AdviceType::After,
            Advice::Throws(_) => AdviceType::AfterThrowing,
            Advice::Introduction(_) => AdviceType::Introduction,
            Advice::Custom(_) => AdviceType::Custom,
        }
    }

    fn identity(&self) -> *const () {
        match self {
            Advice::Around(a) => Arc::as_ptr(a) as *const (),
            Advice::Before(a) => Arc::as_ptr(a) as *const (),
            Advice::AfterReturning(a) => Arc::as_ptr(a) as *const (),
            Advice::After(a) => Arc::as_ptr(a) as *const (),
            Advice::Throws(a) => Arc::as_ptr(a) as *const (),
            Advice::Introduction(a) => Arc::as_ptr(&a.interceptor) as *const (),
            Advice::Custom(a) => Arc::as_ptr(a) as *const (),
        }
    }

    /// 是否是同一个通知实例
    pub fn same_as(&self, other: &Advice) -> bool {
        self.identity() == other.identity()
    }
}

impl From<Arc<dyn MethodInterceptor>> for Advice {
    fn from(interceptor: Arc<dyn MethodInterceptor>) -> Self {
        Advice::Around(interceptor)
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advice::Throws(t) => write!(f, "Advice::Throws({:?})", t),
            other => write!(f, "Advice::{}({:p})", other.advice_type(), other.identity()),
        }
    }
}
