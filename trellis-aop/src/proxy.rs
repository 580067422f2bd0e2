//! 代理与代理工厂
//!
//! [`Proxy`] 是类型擦除的调用入口：每次 `invoke` 从目标源取得目标，解析
//! 拦截链，驱动 [`ReflectiveMethodInvocation`] 直到完成，最后归还目标。
//! `#[aop_interface]` 生成的门面类型包装 `Proxy`，提供原接口的类型化方法。

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::adapter::AdvisorAdapterRegistry;
use crate::advised::AdvisedSupport;
use crate::aop_context::AopContext;
use crate::arguments::{downcast_value, Arguments, Value};
use crate::class::{Class, Interface, Invoker, Method, Target};
use crate::control_flow::ControlFlow;
use crate::error::{AopConfigError, AopInvocationError};
use crate::invocation::{MethodInvocation, ReflectiveMethodInvocation};
use crate::target_source::TargetSource;

/// 代理的构建方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// 只暴露接口方法
    Interface,
    /// 暴露目标类的全部方法
    Class,
}

struct ProxyInner {
    advised: Arc<AdvisedSupport>,
    kind: ProxyKind,
    interfaces: Vec<Arc<Interface>>,
    target_class: Arc<Class>,
}

/// 代理句柄
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    fn new(advised: Arc<AdvisedSupport>, kind: ProxyKind, interfaces: Vec<Arc<Interface>>, target_class: Arc<Class>) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                advised,
                kind,
                interfaces,
                target_class,
            }),
        }
    }

    pub fn kind(&self) -> ProxyKind {
        self.inner.kind
    }

    /// 代理实现的接口（创建时的快照）
    pub fn proxied_interfaces(&self) -> &[Arc<Interface>] {
        &self.inner.interfaces
    }

    /// 创建代理时目标源声明的类
    pub fn target_class(&self) -> &Arc<Class> {
        &self.inner.target_class
    }

    pub fn implements_interface(&self, name: &str) -> bool {
        self.inner.interfaces.iter().any(|i| i.name() == name)
            || (self.inner.kind == ProxyKind::Class && self.inner.target_class.implements(name))
    }

    /// 代理是否暴露该方法
    pub fn exposes(&self, method: &Method) -> bool {
        method.is_object_method()
            || self.inner.interfaces.iter().any(|i| i.declares(method))
            || (self.inner.kind == ProxyKind::Class && self.inner.target_class.declares(method))
    }

    /// 代理的配置；不透明代理返回 `NotAdvised`
    pub fn advised(&self) -> Result<&Arc<AdvisedSupport>, AopConfigError> {
        if self.inner.advised.is_opaque() {
            return Err(AopConfigError::NotAdvised);
        }
        Ok(&self.inner.advised)
    }

    /// 两个代理的配置是否等价
    pub fn equals_in_proxy(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.kind == other.inner.kind
                && same_interfaces(&self.inner.interfaces, &other.inner.interfaces)
                && self.inner.advised.equals_config(&other.inner.advised))
    }

    /// 与 `equals_in_proxy` 一致的哈希
    pub fn hash_code(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for interface in &self.inner.interfaces {
            interface.name().hash(&mut hasher);
        }
        self.inner.advised.target_identity().hash(&mut hasher);
        hasher.finish()
    }

    /// 类型化调用
    pub fn call<R: Any>(&self, method: &Method, args: Arguments) -> anyhow::Result<R> {
        let value = self.invoke(method, args)?;
        Ok(downcast_value::<R>(value, &method.to_string())?)
    }

    /// 转换成接口门面；代理必须暴露该接口
    pub fn narrow<F: ProxyFacade>(&self) -> Result<F, AopInvocationError> {
        let name = F::interface().name();
        if !self.implements_interface(name) {
            return Err(AopInvocationError::InterfaceNotImplemented(name.to_string()));
        }
        Ok(F::from_proxy_unchecked(self.clone()))
    }

    /// 经过拦截链调用方法
    pub fn invoke(&self, method: &Method, args: Arguments) -> anyhow::Result<Value> {
        if !self.exposes(method) {
            return Err(AopInvocationError::MethodNotExposed {
                method: method.to_string(),
            }
            .into());
        }

        let class = &self.inner.target_class;
        if *method == Method::EQUALS && !class.declares(method) {
            let equal = args
                .get::<Proxy>(0)
                .map_or(false, |other| self.equals_in_proxy(other));
            return Ok(Box::new(equal));
        }
        if *method == Method::HASH_CODE && !class.declares(method) {
            return Ok(Box::new(self.hash_code()));
        }

        let advised = &self.inner.advised;
        let _exposed = advised
            .is_expose_proxy()
            .then(|| AopContext::push(self.clone()));

        let target_source = advised.target_source()?;
        let target_class = target_source.target_class();
        let lease = TargetLease::acquire(&*target_source)?;
        let _frame = ControlFlow::enter(target_class.name(), method.name());

        let result = self.dispatch(method, args, lease.target(), target_class);
        match (result, lease.release()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_error)) => Err(release_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(release_error)) => {
                tracing::warn!(
                    "Failed to release target after {} failed: {:#}",
                    method,
                    release_error
                );
                Err(error)
            }
        }
    }

    fn dispatch(
        &self,
        method: &Method,
        mut args: Arguments,
        target: &Target,
        target_class: Arc<Class>,
    ) -> anyhow::Result<Value> {
        let chain = self
            .inner
            .advised
            .interceptors_for(method, &target_class)?;
        let invoker = target_class
            .invoker(&method.key())
            .cloned()
            .or_else(|| (*method == Method::TO_STRING).then(|| self.default_to_string()));

        if chain.is_empty() {
            let invoker = invoker.ok_or_else(|| AopInvocationError::NoInvoker {
                method: method.to_string(),
                class: target_class.name().to_string(),
            })?;
            return invoker(&**target, &mut args);
        }

        let mut invocation = ReflectiveMethodInvocation::new(
            self.clone(),
            Arc::clone(target),
            target_class,
            *method,
            args,
            chain,
        );
        if let Some(invoker) = invoker {
            invocation = invocation.with_invoker(invoker);
        }
        invocation.proceed()
    }

    fn default_to_string(&self) -> Invoker {
        let description = self.to_string();
        Arc::new(
            move |_target: &(dyn Any + Send + Sync), _args: &mut Arguments| -> anyhow::Result<Value> {
                Ok(Box::new(description.clone()))
            },
        )
    }
}

fn same_interfaces(a: &[Arc<Interface>], b: &[Arc<Interface>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.name() == y.name())
}

/// 从目标源借出的目标，离开作用域时归还
struct TargetLease<'a> {
    source: &'a dyn TargetSource,
    target: Target,
    pending: bool,
}

impl<'a> TargetLease<'a> {
    fn acquire(source: &'a dyn TargetSource) -> anyhow::Result<Self> {
        let target = source.get_target()?;
        Ok(Self {
            source,
            target,
            pending: !source.is_static(),
        })
    }

    fn target(&self) -> &Target {
        &self.target
    }

    fn release(mut self) -> anyhow::Result<()> {
        if !self.pending {
            return Ok(());
        }
        self.pending = false;
        self.source.release_target(Arc::clone(&self.target))
    }
}

impl Drop for TargetLease<'_> {
    fn drop(&mut self) {
        if self.pending {
            if let Err(e) = self.source.release_target(Arc::clone(&self.target)) {
                tracing::warn!("Failed to release target during unwind: {:#}", e);
            }
        }
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.equals_in_proxy(other)
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interfaces: Vec<&str> = self.inner.interfaces.iter().map(|i| i.name()).collect();
        write!(
            f,
            "{:?} proxy for '{}' [{}]",
            self.inner.kind,
            self.inner.target_class.name(),
            interfaces.join(", ")
        )
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("kind", &self.inner.kind)
            .field("target_class", &self.inner.target_class.name())
            .field(
                "interfaces",
                &self.inner.interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// 接口门面
///
/// 由 `#[aop_interface]` 为每个接口生成实现。
pub trait ProxyFacade: Sized {
    /// 门面对应的接口描述
    fn interface() -> &'static Arc<Interface>;

    /// 不检查接口直接包装
    fn from_proxy_unchecked(proxy: Proxy) -> Self;

    fn proxy(&self) -> &Proxy;

    fn narrow(proxy: &Proxy) -> Result<Self, AopInvocationError> {
        proxy.narrow::<Self>()
    }
}

/// 根据配置创建代理
pub trait AopProxyFactory: Send + Sync {
    fn create_aop_proxy(&self, advised: Arc<AdvisedSupport>) -> Result<Proxy, AopConfigError>;
}

/// 默认策略：设置了 `optimize` 或 `proxy_target_class`，或者没有任何接口时
/// 基于类代理（要求非 final），否则基于接口代理
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAopProxyFactory;

impl AopProxyFactory for DefaultAopProxyFactory {
    fn create_aop_proxy(&self, advised: Arc<AdvisedSupport>) -> Result<Proxy, AopConfigError> {
        let target_class = advised.target_source()?.target_class();
        let config = advised.config();
        let interfaces = advised.interfaces();

        if config.optimize || config.proxy_target_class || interfaces.is_empty() {
            if target_class.is_final() {
                return Err(AopConfigError::FinalClass(target_class.name().to_string()));
            }
            let mut all = interfaces;
            for interface in target_class.all_interfaces() {
                if !all.iter().any(|i| i.name() == interface.name()) {
                    all.push(interface);
                }
            }
            tracing::debug!("Creating class-based proxy for '{}'", target_class.name());
            return Ok(Proxy::new(advised, ProxyKind::Class, all, target_class));
        }

        tracing::debug!(
            "Creating interface-based proxy for '{}' with {} interface(s)",
            target_class.name(),
            interfaces.len()
        );
        Ok(Proxy::new(advised, ProxyKind::Interface, interfaces, target_class))
    }
}

/// 编程式创建代理
///
/// 通过 `Deref` 直接使用 [`AdvisedSupport`] 的配置方法。
pub struct ProxyFactory {
    advised: Arc<AdvisedSupport>,
    aop_proxy_factory: Arc<dyn AopProxyFactory>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::from_advised(AdvisedSupport::new())
    }

    pub fn from_advised(advised: AdvisedSupport) -> Self {
        Self {
            advised: Arc::new(advised),
            aop_proxy_factory: Arc::new(DefaultAopProxyFactory),
        }
    }

    /// 使用指定适配器注册表
    pub fn with_registry(registry: Arc<AdvisorAdapterRegistry>) -> Self {
        Self::from_advised(AdvisedSupport::with_registry(registry))
    }

    /// 代理单个目标，并代理它实现的全部接口
    pub fn for_target(target: Target, class: Arc<Class>) -> Result<Self, AopConfigError> {
        let factory = Self::new();
        for interface in class.all_interfaces() {
            factory.add_interface(interface);
        }
        factory.set_target(target, class)?;
        Ok(factory)
    }

    pub fn for_target_source(target_source: Arc<dyn TargetSource>) -> Self {
        let factory = Self::new();
        factory.set_target_source(target_source);
        factory
    }

    pub fn with_aop_proxy_factory(mut self, aop_proxy_factory: Arc<dyn AopProxyFactory>) -> Self {
        self.aop_proxy_factory = aop_proxy_factory;
        self
    }

    pub fn advised(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    /// 创建代理；第一次调用时通知监听器
    pub fn get_proxy(&self) -> Result<Proxy, AopConfigError> {
        self.advised.activate();
        let proxy = self
            .aop_proxy_factory
            .create_aop_proxy(Arc::clone(&self.advised))?;
        tracing::debug!("Created {}", proxy);
        Ok(proxy)
    }

    /// 创建代理并转换成接口门面
    pub fn get_facade<F: ProxyFacade>(&self) -> anyhow::Result<F> {
        Ok(self.get_proxy()?.narrow::<F>()?)
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ProxyFactory {
    type Target = AdvisedSupport;

    fn deref(&self) -> &AdvisedSupport {
        &self.advised
    }
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("advised", &self.advised)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use parking_lot::Mutex;

    const GREET: Method = Method::new("Greeter", "greet", &["String"], "String");
    const SECRET: Method = Method::new("Vault", "secret", &[], "u32");

    struct Greeter;
    struct Sealed;

    fn greeter_interface() -> Arc<Interface> {
        Arc::new(Interface::new("Greeter", vec![GREET]))
    }

    fn greeter_class() -> Arc<Class> {
        Class::builder::<Greeter>("EnglishGreeter")
            .interface(greeter_interface())
            .method(GREET, |_, args| {
                let name = args.cloned::<String>(0)?;
                Ok(Box::new(format!("Hello, {}", name)) as Value)
            })
            .method(SECRET, |_, _| Ok(Box::new(42u32) as Value))
            .build()
    }

    fn factory() -> ProxyFactory {
        ProxyFactory::for_target(Arc::new(Greeter), greeter_class()).unwrap()
    }

    #[test]
    fn test_interface_proxy_exposes_only_interface_methods() {
        let proxy = factory().get_proxy().unwrap();
        assert_eq!(proxy.kind(), ProxyKind::Interface);

        let greeting: String = proxy
            .call(&GREET, Arguments::new().with("Ada".to_string()))
            .unwrap();
        assert_eq!(greeting, "Hello, Ada");

        let err = proxy.invoke(&SECRET, Arguments::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AopInvocationError>(),
            Some(AopInvocationError::MethodNotExposed { .. })
        ));
    }

    #[test]
    fn test_class_proxy_exposes_all_methods() {
        let factory = factory();
        factory.set_proxy_target_class(true);
        let proxy = factory.get_proxy().unwrap();
        assert_eq!(proxy.kind(), ProxyKind::Class);
        assert_eq!(proxy.call::<u32>(&SECRET, Arguments::new()).unwrap(), 42);
    }

    #[test]
    fn test_final_class_cannot_be_class_proxied() {
        let class = Class::builder::<Sealed>("Sealed").final_class().build();
        let factory = ProxyFactory::for_target(Arc::new(Sealed), class).unwrap();
        assert!(matches!(factory.get_proxy(), Err(AopConfigError::FinalClass(_))));
    }

    #[test]
    fn test_object_methods() {
        let factory = factory();
        let a = factory.get_proxy().unwrap();
        let b = factory.get_proxy().unwrap();
        assert!(a.call::<bool>(&Method::EQUALS, Arguments::new().with(b.clone())).unwrap());
        assert_eq!(a, b);
        assert_eq!(
            a.call::<u64>(&Method::HASH_CODE, Arguments::new()).unwrap(),
            b.hash_code()
        );
        let description = a.call::<String>(&Method::TO_STRING, Arguments::new()).unwrap();
        assert!(description.contains("EnglishGreeter"));

        let other = ProxyFactory::for_target(Arc::new(Greeter), greeter_class())
            .unwrap()
            .get_proxy()
            .unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_to_string_goes_through_chain() {
        let factory = factory();
        factory
            .add_advice(Advice::around(|_| Ok(Box::new("advised".to_string()))))
            .unwrap();
        let proxy = factory.get_proxy().unwrap();
        assert_eq!(
            proxy.call::<String>(&Method::TO_STRING, Arguments::new()).unwrap(),
            "advised"
        );
    }

    #[test]
    fn test_opaque_hides_advised() {
        let factory = factory();
        assert!(factory.get_proxy().unwrap().advised().is_ok());
        factory.set_opaque(true);
        assert!(matches!(
            factory.get_proxy().unwrap().advised(),
            Err(AopConfigError::NotAdvised)
        ));
    }

    #[test]
    fn test_expose_proxy() {
        let seen = Arc::new(Mutex::new(None));
        let factory = factory();
        let sink = Arc::clone(&seen);
        factory
            .add_advice(Advice::around(move |inv| {
                *sink.lock() = Some(AopContext::current_proxy().is_ok());
                inv.proceed()
            }))
            .unwrap();

        let proxy = factory.get_proxy().unwrap();
        proxy.invoke(&GREET, Arguments::new().with(String::new())).unwrap();
        assert_eq!(*seen.lock(), Some(false));

        factory.set_expose_proxy(true);
        proxy.invoke(&GREET, Arguments::new().with(String::new())).unwrap();
        assert_eq!(*seen.lock(), Some(true));
        assert!(AopContext::current_proxy().is_err());
    }

    #[test]
    fn test_missing_target_source() {
        assert!(matches!(
            ProxyFactory::new().get_proxy(),
            Err(AopConfigError::MissingTargetSource)
        ));
    }
}
