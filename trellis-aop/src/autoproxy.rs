//! 自动代理
//!
//! 自动代理创建器是 Bean 后置处理器：Bean 初始化后，按规则为它选出通知器，
//! 把 Bean 替换成 [`Proxy`]。如果某个 [`TargetSourceCreator`] 为 Bean 提供了
//! 自定义目标源（池化、线程本地、原型），代理在实例化之前就直接创建，
//! 目标对象由目标源通过 Bean 工厂的 `instantiate` 按需创建。
//!
//! Bean 的类描述从 [`ClassRegistry`] 按类型查找；没有登记类描述的 Bean 不会被代理。

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use trellis_core::{BeanFactory, BeanPostProcessor, ContainerError, ContainerResult, SharedBean};

use crate::adapter::AdvisorAdapterRegistry;
use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::class::{Class, ClassRegistry};
use crate::error::AopConfigError;
use crate::name_match::simple_match_any;
use crate::pool::{PoolConfig, PooledTargetSource};
use crate::proxy::{Proxy, ProxyFactory};
use crate::proxy_config::ProxyConfig;
use crate::registry::{global_registry, AdvisorRegistry};
use crate::target_source::{
    PrototypeTargetSource, SingletonTargetSource, TargetSource, ThreadLocalTargetSource,
};

/// 自动代理创建器的默认处理器顺序（在普通处理器之后）
pub const AUTO_PROXY_CREATOR_ORDER: i32 = 2000;

// ============================================================================
// 目标源创建器
// ============================================================================

/// 为特定 Bean 提供自定义目标源
pub trait TargetSourceCreator: Send + Sync {
    /// 返回 None 表示不处理该 Bean
    fn target_source(
        &self,
        class: &Arc<Class>,
        bean_name: &str,
        factory: &Weak<dyn BeanFactory>,
    ) -> Result<Option<Arc<dyn TargetSource>>, AopConfigError>;
}

/// 池化属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolingAttribute {
    pub size: usize,
}

impl PoolingAttribute {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

/// 按 Bean 名称配置池化属性
#[derive(Debug, Default)]
pub struct PoolingTargetSourceCreator {
    attributes: HashMap<String, PoolingAttribute>,
    template: PoolConfig,
}

impl PoolingTargetSourceCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 池化指定 Bean
    pub fn with_pool(mut self, bean_name: impl Into<String>, attribute: PoolingAttribute) -> Self {
        self.attributes.insert(bean_name.into(), attribute);
        self
    }

    /// 池配置模板；池大小取自每个 Bean 的属性
    pub fn with_template(mut self, template: PoolConfig) -> Self {
        self.template = template;
        self
    }

    pub fn pooling_attribute(&self, bean_name: &str) -> Option<PoolingAttribute> {
        self.attributes.get(bean_name).copied()
    }
}

impl TargetSourceCreator for PoolingTargetSourceCreator {
    fn target_source(
        &self,
        class: &Arc<Class>,
        bean_name: &str,
        factory: &Weak<dyn BeanFactory>,
    ) -> Result<Option<Arc<dyn TargetSource>>, AopConfigError> {
        let Some(attribute) = self.pooling_attribute(bean_name) else {
            return Ok(None);
        };
        let config = PoolConfig {
            max_size: attribute.size,
            ..self.template
        };
        let pool = PooledTargetSource::from_bean_factory(
            factory.clone(),
            bean_name,
            Arc::clone(class),
            config,
        )?;
        Ok(Some(Arc::new(pool)))
    }
}

/// 按 Bean 名称前缀选择目标源：`:` 池化，`%` 线程本地，`!` 原型
#[derive(Debug, Default)]
pub struct QuickTargetSourceCreator {
    pool_config: PoolConfig,
}

impl QuickTargetSourceCreator {
    pub const PREFIX_POOL: char = ':';
    pub const PREFIX_THREAD_LOCAL: char = '%';
    pub const PREFIX_PROTOTYPE: char = '!';

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }
}

impl TargetSourceCreator for QuickTargetSourceCreator {
    fn target_source(
        &self,
        class: &Arc<Class>,
        bean_name: &str,
        factory: &Weak<dyn BeanFactory>,
    ) -> Result<Option<Arc<dyn TargetSource>>, AopConfigError> {
        let factory = factory.clone();
        let class = Arc::clone(class);
        let target_source: Arc<dyn TargetSource> = match bean_name.chars().next() {
            Some(Self::PREFIX_POOL) => Arc::new(PooledTargetSource::from_bean_factory(
                factory,
                bean_name,
                class,
                self.pool_config,
            )?),
            Some(Self::PREFIX_THREAD_LOCAL) => Arc::new(
                ThreadLocalTargetSource::from_bean_factory(factory, bean_name, class)?,
            ),
            Some(Self::PREFIX_PROTOTYPE) => Arc::new(PrototypeTargetSource::from_bean_factory(
                factory, bean_name, class,
            )?),
            _ => return Ok(None),
        };
        Ok(Some(target_source))
    }
}

// ============================================================================
// 公共引擎
// ============================================================================

/// 自动代理创建器共享的状态与流程
pub struct AutoProxySupport {
    classes: Arc<ClassRegistry>,
    registry: Arc<AdvisorAdapterRegistry>,
    config: RwLock<ProxyConfig>,
    interceptor_names: RwLock<Vec<String>>,
    apply_common_interceptors_first: AtomicBool,
    target_source_creators: RwLock<Vec<Arc<dyn TargetSourceCreator>>>,
    custom_target_sources: Mutex<HashMap<String, Arc<dyn TargetSource>>>,
    proxied_beans: RwLock<HashSet<String>>,
    bean_factory: RwLock<Option<Weak<dyn BeanFactory>>>,
}

impl AutoProxySupport {
    pub fn new(classes: Arc<ClassRegistry>) -> Self {
        Self {
            classes,
            registry: AdvisorAdapterRegistry::shared(),
            config: RwLock::new(ProxyConfig::default()),
            interceptor_names: RwLock::new(Vec::new()),
            apply_common_interceptors_first: AtomicBool::new(true),
            target_source_creators: RwLock::new(Vec::new()),
            custom_target_sources: Mutex::new(HashMap::new()),
            proxied_beans: RwLock::new(HashSet::new()),
            bean_factory: RwLock::new(None),
        }
    }

    pub fn classes(&self) -> &Arc<ClassRegistry> {
        &self.classes
    }

    pub fn with_registry(mut self, registry: Arc<AdvisorAdapterRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// 新代理使用的标志
    pub fn config(&self) -> ProxyConfig {
        *self.config.read()
    }

    pub fn set_config(&self, config: ProxyConfig) {
        *self.config.write() = config;
    }

    /// 公共拦截器：Bean 工厂中的 `Advisor` 或 `Advice` Bean 名称
    pub fn set_interceptor_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.interceptor_names.write() = names.into_iter().map(Into::into).collect();
    }

    pub fn set_apply_common_interceptors_first(&self, first: bool) {
        self.apply_common_interceptors_first.store(first, Ordering::Relaxed);
    }

    pub fn add_target_source_creator(&self, creator: Arc<dyn TargetSourceCreator>) {
        self.target_source_creators.write().push(creator);
    }

    pub fn set_bean_factory(&self, factory: Weak<dyn BeanFactory>) {
        *self.bean_factory.write() = Some(factory);
    }

    /// 该 Bean 是否已被代理
    pub fn is_proxied(&self, bean_name: &str) -> bool {
        self.proxied_beans.read().contains(bean_name)
    }

    pub fn proxied_bean_count(&self) -> usize {
        self.proxied_beans.read().len()
    }

    fn bean_factory(&self) -> Option<Weak<dyn BeanFactory>> {
        self.bean_factory.read().clone()
    }

    /// 为 Bean 查找自定义目标源；同一个 Bean 总是返回同一个目标源
    pub fn custom_target_source(
        &self,
        class: &Arc<Class>,
        bean_name: &str,
    ) -> Result<Option<Arc<dyn TargetSource>>, AopConfigError> {
        let Some(factory) = self.bean_factory() else {
            return Ok(None);
        };
        if let Some(existing) = self.custom_target_sources.lock().get(bean_name) {
            return Ok(Some(Arc::clone(existing)));
        }

        let creators = self.target_source_creators.read().clone();
        for creator in creators {
            if let Some(target_source) = creator.target_source(class, bean_name, &factory)? {
                tracing::debug!(
                    "Using custom target source {:?} for bean '{}'",
                    target_source.target_class().name(),
                    bean_name
                );
                let mut cache = self.custom_target_sources.lock();
                let cached = cache
                    .entry(bean_name.to_string())
                    .or_insert(target_source);
                return Ok(Some(Arc::clone(cached)));
            }
        }
        Ok(None)
    }

    /// 组合公共拦截器与 Bean 专属通知器
    pub fn build_advisors(
        &self,
        bean_name: &str,
        specific: Vec<Advisor>,
    ) -> Result<Vec<Advisor>, AopConfigError> {
        let common = self.resolve_interceptor_names()?;
        tracing::debug!(
            "Creating implicit proxy for bean '{}' with {} common interceptor(s) and {} specific interceptor(s)",
            bean_name,
            common.len(),
            specific.len()
        );

        let mut advisors = Vec::with_capacity(common.len() + specific.len());
        if self.apply_common_interceptors_first.load(Ordering::Relaxed) {
            advisors.extend(common);
            advisors.extend(specific);
        } else {
            advisors.extend(specific);
            advisors.extend(common);
        }
        Ok(advisors)
    }

    fn resolve_interceptor_names(&self) -> Result<Vec<Advisor>, AopConfigError> {
        let names = self.interceptor_names.read().clone();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let factory = self
            .bean_factory()
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| AopConfigError::InterceptorResolution {
                name: names.join(", "),
                reason: "no bean factory available".to_string(),
            })?;

        names
            .iter()
            .map(|name| {
                let bean = factory
                    .get_bean(name)
                    .map_err(|e| AopConfigError::InterceptorResolution {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                if let Some(advisor) = bean.downcast_ref::<Advisor>() {
                    return Ok(advisor.clone());
                }
                if let Some(advice) = bean.downcast_ref::<Advice>() {
                    return self.registry.wrap(advice.clone());
                }
                Err(AopConfigError::InterceptorResolution {
                    name: name.clone(),
                    reason: "bean is neither an Advisor nor an Advice".to_string(),
                })
            })
            .collect()
    }

    fn record_proxied(&self, bean_name: &str) {
        self.proxied_beans.write().insert(bean_name.to_string());
    }
}

impl std::fmt::Debug for AutoProxySupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoProxySupport")
            .field("config", &self.config())
            .field("interceptor_names", &*self.interceptor_names.read())
            .field("proxied_beans", &self.proxied_bean_count())
            .finish()
    }
}

/// 自动代理创建器
///
/// 实现者只需决定每个 Bean 的通知器；创建代理的流程由默认方法完成。
pub trait AutoProxyCreator: Send + Sync {
    fn support(&self) -> &AutoProxySupport;

    /// Bean 专属的通知器；None 表示不代理，空列表表示只应用公共拦截器
    fn advices_and_advisors_for_bean(
        &self,
        class: &Arc<Class>,
        bean_name: &str,
    ) -> Result<Option<Vec<Advisor>>, AopConfigError>;

    /// 基础设施类永远不代理
    fn is_infrastructure_class(&self, class: &Class) -> bool {
        class.is_infrastructure()
    }

    fn should_skip(&self, _class: &Class, _bean_name: &str) -> bool {
        false
    }

    /// 通知器已经按类过滤过
    fn advisors_pre_filtered(&self) -> bool {
        false
    }

    /// 创建代理前最后调整工厂配置
    fn customize_proxy_factory(&self, _factory: &ProxyFactory) {}

    fn custom_target_source(
        &self,
        class: &Arc<Class>,
        bean_name: &str,
    ) -> Result<Option<Arc<dyn TargetSource>>, AopConfigError> {
        self.support().custom_target_source(class, bean_name)
    }

    /// 用给定的目标源和通知器创建代理
    fn create_proxy(
        &self,
        class: &Arc<Class>,
        bean_name: &str,
        specific: Vec<Advisor>,
        target_source: Arc<dyn TargetSource>,
    ) -> Result<Proxy, AopConfigError> {
        let support = self.support();
        let config = support.config();

        let factory = ProxyFactory::with_registry(Arc::clone(&support.registry));
        factory.set_config(config.with_frozen(false));
        if !config.proxy_target_class {
            for interface in class.all_interfaces() {
                factory.add_interface(interface);
            }
        }
        factory.set_target_source(target_source);
        for advisor in support.build_advisors(bean_name, specific)? {
            factory.add_advisor(advisor)?;
        }
        factory.set_pre_filtered(self.advisors_pre_filtered());
        self.customize_proxy_factory(&factory);
        factory.set_frozen(config.frozen);

        let proxy = factory.get_proxy()?;
        support.record_proxied(bean_name);
        tracing::info!("🔷 [AOP] Bean '{}' proxied: {}", bean_name, proxy);
        Ok(proxy)
    }

    /// 有自定义目标源时，在实例化前直接创建代理
    fn proxy_before_instantiation(
        &self,
        bean_type: TypeId,
        bean_name: &str,
    ) -> Result<Option<SharedBean>, AopConfigError> {
        let Some(class) = self.support().classes().get(bean_type) else {
            return Ok(None);
        };
        if self.is_infrastructure_class(&class) || self.should_skip(&class, bean_name) {
            return Ok(None);
        }
        let Some(target_source) = self.custom_target_source(&class, bean_name)? else {
            return Ok(None);
        };
        let specific = self
            .advices_and_advisors_for_bean(&class, bean_name)?
            .unwrap_or_default();
        let proxy = self.create_proxy(&class, bean_name, specific, target_source)?;
        Ok(Some(Arc::new(proxy)))
    }

    /// 需要时把 Bean 包装成代理
    fn wrap_if_necessary(&self, bean: SharedBean, bean_name: &str) -> Result<SharedBean, AopConfigError> {
        if bean.downcast_ref::<Proxy>().is_some() {
            return Ok(bean);
        }
        let Some(class) = self.support().classes().for_target(&*bean) else {
            tracing::trace!("No class descriptor for bean '{}', skipping auto-proxy", bean_name);
            return Ok(bean);
        };
        if self.is_infrastructure_class(&class) || self.should_skip(&class, bean_name) {
            return Ok(bean);
        }
        let Some(specific) = self.advices_and_advisors_for_bean(&class, bean_name)? else {
            tracing::trace!("Bean '{}' does not match any advisor, skipping auto-proxy", bean_name);
            return Ok(bean);
        };

        let target_source = SingletonTargetSource::new(bean, Arc::clone(&class))?;
        let proxy = self.create_proxy(&class, bean_name, specific, Arc::new(target_source))?;
        Ok(Arc::new(proxy))
    }
}

fn post_processing_failed(bean_name: &str, error: AopConfigError) -> ContainerError {
    ContainerError::PostProcessingFailed {
        bean: bean_name.to_string(),
        reason: error.to_string(),
    }
}

macro_rules! impl_auto_proxy_post_processor {
    ($creator:ty) => {
        impl BeanPostProcessor for $creator {
            fn post_process_before_instantiation(
                &self,
                bean_type: TypeId,
                bean_name: &str,
            ) -> ContainerResult<Option<SharedBean>> {
                self.proxy_before_instantiation(bean_type, bean_name)
                    .map_err(|e| post_processing_failed(bean_name, e))
            }

            fn post_process_after_initialization(
                &self,
                bean: SharedBean,
                bean_name: &str,
            ) -> ContainerResult<SharedBean> {
                self.wrap_if_necessary(bean, bean_name)
                    .map_err(|e| post_processing_failed(bean_name, e))
            }

            fn set_bean_factory(&self, factory: Weak<dyn BeanFactory>) {
                self.support().set_bean_factory(factory);
            }

            fn name(&self) -> &str {
                stringify!($creator)
            }

            fn order(&self) -> i32 {
                self.order
            }
        }
    };
}

// ============================================================================
// 具体创建器
// ============================================================================

/// 按 Bean 名称选择要代理的 Bean，只应用公共拦截器
///
/// 名称支持 `foo*`、`*foo`、`*foo*` 形式的通配。
#[derive(Debug)]
pub struct BeanNameAutoProxyCreator {
    support: AutoProxySupport,
    bean_names: Vec<String>,
    order: i32,
}

impl BeanNameAutoProxyCreator {
    pub fn new(classes: Arc<ClassRegistry>) -> Self {
        Self {
            support: AutoProxySupport::new(classes),
            bean_names: Vec::new(),
            order: AUTO_PROXY_CREATOR_ORDER,
        }
    }

    pub fn with_bean_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bean_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_interceptor_names<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.support.set_interceptor_names(names);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn bean_names(&self) -> &[String] {
        &self.bean_names
    }
}

impl AutoProxyCreator for BeanNameAutoProxyCreator {
    fn support(&self) -> &AutoProxySupport {
        &self.support
    }

    fn advices_and_advisors_for_bean(
        &self,
        _class: &Arc<Class>,
        bean_name: &str,
    ) -> Result<Option<Vec<Advisor>>, AopConfigError> {
        if simple_match_any(&self.bean_names, bean_name) {
            Ok(Some(Vec::new()))
        } else {
            Ok(None)
        }
    }
}

impl_auto_proxy_post_processor!(BeanNameAutoProxyCreator);

/// 为 Bean 应用所有适用的通知器
///
/// 候选通知器包括显式注册的和编译期登记的（可关闭），
/// 过滤出能应用到 Bean 类的，按 order 排序。
#[derive(Debug)]
pub struct DefaultAdvisorAutoProxyCreator {
    support: AutoProxySupport,
    advisors: AdvisorRegistry,
    include_registered: bool,
    order: i32,
}

impl DefaultAdvisorAutoProxyCreator {
    pub fn new(classes: Arc<ClassRegistry>) -> Self {
        Self {
            support: AutoProxySupport::new(classes),
            advisors: AdvisorRegistry::new(),
            include_registered: true,
            order: AUTO_PROXY_CREATOR_ORDER,
        }
    }

    pub fn with_advisor(self, name: impl Into<String>, advisor: Advisor) -> Self {
        self.advisors.register(name, advisor);
        self
    }

    /// 是否包含编译期登记的通知器
    pub fn with_registered_advisors(mut self, include: bool) -> Self {
        self.include_registered = include;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn advisor_registry(&self) -> &AdvisorRegistry {
        &self.advisors
    }

    /// 所有候选通知器
    pub fn candidate_advisors(&self) -> Vec<Advisor> {
        let mut candidates = self.advisors.advisors();
        if self.include_registered {
            candidates.extend(global_registry().advisors());
        }
        candidates
    }
}

impl AutoProxyCreator for DefaultAdvisorAutoProxyCreator {
    fn support(&self) -> &AutoProxySupport {
        &self.support
    }

    fn advices_and_advisors_for_bean(
        &self,
        class: &Arc<Class>,
        _bean_name: &str,
    ) -> Result<Option<Vec<Advisor>>, AopConfigError> {
        let mut eligible: Vec<Advisor> = self
            .candidate_advisors()
            .into_iter()
            .filter(|advisor| advisor.can_apply(class))
            .collect();
        if eligible.is_empty() {
            return Ok(None);
        }
        eligible.sort_by_key(Advisor::order);
        Ok(Some(eligible))
    }

    fn advisors_pre_filtered(&self) -> bool {
        true
    }
}

impl_auto_proxy_post_processor!(DefaultAdvisorAutoProxyCreator);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::{Arguments, Value};
    use crate::class::{Interface, Method};
    use crate::interceptors::DebugInterceptor;
    use trellis_core::{BeanDefinition, BeanFactoryExt, DefaultListableBeanFactory};

    const ECHO: Method = Method::new("Echo", "echo", &["String"], "String");

    struct EchoService;
    struct Plumbing;

    fn echo_class() -> Arc<Class> {
        Class::builder::<EchoService>("EchoService")
            .interface(Arc::new(Interface::new("Echo", vec![ECHO])))
            .method(ECHO, |_, args| Ok(Box::new(args.cloned::<String>(0)?) as Value))
            .build()
    }

    fn classes() -> Arc<ClassRegistry> {
        let classes = Arc::new(ClassRegistry::new());
        classes.register(echo_class());
        classes.register(Class::builder::<Plumbing>("Plumbing").infrastructure().build());
        classes
    }

    fn echo(bean: &SharedBean) -> String {
        let proxy = bean.downcast_ref::<Proxy>().unwrap();
        proxy
            .call::<String>(&ECHO, Arguments::new().with("hi".to_string()))
            .unwrap()
    }

    #[test]
    fn test_bean_name_creator_applies_common_interceptors() {
        let factory = DefaultListableBeanFactory::new();
        let debug = Arc::new(DebugInterceptor::new());
        let advice = Advice::Around(debug.clone());
        factory
            .register_bean_definition(BeanDefinition::singleton("debug", move || Ok(advice.clone())))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::singleton("echoService", || Ok(EchoService)))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::singleton("otherEcho", || Ok(EchoService)))
            .unwrap();

        let creator = Arc::new(
            BeanNameAutoProxyCreator::new(classes())
                .with_bean_names(["*Service"])
                .with_interceptor_names(["debug"]),
        );
        factory.add_bean_post_processor(creator.clone());

        let bean = factory.get_bean("echoService").unwrap();
        assert_eq!(echo(&bean), "hi");
        assert_eq!(debug.count(), 1);
        assert!(creator.support().is_proxied("echoService"));

        let plain = factory.get_bean("otherEcho").unwrap();
        assert!(plain.downcast_ref::<EchoService>().is_some());
    }

    #[test]
    fn test_unresolvable_interceptor_name_fails_creation() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(BeanDefinition::singleton("echoService", || Ok(EchoService)))
            .unwrap();
        factory.add_bean_post_processor(Arc::new(
            BeanNameAutoProxyCreator::new(classes())
                .with_bean_names(["echoService"])
                .with_interceptor_names(["missing"]),
        ));
        assert!(matches!(
            factory.get_bean("echoService"),
            Err(ContainerError::PostProcessingFailed { .. })
        ));
    }

    #[test]
    fn test_default_advisor_creator_skips_unmatched_and_infrastructure() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(BeanDefinition::singleton("echoService", || Ok(EchoService)))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::singleton("plumbing", || Ok(Plumbing)))
            .unwrap();

        let debug = Arc::new(DebugInterceptor::new());
        let creator = DefaultAdvisorAutoProxyCreator::new(classes())
            .with_registered_advisors(false)
            .with_advisor("all", Advisor::new(Advice::Around(debug.clone())))
            .with_advisor(
                "never",
                Advisor::name_match(["nothing"], Advice::interceptor(DebugInterceptor::new())),
            );
        factory.add_bean_post_processor(Arc::new(creator));

        let bean = factory.get_bean("echoService").unwrap();
        let proxy = bean.downcast_ref::<Proxy>().unwrap();
        assert_eq!(proxy.advised().unwrap().advisor_count(), 1);
        assert_eq!(echo(&bean), "hi");
        assert_eq!(debug.count(), 1);

        let plumbing = factory.get_bean("plumbing").unwrap();
        assert!(plumbing.downcast_ref::<Plumbing>().is_some());
    }

    #[test]
    fn test_quick_target_source_creator_pools_prefixed_beans() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(BeanDefinition::prototype(":echo", || Ok(EchoService)))
            .unwrap();
        let creator = Arc::new(
            BeanNameAutoProxyCreator::new(classes()).with_bean_names([":echo"]),
        );
        creator
            .support()
            .add_target_source_creator(Arc::new(QuickTargetSourceCreator::new()));
        factory.add_bean_post_processor(creator.clone());

        let first = factory.get_bean_typed::<Proxy>(":echo").unwrap();
        let second = factory.get_bean_typed::<Proxy>(":echo").unwrap();
        assert_eq!(
            first.call::<String>(&ECHO, Arguments::new().with("x".to_string())).unwrap(),
            "x"
        );
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_pooling_creator_requires_prototype() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(BeanDefinition::singleton("echoService", || Ok(EchoService)))
            .unwrap();
        let creator = Arc::new(BeanNameAutoProxyCreator::new(classes()).with_bean_names(["echoService"]));
        creator.support().add_target_source_creator(Arc::new(
            PoolingTargetSourceCreator::new().with_pool("echoService", PoolingAttribute::new(2)),
        ));
        factory.add_bean_post_processor(creator);

        assert!(matches!(
            factory.get_bean("echoService"),
            Err(ContainerError::PostProcessingFailed { .. })
        ));
    }
}
