//! 代理配置（AdvisedSupport）
//!
//! 持有有序的通知器列表、目标源、代理接口和标志位。配置可以被多个调用线程
//! 同时读取；修改通过读写锁同步，并清空拦截链缓存。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::AdvisorAdapterRegistry;
use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::chain::{AdvisorChainFactory, ChainCache, ChainEntry, DefaultAdvisorChainFactory};
use crate::class::{Class, Interface, Method, Target};
use crate::error::AopConfigError;
use crate::proxy_config::ProxyConfig;
use crate::target_source::{SingletonTargetSource, TargetSource};

/// 配置变化监听器
pub trait AdvisedSupportListener: Send + Sync {
    /// 第一个代理创建时调用
    fn activated(&self, _advised: &AdvisedSupport) {}

    /// 代理创建后通知器列表发生变化时调用
    fn advice_changed(&self, _advised: &AdvisedSupport) {}
}

#[derive(Default)]
struct AdvisedState {
    advisors: Vec<Advisor>,
    interfaces: Vec<Arc<Interface>>,
    target_source: Option<Arc<dyn TargetSource>>,
    pre_filtered: bool,
}

/// 代理配置
pub struct AdvisedSupport {
    config: RwLock<ProxyConfig>,
    state: RwLock<AdvisedState>,
    registry: Arc<AdvisorAdapterRegistry>,
    chain_factory: Arc<dyn AdvisorChainFactory>,
    chain_cache: ChainCache,
    listeners: RwLock<Vec<Arc<dyn AdvisedSupportListener>>>,
    active: AtomicBool,
}

impl AdvisedSupport {
    /// 使用共享的默认适配器注册表
    pub fn new() -> Self {
        Self::with_registry(AdvisorAdapterRegistry::shared())
    }

    pub fn with_registry(registry: Arc<AdvisorAdapterRegistry>) -> Self {
        Self {
            config: RwLock::new(ProxyConfig::default()),
            state: RwLock::new(AdvisedState::default()),
            registry,
            chain_factory: Arc::new(DefaultAdvisorChainFactory),
            chain_cache: ChainCache::new(),
            listeners: RwLock::new(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    pub fn with_chain_factory(mut self, chain_factory: Arc<dyn AdvisorChainFactory>) -> Self {
        self.chain_factory = chain_factory;
        self
    }

    pub fn registry(&self) -> &Arc<AdvisorAdapterRegistry> {
        &self.registry
    }

    // ---- 标志位 ----

    pub fn config(&self) -> ProxyConfig {
        *self.config.read()
    }

    pub fn set_config(&self, config: ProxyConfig) {
        let _state = self.state.write();
        *self.config.write() = config;
    }

    pub fn is_frozen(&self) -> bool {
        self.config.read().frozen
    }

    /// 冻结与通知器修改互斥：冻结返回后不会再有修改落地
    pub fn set_frozen(&self, frozen: bool) {
        let _state = self.state.write();
        self.config.write().frozen = frozen;
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.config.read().expose_proxy
    }

    pub fn set_expose_proxy(&self, expose_proxy: bool) {
        self.config.write().expose_proxy = expose_proxy;
    }

    pub fn is_opaque(&self) -> bool {
        self.config.read().opaque
    }

    pub fn set_opaque(&self, opaque: bool) {
        self.config.write().opaque = opaque;
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.config.read().proxy_target_class
    }

    pub fn set_proxy_target_class(&self, proxy_target_class: bool) {
        self.config.write().proxy_target_class = proxy_target_class;
    }

    pub fn is_optimize(&self) -> bool {
        self.config.read().optimize
    }

    pub fn set_optimize(&self, optimize: bool) {
        self.config.write().optimize = optimize;
    }

    /// 通知器是否已按目标类预先筛选过（跳过类过滤器）
    pub fn is_pre_filtered(&self) -> bool {
        self.state.read().pre_filtered
    }

    pub fn set_pre_filtered(&self, pre_filtered: bool) {
        self.state.write().pre_filtered = pre_filtered;
        self.chain_cache.clear();
    }

    // ---- 目标源 ----

    pub fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        tracing::debug!(
            "Setting target source for class '{}'",
            target_source.target_class().name()
        );
        self.state.write().target_source = Some(target_source);
        self.chain_cache.clear();
    }

    /// 以单例目标源包装对象
    pub fn set_target(&self, target: Target, class: Arc<Class>) -> Result<(), AopConfigError> {
        self.set_target_source(Arc::new(SingletonTargetSource::new(target, class)?));
        Ok(())
    }

    pub fn target_source(&self) -> Result<Arc<dyn TargetSource>, AopConfigError> {
        self.state
            .read()
            .target_source
            .clone()
            .ok_or(AopConfigError::MissingTargetSource)
    }

    pub fn target_class(&self) -> Option<Arc<Class>> {
        self.state
            .read()
            .target_source
            .as_ref()
            .map(|ts| ts.target_class())
    }

    // ---- 接口 ----

    pub fn add_interface(&self, interface: Arc<Interface>) {
        let mut state = self.state.write();
        if !state.interfaces.iter().any(|i| i.name() == interface.name()) {
            tracing::debug!("Adding proxied interface '{}'", interface.name());
            state.interfaces.push(interface);
        }
    }

    /// 移除接口，返回是否存在
    pub fn remove_interface(&self, name: &str) -> bool {
        let mut state = self.state.write();
        let before = state.interfaces.len();
        state.interfaces.retain(|i| i.name() != name);
        before != state.interfaces.len()
    }

    pub fn interfaces(&self) -> Vec<Arc<Interface>> {
        self.state.read().interfaces.clone()
    }

    pub fn is_interface_proxied(&self, name: &str) -> bool {
        self.state.read().interfaces.iter().any(|i| i.name() == name)
    }

    // ---- 通知器 ----

    /// 当前通知器的快照
    pub fn advisors(&self) -> Vec<Advisor> {
        self.state.read().advisors.clone()
    }

    pub fn advisor_count(&self) -> usize {
        self.state.read().advisors.len()
    }

    pub fn add_advisor(&self, advisor: Advisor) -> Result<(), AopConfigError> {
        let position = self.advisor_count();
        self.add_advisor_at(position, advisor)
    }

    pub fn add_advisor_at(&self, position: usize, advisor: Advisor) -> Result<(), AopConfigError> {
        self.ensure_not_frozen()?;
        self.validate(&advisor)?;
        {
            let mut state = self.state.write();
            self.ensure_not_frozen()?;
            if position > state.advisors.len() {
                return Err(AopConfigError::AdvisorIndexOutOfBounds {
                    index: position,
                    len: state.advisors.len(),
                });
            }
            if let Advisor::Introduction(ia) = &advisor {
                for interface in ia.interfaces() {
                    if !state.interfaces.iter().any(|i| i.name() == interface.name()) {
                        state.interfaces.push(Arc::clone(interface));
                    }
                }
            }
            tracing::debug!("Adding advisor at position {}: {:?}", position, advisor);
            state.advisors.insert(position, advisor);
        }
        self.advice_changed();
        Ok(())
    }

    /// 移除通知器，返回是否存在
    pub fn remove_advisor(&self, advisor: &Advisor) -> Result<bool, AopConfigError> {
        match self.index_of(advisor) {
            Some(index) => self.remove_advisor_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn remove_advisor_at(&self, index: usize) -> Result<Advisor, AopConfigError> {
        self.ensure_not_frozen()?;
        let removed = {
            let mut state = self.state.write();
            self.ensure_not_frozen()?;
            if index >= state.advisors.len() {
                return Err(AopConfigError::AdvisorIndexOutOfBounds {
                    index,
                    len: state.advisors.len(),
                });
            }
            let removed = state.advisors.remove(index);
            if let Advisor::Introduction(ia) = &removed {
                let names: Vec<&str> = ia.interfaces().iter().map(|i| i.name()).collect();
                state.interfaces.retain(|i| !names.contains(&i.name()));
            }
            removed
        };
        tracing::debug!("Removed advisor at position {}: {:?}", index, removed);
        self.advice_changed();
        Ok(removed)
    }

    /// 原地替换通知器，返回是否找到
    pub fn replace_advisor(&self, old: &Advisor, new: Advisor) -> Result<bool, AopConfigError> {
        let Some(index) = self.index_of(old) else {
            return Ok(false);
        };
        self.remove_advisor_at(index)?;
        self.add_advisor_at(index, new)?;
        Ok(true)
    }

    pub fn index_of(&self, advisor: &Advisor) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.same_as(advisor))
    }

    /// 包装成匹配一切的通知器后追加
    pub fn add_advice(&self, advice: Advice) -> Result<(), AopConfigError> {
        let position = self.advisor_count();
        self.add_advice_at(position, advice)
    }

    pub fn add_advice_at(&self, position: usize, advice: Advice) -> Result<(), AopConfigError> {
        self.ensure_not_frozen()?;
        let advisor = self.registry.wrap(advice)?;
        self.add_advisor_at(position, advisor)
    }

    pub fn remove_advice(&self, advice: &Advice) -> Result<bool, AopConfigError> {
        match self.index_of_advice(advice) {
            Some(index) => self.remove_advisor_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn index_of_advice(&self, advice: &Advice) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.advice().same_as(advice))
    }

    /// 通知是否包含在某个通知器中
    pub fn contains_advice(&self, advice: &Advice) -> bool {
        self.index_of_advice(advice).is_some()
    }

    fn ensure_not_frozen(&self) -> Result<(), AopConfigError> {
        if self.is_frozen() {
            return Err(AopConfigError::Frozen);
        }
        Ok(())
    }

    fn validate(&self, advisor: &Advisor) -> Result<(), AopConfigError> {
        if let Advisor::Introduction(ia) = advisor {
            ia.validate_interfaces()?;
        }
        self.registry.get_interceptors(advisor).map(|_| ())
    }

    // ---- 监听器与缓存 ----

    pub fn add_listener(&self, listener: Arc<dyn AdvisedSupportListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn AdvisedSupportListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        before != listeners.len()
    }

    /// 第一次创建代理时调用
    pub(crate) fn activate(&self) {
        if self.active.swap(true, Ordering::AcqRel) {
            return;
        }
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.activated(self);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn advice_changed(&self) {
        self.chain_cache.clear();
        if self.is_active() {
            let listeners = self.listeners.read().clone();
            for listener in listeners {
                listener.advice_changed(self);
            }
        }
    }

    /// 方法适用的拦截链
    pub fn interceptors_for(
        &self,
        method: &Method,
        target_class: &Class,
    ) -> Result<Arc<Vec<ChainEntry>>, AopConfigError> {
        if let Some(chain) = self.chain_cache.get(target_class, method) {
            tracing::trace!("Chain cache hit for {} on '{}'", method, target_class.name());
            return Ok(chain);
        }
        let generation = self.chain_cache.generation();
        let chain = Arc::new(
            self.chain_factory
                .interceptors_and_dynamic_advice(self, method, target_class)?,
        );
        let cached = self
            .chain_cache
            .insert(target_class, method, Arc::clone(&chain), generation);
        tracing::trace!(
            "Resolved {} interceptor(s) for {} on '{}' (cached: {})",
            chain.len(),
            method,
            target_class.name(),
            cached
        );
        Ok(chain)
    }

    pub fn cached_chain_count(&self) -> usize {
        self.chain_cache.len()
    }

    // ---- 比较与描述 ----

    /// 两份配置是否等价：相同的接口、通知器与目标
    pub fn equals_config(&self, other: &AdvisedSupport) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let same_interfaces = {
            let (a, b) = (self.interfaces(), other.interfaces());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.name() == y.name())
        };
        let same_advisors = {
            let (a, b) = (self.advisors(), other.advisors());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_as(y))
        };
        same_interfaces && same_advisors && self.target_identity() == other.target_identity()
    }

    /// 目标的身份：静态目标源取目标对象地址，否则取目标源地址
    pub(crate) fn target_identity(&self) -> usize {
        let target_source = self.state.read().target_source.clone();
        target_identity(target_source.as_ref())
    }

    pub fn to_proxy_config_string(&self) -> String {
        let state = self.state.read();
        let interfaces: Vec<&str> = state.interfaces.iter().map(|i| i.name()).collect();
        let target = state
            .target_source
            .as_ref()
            .map(|ts| ts.target_class().name())
            .unwrap_or("<none>");
        format!(
            "{}: {} interface(s) [{}]; {} advisor(s); target class [{}]; {}",
            std::any::type_name::<Self>(),
            interfaces.len(),
            interfaces.join(", "),
            state.advisors.len(),
            target,
            self.config()
        )
    }
}

fn target_identity(target_source: Option<&Arc<dyn TargetSource>>) -> usize {
    match target_source {
        None => 0,
        Some(ts) if ts.is_static() => match ts.get_target() {
            Ok(target) => Arc::as_ptr(&target) as *const () as usize,
            Err(_) => Arc::as_ptr(ts) as *const () as usize,
        },
        Some(ts) => Arc::as_ptr(ts) as *const () as usize,
    }
}

impl Default for AdvisedSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_proxy_config_string())
    }
}
