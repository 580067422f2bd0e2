//! 拦截链解析
//!
//! 按通知器的配置顺序计算某个 (类, 方法) 适用的拦截器列表。
//! 第一个通知器对应最外层拦截器。

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::advice::MethodInterceptor;
use crate::advised::AdvisedSupport;
use crate::advisor::Advisor;
use crate::class::{Class, Method, MethodKey};
use crate::error::AopConfigError;
use crate::method_matcher::MethodMatcher;

/// 拦截链中的一项
#[derive(Clone)]
pub enum ChainEntry {
    /// 静态匹配已确定适用
    Interceptor(Arc<dyn MethodInterceptor>),
    /// 每次调用时还需要用参数做运行时匹配
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

impl ChainEntry {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainEntry::Interceptor(interceptor) => interceptor,
            ChainEntry::Dynamic { interceptor, .. } => interceptor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainEntry::Dynamic { .. })
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ptr = Arc::as_ptr(self.interceptor()) as *const ();
        match self {
            ChainEntry::Interceptor(_) => write!(f, "Interceptor({:p})", ptr),
            ChainEntry::Dynamic { .. } => write!(f, "Dynamic({:p})", ptr),
        }
    }
}

/// 拦截链工厂
pub trait AdvisorChainFactory: Send + Sync {
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_class: &Class,
    ) -> Result<Vec<ChainEntry>, AopConfigError>;
}

/// 默认拦截链工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAdvisorChainFactory;

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_class: &Class,
    ) -> Result<Vec<ChainEntry>, AopConfigError> {
        let registry = config.registry();
        let pre_filtered = config.is_pre_filtered();
        let mut chain = Vec::new();

        for advisor in config.advisors() {
            match &advisor {
                Advisor::Pointcut(pa) => {
                    let pointcut = pa.pointcut();
                    if !pre_filtered && !pointcut.class_filter().matches(target_class) {
                        continue;
                    }
                    let matcher = pointcut.method_matcher();
                    if !matcher.matches(method, target_class) {
                        continue;
                    }
                    let interceptors = registry.get_interceptors(&advisor)?;
                    if matcher.is_runtime() {
                        chain.extend(interceptors.into_iter().map(|interceptor| {
                            ChainEntry::Dynamic {
                                interceptor,
                                matcher: Arc::clone(matcher),
                            }
                        }));
                    } else {
                        chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
                    }
                }
                Advisor::Introduction(ia) => {
                    if pre_filtered || ia.class_filter().matches(target_class) {
                        let interceptors = registry.get_interceptors(&advisor)?;
                        chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
                    }
                }
            }
        }
        Ok(chain)
    }
}

/// 按 (类, 方法) 缓存的拦截链
///
/// 含运行时匹配项的链不进入缓存。通知器列表变化时整体清空，并推进代数；
/// 解析期间代数发生变化的链不会写回缓存。
#[derive(Default)]
pub struct ChainCache {
    entries: RwLock<HashMap<(TypeId, MethodKey), Arc<Vec<ChainEntry>>>>,
    generation: AtomicU64,
}

impl ChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target_class: &Class, method: &Method) -> Option<Arc<Vec<ChainEntry>>> {
        self.entries
            .read()
            .get(&(target_class.type_id(), method.key()))
            .cloned()
    }

    /// 当前代数，解析拦截链之前读取
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 缓存在 `generation` 代解析出的静态链
    ///
    /// 含运行时匹配项，或者解析之后缓存已被清空时，返回 false 且不缓存。
    pub fn insert(
        &self,
        target_class: &Class,
        method: &Method,
        chain: Arc<Vec<ChainEntry>>,
        generation: u64,
    ) -> bool {
        if chain.iter().any(ChainEntry::is_dynamic) {
            return false;
        }
        let mut entries = self.entries.write();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.insert((target_class.type_id(), method.key()), chain);
        true
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::arguments::Value;
    use crate::class_filter::ClassFilter;
    use crate::method_matcher::MethodMatchers;
    use crate::pointcut::Pointcut;
    use crate::target_source::SingletonTargetSource;

    const GET: Method = Method::new("Account", "balance", &[], "u64");
    const SET: Method = Method::new("Account", "deposit", &["u64"], "()");

    struct Account;
    struct Ledger;

    fn account() -> Arc<Class> {
        Class::builder::<Account>("Account")
            .method(GET, |_, _| Ok(Box::new(0u64) as Value))
            .method(SET, |_, _| Ok(Box::new(()) as Value))
            .build()
    }

    fn config() -> AdvisedSupport {
        let advised = AdvisedSupport::new();
        advised.set_target_source(Arc::new(
            SingletonTargetSource::new(Arc::new(Account), account()).unwrap(),
        ));
        advised
    }

    fn noop() -> Advice {
        Advice::around(|inv| inv.proceed())
    }

    #[test]
    fn test_chain_follows_advisor_order_and_matching() {
        let advised = config();
        let first = noop();
        let second = noop();
        advised.add_advice(first.clone()).unwrap();
        advised
            .add_advisor(Advisor::with_pointcut(Pointcut::method_names(["deposit"]), second.clone()))
            .unwrap();
        advised
            .add_advisor(Advisor::with_pointcut(
                Pointcut::for_class_filter(ClassFilter::from_fn(|c| c.name() == "Ledger")),
                noop(),
            ))
            .unwrap();

        let class = account();
        let factory = DefaultAdvisorChainFactory;
        let chain = factory
            .interceptors_and_dynamic_advice(&advised, &SET, &class)
            .unwrap();
        assert_eq!(chain.len(), 2);

        let chain = factory
            .interceptors_and_dynamic_advice(&advised, &GET, &class)
            .unwrap();
        assert_eq!(chain.len(), 1);

        let ledger = Class::builder::<Ledger>("Ledger").build();
        let chain = factory
            .interceptors_and_dynamic_advice(&advised, &GET, &ledger)
            .unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_runtime_matchers_produce_dynamic_entries() {
        let advised = config();
        let pointcut = Pointcut::for_method_matcher(MethodMatchers::dynamic(
            |m, _| m.name() == "deposit",
            |_, _, _| true,
        ));
        advised
            .add_advisor(Advisor::with_pointcut(pointcut, noop()))
            .unwrap();

        let chain = DefaultAdvisorChainFactory
            .interceptors_and_dynamic_advice(&advised, &SET, &account())
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_dynamic());
    }

    #[test]
    fn test_cache_skips_dynamic_chains() {
        let cache = ChainCache::new();
        let class = account();
        let interceptor = match noop() {
            Advice::Around(i) => i,
            _ => unreachable!(),
        };

        let static_chain = Arc::new(vec![ChainEntry::Interceptor(Arc::clone(&interceptor))]);
        assert!(cache.insert(&class, &GET, static_chain, cache.generation()));
        assert!(cache.get(&class, &GET).is_some());

        let dynamic_chain = Arc::new(vec![ChainEntry::Dynamic {
            interceptor,
            matcher: MethodMatchers::dynamic(|_, _| true, |_, _, _| true),
        }]);
        assert!(!cache.insert(&class, &SET, dynamic_chain, cache.generation()));
        assert!(cache.get(&class, &SET).is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_drops_chain_resolved_before_clear() {
        let cache = ChainCache::new();
        let class = account();
        let interceptor = match noop() {
            Advice::Around(i) => i,
            _ => unreachable!(),
        };
        let chain = Arc::new(vec![ChainEntry::Interceptor(interceptor)]);

        let generation = cache.generation();
        cache.clear();
        assert!(!cache.insert(&class, &GET, Arc::clone(&chain), generation));
        assert!(cache.get(&class, &GET).is_none());

        assert!(cache.insert(&class, &GET, chain, cache.generation()));
        assert_eq!(cache.len(), 1);
    }
}
