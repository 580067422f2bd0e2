//! 通知器注册表
//!
//! 通过 `#[derive(Aspect)]`（或手写 `inventory::submit!`）在编译期登记的拦截器，
//! 启动时统一加载为通知器，供 [`DefaultAdvisorAutoProxyCreator`] 使用。
//!
//! [`DefaultAdvisorAutoProxyCreator`]: crate::autoproxy::DefaultAdvisorAutoProxyCreator

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::advice::{Advice, MethodInterceptor};
use crate::advisor::Advisor;
use crate::class::Class;
use crate::error::AopConfigError;

/// 编译期登记的拦截器
pub struct AdvisorRegistration {
    pub name: &'static str,

    /// 切点表达式，空串匹配所有方法
    pub pointcut_expr: &'static str,

    pub order: i32,

    pub creator: fn() -> Arc<dyn MethodInterceptor>,
}

impl AdvisorRegistration {
    pub const fn new(
        name: &'static str,
        pointcut_expr: &'static str,
        order: i32,
        creator: fn() -> Arc<dyn MethodInterceptor>,
    ) -> Self {
        Self {
            name,
            pointcut_expr,
            order,
            creator,
        }
    }

    /// 创建拦截器并包装为通知器
    pub fn create_advisor(&self) -> Result<Advisor, AopConfigError> {
        let advice = Advice::Around((self.creator)());
        let advisor = if self.pointcut_expr.trim().is_empty() {
            Advisor::new(advice)
        } else {
            Advisor::expression(self.pointcut_expr, advice)?
        };
        Ok(advisor.with_order(self.order))
    }
}

inventory::collect!(AdvisorRegistration);

/// 所有编译期登记项
pub fn registrations() -> impl Iterator<Item = &'static AdvisorRegistration> {
    inventory::iter::<AdvisorRegistration>()
}

static GLOBAL_ADVISOR_REGISTRY: Lazy<Arc<AdvisorRegistry>> = Lazy::new(|| {
    let registry = AdvisorRegistry::new();
    registry.auto_load();
    Arc::new(registry)
});

/// 已加载编译期登记项的全局注册表
pub fn global_registry() -> &'static Arc<AdvisorRegistry> {
    &GLOBAL_ADVISOR_REGISTRY
}

/// 具名通知器集合
#[derive(Default)]
pub struct AdvisorRegistry {
    advisors: RwLock<Vec<(String, Advisor)>>,
}

impl AdvisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册通知器；同名时替换
    pub fn register(&self, name: impl Into<String>, advisor: Advisor) {
        let name = name.into();
        tracing::debug!("Registering advisor '{}' (order {})", name, advisor.order());
        let mut advisors = self.advisors.write();
        match advisors.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = advisor,
            None => advisors.push((name, advisor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Advisor> {
        self.advisors
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.advisors.read().iter().map(|(n, _)| n.clone()).collect()
    }

    /// 按注册顺序返回所有通知器
    pub fn advisors(&self) -> Vec<Advisor> {
        self.advisors.read().iter().map(|(_, a)| a.clone()).collect()
    }

    /// 能应用到该类的通知器，按 order 稳定排序
    pub fn eligible_for(&self, class: &Class) -> Vec<Advisor> {
        let mut eligible: Vec<Advisor> = self
            .advisors
            .read()
            .iter()
            .filter(|(_, a)| a.can_apply(class))
            .map(|(_, a)| a.clone())
            .collect();
        eligible.sort_by_key(Advisor::order);
        eligible
    }

    pub fn len(&self) -> usize {
        self.advisors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.read().is_empty()
    }

    pub fn clear(&self) {
        self.advisors.write().clear();
    }

    /// 加载所有编译期登记项，返回成功加载的数量
    ///
    /// 切点表达式无效的登记项记录错误后跳过。
    pub fn auto_load(&self) -> usize {
        let registrations: Vec<_> = registrations().collect();
        tracing::info!("Auto-loading {} advisor(s) from registry", registrations.len());

        let mut loaded = 0;
        for registration in registrations {
            match registration.create_advisor() {
                Ok(advisor) => {
                    tracing::debug!(
                        "  ├─ Loading advisor: {} with pointcut: '{}'",
                        registration.name,
                        registration.pointcut_expr
                    );
                    self.register(registration.name, advisor);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!("Skipping advisor '{}': {}", registration.name, e);
                }
            }
        }
        loaded
    }
}

impl std::fmt::Debug for AdvisorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorRegistry")
            .field("advisors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::Value;
    use crate::class::{Interface, Method};
    use crate::interceptors::DebugInterceptor;

    const SAVE: Method = Method::new("Repository", "save", &[], "()");
    const FIND: Method = Method::new("Repository", "find_all", &[], "()");

    struct Repo;

    fn repo_class() -> Arc<Class> {
        Class::builder::<Repo>("JdbcRepository")
            .interface(Arc::new(Interface::new("Repository", vec![SAVE, FIND])))
            .method(SAVE, |_, _| Ok(Box::new(()) as Value))
            .method(FIND, |_, _| Ok(Box::new(()) as Value))
            .build()
    }

    fn debug_interceptor() -> Arc<dyn MethodInterceptor> {
        Arc::new(DebugInterceptor::new())
    }

    inventory::submit! {
        AdvisorRegistration::new("registryTestSaveAudit", "execution(* *.save(..))", 5, debug_interceptor)
    }

    inventory::submit! {
        AdvisorRegistration::new("registryTestBroken", "execution(", 0, debug_interceptor)
    }

    #[test]
    fn test_auto_load_skips_invalid_expressions() {
        let registry = AdvisorRegistry::new();
        let loaded = registry.auto_load();
        assert!(loaded >= 1);
        assert!(registry.get("registryTestSaveAudit").is_some());
        assert!(registry.get("registryTestBroken").is_none());
        assert_eq!(registry.get("registryTestSaveAudit").unwrap().order(), 5);
    }

    #[test]
    fn test_eligible_sorted_by_order() {
        let registry = AdvisorRegistry::new();
        registry.register("late", Advisor::name_match(["save"], Advice::interceptor(DebugInterceptor::new())).with_order(10));
        registry.register("early", Advisor::new(Advice::interceptor(DebugInterceptor::new())).with_order(-1));
        registry.register("never", Advisor::name_match(["delete"], Advice::interceptor(DebugInterceptor::new())));

        let eligible = registry.eligible_for(&repo_class());
        let orders: Vec<i32> = eligible.iter().map(Advisor::order).collect();
        assert_eq!(orders, vec![-1, 10]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = AdvisorRegistry::new();
        registry.register("audit", Advisor::new(Advice::interceptor(DebugInterceptor::new())).with_order(1));
        registry.register("audit", Advisor::new(Advice::interceptor(DebugInterceptor::new())).with_order(2));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("audit").unwrap().order(), 2);
        registry.clear();
        assert!(registry.is_empty());
    }
}
