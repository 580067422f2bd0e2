//! 目标源（TargetSource）
//!
//! 代理每次调用前从目标源取得真正的目标对象。非静态目标源在调用结束后
//! （无论成功、短路还是出错）都会收到一次 `release_target`。

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use trellis_core::BeanFactory;

use crate::class::{Class, Target};
use crate::error::{AopConfigError, AopInvocationError};

/// 目标源
pub trait TargetSource: Send + Sync {
    /// 返回的目标对象的类型
    fn target_class(&self) -> Arc<Class>;

    /// 是否总是返回同一个实例
    fn is_static(&self) -> bool;

    fn get_target(&self) -> anyhow::Result<Target>;

    /// 归还 `get_target` 取得的对象
    fn release_target(&self, _target: Target) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) fn type_mismatch(class: &Class, target: &Target) -> AopConfigError {
    AopConfigError::TargetTypeMismatch {
        expected: class.name().to_string(),
        actual: format!("{:?}", (**target).type_id()),
    }
}

/// 创建新目标对象的方式
#[derive(Clone)]
pub(crate) enum TargetFactory {
    Supplier(Arc<dyn Fn() -> anyhow::Result<Target> + Send + Sync>),
    BeanFactory {
        factory: Weak<dyn BeanFactory>,
        bean_name: String,
    },
}

impl TargetFactory {
    pub(crate) fn supplier<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<Target> + Send + Sync + 'static,
    {
        TargetFactory::Supplier(Arc::new(f))
    }

    /// Bean 必须存在且是原型作用域
    pub(crate) fn from_bean_factory(
        factory: Weak<dyn BeanFactory>,
        bean_name: &str,
    ) -> Result<Self, AopConfigError> {
        let strong = factory.upgrade().ok_or_else(|| AopConfigError::NotPrototype {
            bean: bean_name.to_string(),
            reason: "bean factory has been dropped".to_string(),
        })?;
        match strong.is_prototype(bean_name) {
            Ok(true) => Ok(TargetFactory::BeanFactory {
                factory,
                bean_name: bean_name.to_string(),
            }),
            Ok(false) => Err(AopConfigError::NotPrototype {
                bean: bean_name.to_string(),
                reason: "bean is a singleton".to_string(),
            }),
            Err(e) => Err(AopConfigError::NotPrototype {
                bean: bean_name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// 创建一个目标对象并检查类型
    pub(crate) fn create(&self, class: &Class) -> anyhow::Result<Target> {
        let target = match self {
            TargetFactory::Supplier(supplier) => supplier(),
            TargetFactory::BeanFactory { factory, bean_name } => {
                let factory = factory.upgrade().ok_or_else(|| {
                    AopInvocationError::TargetSourceUnavailable(format!(
                        "bean factory for '{}' has been dropped",
                        bean_name
                    ))
                })?;
                factory.instantiate(bean_name).map_err(anyhow::Error::from)
            }
        }
        .with_context(|| AopInvocationError::TargetCreationFailed {
            class: class.name().to_string(),
        })?;

        if !class.is_instance(&*target) {
            return Err(AopInvocationError::TargetTypeMismatch {
                expected: class.name().to_string(),
            }
            .into());
        }
        tracing::trace!("Created new target of class '{}'", class.name());
        Ok(target)
    }
}

/// 单例目标源：总是返回同一个对象
pub struct SingletonTargetSource {
    target: Target,
    class: Arc<Class>,
}

impl SingletonTargetSource {
    pub fn new(target: Target, class: Arc<Class>) -> Result<Self, AopConfigError> {
        if !class.is_instance(&*target) {
            return Err(type_mismatch(&class, &target));
        }
        Ok(Self { target, class })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Arc<Class> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Target> {
        Ok(Arc::clone(&self.target))
    }
}

impl fmt::Debug for SingletonTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SingletonTargetSource for target of class [{}]", self.class.name())
    }
}

/// 原型目标源：每次调用创建新对象，调用结束后丢弃
pub struct PrototypeTargetSource {
    class: Arc<Class>,
    factory: TargetFactory,
}

impl PrototypeTargetSource {
    pub fn new<F>(class: Arc<Class>, supplier: F) -> Self
    where
        F: Fn() -> anyhow::Result<Target> + Send + Sync + 'static,
    {
        Self {
            class,
            factory: TargetFactory::supplier(supplier),
        }
    }

    /// 从 Bean 工厂的原型 Bean 创建目标（不经过后置处理器）
    pub fn from_bean_factory(
        factory: Weak<dyn BeanFactory>,
        bean_name: &str,
        class: Arc<Class>,
    ) -> Result<Self, AopConfigError> {
        Ok(Self {
            class,
            factory: TargetFactory::from_bean_factory(factory, bean_name)?,
        })
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> Arc<Class> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Target> {
        self.factory.create(&self.class)
    }

    fn release_target(&self, _target: Target) -> anyhow::Result<()> {
        tracing::trace!("Discarding prototype target of class '{}'", self.class.name());
        Ok(())
    }
}

impl fmt::Debug for PrototypeTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrototypeTargetSource for target of class [{}]", self.class.name())
    }
}

/// 可热替换的目标源
pub struct HotSwappableTargetSource {
    target: RwLock<Target>,
    class: Arc<Class>,
}

impl HotSwappableTargetSource {
    pub fn new(target: Target, class: Arc<Class>) -> Result<Self, AopConfigError> {
        if !class.is_instance(&*target) {
            return Err(type_mismatch(&class, &target));
        }
        Ok(Self {
            target: RwLock::new(target),
            class,
        })
    }

    /// 替换目标，返回旧目标；新目标必须是同一个类
    pub fn swap(&self, new_target: Target) -> Result<Target, AopConfigError> {
        if !self.class.is_instance(&*new_target) {
            return Err(type_mismatch(&self.class, &new_target));
        }
        let old = std::mem::replace(&mut *self.target.write(), new_target);
        tracing::debug!("Swapped target of class '{}'", self.class.name());
        Ok(old)
    }

    pub fn current(&self) -> Target {
        Arc::clone(&self.target.read())
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_class(&self) -> Arc<Class> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Target> {
        Ok(self.current())
    }
}

impl fmt::Debug for HotSwappableTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HotSwappableTargetSource for target of class [{}]", self.class.name())
    }
}

type ThreadTargets = Mutex<HashMap<ThreadId, Target>>;

/// 线程退出时从目标源中移除该线程的对象
struct ThreadBinding {
    targets: Weak<ThreadTargets>,
    thread: ThreadId,
}

impl Drop for ThreadBinding {
    fn drop(&mut self) {
        if let Some(targets) = self.targets.upgrade() {
            let released = targets.lock().remove(&self.thread);
            drop(released);
        }
    }
}

thread_local! {
    static THREAD_BINDINGS: RefCell<Vec<ThreadBinding>> = const { RefCell::new(Vec::new()) };
}

/// 每个线程一个目标对象
///
/// 线程结束时它的对象随之释放。
pub struct ThreadLocalTargetSource {
    class: Arc<Class>,
    factory: TargetFactory,
    targets: Arc<ThreadTargets>,
    invocation_count: AtomicUsize,
    hit_count: AtomicUsize,
}

impl ThreadLocalTargetSource {
    pub fn new<F>(class: Arc<Class>, supplier: F) -> Self
    where
        F: Fn() -> anyhow::Result<Target> + Send + Sync + 'static,
    {
        Self::with_factory(class, TargetFactory::supplier(supplier))
    }

    pub fn from_bean_factory(
        factory: Weak<dyn BeanFactory>,
        bean_name: &str,
        class: Arc<Class>,
    ) -> Result<Self, AopConfigError> {
        Ok(Self::with_factory(
            class,
            TargetFactory::from_bean_factory(factory, bean_name)?,
        ))
    }

    fn with_factory(class: Arc<Class>, factory: TargetFactory) -> Self {
        Self {
            class,
            factory,
            targets: Arc::new(Mutex::new(HashMap::new())),
            invocation_count: AtomicUsize::new(0),
            hit_count: AtomicUsize::new(0),
        }
    }

    pub fn invocation_count(&self) -> usize {
        self.invocation_count.load(Ordering::Relaxed)
    }

    /// 复用已有线程对象的次数
    pub fn hit_count(&self) -> usize {
        self.hit_count.load(Ordering::Relaxed)
    }

    /// 已创建的线程对象数
    pub fn object_count(&self) -> usize {
        self.targets.lock().len()
    }

    /// 登记线程退出时的清理；线程正在退出时返回 false
    fn bind_to_current_thread(&self, thread: ThreadId) -> bool {
        let targets = Arc::downgrade(&self.targets);
        THREAD_BINDINGS
            .try_with(|bindings| {
                let mut bindings = bindings.borrow_mut();
                bindings.retain(|b| b.targets.strong_count() > 0);
                if !bindings.iter().any(|b| b.targets.ptr_eq(&targets)) {
                    bindings.push(ThreadBinding { targets, thread });
                }
            })
            .is_ok()
    }

    /// 丢弃所有线程对象
    pub fn destroy(&self) {
        let dropped = std::mem::take(&mut *self.targets.lock());
        tracing::debug!(
            "Destroying {} thread-bound target(s) of class '{}'",
            dropped.len(),
            self.class.name()
        );
    }
}

impl TargetSource for ThreadLocalTargetSource {
    fn target_class(&self) -> Arc<Class> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Target> {
        self.invocation_count.fetch_add(1, Ordering::Relaxed);
        let thread = std::thread::current().id();
        if let Some(target) = self.targets.lock().get(&thread) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(target));
        }
        let target = self.factory.create(&self.class)?;
        if self.bind_to_current_thread(thread) {
            tracing::debug!(
                "Bound new target of class '{}' to thread {:?}",
                self.class.name(),
                thread
            );
            self.targets.lock().insert(thread, Arc::clone(&target));
        }
        Ok(target)
    }
}

impl fmt::Debug for ThreadLocalTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalTargetSource")
            .field("class", &self.class.name())
            .field("invocation_count", &self.invocation_count())
            .field("hit_count", &self.hit_count())
            .field("object_count", &self.object_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use trellis_core::{BeanDefinition, DefaultListableBeanFactory};

    static NEXT_ID: AtomicU32 = AtomicU32::new(0);

    #[derive(Debug)]
    struct Session {
        id: u32,
    }

    impl Session {
        fn create() -> anyhow::Result<Target> {
            Ok(Arc::new(Session {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            }))
        }
    }

    fn session_class() -> Arc<Class> {
        Class::builder::<Session>("Session").build()
    }

    fn id_of(target: &Target) -> u32 {
        target.downcast_ref::<Session>().map(|s| s.id).unwrap()
    }

    #[test]
    fn test_singleton_type_checked() {
        assert!(SingletonTargetSource::new(Arc::new(Session { id: 0 }), session_class()).is_ok());
        let err = SingletonTargetSource::new(Arc::new(5u8), session_class()).unwrap_err();
        assert!(matches!(err, AopConfigError::TargetTypeMismatch { .. }));
    }

    #[test]
    fn test_prototype_creates_per_call() {
        let ts = PrototypeTargetSource::new(session_class(), Session::create);
        let a = ts.get_target().unwrap();
        let b = ts.get_target().unwrap();
        assert_ne!(id_of(&a), id_of(&b));
        assert!(!ts.is_static());
    }

    #[test]
    fn test_prototype_creation_failure_is_reported() {
        let ts = PrototypeTargetSource::new(session_class(), || Err(anyhow::anyhow!("db down")));
        let err = ts.get_target().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AopInvocationError>(),
            Some(AopInvocationError::TargetCreationFailed { .. })
        ));
        assert_eq!(err.root_cause().to_string(), "db down");
    }

    #[test]
    fn test_prototype_from_bean_factory() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(BeanDefinition::prototype("session", || {
                Ok(Session {
                    id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                })
            }))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::singleton("shared", || Ok(Session { id: 0 })))
            .unwrap();

        let weak: Weak<dyn BeanFactory> = Arc::downgrade(&factory) as Weak<dyn BeanFactory>;
        let ts = PrototypeTargetSource::from_bean_factory(weak.clone(), "session", session_class())
            .unwrap();
        let a = ts.get_target().unwrap();
        let b = ts.get_target().unwrap();
        assert_ne!(id_of(&a), id_of(&b));

        let err = PrototypeTargetSource::from_bean_factory(weak, "shared", session_class())
            .err()
            .unwrap();
        assert!(matches!(err, AopConfigError::NotPrototype { .. }));
    }

    #[test]
    fn test_hot_swap() {
        let ts = HotSwappableTargetSource::new(Arc::new(Session { id: 100 }), session_class()).unwrap();
        let old = ts.swap(Arc::new(Session { id: 200 })).unwrap();
        assert_eq!(id_of(&old), 100);
        assert_eq!(id_of(&ts.get_target().unwrap()), 200);

        let err = ts.swap(Arc::new("wrong")).unwrap_err();
        assert!(matches!(err, AopConfigError::TargetTypeMismatch { .. }));
        assert_eq!(id_of(&ts.current()), 200);
    }

    #[test]
    fn test_thread_local_binds_per_thread() {
        let ts = Arc::new(ThreadLocalTargetSource::new(session_class(), Session::create));
        let here = id_of(&ts.get_target().unwrap());
        assert_eq!(id_of(&ts.get_target().unwrap()), here);

        let other = {
            let ts = Arc::clone(&ts);
            std::thread::spawn(move || id_of(&ts.get_target().unwrap()))
                .join()
                .unwrap()
        };
        assert_ne!(here, other);
        assert_eq!(ts.invocation_count(), 3);
        assert_eq!(ts.hit_count(), 1);
        assert_eq!(ts.object_count(), 1);

        ts.destroy();
        assert_eq!(ts.object_count(), 0);
        assert_ne!(id_of(&ts.get_target().unwrap()), here);
        assert_eq!(ts.object_count(), 1);
    }

    #[test]
    fn test_thread_local_releases_objects_of_finished_threads() {
        let ts = Arc::new(ThreadLocalTargetSource::new(session_class(), Session::create));
        for _ in 0..50 {
            let ts = Arc::clone(&ts);
            std::thread::spawn(move || {
                ts.get_target().unwrap();
                ts.get_target().unwrap();
                assert_eq!(ts.object_count(), 1);
            })
            .join()
            .unwrap();
        }
        assert_eq!(ts.invocation_count(), 100);
        assert_eq!(ts.hit_count(), 50);
        assert_eq!(ts.object_count(), 0);
    }

    #[test]
    fn test_thread_local_binding_outlives_source() {
        let ts = ThreadLocalTargetSource::new(session_class(), Session::create);
        ts.get_target().unwrap();
        drop(ts);

        let again = ThreadLocalTargetSource::new(session_class(), Session::create);
        again.get_target().unwrap();
        assert_eq!(again.object_count(), 1);
    }
}
