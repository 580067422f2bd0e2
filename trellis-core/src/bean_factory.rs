//! Bean Factory - 核心容器接口
//!
//! 一个同步的、按名称管理 Bean 的最小容器：单例缓存、原型创建、
//! 后置处理器链以及“正在创建中”的跟踪。AOP 的自动代理创建器挂在这里。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::{
    bean::{BeanDefinition, SharedBean},
    bean_post_processor::BeanPostProcessor,
    error::{ContainerError, ContainerResult},
    utils::creation::CreationTracker,
};

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> ContainerResult<SharedBean>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;

    /// 是否为单例
    fn is_singleton(&self, name: &str) -> ContainerResult<bool>;

    /// 是否为原型
    fn is_prototype(&self, name: &str) -> ContainerResult<bool> {
        self.is_singleton(name).map(|singleton| !singleton)
    }

    /// Bean 的类型 ID（未知时返回 None）
    fn bean_type(&self, name: &str) -> Option<TypeId>;

    /// 指定 Bean 当前是否正在创建
    fn is_currently_in_creation(&self, name: &str) -> bool;

    /// 按定义创建一个全新的原始实例，不缓存、不经过后置处理器
    ///
    /// 目标源（池化、原型、线程本地）用它获取被代理对象本身。
    fn instantiate(&self, name: &str) -> ContainerResult<SharedBean>;
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 包含泛型方法，为所有 BeanFactory 自动实现
pub trait BeanFactoryExt: BeanFactory {
    /// 获取 Bean 并向下转型
    fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.get_bean(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

/// DefaultListableBeanFactory - BeanFactory 的默认实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义存储
    definitions: RwLock<HashMap<String, BeanDefinition>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, SharedBean>>,

    /// 循环依赖检测
    creation_tracker: CreationTracker,

    /// Bean 后置处理器列表（按 order 排序）
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,

    self_ref: Weak<DefaultListableBeanFactory>,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            definitions: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            creation_tracker: CreationTracker::new(),
            bean_post_processors: RwLock::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// 注册 Bean 定义
    pub fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        let name = definition.name.clone();
        if self.contains_bean(&name) {
            return Err(ContainerError::BeanAlreadyRegistered(name));
        }

        tracing::debug!(
            "Registering bean definition '{}' ({}, {})",
            name,
            definition.type_name(),
            definition.scope
        );
        self.definitions.write().insert(name, definition);
        Ok(())
    }

    /// 直接注册一个已创建好的单例（不经过后置处理器）
    pub fn register_singleton<T: Any + Send + Sync>(
        &self,
        name: impl Into<String>,
        instance: T,
    ) -> ContainerResult<()> {
        let name = name.into();
        if self.contains_bean(&name) {
            return Err(ContainerError::BeanAlreadyRegistered(name));
        }

        tracing::debug!("Registering singleton instance '{}'", name);
        self.singletons.write().insert(name, Arc::new(instance));
        Ok(())
    }

    /// 添加后置处理器，并按 order 重新排序
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        let factory: Weak<dyn BeanFactory> = self.self_ref.clone();
        processor.set_bean_factory(factory);

        tracing::debug!("Adding bean post processor '{}'", processor.name());
        let mut processors = self.bean_post_processors.write();
        processors.push(processor);
        processors.sort_by_key(|p| p.order());
    }

    pub fn bean_post_processor_count(&self) -> usize {
        self.bean_post_processors.read().len()
    }

    /// 所有 Bean 名称（定义与直接注册的单例）
    pub fn bean_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        for name in self.singletons.read().keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    /// 提前创建所有非延迟的单例
    pub fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let names: Vec<String> = self
            .definitions
            .read()
            .values()
            .filter(|d| d.scope.is_singleton() && !d.lazy)
            .map(|d| d.name.clone())
            .collect();

        for name in names {
            self.get_bean(&name)?;
        }
        Ok(())
    }

    /// 清空单例缓存
    pub fn destroy_singletons(&self) {
        let mut singletons = self.singletons.write();
        tracing::debug!("Destroying {} singleton(s)", singletons.len());
        singletons.clear();
    }

    fn definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    /// 创建 Bean 实例并调用后置处理器
    ///
    /// 顺序：
    /// 1. post_process_before_instantiation（返回 Some 时短路）
    /// 2. 实例化（提供者）
    /// 3. post_process_before_initialization
    /// 4. post_process_after_initialization
    fn create_bean(&self, definition: &BeanDefinition) -> ContainerResult<SharedBean> {
        let name = definition.name.as_str();

        let _guard = self.creation_tracker.guard(name).ok_or_else(|| {
            ContainerError::CircularDependency(format!(
                "{} -> {}",
                self.creation_tracker.current_creating().join(" -> "),
                name
            ))
        })?;

        // 锁只用于拷贝列表，处理器可能回调工厂
        let processors = self.bean_post_processors.read().clone();

        for processor in &processors {
            if let Some(bean) =
                processor.post_process_before_instantiation(definition.type_id(), name)?
            {
                tracing::debug!(
                    "Bean '{}' short-circuited by '{}' before instantiation",
                    name,
                    processor.name()
                );
                return Self::apply_after_initialization(&processors, bean, name);
            }
        }

        let mut bean = definition.instantiate().map_err(|e| Self::creation_error(name, e))?;

        for processor in &processors {
            bean = processor.post_process_before_initialization(bean, name)?;
        }

        Self::apply_after_initialization(&processors, bean, name)
    }

    fn apply_after_initialization(
        processors: &[Arc<dyn BeanPostProcessor>],
        bean: SharedBean,
        name: &str,
    ) -> ContainerResult<SharedBean> {
        let mut current = bean;
        for processor in processors {
            current = processor.post_process_after_initialization(current, name)?;
        }
        Ok(current)
    }

    fn creation_error(name: &str, error: anyhow::Error) -> ContainerError {
        // 保留循环依赖错误，不要包装它
        match error.downcast::<ContainerError>() {
            Ok(e @ ContainerError::CircularDependency(_)) => e,
            Ok(e) => ContainerError::BeanCreationFailed(format!("{}: {}", name, e)),
            Err(e) => ContainerError::BeanCreationFailed(format!("{}: {:#}", name, e)),
        }
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<SharedBean> {
        tracing::trace!("Requesting bean: '{}'", name);

        if let Some(bean) = self.singletons.read().get(name) {
            return Ok(Arc::clone(bean));
        }

        let definition = self.definition(name)?;

        if definition.scope.is_prototype() {
            tracing::debug!("Creating new instance of prototype bean '{}'", name);
            return self.create_bean(&definition);
        }

        tracing::debug!("Creating shared instance of singleton bean '{}'", name);
        let bean = self.create_bean(&definition)?;

        // 并发创建时以先写入者为准
        let mut singletons = self.singletons.write();
        let cached = singletons
            .entry(name.to_string())
            .or_insert_with(|| Arc::clone(&bean));
        Ok(Arc::clone(cached))
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name) || self.singletons.read().contains_key(name)
    }

    fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        if let Some(definition) = self.definitions.read().get(name) {
            return Ok(definition.scope.is_singleton());
        }
        if self.singletons.read().contains_key(name) {
            return Ok(true);
        }
        Err(ContainerError::BeanNotFound(name.to_string()))
    }

    fn bean_type(&self, name: &str) -> Option<TypeId> {
        if let Some(definition) = self.definitions.read().get(name) {
            return Some(definition.type_id());
        }
        self.singletons.read().get(name).map(|bean| {
            let bean: &(dyn Any + Send + Sync) = &**bean;
            bean.type_id()
        })
    }

    fn is_currently_in_creation(&self, name: &str) -> bool {
        self.creation_tracker.is_creating(name)
    }

    fn instantiate(&self, name: &str) -> ContainerResult<SharedBean> {
        let definition = self.definition(name)?;
        definition
            .instantiate()
            .map_err(|e| Self::creation_error(name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        id: usize,
    }

    #[test]
    fn test_singleton_is_cached() {
        let factory = DefaultListableBeanFactory::new();
        let created = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&created);
        factory
            .register_bean_definition(BeanDefinition::singleton("counter", move || {
                Ok(Counter {
                    id: c.fetch_add(1, Ordering::SeqCst),
                })
            }))
            .unwrap();

        let a = factory.get_bean_typed::<Counter>("counter").unwrap();
        let b = factory.get_bean_typed::<Counter>("counter").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(factory.is_singleton("counter").unwrap());
    }

    #[test]
    fn test_prototype_creates_new_instances() {
        let factory = DefaultListableBeanFactory::new();
        let created = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&created);
        factory
            .register_bean_definition(BeanDefinition::prototype("counter", move || {
                Ok(Counter {
                    id: c.fetch_add(1, Ordering::SeqCst),
                })
            }))
            .unwrap();

        let a = factory.get_bean_typed::<Counter>("counter").unwrap();
        let b = factory.get_bean_typed::<Counter>("counter").unwrap();
        assert_ne!(a.id, b.id);
        assert!(factory.is_prototype("counter").unwrap());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_singleton("name", 1u8).unwrap();
        let err = factory.register_singleton("name", 2u8).unwrap_err();
        assert!(matches!(err, ContainerError::BeanAlreadyRegistered(_)));
    }

    #[test]
    fn test_type_mismatch() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_singleton("name", 1u8).unwrap();
        let err = factory.get_bean_typed::<String>("name").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
        assert_eq!(factory.bean_type("name"), Some(TypeId::of::<u8>()));
    }

    struct Doubler;

    impl BeanPostProcessor for Doubler {
        fn post_process_after_initialization(
            &self,
            bean: SharedBean,
            _bean_name: &str,
        ) -> ContainerResult<SharedBean> {
            match bean.downcast_ref::<u32>() {
                Some(v) => Ok(Arc::new(v * 2)),
                None => Ok(bean),
            }
        }
    }

    struct Replacer;

    impl BeanPostProcessor for Replacer {
        fn post_process_before_instantiation(
            &self,
            bean_type: TypeId,
            bean_name: &str,
        ) -> ContainerResult<Option<SharedBean>> {
            if bean_type == TypeId::of::<u32>() && bean_name == "replaced" {
                return Ok(Some(Arc::new(100u32)));
            }
            Ok(None)
        }

        fn order(&self) -> i32 {
            0
        }
    }

    #[test]
    fn test_post_processors_apply_in_order() {
        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(Doubler));
        factory.add_bean_post_processor(Arc::new(Replacer));
        factory
            .register_bean_definition(BeanDefinition::singleton("plain", || Ok(21u32)))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::singleton("replaced", || Ok(1u32)))
            .unwrap();

        assert_eq!(*factory.get_bean_typed::<u32>("plain").unwrap(), 42);
        // 实例化前短路的 Bean 仍然经过初始化后回调
        assert_eq!(*factory.get_bean_typed::<u32>("replaced").unwrap(), 200);
    }

    #[test]
    fn test_instantiate_skips_post_processors() {
        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(Doubler));
        factory
            .register_bean_definition(BeanDefinition::prototype("raw", || Ok(21u32)))
            .unwrap();

        let raw = factory.instantiate("raw").unwrap();
        assert_eq!(raw.downcast_ref::<u32>(), Some(&21));
    }

    #[test]
    fn test_circular_dependency_detected() {
        let factory = DefaultListableBeanFactory::new();
        let weak = Arc::downgrade(&factory);
        factory
            .register_bean_definition(BeanDefinition::singleton("selfish", move || {
                let factory = weak.upgrade().ok_or_else(|| anyhow::anyhow!("factory gone"))?;
                assert!(factory.is_currently_in_creation("selfish"));
                factory.get_bean("selfish")?;
                Ok(0u8)
            }))
            .unwrap();

        let err = factory.get_bean("selfish").unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency(_)));
        assert!(!factory.is_currently_in_creation("selfish"));
    }

    #[test]
    fn test_missing_bean() {
        let factory = DefaultListableBeanFactory::new();
        assert!(matches!(
            factory.get_bean("nope"),
            Err(ContainerError::BeanNotFound(_))
        ));
        assert!(!factory.contains_bean("nope"));
    }
}
