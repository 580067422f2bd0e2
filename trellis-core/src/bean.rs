use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::{Result, Scope};

/// 容器中保存的 Bean 实例
pub type SharedBean = Arc<dyn Any + Send + Sync>;

/// 实例提供者 - 每次调用都返回一个新实例
pub type InstanceSupplier = Arc<dyn Fn() -> Result<SharedBean> + Send + Sync>;

/// Bean 定义 - 描述如何创建和管理 Bean
#[derive(Clone)]
pub struct BeanDefinition {
    /// Bean 的名称
    pub name: String,

    /// Bean 的作用域
    pub scope: Scope,

    /// 是否延迟初始化（仅对单例有效）
    pub lazy: bool,

    type_id: TypeId,
    type_name: &'static str,
    supplier: InstanceSupplier,
}

impl BeanDefinition {
    /// 创建新的 Bean 定义（默认单例）
    pub fn new<T, F>(name: impl Into<String>, supplier: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: Scope::default(),
            lazy: false,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            supplier: Arc::new(move || Ok(Arc::new(supplier()?) as SharedBean)),
        }
    }

    /// 单例 Bean 定义
    pub fn singleton<T, F>(name: impl Into<String>, supplier: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::new(name, supplier)
    }

    /// 原型 Bean 定义
    pub fn prototype<T, F>(name: impl Into<String>, supplier: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::new(name, supplier).with_scope(Scope::Prototype)
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Bean 实例的类型 ID
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Bean 实例的类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 调用提供者创建一个原始实例（不经过后置处理器）
    pub fn instantiate(&self) -> Result<SharedBean> {
        (self.supplier)()
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("type_name", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_records_type() {
        let def = BeanDefinition::prototype("counter", || Ok(42u32));
        assert_eq!(def.type_id(), TypeId::of::<u32>());
        assert_eq!(def.scope, Scope::Prototype);

        let instance = def.instantiate().unwrap();
        assert_eq!(instance.downcast_ref::<u32>(), Some(&42));
    }

    #[test]
    fn test_supplier_error_propagates() {
        let def = BeanDefinition::singleton("broken", || -> Result<u32> {
            Err(anyhow::anyhow!("no database"))
        });
        let err = def.instantiate().unwrap_err();
        assert_eq!(err.to_string(), "no database");
    }
}
