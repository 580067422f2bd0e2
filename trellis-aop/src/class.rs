//! 类描述与方法分派表
//!
//! Rust 没有运行时反射，代理需要的“类型信息”由 [`Class`] 显式描述：
//! 名称、父类、实现的接口、是否 final，以及每个方法到目标实现的分派函数。
//! 描述符通常由 `#[aop_interface]` 生成的绑定代码填充。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::arguments::{Arguments, Value};
use crate::error::AopInvocationError;

/// 被代理的目标对象
pub type Target = Arc<dyn Any + Send + Sync>;

/// 方法分派函数：在目标对象上以给定参数执行方法
pub type Invoker =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &mut Arguments) -> anyhow::Result<Value> + Send + Sync>;

/// 所有类隐式拥有的方法所在的声明者
pub const OBJECT: &str = "Object";

/// 方法标识：声明者 + 方法名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub declaring: &'static str,
    pub name: &'static str,
}

/// 方法描述
#[derive(Clone, Copy)]
pub struct Method {
    declaring: &'static str,
    name: &'static str,
    params: &'static [&'static str],
    returns: &'static str,
}

impl Method {
    pub const EQUALS: Method = Method::new(OBJECT, "equals", &["Proxy"], "bool");
    pub const HASH_CODE: Method = Method::new(OBJECT, "hash_code", &[], "u64");
    pub const TO_STRING: Method = Method::new(OBJECT, "to_string", &[], "String");

    pub const fn new(
        declaring: &'static str,
        name: &'static str,
        params: &'static [&'static str],
        returns: &'static str,
    ) -> Self {
        Self {
            declaring,
            name,
            params,
            returns,
        }
    }

    pub fn declaring(&self) -> &'static str {
        self.declaring
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &'static [&'static str] {
        self.params
    }

    pub fn returns(&self) -> &'static str {
        self.returns
    }

    pub fn key(&self) -> MethodKey {
        MethodKey {
            declaring: self.declaring,
            name: self.name,
        }
    }

    pub fn is_object_method(&self) -> bool {
        self.declaring == OBJECT
    }

    /// 完整签名，例如 `TestBean::set_age(i32) -> ()`
    pub fn signature(&self) -> String {
        format!(
            "{}::{}({}) -> {}",
            self.declaring,
            self.name,
            self.params.join(", "),
            self.returns
        )
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Method {}

impl std::hash::Hash for Method {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring, self.name)
    }
}

/// 接口描述
#[derive(Debug)]
pub struct Interface {
    name: &'static str,
    methods: Vec<Method>,
}

impl Interface {
    pub fn new(name: &'static str, methods: Vec<Method>) -> Self {
        Self { name, methods }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// 方法是否由该接口声明
    pub fn declares(&self, method: &Method) -> bool {
        method.declaring == self.name && self.methods.contains(method)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Interface {}

/// 把接口的分派函数绑定到实现类型 `C` 上
///
/// `#[aop_interface]` 为生成的代理门面实现此 trait。
pub trait BindInterface<C: Any + Send + Sync> {
    fn bind(builder: ClassBuilder<C>) -> ClassBuilder<C>;
}

/// 类描述
pub struct Class {
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    superclass: Option<Arc<Class>>,
    interfaces: Vec<Arc<Interface>>,
    methods: Vec<Method>,
    invokers: HashMap<MethodKey, Invoker>,
    is_final: bool,
    is_infrastructure: bool,
}

impl Class {
    /// 为类型 `C` 构建描述符
    pub fn builder<C: Any + Send + Sync>(name: &'static str) -> ClassBuilder<C> {
        ClassBuilder {
            name,
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            invokers: HashMap::new(),
            is_final: false,
            is_infrastructure: false,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn superclass(&self) -> Option<&Arc<Class>> {
        self.superclass.as_ref()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// 框架自身的基础设施类型，自动代理会跳过
    pub fn is_infrastructure(&self) -> bool {
        self.is_infrastructure
    }

    /// 自身及所有父类，从自身开始
    pub fn ancestry(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(Some(self), |class| class.superclass.as_deref())
    }

    /// 本类直接声明的接口
    pub fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }

    /// 本类及父类声明的全部接口（按名称去重）
    pub fn all_interfaces(&self) -> Vec<Arc<Interface>> {
        let mut all: Vec<Arc<Interface>> = Vec::new();
        for class in self.ancestry() {
            for iface in &class.interfaces {
                if !all.iter().any(|known| known.name == iface.name) {
                    all.push(Arc::clone(iface));
                }
            }
        }
        all
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.ancestry()
            .any(|class| class.interfaces.iter().any(|i| i.name == interface))
    }

    /// 自身或某个父类就是 `other`
    pub fn is_assignable_to(&self, other: &Class) -> bool {
        self.ancestry().any(|class| class.type_id == other.type_id)
    }

    /// 名称匹配自身、父类或实现的接口
    pub fn is_named(&self, name: &str) -> bool {
        self.ancestry().any(|class| class.name == name) || self.implements(name)
    }

    /// 可分派的方法（含继承的），按声明顺序
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn invoker(&self, key: &MethodKey) -> Option<&Invoker> {
        self.invokers.get(key)
    }

    /// 是否有该方法的实现
    pub fn declares(&self, method: &Method) -> bool {
        self.invokers.contains_key(&method.key())
    }

    /// 对象的具体类型是否就是本类
    pub fn is_instance(&self, target: &(dyn Any + Send + Sync)) -> bool {
        target.type_id() == self.type_id
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|c| c.name))
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name).collect::<Vec<_>>(),
            )
            .field("methods", &self.methods.len())
            .field("final", &self.is_final)
            .finish()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// [`Class`] 构建器
pub struct ClassBuilder<C> {
    name: &'static str,
    superclass: Option<Arc<Class>>,
    interfaces: Vec<Arc<Interface>>,
    methods: Vec<Method>,
    invokers: HashMap<MethodKey, Invoker>,
    is_final: bool,
    is_infrastructure: bool,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Any + Send + Sync> ClassBuilder<C> {
    /// 注册方法实现；同名方法覆盖继承来的实现
    pub fn method<F>(self, method: Method, f: F) -> Self
    where
        F: Fn(&C, &mut Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let class_name = self.name;
        let invoker: Invoker = Arc::new(
            move |target: &(dyn Any + Send + Sync), args: &mut Arguments| -> anyhow::Result<Value> {
                let target = target.downcast_ref::<C>().ok_or_else(|| {
                    AopInvocationError::TargetTypeMismatch {
                        expected: class_name.to_string(),
                    }
                })?;
                f(target, args)
            },
        );
        self.with_invoker(method, invoker, true)
    }

    fn with_invoker(mut self, method: Method, invoker: Invoker, replace: bool) -> Self {
        let key = method.key();
        if !self.invokers.contains_key(&key) {
            self.methods.push(method);
            self.invokers.insert(key, invoker);
        } else if replace {
            self.invokers.insert(key, invoker);
        }
        self
    }

    /// 实现一个接口，并绑定它的全部方法
    pub fn implements<I: BindInterface<C>>(self) -> Self {
        I::bind(self)
    }

    /// 声明实现的接口（不绑定方法）
    pub fn interface(mut self, interface: Arc<Interface>) -> Self {
        if !self.interfaces.iter().any(|i| i.name == interface.name) {
            self.interfaces.push(interface);
        }
        self
    }

    /// 继承父类：复用父类的方法实现，`upcast` 取出内嵌的父类部分
    pub fn extends<P: Any + Send + Sync>(mut self, parent: &Arc<Class>, upcast: fn(&C) -> &P) -> Self {
        let class_name = self.name;
        for method in parent.methods() {
            let Some(parent_invoker) = parent.invoker(&method.key()).cloned() else {
                continue;
            };
            let invoker: Invoker = Arc::new(
                move |target: &(dyn Any + Send + Sync), args: &mut Arguments| -> anyhow::Result<Value> {
                    let target = target.downcast_ref::<C>().ok_or_else(|| {
                        AopInvocationError::TargetTypeMismatch {
                            expected: class_name.to_string(),
                        }
                    })?;
                    parent_invoker(upcast(target), args)
                },
            );
            self = self.with_invoker(*method, invoker, false);
        }
        self.superclass = Some(Arc::clone(parent));
        self
    }

    /// 标记为 final（不能基于类创建代理）
    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// 标记为基础设施类型
    pub fn infrastructure(mut self) -> Self {
        self.is_infrastructure = true;
        self
    }

    pub fn build(self) -> Arc<Class> {
        Arc::new(Class {
            name: self.name,
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            superclass: self.superclass,
            interfaces: self.interfaces,
            methods: self.methods,
            invokers: self.invokers,
            is_final: self.is_final,
            is_infrastructure: self.is_infrastructure,
        })
    }
}

/// 类型 ID 到类描述的注册表
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<TypeId, Arc<Class>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册类描述，返回被替换的旧描述
    pub fn register(&self, class: Arc<Class>) -> Option<Arc<Class>> {
        tracing::debug!("Registering class descriptor '{}'", class.name());
        self.classes.write().insert(Class::type_id(&class), class)
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<Class>> {
        self.classes.read().get(&type_id).cloned()
    }

    pub fn get_for<T: Any>(&self) -> Option<Arc<Class>> {
        self.get(TypeId::of::<T>())
    }

    /// 按对象的具体类型查找
    pub fn for_target(&self, target: &(dyn Any + Send + Sync)) -> Option<Arc<Class>> {
        self.get(target.type_id())
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_AGE: Method = Method::new("Person", "get_age", &[], "u32");
    const SET_AGE: Method = Method::new("Person", "set_age", &["u32"], "()");
    const GREET: Method = Method::new("Greeter", "greet", &[], "String");

    struct Person {
        age: u32,
    }

    struct Student {
        person: Person,
    }

    fn person_class() -> Arc<Class> {
        Class::builder::<Person>("Person")
            .method(GET_AGE, |p, _| Ok(Box::new(p.age)))
            .method(SET_AGE, |_, _| Ok(Box::new(())))
            .build()
    }

    #[test]
    fn test_method_identity_is_key() {
        let other = Method::new("Person", "get_age", &["ignored"], "i64");
        assert_eq!(GET_AGE, other);
        assert_ne!(GET_AGE, SET_AGE);
        assert_eq!(GET_AGE.signature(), "Person::get_age() -> u32");
    }

    #[test]
    fn test_dispatch_through_invoker() {
        let class = person_class();
        let target: Target = Arc::new(Person { age: 33 });
        let invoker = class.invoker(&GET_AGE.key()).unwrap();
        let value = invoker(&*target, &mut Arguments::new()).unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&33));
    }

    #[test]
    fn test_wrong_target_type() {
        let class = person_class();
        let target: Target = Arc::new("not a person");
        let invoker = class.invoker(&GET_AGE.key()).unwrap();
        let err = invoker(&*target, &mut Arguments::new()).unwrap_err();
        assert!(err.downcast_ref::<AopInvocationError>().is_some());
        assert!(!class.is_instance(&*target));
    }

    #[test]
    fn test_inheritance_and_override() {
        let parent = person_class();
        let greeter = Arc::new(Interface::new("Greeter", vec![GREET]));
        let child = Class::builder::<Student>("Student")
            .extends(&parent, |s: &Student| &s.person)
            .method(SET_AGE, |_, _| Ok(Box::new(())))
            .interface(Arc::clone(&greeter))
            .build();

        assert!(child.is_assignable_to(&parent));
        assert!(!parent.is_assignable_to(&child));
        assert_eq!(child.superclass().map(|c| c.name()), Some("Person"));
        assert_eq!(child.methods().len(), 2);
        assert!(child.implements("Greeter"));
        assert!(child.is_named("Person"));

        let target: Target = Arc::new(Student {
            person: Person { age: 19 },
        });
        let value = child.invoker(&GET_AGE.key()).unwrap()(&*target, &mut Arguments::new()).unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&19));
    }

    #[test]
    fn test_registry_lookup_by_target() {
        let registry = ClassRegistry::new();
        registry.register(person_class());

        let target: Target = Arc::new(Person { age: 1 });
        assert_eq!(registry.for_target(&*target).map(|c| c.name()), Some("Person"));
        assert!(registry.get_for::<Student>().is_none());
        assert_eq!(registry.len(), 1);
    }
}
