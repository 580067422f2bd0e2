//! 类过滤器
//!
//! 决定切点适用于哪些目标类。`Exact` 只匹配给定类本身，
//! `Root` 匹配给定类及其所有子类。

use std::fmt;
use std::sync::Arc;

use crate::class::Class;
use crate::name_match::simple_match;

/// 类过滤器
#[derive(Clone)]
pub enum ClassFilter {
    /// 匹配所有类
    True,
    /// 不匹配任何类
    False,
    /// 只匹配该类本身
    Exact(Arc<Class>),
    /// 匹配该类及其子类
    Root(Arc<Class>),
    /// 类名（或父类名、接口名）匹配通配模式
    NamePattern(String),
    /// 任一子过滤器匹配
    Union(Vec<ClassFilter>),
    /// 所有子过滤器都匹配
    Intersection(Vec<ClassFilter>),
    /// 取反
    Negate(Box<ClassFilter>),
    /// 自定义匹配函数
    Custom(Arc<dyn Fn(&Class) -> bool + Send + Sync>),
}

impl ClassFilter {
    pub fn exact(class: &Arc<Class>) -> Self {
        ClassFilter::Exact(Arc::clone(class))
    }

    pub fn root(class: &Arc<Class>) -> Self {
        ClassFilter::Root(Arc::clone(class))
    }

    pub fn name_pattern(pattern: impl Into<String>) -> Self {
        ClassFilter::NamePattern(pattern.into())
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Class) -> bool + Send + Sync + 'static,
    {
        ClassFilter::Custom(Arc::new(f))
    }

    pub fn matches(&self, class: &Class) -> bool {
        match self {
            ClassFilter::True => true,
            ClassFilter::False => false,
            ClassFilter::Exact(expected) => class.type_id() == expected.type_id(),
            ClassFilter::Root(root) => class.is_assignable_to(root),
            ClassFilter::NamePattern(pattern) => {
                class.ancestry().any(|c| simple_match(pattern, c.name()))
                    || class
                        .all_interfaces()
                        .iter()
                        .any(|i| simple_match(pattern, i.name()))
            }
            ClassFilter::Union(filters) => filters.iter().any(|f| f.matches(class)),
            ClassFilter::Intersection(filters) => filters.iter().all(|f| f.matches(class)),
            ClassFilter::Negate(inner) => !inner.matches(class),
            ClassFilter::Custom(f) => f(class),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, ClassFilter::True)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, ClassFilter::False)
    }

    /// 并集（`True` 吸收，`False` 为单位元）
    pub fn union(self, other: ClassFilter) -> ClassFilter {
        match (self, other) {
            (ClassFilter::True, _) | (_, ClassFilter::True) => ClassFilter::True,
            (ClassFilter::False, f) | (f, ClassFilter::False) => f,
            (ClassFilter::Union(mut a), ClassFilter::Union(b)) => {
                a.extend(b);
                ClassFilter::Union(a)
            }
            (ClassFilter::Union(mut a), f) => {
                a.push(f);
                ClassFilter::Union(a)
            }
            (a, b) => ClassFilter::Union(vec![a, b]),
        }
    }

    /// 交集（`False` 吸收，`True` 为单位元）
    pub fn intersection(self, other: ClassFilter) -> ClassFilter {
        match (self, other) {
            (ClassFilter::False, _) | (_, ClassFilter::False) => ClassFilter::False,
            (ClassFilter::True, f) | (f, ClassFilter::True) => f,
            (ClassFilter::Intersection(mut a), ClassFilter::Intersection(b)) => {
                a.extend(b);
                ClassFilter::Intersection(a)
            }
            (ClassFilter::Intersection(mut a), f) => {
                a.push(f);
                ClassFilter::Intersection(a)
            }
            (a, b) => ClassFilter::Intersection(vec![a, b]),
        }
    }

    pub fn negate(self) -> ClassFilter {
        match self {
            ClassFilter::True => ClassFilter::False,
            ClassFilter::False => ClassFilter::True,
            ClassFilter::Negate(inner) => *inner,
            other => ClassFilter::Negate(Box::new(other)),
        }
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        ClassFilter::True
    }
}

impl fmt::Debug for ClassFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassFilter::True => write!(f, "ClassFilter.TRUE"),
            ClassFilter::False => write!(f, "ClassFilter.FALSE"),
            ClassFilter::Exact(c) => write!(f, "Exact({})", c.name()),
            ClassFilter::Root(c) => write!(f, "Root({})", c.name()),
            ClassFilter::NamePattern(p) => write!(f, "NamePattern({})", p),
            ClassFilter::Union(fs) => f.debug_tuple("Union").field(fs).finish(),
            ClassFilter::Intersection(fs) => f.debug_tuple("Intersection").field(fs).finish(),
            ClassFilter::Negate(inner) => write!(f, "Not({:?})", inner),
            ClassFilter::Custom(_) => write!(f, "Custom"),
        }
    }
}
