//! 切点（Pointcut）
//!
//! 切点 = 类过滤器 + 方法匹配器。提供规范的“总是匹配 / 永不匹配”实例、
//! 并集与交集运算，以及用于逐步组合的 [`ComposablePointcut`]。

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::arguments::Arguments;
use crate::class::{Class, Method};
use crate::class_filter::ClassFilter;
use crate::method_matcher::{MethodMatcher, MethodMatchers};
use crate::name_match::NameMatchMethodPointcut;

static TRUE_POINTCUT: Lazy<Pointcut> = Lazy::new(|| Pointcut {
    class_filter: ClassFilter::True,
    method_matcher: MethodMatchers::always(),
});

static FALSE_POINTCUT: Lazy<Pointcut> = Lazy::new(|| Pointcut {
    class_filter: ClassFilter::False,
    method_matcher: MethodMatchers::never(),
});

/// 切点
#[derive(Clone)]
pub struct Pointcut {
    class_filter: ClassFilter,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl Pointcut {
    pub fn new(class_filter: ClassFilter, method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    /// 匹配一切的规范切点
    pub fn always() -> &'static Pointcut {
        &TRUE_POINTCUT
    }

    /// 不匹配任何东西的规范切点
    pub fn never() -> &'static Pointcut {
        &FALSE_POINTCUT
    }

    /// 只限定类
    pub fn for_class_filter(class_filter: ClassFilter) -> Self {
        Self::new(class_filter, MethodMatchers::always())
    }

    /// 只限定方法
    pub fn for_method_matcher(method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self::new(ClassFilter::True, method_matcher)
    }

    /// 按方法名（可带 `*`）匹配
    pub fn method_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::for_method_matcher(Arc::new(
            NameMatchMethodPointcut::new().with_mapped_names(names),
        ))
    }

    pub fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }

    pub fn method_matcher(&self) -> &Arc<dyn MethodMatcher> {
        &self.method_matcher
    }

    pub fn is_always(&self) -> bool {
        self.class_filter.is_always() && MethodMatchers::is_always(&self.method_matcher)
    }

    pub fn is_never(&self) -> bool {
        self.class_filter.is_never() || MethodMatchers::is_never(&self.method_matcher)
    }

    pub fn is_runtime(&self) -> bool {
        self.method_matcher.is_runtime()
    }

    /// 见 [`Pointcuts::matches`]
    pub fn matches(&self, method: &Method, target_class: &Class, args: Option<&Arguments>) -> bool {
        Pointcuts::matches(self, method, target_class, args)
    }

    pub fn union(&self, other: &Pointcut) -> Pointcut {
        Pointcuts::union(self, other)
    }

    pub fn intersection(&self, other: &Pointcut) -> Pointcut {
        Pointcuts::intersection(self, other)
    }

    /// 取反：不满足原切点（类不匹配或方法不匹配）的连接点
    pub fn negate(&self) -> Pointcut {
        if self.is_always() {
            return Pointcut::never().clone();
        }
        if self.is_never() {
            return Pointcut::always().clone();
        }
        Pointcut::for_method_matcher(MethodMatchers::negate(MethodMatchers::with_class_filter(
            Arc::clone(&self.method_matcher),
            self.class_filter.clone(),
        )))
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_always() {
            return write!(f, "Pointcut.TRUE");
        }
        if self.is_never() {
            return write!(f, "Pointcut.FALSE");
        }
        f.debug_struct("Pointcut")
            .field("class_filter", &self.class_filter)
            .field("runtime", &self.is_runtime())
            .finish()
    }
}

/// 切点运算
pub struct Pointcuts;

impl Pointcuts {
    /// 并集
    ///
    /// 每一侧的方法匹配只对通过该侧类过滤器的类生效，
    /// 因此 `root(A).getter ∪ exact(B).setter` 不会把 B 的 getter 也匹配进来。
    pub fn union(a: &Pointcut, b: &Pointcut) -> Pointcut {
        if a.is_always() || b.is_always() {
            return Pointcut::always().clone();
        }
        if a.is_never() {
            return b.clone();
        }
        if b.is_never() {
            return a.clone();
        }
        Pointcut::new(
            a.class_filter.clone().union(b.class_filter.clone()),
            MethodMatchers::union_with_class_filters(
                Arc::clone(&a.method_matcher),
                a.class_filter.clone(),
                Arc::clone(&b.method_matcher),
                b.class_filter.clone(),
            ),
        )
    }

    /// 交集
    pub fn intersection(a: &Pointcut, b: &Pointcut) -> Pointcut {
        if a.is_never() || b.is_never() {
            return Pointcut::never().clone();
        }
        if a.is_always() {
            return b.clone();
        }
        if b.is_always() {
            return a.clone();
        }
        Pointcut::new(
            a.class_filter.clone().intersection(b.class_filter.clone()),
            MethodMatchers::intersection(
                Arc::clone(&a.method_matcher),
                Arc::clone(&b.method_matcher),
            ),
        )
    }

    /// 类过滤器和方法匹配器都通过；动态匹配器会结合参数（未给出时视为空参数）
    pub fn matches(
        pointcut: &Pointcut,
        method: &Method,
        target_class: &Class,
        args: Option<&Arguments>,
    ) -> bool {
        pointcut.class_filter.matches(target_class)
            && MethodMatchers::matches(&*pointcut.method_matcher, method, target_class, args)
    }
}

/// 可逐步组合的切点
#[derive(Clone)]
pub struct ComposablePointcut {
    class_filter: ClassFilter,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl ComposablePointcut {
    /// 从“匹配一切”开始
    pub fn new() -> Self {
        Self::from_pointcut(Pointcut::always())
    }

    pub fn from_pointcut(pointcut: &Pointcut) -> Self {
        Self {
            class_filter: pointcut.class_filter.clone(),
            method_matcher: Arc::clone(&pointcut.method_matcher),
        }
    }

    pub fn union_class_filter(mut self, other: ClassFilter) -> Self {
        self.class_filter = self.class_filter.union(other);
        self
    }

    pub fn intersection_class_filter(mut self, other: ClassFilter) -> Self {
        self.class_filter = self.class_filter.intersection(other);
        self
    }

    pub fn union_method_matcher(mut self, other: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = MethodMatchers::union(self.method_matcher, other);
        self
    }

    pub fn intersection_method_matcher(mut self, other: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = MethodMatchers::intersection(self.method_matcher, other);
        self
    }

    pub fn union(self, other: &Pointcut) -> Self {
        Self::from_pointcut(&Pointcuts::union(&self.to_pointcut(), other))
    }

    pub fn intersection(self, other: &Pointcut) -> Self {
        Self::from_pointcut(&Pointcuts::intersection(&self.to_pointcut(), other))
    }

    pub fn to_pointcut(&self) -> Pointcut {
        Pointcut::new(self.class_filter.clone(), Arc::clone(&self.method_matcher))
    }
}

impl Default for ComposablePointcut {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ComposablePointcut> for Pointcut {
    fn from(composable: ComposablePointcut) -> Self {
        composable.to_pointcut()
    }
}
