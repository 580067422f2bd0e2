//! 方法匹配器
//!
//! 静态匹配在解析拦截链时进行一次；`is_runtime()` 为真的匹配器在静态匹配
//! 通过后，每次调用还要结合实参再判断一次。

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::arguments::Arguments;
use crate::class::{Class, Method};
use crate::class_filter::ClassFilter;

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配
    fn matches(&self, method: &Method, target_class: &Class) -> bool;

    /// 是否需要在每次调用时结合参数再次匹配
    fn is_runtime(&self) -> bool {
        false
    }

    /// 运行时匹配，仅在静态匹配通过且 `is_runtime()` 为真时调用
    fn matches_with_args(&self, method: &Method, target_class: &Class, _args: &Arguments) -> bool {
        self.matches(method, target_class)
    }
}

struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &Method, _target_class: &Class) -> bool {
        true
    }
}

struct FalseMethodMatcher;

impl MethodMatcher for FalseMethodMatcher {
    fn matches(&self, _method: &Method, _target_class: &Class) -> bool {
        false
    }
}

static TRUE_MATCHER: Lazy<Arc<dyn MethodMatcher>> = Lazy::new(|| Arc::new(TrueMethodMatcher));
static FALSE_MATCHER: Lazy<Arc<dyn MethodMatcher>> = Lazy::new(|| Arc::new(FalseMethodMatcher));

/// 闭包形式的静态匹配器
struct FnMethodMatcher<F> {
    f: F,
}

impl<F> MethodMatcher for FnMethodMatcher<F>
where
    F: Fn(&Method, &Class) -> bool + Send + Sync,
{
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        (self.f)(method, target_class)
    }
}

/// 闭包形式的动态匹配器
struct DynamicFnMethodMatcher<S, R> {
    static_check: S,
    runtime_check: R,
}

impl<S, R> MethodMatcher for DynamicFnMethodMatcher<S, R>
where
    S: Fn(&Method, &Class) -> bool + Send + Sync,
    R: Fn(&Method, &Class, &Arguments) -> bool + Send + Sync,
{
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        (self.static_check)(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &Arguments) -> bool {
        (self.runtime_check)(method, target_class, args)
    }
}

/// 静态 + 运行时的完整判断
fn full_match(mm: &dyn MethodMatcher, method: &Method, class: &Class, args: &Arguments) -> bool {
    mm.matches(method, class) && (!mm.is_runtime() || mm.matches_with_args(method, class, args))
}

struct UnionMethodMatcher {
    a: Arc<dyn MethodMatcher>,
    b: Arc<dyn MethodMatcher>,
}

impl MethodMatcher for UnionMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.a.matches(method, target_class) || self.b.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.a.is_runtime() || self.b.is_runtime()
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &Arguments) -> bool {
        full_match(&*self.a, method, target_class, args)
            || full_match(&*self.b, method, target_class, args)
    }
}

/// 各分支只在自己的类过滤器通过时参与匹配的并集
struct ClassFilterAwareUnionMethodMatcher {
    a: Arc<dyn MethodMatcher>,
    a_filter: ClassFilter,
    b: Arc<dyn MethodMatcher>,
    b_filter: ClassFilter,
}

impl MethodMatcher for ClassFilterAwareUnionMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        (self.a_filter.matches(target_class) && self.a.matches(method, target_class))
            || (self.b_filter.matches(target_class) && self.b.matches(method, target_class))
    }

    fn is_runtime(&self) -> bool {
        self.a.is_runtime() || self.b.is_runtime()
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &Arguments) -> bool {
        (self.a_filter.matches(target_class) && full_match(&*self.a, method, target_class, args))
            || (self.b_filter.matches(target_class)
                && full_match(&*self.b, method, target_class, args))
    }
}

struct IntersectionMethodMatcher {
    a: Arc<dyn MethodMatcher>,
    b: Arc<dyn MethodMatcher>,
}

impl MethodMatcher for IntersectionMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.a.matches(method, target_class) && self.b.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.a.is_runtime() || self.b.is_runtime()
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &Arguments) -> bool {
        full_match(&*self.a, method, target_class, args)
            && full_match(&*self.b, method, target_class, args)
    }
}

/// 取反；内部是动态匹配器时静态阶段无法确定，推迟到运行时
struct NegateMethodMatcher {
    inner: Arc<dyn MethodMatcher>,
}

impl MethodMatcher for NegateMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.inner.is_runtime() || !self.inner.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.inner.is_runtime()
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &Arguments) -> bool {
        !full_match(&*self.inner, method, target_class, args)
    }
}

/// 只在类过滤器通过时匹配
struct ClassFilterAwareMethodMatcher {
    inner: Arc<dyn MethodMatcher>,
    filter: ClassFilter,
}

impl MethodMatcher for ClassFilterAwareMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.filter.matches(target_class) && self.inner.matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.inner.is_runtime()
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &Arguments) -> bool {
        self.inner.matches_with_args(method, target_class, args)
    }
}

/// 方法匹配器的组合工具
pub struct MethodMatchers;

impl MethodMatchers {
    /// 匹配所有方法的规范实例
    pub fn always() -> Arc<dyn MethodMatcher> {
        Arc::clone(&TRUE_MATCHER)
    }

    /// 不匹配任何方法的规范实例
    pub fn never() -> Arc<dyn MethodMatcher> {
        Arc::clone(&FALSE_MATCHER)
    }

    pub fn is_always(mm: &Arc<dyn MethodMatcher>) -> bool {
        same_instance(mm, &TRUE_MATCHER)
    }

    pub fn is_never(mm: &Arc<dyn MethodMatcher>) -> bool {
        same_instance(mm, &FALSE_MATCHER)
    }

    /// 闭包静态匹配器
    pub fn from_fn<F>(f: F) -> Arc<dyn MethodMatcher>
    where
        F: Fn(&Method, &Class) -> bool + Send + Sync + 'static,
    {
        Arc::new(FnMethodMatcher { f })
    }

    /// 闭包动态匹配器
    pub fn dynamic<S, R>(static_check: S, runtime_check: R) -> Arc<dyn MethodMatcher>
    where
        S: Fn(&Method, &Class) -> bool + Send + Sync + 'static,
        R: Fn(&Method, &Class, &Arguments) -> bool + Send + Sync + 'static,
    {
        Arc::new(DynamicFnMethodMatcher {
            static_check,
            runtime_check,
        })
    }

    pub fn union(a: Arc<dyn MethodMatcher>, b: Arc<dyn MethodMatcher>) -> Arc<dyn MethodMatcher> {
        if Self::is_always(&a) || Self::is_always(&b) {
            return Self::always();
        }
        if Self::is_never(&a) {
            return b;
        }
        if Self::is_never(&b) {
            return a;
        }
        Arc::new(UnionMethodMatcher { a, b })
    }

    /// 类过滤器感知的并集：每个分支只对通过自己类过滤器的类生效
    pub fn union_with_class_filters(
        a: Arc<dyn MethodMatcher>,
        a_filter: ClassFilter,
        b: Arc<dyn MethodMatcher>,
        b_filter: ClassFilter,
    ) -> Arc<dyn MethodMatcher> {
        if a_filter.is_always() && b_filter.is_always() {
            return Self::union(a, b);
        }
        Arc::new(ClassFilterAwareUnionMethodMatcher {
            a,
            a_filter,
            b,
            b_filter,
        })
    }

    pub fn intersection(
        a: Arc<dyn MethodMatcher>,
        b: Arc<dyn MethodMatcher>,
    ) -> Arc<dyn MethodMatcher> {
        if Self::is_never(&a) || Self::is_never(&b) {
            return Self::never();
        }
        if Self::is_always(&a) {
            return b;
        }
        if Self::is_always(&b) {
            return a;
        }
        Arc::new(IntersectionMethodMatcher { a, b })
    }

    pub fn negate(mm: Arc<dyn MethodMatcher>) -> Arc<dyn MethodMatcher> {
        if Self::is_always(&mm) {
            return Self::never();
        }
        if Self::is_never(&mm) {
            return Self::always();
        }
        Arc::new(NegateMethodMatcher { inner: mm })
    }

    /// 把类过滤器并入方法匹配器
    pub fn with_class_filter(mm: Arc<dyn MethodMatcher>, filter: ClassFilter) -> Arc<dyn MethodMatcher> {
        if filter.is_always() {
            return mm;
        }
        Arc::new(ClassFilterAwareMethodMatcher { inner: mm, filter })
    }

    /// 静态匹配，若为动态匹配器且给出了参数则继续做运行时匹配
    pub fn matches(
        mm: &dyn MethodMatcher,
        method: &Method,
        target_class: &Class,
        args: Option<&Arguments>,
    ) -> bool {
        if !mm.matches(method, target_class) {
            return false;
        }
        if !mm.is_runtime() {
            return true;
        }
        match args {
            Some(args) => mm.matches_with_args(method, target_class, args),
            None => mm.matches_with_args(method, target_class, &Arguments::new()),
        }
    }
}

fn same_instance(a: &Arc<dyn MethodMatcher>, b: &Arc<dyn MethodMatcher>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
