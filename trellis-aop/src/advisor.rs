//! 通知器（Advisor）：切点 + 通知
//!
//! 切点通知器按方法匹配；引入通知器只按类匹配，为代理增加整个接口。

use std::fmt;
use std::sync::Arc;

use crate::advice::{Advice, IntroductionAdvice, IntroductionInterceptor, MethodInterceptor};
use crate::arguments::Value;
use crate::class::{Class, Interface, Target};
use crate::class_filter::ClassFilter;
use crate::error::{AopConfigError, AopInvocationError};
use crate::invocation::MethodInvocation;
use crate::pointcut::Pointcut;
use crate::regexp::RegexpMethodPointcut;

/// 优先级最高（最外层）
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 优先级最低，未指定顺序时的默认值
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 通知器
#[derive(Clone)]
pub enum Advisor {
    Pointcut(PointcutAdvisor),
    Introduction(IntroductionAdvisor),
}

impl Advisor {
    /// 匹配一切方法的通知器
    pub fn new(advice: Advice) -> Self {
        Self::with_pointcut(Pointcut::always().clone(), advice)
    }

    pub fn with_pointcut(pointcut: Pointcut, advice: Advice) -> Self {
        Advisor::Pointcut(PointcutAdvisor::new(pointcut, advice))
    }

    /// 按方法名匹配（支持 `*` 通配）
    pub fn name_match<I, S>(names: I, advice: Advice) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_pointcut(Pointcut::method_names(names), advice)
    }

    /// 按正则匹配 `Declaring::method`
    pub fn regexp<I, S>(patterns: I, advice: Advice) -> Result<Self, AopConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pointcut = RegexpMethodPointcut::new(patterns)?.into_pointcut();
        Ok(Self::with_pointcut(pointcut, advice))
    }

    /// 切点表达式
    pub fn expression(expression: &str, advice: Advice) -> Result<Self, AopConfigError> {
        Ok(Self::with_pointcut(Pointcut::expression(expression)?, advice))
    }

    pub fn with_order(self, order: i32) -> Self {
        match self {
            Advisor::Pointcut(pa) => Advisor::Pointcut(pa.with_order(order)),
            Advisor::Introduction(ia) => Advisor::Introduction(ia.with_order(order)),
        }
    }

    pub fn advice(&self) -> &Advice {
        match self {
            Advisor::Pointcut(pa) => &pa.advice,
            Advisor::Introduction(ia) => &ia.advice,
        }
    }

    pub fn order(&self) -> i32 {
        match self {
            Advisor::Pointcut(pa) => pa.order,
            Advisor::Introduction(ia) => ia.order,
        }
    }

    pub fn pointcut(&self) -> Option<&Pointcut> {
        match self {
            Advisor::Pointcut(pa) => Some(&pa.pointcut),
            Advisor::Introduction(_) => None,
        }
    }

    pub fn class_filter(&self) -> &ClassFilter {
        match self {
            Advisor::Pointcut(pa) => pa.pointcut.class_filter(),
            Advisor::Introduction(ia) => &ia.class_filter,
        }
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self, Advisor::Introduction(_))
    }

    /// 是否可能作用于该类：类过滤器通过，且（切点通知器）至少一个方法静态匹配
    pub fn can_apply(&self, target_class: &Class) -> bool {
        match self {
            Advisor::Introduction(ia) => ia.class_filter.matches(target_class),
            Advisor::Pointcut(pa) => {
                let pointcut = &pa.pointcut;
                if !pointcut.class_filter().matches(target_class) {
                    return false;
                }
                let matcher = pointcut.method_matcher();
                target_class
                    .methods()
                    .iter()
                    .any(|method| matcher.matches(method, target_class))
                    || target_class.all_interfaces().iter().any(|interface| {
                        interface
                            .methods()
                            .iter()
                            .any(|method| matcher.matches(method, target_class))
                    })
            }
        }
    }

    /// 是否是同一个通知器（同一个通知实例，相同类型）
    pub fn same_as(&self, other: &Advisor) -> bool {
        self.is_introduction() == other.is_introduction() && self.advice().same_as(other.advice())
    }
}

impl From<PointcutAdvisor> for Advisor {
    fn from(advisor: PointcutAdvisor) -> Self {
        Advisor::Pointcut(advisor)
    }
}

impl From<IntroductionAdvisor> for Advisor {
    fn from(advisor: IntroductionAdvisor) -> Self {
        Advisor::Introduction(advisor)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisor::Pointcut(pa) => pa.fmt(f),
            Advisor::Introduction(ia) => ia.fmt(f),
        }
    }
}

/// 切点通知器
#[derive(Clone)]
pub struct PointcutAdvisor {
    pointcut: Pointcut,
    advice: Advice,
    order: i32,
}

impl PointcutAdvisor {
    pub fn new(pointcut: Pointcut, advice: Advice) -> Self {
        Self {
            pointcut,
            advice,
            order: LOWEST_PRECEDENCE,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn order(&self) -> i32 {
        self.order
    }
}

impl fmt::Debug for PointcutAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointcutAdvisor")
            .field("pointcut", &self.pointcut)
            .field("advice", &self.advice)
            .field("order", &self.order)
            .finish()
    }
}

/// 引入通知器
#[derive(Clone)]
pub struct IntroductionAdvisor {
    class_filter: ClassFilter,
    interfaces: Vec<Arc<Interface>>,
    advice: Advice,
    introduction: IntroductionAdvice,
    order: i32,
}

impl IntroductionAdvisor {
    /// 为所有类引入 `interfaces`
    pub fn new<I: IntroductionInterceptor + 'static>(
        interceptor: Arc<I>,
        interfaces: Vec<Arc<Interface>>,
    ) -> Self {
        let introduction = IntroductionAdvice::new(interceptor);
        Self {
            class_filter: ClassFilter::True,
            interfaces,
            advice: Advice::Introduction(introduction.clone()),
            introduction,
            order: LOWEST_PRECEDENCE,
        }
    }

    /// 使用委托拦截器声明的全部接口
    pub fn for_delegate(interceptor: DelegatingIntroductionInterceptor) -> Self {
        let interfaces = interceptor.interfaces().to_vec();
        Self::new(Arc::new(interceptor), interfaces)
    }

    pub fn with_class_filter(mut self, class_filter: ClassFilter) -> Self {
        self.class_filter = class_filter;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }

    pub fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    /// 检查拦截器确实实现了声明的每个接口
    pub fn validate_interfaces(&self) -> Result<(), AopConfigError> {
        if self.interfaces.is_empty() {
            return Err(AopConfigError::InvalidIntroduction(
                "introduction advisor declares no interfaces".to_string(),
            ));
        }
        for interface in &self.interfaces {
            if !self.introduction.implements_interface(interface) {
                return Err(AopConfigError::InvalidIntroduction(format!(
                    "interceptor does not implement '{}'",
                    interface.name()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for IntroductionAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntroductionAdvisor")
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("class_filter", &self.class_filter)
            .field("order", &self.order)
            .finish()
    }
}

/// 把引入接口的调用委托给另一个对象
///
/// 方法由某个引入接口声明时直接分派到委托对象，否则继续拦截链。
pub struct DelegatingIntroductionInterceptor {
    delegate: Target,
    class: Arc<Class>,
    interfaces: Vec<Arc<Interface>>,
}

impl DelegatingIntroductionInterceptor {
    /// 委托对象必须是 `class` 描述的类型，引入它实现的全部接口
    pub fn new(delegate: Target, class: Arc<Class>) -> Result<Self, AopConfigError> {
        if !class.is_instance(&*delegate) {
            return Err(AopConfigError::TargetTypeMismatch {
                expected: class.name().to_string(),
                actual: format!("{:?}", (*delegate).type_id()),
            });
        }
        let interfaces = class.all_interfaces();
        if interfaces.is_empty() {
            return Err(AopConfigError::InvalidIntroduction(format!(
                "delegate class '{}' implements no interfaces",
                class.name()
            )));
        }
        Ok(Self {
            delegate,
            class,
            interfaces,
        })
    }

    /// 不引入某个接口
    pub fn suppress_interface(mut self, name: &str) -> Self {
        self.interfaces.retain(|i| i.name() != name);
        self
    }

    pub fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(
        &self,
        invocation: &mut dyn MethodInvocation,
    ) -> anyhow::Result<Value> {
        let method = *invocation.method();
        let introduced = self.interfaces.iter().any(|i| i.declares(&method));
        if !introduced {
            return invocation.proceed();
        }
        let invoker = self.class.invoker(&method.key()).ok_or_else(|| {
            AopInvocationError::NoInvoker {
                method: method.to_string(),
                class: self.class.name().to_string(),
            }
        })?;
        tracing::trace!("Delegating introduced method {} to '{}'", method, self.class.name());
        invoker(&*self.delegate, invocation.arguments_mut())
    }
}

impl IntroductionInterceptor for DelegatingIntroductionInterceptor {
    fn implements_interface(&self, interface: &Interface) -> bool {
        self.interfaces.iter().any(|i| i.name() == interface.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Method;

    const BALANCE: Method = Method::new("Account", "balance", &[], "u64");
    const LOCK: Method = Method::new("Lockable", "lock", &[], "()");

    struct Account;
    struct Lock;

    fn account() -> Arc<Class> {
        Class::builder::<Account>("Account")
            .method(BALANCE, |_, _| Ok(Box::new(1u64) as Value))
            .build()
    }

    fn lock_class() -> Arc<Class> {
        Class::builder::<Lock>("LockMixin")
            .interface(Arc::new(Interface::new("Lockable", vec![LOCK])))
            .method(LOCK, |_, _| Ok(Box::new(()) as Value))
            .build()
    }

    #[test]
    fn test_can_apply() {
        let class = account();
        let advice = Advice::around(|inv| inv.proceed());
        assert!(Advisor::name_match(["bal*"], advice.clone()).can_apply(&class));
        assert!(!Advisor::name_match(["withdraw"], advice.clone()).can_apply(&class));
        assert!(Advisor::new(advice).can_apply(&class));
    }

    #[test]
    fn test_order_and_identity() {
        let advice = Advice::around(|inv| inv.proceed());
        let a = Advisor::new(advice.clone()).with_order(5);
        let b = Advisor::name_match(["x"], advice);
        assert_eq!(a.order(), 5);
        assert_eq!(b.order(), LOWEST_PRECEDENCE);
        assert!(a.same_as(&b));
    }

    #[test]
    fn test_delegating_introduction() {
        let delegate = DelegatingIntroductionInterceptor::new(Arc::new(Lock), lock_class()).unwrap();
        let advisor = IntroductionAdvisor::for_delegate(delegate);
        advisor.validate_interfaces().unwrap();
        assert_eq!(advisor.interfaces().len(), 1);
        assert!(Advisor::from(advisor).can_apply(&account()));
    }

    #[test]
    fn test_introduction_validation() {
        let delegate = DelegatingIntroductionInterceptor::new(Arc::new(Lock), lock_class())
            .unwrap()
            .suppress_interface("Lockable");
        let advisor = IntroductionAdvisor::new(
            Arc::new(delegate),
            vec![Arc::new(Interface::new("Lockable", vec![LOCK]))],
        );
        assert!(matches!(
            advisor.validate_interfaces(),
            Err(AopConfigError::InvalidIntroduction(_))
        ));
    }

    #[test]
    fn test_delegate_type_checked() {
        let err = DelegatingIntroductionInterceptor::new(Arc::new(Account), lock_class())
            .err()
            .unwrap();
        assert!(matches!(err, AopConfigError::TargetTypeMismatch { .. }));
    }
}
