//! 控制流切点
//!
//! 代理在执行每次调用期间，把 (目标类, 方法名) 压入线程本地的调用栈。
//! [`ControlFlowPointcut`] 据此判断当前调用是否发生在某个类（及方法）的
//! 代理调用之下。只有经过代理的调用才会被记录。

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::arguments::Arguments;
use crate::class::{Class, Method};
use crate::method_matcher::MethodMatcher;
use crate::pointcut::Pointcut;

/// 调用栈中的一帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowFrame {
    pub class_name: &'static str,
    pub method_name: &'static str,
}

thread_local! {
    static CALL_FLOW: RefCell<Vec<FlowFrame>> = const { RefCell::new(Vec::new()) };
}

/// 当前线程的代理调用流
pub struct ControlFlow;

impl ControlFlow {
    /// 压入一帧，返回的守卫在 drop 时弹出
    pub(crate) fn enter(class_name: &'static str, method_name: &'static str) -> FlowGuard {
        CALL_FLOW.with(|flow| {
            flow.borrow_mut().push(FlowFrame {
                class_name,
                method_name,
            })
        });
        FlowGuard { _private: () }
    }

    /// 当前调用栈（由外到内）
    pub fn frames() -> Vec<FlowFrame> {
        CALL_FLOW.with(|flow| flow.borrow().clone())
    }

    pub fn depth() -> usize {
        CALL_FLOW.with(|flow| flow.borrow().len())
    }

    /// 当前调用（最内层帧）是否处于给定类/方法的调用之下
    pub fn under(class_name: &str, method_name: Option<&str>) -> bool {
        CALL_FLOW.with(|flow| {
            let flow = flow.borrow();
            let enclosing = flow.len().saturating_sub(1);
            flow[..enclosing].iter().any(|frame| {
                frame.class_name == class_name
                    && method_name.map_or(true, |m| frame.method_name == m)
            })
        })
    }
}

/// 调用帧守卫
pub struct FlowGuard {
    _private: (),
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        CALL_FLOW.with(|flow| {
            flow.borrow_mut().pop();
        });
    }
}

/// 只在给定类（可选方法）的调用流之下匹配的动态切点
#[derive(Debug)]
pub struct ControlFlowPointcut {
    class_name: &'static str,
    method_name: Option<&'static str>,
    evaluations: AtomicUsize,
}

impl ControlFlowPointcut {
    pub fn new(class_name: &'static str) -> Self {
        Self {
            class_name,
            method_name: None,
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn with_method(mut self, method_name: &'static str) -> Self {
        self.method_name = Some(method_name);
        self
    }

    /// 运行时匹配的执行次数
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn into_pointcut(self) -> Pointcut {
        Pointcut::for_method_matcher(Arc::new(self))
    }
}

impl MethodMatcher for ControlFlowPointcut {
    fn matches(&self, _method: &Method, _target_class: &Class) -> bool {
        true
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_with_args(&self, _method: &Method, _target_class: &Class, _args: &Arguments) -> bool {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        ControlFlow::under(self.class_name, self.method_name)
    }
}
