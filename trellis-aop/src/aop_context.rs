//! 当前代理
//!
//! 代理配置了 `expose_proxy` 时，调用期间把自身压入线程本地栈，
//! 通知或目标代码可以取出当前代理，以便自调用也经过拦截链。

use std::cell::RefCell;

use crate::error::AopInvocationError;
use crate::proxy::Proxy;

thread_local! {
    static CURRENT_PROXY: RefCell<Vec<Proxy>> = const { RefCell::new(Vec::new()) };
}

pub struct AopContext;

impl AopContext {
    /// 当前线程正在执行的代理
    pub fn current_proxy() -> Result<Proxy, AopInvocationError> {
        CURRENT_PROXY
            .with(|stack| stack.borrow().last().cloned())
            .ok_or(AopInvocationError::ProxyNotAvailable)
    }

    pub(crate) fn push(proxy: Proxy) -> ExposedProxyGuard {
        CURRENT_PROXY.with(|stack| stack.borrow_mut().push(proxy));
        ExposedProxyGuard { _private: () }
    }
}

/// 离开作用域时恢复之前的当前代理
pub struct ExposedProxyGuard {
    _private: (),
}

impl Drop for ExposedProxyGuard {
    fn drop(&mut self) {
        CURRENT_PROXY.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
