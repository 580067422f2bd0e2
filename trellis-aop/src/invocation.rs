//! 方法调用（MethodInvocation）
//!
//! 每次代理调用创建一个新的调用对象，沿拦截链逐个推进，
//! 链走完后在目标对象上执行真正的方法。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::arguments::{Arguments, Value};
use crate::chain::ChainEntry;
use crate::class::{Class, Invoker, Method, Target};
use crate::error::AopInvocationError;
use crate::proxy::Proxy;

/// 传给拦截器的调用上下文
pub trait MethodInvocation {
    /// 被调用的方法
    fn method(&self) -> &Method;

    fn arguments(&self) -> &Arguments;

    /// 可变参数，修改会传递给内层拦截器和目标方法
    fn arguments_mut(&mut self) -> &mut Arguments;

    /// 目标对象
    fn this(&self) -> &Target;

    fn target_class(&self) -> &Arc<Class>;

    /// 发起调用的代理
    fn proxy(&self) -> &Proxy;

    /// 执行下一个拦截器，链走完时执行目标方法
    ///
    /// 可以多次调用，每次都从当前拦截器之后重新执行内层链。
    fn proceed(&mut self) -> anyhow::Result<Value>;

    /// 本次调用内的用户属性
    fn user_attribute(&self, key: &str) -> Option<&(dyn Any + Send + Sync)>;

    fn set_user_attribute(&mut self, key: &str, value: Arc<dyn Any + Send + Sync>);

    /// 克隆出独立的调用对象（参数独立，从同一位置继续）
    fn invocable_clone(&self) -> Box<dyn MethodInvocation>;
}

/// 默认的调用实现
pub struct ReflectiveMethodInvocation {
    proxy: Proxy,
    target: Target,
    target_class: Arc<Class>,
    method: Method,
    arguments: Arguments,
    chain: Arc<Vec<ChainEntry>>,
    invoker: Option<Invoker>,
    index: usize,
    user_attributes: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ReflectiveMethodInvocation {
    pub fn new(
        proxy: Proxy,
        target: Target,
        target_class: Arc<Class>,
        method: Method,
        arguments: Arguments,
        chain: Arc<Vec<ChainEntry>>,
    ) -> Self {
        let invoker = target_class.invoker(&method.key()).cloned();
        Self {
            proxy,
            target,
            target_class,
            method,
            arguments,
            chain,
            invoker,
            index: 0,
            user_attributes: HashMap::new(),
        }
    }

    /// 替换连接点的分派函数（目标类没有该方法的实现时使用）
    pub fn with_invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// 当前在链中的位置
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// 拆出最终参数
    pub fn into_arguments(self) -> Arguments {
        self.arguments
    }

    fn invoke_joinpoint(&mut self) -> anyhow::Result<Value> {
        let invoker = self.invoker.as_ref().ok_or_else(|| AopInvocationError::NoInvoker {
            method: self.method.to_string(),
            class: self.target_class.name().to_string(),
        })?;
        tracing::trace!("Invoking joinpoint {} on '{}'", self.method, self.target_class.name());
        invoker(&*self.target, &mut self.arguments)
    }

    fn proceed_from_cursor(&mut self) -> anyhow::Result<Value> {
        let chain = Arc::clone(&self.chain);
        while let Some(entry) = chain.get(self.index) {
            self.index += 1;
            match entry {
                ChainEntry::Interceptor(interceptor) => return interceptor.invoke(self),
                ChainEntry::Dynamic {
                    interceptor,
                    matcher,
                } => {
                    if matcher.matches_with_args(&self.method, &self.target_class, &self.arguments) {
                        return interceptor.invoke(self);
                    }
                    tracing::trace!(
                        "Runtime match failed for {}, skipping interceptor {}",
                        self.method,
                        self.index - 1
                    );
                }
            }
        }
        self.invoke_joinpoint()
    }
}

impl MethodInvocation for ReflectiveMethodInvocation {
    fn method(&self) -> &Method {
        &self.method
    }

    fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }

    fn this(&self) -> &Target {
        &self.target
    }

    fn target_class(&self) -> &Arc<Class> {
        &self.target_class
    }

    fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    fn proceed(&mut self) -> anyhow::Result<Value> {
        let cursor = self.index;
        let result = self.proceed_from_cursor();
        self.index = cursor;
        result
    }

    fn user_attribute(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.user_attributes.get(key).map(|value| &**value)
    }

    fn set_user_attribute(&mut self, key: &str, value: Arc<dyn Any + Send + Sync>) {
        self.user_attributes.insert(key.to_string(), value);
    }

    fn invocable_clone(&self) -> Box<dyn MethodInvocation> {
        Box::new(Self {
            proxy: self.proxy.clone(),
            target: Arc::clone(&self.target),
            target_class: Arc::clone(&self.target_class),
            method: self.method,
            arguments: self.arguments.clone(),
            chain: Arc::clone(&self.chain),
            invoker: self.invoker.clone(),
            index: self.index,
            user_attributes: self.user_attributes.clone(),
        })
    }
}

impl fmt::Debug for ReflectiveMethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectiveMethodInvocation")
            .field("method", &self.method)
            .field("target_class", &self.target_class.name())
            .field("arguments", &self.arguments)
            .field("index", &self.index)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}
