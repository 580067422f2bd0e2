//! 池化目标源
//!
//! 池按需填充，最多 `max_size` 个对象。所有对象都被借出时，默认立即失败
//! （[`AopInvocationError::PoolExhausted`]），也可以配置为等待归还。

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use trellis_core::BeanFactory;

use crate::class::{Class, Target};
use crate::error::{AopConfigError, AopInvocationError};
use crate::target_source::{TargetFactory, TargetSource};

/// 默认池大小
pub const DEFAULT_POOL_SIZE: usize = 8;

/// 池耗尽时的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustedAction {
    /// 立即返回 `PoolExhausted`
    #[default]
    Fail,
    /// 等待对象归还；`max_wait` 为 None 时无限等待
    Block { max_wait: Option<Duration> },
}

/// 池配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_size: usize,
    pub exhausted_action: ExhaustedAction,
}

impl PoolConfig {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            exhausted_action: ExhaustedAction::Fail,
        }
    }

    pub fn with_exhausted_action(mut self, action: ExhaustedAction) -> Self {
        self.exhausted_action = action;
        self
    }

    /// 耗尽时最多等待 `max_wait`
    pub fn block_with_timeout(self, max_wait: Duration) -> Self {
        self.with_exhausted_action(ExhaustedAction::Block {
            max_wait: Some(max_wait),
        })
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Target>,
    /// 已借出（含正在创建）的数量
    active: usize,
}

/// 池化目标源
pub struct PooledTargetSource {
    class: Arc<Class>,
    factory: TargetFactory,
    config: PoolConfig,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl PooledTargetSource {
    pub fn new<F>(class: Arc<Class>, config: PoolConfig, supplier: F) -> Result<Self, AopConfigError>
    where
        F: Fn() -> anyhow::Result<Target> + Send + Sync + 'static,
    {
        Self::with_factory(class, config, TargetFactory::supplier(supplier))
    }

    /// 用 Bean 工厂中的原型 Bean 填充池
    pub fn from_bean_factory(
        factory: Weak<dyn BeanFactory>,
        bean_name: &str,
        class: Arc<Class>,
        config: PoolConfig,
    ) -> Result<Self, AopConfigError> {
        let factory = TargetFactory::from_bean_factory(factory, bean_name)?;
        Self::with_factory(class, config, factory)
    }

    fn with_factory(
        class: Arc<Class>,
        config: PoolConfig,
        factory: TargetFactory,
    ) -> Result<Self, AopConfigError> {
        if config.max_size == 0 {
            return Err(AopConfigError::InvalidPoolSize);
        }
        tracing::debug!(
            "Creating pool for class '{}' with max size {} ({:?} when exhausted)",
            class.name(),
            config.max_size,
            config.exhausted_action
        );
        Ok(Self {
            class,
            factory,
            config,
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
        })
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    /// 已借出的对象数
    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    /// 池中空闲的对象数
    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// 丢弃所有空闲对象
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut self.state.lock().idle);
        tracing::debug!("Cleared {} idle target(s) from pool '{}'", dropped.len(), self.class.name());
    }

    fn exhausted(&self) -> anyhow::Error {
        tracing::warn!(
            "Pool for class '{}' exhausted ({} active)",
            self.class.name(),
            self.config.max_size
        );
        AopInvocationError::PoolExhausted {
            max_size: self.config.max_size,
        }
        .into()
    }
}

impl TargetSource for PooledTargetSource {
    fn target_class(&self) -> Arc<Class> {
        Arc::clone(&self.class)
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Target> {
        let deadline = match self.config.exhausted_action {
            ExhaustedAction::Block {
                max_wait: Some(wait),
            } => Some(Instant::now() + wait),
            _ => None,
        };

        let mut state = self.state.lock();
        loop {
            if let Some(target) = state.idle.pop() {
                state.active += 1;
                return Ok(target);
            }
            if state.active < self.config.max_size {
                // 占住名额后在锁外创建
                state.active += 1;
                break;
            }
            match (self.config.exhausted_action, deadline) {
                (ExhaustedAction::Fail, _) => return Err(self.exhausted()),
                (ExhaustedAction::Block { .. }, Some(deadline)) => {
                    if self.returned.wait_until(&mut state, deadline).timed_out()
                        && state.idle.is_empty()
                        && state.active >= self.config.max_size
                    {
                        return Err(self.exhausted());
                    }
                }
                (ExhaustedAction::Block { .. }, None) => self.returned.wait(&mut state),
            }
        }
        drop(state);

        match self.factory.create(&self.class) {
            Ok(target) => Ok(target),
            Err(e) => {
                self.state.lock().active -= 1;
                self.returned.notify_one();
                Err(e)
            }
        }
    }

    /// 没有借出中的对象时拒绝归还，对象被丢弃
    fn release_target(&self, target: Target) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        if state.active == 0 {
            drop(state);
            tracing::warn!(
                "Dropping target released to pool '{}' with nothing borrowed",
                self.class.name()
            );
            drop(target);
            return Err(AopInvocationError::UnexpectedRelease {
                class: self.class.name().to_string(),
            }
            .into());
        }
        state.active -= 1;
        state.idle.push(target);
        drop(state);
        self.returned.notify_one();
        Ok(())
    }
}

impl fmt::Debug for PooledTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PooledTargetSource")
            .field("class", &self.class.name())
            .field("max_size", &self.config.max_size)
            .field("active", &state.active)
            .field("idle", &state.idle.len())
            .finish()
    }
}
