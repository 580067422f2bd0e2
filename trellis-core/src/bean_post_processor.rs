//! BeanPostProcessor - Bean 工厂扩展机制
//!
//! 提供在 Bean 实例化前、初始化前后进行自定义处理的钩子。
//! 自动代理创建器就是通过这些钩子把 Bean 替换成代理的。

use std::any::TypeId;
use std::sync::Weak;

use crate::bean::SharedBean;
use crate::bean_factory::BeanFactory;
use crate::error::ContainerResult;

/// 默认的处理器顺序
pub const DEFAULT_PROCESSOR_ORDER: i32 = 1000;

/// BeanPostProcessor trait
///
/// 在 Bean 创建的不同阶段提供钩子，允许自定义修改或替换 Bean 实例
///
/// 使用场景：
/// - AOP 代理创建
/// - Bean 包装
/// - 验证等
///
/// # 示例
///
/// ```ignore
/// struct LoggingPostProcessor;
///
/// impl BeanPostProcessor for LoggingPostProcessor {
///     fn post_process_after_initialization(
///         &self,
///         bean: SharedBean,
///         bean_name: &str,
///     ) -> ContainerResult<SharedBean> {
///         tracing::info!("After initialization: {}", bean_name);
///         Ok(bean)
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// 在实例化之前调用
    ///
    /// 返回 `Some` 时容器直接使用返回的对象，跳过提供者创建和初始化前回调，
    /// 只会再经过 `post_process_after_initialization`。
    fn post_process_before_instantiation(
        &self,
        _bean_type: TypeId,
        _bean_name: &str,
    ) -> ContainerResult<Option<SharedBean>> {
        Ok(None)
    }

    /// 在 Bean 初始化之前调用
    fn post_process_before_initialization(
        &self,
        bean: SharedBean,
        _bean_name: &str,
    ) -> ContainerResult<SharedBean> {
        Ok(bean)
    }

    /// 在 Bean 初始化之后调用
    ///
    /// 返回处理后的 Bean 实例（可以是原始 Bean，也可以是包装后的 Bean）
    fn post_process_after_initialization(
        &self,
        bean: SharedBean,
        _bean_name: &str,
    ) -> ContainerResult<SharedBean> {
        Ok(bean)
    }

    /// 注册到工厂时回调，传入工厂的弱引用
    fn set_bean_factory(&self, _factory: Weak<dyn BeanFactory>) {}

    /// 处理器名称（用于日志）
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 执行顺序，值越小越先执行
    fn order(&self) -> i32 {
        DEFAULT_PROCESSOR_ORDER
    }
}
