//! Trellis AOP 过程宏
//!
//! - `#[aop_interface]` - 把 trait 变成可代理的接口
//! - `#[derive(Aspect)]` - 把拦截器登记为通知器

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput, ItemTrait};

mod aop_interface;
mod aspect;

/// `#[aop_interface]` 属性宏
///
/// 为 trait 生成：
/// - 接口描述符与每个方法的 `Method` 常量
/// - 代理门面 `XxxProxy`，它实现原 trait，每个方法都经过代理的拦截链
/// - `BindInterface<C>`：为任何实现了该 trait 的类型绑定分派函数
///
/// 方法必须是 `&self` 方法，参数按值传递且可克隆，返回 `anyhow::Result<T>`。
///
/// 使用示例：
/// ```ignore
/// use trellis_aop::prelude::*;
///
/// #[aop_interface]
/// pub trait AccountService: Send + Sync {
///     fn balance(&self, id: u64) -> anyhow::Result<i64>;
/// }
///
/// let class = Class::builder::<Bank>("Bank")
///     .implements::<AccountServiceProxy>()
///     .build();
/// let accounts: AccountServiceProxy = ProxyFactory::for_target(Arc::new(bank), class)?
///     .get_facade()?;
/// accounts.balance(7)?;
/// ```
#[proc_macro_attribute]
pub fn aop_interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let item_trait = parse_macro_input!(item as ItemTrait);
    aop_interface::impl_aop_interface(attr.into(), item_trait)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// `#[derive(Aspect)]` 宏
///
/// 把实现了 `MethodInterceptor` 的结构体登记到通知器注册表，
/// 由 `DefaultAdvisorAutoProxyCreator` 自动应用。结构体需要提供 `new()`。
///
/// 使用示例：
/// ```ignore
/// #[derive(Aspect)]
/// #[pointcut("execution(* AccountService.*(..))")]
/// #[order(10)]
/// pub struct AuditAspect;
///
/// impl AuditAspect {
///     pub fn new() -> Self { AuditAspect }
/// }
///
/// impl MethodInterceptor for AuditAspect {
///     fn invoke(&self, inv: &mut dyn MethodInvocation) -> anyhow::Result<Value> {
///         tracing::info!("→ {}", inv.method());
///         inv.proceed()
///     }
/// }
/// ```
#[proc_macro_derive(Aspect, attributes(pointcut, order))]
pub fn derive_aspect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    aspect::impl_aspect_derive(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
