//! 类型擦除的调用参数与返回值
//!
//! 代理在运行时不知道具体的方法签名，所以参数以 `Box<dyn ArgValue>` 保存。
//! 参数必须可克隆：拦截器可以多次 `proceed()`，每次到达目标时都从
//! 当前参数克隆出一份新的值交给目标方法。

use std::any::Any;
use std::fmt;

use crate::error::AopInvocationError;

/// 方法返回值
pub type Value = Box<dyn Any + Send>;

/// 可克隆的类型擦除参数
pub trait ArgValue: Any + Send {
    fn clone_arg(&self) -> Box<dyn ArgValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Clone> ArgValue for T {
    fn clone_arg(&self) -> Box<dyn ArgValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// 一次方法调用的参数列表
#[derive(Default)]
pub struct Arguments {
    values: Vec<Box<dyn ArgValue>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// 追加一个参数
    pub fn push<T: Any + Send + Clone>(&mut self, value: T) {
        self.values.push(Box::new(value));
    }

    /// 追加一个参数（链式）
    pub fn with<T: Any + Send + Clone>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn slot(&self, index: usize) -> Option<&dyn ArgValue> {
        self.values.get(index).map(|value| &**value)
    }

    /// 按类型借用第 `index` 个参数
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.slot(index)?.as_any().downcast_ref::<T>()
    }

    /// 按类型可变借用第 `index` 个参数（前置通知可以借此改写参数）
    pub fn get_mut<T: Any>(&mut self, index: usize) -> Option<&mut T> {
        let value: &mut dyn ArgValue = &mut **self.values.get_mut(index)?;
        value.as_any_mut().downcast_mut::<T>()
    }

    /// 替换第 `index` 个参数
    pub fn set<T: Any + Send + Clone>(
        &mut self,
        index: usize,
        value: T,
    ) -> Result<(), AopInvocationError> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or_else(|| AopInvocationError::ArgumentMismatch {
                method: format!("<argument list of {}>", len),
                index,
                expected: std::any::type_name::<T>(),
            })?;
        *slot = Box::new(value);
        Ok(())
    }

    /// 克隆出第 `index` 个参数的值，目标方法分派时使用
    pub fn cloned<T: Any + Clone>(&self, index: usize) -> Result<T, AopInvocationError> {
        self.get::<T>(index)
            .cloned()
            .ok_or_else(|| AopInvocationError::ArgumentMismatch {
                method: format!("<argument list of {}>", self.len()),
                index,
                expected: std::any::type_name::<T>(),
            })
    }

    /// 第 `index` 个参数的类型名
    pub fn type_name_at(&self, index: usize) -> Option<&'static str> {
        self.slot(index).map(|value| value.type_name())
    }
}

impl Clone for Arguments {
    fn clone(&self) -> Self {
        Self {
            values: self.values.iter().map(|value| (**value).clone_arg()).collect(),
        }
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(|value| (**value).type_name()))
            .finish()
    }
}

/// 把返回值还原成具体类型
pub fn downcast_value<R: Any>(value: Value, method: &str) -> Result<R, AopInvocationError> {
    value
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| AopInvocationError::ReturnTypeMismatch {
            method: method.to_string(),
            expected: std::any::type_name::<R>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let args = Arguments::new().with(42i32).with("bob".to_string());
        assert_eq!(args.len(), 2);
        assert_eq!(args.get::<i32>(0), Some(&42));
        assert_eq!(args.get::<String>(1).map(String::as_str), Some("bob"));
        assert!(args.get::<String>(0).is_none());
        assert!(args.get::<i32>(5).is_none());
    }

    #[test]
    fn test_mutation_and_clone_are_independent() {
        let mut args = Arguments::new().with(1u8);
        let snapshot = args.clone();

        *args.get_mut::<u8>(0).unwrap() = 9;
        assert_eq!(args.cloned::<u8>(0).unwrap(), 9);
        assert_eq!(snapshot.cloned::<u8>(0).unwrap(), 1);
    }

    #[test]
    fn test_cloned_reports_mismatch() {
        let args = Arguments::new().with(1u8);
        let err = args.cloned::<String>(0).unwrap_err();
        assert!(matches!(
            err,
            AopInvocationError::ArgumentMismatch { index: 0, .. }
        ));
    }

    #[test]
    fn test_set_replaces_value() {
        let mut args = Arguments::new().with(1u8);
        args.set(0, "replaced".to_string()).unwrap();
        assert_eq!(args.type_name_at(0), Some(std::any::type_name::<String>()));
        assert!(args.set(3, 0u8).is_err());
    }

    #[test]
    fn test_downcast_value() {
        let value: Value = Box::new(7u64);
        assert_eq!(downcast_value::<u64>(value, "m").unwrap(), 7);

        let value: Value = Box::new(7u64);
        assert!(downcast_value::<String>(value, "m").is_err());
    }
}
