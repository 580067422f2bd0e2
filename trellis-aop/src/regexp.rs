//! 正则表达式方法切点
//!
//! 模式匹配完整限定名 `Declaring::method`，声明者不同于目标类时
//! 也会尝试 `TargetClass::method`。模式必须匹配整个名称。

use std::sync::Arc;

use regex::Regex;

use crate::class::{Class, Method};
use crate::error::AopConfigError;
use crate::method_matcher::MethodMatcher;
use crate::pointcut::Pointcut;

#[derive(Debug, Clone)]
pub struct RegexpMethodPointcut {
    patterns: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl RegexpMethodPointcut {
    pub fn new<I, S>(patterns: I) -> Result<Self, AopConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: compile_all(patterns)?,
            excluded: Vec::new(),
        })
    }

    /// 排除模式，命中时即使匹配了正向模式也不匹配
    pub fn with_excluded<I, S>(mut self, patterns: I) -> Result<Self, AopConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded.extend(compile_all(patterns)?);
        Ok(self)
    }

    pub fn into_pointcut(self) -> Pointcut {
        Pointcut::for_method_matcher(Arc::new(self))
    }

    fn matches_pattern(&self, qualified: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(qualified))
            && !self.excluded.iter().any(|p| p.is_match(qualified))
    }
}

fn compile_all<I, S>(patterns: I) -> Result<Vec<Regex>, AopConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| {
            let p = p.as_ref();
            Regex::new(&format!("^(?:{})$", p)).map_err(|e| AopConfigError::InvalidPattern {
                pattern: p.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl MethodMatcher for RegexpMethodPointcut {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        if self.matches_pattern(&format!("{}::{}", method.declaring(), method.name())) {
            return true;
        }
        target_class.name() != method.declaring()
            && self.matches_pattern(&format!("{}::{}", target_class.name(), method.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::Value;

    const SAVE: Method = Method::new("Repository", "save_user", &["String"], "()");
    const LOAD: Method = Method::new("Repository", "load_user", &["u64"], "String");

    struct JdbcRepository;

    fn repo() -> Arc<Class> {
        Class::builder::<JdbcRepository>("JdbcRepository")
            .method(SAVE, |_, _| Ok(Box::new(()) as Value))
            .method(LOAD, |_, _| Ok(Box::new(String::new()) as Value))
            .build()
    }

    #[test]
    fn test_matches_declaring_qualified_name() {
        let class = repo();
        let pc = RegexpMethodPointcut::new([r"Repository::save.*"]).unwrap();
        assert!(pc.matches(&SAVE, &class));
        assert!(!pc.matches(&LOAD, &class));
    }

    #[test]
    fn test_matches_target_class_name() {
        let class = repo();
        let pc = RegexpMethodPointcut::new([r"Jdbc.*::load_user"]).unwrap();
        assert!(pc.matches(&LOAD, &class));
    }

    #[test]
    fn test_pattern_must_match_whole_name() {
        let class = repo();
        let pc = RegexpMethodPointcut::new(["save"]).unwrap();
        assert!(!pc.matches(&SAVE, &class));
    }

    #[test]
    fn test_exclusions() {
        let class = repo();
        let pc = RegexpMethodPointcut::new([r".*_user"])
            .unwrap()
            .with_excluded([r".*::load.*"])
            .unwrap();
        assert!(pc.matches(&SAVE, &class));
        assert!(!pc.matches(&LOAD, &class));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = RegexpMethodPointcut::new(["(unclosed"]).unwrap_err();
        assert!(matches!(err, AopConfigError::InvalidPattern { .. }));
    }
}
