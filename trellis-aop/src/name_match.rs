//! 名称匹配
//!
//! `*` 通配符匹配（可出现在任意位置），以及按方法名匹配的切点。

use crate::class::{Class, Method};
use crate::method_matcher::MethodMatcher;

/// 简单通配符匹配，`*` 匹配任意（可为空的）字符序列
pub fn simple_match(pattern: &str, s: &str) -> bool {
    let Some(first) = pattern.find('*') else {
        return pattern == s;
    };

    if first == 0 {
        if pattern.len() == 1 {
            return true;
        }
        let rest = &pattern[1..];
        let Some(next) = rest.find('*').map(|i| i + 1) else {
            return s.ends_with(rest);
        };
        let part = &pattern[1..next];
        if part.is_empty() {
            return simple_match(&pattern[next..], s);
        }

        let mut offset = 0;
        while let Some(found) = s[offset..].find(part) {
            let index = offset + found;
            if simple_match(&pattern[next..], &s[index + part.len()..]) {
                return true;
            }
            offset = index + s[index..].chars().next().map_or(1, char::len_utf8);
        }
        return false;
    }

    s.len() >= first
        && s.is_char_boundary(first)
        && pattern[..first] == s[..first]
        && simple_match(&pattern[first..], &s[first..])
}

/// 任一模式匹配即可
pub fn simple_match_any<S: AsRef<str>>(patterns: &[S], s: &str) -> bool {
    patterns.iter().any(|p| simple_match(p.as_ref(), s))
}

/// 按方法名匹配的切点（静态匹配）
#[derive(Debug, Clone, Default)]
pub struct NameMatchMethodPointcut {
    mapped_names: Vec<String>,
}

impl NameMatchMethodPointcut {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个方法名或通配模式
    pub fn with_mapped_name(mut self, name: impl Into<String>) -> Self {
        self.mapped_names.push(name.into());
        self
    }

    pub fn with_mapped_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mapped_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn mapped_names(&self) -> &[String] {
        &self.mapped_names
    }

    fn is_match(&self, method_name: &str) -> bool {
        simple_match_any(&self.mapped_names, method_name)
    }
}

impl MethodMatcher for NameMatchMethodPointcut {
    fn matches(&self, method: &Method, _target_class: &Class) -> bool {
        self.is_match(method.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_match() {
        assert!(simple_match("get_age", "get_age"));
        assert!(!simple_match("get_age", "get_name"));
        assert!(simple_match("*", "anything"));
        assert!(simple_match("get*", "get_age"));
        assert!(!simple_match("get*", "set_age"));
        assert!(simple_match("*age", "get_age"));
        assert!(simple_match("*_a*", "set_age"));
        assert!(simple_match("s*_*e", "set_age"));
        assert!(!simple_match("s*_*x", "set_age"));
        assert!(simple_match("**", ""));
        assert!(!simple_match("x*", ""));
    }

    #[test]
    fn test_simple_match_any() {
        let patterns = ["set*", "absquatulate"];
        assert!(simple_match_any(&patterns, "set_age"));
        assert!(simple_match_any(&patterns, "absquatulate"));
        assert!(!simple_match_any(&patterns, "get_age"));
    }
}
