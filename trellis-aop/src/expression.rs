//! 切点表达式
//!
//! 一个 AspectJ 风格的小子集：
//!
//! ```text
//! execution(* UserService.get_*(..))
//! within(*Repository) && !execution(* *.ping(..))
//! (execution(* *.save*(..)) || execution(* *.delete*(..))) && within(Jdbc*)
//! ```
//!
//! - `execution([返回类型] 类型模式.方法模式(参数))`：类型模式匹配类名、父类名或接口名，
//!   分隔符可以是 `.` 或 `::`，参数部分不参与匹配
//! - `within(类型模式)`：只限定类
//! - `&&`、`||`、`!` 与括号

use std::sync::Arc;

use crate::class_filter::ClassFilter;
use crate::error::AopConfigError;
use crate::method_matcher::MethodMatchers;
use crate::name_match::NameMatchMethodPointcut;
use crate::pointcut::Pointcut;

impl Pointcut {
    /// 解析切点表达式
    pub fn expression(expression: &str) -> Result<Pointcut, AopConfigError> {
        parse(expression)
    }
}

/// 解析切点表达式
pub fn parse(expression: &str) -> Result<Pointcut, AopConfigError> {
    let mut parser = Parser {
        src: expression,
        pos: 0,
    };
    let pointcut = parser.parse_or()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.error(format!(
            "unexpected input at offset {}: '{}'",
            parser.pos,
            &parser.src[parser.pos..]
        )));
    }
    Ok(pointcut)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> AopConfigError {
        AopConfigError::InvalidPointcutExpression {
            expression: self.src.to_string(),
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), AopConfigError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}' at offset {}", token, self.pos)))
        }
    }

    fn parse_or(&mut self) -> Result<Pointcut, AopConfigError> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            let right = self.parse_and()?;
            left = left.union(&right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Pointcut, AopConfigError> {
        let mut left = self.parse_unary()?;
        while self.eat("&&") {
            let right = self.parse_unary()?;
            left = left.intersection(&right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Pointcut, AopConfigError> {
        if self.eat("!") {
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Pointcut, AopConfigError> {
        if self.eat("(") {
            let inner = self.parse_or()?;
            self.expect(")")?;
            return Ok(inner);
        }

        self.skip_ws();
        let designator: String = self
            .rest()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if designator.is_empty() {
            return Err(self.error(format!("expected a designator at offset {}", self.pos)));
        }
        self.pos += designator.len();
        self.expect("(")?;
        let body = self.read_balanced()?;

        match designator.as_str() {
            "execution" => self.execution(body),
            "within" => {
                let pattern = body.trim();
                if pattern.is_empty() {
                    return Err(self.error("within() needs a type pattern"));
                }
                Ok(Pointcut::for_class_filter(type_filter(pattern)))
            }
            other => Err(self.error(format!("unsupported designator '{}'", other))),
        }
    }

    /// 读取到与已消费的 `(` 配对的 `)`，返回其间的原始文本
    fn read_balanced(&mut self) -> Result<&'a str, AopConfigError> {
        let start = self.pos;
        let mut depth = 1usize;
        for (offset, c) in self.rest().char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = &self.src[start..start + offset];
                        self.pos = start + offset + 1;
                        return Ok(body);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }

    fn execution(&self, signature: &str) -> Result<Pointcut, AopConfigError> {
        let signature = signature.trim();
        let head = match signature.find('(') {
            Some(open) if signature.ends_with(')') => signature[..open].trim(),
            Some(_) => return Err(self.error("execution() parameter list is not closed")),
            None => signature,
        };

        let qualified = head
            .split_whitespace()
            .last()
            .ok_or_else(|| self.error("execution() needs a method pattern"))?;

        let (type_pattern, method_pattern) = qualified
            .rsplit_once("::")
            .or_else(|| qualified.rsplit_once('.'))
            .unwrap_or(("*", qualified));

        if method_pattern.is_empty() || type_pattern.is_empty() {
            return Err(self.error(format!("malformed method pattern '{}'", qualified)));
        }

        let method_matcher = if method_pattern == "*" {
            MethodMatchers::always()
        } else {
            Arc::new(NameMatchMethodPointcut::new().with_mapped_name(method_pattern))
        };

        Ok(Pointcut::new(type_filter(type_pattern), method_matcher))
    }
}

fn type_filter(pattern: &str) -> ClassFilter {
    if pattern == "*" {
        ClassFilter::True
    } else {
        ClassFilter::name_pattern(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::Value;
    use crate::class::{Class, Interface, Method};

    const FIND: Method = Method::new("UserService", "find_user", &["u64"], "String");
    const SAVE: Method = Method::new("UserService", "save_user", &["String"], "()");
    const PING: Method = Method::new("UserService", "ping", &[], "()");

    struct UserServiceImpl;
    struct Other;

    fn service() -> Arc<Class> {
        let iface = Arc::new(Interface::new("UserService", vec![FIND, SAVE, PING]));
        Class::builder::<UserServiceImpl>("UserServiceImpl")
            .interface(iface)
            .method(FIND, |_, _| Ok(Box::new(String::new()) as Value))
            .method(SAVE, |_, _| Ok(Box::new(()) as Value))
            .method(PING, |_, _| Ok(Box::new(()) as Value))
            .build()
    }

    #[test]
    fn test_execution() {
        let class = service();
        let pc = Pointcut::expression("execution(* UserService.find_*(..))").unwrap();
        assert!(pc.matches(&FIND, &class, None));
        assert!(!pc.matches(&SAVE, &class, None));

        let other = Class::builder::<Other>("Other").build();
        assert!(!pc.matches(&FIND, &other, None));
    }

    #[test]
    fn test_execution_without_return_type_and_rust_path() {
        let class = service();
        let pc = Pointcut::expression("execution(UserServiceImpl::save_user(String))").unwrap();
        assert!(pc.matches(&SAVE, &class, None));
        assert!(!pc.matches(&FIND, &class, None));
    }

    #[test]
    fn test_combinators() {
        let class = service();
        let pc = Pointcut::expression("within(*Service*) && !execution(* *.ping(..))").unwrap();
        assert!(pc.matches(&FIND, &class, None));
        assert!(pc.matches(&SAVE, &class, None));
        assert!(!pc.matches(&PING, &class, None));

        let pc = Pointcut::expression(
            "(execution(* *.find*(..)) || execution(* *.save*(..))) && within(UserServiceImpl)",
        )
        .unwrap();
        assert!(pc.matches(&FIND, &class, None));
        assert!(pc.matches(&SAVE, &class, None));
        assert!(!pc.matches(&PING, &class, None));
    }

    #[test]
    fn test_errors() {
        for bad in [
            "",
            "execution(* Foo.bar(..)",
            "bogus(Foo)",
            "within()",
            "execution(* Foo.bar(..)) &&",
            "execution(* Foo.bar(..)) junk",
        ] {
            let err = Pointcut::expression(bad).unwrap_err();
            assert!(
                matches!(err, AopConfigError::InvalidPointcutExpression { .. }),
                "{bad}"
            );
        }
    }
}
