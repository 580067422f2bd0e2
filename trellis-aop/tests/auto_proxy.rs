//! 编译期登记的切面 + Bean 工厂自动代理

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use trellis_aop::prelude::*;
use trellis_aop::{global_registry, AutoProxyCreator, DefaultAdvisorAutoProxyCreator, QuickTargetSourceCreator};
use trellis_aop_macros::{aop_interface, Aspect};
use trellis_core::{BeanDefinition, BeanFactory, BeanFactoryExt, DefaultListableBeanFactory};

static GREETINGS_SEEN: AtomicUsize = AtomicUsize::new(0);
static SHOUTS_SEEN: AtomicUsize = AtomicUsize::new(0);

#[aop_interface]
pub trait Greeter: Send + Sync {
    fn greet(&self, name: String) -> anyhow::Result<String>;
    fn farewell(&self, name: String) -> anyhow::Result<String>;
}

struct PoliteGreeter;

impl Greeter for PoliteGreeter {
    fn greet(&self, name: String) -> Result<String> {
        Ok(format!("Hello, {}", name))
    }

    fn farewell(&self, name: String) -> Result<String> {
        Ok(format!("Goodbye, {}", name))
    }
}

/// 统计问候次数
#[derive(Aspect)]
#[pointcut("execution(* Greeter.greet(..))")]
#[order(1)]
pub struct GreetingCounter;

impl GreetingCounter {
    pub fn new() -> Self {
        GreetingCounter
    }
}

impl MethodInterceptor for GreetingCounter {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> Result<Value> {
        GREETINGS_SEEN.fetch_add(1, Ordering::SeqCst);
        invocation.proceed()
    }
}

/// 把返回值转成大写
#[derive(Aspect)]
#[pointcut("within(Greeter)")]
pub struct Shouter;

impl Shouter {
    pub fn new() -> Self {
        Shouter
    }
}

impl MethodInterceptor for Shouter {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> Result<Value> {
        SHOUTS_SEEN.fetch_add(1, Ordering::SeqCst);
        let value = invocation.proceed()?;
        match value.downcast::<String>() {
            Ok(text) => Ok(Box::new(text.to_uppercase()) as Value),
            Err(other) => Ok(other),
        }
    }
}

fn classes() -> Arc<ClassRegistry> {
    let classes = Arc::new(ClassRegistry::new());
    classes.register(
        Class::builder::<PoliteGreeter>("PoliteGreeter")
            .implements::<GreeterProxy>()
            .build(),
    );
    classes
}

#[test]
fn test_derived_aspects_are_registered_globally() {
    let names = global_registry().names();
    assert!(names.iter().any(|n| n == "GreetingCounter"));
    assert!(names.iter().any(|n| n == "Shouter"));
}

#[test]
fn test_registered_aspects_wrap_beans() {
    let factory = DefaultListableBeanFactory::new();
    factory
        .register_bean_definition(BeanDefinition::singleton("greeter", || Ok(PoliteGreeter)))
        .unwrap();
    factory.add_bean_post_processor(Arc::new(DefaultAdvisorAutoProxyCreator::new(classes())));

    let greeter = factory
        .get_bean_typed::<Proxy>("greeter")
        .unwrap()
        .narrow::<GreeterProxy>()
        .unwrap();

    let greetings = GREETINGS_SEEN.load(Ordering::SeqCst);
    let shouts = SHOUTS_SEEN.load(Ordering::SeqCst);
    assert_eq!(greeter.greet("ada".to_string()).unwrap(), "HELLO, ADA");
    assert_eq!(greeter.farewell("ada".to_string()).unwrap(), "GOODBYE, ADA");
    assert!(GREETINGS_SEEN.load(Ordering::SeqCst) > greetings);
    assert!(SHOUTS_SEEN.load(Ordering::SeqCst) >= shouts + 2);
}

#[test]
fn test_registered_aspects_can_be_excluded() {
    let factory = DefaultListableBeanFactory::new();
    factory
        .register_bean_definition(BeanDefinition::singleton("greeter", || Ok(PoliteGreeter)))
        .unwrap();
    factory.add_bean_post_processor(Arc::new(
        DefaultAdvisorAutoProxyCreator::new(classes()).with_registered_advisors(false),
    ));

    let bean = factory.get_bean("greeter").unwrap();
    assert!(bean.downcast_ref::<PoliteGreeter>().is_some());
}

#[test]
fn test_prototype_bean_behind_thread_local_target_source() {
    let factory = DefaultListableBeanFactory::new();
    factory
        .register_bean_definition(BeanDefinition::prototype("%greeter", || Ok(PoliteGreeter)))
        .unwrap();
    let creator = Arc::new(DefaultAdvisorAutoProxyCreator::new(classes()));
    creator
        .support()
        .add_target_source_creator(Arc::new(QuickTargetSourceCreator::new()));
    factory.add_bean_post_processor(creator.clone());

    let greeter = factory
        .get_bean_typed::<Proxy>("%greeter")
        .unwrap()
        .narrow::<GreeterProxy>()
        .unwrap();
    assert_eq!(greeter.greet("bo".to_string()).unwrap(), "HELLO, BO");
    assert!(creator.support().is_proxied("%greeter"));

    let on_other_thread = greeter.clone();
    let result = std::thread::spawn(move || on_other_thread.farewell("bo".to_string()))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(result, "GOODBYE, BO");
}
