//! 切点并集/交集在基类与子类上的行为

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use trellis_aop::method_matcher::MethodMatchers;
use trellis_aop::prelude::*;
use trellis_aop::{ControlFlowPointcut, Pointcuts, RegexpMethodPointcut};

const GET_AGE: Method = Method::new("TestBean", "get_age", &[], "u32");
const SET_AGE: Method = Method::new("TestBean", "set_age", &["u32"], "()");
const ABSQUATULATE: Method = Method::new("TestBean", "absquatulate", &[], "()");

#[derive(Default)]
struct TestBean {
    age: AtomicU32,
}

#[derive(Default)]
struct MyTestBean {
    base: TestBean,
}

#[derive(Default)]
struct MyTestBeanSubclass {
    base: MyTestBean,
}

struct Fixture {
    test_bean: Arc<Class>,
    my_test_bean: Arc<Class>,
    subclass: Arc<Class>,
}

fn fixture() -> Fixture {
    let test_bean = Class::builder::<TestBean>("TestBean")
        .method(GET_AGE, |bean, _| Ok(Box::new(bean.age.load(Ordering::SeqCst)) as Value))
        .method(SET_AGE, |bean, args| {
            bean.age.store(args.cloned::<u32>(0)?, Ordering::SeqCst);
            Ok(Box::new(()) as Value)
        })
        .method(ABSQUATULATE, |_, _| Ok(Box::new(()) as Value))
        .build();
    let my_test_bean = Class::builder::<MyTestBean>("MyTestBean")
        .extends(&test_bean, |bean: &MyTestBean| &bean.base)
        .build();
    let subclass = Class::builder::<MyTestBeanSubclass>("MyTestBeanSubclass")
        .extends(&my_test_bean, |bean: &MyTestBeanSubclass| &bean.base)
        .build();
    Fixture {
        test_bean,
        my_test_bean,
        subclass,
    }
}

fn getters() -> Pointcut {
    Pointcut::method_names(["get*"])
}

fn setters() -> Pointcut {
    Pointcut::method_names(["set*"])
}

#[test]
fn test_union_covers_either_side() {
    let f = fixture();
    let union = Pointcuts::union(&getters(), &setters());

    for class in [&f.test_bean, &f.my_test_bean, &f.subclass] {
        assert!(union.matches(&GET_AGE, class, None));
        assert!(union.matches(&SET_AGE, class, None));
        assert!(!union.matches(&ABSQUATULATE, class, None));
    }
}

#[test]
fn test_intersection_covers_both_sides_only() {
    let f = fixture();
    let setters_on_subclasses = Pointcut::new(ClassFilter::root(&f.my_test_bean), MethodMatchers::always());
    let intersection = Pointcuts::intersection(&setters(), &setters_on_subclasses);

    assert!(!intersection.matches(&SET_AGE, &f.test_bean, None));
    assert!(intersection.matches(&SET_AGE, &f.my_test_bean, None));
    assert!(intersection.matches(&SET_AGE, &f.subclass, None));
    assert!(!intersection.matches(&GET_AGE, &f.subclass, None));
}

#[test]
fn test_union_with_true_is_true() {
    let f = fixture();
    let union = Pointcuts::union(&getters(), Pointcut::always());
    assert!(union.is_always());
    for class in [&f.test_bean, &f.my_test_bean, &f.subclass] {
        for method in [GET_AGE, SET_AGE, ABSQUATULATE] {
            assert!(union.matches(&method, class, None));
        }
    }
}

#[test]
fn test_intersection_with_false_matches_nothing() {
    let f = fixture();
    let intersection = Pointcuts::intersection(&Pointcut::always().clone(), Pointcut::never());
    assert!(intersection.is_never());
    for class in [&f.test_bean, &f.my_test_bean, &f.subclass] {
        for method in [GET_AGE, SET_AGE, ABSQUATULATE] {
            assert!(!intersection.matches(&method, class, None));
        }
    }
}

#[test]
fn test_exact_class_filter_rejects_subclass() {
    let f = fixture();
    let exact = Pointcut::new(
        ClassFilter::exact(&f.test_bean),
        MethodMatchers::from_fn(|m, _| m.name() == "get_age"),
    );
    let rooted = Pointcut::new(
        ClassFilter::root(&f.test_bean),
        MethodMatchers::from_fn(|m, _| m.name() == "get_age"),
    );

    assert!(exact.matches(&GET_AGE, &f.test_bean, None));
    assert!(!exact.matches(&GET_AGE, &f.subclass, None));
    assert!(rooted.matches(&GET_AGE, &f.subclass, None));
}

#[test]
fn test_union_keeps_class_filters_per_side() {
    let f = fixture();
    let base_getters = Pointcut::new(ClassFilter::exact(&f.test_bean), getters().method_matcher().clone());
    let subclass_setters = Pointcut::new(ClassFilter::exact(&f.subclass), setters().method_matcher().clone());
    let union = Pointcuts::union(&base_getters, &subclass_setters);

    assert!(union.matches(&GET_AGE, &f.test_bean, None));
    assert!(!union.matches(&SET_AGE, &f.test_bean, None));
    assert!(union.matches(&SET_AGE, &f.subclass, None));
    assert!(!union.matches(&GET_AGE, &f.subclass, None));
    assert!(!union.matches(&GET_AGE, &f.my_test_bean, None));
}

#[test]
fn test_regexp_matches_inherited_methods() {
    let f = fixture();
    let pc = RegexpMethodPointcut::new([r"TestBean::set.*"])
        .unwrap()
        .with_excluded([r".*::absquatulate"])
        .unwrap()
        .into_pointcut();

    assert!(pc.matches(&SET_AGE, &f.subclass, None));
    assert!(!pc.matches(&GET_AGE, &f.subclass, None));
    assert!(RegexpMethodPointcut::new(["(unclosed"]).is_err());
}

#[test]
fn test_control_flow_only_matches_nested_calls() {
    let f = fixture();
    let flow = Arc::new(ControlFlowPointcut::new("MyTestBean").with_method("set_age"));
    let pointcut = Pointcut::for_method_matcher(flow.clone());

    // 代理之外没有调用帧
    assert!(!pointcut.matches(&GET_AGE, &f.test_bean, Some(&Arguments::new())));
    assert!(pointcut.is_runtime());
    assert_eq!(flow.evaluations(), 1);
}
