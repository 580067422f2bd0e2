use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trellis_aop::prelude::*;
use trellis_aop::{
    AopSettings, AutoProxyCreator, DefaultAdvisorAutoProxyCreator, HotSwappableTargetSource,
    PerformanceMonitorInterceptor, QuickTargetSourceCreator, TracingInterceptor,
};
use trellis_aop_macros::{aop_interface, Aspect};
use trellis_core::prelude::*;
use trellis_core::DEFAULT_ENV_PREFIX;

// ==================== 配置 ====================

const CONFIG: &str = r#"
[logging]
level = "info"
filter = "trellis_aop=debug,proxy_demo=info"

[aop]
expose-proxy = true

[aop.pool]
max-size = 2
exhausted-action = "block"
max-wait-ms = 1000
"#;

// ==================== 业务接口 ====================

#[derive(Debug, thiserror::Error)]
enum AccountError {
    #[error("account {0} not found")]
    NotFound(u64),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),
}

#[aop_interface]
pub trait AccountService: Send + Sync {
    fn balance(&self, id: u64) -> anyhow::Result<i64>;
    fn deposit(&self, id: u64, amount: i64) -> anyhow::Result<i64>;
}

/// 只有一个账户（id = 1）的银行
struct Bank {
    label: &'static str,
    balance: AtomicI64,
}

static BANKS_CREATED: AtomicUsize = AtomicUsize::new(0);

impl Bank {
    fn new(label: &'static str, opening: i64) -> Self {
        BANKS_CREATED.fetch_add(1, Ordering::SeqCst);
        Self {
            label,
            balance: AtomicI64::new(opening),
        }
    }

    fn check(&self, id: u64) -> Result<()> {
        if id != 1 {
            return Err(AccountError::NotFound(id).into());
        }
        Ok(())
    }
}

impl AccountService for Bank {
    fn balance(&self, id: u64) -> Result<i64> {
        self.check(id)?;
        Ok(self.balance.load(Ordering::SeqCst))
    }

    fn deposit(&self, id: u64, amount: i64) -> Result<i64> {
        self.check(id)?;
        std::thread::sleep(Duration::from_millis(5));
        Ok(self.balance.fetch_add(amount, Ordering::SeqCst) + amount)
    }
}

fn bank_class() -> Arc<Class> {
    Class::builder::<Bank>("Bank")
        .implements::<AccountServiceProxy>()
        .build()
}

// ==================== 切面 ====================

/// 审计所有存款
#[derive(Aspect)]
#[pointcut("execution(* AccountService.deposit(..))")]
#[order(10)]
pub struct AuditAspect;

impl AuditAspect {
    pub fn new() -> Self {
        AuditAspect
    }
}

impl MethodInterceptor for AuditAspect {
    fn invoke(&self, invocation: &mut dyn MethodInvocation) -> Result<Value> {
        let label = invocation
            .this()
            .downcast_ref::<Bank>()
            .map_or("?", |bank| bank.label);
        println!("   🧾 audit: {} on bank '{}' {:?}", invocation.method(), label, invocation.arguments());
        invocation.proceed()
    }
}

// ==================== 演示 ====================

fn programmatic_proxy() -> Result<()> {
    println!("\n==================== ProxyFactory ====================");

    let factory = ProxyFactory::for_target(Arc::new(Bank::new("main", 100)), bank_class())?;
    factory.add_advice(Advice::before(|method, args, _target| {
        if method.name() == "deposit" {
            let amount = args.cloned::<i64>(1)?;
            if amount <= 0 {
                return Err(AccountError::InvalidAmount(amount).into());
            }
        }
        Ok(())
    }))?;
    factory.add_advice(Advice::throws(ThrowsAdvice::new().on::<AccountError, _>(
        |ctx, error| {
            println!("   ⚠️  {} failed: {}", ctx.method, error);
            Ok(())
        },
    )))?;
    factory.add_advice(Advice::interceptor(TracingInterceptor::new()))?;

    let accounts: AccountServiceProxy = factory.get_facade()?;
    println!("💰 balance: {}", accounts.balance(1)?);
    println!("💰 after deposit: {}", accounts.deposit(1, 50)?);

    if let Err(err) = accounts.deposit(1, -5) {
        println!("❌ rejected: {}", err);
    }
    if let Err(err) = accounts.balance(42) {
        match err.downcast_ref::<AccountError>() {
            Some(AccountError::NotFound(id)) => println!("❌ typed error survives the chain: account {}", id),
            _ => println!("❌ unexpected error: {}", err),
        }
    }

    println!("📋 config: {}", factory.to_proxy_config_string());
    Ok(())
}

fn hot_swap() -> Result<()> {
    println!("\n==================== HotSwappableTargetSource ====================");

    let swapper = Arc::new(HotSwappableTargetSource::new(
        Arc::new(Bank::new("blue", 1)),
        bank_class(),
    )?);
    let factory = ProxyFactory::for_target_source(swapper.clone());
    factory.add_interface(Arc::clone(<AccountServiceProxy as ProxyFacade>::interface()));
    let accounts: AccountServiceProxy = factory.get_facade()?;

    println!("🔵 before swap: {}", accounts.balance(1)?);
    swapper.swap(Arc::new(Bank::new("green", 2)))?;
    println!("🟢 after swap: {}", accounts.balance(1)?);
    Ok(())
}

fn auto_proxy(settings: &AopSettings) -> Result<()> {
    println!("\n==================== Auto-proxy ====================");

    let classes = Arc::new(ClassRegistry::new());
    classes.register(bank_class());

    let creator = DefaultAdvisorAutoProxyCreator::new(Arc::clone(&classes)).with_advisor(
        "slowCalls",
        Advisor::new(Advice::interceptor(PerformanceMonitorInterceptor::new(
            Duration::from_millis(1),
        ))),
    );
    creator.support().set_config(settings.proxy_config());
    creator.support().add_target_source_creator(Arc::new(
        QuickTargetSourceCreator::new().with_pool_config(settings.pool_config()),
    ));

    let factory = DefaultListableBeanFactory::new();
    factory.add_bean_post_processor(Arc::new(creator));
    factory.register_bean_definition(BeanDefinition::singleton("accountService", || {
        Ok(Bank::new("singleton", 10))
    }))?;
    factory.register_bean_definition(BeanDefinition::prototype(":pooledAccounts", || {
        Ok(Bank::new("pooled", 0))
    }))?;

    let proxy = factory.get_bean_typed::<Proxy>("accountService")?;
    let accounts = proxy.narrow::<AccountServiceProxy>()?;
    println!("🏦 singleton deposit: {}", accounts.deposit(1, 5)?);

    let pooled = factory
        .get_bean_typed::<Proxy>(":pooledAccounts")?
        .narrow::<AccountServiceProxy>()?;
    let before = BANKS_CREATED.load(Ordering::SeqCst);
    std::thread::scope(|s| {
        for _ in 0..4 {
            let pooled = pooled.clone();
            s.spawn(move || pooled.deposit(1, 1));
        }
    });
    println!(
        "🧵 4 concurrent deposits served by {} pooled bank(s)",
        BANKS_CREATED.load(Ordering::SeqCst) - before
    );
    Ok(())
}

fn main() -> Result<()> {
    let loader = ConfigLoader::from_toml_str(CONFIG)?.with_env_prefix(DEFAULT_ENV_PREFIX);
    LoggingConfig::load(&loader)?.init()?;

    let settings = AopSettings::load(&loader)?;
    tracing::info!("AOP settings: {:?}", settings);

    programmatic_proxy()?;
    hot_swap()?;
    auto_proxy(&settings)?;

    println!("\n✅ Done");
    Ok(())
}
