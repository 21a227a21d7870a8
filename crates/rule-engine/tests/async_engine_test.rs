use async_trait::async_trait;
use rule_engine::mock::AsyncFnRule;
use rule_engine::{
    AsyncRule, AsyncRuleCore, BoxError, EngineError, ParallelConfig, RuleConfig, RuleEngine,
    RuleError, RuleKey, RuleLogger, RuleResult, RuleResultsExt, RuleSnapshot, RunContext, RunId,
    SharedModel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// --- Test Model ---

#[derive(Debug, Default)]
struct Shipment {
    risk: f64,
    flagged: bool,
    log: Vec<String>,
}

fn marker(key: &'static str) -> AsyncFnRule<Shipment> {
    AsyncFnRule::new(key, |_, _| Box::pin(async { Ok(RuleResult::new()) }))
}

fn names(results: &[RuleResult]) -> Vec<&str> {
    results.iter().filter_map(|r| r.name.as_deref()).collect()
}

// --- Ordering ---

#[tokio::test]
async fn async_results_follow_execution_order_then_insertion_order() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(marker("A"));
    engine.add_async_rule(
        marker("B").with_core(AsyncRuleCore::new().with_config(RuleConfig::new().order(1))),
    );
    let results = engine.execute_async().await.unwrap();
    assert_eq!(names(&results), ["B", "A"]);
}

#[tokio::test]
async fn async_preactive_and_reactive_rules_bracket_their_observed_rule() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(
        marker("After").with_core(AsyncRuleCore::new().reactive_to(RuleKey::new("Q"))),
    );
    engine.add_async_rule(marker("Q"));
    engine.add_async_rule(
        marker("Before").with_core(AsyncRuleCore::new().preactive_to(RuleKey::new("Q"))),
    );
    let results = engine.execute_async().await.unwrap();
    assert_eq!(names(&results), ["Before", "Q", "After"]);
}

// --- Parallel scheduling ---

#[tokio::test]
async fn parallel_rules_are_joined_before_results_finalize() {
    let background = AsyncFnRule::new("Background", |model: SharedModel<Shipment>, _| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            model.write().await.log.push("background done".into());
            Ok(RuleResult::new())
        })
    })
    .with_core(AsyncRuleCore::new().parallel(ParallelConfig::new()));

    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(background);
    engine.add_async_rule(marker("Main"));

    let results = engine.execute_async().await.unwrap();
    // parallel results append after the ordered pass
    assert_eq!(names(&results), ["Main", "Background"]);
    assert_eq!(
        engine.model().map(|s| s.log.as_slice()),
        Some(&["background done".to_owned()][..])
    );
}

#[tokio::test]
async fn an_ordered_rule_can_await_a_value_a_parallel_rule_produces() {
    let scorer = AsyncFnRule::new("Scorer", |_, ctx: RunContext| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            ctx.store().put("risk.score", 0.7f64);
            Ok(RuleResult::new())
        })
    })
    .with_core(AsyncRuleCore::new().parallel(ParallelConfig::new()));

    let gate = AsyncFnRule::new("Gate", |model: SharedModel<Shipment>, ctx: RunContext| {
        Box::pin(async move {
            let score = ctx.store().get("risk.score", Duration::from_secs(2)).await?;
            let score = score.downcast::<f64>().map_err(|_| "score is not a number")?;
            let mut shipment = model.write().await;
            shipment.risk = *score;
            shipment.flagged = *score > 0.5;
            Ok(RuleResult::new())
        })
    });

    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(scorer);
    engine.add_async_rule(gate);

    engine.execute_async().await.unwrap();
    let model = engine.model().unwrap();
    assert_eq!(model.risk, 0.7);
    assert!(model.flagged);
}

#[tokio::test]
async fn a_cancelled_parallel_rule_contributes_no_result() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let token = CancellationToken::new();
    token.cancel();

    let counter = Arc::clone(&invocations);
    let cancelled = AsyncFnRule::new("Cancelled", move |_, _| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(RuleResult::new())
        })
    })
    .with_core(
        AsyncRuleCore::new().parallel(ParallelConfig::new().with_cancellation(token)),
    );

    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(cancelled);
    engine.add_async_rule(marker("Main"));

    let results = engine.execute_async().await.unwrap();
    assert_eq!(names(&results), ["Main"]);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

// --- Gating ---

#[tokio::test]
async fn async_terminate_blocks_every_later_rule() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(
        marker("Halt").with_core(AsyncRuleCore::new().with_config(RuleConfig::new().terminate())),
    );
    engine.add_async_rule(marker("Late"));
    let results = engine.execute_async().await.unwrap();
    assert_eq!(names(&results), ["Halt"]);
}

#[tokio::test]
async fn async_skip_contributes_nothing() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(
        marker("S").with_core(AsyncRuleCore::new().with_config(RuleConfig::new().skip())),
    );
    engine.add_async_rule(
        marker("R").with_core(AsyncRuleCore::new().reactive_to(RuleKey::new("S"))),
    );
    let results = engine.execute_async().await.unwrap();
    assert!(results.is_empty());
}

// --- Nesting ---

#[tokio::test]
async fn async_nested_rules_run_in_their_configured_position() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(marker("Parent").with_core(
        AsyncRuleCore::new()
            .with_config(RuleConfig::new().nested_first())
            .with_rule(marker("Child")),
    ));
    let results = engine.execute_async().await.unwrap();
    assert_eq!(names(&results), ["Child", "Parent"]);
}

// --- Exception handling ---

struct AsyncRecovery {
    core: AsyncRuleCore<Shipment>,
}

#[async_trait]
impl AsyncRule<Shipment> for AsyncRecovery {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &AsyncRuleCore<Shipment> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AsyncRuleCore<Shipment> {
        &mut self.core
    }

    async fn invoke(
        &mut self,
        _model: &SharedModel<Shipment>,
        _ctx: &RunContext,
    ) -> Result<RuleResult, BoxError> {
        let result = match self.core.unhandled_error() {
            Some(source) => {
                RuleResult::new().with_error(RuleError::from_source(Arc::clone(source)))
            }
            None => RuleResult::new(),
        };
        Ok(result)
    }
}

fn failing(key: &'static str) -> AsyncFnRule<Shipment> {
    AsyncFnRule::new(key, |_, _| Box::pin(async { Err("boom".into()) }))
}

#[tokio::test]
async fn async_local_handler_recovers_an_ordered_failure() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(AsyncRecovery {
        core: AsyncRuleCore::new().on_failure_of(RuleKey::new("Failing")),
    });
    engine.add_async_rule(failing("Failing"));

    let results = engine.execute_async().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name.as_deref(), Some("AsyncRecovery"));
    let captured = results[0].error.as_ref().and_then(|e| e.source.as_ref());
    assert!(captured.is_some_and(|e| e.to_string().contains("boom")));
}

#[tokio::test]
async fn a_parallel_failure_is_recovered_at_join_time() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(AsyncRecovery {
        core: AsyncRuleCore::new().on_failure_of(RuleKey::new("Flaky")),
    });
    engine.add_async_rule(
        failing("Flaky").with_core(AsyncRuleCore::new().parallel(ParallelConfig::new())),
    );
    engine.add_async_rule(marker("Main"));

    let results = engine.execute_async().await.unwrap();
    assert_eq!(names(&results), ["Main", "AsyncRecovery"]);
    assert!(results.any_error());
}

#[tokio::test]
async fn an_unhandled_async_failure_aborts_the_run() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(failing("Failing"));
    let error = engine.execute_async().await.unwrap_err();
    assert!(matches!(
        error,
        EngineError::RuleFailed { rule, .. } if rule == RuleKey::new("Failing")
    ));
}

// --- Initialization ---

struct WaitsForPeer {
    core: AsyncRuleCore<Shipment>,
}

#[async_trait]
impl AsyncRule<Shipment> for WaitsForPeer {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &AsyncRuleCore<Shipment> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AsyncRuleCore<Shipment> {
        &mut self.core
    }

    // only completes if the sibling's setup hook runs concurrently
    async fn initialize(
        &mut self,
        _model: &SharedModel<Shipment>,
        ctx: &RunContext,
    ) -> Result<(), BoxError> {
        ctx.store().get("peer.ready", Duration::from_millis(500)).await?;
        Ok(())
    }

    async fn invoke(
        &mut self,
        _model: &SharedModel<Shipment>,
        _ctx: &RunContext,
    ) -> Result<RuleResult, BoxError> {
        Ok(RuleResult::new())
    }
}

struct AnnouncesPeer {
    core: AsyncRuleCore<Shipment>,
}

#[async_trait]
impl AsyncRule<Shipment> for AnnouncesPeer {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &AsyncRuleCore<Shipment> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AsyncRuleCore<Shipment> {
        &mut self.core
    }

    async fn initialize(
        &mut self,
        _model: &SharedModel<Shipment>,
        ctx: &RunContext,
    ) -> Result<(), BoxError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.store().put("peer.ready", true);
        Ok(())
    }

    async fn invoke(
        &mut self,
        _model: &SharedModel<Shipment>,
        _ctx: &RunContext,
    ) -> Result<RuleResult, BoxError> {
        Ok(RuleResult::new())
    }
}

#[tokio::test]
async fn sibling_setup_hooks_run_concurrently() {
    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(WaitsForPeer {
        core: AsyncRuleCore::new(),
    });
    engine.add_async_rule(AnnouncesPeer {
        core: AsyncRuleCore::new(),
    });
    let results = engine.execute_async().await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn a_failing_setup_hook_fails_the_whole_run() {
    struct FailingSetup {
        core: AsyncRuleCore<Shipment>,
    }

    #[async_trait]
    impl AsyncRule<Shipment> for FailingSetup {
        fn key(&self) -> RuleKey {
            RuleKey::new("FailingSetup")
        }

        fn core(&self) -> &AsyncRuleCore<Shipment> {
            &self.core
        }

        fn core_mut(&mut self) -> &mut AsyncRuleCore<Shipment> {
            &mut self.core
        }

        async fn initialize(
            &mut self,
            _model: &SharedModel<Shipment>,
            _ctx: &RunContext,
        ) -> Result<(), BoxError> {
            Err("setup broke".into())
        }

        async fn invoke(
            &mut self,
            _model: &SharedModel<Shipment>,
            _ctx: &RunContext,
        ) -> Result<RuleResult, BoxError> {
            Ok(RuleResult::new())
        }
    }

    let mut engine = RuleEngine::new(Shipment::default());
    engine.add_async_rule(marker("Fine"));
    engine.add_async_rule(FailingSetup {
        core: AsyncRuleCore::new(),
    });

    let error = engine.execute_async().await.unwrap_err();
    assert!(matches!(
        error,
        EngineError::InitializeFailed { rule, .. } if rule == RuleKey::new("FailingSetup")
    ));
}

// --- Logging collaborator ---

struct CaptureLogger {
    seen: Arc<Mutex<Vec<String>>>,
}

impl RuleLogger<Shipment> for CaptureLogger {
    fn write(&self, _run_id: RunId, snapshot: &RuleSnapshot, _model: &Shipment) {
        self.seen.lock().unwrap().push(snapshot.rule.to_string());
    }
}

#[tokio::test]
async fn the_logger_sees_every_completed_rule_body() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut engine = RuleEngine::new(Shipment::default());
    engine.set_logger(CaptureLogger {
        seen: Arc::clone(&seen),
    });
    engine.add_async_rule(marker("First"));
    engine.add_async_rule(
        marker("Background").with_core(AsyncRuleCore::new().parallel(ParallelConfig::new())),
    );

    engine.execute_async().await.unwrap();
    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, ["Background", "First"]);
}
