//! Build, destroy and graph actions against the in-memory provider.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use stackplan::config::ExecutionConfig;
use stackplan::plan::{CheckpointSink, PlanOutcome, Status};
use stackplan::provider::{MemoryProvider, Operation, ProviderStack, StackState};
use stackplan::{BuildAction, Context, DestroyAction, GraphAction, GraphFormat, StackerConfig};
use tokio_util::sync::CancellationToken;

const CONFIG: &str = r#"
namespace: dev
execution:
  max_parallel: 2
  poll_interval_ms: 1
  max_poll_interval_ms: 2
  jitter: false
stacks:
  - name: vpc
    template_body: "cidr: {{Cidr}}"
    variables:
      Cidr: 10.0.0.0/16
  - name: bastion
    template_body: "vpc: {{VpcId}}"
    variables:
      VpcId: "${output vpc::VpcId}"
  - name: db
    requires: [bastion]
    template_body: "vpc: {{VpcId}}"
    variables:
      VpcId: "${output vpc::VpcId}"
"#;

const NONE: Option<&[&str]> = None;

fn provider() -> Arc<MemoryProvider> {
    Arc::new(
        MemoryProvider::new()
            .with_ticks(2)
            .with_outputs("dev-vpc", [("VpcId", "vpc-123")]),
    )
}

fn context(provider: &Arc<MemoryProvider>) -> Arc<Context> {
    let config = StackerConfig::from_yaml_str(CONFIG).unwrap();
    Arc::new(Context::new(&config, provider.clone()).unwrap())
}

fn existing(fqn: &str, state: StackState, hash: Option<String>) -> ProviderStack {
    ProviderStack {
        fqn: fqn.to_string(),
        state,
        template_hash: hash,
        outputs: [("VpcId".to_string(), "vpc-123".to_string())]
            .into_iter()
            .collect(),
    }
}

#[tokio::test]
async fn test_build_creates_in_dependency_order() {
    let provider = provider();
    let sink = Arc::new(CheckpointSink::new());
    let ctx = Arc::new(context(&provider).as_ref().clone().with_event_sink(sink.clone()));

    let report = BuildAction::new(ctx)
        .execute(NONE, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, PlanOutcome::Success);
    assert_eq!(
        provider.calls_for(Operation::Create),
        vec!["dev-vpc", "dev-bastion", "dev-db"]
    );
    for step in &report.steps {
        assert_eq!(step.status, Status::complete("creating new stack"));
    }
    assert_eq!(sink.snapshot().len(), 3);
    assert_eq!(provider.state_of("dev-db"), Some(StackState::CreateComplete));
}

#[tokio::test]
async fn test_output_lookup_adds_dependency() {
    let provider = provider();
    let ctx = context(&provider);
    let bastion = ctx.get_stack("bastion").unwrap();
    assert_eq!(bastion.requires, vec!["vpc".to_string()]);

    let plan = BuildAction::new(ctx).plan(NONE).unwrap();
    let deps = plan.graph().to_dict();
    assert!(deps["dev-bastion"].contains("dev-vpc"));
    assert!(deps["dev-db"].contains("dev-vpc"));
}

#[tokio::test]
async fn test_second_build_is_nochange() {
    let provider = provider();
    let ctx = context(&provider);
    let cancel = CancellationToken::new();

    assert_eq!(
        BuildAction::new(ctx.clone()).run(NONE, &cancel).await.unwrap(),
        PlanOutcome::Success
    );
    let report = BuildAction::new(ctx).execute(NONE, &cancel).await.unwrap();

    assert!(report.is_success());
    for step in &report.steps {
        assert_eq!(step.status, Status::skipped("nochange"));
    }
    assert_eq!(provider.calls_for(Operation::Update).len(), 3);
}

#[tokio::test]
async fn test_changed_template_updates_stack() {
    let provider = provider();
    provider.insert_stack(existing(
        "dev-vpc",
        StackState::CreateComplete,
        Some("stale".to_string()),
    ));
    let ctx = context(&provider);

    let report = BuildAction::new(ctx)
        .execute(Some(&["vpc"][..]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.status_of("dev-vpc"), Some(&Status::complete("updating existing stack")));
    assert_eq!(provider.state_of("dev-vpc"), Some(StackState::UpdateComplete));
}

#[tokio::test]
async fn test_locked_stack_is_skipped_unless_forced() {
    let yaml = CONFIG.replace(
        "  - name: vpc\n",
        "  - name: vpc\n    locked: true\n",
    );
    let config = StackerConfig::from_yaml_str(&yaml).unwrap();
    let provider = provider();
    provider.insert_stack(existing(
        "dev-vpc",
        StackState::CreateComplete,
        Some("stale".to_string()),
    ));
    let targets = Some(&["vpc"][..]);
    let cancel = CancellationToken::new();

    let ctx = Arc::new(Context::new(&config, provider.clone()).unwrap());
    let report = BuildAction::new(ctx).execute(targets, &cancel).await.unwrap();
    assert_eq!(report.status_of("dev-vpc"), Some(&Status::skipped("locked")));
    assert!(provider.calls_for(Operation::Update).is_empty());

    let forced = Arc::new(
        Context::new(&config, provider.clone())
            .unwrap()
            .with_force(["vpc"]),
    );
    let report = BuildAction::new(forced).execute(targets, &cancel).await.unwrap();
    assert_eq!(report.status_of("dev-vpc"), Some(&Status::complete("updating existing stack")));
}

#[tokio::test]
async fn test_rollback_fails_stack_and_blocks_dependents() {
    let provider = provider();
    provider.fail("dev-bastion", Operation::Create);
    let ctx = context(&provider);

    let report = BuildAction::new(ctx)
        .execute(NONE, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, PlanOutcome::Failed);
    assert_eq!(report.status_of("dev-vpc"), Some(&Status::complete("creating new stack")));
    assert_eq!(report.status_of("dev-bastion"), Some(&Status::failed("rolling back new stack")));
    assert_eq!(report.status_of("dev-db"), Some(&Status::failed("dependency has failed")));
    assert!(!provider.calls_for(Operation::Create).contains(&"dev-db".to_string()));
}

#[tokio::test]
async fn test_rollback_complete_stack_is_reported() {
    let provider = provider();
    provider.insert_stack(existing("dev-vpc", StackState::RollbackComplete, None));
    let ctx = context(&provider);

    let report = BuildAction::new(ctx)
        .execute(Some(&["vpc"][..]), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        report.status_of("dev-vpc"),
        Some(&Status::failed("stack is in ROLLBACK_COMPLETE state"))
    );
}

#[tokio::test]
async fn test_disabled_stack_is_skipped() {
    let yaml = CONFIG.replace(
        "  - name: db\n",
        "  - name: db\n    enabled: false\n",
    );
    let config = StackerConfig::from_yaml_str(&yaml).unwrap();
    let provider = provider();
    let ctx = Arc::new(Context::new(&config, provider.clone()).unwrap());

    let report = BuildAction::new(ctx)
        .execute(NONE, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.status_of("dev-db"), Some(&Status::skipped("disabled")));
    assert!(!provider.contains("dev-db"));
}

#[tokio::test]
async fn test_destroy_runs_in_reverse_order() {
    let provider = provider();
    let ctx = context(&provider);
    let cancel = CancellationToken::new();
    BuildAction::new(ctx.clone()).run(NONE, &cancel).await.unwrap();

    let report = DestroyAction::new(ctx).execute(NONE, &cancel).await.unwrap();

    assert_eq!(report.outcome, PlanOutcome::Success);
    assert_eq!(
        provider.calls_for(Operation::Destroy),
        vec!["dev-db", "dev-bastion", "dev-vpc"]
    );
    for step in &report.steps {
        assert_eq!(step.status, Status::complete("stack destroyed"));
    }
    assert!(!provider.contains("dev-vpc"));
}

#[tokio::test]
async fn test_destroy_skips_missing_and_reports_failures() {
    let provider = provider();
    provider.insert_stack(existing("dev-vpc", StackState::CreateComplete, None));
    provider.fail("dev-vpc", Operation::Destroy);
    let ctx = context(&provider);

    let report = DestroyAction::new(ctx)
        .execute(NONE, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, PlanOutcome::Failed);
    assert_eq!(
        report.status_of("dev-db"),
        Some(&Status::skipped("does not exist in cloudformation"))
    );
    assert_eq!(report.status_of("dev-vpc"), Some(&Status::failed("DELETE_FAILED")));
}

#[tokio::test]
async fn test_unknown_target_fails_before_any_call() {
    let provider = provider();
    let ctx = context(&provider);
    let err = BuildAction::new(ctx)
        .run(Some(&["cache"][..]), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cache"));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_graph_action_renders_without_calls() {
    let provider = provider();
    let ctx = context(&provider);

    let json = GraphAction::new(ctx.clone())
        .with_format(GraphFormat::Json)
        .with_reduce(true)
        .run(NONE)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["dev-db"], serde_json::json!(["dev-bastion"]));
    assert_eq!(value["dev-vpc"], serde_json::json!([]));

    let dot = GraphAction::new(ctx).run(NONE).unwrap();
    assert!(dot.starts_with("digraph"));
    assert!(provider.calls().is_empty());
}

#[test]
fn test_execution_config_drives_walker() {
    let config = StackerConfig::from_yaml_str(CONFIG).unwrap();
    assert_eq!(config.execution.walker().limit(), Some(2));
    let unlimited = ExecutionConfig {
        max_parallel: Some(0),
        ..ExecutionConfig::default()
    };
    assert_eq!(unlimited.walker().limit(), None);
}
