//! Behaviour of the lifecycle steps against scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::cancel::{CancelSignal, cancellation};
use crate::error::BuildError;
use crate::poll::PollWaiter;
use crate::remote::CommConfig;
use crate::runner::{Step, StepAction, StepContext, StepRunner};
use crate::state::BuildState;
use crate::test_support::{
    Operation, ProviderCall, RecordingUi, SNAPSHOT_SLUG, ScriptedProvider, ScriptedRunner,
};


const INTERVAL: Duration = Duration::from_secs(10);
const TIMEOUT: Duration = Duration::from_secs(35);

pub(super) struct Harness {
    pub provider: Arc<ScriptedProvider>,
    pub runner: ScriptedRunner,
    pub ui: RecordingUi,
    pub ctx: StepContext,
    pub keys: TempDir,
}

impl Harness {
    pub fn shell(&self) -> SharedShell<ScriptedRunner> {
        Arc::new(
            RemoteShell::new(CommConfig::default(), self.runner.clone())
                .expect("default comm config validates"),
        )
    }

    pub fn key_directory(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.keys.path().to_path_buf()).expect("utf8 temp dir")
    }

    pub fn instance_step(&self, settings: InstanceSettings) -> CreateInstanceStep<ScriptedProvider> {
        CreateInstanceStep::new(
            Arc::clone(&self.provider),
            settings,
            PollWaiter::new(INTERVAL, TIMEOUT),
        )
    }
}

#[fixture]
pub(super) fn harness() -> Harness {
    let ui = RecordingUi::new();
    Harness {
        provider: Arc::new(ScriptedProvider::new()),
        runner: ScriptedRunner::new(),
        ctx: StepContext::new(Arc::new(ui.clone()), CancelSignal::never()),
        ui,
        keys: TempDir::new().expect("temp dir"),
    }
}

pub(super) fn settings() -> InstanceSettings {
    InstanceSettings {
        location_slug: String::from("MIA1"),
        plan_slug: String::from("1vcpu-1gb-10ssd"),
        image_slug: String::from("ubuntu-24.04-x86_64"),
        password_length: 16,
        ..InstanceSettings::default()
    }
}

fn connected_state() -> BuildState {
    BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        instance_identifier: Some(String::from("inst-123")),
        instance_ip: Some(String::from("203.0.113.5")),
        ..BuildState::default()
    }
}

// CreateSshKey

#[rstest]
#[tokio::test]
async fn existing_ssh_key_is_used_and_never_deleted(harness: Harness) {
    let mut step = CreateSshKeyStep::new(
        Arc::clone(&harness.provider),
        Some(String::from("my-key")),
        harness.key_directory(),
    );
    let mut state = BuildState::new();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);
    step.cleanup(&state, &harness.ctx).await;

    assert_eq!(state.ssh_key_slug.as_deref(), Some("my-key"));
    assert!(state.private_key_path.is_none());
    assert!(harness.provider.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn generated_ssh_key_is_deleted_exactly_once(harness: Harness) {
    let mut step = CreateSshKeyStep::new(
        Arc::clone(&harness.provider),
        None,
        harness.key_directory(),
    );
    let mut state = BuildState::new();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);
    let key_path = state.private_key_path.clone().expect("key file recorded");
    assert!(key_path.starts_with(harness.key_directory()));
    let written = std::fs::read_to_string(&key_path).expect("key file readable");
    assert_eq!(Some(written.as_str()), state.private_key.as_deref());
    assert_eq!(state.ssh_key_slug.as_deref(), Some("key-1"));
    assert!(state.public_key.is_some());

    step.cleanup(&state, &harness.ctx).await;
    step.cleanup(&state, &harness.ctx).await;

    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::DeleteSshKey(slug) if slug == "key-1")),
        1
    );
    assert!(!key_path.exists(), "temporary key file should be removed");
}

#[rstest]
#[tokio::test]
async fn ssh_key_title_carries_a_timestamp(harness: Harness) {
    let mut step = CreateSshKeyStep::new(
        Arc::clone(&harness.provider),
        None,
        harness.key_directory(),
    );
    let mut state = BuildState::new();

    step.run(&mut state, &harness.ctx).await;

    let calls = harness.provider.calls();
    let Some(ProviderCall::CreateSshKey { title }) = calls.first() else {
        panic!("expected a key creation call, got {calls:?}");
    };
    let stamp = title
        .strip_prefix("letsbake-ssh-key-")
        .expect("title prefix");
    assert!(stamp.parse::<i64>().is_ok(), "title {title}");
}

#[rstest]
#[tokio::test]
async fn failed_key_deletion_is_reported_not_raised(harness: Harness) {
    harness.provider.fail(Operation::DeleteSshKey);
    let mut step = CreateSshKeyStep::new(
        Arc::clone(&harness.provider),
        None,
        harness.key_directory(),
    );
    let mut state = BuildState::new();

    step.run(&mut state, &harness.ctx).await;
    let key_path = state.private_key_path.clone().expect("key file recorded");
    step.cleanup(&state, &harness.ctx).await;

    let errors = harness.ui.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors.iter().all(|e| e.contains("Please delete it manually")));
    assert!(!key_path.exists());
    assert!(!state.has_error());
}

#[rstest]
#[tokio::test]
async fn key_creation_failure_halts_and_cleans_nothing(harness: Harness) {
    harness.provider.fail(Operation::CreateSshKey);
    let mut step = CreateSshKeyStep::new(
        Arc::clone(&harness.provider),
        None,
        harness.key_directory(),
    );
    let mut state = BuildState::new();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);
    step.cleanup(&state, &harness.ctx).await;

    assert!(matches!(state.error, Some(BuildError::Provider { .. })));
    assert_eq!(harness.provider.mutating_calls().len(), 1);
}

// CreateInstance

#[rstest]
#[tokio::test(start_paused = true)]
async fn instance_becomes_ready_after_building(harness: Harness) {
    harness
        .provider
        .echo_created_instance("inst-123", Some("203.0.113.5"), 3);
    let mut step = harness.instance_step(settings());
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);

    assert_eq!(state.instance_identifier.as_deref(), Some("inst-123"));
    assert_eq!(state.instance_ip.as_deref(), Some("203.0.113.5"));
    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::ListInstances)),
        3
    );

    let requests = harness.provider.requests();
    let request = requests.first().expect("one creation request");
    assert!(request.label.starts_with("letsbake-"), "{}", request.label);
    assert!(request.hostname.starts_with("letsbake-"), "{}", request.hostname);
    assert_eq!(request.ssh_slug, "key-1");
    assert_eq!(request.password.chars().count(), 16);
    assert_eq!(state.generated_password.as_deref(), Some(request.password.as_str()));
    assert!(!harness.ui.transcript().contains(&request.password));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn configured_label_and_hostname_are_used(harness: Harness) {
    harness
        .provider
        .echo_created_instance("inst-123", Some("203.0.113.5"), 1);
    let mut step = harness.instance_step(InstanceSettings {
        label: Some(String::from("golden")),
        hostname: Some(String::from("builder.example.com")),
        ..settings()
    });
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };

    step.run(&mut state, &harness.ctx).await;

    let requests = harness.provider.requests();
    let request = requests.first().expect("one creation request");
    assert!(request.label.starts_with("golden-"), "{}", request.label);
    assert_eq!(request.hostname, "builder.example.com");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn listing_error_is_fatal_immediately(harness: Harness) {
    harness.provider.push_listing_error("service unavailable");
    harness
        .provider
        .echo_created_instance("inst-123", Some("203.0.113.5"), 1);
    let mut step = harness.instance_step(settings());
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);
    step.cleanup(&state, &harness.ctx).await;

    let Some(BuildError::Provider { action, .. }) = &state.error else {
        panic!("expected a provider error, got {:?}", state.error);
    };
    assert_eq!(action, "list instances");
    // One failed poll, then one lookup so the instance can be destroyed.
    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::ListInstances)),
        2
    );
    assert!(state.generated_password.is_some());
    assert_eq!(
        harness.provider.mutating_calls().last(),
        Some(&ProviderCall::DeleteInstance(String::from("inst-123")))
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn instance_still_building_at_timeout_is_destroyed(harness: Harness) {
    harness
        .provider
        .echo_created_instance("inst-123", Some("203.0.113.5"), 100);
    let mut step = harness.instance_step(settings());
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);
    step.cleanup(&state, &harness.ctx).await;

    assert!(matches!(state.error, Some(BuildError::Timeout { .. })));
    assert_eq!(state.instance_identifier.as_deref(), Some("inst-123"));
    assert!(state.instance_ip.is_none());
    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::DeleteInstance(id) if id == "inst-123")),
        1
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn instance_wait_cancelled_midway_is_destroyed(harness: Harness) {
    harness
        .provider
        .echo_created_instance("inst-123", Some("203.0.113.5"), 100);
    let (trigger, signal) = cancellation();
    let ctx = StepContext::new(Arc::new(harness.ui.clone()), signal);
    let mut step = harness.instance_step(settings());
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    assert_eq!(step.run(&mut state, &ctx).await, StepAction::Halt);
    step.cleanup(&state, &ctx).await;

    assert!(matches!(state.error, Some(BuildError::Cancelled)));
    assert_eq!(
        harness.provider.mutating_calls(),
        [
            ProviderCall::CreateInstance {
                label: harness
                    .provider
                    .requests()
                    .first()
                    .map(|request| request.label.clone())
                    .expect("one creation request"),
            },
            ProviderCall::DeleteInstance(String::from("inst-123")),
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_lookup_after_wait_keeps_the_original_error(harness: Harness) {
    harness.provider.push_listing_error("service unavailable");
    harness.provider.push_listing_error("still unavailable");
    let mut step = harness.instance_step(settings());
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);
    step.cleanup(&state, &harness.ctx).await;

    let message = state.error.as_ref().map(ToString::to_string).unwrap_or_default();
    assert!(message.contains("service unavailable"), "{message}");
    assert!(state.instance_identifier.is_none());
    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::DeleteInstance(_))),
        0
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn instance_wait_times_out_with_the_resource_named(harness: Harness) {
    let mut step = harness.instance_step(settings());
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);

    let Some(BuildError::Timeout { resource, elapsed }) = &state.error else {
        panic!("expected a timeout, got {:?}", state.error);
    };
    assert!(resource.starts_with("instance letsbake-"), "{resource}");
    assert!(*elapsed >= TIMEOUT);
    let message = harness.ui.errors().join("\n");
    assert!(message.contains("timed out after 35s waiting for instance"), "{message}");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn instance_without_address_halts_but_is_destroyed(harness: Harness) {
    harness.provider.echo_created_instance("inst-123", None, 1);
    let mut step = harness.instance_step(settings());
    let mut state = BuildState {
        ssh_key_slug: Some(String::from("key-1")),
        ..BuildState::default()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);
    step.cleanup(&state, &harness.ctx).await;

    assert!(state.instance_ip.is_none());
    assert_eq!(
        state.error.as_ref().map(ToString::to_string).as_deref(),
        Some("failed to read instance address: instance inst-123 has no IP address")
    );
    assert_eq!(
        harness.provider.mutating_calls().last(),
        Some(&ProviderCall::DeleteInstance(String::from("inst-123")))
    );
}

#[rstest]
#[tokio::test]
async fn instance_creation_requires_an_ssh_key(harness: Harness) {
    let mut step = harness.instance_step(settings());
    let mut state = BuildState::new();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);

    assert!(matches!(
        state.error,
        Some(BuildError::MissingState { key: "ssh_key_slug" })
    ));
    assert!(harness.provider.calls().is_empty());
}

#[rstest]
#[case::deleted(false, 1)]
#[case::kept(true, 0)]
#[tokio::test]
async fn instance_cleanup_honours_keep_instance(
    harness: Harness,
    #[case] keep_instance: bool,
    #[case] deletions: usize,
) {
    let mut step = harness.instance_step(InstanceSettings {
        keep_instance,
        ..settings()
    });

    step.cleanup(&connected_state(), &harness.ctx).await;

    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::DeleteInstance(id) if id == "inst-123")),
        deletions
    );
}

#[rstest]
#[tokio::test]
async fn failed_instance_deletion_is_reported(harness: Harness) {
    harness.provider.fail(Operation::DeleteInstance);
    let mut step = harness.instance_step(settings());

    step.cleanup(&connected_state(), &harness.ctx).await;

    let errors = harness.ui.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors.iter().all(|e| e.starts_with("Error destroying instance inst-123")));
}

// Connect

#[rstest]
#[tokio::test(start_paused = true)]
async fn connect_retries_until_ssh_accepts_logins(harness: Harness) {
    harness.runner.push_failure(255);
    harness.runner.push_failure(255);
    harness.runner.push_success();
    let mut step = ConnectStep::new(harness.shell(), PollWaiter::new(INTERVAL, TIMEOUT));
    let mut state = BuildState {
        private_key_path: Some(Utf8PathBuf::from("/tmp/letsbake-key-1.pem")),
        ..connected_state()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);

    let invocations = harness.runner.invocations();
    assert_eq!(invocations.len(), 3);
    assert!(invocations.iter().all(|invocation| {
        let command = invocation.command_string();
        command.contains("-i /tmp/letsbake-key-1.pem") && command.ends_with("root@203.0.113.5 true")
    }));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn connect_times_out_when_ssh_never_answers(harness: Harness) {
    harness.runner.push_failure(255);
    harness.runner.push_failure(255);
    harness.runner.push_failure(255);
    let mut step = ConnectStep::new(harness.shell(), PollWaiter::new(INTERVAL, TIMEOUT));
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);

    assert!(matches!(
        state.error,
        Some(BuildError::Timeout { ref resource, .. }) if resource == "SSH on 203.0.113.5"
    ));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn connect_fails_fast_when_ssh_cannot_start(harness: Harness) {
    let mut step = ConnectStep::new(harness.shell(), PollWaiter::new(INTERVAL, TIMEOUT));
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);

    assert!(matches!(state.error, Some(BuildError::Remote { .. })));
    assert_eq!(harness.runner.invocations().len(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn connect_gives_up_on_a_hung_ssh_client_at_the_deadline(harness: Harness) {
    harness.runner.stall_for(Duration::from_secs(300));
    harness.runner.succeed_when_empty();
    let mut step = ConnectStep::new(harness.shell(), PollWaiter::new(INTERVAL, TIMEOUT));
    let mut state = connected_state();
    let started = tokio::time::Instant::now();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);

    let elapsed = started.elapsed();
    assert!(elapsed < TIMEOUT + Duration::from_secs(1), "waited {elapsed:?}");
    assert!(matches!(state.error, Some(BuildError::Timeout { .. })));
    assert_eq!(harness.runner.invocations().len(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn connect_stops_waiting_on_a_hung_ssh_client_when_cancelled(harness: Harness) {
    harness.runner.stall_for(Duration::from_secs(300));
    harness.runner.succeed_when_empty();
    let (trigger, signal) = cancellation();
    let ctx = StepContext::new(Arc::new(harness.ui.clone()), signal);
    let mut step = ConnectStep::new(harness.shell(), PollWaiter::new(INTERVAL, TIMEOUT));
    let mut state = connected_state();
    let started = tokio::time::Instant::now();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    assert_eq!(step.run(&mut state, &ctx).await, StepAction::Halt);

    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_secs(16), "waited {elapsed:?}");
    assert!(matches!(state.error, Some(BuildError::Cancelled)));
}

// Provision

#[rstest]
#[tokio::test]
async fn provision_runs_commands_then_scripts_in_order(harness: Harness) {
    harness.runner.succeed_when_empty();
    let script = harness.keys.path().join("setup.sh");
    std::fs::write(&script, "echo baked > /etc/motd\n").expect("write script");
    let provisioners = Provisioners {
        commands: vec![String::from("apt-get update"), String::from("apt-get -y upgrade")],
        scripts: vec![Utf8PathBuf::from_path_buf(script).expect("utf8 script path")],
    };
    let mut step = ProvisionStep::new(harness.shell(), provisioners);
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);

    assert_eq!(
        harness.runner.remote_commands(),
        [
            "apt-get update",
            "apt-get -y upgrade",
            "sh -c 'echo baked > /etc/motd\n'",
        ]
    );
}

#[rstest]
#[tokio::test]
async fn provision_failure_halts_remaining_commands(harness: Harness) {
    harness.runner.push_failure(100);
    let provisioners = Provisioners {
        commands: vec![String::from("apt-get update"), String::from("reboot")],
        scripts: Vec::new(),
    };
    let mut step = ProvisionStep::new(harness.shell(), provisioners);
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);

    assert_eq!(harness.runner.remote_commands(), ["apt-get update"]);
    let message = state.error.as_ref().map(ToString::to_string).unwrap_or_default();
    assert!(message.contains("exited with status 100"), "{message}");
}

#[rstest]
#[tokio::test]
async fn provision_observes_cancellation(harness: Harness) {
    harness.runner.succeed_when_empty();
    let (trigger, signal) = cancellation();
    trigger.cancel();
    let ctx = StepContext::new(Arc::new(harness.ui.clone()), signal);
    let mut step = ProvisionStep::new(
        harness.shell(),
        Provisioners {
            commands: vec![String::from("apt-get update")],
            scripts: Vec::new(),
        },
    );
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &ctx).await, StepAction::Halt);

    assert!(matches!(state.error, Some(BuildError::Cancelled)));
    assert!(harness.runner.invocations().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn provision_abandons_a_running_command_when_cancelled(harness: Harness) {
    harness.runner.stall_for(Duration::from_secs(600));
    harness.runner.succeed_when_empty();
    let (trigger, signal) = cancellation();
    let ctx = StepContext::new(Arc::new(harness.ui.clone()), signal);
    let mut step = ProvisionStep::new(
        harness.shell(),
        Provisioners {
            commands: vec![String::from("apt-get -y upgrade"), String::from("reboot")],
            scripts: Vec::new(),
        },
    );
    let mut state = connected_state();
    let started = tokio::time::Instant::now();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    assert_eq!(step.run(&mut state, &ctx).await, StepAction::Halt);

    assert!(started.elapsed() < Duration::from_secs(6));
    assert!(matches!(state.error, Some(BuildError::Cancelled)));
    assert_eq!(harness.runner.remote_commands(), ["apt-get -y upgrade"]);
}

// CleanupTempKeys

#[rstest]
#[case::disabled(false, Some("ssh-ed25519 AAAAC3Nz letsbake"), 0)]
#[case::user_supplied_key(true, None, 0)]
#[case::generated_key(true, Some("ssh-ed25519 AAAAC3Nz letsbake"), 1)]
#[tokio::test]
async fn authorized_key_cleanup_only_touches_generated_keys(
    harness: Harness,
    #[case] enabled: bool,
    #[case] public_key: Option<&str>,
    #[case] expected_runs: usize,
) {
    harness.runner.succeed_when_empty();
    let mut step = CleanupTempKeysStep::new(harness.shell(), enabled);
    let mut state = BuildState {
        public_key: public_key.map(str::to_owned),
        ..connected_state()
    };

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);

    let commands = harness.runner.remote_commands();
    assert_eq!(commands.len(), expected_runs);
    assert!(commands.iter().all(|c| c.contains("grep -vF -- 'ssh-ed25519 AAAAC3Nz'")));
}

// Shutdown

#[rstest]
#[tokio::test]
async fn shutdown_without_instance_does_nothing(harness: Harness) {
    let mut step = ShutdownStep::new(Arc::clone(&harness.provider));
    let mut state = BuildState::new();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);
    assert!(harness.provider.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn shutdown_raises_the_timeout_then_powers_off(harness: Harness) {
    let mut step = ShutdownStep::new(Arc::clone(&harness.provider));
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);

    assert_eq!(
        harness.provider.calls(),
        [
            ProviderCall::SetRequestTimeout(REQUEST_TIMEOUT),
            ProviderCall::PowerOff(String::from("inst-123")),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn timeout_change_failure_is_reported_and_shutdown_continues(harness: Harness) {
    harness.provider.fail(Operation::SetRequestTimeout);
    let mut step = ShutdownStep::new(Arc::clone(&harness.provider));
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);

    assert_eq!(harness.ui.errors().len(), 1);
    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::PowerOff(_))),
        1
    );
}

#[rstest]
#[tokio::test]
async fn power_off_failure_halts(harness: Harness) {
    harness.provider.fail(Operation::PowerOff);
    let mut step = ShutdownStep::new(Arc::clone(&harness.provider));
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);
    assert!(matches!(
        state.error,
        Some(BuildError::Provider { ref action, .. }) if action == "power off instance"
    ));
}

// Snapshot

#[rstest]
#[tokio::test(start_paused = true)]
async fn snapshot_query_errors_are_retried(harness: Harness) {
    harness.provider.push_snapshot_error("gateway timeout");
    harness.provider.push_snapshot(false);
    let mut step = SnapshotStep::new(
        Arc::clone(&harness.provider),
        None,
        PollWaiter::new(INTERVAL, TIMEOUT),
    );
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);

    assert_eq!(state.snapshot_slug.as_deref(), Some(SNAPSHOT_SLUG));
    let name = state.snapshot_name.as_deref().unwrap_or_default();
    assert!(name.starts_with("letsbake-snapshot-"), "{name}");
    assert_eq!(
        harness
            .provider
            .count(|call| matches!(call, ProviderCall::GetSnapshot(_))),
        3
    );
    assert_eq!(harness.ui.errors().len(), 1);
    assert!(harness.ui.transcript().contains(
        "Snapshot 'snap-1' creation has been queued. Waiting for it to finish..."
    ));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn snapshot_name_override_is_used_as_label(harness: Harness) {
    let mut step = SnapshotStep::new(
        Arc::clone(&harness.provider),
        Some(String::from("golden-image")),
        PollWaiter::new(INTERVAL, TIMEOUT),
    );
    let mut state = connected_state();

    step.run(&mut state, &harness.ctx).await;

    assert!(harness.provider.calls().contains(&ProviderCall::CreateSnapshot {
        label: String::from("golden-image"),
        instance: String::from("inst-123"),
    }));
    assert_eq!(state.snapshot_name.as_deref(), Some("golden-image"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn snapshot_that_never_builds_times_out(harness: Harness) {
    for _ in 0..5 {
        harness.provider.push_snapshot(false);
    }
    let mut step = SnapshotStep::new(
        Arc::clone(&harness.provider),
        None,
        PollWaiter::new(INTERVAL, TIMEOUT),
    );
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);

    assert!(matches!(
        state.error,
        Some(BuildError::Timeout { ref resource, .. }) if resource == "snapshot snap-1"
    ));
    assert!(state.snapshot_slug.is_none());
}

#[rstest]
#[tokio::test]
async fn snapshot_creation_failure_halts(harness: Harness) {
    harness.provider.fail(Operation::CreateSnapshot);
    let mut step = SnapshotStep::new(
        Arc::clone(&harness.provider),
        None,
        PollWaiter::new(INTERVAL, TIMEOUT),
    );
    let mut state = connected_state();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Halt);
    assert!(matches!(state.error, Some(BuildError::Provider { .. })));
}

#[rstest]
#[tokio::test]
async fn snapshot_without_instance_does_nothing(harness: Harness) {
    let mut step = SnapshotStep::new(
        Arc::clone(&harness.provider),
        None,
        PollWaiter::new(INTERVAL, TIMEOUT),
    );
    let mut state = BuildState::new();

    assert_eq!(step.run(&mut state, &harness.ctx).await, StepAction::Continue);
    assert!(harness.provider.calls().is_empty());
}

#[rstest]
fn runner_accepts_every_step_kind(harness: Harness) {
    let runner = StepRunner::new(vec![
        Box::new(CreateSshKeyStep::new(
            Arc::clone(&harness.provider),
            None,
            harness.key_directory(),
        )),
        Box::new(harness.instance_step(settings())),
        Box::new(ConnectStep::new(harness.shell(), PollWaiter::new(INTERVAL, TIMEOUT))),
        Box::new(ProvisionStep::new(harness.shell(), Provisioners::default())),
        Box::new(CleanupTempKeysStep::new(harness.shell(), true)),
        Box::new(ShutdownStep::new(Arc::clone(&harness.provider))),
        Box::new(SnapshotStep::new(
            Arc::clone(&harness.provider),
            None,
            PollWaiter::new(INTERVAL, TIMEOUT),
        )),
    ]);
    assert_eq!(runner.step_names().len(), 7);
}
