//! Integration tests for sessions, hop routing and fallback behavior,
//! driven through the scripted in-memory transport.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use waypoint::adapters::{ChannelScript, ConnectScript, ScriptedTransport};
use waypoint::domain::models::prompt::{JUMP_HOST_PROMPT, ORCHESTRATOR_PROMPT};
use waypoint::domain::models::{
    ActiveHop, ConnectionRoute, Credentials, Hop, SessionConfig, TargetKind, TransportKind,
};
use waypoint::domain::ports::{KeyProvisioner, ProvisionError, TransportError};
use waypoint::services::hop_router::WrongHopSignature;
use waypoint::services::{HopRouter, RemoteSession, SessionState};
use waypoint::SessionError;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ORCH_PROMPT_TEXT: &str = "[root@orch-1 ~]# ";
const JUMP_PROMPT_TEXT: &str = "admin@jump-1:~$ ";

fn orchestrator_hop() -> Hop {
    Hop::new(
        TargetKind::Orchestrator,
        "10.0.0.1",
        22,
        Credentials::new("root", "r00t"),
        ORCHESTRATOR_PROMPT,
    )
}

fn jump_hop() -> Hop {
    Hop::new(
        TargetKind::JumpHost,
        "10.0.0.2",
        22,
        Credentials::new("admin", "adm1n"),
        JUMP_HOST_PROMPT,
    )
}

fn shell_channel(prompt: &str, hostname: &str) -> ChannelScript {
    ChannelScript::with_prompt(prompt).respond("hostname", format!("{hostname}\n"), prompt)
}

fn session(target: TargetKind, transport: &ScriptedTransport) -> RemoteSession {
    RemoteSession::new(
        target,
        TransportKind::Ssh,
        Arc::new(transport.clone()),
        &SessionConfig::default(),
    )
}

struct RecordingProvisioner {
    outcome: Result<(), ()>,
    installs: Mutex<Vec<String>>,
}

impl RecordingProvisioner {
    fn succeeding() -> Self {
        Self {
            outcome: Ok(()),
            installs: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            outcome: Err(()),
            installs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl KeyProvisioner for RecordingProvisioner {
    async fn install_key(&self, hop: &Hop) -> Result<(), ProvisionError> {
        self.installs.lock().await.push(hop.address.clone());
        match self.outcome {
            Ok(()) => Ok(()),
            Err(()) => Err(ProvisionError::CommandFailed {
                address: hop.address.clone(),
                stderr: "helper exploded".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Plain connects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_learns_the_hostname_and_reaches_connected() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Succeed(shell_channel(ORCH_PROMPT_TEXT, "orch-1")));

    let mut session = session(TargetKind::Orchestrator, &transport);
    let mut router = HopRouter::new(TargetKind::Orchestrator, ConnectionRoute::new(orchestrator_hop()));
    router.establish(&mut session).await.unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.hostname(), Some("orch-1"));
    let attempts = transport.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].address, "10.0.0.1");
    assert_eq!(attempts[0].username, "root");
}

#[tokio::test]
async fn password_prompt_is_answered_during_negotiation() {
    let transport = ScriptedTransport::new();
    let script = ChannelScript::with_prompt("root's Password: ")
        .respond("r00t", "", ORCH_PROMPT_TEXT)
        .respond("hostname", "orch-1\n", ORCH_PROMPT_TEXT);
    transport.push(ConnectScript::Succeed(script));

    let mut session = session(TargetKind::Orchestrator, &transport);
    session.connect_hop(&orchestrator_hop()).await.unwrap();

    assert_eq!(session.hostname(), Some("orch-1"));
}

#[tokio::test]
async fn password_prompt_without_a_password_on_record_fails() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Succeed(ChannelScript::with_prompt("Password: ")));

    let mut hop = orchestrator_hop();
    hop.credentials = Credentials::passwordless("root");
    let mut session = session(TargetKind::Orchestrator, &transport);
    let err = session.connect_hop(&hop).await.unwrap_err();

    assert!(matches!(err, SessionError::MissingPassword(user) if user == "root"));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn one_shot_password_answers_a_single_prompt_then_is_discarded() {
    let transport = ScriptedTransport::new();
    // Only the freshly issued password moves the channel past the prompt.
    let script = ChannelScript::with_prompt("root's Password: ")
        .respond("fresh-pw", "", ORCH_PROMPT_TEXT)
        .respond("hostname", "orch-1\n", ORCH_PROMPT_TEXT);
    transport.push(ConnectScript::Succeed(script));
    transport.push(ConnectScript::Succeed(ChannelScript::with_prompt(
        "root's Password: ",
    )));

    let mut hop = orchestrator_hop();
    hop.credentials = Credentials::passwordless("root");
    let mut session = session(TargetKind::Orchestrator, &transport);
    session.set_next_password("fresh-pw");
    session.connect_hop(&hop).await.unwrap();
    assert_eq!(session.hostname(), Some("orch-1"));

    // The override was consumed; the reconnect falls back to the stored
    // credentials, which carry no password.
    let err = session.connect_hop(&hop).await.unwrap_err();
    assert!(matches!(err, SessionError::MissingPassword(user) if user == "root"));
}

#[tokio::test]
async fn negotiation_that_never_settles_errors_out() {
    let transport = ScriptedTransport::new();
    // The hop keeps asking for a password no matter what is typed.
    let script =
        ChannelScript::with_prompt("root's Password: ").respond("r00t", "", "root's Password: ");
    transport.push(ConnectScript::Succeed(script));

    let mut session = session(TargetKind::Orchestrator, &transport);
    let err = session.connect_hop(&orchestrator_hop()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::NegotiationStalled { rounds: 10, .. }
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Fallback routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connection_refused_on_primary_falls_back_exactly_once() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Fail(TransportError::ConnectionRefused {
        address: "10.0.0.1".to_string(),
        port: 22,
    }));
    transport.push(ConnectScript::Succeed(shell_channel(JUMP_PROMPT_TEXT, "jump-1")));

    let mut session = session(TargetKind::Orchestrator, &transport);
    let mut router = HopRouter::new(
        TargetKind::Orchestrator,
        ConnectionRoute::with_fallback(orchestrator_hop(), jump_hop()),
    );
    router.establish(&mut session).await.unwrap();

    assert_eq!(session.hostname(), Some("jump-1"));
    let attempts = transport.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].address, "10.0.0.2");
    assert_eq!(router.route().active(), ActiveHop::Fallback);
}

#[tokio::test]
async fn fallback_choice_is_sticky_for_reconnects() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Fail(TransportError::Timeout {
        address: "10.0.0.1".to_string(),
        port: 22,
    }));
    transport.push(ConnectScript::Succeed(shell_channel(JUMP_PROMPT_TEXT, "jump-1")));
    transport.push(ConnectScript::Succeed(shell_channel(JUMP_PROMPT_TEXT, "jump-1")));

    let mut session = session(TargetKind::Orchestrator, &transport);
    let mut router = HopRouter::new(
        TargetKind::Orchestrator,
        ConnectionRoute::with_fallback(orchestrator_hop(), jump_hop()),
    );
    router.establish(&mut session).await.unwrap();
    router.establish(&mut session).await.unwrap();

    // The reconnect goes straight to the fallback, no primary attempt.
    let attempts = transport.attempts();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[2].address, "10.0.0.2");
}

#[tokio::test]
async fn both_hops_failing_escalates_a_connection_error() {
    let transport = ScriptedTransport::new();
    for address in ["10.0.0.1", "10.0.0.2"] {
        transport.push(ConnectScript::Fail(TransportError::ConnectionRefused {
            address: address.to_string(),
            port: 22,
        }));
    }

    let mut session = session(TargetKind::Orchestrator, &transport);
    let mut router = HopRouter::new(
        TargetKind::Orchestrator,
        ConnectionRoute::with_fallback(orchestrator_hop(), jump_hop()),
    );
    let err = router.establish(&mut session).await.unwrap_err();

    match err {
        SessionError::Connection(connection) => {
            // The escalated error names the hop that failed last.
            assert_eq!(connection.address, "10.0.0.2");
            assert_eq!(connection.via, TargetKind::JumpHost);
            assert_eq!(connection.username, "admin");
            assert!(connection.cause.is_some());
        }
        other => panic!("expected a connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn fail_safe_disabled_never_touches_the_fallback() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Fail(TransportError::ConnectionRefused {
        address: "10.0.0.1".to_string(),
        port: 22,
    }));

    let mut session = session(TargetKind::Orchestrator, &transport);
    let mut router = HopRouter::new(
        TargetKind::Orchestrator,
        ConnectionRoute::with_fallback(orchestrator_hop(), jump_hop()),
    )
    .fail_safe(false);
    let err = router.establish(&mut session).await.unwrap_err();

    assert!(matches!(err, SessionError::Connection(_)));
    assert_eq!(transport.attempts().len(), 1);
}

#[tokio::test]
async fn escalation_reports_the_sessions_transport_kind() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Fail(TransportError::ConnectionRefused {
        address: "10.0.0.1".to_string(),
        port: 22,
    }));

    let mut session = RemoteSession::new(
        TargetKind::Orchestrator,
        TransportKind::Scp,
        Arc::new(transport.clone()),
        &SessionConfig::default(),
    );
    let mut router = HopRouter::new(
        TargetKind::Orchestrator,
        ConnectionRoute::new(orchestrator_hop()),
    )
    .fail_safe(false);
    let err = router.establish(&mut session).await.unwrap_err();

    match err {
        SessionError::Connection(connection) => {
            assert_eq!(connection.transport, TransportKind::Scp);
        }
        other => panic!("expected a connection error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Wrong-hop detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn landing_on_the_wrong_hops_prompt_is_a_hard_failure() {
    let transport = ScriptedTransport::new();
    // The channel opens fine but sits at the orchestrator's prompt instead
    // of a compute node's.
    transport.push(ConnectScript::Succeed(shell_channel(ORCH_PROMPT_TEXT, "orch-1")));

    let compute_hop = Hop::new(
        TargetKind::Compute,
        "192.168.0.7",
        22,
        Credentials::new("root", "r00t"),
        waypoint::domain::models::prompt::CONTROLLER_COMPUTE_PROMPT,
    );
    let mut session = session(TargetKind::Compute, &transport);
    let mut router = HopRouter::new(TargetKind::Compute, ConnectionRoute::new(compute_hop))
        .rejecting_prompt(WrongHopSignature {
            pattern: ORCHESTRATOR_PROMPT.to_string(),
            actual: TargetKind::Orchestrator,
        });
    let err = router.establish(&mut session).await.unwrap_err();

    match err {
        SessionError::WrongHop {
            actual, expected, ..
        } => {
            assert_eq!(actual, TargetKind::Orchestrator);
            assert_eq!(expected, TargetKind::Compute);
        }
        other => panic!("expected a wrong-hop error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Credential provisioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authentication_failure_provisions_and_retries_the_same_hop() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Fail(TransportError::AuthenticationFailed {
        address: "10.0.0.1".to_string(),
        port: 22,
        username: "root".to_string(),
    }));
    transport.push(ConnectScript::Succeed(shell_channel(ORCH_PROMPT_TEXT, "orch-1")));

    let provisioner = Arc::new(RecordingProvisioner::succeeding());
    let mut session = session(TargetKind::Orchestrator, &transport);
    let mut router = HopRouter::new(TargetKind::Orchestrator, ConnectionRoute::new(orchestrator_hop()))
        .with_provisioner(Arc::clone(&provisioner) as Arc<dyn KeyProvisioner>);
    router.establish(&mut session).await.unwrap();

    assert_eq!(session.hostname(), Some("orch-1"));
    let attempts = transport.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].address, attempts[1].address);
    assert_eq!(provisioner.installs.lock().await.as_slice(), ["10.0.0.1"]);
}

#[tokio::test]
async fn failing_provisioner_reraises_the_original_authentication_error() {
    let transport = ScriptedTransport::new();
    transport.push(ConnectScript::Fail(TransportError::AuthenticationFailed {
        address: "10.0.0.1".to_string(),
        port: 22,
        username: "root".to_string(),
    }));

    let provisioner = Arc::new(RecordingProvisioner::failing());
    let mut session = session(TargetKind::Orchestrator, &transport);
    let mut router = HopRouter::new(TargetKind::Orchestrator, ConnectionRoute::new(orchestrator_hop()))
        .with_provisioner(Arc::clone(&provisioner) as Arc<dyn KeyProvisioner>)
        .fail_safe(false);
    let err = router.establish(&mut session).await.unwrap_err();

    match err {
        SessionError::Connection(connection) => {
            assert!(matches!(
                connection.cause,
                Some(TransportError::AuthenticationFailed { .. })
            ));
        }
        other => panic!("expected the original authentication error, got {other:?}"),
    }
    assert_eq!(transport.attempts().len(), 1);
    assert_eq!(provisioner.installs.lock().await.len(), 1);
}

// ---------------------------------------------------------------------------
// Second-leg hops and established sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_leg_hops_onwards_inside_the_session() {
    let transport = ScriptedTransport::new();
    let script = ChannelScript::with_prompt(ORCH_PROMPT_TEXT)
        .respond("hostname", "orch-1\n", ORCH_PROMPT_TEXT)
        .respond("ssh -o ConnectTimeout=30 root@192.168.0.7", "", "root@compute-0-7:~# ")
        .respond("hostname", "compute-0-7\n", "root@compute-0-7:~# ");
    transport.push(ConnectScript::Succeed(script));

    let compute_leg = Hop::new(
        TargetKind::Compute,
        "192.168.0.7",
        22,
        Credentials::passwordless("root"),
        waypoint::domain::models::prompt::CONTROLLER_COMPUTE_PROMPT,
    );
    let mut session = session(TargetKind::Compute, &transport);
    let mut router = HopRouter::new(TargetKind::Compute, ConnectionRoute::new(orchestrator_hop()))
        .with_second_leg(compute_leg);
    router.establish(&mut session).await.unwrap();

    // One network connect; the second hop rides the same channel.
    assert_eq!(transport.attempts().len(), 1);
    assert_eq!(session.hostname(), Some("compute-0-7"));
}

#[tokio::test]
async fn second_leg_ssh_carries_the_configured_connect_timeout() {
    let transport = ScriptedTransport::new();
    // The scripted host only answers the ssh invocation that spells out the
    // configured ConnectTimeout.
    let script = ChannelScript::with_prompt(ORCH_PROMPT_TEXT)
        .respond("hostname", "orch-1\n", ORCH_PROMPT_TEXT)
        .respond(
            "ssh -o ConnectTimeout=5 root@192.168.0.7",
            "",
            "root@compute-0-7:~# ",
        )
        .respond("hostname", "compute-0-7\n", "root@compute-0-7:~# ");
    transport.push(ConnectScript::Succeed(script));

    let compute_leg = Hop::new(
        TargetKind::Compute,
        "192.168.0.7",
        22,
        Credentials::passwordless("root"),
        waypoint::domain::models::prompt::CONTROLLER_COMPUTE_PROMPT,
    );
    let config = SessionConfig {
        ssh_connect_timeout_secs: 5,
        ..SessionConfig::default()
    };
    let mut session = RemoteSession::new(
        TargetKind::Compute,
        TransportKind::Ssh,
        Arc::new(transport.clone()),
        &config,
    );
    let mut router = HopRouter::new(TargetKind::Compute, ConnectionRoute::new(orchestrator_hop()))
        .with_second_leg(compute_leg);
    router.establish(&mut session).await.unwrap();

    assert_eq!(session.hostname(), Some("compute-0-7"));
}

#[tokio::test]
async fn unreachable_second_leg_disconnects_and_escalates() {
    let transport = ScriptedTransport::new();
    let script = ChannelScript::with_prompt(ORCH_PROMPT_TEXT)
        .respond("hostname", "orch-1\n", ORCH_PROMPT_TEXT)
        .respond(
            "ssh -o ConnectTimeout=30 root@192.168.0.7",
            "ssh: connect to host 192.168.0.7: No route to host\n",
            ORCH_PROMPT_TEXT,
        );
    transport.push(ConnectScript::Succeed(script));

    let compute_leg = Hop::new(
        TargetKind::Compute,
        "192.168.0.7",
        22,
        Credentials::passwordless("root"),
        waypoint::domain::models::prompt::CONTROLLER_COMPUTE_PROMPT,
    );
    let mut session = session(TargetKind::Compute, &transport);
    let mut router = HopRouter::new(TargetKind::Compute, ConnectionRoute::new(orchestrator_hop()))
        .with_second_leg(compute_leg);
    let err = router.establish(&mut session).await.unwrap_err();

    match err {
        SessionError::Connection(connection) => {
            assert_eq!(connection.address, "192.168.0.7");
            assert_eq!(connection.via, TargetKind::Compute);
        }
        other => panic!("expected a connection error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn send_requires_a_connected_session() {
    let transport = ScriptedTransport::new();
    let mut session = session(TargetKind::Controller, &transport);
    let err = session.send("uptime").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected(TargetKind::Controller)));
}

#[tokio::test]
async fn send_strips_the_command_echo() {
    let transport = ScriptedTransport::new();
    let script = shell_channel(ORCH_PROMPT_TEXT, "orch-1")
        .respond("uptime", "uptime\n 17:03:41 up 12 days\n", ORCH_PROMPT_TEXT);
    transport.push(ConnectScript::Succeed(script));

    let mut session = session(TargetKind::Orchestrator, &transport);
    session.connect_hop(&orchestrator_hop()).await.unwrap();

    let output = session.send("uptime").await.unwrap();
    assert_eq!(output, " 17:03:41 up 12 days\n");
}
