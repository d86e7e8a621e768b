//! Runtime GC selection: which runtimes survive an app's removal.

use lightfold::cleaner::{orphaned_runtimes, required_runtimes, runtime_for_framework};
use lightfold::runtimes::Runtime;
use lightfold::server_state::{DeployedApp, ServerState};

fn server(apps: &[(&str, &str)], runtimes: &[Runtime]) -> ServerState {
    let mut state = ServerState::new("192.0.2.10", "linode");
    for (i, (name, framework)) in apps.iter().enumerate() {
        state.register_app(DeployedApp {
            target_name: (*name).to_string(),
            app_name: (*name).to_string(),
            port: 3000 + u16::try_from(i).unwrap(),
            domain: None,
            framework: (*framework).to_string(),
            last_deploy: None,
        });
    }
    for r in runtimes {
        state.add_runtime(*r);
    }
    state
}

#[test]
fn removing_the_last_python_app_orphans_python() {
    // `api` (Django) was just unregistered; `web` (Next.js) stays.
    let state = server(&[("web", "Next.js")], &[Runtime::Nodejs, Runtime::Python]);
    assert_eq!(orphaned_runtimes(&state), vec![Runtime::Python]);
}

#[test]
fn python_survives_while_a_second_python_app_remains() {
    let state = server(
        &[("web", "Next.js"), ("cron", "Flask")],
        &[Runtime::Nodejs, Runtime::Python],
    );
    assert!(orphaned_runtimes(&state).is_empty());
}

#[test]
fn required_set_follows_framework_mapping() {
    let state = server(
        &[("web", "Next.js"), ("api", "Django"), ("svc", "Dockerfile")],
        &[],
    );
    let required = required_runtimes(&state);
    assert!(required.contains(&Runtime::Nodejs));
    assert!(required.contains(&Runtime::Python));
    assert!(required.contains(&Runtime::Docker));
    assert_eq!(required.len(), 3);
}

#[test]
fn unknown_framework_blocks_all_removal() {
    let state = server(
        &[("mystery", "SomethingNew")],
        &[Runtime::Nodejs, Runtime::Go],
    );
    assert!(orphaned_runtimes(&state).is_empty());
}

#[test]
fn framework_to_runtime_table() {
    for (framework, runtime) in [
        ("Next.js", Runtime::Nodejs),
        ("Express", Runtime::Nodejs),
        ("Django", Runtime::Python),
        ("FastAPI", Runtime::Python),
        ("Go", Runtime::Go),
        ("Laravel", Runtime::Php),
        ("Rails", Runtime::Ruby),
        ("Spring", Runtime::Java),
        ("Dockerfile", Runtime::Docker),
    ] {
        assert_eq!(runtime_for_framework(framework), Some(runtime), "{framework}");
    }
}
