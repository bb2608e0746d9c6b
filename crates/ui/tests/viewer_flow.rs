#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use provdash_api::MockApi;
use provdash_core::{Instance, PlaybookResult, PlaybookStatus};
use provdash_ui::{Dashboard, OverlayId, UiIntent, ViewerPhase};

fn playbook(name: &str, status: PlaybookStatus) -> PlaybookResult {
    PlaybookResult {
        name: name.to_string(),
        status,
        ..Default::default()
    }
}

fn web01(results: Vec<PlaybookResult>) -> Instance {
    Instance {
        instance_id: "web-01".to_string(),
        playbook_results: results,
        ..Default::default()
    }
}

fn dashboard(mock: MockApi) -> (Arc<MockApi>, Dashboard) {
    let api = Arc::new(mock);
    let dash = Dashboard::new(api.clone(), Duration::from_secs(5));
    (api, dash)
}

async fn open_and_settle(dash: &mut Dashboard, id: &str) {
    dash.dispatch(UiIntent::ShowLogs(id.to_string()));
    dash.viewer
        .task
        .take()
        .expect("open should spawn a task")
        .await
        .expect("open task should not panic");
    dash.pump();
}

#[tokio::test]
async fn opens_tabs_in_reported_order_with_fallback_probing() {
    let mut mock = MockApi::new();
    mock.details.insert(
        "web-01".into(),
        web01(vec![
            playbook("deploy", PlaybookStatus::Success),
            playbook("cleanup", PlaybookStatus::Failed),
        ]),
    );
    // Only the bare (extensionless) resource exists for "deploy"; nothing
    // exists for "cleanup" under any suffix.
    mock.logs
        .insert("web-01/deploy".into(), "TASK [deploy] ok".into());
    let (api, mut dash) = dashboard(mock);

    open_and_settle(&mut dash, "web-01").await;

    assert_eq!(dash.viewer.phase(), ViewerPhase::Open);
    let tabs = dash.viewer.tabs();
    assert_eq!(tabs.len(), 2);
    assert_eq!(tabs[0].playbook, "deploy");
    assert_eq!(tabs[1].playbook, "cleanup");
    assert_eq!(tabs[0].content, "TASK [deploy] ok");
    assert!(!tabs[0].error);

    // The probe walked .log, then .txt, then bare, and stopped there.
    let calls = api.calls();
    let probes: Vec<&String> = calls
        .iter()
        .filter(|c| c.starts_with("log:web-01/deploy"))
        .collect();
    assert_eq!(
        probes,
        vec!["log:web-01/deploy.log", "log:web-01/deploy.txt", "log:web-01/deploy"]
    );

    // Every probe missed for "cleanup", so its tab holds a synthesized
    // summary that still names the recorded status.
    assert!(!tabs[1].content.is_empty());
    assert!(tabs[1].content.contains("Status: failed"));
    assert!(!tabs[1].error);

    // Viewer is up with the first tab active.
    assert_eq!(dash.overlay.visible(), Some(OverlayId::LogViewer));
    assert_eq!(dash.viewer.title(), "Logs: web-01 - deploy");
}

#[tokio::test]
async fn activation_and_close_lifecycle() {
    let mut mock = MockApi::new();
    mock.details.insert(
        "web-01".into(),
        web01(vec![
            playbook("deploy", PlaybookStatus::Success),
            playbook("cleanup", PlaybookStatus::Success),
        ]),
    );
    let (_api, mut dash) = dashboard(mock);
    open_and_settle(&mut dash, "web-01").await;

    let first = dash.viewer.tabs()[0].id;
    let second = dash.viewer.tabs()[1].id;

    dash.dispatch(UiIntent::ActivateTab(second));
    assert_eq!(dash.viewer.active(), Some(second));
    assert_eq!(dash.viewer.title(), "Logs: web-01 - cleanup");

    // Unknown ids are a no-op.
    dash.dispatch(UiIntent::ActivateTab(uuid::Uuid::new_v4()));
    assert_eq!(dash.viewer.active(), Some(second));

    // Closing the active tab promotes the first remaining one.
    dash.dispatch(UiIntent::CloseTab(second));
    assert_eq!(dash.viewer.active(), Some(first));
    assert_eq!(dash.viewer.title(), "Logs: web-01 - deploy");
    assert_eq!(dash.viewer.tabs().len(), 1);

    // Closing the last tab closes the viewer and drops the overlay.
    dash.dispatch(UiIntent::CloseTab(first));
    assert_eq!(dash.viewer.phase(), ViewerPhase::Closed);
    assert_eq!(dash.viewer.tabs().len(), 0);
    assert_eq!(dash.overlay.visible(), None);
}

#[tokio::test]
async fn all_probes_failing_hard_flags_the_tab() {
    let mut mock = MockApi::new();
    mock.details
        .insert("web-01".into(), web01(vec![playbook("deploy", PlaybookStatus::Timeout)]));
    let (api, mut dash) = dashboard(mock);
    api.fail_on("log:web-01/deploy.log");
    api.fail_on("log:web-01/deploy.txt");
    api.fail_on("log:web-01/deploy");

    open_and_settle(&mut dash, "web-01").await;

    let tabs = dash.viewer.tabs();
    assert_eq!(tabs.len(), 1);
    assert!(tabs[0].error);
    assert!(tabs[0].content.contains("Status: timeout"));
    // Flagged tabs stay part of the normal lifecycle.
    let id = tabs[0].id;
    dash.dispatch(UiIntent::ActivateTab(id));
    assert_eq!(dash.viewer.active(), Some(id));
}

#[tokio::test]
async fn detail_failure_leaves_viewer_closed() {
    let mock = MockApi::new();
    let (api, mut dash) = dashboard(mock);
    api.fail_on("instance:web-01");

    open_and_settle(&mut dash, "web-01").await;

    assert_eq!(dash.viewer.phase(), ViewerPhase::Closed);
    assert_eq!(dash.viewer.tabs().len(), 0);
    assert_eq!(dash.overlay.visible(), None);
    assert!(dash.last_message.is_some());
}

#[tokio::test]
async fn instance_without_results_aborts_with_message() {
    let mut mock = MockApi::new();
    mock.details.insert("web-01".into(), web01(Vec::new()));
    let (_api, mut dash) = dashboard(mock);

    open_and_settle(&mut dash, "web-01").await;

    assert_eq!(dash.viewer.phase(), ViewerPhase::Closed);
    assert_eq!(
        dash.last_message.as_deref(),
        Some("No playbook results found for web-01")
    );
}

#[tokio::test]
async fn show_details_raises_the_details_overlay() {
    let mut mock = MockApi::new();
    mock.details.insert("web-01".into(), web01(Vec::new()));
    let (_api, mut dash) = dashboard(mock);

    dash.dispatch(UiIntent::ShowDetails("web-01".into()));
    dash.detail_task.take().unwrap().await.unwrap();
    dash.pump();

    assert_eq!(dash.overlay.visible(), Some(OverlayId::Details));
    assert_eq!(dash.detail.as_ref().unwrap().instance_id, "web-01");

    dash.dispatch(UiIntent::CloseOverlays);
    assert_eq!(dash.overlay.visible(), None);
}

#[tokio::test]
async fn results_from_a_closed_session_are_dropped() {
    let mut mock = MockApi::new();
    mock.details
        .insert("web-01".into(), web01(vec![playbook("deploy", PlaybookStatus::Success)]));
    let (_api, mut dash) = dashboard(mock);

    dash.dispatch(UiIntent::ShowLogs("web-01".to_string()));
    let task = dash.viewer.task.take().expect("open should spawn a task");
    // Operator closes everything while the fetch is still in flight.
    dash.dispatch(UiIntent::CloseOverlays);
    task.await.expect("open task should not panic");
    dash.pump();

    assert_eq!(dash.viewer.phase(), ViewerPhase::Closed);
    assert_eq!(dash.viewer.tabs().len(), 0);
    assert_eq!(dash.overlay.visible(), None);
}
