//! Engine-level tests against the in-memory gateway.
//!
//! Sessions are driven directly through `SyncEngine::handle`; every frame a
//! session would receive is read back from its outbox.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::Receiver;
use varia_collab::config::EngineConfig;
use varia_collab::protocol::{
    CellGeometryChanged, ClientEvent, ClientId, ProjectCreated, Relayed, ReplaceProject,
    ServerEvent, WorkspaceMember,
};
use varia_collab::{Frame, MemoryGateway, PersistenceGateway, SessionId, SyncEngine};
use varia_core::{GeometryPatch, Project};

struct TestClient {
    session: SessionId,
    rx: Receiver<Frame>,
}

impl TestClient {
    async fn connect(engine: &SyncEngine) -> Self {
        let session = SessionId::new();
        let rx = engine.connect(session).await;
        Self { session, rx }
    }

    async fn send(&self, engine: &SyncEngine, event: ClientEvent) {
        engine.handle(self.session, event).await;
    }

    async fn send_json(&self, engine: &SyncEngine, frame: Value) {
        let event = ClientEvent::decode(&frame.to_string()).unwrap();
        self.send(engine, event).await;
    }

    /// Everything queued so far.
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            events.push(ServerEvent::decode(&frame).unwrap());
        }
        events
    }
}

fn setup() -> (Arc<MemoryGateway>, SyncEngine) {
    setup_with(EngineConfig::default())
}

fn setup_with(config: EngineConfig) -> (Arc<MemoryGateway>, SyncEngine) {
    let gateway = Arc::new(MemoryGateway::new());
    let engine = SyncEngine::new(gateway.clone(), config);
    (gateway, engine)
}

fn join(client_id: ClientId, workspace_id: &str) -> ClientEvent {
    ClientEvent::JoinWorkspace(WorkspaceMember {
        client_id,
        workspace_id: workspace_id.into(),
    })
}

fn project_created(workspace_id: &str, client_id: ClientId, project: Project) -> ClientEvent {
    ClientEvent::ProjectCreated(
        Relayed::new(ProjectCreated {
            workspace_id: workspace_id.into(),
            client_id,
            project,
        })
        .unwrap(),
    )
}

/// p1 → pl1 → m1 holding cell c1.
fn sample_project() -> Project {
    serde_json::from_value(json!({
        "id": "p1",
        "name": "Smart home",
        "productLines": [{
            "id": "pl1",
            "name": "Home",
            "type": "System",
            "domain": "IoT",
            "domainEngineering": {
                "models": [{
                    "id": "m1",
                    "name": "Features",
                    "type": "Feature model",
                    "elements": [{
                        "id": "c1", "type": "Feature",
                        "x": 0.0, "y": 0.0, "width": 100.0, "height": 40.0,
                        "label": "Root", "style": "", "properties": []
                    }],
                    "relationships": []
                }],
                "relationships": [],
                "constraints": ""
            }
        }]
    }))
    .unwrap()
}

/// Two joined clients in `w1`, with `project` persisted for it.
async fn two_joined(
    gateway: &MemoryGateway,
    engine: &SyncEngine,
    project: Project,
) -> (TestClient, TestClient) {
    gateway.seed_project("w1", project).await;
    let mut a = TestClient::connect(engine).await;
    let mut b = TestClient::connect(engine).await;
    a.send(engine, join(ClientId::from("ana@example.com"), "w1")).await;
    b.send(engine, join(ClientId::from("bob@example.com"), "w1")).await;
    a.drain();
    b.drain();
    (a, b)
}

// ─── Join protocol ───────────────────────────────────────────────────

#[tokio::test]
async fn test_join_before_create() {
    let (gateway, engine) = setup();
    let mut a = TestClient::connect(&engine).await;

    a.send(&engine, join(ClientId::Guest(1), "w1")).await;

    assert_eq!(
        a.drain(),
        vec![ServerEvent::WorkspaceJoined(WorkspaceMember {
            client_id: ClientId::Guest(1),
            workspace_id: "w1".into(),
        })]
    );
    assert!(gateway.membership("w1", &ClientId::Guest(1)).await.is_some());
}

#[tokio::test]
async fn test_join_after_create() {
    let (gateway, engine) = setup();
    let mut a = TestClient::connect(&engine).await;
    let mut b = TestClient::connect(&engine).await;
    let ana = ClientId::from("ana@example.com");
    let bob = ClientId::from("bob@example.com");

    a.send(&engine, join(ana.clone(), "w1")).await;
    a.send(&engine, project_created("w1", ana, sample_project())).await;
    a.drain();

    b.send(&engine, join(bob.clone(), "w1")).await;

    assert_eq!(
        b.drain(),
        vec![
            ServerEvent::ReplaceProject(ReplaceProject {
                client_id: bob.clone(),
                workspace_id: "w1".into(),
                project: sample_project(),
            }),
            ServerEvent::WorkspaceJoined(WorkspaceMember {
                client_id: bob,
                workspace_id: "w1".into(),
            }),
        ]
    );
    assert!(a.drain().is_empty());
    assert_eq!(gateway.project("p1").await, Some(sample_project()));
}

#[tokio::test]
async fn test_join_falls_back_to_gateway() {
    let (gateway, engine) = setup();
    gateway.seed_project("w1", sample_project()).await;
    assert!(!engine.workspaces().contains("w1").await);

    let mut a = TestClient::connect(&engine).await;
    a.send(&engine, join(ClientId::Guest(7), "w1")).await;

    let events = a.drain();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], ServerEvent::ReplaceProject(r) if r.project.id == "p1"));
    assert!(engine.workspaces().contains("w1").await);
}

#[tokio::test]
async fn test_join_abandoned_when_membership_fails() {
    let (gateway, engine) = setup();
    gateway.set_unavailable(true);
    let mut a = TestClient::connect(&engine).await;

    a.send(&engine, join(ClientId::Guest(1), "w1")).await;

    assert!(a.drain().is_empty());
}

#[tokio::test]
async fn test_rejoin_does_not_duplicate_membership() {
    let (gateway, engine) = setup();
    let mut a = TestClient::connect(&engine).await;

    a.send(&engine, join(ClientId::Guest(1), "w1")).await;
    a.send(&engine, join(ClientId::Guest(1), "w1")).await;

    assert_eq!(a.drain().len(), 2);
    assert_eq!(gateway.stats().membership_inserts, 1);
    assert_eq!(engine.router().room_members("w1").await, vec![a.session]);
}

// ─── Edits ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cell_moved_echo_suppression() {
    let (gateway, engine) = setup();
    let (mut a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    let moved = Relayed::new(CellGeometryChanged {
        workspace_id: "w1".into(),
        project_id: "p1".into(),
        cell_id: "c1".into(),
        cell: GeometryPatch::position(10.0, 20.0),
    })
    .unwrap();
    a.send(&engine, ClientEvent::CellMoved(moved.clone())).await;

    assert!(a.drain().is_empty());
    assert_eq!(b.drain(), vec![ServerEvent::CellMoved(moved)]);

    let stored = gateway.project("p1").await.unwrap();
    let cell = stored.find_cell("c1").unwrap();
    assert_eq!((cell.x, cell.y), (10.0, 20.0));
    assert_eq!(cell.width, 100.0);
}

#[tokio::test]
async fn test_relay_is_original_payload() {
    let (gateway, engine) = setup();
    let (a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    let frame = json!({
        "event": "cellAdded",
        "data": {
            "workspaceId": "w1",
            "projectId": "p1",
            "modelId": "m1",
            "cells": [{
                "id": "c2", "type": "Feature", "x": 5.0, "y": 6.0,
                "width": 80.0, "height": 30.0, "label": "Camera",
                "style": "shape=rect", "properties": [],
                "selected": true
            }]
        }
    });
    a.send_json(&engine, frame.clone()).await;

    let relayed = b.drain();
    assert_eq!(relayed.len(), 1);
    assert_eq!(serde_json::to_value(&relayed[0]).unwrap(), frame);

    // The stored cell is normalized, the relay is not.
    let stored = gateway.project("p1").await.unwrap();
    assert!(stored.find_cell("c2").unwrap().extra.is_empty());
}

#[tokio::test]
async fn test_relay_keeps_unmodelled_fields() {
    let (gateway, engine) = setup();
    let (a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    let moved = json!({
        "event": "cellMoved",
        "data": {
            "workspaceId": "w1",
            "projectId": "p1",
            "clientId": "ana@example.com",
            "modelId": "m1",
            "cellId": "c1",
            "cell": { "id": "c1", "x": 10, "y": 20, "width": 100.0 }
        }
    });
    let renamed = json!({
        "event": "modelRenamed",
        "data": {
            "workspaceId": "w1",
            "projectId": "p1",
            "productLineId": "pl1",
            "modelId": "m1",
            "newName": "Devices",
            "clientId": "ana@example.com",
            "history": { "previous": "Features" }
        }
    });
    a.send_json(&engine, moved.clone()).await;
    a.send_json(&engine, renamed.clone()).await;

    let relayed: Vec<Value> = b
        .drain()
        .iter()
        .map(|event| serde_json::to_value(event).unwrap())
        .collect();
    assert_eq!(relayed, vec![moved, renamed]);

    let stored = gateway.project("p1").await.unwrap();
    let cell = stored.find_cell("c1").unwrap();
    assert_eq!((cell.x, cell.y), (10.0, 20.0));
    assert_eq!(stored.product_line("pl1").unwrap().model("m1").unwrap().name, "Devices");
}

#[tokio::test]
async fn test_null_fields_stored_as_empty() {
    let (gateway, engine) = setup();
    let (a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    a.send_json(
        &engine,
        json!({
            "event": "cellAdded",
            "data": {
                "workspaceId": "w1", "projectId": "p1", "modelId": "m1",
                "cells": [{
                    "id": "c2", "type": "Feature", "x": 5, "y": 6,
                    "width": 80, "height": 30,
                    "label": null, "style": null, "properties": null
                }]
            }
        }),
    )
    .await;
    a.send_json(
        &engine,
        json!({
            "event": "cellConnected",
            "data": {
                "workspaceId": "w1", "projectId": "p1", "modelId": "m1",
                "sourceId": "c1", "targetId": "c2",
                "properties": null, "style": null, "label": null
            }
        }),
    )
    .await;

    assert_eq!(b.drain().len(), 2);
    let stored = gateway.project("p1").await.unwrap();
    let cell = stored.find_cell("c2").unwrap();
    assert_eq!((cell.label.as_str(), cell.style.as_str()), ("", ""));
    assert!(cell.properties.is_empty());

    let edge = stored.find_edge("c1->c2").unwrap();
    assert_eq!((edge.label.as_str(), edge.style.as_str()), ("", ""));
    assert!(edge.properties.is_empty());
}

#[tokio::test]
async fn test_model_renamed_unknown_model() {
    let (gateway, engine) = setup();
    let (mut a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    a.send_json(
        &engine,
        json!({
            "event": "modelRenamed",
            "data": {
                "workspaceId": "w1",
                "projectId": "p1",
                "productLineId": "pl1",
                "modelId": "nope",
                "newName": "Renamed"
            }
        }),
    )
    .await;

    assert_eq!(gateway.stats().updates, 0);
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());
    assert_eq!(gateway.project("p1").await, Some(sample_project()));
}

#[tokio::test]
async fn test_edit_without_persisted_project() {
    let (gateway, engine) = setup();
    let mut a = TestClient::connect(&engine).await;
    let mut b = TestClient::connect(&engine).await;
    a.send(&engine, join(ClientId::Guest(1), "w1")).await;
    b.send(&engine, join(ClientId::Guest(2), "w1")).await;
    b.drain();

    a.send_json(
        &engine,
        json!({
            "event": "productLineCreated",
            "data": {
                "workspaceId": "w1",
                "projectId": "ghost",
                "productLine": { "id": "pl9", "name": "X", "type": "System", "domain": "D" }
            }
        }),
    )
    .await;

    assert!(b.drain().is_empty());
    assert_eq!(gateway.stats().updates, 0);
}

#[tokio::test]
async fn test_persistence_failure_abandons_edit() {
    let (gateway, engine) = setup();
    let (a, mut b) = two_joined(&gateway, &engine, sample_project()).await;
    gateway.set_unavailable(true);

    a.send_json(
        &engine,
        json!({
            "event": "edgeLabelChanged",
            "data": { "workspaceId": "w1", "projectId": "p1", "edgeId": "e1", "label": "x" }
        }),
    )
    .await;

    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn test_edit_sequence_persists_and_refreshes_cache() {
    let (gateway, engine) = setup();
    let (a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    let frames = [
        json!({ "event": "modelCreated", "data": {
            "workspaceId": "w1", "projectId": "p1", "productLineId": "pl1",
            "model": { "id": "m2", "name": "Components", "type": "Component model" } } }),
        json!({ "event": "cellAdded", "data": {
            "workspaceId": "w1", "projectId": "p1", "modelId": "m1",
            "cells": [{ "id": "c2", "type": "Feature", "label": "Lights" }] } }),
        json!({ "event": "cellConnected", "data": {
            "workspaceId": "w1", "projectId": "p1", "modelId": "m1",
            "sourceId": "c1", "targetId": "c2", "edgeId": "e1",
            "style": "dashed", "label": "mandatory", "properties": [] } }),
        json!({ "event": "edgeStyleChanged", "data": {
            "workspaceId": "w1", "projectId": "p1", "edgeId": "e1", "newStyle": "solid" } }),
        json!({ "event": "edgeLabelChanged", "data": {
            "workspaceId": "w1", "projectId": "p1", "edgeId": "e1", "label": "optional" } }),
        json!({ "event": "propertiesChanged", "data": {
            "workspaceId": "w1", "projectId": "p1", "cellId": "c2",
            "properties": [{ "name": "Selected", "value": "true" }] } }),
        json!({ "event": "cellResized", "data": {
            "workspaceId": "w1", "projectId": "p1", "cellId": "c2",
            "cell": { "width": 120.0, "height": 50.0 } } }),
        json!({ "event": "modelConfigured", "data": {
            "workspaceId": "w1", "projectId": "p1", "productLineId": "pl1",
            "modelId": "m2", "configuration": { "mode": "strict" } } }),
        json!({ "event": "modelRenamed", "data": {
            "workspaceId": "w1", "projectId": "p1", "productLineId": "pl1",
            "modelId": "m2", "newName": "Architecture" } }),
    ];
    for frame in &frames {
        a.send_json(&engine, frame.clone()).await;
    }
    assert_eq!(b.drain().len(), frames.len());

    let stored = gateway.project("p1").await.unwrap();
    let c2 = stored.find_cell("c2").unwrap();
    assert_eq!((c2.width, c2.height), (120.0, 50.0));
    assert_eq!(c2.properties, vec![json!({ "name": "Selected", "value": "true" })]);

    let edge = stored.find_edge("e1").unwrap();
    assert_eq!(edge.style, "solid");
    assert_eq!(edge.label, "optional");

    let m2 = stored.product_line("pl1").unwrap().model("m2").unwrap();
    assert_eq!(m2.name, "Architecture");
    assert_eq!(m2.configuration, Some(json!({ "mode": "strict" })));

    // A late joiner is served the refreshed cache entry.
    assert_eq!(engine.workspaces().get("w1").await, Some(stored.clone()));
    let mut c = TestClient::connect(&engine).await;
    c.send(&engine, join(ClientId::Guest(3), "w1")).await;
    let events = c.drain();
    let ServerEvent::ReplaceProject(replace) = &events[0] else {
        panic!("expected replaceProject");
    };
    assert_eq!(replace.project, stored);

    // Removing the cell and the edge, then deleting the model.
    a.send_json(
        &engine,
        json!({ "event": "cellRemoved", "data": {
            "workspaceId": "w1", "projectId": "p1", "cellIds": ["c2", "e1"] } }),
    )
    .await;
    a.send_json(
        &engine,
        json!({ "event": "modelDeleted", "data": {
            "workspaceId": "w1", "projectId": "p1", "productLineId": "pl1", "modelId": "m2" } }),
    )
    .await;

    let stored = gateway.project("p1").await.unwrap();
    assert!(stored.find_cell("c2").is_none());
    assert!(stored.find_edge("e1").is_none());
    assert!(stored.product_line("pl1").unwrap().model("m2").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_edits_are_not_lost() {
    let (gateway, engine) = setup();
    gateway.seed_project("w1", sample_project()).await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let client = TestClient::connect(&engine).await;
            client
                .send_json(
                    &engine,
                    json!({ "event": "cellAdded", "data": {
                        "workspaceId": "w1", "projectId": "p1", "modelId": "m1",
                        "cells": [{ "id": format!("n{i}"), "type": "Feature" }] } }),
                )
                .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = gateway.project("p1").await.unwrap();
    let model = stored.product_line("pl1").unwrap().model("m1").unwrap();
    assert_eq!(model.cells.len(), 21);
    assert_eq!(gateway.stats().updates, 20);
}

// ─── projectCreated ──────────────────────────────────────────────────

#[tokio::test]
async fn test_project_created_replaces_previous() {
    let (gateway, engine) = setup();
    let (a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    let fresh = Project::new("p2");
    a.send(
        &engine,
        project_created("w1", ClientId::from("ana@example.com"), fresh.clone()),
    )
    .await;

    assert!(gateway.project("p1").await.is_none());
    assert_eq!(gateway.project("p2").await, Some(fresh.clone()));
    assert_eq!(engine.workspaces().get("w1").await, Some(fresh));
    assert!(matches!(&b.drain()[..], [ServerEvent::ProjectCreated(_)]));
}

#[tokio::test(start_paused = true)]
async fn test_project_created_retry_succeeds() {
    let (gateway, engine) = setup();
    let mut a = TestClient::connect(&engine).await;
    let mut b = TestClient::connect(&engine).await;
    b.send(&engine, join(ClientId::Guest(2), "w1")).await;
    b.drain();

    // a never joined, so its membership is not visible yet.
    let late = ClientId::from("late@example.com");
    a.send(&engine, project_created("w1", late.clone(), sample_project()))
        .await;
    assert_eq!(gateway.project_count().await, 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    gateway.add_member("w1", late).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(gateway.project("p1").await, Some(sample_project()));
    assert!(matches!(&b.drain()[..], [ServerEvent::ProjectCreated(_)]));
    assert!(a.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_project_created_retry_abandoned() {
    let (gateway, engine) = setup();
    let a = TestClient::connect(&engine).await;
    let mut b = TestClient::connect(&engine).await;
    b.send(&engine, join(ClientId::Guest(2), "w1")).await;
    b.drain();

    a.send(
        &engine,
        project_created("w1", ClientId::from("ghost@example.com"), sample_project()),
    )
    .await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(gateway.project_count().await, 0);
    assert_eq!(gateway.stats().inserts, 0);
    assert_eq!(gateway.stats().membership_checks, 3);
    assert!(b.drain().is_empty());
    assert!(!engine.workspaces().contains("w1").await);
}

#[tokio::test(start_paused = true)]
async fn test_project_created_retry_uses_configured_delay() {
    let config = EngineConfig {
        membership_retry_delay: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let (gateway, engine) = setup_with(config);
    let a = TestClient::connect(&engine).await;
    let late = ClientId::Guest(9);

    a.send(&engine, project_created("w1", late.clone(), Project::new("p1")))
        .await;
    gateway.add_member("w1", late).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(gateway.project("p1").await.is_some());
}

// ─── openProject ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_project_reaches_whole_room() {
    let (gateway, engine) = setup();
    let (mut a, mut b) = two_joined(&gateway, &engine, sample_project()).await;
    gateway
        .insert_project("p9", &Project::new("p9"), "w9")
        .await
        .unwrap();

    a.send_json(
        &engine,
        json!({ "event": "openProject", "data": { "workspaceId": "w1", "projectId": "p9" } }),
    )
    .await;

    for client in [&mut a, &mut b] {
        let events = client.drain();
        assert!(matches!(&events[..], [ServerEvent::ProjectOpened(o)] if o.project.id == "p9"));
    }
    assert_eq!(engine.workspaces().get("w1").await.unwrap().id, "p9");
}

#[tokio::test]
async fn test_open_missing_project_errors_to_sender_only() {
    let (gateway, engine) = setup();
    let (mut a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    a.send_json(
        &engine,
        json!({ "event": "openProject", "data": { "workspaceId": "w1", "projectId": "nope" } }),
    )
    .await;

    assert_eq!(a.drain(), vec![ServerEvent::error("Project not found")]);
    assert!(b.drain().is_empty());
    assert_eq!(engine.workspaces().get("w1").await.unwrap().id, "p1");
}

#[tokio::test]
async fn test_open_project_gateway_failure() {
    let (gateway, engine) = setup();
    let (mut a, _b) = two_joined(&gateway, &engine, sample_project()).await;
    gateway.set_unavailable(true);

    a.send_json(
        &engine,
        json!({ "event": "openProject", "data": { "workspaceId": "w1", "projectId": "p1" } }),
    )
    .await;

    assert_eq!(a.drain(), vec![ServerEvent::error("Failed to open project")]);
}

// ─── Identity, invitations, cursors ──────────────────────────────────

#[tokio::test]
async fn test_invitation_forwarded_and_host_joins() {
    let (_gateway, engine) = setup();
    let mut host = TestClient::connect(&engine).await;
    let mut guest = TestClient::connect(&engine).await;

    guest
        .send_json(
            &engine,
            json!({ "event": "registerUser", "data": { "email": "bob@example.com" } }),
        )
        .await;
    let invitation = json!({
        "event": "sendInvitation",
        "data": {
            "inviterName": "Ana",
            "invitedUserEmail": "bob@example.com",
            "workspaceId": "w1"
        }
    });
    let data = invitation["data"].clone();
    host.send_json(&engine, invitation).await;

    let received = guest.drain();
    assert_eq!(received.len(), 1);
    assert_eq!(
        serde_json::to_value(&received[0]).unwrap(),
        json!({ "event": "invitationReceived", "data": data })
    );
    assert!(host.drain().is_empty());
    assert!(engine.router().is_member("w1", host.session).await);
}

#[tokio::test]
async fn test_invitation_to_unknown_user_is_dropped() {
    let (_gateway, engine) = setup();
    let mut host = TestClient::connect(&engine).await;

    host.send_json(
        &engine,
        json!({ "event": "sendInvitation", "data": {
            "inviterName": "Ana", "invitedUserEmail": "nobody@example.com", "workspaceId": "w1" } }),
    )
    .await;

    assert!(host.drain().is_empty());
    assert!(!engine.router().is_member("w1", host.session).await);
}

#[tokio::test]
async fn test_register_workspace_replies() {
    let (gateway, engine) = setup();
    let mut a = TestClient::connect(&engine).await;

    a.send_json(
        &engine,
        json!({ "event": "registerWorkspace", "data": { "clientId": 4, "workspaceId": "w1" } }),
    )
    .await;

    assert_eq!(
        serde_json::to_value(&a.drain()[0]).unwrap(),
        json!({ "event": "workspaceRegistered", "data": { "success": true, "workspaceId": "w1" } })
    );
    assert!(gateway.membership("w1", &ClientId::Guest(4)).await.is_some());
}

#[tokio::test]
async fn test_cursor_moved_reaches_whole_room_without_persistence() {
    let (gateway, engine) = setup();
    let (mut a, mut b) = two_joined(&gateway, &engine, sample_project()).await;
    let reads_before = gateway.stats().reads;

    a.send_json(
        &engine,
        json!({ "event": "cursorMoved", "data": { "workspaceId": "w1", "x": 1, "y": 2 } }),
    )
    .await;

    assert_eq!(a.drain().len(), 1);
    assert_eq!(b.drain().len(), 1);
    assert_eq!(gateway.stats().reads, reads_before);
    assert_eq!(gateway.stats().updates, 0);
}

#[tokio::test]
async fn test_disconnect_leaves_rooms() {
    let (gateway, engine) = setup();
    let (a, mut b) = two_joined(&gateway, &engine, sample_project()).await;

    engine.disconnect(b.session).await;
    assert_eq!(engine.router().room_members("w1").await, vec![a.session]);

    a.send_json(
        &engine,
        json!({ "event": "cursorMoved", "data": { "workspaceId": "w1" } }),
    )
    .await;
    assert!(b.drain().is_empty());
}
