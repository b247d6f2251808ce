use std::rc::Rc;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde_json::{Value, json};
use tally_core::model::TaskPatch;
use tally_core::remote::HttpDataService;
use tally_core::render::Renderer;
use tally_core::session::{self, Mode};
use tally_core::sync::{self, DataService, SyncStatus};
use tokio::net::TcpListener;
use tokio::task::LocalSet;

/// Task id the fake service refuses to update or delete.
const BROKEN_TASK: u64 = 13;

#[derive(Debug, Default)]
struct Recorded {
    patches: Vec<(u64, Value)>,
    deletes: Vec<u64>,
}

#[derive(Clone, Default)]
struct Fake {
    recorded: Arc<Mutex<Recorded>>,
    colors_down: bool,
}

fn lists_body() -> Value {
    let yesterday = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
    json!([
        {
            "id": 1,
            "name": "Work",
            "colorId": 2,
            "color": { "id": 2, "hex": "#64C4ED", "name": "blue" },
            "tasks": [
                { "id": 10, "listId": 1, "text": "Ship", "completed": false, "dateOverdue": yesterday },
                { "id": 11, "listId": 1, "text": "Plan", "completed": true },
                { "id": 12, "listId": 1, "text": "Review", "completed": false },
                { "id": 13, "listId": 1, "text": "Flaky", "completed": false }
            ]
        },
        {
            "id": 2,
            "name": "Home",
            "colorId": 2,
            "color": { "id": 2, "hex": "#64C4ED", "name": "blue" },
            "tasks": []
        }
    ])
}

fn tasks_body() -> Value {
    let lists = lists_body();
    let tasks: Vec<Value> = lists
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|list| list["tasks"].as_array().cloned().unwrap_or_default())
        .collect();
    Value::Array(tasks)
}

async fn get_lists() -> Json<Value> {
    Json(lists_body())
}

async fn get_tasks() -> Json<Value> {
    Json(tasks_body())
}

async fn get_colors(State(fake): State<Fake>) -> Result<Json<Value>, StatusCode> {
    if fake.colors_down {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!([
        { "id": 1, "hex": "#C9D1D3", "name": "grey" },
        { "id": 2, "hex": "#64C4ED", "name": "blue" }
    ])))
}

async fn patch_task(
    State(fake): State<Fake>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> StatusCode {
    if id == BROKEN_TASK {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    fake.recorded
        .lock()
        .expect("recorded lock")
        .patches
        .push((id, body));
    StatusCode::OK
}

async fn delete_task(State(fake): State<Fake>, Path(id): Path<u64>) -> StatusCode {
    if id == BROKEN_TASK {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    fake.recorded.lock().expect("recorded lock").deletes.push(id);
    StatusCode::OK
}

async fn serve(fake: Fake) -> String {
    let app = Router::new()
        .route("/lists", get(get_lists))
        .route("/colors", get(get_colors))
        .route("/tasks", get(get_tasks))
        .route("/tasks/{id}", patch(patch_task).delete(delete_task))
        .with_state(fake);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake service");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve fake service");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn client_reads_collections_and_writes_tasks() {
    let fake = Fake::default();
    let base = serve(fake.clone()).await;
    let service = HttpDataService::new(&base, None).expect("client");

    let lists = service.fetch_lists().await.expect("lists");
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].tasks.len(), 4);
    assert_eq!(lists[0].color.as_ref().map(|c| c.hex.as_str()), Some("#64C4ED"));
    assert!(lists[0].tasks[0].due.is_some());

    assert_eq!(service.fetch_colors().await.expect("colors").len(), 2);
    assert_eq!(service.fetch_tasks().await.expect("tasks").len(), 4);

    service
        .patch_task(10, TaskPatch::Completed { completed: true })
        .await
        .expect("patch");
    service.delete_task(12).await.expect("delete");
    assert!(
        service
            .patch_task(BROKEN_TASK, TaskPatch::Text { text: "x".to_string() })
            .await
            .is_err()
    );
    assert!(service.delete_task(BROKEN_TASK).await.is_err());

    let recorded = fake.recorded.lock().expect("recorded lock");
    assert_eq!(recorded.patches, vec![(10, json!({ "completed": true }))]);
    assert_eq!(recorded.deletes, vec![12]);
}

#[tokio::test]
async fn failed_collection_stays_empty() {
    let fake = Fake {
        colors_down: true,
        ..Fake::default()
    };
    let base = serve(fake).await;
    let service = HttpDataService::new(&base, None).expect("client");

    let load = sync::initial_load(&service).await;
    assert!(load.colors.is_none());
    assert_eq!(load.lists.map(|l| l.len()), Some(2));
    assert_eq!(load.tasks.map(|t| t.len()), Some(4));
}

#[tokio::test]
async fn unreachable_service_leaves_sidebar_loading() {
    let service = HttpDataService::new("http://127.0.0.1:9", None).expect("client");
    let controller = session::load_controller(&service, "/").await;
    assert!(!controller.store().lists_loaded());
    assert!(controller.colors().is_empty());
}

#[tokio::test]
async fn batch_session_persists_changes_and_reports_failures() {
    let fake = Fake::default();
    let base = serve(fake.clone()).await;

    let local = LocalSet::new();
    local
        .run_until(async move {
            let service = Rc::new(HttpDataService::new(&base, None).expect("client"));
            let controller = session::load_controller(service.as_ref(), "/lists/1").await;

            let script = [
                "toggle overdue",
                "done 10",
                "edit 11",
                "Plan the release",
                "remove 12",
                "y",
                "done 13",
                "add-task 2 Water plants",
                "chart",
            ]
            .join("\n");

            let mut out = Vec::new();
            let shell = session::run(
                service,
                Renderer::plain(),
                controller,
                script.as_bytes(),
                &mut out,
                Mode::Batch,
            )
            .await
            .expect("session");
            let text = String::from_utf8(out).expect("utf8");

            assert!(text.contains("Overdue tasks\n  Ship"));
            assert!(text.contains("Updated task 11."));
            assert!(text.contains("Removed task 12."));
            assert!(text.contains("Created task 14."));
            assert!(text.contains("! failed to update task"));

            let controller = shell.controller();
            assert_eq!(controller.sync_status(10), None);
            assert!(matches!(controller.sync_status(13), Some(SyncStatus::Failed(_))));
            assert_eq!(controller.store().task(13).map(|t| t.completed), Some(true));
            assert_eq!(
                controller.store().task(11).map(|t| t.text.as_str()),
                Some("Plan the release")
            );
            assert_eq!(controller.store().task(14).map(|t| t.list_id), Some(2));
        })
        .await;

    let recorded = fake.recorded.lock().expect("recorded lock");
    let mut patches = recorded.patches.clone();
    patches.sort_by_key(|(id, _)| *id);
    assert_eq!(
        patches,
        vec![
            (10, json!({ "completed": true })),
            (11, json!({ "text": "Plan the release" })),
        ]
    );
    assert_eq!(recorded.deletes, vec![12]);
}
