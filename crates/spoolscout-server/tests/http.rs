use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Router,
    body::{self, Body},
    http::{Request, StatusCode},
};
use rust_decimal::Decimal;
use serde_json::Value;
use spoolscout_flowise::{QueryError, SupervisorError};
use spoolscout_process::{ServiceState, ServiceStatus};
use spoolscout_server::{
    llm::LlmBackend,
    models::{
        Filament, NewFilament, NewProject, NewProjectFilament, Project, ProjectFilament,
    },
    routes, search,
    state::AppState,
    store::{FilamentStore, StoreError},
};
use tower::util::ServiceExt;

#[derive(Default)]
struct MemoryStore {
    filaments: Mutex<Vec<Filament>>,
    projects: Mutex<Vec<Project>>,
    project_filaments: Mutex<Vec<ProjectFilament>>,
    searches: AtomicUsize,
    fail_search: bool,
}

impl MemoryStore {
    fn with_filaments(rows: Vec<Filament>) -> Self {
        Self {
            filaments: Mutex::new(rows),
            ..Self::default()
        }
    }
}

fn now() -> chrono::DateTime<chrono::FixedOffset> {
    chrono::Utc::now().into()
}

#[async_trait::async_trait]
impl FilamentStore for MemoryStore {
    async fn list_filaments(&self) -> Result<Vec<Filament>, StoreError> {
        Ok(self.filaments.lock().unwrap().clone())
    }

    async fn get_filament(&self, id: i32) -> Result<Option<Filament>, StoreError> {
        Ok(self
            .filaments
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }

    async fn create_filament(&self, new: NewFilament) -> Result<Filament, StoreError> {
        let mut rows = self.filaments.lock().unwrap();
        let f = Filament {
            id: rows.len() as i32 + 1,
            name: new.name,
            material: new.material,
            color: new.color,
            diameter: new.diameter,
            price: new.price,
            brand: new.brand,
            description: new.description,
            temperature_range: new.temperature_range,
            properties: new.properties,
            created_at: now(),
        };
        rows.push(f.clone());
        Ok(f)
    }

    async fn search_filaments(&self, query: &str) -> Result<Vec<Filament>, StoreError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(StoreError::Db(sea_orm::DbErr::Custom("boom".to_string())));
        }
        let terms = search::search_terms(query);
        Ok(self
            .filaments
            .lock()
            .unwrap()
            .iter()
            .filter(|f| search::filament_matches(f, &terms))
            .cloned()
            .collect())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.projects.lock().unwrap().clone())
    }

    async fn get_project(&self, id: i32) -> Result<Option<Project>, StoreError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn create_project(&self, new: NewProject) -> Result<Project, StoreError> {
        let mut rows = self.projects.lock().unwrap();
        let p = Project {
            id: rows.len() as i32 + 1,
            name: new.name,
            description: new.description,
            created_at: now(),
        };
        rows.push(p.clone());
        Ok(p)
    }

    async fn project_filaments(
        &self,
        project_id: i32,
    ) -> Result<Vec<ProjectFilament>, StoreError> {
        Ok(self
            .project_filaments
            .lock()
            .unwrap()
            .iter()
            .filter(|pf| pf.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn add_project_filament(
        &self,
        project_id: i32,
        new: NewProjectFilament,
    ) -> Result<ProjectFilament, StoreError> {
        let mut rows = self.project_filaments.lock().unwrap();
        let pf = ProjectFilament {
            id: rows.len() as i32 + 1,
            project_id,
            filament_id: new.filament_id,
            quantity: new.quantity,
            created_at: now(),
        };
        rows.push(pf.clone());
        Ok(pf)
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// LLM backend double: running with a canned reply, or down.
struct FakeLlm {
    reply: Option<String>,
    stops: AtomicUsize,
}

impl FakeLlm {
    fn down() -> Self {
        Self {
            reply: None,
            stops: AtomicUsize::new(0),
        }
    }

    fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            stops: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl LlmBackend for FakeLlm {
    fn status(&self) -> ServiceStatus {
        let mut st = ServiceStatus::idle();
        if self.reply.is_some() {
            st.state = ServiceState::Running;
            st.running = true;
            st.pid = Some(4242);
        }
        st
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        if self.reply.is_some() {
            Ok(())
        } else {
            Err(SupervisorError::StartupTimeout {
                timeout: std::time::Duration::from_secs(30),
            })
        }
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn query(&self, _text: &str) -> Result<String, QueryError> {
        self.reply.clone().ok_or(QueryError::NotRunning)
    }

    async fn tail_logs(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        let lines = vec!["[stdout] Server listening on 3000".to_string()];
        (lines.into_iter().take(limit).collect(), cursor + 1)
    }
}

fn filament(id: i32, name: &str, material: &str, color: &str) -> Filament {
    Filament {
        id,
        name: name.to_string(),
        material: material.to_string(),
        color: color.to_string(),
        diameter: Decimal::new(175, 2),
        price: Decimal::new(2499, 2),
        brand: None,
        description: None,
        temperature_range: None,
        properties: None,
        created_at: now(),
    }
}

fn catalog() -> Vec<Filament> {
    vec![
        filament(1, "ProMax PLA", "PLA", "Red"),
        filament(2, "Galaxy PETG", "PETG", "Black"),
        filament(3, "Tough PLA+", "PLA", "White"),
    ]
}

fn app(store: Arc<MemoryStore>, llm: Arc<FakeLlm>) -> Router {
    routes::router(AppState::new(store, llm))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn search_matches_case_insensitively_and_echoes_query() {
    let store = Arc::new(MemoryStore::with_filaments(catalog()));
    let (status, json) = send(
        app(store, Arc::new(FakeLlm::down())),
        post_json("/api/search", serde_json::json!({ "query": "red PLA" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["query"], "red PLA");
    assert_eq!(json["llmResponse"], "");
    let names: Vec<&str> = json["filaments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ProMax PLA"]);
}

#[tokio::test]
async fn search_merges_enrichment_when_available() {
    let store = Arc::new(MemoryStore::with_filaments(catalog()));
    let llm = Arc::new(FakeLlm::replying("PLA prints well at 200C"));
    let (status, json) = send(
        app(store, llm),
        post_json("/api/search", serde_json::json!({ "query": "pla" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["llmResponse"], "PLA prints well at 200C");
    assert_eq!(json["filaments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn search_without_query_is_rejected_before_searching() {
    let store = Arc::new(MemoryStore::with_filaments(catalog()));
    let llm = Arc::new(FakeLlm::down());

    let empty = Request::builder()
        .method("POST")
        .uri("/api/search")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app(store.clone(), llm.clone()), empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Query is required");

    for body in [serde_json::json!({}), serde_json::json!({ "query": "" })] {
        let (status, _) = send(app(store.clone(), llm.clone()), post_json("/api/search", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    assert_eq!(store.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_store_failure_is_a_500() {
    let store = Arc::new(MemoryStore {
        fail_search: true,
        ..MemoryStore::default()
    });
    let (status, json) = send(
        app(store, Arc::new(FakeLlm::down())),
        post_json("/api/search", serde_json::json!({ "query": "pla" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Search failed");
}

#[tokio::test]
async fn status_reports_each_component() {
    let store = Arc::new(MemoryStore::default());
    let (status, json) = send(app(store.clone(), Arc::new(FakeLlm::down())), get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        serde_json::json!({
            "flowise": { "running": false },
            "database": { "connected": true },
            "server": { "running": true },
        })
    );

    let (_, json) = send(
        app(store, Arc::new(FakeLlm::replying("ok"))),
        get("/api/status"),
    )
    .await;
    assert_eq!(json["flowise"]["running"], true);
}

#[tokio::test]
async fn filaments_list_renders_decimals_as_strings() {
    let store = Arc::new(MemoryStore::with_filaments(catalog()));
    let (status, json) = send(app(store, Arc::new(FakeLlm::down())), get("/api/filaments")).await;

    assert_eq!(status, StatusCode::OK);
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["diameter"], "1.75");
    assert_eq!(rows[0]["price"], "24.99");
    assert_eq!(rows[0]["brand"], Value::Null);
    assert!(rows[0].get("temperature_range").is_some());
}

#[tokio::test]
async fn single_filament_lookup() {
    let store = Arc::new(MemoryStore::with_filaments(catalog()));
    let llm = Arc::new(FakeLlm::down());

    let (status, json) = send(app(store.clone(), llm.clone()), get("/api/filaments/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Galaxy PETG");

    let (status, json) = send(app(store.clone(), llm.clone()), get("/api/filaments/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Filament not found");

    let (status, _) = send(app(store, llm), get("/api/filaments/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_filament_validates_body() {
    let store = Arc::new(MemoryStore::default());
    let llm = Arc::new(FakeLlm::down());

    let (status, json) = send(
        app(store.clone(), llm.clone()),
        post_json(
            "/api/filaments",
            serde_json::json!({
                "name": "Silk PLA",
                "material": "PLA",
                "color": "Gold",
                "diameter": "1.75",
                "price": "29.90",
                "brand": "Sunlu",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["id"], 1);
    assert_eq!(json["brand"], "Sunlu");

    let (status, _) = send(
        app(store.clone(), llm),
        post_json(
            "/api/filaments",
            serde_json::json!({ "name": "", "material": "PLA", "color": "Gold", "diameter": 1.75, "price": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.filaments.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn project_filaments_round_trip() {
    let store = Arc::new(MemoryStore::with_filaments(catalog()));
    let llm = Arc::new(FakeLlm::down());

    let (status, project) = send(
        app(store.clone(), llm.clone()),
        post_json("/api/projects", serde_json::json!({ "name": "Desk organiser" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = project["id"].as_i64().unwrap();

    let (status, row) = send(
        app(store.clone(), llm.clone()),
        post_json(
            &format!("/api/projects/{id}/filaments"),
            serde_json::json!({ "filament_id": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(row["quantity"], 1);

    let (status, rows) = send(
        app(store.clone(), llm.clone()),
        get(&format!("/api/projects/{id}/filaments")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["filament_id"], 1);

    let (status, projects) = send(app(store.clone(), llm.clone()), get("/api/projects")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(projects[0]["name"], "Desk organiser");

    let (status, _) = send(
        app(store.clone(), llm.clone()),
        post_json("/api/projects/77/filaments", serde_json::json!({ "filament_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app(store, llm), get("/api/projects/x/filaments")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn flowise_admin_routes_delegate_to_backend() {
    let store = Arc::new(MemoryStore::default());
    let llm = Arc::new(FakeLlm::down());

    let (status, json) = send(app(store.clone(), llm.clone()), get("/api/flowise/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "Idle");
    assert_eq!(json["running"], false);

    let start = Request::builder()
        .method("POST")
        .uri("/api/flowise/start")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app(store.clone(), llm.clone()), start).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("startup timeout"));

    let stop = Request::builder()
        .method("POST")
        .uri("/api/flowise/stop")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(store.clone(), llm.clone()), stop).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(llm.stops.load(Ordering::SeqCst), 1);

    let (status, json) = send(app(store, llm), get("/api/flowise/logs?cursor=4&limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cursor"], 5);
    assert_eq!(json["lines"][0], "[stdout] Server listening on 3000");
}

#[tokio::test]
async fn responses_carry_request_ids() {
    let store = Arc::new(MemoryStore::default());
    let llm = Arc::new(FakeLlm::down());

    let resp = app(store.clone(), llm.clone())
        .oneshot(get("/api/status"))
        .await
        .unwrap();
    let minted = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(!minted.is_empty());

    let req = Request::builder()
        .uri("/api/status")
        .header("x-request-id", "req-abc")
        .body(Body::empty())
        .unwrap();
    let resp = app(store, llm).oneshot(req).await.unwrap();
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "req-abc");
}

#[tokio::test]
async fn foreign_origin_cannot_post() {
    let store = Arc::new(MemoryStore::with_filaments(catalog()));
    let req = Request::builder()
        .method("POST")
        .uri("/api/search")
        .header("content-type", "application/json")
        .header("origin", "https://evil.example")
        .body(Body::from(r#"{"query":"pla"}"#))
        .unwrap();
    let (status, json) = send(app(store.clone(), Arc::new(FakeLlm::down())), req).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "origin not allowed");
    assert_eq!(store.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn whitespace_query_is_searched_literally() {
    let mut rows = catalog();
    rows[1].description = Some("glossy  black".to_string());
    let store = Arc::new(MemoryStore::with_filaments(rows));
    let (status, json) = send(
        app(store.clone(), Arc::new(FakeLlm::down())),
        post_json("/api/search", serde_json::json!({ "query": "  " })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["query"], "  ");
    let filaments = json["filaments"].as_array().unwrap();
    assert_eq!(filaments.len(), 1);
    assert_eq!(filaments[0]["name"], "Galaxy PETG");
    assert_eq!(store.searches.load(Ordering::SeqCst), 1);
}
