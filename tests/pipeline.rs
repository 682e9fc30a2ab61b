//! End-to-end adapter and orchestrator tests against in-process stub
//! servers for the three provider APIs and their token endpoints.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use drive_harness::config::Config;
use drive_harness::connector_gdrive::DriveAdapter;
use drive_harness::connector_notion::NotionAdapter;
use drive_harness::connector_onedrive::{share_id, OneDriveAdapter};
use drive_harness::http::HttpContext;
use drive_harness::ingest::{Ingestor, ProviderOutcome, ProviderSelection};
use drive_harness::models::{Connection, Provider, TokenRecord};
use drive_harness::oauth::{ExpiryPolicy, OAuthClient};
use drive_harness::store::{MemoryTokenStore, SqliteTokenStore, TokenStore};
use drive_harness::traits::{AdapterRegistry, ProviderAdapter};

// ============ Stub server ============

#[derive(Default)]
struct Stub {
    /// `http://127.0.0.1:<port>`, substituted for `{BASE}` in OneDrive items.
    base: OnceLock<String>,
    /// Token endpoint status; `None` answers 200 with a fresh token.
    google_token_status: Option<StatusCode>,
    google_expires_in: Option<i64>,
    /// Listing answers 401 to this access token.
    drive_reject_token: Option<String>,
    drive_files: Vec<Value>,
    drive_meta: HashMap<String, Value>,
    drive_media: HashMap<String, Vec<u8>>,
    drive_exports: HashMap<String, Vec<u8>>,
    media_delay: Duration,
    onedrive_unauthorized: bool,
    onedrive_children: Vec<Value>,
    share_children: Vec<Value>,
    downloads: HashMap<String, Vec<u8>>,
    notion_results: Vec<Value>,
    notion_unauthorized: bool,

    log: Mutex<Vec<String>>,
    google_token_calls: AtomicUsize,
    onedrive_token_calls: AtomicUsize,
    onedrive_list_calls: AtomicUsize,
    media_calls: AtomicUsize,
    notion_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Stub {
    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn with_base(&self, items: &[Value]) -> Value {
        let base = self.base.get().cloned().unwrap_or_default();
        let raw = serde_json::to_string(items).unwrap().replace("{BASE}", &base);
        serde_json::from_str(&raw).unwrap()
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn google_token(State(s): State<Arc<Stub>>) -> Response {
    s.google_token_calls.fetch_add(1, Ordering::SeqCst);
    s.record("google-token");
    if let Some(status) = s.google_token_status {
        return (status, Json(json!({"error": "invalid_grant"}))).into_response();
    }
    let expires_in = s.google_expires_in.unwrap_or(3600);
    Json(json!({"access_token": "fresh-google", "expires_in": expires_in, "token_type": "Bearer"}))
        .into_response()
}

async fn onedrive_token(State(s): State<Arc<Stub>>) -> Json<Value> {
    s.onedrive_token_calls.fetch_add(1, Ordering::SeqCst);
    s.record("onedrive-token");
    Json(json!({"access_token": "fresh-onedrive", "expires_in": 3600}))
}

async fn drive_list(State(s): State<Arc<Stub>>, headers: HeaderMap) -> Response {
    let auth = bearer(&headers);
    s.record(format!("drive-list {}", auth));
    if let Some(rejected) = &s.drive_reject_token {
        if auth == format!("Bearer {}", rejected) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    Json(json!({ "files": s.drive_files })).into_response()
}

async fn drive_file(
    State(s): State<Arc<Stub>>,
    Path(id): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if q.get("alt").map(String::as_str) != Some("media") {
        return match s.drive_meta.get(&id) {
            Some(meta) => Json(meta.clone()).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }

    s.media_calls.fetch_add(1, Ordering::SeqCst);
    s.record(format!("drive-media {} {}", id, bearer(&headers)));
    let now = s.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    s.max_in_flight.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(s.media_delay).await;
    s.in_flight.fetch_sub(1, Ordering::SeqCst);

    match s.drive_media.get(&id) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn drive_export(State(s): State<Arc<Stub>>, Path(id): Path<String>) -> Response {
    match s.drive_exports.get(&id) {
        Some(bytes) => bytes.clone().into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "export failed").into_response(),
    }
}

async fn graph_root_children(State(s): State<Arc<Stub>>) -> Response {
    s.onedrive_list_calls.fetch_add(1, Ordering::SeqCst);
    if s.onedrive_unauthorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "value": s.with_base(&s.onedrive_children) })).into_response()
}

async fn share_item(State(s): State<Arc<Stub>>, Path(sid): Path<String>) -> Response {
    s.record(format!("share {}", sid));
    if s.share_children.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let children = s.with_base(&s.share_children);
    Json(json!({ "id": "root", "folder": {}, "children": children })).into_response()
}

async fn plain_download(State(s): State<Arc<Stub>>, Path(name): Path<String>) -> Response {
    match s.downloads.get(&name) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn notion_search(
    State(s): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    s.notion_calls.fetch_add(1, Ordering::SeqCst);
    let version = headers
        .get("notion-version")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    s.record(format!(
        "notion-search {} page_size={}",
        version, body["page_size"]
    ));
    if s.notion_unauthorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "results": s.notion_results })).into_response()
}

/// Serve `stub` on an ephemeral port; returns a config pointing every
/// provider at it.
async fn spawn(stub: Stub) -> (Config, Arc<Stub>) {
    let stub = Arc::new(stub);
    let app = Router::new()
        .route("/google/token", post(google_token))
        .route("/onedrive/token", post(onedrive_token))
        .route("/drive/files", get(drive_list))
        .route("/drive/files/{id}", get(drive_file))
        .route("/drive/files/{id}/export", get(drive_export))
        .route("/graph/me/drive/root/children", get(graph_root_children))
        .route("/shares/shares/{sid}/driveItem", get(share_item))
        .route("/dl/{name}", get(plain_download))
        .route("/notion/search", post(notion_search))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    stub.base.set(base.clone()).unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut cfg = Config::default();
    cfg.providers.google.token_url = format!("{}/google/token", base);
    cfg.providers.google.api_base = format!("{}/drive", base);
    cfg.providers.google.credentials.client_id = Some("gid".into());
    cfg.providers.google.credentials.client_secret = Some("gsecret".into());
    cfg.providers.onedrive.token_url = Some(format!("{}/onedrive/token", base));
    cfg.providers.onedrive.graph_base = format!("{}/graph", base);
    cfg.providers.onedrive.shares_base = format!("{}/shares", base);
    cfg.providers.onedrive.credentials.client_id = Some("oid".into());
    cfg.providers.onedrive.credentials.client_secret = Some("osecret".into());
    cfg.providers.notion.api_base = format!("{}/notion", base);
    (cfg, stub)
}

// ============ Fixtures ============

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn connect(
    store: &dyn TokenStore,
    provider: Provider,
    access: &str,
    expires_at: Option<i64>,
) {
    store
        .save_connection(&Connection::new(
            "alice",
            provider,
            TokenRecord {
                access_token: Some(access.into()),
                refresh_token: Some("refresh-1".into()),
                expires_at,
                ..Default::default()
            },
        ))
        .await
        .unwrap();
}

fn drive_file_json(id: &str, name: &str, mime: &str, size: Option<u64>) -> Value {
    let mut v = json!({"id": id, "name": name, "mimeType": mime});
    if let Some(size) = size {
        v["size"] = json!(size.to_string());
    }
    v
}

fn docx_with(text: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>"#,
            text
        )
        .unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn drive(cfg: &Config, store: Arc<dyn TokenStore>, http: HttpContext) -> DriveAdapter {
    DriveAdapter::new(&cfg.providers.google, &cfg.extract, store, http)
}

// ============ Token lifecycle ============

#[tokio::test]
async fn expired_token_refreshes_once_before_listing() {
    let (cfg, stub) = spawn(Stub {
        drive_files: vec![drive_file_json("t1", "notes.txt", "text/plain", Some(11))],
        drive_media: HashMap::from([("t1".to_string(), b"hello world".to_vec())]),
        ..Default::default()
    })
    .await;

    let tmp = tempfile::TempDir::new().unwrap();
    let store = Arc::new(
        SqliteTokenStore::open(&tmp.path().join("dh.sqlite"))
            .await
            .unwrap(),
    );
    connect(store.as_ref(), Provider::Google, "stale", Some(now() - 1)).await;

    let adapter = drive(&cfg, store.clone(), HttpContext::from_config(&cfg));
    let docs = adapter.enumerate("alice", None, 10).await.unwrap();

    assert_eq!(stub.google_token_calls.load(Ordering::SeqCst), 1);
    let log = stub.entries();
    assert_eq!(log[0], "google-token");
    assert_eq!(log[1], "drive-list Bearer fresh-google");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].text(), "hello world");

    let stored = store.get("alice", Provider::Google).await.unwrap().unwrap();
    assert_eq!(stored.token.access_token.as_deref(), Some("fresh-google"));
    assert_eq!(stored.token.refresh_token.as_deref(), Some("refresh-1"));
    let expires_at = stored.token.expires_at.unwrap();
    assert!(expires_at > now() + 3000 && expires_at <= now() + 3600 - 60);
}

#[tokio::test]
async fn fresh_token_reads_make_no_refresh_calls() {
    let (cfg, stub) = spawn(Stub::default()).await;
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "live", Some(now() + 3600)).await;

    let client = OAuthClient::new(
        Provider::Google,
        ExpiryPolicy::Refreshable,
        cfg.providers.google.token_url.clone(),
        cfg.providers.google.credentials.clone(),
        store,
        reqwest::Client::new(),
        Duration::from_secs(5),
    );
    assert_eq!(client.valid_access_token("alice").await.unwrap(), "live");
    assert_eq!(client.valid_access_token("alice").await.unwrap(), "live");
    assert_eq!(stub.google_token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_refresh_contributes_nothing() {
    let (cfg, stub) = spawn(Stub {
        google_token_status: Some(StatusCode::BAD_REQUEST),
        drive_files: vec![drive_file_json("g1", "plan.txt", "text/plain", Some(4))],
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "stale", Some(now() - 10)).await;
    let registry =
        AdapterRegistry::with_builtins(&cfg, store.clone(), HttpContext::from_config(&cfg));
    let ingestor = Ingestor::new(registry, store.clone());

    let report = ingestor
        .ingest("alice", &ProviderSelection::Auto, None, 10)
        .await
        .unwrap();
    assert!(report.documents.is_empty());
    assert_eq!(
        report.outcomes,
        vec![(Provider::Google, ProviderOutcome::Contributed(0))]
    );
    assert_eq!(stub.google_token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stub.entries(), vec!["google-token".to_string()]);

    let explicit = ingestor
        .ingest("alice", &ProviderSelection::single(Provider::Google), None, 10)
        .await
        .unwrap();
    assert_eq!(
        explicit.outcomes,
        vec![(Provider::Google, ProviderOutcome::Contributed(0))]
    );

    // The stored grant is left as it was.
    let stored = store.get("alice", Provider::Google).await.unwrap().unwrap();
    assert_eq!(stored.token.access_token.as_deref(), Some("stale"));
}

#[tokio::test]
async fn unauthorized_listing_refreshes_then_retries() {
    let (cfg, stub) = spawn(Stub {
        drive_reject_token: Some("revoked".into()),
        drive_files: vec![drive_file_json("t1", "notes.txt", "text/plain", Some(5))],
        drive_media: HashMap::from([("t1".to_string(), b"notes".to_vec())]),
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "revoked", Some(now() + 3600)).await;
    let adapter = drive(&cfg, store.clone(), HttpContext::from_config(&cfg));

    let docs = adapter.enumerate("alice", None, 10).await.unwrap();

    assert_eq!(
        stub.entries(),
        vec![
            "drive-list Bearer revoked".to_string(),
            "google-token".to_string(),
            "drive-list Bearer fresh-google".to_string(),
            "drive-media t1 Bearer fresh-google".to_string(),
        ]
    );
    assert_eq!(stub.google_token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].text(), "notes");
}

#[tokio::test]
async fn short_lived_refresh_is_reused_for_items() {
    // Stored expiry lands inside the refresh margin, so a second token
    // lookup would refresh again.
    let (cfg, stub) = spawn(Stub {
        google_expires_in: Some(90),
        drive_files: vec![
            drive_file_json("a", "a.txt", "text/plain", Some(1)),
            drive_file_json("b", "b.txt", "text/plain", Some(1)),
        ],
        drive_media: HashMap::from([
            ("a".to_string(), b"a".to_vec()),
            ("b".to_string(), b"b".to_vec()),
        ]),
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "stale", Some(now() - 1)).await;
    let adapter = drive(&cfg, store, HttpContext::from_config(&cfg));

    let docs = adapter.enumerate("alice", None, 10).await.unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(stub.google_token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stub.media_calls.load(Ordering::SeqCst), 2);
    let media: Vec<String> = stub
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("drive-media"))
        .collect();
    assert!(media.iter().all(|e| e.ends_with("Bearer fresh-google")));
}

// ============ Orchestrator ============

#[tokio::test]
async fn unauthorized_provider_contributes_nothing() {
    let (cfg, stub) = spawn(Stub {
        drive_files: vec![drive_file_json("g1", "plan.txt", "text/plain", Some(4))],
        drive_media: HashMap::from([("g1".to_string(), b"plan".to_vec())]),
        onedrive_unauthorized: true,
        notion_results: vec![json!({
            "object": "page",
            "id": "n1",
            "properties": {"Name": {"type": "title", "title": [{"plain_text": "Roadmap"}]}}
        })],
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    for p in Provider::ALL {
        connect(store.as_ref(), p, "live", Some(now() + 3600)).await;
    }
    let registry =
        AdapterRegistry::with_builtins(&cfg, store.clone(), HttpContext::from_config(&cfg));
    let ingestor = Ingestor::new(registry, store);

    let report = ingestor
        .ingest("alice", &ProviderSelection::Auto, None, 10)
        .await
        .unwrap();

    let got: Vec<(Provider, String)> = report
        .documents
        .iter()
        .map(|d| (d.provider, d.doc.title.clone()))
        .collect();
    assert_eq!(
        got,
        vec![
            (Provider::Google, "plan.txt".to_string()),
            (Provider::Notion, "Roadmap".to_string()),
        ]
    );
    assert_eq!(
        report.outcomes[1],
        (Provider::OneDrive, ProviderOutcome::Contributed(0))
    );
    // One call, one refresh, one retry.
    assert_eq!(stub.onedrive_list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(stub.onedrive_token_calls.load(Ordering::SeqCst), 1);
}

// ============ Download throttle ============

#[tokio::test]
async fn fifty_downloads_never_exceed_four_permits() {
    let mut files = Vec::new();
    let mut media = HashMap::new();
    for i in 0..50 {
        let id = format!("f{:02}", i);
        files.push(drive_file_json(&id, &format!("{}.txt", id), "text/plain", Some(8)));
        media.insert(id.clone(), format!("file {}", i).into_bytes());
    }
    let (cfg, stub) = spawn(Stub {
        drive_files: files,
        drive_meta: HashMap::from([(
            "FOLDER".to_string(),
            drive_file_json("FOLDER", "bulk", "application/vnd.google-apps.folder", None),
        )]),
        drive_media: media,
        media_delay: Duration::from_millis(20),
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "live", Some(now() + 3600)).await;
    let http = HttpContext::from_config(&cfg);
    let adapter = drive(&cfg, store, http.clone());

    let docs = adapter
        .enumerate(
            "alice",
            Some("https://drive.google.com/drive/folders/FOLDER"),
            50,
        )
        .await
        .unwrap();

    assert_eq!(docs.len(), 50);
    assert_eq!(docs[7].text(), "file 7");
    assert_eq!(stub.media_calls.load(Ordering::SeqCst), 50);
    let server_peak = stub.max_in_flight.load(Ordering::SeqCst);
    assert!(server_peak >= 1 && server_peak <= 4, "peak {}", server_peak);
    assert!(http.throttle.peak() <= 4);
    assert_eq!(http.throttle.active(), 0);
}

// ============ Google Drive content ============

#[tokio::test]
async fn drive_items_export_skip_or_degrade() {
    let (cfg, stub) = spawn(Stub {
        drive_files: vec![
            drive_file_json("doc", "Minutes", "application/vnd.google-apps.document", None),
            drive_file_json("sheet", "Budget", "application/vnd.google-apps.spreadsheet", None),
            drive_file_json("sub", "Archive", "application/vnd.google-apps.folder", None),
            drive_file_json("big", "scan.pdf", "application/pdf", Some(500 * 1024 * 1024)),
        ],
        drive_meta: HashMap::from([(
            "PARENT".to_string(),
            drive_file_json("PARENT", "Team", "application/vnd.google-apps.folder", None),
        )]),
        drive_exports: HashMap::from([("doc".to_string(), docx_with("Hello World"))]),
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "live", Some(now() + 3600)).await;
    let adapter = drive(&cfg, store, HttpContext::from_config(&cfg));

    let docs = adapter
        .enumerate(
            "alice",
            Some("https://drive.google.com/drive/folders/PARENT?usp=sharing"),
            10,
        )
        .await
        .unwrap();
    let texts: Vec<String> = docs.iter().map(|d| d.text()).collect();
    assert_eq!(
        texts,
        vec![
            "Hello World".to_string(),
            "[type: application/vnd.google-apps.spreadsheet]".to_string(),
            "[folder]".to_string(),
            "[type: application/pdf]".to_string(),
        ]
    );
    assert!(docs[0].content.is_readable());
    assert_eq!(stub.media_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn corrupt_pptx_becomes_binary_placeholder() {
    let garbage = b"PK\x03\x04 this is not really a zip archive".to_vec();
    let len = garbage.len();
    let (cfg, _stub) = spawn(Stub {
        drive_meta: HashMap::from([(
            "DECK".to_string(),
            drive_file_json("DECK", "report.pptx", "application/octet-stream", Some(len as u64)),
        )]),
        drive_media: HashMap::from([("DECK".to_string(), garbage)]),
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "live", Some(now() + 3600)).await;
    let adapter = drive(&cfg, store, HttpContext::from_config(&cfg));

    let docs = adapter
        .enumerate("alice", Some("https://drive.google.com/file/d/DECK/view"), 10)
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].text(), format!("[binary {} bytes]", len));
}

#[tokio::test]
async fn body_over_hard_cap_becomes_oversized() {
    let body = vec![b'a'; 2 * 1024 * 1024];
    let (mut cfg, _stub) = spawn(Stub {
        drive_meta: HashMap::from([(
            "BIG".to_string(),
            drive_file_json("BIG", "dump.txt", "text/plain", None),
        )]),
        drive_media: HashMap::from([("BIG".to_string(), body)]),
        ..Default::default()
    })
    .await;
    cfg.download.hard_cap_mb = 1;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "live", Some(now() + 3600)).await;
    let adapter = drive(&cfg, store, HttpContext::from_config(&cfg));

    let docs = adapter
        .enumerate("alice", Some("https://drive.google.com/open?id=BIG"), 10)
        .await
        .unwrap();
    assert_eq!(docs[0].text(), format!("[oversized {} bytes]", 2 * 1024 * 1024));
}

#[tokio::test]
async fn unrecognized_drive_locator_lists_nothing() {
    let (cfg, stub) = spawn(Stub::default()).await;
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Google, "live", Some(now() + 3600)).await;
    let adapter = drive(&cfg, store, HttpContext::from_config(&cfg));

    let docs = adapter
        .enumerate("alice", Some("https://example.com/not-drive"), 10)
        .await
        .unwrap();
    assert!(docs.is_empty());
    assert!(stub.entries().is_empty());
}

// ============ OneDrive ============

#[tokio::test]
async fn onedrive_share_link_resolves_without_a_connection() {
    let link = "https://1drv.ms/f/s!AbCdEf";
    let (cfg, stub) = spawn(Stub {
        share_children: vec![
            json!({"id": "c1", "name": "Photos", "folder": {"childCount": 3}}),
            json!({
                "id": "c2",
                "name": "todo.txt",
                "size": 11,
                "file": {"mimeType": "text/plain"},
                "@microsoft.graph.downloadUrl": "{BASE}/dl/todo.txt"
            }),
            json!({"id": "c3", "name": "Deck.key", "size": 9, "file": {}}),
        ],
        downloads: HashMap::from([("todo.txt".to_string(), b"[ ] ship it".to_vec())]),
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let adapter = OneDriveAdapter::new(
        &cfg.providers.onedrive,
        &cfg.extract,
        store,
        HttpContext::from_config(&cfg),
    );
    let docs = adapter.enumerate("nobody", Some(link), 10).await.unwrap();

    assert_eq!(stub.entries(), vec![format!("share {}", share_id(link))]);
    let texts: Vec<String> = docs.iter().map(|d| d.text()).collect();
    assert_eq!(
        texts,
        vec!["[folder]", "[ ] ship it", "[type: OneDrive file]"]
    );
    // Bracketed text is still real content.
    assert!(docs[1].content.is_readable());
    assert_eq!(stub.onedrive_list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_share_lookup_falls_back_to_own_drive() {
    let link = "https://1drv.ms/u/s!Gone";
    let (cfg, stub) = spawn(Stub {
        onedrive_children: vec![json!({
            "id": "r1",
            "name": "hello.txt",
            "size": 5,
            "file": {"mimeType": "text/plain"},
            "@microsoft.graph.downloadUrl": "{BASE}/dl/hello.txt"
        })],
        downloads: HashMap::from([("hello.txt".to_string(), b"hello".to_vec())]),
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::OneDrive, "live", Some(now() + 3600)).await;
    let adapter = OneDriveAdapter::new(
        &cfg.providers.onedrive,
        &cfg.extract,
        store,
        HttpContext::from_config(&cfg),
    );

    let docs = adapter.enumerate("alice", Some(link), 10).await.unwrap();

    assert_eq!(stub.entries(), vec![format!("share {}", share_id(link))]);
    assert_eq!(stub.onedrive_list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stub.onedrive_token_calls.load(Ordering::SeqCst), 0);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].doc.title, "hello.txt");
    assert_eq!(docs[0].text(), "hello");
}

// ============ Notion ============

#[tokio::test]
async fn notion_search_yields_titled_placeholders() {
    let (cfg, stub) = spawn(Stub {
        notion_results: vec![
            json!({
                "object": "page",
                "id": "p1",
                "url": "https://www.notion.so/p1",
                "properties": {
                    "Tags": {"type": "multi_select"},
                    "Title": {"type": "title", "title": [{"plain_text": "Weekly sync"}]}
                }
            }),
            json!({"object": "database", "id": "d1", "title": [{"plain_text": "Tasks"}]}),
            json!({"object": "page", "id": "p2", "properties": {}}),
        ],
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Notion, "secret_abc", None).await;
    let adapter = NotionAdapter::new(&cfg.providers.notion, store, HttpContext::from_config(&cfg));

    let docs = adapter.enumerate("alice", Some("ignored"), 500).await.unwrap();
    let titles: Vec<&str> = docs.iter().map(|d| d.doc.title.as_str()).collect();
    assert_eq!(titles, vec!["Weekly sync", "Tasks", "Untitled"]);
    assert_eq!(docs[0].text(), "[type: Notion page]");
    assert_eq!(docs[1].text(), "[type: Notion database]");
    assert_eq!(
        stub.entries(),
        vec!["notion-search 2022-06-28 page_size=100".to_string()]
    );
}

#[tokio::test]
async fn notion_unauthorized_is_never_refreshed() {
    let (cfg, stub) = spawn(Stub {
        notion_unauthorized: true,
        ..Default::default()
    })
    .await;

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    connect(store.as_ref(), Provider::Notion, "revoked", None).await;
    let adapter = NotionAdapter::new(&cfg.providers.notion, store, HttpContext::from_config(&cfg));

    let docs = adapter.enumerate("alice", None, 10).await.unwrap();
    assert!(docs.is_empty());
    assert_eq!(stub.notion_calls.load(Ordering::SeqCst), 1);
}
