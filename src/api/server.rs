//! Actix-web server for the Schema-Loom API (feature-gated)

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use anyhow::{anyhow, Context};
use serde::Serialize;
use tokio::runtime::Runtime;
use uuid::Uuid;

use crate::persistence::settings::AppSettings;
use crate::schema_utils::schema::{ForeignKey, Field, SchemaDocument, TableUpdate, UpdateError};
use crate::schema_utils::sql_import;

// Store server state for stop/restart
struct ServerState {
    handle: Option<actix_web::dev::ServerHandle>,
    runtime: Option<Runtime>,
}

static SERVER_STATE: once_cell::sync::Lazy<Arc<Mutex<ServerState>>> = once_cell::sync::Lazy::new(|| {
    Arc::new(Mutex::new(ServerState { handle: None, runtime: None }))
});

#[derive(Clone)]
struct Cfg {
    api_key: Option<String>,
    log_dir: PathBuf,
}

type Store = Mutex<SchemaDocument>;

fn ensure_dir(p: &Path) {
    if let Some(parent) = p.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

fn log_line(dir: &Path, line: &str) {
    use std::io::Write;
    let now = time::OffsetDateTime::now_utc();
    let date = time::macros::format_description!("[year][month][day]");
    let ts = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let fname = match now.format(&date) { Ok(s) => format!("api_{}.log", s), Err(_) => "api.log".to_string() };
    let path = dir.join(fname);
    ensure_dir(&path);
    let ts_s = now.format(&ts).unwrap_or_else(|_| String::new());
    let msg = format!("{} | {}\n", ts_s, line);
    if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        let _ = f.write_all(msg.as_bytes());
    }
}

fn next_request_id() -> String {
    Uuid::now_v7().as_simple().to_string()
}

/// Load the document the server hands out: `.sql` dumps go through the
/// importer, anything else is read as a JSON schema document.
pub fn load_source(path: &Path) -> anyhow::Result<SchemaDocument> {
    let is_sql = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("sql"))
        .unwrap_or(false);
    if is_sql {
        return sql_import::import_sql_file(path);
    }
    let s = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(SchemaDocument::from_json(&s)?)
}

#[derive(Serialize)]
struct TableDto<'a> {
    name: &'a str,
    fields: &'a [Field],
    foreign_keys: &'a [ForeignKey],
}

fn unauthorized() -> HttpResponse { HttpResponse::Unauthorized().body("unauthorized") }

fn check_api_key(req: &HttpRequest, cfg: &Cfg) -> bool {
    match &cfg.api_key {
        None => true,
        Some(required) => match req.headers().get("X-API-Key") {
            Some(h) => h.to_str().map(|v| v == required).unwrap_or(false),
            None => false,
        },
    }
}

fn peer(req: &HttpRequest) -> String {
    req.peer_addr().map(|a| a.to_string()).unwrap_or_else(|| "unknown".into())
}

async fn get_schema(cfg: web::Data<Cfg>, store: web::Data<Store>, req: HttpRequest) -> impl Responder {
    if !check_api_key(&req, &cfg) { return unauthorized(); }
    let rid = next_request_id();
    let doc = match store.lock() {
        Ok(d) => d.clone(),
        Err(_) => return HttpResponse::InternalServerError().body("schema store poisoned"),
    };
    log_line(&cfg.log_dir, &format!("RID={} GET /api/schema from {} tables={} rels={} rev={}", rid, peer(&req), doc.tables.len(), doc.relationships.len(), doc.revision));
    HttpResponse::Ok().json(doc)
}

async fn get_table(cfg: web::Data<Cfg>, store: web::Data<Store>, req: HttpRequest, name: web::Path<String>) -> impl Responder {
    if !check_api_key(&req, &cfg) { return unauthorized(); }
    let rid = next_request_id();
    let doc = match store.lock() {
        Ok(d) => d,
        Err(_) => return HttpResponse::InternalServerError().body("schema store poisoned"),
    };
    match doc.get_table(&name) {
        Some(t) => {
            log_line(&cfg.log_dir, &format!("RID={} GET /api/table/{} from {} OK", rid, name, peer(&req)));
            HttpResponse::Ok().json(TableDto { name: &name, fields: &t.fields, foreign_keys: &t.foreign_keys })
        }
        None => {
            log_line(&cfg.log_dir, &format!("RID={} GET /api/table/{} from {} NOT FOUND", rid, name, peer(&req)));
            HttpResponse::NotFound().json(serde_json::json!({ "error": "Table not found" }))
        }
    }
}

async fn put_table(
    cfg: web::Data<Cfg>,
    store: web::Data<Store>,
    req: HttpRequest,
    name: web::Path<String>,
    body: web::Json<TableUpdate>,
) -> impl Responder {
    if !check_api_key(&req, &cfg) { return unauthorized(); }
    let rid = next_request_id();
    let mut doc = match store.lock() {
        Ok(d) => d,
        Err(_) => return HttpResponse::InternalServerError().body("schema store poisoned"),
    };
    let update = body.into_inner();
    let new_name = update.name.clone();
    let res = doc.apply_update(&name, update).map(|_| ());
    match res {
        Ok(()) => {
            log_line(&cfg.log_dir, &format!("RID={} PUT /api/table/{} -> {} OK rev={}", rid, name, new_name, doc.revision));
            HttpResponse::Ok().json(&*doc)
        }
        Err(e) => {
            log_line(&cfg.log_dir, &format!("RID={} PUT /api/table/{} ERR {}", rid, name, e));
            let body = serde_json::json!({ "error": e.to_string() });
            match e {
                UpdateError::UnknownTable(_) => HttpResponse::NotFound().json(body),
                UpdateError::RevisionConflict { .. } => HttpResponse::Conflict().json(body),
                UpdateError::NameTaken(_) | UpdateError::Invalid(_) => HttpResponse::UnprocessableEntity().json(body),
            }
        }
    }
}

/// Shared state behind the routes: the served document plus key and log
/// settings. Every worker gets clones of the same handles.
#[derive(Clone)]
pub struct ApiState {
    cfg: web::Data<Cfg>,
    store: web::Data<Store>,
}

impl ApiState {
    pub fn new(document: SchemaDocument, api_key: Option<String>, log_dir: PathBuf) -> Self {
        Self {
            cfg: web::Data::new(Cfg { api_key, log_dir }),
            store: web::Data::new(Mutex::new(document)),
        }
    }

    // Current document, as the next GET would return it
    pub fn snapshot(&self) -> Option<SchemaDocument> {
        self.store.lock().ok().map(|d| d.clone())
    }

    pub fn configure(&self, sc: &mut web::ServiceConfig) {
        sc.app_data(self.cfg.clone())
            .app_data(self.store.clone())
            .route("/api/schema", web::get().to(get_schema))
            .route("/api/table/{name}", web::get().to(get_table))
            .route("/api/table/{name}", web::put().to(put_table));
    }
}

/// Start the server on its own runtime thread. Returns once the listener is
/// bound (or binding failed).
pub fn start_server(cfg: &AppSettings) -> anyhow::Result<()> {
    let source = cfg
        .schema_source
        .clone()
        .ok_or_else(|| anyhow!("no schema source configured for the API server"))?;
    let document = load_source(&source)?;
    let bind = cfg.api_endpoint();
    let api_key = cfg.api_key.clone();
    let log_dir = cfg.api_log_dir();
    stop_server();

    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build() {
                Ok(r) => r,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create tokio runtime for API: {}", e)));
                    return;
                }
            };

        rt.block_on(async move {
            let state = ApiState::new(document, api_key, log_dir.clone());
            log_line(&log_dir, &format!("Server starting on {}", bind));
            let server = match HttpServer::new(move || {
                let state = state.clone();
                App::new().configure(move |sc| state.configure(sc))
            })
            .bind(&bind) {
                Ok(s) => s.run(),
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("API server bind failed on {}: {}", bind, e)));
                    return;
                }
            };
            if let Ok(mut st) = SERVER_STATE.lock() {
                st.handle = Some(server.handle());
            }
            let _ = ready_tx.send(Ok(()));
            let _ = server.await;
        });
        if let Ok(mut st) = SERVER_STATE.lock() {
            st.runtime = Some(rt);
        }
    });

    match ready_rx.recv_timeout(Duration::from_secs(5)) {
        Ok(Ok(())) => {
            log::info!("API server listening on {} (source {})", cfg.api_endpoint(), source.display());
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow!(e)),
        Err(_) => Err(anyhow!("API server did not start in time")),
    }
}

pub fn stop_server() {
    let (handle, rt) = match SERVER_STATE.lock() {
        Ok(mut st) => (st.handle.take(), st.runtime.take()),
        Err(_) => return,
    };
    if let Some(h) = handle {
        let _ = h.stop(false);
        log::info!("API server stopped");
    }
    if let Some(r) = rt {
        r.shutdown_timeout(Duration::from_millis(100));
    }
}

pub fn is_running() -> bool { SERVER_STATE.lock().map(|st| st.handle.is_some()).unwrap_or(false) }
