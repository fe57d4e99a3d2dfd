/// HTTP API for creating, listing, querying, and deleting views
use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, FromRequest, HttpRequest, HttpResponse, HttpServer, ResponseError};
use std::collections::HashMap;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::column::{ColumnType, ColumnValue};
use crate::config::{ConfigError, RequestContext, ServerConfig, APP_ID_HEADER, DEFAULT_MAX_APPS};
use crate::error::{ErrorKind, StoreError, ViewError};
use crate::messages::{CreateViewRequest, MessageResponse, TableQuery, ViewQueryParams};
use crate::service::ViewService;
use crate::store::MemoryStore;
use crate::table::Schema;

pub type AppService = ViewService<MemoryStore, MemoryStore>;

/// Error returned by handlers, rendered as `{ "message": ... }`
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Server already holds the maximum of {0} apps")]
    AppLimit(usize),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Config(_) => StatusCode::BAD_REQUEST,
            ApiError::AppLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::View(ViewError::Store(StoreError::TableNotFound(_))) => StatusCode::NOT_FOUND,
            ApiError::View(err) => match err.kind() {
                ErrorKind::Definition => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(MessageResponse::new(self.to_string()))
    }
}

impl FromRequest for RequestContext {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let header = req
            .headers()
            .get(APP_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        ready(RequestContext::from_header(header).map_err(ApiError::from))
    }
}

/// Shared server state: one store per application id, at most `max_apps`
/// of them. Stores live for the lifetime of the server.
pub struct AppState {
    apps: Mutex<HashMap<String, Arc<AppService>>>,
    max_apps: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_APPS)
    }
}

impl AppState {
    pub fn new(max_apps: usize) -> Self {
        Self {
            apps: Mutex::new(HashMap::new()),
            max_apps,
        }
    }

    /// The service for an app, created and seeded on first use
    pub fn service(&self, ctx: &RequestContext) -> Result<Arc<AppService>, ApiError> {
        let mut apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(service) = apps.get(&ctx.app_id) {
            return Ok(Arc::clone(service));
        }
        if apps.len() >= self.max_apps {
            log::warn!("Rejecting app '{}': {} apps already loaded", ctx.app_id, apps.len());
            return Err(ApiError::AppLimit(self.max_apps));
        }

        let store = Arc::new(MemoryStore::new());
        seed_demo_table(&store).map_err(ViewError::from)?;
        log::info!("Created store for app '{}'", ctx.app_id);

        let service = Arc::new(ViewService::new(Arc::clone(&store), store));
        apps.insert(ctx.app_id.clone(), Arc::clone(&service));
        Ok(service)
    }
}

/// Demo `sales` table every new app starts with
fn seed_demo_table(store: &MemoryStore) -> Result<(), StoreError> {
    store.create_table(
        "ta_sales",
        "sales",
        Schema::new(vec![
            ("Price".to_string(), ColumnType::Number),
            ("Category".to_string(), ColumnType::String),
        ]),
    )?;
    for (price, category) in [(1000.0, "One"), (2000.0, "One"), (4000.0, "Two")] {
        let mut row = HashMap::new();
        row.insert("Price".to_string(), ColumnValue::Number(price));
        row.insert("Category".to_string(), ColumnValue::from(category));
        store.insert_row("ta_sales", row)?;
    }
    Ok(())
}

async fn create_view(
    ctx: RequestContext,
    state: web::Data<AppState>,
    body: web::Json<CreateViewRequest>,
) -> Result<HttpResponse, ApiError> {
    let service = state.service(&ctx)?;
    let (table_id, definition) = body.into_inner().into_definition();
    let view = service.registry().create_or_replace(&table_id, definition)?;

    Ok(HttpResponse::Ok()
        .insert_header(("x-message", format!("View {} saved successfully.", view.name)))
        .json(view))
}

async fn list_views(
    ctx: RequestContext,
    state: web::Data<AppState>,
    query: web::Query<TableQuery>,
) -> Result<HttpResponse, ApiError> {
    let service = state.service(&ctx)?;
    let views = match query.table_id.as_deref() {
        Some(table_id) => service.list_views(table_id)?,
        None => service.registry().list_all_valid()?,
    };
    Ok(HttpResponse::Ok().json(views))
}

async fn query_view(
    ctx: RequestContext,
    state: web::Data<AppState>,
    name: web::Path<String>,
    params: web::Query<ViewQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let service = state.service(&ctx)?;
    let name = name.into_inner();
    let table_id = match params.table_id.clone() {
        Some(table_id) => table_id,
        None => service.registry().locate(&name)?.table_id,
    };

    let output = service.query_view(
        &table_id,
        &name,
        params.calculation.as_deref().filter(|kind| !kind.is_empty()),
        params.group.as_deref().filter(|group| !group.is_empty()),
    )?;
    Ok(HttpResponse::Ok().json(output))
}

async fn delete_view(
    ctx: RequestContext,
    state: web::Data<AppState>,
    name: web::Path<String>,
    query: web::Query<TableQuery>,
) -> Result<HttpResponse, ApiError> {
    let service = state.service(&ctx)?;
    let name = name.into_inner();
    let table_id = match query.table_id.clone() {
        Some(table_id) => Some(table_id),
        None => match service.registry().locate(&name) {
            Ok(view) => Some(view.table_id),
            Err(ViewError::ViewNotFound { .. }) => None,
            Err(err) => return Err(err.into()),
        },
    };

    if let Some(table_id) = table_id {
        service.delete_view(&table_id, &name)?;
    }
    Ok(HttpResponse::Ok().json(MessageResponse::new(format!("View {} deleted.", name))))
}

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "TableViews server is running"
    }))
}

/// Register the API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/views", web::post().to(create_view))
            .route("/views", web::get().to(list_views))
            .route("/views/{name}", web::get().to(query_view))
            .route("/views/{name}", web::delete().to(delete_view)),
    )
    .route("/health", web::get().to(health_check));
}

/// Start the HTTP server
pub async fn run_server(config: &ServerConfig) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(config.max_apps));

    log::info!("TableViews server listening on http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            // CORS for development
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_headers(vec!["x-message"])
                    .max_age(3600),
            )
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use serde_json::{json, Value as JsonValue};

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(AppState::default()))
                    .configure(configure),
            )
            .await
        };
    }

    fn stats_view() -> JsonValue {
        json!({
            "name": "TestView",
            "tableId": "ta_sales",
            "field": "Price",
            "calculation": "stats"
        })
    }

    #[actix_web::test]
    async fn test_health() {
        let app = app!();
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: JsonValue = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn test_missing_app_id() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/views").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_create_and_query_view() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/views")
            .insert_header((APP_ID_HEADER, "app_1"))
            .set_json(stats_view())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("x-message").unwrap(),
            "View TestView saved successfully."
        );
        let view: JsonValue = test::read_body_json(resp).await;
        assert_eq!(view["schema"]["avg"]["type"], "number");

        let req = test::TestRequest::get()
            .uri("/api/views/TestView")
            .insert_header((APP_ID_HEADER, "app_1"))
            .to_request();
        let body: JsonValue = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["sum"], 7000.0);
        assert_eq!(body[0]["count"], 3);

        let req = test::TestRequest::get()
            .uri("/api/views/TestView?calculation=stats&group=Category&tableId=ta_sales")
            .insert_header((APP_ID_HEADER, "app_1"))
            .to_request();
        let body: JsonValue = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["group"], "One");
        assert_eq!(body[1]["sum"], 4000.0);
    }

    #[actix_web::test]
    async fn test_apps_are_isolated() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/views")
            .insert_header((APP_ID_HEADER, "app_1"))
            .set_json(stats_view())
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get()
            .uri("/api/views")
            .insert_header((APP_ID_HEADER, "app_2"))
            .to_request();
        let body: JsonValue = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!([]));
    }

    #[actix_web::test]
    async fn test_app_ids_are_validated_and_bounded() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(1)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/views")
            .insert_header((APP_ID_HEADER, "bad id!"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        for (app_id, status) in [
            ("app_1", StatusCode::OK),
            ("app_2", StatusCode::SERVICE_UNAVAILABLE),
            ("app_1", StatusCode::OK),
        ] {
            let req = test::TestRequest::get()
                .uri("/api/views")
                .insert_header((APP_ID_HEADER, app_id))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), status);
        }
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let app = app!();
        let mut bad = stats_view();
        bad["field"] = json!("Category");
        let req = test::TestRequest::post()
            .uri("/api/views")
            .insert_header((APP_ID_HEADER, "app_1"))
            .set_json(bad)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/views/Nope")
            .insert_header((APP_ID_HEADER, "app_1"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: MessageResponse = test::read_body_json(resp).await;
        assert!(body.message.contains("Nope"));

        let req = test::TestRequest::get()
            .uri("/api/views?tableId=ta_missing")
            .insert_header((APP_ID_HEADER, "app_1"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_delete_is_idempotent() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/views")
            .insert_header((APP_ID_HEADER, "app_1"))
            .set_json(stats_view())
            .to_request();
        test::call_service(&app, req).await;

        for _ in 0..2 {
            let req = test::TestRequest::delete()
                .uri("/api/views/TestView")
                .insert_header((APP_ID_HEADER, "app_1"))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let req = test::TestRequest::get()
            .uri("/api/views?tableId=ta_sales")
            .insert_header((APP_ID_HEADER, "app_1"))
            .to_request();
        let body: JsonValue = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!([]));
    }
}
