//! simstage server API

use crate::app_state::{AppState, SharedAppState};
use crate::cli::CommandLineArgs;
use crate::container::{self, Container, VariableInfo};
use crate::error::SimStageError;
use crate::extract::GirderToken;
use crate::locator;
use crate::metrics::{metrics_handler, record_response_metrics, request_counter};
use crate::models;
use crate::projection::{as_json, as_media_stream};
use crate::stager;
use crate::validated_query::ValidatedQuery;

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::{HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower::Layer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::Level;

/// `axum::Router` wrapped in a layer that removes trailing slashes from request paths.
pub type Service = NormalizePath<Router>;

/// Initialise the application
pub fn init(args: &CommandLineArgs) {
    if args.use_rayon {
        if let Some(thread_limit) = args.thread_limit {
            rayon::ThreadPoolBuilder::new()
                .num_threads(thread_limit)
                .build_global()
                .expect("Failed to build the global Rayon thread pool");
        }
    }
}

/// Returns a [crate::app::Service] for the simstage server API
///
/// The service is populated with all routes as well as the following middleware:
///
/// * a [tower_http::trace::TraceLayer] for tracing requests and responses
/// * a [tower_http::cors::CorsLayer] applying the configured CORS policy
/// * a [tower_http::normalize_path::NormalizePathLayer] for trimming trailing slashes from
///   requests
pub fn service(args: &CommandLineArgs) -> Service {
    service_with_state(Arc::new(AppState::new(args)))
}

/// Returns a [crate::app::Service] using the given shared state.
fn service_with_state(state: SharedAppState) -> Service {
    NormalizePathLayer::trim_trailing_slash().layer(router(state))
}

/// Returns a [axum::Router] with all routes and middleware.
pub fn router(state: SharedAppState) -> Router {
    let cors = cors_layer(&state.args.cors_domain);

    fn v1() -> Router<SharedAppState> {
        Router::new()
            .route("/groups/:group_id/timesteps", get(timesteps))
            .route(
                "/groups/:group_id/timesteps/:timestep/variables",
                get(variables),
            )
            .route(
                "/groups/:group_id/variables/:variable_id/timesteps/:timestep/plot",
                get(plot),
            )
    }

    Router::new()
        .route("/health", get(health))
        .route("/api/movie/:item_id", get(movie))
        .nest("/api/v1", v1())
        .with_state(state)
        .route("/metrics", get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_request(request_counter)
                .on_response(record_response_metrics),
        )
        .layer(cors)
}

/// Build the CORS policy from the configured domain: `*` allows any origin.
fn cors_layer(domain: &str) -> CorsLayer {
    let origin = if domain == "*" {
        AllowOrigin::from(Any)
    } else {
        match HeaderValue::from_str(domain) {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(_) => {
                tracing::warn!(domain, "invalid CORS domain, denying cross-origin requests");
                AllowOrigin::list([])
            }
        }
    };
    CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .allow_origin(origin)
}

/// Run a CPU-bound closure off the async executor.
///
/// Runs on the Rayon pool if enabled, otherwise on a Tokio blocking thread while holding a task
/// permit.
async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, SimStageError>
where
    F: FnOnce() -> Result<T, SimStageError> + Send + 'static,
    T: Send + 'static,
{
    if state.args.use_rayon {
        tokio_rayon::spawn(f).await
    } else {
        let _task_permit = state.resource_manager.task().await?;
        tokio::task::spawn_blocking(f).await?
    }
}

async fn health() -> Json<models::Health> {
    Json(models::Health::ok())
}

/// Timesteps of a group in ascending order
async fn timesteps(
    State(state): State<SharedAppState>,
    path: Result<Path<models::GroupPath>, PathRejection>,
    GirderToken(token): GirderToken,
) -> Result<Response, SimStageError> {
    let Path(path) = path?;
    let timesteps = locator::list_timesteps(state.store.as_ref(), &token, &path.group_id).await?;
    Ok(as_json(timesteps))
}

/// Name, type and shape of each variable in a timestep's container
async fn variables(
    State(state): State<SharedAppState>,
    path: Result<Path<models::TimestepPath>, PathRejection>,
    GirderToken(token): GirderToken,
) -> Result<Response, SimStageError> {
    let Path(path) = path?;
    let item = locator::locate_timestep_item(
        state.store.as_ref(),
        &token,
        &path.group_id,
        path.timestep,
    )
    .await?;
    let scratch = state.scratch.dir()?;
    let root = stager::stage(
        state.store.as_ref(),
        &token,
        &item.id,
        &scratch,
        &state.resource_manager,
    )
    .await?;
    let pattern = state.args.container_pattern.clone();
    let variables = run_blocking(&state, move || -> Result<Vec<VariableInfo>, SimStageError> {
        let path = container::find_container(&root, &pattern)?;
        let variables = Container::open(&path)?.variables();
        scratch.close()?;
        Ok(variables)
    })
    .await?;
    Ok(as_json(variables))
}

/// A variable of one timestep as nested JSON arrays
async fn plot(
    State(state): State<SharedAppState>,
    path: Result<Path<models::PlotPath>, PathRejection>,
    ValidatedQuery(query): ValidatedQuery<models::PlotQuery>,
    token: Result<GirderToken, SimStageError>,
) -> Result<Response, SimStageError> {
    let Path(path) = path?;
    if query.format == models::PlotFormat::Vtk {
        tracing::debug!("vtk plot format is not implemented");
        return Ok(().into_response());
    }
    let GirderToken(token) = token?;
    let item = locator::locate_timestep_item(
        state.store.as_ref(),
        &token,
        &path.group_id,
        path.timestep,
    )
    .await?;
    let scratch = state.scratch.dir()?;
    let root = stager::stage(
        state.store.as_ref(),
        &token,
        &item.id,
        &scratch,
        &state.resource_manager,
    )
    .await?;
    let pattern = state.args.container_pattern.clone();
    let name = path.variable_id;
    let value = run_blocking(&state, move || {
        let path = container::find_container(&root, &pattern)?;
        let value = container::read_variable(&path, &name)?.into_json()?;
        scratch.close()?;
        Ok(value)
    })
    .await?;
    Ok(as_json(value))
}

/// An item's frames encoded as an mp4 video
async fn movie(
    State(state): State<SharedAppState>,
    path: Result<Path<models::MoviePath>, PathRejection>,
    ValidatedQuery(query): ValidatedQuery<models::MovieQuery>,
    GirderToken(token): GirderToken,
) -> Result<Response, SimStageError> {
    let Path(path) = path?;
    let output = state.scratch.file(".mp4")?;
    let scratch = state.scratch.dir()?;
    let frames = stager::stage(
        state.store.as_ref(),
        &token,
        &path.item_id,
        &scratch,
        &state.resource_manager,
    )
    .await?;
    let framerate = query.framerate.unwrap_or(state.args.framerate);
    {
        let _transcode_permit = state.resource_manager.transcode().await?;
        state
            .transcoder
            .transcode(&frames, framerate, output.path())
            .await?;
    }
    scratch.close()?;
    as_media_stream(output, "video/mp4")
}
