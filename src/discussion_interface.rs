// Discussion HTTP interface - thin JSON/SSE layer over the post and comment services

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    app_state::AppState,
    error::AppResult,
    models::{Comment, CommentId, NewComment, NewPost, Post, PostId, RootCommentPage},
};

const DEFAULT_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub parent_comment_id: Option<CommentId>,
    pub author: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RootCommentsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// HTTP Handlers

pub async fn list_posts_handler(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.posts.get_all_posts().await?))
}

pub async fn create_post_handler(
    State(state): State<AppState>,
    Json(req): Json<NewPost>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state.posts.create_post(req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<PostId>,
) -> AppResult<Json<Post>> {
    Ok(Json(state.posts.get_post_by_id(id).await?))
}

pub async fn list_root_comments_handler(
    State(state): State<AppState>,
    AxumPath(post_id): AxumPath<PostId>,
    Query(params): Query<RootCommentsQuery>,
) -> AppResult<Json<RootCommentPage>> {
    let page = state
        .comments
        .list_root_comments(
            post_id,
            params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            params.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(page))
}

pub async fn create_comment_handler(
    State(state): State<AppState>,
    AxumPath(post_id): AxumPath<PostId>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .comments
        .submit_comment(NewComment {
            post_id,
            parent_comment_id: req.parent_comment_id,
            author: req.author,
            content: req.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_replies_handler(
    State(state): State<AppState>,
    AxumPath(comment_id): AxumPath<CommentId>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(state.comments.get_replies(comment_id).await?))
}

/// One `comment` event per newly published comment until the bus shuts down
pub async fn stream_comments_handler(
    State(state): State<AppState>,
    AxumPath(post_id): AxumPath<PostId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let subscription = state.comments.subscribe(post_id).await?;
    info!("Streaming new comments of post {}", post_id);

    let events = subscription.map(|comment| {
        Event::default()
            .event("comment")
            .json_data(&comment)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "storage": state.config.storage})),
            )
        }
    }
}

// Create discussion router
pub fn create_discussion_router(state: AppState) -> Router {
    let api = Router::new()
        // Posts
        .route("/posts", get(list_posts_handler).post(create_post_handler))
        .route("/posts/{id}", get(get_post_handler))

        // Comments
        .route(
            "/posts/{id}/comments",
            get(list_root_comments_handler).post(create_comment_handler),
        )
        .route("/posts/{id}/comments/stream", get(stream_comments_handler))
        .route("/comments/{id}/replies", get(get_replies_handler))

        .with_state(state.clone());

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
