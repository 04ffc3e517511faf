//! Server-rendered HTML explorer.
//!
//! Views go through the shared dispatcher on the `explorer` transport.
//! A public failure renders the error page with status 400, anything else
//! with status 500.

pub mod format;
pub mod paging;
mod search;
mod templates;
mod views;

pub use search::search;
pub use templates::{minify, TemplateSet, TemplateStore, TEMPLATE_NAMES};
pub use views::{location, pager, View};

use crate::domain::Transport;
use crate::rest::QueryParams;
use crate::state::SharedState;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use explorer_types::ApiResult;
use self::format::escape_html;
use std::collections::HashMap;
use std::future::Future;
use tracing::error;

/// Content type of every explorer page
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

type Q = Query<HashMap<String, String>>;

/// Run a view and turn it into a page or a redirect.
pub async fn render<F>(state: &SharedState, action: &str, view: F) -> Response
where
    F: Future<Output = ApiResult<View>>,
{
    let dispatcher = &state.dispatcher;
    dispatcher.metrics().record_view(action);
    match dispatcher.run(Transport::Explorer, action, view).await {
        Ok(View::Redirect(to)) => (StatusCode::FOUND, [(header::LOCATION, to)]).into_response(),
        Ok(View::Page {
            template,
            title,
            slots,
        }) => page(state, StatusCode::OK, template, &title, &slots),
        Err(failure) => {
            let message = failure.http_message(dispatcher.debug());
            page(
                state,
                failure.status(),
                "error",
                "Error",
                &[("message", escape_html(&message))],
            )
        }
    }
}

fn page(state: &SharedState, status: StatusCode, template: &str, title: &str, slots: &[(&str, String)]) -> Response {
    match state
        .templates
        .current()
        .and_then(|set| set.render_page(template, title, slots))
    {
        Ok(body) => (status, [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(template, error = %e, "Template rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Explorer routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/",
            get(|State(s): State<SharedState>| async move { render(&s, "index", views::index(&s)).await }),
        )
        .route(
            "/tx/:txid",
            get(|State(s): State<SharedState>, Path(txid): Path<String>| async move {
                render(&s, "tx", views::tx(&s, &txid)).await
            }),
        )
        .route(
            "/spending/:txid/:vout",
            get(
                |State(s): State<SharedState>, Path((txid, vout)): Path<(String, String)>| async move {
                    render(&s, "spendingtx", views::spending(&s, &txid, &vout)).await
                },
            ),
        )
        .route(
            "/address/:address",
            get(|State(s): State<SharedState>, Path(a): Path<String>, Query(q): Q| async move {
                let q = QueryParams::from(q);
                render(&s, "address", views::address(&s, &a, &q)).await
            }),
        )
        .route(
            "/xpub/:xpub",
            get(|State(s): State<SharedState>, Path(x): Path<String>, Query(q): Q| async move {
                let q = QueryParams::from(q);
                render(&s, "xpub", views::xpub(&s, &x, &q)).await
            }),
        )
        .route(
            "/block/:id",
            get(|State(s): State<SharedState>, Path(id): Path<String>, Query(q): Q| async move {
                let q = QueryParams::from(q);
                render(&s, "block", views::block(&s, &id, &q)).await
            }),
        )
        .route(
            "/blocks",
            get(|State(s): State<SharedState>, Query(q): Q| async move {
                let q = QueryParams::from(q);
                render(&s, "blocks", views::blocks(&s, &q)).await
            }),
        )
        .route(
            "/mempool",
            get(|State(s): State<SharedState>, Query(q): Q| async move {
                let q = QueryParams::from(q);
                render(&s, "mempool", views::mempool(&s, &q)).await
            }),
        )
        .route(
            "/search",
            get(|State(s): State<SharedState>, Query(q): Q| async move {
                let q = QueryParams::from(q);
                render(&s, "search", search(&s, q.get("q"))).await
            }),
        )
        .route(
            "/sendtx",
            get(|State(s): State<SharedState>| async move {
                render(&s, "sendtx", views::send_tx(&s, None)).await
            })
            .post(
                |State(s): State<SharedState>, Form(form): Form<HashMap<String, String>>| async move {
                    render(&s, "sendtx", views::send_tx(&s, Some(form))).await
                },
            ),
        )
}
