use axum::{response::Html, routing::get, Router};

const INDEX_HTML: &str = include_str!("../../static/index.html");

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// Configure routes for this module
pub fn routes() -> Router {
    Router::new().route("/", get(index))
}
