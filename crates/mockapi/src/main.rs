use std::sync::Arc;

use bottega_mockapi::MockState;

#[tokio::main]
async fn main() {
    bottega_observability::init();

    let state = Arc::new(MockState::new());
    let app = bottega_mockapi::build_app(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:5000")
        .await
        .expect("failed to bind 0.0.0.0:5000");

    tracing::info!("mock API listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
