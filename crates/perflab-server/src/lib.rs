//! Instrumented `helloworld.Greeter` target service.

pub mod metrics;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use perflab_proto::{Greeter, GreeterServer, HelloReply, HelloRequest};
use std::future::Future;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::info;

/// Method label used for `SayHello` metrics.
const SAY_HELLO: &str = "SayHello";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Greets by name and records one sample per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreeterService;

#[tonic::async_trait]
impl Greeter for GreeterService {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let started = Instant::now();

        let reply = HelloReply {
            message: format!("Hello {}", request.into_inner().name),
        };

        metrics::REQUESTS_PROCESSED
            .with_label_values(&[SAY_HELLO])
            .inc();
        metrics::REQUEST_DURATION
            .with_label_values(&[SAY_HELLO])
            .observe(started.elapsed().as_secs_f64());

        Ok(Response::new(reply))
    }
}

/// HTTP router exposing `/metrics`.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::export(),
    )
}

/// Serve the Greeter on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    metrics::init();
    info!("server listening at {}", listener.local_addr()?);

    Server::builder()
        .add_service(GreeterServer::new(GreeterService))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    Ok(())
}
