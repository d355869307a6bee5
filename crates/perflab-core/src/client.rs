//! The RPC collaborator the load driver calls into.

use async_trait::async_trait;
use perflab_proto::{GreeterClient, HelloRequest, SAY_HELLO_METHOD};
use std::time::{Duration, Instant};
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::info;

use crate::config::TargetConfig;
use crate::error::PerfLabResult;

/// A single unary call to issue, repeated for every sample.
#[derive(Debug, Clone)]
pub struct GrpcRequest {
    /// Route such as `helloworld.Greeter/SayHello`
    pub method: String,
    pub payload: HelloRequest,
    pub deadline: Duration,
}

impl GrpcRequest {
    pub fn from_config(target: &TargetConfig) -> PerfLabResult<Self> {
        Ok(Self {
            method: target.method.clone(),
            payload: target.request()?,
            deadline: target.deadline(),
        })
    }
}

/// Outcome of one call.
#[derive(Debug, Clone, Copy)]
pub struct GrpcResponse {
    pub status: Code,
    pub latency: Duration,
}

impl GrpcResponse {
    pub fn is_ok(&self) -> bool {
        self.status == Code::Ok
    }
}

/// Issues one unary RPC and reports how it went.
///
/// Implementations never fail: transport problems are reported through `status`.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn invoke(&self, request: &GrpcRequest) -> GrpcResponse;
}

/// Greeter client over a lazily connected tonic channel.
#[derive(Clone)]
pub struct GreeterServiceCall {
    client: GreeterClient<Channel>,
}

impl GreeterServiceCall {
    /// Build the channel without connecting; the first call dials the endpoint.
    pub fn connect_lazy(target: &TargetConfig) -> PerfLabResult<Self> {
        let endpoint = Endpoint::from_shared(target.endpoint.clone())?
            .connect_timeout(target.connect_timeout())
            .http2_keep_alive_interval(target.keep_alive_interval())
            .keep_alive_timeout(target.keep_alive_timeout())
            .keep_alive_while_idle(true);

        info!(endpoint = %target.endpoint, method = %target.method, "Initialized gRPC channel");

        Ok(Self::new(endpoint.connect_lazy()))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            client: GreeterClient::new(channel),
        }
    }
}

#[async_trait]
impl RpcClient for GreeterServiceCall {
    async fn invoke(&self, request: &GrpcRequest) -> GrpcResponse {
        let started = Instant::now();

        let status = if request.method == SAY_HELLO_METHOD {
            let mut call = tonic::Request::new(request.payload.clone());
            call.set_timeout(request.deadline);

            // GreeterClient is a cheap handle over the shared channel
            let mut client = self.client.clone();
            match client.say_hello(call).await {
                Ok(_) => Code::Ok,
                Err(status) => status.code(),
            }
        } else {
            Code::Unimplemented
        };

        GrpcResponse {
            status,
            latency: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_method_is_unimplemented() {
        let target = TargetConfig::default();
        let client = GreeterServiceCall::connect_lazy(&target).unwrap();

        let request = GrpcRequest {
            method: "helloworld.Greeter/SayGoodbye".to_string(),
            ..GrpcRequest::from_config(&target).unwrap()
        };

        let response = client.invoke(&request).await;
        assert_eq!(response.status, Code::Unimplemented);
        assert!(!response.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error_sample() {
        let target = TargetConfig {
            // port 9 (discard) is closed on test machines
            endpoint: "http://127.0.0.1:9".to_string(),
            deadline_ms: 200,
            connect_timeout_ms: 200,
            ..TargetConfig::default()
        };
        let client = GreeterServiceCall::connect_lazy(&target).unwrap();
        let request = GrpcRequest::from_config(&target).unwrap();

        let response = client.invoke(&request).await;
        assert!(!response.is_ok());
    }

    #[test]
    fn test_request_from_config() {
        let request = GrpcRequest::from_config(&TargetConfig::default()).unwrap();
        assert_eq!(request.method, SAY_HELLO_METHOD);
        assert_eq!(request.payload.name, "World");
        assert_eq!(request.deadline, Duration::from_secs(1));
    }
}
