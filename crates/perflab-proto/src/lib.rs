//! Wire types for the `helloworld.Greeter` service.
//!
//! Messages are declared with prost derives and match `helloworld.proto` field for field;
//! the tonic client and server stubs are generated by `build.rs`.

use serde::{Deserialize, Serialize};

/// Fully qualified route of the unary `SayHello` call.
pub const SAY_HELLO_METHOD: &str = "helloworld.Greeter/SayHello";

/// The request message containing the user's name.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub name: ::prost::alloc::string::String,
}

/// The response message containing the greeting.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct HelloReply {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub message: ::prost::alloc::string::String,
}

include!(concat!(env!("OUT_DIR"), "/helloworld.Greeter.rs"));

pub use greeter_client::GreeterClient;
pub use greeter_server::{Greeter, GreeterServer};
