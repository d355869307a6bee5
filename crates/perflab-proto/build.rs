fn main() -> Result<(), Box<dyn std::error::Error>> {
    let say_hello = tonic_build::manual::Method::builder()
        .name("say_hello")
        .route_name("SayHello")
        .input_type("crate::HelloRequest")
        .output_type("crate::HelloReply")
        .codec_path("tonic::codec::ProstCodec")
        .build();

    let greeter = tonic_build::manual::Service::builder()
        .name("Greeter")
        .package("helloworld")
        .comment("The greeting service definition.")
        .method(say_hello)
        .build();

    tonic_build::manual::Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[greeter]);

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
