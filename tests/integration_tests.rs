//! End-to-end coverage over an in-memory duplex pipe, mirroring the
//! teacher's `tests/integration_tests.rs`: exercise `Framing` and
//! `Protocol` together instead of unit-testing either in isolation.

use anyhow::Result;

use inc_transport::config::ServerConfig;
use inc_transport::message::{MessageFlags, MessageType};
use inc_transport::protocol::{IoTransport, Protocol, ProtocolEvent, Role};
use inc_transport::VersionPolicy;

type Endpoint = Protocol<
    IoTransport<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>,
>;

fn client_and_server(client_config: ServerConfig, server_config: ServerConfig) -> (Endpoint, Endpoint) {
    let (a, b) = tokio::io::duplex(8192);
    let (ar, aw) = tokio::io::split(a);
    let (br, bw) = tokio::io::split(b);
    let client = Protocol::new(IoTransport::new(ar, aw), client_config, 1, Role::Client);
    let server = Protocol::new(IoTransport::new(br, bw), server_config, 1, Role::Server);
    (client, server)
}

#[tokio::test]
async fn handshake_then_method_call_round_trips() -> Result<()> {
    let (mut client, mut server) = client_and_server(ServerConfig::default(), ServerConfig::default());

    let server_task = tokio::spawn(async move {
        server.handshake().await.unwrap();
        let mut events = server.subscribe_events();
        server.poll_once().await.unwrap();
        match events.recv().await.unwrap() {
            ProtocolEvent::Message(request) => {
                assert_eq!(request.header.message_type, MessageType::MethodCall);
                assert_eq!(request.payload, b"ping");
                server
                    .reply(&request, MessageType::MethodReply, b"pong".to_vec())
                    .await
                    .unwrap();
            }
            other => panic!("unexpected event: {other:?}"),
        }
    });

    client.handshake().await?;
    let reply = client.send(MessageType::MethodCall, b"ping".to_vec()).await?;
    assert_eq!(reply.payload, b"pong");

    server_task.await?;
    Ok(())
}

#[tokio::test]
async fn strict_version_policy_rejects_mismatched_offer() -> Result<()> {
    let server_config = ServerConfig::builder()
        .min_version(2)
        .max_version(2)
        .version_policy(VersionPolicy::Strict)
        .build()?;
    let client_config = ServerConfig::builder().min_version(1).max_version(1).build()?;
    let (mut client, mut server) = client_and_server(client_config, server_config);

    let server_task = tokio::spawn(async move { server.handshake().await });

    let client_result = client.handshake().await;
    assert!(client_result.is_err());
    let server_result = server_task.await?;
    assert!(server_result.is_err());
    Ok(())
}

#[tokio::test]
async fn large_binary_payload_travels_as_shm_reference() -> Result<()> {
    let mut client_config = ServerConfig::default();
    client_config.shared_memory_threshold = 16;
    let server_config = ServerConfig::default();
    let (mut client, mut server) = client_and_server(client_config, server_config);

    let payload = vec![7u8; 1024];
    let server_task = tokio::spawn(async move {
        let mut events = server.subscribe_events();
        server.poll_once().await.unwrap();
        match events.recv().await.unwrap() {
            ProtocolEvent::Message(msg) => {
                assert!(msg.header.flags.contains(MessageFlags::SHM_DATA));
                let (_, _, length) = msg.shm_ref().unwrap();
                assert_eq!(length, 1024);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    });

    client.send_binary(&payload).await?;
    server_task.await?;
    Ok(())
}

#[tokio::test]
async fn ping_is_echoed_as_pong() -> Result<()> {
    let (mut client, mut server) = client_and_server(ServerConfig::default(), ServerConfig::default());

    let server_task = tokio::spawn(async move {
        server.poll_once().await.unwrap();
    });

    client.ping().await?;
    server_task.await?;
    Ok(())
}
