use super::*;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Bind a fake server on an ephemeral port
async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port with nothing listening on it
async fn closed_port() -> u16 {
    let (listener, port) = listener().await;
    drop(listener);
    port
}

/// Read one RESP array command; `None` once the client hangs up
async fn read_command<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut arg = vec![0u8; len + 2];
        reader.read_exact(&mut arg).await.ok()?;
        arg.truncate(len);
        args.push(String::from_utf8(arg).ok()?);
    }
    Some(args)
}

/// Fake Redis that answers every command and forwards what it received
async fn fake_redis(accepted_password: Option<&'static str>) -> (u16, mpsc::UnboundedReceiver<Vec<String>>) {
    let (listener, port) = listener().await;
    let (seen, commands) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut socket = BufReader::new(socket);
                while let Some(command) = read_command(&mut socket).await {
                    let reply: &[u8] = match command[0].to_ascii_uppercase().as_str() {
                        "AUTH" if Some(command.last().map(String::as_str).unwrap_or("")) != accepted_password => {
                            b"-WRONGPASS invalid username-password pair or user is disabled.\r\n"
                        }
                        "PING" => b"+PONG\r\n",
                        _ => b"+OK\r\n",
                    };
                    let _ = seen.send(command);
                    if socket.get_mut().write_all(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    (port, commands)
}

fn drain_commands(commands: &mut mpsc::UnboundedReceiver<Vec<String>>) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    while let Ok(command) = commands.try_recv() {
        out.push(command);
    }
    out
}

#[tokio::test]
async fn test_redis_ping_without_password() {
    let (port, mut commands) = fake_redis(None).await;

    let metrics = probe_redis(&json!({ "host": "127.0.0.1", "port": port }))
        .await
        .unwrap()
        .unwrap();
    assert!(metrics.latency_ms.is_some());

    let commands = drain_commands(&mut commands);
    assert!(commands.iter().any(|c| c[0] == "PING"));
    assert!(!commands.iter().any(|c| c[0] == "AUTH"));
}

#[tokio::test]
async fn test_redis_authenticates_before_ping() {
    let (port, mut commands) = fake_redis(Some("s3cret")).await;

    let result = probe_redis(&json!({
        "host": "127.0.0.1",
        "port": port.to_string(),
        "password": "s3cret"
    }))
    .await;
    assert!(result.unwrap().is_some());

    let commands = drain_commands(&mut commands);
    assert_eq!(commands[0], vec!["AUTH".to_string(), "s3cret".to_string()]);
}

#[tokio::test]
async fn test_redis_wrong_password_fails() {
    let (port, mut commands) = fake_redis(Some("s3cret")).await;

    let result = timeout(
        Duration::from_secs(5),
        probe_redis(&json!({
            "host": "127.0.0.1",
            "port": port,
            "username": "app",
            "password": "nope"
        })),
    )
    .await
    .expect("redis check hung");
    assert!(result.is_err());

    let commands = drain_commands(&mut commands);
    assert!(commands
        .iter()
        .any(|c| c == &vec!["AUTH".to_string(), "app".to_string(), "nope".to_string()]));
    assert!(!commands.iter().any(|c| c[0] == "PING"));
}

/// Build an AMQP method frame on channel 0
fn amqp_method(class: u16, method: u16, arguments: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + arguments.len());
    payload.extend_from_slice(&class.to_be_bytes());
    payload.extend_from_slice(&method.to_be_bytes());
    payload.extend_from_slice(arguments);

    let mut frame = vec![1, 0, 0];
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame.push(0xCE);
    frame
}

/// Read one frame and return its payload
async fn read_amqp_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Option<Vec<u8>> {
    let mut header = [0u8; 7];
    reader.read_exact(&mut header).await.ok()?;
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;
    let mut payload = vec![0u8; size + 1];
    reader.read_exact(&mut payload).await.ok()?;
    payload.truncate(size);
    Some(payload)
}

fn long_str(value: &str) -> Vec<u8> {
    let mut out = (value.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(value.as_bytes());
    out
}

/// `Connection.Start` offering PLAIN
fn connection_start() -> Vec<u8> {
    let mut arguments = vec![0, 9, 0, 0, 0, 0];
    arguments.extend(long_str("PLAIN"));
    arguments.extend(long_str("en_US"));
    amqp_method(10, 10, &arguments)
}

/// Fake broker that runs the handshake and accepts only `user`/`password`
async fn fake_rabbitmq(user: &'static str, password: &'static str) -> (u16, oneshot::Receiver<Vec<u8>>) {
    let (listener, port) = listener().await;
    let (seen, start_ok) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 8];
        socket.read_exact(&mut header).await.unwrap();
        assert_eq!(&header, b"AMQP\x00\x00\x09\x01");

        socket.write_all(&connection_start()).await.unwrap();
        let Some(reply) = read_amqp_frame(&mut socket).await else {
            return;
        };
        let _ = seen.send(reply.clone());

        let expected = format!("\0{user}\0{password}");
        if !reply.windows(expected.len()).any(|w| w == expected.as_bytes()) {
            let mut close = 403u16.to_be_bytes().to_vec();
            close.push(14);
            close.extend_from_slice(b"ACCESS_REFUSED");
            close.extend_from_slice(&[0, 0, 0, 0]);
            let _ = socket.write_all(&amqp_method(10, 50, &close)).await;
            let _ = read_amqp_frame(&mut socket).await;
            return;
        }

        // Tune: no channel limit, 128 KiB frames, heartbeats off
        let mut tune = 0u16.to_be_bytes().to_vec();
        tune.extend_from_slice(&131_072u32.to_be_bytes());
        tune.extend_from_slice(&0u16.to_be_bytes());
        socket.write_all(&amqp_method(10, 30, &tune)).await.unwrap();

        // TuneOk then Open
        let _ = read_amqp_frame(&mut socket).await;
        let _ = read_amqp_frame(&mut socket).await;
        socket.write_all(&amqp_method(10, 41, &[0])).await.unwrap();

        // Close from the client gets CloseOk
        if read_amqp_frame(&mut socket).await.is_some() {
            let _ = socket.write_all(&amqp_method(10, 51, &[])).await;
        }
    });
    (port, start_ok)
}

#[tokio::test]
async fn test_rabbitmq_handshake_with_credentials() {
    let (port, start_ok) = fake_rabbitmq("app", "s3cret").await;

    let result = timeout(
        Duration::from_secs(5),
        probe_rabbitmq(&json!({
            "host": "127.0.0.1",
            "port": port,
            "username": "app",
            "password": "s3cret"
        })),
    )
    .await
    .expect("rabbitmq check hung");

    assert!(result.unwrap().is_some());
    assert!(start_ok.await.is_ok());
}

#[tokio::test]
async fn test_rabbitmq_wrong_credentials_fail() {
    let (port, start_ok) = fake_rabbitmq("app", "s3cret").await;

    let result = timeout(
        Duration::from_secs(5),
        probe_rabbitmq(&json!({
            "host": "127.0.0.1",
            "port": port,
            "username": "nobody",
            "password": "WRONG"
        })),
    )
    .await;

    let sent = start_ok.await.unwrap();
    assert!(sent.windows(13).any(|w| w == b"\0nobody\0WRONG"));
    assert!(!matches!(result, Ok(Ok(_))));
}

#[tokio::test]
async fn test_rabbitmq_protocol_mismatch() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 8];
        socket.read_exact(&mut header).await.unwrap();
        socket.write_all(b"AMQP\x00\x00\x08\x00").await.unwrap();
    });

    let result = timeout(
        Duration::from_secs(5),
        probe_rabbitmq(&json!({ "host": "127.0.0.1", "port": port })),
    )
    .await;
    assert!(!matches!(result, Ok(Ok(_))));
}

#[tokio::test]
async fn test_nats_info_greeting() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket
            .write_all(b"INFO {\"server_id\":\"test\",\"version\":\"2.10.0\"}\r\n")
            .await
            .unwrap();
    });

    assert!(probe_nats(&json!({ "host": "127.0.0.1", "port": port }))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_kafka_any_reachable_broker_is_enough() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });
    let dead = closed_port().await;

    let access = json!({
        "brokers": [format!("127.0.0.1:{dead}"), format!("127.0.0.1:{port}")]
    });
    assert!(probe_kafka(&access).await.unwrap().is_some());
}

#[tokio::test]
async fn test_connection_refused_is_connect_error() {
    let port = closed_port().await;
    let err = probe_tcp(&json!({ "host": "127.0.0.1", "port": port }), 1433)
        .await
        .unwrap_err();

    match err {
        ProbeError::Connect { address, .. } => assert_eq!(address, format!("127.0.0.1:{port}")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_missing_host_is_invalid_access() {
    let err = probe_nats(&json!({ "port": 4222 })).await.unwrap_err();
    assert!(matches!(err, ProbeError::InvalidAccess(_)));
}

#[test]
fn test_access_port_forms() {
    let access = json!({ "a": 5432, "b": "6379", "c": "", "d": "http", "e": 70000 });
    let access = Access::new(&access);

    assert_eq!(access.port("a", 1).unwrap(), 5432);
    assert_eq!(access.port("b", 1).unwrap(), 6379);
    assert_eq!(access.port("c", 1).unwrap(), 1);
    assert_eq!(access.port("missing", 9).unwrap(), 9);
    assert!(access.port("d", 1).is_err());
    assert!(access.port("e", 1).is_err());
}

#[test]
fn test_no_available_replicas_keeps_counts() {
    let metrics = ProbeError::NoAvailableReplicas { unavailable: 4 }
        .metrics()
        .unwrap();
    assert_eq!(metrics.available_replicas, Some(0));
    assert_eq!(metrics.unavailable_replicas, Some(4));
    assert!(ProbeError::Auth("denied".into()).metrics().is_none());
}
