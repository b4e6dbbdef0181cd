//! Integration tests against an in-process fake broker: no real cluster is
//! reachable in this environment, so these exercise the full
//! `ClientBuilder` -> `Producer::send` path end to end over a real TCP
//! socket with a hand-rolled responder speaking just enough of the wire
//! protocol to stand in for a broker.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use kafkacore::client::producer::ProducerRecord;
use kafkacore::client::ClientBuilder;
use kafkacore::protocol::api_key::ApiKey;
use kafkacore::protocol::error::Error as ProtocolError;
use kafkacore::protocol::messages::header::RequestHeader;
use kafkacore::protocol::messages::{
    encode_body, MetadataResponse, MetadataResponseBroker, MetadataResponsePartition,
    MetadataResponseTopic, ProduceResponse, ProduceResponsePartition, ProduceResponseTopic,
};
use kafkacore::protocol::traits::{ReadType, WriteType};

const TOPIC: &str = "orders";

/// Reads one request frame and returns `(header, raw remaining body)`.
async fn read_request(socket: &mut TcpStream) -> (RequestHeader, Vec<u8>) {
    let size = socket.read_i32().await.unwrap();
    let mut buf = vec![0u8; size as usize];
    socket.read_exact(&mut buf).await.unwrap();

    let mut cursor = std::io::Cursor::new(buf);
    let header = RequestHeader::read(&mut cursor).unwrap();
    let mut rest = Vec::new();
    std::io::Read::read_to_end(&mut cursor, &mut rest).unwrap();
    (header, rest)
}

async fn write_response(socket: &mut TcpStream, correlation_id: i32, body: &[u8]) {
    let mut framed_body = Vec::new();
    correlation_id.write(&mut framed_body).unwrap();
    framed_body.extend_from_slice(body);

    let mut framed = Vec::new();
    (framed_body.len() as i32).write(&mut framed).unwrap();
    framed.extend_from_slice(&framed_body);
    socket.write_all(&framed).await.unwrap();
}

fn fixed_metadata_response(leader: i32) -> MetadataResponse {
    MetadataResponse {
        brokers: vec![MetadataResponseBroker {
            node_id: 1,
            host: "127.0.0.1".to_string(),
            port: 0, // patched per-test after the listener binds
        }],
        topics: vec![MetadataResponseTopic {
            topic: TOPIC.to_string(),
            error: None,
            partitions: vec![MetadataResponsePartition {
                partition: 0,
                leader,
                replicas: vec![1],
                isr: vec![1],
                error: None,
            }],
        }],
    }
}

/// Accepts one connection and answers every request on it with
/// `next_response(api_key, body) -> Option<body>`; `None` emulates an
/// `acks = 0` fire-and-forget produce (no frame written back at all).
async fn serve_one_connection<F>(listener: TcpListener, mut next_response: F)
where
    F: FnMut(ApiKey, &[u8]) -> Option<Vec<u8>>,
{
    let (mut socket, _) = listener.accept().await.unwrap();
    loop {
        let (header, body) = match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            read_request(&mut socket),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => break, // client dropped/idle: test is done
        };

        match next_response(header.api_key, &body) {
            Some(response_body) => {
                write_response(&mut socket, header.correlation_id, &response_body).await
            }
            None => {}
        }
    }
}

#[tokio::test]
async fn test_produce_acks_one_returns_broker_offset() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as i32;

    let server = tokio::spawn(serve_one_connection(listener, move |api_key, _body| {
        match api_key {
            ApiKey::Metadata => {
                let mut response = fixed_metadata_response(1);
                response.brokers[0].port = port;
                Some(encode_body(&response).unwrap())
            }
            ApiKey::Produce => {
                let response = ProduceResponse {
                    topics: vec![ProduceResponseTopic {
                        topic: TOPIC.to_string(),
                        partitions: vec![ProduceResponsePartition {
                            partition: 0,
                            error: None,
                            base_offset: 42,
                            log_append_time: 1_700_000_000_000,
                        }],
                    }],
                    throttle_time_ms: 0,
                };
                Some(encode_body(&response).unwrap())
            }
            ApiKey::Unknown(_) => None,
        }
    }));

    let addr = format!("127.0.0.1:{port}");
    let client = ClientBuilder::new(vec![addr]).build().await.unwrap();
    let producer = client.producer();

    let result = producer
        .send(ProducerRecord {
            topic: TOPIC.to_string(),
            partition: 0,
            key: None,
            value: Some(b"hello".to_vec()),
            timestamp: None,
        })
        .await
        .unwrap();

    assert_eq!(result.offset, 42);
    assert_eq!(result.timestamp, 1_700_000_000_000);

    client.close().await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), server).await;
}

#[tokio::test]
async fn test_produce_acks_zero_never_awaits_a_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as i32;

    let server = tokio::spawn(serve_one_connection(listener, move |api_key, _body| {
        match api_key {
            ApiKey::Metadata => {
                let mut response = fixed_metadata_response(1);
                response.brokers[0].port = port;
                Some(encode_body(&response).unwrap())
            }
            // Produce with acks=0 gets no response at all.
            ApiKey::Produce => None,
            ApiKey::Unknown(_) => None,
        }
    }));

    let addr = format!("127.0.0.1:{port}");
    let mut producer_config = kafkacore::client::producer::ProducerConfig::default();
    producer_config.acks = 0;

    let client = ClientBuilder::new(vec![addr])
        .producer_config(producer_config)
        .build()
        .await
        .unwrap();
    let producer = client.producer();

    let result = producer
        .send(ProducerRecord {
            topic: TOPIC.to_string(),
            partition: 0,
            key: None,
            value: Some(b"fire and forget".to_vec()),
            timestamp: None,
        })
        .await
        .unwrap();

    assert_eq!(result.offset, -1);
    assert_eq!(result.timestamp, -1);

    client.close().await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), server).await;
}

#[tokio::test]
async fn test_message_too_large_fails_before_any_io() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as i32;

    let server = tokio::spawn(serve_one_connection(listener, move |api_key, _body| match api_key {
        ApiKey::Metadata => {
            let mut response = fixed_metadata_response(1);
            response.brokers[0].port = port;
            Some(encode_body(&response).unwrap())
        }
        _ => None,
    }));

    let addr = format!("127.0.0.1:{port}");
    let mut producer_config = kafkacore::client::producer::ProducerConfig::default();
    producer_config.max_request_size = 8;

    let client = ClientBuilder::new(vec![addr])
        .producer_config(producer_config)
        .build()
        .await
        .unwrap();
    let producer = client.producer();

    let result = producer
        .send(ProducerRecord {
            topic: TOPIC.to_string(),
            partition: 0,
            key: None,
            value: Some(b"this value is much too long for the limit".to_vec()),
            timestamp: None,
        })
        .await;

    assert!(matches!(
        result,
        Err(kafkacore::client::error::Error::MessageTooLarge { .. })
    ));

    client.close().await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), server).await;
}

#[tokio::test]
async fn test_not_leader_for_partition_retries_against_resolved_leader() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as i32;
    let produce_attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let server = tokio::spawn({
        let produce_attempts = Arc::clone(&produce_attempts);
        serve_one_connection(listener, move |api_key, _body| match api_key {
            ApiKey::Metadata => {
                let mut response = fixed_metadata_response(1);
                response.brokers[0].port = port;
                Some(encode_body(&response).unwrap())
            }
            ApiKey::Produce => {
                let attempt = produce_attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let response = if attempt == 0 {
                    // First attempt: the broker claims it is no longer the
                    // leader, forcing metadata invalidation and a retry.
                    ProduceResponse {
                        topics: vec![ProduceResponseTopic {
                            topic: TOPIC.to_string(),
                            partitions: vec![ProduceResponsePartition {
                                partition: 0,
                                error: Some(ProtocolError::NotLeaderForPartition),
                                base_offset: -1,
                                log_append_time: -1,
                            }],
                        }],
                        throttle_time_ms: 0,
                    }
                } else {
                    ProduceResponse {
                        topics: vec![ProduceResponseTopic {
                            topic: TOPIC.to_string(),
                            partitions: vec![ProduceResponsePartition {
                                partition: 0,
                                error: None,
                                base_offset: 7,
                                log_append_time: 1_700_000_000_001,
                            }],
                        }],
                        throttle_time_ms: 0,
                    }
                };
                Some(encode_body(&response).unwrap())
            }
            ApiKey::Unknown(_) => None,
        })
    });

    let addr = format!("127.0.0.1:{port}");
    let mut producer_config = kafkacore::client::producer::ProducerConfig::default();
    producer_config.retries = 1;

    let client = ClientBuilder::new(vec![addr])
        .producer_config(producer_config)
        .build()
        .await
        .unwrap();
    let producer = client.producer();

    let result = producer
        .send(ProducerRecord {
            topic: TOPIC.to_string(),
            partition: 0,
            key: None,
            value: Some(b"retry me".to_vec()),
            timestamp: None,
        })
        .await
        .unwrap();

    assert_eq!(result.offset, 7);
    assert_eq!(produce_attempts.load(std::sync::atomic::Ordering::SeqCst), 2);

    client.close().await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), server).await;
}

#[tokio::test]
async fn test_concurrent_fetch_topics_coalesce_into_one_metadata_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as i32;
    let metadata_requests = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let server = tokio::spawn({
        let metadata_requests = Arc::clone(&metadata_requests);
        serve_one_connection(listener, move |api_key, _body| match api_key {
            ApiKey::Metadata => {
                metadata_requests.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let mut response = fixed_metadata_response(1);
                response.brokers[0].port = port;
                Some(encode_body(&response).unwrap())
            }
            ApiKey::Produce => {
                let response = ProduceResponse {
                    topics: vec![ProduceResponseTopic {
                        topic: TOPIC.to_string(),
                        partitions: vec![ProduceResponsePartition {
                            partition: 0,
                            error: None,
                            base_offset: 0,
                            log_append_time: 0,
                        }],
                    }],
                    throttle_time_ms: 0,
                };
                Some(encode_body(&response).unwrap())
            }
            ApiKey::Unknown(_) => None,
        })
    });

    let addr = format!("127.0.0.1:{port}");
    // `ClientBuilder::build` already issued one bootstrap `MetadataRequest`
    // (topics: []) before any producer exists.
    let client = Arc::new(ClientBuilder::new(vec![addr]).build().await.unwrap());
    assert_eq!(metadata_requests.load(std::sync::atomic::Ordering::SeqCst), 1);

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client
                .producer()
                .send(ProducerRecord {
                    topic: TOPIC.to_string(),
                    partition: 0,
                    key: None,
                    value: Some(format!("v{i}").into_bytes()),
                    timestamp: None,
                })
                .await
                .unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    // Every concurrent `send` needed the same uncached topic's metadata;
    // the cache's refresh lock must have coalesced them into exactly one
    // additional wire `MetadataRequest` beyond the bootstrap fetch.
    assert_eq!(metadata_requests.load(std::sync::atomic::Ordering::SeqCst), 2);

    client.close().await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), server).await;
}

#[tokio::test]
async fn test_closing_session_cancels_outstanding_produce() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as i32;
    let (registered_tx, registered_rx) = tokio::sync::oneshot::channel();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Metadata bootstrap fetch.
        let (header, _body) = read_request(&mut socket).await;
        let mut response = fixed_metadata_response(1);
        response.brokers[0].port = port;
        write_response(&mut socket, header.correlation_id, &encode_body(&response).unwrap()).await;

        // Metadata fetch for the topic, issued by the producer's first send.
        let (header, _body) = read_request(&mut socket).await;
        write_response(&mut socket, header.correlation_id, &encode_body(&response).unwrap()).await;

        // The Produce request itself: read it fully (so the client's
        // pending-request map registration has already happened), signal
        // the test driver, then never answer it.
        let (_header, _body) = read_request(&mut socket).await;
        let _ = registered_tx.send(());

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    });

    let addr = format!("127.0.0.1:{port}");
    let client = Arc::new(ClientBuilder::new(vec![addr]).build().await.unwrap());

    let send_task = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .producer()
                .send(ProducerRecord {
                    topic: TOPIC.to_string(),
                    partition: 0,
                    key: None,
                    value: Some(b"never acked".to_vec()),
                    timestamp: None,
                })
                .await
        })
    };

    registered_rx.await.unwrap();
    client.close().await;

    let result = send_task.await.unwrap();
    assert!(matches!(
        result,
        Err(kafkacore::client::error::Error::Request(
            kafkacore::connection::RequestError::Canceled
        ))
    ));

    server.abort();
}

#[tokio::test]
async fn test_concurrent_sends_to_same_broker_share_one_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as i32;
    let connect_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let server = tokio::spawn({
        let connect_count = Arc::clone(&connect_count);
        async move {
            connect_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            serve_one_connection(listener, move |api_key, _body| match api_key {
                ApiKey::Metadata => {
                    let mut response = fixed_metadata_response(1);
                    response.brokers[0].port = port;
                    Some(encode_body(&response).unwrap())
                }
                ApiKey::Produce => {
                    let response = ProduceResponse {
                        topics: vec![ProduceResponseTopic {
                            topic: TOPIC.to_string(),
                            partitions: vec![ProduceResponsePartition {
                                partition: 0,
                                error: None,
                                base_offset: 0,
                                log_append_time: 0,
                            }],
                        }],
                        throttle_time_ms: 0,
                    };
                    Some(encode_body(&response).unwrap())
                }
                ApiKey::Unknown(_) => None,
            })
            .await
        }
    });

    let addr = format!("127.0.0.1:{port}");
    let client = Arc::new(ClientBuilder::new(vec![addr]).build().await.unwrap());

    let mut handles = Vec::new();
    for i in 0..5 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client
                .producer()
                .send(ProducerRecord {
                    topic: TOPIC.to_string(),
                    partition: 0,
                    key: None,
                    value: Some(format!("v{i}").into_bytes()),
                    timestamp: None,
                })
                .await
                .unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    // Only the bootstrap metadata fetch's connect (which is the same
    // `(host, port)` as the produce leader here, so both share one
    // listener accept) should have happened once.
    assert_eq!(connect_count.load(std::sync::atomic::Ordering::SeqCst), 1);

    client.close().await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), server).await;
}
