fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use upbench_checksum::{Checked, checksum_bytes};
    use upbench_metering::{Metered, MeteringConfig};
    use upbench_multipart::{MultipartEncoder, Part};
    use upbench_payload::PayloadSpec;
    use upbench_protocol::{RequestMode, UploadResult, parse_results};
    use upbench_server::{Consumer, DirectoryStore, ObjectStore, ServerConfig, Sink, UploadServer};
    use upbench_transport::{BackendKind, TransportConfig, TransportError, send};

    /// Starts a server on an ephemeral loopback port.
    async fn start_server(consumer: Consumer) -> (Arc<UploadServer>, SocketAddr) {
        let config = ServerConfig {
            listen: ([127, 0, 0, 1], 0).into(),
            header_timeout: Duration::from_secs(5),
        };
        let server = UploadServer::new(config, consumer);
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_run = Arc::clone(&server);
        tokio::spawn(async move { server_run.serve(listener).await });
        (server, addr)
    }

    fn transport_config(addr: SocketAddr) -> TransportConfig {
        TransportConfig::new(format!("http://{addr}"))
    }

    fn supported(kind: BackendKind, mode: RequestMode) -> bool {
        !(kind == BackendKind::Ureq && mode == RequestMode::MultipartNamedPart)
    }

    /// Sends raw bytes and returns the status code and response body.
    async fn raw_request(addr: SocketAddr, request: &[u8]) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();

        let status = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| panic!("bad status line: {response}"));
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    fn post(path: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut request = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        request.extend_from_slice(body);
        request
    }

    // --- Backend x mode matrix ---

    #[tokio::test(flavor = "multi_thread")]
    async fn every_supported_pair_roundtrips_checksum() {
        let (server, addr) = start_server(Consumer::discard()).await;
        let config = transport_config(addr);
        let payload = vec![0xAA; 16];
        let expected = UploadResult::new(16, checksum_bytes(&payload));

        for &kind in BackendKind::all() {
            for &mode in RequestMode::all() {
                let stream = Checked::new(Cursor::new(payload.clone()));
                let attempt = send(stream, mode, kind, &config).await;

                if !supported(kind, mode) {
                    assert!(
                        matches!(attempt.response, Err(TransportError::UnsupportedCombination { .. })),
                        "{kind}/{mode} should be rejected"
                    );
                    let stream = attempt.stream.expect("stream returned untouched");
                    assert_eq!(stream.byte_count(), 0);
                    continue;
                }

                let response = attempt
                    .response
                    .unwrap_or_else(|e| panic!("{kind}/{mode} failed: {e}"));
                assert_eq!(response.status_code, 200, "{kind}/{mode}: {}", response.body);

                let results = parse_results(mode, &response.body).unwrap();
                assert_eq!(results, vec![expected], "{kind}/{mode}");

                let stream = attempt.stream.expect("stream reclaimed");
                assert_eq!(stream.byte_count(), 16);
                assert_eq!(stream.checksum(), expected.checksum);
            }
        }

        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn whole_and_named_framing_decode_identically() {
        let (server, addr) = start_server(Consumer::discard()).await;
        let config = transport_config(addr);
        let spec = PayloadSpec::block_random(100_000, 32, 42);

        let mut results = Vec::new();
        for mode in [RequestMode::MultipartWhole, RequestMode::MultipartNamedPart] {
            let attempt = send(spec.build().unwrap(), mode, BackendKind::Async, &config).await;
            let response = attempt.response.unwrap();
            assert!(response.is_success(), "{mode}: {}", response.body);
            results.push(parse_results(mode, &response.body).unwrap());
        }

        let mut reference = Vec::new();
        spec.build().unwrap().read_to_end(&mut reference).unwrap();
        let expected = vec![UploadResult::new(100_000, checksum_bytes(&reference))];
        assert_eq!(results[0], expected);
        assert_eq!(results[1], expected);

        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_payload_uploads() {
        let (server, addr) = start_server(Consumer::discard()).await;
        let config = transport_config(addr);

        let attempt = send(Cursor::new(Vec::new()), RequestMode::SinglePart, BackendKind::Blocking, &config).await;
        let response = attempt.response.unwrap();
        let results = parse_results(RequestMode::SinglePart, &response.body).unwrap();
        assert_eq!(results, vec![UploadResult::new(0, 0)]);

        server.shutdown();
    }

    // --- Raw wire format ---

    #[tokio::test]
    async fn multipart_parts_reported_in_order() {
        let (server, addr) = start_server(Consumer::discard()).await;

        let sizes = [0usize, 100, 4096];
        let mut encoder = MultipartEncoder::new();
        for (i, &size) in sizes.iter().enumerate() {
            let data: Vec<u8> = (0..size).map(|b| (b % 251) as u8).collect();
            encoder = encoder.part(Part::new(format!("part{i}"), Cursor::new(data)));
        }
        let content_type = encoder.content_type();
        let mut body = Vec::new();
        encoder.read_to_end(&mut body).unwrap();

        let (status, response) = raw_request(addr, &post("/api/multipart", &content_type, &body)).await;
        assert_eq!(status, 200, "{response}");

        let results = parse_results(RequestMode::MultipartWhole, &response).unwrap();
        let expected: Vec<UploadResult> = sizes
            .iter()
            .map(|&size| {
                let data: Vec<u8> = (0..size).map(|b| (b % 251) as u8).collect();
                UploadResult::new(size as u64, checksum_bytes(&data))
            })
            .collect();
        assert_eq!(results, expected);
        assert_eq!(results[0].checksum, 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn chunked_single_part_body() {
        let (server, addr) = start_server(Consumer::discard()).await;

        let request = b"POST /api/singlepart HTTP/1.1\r\nHost: localhost\r\n\
            Content-Type: application/octet-stream\r\nTransfer-Encoding: chunked\r\n\r\n\
            5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let (status, body) = raw_request(addr, request).await;
        assert_eq!(status, 200, "{body}");

        let results = parse_results(RequestMode::SinglePart, &body).unwrap();
        assert_eq!(results, vec![UploadResult::new(11, checksum_bytes(b"hello world"))]);

        server.shutdown();
    }

    #[tokio::test]
    async fn truncated_content_length_body_is_not_a_result() {
        let (server, addr) = start_server(Consumer::discard()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"POST /api/singlepart HTTP/1.1\r\nHost: localhost\r\n\
                Content-Type: application/octet-stream\r\nContent-Length: 1000\r\n\r\n0123456789",
            )
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(!response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.starts_with("HTTP/1.1 500"), "{response}");
        assert!(!response.contains("bytesReceived"), "{response}");

        server.shutdown();
    }

    #[tokio::test]
    async fn missing_boundary_is_bad_request() {
        let (server, addr) = start_server(Consumer::discard()).await;

        let (status, body) = raw_request(addr, &post("/api/multipart", "multipart/form-data", b"--x--\r\n")).await;
        assert_eq!(status, 400);
        assert!(body.contains("boundary"), "{body}");

        server.shutdown();
    }

    #[tokio::test]
    async fn unknown_path_and_wrong_method() {
        let (server, addr) = start_server(Consumer::discard()).await;

        let (status, _) = raw_request(addr, &post("/api/elsewhere", "application/octet-stream", b"x")).await;
        assert_eq!(status, 404);

        let (status, _) = raw_request(addr, b"GET /api/singlepart HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(status, 405);

        server.shutdown();
    }

    #[tokio::test]
    async fn file_route_requires_named_field() {
        let (server, addr) = start_server(Consumer::discard()).await;

        let mut encoder = MultipartEncoder::new().part(Part::new("other", Cursor::new(b"abc".to_vec())));
        let content_type = encoder.content_type();
        let mut body = Vec::new();
        encoder.read_to_end(&mut body).unwrap();

        let (status, _) = raw_request(addr, &post("/api/multipart/file", &content_type, &body)).await;
        assert_eq!(status, 400);

        server.shutdown();
    }

    // --- Consume modes ---

    #[tokio::test(flavor = "multi_thread")]
    async fn store_mode_persists_uploaded_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(DirectoryStore::open(tmp.path().join("objects")).await.unwrap());
        let consumer = Consumer::new(Sink::Store(store.clone()), MeteringConfig::default());
        let (server, addr) = start_server(consumer).await;

        let spec = PayloadSpec::block_random(50_000, 8, 7);
        let attempt = send(spec.build().unwrap(), RequestMode::SinglePart, BackendKind::Async, &transport_config(addr)).await;
        let response = attempt.response.unwrap();
        let results = parse_results(RequestMode::SinglePart, &response.body).unwrap();
        assert_eq!(results[0].bytes_received, 50_000);

        let entries: Vec<_> = std::fs::read_dir(store.root()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        let id: uuid::Uuid = name.to_str().unwrap().parse().unwrap();

        let mut stored = Vec::new();
        store.read(id).await.unwrap().read_to_end(&mut stored).await.unwrap();
        let mut reference = Vec::new();
        spec.build().unwrap().read_to_end(&mut reference).unwrap();
        assert_eq!(stored, reference);
        assert_eq!(checksum_bytes(&stored), results[0].checksum);

        server.shutdown();
    }

    // --- Metering ---

    #[tokio::test(flavor = "multi_thread")]
    async fn sender_metering_is_monotonic() {
        let (server, addr) = start_server(Consumer::discard()).await;

        let spec = PayloadSpec::constant(1_000_000);
        let stream = Checked::new(Metered::new(
            spec.build().unwrap(),
            MeteringConfig::with_bucket(Duration::from_millis(1)),
        ));
        let attempt = send(stream, RequestMode::MultipartWhole, BackendKind::Blocking, &transport_config(addr)).await;
        assert!(attempt.response.unwrap().is_success());

        let stream = attempt.stream.expect("stream reclaimed");
        assert_eq!(stream.byte_count(), 1_000_000);
        let log = stream.into_inner().into_log();
        assert!(!log.is_empty());
        assert_eq!(log.total_bytes(), 1_000_000);
        for pair in log.samples().windows(2) {
            assert!(pair[0].bucket_start_ms < pair[1].bucket_start_ms);
            assert!(pair[0].cumulative_bytes <= pair[1].cumulative_bytes);
        }

        server.shutdown();
    }
}
