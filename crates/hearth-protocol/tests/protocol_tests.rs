//! Protocol layer tests — request parsing, path normalization, response
//! serialization, fixed error documents, frame codec.

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use hearth_protocol::*;

    // ─────────────────────────────────────────────────────────────────────
    // Path normalization
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn normalize_strips_query() {
        assert_eq!(normalize_path("/data?x=1&y=2"), "/data");
    }

    #[test]
    fn normalize_collapses_duplicate_slashes() {
        assert_eq!(normalize_path("//a///b"), "/a/b");
    }

    #[test]
    fn normalize_drops_trailing_slash() {
        assert_eq!(normalize_path("/a/b/"), "/a/b");
    }

    #[test]
    fn normalize_root_stays_root() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/?q=1"), "/");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Verb and path patterns
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn verb_parsing() {
        assert_eq!(Verb::parse("GET"), Some(Verb::Get));
        assert_eq!(Verb::parse("POST"), Some(Verb::Post));
        assert_eq!(Verb::parse("DELETE"), Some(Verb::Delete));
        assert_eq!(Verb::parse("BREW"), None);
    }

    #[test]
    fn path_pattern_from_wildcard() {
        assert_eq!(PathPattern::from("*"), PathPattern::Any);
    }

    #[test]
    fn path_pattern_from_literal_is_normalized() {
        assert_eq!(
            PathPattern::from("/api//users/"),
            PathPattern::Exact("/api/users".into())
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Request parsing
    // ─────────────────────────────────────────────────────────────────────

    async fn parse(raw: &[u8]) -> Result<Request, ProtocolError> {
        let mut reader = std::io::Cursor::new(raw.to_vec());
        let mut buf = BytesMut::new();
        read_request(&mut reader, &mut buf).await
    }

    #[tokio::test]
    async fn parse_simple_get() {
        let req = parse(b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.verb, Verb::Get);
        assert_eq!(req.path, "/hello");
        assert_eq!(req.query.as_deref(), Some("name=world"));
        assert_eq!(req.header("host"), Some("localhost"));
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn parse_post_with_body() {
        let req = parse(
            b"POST /submit HTTP/1.1\r\nContent-Length: 11\r\nContent-Type: text/plain\r\n\r\nhello world",
        )
        .await
        .unwrap();
        assert_eq!(req.verb, Verb::Post);
        assert_eq!(req.body, b"hello world");
    }

    #[tokio::test]
    async fn parse_leaves_trailing_bytes_in_buffer() {
        // Bytes past the request head stay in the caller's buffer. For
        // upgrade requests these are the client's first frames.
        let raw = b"GET /chat HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n\x81\x85";
        let mut reader = std::io::Cursor::new(raw.to_vec());
        let mut buf = BytesMut::new();
        let req = read_request(&mut reader, &mut buf).await.unwrap();
        assert!(req.is_upgrade());
        assert_eq!(&buf[..], &[0x81, 0x85]);
    }

    #[tokio::test]
    async fn parse_rejects_http2() {
        let err = parse(b"GET / HTTP/2.0\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedVersion(_)));
    }

    #[tokio::test]
    async fn parse_rejects_garbage() {
        let err = parse(b"not an http request\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn parse_rejects_truncated_head() {
        let err = parse(b"GET / HTTP/1.1\r\nHost: x").await.unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn upgrade_detection_requires_both_headers() {
        let req = parse(b"GET /chat HTTP/1.1\r\nUpgrade: websocket\r\n\r\n")
            .await
            .unwrap();
        assert!(!req.is_upgrade());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Response serialization
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn response_writes_status_headers_and_body() {
        let mut resp = Response::new();
        resp.set_status(404);
        resp.set_header("Content-Type", "text/html");
        resp.write_str("gone");

        let mut out = Vec::new();
        resp.write_to(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\ngone"));
    }

    #[tokio::test]
    async fn response_set_header_replaces_case_insensitively() {
        let mut resp = Response::new();
        resp.set_header("content-type", "text/plain");
        resp.set_header("Content-Type", "application/json");
        assert_eq!(resp.header("CONTENT-TYPE"), Some("application/json"));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Fixed error documents
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn not_found_page_contents() {
        assert!(pages::NOT_FOUND_PAGE.contains("<title>404 - Not Found</title>"));
        assert!(pages::NOT_FOUND_PAGE.contains("<h1>404 - Not Found</h1>"));
    }

    #[test]
    fn error_page_embeds_module_message_and_backtrace() {
        let page = pages::error_page("Callback Module", "boom", "frame 0\nframe 1");
        assert!(page.contains("<h1>500 - Internal Server Error</h1>"));
        assert!(page.contains("<b>Callback Module</b>"));
        assert!(page.contains("<p>boom</p>"));
        assert!(page.contains("<pre>frame 0\nframe 1</pre>"));
    }

    #[test]
    fn error_page_escapes_html() {
        let page = pages::error_page("M", "<script>alert(1)</script>", "a & b");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(page.contains("a &amp; b"));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Frame codec (public surface; bit-level cases live in the unit tests)
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn text_frame_roundtrip_through_decoder() {
        let bytes = encode_frame(&Frame::text("hi there"));
        let mut dec = FrameDecoder::new();
        dec.extend(&bytes);
        let frame = dec.next().unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"hi there");
    }

    #[test]
    fn close_frame_carries_code_and_reason() {
        let frame = Frame::close(close_code::NORMAL, "bye");
        assert_eq!(frame.close_code(), Some(1000));
        assert_eq!(frame.close_reason(), Some("bye"));
    }

    #[test]
    fn recv_buffer_size_is_two_kib() {
        assert_eq!(RECV_BUFFER_SIZE, 2048);
    }
}
