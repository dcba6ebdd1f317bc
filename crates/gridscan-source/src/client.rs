//! Explorer HTTP source.
//!
//! Issues `GET {base}/{collection}?page={i}&size={s}` over plain HTTP/1.1
//! and reads the page count from the `Pages` response header. The body
//! is a JSON array of records.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use tracing::debug;

use gridscan_core::{Entity, SourceConfig, config::parse_duration};

use crate::error::{SourceError, SourceResult};
use crate::source::{CollectionSource, Page};

/// Response header carrying the total page count.
pub const PAGES_HEADER: &str = "pages";

/// Longest error body excerpt kept in `SourceError::Server`.
const MAX_ERROR_BODY: usize = 256;

/// Explorer directory client over plain HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpSource {
    /// `host:port` to connect to.
    addr: String,
    /// Value of the `Host` header.
    host: String,
    /// Path prefix without trailing slash, e.g. `/explorer`.
    base_path: String,
    timeout: Duration,
}

impl HttpSource {
    /// Create a source for an `http://` base URL.
    pub fn new(base_url: &str, timeout: Duration) -> SourceResult<Self> {
        let uri: Uri = base_url
            .trim()
            .parse()
            .map_err(|e: http::uri::InvalidUri| SourceError::InvalidUrl(e.to_string()))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(SourceError::InvalidUrl(format!(
                    "unsupported scheme {other:?}, only http is supported"
                )));
            }
            None => return Err(SourceError::InvalidUrl(format!("missing scheme in {base_url:?}"))),
        }

        let authority = uri
            .authority()
            .ok_or_else(|| SourceError::InvalidUrl(format!("missing host in {base_url:?}")))?;
        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            addr: format!("{}:{port}", authority.host()),
            host: authority.as_str().to_string(),
            base_path: uri.path().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &SourceConfig) -> SourceResult<Self> {
        let timeout = parse_duration(&config.timeout).ok_or_else(|| {
            SourceError::InvalidUrl(format!("invalid timeout {:?}", config.timeout))
        })?;
        Self::new(&config.base_url, timeout)
    }

    /// Request path for one page of a collection.
    pub fn page_path<E: Entity>(&self, page_size: u32, page_index: u32) -> String {
        format!(
            "{}/{}?page={page_index}&size={page_size}",
            self.base_path,
            E::KIND.as_str()
        )
    }

    async fn get(&self, path: &str) -> SourceResult<(http::StatusCode, HeaderMap, Bytes)> {
        let stream = tokio::net::TcpStream::connect(&self.addr)
            .await
            .map_err(|e| SourceError::Transport(format!("connect {}: {e}", self.addr)))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| SourceError::Transport(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "explorer connection closed with error");
            }
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(HOST, self.host.as_str())
            .header(USER_AGENT, "gridscan/0.1")
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| SourceError::Transport(format!("request: {e}")))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| SourceError::Transport(format!("reading body: {e}")))?
            .to_bytes();

        Ok((status, headers, body))
    }
}

impl CollectionSource for HttpSource {
    async fn fetch_page<E: Entity>(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> SourceResult<Page<E>> {
        let path = self.page_path::<E>(page_size, page_index);

        let (status, headers, body) = tokio::time::timeout(self.timeout, self.get(&path))
            .await
            .map_err(|_| SourceError::Transport(format!("GET {path} timed out")))??;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let excerpt: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(SourceError::Server {
                status: status.as_u16(),
                body: excerpt,
            });
        }

        let total_pages = parse_pages(&headers)?;
        let records: Vec<E> = serde_json::from_slice(&body)
            .map_err(|e| SourceError::MalformedResponse(format!("decoding {}: {e}", E::KIND)))?;

        debug!(
            kind = %E::KIND,
            page = page_index,
            total_pages,
            records = records.len(),
            "page fetched"
        );
        Ok(Page {
            records,
            total_pages,
        })
    }
}

/// Read the total page count from the `Pages` header.
pub fn parse_pages(headers: &HeaderMap) -> SourceResult<u32> {
    let value = headers
        .get(PAGES_HEADER)
        .ok_or_else(|| SourceError::MalformedResponse("missing Pages header".to_string()))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| SourceError::MalformedResponse(format!("invalid Pages header: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_core::{Farm, Node};
    use http::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response and hand back the request head.
    async fn serve_once(
        status_line: &'static str,
        extra_headers: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "{status_line}\r\n{extra_headers}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{addr}/explorer"), handle)
    }

    #[test]
    fn new_parses_base_url() {
        let source = HttpSource::new("http://explorer.local:8080/explorer/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.addr, "explorer.local:8080");
        assert_eq!(source.host, "explorer.local:8080");
        assert_eq!(source.page_path::<Node>(500, 3), "/explorer/nodes?page=3&size=500");
        assert_eq!(source.page_path::<Farm>(10, 1), "/explorer/farms?page=1&size=10");
    }

    #[test]
    fn new_defaults_port_80() {
        let source = HttpSource::new("http://explorer.local", Duration::from_secs(1)).unwrap();
        assert_eq!(source.addr, "explorer.local:80");
        assert_eq!(source.page_path::<Node>(1, 1), "/nodes?page=1&size=1");
    }

    #[test]
    fn new_rejects_https_and_garbage() {
        assert!(matches!(
            HttpSource::new("https://explorer.grid.tf/explorer", Duration::from_secs(1)),
            Err(SourceError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpSource::new("explorer.local/explorer", Duration::from_secs(1)),
            Err(SourceError::InvalidUrl(_))
        ));
    }

    #[test]
    fn parse_pages_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(parse_pages(&headers), Err(SourceError::MalformedResponse(_))));

        headers.insert("Pages", HeaderValue::from_static("12"));
        assert_eq!(parse_pages(&headers).unwrap(), 12);

        headers.insert("Pages", HeaderValue::from_static("many"));
        assert!(matches!(parse_pages(&headers), Err(SourceError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn fetch_page_decodes_records_and_pages() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK",
            "Pages: 4\r\n",
            r#"[{"id": 1, "farm_id": 9, "updated": 1600000000}, {"id": 2}]"#,
        )
        .await;

        let source = HttpSource::new(&url, Duration::from_secs(5)).unwrap();
        let page: Page<Node> = source.fetch_page(2, 3).await.unwrap();
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].farm_id, 9);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /explorer/nodes?page=3&size=2 HTTP/1.1"));
    }

    #[tokio::test]
    async fn missing_pages_header_is_malformed() {
        let (url, _server) = serve_once("HTTP/1.1 200 OK", "", "[]").await;
        let source = HttpSource::new(&url, Duration::from_secs(5)).unwrap();
        let err = source.fetch_page::<Farm>(10, 1).await.unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let (url, _server) =
            serve_once("HTTP/1.1 500 Internal Server Error", "", r#"{"error":"db down"}"#).await;
        let source = HttpSource::new(&url, Duration::from_secs(5)).unwrap();
        let err = source.fetch_page::<Node>(10, 1).await.unwrap_err();
        assert_eq!(
            err,
            SourceError::Server {
                status: 500,
                body: r#"{"error":"db down"}"#.to_string()
            }
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn closed_port_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source =
            HttpSource::new(&format!("http://{addr}/explorer"), Duration::from_secs(2)).unwrap();
        let err = source.fetch_page::<Node>(10, 1).await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }
}
