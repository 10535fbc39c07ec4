use anyhow::{Context, Result, bail};
use std::borrow::Cow;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::MAX_REQUEST_BYTES;

#[derive(Debug, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
}

impl TryFrom<&str> for Method {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, anyhow::Error> {
        match value {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            _ => Err(anyhow::anyhow!("Method not supported")),
        }
    }
}

pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Request {
    /// Reads one request from `reader`: the head, then as much body as
    /// `Content-Length` announces.
    pub async fn read_from<R: AsyncRead + Unpin>(mut reader: R) -> Result<Self> {
        let mut buffer = Vec::with_capacity(1024);
        let mut chunk = [0; 1024];

        loop {
            let size = reader.read(&mut chunk).await.context("Unable to read stream")?;
            if size == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..size]);

            if let Some(head_end) = find_head_end(&buffer) {
                let head = String::from_utf8_lossy(&buffer[..head_end]);
                if buffer.len() >= head_end + 4 + content_length(&head) {
                    break;
                }
            }
            if buffer.len() > MAX_REQUEST_BYTES {
                bail!("Request too large");
            }
        }

        Self::new(String::from_utf8_lossy(&buffer))
    }

    pub fn new(request: Cow<'_, str>) -> Result<Self> {
        let (head, body) = request.split_once("\r\n\r\n").unwrap_or((&*request, ""));

        // Method and path
        let mut head_line = head.lines();
        let first = head_line.next().context("Empty Request")?;
        let mut request_parts = first.split_whitespace();
        let method: Method = request_parts
            .next()
            .ok_or(anyhow::anyhow!("missing method"))
            .and_then(TryInto::try_into)
            .context("Missing Method")?;
        let target = request_parts.next().context("No Path")?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, HashMap::new()),
        };

        // Headers
        let mut headers = HashMap::new();
        for line in head_line {
            if let Some((k, v)) = line.split_once(":") {
                headers.insert(k.trim().to_lowercase(), v.trim().to_string());
            }
        }
        Ok(Request {
            method,
            path: path.into(),
            query,
            headers,
            body: body.into(),
        })
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
