//! Minimal HTTP/1.1 request/response framing over a raw TCP stream.
//!
//! The wire format this service speaks (one fixed path shape, no chunked transfer, no
//! compression, `Connection: close` on every response) is narrow enough that a general-purpose
//! HTTP library would spend more code fighting its own defaults than this module does
//! implementing the handful of rules directly.

// std
use std::io;
// crates.io
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
// self
use crate::{_prelude::*, local_auth::error::RpcError};

/// Hard cap on request body size; requests advertising a larger `Content-Length` are rejected
/// before any body bytes are read.
pub(crate) const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Fixed path prefix every RPC method name hangs off.
const PATH_PREFIX: &str = "/rpc/LuciLocalAuthService.";

/// A parsed, validated request: the method name extracted from the path, plus the body bytes.
pub(crate) struct ParsedRequest {
	/// Method name following [`PATH_PREFIX`] (not yet checked against the known method set).
	pub(crate) method: String,
	/// Raw JSON body.
	pub(crate) body: Vec<u8>,
}

/// Reads and validates one HTTP/1.1 request from `stream`.
///
/// Validates the request line shape, requires `POST`, requires a `application/json`
/// `Content-Type`, requires a `Content-Length` within [`MAX_BODY_BYTES`], and rejects chunked
/// transfer encoding outright (this service never advertises or accepts it).
pub(crate) async fn read_request<S>(stream: &mut BufReader<S>) -> Result<ParsedRequest, RpcError>
where
	S: tokio::io::AsyncRead + Unpin,
{
	let request_line = read_line(stream).await?;
	let mut parts = request_line.split_ascii_whitespace();
	let method_token = parts.next().ok_or_else(|| malformed("Missing HTTP method."))?;
	let path = parts.next().ok_or_else(|| malformed("Missing request path."))?;
	let version = parts.next().ok_or_else(|| malformed("Missing HTTP version."))?;

	if method_token != "POST" {
		return Err(RpcError::MethodNotAllowed { method: method_token.to_owned() });
	}
	if version != "HTTP/1.1" && version != "HTTP/1.0" {
		return Err(malformed("Unsupported HTTP version."));
	}

	let method = path
		.strip_prefix(PATH_PREFIX)
		.filter(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
		.ok_or_else(|| RpcError::UnknownPath { path: path.to_owned() })?
		.to_owned();

	let mut content_type_ok = false;
	let mut content_length: Option<u64> = None;

	loop {
		let line = read_line(stream).await?;

		if line.is_empty() {
			break;
		}

		let (name, value) =
			line.split_once(':').ok_or_else(|| malformed("Malformed header line."))?;
		let name = name.trim().to_ascii_lowercase();
		let value = value.trim();

		match name.as_str() {
			"content-type" =>
				content_type_ok = value.split(';').next().unwrap_or("").trim() == "application/json",
			"content-length" => {
				content_length = Some(
					value
						.parse::<u64>()
						.map_err(|_| malformed("Content-Length is not a valid integer."))?,
				);
			},
			"transfer-encoding" => return Err(malformed("Chunked transfer encoding is not supported.")),
			_ => {},
		}
	}

	if !content_type_ok {
		return Err(malformed("Content-Type must be application/json."));
	}

	let content_length = content_length.ok_or_else(|| malformed("Content-Length is required."))?;

	if content_length > MAX_BODY_BYTES {
		return Err(malformed("Request body exceeds the maximum accepted size."));
	}

	let mut body = vec![0u8; content_length as usize];

	stream
		.read_exact(&mut body)
		.await
		.map_err(|e| RpcError::Internal { reason: format!("Failed to read request body: {e}.") })?;

	Ok(ParsedRequest { method, body })
}

/// Reads a single CRLF- or LF-terminated header/request line, trimming the terminator.
async fn read_line<S>(stream: &mut BufReader<S>) -> Result<String, RpcError>
where
	S: tokio::io::AsyncRead + Unpin,
{
	let mut line = String::new();
	let n = stream
		.read_line(&mut line)
		.await
		.map_err(|e| RpcError::Internal { reason: format!("Failed to read request line: {e}.") })?;

	if n == 0 {
		return Err(malformed("Connection closed before a complete request was received."));
	}

	Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn malformed(reason: impl Into<String>) -> RpcError {
	RpcError::MalformedRequest { reason: reason.into() }
}

/// Writes one HTTP/1.1 response with the given status, content type, and body.
///
/// Every response is framed with an explicit `Content-Length` and `Connection: close`; this
/// service never keeps a connection alive past a single request.
pub(crate) async fn write_response<S>(
	stream: &mut S,
	status: u16,
	content_type: &str,
	body: &[u8],
) -> io::Result<()>
where
	S: tokio::io::AsyncWrite + Unpin,
{
	let reason = reason_phrase(status);
	let header = format!(
		"HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: \
		 {len}\r\nConnection: close\r\n\r\n",
		len = body.len()
	);

	stream.write_all(header.as_bytes()).await?;
	stream.write_all(body).await?;
	stream.flush().await
}

const fn reason_phrase(status: u16) -> &'static str {
	match status {
		200 => "OK",
		400 => "Bad Request",
		403 => "Forbidden",
		404 => "Not Found",
		405 => "Method Not Allowed",
		500 => "Internal Server Error",
		503 => "Service Unavailable",
		_ => "Error",
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::io::BufReader;
	// self
	use super::*;

	#[tokio::test]
	async fn reads_a_well_formed_request() {
		let raw = b"POST /rpc/LuciLocalAuthService.GetOAuthToken HTTP/1.1\r\nContent-Type: \
		            application/json\r\nContent-Length: 13\r\n\r\n{\"a\":\"b\"}   ";
		let mut reader = BufReader::new(&raw[..]);
		let parsed = read_request(&mut reader).await.expect("Well-formed request should parse.");

		assert_eq!(parsed.method, "GetOAuthToken");
		assert_eq!(parsed.body.len(), 13);
	}

	#[tokio::test]
	async fn rejects_non_post_methods() {
		let raw = b"GET /rpc/LuciLocalAuthService.GetOAuthToken HTTP/1.1\r\nContent-Type: \
		            application/json\r\nContent-Length: 0\r\n\r\n";
		let mut reader = BufReader::new(&raw[..]);

		assert!(matches!(
			read_request(&mut reader).await,
			Err(RpcError::MethodNotAllowed { .. })
		));
		assert_eq!(RpcError::MethodNotAllowed { method: "GET".into() }.status(), 405);
	}

	#[tokio::test]
	async fn rejects_paths_that_do_not_match_the_rpc_shape() {
		let raw = b"POST /not/the/right/path HTTP/1.1\r\nContent-Type: \
		            application/json\r\nContent-Length: 0\r\n\r\n";
		let mut reader = BufReader::new(&raw[..]);

		assert!(matches!(read_request(&mut reader).await, Err(RpcError::UnknownPath { .. })));
	}

	#[tokio::test]
	async fn rejects_oversized_content_length() {
		let raw = format!(
			"POST /rpc/LuciLocalAuthService.GetOAuthToken HTTP/1.1\r\nContent-Type: \
			 application/json\r\nContent-Length: {}\r\n\r\n",
			MAX_BODY_BYTES + 1
		);
		let mut reader = BufReader::new(raw.as_bytes());

		assert!(matches!(
			read_request(&mut reader).await,
			Err(RpcError::MalformedRequest { .. })
		));
	}

	#[tokio::test]
	async fn rejects_chunked_transfer_encoding() {
		let raw = b"POST /rpc/LuciLocalAuthService.GetOAuthToken HTTP/1.1\r\nContent-Type: \
		            application/json\r\nTransfer-Encoding: chunked\r\n\r\n";
		let mut reader = BufReader::new(&raw[..]);

		assert!(matches!(
			read_request(&mut reader).await,
			Err(RpcError::MalformedRequest { .. })
		));
	}

	#[tokio::test]
	async fn write_response_frames_headers_and_body() {
		let mut buf = Vec::new();

		write_response(&mut buf, 403, "text/plain", b"nope").await.unwrap();

		let text = String::from_utf8(buf).unwrap();

		assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
		assert!(text.contains("Content-Length: 4\r\n"));
		assert!(text.contains("Connection: close\r\n"));
		assert!(text.ends_with("nope"));
	}
}
