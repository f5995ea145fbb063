//! HTTP queue service provider using the MQS REST API.
//!
//! This module talks to the remote managed queue service through its plain
//! HTTP request/response API. Requests are signed with HMAC-SHA1 over a
//! canonical request string; request and response bodies are small XML
//! documents parsed with quick-xml.
//!
//! ## Endpoints
//!
//! - `GET /queues` - list queues
//! - `PUT /queues/{name}` - create queue (carries `VisibilityTimeout`)
//! - `DELETE /queues/{name}` - delete queue
//! - `POST /queues/{name}/messages` - send message
//! - `GET /queues/{name}/messages?numOfMessages=N&waitseconds=W` - batch
//!   receive; a `MessageNotExist` error means the queue is empty
//! - `DELETE /queues/{name}/messages?ReceiptHandle=...` - delete message
//! - `DELETE /queues/{name}/messages?clear=true` - clear queue
//! - `GET /queues/{name}?metaoverride=false` - queue attributes
//!   (`ActiveMessages` among them)
//!
//! ## Authentication
//!
//! `Authorization: MQS <access-key-id>:<signature>` where the signature is
//! `base64(hmac-sha1(secret, VERB \n Content-MD5 \n Content-Type \n Date \n
//! CanonicalizedMQSHeaders CanonicalizedResource))`.

use crate::cache::QueueHandle;
use crate::config::HttpServiceConfig;
use crate::error::ServiceError;
use crate::service::{QueueAttributes, QueueService, RawMessage};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode};
use sha1::Sha1;
use std::fmt;
use tracing::debug;

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

/// API version sent on every request
const MQS_API_VERSION: &str = "2015-06-06";

/// XML namespace for request documents
const MQS_XML_NS: &str = "http://mqs.aliyuncs.com/doc/v1";

type HmacSha1 = Hmac<Sha1>;

// ============================================================================
// Request Signing
// ============================================================================

/// Signs requests with HMAC-SHA1 over the canonical request string
#[derive(Clone)]
struct RequestSigner {
    access_key_id: String,
    access_key_secret: String,
}

impl RequestSigner {
    fn new(access_key_id: String, access_key_secret: String) -> Self {
        Self {
            access_key_id,
            access_key_secret,
        }
    }

    /// Compute the base64 signature for one request
    fn sign(
        &self,
        verb: &str,
        content_md5: &str,
        content_type: &str,
        date: &str,
        canonical_headers: &str,
        canonical_resource: &str,
    ) -> String {
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}\n{}{}",
            verb, content_md5, content_type, date, canonical_headers, canonical_resource
        );
        let mut mac = HmacSha1::new_from_slice(self.access_key_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Build the Authorization header value
    fn authorization(&self, signature: &str) -> String {
        format!("MQS {}:{}", self.access_key_id, signature)
    }
}

/// Canonical resource: path plus the sorted query string
fn canonical_resource(path: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let mut pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    format!("{}?{}", path, pairs.join("&"))
}

// ============================================================================
// HttpQueueService
// ============================================================================

/// Queue service provider over the MQS REST API.
///
/// Thread-safe and shareable across tasks via `Arc`; the underlying reqwest
/// client pools connections internally.
pub struct HttpQueueService {
    http_client: HttpClient,
    endpoint: String,
    signer: RequestSigner,
}

impl HttpQueueService {
    /// Create a provider from connection settings.
    ///
    /// Fails when the endpoint is not an absolute http(s) URL.
    pub fn new(config: HttpServiceConfig) -> Result<Self, ServiceError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let parsed =
            url::Url::parse(&endpoint).map_err(|e| ServiceError::InvalidConfiguration {
                message: format!("invalid endpoint '{}': {}", config.endpoint, e),
            })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ServiceError::InvalidConfiguration {
                message: format!("endpoint must be an absolute http(s) URL: {}", endpoint),
            });
        }
        if config.access_key_id.is_empty() || config.access_key_secret.is_empty() {
            return Err(ServiceError::InvalidConfiguration {
                message: "access key id and secret are required".to_string(),
            });
        }
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ServiceError::ConnectionFailed {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            http_client,
            endpoint,
            signer: RequestSigner::new(config.access_key_id, config.access_key_secret),
        })
    }

    /// Issue one signed request, returning the response body on success
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<String>,
    ) -> Result<String, ServiceError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_type = if body.is_some() {
            "text/xml;charset=utf-8"
        } else {
            ""
        };
        let canonical_headers = format!("x-mqs-version:{}\n", MQS_API_VERSION);
        let resource = canonical_resource(path, query);
        let signature = self.signer.sign(
            method.as_str(),
            "",
            content_type,
            &date,
            &canonical_headers,
            &resource,
        );

        let mut request_url = format!("{}{}", self.endpoint, path);
        if !query.is_empty() {
            let query_string = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            request_url = format!("{}?{}", request_url, query_string);
        }
        debug!(method = %method, url = %request_url, "service request");

        let mut request = self
            .http_client
            .request(method, &request_url)
            .header("Date", &date)
            .header("x-mqs-version", MQS_API_VERSION)
            .header("Authorization", self.signer.authorization(&signature));
        if let Some(body) = body {
            request = request
                .header("Content-Type", "text/xml;charset=utf-8")
                .body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::ConnectionFailed {
                    message: format!("request timeout: {}", e),
                }
            } else if e.is_connect() {
                ServiceError::ConnectionFailed {
                    message: format!("connection failed: {}", e),
                }
            } else {
                ServiceError::ConnectionFailed {
                    message: format!("HTTP request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::ConnectionFailed {
                message: format!("failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(parse_error_response(&text, status));
        }
        Ok(text)
    }

    fn queue_path(queue: &QueueHandle) -> String {
        format!("/queues/{}", queue.name())
    }
}

impl fmt::Debug for HttpQueueService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQueueService")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl QueueService for HttpQueueService {
    async fn list_queues(&self) -> Result<Vec<String>, ServiceError> {
        let xml = self.request(Method::GET, "/queues", &[], None).await?;
        parse_queue_urls(&xml)
    }

    async fn create_queue(
        &self,
        name: &str,
        visibility_timeout: u32,
    ) -> Result<String, ServiceError> {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Queue xmlns=\"{}\"><VisibilityTimeout>{}</VisibilityTimeout></Queue>",
            MQS_XML_NS, visibility_timeout
        );
        let path = format!("/queues/{}", name);
        self.request(Method::PUT, &path, &[], Some(body)).await?;
        Ok(format!("{}{}", self.endpoint, path))
    }

    async fn delete_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError> {
        self.request(Method::DELETE, &Self::queue_path(queue), &[], None)
            .await?;
        Ok(())
    }

    async fn send_message(&self, queue: &QueueHandle, body: &str) -> Result<String, ServiceError> {
        let document = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Message xmlns=\"{}\"><MessageBody>{}</MessageBody></Message>",
            MQS_XML_NS,
            quick_xml::escape::escape(body)
        );
        let path = format!("{}/messages", Self::queue_path(queue));
        let xml = self
            .request(Method::POST, &path, &[], Some(document))
            .await?;
        parse_text_element(&xml, "MessageId")
    }

    async fn receive_messages(
        &self,
        queue: &QueueHandle,
        max_messages: u32,
        wait_seconds: u32,
    ) -> Result<Vec<RawMessage>, ServiceError> {
        let path = format!("{}/messages", Self::queue_path(queue));
        let query = [
            ("numOfMessages", max_messages.to_string()),
            ("waitseconds", wait_seconds.to_string()),
        ];
        match self.request(Method::GET, &path, &query, None).await {
            Ok(xml) => parse_received_messages(&xml),
            // The service reports an empty queue as a MessageNotExist error.
            Err(ServiceError::MessageNotFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueHandle,
        receipt_handle: &str,
    ) -> Result<(), ServiceError> {
        let path = format!("{}/messages", Self::queue_path(queue));
        let query = [("ReceiptHandle", receipt_handle.to_string())];
        self.request(Method::DELETE, &path, &query, None).await?;
        Ok(())
    }

    async fn queue_attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, ServiceError> {
        let query = [("metaoverride", "false".to_string())];
        let xml = self
            .request(Method::GET, &Self::queue_path(queue), &query, None)
            .await?;
        parse_queue_attributes(&xml)
    }

    async fn clear_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError> {
        let path = format!("{}/messages", Self::queue_path(queue));
        let query = [("clear", "true".to_string())];
        self.request(Method::DELETE, &path, &query, None).await?;
        Ok(())
    }
}

// ============================================================================
// XML Parsing
// ============================================================================

/// Parse the text content of the first `tag` element in `xml`
fn parse_text_element(xml: &str, tag: &str) -> Result<String, ServiceError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_tag = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == tag.as_bytes() => {
                in_tag = true;
            }
            Ok(Event::Text(e)) if in_tag => {
                return e.unescape().map(|s| s.into_owned()).map_err(|e| {
                    ServiceError::MalformedResponse {
                        message: format!("failed to parse XML: {}", e),
                    }
                });
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ServiceError::MalformedResponse {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Err(ServiceError::MalformedResponse {
        message: format!("{} not found in response", tag),
    })
}

/// Parse a ListQueue response into queue URLs
fn parse_queue_urls(xml: &str) -> Result<Vec<String>, ServiceError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut urls = Vec::new();
    let mut in_url = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"QueueURL" => in_url = true,
            Ok(Event::Text(e)) if in_url => {
                let url = e.unescape().map(|s| s.into_owned()).map_err(|e| {
                    ServiceError::MalformedResponse {
                        message: format!("failed to parse XML: {}", e),
                    }
                })?;
                urls.push(url);
                in_url = false;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"QueueURL" => in_url = false,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ServiceError::MalformedResponse {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(urls)
}

/// Parse a batch receive response into raw messages
fn parse_received_messages(xml: &str) -> Result<Vec<RawMessage>, ServiceError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut in_message = false;
    let mut current_message_id: Option<String> = None;
    let mut current_receipt_handle: Option<String> = None;
    let mut current_body: Option<String> = None;

    let mut in_message_id = false;
    let mut in_receipt_handle = false;
    let mut in_body = false;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Message" => {
                    in_message = true;
                    current_message_id = None;
                    current_receipt_handle = None;
                    current_body = None;
                }
                b"MessageId" if in_message => in_message_id = true,
                b"ReceiptHandle" if in_message => in_receipt_handle = true,
                b"MessageBody" if in_message => in_body = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().ok().map(|s| s.into_owned());
                if in_message_id {
                    current_message_id = text;
                    in_message_id = false;
                } else if in_receipt_handle {
                    current_receipt_handle = text;
                    in_receipt_handle = false;
                } else if in_body {
                    current_body = text;
                    in_body = false;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Message" => {
                in_message = false;
                if let (Some(body), Some(receipt_handle)) =
                    (current_body.take(), current_receipt_handle.take())
                {
                    messages.push(RawMessage {
                        message_id: current_message_id.take().unwrap_or_default(),
                        receipt_handle,
                        body,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ServiceError::MalformedResponse {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Parse a queue attributes response
fn parse_queue_attributes(xml: &str) -> Result<QueueAttributes, ServiceError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut attributes = QueueAttributes::default();
    let mut current_tag: Option<Vec<u8>> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                tag @ (b"ActiveMessages" | b"InactiveMessages" | b"VisibilityTimeout") => {
                    current_tag = Some(tag.to_vec());
                }
                _ => current_tag = None,
            },
            Ok(Event::Text(e)) => {
                if let Some(tag) = current_tag.take() {
                    let text = e.unescape().ok().map(|s| s.into_owned()).unwrap_or_default();
                    match tag.as_slice() {
                        b"ActiveMessages" => {
                            attributes.active_messages = text.parse().unwrap_or(0);
                        }
                        b"InactiveMessages" => {
                            attributes.inactive_messages = text.parse().unwrap_or(0);
                        }
                        b"VisibilityTimeout" => {
                            attributes.visibility_timeout = text.parse().unwrap_or(0);
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ServiceError::MalformedResponse {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(attributes)
}

/// Parse an error response and map the remote code onto [`ServiceError`]
fn parse_error_response(xml: &str, status: StatusCode) -> ServiceError {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Code" => in_code = true,
                b"Message" => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| "Unknown".to_string());
    let message = error_message.unwrap_or_else(|| "Unknown error".to_string());

    match code.as_str() {
        "QueueNotExist" => ServiceError::QueueNotFound {
            queue_name: message,
        },
        "MessageNotExist" | "ReceiptHandleError" | "InvalidReceiptHandle" => {
            ServiceError::MessageNotFound { receipt: message }
        }
        "QueueAlreadyExist" => ServiceError::QueueConflict {
            queue_name: message,
        },
        "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" => {
            ServiceError::AuthenticationFailed {
                message: format!("{}: {}", code, message),
            }
        }
        _ if status.as_u16() == 401 || status.as_u16() == 403 => {
            ServiceError::AuthenticationFailed {
                message: format!("{}: {}", code, message),
            }
        }
        _ => ServiceError::ServiceFault { code, message },
    }
}
