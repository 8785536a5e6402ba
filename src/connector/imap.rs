//! IMAP mail connector over rustls.
//!
//! Speaks a small subset of IMAP4rev1 directly: LOGIN, SELECT, UID SEARCH,
//! UID FETCH, LIST, CREATE, UID COPY and LOGOUT. Labels map to mailboxes,
//! which is how Gmail exposes them over IMAP. Socket I/O is blocking and
//! runs under `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};

use super::{MailConnector, MailSession};
use crate::error::ConnectorError;
use crate::pipeline::types::{FetchFilter, RawMessage};

// ── Configuration ───────────────────────────────────────────────────

/// IMAP connector configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    /// When false, `apply_label` is a no-op returning `false` (demo mode).
    pub apply_labels: bool,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_IMAP_HOST` is not set (connector disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let username = std::env::var("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("EMAIL_PASSWORD").unwrap_or_default());
        let mailbox = std::env::var("EMAIL_MAILBOX").unwrap_or_else(|_| "INBOX".to_string());

        let apply_labels = std::env::var("EMAIL_APPLY_LABELS")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Some(Self {
            imap_host,
            imap_port,
            username,
            password,
            mailbox,
            apply_labels,
        })
    }
}

// ── Connector ───────────────────────────────────────────────────────

pub struct ImapConnector {
    config: EmailConfig,
}

impl ImapConnector {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    fn name(&self) -> &str {
        "imap"
    }

    async fn authenticate(&self) -> Result<Box<dyn MailSession>, ConnectorError> {
        let cfg = self.config.clone();
        let (io, uid_validity) = tokio::task::spawn_blocking(move || open_session(&cfg))
            .await
            .map_err(join_error)??;

        tracing::info!(
            host = %self.config.imap_host,
            mailbox = %self.config.mailbox,
            uid_validity,
            "IMAP session opened"
        );

        Ok(Box::new(ImapSession {
            io: Arc::new(Mutex::new(io)),
            uid_validity,
            apply_labels: self.config.apply_labels,
        }))
    }
}

fn open_session(config: &EmailConfig) -> Result<(ImapIo, u32), ConnectorError> {
    let mut io = ImapIo::connect(&config.imap_host, config.imap_port)?;

    let login = io.command(&format!(
        "LOGIN {} {}",
        quote(&config.username),
        quote(config.password.expose_secret())
    ))?;
    if !login.is_ok() {
        return Err(ConnectorError::AuthFailed {
            user: config.username.clone(),
        });
    }

    let select = io.command(&format!("SELECT {}", quote(&encode_mailbox(&config.mailbox))))?;
    select.require_ok("SELECT")?;
    let uid_validity = select
        .lines
        .iter()
        .find_map(|l| parse_uid_validity(&l.text))
        .unwrap_or(0);

    Ok((io, uid_validity))
}

// ── Session ─────────────────────────────────────────────────────────

struct ImapSession {
    io: Arc<Mutex<ImapIo>>,
    uid_validity: u32,
    apply_labels: bool,
}

impl ImapSession {
    /// Run `f` against the connection on the blocking pool.
    async fn with_io<T, F>(&self, f: F) -> Result<T, ConnectorError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapIo) -> Result<T, ConnectorError> + Send + 'static,
    {
        let io = Arc::clone(&self.io);
        tokio::task::spawn_blocking(move || {
            let mut guard = io.lock().map_err(|_| ConnectorError::Protocol {
                command: "session".into(),
                reason: "connection lock poisoned".into(),
            })?;
            f(&mut *guard)
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn fetch_messages(&self, filter: &FetchFilter) -> Result<Vec<RawMessage>, ConnectorError> {
        if filter.max_results == 0 {
            return Ok(Vec::new());
        }

        let criteria = search_criteria(filter);
        let max = filter.max_results;
        let uid_validity = self.uid_validity;

        let messages = self
            .with_io(move |io| {
                let search = io.command(&format!("UID SEARCH {criteria}"))?;
                search.require_ok("UID SEARCH")?;
                let uids = newest_uids(&search, max);
                if uids.is_empty() {
                    return Ok(Vec::new());
                }

                let set = uids
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let fetch = io.command(&format!("UID FETCH {set} (UID BODY.PEEK[])"))?;
                fetch.require_ok("UID FETCH")?;

                let mut by_uid = fetched_bodies(&fetch.lines);
                by_uid.sort_by(|a, b| b.0.cmp(&a.0));

                Ok(by_uid
                    .into_iter()
                    .filter_map(|(uid, raw)| parse_message(uid_validity, uid, raw))
                    .collect::<Vec<_>>())
            })
            .await?;

        tracing::info!(count = messages.len(), "Fetched messages");
        Ok(messages)
    }

    async fn apply_label(&self, id: &str, label: &str) -> Result<bool, ConnectorError> {
        if !self.apply_labels {
            tracing::debug!(id, label, "Label application disabled");
            return Ok(false);
        }

        let (validity, uid) = parse_message_id(id)?;
        if validity != self.uid_validity {
            return Err(ConnectorError::LabelFailed {
                id: id.to_string(),
                label: label.to_string(),
                reason: format!(
                    "UIDVALIDITY changed ({validity} -> {})",
                    self.uid_validity
                ),
            });
        }

        let label = label.to_string();
        self.with_io(move |io| {
            let list = io.command("LIST \"\" \"*\"")?;
            list.require_ok("LIST")?;
            let existing = list
                .lines
                .iter()
                .filter_map(|l| parse_list_name(&l.text))
                .find(|name| name.eq_ignore_ascii_case(&label));

            let mailbox = match existing {
                Some(name) => name,
                None => {
                    let create = io.command(&format!("CREATE {}", quote(&encode_mailbox(&label))))?;
                    if !create.is_ok() {
                        tracing::warn!(label = %label, status = %create.status, "CREATE rejected");
                        return Ok(false);
                    }
                    tracing::info!(label = %label, "Created label");
                    label.clone()
                }
            };

            let copy = io.command(&format!("UID COPY {uid} {}", quote(&encode_mailbox(&mailbox))))?;
            Ok(copy.is_ok())
        })
        .await
    }

    async fn close(&self) {
        let result = self
            .with_io(|io| {
                io.command("LOGOUT")?;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "IMAP logout failed");
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> ConnectorError {
    ConnectorError::Protocol {
        command: "session".into(),
        reason: format!("IMAP task panicked: {e}"),
    }
}

// ── Wire I/O ────────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One untagged response line, with the literal it announced (if any).
#[derive(Debug, Default)]
struct ResponseLine {
    text: String,
    literal: Option<Vec<u8>>,
}

/// Untagged lines plus the tagged completion status.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<ResponseLine>,
    status: String,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("OK")
    }

    fn require_ok(&self, command: &str) -> Result<(), ConnectorError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(ConnectorError::Protocol {
                command: command.to_string(),
                reason: format!("server replied {}", self.status),
            })
        }
    }
}

struct ImapIo {
    stream: BufReader<TlsStream>,
    next_tag: u32,
}

impl ImapIo {
    fn connect(host: &str, port: u16) -> Result<Self, ConnectorError> {
        let connect_err = |reason: String| ConnectorError::Connect {
            host: host.to_string(),
            reason,
        };

        let tcp = TcpStream::connect((host, port)).map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut io = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
        };

        let greeting = io.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(connect_err(format!("unexpected greeting: {}", greeting.trim_end())));
        }
        Ok(io)
    }

    fn read_line(&mut self) -> Result<String, ConnectorError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(ConnectorError::Protocol {
                command: "read".into(),
                reason: "IMAP connection closed".into(),
            });
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Send a tagged command and collect the response up to its completion.
    fn command(&mut self, cmd: &str) -> Result<Response, ConnectorError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(rest) = line.strip_prefix(&tag).and_then(|r| r.strip_prefix(' ')) {
                response.status = rest.split_whitespace().next().unwrap_or_default().to_string();
                return Ok(response);
            }

            let literal = match literal_len(&line) {
                Some(len) => {
                    let mut buf = vec![0u8; len];
                    self.stream.read_exact(&mut buf)?;
                    Some(buf)
                }
                None => None,
            };
            response.lines.push(ResponseLine {
                text: line.trim_end().to_string(),
                literal,
            });
        }
    }
}

/// Pair each fetched body with its UID. Servers order FETCH items freely,
/// so `UID` may come before the literal or on the continuation line after it.
fn fetched_bodies(lines: &[ResponseLine]) -> Vec<(u32, &[u8])> {
    let mut bodies = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let start = &lines[i];
        i += 1;
        if parse_fetch_seq(&start.text).is_none() {
            continue;
        }

        let mut uid = uid_item(&start.text);
        let mut literal = start.literal.as_deref();
        while let Some(next) = lines.get(i).filter(|l| !l.text.starts_with('*')) {
            uid = uid.or_else(|| uid_item(&next.text));
            literal = literal.or(next.literal.as_deref());
            i += 1;
        }

        match (uid, literal) {
            (Some(uid), Some(raw)) => bodies.push((uid, raw)),
            _ => tracing::warn!(line = %start.text, "FETCH response without UID or body, skipped"),
        }
    }
    bodies
}

// ── Protocol helpers (public for testing) ───────────────────────────

/// Length of the literal announced at the end of `line` (`... {123}\r\n`).
pub fn literal_len(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// Quote a string for use as an IMAP argument.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Encode a mailbox name in IMAP modified UTF-7 (ASCII subset: `&` -> `&-`).
pub fn encode_mailbox(name: &str) -> String {
    name.replace('&', "&-")
}

/// Inverse of [`encode_mailbox`] for ASCII names.
pub fn decode_mailbox(name: &str) -> String {
    name.replace("&-", "&")
}

/// IMAP date format for SEARCH: `10-Mar-2026`.
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

/// UID SEARCH criteria for a fetch filter.
pub fn search_criteria(filter: &FetchFilter) -> String {
    let mut parts = Vec::new();
    if let Some(since) = filter.since {
        parts.push(format!("SINCE {}", imap_date(since)));
    }
    if filter.unread_only {
        parts.push("UNSEEN".to_string());
    }
    if parts.is_empty() {
        parts.push("ALL".to_string());
    }
    parts.join(" ")
}

/// Parse `* OK [UIDVALIDITY 3857529045] UIDs valid`.
pub fn parse_uid_validity(line: &str) -> Option<u32> {
    let start = line.find("[UIDVALIDITY ")? + "[UIDVALIDITY ".len();
    let end = line[start..].find(']')? + start;
    line[start..end].trim().parse().ok()
}

/// Parse a `* SEARCH 1 2 3` line.
pub fn parse_search(line: &str) -> Vec<u32> {
    line.strip_prefix("* SEARCH")
        .map(|rest| {
            rest.split_whitespace()
                .filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn newest_uids(search: &Response, max: usize) -> Vec<u32> {
    let mut uids: Vec<u32> = search
        .lines
        .iter()
        .flat_map(|l| parse_search(&l.text))
        .collect();
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.dedup();
    uids.truncate(max);
    uids
}

/// Sequence number from a `* 12 FETCH (...` line.
fn parse_fetch_seq(line: &str) -> Option<u32> {
    let mut tokens = line.strip_prefix("* ")?.split_whitespace();
    let seq = tokens.next()?.parse().ok()?;
    tokens
        .next()
        .filter(|t| t.eq_ignore_ascii_case("FETCH"))
        .map(|_| seq)
}

/// Value of a `UID n` data item anywhere in a FETCH line fragment.
fn uid_item(text: &str) -> Option<u32> {
    let mut tokens = text
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|t| !t.is_empty());
    tokens.by_ref().find(|t| t.eq_ignore_ascii_case("UID"))?;
    tokens.next()?.parse().ok()
}

/// Mailbox name from a `* LIST (\HasNoChildren) "/" "Name"` line.
pub fn parse_list_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("* LIST ")?;
    let rest = &rest[rest.find(')')? + 1..];
    let (_delimiter, rest) = next_string(rest.trim_start())?;
    let (name, _) = next_string(rest.trim_start())?;
    Some(decode_mailbox(&name))
}

/// Read one quoted string or atom, returning it and the remainder.
fn next_string(s: &str) -> Option<(String, &str)> {
    if let Some(body) = s.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => out.push(chars.next()?.1),
                '"' => return Some((out, &body[i + 1..])),
                _ => out.push(c),
            }
        }
        None
    } else {
        let end = s.find(char::is_whitespace).unwrap_or(s.len());
        if end == 0 {
            return None;
        }
        Some((s[..end].to_string(), &s[end..]))
    }
}

/// Message id format: `<uidvalidity>:<uid>`.
pub fn message_id(uid_validity: u32, uid: u32) -> String {
    format!("{uid_validity}:{uid}")
}

pub fn parse_message_id(id: &str) -> Result<(u32, u32), ConnectorError> {
    let invalid = || ConnectorError::InvalidMessageId(id.to_string());
    let (validity, uid) = id.split_once(':').ok_or_else(invalid)?;
    Ok((
        validity.parse().map_err(|_| invalid())?,
        uid.parse().map_err(|_| invalid())?,
    ))
}

// ── Message parsing ─────────────────────────────────────────────────

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `From` header as `Name <address>`, or just the address.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return String::new();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

/// Plain-text body, falling back to stripped HTML. Empty when neither exists.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.into_owned();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Build a `RawMessage` from an RFC 822 blob.
pub fn parse_message(uid_validity: u32, uid: u32, raw: &[u8]) -> Option<RawMessage> {
    let parsed = MessageParser::default().parse(raw)?;
    let timestamp = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    Some(RawMessage {
        id: message_id(uid_validity, uid),
        sender: extract_sender(&parsed),
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: extract_text(&parsed),
        timestamp,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
