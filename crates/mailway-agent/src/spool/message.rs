//! Queued message inspection.
//!
//! Only the top-level headers are parsed; the body is carried as opaque bytes.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lettre::Address;
use lettre::address::Envelope;
use mailparse::MailHeaderMap;

use super::SpoolError;

/// Stamped on the message by every pass through the relay.
pub const ATTEMPT_HEADER: &str = "Mw-Int-Id";
/// Routing hint set by the component that queued the message.
pub const VIA_HEADER: &str = "Mw-Int-Via";
pub const MAIL_FROM_HEADER: &str = "Mw-Int-Mail-From";
pub const RCPT_TO_HEADER: &str = "Mw-Int-Rcpt-To";

/// Routing hint the resubmission path cannot handle yet.
pub const UNSUPPORTED_ROUTE: &str = "responder";

/// A failed outbound message waiting in the spool directory.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    path: PathBuf,
    modified: SystemTime,
    attempts: usize,
    via: Option<String>,
    mail_from: Option<String>,
    rcpt_to: Option<String>,
    data: Vec<u8>,
}

impl QueuedMessage {
    pub async fn read(path: &Path) -> Result<Self, SpoolError> {
        let read_err = |source| SpoolError::Read {
            path: path.to_path_buf(),
            source,
        };
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(read_err)?;
        let data = tokio::fs::read(path).await.map_err(read_err)?;
        Self::parse(path, modified, data)
    }

    pub fn parse(
        path: impl Into<PathBuf>,
        modified: SystemTime,
        data: Vec<u8>,
    ) -> Result<Self, SpoolError> {
        let (headers, _) = mailparse::parse_headers(&data)?;
        let attempts = headers.get_all_headers(ATTEMPT_HEADER).len();
        let via = non_empty(headers.get_first_value(VIA_HEADER));
        let mail_from = non_empty(
            headers
                .get_first_value(MAIL_FROM_HEADER)
                .map(|v| strip_brackets(&v)),
        );
        let rcpt_to = non_empty(
            headers
                .get_first_value(RCPT_TO_HEADER)
                .map(|v| strip_brackets(&v)),
        );

        Ok(Self {
            path: path.into(),
            modified,
            attempts,
            via,
            mail_from,
            rcpt_to,
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Number of earlier passes through the relay.
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn via(&self) -> Option<&str> {
        self.via.as_deref()
    }

    pub fn is_unsupported_route(&self) -> bool {
        self.via() == Some(UNSUPPORTED_ROUTE)
    }

    /// Envelope sender; `None` for a null reverse-path.
    pub fn mail_from(&self) -> Option<&str> {
        self.mail_from.as_deref()
    }

    pub fn rcpt_to(&self) -> Option<&str> {
        self.rcpt_to.as_deref()
    }

    /// Raw message bytes, headers included.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// SMTP envelope recorded when the message was queued.
    pub fn envelope(&self) -> Result<Envelope, SpoolError> {
        let to = self
            .rcpt_to()
            .ok_or(SpoolError::MissingHeader(RCPT_TO_HEADER))?;
        let to = parse_address(to)?;
        let from = self.mail_from().map(parse_address).transpose()?;
        Ok(Envelope::new(from, vec![to])?)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn strip_brackets(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .unwrap_or(value)
        .to_string()
}

fn parse_address(address: &str) -> Result<Address, SpoolError> {
    address
        .parse()
        .map_err(|source| SpoolError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> QueuedMessage {
        QueuedMessage::parse(
            "/spool/msg",
            SystemTime::UNIX_EPOCH,
            raw.as_bytes().to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn counts_attempt_headers_only() {
        let message = parse(
            "Mw-Int-Id: a\r\n\
             Mw-Int-Id: b\r\n\
             Mw-Int-Mail-From: <alice@example.com>\r\n\
             Mw-Int-Rcpt-To: <bob@example.org>\r\n\
             Subject: Mw-Int-Id in subject\r\n\
             \r\n\
             Body mentioning Mw-Int-Id twice: Mw-Int-Id\r\n",
        );
        assert_eq!(message.attempts(), 2);
        assert_eq!(message.mail_from(), Some("alice@example.com"));
        assert_eq!(message.rcpt_to(), Some("bob@example.org"));
        assert!(!message.is_unsupported_route());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let message = parse("mw-int-via: responder\r\nMW-INT-ID: x\r\n\r\nhi\r\n");
        assert_eq!(message.attempts(), 1);
        assert!(message.is_unsupported_route());
    }

    #[test]
    fn envelope_uses_recorded_addresses() {
        let message = parse(
            "Mw-Int-Mail-From: alice@example.com\r\nMw-Int-Rcpt-To: bob@example.org\r\n\r\nhi\r\n",
        );
        let envelope = message.envelope().unwrap();
        assert_eq!(envelope.from().unwrap().to_string(), "alice@example.com");
        assert_eq!(envelope.to().len(), 1);
        assert_eq!(envelope.to()[0].to_string(), "bob@example.org");
    }

    #[test]
    fn null_sender_has_no_envelope_from() {
        let message = parse("Mw-Int-Mail-From: <>\r\nMw-Int-Rcpt-To: bob@example.org\r\n\r\n");
        assert!(message.mail_from().is_none());
        assert!(message.envelope().unwrap().from().is_none());
    }

    #[test]
    fn missing_recipient_is_an_error() {
        let message = parse("Mw-Int-Mail-From: alice@example.com\r\n\r\nhi\r\n");
        let err = message.envelope().unwrap_err();
        assert!(
            matches!(err, SpoolError::MissingHeader(RCPT_TO_HEADER)),
            "got {err:?}"
        );
    }

    #[test]
    fn malformed_recipient_is_an_error() {
        let message = parse("Mw-Int-Rcpt-To: not an address\r\n\r\n");
        let err = message.envelope().unwrap_err();
        assert!(matches!(err, SpoolError::InvalidAddress { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn read_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = QueuedMessage::read(&dir.path().join("gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpoolError::Read { .. }), "got {err:?}");
    }
}
