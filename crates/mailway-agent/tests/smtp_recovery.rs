#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Resubmission against a minimal SMTP listener on the loopback interface.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use mailway_agent::spool::{SmtpResubmitter, SpoolError, recover_file};

/// Accepts every connection and records the commands and message body.
struct MockRelay {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
    body: Arc<Mutex<String>>,
}

impl MockRelay {
    async fn start(rcpt_code: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let body = Arc::new(Mutex::new(String::new()));

        let (c, b) = (Arc::clone(&commands), Arc::clone(&body));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (c, b) = (Arc::clone(&c), Arc::clone(&b));
                tokio::spawn(async move {
                    let _ = handle(stream, rcpt_code, c, b).await;
                });
            }
        });

        Self {
            addr,
            commands,
            body,
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn body(&self) -> String {
        self.body.lock().unwrap().clone()
    }
}

async fn handle(
    stream: TcpStream,
    rcpt_code: u16,
    commands: Arc<Mutex<Vec<String>>>,
    body: Arc<Mutex<String>>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    writer.write_all(b"220 mock ESMTP ready\r\n").await?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_string();
        commands.lock().unwrap().push(command.clone());

        let verb = command.to_ascii_uppercase();
        if verb.starts_with("EHLO") {
            writer.write_all(b"250-mock\r\n250 SIZE 10000\r\n").await?;
        } else if verb.starts_with("RCPT") {
            let reply = if rcpt_code == 250 { "OK" } else { "mailbox unavailable" };
            writer
                .write_all(format!("{rcpt_code} {reply}\r\n").as_bytes())
                .await?;
        } else if verb == "DATA" {
            writer.write_all(b"354 end with <CRLF>.<CRLF>\r\n").await?;
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                if line == ".\r\n" {
                    break;
                }
                body.lock().unwrap().push_str(&line);
            }
            writer.write_all(b"250 queued\r\n").await?;
        } else if verb == "QUIT" {
            writer.write_all(b"221 bye\r\n").await?;
            return Ok(());
        } else {
            writer.write_all(b"250 OK\r\n").await?;
        }
    }
}

const MESSAGE: &str = "Mw-Int-Id: first-pass\r\n\
Mw-Int-Mail-From: <alice@example.com>\r\n\
Mw-Int-Rcpt-To: <bob@example.org>\r\n\
Subject: quarterly report\r\n\
\r\n\
See attached.\r\n";

#[tokio::test]
async fn recovered_message_is_relayed_and_removed() {
    let relay = MockRelay::start(250).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail-1");
    std::fs::write(&path, MESSAGE).unwrap();

    let resubmitter = SmtpResubmitter::new(relay.addr.port());
    recover_file(&resubmitter, &path).await.unwrap();

    assert!(!path.exists());
    let commands = relay.commands();
    assert!(
        commands.iter().any(|c| c.starts_with("MAIL FROM:<alice@example.com>")),
        "commands: {commands:?}"
    );
    assert!(
        commands.iter().any(|c| c.starts_with("RCPT TO:<bob@example.org>")),
        "commands: {commands:?}"
    );
    let body = relay.body();
    assert!(body.contains("Subject: quarterly report"));
    assert!(body.contains("Mw-Int-Id: first-pass"));
}

#[tokio::test]
async fn rejected_recipient_keeps_the_file() {
    let relay = MockRelay::start(550).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail-1");
    std::fs::write(&path, MESSAGE).unwrap();

    let resubmitter = SmtpResubmitter::new(relay.addr.port());
    let err = recover_file(&resubmitter, &path).await.unwrap_err();

    assert!(matches!(err, SpoolError::Resubmit(_)), "got {err:?}");
    assert!(path.exists());
}

#[tokio::test]
async fn unreachable_relay_is_a_resubmit_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail-1");
    std::fs::write(&path, MESSAGE).unwrap();

    let err = recover_file(&SmtpResubmitter::new(port), &path)
        .await
        .unwrap_err();
    assert!(matches!(err, SpoolError::Resubmit(_)), "got {err:?}");
    assert!(path.exists());
}
