//! Test IRC client.
//!
//! A minimal raw-line client for integration testing: sends commands over a
//! plain `TcpStream` and parses replies well enough to assert on them.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// One parsed server line: `[:prefix] COMMAND [params...] [:trailing]`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl Reply {
    fn parse(line: &str) -> Self {
        let mut rest = line;
        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
            prefix = Some(p.to_string());
            rest = r;
        }
        let (head, trailing) = match rest.split_once(" :") {
            Some((h, t)) => (h, Some(t.to_string())),
            None => (rest, None),
        };
        let mut tokens = head.split_whitespace();
        let command = tokens.next().unwrap_or("").to_string();
        let params = tokens.map(str::to_string).collect();
        Reply {
            prefix,
            command,
            params,
            trailing,
        }
    }

    /// Whether this is a numeric reply matching `code`, rendered as `%03d`.
    pub fn is_numeric(&self, code: u16) -> bool {
        self.command == format!("{code:03}")
    }
}

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    nick: String,
}

impl TestClient {
    pub async fn connect(addr: std::net::SocketAddr, nick: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, writer) = stream.into_split();
        Ok(TestClient {
            reader: BufReader::new(read_half),
            writer,
            nick: nick.to_string(),
        })
    }

    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<Reply> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Reply> {
        let mut line = String::new();
        timeout(dur, self.reader.read_line(&mut line)).await??;
        Ok(Reply::parse(line.trim_end()))
    }

    /// Keep receiving until `predicate` matches a line, returning every line
    /// seen along the way (inclusive of the match).
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<Reply>>
    where
        F: FnMut(&Reply) -> bool,
    {
        let mut replies = Vec::new();
        loop {
            let reply = self.recv().await?;
            let done = predicate(&reply);
            replies.push(reply);
            if done {
                break;
            }
        }
        Ok(replies)
    }

    /// Register as `nick@tenant` with a login-qualified `NICK`, then `USER`.
    /// Waits for `RPL_WELCOME` (001).
    pub async fn register(&mut self, tenant: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("NICK {}@{}", self.nick, tenant)).await?;
        self.send_raw(&format!(
            "USER {}@{} 0 * :Test User {}",
            self.nick, tenant, self.nick
        ))
        .await?;
        self.recv_until(|r| r.is_numeric(376)).await?;
        Ok(())
    }

    pub async fn join(&mut self, channel: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("JOIN {channel}")).await
    }

    pub async fn privmsg(&mut self, target: &str, text: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("PRIVMSG {target} :{text}")).await
    }

    pub async fn quit(&mut self, reason: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("QUIT :{reason}")).await
    }

    pub async fn cap_req(&mut self, caps: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("CAP REQ :{caps}")).await
    }
}
