//! Twitch chat over plain IRC.
//!
//! Speaks just enough of the protocol to log in, join one channel, answer
//! keepalive pings and turn PRIVMSG lines into `ChatMessage`s on the chat queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{ChatMessage, ChatSource};
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::store::QueueStore;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, PartialEq, Eq)]
enum IrcEvent {
    Welcome,
    AuthFailed,
    Ping(String),
    Reconnect,
    Message(ChatMessage),
    Other,
}

fn parse_line(line: &str) -> IrcEvent {
    let mut rest = line.trim_end_matches(['\r', '\n']);

    // IRCv3 tags, only present if requested
    if rest.starts_with('@') {
        rest = rest.split_once(' ').map_or("", |(_, r)| r);
    }

    let prefix = if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
        rest = r;
        Some(prefix)
    } else {
        None
    };

    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));
    match command {
        "001" => IrcEvent::Welcome,
        "PING" => IrcEvent::Ping(params.trim_start_matches(':').to_string()),
        "RECONNECT" => IrcEvent::Reconnect,
        "NOTICE" if params.contains("Login authentication failed") || params.contains("Improperly formatted auth") => {
            IrcEvent::AuthFailed
        }
        "PRIVMSG" => {
            let author = prefix.and_then(|p| p.split('!').next()).unwrap_or_default();
            match params.split_once(" :") {
                Some((_channel, content)) if !author.is_empty() => {
                    IrcEvent::Message(ChatMessage::new(author, content))
                }
                _ => IrcEvent::Other,
            }
        }
        _ => IrcEvent::Other,
    }
}

pub struct TwitchIrcSource {
    server: String,
    nick: String,
    channel: String,
    store: Arc<dyn QueueStore>,
    chat_queue: String,
    lines: Option<Lines<BufReader<OwnedReadHalf>>>,
    writer: Option<OwnedWriteHalf>,
}

impl TwitchIrcSource {
    pub fn new(config: &ChatConfig, store: Arc<dyn QueueStore>, chat_queue: impl Into<String>) -> Self {
        Self {
            server: config.server.clone(),
            nick: config.nick.to_lowercase(),
            channel: config.channel.trim_start_matches('#').to_lowercase(),
            store,
            chat_queue: chat_queue.into(),
            lines: None,
            writer: None,
        }
    }

    async fn send(&mut self, line: &str) -> Result<(), ChatError> {
        let writer = self.writer.as_mut().ok_or(ChatError::Disconnected)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<IrcEvent, ChatError> {
        let lines = self.lines.as_mut().ok_or(ChatError::Disconnected)?;
        match lines.next_line().await? {
            Some(line) => Ok(parse_line(&line)),
            None => Err(ChatError::Disconnected),
        }
    }

    async fn wait_for_welcome(&mut self) -> Result<(), ChatError> {
        loop {
            match self.next_event().await? {
                IrcEvent::Welcome => return Ok(()),
                IrcEvent::AuthFailed => return Err(ChatError::AuthRejected),
                IrcEvent::Ping(payload) => self.send(&format!("PONG :{payload}")).await?,
                _ => {}
            }
        }
    }

    async fn deliver(&self, message: &ChatMessage) -> Result<(), ChatError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| ChatError::Protocol(format!("failed to encode chat message: {e}")))?;
        self.store.push_tail(&self.chat_queue, &payload).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatSource for TwitchIrcSource {
    async fn connect(&mut self, token: &str) -> Result<(), ChatError> {
        let stream = TcpStream::connect(self.server.as_str()).await?;
        let (read, write) = stream.into_split();
        self.lines = Some(BufReader::new(read).lines());
        self.writer = Some(write);

        let token = token.strip_prefix("oauth:").unwrap_or(token);
        self.send(&format!("PASS oauth:{token}")).await?;
        self.send(&format!("NICK {}", self.nick)).await?;

        match tokio::time::timeout(LOGIN_TIMEOUT, self.wait_for_welcome()).await {
            Ok(result) => result?,
            Err(_) => return Err(ChatError::Protocol("no welcome from chat server".into())),
        }

        self.send(&format!("JOIN #{}", self.channel)).await?;
        info!("Joined #{} as {}", self.channel, self.nick);
        Ok(())
    }

    async fn pump(&mut self) -> Result<(), ChatError> {
        loop {
            match self.next_event().await? {
                IrcEvent::Ping(payload) => self.send(&format!("PONG :{payload}")).await?,
                IrcEvent::Reconnect => {
                    warn!("Chat server requested reconnect");
                    return Err(ChatError::Disconnected);
                }
                IrcEvent::AuthFailed => return Err(ChatError::AuthRejected),
                IrcEvent::Message(message) => {
                    if message.author == self.nick {
                        continue;
                    }
                    info!("New chat message from {}: {}", message.author, message.content);
                    self.deliver(&message).await?;
                }
                IrcEvent::Welcome | IrcEvent::Other => debug!("Ignoring IRC line"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;
    use tokio::net::TcpListener;

    #[test]
    fn parses_privmsg() {
        let event = parse_line(":alice!alice@alice.tmi.twitch.tv PRIVMSG #philosophy :what is time?\r\n");
        assert_eq!(event, IrcEvent::Message(ChatMessage::new("alice", "what is time?")));
    }

    #[test]
    fn parses_privmsg_with_tags() {
        let event = parse_line("@badge-info=;color=#FF0000 :bob!bob@bob.tmi.twitch.tv PRIVMSG #philosophy :hi :)");
        assert_eq!(event, IrcEvent::Message(ChatMessage::new("bob", "hi :)")));
    }

    #[test]
    fn parses_control_lines() {
        assert_eq!(parse_line("PING :tmi.twitch.tv"), IrcEvent::Ping("tmi.twitch.tv".into()));
        assert_eq!(parse_line(":tmi.twitch.tv 001 bot :Welcome, GLHF!"), IrcEvent::Welcome);
        assert_eq!(parse_line(":tmi.twitch.tv NOTICE * :Login authentication failed"), IrcEvent::AuthFailed);
        assert_eq!(parse_line(":tmi.twitch.tv RECONNECT"), IrcEvent::Reconnect);
        assert_eq!(parse_line(":tmi.twitch.tv 372 bot :You are in a maze"), IrcEvent::Other);
    }

    async fn fake_server(script: &'static [&'static str]) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut received = Vec::new();
            // PASS, NICK
            for _ in 0..2 {
                received.push(lines.next_line().await.unwrap().unwrap());
            }
            for line in script {
                write.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
                if line.contains(" 001 ") {
                    received.push(lines.next_line().await.unwrap().unwrap());
                }
            }
            if script.iter().any(|l| l.starts_with("PING")) {
                received.push(lines.next_line().await.unwrap().unwrap());
            }
            received
        });
        (addr, handle)
    }

    fn source(server: String, store: Arc<MemoryQueueStore>) -> TwitchIrcSource {
        let config = ChatConfig {
            server,
            nick: "PodcastBot".into(),
            channel: "#Philosophy".into(),
            ..ChatConfig::default()
        };
        TwitchIrcSource::new(&config, store, "chat")
    }

    #[tokio::test]
    async fn forwards_chat_lines_to_queue() {
        let (addr, server) = fake_server(&[
            ":tmi.twitch.tv 001 podcastbot :Welcome, GLHF!",
            ":alice!alice@alice.tmi.twitch.tv PRIVMSG #philosophy :hello there",
            ":podcastbot!podcastbot@podcastbot.tmi.twitch.tv PRIVMSG #philosophy :my own echo",
            "PING :tmi.twitch.tv",
        ])
        .await;
        let store = Arc::new(MemoryQueueStore::new());
        let mut source = source(addr, store.clone());

        source.connect("abc123").await.unwrap();
        let result = source.pump().await;
        assert!(matches!(result, Err(ChatError::Disconnected)));

        let received = server.await.unwrap();
        assert_eq!(received, vec!["PASS oauth:abc123", "NICK podcastbot", "JOIN #philosophy", "PONG :tmi.twitch.tv"]);

        assert_eq!(store.length("chat").await.unwrap(), 1);
        let payload = store.pop_head("chat").await.unwrap().unwrap();
        let message: ChatMessage = serde_json::from_str(&payload).unwrap();
        assert_eq!(message, ChatMessage::new("alice", "hello there"));
    }

    #[tokio::test]
    async fn refused_token_is_auth_rejection() {
        let (addr, _server) = fake_server(&[":tmi.twitch.tv NOTICE * :Login authentication failed"]).await;
        let mut source = source(addr, Arc::new(MemoryQueueStore::new()));

        assert!(matches!(source.connect("oauth:expired").await, Err(ChatError::AuthRejected)));
    }
}
