use std::sync::Arc;

use serde_json::json;
use stride_core::ids::TempId;
use stride_runtime::EngineConfig;
use stride_runtime::backend::ChatBackend;
use stride_runtime::chat::ChatSession;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::util::{EXIT_OK, EXIT_SERVER, print_error, print_json};

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(String),
    Retry(TempId),
    Discard(TempId),
    Reload,
    Quit,
    Invalid(String),
}

fn parse_line(line: &str) -> Input {
    let Some(command) = line.trim().strip_prefix('/') else {
        return Input::Send(line.to_string());
    };
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    let temp_id = |arg: Option<&str>| match arg.map(str::parse::<TempId>) {
        Some(Ok(id)) => Ok(id),
        Some(Err(e)) => Err(e.to_string()),
        None => Err(format!("/{name} needs a temp id such as tmp-3")),
    };
    match name {
        "retry" => temp_id(arg).map_or_else(Input::Invalid, Input::Retry),
        "discard" => temp_id(arg).map_or_else(Input::Invalid, Input::Discard),
        "reload" => Input::Reload,
        "quit" => Input::Quit,
        other => Input::Invalid(format!("unknown command /{other}")),
    }
}

/// Applies one input line. Returns false once the user asked to quit.
fn handle<B: ChatBackend>(session: &mut ChatSession<B>, line: &str) -> bool {
    match parse_line(line) {
        Input::Send(text) => {
            session.set_draft(text);
            if let Err(err) = session.send_draft() {
                print_error(err.code(), &err.to_string(), None);
            }
        }
        Input::Retry(temp_id) => {
            if let Err(err) = session.retry(temp_id) {
                let hint = Some("Only failed messages can be retried");
                print_error("cli_error", &err.to_string(), hint);
            }
        }
        Input::Discard(temp_id) => match session.discard(temp_id) {
            Ok(text) => {
                print_json(&json!({ "event": "discarded", "temp_id": temp_id, "text": text }))
            }
            Err(err) => {
                let hint = Some("Only failed messages can be discarded");
                print_error("cli_error", &err.to_string(), hint)
            }
        },
        Input::Reload => session.reload(),
        Input::Quit => return false,
        Input::Invalid(message) => {
            let hint = Some("Commands: /retry, /discard, /reload, /quit");
            print_error("cli_error", &message, hint)
        }
    }
    true
}

pub async fn run<B: ChatBackend>(backend: Arc<B>, config: EngineConfig, chat_id: &str) -> i32 {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    drive(backend, config, chat_id, lines).await
}

/// Runs the chat screen until input ends, then waits for outstanding sends.
async fn drive<B, R>(
    backend: Arc<B>,
    config: EngineConfig,
    chat_id: &str,
    mut lines: Lines<R>,
) -> i32
where
    B: ChatBackend,
    R: AsyncBufRead + Unpin,
{
    let mut session = ChatSession::new(backend, chat_id, config);
    session
        .messages_mut()
        .subscribe(|list| print_json(&json!({ "messages": list.entities() })));
    session.open();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle(&mut session, &line) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    print_error("cli_error", &format!("reading stdin failed: {e}"), None);
                    break;
                }
            },
            event = session.next_event() => session.apply(event),
        }
    }
    session.settle().await;

    let failed: Vec<_> = session.sender().failed().cloned().collect();
    if let Some(message) = session.load_error() {
        print_error("load_failed", message, Some("Use /reload to try again"));
    }
    if !failed.is_empty() {
        print_json(&json!({ "event": "unsent", "messages": failed }));
    }
    if failed.is_empty() && session.load_error().is_none() {
        EXIT_OK
    } else {
        EXIT_SERVER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;
    use stride_core::chat::{Chat, Message, SendMessageRequest};
    use stride_core::error::RemoteError;

    #[derive(Default)]
    struct Room {
        sends: Mutex<Vec<String>>,
        reads: Mutex<u32>,
        offline: bool,
    }

    impl ChatBackend for Room {
        async fn fetch_chats(&self, _search: &str) -> Result<Vec<Chat>, RemoteError> {
            Ok(Vec::new())
        }

        async fn fetch_messages(&self, _chat_id: &str) -> Result<Vec<Message>, RemoteError> {
            if self.offline {
                return Err(RemoteError::Network("offline".to_string()));
            }
            Ok(vec![Message {
                id: "m1".to_string(),
                text: "who's in for saturday?".to_string(),
                sent_at: Utc::now(),
                sender_id: Some("u2".to_string()),
            }])
        }

        async fn send_message(
            &self,
            _chat_id: &str,
            request: &SendMessageRequest,
        ) -> Result<Message, RemoteError> {
            if self.offline {
                return Err(RemoteError::Network("offline".to_string()));
            }
            let mut sends = self.sends.lock().unwrap();
            sends.push(request.text.clone());
            Ok(Message {
                id: format!("m{}", sends.len() + 1),
                text: request.text.clone(),
                sent_at: Utc::now(),
                sender_id: None,
            })
        }

        async fn mark_chat_as_read(&self, _chat_id: &str) -> Result<(), RemoteError> {
            *self.reads.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn input(text: &'static str) -> Lines<BufReader<&'static [u8]>> {
        BufReader::new(text.as_bytes()).lines()
    }

    #[test]
    fn parses_commands_and_plain_text() {
        assert_eq!(parse_line("on my way"), Input::Send("on my way".to_string()));
        assert_eq!(parse_line("/reload"), Input::Reload);
        assert_eq!(parse_line(" /quit "), Input::Quit);
        assert_eq!(parse_line("/retry tmp-12"), Input::Retry("tmp-12".parse().unwrap()));
        assert_eq!(parse_line("/discard tmp-3"), Input::Discard("tmp-3".parse().unwrap()));
        assert!(matches!(parse_line("/retry"), Input::Invalid(_)));
        assert!(matches!(parse_line("/retry m-12"), Input::Invalid(_)));
        assert!(matches!(parse_line("/dance"), Input::Invalid(_)));
    }

    #[tokio::test]
    async fn sends_each_line_and_waits_for_confirmation_on_eof() {
        let room = Arc::new(Room::default());
        let code = drive(
            Arc::clone(&room),
            EngineConfig::default(),
            "c1",
            input("me!\n\n   \nbringing snacks\n"),
        )
        .await;

        assert_eq!(code, EXIT_OK);
        assert_eq!(
            *room.sends.lock().unwrap(),
            vec!["me!".to_string(), "bringing snacks".to_string()]
        );
    }

    #[tokio::test]
    async fn quit_stops_reading_input() {
        let room = Arc::new(Room::default());
        let lines = input("first\n/quit\nsecond\n");
        let code = drive(Arc::clone(&room), EngineConfig::default(), "c1", lines).await;

        assert_eq!(code, EXIT_OK);
        assert_eq!(*room.sends.lock().unwrap(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn unsent_messages_fail_the_session() {
        let room = Arc::new(Room {
            offline: true,
            ..Room::default()
        });
        let code = drive(Arc::clone(&room), EngineConfig::default(), "c1", input("hello?\n")).await;

        assert_eq!(code, EXIT_SERVER);
        assert!(room.sends.lock().unwrap().is_empty());
    }
}
