//! nova-chat - terminal chat client for the Nova answer service
//!
//! Plain lines are sent as questions; lines starting with `/` are commands.

use nova_chat::display::{render_conversations, render_db, render_docs, render_message, render_thread};
use nova_chat::export::{export_csv, DEFAULT_CSV_FILENAME};
use nova_chat::model::{DbResult, ReplyPayload, Role};
use nova_chat::{ChatConfig, ChatHandle, ChatRuntime, ChatState, ChatStore, HttpAnswerClient, LoggingService};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
Comandos:
  /new              nova conversa
  /list             lista as conversas
  /open <n>         abre a conversa n
  /rename <título>  renomeia a conversa atual
  /delete [n]       apaga a conversa n (ou a atual)
  /retry            reenvia a última mensagem com falha
  /export [arquivo] exporta o último resultado de dados em CSV
  /help             mostra esta ajuda
  /quit             sai";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to stderr so stdout stays readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nova_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ChatConfig::from_env();
    tracing::info!(endpoint = %config.endpoint, user = %config.user, "Starting nova-chat");

    let store = ChatStore::open(&config.store);
    let client = HttpAnswerClient::new(&config)?;
    let service = LoggingService::new(Arc::new(client));
    let handle = ChatRuntime::spawn(store, service, config.reveal_interval);

    println!("Nova Chat. Digite /help para ver os comandos.");
    show_current(&handle.state());

    let renderer = tokio::spawn(render_updates(handle.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Quit => break,
            Input::Empty => {}
            input => {
                if let Err(e) = run_input(&handle, input).await {
                    println!("Erro: {e}");
                }
            }
        }
    }

    renderer.abort();
    Ok(())
}

// ============================================================================
// Input
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(String),
    New,
    List,
    Open(usize),
    Rename(String),
    Delete(Option<usize>),
    Retry,
    Export(Option<PathBuf>),
    Help,
    Quit,
    Invalid(String),
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    let index = |arg: &str| arg.parse::<usize>().ok().filter(|n| *n > 0);

    match (name, arg) {
        ("new", "") => Input::New,
        ("list", "") => Input::List,
        ("open", n) => index(n).map_or_else(|| Input::Invalid("uso: /open <n>".to_string()), Input::Open),
        ("rename", "") => Input::Invalid("uso: /rename <título>".to_string()),
        ("rename", title) => Input::Rename(title.to_string()),
        ("delete", "") => Input::Delete(None),
        ("delete", n) => index(n).map_or_else(
            || Input::Invalid("uso: /delete [n]".to_string()),
            |n| Input::Delete(Some(n)),
        ),
        ("retry", "") => Input::Retry,
        ("export", "") => Input::Export(None),
        ("export", path) => Input::Export(Some(PathBuf::from(path))),
        ("help", _) => Input::Help,
        ("quit" | "exit", _) => Input::Quit,
        _ => Input::Invalid(format!("comando desconhecido: /{name}")),
    }
}

async fn run_input(handle: &ChatHandle, input: Input) -> Result<(), Box<dyn Error>> {
    let state = handle.state();
    match input {
        Input::Send(text) => handle.send_message(text).await?,
        Input::New => {
            handle.new_chat().await?;
            println!("Nova conversa.");
        }
        Input::List => println!("{}", render_conversations(&state)),
        Input::Open(n) => {
            handle.load_conversation(conversation_at(&state, n)?).await?;
            show_current(&handle.state());
        }
        Input::Rename(title) => {
            let id = state.current_id.clone().ok_or("nenhuma conversa aberta")?;
            handle.rename_conversation(id, title).await?;
        }
        Input::Delete(n) => {
            let id = match n {
                Some(n) => conversation_at(&state, n)?,
                None => state.current_id.clone().ok_or("nenhuma conversa aberta")?,
            };
            handle.delete_conversation(id).await?;
            show_current(&handle.state());
        }
        Input::Retry => {
            let id = retry_target(&state).ok_or("nada para reenviar")?;
            handle.retry_message(id).await?;
        }
        Input::Export(path) => {
            let result = last_db_result(&state).ok_or("nenhum resultado de dados para exportar")?;
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_FILENAME));
            export_csv(&path, &result.columns, &result.rows)?;
            println!("Exportado para {}", path.display());
        }
        Input::Help => println!("{HELP}"),
        Input::Invalid(message) => println!("{message}"),
        Input::Quit | Input::Empty => {}
    }
    Ok(())
}

/// Id of the n-th listed conversation, counting from 1
fn conversation_at(state: &ChatState, n: usize) -> Result<String, String> {
    n.checked_sub(1)
        .and_then(|i| state.conversations.get(i))
        .map(|c| c.id.clone())
        .ok_or_else(|| format!("conversa {n} não existe"))
}

/// Most recent failed question or error reply
fn retry_target(state: &ChatState) -> Option<String> {
    state
        .messages
        .iter()
        .rev()
        .find(|m| m.is_failed() || m.is_error())
        .map(|m| m.id.clone())
}

fn last_db_result(state: &ChatState) -> Option<&DbResult> {
    state.messages.iter().rev().find_map(|m| match &m.reply {
        Some(ReplyPayload::Db(result)) => Some(result),
        _ => None,
    })
}

fn show_current(state: &ChatState) {
    if let Some(current) = state.current() {
        println!("== {} ==", current.title);
    }
    let thread = render_thread(state);
    if !thread.is_empty() {
        println!("{thread}");
    }
}

// ============================================================================
// Output
// ============================================================================

async fn render_updates(rx: watch::Receiver<ChatState>) {
    let mut renderer = Renderer::default();
    let mut updates = WatchStream::from_changes(rx);
    while let Some(state) = updates.next().await {
        renderer.update(&state);
    }
}

/// Prints replies as they are revealed and reports how exchanges end
#[derive(Default)]
struct Renderer {
    /// Reply on screen and how many bytes of it are shown
    streaming: Option<(String, usize)>,
    was_loading: bool,
}

impl Renderer {
    fn update(&mut self, state: &ChatState) {
        let mut finished = None;

        // A reveal that ended or was replaced: print whatever is left of it
        if let Some((id, shown)) = self.streaming.take() {
            match state.streaming_message() {
                Some(m) if m.id == id => self.streaming = Some((id, shown)),
                _ => {
                    if let Some(message) = state.message(&id) {
                        print_rest(&message.content, shown);
                        print_payload(message.reply.as_ref());
                    }
                    println!();
                    finished = Some(id);
                }
            }
        }

        if let Some(m) = state.streaming_message() {
            if self.streaming.is_none() {
                print!("\n{}", render_message(&m.with_content("")));
                self.streaming = Some((m.id.clone(), 0));
            }
            if let Some((_, shown)) = &mut self.streaming {
                print_rest(&m.content, *shown);
                *shown = m.content.len();
            }
        }

        if self.was_loading && !state.is_loading() {
            if let Some(last) = state.messages.last() {
                if last.is_failed() {
                    let reason = state.last_error.as_deref().unwrap_or_default();
                    println!("Falha no envio: {reason}. Digite /retry para tentar novamente.");
                } else if last.role == Role::Assistant && finished.as_deref() != Some(last.id.as_str()) {
                    println!("\n{}", render_message(last));
                }
            }
        }
        self.was_loading = state.is_loading();
        let _ = std::io::stdout().flush();
    }
}

fn print_rest(content: &str, shown: usize) {
    if let Some(rest) = content.get(shown..) {
        print!("{rest}");
    }
}

fn print_payload(payload: Option<&ReplyPayload>) {
    match payload {
        Some(ReplyPayload::Db(result)) => print!("\n\n{}", render_db(result)),
        Some(ReplyPayload::Docs(result)) => print!("\n\n{}", render_docs(result)),
        Some(ReplyPayload::Generic) | None => {}
    }
}
