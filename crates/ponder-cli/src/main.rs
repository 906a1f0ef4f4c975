//! ponder - terminal chat client for reasoning-capable models

mod commands;
mod config;
mod ui;
mod utils;

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ponder_chat::{
    ChatSession, ConversationStore, FlushMode, SessionConfig, StoreEvent, StreamOutcome,
};
use ponder_stream::{BackendClient, ChatRequest, ConversationId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::{JoinError, JoinSet};

use commands::{CommandResult, ModelCommand};
use ui::Renderer;

/// ponder - chat with reasoning models from the terminal
#[derive(Parser, Debug)]
#[command(name = "ponder")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat backend URL (default: http://127.0.0.1:5000)
    #[arg(long)]
    server: Option<String>,

    /// Model to use (default: the backend's default model)
    #[arg(short, long)]
    model: Option<String>,

    /// Conversation to open (id, id prefix or list index)
    #[arg(long)]
    conversation: Option<String>,

    /// Don't stream reasoning from thinking models
    #[arg(long)]
    no_thinking: bool,

    /// Let the backend search the web
    #[arg(long)]
    web_search: bool,

    /// Show replies once complete instead of as they stream
    #[arg(long)]
    buffered: bool,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// List conversations and exit
    #[arg(long)]
    list: bool,

    /// List available models and exit
    #[arg(long)]
    models: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

type SendResult = (ConversationId, ponder_chat::Result<StreamOutcome>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Load config file; CLI args take precedence
    let cfg = config::Config::load();
    let server = args.server.clone().unwrap_or_else(|| cfg.server_url());
    let client = Arc::new(BackendClient::new(server)?);

    if args.models {
        return list_models(&client).await;
    }

    let conversations = client
        .list_conversations()
        .await
        .with_context(|| format!("Failed to load conversations from {}", client.base_url()))?;

    if args.list {
        println!("{}", ui::format_conversation_list(&conversations, None));
        return Ok(());
    }

    let model = match args.model.clone().or(cfg.model.clone()) {
        Some(model) => model,
        None => client
            .default_model()
            .await
            .context("Failed to get the backend's default model")?,
    };

    let flush = if args.buffered {
        FlushMode::Buffered
    } else {
        cfg.flush_mode()
    };
    let session_config = SessionConfig {
        flush,
        idle_timeout: cfg.idle_timeout(),
    };

    let store = ConversationStore::new();
    store.replace_all(conversations);
    let session = ChatSession::new(store, client.clone(), session_config);

    let mut app = App {
        client,
        session,
        renderer: Renderer::new(io::stdout().is_terminal()),
        model,
        deep_thinking: !args.no_thinking && cfg.deep_thinking.unwrap_or(true),
        web_search: args.web_search || cfg.web_search.unwrap_or(false),
    };

    if let Some(ref arg) = args.conversation {
        let conversations = app.session.store().conversations();
        let id = commands::resolve_conversation(arg, &conversations)
            .with_context(|| format!("No conversation matches '{}'", arg))?;
        app.session.switch_to(&id)?;
    }

    // Non-interactive mode
    if let Some(command) = args.command {
        return app.run_command(&command).await;
    }

    app.run_interactive().await
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let from_env = std::env::var_os("RUST_LOG").is_some();
    if !verbose && !from_env {
        return;
    }

    let filter = if from_env {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("ponder=debug,ponder_chat=debug,ponder_stream=debug")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn list_models(client: &BackendClient) -> anyhow::Result<()> {
    let models = client.list_models().await?;
    let thinking = client.thinking_models().await.unwrap_or_default();
    let current = client.default_model().await.unwrap_or_default();
    println!(
        "{}",
        ModelCommand::list_models_text(&current, &models, &thinking)
    );
    Ok(())
}

struct App {
    client: Arc<BackendClient>,
    session: ChatSession,
    renderer: Renderer,
    model: String,
    deep_thinking: bool,
    web_search: bool,
}

impl App {
    fn store(&self) -> &ConversationStore {
        self.session.store()
    }

    fn request(&self, conversation_id: ConversationId, text: &str) -> ChatRequest {
        ChatRequest {
            deep_thinking: self.deep_thinking,
            web_search: self.web_search,
            ..ChatRequest::new(conversation_id, text, self.model.as_str())
        }
    }

    /// Send one prompt, print the reply, and exit
    async fn run_command(&mut self, command: &str) -> anyhow::Result<()> {
        let id = match self.store().active() {
            Some(id) => id,
            None => self.new_conversation().await?,
        };
        self.renderer
            .reset(Some(id.clone()), self.store().list_messages(&id).len());

        let mut events = self.store().subscribe();
        let session = self.session.clone();
        let send = session.send(self.request(id.clone(), command));
        tokio::pin!(send);

        let outcome = loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => self.on_event(event)?,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Renderer skipped {} store events", skipped);
                        self.render_active()?;
                    }
                    Err(RecvError::Closed) => break (&mut send).await?,
                },
                outcome = &mut send => break outcome?,
            }
        };

        loop {
            match events.try_recv() {
                Ok(event) => self.on_event(event)?,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        self.finish(&id)?;

        if let StreamOutcome::Failed { .. } = outcome {
            std::process::exit(1);
        }
        Ok(())
    }

    async fn run_interactive(&mut self) -> anyhow::Result<()> {
        let interactive = io::stdin().is_terminal();
        if interactive && io::stderr().is_terminal() {
            eprintln!("ponder ({}) at {}", self.model, self.client.base_url());
            eprintln!("Type /help for commands.");
            eprintln!();
        }

        let mut events = self.store().subscribe();
        if let Some(id) = self.store().active() {
            self.show_conversation(&id)?;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut sends: JoinSet<SendResult> = JoinSet::new();
        let mut stdin_open = true;
        prompt(interactive)?;

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => self.on_event(event)?,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Renderer skipped {} store events", skipped);
                        self.render_active()?;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(joined) = sends.join_next() => {
                    self.on_send_finished(joined)?;
                    prompt(interactive)?;
                }
                line = lines.next_line(), if stdin_open => match line? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            prompt(interactive)?;
                            continue;
                        }
                        if !self.handle_line(line, &mut sends).await {
                            break;
                        }
                        if !self.active_is_busy() {
                            prompt(interactive)?;
                        }
                    }
                    // Piped input: let in-flight replies finish
                    None if !sends.is_empty() => stdin_open = false,
                    None => break,
                },
                else => break,
            }

            if !stdin_open && sends.is_empty() {
                break;
            }
        }

        Ok(())
    }

    /// Returns false when the user asked to exit
    async fn handle_line(&mut self, line: &str, sends: &mut JoinSet<SendResult>) -> bool {
        let result = match commands::execute_command(line, self.deep_thinking, self.web_search) {
            Some(CommandResult::Exit) => return false,
            Some(command) => self.handle_command(command).await,
            None => self.send_message(line, sends).await,
        };
        if let Err(e) = result {
            eprintln!("Error: {:#}", e);
        }
        true
    }

    async fn send_message(&mut self, text: &str, sends: &mut JoinSet<SendResult>) -> anyhow::Result<()> {
        let id = match self.store().active() {
            Some(id) => id,
            None => self.new_conversation().await?,
        };

        if self.session.is_busy(&id) {
            eprintln!("A reply is still streaming. Wait for it or /cancel it.");
            return Ok(());
        }

        let request = self.request(id.clone(), text);
        let session = self.session.clone();
        sends.spawn(async move {
            let outcome = session.send(request).await;
            (id, outcome)
        });
        Ok(())
    }

    async fn handle_command(&mut self, command: CommandResult) -> anyhow::Result<()> {
        match command {
            CommandResult::NewConversation => {
                self.new_conversation().await?;
            }
            CommandResult::ListConversations => {
                match self.client.list_conversations().await {
                    Ok(conversations) => self.store().replace_all(conversations),
                    Err(e) => tracing::warn!("Failed to refresh conversations: {}", e),
                }
                let active = self.store().active();
                println!(
                    "{}",
                    ui::format_conversation_list(&self.store().conversations(), active.as_deref())
                );
            }
            CommandResult::Switch(arg) => {
                let id = self.resolve(&arg)?;
                self.session.switch_to(&id)?;
            }
            CommandResult::Delete(arg) => {
                let id = self.resolve(&arg)?;
                self.session.cancel(&id);
                self.client.delete_conversation(&id).await?;
                self.store().remove_conversation(&id);
                println!("Deleted conversation {}", id);
            }
            CommandResult::History => match self.store().active() {
                Some(id) => self.show_conversation(&id)?,
                None => println!("No active conversation."),
            },
            CommandResult::ListModels => {
                let models = self.client.list_models().await?;
                let thinking = self.client.thinking_models().await.unwrap_or_default();
                println!(
                    "{}",
                    ModelCommand::list_models_text(&self.model, &models, &thinking)
                );
            }
            CommandResult::ChangeModel(query) => {
                let models = self.client.list_models().await?;
                match ModelCommand::find_model(&query, &models) {
                    Some(model) => {
                        println!("Switched to: {}", model);
                        self.model = model;
                    }
                    None => println!("Model not found: {}\nUse /model to list available models.", query),
                }
            }
            CommandResult::SetThinking(on) => {
                self.deep_thinking = on;
                println!("Deep thinking {}", if on { "on" } else { "off" });
            }
            CommandResult::SetWebSearch(on) => {
                self.web_search = on;
                println!("Web search {}", if on { "on" } else { "off" });
            }
            CommandResult::Cancel => {
                let stopped = self
                    .store()
                    .active()
                    .is_some_and(|id| self.session.cancel(&id));
                if !stopped {
                    println!("Nothing is streaming.");
                }
            }
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
            CommandResult::Exit => {}
        }
        Ok(())
    }

    fn resolve(&self, arg: &str) -> anyhow::Result<ConversationId> {
        commands::resolve_conversation(arg, &self.store().conversations())
            .with_context(|| format!("No conversation matches '{}' (see /list)", arg))
    }

    async fn new_conversation(&mut self) -> anyhow::Result<ConversationId> {
        let conversation = self
            .client
            .create_conversation()
            .await
            .context("Failed to create a conversation")?;
        let id = conversation.id.clone();
        self.store().upsert_conversation(conversation);
        self.session.switch_to(&id)?;
        Ok(id)
    }

    fn active_is_busy(&self) -> bool {
        self.store()
            .active()
            .is_some_and(|id| self.session.is_busy(&id))
    }

    fn on_event(&mut self, event: StoreEvent) -> io::Result<()> {
        match event {
            StoreEvent::MessagesChanged { conversation_id }
                if self.renderer.conversation() == Some(conversation_id.as_str()) =>
            {
                self.render(&conversation_id)
            }
            StoreEvent::ActiveChanged {
                conversation_id: Some(id),
            } => self.show_conversation(&id),
            StoreEvent::ActiveChanged {
                conversation_id: None,
            } => {
                self.renderer.reset(None, 0);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_send_finished(&mut self, joined: Result<SendResult, JoinError>) -> io::Result<()> {
        match joined {
            Ok((id, Ok(outcome))) => {
                tracing::debug!("Reply on {} ended: {:?}", id, outcome);
                if self.renderer.conversation() == Some(id.as_str()) {
                    self.finish(&id)?;
                }
            }
            Ok((_, Err(e))) => eprintln!("Error: {}", e),
            Err(e) => eprintln!("Error: reply task failed: {}", e),
        }
        Ok(())
    }

    fn show_conversation(&mut self, id: &str) -> io::Result<()> {
        let Some(conversation) = self.store().conversation(id) else {
            return Ok(());
        };
        let live = self.store().is_streaming(id);
        self.renderer.print_history(
            &conversation,
            live,
            &mut io::stdout().lock(),
            &mut io::stderr().lock(),
        )
    }

    fn render(&mut self, id: &str) -> io::Result<()> {
        let messages = self.store().list_messages(id);
        self.renderer
            .render(&messages, &mut io::stdout().lock(), &mut io::stderr().lock())
    }

    fn render_active(&mut self) -> io::Result<()> {
        match self.renderer.conversation().map(str::to_string) {
            Some(id) => self.render(&id),
            None => Ok(()),
        }
    }

    fn finish(&mut self, id: &str) -> io::Result<()> {
        let messages = self.store().list_messages(id);
        self.renderer
            .finish(&messages, &mut io::stdout().lock(), &mut io::stderr().lock())
    }
}

fn prompt(interactive: bool) -> io::Result<()> {
    if interactive {
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}
