//! services/client/src/cli.rs
//!
//! The terminal front-end: parses REPL lines into commands and runs them
//! against the `App`, playing the part of the sidebar, chat and admin panel.

use docchat_core::domain::{NewUser, Role};
use docchat_core::ports::PortError;
use std::path::PathBuf;
use tracing::debug;

use crate::app::admin::AdminError;
use crate::app::chat::{SendError, SendOutcome};
use crate::app::conversation_list::MountedList;
use crate::app::guard::View;
use crate::app::session::LoginError;
use crate::app::App;

pub const HELP: &str = "\
Session:   login <user> <pass> | logout | whoami | go chat|admin|login
Chat:      convs | new [title] | open <id> | delete <id> | say <text> | history
Admin:     datasets | upload <path> | rm-dataset <id>
           users | adduser <user> <pass> [admin] | enable <id> | disable <id> | rm-user <id>
Quick ask: ask <question> | upload-pdf <path>
Other:     help | quit";

const SESSION_EXPIRED: &str = "Your session has expired, please log in again.";

//=========================================================================================
// Parsing
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Logout,
    WhoAmI,
    Go(View),
    Conversations,
    New(Option<String>),
    Open(i64),
    Delete(i64),
    Say(String),
    History,
    Datasets,
    Upload(PathBuf),
    RemoveDataset(i64),
    Users,
    AddUser {
        username: String,
        password: String,
        is_admin: bool,
    },
    SetActive { user_id: i64, active: bool },
    RemoveUser(i64),
    Ask(String),
    UploadPdf(Option<PathBuf>),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command '{0}', type 'help' for the list")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

fn parse_id(raw: Option<&str>, usage: &'static str) -> Result<i64, ParseError> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .ok_or(ParseError::Usage(usage))
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    let Some(word) = line.split_whitespace().next() else {
        return Ok(None);
    };
    // Free text after the command word, inner spacing preserved.
    let rest = line[word.len()..].trim();
    let mut args = rest.split_whitespace();

    let command = match word.to_ascii_lowercase().as_str() {
        "login" => match (args.next(), args.next()) {
            (Some(username), Some(password)) => Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            },
            _ => return Err(ParseError::Usage("login <user> <pass>")),
        },
        "logout" => Command::Logout,
        "whoami" => Command::WhoAmI,
        "go" => {
            let view = args
                .next()
                .and_then(View::from_path)
                .ok_or(ParseError::Usage("go chat|admin|login"))?;
            Command::Go(view)
        }
        "convs" => Command::Conversations,
        "new" => Command::New((!rest.is_empty()).then(|| rest.to_string())),
        "open" => Command::Open(parse_id(args.next(), "open <id>")?),
        "delete" => Command::Delete(parse_id(args.next(), "delete <id>")?),
        "say" if !rest.is_empty() => Command::Say(rest.to_string()),
        "say" => return Err(ParseError::Usage("say <text>")),
        "history" => Command::History,
        "datasets" => Command::Datasets,
        "upload" if !rest.is_empty() => Command::Upload(PathBuf::from(rest)),
        "upload" => return Err(ParseError::Usage("upload <path>")),
        "rm-dataset" => Command::RemoveDataset(parse_id(args.next(), "rm-dataset <id>")?),
        "users" => Command::Users,
        "adduser" => match (args.next(), args.next(), args.next()) {
            (Some(username), Some(password), flag) => Command::AddUser {
                username: username.to_string(),
                password: password.to_string(),
                is_admin: flag.is_some_and(|f| f.eq_ignore_ascii_case("admin")),
            },
            _ => return Err(ParseError::Usage("adduser <user> <pass> [admin]")),
        },
        "enable" => Command::SetActive {
            user_id: parse_id(args.next(), "enable <id>")?,
            active: true,
        },
        "disable" => Command::SetActive {
            user_id: parse_id(args.next(), "disable <id>")?,
            active: false,
        },
        "rm-user" => Command::RemoveUser(parse_id(args.next(), "rm-user <id>")?),
        "ask" if !rest.is_empty() => Command::Ask(rest.to_string()),
        "ask" => return Err(ParseError::Usage("ask <question>")),
        "upload-pdf" => Command::UploadPdf((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

//=========================================================================================
// Execution
//=========================================================================================

/// What a command printed, and whether the REPL should stop.
#[derive(Debug, Default)]
pub struct Output {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Output {
    fn line(text: impl Into<String>) -> Self {
        Self {
            lines: vec![text.into()],
            quit: false,
        }
    }

    fn push(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }
}

/// Drives the `App` from parsed commands. The conversation list is mounted
/// while the chat view is shown and unmounted when it is left.
pub struct Repl {
    app: App,
    sidebar: Option<MountedList>,
}

impl Repl {
    pub fn new(app: App) -> Self {
        Self { app, sidebar: None }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn is_sidebar_mounted(&self) -> bool {
        self.sidebar.is_some()
    }

    pub fn prompt(&self) -> String {
        match self.app.session.user() {
            Some(user) => format!("{}@{}> ", user.username, self.app.navigator.current().path()),
            None => format!("{}> ", self.app.navigator.current().path()),
        }
    }

    /// Mounts or unmounts the regions that belong to the current view.
    pub async fn sync_view(&mut self) {
        let in_chat = self.app.navigator.current() == View::Chat;
        match (in_chat, self.sidebar.is_some()) {
            (true, false) => {
                debug!("Mounting conversation list");
                self.sidebar = Some(self.app.conversations.mount());
                if let Err(e) = self.app.chat.resume().await {
                    debug!(error = %e, "Could not resume the active conversation");
                }
            }
            (false, true) => {
                if let Some(sidebar) = self.sidebar.take() {
                    sidebar.unmount().await;
                }
            }
            _ => {}
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(sidebar) = self.sidebar.take() {
            sidebar.unmount().await;
        }
    }

    /// Handles one line as typed at the prompt. Blank lines produce no
    /// output; parse errors are reported instead of executed.
    pub async fn handle_line(&mut self, line: &str) -> Output {
        match parse(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Output::default(),
            Err(e) => Output::line(e.to_string()),
        }
    }

    pub async fn execute(&mut self, command: Command) -> Output {
        let output = self.dispatch(command).await;
        self.sync_view().await;
        output
    }

    fn require(&self, view: View) -> Option<Output> {
        let current = self.app.navigator.current();
        if current == view {
            return None;
        }
        let hint = match view {
            View::Chat => "go chat",
            View::Admin => "go admin",
            View::Login => "go login",
        };
        Some(Output::line(format!(
            "Not available in {}, switch with '{}'.",
            current.path(),
            hint
        )))
    }

    fn port_failure(&self, error: &PortError) -> Output {
        if error.is_unauthorized() {
            Output::line(SESSION_EXPIRED)
        } else {
            Output::line(format!("Error: {}", error))
        }
    }

    fn admin_failure(&self, error: &AdminError) -> Output {
        match error {
            AdminError::Backend(e) => self.port_failure(e),
            other => Output::line(format!("Error: {}", other)),
        }
    }

    async fn dispatch(&mut self, command: Command) -> Output {
        let app = self.app.clone();
        match command {
            Command::Help => Output::line(HELP),
            Command::Quit => Output {
                lines: Vec::new(),
                quit: true,
            },

            // --- Session ---
            Command::Login { username, password } => {
                match app.session.login(&username, &password).await {
                    Ok(user) => {
                        let view = app.go(View::DEFAULT_AUTHENTICATED);
                        Output::line(format!("Welcome, {}. Now in {}.", user.username, view.path()))
                    }
                    Err(LoginError::Backend(e)) => self.port_failure(&e),
                    Err(e) => Output::line(e.to_string()),
                }
            }
            Command::Logout => {
                app.session.logout();
                Output::line("Logged out.")
            }
            Command::WhoAmI => match app.session.user() {
                Some(user) => Output::line(format!(
                    "{} (id {}){}",
                    user.username,
                    user.id,
                    if user.is_admin { ", admin" } else { "" }
                )),
                None => Output::line("Not logged in."),
            },
            Command::Go(view) => {
                let shown = app.go(view);
                if shown == view {
                    Output::line(format!("Now in {}.", shown.path()))
                } else if app.navigator.pending() == Some(view) {
                    Output::line(format!("Waiting for the session before opening {}.", view.path()))
                } else {
                    Output::line(format!("{} is not available, now in {}.", view.path(), shown.path()))
                }
            }

            // --- Chat ---
            Command::Conversations => {
                if let Some(denied) = self.require(View::Chat) {
                    return denied;
                }
                match app.conversations.refresh().await {
                    Ok(list) if list.is_empty() => Output::line("No conversations yet."),
                    Ok(list) => {
                        let active = app.active_conversation.get();
                        let mut out = Output::default();
                        for conversation in list {
                            let marker = if active == Some(conversation.id) { '*' } else { ' ' };
                            out.push(format!("{} {:>4}  {}", marker, conversation.id, conversation.title));
                        }
                        out
                    }
                    Err(e) => self.port_failure(&e),
                }
            }
            Command::New(title) => {
                if let Some(denied) = self.require(View::Chat) {
                    return denied;
                }
                match app.chat.start_new(title.as_deref()).await {
                    Ok(id) => Output::line(format!("Started conversation {}.", id)),
                    Err(e) => self.port_failure(&e),
                }
            }
            Command::Open(id) => {
                if let Some(denied) = self.require(View::Chat) {
                    return denied;
                }
                match app.chat.open(id).await {
                    Ok(()) => self.transcript(),
                    Err(e) => self.port_failure(&e),
                }
            }
            Command::Delete(id) => {
                if let Some(denied) = self.require(View::Chat) {
                    return denied;
                }
                match app.chat.delete_conversation(id).await {
                    Ok(()) => Output::line(format!("Deleted conversation {}.", id)),
                    Err(e) => self.port_failure(&e),
                }
            }
            Command::Say(text) => {
                if let Some(denied) = self.require(View::Chat) {
                    return denied;
                }
                match app.chat.send(&text).await {
                    Ok(SendOutcome::Ignored) => Output::default(),
                    Ok(_) => {
                        let mut out = Output::default();
                        if let Some(reply) = app.chat.messages_by(Role::Assistant).pop() {
                            out.push(format!("bot: {}", reply.content));
                            if !reply.sources.is_empty() {
                                out.push(format!("     sources: {}", reply.sources.join(", ")));
                            }
                        }
                        out
                    }
                    Err(SendError::SessionEnded) => Output::line(SESSION_EXPIRED),
                    Err(e) => Output::line(e.to_string()),
                }
            }
            Command::History => {
                if let Some(denied) = self.require(View::Chat) {
                    return denied;
                }
                self.transcript()
            }

            // --- Admin ---
            Command::Datasets => {
                if let Some(denied) = self.require(View::Admin) {
                    return denied;
                }
                match app.datasets.refresh().await {
                    Ok(list) if list.is_empty() => Output::line("No datasets uploaded."),
                    Ok(list) => {
                        let mut out = Output::default();
                        for dataset in list {
                            let uploaded = dataset
                                .uploaded_at
                                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                                .unwrap_or_default();
                            out.push(format!("{:>4}  {}  {}", dataset.id, dataset.name, uploaded));
                        }
                        out
                    }
                    Err(e) => self.admin_failure(&e),
                }
            }
            Command::Upload(path) => {
                if let Some(denied) = self.require(View::Admin) {
                    return denied;
                }
                match app.datasets.upload_path(&path).await {
                    Ok(()) => Output::line(format!("Uploaded {}.", path.display())),
                    Err(e) => self.admin_failure(&e),
                }
            }
            Command::RemoveDataset(id) => {
                if let Some(denied) = self.require(View::Admin) {
                    return denied;
                }
                match app.datasets.delete(id).await {
                    Ok(()) => Output::line(format!("Deleted dataset {}.", id)),
                    Err(e) => self.admin_failure(&e),
                }
            }
            Command::Users => {
                if let Some(denied) = self.require(View::Admin) {
                    return denied;
                }
                match app.users.refresh().await {
                    Ok(list) => {
                        let mut out = Output::default();
                        for user in list {
                            out.push(format!(
                                "{:>4}  {:<16} {:<6} {}",
                                user.id,
                                user.username,
                                if user.is_admin { "admin" } else { "user" },
                                if user.active { "active" } else { "disabled" }
                            ));
                        }
                        out
                    }
                    Err(e) => self.admin_failure(&e),
                }
            }
            Command::AddUser {
                username,
                password,
                is_admin,
            } => {
                if let Some(denied) = self.require(View::Admin) {
                    return denied;
                }
                let new_user = NewUser {
                    username,
                    password,
                    name: None,
                    is_admin,
                };
                match app.users.create(new_user).await {
                    Ok(user) => Output::line(format!("Created user {} (id {}).", user.username, user.id)),
                    Err(e) => self.admin_failure(&e),
                }
            }
            Command::SetActive { user_id, active } => {
                if let Some(denied) = self.require(View::Admin) {
                    return denied;
                }
                match app.users.set_active(user_id, active).await {
                    Ok(()) => Output::line(format!(
                        "User {} {}.",
                        user_id,
                        if active { "enabled" } else { "disabled" }
                    )),
                    Err(e) => self.admin_failure(&e),
                }
            }
            Command::RemoveUser(id) => {
                if let Some(denied) = self.require(View::Admin) {
                    return denied;
                }
                match app.users.delete(id).await {
                    Ok(()) => Output::line(format!("Deleted user {}.", id)),
                    Err(e) => self.admin_failure(&e),
                }
            }

            // --- Quick ask ---
            Command::Ask(question) => match app.quick_ask.ask(&question).await {
                Some(answer) => Output::line(answer),
                None => Output::line("Still busy with the previous question."),
            },
            Command::UploadPdf(path) => {
                Output::line(app.quick_ask.upload_pdf_path(path.as_deref()).await)
            }
        }
    }

    fn transcript(&self) -> Output {
        let messages = self.app.chat.messages();
        if messages.is_empty() {
            return Output::line("(empty conversation)");
        }
        let mut out = Output::default();
        for message in messages {
            let who = match message.role {
                Role::User => "you",
                Role::Assistant => "bot",
            };
            out.push(format!("{}: {}", who, message.content));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryStore;
    use crate::app::testing::{signed_in_app, FakeBackend};
    use docchat_core::ports::KeyValueStore;
    use std::sync::Arc;

    #[test]
    fn parses_commands_with_free_text() {
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(
            parse("say  how do I  reset it? ").unwrap(),
            Some(Command::Say("how do I  reset it?".to_string()))
        );
        assert_eq!(parse("new").unwrap(), Some(Command::New(None)));
        assert_eq!(
            parse("new Wifi setup").unwrap(),
            Some(Command::New(Some("Wifi setup".to_string())))
        );
        assert_eq!(parse("GO admin").unwrap(), Some(Command::Go(View::Admin)));
        assert_eq!(
            parse("adduser ana pw admin").unwrap(),
            Some(Command::AddUser {
                username: "ana".to_string(),
                password: "pw".to_string(),
                is_admin: true,
            })
        );
        assert_eq!(
            parse("disable 4").unwrap(),
            Some(Command::SetActive {
                user_id: 4,
                active: false
            })
        );
        assert_eq!(parse("upload-pdf").unwrap(), Some(Command::UploadPdf(None)));
    }

    #[test]
    fn reports_usage_and_unknown_commands() {
        assert_eq!(parse("open x"), Err(ParseError::Usage("open <id>")));
        assert_eq!(parse("login ana"), Err(ParseError::Usage("login <user> <pass>")));
        assert_eq!(parse("say"), Err(ParseError::Usage("say <text>")));
        assert_eq!(parse("dance"), Err(ParseError::Unknown("dance".to_string())));
    }

    #[tokio::test]
    async fn typed_lines_are_parsed_before_running() {
        let (backend, app) = signed_in_app(false).await;
        let mut repl = Repl::new(app);
        let before = backend.calls().len();

        let blank = repl.handle_line("   ").await;
        assert!(blank.lines.is_empty());
        assert!(!blank.quit);

        let unknown = repl.handle_line("dance").await;
        assert_eq!(unknown.lines, vec![ParseError::Unknown("dance".to_string()).to_string()]);
        assert!(!unknown.quit);

        let usage = repl.handle_line("open x").await;
        assert_eq!(usage.lines, vec![ParseError::Usage("open <id>").to_string()]);
        assert_eq!(backend.calls().len(), before);

        assert!(repl.handle_line("exit").await.quit);
        assert!(repl.handle_line("quit").await.quit);
        repl.shutdown().await;
    }

    #[tokio::test]
    async fn login_mounts_the_sidebar_and_logout_unmounts_it() {
        let backend = Arc::new(FakeBackend::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let mut repl = Repl::new(App::new(backend.clone(), store));
        repl.app().start(View::Chat).await;
        repl.sync_view().await;
        assert_eq!(repl.app().navigator.current(), View::Login);
        assert!(!repl.is_sidebar_mounted());

        let out = repl.execute(parse("login tester pw").unwrap().unwrap()).await;
        assert_eq!(out.lines, vec!["Welcome, tester. Now in /chat.".to_string()]);
        assert!(repl.is_sidebar_mounted());
        assert_eq!(repl.app().signal.listener_count(), 1);

        repl.execute(Command::Logout).await;
        assert!(!repl.is_sidebar_mounted());
        assert_eq!(repl.app().signal.listener_count(), 0);
    }

    #[tokio::test]
    async fn chat_commands_drive_the_send_workflow() {
        let (backend, app) = signed_in_app(false).await;
        backend.set_answer("Use the reset button.", &["manual.pdf"]);
        let mut repl = Repl::new(app);
        repl.sync_view().await;

        let out = repl.execute(Command::Say("how do I reset?".to_string())).await;
        assert_eq!(
            out.lines,
            vec![
                "bot: Use the reset button.".to_string(),
                "     sources: manual.pdf".to_string(),
            ]
        );

        let out = repl.execute(Command::Conversations).await;
        assert_eq!(out.lines, vec!["*    1  how do I reset?".to_string()]);

        let out = repl.execute(Command::History).await;
        assert_eq!(
            out.lines,
            vec![
                "you: how do I reset?".to_string(),
                "bot: Use the reset button.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn commands_are_limited_to_their_view() {
        let (backend, app) = signed_in_app(false).await;
        let mut repl = Repl::new(app);

        let out = repl.execute(Command::Users).await;
        assert_eq!(out.lines, vec!["Not available in /chat, switch with 'go admin'.".to_string()]);
        assert_eq!(backend.count("list_users"), 0);

        let out = repl.execute(Command::Go(View::Admin)).await;
        assert_eq!(out.lines, vec!["/admin is not available, now in /chat.".to_string()]);
    }

    #[tokio::test]
    async fn expired_session_is_reported_once() {
        let (backend, app) = signed_in_app(true).await;
        let mut repl = Repl::new(app);
        backend.fail_next("list_datasets", PortError::Unauthorized);

        let out = repl.execute(Command::Datasets).await;

        assert_eq!(out.lines, vec![SESSION_EXPIRED.to_string()]);
        assert_eq!(repl.app().navigator.current(), View::Login);
    }
}
