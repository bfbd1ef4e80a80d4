use std::cmp;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand};
use lexiai_rs::config::{DEFAULT_GEMINI_BASE_URL, DEFAULT_MODEL, default_data_dir};
use lexiai_rs::session::LOOKUP_FAILED_MESSAGE;
use lexiai_rs::{
    ChatMessage, GeminiClient, LocalCache, MessageContent, RemoteStore, RemoteSyncConfig, Role,
    SaveOutcome, SavedWord, SearchOutcome, Session, SyncMode, TutorConfig, UploadReport,
    WordDetail, WordStore,
};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};

type AppSession = Session<RemoteStore, GeminiClient>;

#[derive(Parser, Debug)]
#[command(name = "lexiai", about = "Build a vocabulary notebook with an AI tutor", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the local cache.
    #[arg(long, global = true, env = "LEXIAI_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Gemini API key used for lookups and quizzes.
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_key: Option<String>,

    /// Gemini model name.
    #[arg(long, global = true, env = "LEXIAI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Explain a word and save it to the notebook.
    Search {
        /// Word or phrase to look up.
        word: String,
    },
    /// Look up words line by line until EOF or `:q`.
    Chat,
    /// Operations on saved words.
    #[command(subcommand)]
    Words(WordsCommand),
    /// Show the most recent chat messages.
    History {
        /// Number of messages to show.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Remote sync settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Manual sync operations.
    #[command(subcommand)]
    Sync(SyncCommand),
    /// Practice saved words with fill-in-the-blank questions.
    Quiz {
        /// Number of questions to ask.
        #[arg(short, long, default_value_t = 1)]
        rounds: usize,
    },
    /// Serve the JSON API.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
    },
}

#[derive(Subcommand, Debug)]
enum WordsCommand {
    /// List saved words, newest first.
    List,
    /// Show the full card for a saved word.
    Show {
        /// Word or id to display.
        query: String,
    },
    /// Delete a saved word by id.
    Delete {
        /// Id of the word to delete.
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the current remote settings.
    Show,
    /// Save remote settings after a connection check.
    Set {
        /// Base URL of the remote project.
        #[arg(long)]
        url: String,
        /// Anonymous API key.
        #[arg(long)]
        key: String,
        /// Owner id for saved rows.
        #[arg(long, default_value = "")]
        user: String,
        /// Upload local words once the settings are saved.
        #[arg(long)]
        upload: bool,
    },
    /// Forget the remote settings.
    Clear,
}

#[derive(Subcommand, Debug)]
enum SyncCommand {
    /// Push every local word to the remote table.
    Upload,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn Error>> {
    let session = open_session(&cli).await?;
    let as_json = cli.json;
    match cli.command {
        Command::Search { word } => handle_search(session, word, as_json).await,
        Command::Chat => handle_chat(session, as_json).await,
        Command::Words(WordsCommand::List) => handle_list(&session, as_json),
        Command::Words(WordsCommand::Show { query }) => handle_show(session, query, as_json),
        Command::Words(WordsCommand::Delete { id }) => handle_delete(session, id, as_json).await,
        Command::History { limit } => handle_history(&session, limit, as_json),
        Command::Settings(SettingsCommand::Show) => handle_settings_show(&session, as_json),
        Command::Settings(SettingsCommand::Set {
            url,
            key,
            user,
            upload,
        }) => handle_settings_set(session, url, key, user, upload, as_json).await,
        Command::Settings(SettingsCommand::Clear) => handle_settings_clear(session, as_json),
        Command::Sync(SyncCommand::Upload) => handle_upload(session, as_json).await,
        Command::Quiz { rounds } => handle_quiz(session, rounds, as_json).await,
        #[cfg(feature = "web")]
        Command::Serve { addr } => {
            let config = lexiai_rs::web::WebConfig { addr };
            Ok(lexiai_rs::web::serve(config, session).await?)
        }
    }
}

async fn open_session(cli: &Cli) -> Result<AppSession, Box<dyn Error>> {
    let cache = LocalCache::new(cli.data_dir.clone().unwrap_or_else(default_data_dir));
    let store = RemoteStore::new(RemoteSyncConfig::load(&cache))?;
    let tutor = GeminiClient::new(TutorConfig {
        api_key: cli.gemini_key.clone(),
        model: cli.model.clone(),
        base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
    })?;
    Ok(Session::start(cache, store, tutor).await)
}

async fn handle_search(
    mut session: AppSession,
    word: String,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    match session.search(&word).await {
        None => Err("Search word cannot be empty".into()),
        Some(SearchOutcome::Failed(err)) => {
            eprintln!("{LOOKUP_FAILED_MESSAGE}");
            Err(err.into())
        }
        Some(SearchOutcome::Found { detail, save }) => {
            print_lookup(&detail, &save, as_json)?;
            Ok(())
        }
    }
}

async fn handle_chat(mut session: AppSession, as_json: bool) -> Result<(), Box<dyn Error>> {
    if let Some(greeting) = session.history().last().filter(|m| m.role == Role::Assistant) {
        if !as_json {
            print_message(greeting);
        }
    }
    let stdin = io::stdin();
    loop {
        eprint!("> ");
        io::stderr().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line == ":q" {
            break;
        }
        match session.search(line).await {
            None => continue,
            Some(SearchOutcome::Found { detail, save }) => print_lookup(&detail, &save, as_json)?,
            Some(SearchOutcome::Failed(_)) => {
                if as_json {
                    println!("{}", json!({ "error": LOOKUP_FAILED_MESSAGE }));
                } else {
                    println!("{LOOKUP_FAILED_MESSAGE}");
                }
            }
        }
    }
    Ok(())
}

fn handle_list(session: &AppSession, as_json: bool) -> Result<(), Box<dyn Error>> {
    let words = session.words();
    if as_json {
        println!("{}", serde_json::to_string_pretty(words)?);
    } else {
        print_words_table(words);
    }
    Ok(())
}

fn handle_show(
    mut session: AppSession,
    query: String,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let id = session
        .lexicon()
        .get(&query)
        .or_else(|| session.lexicon().find_word(&query))
        .map(|saved| saved.id.clone())
        .ok_or_else(|| format!("No saved word matches {query:?}"))?;
    let saved = session
        .open_word(&id)
        .ok_or_else(|| format!("No saved word matches {query:?}"))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        print_card(&saved.detail);
        println!("\nId: {}", saved.id);
        println!("Saved: {}", format_saved_at(saved.saved_at));
    }
    Ok(())
}

async fn handle_delete(
    mut session: AppSession,
    id: String,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let removed = session
        .remove_word(&id)
        .await
        .ok_or_else(|| format!("No saved word with id {id:?}"))?;
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "deleted": removed }))?
        );
    } else {
        println!("Deleted \"{}\" ({})", removed.word(), removed.id);
    }
    Ok(())
}

fn handle_history(session: &AppSession, limit: usize, as_json: bool) -> Result<(), Box<dyn Error>> {
    let limit = cmp::max(1, limit);
    let history = session.history();
    let recent = &history[history.len().saturating_sub(limit)..];
    if as_json {
        println!("{}", serde_json::to_string_pretty(recent)?);
    } else {
        for message in recent {
            print_message(message);
        }
    }
    Ok(())
}

fn handle_settings_show(session: &AppSession, as_json: bool) -> Result<(), Box<dyn Error>> {
    let config = session.remote_config();
    let lexicon = session.lexicon();
    if as_json {
        let payload = json!({
            "endpoint_url": config.endpoint_url,
            "api_key": config.masked_key(),
            "user_id": config.user_id,
            "configured": config.is_configured(),
            "mode": lexicon.mode(),
            "authority": lexicon.authority(),
            "words": lexicon.len(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let endpoint = if config.endpoint_url.is_empty() {
            "<unset>"
        } else {
            config.endpoint_url.as_str()
        };
        println!("Endpoint: {endpoint}");
        println!("API key:  {}", config.masked_key());
        println!("User:     {}", config.user_id);
        println!("Mode:     {}", mode_label(lexicon.mode()));
        println!("Words:    {}", lexicon.len());
    }
    Ok(())
}

async fn handle_settings_set(
    mut session: AppSession,
    url: String,
    key: String,
    user: String,
    upload: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let candidate = RemoteStore::new(RemoteSyncConfig::new(url, key, user))?;
    if !candidate.config().is_configured() {
        return Err("Remote settings need an http(s) URL and a full API key".into());
    }
    let outcome = session.apply_settings(candidate, upload).await?;
    if as_json {
        let payload = json!({
            "saved": true,
            "mode": session.lexicon().mode(),
            "upload": outcome.upload,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Remote settings saved. Mode: {}", mode_label(session.lexicon().mode()));
        if let Some(report) = outcome.upload {
            print_upload_report(&report);
        }
    }
    Ok(())
}

fn handle_settings_clear(mut session: AppSession, as_json: bool) -> Result<(), Box<dyn Error>> {
    session.reset_settings(RemoteStore::new(RemoteSyncConfig::default())?)?;
    if as_json {
        println!("{}", json!({ "cleared": true }));
    } else {
        println!("Remote settings cleared; words stay in the local cache.");
    }
    Ok(())
}

async fn handle_upload(mut session: AppSession, as_json: bool) -> Result<(), Box<dyn Error>> {
    if !session.is_configured() {
        return Err("Remote sync is not configured; run `lexiai settings set` first".into());
    }
    let report = session.upload_local_words().await;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_upload_report(&report);
    }
    Ok(())
}

async fn handle_quiz(
    mut session: AppSession,
    rounds: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut results = Vec::new();
    for round in 1..=cmp::max(1, rounds) {
        let question = session.next_question().await?.question.clone();
        eprintln!("\nQuestion {round}: {}", question.sentence);
        for (index, option) in question.options.iter().enumerate() {
            eprintln!("  {}. {option}", index + 1);
        }
        eprint!("Your answer: ");
        io::stderr().flush()?;

        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        let choice = resolve_choice(line.trim(), &question.options);
        let correct = session.answer(&choice)?;
        if correct {
            eprintln!("Correct!");
        } else {
            eprintln!("Not quite. The answer was \"{}\".", question.correct_word);
        }
        results.push(json!({
            "sentence": question.sentence,
            "answer": choice,
            "correct_word": question.correct_word,
            "correct": correct,
        }));
    }

    let score = session.score();
    if as_json {
        let payload = json!({ "score": score, "rounds": results });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Score: {}/{}", score.correct, score.attempted);
    }
    Ok(())
}

/// Accepts either a 1-based option number or the option text.
fn resolve_choice(input: &str, options: &[String]) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| options.get(index))
        .cloned()
        .unwrap_or_else(|| input.to_string())
}

fn print_lookup(
    detail: &WordDetail,
    save: &SaveOutcome,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if as_json {
        let payload = json!({
            "word": detail,
            "saved": save.saved(),
            "storage": save_label(save),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_card(detail);
        println!("\n[{}]", save_label(save));
    }
    Ok(())
}

fn save_label(save: &SaveOutcome) -> &'static str {
    match save {
        SaveOutcome::Remote(_) => "saved to remote",
        SaveOutcome::Local(_) => "saved locally",
        SaveOutcome::Duplicate => "already saved",
    }
}

fn mode_label(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Unconfigured => "local only",
        SyncMode::Syncing => "syncing",
        SyncMode::CloudAuthoritative => "cloud authoritative",
    }
}

fn print_words_table(words: &[SavedWord]) {
    if words.is_empty() {
        println!("No saved words yet.");
        return;
    }
    let word_width = words
        .iter()
        .map(|w| w.word().len())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    let id_width = words
        .iter()
        .map(|w| w.id.len())
        .max()
        .unwrap_or(2)
        .max("ID".len());
    println!("{:<word_width$}  {:<id_width$}  {}", "WORD", "ID", "SAVED");
    println!("{:-<word_width$}  {:-<id_width$}  {}", "", "", "-----");
    for saved in words {
        println!(
            "{:<word_width$}  {:<id_width$}  {}",
            saved.word(),
            saved.id,
            format_saved_at(saved.saved_at)
        );
    }
}

fn print_upload_report(report: &UploadReport) {
    println!("Uploaded {}/{} words.", report.uploaded, report.attempted);
    if let Some(total) = report.remote_total {
        println!("Remote collection now holds {total} words.");
    }
}

fn print_message(message: &ChatMessage) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "tutor",
    };
    match &message.content {
        MessageContent::Text(text) => println!("{speaker}: {text}"),
        MessageContent::Word(detail) => {
            println!("{speaker}: [card] {}: {}", detail.word, detail.nuance)
        }
    }
}

fn print_card(detail: &WordDetail) {
    println!("{}", detail.word);
    render_markdown_block("Nuance", &detail.nuance);
    let examples = detail
        .examples
        .iter()
        .map(|example| {
            let mut line = format!("* **{}**: {}", example.category, example.sentence);
            if let Some(explanation) = example.explanation.as_deref().filter(|e| !e.is_empty()) {
                line.push_str(&format!("\n  *{explanation}*"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");
    render_markdown_block("Examples", &examples);
}

fn format_saved_at(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
