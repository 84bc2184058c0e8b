//! Console front end: pick a scenario, supply a prompt, watch the agents talk.

use clap::Parser;
use conclave::backend::HttpClientFactory;
use conclave::config::ConclaveConfig;
use conclave::event::LoggingEventHandler;
use conclave::ScenarioRegistry;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MAX_ATTEMPTS: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(version, about = "Run a multi-agent conversation scenario")]
#[command(long_about = r#"
Runs one of the scenarios defined in the configuration file. Missing choices are asked for
interactively.

The configuration is read from /config/appsettings.json when that file exists, otherwise from
--config. API keys may also come from OPENAI_API_KEY, AZURE_OPENAI_API_KEY, GEMINI_API_KEY and
friends.

Example:
  conclave --scenario Review --prompt "Write a slogan for a bakery"
  conclave --config team.json --scenario Review --prompt-file brief.md
"#)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, value_name = "PATH", default_value = "appsettings.json")]
    config: PathBuf,

    /// Scenario to run
    #[arg(short, long, value_name = "NAME")]
    scenario: Option<String>,

    /// Prompt text
    #[arg(short, long, conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Markdown (.md) file holding the prompt
    #[arg(long, value_name = "PATH")]
    prompt_file: Option<PathBuf>,

    /// List the available scenarios and exit
    #[arg(long)]
    list: bool,
}

fn read_line(question: &str) -> Option<String> {
    println!("{}", question);
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn read_prompt_file(path: &Path) -> Result<String, String> {
    let is_markdown = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("md"));
    if !is_markdown {
        return Err(format!("'{}' is not a .md file", path.display()));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    if text.trim().is_empty() {
        return Err(format!("'{}' is empty", path.display()));
    }
    Ok(text)
}

fn choose_scenario(scenarios: &[String]) -> Option<String> {
    println!("The following scenarios are available:");
    for (i, name) in scenarios.iter().enumerate() {
        println!("\t{}. {}", i + 1, name);
    }
    for attempts_left in (1..=MAX_ATTEMPTS).rev() {
        let input = read_line(&format!(
            "Please enter your choice. (Attempts left: {}):",
            attempts_left
        ))?;
        if let Ok(n) = input.parse::<usize>() {
            if (1..=scenarios.len()).contains(&n) {
                return Some(scenarios[n - 1].clone());
            }
        }
        if let Some(name) = scenarios.iter().find(|s| s.eq_ignore_ascii_case(&input)) {
            return Some(name.clone());
        }
        println!("'{}' is not a valid choice.", input);
    }
    None
}

fn choose_prompt() -> Option<String> {
    println!("How would you like to provide your prompt?");
    println!("\t1. Enter prompt via command line");
    println!("\t2. Provide a path to a markdown file");
    for attempts_left in (1..=MAX_ATTEMPTS).rev() {
        let option = read_line(&format!(
            "Please enter your choice. (Attempts left: {})",
            attempts_left
        ))?;
        match option.as_str() {
            "1" => {
                let prompt = read_line("Please enter your prompt:")?;
                if !prompt.is_empty() {
                    return Some(prompt);
                }
                println!("The prompt must not be empty.");
            }
            "2" => {
                let path = read_line("Please enter the full path to the markdown (.md) file:")?;
                match read_prompt_file(Path::new(&path)) {
                    Ok(text) => return Some(text),
                    Err(e) => println!("{}", e),
                }
            }
            other => println!("'{}' is not a valid choice.", other),
        }
    }
    None
}

#[tokio::main]
async fn main() -> ExitCode {
    conclave::init_logger();
    let cli = Cli::parse();

    let config = match ConclaveConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let clients = HttpClientFactory::new(config.backends.clone());
    let scenarios = match ScenarioRegistry::from_config(&config, &clients) {
        Ok(scenarios) => scenarios.with_event_handler(Arc::new(LoggingEventHandler)),
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let available = scenarios.list_scenarios();
    if cli.list {
        for name in &available {
            println!("{}", name);
        }
        return ExitCode::SUCCESS;
    }
    if available.is_empty() {
        log::warn!("No scenarios are enabled. Exiting.");
        return ExitCode::FAILURE;
    }

    let scenario = match cli.scenario {
        Some(name) if scenarios.contains(&name) => name,
        Some(name) => {
            log::warn!("Unknown scenario '{}'.", name);
            return ExitCode::FAILURE;
        }
        None => match choose_scenario(&available) {
            Some(name) => name,
            None => {
                log::warn!("No valid selection after {} attempts. Exiting.", MAX_ATTEMPTS);
                return ExitCode::FAILURE;
            }
        },
    };

    let prompt = match (cli.prompt, cli.prompt_file) {
        (Some(prompt), _) if !prompt.trim().is_empty() => prompt,
        (Some(_), _) => {
            log::warn!("The prompt must not be empty.");
            return ExitCode::FAILURE;
        }
        (None, Some(path)) => match read_prompt_file(&path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        (None, None) => match choose_prompt() {
            Some(prompt) => prompt,
            None => {
                log::warn!("No valid prompt provided after {} attempts. Exiting.", MAX_ATTEMPTS);
                return ExitCode::FAILURE;
            }
        },
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling the conversation");
            on_ctrl_c.cancel();
        }
    });

    match scenarios
        .execute_with_cancellation(&scenario, &prompt, &cancel)
        .await
    {
        Ok(transcript) => {
            for message in transcript.new_messages() {
                println!("[{}] {}\n", message.speaker, message.content);
            }
            println!(
                "{} after {} iteration(s).",
                if transcript.is_complete() {
                    "Finished"
                } else {
                    "Stopped at the iteration limit"
                },
                transcript.iterations
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
