//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use tracing::info;
use url::Url;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    pub non_interactive: bool,
    pub yes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitAction {
    Abort,
    Overwrite,
    Merge,
}

/// Initialize kbctl configuration
pub fn cmd_init(options: InitOptions) -> Result<()> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        non_interactive,
        yes,
    } = options;

    let is_tty = io::stdin().is_terminal();
    let interactive = resolve_interactive(is_tty, non_interactive)?;
    let auto_accept = yes || non_interactive;

    let config_exists = config_path.exists();
    let action = if config_exists {
        if force {
            InitAction::Overwrite
        } else if !interactive {
            return Err(Error::Config(format!(
                "Config already exists at {}. Use --force or run interactively.",
                config_path.display()
            )));
        } else {
            prompt_init_action(auto_accept)?
        }
    } else {
        InitAction::Overwrite
    };

    if action == InitAction::Abort {
        println!("Initialization aborted.");
        return Ok(());
    }

    let mut config = match action {
        InitAction::Merge => Config::load(&config_path)?,
        InitAction::Overwrite => Config::default(),
        InitAction::Abort => unreachable!(),
    };

    config.paths.base_dir = base_dir.clone();
    config.paths.config_file = config_path.clone();
    config.paths.sessions_dir = base_dir.join("sessions");

    if interactive && !auto_accept {
        run_init_wizard(&mut config)?;
    }

    config.validate()?;

    let rendered = toml::to_string_pretty(&config)?;

    if interactive && !auto_accept {
        println!("\nConfiguration preview:\n");
        println!("{}", rendered);
        let confirm = prompt_confirm("Write this configuration?", true, auto_accept)?;
        if !confirm {
            println!("Initialization aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, rendered)?;
    info!("Created config at {:?}", config_path);

    std::fs::create_dir_all(&config.paths.sessions_dir)?;
    info!("Created sessions directory at {:?}", config.paths.sessions_dir);

    println!("✓ Initialized kbctl at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("\nNext steps:");
    println!("  kbctl status                      # Check the backend connection");
    println!("  kbctl knowledge list              # Browse stored documents");
    println!("  kbctl query \"how do I ...\"        # Ask the knowledge base");

    Ok(())
}

fn resolve_interactive(is_tty: bool, non_interactive: bool) -> Result<bool> {
    if !is_tty && !non_interactive {
        return Err(Error::Config(
            "stdin is not a TTY. Use --non-interactive to write defaults.".to_string(),
        ));
    }
    Ok(is_tty && !non_interactive)
}

fn prompt_init_action(auto_accept: bool) -> Result<InitAction> {
    if auto_accept {
        return Ok(InitAction::Overwrite);
    }

    let options = ["Abort", "Overwrite", "Merge/update interactively"];
    let selection = prompt_select("Config exists. Choose an action:", &options, 0, auto_accept)?;
    Ok(match selection {
        0 => InitAction::Abort,
        1 => InitAction::Overwrite,
        _ => InitAction::Merge,
    })
}

fn run_init_wizard(config: &mut Config) -> Result<()> {
    println!("\nWelcome to the kbctl setup wizard.\n");

    // Backend endpoints
    config.api_base_url = prompt_string(
        "API base URL (include the /api prefix)",
        &config.api_base_url,
        |value| Url::parse(value).map(|_| ()).map_err(|_| "Invalid URL".to_string()),
        false,
    )?;

    config.media_base_url = prompt_string(
        "Media base URL",
        &config.media_base_url,
        |value| Url::parse(value).map(|_| ()).map_err(|_| "Invalid URL".to_string()),
        false,
    )?;

    // Console behavior
    config.console.page_size = prompt_u32(
        "Documents per listing page",
        config.console.page_size,
        |value| {
            if value == 0 {
                Err("Page size must be at least 1".to_string())
            } else {
                Ok(())
            }
        },
        false,
    )?;

    config.poll.interval_secs = prompt_u64(
        "Seconds between status polls",
        config.poll.interval_secs,
        |value| {
            if value == 0 {
                Err("Interval must be at least 1 second".to_string())
            } else {
                Ok(())
            }
        },
        false,
    )?;

    // Query defaults
    let model_options = ["cloud", "local"];
    let model_default = if config.query.model == "local" { 1 } else { 0 };
    let model_index = prompt_select(
        "Default query model:",
        &model_options,
        model_default,
        false,
    )?;
    config.query.model = model_options[model_index].to_string();

    config.query.use_retrieval = prompt_confirm(
        "Use corpus retrieval for queries?",
        config.query.use_retrieval,
        false,
    )?;

    // Upload defaults
    config.console.departments = prompt_string_list(
        "Departments offered at upload (comma separated)",
        &config.console.departments,
        false,
    )?;

    config.console.default_author = prompt_i64(
        "Default author id for uploads",
        config.console.default_author,
        |value| {
            if value <= 0 {
                Err("Author id must be positive".to_string())
            } else {
                Ok(())
            }
        },
        false,
    )?;

    // Voice input
    config.voice.command = prompt_string(
        "Voice transcriber command (empty disables --voice)",
        &config.voice.command,
        |_| Ok(()),
        false,
    )?;

    Ok(())
}

fn prompt_confirm(label: &str, default: bool, auto_accept: bool) -> Result<bool> {
    if auto_accept {
        return Ok(default);
    }
    let options = ["Yes", "No"];
    let default_index = if default { 0 } else { 1 };
    let selection = prompt_select(label, &options, default_index, auto_accept)?;
    Ok(selection == 0)
}

fn prompt_select(label: &str, options: &[impl AsRef<str>], default_index: usize, auto_accept: bool) -> Result<usize> {
    if auto_accept {
        return Ok(default_index.min(options.len().saturating_sub(1)));
    }

    let mut stdout = io::stdout();
    let mut selected = default_index.min(options.len().saturating_sub(1));
    let _raw_mode = RawModeGuard::new()?;

    loop {
        execute!(
            stdout,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        writeln!(stdout, "{}", label)?;
        for (idx, option) in options.iter().enumerate() {
            if idx == selected {
                writeln!(stdout, "> {}", option.as_ref())?;
            } else {
                writeln!(stdout, "  {}", option.as_ref())?;
            }
        }
        stdout.flush()?;

        match event::read()? {
            Event::Key(key) => match key.code {
                KeyCode::Up => {
                    if selected > 0 {
                        selected -= 1;
                    }
                }
                KeyCode::Down => {
                    if selected + 1 < options.len() {
                        selected += 1;
                    }
                }
                KeyCode::Enter => {
                    execute!(
                        stdout,
                        terminal::Clear(terminal::ClearType::FromCursorDown),
                        cursor::MoveToColumn(0)
                    )?;
                    return Ok(selected);
                }
                _ => {}
            },
            _ => {}
        }
    }
}

fn prompt_string<F>(label: &str, default: &str, validate: F, auto_accept: bool) -> Result<String>
where
    F: Fn(&str) -> std::result::Result<(), String>,
{
    if auto_accept {
        return Ok(default.to_string());
    }

    loop {
        print!("{} [{}]: ", label, default);
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let value = input.trim();
        let value = if value.is_empty() { default } else { value };

        if let Err(message) = validate(value) {
            println!("{}", message);
            continue;
        }
        return Ok(value.to_string());
    }
}

fn prompt_u32<F>(label: &str, default: u32, validate: F, auto_accept: bool) -> Result<u32>
where
    F: Fn(u32) -> std::result::Result<(), String>,
{
    if auto_accept {
        return Ok(default);
    }
    loop {
        let value = prompt_string(label, &default.to_string(), |_| Ok(()), false)?;
        match value.parse::<u32>() {
            Ok(parsed) => {
                if let Err(message) = validate(parsed) {
                    println!("{}", message);
                    continue;
                }
                return Ok(parsed);
            }
            Err(_) => println!("Enter a valid number."),
        }
    }
}

fn prompt_u64<F>(label: &str, default: u64, validate: F, auto_accept: bool) -> Result<u64>
where
    F: Fn(u64) -> std::result::Result<(), String>,
{
    if auto_accept {
        return Ok(default);
    }
    loop {
        let value = prompt_string(label, &default.to_string(), |_| Ok(()), false)?;
        match value.parse::<u64>() {
            Ok(parsed) => {
                if let Err(message) = validate(parsed) {
                    println!("{}", message);
                    continue;
                }
                return Ok(parsed);
            }
            Err(_) => println!("Enter a valid number."),
        }
    }
}

fn prompt_i64<F>(label: &str, default: i64, validate: F, auto_accept: bool) -> Result<i64>
where
    F: Fn(i64) -> std::result::Result<(), String>,
{
    if auto_accept {
        return Ok(default);
    }
    loop {
        let value = prompt_string(label, &default.to_string(), |_| Ok(()), false)?;
        match value.parse::<i64>() {
            Ok(parsed) => {
                if let Err(message) = validate(parsed) {
                    println!("{}", message);
                    continue;
                }
                return Ok(parsed);
            }
            Err(_) => println!("Enter a valid number."),
        }
    }
}

fn prompt_string_list(label: &str, default: &[String], auto_accept: bool) -> Result<Vec<String>> {
    let default_value = if default.is_empty() {
        "".to_string()
    } else {
        default.join(",")
    };
    let value = prompt_string(label, &default_value, |_| Ok(()), auto_accept)?;
    let items = value
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect::<Vec<_>>();
    Ok(items)
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_interactive_requires_tty() {
        let result = resolve_interactive(false, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_interactive_non_interactive_ok() {
        let result = resolve_interactive(false, true).unwrap();
        assert!(!result);
    }

    #[test]
    fn test_non_interactive_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        cmd_init(InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: config_path.clone(),
            force: false,
            non_interactive: true,
            yes: false,
        })
        .unwrap();

        assert!(config_path.exists());
        assert!(tmp.path().join("sessions").is_dir());

        let written = Config::load(&config_path).unwrap();
        assert_eq!(written.api_base_url, Config::default().api_base_url);
        assert_eq!(written.console.page_size, 5);
    }

    #[test]
    fn test_non_interactive_refuses_to_clobber() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "api_base_url = \"http://other:1234/api\"\n").unwrap();

        let err = cmd_init(InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: config_path.clone(),
            force: false,
            non_interactive: true,
            yes: false,
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // --force overwrites
        cmd_init(InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: config_path.clone(),
            force: true,
            non_interactive: true,
            yes: false,
        })
        .unwrap();
        let written = Config::load(&config_path).unwrap();
        assert_eq!(written.api_base_url, Config::default().api_base_url);
    }
}
