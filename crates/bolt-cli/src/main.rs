mod logging;
mod render;

use std::env;
use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use bolt_core::config::Config;
use bolt_core::persistence::load_last_prompt;
use bolt_core::persistence::FilePersistence;
use bolt_core::response::parse;
use bolt_core::SessionState;
use bolt_core::UserAction;
use bolt_core::WorkspaceStore;
use bolt_exec::CommandGenerationService;
use bolt_exec::DirectoryPreview;
use bolt_exec::GenerationService;
use bolt_exec::ReplayGenerationService;
use bolt_exec::SessionDriver;

use crate::render::StatusReport;

const CONFIG_FILE: &str = "bolt.toml";
const PERSISTENCE_DIR: &str = "workspace";
const PREVIEW_DIR: &str = "preview";

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct GlobalArgs {
    config: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    preview_dir: Option<PathBuf>,
}

struct Environment {
    config: Config,
    state_dir: PathBuf,
    preview_dir: PathBuf,
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (globals, args) = split_global_args(env::args().skip(1).collect())?;
    let Some((command, rest)) = args.split_first() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            return Ok(());
        }
        "--version" | "-V" | "version" => {
            println!("bolt {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let env = Environment::load(&globals)?;
    logging::init(&env.config.log.level);

    match command.as_str() {
        "generate" => cmd_generate(&env, rest),
        "parse" => cmd_parse(rest),
        "edit" => cmd_edit(&env, rest),
        "rm" => cmd_rm(&env, rest),
        "cat" => cmd_cat(&env, rest),
        "ls" => cmd_ls(&env),
        "tree" => cmd_tree(&env, rest),
        "sync" => cmd_sync(&env),
        "status" => cmd_status(&env, rest),
        "reset" => cmd_reset(&env),
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

fn split_global_args(
    args: Vec<String>,
) -> Result<(GlobalArgs, Vec<String>), Box<dyn std::error::Error>> {
    let mut globals = GlobalArgs::default();
    let mut i = 0;
    while i < args.len() {
        let slot = match args[i].as_str() {
            "--config" => &mut globals.config,
            "--state-dir" => &mut globals.state_dir,
            "--preview-dir" => &mut globals.preview_dir,
            _ => break,
        };
        let Some(value) = args.get(i + 1) else {
            return Err(format!("{} requires a path", args[i]).into());
        };
        *slot = Some(PathBuf::from(value));
        i += 2;
    }
    Ok((globals, args[i..].to_vec()))
}

impl Environment {
    fn load(globals: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let default_state_dir = globals.state_dir.clone().unwrap_or_else(default_state_dir);
        let config_path = globals
            .config
            .clone()
            .unwrap_or_else(|| default_state_dir.join(CONFIG_FILE));
        let config = load_config(&config_path, globals.config.is_some())?;

        let state_dir = globals
            .state_dir
            .clone()
            .or_else(|| config.storage.state_dir.clone())
            .unwrap_or(default_state_dir);
        let preview_dir = globals
            .preview_dir
            .clone()
            .unwrap_or_else(|| state_dir.join(PREVIEW_DIR));

        Ok(Self {
            config,
            state_dir,
            preview_dir,
        })
    }

    fn open_session(&self) -> Result<SessionState, Box<dyn std::error::Error>> {
        let persistence = FilePersistence::open(self.state_dir.join(PERSISTENCE_DIR))?;
        let store = WorkspaceStore::restore(Box::new(persistence));
        Ok(SessionState::new(store, self.config.preview.clone()))
    }

    fn driver(
        &self,
        generator: Arc<dyn GenerationService>,
    ) -> Result<SessionDriver<DirectoryPreview>, Box<dyn std::error::Error>> {
        let preview = DirectoryPreview::new(&self.preview_dir);
        let attached = preview.attach();
        let mut driver = SessionDriver::new(self.open_session()?, generator, preview);
        if let Some(handle) = attached {
            driver.attach(handle);
        }
        Ok(driver)
    }

    fn offline_driver(
        &self,
    ) -> Result<SessionDriver<DirectoryPreview>, Box<dyn std::error::Error>> {
        self.driver(Arc::new(ReplayGenerationService::default()))
    }

    fn generator(
        &self,
        response: Option<&Path>,
    ) -> Result<Arc<dyn GenerationService>, Box<dyn std::error::Error>> {
        if let Some(path) = response {
            return Ok(Arc::new(ReplayGenerationService::from_file(path)?));
        }
        let generation = &self.config.generation;
        let Some(program) = generation.program.as_deref() else {
            return Err(format!(
                "no generation program configured; set generation.program in {CONFIG_FILE} or pass --response FILE"
            )
            .into());
        };
        let mut service = CommandGenerationService::new(program, generation.args.clone());
        if let Some(path) = generation.system_prompt_path.as_deref() {
            service = service.with_system_prompt_file(path)?;
        }
        Ok(Arc::new(service))
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("bolt"))
        .unwrap_or_else(|| PathBuf::from(".bolt"))
}

fn load_config(path: &Path, required: bool) -> Result<Config, Box<dyn std::error::Error>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
            return Ok(Config::default());
        }
        Err(err) => return Err(format!("failed to read {}: {err}", path.display()).into()),
    };
    let config = toml::from_str::<Config>(&text)
        .map_err(|err| format!("invalid config {}: {err}", path.display()))?;
    Ok(config)
}

fn flag_value<'a>(
    args: &'a [String],
    flag: &str,
) -> Result<Option<&'a str>, Box<dyn std::error::Error>> {
    let Some(idx) = args.iter().position(|arg| arg == flag) else {
        return Ok(None);
    };
    match args.get(idx + 1) {
        Some(value) => Ok(Some(value.as_str())),
        None => Err(format!("{flag} requires a value").into()),
    }
}

fn positional<'a>(args: &'a [String], name: &str) -> Result<&'a str, Box<dyn std::error::Error>> {
    args.first()
        .filter(|arg| !arg.starts_with("--"))
        .map(String::as_str)
        .ok_or_else(|| format!("missing {name}").into())
}

fn cmd_generate(env: &Environment, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let Some(prompt) = flag_value(args, "--prompt")? else {
        return Err("generate requires --prompt TEXT".into());
    };
    let response = flag_value(args, "--response")?.map(PathBuf::from);
    let mut driver = env.driver(env.generator(response.as_deref())?)?;

    driver.dispatch(UserAction::RequestGeneration {
        prompt: prompt.to_string(),
    })?;
    let outcome = driver.wait_for_generation();
    render::print_warnings(driver.state());

    if let Some(report) = &driver.state().last_load {
        let workspace = driver.state().store.workspace();
        if !workspace.explanation.is_empty() {
            println!("{}\n", workspace.explanation);
        }
        println!(
            "generation {}: {} files loaded, {} rejected, {} edits kept",
            report.generation,
            report.loaded,
            report.rejected.len(),
            report.reapplied.len()
        );
    }
    outcome?;
    if let Some(diff) = &driver.state().preview.last_diff {
        println!("{}", render::describe_diff(diff));
    } else if driver.handle().is_some() {
        println!("preview bootstrapped in {}", env.preview_dir.display());
    }
    Ok(())
}

fn cmd_parse(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let path = positional(args, "FILE")?;
    let raw = if path == "-" {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        raw
    } else {
        fs::read_to_string(path)?
    };
    let parsed = parse(&raw)?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn cmd_edit(env: &Environment, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let path = positional(args, "PATH")?;
    let content = match (flag_value(args, "--content")?, flag_value(args, "--from")?) {
        (Some(content), None) => content.to_string(),
        (None, Some(from)) => fs::read_to_string(from)?,
        _ => return Err("edit requires exactly one of --content TEXT or --from FILE".into()),
    };

    let mut driver = env.offline_driver()?;
    driver.dispatch(UserAction::EditFile {
        path: path.to_string(),
        content,
    })?;
    render::print_warnings(driver.state());
    println!("edited {path}; run `bolt sync` to update the preview");
    Ok(())
}

fn cmd_rm(env: &Environment, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let path = positional(args, "PATH")?;
    let mut driver = env.offline_driver()?;
    let existed = driver.state().store.get(path).is_some();
    driver.dispatch(UserAction::RemoveFile {
        path: path.to_string(),
    })?;
    if !existed {
        return Err(format!("no file at {path}").into());
    }
    println!("removed {path}; run `bolt sync` to update the preview");
    Ok(())
}

fn cmd_cat(env: &Environment, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let path = positional(args, "PATH")?;
    let state = env.open_session()?;
    let Some(file) = state.store.get(path) else {
        return Err(format!("no file at {path}").into());
    };
    print!("{}", file.content);
    Ok(())
}

fn cmd_ls(env: &Environment) -> Result<(), Box<dyn std::error::Error>> {
    let state = env.open_session()?;
    render::print_file_list(&state);
    Ok(())
}

fn cmd_tree(env: &Environment, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut driver = env.offline_driver()?;
    if let Some(open) = flag_value(args, "--open")? {
        driver.dispatch(UserAction::OpenFile {
            path: open.to_string(),
        })?;
    }
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--toggle" {
            let Some(folder) = args.get(i + 1) else {
                return Err("--toggle requires a folder".into());
            };
            driver.dispatch(UserAction::ToggleFolder {
                path: folder.clone(),
            })?;
            i += 1;
        }
        i += 1;
    }
    render::print_warnings(driver.state());
    render::print_tree(&driver.state().file_tree());
    Ok(())
}

fn cmd_sync(env: &Environment) -> Result<(), Box<dyn std::error::Error>> {
    let mut driver = env.offline_driver()?;
    let booted = driver.handle().is_some();
    driver.dispatch(UserAction::RequestSync)?;
    render::print_warnings(driver.state());

    if !booted {
        println!("preview bootstrapped in {}", env.preview_dir.display());
    } else if let Some(diff) = &driver.state().preview.last_diff {
        println!("{}", render::describe_diff(diff));
    }
    Ok(())
}

fn cmd_status(env: &Environment, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let persistence = FilePersistence::open(env.state_dir.join(PERSISTENCE_DIR))?;
    let last_prompt = load_last_prompt(&persistence).unwrap_or_default();
    let state = SessionState::new(
        WorkspaceStore::restore(Box::new(persistence)),
        env.config.preview.clone(),
    );
    let workspace = state.store.workspace();
    let preview = if DirectoryPreview::new(&env.preview_dir).attach().is_some() {
        "bootstrapped"
    } else {
        "not bootstrapped"
    };

    let report = StatusReport {
        state: state.store.state().label(),
        generation: state.store.generation(),
        project_title: workspace.project_title.clone(),
        files: workspace.len(),
        edited: workspace.edited_count(),
        pending_overrides: state.store.overrides().len(),
        last_prompt,
        preview_dir: env.preview_dir.display().to_string(),
        preview,
    };
    if args.iter().any(|arg| arg == "--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}

fn cmd_reset(env: &Environment) -> Result<(), Box<dyn std::error::Error>> {
    let mut driver = env.offline_driver()?;
    driver.dispatch(UserAction::Reset)?;
    println!("workspace reset");
    Ok(())
}

fn print_help() {
    println!("bolt {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  bolt [--config FILE] [--state-dir DIR] [--preview-dir DIR] <command>");
    println!();
    println!("Commands:");
    println!("  generate --prompt TEXT [--response FILE]  generate or update the project");
    println!("  parse FILE|-                              parse a raw response and print it");
    println!("  edit PATH (--content TEXT | --from FILE)  overwrite a file locally");
    println!("  rm PATH                                   remove a file");
    println!("  cat PATH                                  print a file");
    println!("  ls                                        list files (M = edited)");
    println!("  tree [--open PATH] [--toggle DIR]...      show the folder tree");
    println!("  sync                                      push local changes to the preview");
    println!("  status [--json]                           show workspace status");
    println!("  reset                                     discard the workspace");
    println!();
    println!("Set {} to override the log filter.", logging::LOG_ENV);
}
