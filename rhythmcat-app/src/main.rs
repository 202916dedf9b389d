mod commands;
#[cfg(feature = "gst")]
mod gst_backend;
mod logging;
#[cfg(feature = "gst")]
mod serve;

use argh::FromArgs;
use rhythmcat_core::{CoreError, Library, LyricEvent, Result, RhythmCatConfig};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(FromArgs)]
/// RhythmCat music player.
struct Cli {
    /// config file (default: ~/.config/rhythmcat/config.toml)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// library database file, overrides `[library] db_file`
    #[argh(option, short = 'l')]
    library: Option<PathBuf>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Catalogs(CatalogsCmd),
    AddCatalog(AddCatalogCmd),
    RemoveCatalog(RemoveCatalogCmd),
    RenameCatalog(RenameCatalogCmd),
    MoveCatalog(MoveCatalogCmd),
    Items(ItemsCmd),
    Import(ImportCmd),
    RemoveItem(RemoveItemCmd),
    MoveItem(MoveItemCmd),
    Lyric(LyricCmd),
    #[cfg(feature = "gst")]
    Serve(ServeCmd),
}

#[derive(FromArgs)]
/// List catalogs.
#[argh(subcommand, name = "catalogs")]
struct CatalogsCmd {}

#[derive(FromArgs)]
/// Create a playlist.
#[argh(subcommand, name = "add-catalog")]
struct AddCatalogCmd {
    #[argh(positional)]
    name: String,
    /// position in the catalog list, starting at 1 (default: last)
    #[argh(option)]
    position: Option<usize>,
}

#[derive(FromArgs)]
/// Delete a catalog and its items.
#[argh(subcommand, name = "remove-catalog")]
struct RemoveCatalogCmd {
    #[argh(positional)]
    name: String,
}

#[derive(FromArgs)]
/// Rename a catalog.
#[argh(subcommand, name = "rename-catalog")]
struct RenameCatalogCmd {
    #[argh(positional)]
    name: String,
    #[argh(positional)]
    new_name: String,
}

#[derive(FromArgs)]
/// Move a catalog to a new position, starting at 1.
#[argh(subcommand, name = "move-catalog")]
struct MoveCatalogCmd {
    #[argh(positional)]
    name: String,
    #[argh(positional)]
    position: usize,
}

#[derive(FromArgs)]
/// List the items of a catalog.
#[argh(subcommand, name = "items")]
struct ItemsCmd {
    #[argh(positional)]
    catalog: String,
}

#[derive(FromArgs)]
/// Add audio files, or whole directories, to a catalog.
#[argh(subcommand, name = "import")]
struct ImportCmd {
    #[argh(positional)]
    catalog: String,
    #[argh(positional)]
    paths: Vec<PathBuf>,
}

#[derive(FromArgs)]
/// Remove an item from a catalog.
#[argh(subcommand, name = "remove-item")]
struct RemoveItemCmd {
    #[argh(positional)]
    catalog: String,
    #[argh(positional)]
    index: usize,
}

#[derive(FromArgs)]
/// Move an item, within its catalog or into another one.
#[argh(subcommand, name = "move-item")]
struct MoveItemCmd {
    #[argh(positional)]
    catalog: String,
    #[argh(positional)]
    index: usize,
    #[argh(positional)]
    target: String,
    #[argh(positional)]
    position: usize,
}

#[derive(FromArgs)]
/// Show, download or bind lyrics.
#[argh(subcommand, name = "lyric")]
struct LyricCmd {
    #[argh(subcommand)]
    action: LyricAction,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum LyricAction {
    Show(LyricShowCmd),
    Fetch(LyricFetchCmd),
    Bind(LyricBindCmd),
}

#[derive(FromArgs)]
/// Print the lyrics found on disk for an item.
#[argh(subcommand, name = "show")]
struct LyricShowCmd {
    #[argh(positional)]
    catalog: String,
    #[argh(positional)]
    index: usize,
}

#[derive(FromArgs)]
/// Find lyrics for an item, downloading them if needed.
#[argh(subcommand, name = "fetch")]
struct LyricFetchCmd {
    #[argh(positional)]
    catalog: String,
    #[argh(positional)]
    index: usize,
}

#[derive(FromArgs)]
/// Bind a lyric file to an item.
#[argh(subcommand, name = "bind")]
struct LyricBindCmd {
    #[argh(positional)]
    catalog: String,
    #[argh(positional)]
    index: usize,
    #[argh(positional)]
    file: PathBuf,
    /// bind as the secondary (translation) lyric
    #[argh(switch)]
    secondary: bool,
}

#[cfg(feature = "gst")]
#[derive(FromArgs)]
/// Play through GStreamer with plugins enabled until Ctrl+C.
#[argh(subcommand, name = "serve")]
struct ServeCmd {}

fn load_config(path: &Path) -> RhythmCatConfig {
    let plugin_templates: &[&str] = &[
        rhythmcat_plugin_mpris::CONFIG_TEMPLATE,
        rhythmcat_plugin_notify::CONFIG_TEMPLATE,
    ];
    match RhythmCatConfig::load_or_create_at(path, Some(plugin_templates)) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            println!(
                "Created a new config file at {}. Review it and run RhythmCat again.",
                path.display()
            );
            std::process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

/// Run a command; returns whether the library changed and needs saving
#[cfg_attr(not(feature = "gst"), allow(unused_variables))]
fn execute(
    command: Command,
    library: &mut Library,
    config: &RhythmCatConfig,
    db_path: &Path,
) -> Result<bool> {
    match command {
        Command::Catalogs(_) => {
            print_lines(&commands::catalog_lines(library));
            Ok(false)
        }
        Command::AddCatalog(cmd) => {
            commands::add_catalog(library, &cmd.name, cmd.position)?;
            Ok(true)
        }
        Command::RemoveCatalog(cmd) => {
            commands::remove_catalog(library, &cmd.name)?;
            Ok(true)
        }
        Command::RenameCatalog(cmd) => {
            commands::rename_catalog(library, &cmd.name, &cmd.new_name)?;
            Ok(true)
        }
        Command::MoveCatalog(cmd) => {
            commands::move_catalog(library, &cmd.name, cmd.position)?;
            Ok(true)
        }
        Command::Items(cmd) => {
            print_lines(&commands::item_lines(library, &cmd.catalog)?);
            Ok(false)
        }
        Command::Import(cmd) => {
            let added = commands::import(library, &cmd.catalog, &cmd.paths)?;
            info!("Imported {} item(s) into {}", added, cmd.catalog);
            Ok(added > 0)
        }
        Command::RemoveItem(cmd) => {
            commands::remove_item(library, &cmd.catalog, cmd.index)?;
            Ok(true)
        }
        Command::MoveItem(cmd) => {
            commands::move_item(library, &cmd.catalog, cmd.index, &cmd.target, cmd.position)?;
            Ok(true)
        }
        Command::Lyric(LyricCmd { action }) => execute_lyric(action, library, config),
        #[cfg(feature = "gst")]
        Command::Serve(_) => {
            let owned = std::mem::take(library);
            runtime()?.block_on(serve::run(config.clone(), owned, db_path))?;
            Ok(false)
        }
    }
}

fn execute_lyric(action: LyricAction, library: &mut Library, config: &RhythmCatConfig) -> Result<bool> {
    match action {
        LyricAction::Show(cmd) => {
            match commands::lyric_lines(library, &config.lyrics, &cmd.catalog, cmd.index)? {
                Some((path, lines)) => {
                    println!("# {}", path.display());
                    print_lines(&lines);
                }
                None => println!("No lyrics found"),
            }
            Ok(false)
        }
        LyricAction::Fetch(cmd) => {
            let owned = std::mem::take(library);
            let (returned, event) = runtime()?.block_on(commands::fetch_lyric(
                owned,
                &config.lyrics,
                &cmd.catalog,
                cmd.index,
            ))?;
            *library = returned;
            match event {
                LyricEvent::Loaded { path, source, lyrics, .. } => {
                    let location = path.map_or_else(|| "cache".to_string(), |p| p.display().to_string());
                    println!("{} lines from {:?} ({})", lyrics.lines.len(), source, location);
                    Ok(true)
                }
                LyricEvent::NotFound { .. } => {
                    println!("No lyrics found");
                    Ok(false)
                }
            }
        }
        LyricAction::Bind(cmd) => {
            commands::bind_lyric(library, &cmd.catalog, cmd.index, &cmd.file, cmd.secondary)?;
            Ok(true)
        }
    }
}

fn main() {
    let cli: Cli = argh::from_env();

    let config_path = cli.config.unwrap_or_else(RhythmCatConfig::config_path);
    init_logging(&config_path);

    let config = load_config(&config_path);
    let db_path = cli.library.unwrap_or_else(|| config.library.db_file.clone());

    let mut library = match commands::open_library(&db_path) {
        Ok(library) => library,
        Err(e) => {
            error!("Failed to open library {}: {}", db_path.display(), e);
            std::process::exit(1);
        }
    };

    match execute(cli.command, &mut library, &config, &db_path) {
        Ok(true) => {
            if let Err(e) = rhythmcat_core::dbfile::save(&library, &db_path) {
                error!("Failed to save library: {}", e);
                std::process::exit(1);
            }
        }
        Ok(false) => {}
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

fn init_logging(config_path: &Path) {
    let file_logging_enabled = logging::check_file_logging_enabled(config_path);
    logging::init_tracing(file_logging_enabled);
}
