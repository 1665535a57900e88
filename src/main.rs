use clap::{Parser, Subcommand};
use mini_gallery::config::{self, MiniConfig};
use mini_gallery::gallery::{RenderOptions, RenderSession};
use mini_gallery::handlers::{AllowAll, Handlers};
use mini_gallery::imaging::{RustBackend, ThumbnailSpec};
use mini_gallery::naming::PageName;
use mini_gallery::output;
use mini_gallery::store::{FsUploads, ThumbnailStore};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mini-gallery")]
#[command(about = "Square thumbnails and cached gallery fragments for wiki pages")]
#[command(long_about = "\
Square thumbnails and cached gallery fragments for wiki pages

Page text refers to uploaded images with gallery directives:

  Mini:dawn.jpg,dusk.jpg\"Evening walk\"   linked thumbnails with a caption
  mini:*.jpg,!draft*                      every JPEG except drafts, unlinked
  mini:Travel.Rome/forum.jpg              an upload of another page
  (:mini x=160 y=120 XPos=0 YPos=0.25:)   thumbnail geometry for this page

Uploads are laid out per group (uploads/Main/) or per page
(uploads/Main/Photos/). Thumbnails are stored next to their source as
th00---<name>.jpg and regenerated whenever the source is newer.

Run 'mini-gallery gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Uploads directory (overrides site.uploads_dir)
    #[arg(long, global = true)]
    uploads: Option<PathBuf>,

    /// Log every cache lookup and freshness check
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Page source shared by the commands that honour page directives.
#[derive(clap::Args, Clone)]
struct PageArgs {
    /// Page name, Group.Name
    page: String,

    /// File holding the page text
    #[arg(long)]
    text: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Render the gallery directives of a page to HTML
    Render {
        #[command(flatten)]
        page: PageArgs,
        /// Bypass the fragment cache
        #[arg(long)]
        preview: bool,
        /// Rebuild the fragment cache even if it is fresh
        #[arg(long)]
        recache: bool,
        /// Print HTML, head snippets and stats as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve one thumbnail, generating it if needed
    Fetch {
        #[command(flatten)]
        page: PageArgs,
        /// Upload name of the source image
        upname: String,
        /// Copy the thumbnail bytes to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate every missing or stale thumbnail of a page
    Warm {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Delete a page's thumbnails and fragment cache
    Purge {
        /// Page name, Group.Name
        page: String,
        /// Page to redirect to afterwards
        #[arg(long)]
        redirect: Option<String>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let backend = RustBackend::new();
    let load = || load_site(&cli.config_dir, cli.uploads.as_deref());

    match &cli.command {
        Command::Render {
            page,
            preview,
            recache,
            json,
        } => {
            let (config, uploads) = load()?;
            let name = parse_page(&page.page)?;
            let (text, modified) = read_page(page.text.as_deref())?;
            let mut session = RenderSession::new(
                config,
                name.clone(),
                modified,
                &backend,
                &uploads,
                RenderOptions {
                    preview: *preview,
                    recache: *recache,
                },
            );
            let html = session.render_text(&text);
            let result = session.finish(html);
            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", result.html);
            }
            output::print_render_summary(&name, &result);
        }
        Command::Fetch { page, upname, out } => {
            let (config, uploads) = load()?;
            let name = parse_page(&page.page)?;
            let (text, _) = read_page(page.text.as_deref())?;
            let handlers = Handlers {
                config: &config,
                backend: &backend,
                uploads: &uploads,
                auth: &AllowAll,
            };
            let response = handlers.fetch_thumbnail(&name, upname, &text)?;
            if let Some(out) = out {
                std::fs::write(out, &response.bytes)?;
            }
            output::print_fetch_output(&name, &response, out.as_deref());
        }
        Command::Warm { page } => {
            let (config, uploads) = load()?;
            let name = parse_page(&page.page)?;
            let (text, _) = read_page(page.text.as_deref())?;
            init_thread_pool(&config.processing);
            let config = config.apply_page_directives(&text);
            let store = ThumbnailStore::new(
                &backend,
                &uploads,
                ThumbnailSpec::from_config(&config.thumbnail),
            );
            let report = store.warm(&name)?;
            output::print_warm_output(&name, &report);
        }
        Command::Purge { page, redirect } => {
            let (config, uploads) = load()?;
            let name = parse_page(page)?;
            let handlers = Handlers {
                config: &config,
                backend: &backend,
                uploads: &uploads,
                auth: &AllowAll,
            };
            let result = handlers.purge_thumbnails(&name, redirect.as_deref())?;
            output::print_purge_output(&name, &result);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "mini_gallery=debug"
    } else {
        "mini_gallery=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Load the config and open the uploads tree it describes.
///
/// A relative `site.uploads_dir` is taken from the config directory.
fn load_site(
    config_dir: &Path,
    uploads: Option<&Path>,
) -> Result<(MiniConfig, FsUploads), config::ConfigError> {
    let config = config::load_config(config_dir)?;
    let root = uploads
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_dir.join(&config.site.uploads_dir));
    let uploads = FsUploads::new(root, config.site.upload_prefix);
    Ok((config, uploads))
}

fn parse_page(name: &str) -> Result<PageName, String> {
    PageName::parse(name).ok_or_else(|| format!("invalid page name '{name}', expected Group.Name"))
}

/// Page text and its modification time. No file means an empty page that
/// predates every cache file.
fn read_page(path: Option<&Path>) -> std::io::Result<(String, SystemTime)> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let modified = std::fs::metadata(path)?.modified()?;
            Ok((text, modified))
        }
        None => Ok((String::new(), SystemTime::UNIX_EPOCH)),
    }
}
