//! Command-line front end for an explorer data directory.

mod render;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use explorer_hub_core::config::ExplorerConfig;
use explorer_hub_core::permission::{OWNER, READ};
use explorer_hub_core::view::{FilterSpec, ViewState};
use explorer_hub_core::{ExplorerService, NodeKey};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "explorer-hub")]
#[command(about = "Browse and reorganise the document explorer tree")]
struct Cli {
    /// JSON config file; defaults and EXPLORER_* variables otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Principal the command acts as
    #[arg(long, default_value = "admin")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the root folder and make the user its owner
    Init,

    /// Create a document
    Create {
        doc_type: String,
        name: String,
        /// Folder as type:uuid; the root when omitted
        #[arg(long)]
        parent: Option<String>,
    },

    /// Copy a document into a folder
    Copy {
        doc: String,
        folder: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Move a document into a folder
    Move {
        doc: String,
        folder: String,
        #[arg(long)]
        name: Option<String>,
    },

    Rename { doc: String, name: String },

    /// Replace the tags of a document; no tags clears them
    Tag { doc: String, tags: Vec<String> },

    /// Delete a document and everything beneath it
    Delete { doc: String },

    /// Print the filtered tree
    View {
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        types: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Required permissions; Read when none are given
        #[arg(long = "perm")]
        perms: Vec<String>,
        #[arg(long)]
        open: Vec<String>,
        #[arg(long)]
        ensure: Vec<String>,
        #[arg(long)]
        min_depth: Option<usize>,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// List document types the user can see
    Types,

    /// List everything beneath a node
    Descendants { doc: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ExplorerConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ExplorerConfig::from_env(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let min_depth_default = config.default_min_depth;

    let service = ExplorerService::open(config).context("opening explorer data")?;
    let root = service.ensure_root()?.key();
    let gate = service.permissions(cli.user.clone());

    match cli.command {
        Commands::Init => {
            service.acl().grant(&root, &cli.user, OWNER);
            service.acl().save(service.config().acl_path())?;
            info!(user = %cli.user, "explorer initialised");
            println!("{}", root);
        }
        Commands::Create {
            doc_type,
            name,
            parent,
        } => {
            let folder = match parent {
                Some(p) => parse_key(&p)?,
                None => root,
            };
            let doc = service.create(&gate, &doc_type, &folder, &name)?;
            println!("{}", doc.key());
        }
        Commands::Copy { doc, folder, name } => {
            let (doc, folder) = (parse_key(&doc)?, parse_key(&folder)?);
            let copy = service.copy(&gate, &doc, &folder, name.as_deref())?;
            println!("{}", copy.key());
        }
        Commands::Move { doc, folder, name } => {
            let (doc, folder) = (parse_key(&doc)?, parse_key(&folder)?);
            let moved = service.move_item(&gate, &doc, &folder, name.as_deref())?;
            println!("{}", moved);
        }
        Commands::Rename { doc, name } => {
            let renamed = service.rename(&gate, &parse_key(&doc)?, &name)?;
            println!("{}", renamed);
        }
        Commands::Tag { doc, tags } => {
            let tagged = service.set_tags(&gate, &parse_key(&doc)?, tags.into_iter().collect())?;
            println!("{}", tagged);
        }
        Commands::Delete { doc } => {
            service.delete(&gate, &parse_key(&doc)?)?;
        }
        Commands::View {
            name,
            types,
            tags,
            perms,
            open,
            ensure,
            min_depth,
            json,
        } => {
            let mut filter = FilterSpec::new();
            if perms.is_empty() {
                filter = filter.require(READ);
            }
            for p in perms {
                filter = filter.require(p);
            }
            for t in types {
                filter = filter.include_type(t);
            }
            for t in tags {
                filter = filter.tag(t);
            }
            if let Some(n) = name {
                filter = filter.name(n);
            }
            let mut state = ViewState::new(min_depth.unwrap_or(min_depth_default));
            for o in open {
                state = state.open(parse_key(&o)?);
            }
            for e in ensure {
                state = state.ensure_visible(parse_key(&e)?);
            }
            let view = service.get_view(&gate, &filter, &state);
            if json {
                println!("{}", serde_json::to_string_pretty(&view.rows())?);
            } else {
                print!("{}", render::render_tree(&view));
            }
        }
        Commands::Types => {
            for t in service.visible_document_types(&gate) {
                println!("{:>3} {:<16} {}", t.priority, t.doc_type, t.display_type);
            }
        }
        Commands::Descendants { doc } => {
            for d in service.descendants(&parse_key(&doc)?) {
                println!("{}", d);
            }
        }
    }

    Ok(())
}

fn parse_key(s: &str) -> Result<NodeKey> {
    NodeKey::parse(s).ok_or_else(|| anyhow!("expected type:uuid, got '{}'", s))
}
