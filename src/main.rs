use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relgraph::db::{migrate, Db};
use relgraph::relations::{RelationStore, RelationTypeRegistry};
use relgraph::resolver::{EntityResolver, MemoryEntity, MemoryEntitySource};
use relgraph::{Config, DisplayProjection, ExtractorRegistry, ObjectType, Reconciler, RelgraphError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "relgraph")]
#[command(about = "Typed relation graph and entity reference tracking", version)]
struct Args {
    /// JSON file of known entities, used for constraint checks and display
    #[arg(long, global = true)]
    entities: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and verify the schema (default)
    Verify,
    /// List relation types
    Types,
    /// Create a relation type
    CreateType {
        alias: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        bidirectional: bool,
        #[arg(long)]
        parent_type: Option<ObjectType>,
        #[arg(long)]
        child_type: Option<ObjectType>,
    },
    /// Relate two entities under a relation type alias
    Relate {
        parent: i64,
        child: i64,
        alias: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Page through the relations of a type
    Page {
        alias: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        size: Option<usize>,
    },
    /// Relations where the entity is the parent
    Parents {
        id: i64,
        #[arg(long)]
        alias: Option<String>,
    },
    /// Relations where the entity is the child
    Children {
        id: i64,
        #[arg(long)]
        alias: Option<String>,
    },
    /// Delete a relation by id
    Delete { id: i64 },
    /// Print the references found in a property value file
    Extract {
        editor: String,
        file: PathBuf,
    },
    /// Reconcile an owner's relations with the references in a property value file
    Track {
        owner: i64,
        alias: String,
        editor: String,
        file: PathBuf,
    },
    /// Print the display projection of a stored link list
    Project {
        file: PathBuf,
        #[arg(long)]
        culture: Option<String>,
    },
}

/// One entry of the `--entities` file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntitySeed {
    id: i64,
    key: Uuid,
    object_type: ObjectType,
    name: String,
    icon: Option<String>,
    #[serde(default = "default_true")]
    published: bool,
    #[serde(default)]
    trashed: bool,
    url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn load_resolver(path: Option<&Path>) -> Result<EntityResolver> {
    let mut sources: HashMap<ObjectType, Arc<MemoryEntitySource>> = ObjectType::ALL
        .iter()
        .map(|t| (*t, Arc::new(MemoryEntitySource::new(*t))))
        .collect();

    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read entities file: {}", path.display()))?;
        let seeds: Vec<EntitySeed> = serde_json::from_str(&raw).context("Failed to parse entities file")?;
        log::info!("Loaded {} entities from {}", seeds.len(), path.display());
        for seed in seeds {
            let mut entity = MemoryEntity::new(seed.id, &seed.name);
            entity.key = seed.key;
            entity.published = seed.published;
            entity.trashed = seed.trashed;
            if let Some(icon) = seed.icon {
                entity.icon = icon;
            }
            if seed.url.is_some() {
                entity.url = seed.url;
            }
            if let Some(source) = sources.get(&seed.object_type) {
                source.insert(entity);
            }
        }
    }

    let mut resolver = EntityResolver::new();
    for source in sources.into_values() {
        resolver.register(source);
    }
    Ok(resolver)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.relgraph.log_level.as_str()),
    )
    .init();

    let db = Db::new(config.db_path());
    let migrations_dir = config.migrations_dir().to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await?;

    let registry = Arc::new(RelationTypeRegistry::load(db.clone()).await?);
    let resolver = Arc::new(load_resolver(args.entities.as_deref())?);
    let store = Arc::new(
        RelationStore::new(db.clone(), registry.clone(), resolver.clone()).with_paging(&config.paging),
    );

    match args.command.unwrap_or(Command::Verify) {
        Command::Verify => {
            log::info!("Starting relgraph v{}", env!("CARGO_PKG_VERSION"));
            log::info!("Database path: {}", config.db_path().display());
            verify_database_schema(&db).await?;
        }
        Command::Types => print_json(&registry.get_all())?,
        Command::CreateType {
            alias,
            name,
            bidirectional,
            parent_type,
            child_type,
        } => {
            let created = registry
                .create(&name, &alias, bidirectional, parent_type, child_type)
                .await?;
            print_json(&created)?;
        }
        Command::Relate {
            parent,
            child,
            alias,
            comment,
        } => {
            let relation = store.relate(parent, child, &alias, comment.as_deref()).await?;
            print_json(&relation)?;
        }
        Command::Page { alias, page, size } => {
            let relation_type = registry
                .get_by_alias(&alias)
                .ok_or_else(|| RelgraphError::UnknownRelationType(alias.clone()))?;
            let size = size.unwrap_or(config.paging.default_page_size);
            let page = store
                .get_paged_by_relation_type_id(relation_type.id, page, size)
                .await?;
            log::info!(
                "Page {} of {} ({} total relations)",
                page.page_index + 1,
                page.total_pages().max(1),
                page.total_records
            );
            print_json(&page)?;
        }
        Command::Parents { id, alias } => {
            print_json(&store.get_by_parent_id(id, alias.as_deref()).await?)?;
        }
        Command::Children { id, alias } => {
            print_json(&store.get_by_child_id(id, alias.as_deref()).await?)?;
        }
        Command::Delete { id } => {
            if store.delete(id).await? {
                log::info!("Deleted relation {}", id);
            } else {
                log::info!("Relation {} did not exist", id);
            }
        }
        Command::Extract { editor, file } => {
            let value = read_value(&file)?;
            let references = ExtractorRegistry::new().extract(&editor, Some(&value));
            print_json(&references)?;
        }
        Command::Track {
            owner,
            alias,
            editor,
            file,
        } => {
            let value = read_value(&file)?;
            let reconciler = Reconciler::new(store.clone());
            match reconciler.track_property(owner, &alias, &editor, Some(&value)).await {
                Some(report) => println!(
                    "created={} deleted={} unchanged={} unresolved={}",
                    report.created.len(),
                    report.deleted.len(),
                    report.unchanged,
                    report.unresolved.len()
                ),
                None => println!("Tracking failed; see log for details"),
            }
        }
        Command::Project { file, culture } => {
            let value = read_value(&file)?;
            let projection = DisplayProjection::new(resolver.clone()).with_display(&config.display);
            print_json(&projection.project_value(Some(&value), culture.as_deref()))?;
        }
    }

    Ok(())
}

fn read_value(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read value file: {}", file.display()))
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for table in ["relation_types", "relations", "schema_migrations"] {
            if !tables.iter().any(|t| t == table) {
                return Err(RelgraphError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("✓ Table exists: {}", table);
        }

        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")?;
        let indexes: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for index_name in [
            "idx_relation_types_alias",
            "idx_relations_type_id",
            "idx_relations_parent",
            "idx_relations_child",
        ] {
            if indexes.iter().any(|i| i == index_name) {
                log::debug!("✓ Index exists: {}", index_name);
            } else {
                log::warn!("Index not found: {}", index_name);
            }
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(RelgraphError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(RelgraphError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(RelgraphError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
