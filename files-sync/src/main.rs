use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use files_core::FilesClient;
use files_sync::actions::Actions;
use files_sync::cache::store::shared;
use files_sync::cache::{NormalizedCache, SharedCache, ViewContext};
use files_sync::config::SyncConfig;
use files_sync::logging::init_logging;
use files_sync::notify::{MemoryNotifier, Notifier};
use files_sync::upload::{HttpUploadTransport, UploadFile, UploadManager, UploadStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Help,
    List {
        folder_id: String,
    },
    Mkdir {
        parent_id: String,
        name: String,
    },
    Upload {
        folder_id: String,
        paths: Vec<PathBuf>,
    },
    Update {
        node_id: String,
        path: PathBuf,
        overwrite: bool,
    },
}

const USAGE: &str = "Usage: files-sync <command>
  ls <folder-id>                       List a folder
  mkdir <parent-id> <name>             Create a folder
  upload <folder-id> <path>...         Upload files and folders
  update [--overwrite] <node-id> <path>  Upload a new version of a file";

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let args: Vec<String> = args.into_iter().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliMode::Help);
    }
    let Some((command, rest)) = args.split_first() else {
        return Ok(CliMode::Help);
    };
    match (command.as_str(), rest) {
        ("ls", [folder_id]) => Ok(CliMode::List {
            folder_id: folder_id.clone(),
        }),
        ("mkdir", [parent_id, name]) => Ok(CliMode::Mkdir {
            parent_id: parent_id.clone(),
            name: name.clone(),
        }),
        ("upload", [folder_id, paths @ ..]) if !paths.is_empty() => Ok(CliMode::Upload {
            folder_id: folder_id.clone(),
            paths: paths.iter().map(PathBuf::from).collect(),
        }),
        ("update", rest) => {
            let overwrite = rest.iter().any(|arg| arg == "--overwrite");
            let positional: Vec<&String> =
                rest.iter().filter(|arg| *arg != "--overwrite").collect();
            match positional.as_slice() {
                [node_id, path] => Ok(CliMode::Update {
                    node_id: node_id.to_string(),
                    path: PathBuf::from(path.as_str()),
                    overwrite,
                }),
                _ => anyhow::bail!("update expects <node-id> <path>"),
            }
        }
        (other, _) => anyhow::bail!("unknown or incomplete command: {other}"),
    }
}

struct Session {
    client: FilesClient,
    cache: SharedCache,
    notifier: Arc<MemoryNotifier>,
    config: SyncConfig,
}

impl Session {
    fn new(config: SyncConfig) -> anyhow::Result<Self> {
        let mut client = FilesClient::new(config.base_url.as_str())?;
        if let Some(token) = &config.auth_token {
            client = client.with_auth_token(token.clone());
        }
        Ok(Self {
            client,
            cache: shared(NormalizedCache::new()),
            notifier: Arc::new(MemoryNotifier::new()),
            config,
        })
    }

    fn actions(&self) -> Actions {
        Actions::new(
            self.client.clone(),
            Arc::clone(&self.cache),
            self.notifier.clone() as Arc<dyn Notifier>,
            ViewContext::new(self.config.user_id.clone()),
        )
        .with_page_size(self.config.page_size)
    }

    fn uploads(&self) -> UploadManager<HttpUploadTransport, FilesClient> {
        UploadManager::new(
            HttpUploadTransport::from_client(&self.client),
            self.client.clone(),
            Arc::clone(&self.cache),
            self.notifier.clone() as Arc<dyn Notifier>,
            self.config.upload,
        )
    }

    fn drain_notifications(&self) -> Vec<String> {
        self.notifier
            .take()
            .into_iter()
            .map(|n| format!("[files-sync] {:?}: {}", n.severity, n.message))
            .collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("{USAGE}");
        return Ok(());
    }

    init_logging();
    let config = SyncConfig::from_env().context("failed to read configuration")?;
    let session = Session::new(config)?;
    let result = run(mode, &session).await;
    for line in session.drain_notifications() {
        eprintln!("{line}");
    }
    result
}

async fn run(mode: CliMode, session: &Session) -> anyhow::Result<()> {
    match mode {
        CliMode::Help => Ok(()),
        CliMode::List { folder_id } => {
            let nodes = session
                .actions()
                .load_children(&folder_id, session.config.default_sort)
                .await
                .context("failed to list folder")?;
            for node in nodes {
                let kind = if node.is_folder() { "d" } else { "-" };
                println!("{kind} {:>12} {} {}", node.effective_size(), node.id, node.name);
            }
            Ok(())
        }
        CliMode::Mkdir { parent_id, name } => {
            let node = session
                .actions()
                .create_folder(&parent_id, &name)
                .await
                .context("failed to create folder")?;
            println!("{}", node.id);
            Ok(())
        }
        CliMode::Upload { folder_id, paths } => {
            let manager = session.uploads();
            let mut files = Vec::new();
            let mut folders = Vec::new();
            for path in paths {
                let metadata = tokio::fs::metadata(&path)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))?;
                if metadata.is_dir() {
                    folders.push(path);
                } else {
                    files.push(UploadFile::from_path(&path).await?);
                }
            }
            if !files.is_empty() {
                manager.add(files, &folder_id, session.config.detect_folders);
            }
            if !folders.is_empty() {
                manager.add_folders(&folders, &folder_id).await?;
            }
            report_uploads(&manager).await
        }
        CliMode::Update {
            node_id,
            path,
            overwrite,
        } => {
            let manager = session.uploads();
            let file = UploadFile::from_path(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            manager.update(&node_id, file, overwrite);
            report_uploads(&manager).await
        }
    }
}

async fn report_uploads(
    manager: &UploadManager<HttpUploadTransport, FilesClient>,
) -> anyhow::Result<()> {
    let mut updates = manager.subscribe();
    updates
        .wait_for(|items| items.iter().all(|item| item.status.is_terminal()))
        .await
        .context("upload manager stopped")?;

    let items = manager.snapshot();
    let failed = items
        .iter()
        .filter(|item| item.status == UploadStatus::Failed)
        .count();
    for item in &items {
        println!(
            "{:?} {} {}",
            item.status,
            item.file.name,
            item.node_id.as_deref().unwrap_or("-")
        );
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} uploads failed", items.len());
    }
    Ok(())
}
