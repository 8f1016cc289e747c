use crate::asset_store::AssetStore;
use crate::cli::CommandLineArgs;
use crate::girder_client::GirderClient;
use crate::resource_manager::ResourceManager;
use crate::scratch::ScratchSpace;
use crate::transcoder::Transcoder;

use std::sync::Arc;

/// Shared application state passed to each request handler.
///
/// Built once at startup and never mutated afterwards.
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Resource manager.
    pub resource_manager: ResourceManager,

    /// Remote asset store.
    pub store: Arc<dyn AssetStore>,

    /// Per-request scratch space.
    pub scratch: ScratchSpace,

    /// Video encoder.
    pub transcoder: Transcoder,
}

impl AppState {
    /// Create and return an [AppState] backed by the configured Girder server.
    pub fn new(args: &CommandLineArgs) -> Self {
        Self::with_store(args, Arc::new(GirderClient::new(&args.girder_api_url)))
    }

    /// Create and return an [AppState] backed by the given asset store.
    pub fn with_store(args: &CommandLineArgs, store: Arc<dyn AssetStore>) -> Self {
        let task_limit = args
            .thread_limit
            .or_else(|| Some(num_cpus::get().saturating_sub(1).max(1)));
        let resource_manager =
            ResourceManager::new(args.connection_limit, task_limit, args.transcode_limit);
        Self {
            args: args.clone(),
            resource_manager,
            store,
            scratch: ScratchSpace::new(args.scratch_dir.clone()),
            transcoder: Transcoder::new(&args.ffmpeg, args.transcode_timeout()),
        }
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
