//! Headless workspace core: session, tree cache, tabs, declarations, search.

pub mod compiler_options;
pub mod declarations;
pub mod observe;
pub mod search;
pub mod services;
pub mod session;
pub mod tabs;
pub mod tree;
pub mod workspace;

pub use compiler_options::CompilerOptions;
pub use declarations::{missing_package, DeclarationEvent, DeclarationService};
pub use observe::{Generation, Observers, Subscription};
pub use search::{SearchEngine, SearchEvent};
pub use services::SessionContext;
pub use session::{FailureReason, Phase, SessionController, SessionError, SessionEvent};
pub use tabs::{TabEvent, Tabs};
pub use tree::{walk_files, FileTreeCache, TreeEvent};
pub use workspace::{PendingEntry, Workspace, WorkspaceEvent};
