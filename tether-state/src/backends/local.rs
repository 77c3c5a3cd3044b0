//! Local file backend configuration
//!
//! Points at a state file on the provider's local filesystem.

use crate::backend::define_backend;

define_backend! {
    /// Configuration for a state stored in a local file
    LocalBackend, LocalBackendBuilder, "local";
    required {
        /// Path to the state file
        path: String => "path",
    }
    optional {
        /// Directory holding non-default workspace states
        workspace_dir: String => "workspaceDir",
        /// Workspace whose state is read
        workspace: String => "workspace",
    }
    secret {}
}
