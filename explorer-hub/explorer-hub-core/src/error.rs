use crate::node::NodeKey;

/// Failures surfaced by the explorer core. View construction never produces
/// one of these; filtered-out or absent nodes are simply omitted.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("permission denied: {permission} on {node}")]
    PermissionDenied { node: NodeKey, permission: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("a {doc_type} named '{name}' already exists in this folder")]
    NameConflict { doc_type: String, name: String },
    #[error("cannot move {node} beneath itself or one of its descendants ({target})")]
    Cycle { node: NodeKey, target: NodeKey },
    #[error("{0} is already in the tree")]
    AlreadyExists(NodeKey),
    #[error("tree already has a root: {0}")]
    RootExists(NodeKey),
    #[error("document and tree stores disagree: {0}")]
    StoreInconsistency(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExplorerError {
    pub fn not_found(node: &NodeKey) -> Self {
        ExplorerError::NotFound(node.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExplorerError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
