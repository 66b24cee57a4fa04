use pages_schema::BlockPath;
use thiserror::Error;

/// Common error type shared by the page crates
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("No block at {0}")]
    BlockNotFound(BlockPath),

    #[error("Block at {path} is a {block_type}, which has no children")]
    NotAContainer {
        path: BlockPath,
        block_type: &'static str,
    },
}
